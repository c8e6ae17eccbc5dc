//! Run state.
//!
//! This module provides:
//! - `ProjectContext`, the aggregate record of one run
//! - Lifecycle transitions that emit progress events
//! - `RunManager` for coordinating concurrent runs

pub mod context;
pub mod lifecycle;
pub mod manager;
