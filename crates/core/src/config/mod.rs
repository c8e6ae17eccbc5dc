//! Configuration loading.
//!
//! This module loads project configuration from the `.pdca/` directory
//! under a project root.

pub mod error;
pub mod loader;
pub mod models;
