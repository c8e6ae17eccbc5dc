//! Task executor abstraction and dispatch.
//!
//! This module provides the `TaskExecutor` trait (the seam to whatever
//! performs a stage), the `ExecutorRegistry` that maps pipeline executor
//! names to instances, and two implementations: a subprocess executor and a
//! scripted mock.

pub mod base;
pub mod command;
pub mod mock;
pub mod registry;

pub use base::{ExecutorError, StageRequest, TaskExecutor};
pub use command::CommandExecutor;
pub use mock::MockExecutor;
pub use registry::ExecutorRegistry;
