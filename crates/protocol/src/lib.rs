//! # pdca-protocol
//!
//! Core protocol definitions and data models for pdca-kit.
//!
//! This crate defines all shared data structures used for:
//! - Pipeline definitions (YAML pipelines, TOML config, Markdown executors)
//! - Workflow step and run status records
//! - Progress events emitted by the orchestrator
//!
//! ## Modules
//!
//! - [`stage_models`]: Stages and pipeline definitions
//! - [`workflow_models`]: Step, run status and audit records
//! - [`config_models`]: Global configuration and executor definitions
//! - [`ipc`]: Progress events sent from the orchestrator to its observers
//!
//! ## Design Principles
//!
//! - Minimal dependencies: Only serde, ts-rs, chrono and uuid
//! - TypeScript generation: All types derive `TS` for client compatibility
//! - Independent compilation: No dependencies on other pdca-kit crates

pub mod config_models;
pub mod ipc;
pub mod stage_models;
pub mod workflow_models;

// Re-export all public types for convenience
pub use config_models::*;
pub use ipc::*;
pub use stage_models::*;
pub use workflow_models::*;
