//! # pdca-core
//!
//! Pipeline state machine and PDCA orchestrator for pdca-kit.
//!
//! This crate provides:
//! - Configuration loading from the `.pdca/` directory
//! - The task executor abstraction and its registry
//! - Failure classification and a retry controller with backoff
//! - Approval gating and quality-driven rework
//! - Run state, the workflow orchestrator and a registry of concurrent runs
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading
//! - [`executor`]: Task executor trait, registry and implementations
//! - [`failure`]: Failure categories and recoverability
//! - [`retry`]: Bounded retries with capped exponential backoff
//! - [`approval`]: Human-in-the-loop approval gate
//! - [`quality`]: Iteration predicate over stage payloads
//! - [`input`]: Stage input assembly
//! - [`engine`]: Workflow orchestrator
//! - [`state`]: Run state and run management

pub mod approval;
pub mod config;
pub mod engine;
pub mod executor;
pub mod failure;
pub mod input;
pub mod quality;
pub mod retry;
pub mod state;
