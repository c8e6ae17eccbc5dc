//! Common test utilities shared by the integration tests.
//!
//! - Fixtures (pipelines, project directories)
//! - Scripted executors and approval handlers
//! - Event collection and assertions

pub mod assertions;
pub mod fixtures;
pub mod mock_executors;

#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use fixtures::*;
#[allow(unused_imports)]
pub use mock_executors::*;
