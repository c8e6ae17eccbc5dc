//! Failure classification.
//!
//! Two classifiers live here:
//!
//! - [`classify`] maps a single executor error to a category and a
//!   recoverable flag. The retry controller uses it to decide whether
//!   another attempt is worthwhile.
//! - [`is_fatal`] scans an error message for operational red flags. The
//!   orchestrator uses it to stop the whole pipeline, whatever the
//!   per-call flag says.

use crate::executor::base::ExecutorError;
use pdca_protocol::workflow_models::FailureCategory;

/// Result of classifying a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub category: FailureCategory,
    pub recoverable: bool,
}

impl Classification {
    fn new(category: FailureCategory) -> Self {
        Self {
            category,
            recoverable: is_recoverable(category),
        }
    }
}

/// Recoverability of each known category.
///
/// Unknown failures are assumed transient.
pub fn is_recoverable(category: FailureCategory) -> bool {
    match category {
        FailureCategory::MaxTurnsExceeded
        | FailureCategory::Cancelled
        | FailureCategory::ExecutorUnavailable
        | FailureCategory::ApprovalDeclined
        | FailureCategory::QualityFailure => false,
        FailureCategory::GuardrailViolation
        | FailureCategory::ToolInvocationError
        | FailureCategory::Timeout
        | FailureCategory::InvalidOutput
        | FailureCategory::RetryExhausted
        | FailureCategory::Unknown => true,
    }
}

/// Category names recognised inside free-text error messages.
const CATEGORY_NAMES: &[(&str, FailureCategory)] = &[
    ("MaxTurnsExceeded", FailureCategory::MaxTurnsExceeded),
    ("GuardrailViolation", FailureCategory::GuardrailViolation),
    ("InputGuardrailTripwireTriggered", FailureCategory::GuardrailViolation),
    ("OutputGuardrailTripwireTriggered", FailureCategory::GuardrailViolation),
    ("ToolInvocationError", FailureCategory::ToolInvocationError),
    ("ToolCallError", FailureCategory::ToolInvocationError),
];

/// Classify an executor error.
///
/// Typed variants map directly to their category; `Execution` errors are
/// matched by the category name they mention.
pub fn classify(error: &ExecutorError) -> Classification {
    let category = match error {
        ExecutorError::MaxTurnsExceeded(_) => FailureCategory::MaxTurnsExceeded,
        ExecutorError::GuardrailViolation(_) => FailureCategory::GuardrailViolation,
        ExecutorError::ToolInvocation(_) => FailureCategory::ToolInvocationError,
        ExecutorError::Timeout(_) => FailureCategory::Timeout,
        ExecutorError::Cancelled(_) => FailureCategory::Cancelled,
        ExecutorError::NotAvailable(_) => FailureCategory::ExecutorUnavailable,
        ExecutorError::InvalidOutput(_) => FailureCategory::InvalidOutput,
        ExecutorError::Execution(message) => category_from_message(message),
    };
    Classification::new(category)
}

/// Match a message against the known category names.
pub fn category_from_message(message: &str) -> FailureCategory {
    CATEGORY_NAMES
        .iter()
        .find(|(name, _)| message.contains(name))
        .map_or(FailureCategory::Unknown, |(_, category)| *category)
}

/// Substrings (lowercase) that mark an environment problem no retry or
/// rework can fix.
///
/// Four families: authentication (including `unauthorized` and a rejected
/// API key), permissions, filesystem errors, and an unreachable network
/// (including a refused connection).
const FATAL_PATTERNS: &[&str] = &[
    "authentication",
    "unauthorized",
    "invalid api key",
    "permission denied",
    "access denied",
    "eacces",
    "eperm",
    "filesystem",
    "read-only file system",
    "no space left on device",
    "enospc",
    "network unreachable",
    "network is unreachable",
    "enetunreach",
    "connection refused",
    "econnrefused",
];

/// Whether `message` reports an operational failure that must stop the run.
pub fn is_fatal(message: &str) -> bool {
    let lower = message.to_lowercase();
    FATAL_PATTERNS.iter().any(|pattern| lower.contains(pattern))
}
