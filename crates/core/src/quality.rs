//! Quality signals read from stage payloads.
//!
//! Stage outputs are opaque to the orchestrator except for two booleans:
//! did verification report failed checks, and did review report an issue
//! at the highest severity. Both are injected predicates so payload shapes
//! stay a collaborator concern.

use pdca_protocol::stage_models::Stage;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A boolean extracted from a stage payload.
pub type PayloadPredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Severity label treated as the highest.
pub const HIGHEST_SEVERITY: &str = "critical";

/// The inputs of the rework (PDCA) decision.
#[derive(Clone)]
pub struct QualitySignals {
    /// Stage whose payload carries check results.
    pub verification_stage: Stage,
    /// Stage whose payload carries review issues.
    pub review_stage: Stage,
    pub has_failed_checks: PayloadPredicate,
    pub has_high_severity_issue: PayloadPredicate,
}

impl Default for QualitySignals {
    fn default() -> Self {
        Self {
            verification_stage: Stage::Verify,
            review_stage: Stage::Review,
            has_failed_checks: Arc::new(default_has_failed_checks),
            has_high_severity_issue: Arc::new(default_has_high_severity_issue),
        }
    }
}

impl fmt::Debug for QualitySignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QualitySignals")
            .field("verification_stage", &self.verification_stage)
            .field("review_stage", &self.review_stage)
            .finish_non_exhaustive()
    }
}

impl QualitySignals {
    pub fn with_failed_checks<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.has_failed_checks = Arc::new(predicate);
        self
    }

    pub fn with_high_severity_issue<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.has_high_severity_issue = Arc::new(predicate);
        self
    }

    /// The iteration predicate, applied to the payload `stage` just produced.
    ///
    /// Only the verification and review stages can call for rework; a
    /// stale result from an earlier pass is never consulted, since every
    /// pass re-runs those stages before they are judged again.
    pub fn needs_rework(&self, stage: Stage, payload: &Value) -> bool {
        (stage == self.verification_stage && (self.has_failed_checks)(payload))
            || (stage == self.review_stage && (self.has_high_severity_issue)(payload))
    }
}

/// Understands `failed_checks: [...]`, `failed`/`failed_count: n`, and
/// `checks: [{passed: false}, ...]`.
pub fn default_has_failed_checks(payload: &Value) -> bool {
    if payload
        .get("failed_checks")
        .and_then(Value::as_array)
        .is_some_and(|checks| !checks.is_empty())
    {
        return true;
    }

    if ["failed", "failed_count"].iter().any(|key| {
        payload
            .get(*key)
            .and_then(Value::as_u64)
            .is_some_and(|count| count > 0)
    }) {
        return true;
    }

    payload
        .get("checks")
        .and_then(Value::as_array)
        .is_some_and(|checks| {
            checks
                .iter()
                .any(|check| check.get("passed").and_then(Value::as_bool) == Some(false))
        })
}

/// Understands `issues: [{severity: "critical"}, ...]`.
pub fn default_has_high_severity_issue(payload: &Value) -> bool {
    payload
        .get("issues")
        .and_then(Value::as_array)
        .is_some_and(|issues| {
            issues.iter().any(|issue| {
                issue
                    .get("severity")
                    .and_then(Value::as_str)
                    .is_some_and(|severity| severity.eq_ignore_ascii_case(HIGHEST_SEVERITY))
            })
        })
}
