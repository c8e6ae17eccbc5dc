//! Approval gate for human-in-the-loop decisions.
//!
//! The gate holds no state of its own: suspension bookkeeping lives in
//! `ProjectContext` (`request_approval` / `resolve_approval`). The gate only
//! answers "approved or not" for one request, either from policy or by
//! asking an injected [`ApprovalHandler`].

use crate::state::context::ProjectContext;
use async_trait::async_trait;
use pdca_protocol::stage_models::Stage;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// How the gate behaves when nobody is asked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApprovalPolicy {
    /// Approve everything without consulting the handler.
    pub auto_approve: bool,

    /// Approve (with a warning) when no handler is installed.
    ///
    /// When false, a missing handler declines.
    pub fail_open: bool,
}

impl ApprovalPolicy {
    pub fn auto_approve() -> Self {
        Self {
            auto_approve: true,
            fail_open: false,
        }
    }
}

/// One approval decision to be made.
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub run_id: Uuid,
    pub step_id: String,
    pub stage: Stage,
    pub message: String,
    pub payload: serde_json::Value,
}

/// Decides approval requests on behalf of the hosting application.
///
/// `decide` may take as long as a human needs; the orchestrator imposes no
/// timeout on it.
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    async fn decide(&self, request: &ApprovalRequest, snapshot: &ProjectContext) -> bool;
}

/// Gives the same answer to every request.
#[derive(Debug, Clone, Copy)]
pub struct StaticApproval(pub bool);

#[async_trait]
impl ApprovalHandler for StaticApproval {
    async fn decide(&self, _request: &ApprovalRequest, _snapshot: &ProjectContext) -> bool {
        self.0
    }
}

/// A request forwarded to whoever owns the receiving end of a
/// [`ChannelApprovalHandler`].
#[derive(Debug)]
pub struct ApprovalTicket {
    pub request: ApprovalRequest,
    pub snapshot: ProjectContext,
    pub reply: oneshot::Sender<bool>,
}

/// Forwards each request over a channel and waits for the reply.
///
/// A dropped receiver or reply sender counts as a decline.
#[derive(Clone)]
pub struct ChannelApprovalHandler {
    tx: mpsc::Sender<ApprovalTicket>,
}

impl ChannelApprovalHandler {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<ApprovalTicket>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ApprovalHandler for ChannelApprovalHandler {
    async fn decide(&self, request: &ApprovalRequest, snapshot: &ProjectContext) -> bool {
        let (reply, answer) = oneshot::channel();
        let ticket = ApprovalTicket {
            request: request.clone(),
            snapshot: snapshot.snapshot(),
            reply,
        };

        if self.tx.send(ticket).await.is_err() {
            tracing::warn!(step_id = request.step_id.as_str(), "approval channel closed, declining");
            return false;
        }

        answer.await.unwrap_or_else(|_| {
            tracing::warn!(step_id = request.step_id.as_str(), "approval reply dropped, declining");
            false
        })
    }
}

/// Suspension point in front of gated steps.
#[derive(Clone, Default)]
pub struct ApprovalGate {
    handler: Option<Arc<dyn ApprovalHandler>>,
    policy: ApprovalPolicy,
}

impl ApprovalGate {
    pub fn new(policy: ApprovalPolicy) -> Self {
        Self {
            handler: None,
            policy,
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn ApprovalHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn policy(&self) -> ApprovalPolicy {
        self.policy
    }

    pub fn handler(&self) -> Option<Arc<dyn ApprovalHandler>> {
        self.handler.clone()
    }

    /// Decide `request`.
    ///
    /// 1. `auto_approve` approves without suspending.
    /// 2. An installed handler is asked and its answer is final.
    /// 3. Otherwise `fail_open` decides.
    pub async fn await_decision(&self, request: &ApprovalRequest, snapshot: &ProjectContext) -> bool {
        if self.policy.auto_approve {
            tracing::debug!(step_id = request.step_id.as_str(), "auto-approved");
            return true;
        }

        match &self.handler {
            Some(handler) => handler.decide(request, snapshot).await,
            None if self.policy.fail_open => {
                tracing::warn!(
                    step_id = request.step_id.as_str(),
                    "no approval handler installed, approving (fail-open)"
                );
                true
            }
            None => {
                tracing::warn!(
                    step_id = request.step_id.as_str(),
                    "no approval handler installed, declining"
                );
                false
            }
        }
    }
}
