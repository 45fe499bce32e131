//! Human-in-the-loop approval gate.
//!
//! Side-effecting actions (file writes, deletes, shell commands) ask the gate
//! before running. Each request waits in a FIFO queue until a human approves
//! or rejects it, the deadline passes, or the caller cancels. Other agents
//! keep working while a request waits.
//!
//! A UI or CLI learns about new requests through [`ApprovalGate::subscribe`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What kind of side effect is being approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalKind {
    FileWrite,
    CommandExec,
    FileDelete,
}

impl std::fmt::Display for ApprovalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ApprovalKind::FileWrite => "file_write",
            ApprovalKind::CommandExec => "command_exec",
            ApprovalKind::FileDelete => "file_delete",
        };
        f.write_str(s)
    }
}

/// A request waiting for a decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub kind: ApprovalKind,
    pub description: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// How an approval request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalOutcome {
    Approved,
    Rejected,
    /// The deadline passed with no decision.
    Expired,
    /// The caller gave up, or the gate went away.
    Cancelled,
}

impl ApprovalOutcome {
    pub fn is_approved(self) -> bool {
        matches!(self, ApprovalOutcome::Approved)
    }
}

impl From<bool> for ApprovalOutcome {
    fn from(approved: bool) -> Self {
        if approved {
            ApprovalOutcome::Approved
        } else {
            ApprovalOutcome::Rejected
        }
    }
}

/// Broadcast to UI observers.
#[derive(Debug, Clone)]
pub enum ApprovalEvent {
    Requested(ApprovalRequest),
    Resolved { id: String, outcome: ApprovalOutcome },
}

struct Pending {
    request: ApprovalRequest,
    responder: oneshot::Sender<bool>,
}

pub struct ApprovalGate {
    require_approval: AtomicBool,
    default_timeout: Option<Duration>,
    queue: Mutex<VecDeque<Pending>>,
    events: broadcast::Sender<ApprovalEvent>,
}

impl ApprovalGate {
    pub fn new(require_approval: bool) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            require_approval: AtomicBool::new(require_approval),
            default_timeout: None,
            queue: Mutex::new(VecDeque::new()),
            events,
        }
    }

    pub fn from_config(config: &agentbus_config::ApprovalConfig) -> Self {
        Self::new(config.require_approval).with_default_timeout(config.timeout())
    }

    /// Deadline used by [`ApprovalGate::request_approval`]. `None` waits forever.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout
    }

    pub fn set_require_approval(&self, required: bool) {
        self.require_approval.store(required, Ordering::SeqCst);
    }

    pub fn requires_approval(&self) -> bool {
        self.require_approval.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ApprovalEvent> {
        self.events.subscribe()
    }

    /// Snapshot of waiting requests, oldest first.
    pub fn pending(&self) -> Vec<ApprovalRequest> {
        self.lock().iter().map(|p| p.request.clone()).collect()
    }

    /// The oldest waiting request.
    pub fn head(&self) -> Option<ApprovalRequest> {
        self.lock().front().map(|p| p.request.clone())
    }

    /// Ask for approval using the default deadline and no cancellation.
    pub async fn request_approval(
        &self,
        kind: ApprovalKind,
        description: impl Into<String>,
        data: serde_json::Value,
    ) -> ApprovalOutcome {
        let never = CancellationToken::new();
        self.request_approval_with(kind, description, data, self.default_timeout, &never)
            .await
    }

    /// Ask for approval and wait for a decision.
    ///
    /// With approval disabled this returns `Approved` at once and nothing is
    /// queued. Otherwise the request stays pending until approved, rejected,
    /// `timeout` elapses, or `cancel` fires. Expired and cancelled requests
    /// are removed from the queue.
    pub async fn request_approval_with(
        &self,
        kind: ApprovalKind,
        description: impl Into<String>,
        data: serde_json::Value,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> ApprovalOutcome {
        if !self.requires_approval() {
            return ApprovalOutcome::Approved;
        }

        let request = ApprovalRequest {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            description: description.into(),
            data,
            created_at: Utc::now(),
        };
        let id = request.id.clone();
        let (responder, mut rx) = oneshot::channel();

        self.lock().push_back(Pending {
            request: request.clone(),
            responder,
        });
        info!(id = %id, kind = %kind, description = %request.description, "Approval requested");
        let _ = self.events.send(ApprovalEvent::Requested(request));

        // Dropping the future withdraws the request.
        let _withdraw = Withdraw { gate: self, id: &id };

        tokio::select! {
            decision = &mut rx => match decision {
                Ok(approved) => ApprovalOutcome::from(approved),
                Err(_) => ApprovalOutcome::Cancelled,
            },
            _ = cancel.cancelled() => self.abandon(&id, &mut rx, ApprovalOutcome::Cancelled),
            _ = deadline(timeout) => self.abandon(&id, &mut rx, ApprovalOutcome::Expired),
        }
    }

    /// Approve a pending request. Unknown ids are a no-op returning `false`.
    pub fn approve(&self, id: &str) -> bool {
        self.resolve(id, true)
    }

    /// Reject a pending request. Unknown ids are a no-op returning `false`.
    pub fn reject(&self, id: &str) -> bool {
        self.resolve(id, false)
    }

    fn resolve(&self, id: &str, approved: bool) -> bool {
        let Some(pending) = self.take(id) else {
            debug!(id = %id, "No pending approval with this id");
            return false;
        };
        let outcome = ApprovalOutcome::from(approved);
        info!(id = %id, ?outcome, "Approval resolved");
        let _ = pending.responder.send(approved);
        let _ = self.events.send(ApprovalEvent::Resolved {
            id: id.to_string(),
            outcome,
        });
        true
    }

    /// Give up on a request. A decision that raced in first still wins.
    fn abandon(
        &self,
        id: &str,
        rx: &mut oneshot::Receiver<bool>,
        fallback: ApprovalOutcome,
    ) -> ApprovalOutcome {
        if self.take(id).is_none() {
            if let Ok(approved) = rx.try_recv() {
                return ApprovalOutcome::from(approved);
            }
            return fallback;
        }
        if fallback == ApprovalOutcome::Expired {
            warn!(id = %id, "Approval request expired");
        } else {
            info!(id = %id, "Approval request cancelled");
        }
        let _ = self.events.send(ApprovalEvent::Resolved {
            id: id.to_string(),
            outcome: fallback,
        });
        fallback
    }

    fn take(&self, id: &str) -> Option<Pending> {
        let mut queue = self.lock();
        let index = queue.iter().position(|p| p.request.id == id)?;
        queue.remove(index)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Pending>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ApprovalGate {
    fn default() -> Self {
        Self::new(true)
    }
}

struct Withdraw<'a> {
    gate: &'a ApprovalGate,
    id: &'a str,
}

impl Drop for Withdraw<'_> {
    fn drop(&mut self) {
        self.gate.take(self.id);
    }
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending::<()>().await,
    }
}
