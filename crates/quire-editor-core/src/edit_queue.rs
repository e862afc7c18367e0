//! Edit queue and version tracker.
//!
//! Local edits are applied optimistically and queued until the authority
//! confirms them. Every edit is based on the version the document will have
//! once everything queued ahead of it is accepted:
//! `base_version = last_confirmed + pending.len()`.
//!
//! Anything the queue cannot reconcile without guessing (out-of-order
//! confirmation, any rejection, an external patch while edits are pending,
//! a skipped version) clears the queue and asks for a full resync.

use std::collections::VecDeque;

use quire_common::RequestIdGenerator;
use quire_protocol::{EditRejection, RequestId, TextChange};
use thiserror::Error;

use crate::text::{TextBuffer, apply_changes};

/// An edit submitted to the authority and not yet answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEdit {
    pub request_id: RequestId,
    pub base_version: u64,
    pub changes: Vec<TextChange>,
}

/// Why the queue gave up and needs a resync.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResyncCause {
    #[error("confirmation for {got} arrived while {expected:?} was next")]
    OutOfOrderConfirmation {
        expected: Option<RequestId>,
        got: RequestId,
    },
    #[error("confirmation for {request_id} carried version {version}, not after {last_confirmed}")]
    StaleConfirmation {
        request_id: RequestId,
        version: u64,
        last_confirmed: u64,
    },
    #[error("edit {request_id} rejected: {}", .reason.as_str())]
    Rejected {
        request_id: RequestId,
        reason: EditRejection,
    },
    #[error("rejection for {got} arrived while {expected:?} was next")]
    OutOfOrderRejection {
        expected: Option<RequestId>,
        got: RequestId,
    },
    #[error("external change to version {version} arrived with unconfirmed local edits")]
    ExternalChangeWhilePending { version: u64 },
    #[error("patch for version {got} skipped from {last_confirmed}")]
    VersionGap { last_confirmed: u64, got: u64 },
    #[error("patch for version {version} does not fit the local text")]
    PatchDoesNotApply { version: u64 },
    #[error("malformed message from the authority")]
    Protocol,
}

/// What the queue did with an authority answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueOutcome {
    Confirmed { request_id: RequestId, version: u64 },
    PatchApplied { version: u64 },
    /// A patch for a version already seen.
    Ignored,
    /// The queue was cleared; `discarded` unconfirmed edits were dropped.
    ResyncRequired { cause: ResyncCause, discarded: usize },
}

#[derive(Debug, Clone)]
pub struct EditQueue {
    last_confirmed: u64,
    pending: VecDeque<PendingEdit>,
    ids: RequestIdGenerator,
}

impl EditQueue {
    pub fn new(version: u64) -> Self {
        Self {
            last_confirmed: version,
            pending: VecDeque::new(),
            ids: RequestIdGenerator::new("r"),
        }
    }

    pub fn last_confirmed(&self) -> u64 {
        self.last_confirmed
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingEdit> {
        self.pending.iter()
    }

    /// The base version the next submitted edit will carry.
    pub fn next_base_version(&self) -> u64 {
        self.last_confirmed + self.pending.len() as u64
    }

    /// Queue an edit that has already been applied to the local buffer.
    pub fn submit(&mut self, changes: Vec<TextChange>) -> PendingEdit {
        let edit = PendingEdit {
            request_id: self.ids.next_id(),
            base_version: self.next_base_version(),
            changes,
        };
        tracing::debug!(
            target: "quire::sync",
            request_id = %edit.request_id,
            base_version = edit.base_version,
            queued = self.pending.len() + 1,
            "edit submitted"
        );
        self.pending.push_back(edit.clone());
        edit
    }

    fn give_up(&mut self, cause: ResyncCause) -> QueueOutcome {
        let discarded = self.pending.len();
        self.pending.clear();
        tracing::warn!(target: "quire::sync", %cause, discarded, "resync required");
        QueueOutcome::ResyncRequired { cause, discarded }
    }

    /// Clear the queue for a resync not caused by the queue itself.
    pub fn force_resync(&mut self, cause: ResyncCause) -> QueueOutcome {
        self.give_up(cause)
    }

    pub fn on_confirmed(&mut self, request_id: &str, version: u64) -> QueueOutcome {
        let head = self.pending.front().map(|e| e.request_id.clone());
        if head.as_deref() != Some(request_id) {
            return self.give_up(ResyncCause::OutOfOrderConfirmation {
                expected: head,
                got: request_id.into(),
            });
        }
        if version <= self.last_confirmed {
            return self.give_up(ResyncCause::StaleConfirmation {
                request_id: request_id.into(),
                version,
                last_confirmed: self.last_confirmed,
            });
        }

        self.pending.pop_front();
        self.last_confirmed = version;
        tracing::debug!(target: "quire::sync", request_id, version, "edit confirmed");
        QueueOutcome::Confirmed {
            request_id: request_id.into(),
            version,
        }
    }

    /// Any rejection means the local buffer and the authority diverged.
    pub fn on_rejected(&mut self, request_id: &str, reason: EditRejection) -> QueueOutcome {
        let head = self.pending.front().map(|e| e.request_id.clone());
        if head.as_deref() != Some(request_id) {
            return self.give_up(ResyncCause::OutOfOrderRejection {
                expected: head,
                got: request_id.into(),
            });
        }
        // the rejected edit is already in the local buffer, so it is lost too
        self.give_up(ResyncCause::Rejected {
            request_id: request_id.into(),
            reason,
        })
    }

    /// Apply a change that originated elsewhere.
    ///
    /// Never rebases local edits over it: with edits pending, the queue is
    /// discarded and a resync is required instead.
    pub fn on_external_patch<B: TextBuffer + ?Sized>(
        &mut self,
        buffer: &mut B,
        version: u64,
        changes: &[TextChange],
    ) -> QueueOutcome {
        if version <= self.last_confirmed {
            tracing::debug!(
                target: "quire::sync",
                version,
                last_confirmed = self.last_confirmed,
                "ignoring patch for a version already seen"
            );
            return QueueOutcome::Ignored;
        }
        if self.has_pending() {
            return self.give_up(ResyncCause::ExternalChangeWhilePending { version });
        }
        if version != self.last_confirmed + 1 {
            return self.give_up(ResyncCause::VersionGap {
                last_confirmed: self.last_confirmed,
                got: version,
            });
        }
        if let Err(err) = apply_changes(buffer, changes) {
            tracing::warn!(target: "quire::sync", %err, version, "patch rejected by local buffer");
            return self.give_up(ResyncCause::PatchDoesNotApply { version });
        }

        self.last_confirmed = version;
        tracing::debug!(target: "quire::sync", version, changes = changes.len(), "patch applied");
        QueueOutcome::PatchApplied { version }
    }

    /// Replace the buffer wholesale. Returns how many pending edits were lost.
    pub fn on_resync<B: TextBuffer + ?Sized>(
        &mut self,
        buffer: &mut B,
        text: &str,
        version: u64,
    ) -> usize {
        let discarded = self.pending.len();
        self.pending.clear();
        buffer.set_text(text);
        self.last_confirmed = version;
        tracing::info!(target: "quire::sync", version, discarded, "document resynchronized");
        discarded
    }
}
