//! Requester half of the selection bridge.
//!
//! A host command that needs the surface's selection sends
//! `REQUEST_SELECTION` and awaits the matching `SELECTION_RESULT`. The wait
//! is bounded; a command whose request times out must fail instead of
//! carrying on with a default selection.

use std::collections::HashMap;
use std::time::Duration;

use quire_common::RequestIdGenerator;
use quire_protocol::{HostMessage, RequestId, SurfaceMessage};
use tokio::sync::{mpsc, oneshot};

use crate::coordinator::SurfaceId;
use crate::error::BridgeError;

/// A surface's answer to a selection request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionAnswer {
    pub request_id: RequestId,
    /// Version the offsets refer to, counting the surface's queued edits.
    pub base_version: u64,
    pub from: usize,
    pub to: usize,
    pub text: String,
    /// Unconfirmed edits were queued on the surface; treat as advisory.
    pub stale: bool,
}

impl SelectionAnswer {
    pub fn from_message(message: SurfaceMessage) -> Option<Self> {
        match message {
            SurfaceMessage::SelectionResult {
                request_id,
                base_version,
                from,
                to,
                text,
                stale,
            } => Some(Self {
                request_id,
                base_version,
                from,
                to,
                text,
                stale,
            }),
            _ => None,
        }
    }

    /// Refuse an answer whose offsets refer to another version.
    pub fn ensure_current(&self, current_version: u64) -> Result<(), BridgeError> {
        if self.base_version != current_version {
            tracing::warn!(
                target: "quire::bridge",
                request_id = %self.request_id,
                base_version = self.base_version,
                current_version,
                "selection answer is stale"
            );
            return Err(BridgeError::StaleSelection {
                base_version: self.base_version,
                current: current_version,
            });
        }
        Ok(())
    }
}

/// Open selection requests, keyed by request id.
#[derive(Debug)]
pub struct SelectionBridge {
    ids: RequestIdGenerator,
    waiting: HashMap<RequestId, (SurfaceId, oneshot::Sender<SelectionAnswer>)>,
}

impl Default for SelectionBridge {
    fn default() -> Self {
        Self {
            ids: RequestIdGenerator::new("sel-"),
            waiting: HashMap::new(),
        }
    }
}

impl SelectionBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send `REQUEST_SELECTION` over `channel` and register a wait bounded
    /// by `timeout`.
    pub fn request(
        &mut self,
        surface: &SurfaceId,
        channel: &mpsc::UnboundedSender<HostMessage>,
        timeout: Duration,
    ) -> Result<PendingSelection, BridgeError> {
        self.prune();
        let request_id = self.ids.next_id();
        channel
            .send(HostMessage::RequestSelection {
                request_id: request_id.clone(),
            })
            .map_err(|_| BridgeError::Detached(surface.clone()))?;

        let (tx, rx) = oneshot::channel();
        self.waiting
            .insert(request_id.clone(), (surface.clone(), tx));
        tracing::debug!(target: "quire::bridge", %surface, %request_id, "selection requested");
        Ok(PendingSelection {
            request_id,
            surface: surface.clone(),
            timeout,
            rx,
        })
    }

    /// Hand an answer to its waiter. Answers for unknown or abandoned
    /// requests, or from the wrong surface, are dropped.
    pub fn complete(&mut self, surface: &SurfaceId, answer: SelectionAnswer) -> bool {
        let Some((expected, tx)) = self.waiting.remove(&answer.request_id) else {
            tracing::warn!(
                target: "quire::bridge",
                %surface,
                request_id = %answer.request_id,
                "selection answer for unknown request"
            );
            return false;
        };
        if expected != *surface {
            tracing::warn!(
                target: "quire::bridge",
                %surface,
                %expected,
                request_id = %answer.request_id,
                "selection answer from the wrong surface"
            );
            self.waiting.insert(answer.request_id.clone(), (expected, tx));
            return false;
        }
        let request_id = answer.request_id.clone();
        if tx.send(answer).is_err() {
            tracing::debug!(target: "quire::bridge", %request_id, "selection answered after the requester gave up");
            return false;
        }
        true
    }

    /// Drop every wait on `surface`; their requesters see `Detached`.
    pub fn forget_surface(&mut self, surface: &SurfaceId) {
        self.waiting.retain(|_, (owner, _)| owner != surface);
    }

    /// Requests still being waited on.
    pub fn waiting(&mut self) -> usize {
        self.prune();
        self.waiting.len()
    }

    // a requester that timed out dropped its receiver
    fn prune(&mut self) {
        self.waiting.retain(|_, (_, tx)| !tx.is_closed());
    }
}

/// An issued selection request.
#[derive(Debug)]
pub struct PendingSelection {
    request_id: RequestId,
    surface: SurfaceId,
    timeout: Duration,
    rx: oneshot::Receiver<SelectionAnswer>,
}

impl PendingSelection {
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait for the answer, failing once the request's timeout elapses.
    pub async fn wait(self) -> Result<SelectionAnswer, BridgeError> {
        let timeout = self.timeout;
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(answer)) => Ok(answer),
            Ok(Err(_)) => Err(BridgeError::Detached(self.surface)),
            Err(_) => {
                tracing::warn!(
                    target: "quire::bridge",
                    surface = %self.surface,
                    request_id = %self.request_id,
                    ?timeout,
                    "selection request timed out"
                );
                Err(BridgeError::Timeout {
                    request_id: self.request_id,
                    after: timeout,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(request_id: &str, base_version: u64) -> SelectionAnswer {
        SelectionAnswer {
            request_id: request_id.into(),
            base_version,
            from: 0,
            to: 3,
            text: "abc".into(),
            stale: false,
        }
    }

    #[tokio::test]
    async fn test_answer_completes_request() {
        let mut bridge = SelectionBridge::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let surface = SurfaceId::new("left");
        let pending = bridge.request(&surface, &tx, Duration::from_secs(1)).unwrap();
        assert_eq!(
            rx.recv().await,
            Some(HostMessage::RequestSelection {
                request_id: "sel-1".into()
            })
        );

        assert!(bridge.complete(&surface, answer("sel-1", 4)));
        let got = pending.wait().await.unwrap();
        assert_eq!(got.text, "abc");
        assert_eq!(got.ensure_current(4), Ok(()));
        assert_eq!(
            got.ensure_current(5),
            Err(BridgeError::StaleSelection {
                base_version: 4,
                current: 5
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_abandons_request() {
        let mut bridge = SelectionBridge::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let surface = SurfaceId::new("left");
        let pending = bridge.request(&surface, &tx, Duration::from_secs(3)).unwrap();

        let err = pending.wait().await.unwrap_err();
        assert!(matches!(err, BridgeError::Timeout { ref request_id, .. } if request_id == "sel-1"));
        assert_eq!(bridge.waiting(), 0);
        // a late answer is ignored
        assert!(!bridge.complete(&surface, answer("sel-1", 0)));
    }

    #[tokio::test]
    async fn test_unknown_and_misrouted_answers_ignored() {
        let mut bridge = SelectionBridge::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let left = SurfaceId::new("left");
        let _pending = bridge.request(&left, &tx, Duration::from_secs(1)).unwrap();

        assert!(!bridge.complete(&left, answer("sel-9", 0)));
        assert!(!bridge.complete(&SurfaceId::new("right"), answer("sel-1", 0)));
        assert_eq!(bridge.waiting(), 1);
    }

    #[tokio::test]
    async fn test_detached_surface_fails_waiter() {
        let mut bridge = SelectionBridge::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let left = SurfaceId::new("left");
        let pending = bridge.request(&left, &tx, Duration::from_secs(1)).unwrap();
        bridge.forget_surface(&left);
        assert_eq!(
            pending.wait().await,
            Err(BridgeError::Detached(left))
        );
    }
}
