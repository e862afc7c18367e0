//! The authoritative document, as the coordinator sees it.

use std::collections::VecDeque;

use quire_protocol::{SmolStr, TextChange, apply_to_string};

use crate::error::HostApplyError;

/// A change the host reports after it happened, whoever caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChange {
    pub version: u64,
    pub changes: Vec<TextChange>,
}

/// Host-side document primitive.
///
/// Applying an edit does not confirm it. The host reports every change,
/// including ones it applied on the coordinator's behalf, through
/// `take_changes` (or by calling `SyncCoordinator::on_document_changed`
/// directly), and the version bumps by one per change.
pub trait HostDocument {
    fn uri(&self) -> &str;
    fn text(&self) -> String;
    fn version(&self) -> u64;
    fn apply_edit(&mut self, changes: &[TextChange]) -> Result<(), HostApplyError>;

    /// Change notifications raised since the last call, oldest first.
    fn take_changes(&mut self) -> Vec<DocumentChange> {
        Vec::new()
    }
}

impl<T: HostDocument + ?Sized> HostDocument for Box<T> {
    fn uri(&self) -> &str {
        (**self).uri()
    }

    fn text(&self) -> String {
        (**self).text()
    }

    fn version(&self) -> u64 {
        (**self).version()
    }

    fn apply_edit(&mut self, changes: &[TextChange]) -> Result<(), HostApplyError> {
        (**self).apply_edit(changes)
    }

    fn take_changes(&mut self) -> Vec<DocumentChange> {
        (**self).take_changes()
    }
}

/// In-memory document with a queued change feed.
#[derive(Debug, Clone)]
pub struct MemoryDocument {
    uri: SmolStr,
    text: String,
    version: u64,
    notifications: VecDeque<DocumentChange>,
    rejecting: bool,
}

impl MemoryDocument {
    pub fn new(uri: impl Into<SmolStr>, text: impl Into<String>) -> Self {
        Self::at_version(uri, text, 0)
    }

    pub fn at_version(uri: impl Into<SmolStr>, text: impl Into<String>, version: u64) -> Self {
        Self {
            uri: uri.into(),
            text: text.into(),
            version,
            notifications: VecDeque::new(),
            rejecting: false,
        }
    }

    /// Make every following `apply_edit` fail, as a read-only host would.
    pub fn set_rejecting(&mut self, rejecting: bool) {
        self.rejecting = rejecting;
    }

    /// An edit that did not come from any surface (another tool, a
    /// programmatic change). Returns the new version.
    pub fn external_edit(&mut self, changes: Vec<TextChange>) -> Result<u64, HostApplyError> {
        self.commit(changes)
    }

    pub fn pending_notifications(&self) -> usize {
        self.notifications.len()
    }

    fn commit(&mut self, changes: Vec<TextChange>) -> Result<u64, HostApplyError> {
        let Some(text) = apply_to_string(&self.text, &changes) else {
            let doc_len = self.text.chars().count();
            let bad = changes
                .iter()
                .find(|c| c.end() > doc_len)
                .map_or((0, 0), |c| (c.offset, c.length));
            return Err(HostApplyError::OutOfBounds {
                offset: bad.0,
                length: bad.1,
                doc_len,
            });
        };
        self.text = text;
        self.version += 1;
        self.notifications.push_back(DocumentChange {
            version: self.version,
            changes,
        });
        Ok(self.version)
    }
}

impl HostDocument for MemoryDocument {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn text(&self) -> String {
        self.text.clone()
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn apply_edit(&mut self, changes: &[TextChange]) -> Result<(), HostApplyError> {
        if self.rejecting {
            return Err(HostApplyError::Refused {
                reason: "document is read-only".to_string(),
            });
        }
        self.commit(changes.to_vec()).map(|_| ())
    }

    fn take_changes(&mut self) -> Vec<DocumentChange> {
        self.notifications.drain(..).collect()
    }
}
