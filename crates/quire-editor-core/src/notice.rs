//! Dismissible banner notices shown by the surface.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub id: u64,
    pub level: NoticeLevel,
    pub message: String,
    pub detail: Option<String>,
}

/// Message used whenever a recovery throws away unconfirmed input.
pub const PENDING_INPUT_DISCARDED: &str = "pending input discarded";

#[derive(Debug, Clone, Default)]
pub struct Notices {
    active: Vec<Notice>,
    next_id: u64,
}

impl Notices {
    pub fn push(
        &mut self,
        level: NoticeLevel,
        message: impl Into<String>,
        detail: Option<String>,
    ) -> u64 {
        self.next_id += 1;
        let notice = Notice {
            id: self.next_id,
            level,
            message: message.into(),
            detail,
        };
        match level {
            NoticeLevel::Error => {
                tracing::error!(target: "quire::surface", text = %notice.message, detail = ?notice.detail, "notice raised")
            }
            NoticeLevel::Warning => {
                tracing::warn!(target: "quire::surface", text = %notice.message, detail = ?notice.detail, "notice raised")
            }
            NoticeLevel::Info => {
                tracing::info!(target: "quire::surface", text = %notice.message, detail = ?notice.detail, "notice raised")
            }
        }
        self.active.push(notice);
        self.next_id
    }

    /// Remove a notice. Returns false if it was already gone.
    pub fn dismiss(&mut self, id: u64) -> bool {
        let before = self.active.len();
        self.active.retain(|n| n.id != id);
        self.active.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notice> {
        self.active.iter()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn contains_message(&self, message: &str) -> bool {
        self.active.iter().any(|n| n.message == message)
    }
}
