//! The editing surface's session: one open document, its local buffer, the
//! edit queue, render state and everything bound for the authority.
//!
//! Single-threaded by construction. Each call runs to completion; messages
//! for the authority collect in the outbox and are drained with
//! `take_outbox`.

use quire_common::RequestIdGenerator;
use quire_protocol::{
    EditRejection, EditorSettings, HostMessage, RequestId, ResourceKind, ResyncReason, SmolStr,
    SurfaceMessage, TextChange, ThemeKind, decode_host_message,
};

use crate::bridge::answer_selection;
use crate::edit_queue::{EditQueue, QueueOutcome, ResyncCause};
use crate::error::{RenderError, SurfaceError};
use crate::notice::{NoticeLevel, Notices, PENDING_INPUT_DISCARDED};
use crate::render::{
    DecorationSet, LiveRenderer, RenderContext, RenderDiagnostic, Trigger, split_lines,
    task_toggle,
};
use crate::resource::{DocumentImages, ResourceCache};
use crate::text::{EditorRope, TextBuffer, apply_changes};
use crate::types::{Selection, Viewport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for `INIT`.
    Booting,
    Live,
    /// The queue was discarded; local edits wait for `DOC_RESYNC`.
    AwaitingResync,
}

/// A `PREVIEW_RESULT` kept for the surface to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub request_id: RequestId,
    pub title: String,
    pub text: String,
}

pub struct SurfaceSession<B: TextBuffer = EditorRope> {
    state: SessionState,
    document_uri: SmolStr,
    buffer: B,
    queue: EditQueue,
    selection: Selection,
    viewport: Viewport,
    settings: EditorSettings,
    theme: Option<ThemeKind>,
    css: Vec<String>,
    resources: ResourceCache,
    renderer: LiveRenderer,
    diagnostics: Vec<RenderDiagnostic>,
    notices: Notices,
    previews: Vec<Preview>,
    requests: RequestIdGenerator,
    outbox: Vec<SurfaceMessage>,
}

impl SurfaceSession<EditorRope> {
    pub fn new() -> Self {
        Self::with_buffer(EditorRope::new())
    }
}

impl Default for SurfaceSession<EditorRope> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: TextBuffer> SurfaceSession<B> {
    pub fn with_buffer(buffer: B) -> Self {
        Self {
            state: SessionState::Booting,
            document_uri: SmolStr::default(),
            buffer,
            queue: EditQueue::new(0),
            selection: Selection::default(),
            viewport: Viewport::everything(),
            settings: EditorSettings::default(),
            theme: None,
            css: Vec::new(),
            resources: ResourceCache::default(),
            renderer: LiveRenderer::new(),
            diagnostics: Vec::new(),
            notices: Notices::default(),
            previews: Vec::new(),
            requests: RequestIdGenerator::new("q"),
            outbox: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn document_uri(&self) -> &str {
        &self.document_uri
    }

    pub fn text(&self) -> String {
        self.buffer.to_string()
    }

    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    pub fn queue(&self) -> &EditQueue {
        &self.queue
    }

    /// Last version the authority confirmed to this surface.
    pub fn version(&self) -> u64 {
        self.queue.last_confirmed()
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    pub fn theme(&self) -> Option<ThemeKind> {
        self.theme
    }

    pub fn css(&self) -> &[String] {
        &self.css
    }

    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    pub fn dismiss_notice(&mut self, id: u64) -> bool {
        self.notices.dismiss(id)
    }

    pub fn previews(&self) -> &[Preview] {
        &self.previews
    }

    pub fn diagnostics(&self) -> &[RenderDiagnostic] {
        &self.diagnostics
    }

    pub fn resources(&self) -> &ResourceCache {
        &self.resources
    }

    /// Drain messages bound for the authority, oldest first.
    pub fn take_outbox(&mut self) -> Vec<SurfaceMessage> {
        std::mem::take(&mut self.outbox)
    }

    fn require_live(&self) -> Result<(), SurfaceError> {
        match self.state {
            SessionState::Live => Ok(()),
            SessionState::Booting => Err(SurfaceError::NotOpen),
            SessionState::AwaitingResync => Err(SurfaceError::AwaitingResync),
        }
    }

    /// Start (or restart) the session from `INIT`.
    pub fn open(
        &mut self,
        document_uri: SmolStr,
        text: &str,
        version: u64,
        settings: EditorSettings,
        css: Vec<String>,
    ) {
        tracing::info!(
            target: "quire::sync",
            uri = %document_uri,
            version,
            "surface session opened"
        );
        self.document_uri = document_uri;
        self.queue.on_resync(&mut self.buffer, text, version);
        self.resources
            .set_allow_external(settings.allow_external_resources);
        self.settings = settings;
        self.css = css;
        self.selection = Selection::cursor(0);
        self.state = SessionState::Live;
        self.renderer.invalidate(Trigger::TextChanged);
    }

    /// Tell the authority the surface booted.
    pub fn ready(&mut self) {
        self.outbox.push(SurfaceMessage::SurfaceReady);
    }

    /// Report a failure that leaves the surface unusable.
    pub fn boot_error(&mut self, message: impl Into<String>, detail: Option<String>) {
        let message = message.into();
        self.notices
            .push(NoticeLevel::Error, message.clone(), detail.clone());
        self.outbox
            .push(SurfaceMessage::BootError { message, detail });
    }

    /// Validate and handle a raw message. Malformed input is never guessed
    /// at: before `INIT` it is a boot error, afterwards it forces a resync.
    pub fn receive_raw(&mut self, raw: &str) {
        match decode_host_message(raw) {
            Ok(message) => self.handle_message(message),
            Err(err) => {
                tracing::warn!(target: "quire::protocol", %err, "invalid message from authority");
                if self.state == SessionState::Booting {
                    self.boot_error("invalid message from authority", Some(err.to_string()));
                    return;
                }
                self.notices.push(
                    NoticeLevel::Error,
                    "invalid message from authority",
                    Some(err.to_string()),
                );
                let outcome = self.queue.force_resync(ResyncCause::Protocol);
                self.apply_outcome(outcome, &[]);
            }
        }
    }

    pub fn handle_message(&mut self, message: HostMessage) {
        tracing::trace!(target: "quire::protocol", ty = message.type_name(), "host message");
        match message {
            HostMessage::Init {
                document_uri,
                text,
                version,
                settings,
                css_text,
            } => self.open(document_uri, &text, version, settings, css_text),
            HostMessage::SettingsUpdated { settings } => {
                self.resources
                    .set_allow_external(settings.allow_external_resources);
                self.settings = settings;
                self.renderer.invalidate(Trigger::ForceRedraw);
            }
            HostMessage::ThemeChanged { theme_kind } => self.theme = Some(theme_kind),
            HostMessage::CssUpdated { css_text } => self.css = css_text,
            HostMessage::RequestSelection { request_id } => {
                if self.state == SessionState::Booting {
                    tracing::warn!(target: "quire::bridge", %request_id, "selection requested before INIT");
                    return;
                }
                let answer =
                    answer_selection(request_id, &self.queue, &self.buffer, self.selection);
                self.outbox.push(answer);
            }
            HostMessage::DocPatch { version, changes } => {
                if self.state != SessionState::Live {
                    tracing::debug!(target: "quire::sync", version, state = ?self.state, "patch dropped");
                    return;
                }
                let outcome = self
                    .queue
                    .on_external_patch(&mut self.buffer, version, &changes);
                self.apply_outcome(outcome, &changes);
            }
            HostMessage::DocResync {
                text,
                version,
                reason,
            } => self.resync(&text, version, reason),
            HostMessage::ApplyEditResult {
                request_id,
                applied,
                version,
                error,
            } => {
                if self.state != SessionState::Live {
                    tracing::debug!(target: "quire::sync", %request_id, "edit result dropped while resyncing");
                    return;
                }
                let outcome = if applied {
                    self.queue.on_confirmed(&request_id, version)
                } else {
                    let reason = EditRejection::parse(error.as_deref().unwrap_or_default());
                    if reason == EditRejection::ApplyFailed {
                        self.notices.push(
                            NoticeLevel::Error,
                            "the document refused an edit",
                            Some(request_id.to_string()),
                        );
                    }
                    self.queue.on_rejected(&request_id, reason)
                };
                self.apply_outcome(outcome, &[]);
            }
            HostMessage::PreviewResult {
                request_id,
                title,
                text,
            } => self.previews.push(Preview {
                request_id,
                title,
                text,
            }),
            HostMessage::ResourceUriResult {
                request_id,
                ok,
                handle,
                error,
            } => {
                if let Some(trigger) = self.resources.on_result(&request_id, ok, handle, error) {
                    self.renderer.invalidate(trigger);
                }
            }
            HostMessage::CreateAttachmentResult {
                request_id,
                ok,
                error,
            } => {
                if !ok {
                    self.notices.push(
                        NoticeLevel::Error,
                        "attachment could not be created",
                        Some(format!(
                            "{request_id}: {}",
                            error.as_deref().unwrap_or("unknown")
                        )),
                    );
                }
            }
            HostMessage::Error { message, detail } => {
                self.notices.push(NoticeLevel::Error, message, detail);
            }
        }
    }

    fn apply_outcome(&mut self, outcome: QueueOutcome, changes: &[TextChange]) {
        match outcome {
            QueueOutcome::Confirmed { .. } | QueueOutcome::Ignored => {}
            QueueOutcome::PatchApplied { .. } => {
                self.selection = self
                    .selection
                    .map_through(changes)
                    .clamped(self.buffer.len_chars());
                self.renderer.invalidate(Trigger::TextChanged);
            }
            QueueOutcome::ResyncRequired { cause, discarded } => {
                self.state = SessionState::AwaitingResync;
                self.outbox.push(SurfaceMessage::RequestDocResync);
                let (level, message) = if discarded > 0 {
                    (NoticeLevel::Warning, PENDING_INPUT_DISCARDED)
                } else {
                    (NoticeLevel::Info, "resynchronizing with the document")
                };
                self.notices.push(level, message, Some(cause.to_string()));
            }
        }
    }

    fn resync(&mut self, text: &str, version: u64, reason: ResyncReason) {
        let discarded = self.queue.on_resync(&mut self.buffer, text, version);
        if self.state == SessionState::Booting {
            tracing::warn!(target: "quire::sync", "resync before INIT");
        }
        self.state = SessionState::Live;
        self.selection = self.selection.clamped(self.buffer.len_chars());
        self.renderer.invalidate(Trigger::TextChanged);
        if discarded > 0 {
            self.notices.push(
                NoticeLevel::Warning,
                PENDING_INPUT_DISCARDED,
                Some(format!("resync: {}", reason.as_str())),
            );
        }
    }

    /// Apply a local edit and submit it. Returns the request id.
    ///
    /// `selection` is the selection after the edit; when `None` the current
    /// one is mapped through the changes.
    pub fn local_edit(
        &mut self,
        changes: Vec<TextChange>,
        selection: Option<Selection>,
    ) -> Result<RequestId, SurfaceError> {
        self.require_live()?;
        apply_changes(&mut self.buffer, &changes)?;

        let len = self.buffer.len_chars();
        self.selection = match selection {
            Some(sel) => sel.clamped(len),
            None => self.selection.map_through(&changes).clamped(len),
        };

        let edit = self.queue.submit(changes);
        self.outbox.push(SurfaceMessage::ApplyEdit {
            request_id: edit.request_id.clone(),
            base_version: edit.base_version,
            changes: edit.changes,
        });
        self.renderer.invalidate(Trigger::TextChanged);
        Ok(edit.request_id)
    }

    pub fn set_selection(&mut self, selection: Selection) {
        let selection = selection.clamped(self.buffer.len_chars());
        if selection != self.selection {
            self.selection = selection;
            self.renderer.invalidate(Trigger::SelectionChanged);
        }
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        if viewport != self.viewport {
            self.viewport = viewport;
            self.renderer.invalidate(Trigger::ViewportChanged);
        }
    }

    /// Flip the task checkbox on the line starting at `line_start`.
    ///
    /// Returns `Ok(None)` when that line is not a task item.
    pub fn toggle_task(&mut self, line_start: usize) -> Result<Option<RequestId>, SurfaceError> {
        self.require_live()?;
        let text = self.buffer.to_string();
        let toggle = split_lines(&text)
            .iter()
            .find(|line| line.start == line_start)
            .and_then(task_toggle);
        match toggle {
            Some(change) => self.local_edit(vec![change], Some(self.selection)).map(Some),
            None => Ok(None),
        }
    }

    pub fn open_link(&mut self, href: impl Into<String>) {
        self.outbox.push(SurfaceMessage::OpenLink {
            href: href.into(),
            from_uri: self.document_uri.clone(),
        });
    }

    pub fn request_preview(&mut self, href: impl Into<String>) -> RequestId {
        let request_id = self.requests.next_id();
        self.outbox.push(SurfaceMessage::RequestPreview {
            request_id: request_id.clone(),
            href: href.into(),
            from_uri: self.document_uri.clone(),
        });
        request_id
    }

    /// Ask the host to store pasted bytes and insert a reference over the
    /// current selection.
    pub fn paste_attachment(
        &mut self,
        bytes: Vec<u8>,
        filename_hint: Option<String>,
        mime: Option<String>,
        kind: ResourceKind,
    ) -> Result<RequestId, SurfaceError> {
        self.require_live()?;
        let request_id = self.requests.next_id();
        self.outbox.push(SurfaceMessage::CreateAttachment {
            request_id: request_id.clone(),
            base_version: self.queue.next_base_version(),
            from_uri: self.document_uri.clone(),
            insert_from: self.selection.from,
            insert_to: self.selection.to,
            bytes,
            filename_hint,
            mime,
            kind,
        });
        Ok(request_id)
    }

    /// Ask the host to insert an image reference to `target_uri` over the
    /// current selection.
    pub fn insert_image_reference(
        &mut self,
        target_uri: impl Into<String>,
    ) -> Result<RequestId, SurfaceError> {
        self.require_live()?;
        let request_id = self.requests.next_id();
        self.outbox.push(SurfaceMessage::InsertImageReference {
            request_id: request_id.clone(),
            base_version: self.queue.next_base_version(),
            from_uri: self.document_uri.clone(),
            insert_from: self.selection.from,
            insert_to: self.selection.to,
            target_uri: target_uri.into(),
        });
        Ok(request_id)
    }

    /// Current decorations, rebuilt if anything changed since the last call.
    ///
    /// Image references seen for the first time queue resolution requests in
    /// the outbox. A failed pass raises a notice and a `BOOT_ERROR` before
    /// the error is returned.
    pub fn render(&mut self) -> Result<&DecorationSet, RenderError> {
        let text = self.buffer.to_string();
        let ctx = RenderContext {
            selection: self.selection,
            viewport: self.viewport,
            settings: &self.settings,
        };
        let images = DocumentImages {
            cache: &mut self.resources,
            document_uri: &self.document_uri,
        };
        let result = self
            .renderer
            .render(&text, &ctx, images, &mut self.diagnostics);
        self.outbox.extend(self.resources.take_requests());

        match result {
            Ok(set) => Ok(set),
            Err(err) => {
                self.notices
                    .push(NoticeLevel::Error, "rendering failed", Some(err.to_string()));
                self.outbox.push(SurfaceMessage::BootError {
                    message: "render failed".to_string(),
                    detail: Some(err.to_string()),
                });
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(text: &str, version: u64) -> SurfaceSession {
        let mut session = SurfaceSession::new();
        session.open(
            "file:///doc.md".into(),
            text,
            version,
            EditorSettings::default(),
            Vec::new(),
        );
        session
    }

    #[test]
    fn test_edit_before_init_refused() {
        let mut session = SurfaceSession::new();
        let err = session
            .local_edit(vec![TextChange::insert(0, "x")], None)
            .unwrap_err();
        assert!(matches!(err, SurfaceError::NotOpen));
        assert!(session.take_outbox().is_empty());
    }

    #[test]
    fn test_out_of_bounds_local_edit_not_submitted() {
        let mut session = live("abc", 0);
        let err = session
            .local_edit(vec![TextChange::delete(2..10)], None)
            .unwrap_err();
        assert!(matches!(err, SurfaceError::ChangeOutOfBounds { .. }));
        assert_eq!(session.queue().pending_len(), 0);
        assert_eq!(session.text(), "abc");
    }

    #[test]
    fn test_selection_maps_through_patch() {
        let mut session = live("world", 1);
        session.set_selection(Selection::cursor(5));
        session.handle_message(HostMessage::DocPatch {
            version: 2,
            changes: vec![TextChange::insert(0, "hello ")],
        });
        assert_eq!(session.text(), "hello world");
        assert_eq!(session.selection(), Selection::cursor(11));
    }

    #[test]
    fn test_malformed_message_forces_resync() {
        let mut session = live("abc", 0);
        session.receive_raw(r#"{"type":"DOC_PATCH","version":1}"#);
        assert_eq!(session.state(), SessionState::AwaitingResync);
        assert_eq!(session.take_outbox(), vec![SurfaceMessage::RequestDocResync]);
        assert!(session.notices().contains_message("invalid message from authority"));
    }

    #[test]
    fn test_malformed_message_before_init_is_boot_error() {
        let mut session = SurfaceSession::new();
        session.receive_raw("not json");
        let outbox = session.take_outbox();
        assert!(matches!(&outbox[..], [SurfaceMessage::BootError { .. }]));
        assert_eq!(session.state(), SessionState::Booting);
    }

    #[test]
    fn test_edits_paused_while_awaiting_resync() {
        let mut session = live("abc", 0);
        session.local_edit(vec![TextChange::insert(3, "d")], None).unwrap();
        session.handle_message(HostMessage::ApplyEditResult {
            request_id: "r1".into(),
            applied: false,
            version: 4,
            error: Some("version_mismatch".into()),
        });
        assert!(matches!(
            session.local_edit(vec![TextChange::insert(0, "x")], None),
            Err(SurfaceError::AwaitingResync)
        ));

        session.handle_message(HostMessage::DocResync {
            text: "remote".into(),
            version: 4,
            reason: ResyncReason::VersionMismatch,
        });
        assert_eq!(session.state(), SessionState::Live);
        assert_eq!(session.text(), "remote");
        assert!(session.local_edit(vec![TextChange::insert(0, "x")], None).is_ok());
    }

    #[test]
    fn test_apply_failed_raises_error_notice() {
        let mut session = live("abc", 0);
        session.local_edit(vec![TextChange::insert(0, "x")], None).unwrap();
        session.handle_message(HostMessage::ApplyEditResult {
            request_id: "r1".into(),
            applied: false,
            version: 0,
            error: Some("apply_failed".into()),
        });
        assert!(session.notices().contains_message("the document refused an edit"));
        assert!(session.notices().contains_message(PENDING_INPUT_DISCARDED));
        assert_eq!(session.state(), SessionState::AwaitingResync);
    }

    #[test]
    fn test_unknown_rejection_reason_still_resyncs() {
        let mut session = live("abc", 0);
        session.local_edit(vec![TextChange::insert(0, "x")], None).unwrap();
        session.take_outbox();
        session.handle_message(HostMessage::ApplyEditResult {
            request_id: "r1".into(),
            applied: false,
            version: 0,
            error: Some("locked".into()),
        });
        assert_eq!(session.take_outbox(), vec![SurfaceMessage::RequestDocResync]);
    }

    #[test]
    fn test_toggle_task_submits_edit() {
        let mut session = live("- [ ] one\n- [x] two", 3);
        let id = session.toggle_task(10).unwrap();
        assert_eq!(id.as_deref(), Some("r1"));
        assert_eq!(session.text(), "- [ ] one\n- [ ] two");
        assert_eq!(session.toggle_task(4).unwrap(), None);
    }

    #[test]
    fn test_attachment_uses_selection_and_base_version() {
        let mut session = live("abc", 2);
        session.local_edit(vec![TextChange::insert(3, "d")], None).unwrap();
        session.set_selection(Selection { from: 1, to: 3 });
        session.take_outbox();
        let id = session
            .paste_attachment(vec![1, 2], Some("a.png".into()), None, ResourceKind::Image)
            .unwrap();
        let outbox = session.take_outbox();
        assert!(matches!(
            &outbox[..],
            [SurfaceMessage::CreateAttachment { request_id, base_version: 3, insert_from: 1, insert_to: 3, .. }]
                if *request_id == id
        ));
    }

    #[test]
    fn test_settings_update_reopens_blocked_resources() {
        let mut session = live("![x](https://img.dev/x.png)", 0);
        session.render().unwrap();
        assert!(session.take_outbox().is_empty());

        session.handle_message(HostMessage::SettingsUpdated {
            settings: EditorSettings {
                allow_external_resources: true,
                ..EditorSettings::default()
            },
        });
        session.render().unwrap();
        let outbox = session.take_outbox();
        assert!(matches!(&outbox[..], [SurfaceMessage::RequestResourceUri { .. }]));
    }

    #[test]
    fn test_notices_dismissible() {
        let mut session = live("abc", 0);
        session.handle_message(HostMessage::Error {
            message: "disk full".into(),
            detail: None,
        });
        let id = session.notices().iter().next().map(|n| n.id).unwrap();
        assert!(session.dismiss_notice(id));
        assert!(session.notices().is_empty());
    }
}
