//! Authority-side synchronization.
//!
//! One coordinator per document. Every surface edit is checked against the
//! single document version. Accepted edits are applied through the host
//! primitive and confirmed only when the host reports the change: the
//! surface that caused it gets `APPLY_EDIT_RESULT`, every other surface gets
//! the change as `DOC_PATCH`. Changes nobody on this coordinator asked for
//! are patched to everyone.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::Duration;

use quire_common::QuireConfig;
use quire_protocol::{
    EditRejection, EditorSettings, HostMessage, RequestId, ResyncReason, SmolStr, SurfaceMessage,
    TextChange, ThemeKind, decode_surface_message,
};
use tokio::sync::mpsc;

use crate::document::{DocumentChange, HostDocument};
use crate::error::AuthorityError;
use crate::selection::{PendingSelection, SelectionAnswer, SelectionBridge};
use crate::services::{AttachmentRequest, HostServices, NoHostServices};

/// Identifies one attached editing surface.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurfaceId(SmolStr);

impl SurfaceId {
    pub fn new(id: impl Into<SmolStr>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SurfaceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug)]
struct SurfaceLink {
    tx: mpsc::UnboundedSender<HostMessage>,
    /// Edits applied for this surface and not yet reported by the host,
    /// tagged with their apply sequence number.
    pending: VecDeque<(u64, RequestId)>,
}

/// One host apply awaiting its change report. `origin` is `None` for edits
/// the coordinator made itself, which everyone must see.
#[derive(Debug)]
struct InFlight {
    seq: u64,
    origin: Option<SurfaceId>,
}

pub struct SyncCoordinator<D: HostDocument, S: HostServices = NoHostServices> {
    document: D,
    services: S,
    settings: EditorSettings,
    css: Vec<String>,
    selection_timeout: Duration,
    surfaces: BTreeMap<SurfaceId, SurfaceLink>,
    apply_order: VecDeque<InFlight>,
    next_seq: u64,
    selections: SelectionBridge,
}

impl<D: HostDocument> SyncCoordinator<D> {
    pub fn new(document: D, config: &QuireConfig) -> Self {
        Self::with_services(document, NoHostServices, config)
    }
}

impl<D: HostDocument, S: HostServices> SyncCoordinator<D, S> {
    pub fn with_services(document: D, services: S, config: &QuireConfig) -> Self {
        Self {
            document,
            services,
            settings: config.editor_settings(),
            css: Vec::new(),
            selection_timeout: config.selection_timeout,
            surfaces: BTreeMap::new(),
            apply_order: VecDeque::new(),
            next_seq: 0,
            selections: SelectionBridge::new(),
        }
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut D {
        &mut self.document
    }

    pub fn services_mut(&mut self) -> &mut S {
        &mut self.services
    }

    pub fn version(&self) -> u64 {
        self.document.version()
    }

    pub fn selection_timeout(&self) -> Duration {
        self.selection_timeout
    }

    pub fn surfaces(&self) -> impl Iterator<Item = &SurfaceId> {
        self.surfaces.keys()
    }

    /// Edits applied for `surface` that the host has not reported yet.
    pub fn pending_for(&self, surface: &SurfaceId) -> usize {
        self.surfaces.get(surface).map_or(0, |link| link.pending.len())
    }

    /// Register a surface and send it `INIT`. Re-attaching an id replaces
    /// the previous channel.
    pub fn attach(&mut self, surface: SurfaceId) -> mpsc::UnboundedReceiver<HostMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let init = HostMessage::Init {
            document_uri: SmolStr::new(self.document.uri()),
            text: self.document.text(),
            version: self.document.version(),
            settings: self.settings.clone(),
            css_text: self.css.clone(),
        };
        // the receiver is still in hand, so this cannot fail
        let _ = tx.send(init);
        tracing::info!(
            target: "quire::sync",
            %surface,
            uri = self.document.uri(),
            version = self.document.version(),
            "surface attached"
        );
        if self
            .surfaces
            .insert(
                surface.clone(),
                SurfaceLink {
                    tx,
                    pending: VecDeque::new(),
                },
            )
            .is_some()
        {
            tracing::warn!(target: "quire::sync", %surface, "surface re-attached, old channel dropped");
            self.selections.forget_surface(&surface);
        }
        rx
    }

    pub fn detach(&mut self, surface: &SurfaceId) -> bool {
        self.selections.forget_surface(surface);
        match self.surfaces.remove(surface) {
            Some(link) => {
                tracing::info!(
                    target: "quire::sync",
                    %surface,
                    dropped = link.pending.len(),
                    "surface detached"
                );
                true
            }
            None => false,
        }
    }

    fn send(&self, surface: &SurfaceId, message: HostMessage) {
        let Some(link) = self.surfaces.get(surface) else {
            return;
        };
        tracing::trace!(target: "quire::protocol", %surface, ty = message.type_name(), "to surface");
        if link.tx.send(message).is_err() {
            tracing::debug!(target: "quire::sync", %surface, "surface channel closed");
        }
    }

    fn broadcast(&self, message: &HostMessage, except: Option<&SurfaceId>) {
        for surface in self.surfaces.keys().filter(|s| Some(*s) != except) {
            self.send(surface, message.clone());
        }
    }

    fn require(&self, surface: &SurfaceId) -> Result<(), AuthorityError> {
        if self.surfaces.contains_key(surface) {
            Ok(())
        } else {
            Err(AuthorityError::UnknownSurface(surface.clone()))
        }
    }

    /// Push the whole document to one surface. Its outstanding tokens are
    /// dropped: the text it receives already contains those edits.
    fn resync(&mut self, surface: &SurfaceId, reason: ResyncReason) {
        if let Some(link) = self.surfaces.get_mut(surface) {
            link.pending.clear();
        }
        metrics::counter!("quire_resyncs_total", "reason" => reason.as_str()).increment(1);
        tracing::info!(
            target: "quire::sync",
            %surface,
            reason = reason.as_str(),
            version = self.document.version(),
            "resyncing surface"
        );
        self.send(
            surface,
            HostMessage::DocResync {
                text: self.document.text(),
                version: self.document.version(),
                reason,
            },
        );
    }

    pub fn request_resync(&mut self, surface: &SurfaceId) -> Result<(), AuthorityError> {
        self.require(surface)?;
        self.resync(surface, ResyncReason::Requested);
        Ok(())
    }

    /// Check and apply a surface edit. Confirmation follows the host's change
    /// report.
    pub fn apply_edit(
        &mut self,
        surface: &SurfaceId,
        request_id: RequestId,
        base_version: u64,
        changes: Vec<TextChange>,
    ) -> Result<(), AuthorityError> {
        self.require(surface)?;
        let current = self.document.version();

        if base_version != current {
            tracing::info!(
                target: "quire::sync",
                %surface,
                %request_id,
                base_version,
                current,
                "edit rejected: version mismatch"
            );
            metrics::counter!("quire_edits_rejected_total", "reason" => "version_mismatch")
                .increment(1);
            self.send(
                surface,
                HostMessage::ApplyEditResult {
                    request_id,
                    applied: false,
                    version: current,
                    error: Some(SmolStr::new(EditRejection::VersionMismatch.as_str())),
                },
            );
            self.resync(surface, ResyncReason::VersionMismatch);
            return Ok(());
        }

        match self.document.apply_edit(&changes) {
            Ok(()) => {
                let seq = self.record_apply(Some(surface.clone()));
                if let Some(link) = self.surfaces.get_mut(surface) {
                    link.pending.push_back((seq, request_id.clone()));
                }
                tracing::debug!(target: "quire::sync", %surface, %request_id, base_version, "edit handed to host");
            }
            Err(err) => {
                tracing::warn!(target: "quire::sync", %surface, %request_id, %err, "host refused edit");
                metrics::counter!("quire_edits_rejected_total", "reason" => "apply_failed")
                    .increment(1);
                self.send(
                    surface,
                    HostMessage::ApplyEditResult {
                        request_id,
                        applied: false,
                        version: current,
                        error: Some(SmolStr::new(EditRejection::ApplyFailed.as_str())),
                    },
                );
                self.send(
                    surface,
                    HostMessage::Error {
                        message: "the document refused an edit".to_string(),
                        detail: Some(err.to_string()),
                    },
                );
            }
        }
        Ok(())
    }

    /// Apply an edit the coordinator itself produced (attachments, image
    /// references). Everyone, the requester included, sees it as a patch.
    fn apply_own_edit(&mut self, changes: Vec<TextChange>) -> Result<(), String> {
        match self.document.apply_edit(&changes) {
            Ok(()) => {
                self.record_apply(None);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(target: "quire::sync", %err, "host refused coordinator edit");
                Err(err.to_string())
            }
        }
    }

    fn record_apply(&mut self, origin: Option<SurfaceId>) -> u64 {
        self.next_seq += 1;
        self.apply_order.push_back(InFlight {
            seq: self.next_seq,
            origin,
        });
        self.next_seq
    }

    /// Route one host change report.
    ///
    /// Reports arrive in apply order; one with no apply waiting came from
    /// outside the coordinator.
    pub fn on_document_changed(&mut self, change: DocumentChange) {
        let confirmed = self.apply_order.pop_front().and_then(|apply| {
            let surface = apply.origin?;
            let link = self.surfaces.get_mut(&surface)?;
            // tokens dropped by a resync or detach no longer match
            if link.pending.front().map(|(seq, _)| *seq) != Some(apply.seq) {
                return None;
            }
            let (_, request_id) = link.pending.pop_front()?;
            Some((surface, request_id))
        });

        let patch = HostMessage::DocPatch {
            version: change.version,
            changes: change.changes,
        };
        match confirmed {
            Some((surface, request_id)) => {
                tracing::debug!(target: "quire::sync", %surface, %request_id, version = change.version, "edit confirmed");
                metrics::counter!("quire_edits_applied_total").increment(1);
                self.send(
                    &surface,
                    HostMessage::ApplyEditResult {
                        request_id,
                        applied: true,
                        version: change.version,
                        error: None,
                    },
                );
                if self.surfaces.len() > 1 {
                    metrics::counter!("quire_patches_broadcast_total").increment(1);
                    self.broadcast(&patch, Some(&surface));
                }
            }
            None => {
                tracing::debug!(
                    target: "quire::sync",
                    version = change.version,
                    surfaces = self.surfaces.len(),
                    "broadcasting change"
                );
                metrics::counter!("quire_patches_broadcast_total").increment(1);
                self.broadcast(&patch, None);
            }
        }
    }

    /// Drain the document's change feed. Returns how many changes were routed.
    pub fn process_document_changes(&mut self) -> usize {
        let changes = self.document.take_changes();
        let count = changes.len();
        for change in changes {
            self.on_document_changed(change);
        }
        count
    }

    pub fn update_settings(&mut self, settings: EditorSettings) {
        self.settings = settings.clone();
        self.broadcast(&HostMessage::SettingsUpdated { settings }, None);
    }

    pub fn update_theme(&mut self, theme_kind: ThemeKind) {
        self.broadcast(&HostMessage::ThemeChanged { theme_kind }, None);
    }

    pub fn update_css(&mut self, css: Vec<String>) {
        self.css = css.clone();
        self.broadcast(&HostMessage::CssUpdated { css_text: css }, None);
    }

    /// Ask `surface` for its selection. The returned handle gives up after
    /// the configured selection timeout.
    pub fn request_selection(
        &mut self,
        surface: &SurfaceId,
    ) -> Result<PendingSelection, AuthorityError> {
        let link = self
            .surfaces
            .get(surface)
            .ok_or_else(|| AuthorityError::UnknownSurface(surface.clone()))?;
        let tx = link.tx.clone();
        Ok(self
            .selections
            .request(surface, &tx, self.selection_timeout)?)
    }

    pub fn waiting_selections(&mut self) -> usize {
        self.selections.waiting()
    }

    /// Validate and dispatch a raw surface message. Malformed input is
    /// answered with `ERROR` and a resync, then returned as an error.
    pub fn handle_raw(&mut self, surface: &SurfaceId, raw: &str) -> Result<(), AuthorityError> {
        self.require(surface)?;
        match decode_surface_message(raw) {
            Ok(message) => self.handle_surface_message(surface, message),
            Err(err) => {
                tracing::warn!(target: "quire::protocol", %surface, %err, "invalid message from surface");
                self.send(
                    surface,
                    HostMessage::Error {
                        message: "invalid message from surface".to_string(),
                        detail: Some(err.to_string()),
                    },
                );
                self.resync(surface, ResyncReason::Requested);
                Err(err.into())
            }
        }
    }

    pub fn handle_surface_message(
        &mut self,
        surface: &SurfaceId,
        message: SurfaceMessage,
    ) -> Result<(), AuthorityError> {
        self.require(surface)?;
        tracing::trace!(target: "quire::protocol", %surface, ty = message.type_name(), "from surface");

        match message {
            SurfaceMessage::SurfaceReady => {
                tracing::info!(target: "quire::sync", %surface, "surface ready");
            }
            SurfaceMessage::BootError { message, detail } => {
                tracing::error!(target: "quire::sync", %surface, %message, ?detail, "surface failed");
            }
            SurfaceMessage::ApplyEdit {
                request_id,
                base_version,
                changes,
            } => self.apply_edit(surface, request_id, base_version, changes)?,
            SurfaceMessage::RequestDocResync => self.resync(surface, ResyncReason::Requested),
            SurfaceMessage::OpenLink { href, from_uri } => {
                if let Err(err) = self.services.open_link(&href, &from_uri) {
                    self.service_failed(surface, "could not open link", err.to_string());
                }
            }
            SurfaceMessage::RequestPreview {
                request_id,
                href,
                from_uri,
            } => match self.services.preview(&href, &from_uri) {
                Ok(preview) => self.send(
                    surface,
                    HostMessage::PreviewResult {
                        request_id,
                        title: preview.title,
                        text: preview.text,
                    },
                ),
                Err(err) => self.service_failed(surface, "no preview available", err.to_string()),
            },
            SurfaceMessage::RequestSelection { request_id } => {
                tracing::warn!(target: "quire::bridge", %surface, %request_id, "surface asked the authority for a selection");
                self.send(
                    surface,
                    HostMessage::Error {
                        message: "selection requests go from the authority to a surface".into(),
                        detail: Some(request_id.to_string()),
                    },
                );
            }
            SurfaceMessage::SelectionResult { .. } => {
                if let Some(answer) = SelectionAnswer::from_message(message) {
                    self.selections.complete(surface, answer);
                }
            }
            SurfaceMessage::RequestResourceUri {
                request_id,
                href,
                from_uri,
                kind,
            } => {
                let reply = match self.services.resolve_resource(&href, &from_uri, kind) {
                    Ok(handle) => HostMessage::ResourceUriResult {
                        request_id,
                        ok: true,
                        handle: Some(handle),
                        error: None,
                    },
                    Err(err) => {
                        tracing::debug!(target: "quire::resource", %surface, %href, %err, "resolution failed");
                        HostMessage::ResourceUriResult {
                            request_id,
                            ok: false,
                            handle: None,
                            error: Some(SmolStr::new_static(err.reason())),
                        }
                    }
                };
                self.send(surface, reply);
            }
            SurfaceMessage::CreateAttachment {
                request_id,
                base_version,
                from_uri,
                insert_from,
                insert_to,
                bytes,
                filename_hint,
                mime,
                kind,
            } => {
                let result = self
                    .check_insert(surface, base_version)
                    .and_then(|()| {
                        self.services
                            .create_attachment(AttachmentRequest {
                                from_uri: &from_uri,
                                bytes: &bytes,
                                filename_hint: filename_hint.as_deref(),
                                mime: mime.as_deref(),
                                kind,
                            })
                            .map_err(|err| err.reason().to_string())
                    })
                    .and_then(|markup| {
                        self.apply_own_edit(vec![TextChange::replace(insert_from..insert_to, markup)])
                            .map_err(|_| EditRejection::ApplyFailed.as_str().to_string())
                    });
                let reply = match result {
                    Ok(()) => HostMessage::CreateAttachmentResult {
                        request_id,
                        ok: true,
                        error: None,
                    },
                    Err(reason) => HostMessage::CreateAttachmentResult {
                        request_id,
                        ok: false,
                        error: Some(SmolStr::new(reason)),
                    },
                };
                self.send(surface, reply);
            }
            SurfaceMessage::InsertImageReference {
                request_id,
                base_version,
                from_uri,
                insert_from,
                insert_to,
                target_uri,
            } => {
                if self.check_insert(surface, base_version).is_err() {
                    return Ok(());
                }
                let applied = match self.services.image_reference_text(&target_uri, &from_uri) {
                    Ok(markup) => self
                        .apply_own_edit(vec![TextChange::replace(insert_from..insert_to, markup)]),
                    Err(err) => Err(err.to_string()),
                };
                if let Err(detail) = applied {
                    self.service_failed(
                        surface,
                        "could not insert image reference",
                        format!("{request_id}: {detail}"),
                    );
                }
            }
        }
        Ok(())
    }

    /// Version check for inserts the coordinator performs itself. A mismatch
    /// resyncs the surface and yields the wire reason.
    fn check_insert(&mut self, surface: &SurfaceId, base_version: u64) -> Result<(), String> {
        let current = self.document.version();
        if base_version == current {
            return Ok(());
        }
        tracing::info!(target: "quire::sync", %surface, base_version, current, "insert rejected: version mismatch");
        metrics::counter!("quire_edits_rejected_total", "reason" => "version_mismatch").increment(1);
        self.resync(surface, ResyncReason::VersionMismatch);
        Err(EditRejection::VersionMismatch.as_str().to_string())
    }

    fn service_failed(&self, surface: &SurfaceId, message: &str, detail: String) {
        tracing::debug!(target: "quire::sync", %surface, message, %detail, "host service failed");
        self.send(
            surface,
            HostMessage::Error {
                message: message.to_string(),
                detail: Some(detail),
            },
        );
    }
}
