use std::collections::HashMap;
use std::time::Duration;

use quire_authority::{
    AttachmentRequest, BridgeError, HostDocument, HostServices, LinkPreview, MemoryDocument,
    ServiceError, SurfaceId, SyncCoordinator,
};
use quire_common::QuireConfig;
use quire_editor_core::render::ImageState;
use quire_editor_core::{PENDING_INPUT_DISCARDED, Selection, SessionState, SurfaceSession};
use quire_protocol::{HostMessage, ResourceKind, ResyncReason, TextChange};
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Default)]
struct FakeHost {
    resources: HashMap<String, String>,
    opened: Vec<String>,
}

impl HostServices for FakeHost {
    fn open_link(&mut self, href: &str, _from_uri: &str) -> Result<(), ServiceError> {
        self.opened.push(href.to_string());
        Ok(())
    }

    fn preview(&mut self, href: &str, _from_uri: &str) -> Result<LinkPreview, ServiceError> {
        Ok(LinkPreview {
            title: href.to_uppercase(),
            text: format!("preview of {href}"),
        })
    }

    fn resolve_resource(
        &mut self,
        href: &str,
        _from_uri: &str,
        _kind: ResourceKind,
    ) -> Result<String, ServiceError> {
        self.resources
            .get(href)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(href.to_string()))
    }

    fn create_attachment(
        &mut self,
        request: AttachmentRequest<'_>,
    ) -> Result<String, ServiceError> {
        let name = request.filename_hint.unwrap_or("pasted.bin");
        Ok(format!("![](assets/{name})"))
    }

    fn image_reference_text(
        &mut self,
        target_uri: &str,
        _from_uri: &str,
    ) -> Result<String, ServiceError> {
        Ok(format!("![]({target_uri})"))
    }
}

struct Harness {
    sync: SyncCoordinator<MemoryDocument, FakeHost>,
    surfaces: Vec<(SurfaceId, SurfaceSession, UnboundedReceiver<HostMessage>)>,
}

impl Harness {
    fn new(text: &str, version: u64) -> Self {
        Self {
            sync: SyncCoordinator::with_services(
                MemoryDocument::at_version("file:///notes/today.md", text, version),
                FakeHost::default(),
                &QuireConfig::default(),
            ),
            surfaces: Vec::new(),
        }
    }

    fn attach(&mut self, name: &str) -> usize {
        let id = SurfaceId::new(name);
        let rx = self.sync.attach(id.clone());
        self.surfaces.push((id, SurfaceSession::new(), rx));
        self.pump();
        self.surfaces.len() - 1
    }

    fn surface(&mut self, index: usize) -> &mut SurfaceSession {
        &mut self.surfaces[index].1
    }

    /// Deliver messages both ways until nothing moves.
    fn pump(&mut self) {
        loop {
            let mut moved = false;
            for (id, session, rx) in self.surfaces.iter_mut() {
                while let Ok(message) = rx.try_recv() {
                    session.handle_message(message);
                    moved = true;
                }
                for message in session.take_outbox() {
                    self.sync.handle_surface_message(id, message).unwrap();
                    moved = true;
                }
            }
            if self.sync.process_document_changes() > 0 {
                moved = true;
            }
            if !moved {
                break;
            }
        }
    }

    fn assert_converged(&self) {
        let text = self.sync.document().text();
        for (id, session, _) in &self.surfaces {
            assert_eq!(session.text(), text, "surface {id} diverged");
            assert_eq!(session.version(), self.sync.version(), "surface {id} version");
        }
    }
}

#[test]
fn stale_base_version_rejected_with_resync() {
    let mut sync = SyncCoordinator::new(
        MemoryDocument::at_version("file:///a.md", "six", 6),
        &QuireConfig::default(),
    );
    let a = SurfaceId::new("a");
    let mut rx = sync.attach(a.clone());
    rx.try_recv().unwrap();

    sync.apply_edit(&a, "r9".into(), 5, vec![TextChange::insert(0, "x")])
        .unwrap();
    assert_eq!(
        rx.try_recv().unwrap(),
        HostMessage::ApplyEditResult {
            request_id: "r9".into(),
            applied: false,
            version: 6,
            error: Some("version_mismatch".into()),
        }
    );
    assert_eq!(
        rx.try_recv().unwrap(),
        HostMessage::DocResync {
            text: "six".into(),
            version: 6,
            reason: ResyncReason::VersionMismatch,
        }
    );
    assert!(rx.try_recv().is_err());
    assert_eq!(sync.version(), 6);
}

#[test]
fn typing_reaches_observers_as_patches() {
    let mut h = Harness::new("hello", 0);
    let a = h.attach("a");
    let b = h.attach("b");

    for (i, ch) in " world".chars().enumerate() {
        h.surface(a)
            .local_edit(vec![TextChange::insert(5 + i, ch.to_string())], None)
            .unwrap();
    }
    h.pump();

    assert_eq!(h.surface(b).text(), "hello world");
    assert_eq!(h.sync.version(), 6);
    h.assert_converged();
    assert_eq!(h.surface(a).queue().pending_len(), 0);
}

#[test]
fn concurrent_edits_resolve_by_resync() {
    let mut h = Harness::new("hello", 0);
    let a = h.attach("a");
    let b = h.attach("b");

    h.surface(a)
        .local_edit(vec![TextChange::insert(5, " world")], None)
        .unwrap();
    h.surface(b)
        .local_edit(vec![TextChange::insert(0, "> ")], None)
        .unwrap();
    h.pump();

    h.assert_converged();
    assert_eq!(h.surface(a).text(), "hello world");
    assert_eq!(h.surface(b).state(), SessionState::Live);
    assert!(h.surface(b).notices().contains_message(PENDING_INPUT_DISCARDED));
    assert!(!h.surface(a).notices().contains_message(PENDING_INPUT_DISCARDED));
}

#[test]
fn external_edit_broadcast_to_everyone() {
    let mut h = Harness::new("one", 3);
    h.attach("a");
    h.attach("b");

    h.sync
        .document_mut()
        .external_edit(vec![TextChange::insert(3, " two")])
        .unwrap();
    h.pump();

    assert_eq!(h.sync.version(), 4);
    h.assert_converged();
}

#[test]
fn attachment_inserted_for_everyone() {
    let mut h = Harness::new("see: ", 0);
    let a = h.attach("a");
    h.attach("b");

    h.surface(a).set_selection(Selection::cursor(5));
    h.surface(a)
        .paste_attachment(vec![0x89, 0x50], Some("cat.png".into()), None, ResourceKind::Image)
        .unwrap();
    h.pump();

    assert_eq!(h.surface(a).text(), "see: ![](assets/cat.png)");
    h.assert_converged();
    assert!(h.surface(a).notices().is_empty());
}

#[test]
fn missing_image_resolves_to_error_once() {
    let mut h = Harness::new("![cat](cat.png)\n\ntext", 0);
    let a = h.attach("a");
    h.surface(a).set_selection(Selection::cursor(20));

    h.surface(a).render().unwrap();
    h.pump();
    let set = h.surface(a).render().unwrap();
    let state = set.images().next().map(|img| img.state.clone());
    assert_eq!(
        state,
        Some(ImageState::Failed {
            reason: "not_found".into()
        })
    );

    h.surface(a).set_selection(Selection::cursor(18));
    h.surface(a).render().unwrap();
    assert!(h.surface(a).take_outbox().is_empty());
}

#[test]
fn preview_and_link_requests_reach_host() {
    let mut h = Harness::new("[x](https://x.dev)", 0);
    let a = h.attach("a");
    h.surface(a).open_link("https://x.dev");
    let id = h.surface(a).request_preview("notes/b.md");
    h.pump();

    assert_eq!(h.sync.services_mut().opened, vec!["https://x.dev".to_string()]);
    let preview = &h.surface(a).previews()[0];
    assert_eq!(preview.request_id, id);
    assert_eq!(preview.title, "NOTES/B.MD");
}

#[tokio::test]
async fn selection_round_trip() {
    let mut h = Harness::new("pick this word", 2);
    let a = h.attach("a");
    h.surface(a).set_selection(Selection::new(5, 9, 14));

    let id = h.surfaces[a].0.clone();
    let pending = h.sync.request_selection(&id).unwrap();
    h.pump();

    assert_eq!(pending.timeout(), h.sync.selection_timeout());
    let answer = pending.wait().await.unwrap();
    assert_eq!((answer.from, answer.to), (5, 9));
    assert_eq!(answer.text, "this");
    assert!(!answer.stale);
    answer.ensure_current(h.sync.version()).unwrap();

    // an external change lands before the command acts on the answer
    h.sync
        .document_mut()
        .external_edit(vec![TextChange::insert(0, "> ")])
        .unwrap();
    assert!(matches!(
        answer.ensure_current(h.sync.version()),
        Err(BridgeError::StaleSelection {
            base_version: 2,
            current: 3
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn unanswered_selection_times_out_after_configured_bound() {
    let config = QuireConfig {
        selection_timeout: Duration::from_millis(500),
        ..QuireConfig::default()
    };
    let mut sync = SyncCoordinator::new(MemoryDocument::new("file:///a.md", "text"), &config);
    let a = SurfaceId::new("a");
    // the surface never reads its channel, so the request goes unanswered
    let _rx = sync.attach(a.clone());
    let pending = sync.request_selection(&a).unwrap();

    let started = tokio::time::Instant::now();
    let err = pending.wait().await.unwrap_err();
    assert!(started.elapsed() >= Duration::from_millis(500));
    assert!(matches!(
        err,
        BridgeError::Timeout { after, .. } if after == Duration::from_millis(500)
    ));
    assert_eq!(sync.waiting_selections(), 0);
}
