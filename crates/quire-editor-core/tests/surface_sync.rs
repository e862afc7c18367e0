use quire_editor_core::{
    NoticeLevel, PENDING_INPUT_DISCARDED, Selection, SessionState, SurfaceSession,
};
use quire_protocol::{
    EditorSettings, HostMessage, ResyncReason, SurfaceMessage, TextChange, apply_to_string,
};

fn open(text: &str, version: u64) -> SurfaceSession {
    let mut session = SurfaceSession::new();
    session.handle_message(HostMessage::Init {
        document_uri: "file:///notes/today.md".into(),
        text: text.to_string(),
        version,
        settings: EditorSettings::default(),
        css_text: Vec::new(),
    });
    session
}

/// Confirm every queued edit the way a cooperative authority would, applying
/// each to `doc`.
fn confirm_all(session: &mut SurfaceSession, doc: &mut String, version: &mut u64) {
    for message in session.take_outbox() {
        let SurfaceMessage::ApplyEdit {
            request_id,
            base_version,
            changes,
        } = message
        else {
            continue;
        };
        assert_eq!(base_version, *version, "edit {request_id} built on a stale version");
        *doc = apply_to_string(doc, &changes).expect("edit fits the authority copy");
        *version += 1;
        session.handle_message(HostMessage::ApplyEditResult {
            request_id,
            applied: true,
            version: *version,
            error: None,
        });
    }
}

#[test]
fn heading_typed_after_confirmed_marker() {
    let mut session = open("", 0);

    session
        .local_edit(vec![TextChange::insert(0, "# ")], Some(Selection::cursor(2)))
        .unwrap();
    let outbox = session.take_outbox();
    assert_eq!(
        outbox,
        vec![SurfaceMessage::ApplyEdit {
            request_id: "r1".into(),
            base_version: 0,
            changes: vec![TextChange::insert(0, "# ")],
        }]
    );
    session.handle_message(HostMessage::ApplyEditResult {
        request_id: "r1".into(),
        applied: true,
        version: 1,
        error: None,
    });
    assert_eq!(session.version(), 1);

    session
        .local_edit(vec![TextChange::insert(2, "Title")], Some(Selection::cursor(7)))
        .unwrap();
    session
        .local_edit(vec![TextChange::insert(7, "\n\nbody")], Some(Selection::cursor(13)))
        .unwrap();
    let bases: Vec<u64> = session
        .take_outbox()
        .into_iter()
        .filter_map(|m| match m {
            SurfaceMessage::ApplyEdit { base_version, .. } => Some(base_version),
            _ => None,
        })
        .collect();
    assert_eq!(bases, vec![1, 2]);

    let set = session.render().unwrap();
    insta::assert_snapshot!(set.to_string(), @r"
    0..7 line md-line-heading md-line-h1
    0..2 mark md-syntax
    2..7 mark md-heading md-h1
    ");

    // back on the heading line the marker is shown at full strength
    session.set_selection(Selection::cursor(4));
    let set = session.render().unwrap();
    assert!(set.has_mark(2..7, "md-h1"));
    assert_eq!(set.marks_with("md-syntax").count(), 0);
}

#[test]
fn external_patch_while_pending_discards_queue() {
    let mut session = open("hello", 3);
    session
        .local_edit(vec![TextChange::insert(5, "!")], None)
        .unwrap();
    session.take_outbox();

    session.handle_message(HostMessage::DocPatch {
        version: 4,
        changes: vec![TextChange::insert(0, ">> ")],
    });

    assert_eq!(session.state(), SessionState::AwaitingResync);
    assert_eq!(session.queue().pending_len(), 0);
    assert_eq!(session.take_outbox(), vec![SurfaceMessage::RequestDocResync]);
    let notice = session
        .notices()
        .iter()
        .find(|n| n.message == PENDING_INPUT_DISCARDED)
        .expect("discard notice");
    assert_eq!(notice.level, NoticeLevel::Warning);
    // nothing merged locally
    assert_eq!(session.text(), "hello!");

    session.handle_message(HostMessage::DocResync {
        text: ">> hello".into(),
        version: 4,
        reason: ResyncReason::Requested,
    });
    assert_eq!(session.state(), SessionState::Live);
    assert_eq!(session.text(), ">> hello");
    assert_eq!(session.version(), 4);
}

#[test]
fn late_confirmation_during_resync_is_dropped() {
    let mut session = open("a", 0);
    session.local_edit(vec![TextChange::insert(1, "b")], None).unwrap();
    session.handle_message(HostMessage::DocPatch {
        version: 1,
        changes: vec![TextChange::insert(0, "z")],
    });
    session.take_outbox();

    session.handle_message(HostMessage::ApplyEditResult {
        request_id: "r1".into(),
        applied: true,
        version: 2,
        error: None,
    });
    assert_eq!(session.state(), SessionState::AwaitingResync);
    assert!(session.take_outbox().is_empty());
}

#[test]
fn local_edits_round_trip_to_authority_copy() {
    let mut session = open("café\n", 0);
    let mut doc = "café\n".to_string();
    let mut version = 0;

    let batches = [
        vec![TextChange::insert(5, "naïve ")],
        vec![TextChange::replace(0..4, "CAFÉ")],
        vec![TextChange::insert(0, "🙂"), TextChange::delete(5..6)],
        vec![TextChange::insert(11, "end")],
    ];
    for (i, batch) in batches.into_iter().enumerate() {
        session.local_edit(batch, None).unwrap();
        // confirm every other batch so some edits queue up first
        if i % 2 == 1 {
            confirm_all(&mut session, &mut doc, &mut version);
        }
    }
    confirm_all(&mut session, &mut doc, &mut version);

    assert_eq!(session.text(), doc);
    assert_eq!(session.version(), version);
    assert_eq!(version, 4);
    assert_eq!(session.queue().pending_len(), 0);
}

#[test]
fn external_patch_applies_when_idle() {
    let mut session = open("one\ntwo", 7);
    session.handle_message(HostMessage::DocPatch {
        version: 8,
        changes: vec![
            TextChange::replace(0..3, "uno"),
            TextChange::replace(4..7, "dos"),
        ],
    });
    assert_eq!(session.text(), "uno\ndos");
    assert_eq!(session.version(), 8);

    // replayed patch is ignored
    session.handle_message(HostMessage::DocPatch {
        version: 8,
        changes: vec![TextChange::insert(0, "x")],
    });
    assert_eq!(session.text(), "uno\ndos");
    assert!(session.take_outbox().is_empty());
}

#[test]
fn selection_answer_flags_pending_edits() {
    let mut session = open("hello world", 2);
    session.set_selection(Selection::new(11, 6, 11));
    session.receive_raw(r#"{"type":"REQUEST_SELECTION","requestId":"sel-1"}"#);
    session
        .local_edit(vec![TextChange::insert(0, "> ")], Some(Selection::new(8, 13, 13)))
        .unwrap();
    session.receive_raw(r#"{"type":"REQUEST_SELECTION","requestId":"sel-2"}"#);

    let answers: Vec<_> = session
        .take_outbox()
        .into_iter()
        .filter(|m| matches!(m, SurfaceMessage::SelectionResult { .. }))
        .collect();
    assert_eq!(
        answers,
        vec![
            SurfaceMessage::SelectionResult {
                request_id: "sel-1".into(),
                base_version: 2,
                from: 6,
                to: 11,
                text: "world".into(),
                stale: false,
            },
            SurfaceMessage::SelectionResult {
                request_id: "sel-2".into(),
                base_version: 3,
                from: 8,
                to: 13,
                text: "world".into(),
                stale: true,
            },
        ]
    );
}
