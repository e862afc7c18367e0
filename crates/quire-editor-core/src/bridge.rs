//! Surface half of the selection bridge.

use quire_protocol::{SurfaceMessage, SmolStr};

use crate::edit_queue::EditQueue;
use crate::text::TextBuffer;
use crate::types::Selection;

/// Answer a `REQUEST_SELECTION`.
///
/// The base version includes queued edits, since the local buffer (and so
/// the offsets) already contain them. With edits queued the answer is
/// flagged stale and the requester treats it as advisory.
pub fn answer_selection<B: TextBuffer + ?Sized>(
    request_id: SmolStr,
    queue: &EditQueue,
    buffer: &B,
    selection: Selection,
) -> SurfaceMessage {
    let selection = selection.clamped(buffer.len_chars());
    let text = buffer
        .slice(selection.range())
        .map(|s| s.to_string())
        .unwrap_or_default();
    let stale = queue.has_pending();
    tracing::debug!(
        target: "quire::bridge",
        %request_id,
        from = selection.from,
        to = selection.to,
        stale,
        "answering selection request"
    );
    SurfaceMessage::SelectionResult {
        request_id,
        base_version: queue.next_base_version(),
        from: selection.from,
        to: selection.to,
        text,
        stale,
    }
}
