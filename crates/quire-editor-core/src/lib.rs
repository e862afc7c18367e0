//! quire-editor-core: the editing surface, without any UI framework.
//!
//! This crate provides:
//! - `TextBuffer` trait for text storage, with the ropey-backed `EditorRope`
//! - `EditQueue` - optimistic edits tracked against authority versions
//! - `render` - cursor-aware live markdown decorations over the viewport
//! - `ResourceCache` - asynchronous image/file resolution, one request per key
//! - `SurfaceSession` - ties the above to the message protocol

pub mod bridge;
pub mod edit_queue;
pub mod error;
pub mod notice;
pub mod render;
pub mod resource;
pub mod session;
pub mod text;
pub mod types;

pub use bridge::answer_selection;
pub use edit_queue::{EditQueue, PendingEdit, QueueOutcome, ResyncCause};
pub use error::{RenderError, SurfaceError};
pub use notice::{Notice, NoticeLevel, Notices, PENDING_INPUT_DISCARDED};
pub use render::{
    DecorationSet, DiagnosticSink, ImageStates, LiveRenderer, RenderContext, RenderDiagnostic,
    Trigger, build_decorations,
};
pub use resource::{DocumentImages, EXTERNAL_BLOCKED, Resolution, ResourceCache, is_external};
pub use session::{Preview, SessionState, SurfaceSession};
pub use smol_str::SmolStr;
pub use text::{EditorRope, TextBuffer, apply_changes};
pub use types::{Selection, Viewport, map_offset};
