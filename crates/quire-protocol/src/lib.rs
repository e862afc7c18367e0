//! quire-protocol: messages exchanged between an editing surface and the
//! document authority.
//!
//! This crate provides:
//! - `HostMessage` / `SurfaceMessage` - closed sets of tagged message shapes
//! - `TextChange` - the "delete then insert at offset" edit unit
//! - `EditorSettings` and the small enums carried inside messages
//! - A structural validator that turns untyped JSON into typed messages,
//!   rejecting anything malformed with a diagnostic

mod change;
mod error;
mod message;
mod settings;
mod validate;

pub use change::{TextChange, apply_to_string, ordered_for_apply};
pub use error::ProtocolError;
pub use message::{
    EditRejection, HostMessage, RequestId, ResourceKind, ResyncReason, SurfaceMessage, ThemeKind,
};
pub use settings::{EditorSettings, SyntaxVisibility};
pub use smol_str::SmolStr;
pub use validate::{
    decode_changes, decode_host_message, decode_surface_message, validate_host_message,
    validate_surface_message,
};

/// Serialize a message to its JSON wire form.
pub fn encode<M: serde::Serialize>(message: &M) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}
