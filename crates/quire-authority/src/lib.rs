//! quire-authority: the document authority side of the quire protocol.
//!
//! This crate provides:
//! - `HostDocument` - the host's edit primitive and change feed, with the
//!   in-memory `MemoryDocument`
//! - `SyncCoordinator` - version-checked edit application, confirmation
//!   routing and patch fan-out to attached surfaces
//! - `SelectionBridge` - bounded request/response for a surface's selection
//! - `HostServices` - the seam for links, previews, resources and attachments

pub mod coordinator;
pub mod document;
pub mod error;
pub mod selection;
pub mod services;

pub use coordinator::{SurfaceId, SyncCoordinator};
pub use document::{DocumentChange, HostDocument, MemoryDocument};
pub use error::{AuthorityError, BridgeError, HostApplyError};
pub use selection::{PendingSelection, SelectionAnswer, SelectionBridge};
pub use services::{AttachmentRequest, HostServices, LinkPreview, NoHostServices, ServiceError};
