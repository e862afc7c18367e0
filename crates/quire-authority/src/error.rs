use std::time::Duration;

use miette::Diagnostic;
use quire_protocol::{ProtocolError, RequestId};
use thiserror::Error;

use crate::coordinator::SurfaceId;

/// Failure of the host's own edit primitive. The document is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum HostApplyError {
    #[error("the host refused the edit: {reason}")]
    #[diagnostic(code(authority::host_refused))]
    Refused { reason: String },

    #[error("change at {offset} (length {length}) runs past the end of the document ({doc_len})")]
    #[diagnostic(code(authority::out_of_bounds))]
    OutOfBounds {
        offset: usize,
        length: usize,
        doc_len: usize,
    },
}

#[derive(Debug, Error, Diagnostic)]
pub enum AuthorityError {
    #[error("no surface attached as `{0}`")]
    #[diagnostic(code(authority::unknown_surface))]
    UnknownSurface(SurfaceId),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Bridge(#[from] BridgeError),
}

/// Errors from a selection round trip.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum BridgeError {
    #[error("selection request {request_id} timed out after {after:?}")]
    #[diagnostic(
        code(bridge::timeout),
        help("the command must fail rather than act on a default selection")
    )]
    Timeout { request_id: RequestId, after: Duration },

    #[error("surface `{0}` went away before answering")]
    #[diagnostic(code(bridge::detached))]
    Detached(SurfaceId),

    #[error("selection was taken at version {base_version}, document is at {current}")]
    #[diagnostic(
        code(bridge::stale_selection),
        help("abort the command and resynchronize the surface")
    )]
    StaleSelection { base_version: u64, current: u64 },
}
