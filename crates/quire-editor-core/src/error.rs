use miette::Diagnostic;
use quire_protocol::ProtocolError;
use thiserror::Error;

/// Errors raised by the editing surface.
#[derive(Debug, Error, Diagnostic)]
pub enum SurfaceError {
    #[error("change {offset}+{length} exceeds document length {doc_len}")]
    #[diagnostic(code(surface::change_out_of_bounds))]
    ChangeOutOfBounds {
        offset: usize,
        length: usize,
        doc_len: usize,
    },

    #[error("no document is open yet")]
    #[diagnostic(
        code(surface::not_open),
        help("wait for INIT before editing")
    )]
    NotOpen,

    #[error("local edits are paused until the document is resynchronized")]
    #[diagnostic(code(surface::awaiting_resync))]
    AwaitingResync,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Protocol(#[from] ProtocolError),
}

/// The renderer failed while building decorations.
///
/// Always reported to the diagnostic sink before being returned.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum RenderError {
    #[error("decoration pass panicked: {message}")]
    #[diagnostic(code(render::panicked))]
    Panicked { message: String },
}
