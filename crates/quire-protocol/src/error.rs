//! Error types for message decoding and validation.

use miette::Diagnostic;
use thiserror::Error;

/// Errors produced while decoding or validating a protocol message.
///
/// Any of these is fatal to the receiving side's sync state: the receiver
/// reports it and resynchronizes rather than guessing at the intended shape.
#[derive(Debug, Error, Diagnostic)]
#[non_exhaustive]
pub enum ProtocolError {
    /// Payload was not valid JSON, or could not be serialized.
    #[error("malformed JSON: {0}")]
    #[diagnostic(code(quire::protocol::json))]
    Json(#[from] serde_json::Error),

    /// Payload was valid JSON but not an object.
    #[error("message is not a JSON object")]
    #[diagnostic(code(quire::protocol::not_object))]
    NotAnObject,

    /// Object had no string `type` discriminator.
    #[error("message has no string `type` field")]
    #[diagnostic(code(quire::protocol::missing_type))]
    MissingType,

    /// Discriminator did not name a known message.
    #[error("unknown message type `{ty}`")]
    #[diagnostic(
        code(quire::protocol::unknown_type),
        help("the surface and authority may be running different protocol versions")
    )]
    UnknownType { ty: String },

    /// A required field was absent.
    #[error("{message}: missing required field `{field}`")]
    #[diagnostic(code(quire::protocol::missing_field))]
    MissingField {
        message: &'static str,
        field: String,
    },

    /// A field was present with the wrong JSON type or an out-of-range value.
    #[error("{message}.{field}: expected {expected}")]
    #[diagnostic(code(quire::protocol::invalid_field))]
    InvalidField {
        message: &'static str,
        field: String,
        expected: &'static str,
    },
}
