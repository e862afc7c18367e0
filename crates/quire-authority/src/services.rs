//! Host collaborators the coordinator delegates to: navigation, previews,
//! resource resolution, attachment storage.
//!
//! Their internals belong to the host. Failures are reported back to the
//! requesting surface and never touch sync state.

use miette::Diagnostic;
use quire_protocol::ResourceKind;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPreview {
    pub title: String,
    pub text: String,
}

/// Bytes a surface asked the host to store.
#[derive(Debug, Clone, Copy)]
pub struct AttachmentRequest<'a> {
    pub from_uri: &'a str,
    pub bytes: &'a [u8],
    pub filename_hint: Option<&'a str>,
    pub mime: Option<&'a str>,
    pub kind: ResourceKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum ServiceError {
    #[error("{0} is not supported by this host")]
    #[diagnostic(code(services::unsupported))]
    Unsupported(&'static str),

    #[error("`{0}` not found")]
    #[diagnostic(code(services::not_found))]
    NotFound(String),

    #[error("access to `{0}` denied")]
    #[diagnostic(code(services::denied))]
    Denied(String),

    #[error("{0}")]
    #[diagnostic(code(services::failed))]
    Failed(String),
}

impl ServiceError {
    /// Short reason code sent back on the wire.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Unsupported(_) => "unsupported",
            Self::NotFound(_) => "not_found",
            Self::Denied(_) => "denied",
            Self::Failed(_) => "failed",
        }
    }
}

pub trait HostServices {
    fn open_link(&mut self, href: &str, from_uri: &str) -> Result<(), ServiceError>;

    fn preview(&mut self, href: &str, from_uri: &str) -> Result<LinkPreview, ServiceError>;

    /// A handle the surface can display for `href`.
    fn resolve_resource(
        &mut self,
        href: &str,
        from_uri: &str,
        kind: ResourceKind,
    ) -> Result<String, ServiceError>;

    /// Store the bytes and return the markup to insert in their place.
    fn create_attachment(&mut self, request: AttachmentRequest<'_>)
    -> Result<String, ServiceError>;

    /// Markup referencing `target_uri` from the document at `from_uri`.
    fn image_reference_text(
        &mut self,
        target_uri: &str,
        from_uri: &str,
    ) -> Result<String, ServiceError>;
}

/// Answers every request with `Unsupported`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHostServices;

impl HostServices for NoHostServices {
    fn open_link(&mut self, _href: &str, _from_uri: &str) -> Result<(), ServiceError> {
        Err(ServiceError::Unsupported("opening links"))
    }

    fn preview(&mut self, _href: &str, _from_uri: &str) -> Result<LinkPreview, ServiceError> {
        Err(ServiceError::Unsupported("link previews"))
    }

    fn resolve_resource(
        &mut self,
        _href: &str,
        _from_uri: &str,
        _kind: ResourceKind,
    ) -> Result<String, ServiceError> {
        Err(ServiceError::Unsupported("resource resolution"))
    }

    fn create_attachment(
        &mut self,
        _request: AttachmentRequest<'_>,
    ) -> Result<String, ServiceError> {
        Err(ServiceError::Unsupported("attachments"))
    }

    fn image_reference_text(
        &mut self,
        _target_uri: &str,
        _from_uri: &str,
    ) -> Result<String, ServiceError> {
        Err(ServiceError::Unsupported("image references"))
    }
}

impl<T: HostServices + ?Sized> HostServices for &mut T {
    fn open_link(&mut self, href: &str, from_uri: &str) -> Result<(), ServiceError> {
        (**self).open_link(href, from_uri)
    }

    fn preview(&mut self, href: &str, from_uri: &str) -> Result<LinkPreview, ServiceError> {
        (**self).preview(href, from_uri)
    }

    fn resolve_resource(
        &mut self,
        href: &str,
        from_uri: &str,
        kind: ResourceKind,
    ) -> Result<String, ServiceError> {
        (**self).resolve_resource(href, from_uri, kind)
    }

    fn create_attachment(
        &mut self,
        request: AttachmentRequest<'_>,
    ) -> Result<String, ServiceError> {
        (**self).create_attachment(request)
    }

    fn image_reference_text(
        &mut self,
        target_uri: &str,
        from_uri: &str,
    ) -> Result<String, ServiceError> {
        (**self).image_reference_text(target_uri, from_uri)
    }
}
