//! Message shapes for the surface/authority protocol.
//!
//! Messages are JSON objects tagged by a `type` field. Outbound encoding goes
//! through serde; inbound decoding goes through the structural validator in
//! `validate.rs`, never through a permissive deserializer.

use serde::{Serialize, Serializer};
use smol_str::SmolStr;

use crate::change::TextChange;
use crate::settings::EditorSettings;

/// Opaque request token. Unique per session on the side that mints it.
pub type RequestId = SmolStr;

/// Why the authority replaced the surface's text wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResyncReason {
    VersionMismatch,
    Requested,
    ExternalChange,
}

impl ResyncReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VersionMismatch => "version_mismatch",
            Self::Requested => "requested",
            Self::ExternalChange => "external_change",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "version_mismatch" => Some(Self::VersionMismatch),
            "requested" => Some(Self::Requested),
            "external_change" => Some(Self::ExternalChange),
            _ => None,
        }
    }
}

/// Reason string carried by a failed `APPLY_EDIT_RESULT`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditRejection {
    VersionMismatch,
    ApplyFailed,
    /// Anything else. Treated as a protocol error by the surface.
    Other(SmolStr),
}

impl EditRejection {
    pub fn parse(s: &str) -> Self {
        match s {
            "version_mismatch" => Self::VersionMismatch,
            "apply_failed" => Self::ApplyFailed,
            other => Self::Other(SmolStr::new(other)),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::VersionMismatch => "version_mismatch",
            Self::ApplyFailed => "apply_failed",
            Self::Other(s) => s.as_str(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeKind {
    Light,
    Dark,
    HighContrast,
}

impl ThemeKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            "high_contrast" => Some(Self::HighContrast),
            _ => None,
        }
    }
}

/// What an embedded reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Image,
    File,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::File => "file",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(Self::Image),
            "file" => Some(Self::File),
            _ => None,
        }
    }
}

/// Authority → surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostMessage {
    #[serde(rename_all = "camelCase")]
    Init {
        document_uri: SmolStr,
        text: String,
        version: u64,
        settings: EditorSettings,
        css_text: Vec<String>,
    },
    SettingsUpdated { settings: EditorSettings },
    #[serde(rename_all = "camelCase")]
    ThemeChanged { theme_kind: ThemeKind },
    #[serde(rename_all = "camelCase")]
    CssUpdated { css_text: Vec<String> },
    #[serde(rename_all = "camelCase")]
    RequestSelection { request_id: RequestId },
    DocPatch {
        version: u64,
        changes: Vec<TextChange>,
    },
    DocResync {
        text: String,
        version: u64,
        reason: ResyncReason,
    },
    #[serde(rename_all = "camelCase")]
    ApplyEditResult {
        request_id: RequestId,
        applied: bool,
        version: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<SmolStr>,
    },
    #[serde(rename_all = "camelCase")]
    PreviewResult {
        request_id: RequestId,
        title: String,
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    ResourceUriResult {
        request_id: RequestId,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        handle: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<SmolStr>,
    },
    #[serde(rename_all = "camelCase")]
    CreateAttachmentResult {
        request_id: RequestId,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<SmolStr>,
    },
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl HostMessage {
    /// The wire discriminator, for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Init { .. } => "INIT",
            Self::SettingsUpdated { .. } => "SETTINGS_UPDATED",
            Self::ThemeChanged { .. } => "THEME_CHANGED",
            Self::CssUpdated { .. } => "CSS_UPDATED",
            Self::RequestSelection { .. } => "REQUEST_SELECTION",
            Self::DocPatch { .. } => "DOC_PATCH",
            Self::DocResync { .. } => "DOC_RESYNC",
            Self::ApplyEditResult { .. } => "APPLY_EDIT_RESULT",
            Self::PreviewResult { .. } => "PREVIEW_RESULT",
            Self::ResourceUriResult { .. } => "RESOURCE_URI_RESULT",
            Self::CreateAttachmentResult { .. } => "CREATE_ATTACHMENT_RESULT",
            Self::Error { .. } => "ERROR",
        }
    }
}

/// Surface → authority.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SurfaceMessage {
    SurfaceReady,
    BootError {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ApplyEdit {
        request_id: RequestId,
        base_version: u64,
        changes: Vec<TextChange>,
    },
    RequestDocResync,
    #[serde(rename_all = "camelCase")]
    OpenLink { href: String, from_uri: SmolStr },
    #[serde(rename_all = "camelCase")]
    RequestPreview {
        request_id: RequestId,
        href: String,
        from_uri: SmolStr,
    },
    #[serde(rename_all = "camelCase")]
    RequestSelection { request_id: RequestId },
    #[serde(rename_all = "camelCase")]
    SelectionResult {
        request_id: RequestId,
        base_version: u64,
        from: usize,
        to: usize,
        text: String,
        /// Set when unconfirmed local edits were queued at answer time.
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        stale: bool,
    },
    #[serde(rename_all = "camelCase")]
    RequestResourceUri {
        request_id: RequestId,
        href: String,
        from_uri: SmolStr,
        kind: ResourceKind,
    },
    #[serde(rename_all = "camelCase")]
    CreateAttachment {
        request_id: RequestId,
        base_version: u64,
        from_uri: SmolStr,
        insert_from: usize,
        insert_to: usize,
        #[serde(serialize_with = "serialize_base64")]
        bytes: Vec<u8>,
        #[serde(skip_serializing_if = "Option::is_none")]
        filename_hint: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        mime: Option<String>,
        kind: ResourceKind,
    },
    #[serde(rename_all = "camelCase")]
    InsertImageReference {
        request_id: RequestId,
        base_version: u64,
        from_uri: SmolStr,
        insert_from: usize,
        insert_to: usize,
        target_uri: String,
    },
}

impl SurfaceMessage {
    /// The wire discriminator, for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::SurfaceReady => "SURFACE_READY",
            Self::BootError { .. } => "BOOT_ERROR",
            Self::ApplyEdit { .. } => "APPLY_EDIT",
            Self::RequestDocResync => "REQUEST_DOC_RESYNC",
            Self::OpenLink { .. } => "OPEN_LINK",
            Self::RequestPreview { .. } => "REQUEST_PREVIEW",
            Self::RequestSelection { .. } => "REQUEST_SELECTION",
            Self::SelectionResult { .. } => "SELECTION_RESULT",
            Self::RequestResourceUri { .. } => "REQUEST_RESOURCE_URI",
            Self::CreateAttachment { .. } => "CREATE_ATTACHMENT",
            Self::InsertImageReference { .. } => "INSERT_IMAGE_REFERENCE",
        }
    }
}

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    use base64::Engine;
    serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
}
