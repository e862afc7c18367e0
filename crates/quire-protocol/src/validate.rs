//! Structural validation of inbound messages.
//!
//! Every inbound payload is checked field by field against the shape its
//! `type` names before a typed message is constructed. Unknown fields are
//! ignored; missing or mistyped fields are rejected, never defaulted.

use base64::Engine;
use serde_json::{Map, Value};
use smol_str::SmolStr;

use crate::change::TextChange;
use crate::error::ProtocolError;
use crate::message::{HostMessage, ResourceKind, ResyncReason, SurfaceMessage, ThemeKind};
use crate::settings::{EditorSettings, SyntaxVisibility};

/// Decode and validate an authority → surface message.
pub fn decode_host_message(raw: &str) -> Result<HostMessage, ProtocolError> {
    let value: Value = serde_json::from_str(raw)?;
    validate_host_message(&value)
}

/// Decode and validate a surface → authority message.
pub fn decode_surface_message(raw: &str) -> Result<SurfaceMessage, ProtocolError> {
    let value: Value = serde_json::from_str(raw)?;
    validate_surface_message(&value)
}

/// Decode a bare JSON array of text changes, for tooling that injects edits
/// outside any message.
pub fn decode_changes(raw: &str) -> Result<Vec<TextChange>, ProtocolError> {
    let value: Value = serde_json::from_str(raw)?;
    let mut map = Map::new();
    map.insert("changes".to_string(), value);
    Fields::new("edit", &map).changes("changes")
}

/// Validate an already-parsed authority → surface message.
pub fn validate_host_message(value: &Value) -> Result<HostMessage, ProtocolError> {
    let (ty, map) = envelope(value)?;
    let msg = match ty {
        "INIT" => {
            let f = Fields::new("INIT", map);
            HostMessage::Init {
                document_uri: f.smol("documentUri")?,
                text: f.string("text")?,
                version: f.u64("version")?,
                settings: f.settings("settings")?,
                css_text: f.string_array("cssText")?,
            }
        }
        "SETTINGS_UPDATED" => {
            let f = Fields::new("SETTINGS_UPDATED", map);
            HostMessage::SettingsUpdated {
                settings: f.settings("settings")?,
            }
        }
        "THEME_CHANGED" => {
            let f = Fields::new("THEME_CHANGED", map);
            HostMessage::ThemeChanged {
                theme_kind: f.parsed("themeKind", "one of light, dark, high_contrast", |s| {
                    ThemeKind::parse(s)
                })?,
            }
        }
        "CSS_UPDATED" => {
            let f = Fields::new("CSS_UPDATED", map);
            HostMessage::CssUpdated {
                css_text: f.string_array("cssText")?,
            }
        }
        "REQUEST_SELECTION" => {
            let f = Fields::new("REQUEST_SELECTION", map);
            HostMessage::RequestSelection {
                request_id: f.smol("requestId")?,
            }
        }
        "DOC_PATCH" => {
            let f = Fields::new("DOC_PATCH", map);
            HostMessage::DocPatch {
                version: f.u64("version")?,
                changes: f.changes("changes")?,
            }
        }
        "DOC_RESYNC" => {
            let f = Fields::new("DOC_RESYNC", map);
            HostMessage::DocResync {
                text: f.string("text")?,
                version: f.u64("version")?,
                reason: f.parsed(
                    "reason",
                    "one of version_mismatch, requested, external_change",
                    ResyncReason::parse,
                )?,
            }
        }
        "APPLY_EDIT_RESULT" => {
            let f = Fields::new("APPLY_EDIT_RESULT", map);
            HostMessage::ApplyEditResult {
                request_id: f.smol("requestId")?,
                applied: f.bool("applied")?,
                version: f.u64("version")?,
                error: f.opt_smol("error")?,
            }
        }
        "PREVIEW_RESULT" => {
            let f = Fields::new("PREVIEW_RESULT", map);
            HostMessage::PreviewResult {
                request_id: f.smol("requestId")?,
                title: f.string("title")?,
                text: f.string("text")?,
            }
        }
        "RESOURCE_URI_RESULT" => {
            let f = Fields::new("RESOURCE_URI_RESULT", map);
            HostMessage::ResourceUriResult {
                request_id: f.smol("requestId")?,
                ok: f.bool("ok")?,
                handle: f.opt_string("handle")?,
                error: f.opt_smol("error")?,
            }
        }
        "CREATE_ATTACHMENT_RESULT" => {
            let f = Fields::new("CREATE_ATTACHMENT_RESULT", map);
            HostMessage::CreateAttachmentResult {
                request_id: f.smol("requestId")?,
                ok: f.bool("ok")?,
                error: f.opt_smol("error")?,
            }
        }
        "ERROR" => {
            let f = Fields::new("ERROR", map);
            HostMessage::Error {
                message: f.string("message")?,
                detail: f.opt_string("detail")?,
            }
        }
        other => {
            return Err(ProtocolError::UnknownType {
                ty: other.to_string(),
            });
        }
    };
    tracing::trace!(target: "quire::protocol", message = ty, "validated inbound message");
    Ok(msg)
}

/// Validate an already-parsed surface → authority message.
pub fn validate_surface_message(value: &Value) -> Result<SurfaceMessage, ProtocolError> {
    let (ty, map) = envelope(value)?;
    let msg = match ty {
        "SURFACE_READY" => SurfaceMessage::SurfaceReady,
        "BOOT_ERROR" => {
            let f = Fields::new("BOOT_ERROR", map);
            SurfaceMessage::BootError {
                message: f.string("message")?,
                detail: f.opt_string("detail")?,
            }
        }
        "APPLY_EDIT" => {
            let f = Fields::new("APPLY_EDIT", map);
            SurfaceMessage::ApplyEdit {
                request_id: f.smol("requestId")?,
                base_version: f.u64("baseVersion")?,
                changes: f.changes("changes")?,
            }
        }
        "REQUEST_DOC_RESYNC" => SurfaceMessage::RequestDocResync,
        "OPEN_LINK" => {
            let f = Fields::new("OPEN_LINK", map);
            SurfaceMessage::OpenLink {
                href: f.string("href")?,
                from_uri: f.smol("fromUri")?,
            }
        }
        "REQUEST_PREVIEW" => {
            let f = Fields::new("REQUEST_PREVIEW", map);
            SurfaceMessage::RequestPreview {
                request_id: f.smol("requestId")?,
                href: f.string("href")?,
                from_uri: f.smol("fromUri")?,
            }
        }
        "REQUEST_SELECTION" => {
            let f = Fields::new("REQUEST_SELECTION", map);
            SurfaceMessage::RequestSelection {
                request_id: f.smol("requestId")?,
            }
        }
        "SELECTION_RESULT" => {
            let f = Fields::new("SELECTION_RESULT", map);
            let from = f.usize("from")?;
            let to = f.usize("to")?;
            if from > to {
                return Err(f.invalid("to", "offset not less than `from`"));
            }
            SurfaceMessage::SelectionResult {
                request_id: f.smol("requestId")?,
                base_version: f.u64("baseVersion")?,
                from,
                to,
                text: f.string("text")?,
                stale: f.opt_bool("stale")?.unwrap_or(false),
            }
        }
        "REQUEST_RESOURCE_URI" => {
            let f = Fields::new("REQUEST_RESOURCE_URI", map);
            SurfaceMessage::RequestResourceUri {
                request_id: f.smol("requestId")?,
                href: f.string("href")?,
                from_uri: f.smol("fromUri")?,
                kind: f.resource_kind("kind")?,
            }
        }
        "CREATE_ATTACHMENT" => {
            let f = Fields::new("CREATE_ATTACHMENT", map);
            let (insert_from, insert_to) = f.insert_range()?;
            SurfaceMessage::CreateAttachment {
                request_id: f.smol("requestId")?,
                base_version: f.u64("baseVersion")?,
                from_uri: f.smol("fromUri")?,
                insert_from,
                insert_to,
                bytes: f.base64("bytes")?,
                filename_hint: f.opt_string("filenameHint")?,
                mime: f.opt_string("mime")?,
                kind: f.resource_kind("kind")?,
            }
        }
        "INSERT_IMAGE_REFERENCE" => {
            let f = Fields::new("INSERT_IMAGE_REFERENCE", map);
            let (insert_from, insert_to) = f.insert_range()?;
            SurfaceMessage::InsertImageReference {
                request_id: f.smol("requestId")?,
                base_version: f.u64("baseVersion")?,
                from_uri: f.smol("fromUri")?,
                insert_from,
                insert_to,
                target_uri: f.string("targetUri")?,
            }
        }
        other => {
            return Err(ProtocolError::UnknownType {
                ty: other.to_string(),
            });
        }
    };
    tracing::trace!(target: "quire::protocol", message = ty, "validated inbound message");
    Ok(msg)
}

fn envelope(value: &Value) -> Result<(&str, &Map<String, Value>), ProtocolError> {
    let map = value.as_object().ok_or(ProtocolError::NotAnObject)?;
    let ty = map
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?;
    Ok((ty, map))
}

/// Typed field access over one JSON object, with error paths rooted at the
/// message type.
struct Fields<'a> {
    message: &'static str,
    prefix: String,
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn new(message: &'static str, map: &'a Map<String, Value>) -> Self {
        Self {
            message,
            prefix: String::new(),
            map,
        }
    }

    fn nested(&self, field: &str, map: &'a Map<String, Value>) -> Self {
        Self {
            message: self.message,
            prefix: format!("{}.", self.path(field)),
            map,
        }
    }

    fn path(&self, field: &str) -> String {
        format!("{}{}", self.prefix, field)
    }

    fn invalid(&self, field: &str, expected: &'static str) -> ProtocolError {
        ProtocolError::InvalidField {
            message: self.message,
            field: self.path(field),
            expected,
        }
    }

    fn required(&self, field: &str) -> Result<&'a Value, ProtocolError> {
        self.map.get(field).ok_or_else(|| ProtocolError::MissingField {
            message: self.message,
            field: self.path(field),
        })
    }

    /// Absent and explicit `null` both read as "not provided".
    fn optional(&self, field: &str) -> Option<&'a Value> {
        self.map.get(field).filter(|v| !v.is_null())
    }

    fn str(&self, field: &str) -> Result<&'a str, ProtocolError> {
        self.required(field)?
            .as_str()
            .ok_or_else(|| self.invalid(field, "string"))
    }

    fn string(&self, field: &str) -> Result<String, ProtocolError> {
        self.str(field).map(str::to_string)
    }

    fn smol(&self, field: &str) -> Result<SmolStr, ProtocolError> {
        self.str(field).map(SmolStr::new)
    }

    fn opt_string(&self, field: &str) -> Result<Option<String>, ProtocolError> {
        match self.optional(field) {
            None => Ok(None),
            Some(v) => v
                .as_str()
                .map(|s| Some(s.to_string()))
                .ok_or_else(|| self.invalid(field, "string")),
        }
    }

    fn opt_smol(&self, field: &str) -> Result<Option<SmolStr>, ProtocolError> {
        Ok(self.opt_string(field)?.map(SmolStr::from))
    }

    fn bool(&self, field: &str) -> Result<bool, ProtocolError> {
        self.required(field)?
            .as_bool()
            .ok_or_else(|| self.invalid(field, "boolean"))
    }

    fn opt_bool(&self, field: &str) -> Result<Option<bool>, ProtocolError> {
        match self.optional(field) {
            None => Ok(None),
            Some(v) => v
                .as_bool()
                .map(Some)
                .ok_or_else(|| self.invalid(field, "boolean")),
        }
    }

    fn u64(&self, field: &str) -> Result<u64, ProtocolError> {
        self.required(field)?
            .as_u64()
            .ok_or_else(|| self.invalid(field, "non-negative integer"))
    }

    fn usize(&self, field: &str) -> Result<usize, ProtocolError> {
        let n = self.u64(field)?;
        usize::try_from(n).map_err(|_| self.invalid(field, "offset within platform range"))
    }

    fn parsed<T>(
        &self,
        field: &str,
        expected: &'static str,
        parse: impl FnOnce(&str) -> Option<T>,
    ) -> Result<T, ProtocolError> {
        let raw = self.str(field)?;
        parse(raw).ok_or_else(|| self.invalid(field, expected))
    }

    fn resource_kind(&self, field: &str) -> Result<ResourceKind, ProtocolError> {
        self.parsed(field, "one of image, file", ResourceKind::parse)
    }

    fn string_array(&self, field: &str) -> Result<Vec<String>, ProtocolError> {
        let items = self
            .required(field)?
            .as_array()
            .ok_or_else(|| self.invalid(field, "array of strings"))?;
        items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| self.invalid(field, "array of strings"))
            })
            .collect()
    }

    fn base64(&self, field: &str) -> Result<Vec<u8>, ProtocolError> {
        let raw = self.str(field)?;
        base64::engine::general_purpose::STANDARD
            .decode(raw)
            .map_err(|_| self.invalid(field, "base64-encoded string"))
    }

    fn insert_range(&self) -> Result<(usize, usize), ProtocolError> {
        let from = self.usize("insertFrom")?;
        let to = self.usize("insertTo")?;
        if from > to {
            return Err(self.invalid("insertTo", "offset not less than `insertFrom`"));
        }
        Ok((from, to))
    }

    fn changes(&self, field: &str) -> Result<Vec<TextChange>, ProtocolError> {
        let items = self
            .required(field)?
            .as_array()
            .ok_or_else(|| self.invalid(field, "array of text changes"))?;

        items
            .iter()
            .enumerate()
            .map(|(i, item)| -> Result<TextChange, ProtocolError> {
                let key = format!("{}[{}]", field, i);
                let obj = item
                    .as_object()
                    .ok_or_else(|| self.invalid(&key, "text change object"))?;
                let f = self.nested(&key, obj);
                Ok(TextChange {
                    offset: f.usize("rangeOffset")?,
                    length: f.usize("rangeLength")?,
                    inserted_text: f.string("text")?,
                })
            })
            .collect()
    }

    fn settings(&self, field: &str) -> Result<EditorSettings, ProtocolError> {
        let obj = self
            .required(field)?
            .as_object()
            .ok_or_else(|| self.invalid(field, "settings object"))?;
        let f = self.nested(field, obj);
        let viewport_margin = f.u64("viewportMargin")?;
        Ok(EditorSettings {
            syntax_visibility: f.parsed(
                "syntaxVisibility",
                "one of show, dim, selection",
                SyntaxVisibility::parse,
            )?,
            allow_external_resources: f.bool("allowExternalResources")?,
            viewport_margin: u32::try_from(viewport_margin)
                .map_err(|_| f.invalid("viewportMargin", "32-bit line count"))?,
            render_tables: f.bool("renderTables")?,
            render_images: f.bool("renderImages")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::encode;

    fn settings_json() -> Value {
        json!({
            "syntaxVisibility": "selection",
            "allowExternalResources": false,
            "viewportMargin": 20,
            "renderTables": true,
            "renderImages": true,
        })
    }

    #[test]
    fn test_bare_changes() {
        let changes =
            decode_changes(r#"[{"rangeOffset":2,"rangeLength":1,"text":"x"}]"#).unwrap();
        assert_eq!(changes, vec![TextChange::replace(2..3, "x")]);

        let err = decode_changes(r#"[{"rangeOffset":2,"text":"x"}]"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "edit: missing required field `changes[0].rangeLength`"
        );
    }

    #[test]
    fn test_init_decodes() {
        let raw = json!({
            "type": "INIT",
            "documentUri": "file:///notes.md",
            "text": "# Hi",
            "version": 4,
            "settings": settings_json(),
            "cssText": ["body{}"],
        });
        let msg = validate_host_message(&raw).unwrap();
        assert_eq!(
            msg,
            HostMessage::Init {
                document_uri: "file:///notes.md".into(),
                text: "# Hi".into(),
                version: 4,
                settings: EditorSettings::default(),
                css_text: vec!["body{}".into()],
            }
        );
    }

    #[test]
    fn test_host_messages_survive_encode_decode() {
        let msg = HostMessage::DocPatch {
            version: 9,
            changes: vec![TextChange::replace(3..5, "ok")],
        };
        let raw = encode(&msg).unwrap();
        assert_eq!(decode_host_message(&raw).unwrap(), msg);
    }

    #[test]
    fn test_surface_messages_survive_encode_decode() {
        let msg = SurfaceMessage::CreateAttachment {
            request_id: "r5".into(),
            base_version: 2,
            from_uri: "file:///a.md".into(),
            insert_from: 1,
            insert_to: 4,
            bytes: vec![0, 159, 146, 150],
            filename_hint: Some("paste.png".into()),
            mime: None,
            kind: ResourceKind::Image,
        };
        let raw = encode(&msg).unwrap();
        assert_eq!(decode_surface_message(&raw).unwrap(), msg);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = validate_host_message(&json!({"type": "DOC_EXPLODE"})).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownType { ty } if ty == "DOC_EXPLODE"));
    }

    #[test]
    fn test_missing_type_rejected() {
        let err = validate_surface_message(&json!({"requestId": "r1"})).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingType));
        let err = validate_surface_message(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, ProtocolError::NotAnObject));
    }

    #[test]
    fn test_missing_field_names_path() {
        let err = validate_surface_message(&json!({
            "type": "APPLY_EDIT",
            "requestId": "r1",
            "changes": [],
        }))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "APPLY_EDIT: missing required field `baseVersion`"
        );
    }

    #[test]
    fn test_mistyped_nested_change_names_path() {
        let err = validate_surface_message(&json!({
            "type": "APPLY_EDIT",
            "requestId": "r1",
            "baseVersion": 0,
            "changes": [
                {"rangeOffset": 0, "rangeLength": 0, "text": "a"},
                {"rangeOffset": 1, "rangeLength": -1, "text": "b"},
            ],
        }))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "APPLY_EDIT.changes[1].rangeLength: expected non-negative integer"
        );
    }

    #[test]
    fn test_settings_field_not_defaulted() {
        let mut settings = settings_json();
        settings.as_object_mut().unwrap().remove("renderTables");
        let err = validate_host_message(&json!({
            "type": "SETTINGS_UPDATED",
            "settings": settings,
        }))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "SETTINGS_UPDATED: missing required field `settings.renderTables`"
        );
    }

    #[test]
    fn test_bad_resync_reason() {
        let err = validate_host_message(&json!({
            "type": "DOC_RESYNC",
            "text": "",
            "version": 1,
            "reason": "because",
        }))
        .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidField { field, .. } if field == "reason"));
    }

    #[test]
    fn test_optional_null_accepted() {
        let msg = validate_host_message(&json!({
            "type": "APPLY_EDIT_RESULT",
            "requestId": "r1",
            "applied": true,
            "version": 1,
            "error": null,
        }))
        .unwrap();
        assert!(matches!(msg, HostMessage::ApplyEditResult { error: None, .. }));
    }

    #[test]
    fn test_selection_result_stale_defaults_false() {
        let msg = validate_surface_message(&json!({
            "type": "SELECTION_RESULT",
            "requestId": "q1",
            "baseVersion": 3,
            "from": 2,
            "to": 5,
            "text": "abc",
        }))
        .unwrap();
        assert!(matches!(msg, SurfaceMessage::SelectionResult { stale: false, .. }));
    }

    #[test]
    fn test_inverted_selection_rejected() {
        let err = validate_surface_message(&json!({
            "type": "SELECTION_RESULT",
            "requestId": "q1",
            "baseVersion": 3,
            "from": 5,
            "to": 2,
            "text": "",
        }))
        .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidField { field, .. } if field == "to"));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            decode_host_message("{not json"),
            Err(ProtocolError::Json(_))
        ));
    }
}
