//! Editor settings pushed from the authority.

use serde::Serialize;

/// How dimmable markup is presented.
///
/// Only controls dimming. Structural replacements (tables, fences, widgets)
/// always follow the selection-overlap rule regardless of this mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyntaxVisibility {
    /// Markup is shown at full strength.
    Show,
    /// Markup is always dimmed.
    Dim,
    /// Markup is dimmed only when the selection does not touch it.
    #[default]
    Selection,
}

impl SyntaxVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Show => "show",
            Self::Dim => "dim",
            Self::Selection => "selection",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "show" => Some(Self::Show),
            "dim" => Some(Self::Dim),
            "selection" => Some(Self::Selection),
            _ => None,
        }
    }

    /// Whether markup covering a span should be dimmed, given whether the
    /// selection overlaps that span.
    pub fn dims(&self, overlapped: bool) -> bool {
        match self {
            Self::Show => false,
            Self::Dim => true,
            Self::Selection => !overlapped,
        }
    }
}

/// Surface-facing settings.
///
/// Every field is required on the wire; `Default` exists for in-process
/// construction only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSettings {
    pub syntax_visibility: SyntaxVisibility,
    pub allow_external_resources: bool,
    /// Lines rendered above and below the visible viewport.
    pub viewport_margin: u32,
    pub render_tables: bool,
    pub render_images: bool,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            syntax_visibility: SyntaxVisibility::default(),
            allow_external_resources: false,
            viewport_margin: 20,
            render_tables: true,
            render_images: true,
        }
    }
}
