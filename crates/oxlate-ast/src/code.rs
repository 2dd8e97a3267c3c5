//! Inline codes carried inside coded text
//!
//! A code stands for markup that a translator must keep but must not edit:
//! run boundaries, tabs, hyperlinks, field markers and so on. Codes are
//! numbered per text unit; an opening and its closing code share one id.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a code relative to the content it marks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagType {
    /// Starts a span (`<run1>`)
    Opening,
    /// Ends the span opened by the code with the same id (`</run1>`)
    Closing,
    /// Stand-alone markup (`<tab2/>`)
    Isolated,
    /// Stand-alone markup that refers to separately extracted units
    Placeholder,
}

/// What kind of markup a code represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeKind {
    /// A formatting run boundary
    Run,
    /// A tab character kept as markup
    Tab,
    /// A line, page or column break
    LineBreak,
    /// Hyperlink boundary
    Hyperlink,
    /// Simple or complex field marker
    Field,
    /// Smart tag or custom XML boundary
    SmartTag,
    /// Text box or drawing holding nested paragraphs
    TextBox,
    /// Bookmark start or end
    Bookmark,
    /// Any other markup passed through opaquely
    Markup,
}

impl CodeKind {
    /// Short name used in coded-text markers
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeKind::Run => "run",
            CodeKind::Tab => "tab",
            CodeKind::LineBreak => "br",
            CodeKind::Hyperlink => "link",
            CodeKind::Field => "field",
            CodeKind::SmartTag => "tag",
            CodeKind::TextBox => "box",
            CodeKind::Bookmark => "bookmark",
            CodeKind::Markup => "x",
        }
    }
}

/// A single inline code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Code {
    /// Id local to the owning text unit, starting at 1
    pub id: u32,
    /// Opening, closing, isolated or placeholder
    pub tag_type: TagType,
    /// Markup category
    pub kind: CodeKind,
    /// Verbatim XML this code stands for
    pub outer_data: String,
    /// Ids of text units extracted from inside this markup
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub referents: Vec<String>,
}

impl Code {
    /// Create a code without referents
    pub fn new(id: u32, tag_type: TagType, kind: CodeKind, outer_data: impl Into<String>) -> Self {
        Self {
            id,
            tag_type,
            kind,
            outer_data: outer_data.into(),
            referents: Vec::new(),
        }
    }

    /// Create an opening code
    pub fn opening(id: u32, kind: CodeKind, outer_data: impl Into<String>) -> Self {
        Self::new(id, TagType::Opening, kind, outer_data)
    }

    /// Create a closing code
    pub fn closing(id: u32, kind: CodeKind, outer_data: impl Into<String>) -> Self {
        Self::new(id, TagType::Closing, kind, outer_data)
    }

    /// Create an isolated code
    pub fn isolated(id: u32, kind: CodeKind, outer_data: impl Into<String>) -> Self {
        Self::new(id, TagType::Isolated, kind, outer_data)
    }

    /// Create a placeholder code linked to referent units
    pub fn placeholder(
        id: u32,
        kind: CodeKind,
        outer_data: impl Into<String>,
        referents: Vec<String>,
    ) -> Self {
        Self {
            referents,
            ..Self::new(id, TagType::Placeholder, kind, outer_data)
        }
    }

    /// Whether this code links to separately extracted units
    pub fn has_referents(&self) -> bool {
        !self.referents.is_empty()
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind.as_str();
        match self.tag_type {
            TagType::Opening => write!(f, "<{}{}>", kind, self.id),
            TagType::Closing => write!(f, "</{}{}>", kind, self.id),
            TagType::Isolated | TagType::Placeholder => write!(f, "<{}{}/>", kind, self.id),
        }
    }
}
