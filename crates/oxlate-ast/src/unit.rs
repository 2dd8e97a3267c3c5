//! Text units: the translatable content of one paragraph-like block
//!
//! A [`TextUnit`] holds coded text, plain text interleaved with [`Code`]
//! markers. Units extracted from inside other markup (text boxes, for
//! instance) are flagged as referents and linked from a placeholder code
//! in their parent unit.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::code::{Code, TagType};

/// One piece of coded text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fragment {
    /// Literal translatable text
    Text(String),
    /// Inline markup
    Code(Code),
}

/// Plain text interleaved with inline codes
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextFragment {
    fragments: Vec<Fragment>,
}

impl TextFragment {
    /// Create an empty fragment
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fragment holding only text
    pub fn from_text(text: impl Into<String>) -> Self {
        let mut fragment = Self::new();
        fragment.push_text(text);
        fragment
    }

    /// Append text, joining it to a preceding text piece
    pub fn push_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        if let Some(Fragment::Text(last)) = self.fragments.last_mut() {
            last.push_str(&text);
        } else {
            self.fragments.push(Fragment::Text(text));
        }
    }

    /// Append a code
    pub fn push_code(&mut self, code: Code) {
        self.fragments.push(Fragment::Code(code));
    }

    /// Append all pieces of another fragment
    pub fn append(&mut self, other: &TextFragment) {
        for fragment in &other.fragments {
            match fragment {
                Fragment::Text(text) => self.push_text(text.as_str()),
                Fragment::Code(code) => self.push_code(code.clone()),
            }
        }
    }

    /// Pieces in order
    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Iterate over the codes in order
    pub fn codes(&self) -> impl Iterator<Item = &Code> {
        self.fragments.iter().filter_map(|f| match f {
            Fragment::Code(code) => Some(code),
            Fragment::Text(_) => None,
        })
    }

    /// The text without any codes
    pub fn text(&self) -> String {
        self.fragments
            .iter()
            .filter_map(|f| match f {
                Fragment::Text(text) => Some(text.as_str()),
                Fragment::Code(_) => None,
            })
            .collect()
    }

    /// Whether there is any text at all
    pub fn has_text(&self) -> bool {
        self.fragments
            .iter()
            .any(|f| matches!(f, Fragment::Text(t) if !t.is_empty()))
    }

    /// Whether the fragment is empty
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Check that every opening code is closed by a later code with the same
    /// id, and that no closing code appears without its opening
    pub fn is_balanced(&self) -> bool {
        let mut open: Vec<u32> = Vec::new();
        let mut seen = HashSet::new();
        for code in self.codes() {
            match code.tag_type {
                TagType::Opening => {
                    if !seen.insert(code.id) {
                        return false;
                    }
                    open.push(code.id);
                }
                TagType::Closing => match open.iter().rposition(|id| *id == code.id) {
                    Some(pos) => {
                        open.remove(pos);
                    }
                    None => return false,
                },
                TagType::Isolated | TagType::Placeholder => {}
            }
        }
        open.is_empty()
    }

    /// Rewrite every text piece, keeping codes in place
    ///
    /// Useful for pseudo-translation and tests.
    pub fn map_text<F>(&self, mut f: F) -> TextFragment
    where
        F: FnMut(&str) -> String,
    {
        let mut out = TextFragment::new();
        for fragment in &self.fragments {
            match fragment {
                Fragment::Text(text) => out.push_text(f(text)),
                Fragment::Code(code) => out.push_code(code.clone()),
            }
        }
        out
    }
}

impl From<Vec<Fragment>> for TextFragment {
    fn from(fragments: Vec<Fragment>) -> Self {
        let mut out = TextFragment::new();
        for fragment in fragments {
            match fragment {
                Fragment::Text(text) => out.push_text(text),
                Fragment::Code(code) => out.push_code(code),
            }
        }
        out
    }
}

impl fmt::Display for TextFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for fragment in &self.fragments {
            match fragment {
                Fragment::Text(text) => f.write_str(text)?,
                Fragment::Code(code) => write!(f, "{}", code)?,
            }
        }
        Ok(())
    }
}

/// A part of a text unit's content
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextPart {
    /// Coded text of this part
    pub content: TextFragment,
}

impl TextPart {
    /// Create a part from coded text
    pub fn new(content: TextFragment) -> Self {
        Self { content }
    }
}

/// The unit of translation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextUnit {
    /// Id unique within one document part (`tu1`, `tu2`, ...)
    pub id: String,
    /// Set when the unit was extracted from inside another unit's markup
    #[serde(default)]
    pub is_referent: bool,
    /// Source content
    pub parts: Vec<TextPart>,
    /// Translated content, when available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Vec<TextPart>>,
}

impl TextUnit {
    /// Create a unit with a single source part
    pub fn new(id: impl Into<String>, content: TextFragment) -> Self {
        Self {
            id: id.into(),
            is_referent: false,
            parts: vec![TextPart::new(content)],
            target: None,
        }
    }

    /// Mark the unit as a referent
    pub fn referent(mut self) -> Self {
        self.is_referent = true;
        self
    }

    /// Source content with all parts joined
    pub fn source(&self) -> TextFragment {
        join_parts(&self.parts)
    }

    /// Target content with all parts joined, if translated
    pub fn target(&self) -> Option<TextFragment> {
        self.target.as_deref().map(join_parts)
    }

    /// Target content when present, otherwise the source
    pub fn effective(&self) -> TextFragment {
        self.target().unwrap_or_else(|| self.source())
    }

    /// Replace the target with a single part
    pub fn set_target(&mut self, content: TextFragment) {
        self.target = Some(vec![TextPart::new(content)]);
    }

    /// Plain source text
    pub fn source_text(&self) -> String {
        self.source().text()
    }
}

fn join_parts(parts: &[TextPart]) -> TextFragment {
    let mut joined = TextFragment::new();
    for part in parts {
        joined.append(&part.content);
    }
    joined
}
