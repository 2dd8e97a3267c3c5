//! Paragraph model
//!
//! A [`Block`] is one paragraph-like element (`w:p`, `a:p`, a shared string
//! `si`) broken into chunks: block-level markup, runs and run containers.
//! Every chunk carries the exact markup it was parsed from, including the
//! whitespace in front of it, so [`Block::to_segments`] reproduces the
//! filtered input exactly. Runs also carry their resolved formatting, which
//! the simplifier compares to decide merges.

use crate::run_properties::RunProperties;
use crate::skeleton::Segment;
use crate::xml::{prefix, StartTag};

/// Markup vocabulary of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockFormat {
    /// WordprocessingML paragraph
    Word,
    /// DrawingML paragraph (slides, charts, diagrams)
    Drawing,
    /// SpreadsheetML rich text (shared strings, comments)
    Spreadsheet,
}

/// One paragraph-like element
#[derive(Debug, Clone)]
pub struct Block {
    /// Markup vocabulary
    pub format: BlockFormat,
    /// Children in document order
    pub chunks: Vec<Chunk>,
    /// Paragraph style id, or `kind:level` for presentation text
    pub paragraph_style: Option<String>,
    /// Established language as property comparison keys
    pub language: Vec<(String, String)>,
    /// Whether the block is excluded from extraction
    pub hidden: bool,
}

/// A child of a block or container
#[derive(Debug, Clone)]
pub enum Chunk {
    /// Block-level markup with no text of its own
    Markup(Markup),
    /// A run
    Run(Run),
    /// An element grouping runs (hyperlink, smart tag, ...)
    Container(Container),
}

/// Block-level markup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markup {
    /// What the markup is
    pub kind: MarkupKind,
    /// Source text, including leading whitespace
    pub xml: String,
}

/// Classification of block-level markup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupKind {
    /// Block start tag and paragraph properties
    BlockStart,
    /// Block end tag
    BlockEnd,
    /// Bookmark start or end
    Bookmark,
    /// DrawingML line break (`a:br`)
    LineBreak,
    /// DrawingML field (`a:fld`)
    Field,
    /// Anything else
    Other,
}

/// Classification of a run container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// `w:hyperlink`
    Hyperlink,
    /// `w:smartTag`
    SmartTag,
    /// `w:fldSimple`
    Field,
    /// `m:oMath`, `m:oMathPara`
    Math,
    /// `w:customXml`, `w:sdt`, `w:sdtContent`, `w:dir`, `w:bdo`
    Other,
}

/// An element grouping runs
#[derive(Debug, Clone)]
pub struct Container {
    /// What the container is
    pub kind: ContainerKind,
    /// Leading whitespace and start tag
    pub open: String,
    /// Children in document order
    pub chunks: Vec<Chunk>,
    /// Trailing whitespace and end tag; empty for an empty-element tag
    pub close: String,
}

/// A run of text sharing one set of formatting
#[derive(Debug, Clone)]
pub struct Run {
    /// Whitespace before the run
    pub lead: String,
    /// Run start tag; `None` for a bare SpreadsheetML `t`
    pub start: Option<StartTag>,
    /// Direct properties
    pub properties: RunProperties,
    /// Effective properties after style resolution
    pub combined: RunProperties,
    /// Content in document order
    pub body: Vec<RunChunk>,
    /// Trailing whitespace and end tag
    pub close: String,
    /// Office Math run
    pub math: bool,
    /// Formatted hidden or in an excluded style
    pub hidden: bool,
    /// Holds complex field characters or instructions
    pub complex: bool,
    /// Sits in a field instruction, or in the result of a field whose
    /// result is not extracted
    pub in_field_code: bool,
}

/// Run content
#[derive(Debug, Clone)]
pub enum RunChunk {
    /// Text
    Text(RunText),
    /// Non-text run content (tab, break, drawing, field character, ...)
    Code(RunCode),
}

/// Text content of a run
#[derive(Debug, Clone)]
pub struct RunText {
    /// Whitespace before the text element
    pub lead: String,
    /// Text element start tag; `None` when the text stands for an element
    /// converted to a character (a tab becoming `\t`)
    pub open: Option<StartTag>,
    /// Decoded text
    pub text: String,
    /// Exact source markup, without the lead
    pub xml: String,
    /// Whether `xml:space="preserve"` was present
    pub preserve: bool,
}

impl RunText {
    /// Text element holding `text`, with the markup generated from `open`
    pub fn generated(lead: String, mut open: StartTag, text: String, allow_preserve: bool) -> Self {
        open.self_closing = false;
        let preserve = open.attr("xml:space") == Some("preserve")
            || (allow_preserve && needs_preserve(&text));
        if preserve && allow_preserve && open.attr("xml:space").is_none() {
            open.push_attr("xml:space", "preserve");
        }
        let mut xml = open.to_xml();
        xml.push_str(&quick_xml::escape::partial_escape(text.as_str()));
        xml.push_str(&open.end_tag());
        Self {
            lead,
            open: Some(open),
            text,
            xml,
            preserve,
        }
    }
}

/// Non-text run content
#[derive(Debug, Clone)]
pub struct RunCode {
    /// What the content is
    pub kind: RunCodeKind,
    /// Markup, possibly holding nested paragraphs (text boxes)
    pub items: Vec<MarkupItem>,
}

/// Classification of non-text run content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunCodeKind {
    /// `w:tab`
    Tab,
    /// `w:br`, `w:cr`
    Break,
    /// `w:fldChar` begin
    FieldBegin,
    /// `w:fldChar` separate
    FieldSeparate,
    /// `w:fldChar` end
    FieldEnd,
    /// `w:instrText` and text inside a field instruction
    FieldInstruction,
    /// Markup holding nested paragraphs
    Nested,
    /// Anything else
    Other,
}

/// A piece of run code markup
#[derive(Debug, Clone)]
pub enum MarkupItem {
    /// Raw markup
    Raw(String),
    /// A nested paragraph
    Block(Box<Block>),
    /// A translatable attribute value (drawing names, WordArt strings)
    Attribute(AttributeText),
}

/// Value of a translatable attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeText {
    /// Decoded value
    pub text: String,
    /// Value as written between the quotes
    pub raw: String,
}

/// Content nested in run markup, handed to segment writers
#[derive(Debug, Clone, Copy)]
pub enum Nested<'a> {
    /// A paragraph inside a text box
    Block(&'a Block),
    /// An attribute value
    Attribute(&'a AttributeText),
}

/// Render nested content unchanged
pub fn write_nested(nested: Nested<'_>, out: &mut Vec<Segment>) {
    match nested {
        Nested::Block(b) => {
            for segment in b.to_segments() {
                push_segment(out, segment);
            }
        }
        Nested::Attribute(a) => push_raw(out, &a.raw),
    }
}

/// Whether text needs `xml:space="preserve"` to keep its edges
pub fn needs_preserve(text: &str) -> bool {
    let edge = |c: Option<char>| c.is_some_and(char::is_whitespace);
    edge(text.chars().next()) || edge(text.chars().last())
}

// ============================================================================
// Queries
// ============================================================================

impl Block {
    /// Create an empty block
    pub fn new(format: BlockFormat) -> Self {
        Self {
            format,
            chunks: Vec::new(),
            paragraph_style: None,
            language: Vec::new(),
            hidden: false,
        }
    }

    /// Whether visible runs hold anything but whitespace
    pub fn has_text(&self) -> bool {
        let mut text = String::new();
        if !self.hidden {
            collect_text(&self.chunks, &mut text);
        }
        text.chars().any(|c| !c.is_whitespace())
    }

    /// Whether the block or its nested blocks hold extractable text
    pub fn has_any_text(&self) -> bool {
        self.has_text() || self.nested_blocks().iter().any(|b| b.has_any_text())
    }

    /// Nested blocks directly inside this block's runs
    pub fn nested_blocks(&self) -> Vec<&Block> {
        let mut out = Vec::new();
        collect_nested(&self.chunks, &mut out);
        out
    }

    /// Serialize as segments (nested blocks inline)
    pub fn to_segments(&self) -> Vec<Segment> {
        let mut out = Vec::new();
        for chunk in &self.chunks {
            chunk.write_segments(&mut out, &mut write_nested);
        }
        out
    }

    /// Serialize back to markup
    pub fn to_xml(&self) -> String {
        self.to_segments()
            .into_iter()
            .map(|s| match s {
                Segment::Raw(raw) => raw,
                Segment::Unit(_) | Segment::Block(_) => String::new(),
            })
            .collect()
    }
}

fn collect_text(chunks: &[Chunk], out: &mut String) {
    for chunk in chunks {
        match chunk {
            Chunk::Run(run) if run.has_text() => out.push_str(&run.text()),
            Chunk::Container(c) => collect_text(&c.chunks, out),
            _ => {}
        }
    }
}

fn collect_nested<'a>(chunks: &'a [Chunk], out: &mut Vec<&'a Block>) {
    for chunk in chunks {
        match chunk {
            Chunk::Run(run) => {
                for code in run.codes() {
                    out.extend(code.blocks());
                }
            }
            Chunk::Container(c) => collect_nested(&c.chunks, out),
            Chunk::Markup(_) => {}
        }
    }
}

/// Append a segment, joining adjacent raw markup
pub fn push_segment(out: &mut Vec<Segment>, segment: Segment) {
    match (out.last_mut(), segment) {
        (Some(Segment::Raw(last)), Segment::Raw(raw)) => last.push_str(&raw),
        (_, Segment::Raw(raw)) if raw.is_empty() => {}
        (_, segment) => out.push(segment),
    }
}

/// Append raw markup to a segment list
pub fn push_raw(out: &mut Vec<Segment>, raw: &str) {
    push_segment(out, Segment::Raw(raw.to_string()));
}

impl Chunk {
    /// Serialize into segments; `nested` renders each nested block or attribute
    pub fn write_segments<F>(&self, out: &mut Vec<Segment>, nested: &mut F)
    where
        F: FnMut(Nested<'_>, &mut Vec<Segment>),
    {
        match self {
            Chunk::Markup(m) => push_raw(out, &m.xml),
            Chunk::Run(run) => run.write_segments(out, nested),
            Chunk::Container(c) => {
                push_raw(out, &c.open);
                for chunk in &c.chunks {
                    chunk.write_segments(out, nested);
                }
                push_raw(out, &c.close);
            }
        }
    }
}

impl Run {
    /// Whether the run has extractable text
    pub fn has_text(&self) -> bool {
        !self.hidden
            && !self.in_field_code
            && self
                .body
                .iter()
                .any(|c| matches!(c, RunChunk::Text(t) if !t.text.is_empty()))
    }

    /// Whether the run has no content at all
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Non-text content
    pub fn codes(&self) -> impl Iterator<Item = &RunCode> {
        self.body.iter().filter_map(|c| match c {
            RunChunk::Code(code) => Some(code),
            RunChunk::Text(_) => None,
        })
    }

    /// Whether any content holds nested paragraphs
    pub fn has_nested(&self) -> bool {
        self.codes().any(|c| c.kind == RunCodeKind::Nested)
    }

    /// Concatenated text
    pub fn text(&self) -> String {
        self.body
            .iter()
            .filter_map(|c| match c {
                RunChunk::Text(t) => Some(t.text.as_str()),
                RunChunk::Code(_) => None,
            })
            .collect()
    }

    /// Run start tag and properties
    pub fn open_xml(&self) -> String {
        let mut out = String::new();
        if let Some(start) = &self.start {
            start.write_to(&mut out);
        }
        self.properties.write_to(&mut out);
        out
    }

    /// Qualified name of the run's text element
    pub fn text_element_name(&self) -> String {
        if let Some(open) = self.body.iter().find_map(|c| match c {
            RunChunk::Text(t) => t.open.as_ref(),
            RunChunk::Code(_) => None,
        }) {
            return open.name.clone();
        }
        match self.start.as_ref().map(|s| prefix(&s.name)).filter(|p| !p.is_empty()) {
            Some(p) => format!("{p}:t"),
            None => "t".to_string(),
        }
    }

    /// Serialize into segments; `nested` renders each nested block or attribute
    pub fn write_segments<F>(&self, out: &mut Vec<Segment>, nested: &mut F)
    where
        F: FnMut(Nested<'_>, &mut Vec<Segment>),
    {
        push_raw(out, &self.lead);
        push_raw(out, &self.open_xml());
        for chunk in &self.body {
            match chunk {
                RunChunk::Text(t) => {
                    push_raw(out, &t.lead);
                    push_raw(out, &t.xml);
                }
                RunChunk::Code(code) => code.write_segments(out, nested),
            }
        }
        push_raw(out, &self.close);
    }

    /// Serialize back to markup, nested blocks included
    pub fn to_xml(&self) -> String {
        let mut out = Vec::new();
        self.write_segments(&mut out, &mut write_nested);
        out.into_iter()
            .map(|s| match s {
                Segment::Raw(raw) => raw,
                Segment::Unit(_) | Segment::Block(_) => String::new(),
            })
            .collect()
    }
}

impl RunCode {
    /// Code made of raw markup only
    pub fn raw(kind: RunCodeKind, xml: impl Into<String>) -> Self {
        Self {
            kind,
            items: vec![MarkupItem::Raw(xml.into())],
        }
    }

    /// Nested blocks in this code
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.items.iter().filter_map(|item| match item {
            MarkupItem::Block(b) => Some(b.as_ref()),
            MarkupItem::Raw(_) | MarkupItem::Attribute(_) => None,
        })
    }

    /// Serialize into segments; `nested` renders each nested block or attribute
    pub fn write_segments<F>(&self, out: &mut Vec<Segment>, nested: &mut F)
    where
        F: FnMut(Nested<'_>, &mut Vec<Segment>),
    {
        for item in &self.items {
            match item {
                MarkupItem::Raw(raw) => push_raw(out, raw),
                MarkupItem::Block(b) => nested(Nested::Block(b), out),
                MarkupItem::Attribute(a) => nested(Nested::Attribute(a), out),
            }
        }
    }

    /// Markup with nested blocks serialized inline
    pub fn to_xml(&self) -> String {
        self.items
            .iter()
            .map(|item| match item {
                MarkupItem::Raw(raw) => raw.clone(),
                MarkupItem::Block(b) => b.to_xml(),
                MarkupItem::Attribute(a) => a.raw.clone(),
            })
            .collect()
    }
}
