//! Skeletons: everything around the extracted text
//!
//! A [`PartSkeleton`] is the markup of one part as a list of raw segments
//! and references to text units. Each unit has a [`UnitSkeleton`] holding
//! its original markup and what is needed to rebuild it from coded text:
//! the base run shape and, per code id, the markup the code stands for.
//!
//! Rendering never goes back to the parsed paragraphs. A paragraph whose
//! units are all unchanged re-emits its markup as read from the part,
//! before any filtering or run merging. A changed unit is rebuilt by
//! [`RunWriter`].

use std::collections::HashMap;

use oxlate_ast::{Code, Fragment, TagType, TextFragment};
use quick_xml::escape::{escape, partial_escape};

use crate::block::needs_preserve;
use crate::xml::StartTag;

/// A piece of a skeleton
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Markup emitted as-is
    Raw(String),
    /// Reference to a text unit by id
    Unit(String),
    /// A top-level paragraph with its source markup
    Block(Box<SourceBlock>),
}

/// A paragraph kept as read, with its rebuilt form
///
/// `source` is emitted while every unit in `units` renders as extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBlock {
    /// Markup as read from the part
    pub source: String,
    /// Units of the paragraph, nested units included
    pub units: Vec<String>,
    /// Markup after simplification, with unit references
    pub segments: Vec<Segment>,
}

/// How a unit's markup is rebuilt from coded text
#[derive(Debug, Clone)]
pub enum UnitBody {
    /// Character data only (document properties, comment text)
    Plain,
    /// An attribute value between quotes
    Attribute,
    /// Runs of a paragraph
    Runs(RunsBody),
}

/// Rebuild information for a paragraph unit
#[derive(Debug, Clone, Default)]
pub struct RunsBody {
    /// Shape of the run that holds bare text
    pub base: Option<RunShape>,
    /// Markup of each code, by id
    pub codes: HashMap<u32, CodeSkeleton>,
    /// Characters that stand for elements (`\t` for `<w:tab/>`)
    pub char_codes: Vec<(char, String)>,
    /// Whether text elements take `xml:space="preserve"`
    pub preserve_space: bool,
}

/// Markup of a run, without its text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunShape {
    /// Run start tag and properties; empty for bare text
    pub run_open: String,
    /// Text element start tag
    pub text_open: StartTag,
    /// Run end tag; empty for bare text
    pub run_close: String,
}

/// What a code stands for
#[derive(Debug, Clone)]
pub enum CodeSkeleton {
    /// A formatted run (paired codes)
    Run(RunShape),
    /// A run container (paired codes)
    Container {
        /// Start markup
        open: String,
        /// End markup
        close: String,
    },
    /// Markup between runs
    BlockLevel(Vec<Segment>),
    /// Markup inside a run
    InRun(Vec<Segment>),
}

/// Skeleton of one unit
#[derive(Debug, Clone)]
pub struct UnitSkeleton {
    /// Markup of the unit as extracted
    pub original: Vec<Segment>,
    /// Coded text as extracted
    pub source: TextFragment,
    /// Rebuild information
    pub body: UnitBody,
}

/// Skeleton of one part
#[derive(Debug, Clone, Default)]
pub struct PartSkeleton {
    /// Part markup with unit references
    pub segments: Vec<Segment>,
    units: HashMap<String, UnitSkeleton>,
}

impl PartSkeleton {
    /// Create an empty skeleton
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw markup
    pub fn push_raw(&mut self, raw: &str) {
        crate::block::push_raw(&mut self.segments, raw);
    }

    /// Append segments
    pub fn extend(&mut self, segments: Vec<Segment>) {
        for segment in segments {
            crate::block::push_segment(&mut self.segments, segment);
        }
    }

    /// Register a unit skeleton
    pub fn insert_unit(&mut self, id: impl Into<String>, unit: UnitSkeleton) {
        self.units.insert(id.into(), unit);
    }

    /// Skeleton of a unit
    pub fn unit(&self, id: &str) -> Option<&UnitSkeleton> {
        self.units.get(id)
    }

    /// Number of unit skeletons
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Render the part; units without a target render as extracted
    pub fn render(&self, targets: &HashMap<String, TextFragment>) -> String {
        let mut out = String::new();
        self.render_segments(&self.segments, targets, &mut out);
        out
    }

    fn render_segments(
        &self,
        segments: &[Segment],
        targets: &HashMap<String, TextFragment>,
        out: &mut String,
    ) {
        for segment in segments {
            match segment {
                Segment::Raw(raw) => out.push_str(raw),
                Segment::Unit(id) => self.render_unit(id, targets, out),
                Segment::Block(block) => {
                    if block.units.iter().all(|id| !self.is_changed(id, targets)) {
                        out.push_str(&block.source);
                    } else {
                        self.render_segments(&block.segments, targets, out);
                    }
                }
            }
        }
    }

    /// Whether a unit has a target that differs from its source
    fn is_changed(&self, id: &str, targets: &HashMap<String, TextFragment>) -> bool {
        match (self.units.get(id), targets.get(id)) {
            (Some(unit), Some(target)) => *target != unit.source,
            _ => false,
        }
    }

    fn render_unit(&self, id: &str, targets: &HashMap<String, TextFragment>, out: &mut String) {
        let Some(unit) = self.units.get(id) else {
            return;
        };
        let target = match targets.get(id) {
            Some(target) if self.is_changed(id, targets) => target,
            _ => return self.render_segments(&unit.original, targets, out),
        };
        match &unit.body {
            UnitBody::Plain => out.push_str(&partial_escape(target.text().as_str())),
            UnitBody::Attribute => out.push_str(&escape(target.text().as_str())),
            UnitBody::Runs(body) => {
                let mut writer = RunWriter::new(self, body, targets);
                writer.write(target);
                out.push_str(&writer.finish());
            }
        }
    }
}

// ============================================================================
// Rebuilding changed units
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    InsideRun,
    InsideText,
}

/// Rebuilds run markup from coded text
///
/// Bare text goes into the current run shape: the innermost open run code,
/// or the base run. Text is buffered until its element closes so that
/// `xml:space="preserve"` can be decided on the whole text.
pub struct RunWriter<'a> {
    skeleton: &'a PartSkeleton,
    body: &'a RunsBody,
    targets: &'a HashMap<String, TextFragment>,
    out: String,
    state: State,
    text: String,
    /// Shape of the run currently open, if any
    open_shape: Option<&'a RunShape>,
    runs: Vec<(u32, &'a RunShape)>,
    containers: Vec<(u32, &'a str)>,
}

impl<'a> RunWriter<'a> {
    fn new(
        skeleton: &'a PartSkeleton,
        body: &'a RunsBody,
        targets: &'a HashMap<String, TextFragment>,
    ) -> Self {
        Self {
            skeleton,
            body,
            targets,
            out: String::new(),
            state: State::Idle,
            text: String::new(),
            open_shape: None,
            runs: Vec::new(),
            containers: Vec::new(),
        }
    }

    fn write(&mut self, content: &TextFragment) {
        for fragment in content.fragments() {
            match fragment {
                Fragment::Text(text) => self.write_text(text),
                Fragment::Code(code) => self.write_code(code),
            }
        }
    }

    fn write_text(&mut self, text: &str) {
        let body = self.body;
        for c in text.chars() {
            match body.char_codes.iter().find(|(ch, _)| *ch == c) {
                Some((_, xml)) => {
                    self.open_run();
                    self.close_text();
                    self.out.push_str(xml);
                }
                None => {
                    self.open_text();
                    self.text.push(c);
                }
            }
        }
    }

    fn write_code(&mut self, code: &Code) {
        let body = self.body;
        let Some(skeleton) = body.codes.get(&code.id) else {
            self.close_run();
            self.out.push_str(&code.outer_data);
            return;
        };
        match (skeleton, code.tag_type) {
            (CodeSkeleton::Run(shape), TagType::Opening) => {
                self.close_run();
                self.runs.push((code.id, shape));
            }
            (CodeSkeleton::Run(_), _) => {
                self.close_run();
                if let Some(pos) = self.runs.iter().rposition(|(id, _)| *id == code.id) {
                    self.runs.remove(pos);
                }
            }
            (CodeSkeleton::Container { open, close }, TagType::Opening) => {
                self.close_run();
                self.out.push_str(open);
                self.containers.push((code.id, close));
            }
            (CodeSkeleton::Container { .. }, _) => {
                self.close_run();
                if let Some(pos) = self.containers.iter().rposition(|(id, _)| *id == code.id) {
                    let (_, close) = self.containers.remove(pos);
                    self.out.push_str(close);
                }
            }
            (CodeSkeleton::BlockLevel(segments), _) => {
                self.close_run();
                self.skeleton.render_segments(segments, self.targets, &mut self.out);
            }
            (CodeSkeleton::InRun(segments), _) => {
                self.open_run();
                self.close_text();
                self.skeleton.render_segments(segments, self.targets, &mut self.out);
            }
        }
    }

    fn current_shape(&self) -> Option<&'a RunShape> {
        self.runs
            .last()
            .map(|(_, shape)| *shape)
            .or(self.body.base.as_ref())
    }

    fn open_run(&mut self) {
        if self.state == State::Idle {
            self.open_shape = self.current_shape();
            if let Some(shape) = self.open_shape {
                self.out.push_str(&shape.run_open);
            }
            self.state = State::InsideRun;
        }
    }

    fn open_text(&mut self) {
        self.open_run();
        self.state = State::InsideText;
    }

    fn close_text(&mut self) {
        if self.state != State::InsideText {
            return;
        }
        let text = std::mem::take(&mut self.text);
        if !text.is_empty() {
            match self.open_shape {
                Some(shape) => {
                    let mut open = shape.text_open.clone();
                    open.self_closing = false;
                    if self.body.preserve_space
                        && needs_preserve(&text)
                        && open.attr("xml:space").is_none()
                    {
                        open.push_attr("xml:space", "preserve");
                    }
                    open.write_to(&mut self.out);
                    self.out.push_str(&partial_escape(text.as_str()));
                    self.out.push_str(&open.end_tag());
                }
                None => self.out.push_str(&partial_escape(text.as_str())),
            }
        }
        self.state = State::InsideRun;
    }

    fn close_run(&mut self) {
        self.close_text();
        if self.state == State::InsideRun {
            if let Some(shape) = self.open_shape.take() {
                self.out.push_str(&shape.run_close);
            }
            self.state = State::Idle;
        }
    }

    fn finish(mut self) -> String {
        self.close_run();
        while let Some((_, close)) = self.containers.pop() {
            self.out.push_str(close);
        }
        self.out
    }
}
