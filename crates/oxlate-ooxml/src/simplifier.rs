//! Paragraph simplification
//!
//! Word documents split text into far more runs than the formatting
//! requires: spell-check markers, revision wrappers, language tags and
//! editing-session attributes all break runs apart. Simplification happens
//! in two places:
//!
//! - [`MarkupFilter`] works on raw events before a paragraph is parsed and
//!   removes markup with no effect on the text (proofing marks, accepted
//!   revisions, the `_GoBack` bookmark).
//! - [`ParagraphSimplifier`] works on a parsed [`Block`] and merges adjacent
//!   runs whose effective formatting is the same.

use std::collections::HashSet;

use tracing::debug;

use crate::block::{
    needs_preserve, Block, BlockFormat, Chunk, MarkupItem, Run, RunChunk, RunCodeKind, RunText,
};
use crate::config::FilterParams;
use crate::error::{OoxmlError, Result};
use crate::run_properties::{is_language, RunProperty};
use crate::xml::{element_end, prefix, EndTag, Namespaces, Ns, StartTag, TextEvent, XmlEvent};

// ============================================================================
// Event-level rules
// ============================================================================

/// Tracked-change elements that may appear outside paragraphs
const STRUCTURE_REVISIONS: &[&str] = &[
    "ins", "del", "moveFrom", "moveTo", "cellIns", "cellDel", "cellMerge", "rPrChange",
    "pPrChange", "trPrChange", "tcPrChange", "tblPrChange", "tblPrExChange", "tblGridChange",
    "sectPrChange", "numberingChange", "moveFromRangeStart", "moveFromRangeEnd",
    "moveToRangeStart", "moveToRangeEnd",
];

/// What to do with an element
enum Action {
    Keep,
    /// Drop the element and its content
    Drop,
    /// Drop the tags, keep the content
    Unwrap,
    /// Replace the element with literal text
    Text(&'static str),
}

/// Event-level markup filter for one part
///
/// The filter remembers `_GoBack` bookmark ids across paragraphs, since a
/// bookmark may end in a later paragraph than it starts.
#[derive(Debug, Clone)]
pub struct MarkupFilter {
    accept_revisions: bool,
    ignore_soft_hyphen: bool,
    replace_no_break_hyphen: bool,
    go_back_ids: HashSet<String>,
}

impl MarkupFilter {
    /// Create a filter from the extraction options
    pub fn new(params: &FilterParams) -> Self {
        Self {
            accept_revisions: params.automatically_accept_revisions,
            ignore_soft_hyphen: params.ignore_soft_hyphen_tag,
            replace_no_break_hyphen: params.replace_no_break_hyphen_tag,
            go_back_ids: HashSet::new(),
        }
    }

    /// Filter the events of one paragraph
    ///
    /// Fails with [`OoxmlError::UnacceptedRevisions`] (without a part name)
    /// when revision markup is found and revisions are not accepted.
    pub fn apply(&mut self, events: &[XmlEvent], ns: &Namespaces) -> Result<Vec<XmlEvent>> {
        let mut out = Vec::with_capacity(events.len());
        let mut skipped_ends = HashSet::new();

        let mut i = 0;
        while i < events.len() {
            match &events[i] {
                XmlEvent::Start(tag) => match self.action(tag, ns)? {
                    Action::Keep => out.push(events[i].clone()),
                    Action::Drop => i = element_end(events, i),
                    Action::Unwrap => {
                        skipped_ends.insert(element_end(events, i));
                    }
                    Action::Text(text) => {
                        let end = element_end(events, i);
                        push_literal(&mut out, &tag.name, text);
                        i = end;
                    }
                },
                XmlEvent::End(_) if skipped_ends.contains(&i) => {}
                event => out.push(event.clone()),
            }
            i += 1;
        }
        Ok(out)
    }

    /// Check an element outside any paragraph (table, row and section markup)
    ///
    /// Such markup is kept as it is; tracked changes in it are only an error
    /// when revisions are not accepted.
    pub fn check_structure(&self, tag: &StartTag, ns: &Namespaces) -> Result<()> {
        let revision = ns.of(&tag.name) == Ns::Word && STRUCTURE_REVISIONS.contains(&tag.local_name());
        if revision && !self.accept_revisions {
            return Err(OoxmlError::UnacceptedRevisions {
                part: String::new(),
            });
        }
        Ok(())
    }

    fn action(&mut self, tag: &StartTag, ns: &Namespaces) -> Result<Action> {
        if ns.of(&tag.name) != Ns::Word {
            return Ok(Action::Keep);
        }
        let revision = match tag.local_name() {
            "ins" | "moveTo" if tag.self_closing => Some(Action::Drop),
            "ins" | "moveTo" => Some(Action::Unwrap),
            "del" | "moveFrom" | "rPrChange" | "pPrChange" | "numberingChange"
            | "moveFromRangeStart" | "moveFromRangeEnd" | "moveToRangeStart"
            | "moveToRangeEnd" => Some(Action::Drop),
            _ => None,
        };
        if let Some(action) = revision {
            if !self.accept_revisions {
                return Err(OoxmlError::UnacceptedRevisions {
                    part: String::new(),
                });
            }
            return Ok(action);
        }

        Ok(match tag.local_name() {
            "lastRenderedPageBreak" | "proofErr" => Action::Drop,
            "softHyphen" if self.ignore_soft_hyphen => Action::Drop,
            "noBreakHyphen" if self.replace_no_break_hyphen => Action::Text("-"),
            "bookmarkStart" if tag.attr_local("name") == Some("_GoBack") => {
                if let Some(id) = tag.attr_local("id") {
                    self.go_back_ids.insert(id.to_string());
                }
                Action::Drop
            }
            "bookmarkEnd" => match tag.attr_local("id") {
                Some(id) if self.go_back_ids.remove(id) => Action::Drop,
                _ => Action::Keep,
            },
            _ => Action::Keep,
        })
    }
}

/// Emit `text` as a text element in the vocabulary of `element`
fn push_literal(out: &mut Vec<XmlEvent>, element: &str, text: &str) {
    let name = match prefix(element) {
        "" => "t".to_string(),
        p => format!("{p}:t"),
    };
    out.push(XmlEvent::Start(StartTag::new(name.clone(), false)));
    out.push(XmlEvent::Text(TextEvent {
        raw: text.to_string(),
        text: text.to_string(),
        cdata: false,
    }));
    out.push(XmlEvent::End(EndTag::new(&name)));
}

// ============================================================================
// Block-level rules
// ============================================================================

/// Merges runs and drops no-effect properties in a parsed paragraph
#[derive(Debug, Clone, Default)]
pub struct ParagraphSimplifier {
    cleanup_aggressively: bool,
}

impl ParagraphSimplifier {
    /// Create a simplifier from the extraction options
    pub fn new(params: &FilterParams) -> Self {
        Self {
            cleanup_aggressively: params.cleanup_aggressively,
        }
    }

    /// Simplify a block in place, nested blocks included
    pub fn simplify(&self, block: &mut Block) {
        if block.language.is_empty() {
            block.language = first_run_language(&block.chunks);
        }
        let ctx = Context {
            language: block.language.clone(),
            allow_preserve: block.format != BlockFormat::Drawing,
        };
        self.simplify_chunks(&mut block.chunks, &ctx);
    }

    fn simplify_chunks(&self, chunks: &mut Vec<Chunk>, ctx: &Context) {
        for chunk in chunks.iter_mut() {
            match chunk {
                Chunk::Run(run) => self.normalize_run(run, ctx),
                Chunk::Container(c) => self.simplify_chunks(&mut c.chunks, ctx),
                Chunk::Markup(_) => {}
            }
        }
        chunks.retain(|c| !matches!(c, Chunk::Run(run) if run.is_empty()));

        let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
        for chunk in chunks.drain(..) {
            let mergeable = match (merged.last(), &chunk) {
                (Some(Chunk::Run(last)), Chunk::Run(run)) => self.can_merge(last, run, ctx),
                _ => false,
            };
            if !mergeable {
                merged.push(chunk);
            } else if let (Some(Chunk::Run(last)), Chunk::Run(run)) = (merged.last_mut(), chunk) {
                merge_runs(last, run, ctx);
            }
        }
        *chunks = merged;
    }

    /// Drop empty text, join adjacent text and strip no-effect properties
    fn normalize_run(&self, run: &mut Run, ctx: &Context) {
        for chunk in run.body.iter_mut() {
            if let RunChunk::Code(code) = chunk {
                for item in code.items.iter_mut() {
                    if let MarkupItem::Block(nested) = item {
                        self.simplify(nested);
                    }
                }
            }
        }
        run.body.retain(|c| match c {
            RunChunk::Text(t) => !(t.text.is_empty() && t.open.is_some()),
            RunChunk::Code(_) => true,
        });
        join_texts(run, ctx);

        if self.cleanup_aggressively {
            let text = run.text();
            let removed = run.properties.remove_where(|p| no_effect(p, &text));
            if removed {
                debug!(text = %text, "dropped no-effect run properties");
            }
        }
    }

    fn can_merge(&self, a: &Run, b: &Run, ctx: &Context) -> bool {
        let mergeable = |r: &Run| {
            r.start.as_ref().is_some_and(|s| !s.self_closing)
                && !r.math
                && !r.hidden
                && !r.complex
                && !r.in_field_code
                && !r.has_nested()
                && !r.codes().any(|c| {
                    matches!(
                        c.kind,
                        RunCodeKind::FieldBegin
                            | RunCodeKind::FieldSeparate
                            | RunCodeKind::FieldEnd
                            | RunCodeKind::Nested
                            | RunCodeKind::Other
                    )
                })
        };
        if !mergeable(a) || !mergeable(b) {
            return false;
        }
        if a.start.as_ref().map(|s| &s.name) != b.start.as_ref().map(|s| &s.name) {
            return false;
        }
        self.comparison_keys(a, ctx) == self.comparison_keys(b, ctx)
    }

    fn comparison_keys(&self, run: &Run, ctx: &Context) -> Vec<(String, String)> {
        let text = run.text();
        run.combined.comparison_keys(|p| {
            (is_language(p) && ctx.language.contains(&p.key()))
                || (self.cleanup_aggressively && no_effect(p, &text))
        })
    }
}

struct Context {
    language: Vec<(String, String)>,
    allow_preserve: bool,
}

fn first_run_language(chunks: &[Chunk]) -> Vec<(String, String)> {
    for chunk in chunks {
        match chunk {
            Chunk::Run(run) if run.has_text() => return run.properties.languages(),
            Chunk::Container(c) => {
                let found = first_run_language(&c.chunks);
                if !found.is_empty() {
                    return found;
                }
            }
            _ => {}
        }
    }
    Vec::new()
}

/// Append `b` to `a`; `a` keeps its tags and properties
fn merge_runs(a: &mut Run, b: Run, ctx: &Context) {
    debug!(left = %a.text(), right = %b.text(), "merging runs");
    a.body.extend(b.body);
    join_texts(a, ctx);
    let language = &ctx.language;
    a.properties
        .remove_where(|p| is_language(p) && language.contains(&p.key()));
}

fn join_texts(run: &mut Run, ctx: &Context) {
    let mut joined: Vec<RunChunk> = Vec::with_capacity(run.body.len());
    for chunk in run.body.drain(..) {
        if let (Some(RunChunk::Text(last)), RunChunk::Text(next)) = (joined.last_mut(), &chunk) {
            if let (Some(open), Some(_)) = (&last.open, &next.open) {
                let mut open = open.clone();
                if next.preserve && ctx.allow_preserve && open.attr("xml:space").is_none() {
                    open.push_attr("xml:space", "preserve");
                }
                let text = format!("{}{}", last.text, next.text);
                *last = RunText::generated(
                    std::mem::take(&mut last.lead),
                    open,
                    text,
                    ctx.allow_preserve,
                );
                continue;
            }
        }
        joined.push(chunk);
    }
    run.body = joined;
}

/// Properties with no visible effect, dropped by aggressive cleanup
fn no_effect(property: &RunProperty, text: &str) -> bool {
    let blank = text.chars().all(char::is_whitespace);
    match property {
        RunProperty::Element { name, .. } => match name.as_str() {
            "vertAlign" => blank || property.val() == Some("baseline"),
            "spacing" => property.val() == Some("0"),
            "noProof" => true,
            "szCs" => !text.chars().any(is_complex_script),
            _ => false,
        },
        RunProperty::Toggle { name, .. } => {
            matches!(name.as_str(), "bCs" | "iCs") && !text.chars().any(is_complex_script)
        }
        RunProperty::Attribute { value, .. } => match property.name().as_str() {
            "@err" | "@dirty" | "@noProof" | "@smtClean" => true,
            "@spc" | "@baseline" => value == "0",
            _ => false,
        },
        RunProperty::Style { .. } => false,
    }
}

/// Characters from scripts Word formats with complex-script properties
fn is_complex_script(c: char) -> bool {
    matches!(c as u32,
        0x0590..=0x08FF | 0x0900..=0x0DFF | 0x0E00..=0x0EFF | 0xFB1D..=0xFDFF | 0xFE70..=0xFEFF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{BlockParser, PartContext};
    use crate::styles::StyleDefinitions;
    use crate::xml::{events_to_xml, read_events};

    const W: &str = "xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"";

    fn filter(xml: &str, params: &FilterParams) -> Result<String> {
        let events = read_events(xml.as_bytes())?;
        let ns = Namespaces::collect(&events);
        let mut filter = MarkupFilter::new(params);
        Ok(events_to_xml(&filter.apply(&events, &ns)?))
    }

    fn simplify(xml: &str, params: &FilterParams) -> Block {
        let events = read_events(xml.as_bytes()).unwrap();
        let ns = Namespaces::collect(&events);
        let events = MarkupFilter::new(params).apply(&events, &ns).unwrap();
        let styles = StyleDefinitions::Empty;
        let parser = BlockParser::new(&ns, &styles, params);
        let mut block = parser.parse(&events, &mut PartContext::default()).unwrap();
        ParagraphSimplifier::new(params).simplify(&mut block);
        block
    }

    fn run_count(block: &Block) -> usize {
        block.chunks.iter().filter(|c| matches!(c, Chunk::Run(_))).count()
    }

    #[test]
    fn test_strips_proofing_marks() {
        let xml = format!(
            "<w:p {W}><w:proofErr w:type=\"spellStart\"/><w:r><w:lastRenderedPageBreak/><w:t>Helo</w:t></w:r><w:proofErr w:type=\"spellEnd\"/></w:p>"
        );
        let out = filter(&xml, &FilterParams::default()).unwrap();
        assert_eq!(out, format!("<w:p {W}><w:r><w:t>Helo</w:t></w:r></w:p>"));
    }

    #[test]
    fn test_accepts_revisions() {
        let xml = format!(
            "<w:p {W}><w:ins w:id=\"1\"><w:r><w:t>new</w:t></w:r></w:ins><w:del w:id=\"2\"><w:r><w:delText>old</w:delText></w:r></w:del></w:p>"
        );
        let out = filter(&xml, &FilterParams::default()).unwrap();
        assert_eq!(out, format!("<w:p {W}><w:r><w:t>new</w:t></w:r></w:p>"));
    }

    #[test]
    fn test_rejects_revisions_when_not_accepting() {
        let params = FilterParams {
            automatically_accept_revisions: false,
            ..FilterParams::default()
        };
        let xml = format!("<w:p {W}><w:ins w:id=\"1\"><w:r><w:t>new</w:t></w:r></w:ins></w:p>");
        let err = filter(&xml, &params).unwrap_err();
        assert!(matches!(err, OoxmlError::UnacceptedRevisions { .. }));
    }

    #[test]
    fn test_structure_revisions() {
        let xml = format!("<w:trPr {W}><w:ins w:id=\"1\" w:author=\"A\"/></w:trPr>");
        let events = read_events(xml.as_bytes()).unwrap();
        let ns = Namespaces::collect(&events);
        let Some(XmlEvent::Start(ins)) = events.get(1) else {
            panic!("expected w:ins");
        };

        assert!(MarkupFilter::new(&FilterParams::default()).check_structure(ins, &ns).is_ok());
        let params = FilterParams {
            automatically_accept_revisions: false,
            ..FilterParams::default()
        };
        let filter = MarkupFilter::new(&params);
        assert!(matches!(
            filter.check_structure(ins, &ns),
            Err(OoxmlError::UnacceptedRevisions { .. })
        ));
        let Some(XmlEvent::Start(row)) = events.first() else {
            panic!("expected w:trPr");
        };
        assert!(filter.check_structure(row, &ns).is_ok());

        for name in ["w:cellIns", "w:cellDel", "w:moveFromRangeStart", "w:tblPrChange"] {
            let tag = StartTag::new(name, true);
            assert!(filter.check_structure(&tag, &ns).is_err(), "{name}");
        }
    }

    #[test]
    fn test_go_back_bookmark_pair() {
        let xml = format!(
            "<w:p {W}><w:bookmarkStart w:id=\"0\" w:name=\"_GoBack\"/><w:bookmarkStart w:id=\"1\" w:name=\"keep\"/><w:r><w:t>x</w:t></w:r><w:bookmarkEnd w:id=\"1\"/><w:bookmarkEnd w:id=\"0\"/></w:p>"
        );
        let out = filter(&xml, &FilterParams::default()).unwrap();
        assert_eq!(
            out,
            format!("<w:p {W}><w:bookmarkStart w:id=\"1\" w:name=\"keep\"/><w:r><w:t>x</w:t></w:r><w:bookmarkEnd w:id=\"1\"/></w:p>")
        );
    }

    #[test]
    fn test_hyphen_options() {
        let params = FilterParams {
            ignore_soft_hyphen_tag: true,
            replace_no_break_hyphen_tag: true,
            ..FilterParams::default()
        };
        let xml = format!(
            "<w:p {W}><w:r><w:t>co</w:t><w:softHyphen/><w:t>op</w:t><w:noBreakHyphen/><w:t>x</w:t></w:r></w:p>"
        );
        let block = simplify(&xml, &params);
        assert_eq!(
            block.to_xml(),
            format!("<w:p {W}><w:r><w:t>coop-x</w:t></w:r></w:p>")
        );
    }

    #[test]
    fn test_merges_equal_runs() {
        let xml = format!(
            "<w:p {W}><w:r><w:rPr><w:b/></w:rPr><w:t xml:space=\"preserve\">Hello </w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>world</w:t></w:r></w:p>"
        );
        let block = simplify(&xml, &FilterParams::default());
        assert_eq!(run_count(&block), 1);
        assert_eq!(
            block.to_xml(),
            format!("<w:p {W}><w:r><w:rPr><w:b/></w:rPr><w:t xml:space=\"preserve\">Hello world</w:t></w:r></w:p>")
        );
    }

    #[test]
    fn test_keeps_different_runs() {
        let xml = format!(
            "<w:p {W}><w:r><w:rPr><w:b/></w:rPr><w:t>Bold</w:t></w:r><w:r><w:t>plain</w:t></w:r></w:p>"
        );
        let block = simplify(&xml, &FilterParams::default());
        assert_eq!(run_count(&block), 2);
        assert_eq!(block.to_xml(), xml);
    }

    #[test]
    fn test_never_merges_field_runs() {
        let xml = format!(
            "<w:p {W}><w:r><w:t>Page </w:t></w:r><w:r><w:fldChar w:fldCharType=\"begin\"/></w:r><w:r><w:instrText> PAGE </w:instrText></w:r><w:r><w:fldChar w:fldCharType=\"separate\"/></w:r><w:r><w:t>1</w:t></w:r><w:r><w:fldChar w:fldCharType=\"end\"/></w:r></w:p>"
        );
        let block = simplify(&xml, &FilterParams::default());
        assert_eq!(run_count(&block), 6);
    }

    #[test]
    fn test_language_equal_to_paragraph_is_ignored() {
        let xml = format!(
            "<w:p {W}><w:pPr><w:rPr><w:lang w:val=\"en-US\"/></w:rPr></w:pPr><w:r><w:rPr><w:lang w:val=\"en-US\"/></w:rPr><w:t>a</w:t></w:r><w:r><w:t>b</w:t></w:r></w:p>"
        );
        let block = simplify(&xml, &FilterParams::default());
        assert_eq!(run_count(&block), 1);
        assert_eq!(
            block.to_xml(),
            format!("<w:p {W}><w:pPr><w:rPr><w:lang w:val=\"en-US\"/></w:rPr></w:pPr><w:r><w:t>ab</w:t></w:r></w:p>")
        );
    }

    #[test]
    fn test_aggressive_cleanup() {
        let xml = format!(
            "<w:p {W}><w:r><w:rPr><w:noProof/></w:rPr><w:t>a</w:t></w:r><w:r><w:rPr><w:vertAlign w:val=\"baseline\"/></w:rPr><w:t>b</w:t></w:r></w:p>"
        );
        let block = simplify(&xml, &FilterParams::default());
        assert_eq!(run_count(&block), 2);

        let params = FilterParams {
            cleanup_aggressively: true,
            ..FilterParams::default()
        };
        let block = simplify(&xml, &params);
        assert_eq!(run_count(&block), 1);
        assert_eq!(block.to_xml(), format!("<w:p {W}><w:r><w:t>ab</w:t></w:r></w:p>"));
    }

    #[test]
    fn test_drops_empty_runs() {
        let xml = format!("<w:p {W}><w:r><w:rPr><w:b/></w:rPr></w:r><w:r><w:t>x</w:t></w:r><w:r/></w:p>");
        let block = simplify(&xml, &FilterParams::default());
        assert_eq!(block.to_xml(), format!("<w:p {W}><w:r><w:t>x</w:t></w:r></w:p>"));
    }

    #[test]
    fn test_never_merges_runs_with_objects() {
        let xml = format!(
            "<w:p {W}><w:r><w:drawing/></w:r><w:r><w:t xml:space=\"preserve\"> </w:t></w:r><w:r><w:t>a</w:t><w:object/></w:r><w:r><w:t>b</w:t></w:r></w:p>"
        );
        let block = simplify(&xml, &FilterParams::default());
        assert_eq!(run_count(&block), 4);
        assert_eq!(block.to_xml(), xml);
    }

    #[test]
    fn test_merges_runs_with_tabs() {
        let xml = format!(
            "<w:p {W}><w:r><w:t>a</w:t><w:tab/></w:r><w:r><w:t>b</w:t></w:r></w:p>"
        );
        let block = simplify(&xml, &FilterParams::default());
        assert_eq!(run_count(&block), 1);
        assert_eq!(
            block.to_xml(),
            format!("<w:p {W}><w:r><w:t>a</w:t><w:tab/><w:t>b</w:t></w:r></w:p>")
        );
    }

    #[test]
    fn test_merges_inside_hyperlink() {
        let xml = format!(
            "<w:p {W}><w:hyperlink w:anchor=\"x\"><w:r><w:t>li</w:t></w:r><w:r><w:t>nk</w:t></w:r></w:hyperlink></w:p>"
        );
        let block = simplify(&xml, &FilterParams::default());
        assert_eq!(
            block.to_xml(),
            format!("<w:p {W}><w:hyperlink w:anchor=\"x\"><w:r><w:t>link</w:t></w:r></w:hyperlink></w:p>")
        );
    }
}
