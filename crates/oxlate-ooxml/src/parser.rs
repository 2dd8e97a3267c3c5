//! Paragraph parser
//!
//! [`BlockParser`] turns the events of one paragraph-like element into a
//! [`Block`]. Elements are classified by vocabulary and local name, with
//! prefixes resolved through the part's namespace declarations. Anything the
//! parser does not recognize is kept as opaque markup, so parsing never fails
//! on well-formed input.
//!
//! Complex fields span runs and sometimes paragraphs. Their state lives in a
//! [`PartContext`] that the caller carries from one paragraph to the next.

use tracing::warn;

use crate::block::{
    AttributeText, Block, BlockFormat, Chunk, Container, ContainerKind, Markup, MarkupItem,
    MarkupKind, Run, RunChunk, RunCode, RunCodeKind, RunText,
};
use crate::config::FilterParams;
use crate::error::{OoxmlError, Result};
use crate::run_properties::RunProperties;
use crate::styles::{presentation_style_key, StyleDefinitions, TextStyleKind};
use crate::xml::{element_end, element_text, events_to_xml, Namespaces, Ns, StartTag, XmlEvent};

/// Deepest field nesting tracked; deeper fields are treated as results
const MAX_FIELD_DEPTH: usize = 32;

// ============================================================================
// Part context
// ============================================================================

/// One open complex field
#[derive(Debug, Clone, Copy, Default)]
struct OpenField {
    separated: bool,
    /// Whether the instruction named the field yet
    named: bool,
    /// Whether the field result is extracted as text
    extract_result: bool,
}

/// Complex field state
#[derive(Debug, Clone, Default)]
pub struct FieldTracker {
    stack: Vec<OpenField>,
}

impl FieldTracker {
    /// A `begin` field character
    pub fn begin(&mut self) {
        if self.stack.len() < MAX_FIELD_DEPTH {
            self.stack.push(OpenField::default());
        } else {
            warn!(depth = self.stack.len(), "field nesting too deep, ignoring begin");
        }
    }

    /// Instruction text of the innermost field
    ///
    /// The first non-blank piece names the field and decides whether its
    /// result is extracted.
    pub fn instruction(&mut self, text: &str, params: &FilterParams) {
        if let Some(top) = self.stack.last_mut() {
            if !top.named && !text.trim().is_empty() {
                top.named = true;
                top.extract_result = params.extracts_field_result(text);
            }
        }
    }

    /// A `separate` field character
    pub fn separate(&mut self) {
        if let Some(top) = self.stack.last_mut() {
            top.separated = true;
        }
    }

    /// An `end` field character
    pub fn end(&mut self) {
        self.stack.pop();
    }

    /// Whether the cursor is inside a field instruction
    pub fn in_instruction(&self) -> bool {
        self.stack.iter().any(|f| !f.separated)
    }

    /// Whether text at the cursor belongs to field code rather than content
    pub fn hides_text(&self) -> bool {
        self.stack.iter().any(|f| !f.separated || !f.extract_result)
    }

    /// Number of open fields
    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

/// State carried across the paragraphs of one part
#[derive(Debug, Clone, Default)]
pub struct PartContext {
    /// Open complex fields
    pub fields: FieldTracker,
    /// Text style family of the enclosing presentation shape
    pub text_style: Option<TextStyleKind>,
}

// ============================================================================
// Parser
// ============================================================================

/// Parser for paragraph-like elements of one part
pub struct BlockParser<'a> {
    ns: &'a Namespaces,
    styles: &'a StyleDefinitions,
    params: &'a FilterParams,
}

/// How a child element of a paragraph or container is handled
enum ChildKind {
    Properties,
    Run { math: bool },
    BareText,
    Container(ContainerKind),
    Markup(MarkupKind),
}

impl<'a> BlockParser<'a> {
    /// Create a parser
    pub fn new(ns: &'a Namespaces, styles: &'a StyleDefinitions, params: &'a FilterParams) -> Self {
        Self { ns, styles, params }
    }

    /// Whether a start tag opens a paragraph
    pub fn is_paragraph(&self, tag: &StartTag) -> bool {
        tag.local_name() == "p" && matches!(self.ns.of(&tag.name), Ns::Word | Ns::Drawing)
    }

    /// Parse one paragraph from its events (start tag to end tag)
    pub fn parse(&self, events: &[XmlEvent], ctx: &mut PartContext) -> Result<Block> {
        let Some(XmlEvent::Start(start)) = events.first() else {
            return Err(OoxmlError::malformed("", 0, "expected a paragraph start tag"));
        };
        let format = match self.ns.of(&start.name) {
            Ns::Word => BlockFormat::Word,
            Ns::Drawing => BlockFormat::Drawing,
            _ => BlockFormat::Spreadsheet,
        };

        let mut block = Block::new(format);
        if format == BlockFormat::Drawing {
            block.paragraph_style = ctx
                .text_style
                .map(|kind| presentation_style_key(kind, 1));
        }
        block.chunks.push(Chunk::Markup(Markup {
            kind: MarkupKind::BlockStart,
            xml: start.to_xml(),
        }));
        if start.self_closing {
            return Ok(block);
        }

        let last = events.len() - 1;
        let (chunks, trailing) = self.parse_chunks(&events[1..last], &mut block, ctx, false)?;
        block.chunks.extend(chunks);
        block.chunks.push(Chunk::Markup(Markup {
            kind: MarkupKind::BlockEnd,
            xml: trailing + &events[last].to_xml(),
        }));
        Ok(block)
    }

    fn classify(&self, tag: &StartTag, format: BlockFormat, in_math: bool) -> ChildKind {
        let local = tag.local_name();
        match (self.ns.of(&tag.name), local) {
            (Ns::Word | Ns::Drawing, "pPr") => ChildKind::Properties,
            (Ns::Word, "r") => ChildKind::Run { math: in_math },
            (Ns::Word, "hyperlink") => ChildKind::Container(ContainerKind::Hyperlink),
            (Ns::Word, "smartTag") => ChildKind::Container(ContainerKind::SmartTag),
            (Ns::Word, "fldSimple") => ChildKind::Container(ContainerKind::Field),
            (Ns::Word, "customXml" | "sdt" | "sdtContent" | "dir" | "bdo") => {
                ChildKind::Container(ContainerKind::Other)
            }
            (Ns::Word, "bookmarkStart" | "bookmarkEnd") => ChildKind::Markup(MarkupKind::Bookmark),
            (Ns::Drawing, "r") => ChildKind::Run { math: false },
            (Ns::Drawing, "br") => ChildKind::Markup(MarkupKind::LineBreak),
            (Ns::Drawing, "fld") => ChildKind::Markup(MarkupKind::Field),
            (Ns::Math, "oMathPara" | "oMath") => ChildKind::Container(ContainerKind::Math),
            (Ns::Math, "r") => ChildKind::Run { math: true },
            (Ns::Spreadsheet, "r") if format == BlockFormat::Spreadsheet => {
                ChildKind::Run { math: false }
            }
            (Ns::Spreadsheet, "t") if format == BlockFormat::Spreadsheet => ChildKind::BareText,
            _ => ChildKind::Markup(MarkupKind::Other),
        }
    }

    /// Parse the children of a paragraph or container
    ///
    /// Returns the chunks and the whitespace after the last one.
    fn parse_chunks(
        &self,
        events: &[XmlEvent],
        block: &mut Block,
        ctx: &mut PartContext,
        in_math: bool,
    ) -> Result<(Vec<Chunk>, String)> {
        let mut chunks = Vec::new();
        let mut pending = String::new();

        let mut i = 0;
        while i < events.len() {
            let event = &events[i];
            let XmlEvent::Start(tag) = event else {
                if event.is_whitespace() {
                    event.write_to(&mut pending);
                } else {
                    let mut xml = std::mem::take(&mut pending);
                    event.write_to(&mut xml);
                    chunks.push(Chunk::Markup(Markup {
                        kind: MarkupKind::Other,
                        xml,
                    }));
                }
                i += 1;
                continue;
            };

            let end = element_end(events, i);
            let slice = &events[i..=end];
            let lead = std::mem::take(&mut pending);
            match self.classify(tag, block.format, in_math) {
                ChildKind::Properties => {
                    self.read_paragraph_properties(slice, block, ctx);
                    chunks.push(Chunk::Markup(Markup {
                        kind: MarkupKind::BlockStart,
                        xml: lead + &events_to_xml(slice),
                    }));
                }
                ChildKind::Run { math } => {
                    chunks.push(Chunk::Run(self.parse_run(slice, lead, block, ctx, math)?));
                }
                ChildKind::BareText => {
                    chunks.push(Chunk::Run(self.parse_bare_text(slice, lead, block)));
                }
                ChildKind::Container(kind) => {
                    let mut open = lead;
                    tag.write_to(&mut open);
                    let (children, close) = if tag.self_closing {
                        (Vec::new(), String::new())
                    } else {
                        let (children, trailing) = self.parse_chunks(
                            &events[i + 1..end],
                            block,
                            ctx,
                            in_math || kind == ContainerKind::Math,
                        )?;
                        (children, trailing + &events[end].to_xml())
                    };
                    chunks.push(Chunk::Container(Container {
                        kind,
                        open,
                        chunks: children,
                        close,
                    }));
                }
                ChildKind::Markup(kind) => {
                    if tag.local_name() == "endParaRPr" && block.language.is_empty() {
                        block.language = RunProperties::from_events(String::new(), slice).languages();
                    }
                    chunks.push(Chunk::Markup(Markup {
                        kind,
                        xml: lead + &events_to_xml(slice),
                    }));
                }
            }
            i = end + 1;
        }
        Ok((chunks, pending))
    }

    /// Record the paragraph style, list level and paragraph mark language
    fn read_paragraph_properties(&self, slice: &[XmlEvent], block: &mut Block, ctx: &PartContext) {
        let Some(XmlEvent::Start(ppr)) = slice.first() else {
            return;
        };
        if block.format == BlockFormat::Drawing {
            let level = ppr
                .attr("lvl")
                .and_then(|l| l.parse::<u8>().ok())
                .map_or(1, |l| l.saturating_add(1));
            block.paragraph_style = ctx
                .text_style
                .map(|kind| presentation_style_key(kind, level));
            return;
        }

        let mut depth = 0usize;
        let mut i = 0;
        while i < slice.len() {
            match &slice[i] {
                XmlEvent::Start(tag) => {
                    if depth == 1 && tag.local_name() == "pStyle" {
                        if let Some(id) = tag.attr_local("val") {
                            if self.params.exclude_word_styles.contains(id) {
                                block.hidden = true;
                            }
                            block.paragraph_style = Some(id.to_string());
                        }
                    } else if depth == 1 && tag.local_name() == "rPr" {
                        let end = element_end(slice, i);
                        block.language =
                            RunProperties::from_events(String::new(), &slice[i..=end]).languages();
                        i = end + 1;
                        continue;
                    }
                    if !tag.self_closing {
                        depth += 1;
                    }
                }
                XmlEvent::End(_) => depth = depth.saturating_sub(1),
                _ => {}
            }
            i += 1;
        }
    }

    fn parse_run(
        &self,
        slice: &[XmlEvent],
        lead: String,
        block: &Block,
        ctx: &mut PartContext,
        math: bool,
    ) -> Result<Run> {
        let Some(XmlEvent::Start(start)) = slice.first() else {
            return Err(OoxmlError::malformed("", 0, "expected a run start tag"));
        };
        let mut run = Run {
            lead,
            start: Some(start.clone()),
            properties: RunProperties::empty(),
            combined: RunProperties::empty(),
            body: Vec::new(),
            close: String::new(),
            math,
            hidden: false,
            complex: false,
            in_field_code: ctx.fields.hides_text(),
        };

        if !start.self_closing {
            let last = slice.len() - 1;
            let inner = &slice[1..last];
            let mut pending = String::new();
            let mut i = 0;
            while i < inner.len() {
                let event = &inner[i];
                let XmlEvent::Start(tag) = event else {
                    if event.is_whitespace() {
                        event.write_to(&mut pending);
                    } else {
                        let mut xml = std::mem::take(&mut pending);
                        event.write_to(&mut xml);
                        run.body.push(RunChunk::Code(RunCode::raw(RunCodeKind::Other, xml)));
                    }
                    i += 1;
                    continue;
                };
                let end = element_end(inner, i);
                let element = &inner[i..=end];
                let lead = std::mem::take(&mut pending);
                let chunk = self.run_child(tag, element, lead, &mut run, ctx)?;
                if let Some(chunk) = chunk {
                    run.body.push(chunk);
                }
                i = end + 1;
            }
            run.close = pending + &slice[last].to_xml();
        }

        self.resolve_formatting(&mut run, block);
        Ok(run)
    }

    /// Classify one child of a run; `None` when it was absorbed (properties)
    fn run_child(
        &self,
        tag: &StartTag,
        element: &[XmlEvent],
        lead: String,
        run: &mut Run,
        ctx: &mut PartContext,
    ) -> Result<Option<RunChunk>> {
        let ns = self.ns.of(&tag.name);
        let xml = events_to_xml(element);
        let code = |kind: RunCodeKind, lead: String| {
            Some(RunChunk::Code(RunCode::raw(kind, lead + &xml)))
        };

        let chunk = match (ns, tag.local_name()) {
            (Ns::Word | Ns::Drawing | Ns::Spreadsheet, "rPr")
                if run.properties.is_absent() && run.body.is_empty() =>
            {
                run.properties = RunProperties::from_events(lead, element);
                None
            }
            (Ns::Word | Ns::Drawing | Ns::Spreadsheet | Ns::Math, "t") => {
                if ctx.fields.in_instruction() {
                    ctx.fields.instruction(&element_text(element, 0), self.params);
                    code(RunCodeKind::FieldInstruction, lead)
                } else {
                    Some(RunChunk::Text(RunText {
                        lead,
                        open: Some(tag.clone()),
                        text: element_text(element, 0),
                        preserve: tag.attr("xml:space") == Some("preserve"),
                        xml: xml.clone(),
                    }))
                }
            }
            (Ns::Word, "instrText" | "delInstrText") => {
                run.complex = true;
                ctx.fields.instruction(&element_text(element, 0), self.params);
                code(RunCodeKind::FieldInstruction, lead)
            }
            (Ns::Word, "fldChar") => {
                run.complex = true;
                let kind = match tag.attr_local("fldCharType") {
                    Some("begin") => {
                        ctx.fields.begin();
                        RunCodeKind::FieldBegin
                    }
                    Some("separate") => {
                        ctx.fields.separate();
                        RunCodeKind::FieldSeparate
                    }
                    Some("end") => {
                        ctx.fields.end();
                        RunCodeKind::FieldEnd
                    }
                    _ => RunCodeKind::Other,
                };
                code(kind, lead)
            }
            (Ns::Word, "tab") if self.params.add_tab_as_character => {
                Some(RunChunk::Text(RunText {
                    lead,
                    open: None,
                    text: "\t".to_string(),
                    xml: xml.clone(),
                    preserve: false,
                }))
            }
            (Ns::Word, "tab") => code(RunCodeKind::Tab, lead),
            (Ns::Word, "br" | "cr") => {
                let page_or_column = matches!(tag.attr_local("type"), Some("page" | "column"));
                if self.params.add_line_separator_character && !page_or_column {
                    Some(RunChunk::Text(RunText {
                        lead,
                        open: None,
                        text: self.params.line_separator_replacement.to_string(),
                        xml: xml.clone(),
                        preserve: false,
                    }))
                } else {
                    code(RunCodeKind::Break, lead)
                }
            }
            _ => Some(RunChunk::Code(self.markup_code(element, lead, ctx)?)),
        };
        Ok(chunk)
    }

    /// Run content kept as markup, with nested paragraphs parsed as blocks
    fn markup_code(&self, element: &[XmlEvent], lead: String, ctx: &mut PartContext) -> Result<RunCode> {
        let mut items = Vec::new();
        let mut raw = lead;
        let mut nested = false;

        let mut i = 0;
        while i < element.len() {
            match &element[i] {
                XmlEvent::Start(tag) if self.is_paragraph(tag) => {
                    let end = element_end(element, i);
                    let block = self.parse(&element[i..=end], ctx)?;
                    items.push(MarkupItem::Raw(std::mem::take(&mut raw)));
                    items.push(MarkupItem::Block(Box::new(block)));
                    nested = true;
                    i = end;
                }
                XmlEvent::Start(tag)
                    if tag.local_name() == "Fallback" && self.ns.of(&tag.name) == Ns::MarkupCompat =>
                {
                    // The fallback duplicates the choice content.
                    i = element_end(element, i);
                }
                XmlEvent::Start(tag) => match self.translatable_attribute(tag) {
                    Some((before, value, after)) => {
                        raw.push_str(&before);
                        items.push(MarkupItem::Raw(std::mem::take(&mut raw)));
                        items.push(MarkupItem::Attribute(value));
                        raw.push_str(&after);
                    }
                    None => tag.write_to(&mut raw),
                },
                event => event.write_to(&mut raw),
            }
            i += 1;
        }
        if !raw.is_empty() {
            items.push(MarkupItem::Raw(raw));
        }
        items.retain(|item| !matches!(item, MarkupItem::Raw(r) if r.is_empty()));

        Ok(RunCode {
            kind: if nested { RunCodeKind::Nested } else { RunCodeKind::Other },
            items,
        })
    }

    /// Drawing names and WordArt strings inside run markup
    fn translatable_attribute(&self, tag: &StartTag) -> Option<(String, AttributeText, String)> {
        let local = match tag.local_name() {
            "docPr" | "cNvPr" if !self.params.translate_word_exclude_graphic_metadata => "name",
            "textpath" => "string",
            _ => return None,
        };
        let text = tag.attr_local(local)?;
        if text.trim().is_empty() {
            return None;
        }
        let (before, raw, after) = tag.split_at_attr(local)?;
        let value = AttributeText {
            text: text.to_string(),
            raw,
        };
        Some((before, value, after))
    }

    /// A SpreadsheetML string with no rich-text runs
    fn parse_bare_text(&self, slice: &[XmlEvent], lead: String, block: &Block) -> Run {
        let open = slice.first().and_then(XmlEvent::as_start).cloned();
        let preserve = open
            .as_ref()
            .is_some_and(|t| t.attr("xml:space") == Some("preserve"));
        let mut run = Run {
            lead: String::new(),
            start: None,
            properties: RunProperties::empty(),
            combined: RunProperties::empty(),
            body: vec![RunChunk::Text(RunText {
                lead,
                open,
                text: element_text(slice, 0),
                xml: events_to_xml(slice),
                preserve,
            })],
            close: String::new(),
            math: false,
            hidden: false,
            complex: false,
            in_field_code: false,
        };
        self.resolve_formatting(&mut run, block);
        run
    }

    /// Fill in effective properties and the hidden flag
    fn resolve_formatting(&self, run: &mut Run, block: &Block) {
        let run_style = run.properties.style_id().map(str::to_string);
        run.combined = self.styles.combined_run_properties(
            block.paragraph_style.as_deref(),
            run_style.as_deref(),
            &run.properties,
        );
        let vanished = !self.params.translate_word_hidden && run.combined.toggle("vanish") == Some(true);
        let excluded = run_style
            .as_deref()
            .is_some_and(|s| self.params.exclude_word_styles.contains(s));
        run.hidden = block.hidden || vanished || excluded;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::styles::{PresentationStyles, StyleSheet};
    use crate::xml::read_events;

    const W: &str = "xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"";
    const A: &str = "xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\"";

    fn parse_with(xml: &str, styles: &StyleDefinitions, params: &FilterParams) -> Block {
        let events = read_events(xml.as_bytes()).unwrap();
        let ns = Namespaces::collect(&events);
        BlockParser::new(&ns, styles, params)
            .parse(&events, &mut PartContext::default())
            .unwrap()
    }

    fn parse(xml: &str) -> Block {
        parse_with(xml, &StyleDefinitions::Empty, &FilterParams::default())
    }

    fn runs(block: &Block) -> Vec<&Run> {
        block
            .chunks
            .iter()
            .filter_map(|c| match c {
                Chunk::Run(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_reproduces_input() {
        let xml = format!(
            "<w:p {W} w:rsidR=\"00AB\">\n  <w:pPr><w:pStyle w:val=\"Heading1\"/></w:pPr>\n  <w:bookmarkStart w:id=\"1\" w:name=\"top\"/>\n  <w:r>\n    <w:rPr><w:b/></w:rPr>\n    <w:t xml:space=\"preserve\">Hello &amp; </w:t>\n  </w:r>\n  <w:hyperlink r:id=\"rId4\" xmlns:r=\"urn:r\"><w:r><w:t>link</w:t></w:r></w:hyperlink>\n  <w:r><w:drawing><wp:inline xmlns:wp=\"urn:wp\"/></w:drawing></w:r>\n</w:p>"
        );
        let block = parse(&xml);
        assert_eq!(block.to_xml(), xml);
        assert_eq!(block.paragraph_style.as_deref(), Some("Heading1"));
        assert!(block.has_text());
    }

    #[test]
    fn test_run_text_and_preserve() {
        let block = parse(&format!(
            "<w:p {W}><w:r><w:t xml:space=\"preserve\"> a &lt; b </w:t></w:r></w:p>"
        ));
        let run = runs(&block)[0];
        assert_eq!(run.text(), " a < b ");
        match &run.body[0] {
            RunChunk::Text(t) => assert!(t.preserve),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_tab_as_code_or_character() {
        let xml = format!("<w:p {W}><w:r><w:t>Before</w:t><w:tab/><w:t>after.</w:t></w:r></w:p>");

        let block = parse(&xml);
        let run = runs(&block)[0];
        assert_eq!(run.text(), "Beforeafter.");
        assert_eq!(run.codes().filter(|c| c.kind == RunCodeKind::Tab).count(), 1);

        let params = FilterParams {
            add_tab_as_character: true,
            ..FilterParams::default()
        };
        let block = parse_with(&xml, &StyleDefinitions::Empty, &params);
        let run = runs(&block)[0];
        assert_eq!(run.text(), "Before\tafter.");
        assert_eq!(run.codes().count(), 0);
        assert_eq!(block.to_xml(), xml);
    }

    #[test]
    fn test_line_separator_option() {
        let xml = format!(
            "<w:p {W}><w:r><w:t>a</w:t><w:br/><w:t>b</w:t><w:br w:type=\"page\"/></w:r></w:p>"
        );
        let params = FilterParams {
            add_line_separator_character: true,
            line_separator_replacement: '\u{2028}',
            ..FilterParams::default()
        };
        let block = parse_with(&xml, &StyleDefinitions::Empty, &params);
        let run = runs(&block)[0];
        assert_eq!(run.text(), "a\u{2028}b");
        assert_eq!(run.codes().filter(|c| c.kind == RunCodeKind::Break).count(), 1);
    }

    #[test]
    fn test_field_instruction_not_text() {
        let block = parse(&format!(
            "<w:p {W}><w:r><w:fldChar w:fldCharType=\"begin\"/></w:r><w:r><w:instrText> PAGE </w:instrText></w:r><w:r><w:fldChar w:fldCharType=\"separate\"/></w:r><w:r><w:t>3</w:t></w:r><w:r><w:fldChar w:fldCharType=\"end\"/></w:r></w:p>"
        ));
        let runs = runs(&block);
        assert_eq!(runs.len(), 5);
        assert!(runs[0].complex);
        assert!(runs[1].in_field_code);
        assert_eq!(runs[1].text(), "");
        // A page number result is field code unless PAGE results are extracted
        assert_eq!(runs[3].text(), "3");
        assert!(runs[3].in_field_code);
        assert!(!block.has_text());
    }

    #[test]
    fn test_field_results_by_field_name() {
        let xml = format!(
            "<w:p {W}><w:r><w:fldChar w:fldCharType=\"begin\"/></w:r><w:r><w:instrText xml:space=\"preserve\"> HYPERLINK \"https://example.com\" </w:instrText></w:r><w:r><w:fldChar w:fldCharType=\"separate\"/></w:r><w:r><w:t>Example</w:t></w:r><w:r><w:fldChar w:fldCharType=\"end\"/></w:r></w:p>"
        );
        let block = parse(&xml);
        assert!(!runs(&block)[3].in_field_code);
        assert!(block.has_text());

        let params = FilterParams {
            complex_field_definitions_to_extract: Default::default(),
            ..FilterParams::default()
        };
        let block = parse_with(&xml, &StyleDefinitions::Empty, &params);
        assert!(runs(&block)[3].in_field_code);
        assert!(!block.has_text());
    }

    #[test]
    fn test_field_state_spans_paragraphs() {
        let params = FilterParams::default();
        let styles = StyleDefinitions::Empty;
        let first = format!("<w:p {W}><w:r><w:fldChar w:fldCharType=\"begin\"/></w:r></w:p>");
        let second = format!("<w:p {W}><w:r><w:t>TOC \\o</w:t></w:r></w:p>");
        let mut ctx = PartContext::default();

        for (xml, expect_text) in [(first, false), (second, false)] {
            let events = read_events(xml.as_bytes()).unwrap();
            let ns = Namespaces::collect(&events);
            let block = BlockParser::new(&ns, &styles, &params).parse(&events, &mut ctx).unwrap();
            assert_eq!(block.has_text(), expect_text);
        }
        assert_eq!(ctx.fields.depth(), 1);
    }

    #[test]
    fn test_text_box_is_nested_block() {
        let xml = format!(
            "<w:p {W}><w:r><w:t>Outer</w:t></w:r><w:r><w:pict><v:shape xmlns:v=\"urn:schemas-microsoft-com:vml\"><v:textbox><w:txbxContent><w:p><w:r><w:t>Inner</w:t></w:r></w:p></w:txbxContent></v:textbox></v:shape></w:pict></w:r></w:p>"
        );
        let block = parse(&xml);
        let nested = block.nested_blocks();
        assert_eq!(nested.len(), 1);
        assert!(nested[0].has_text());
        assert!(runs(&block)[1].has_nested());
        assert_eq!(block.to_xml(), xml);
    }

    #[test]
    fn test_graphic_names_are_attributes() {
        let xml = format!(
            "<w:p {W}><w:r><w:drawing><wp:inline xmlns:wp=\"urn:wp\"><wp:docPr id=\"1\" name=\"Sales chart\"/></wp:inline></w:drawing></w:r><w:r><w:pict><v:textpath xmlns:v=\"urn:schemas-microsoft-com:vml\" string=\"Draft\"/></w:pict></w:r></w:p>"
        );
        let block = parse(&xml);
        let values: Vec<String> = runs(&block)
            .iter()
            .flat_map(|r| r.codes())
            .flat_map(|c| c.items.iter())
            .filter_map(|item| match item {
                MarkupItem::Attribute(a) => Some(a.text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec!["Sales chart", "Draft"]);
        assert_eq!(block.to_xml(), xml);

        let params = FilterParams {
            translate_word_exclude_graphic_metadata: true,
            ..FilterParams::default()
        };
        let block = parse_with(&xml, &StyleDefinitions::Empty, &params);
        let attributes = runs(&block)
            .iter()
            .flat_map(|r| r.codes())
            .flat_map(|c| c.items.iter())
            .filter(|item| matches!(item, MarkupItem::Attribute(_)))
            .count();
        // WordArt strings are always text
        assert_eq!(attributes, 1);
    }

    #[test]
    fn test_alternate_content_fallback_dropped() {
        let xml = format!(
            "<w:p {W} xmlns:mc=\"http://schemas.openxmlformats.org/markup-compatibility/2006\"><w:r><mc:AlternateContent><mc:Choice Requires=\"wps\"><w:drawing/></mc:Choice><mc:Fallback><w:pict/></mc:Fallback></mc:AlternateContent></w:r></w:p>"
        );
        let block = parse(&xml);
        assert!(!block.to_xml().contains("Fallback"));
        assert!(block.to_xml().contains("<mc:Choice Requires=\"wps\"><w:drawing/></mc:Choice>"));
    }

    #[test]
    fn test_hidden_and_excluded_styles() {
        let xml = format!(
            "<w:p {W}><w:r><w:rPr><w:vanish/></w:rPr><w:t>hidden</w:t></w:r><w:r><w:rPr><w:rStyle w:val=\"Code\"/></w:rPr><w:t>code</w:t></w:r><w:r><w:t>shown</w:t></w:r></w:p>"
        );
        let params = FilterParams {
            exclude_word_styles: ["Code".to_string()].into_iter().collect(),
            ..FilterParams::default()
        };
        let block = parse_with(&xml, &StyleDefinitions::Empty, &params);
        let parsed = runs(&block);
        assert!(parsed[0].hidden);
        assert!(parsed[1].hidden);
        assert!(!parsed[2].hidden);

        let params = FilterParams {
            translate_word_hidden: true,
            ..FilterParams::default()
        };
        let block = parse_with(&xml, &StyleDefinitions::Empty, &params);
        assert!(!runs(&block)[0].hidden);
    }

    #[test]
    fn test_excluded_paragraph_style_hides_block() {
        let params = FilterParams {
            exclude_word_styles: ["Code".to_string()].into_iter().collect(),
            ..FilterParams::default()
        };
        let block = parse_with(
            &format!("<w:p {W}><w:pPr><w:pStyle w:val=\"Code\"/></w:pPr><w:r><w:t>x</w:t></w:r></w:p>"),
            &StyleDefinitions::Empty,
            &params,
        );
        assert!(block.hidden);
        assert!(!block.has_text());
    }

    #[test]
    fn test_style_hidden_run() {
        let styles = StyleSheet::parse(
            format!(
                "<w:styles {W}><w:style w:type=\"character\" w:styleId=\"Secret\"><w:rPr><w:vanish/></w:rPr></w:style></w:styles>"
            )
            .as_bytes(),
        )
        .unwrap();
        let block = parse_with(
            &format!("<w:p {W}><w:r><w:rPr><w:rStyle w:val=\"Secret\"/></w:rPr><w:t>x</w:t></w:r></w:p>"),
            &StyleDefinitions::Word(styles),
            &FilterParams::default(),
        );
        assert!(runs(&block)[0].hidden);
    }

    #[test]
    fn test_drawingml_paragraph() {
        let xml = format!(
            "<a:p {A}><a:pPr lvl=\"1\"/><a:r><a:rPr lang=\"en-US\"/><a:t>Point</a:t></a:r><a:br><a:rPr lang=\"en-US\"/></a:br><a:fld id=\"x\" type=\"slidenum\"><a:t>3</a:t></a:fld><a:endParaRPr lang=\"en-US\"/></a:p>"
        );
        let events = read_events(xml.as_bytes()).unwrap();
        let ns = Namespaces::collect(&events);
        let styles = StyleDefinitions::Presentation(PresentationStyles::default());
        let params = FilterParams::default();
        let mut ctx = PartContext {
            text_style: Some(TextStyleKind::Body),
            ..PartContext::default()
        };
        let block = BlockParser::new(&ns, &styles, &params).parse(&events, &mut ctx).unwrap();

        assert_eq!(block.format, BlockFormat::Drawing);
        assert_eq!(block.paragraph_style.as_deref(), Some("body:2"));
        assert_eq!(block.language, vec![("@lang".to_string(), "en-US".to_string())]);
        assert!(block.chunks.iter().any(|c| matches!(c, Chunk::Markup(m) if m.kind == MarkupKind::LineBreak)));
        assert!(block.chunks.iter().any(|c| matches!(c, Chunk::Markup(m) if m.kind == MarkupKind::Field)));
        assert_eq!(block.to_xml(), xml);
    }

    #[test]
    fn test_shared_string_items() {
        let ns_decl = "xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\"";
        let bare = parse(&format!("<si {ns_decl}><t>Plain</t></si>"));
        assert_eq!(bare.format, BlockFormat::Spreadsheet);
        assert_eq!(runs(&bare)[0].text(), "Plain");
        assert!(runs(&bare)[0].start.is_none());

        let rich_xml = format!(
            "<si {ns_decl}><r><rPr><b/><sz val=\"11\"/></rPr><t>Bold</t></r><r><t xml:space=\"preserve\"> text</t></r><phoneticPr fontId=\"1\"/></si>"
        );
        let rich = parse(&rich_xml);
        assert_eq!(runs(&rich).len(), 2);
        assert_eq!(rich.to_xml(), rich_xml);
    }

    #[test]
    fn test_math_runs() {
        let xml = format!(
            "<w:p {W} xmlns:m=\"http://schemas.openxmlformats.org/officeDocument/2006/math\"><m:oMath><m:r><m:t>x</m:t></m:r><m:r><m:t>y</m:t></m:r></m:oMath></w:p>"
        );
        let block = parse(&xml);
        let Chunk::Container(math) = &block.chunks[1] else {
            panic!("expected math container");
        };
        assert_eq!(math.kind, ContainerKind::Math);
        assert!(math.chunks.iter().all(|c| matches!(c, Chunk::Run(r) if r.math)));
        assert_eq!(block.to_xml(), xml);
    }
}
