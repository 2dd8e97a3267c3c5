//! Block-to-unit mapping
//!
//! [`BlockMapper`] flattens a simplified [`Block`] into coded text. The first
//! run with text becomes the base run: its text, and the text of runs shaped
//! like it, is emitted bare. Other runs are wrapped in paired run codes,
//! containers become paired codes and everything else becomes isolated
//! codes. Paragraphs nested in run markup (text boxes) and translatable
//! attribute values (drawing names) become separate referent units linked
//! by placeholder codes.
//!
//! Alongside the units, the mapper registers a [`UnitSkeleton`] per unit in
//! the part skeleton, so the part can be rebuilt without the block.

use std::collections::HashMap;

use oxlate_ast::{Code, CodeKind, TagType, TextFragment, TextUnit};

use crate::block::{
    push_raw, push_segment, AttributeText, Block, BlockFormat, Chunk, ContainerKind, MarkupKind,
    Nested, Run, RunChunk, RunCode, RunCodeKind,
};
use crate::skeleton::{CodeSkeleton, PartSkeleton, RunShape, RunsBody, Segment, UnitBody, UnitSkeleton};
use crate::xml::StartTag;

/// Units and part segments produced for one block
#[derive(Debug, Clone, Default)]
pub struct MappedBlock {
    /// Units in id order, the block's own unit first
    pub units: Vec<TextUnit>,
    /// Segments standing for the block in the part skeleton
    pub segments: Vec<Segment>,
}

/// Maps blocks of one part to text units
#[derive(Debug, Clone, Default)]
pub struct BlockMapper {
    last_unit: u32,
}

impl BlockMapper {
    /// Create a mapper; unit ids start at `tu1`
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next unit id of the part
    pub fn next_unit_id(&mut self) -> String {
        self.last_unit += 1;
        format!("tu{}", self.last_unit)
    }

    /// Map a block, registering unit skeletons in `skeleton`
    ///
    /// A block without text yields no unit of its own; its markup passes
    /// through, with units for any nested blocks that have text.
    pub fn text_units(&mut self, block: &Block, skeleton: &mut PartSkeleton) -> MappedBlock {
        let mut mapped = MappedBlock::default();

        if !block.has_text() {
            for chunk in &block.chunks {
                chunk.write_segments(&mut mapped.segments, &mut |nested, out| {
                    let inner = self.nested_units(nested, skeleton);
                    mapped.units.extend(inner.units);
                    for segment in inner.segments {
                        push_segment(out, segment);
                    }
                });
            }
            return mapped;
        }

        let id = self.next_unit_id();
        let chunks = &block.chunks;
        let leading = chunks
            .iter()
            .take_while(|c| matches!(c, Chunk::Markup(_)))
            .count();
        let trailing = chunks[leading..]
            .iter()
            .rev()
            .take_while(|c| matches!(c, Chunk::Markup(_)))
            .count();
        let middle = &chunks[leading..chunks.len() - trailing];

        let mut unit = UnitBuilder::new(block.format);
        for chunk in middle {
            self.map_chunk(chunk, &mut unit, skeleton);
        }

        for chunk in &chunks[..leading] {
            chunk.write_segments(&mut mapped.segments, &mut |_, _| {});
        }
        push_segment(&mut mapped.segments, Segment::Unit(id.clone()));
        for chunk in &chunks[chunks.len() - trailing..] {
            chunk.write_segments(&mut mapped.segments, &mut |_, _| {});
        }

        mapped.units.push(TextUnit::new(id.clone(), unit.content.clone()));
        mapped
            .units
            .extend(unit.referents.drain(..).map(TextUnit::referent));
        skeleton.insert_unit(id, unit.finish());
        mapped
    }

    fn map_chunk(&mut self, chunk: &Chunk, unit: &mut UnitBuilder, skeleton: &mut PartSkeleton) {
        match chunk {
            Chunk::Markup(markup) => {
                let kind = match markup.kind {
                    MarkupKind::Bookmark => CodeKind::Bookmark,
                    MarkupKind::LineBreak => CodeKind::LineBreak,
                    MarkupKind::Field => CodeKind::Field,
                    MarkupKind::BlockStart | MarkupKind::BlockEnd | MarkupKind::Other => {
                        CodeKind::Markup
                    }
                };
                let segments = vec![Segment::Raw(markup.xml.clone())];
                unit.isolated(kind, markup.xml.clone(), segments, false);
            }
            Chunk::Container(container) => {
                let kind = match container.kind {
                    ContainerKind::Hyperlink => CodeKind::Hyperlink,
                    ContainerKind::SmartTag => CodeKind::SmartTag,
                    ContainerKind::Field => CodeKind::Field,
                    ContainerKind::Math | ContainerKind::Other => CodeKind::Markup,
                };
                let id = unit.next_code();
                unit.content
                    .push_code(Code::opening(id, kind, container.open.as_str()));
                unit.codes.insert(
                    id,
                    CodeSkeleton::Container {
                        open: container.open.clone(),
                        close: container.close.clone(),
                    },
                );
                push_raw(&mut unit.original, &container.open);
                for child in &container.chunks {
                    self.map_chunk(child, unit, skeleton);
                }
                push_raw(&mut unit.original, &container.close);
                unit.content
                    .push_code(Code::closing(id, kind, container.close.as_str()));
            }
            Chunk::Run(run) => self.map_run(run, unit, skeleton),
        }
    }

    fn map_run(&mut self, run: &Run, unit: &mut UnitBuilder, skeleton: &mut PartSkeleton) {
        if !run.has_text() {
            let mut segments = Vec::new();
            run.write_segments(&mut segments, &mut |nested, out| {
                self.map_nested(nested, out, unit, skeleton);
            });
            unit.isolated(CodeKind::Run, run.to_xml(), segments, false);
            return;
        }

        let shape = run_shape(run);
        let wrap = match &unit.base {
            Some(base) => base.run_open != shape.run_open || base.run_close != shape.run_close,
            None => false,
        };
        if unit.base.is_none() {
            unit.base = Some(shape.clone());
        }

        push_raw(&mut unit.original, &run.lead);
        push_raw(&mut unit.original, &run.open_xml());
        let mut wrap_id = None;
        if wrap {
            let id = unit.next_code();
            unit.content
                .push_code(Code::opening(id, CodeKind::Run, shape.run_open.as_str()));
            unit.codes.insert(id, CodeSkeleton::Run(shape.clone()));
            wrap_id = Some(id);
        }

        for chunk in &run.body {
            match chunk {
                RunChunk::Text(text) => {
                    unit.content.push_text(text.text.as_str());
                    push_raw(&mut unit.original, &text.lead);
                    push_raw(&mut unit.original, &text.xml);
                    if text.open.is_none() && unit.format == BlockFormat::Word {
                        let mut chars = text.text.chars();
                        if let (Some(c), None) = (chars.next(), chars.next()) {
                            if !unit.char_codes.iter().any(|(ch, _)| *ch == c) {
                                unit.char_codes.push((c, text.xml.clone()));
                            }
                        }
                    }
                }
                RunChunk::Code(code) => self.map_run_code(code, unit, skeleton),
            }
        }

        push_raw(&mut unit.original, &run.close);
        if let Some(id) = wrap_id {
            unit.content
                .push_code(Code::closing(id, CodeKind::Run, shape.run_close.as_str()));
        }
    }

    fn map_run_code(&mut self, code: &RunCode, unit: &mut UnitBuilder, skeleton: &mut PartSkeleton) {
        let kind = match code.kind {
            RunCodeKind::Tab => CodeKind::Tab,
            RunCodeKind::Break => CodeKind::LineBreak,
            RunCodeKind::FieldBegin
            | RunCodeKind::FieldSeparate
            | RunCodeKind::FieldEnd
            | RunCodeKind::FieldInstruction => CodeKind::Field,
            RunCodeKind::Nested => CodeKind::TextBox,
            RunCodeKind::Other => CodeKind::Markup,
        };
        let mut segments = Vec::new();
        code.write_segments(&mut segments, &mut |nested, out| {
            self.map_nested(nested, out, unit, skeleton);
        });
        unit.isolated(kind, code.to_xml(), segments, true);
    }

    /// Map nested content into referent units of the enclosing unit
    fn map_nested(
        &mut self,
        nested: Nested<'_>,
        out: &mut Vec<Segment>,
        unit: &mut UnitBuilder,
        skeleton: &mut PartSkeleton,
    ) {
        let inner = self.nested_units(nested, skeleton);
        unit.referents.extend(inner.units);
        for segment in inner.segments {
            push_segment(out, segment);
        }
    }

    fn nested_units(&mut self, nested: Nested<'_>, skeleton: &mut PartSkeleton) -> MappedBlock {
        match nested {
            Nested::Block(block) => self.text_units(block, skeleton),
            Nested::Attribute(value) => self.attribute_unit(value, skeleton),
        }
    }

    /// Map an attribute value to a unit of plain text
    pub fn attribute_unit(&mut self, value: &AttributeText, skeleton: &mut PartSkeleton) -> MappedBlock {
        let id = self.next_unit_id();
        let source = TextFragment::from_text(value.text.as_str());
        skeleton.insert_unit(
            id.clone(),
            UnitSkeleton {
                original: vec![Segment::Raw(value.raw.clone())],
                source: source.clone(),
                body: UnitBody::Attribute,
            },
        );
        MappedBlock {
            units: vec![TextUnit::new(id.clone(), source)],
            segments: vec![Segment::Unit(id)],
        }
    }
}

/// Shape of a text-bearing run
///
/// `xml:space` is left to the writer, which decides it per text.
fn run_shape(run: &Run) -> RunShape {
    let mut text_open = run
        .body
        .iter()
        .find_map(|c| match c {
            RunChunk::Text(t) => t.open.clone(),
            RunChunk::Code(_) => None,
        })
        .unwrap_or_else(|| StartTag::new(run.text_element_name(), false));
    text_open.remove_attr("xml:space");
    let run_close = match &run.start {
        Some(start) if !start.self_closing => start.end_tag(),
        _ => String::new(),
    };
    RunShape {
        run_open: run.open_xml(),
        text_open,
        run_close,
    }
}

/// Unit under construction
struct UnitBuilder {
    format: BlockFormat,
    content: TextFragment,
    original: Vec<Segment>,
    base: Option<RunShape>,
    codes: HashMap<u32, CodeSkeleton>,
    char_codes: Vec<(char, String)>,
    referents: Vec<TextUnit>,
    last_code: u32,
}

impl UnitBuilder {
    fn new(format: BlockFormat) -> Self {
        Self {
            format,
            content: TextFragment::new(),
            original: Vec::new(),
            base: None,
            codes: HashMap::new(),
            char_codes: Vec::new(),
            referents: Vec::new(),
            last_code: 0,
        }
    }

    fn next_code(&mut self) -> u32 {
        self.last_code += 1;
        self.last_code
    }

    /// Add an isolated code, or a placeholder when its markup holds units
    fn isolated(&mut self, kind: CodeKind, outer_data: String, segments: Vec<Segment>, in_run: bool) {
        let id = self.next_code();
        let referents: Vec<String> = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Unit(unit) => Some(unit.clone()),
                Segment::Raw(_) | Segment::Block(_) => None,
            })
            .collect();
        let code = if referents.is_empty() {
            Code::new(id, TagType::Isolated, kind, outer_data)
        } else {
            Code::placeholder(id, kind, outer_data, referents)
        };
        self.content.push_code(code);
        for segment in segments.iter().cloned() {
            push_segment(&mut self.original, segment);
        }
        let skeleton = if in_run {
            CodeSkeleton::InRun(segments)
        } else {
            CodeSkeleton::BlockLevel(segments)
        };
        self.codes.insert(id, skeleton);
    }

    fn finish(self) -> UnitSkeleton {
        UnitSkeleton {
            original: self.original,
            source: self.content,
            body: UnitBody::Runs(RunsBody {
                base: self.base,
                codes: self.codes,
                char_codes: self.char_codes,
                preserve_space: self.format != BlockFormat::Drawing,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterParams;
    use crate::parser::{BlockParser, PartContext};
    use crate::simplifier::ParagraphSimplifier;
    use crate::styles::StyleDefinitions;
    use crate::xml::{read_events, Namespaces};

    const W: &str = "xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"";

    fn map_with(xml: &str, params: &FilterParams) -> (MappedBlock, PartSkeleton) {
        let events = read_events(xml.as_bytes()).unwrap();
        let ns = Namespaces::collect(&events);
        let styles = StyleDefinitions::Empty;
        let mut block = BlockParser::new(&ns, &styles, params)
            .parse(&events, &mut PartContext::default())
            .unwrap();
        ParagraphSimplifier::new(params).simplify(&mut block);
        let mut skeleton = PartSkeleton::new();
        let mapped = BlockMapper::new().text_units(&block, &mut skeleton);
        skeleton.extend(mapped.segments.clone());
        (mapped, skeleton)
    }

    fn map(xml: &str) -> (MappedBlock, PartSkeleton) {
        map_with(xml, &FilterParams::default())
    }

    #[test]
    fn test_tab_as_code() {
        let (mapped, _) = map(&format!(
            "<w:p {W}><w:r><w:t>Before</w:t><w:tab/><w:t>after.</w:t></w:r></w:p>"
        ));
        assert_eq!(mapped.units.len(), 1);
        let source = mapped.units[0].source();
        assert_eq!(source.text(), "Beforeafter.");
        let codes: Vec<_> = source.codes().collect();
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].kind, CodeKind::Tab);
        assert_eq!(codes[0].tag_type, TagType::Isolated);
        assert_eq!(codes[0].id, 1);
    }

    #[test]
    fn test_tab_as_character() {
        let params = FilterParams {
            add_tab_as_character: true,
            ..FilterParams::default()
        };
        let (mapped, _) = map_with(
            &format!("<w:p {W}><w:r><w:t>Before</w:t><w:tab/><w:t>after.</w:t></w:r></w:p>"),
            &params,
        );
        let source = mapped.units[0].source();
        assert_eq!(source.text(), "Before\tafter.");
        assert_eq!(source.codes().count(), 0);
    }

    #[test]
    fn test_prefix_and_suffix_stay_in_skeleton() {
        let xml = format!(
            "<w:p {W}><w:pPr><w:jc w:val=\"center\"/></w:pPr><w:r><w:t>Title</w:t></w:r></w:p>"
        );
        let (mapped, skeleton) = map(&xml);
        assert_eq!(
            mapped.segments,
            vec![
                Segment::Raw(format!("<w:p {W}><w:pPr><w:jc w:val=\"center\"/></w:pPr>")),
                Segment::Unit("tu1".into()),
                Segment::Raw("</w:p>".into()),
            ]
        );
        assert_eq!(mapped.units[0].source(), TextFragment::from_text("Title"));
        assert_eq!(skeleton.render(&HashMap::new()), xml);
    }

    #[test]
    fn test_formatting_becomes_paired_codes() {
        let (mapped, skeleton) = map(&format!(
            "<w:p {W}><w:r><w:t xml:space=\"preserve\">Click </w:t></w:r><w:hyperlink w:anchor=\"a\"><w:r><w:rPr><w:b/></w:rPr><w:t>here</w:t></w:r></w:hyperlink><w:r><w:t>.</w:t></w:r></w:p>"
        ));
        let source = mapped.units[0].source();
        assert_eq!(source.to_string(), "Click <link1><run2>here</run2></link1>.");
        assert!(source.is_balanced());

        let target = source.map_text(|t| t.to_uppercase());
        let targets: HashMap<String, TextFragment> = [("tu1".to_string(), target)].into_iter().collect();
        assert_eq!(
            skeleton.render(&targets),
            format!("<w:p {W}><w:r><w:t xml:space=\"preserve\">CLICK </w:t></w:r><w:hyperlink w:anchor=\"a\"><w:r><w:rPr><w:b/></w:rPr><w:t>HERE</w:t></w:r></w:hyperlink><w:r><w:t>.</w:t></w:r></w:p>")
        );
    }

    #[test]
    fn test_textless_block_yields_no_unit() {
        let xml = format!("<w:p {W}><w:r><w:drawing/></w:r><w:r><w:t xml:space=\"preserve\"> </w:t></w:r></w:p>");
        let (mapped, skeleton) = map(&xml);
        assert!(mapped.units.is_empty());
        assert_eq!(skeleton.render(&HashMap::new()), xml);
    }

    #[test]
    fn test_text_box_becomes_referent() {
        let xml = format!(
            "<w:p {W}><w:r><w:t>Outer</w:t></w:r><w:r><w:pict><w:txbxContent><w:p><w:r><w:t>Inner</w:t></w:r></w:p></w:txbxContent></w:pict></w:r></w:p>"
        );
        let (mapped, skeleton) = map(&xml);
        assert_eq!(mapped.units.len(), 2);
        assert_eq!(mapped.units[0].id, "tu1");
        assert!(!mapped.units[0].is_referent);
        assert_eq!(mapped.units[1].id, "tu2");
        assert!(mapped.units[1].is_referent);
        assert_eq!(mapped.units[1].source_text(), "Inner");

        let source = mapped.units[0].source();
        let placeholder = source.codes().find(|c| c.tag_type == TagType::Placeholder).unwrap();
        assert_eq!(placeholder.referents, vec!["tu2".to_string()]);

        let targets: HashMap<String, TextFragment> =
            [("tu2".to_string(), TextFragment::from_text("Innen"))].into_iter().collect();
        assert_eq!(skeleton.render(&targets), xml.replace("Inner", "Innen"));
    }

    #[test]
    fn test_drawing_name_becomes_unit() {
        let xml = format!(
            "<w:p {W}><w:r><w:drawing><wp:inline xmlns:wp=\"urn:wp\"><wp:docPr id=\"1\" name=\"Logo\"/></wp:inline></w:drawing></w:r></w:p>"
        );
        let (mapped, skeleton) = map(&xml);
        assert_eq!(mapped.units.len(), 1);
        assert!(!mapped.units[0].is_referent);
        assert_eq!(mapped.units[0].source_text(), "Logo");

        let targets: HashMap<String, TextFragment> =
            [("tu1".to_string(), TextFragment::from_text("Logo & Marke"))].into_iter().collect();
        assert_eq!(skeleton.render(&targets), xml.replace("Logo", "Logo &amp; Marke"));

        let xml = format!(
            "<w:p {W}><w:r><w:t>See</w:t></w:r><w:r><w:drawing><wp:docPr xmlns:wp=\"urn:wp\" name=\"Logo\"/></w:drawing></w:r></w:p>"
        );
        let (mapped, _) = map(&xml);
        assert_eq!(mapped.units.len(), 2);
        assert!(mapped.units[1].is_referent);
        let source = mapped.units[0].source();
        let placeholder = source.codes().find(|c| c.tag_type == TagType::Placeholder).unwrap();
        assert_eq!(placeholder.kind, CodeKind::Run);
        assert_eq!(placeholder.referents, vec!["tu2".to_string()]);
    }

    #[test]
    fn test_code_ids_restart_per_unit() {
        let mut skeleton = PartSkeleton::new();
        let mut mapper = BlockMapper::new();
        let xml = format!("<w:p {W}><w:r><w:t>a</w:t><w:tab/><w:t>b</w:t></w:r></w:p>");
        let events = read_events(xml.as_bytes()).unwrap();
        let ns = Namespaces::collect(&events);
        let styles = StyleDefinitions::Empty;
        let params = FilterParams::default();
        let parser = BlockParser::new(&ns, &styles, &params);

        for expected in ["tu1", "tu2"] {
            let block = parser.parse(&events, &mut PartContext::default()).unwrap();
            let mapped = mapper.text_units(&block, &mut skeleton);
            assert_eq!(mapped.units[0].id, expected);
            assert_eq!(mapped.units[0].source().codes().next().map(|c| c.id), Some(1));
        }
    }
}
