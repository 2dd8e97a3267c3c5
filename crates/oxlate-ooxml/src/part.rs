//! Extraction of a single part
//!
//! A [`PartExtractor`] walks the events of one part. Paragraph-like elements
//! go through the block pipeline (markup filter, parser, simplifier,
//! mapper); everything in between is copied into the skeleton untouched.
//! Parts holding plain character data (document properties, presentation
//! comments) produce one plain unit per text element, and parts whose text
//! lives in attributes (sheet names, hyperlink targets) one unit per value.

use oxlate_ast::{TextFragment, TextUnit};
use tracing::debug;

use crate::block::AttributeText;
use crate::config::FilterParams;
use crate::error::{OoxmlError, Result};
use crate::mapper::BlockMapper;
use crate::parser::{BlockParser, PartContext};
use crate::shared_strings::{SharedStringMap, SharedStringTable};
use crate::simplifier::{MarkupFilter, ParagraphSimplifier};
use crate::skeleton::{PartSkeleton, Segment, SourceBlock, UnitBody, UnitSkeleton};
use crate::styles::{StyleDefinitions, TextStyleKind};
use crate::xml::{element_end, events_to_xml, read_events, Namespaces, Ns, StartTag, XmlEvent};

/// Units and skeleton of one part
#[derive(Debug, Clone, Default)]
pub struct PartExtraction {
    /// Units in document order
    pub units: Vec<TextUnit>,
    /// Markup with unit references
    pub skeleton: PartSkeleton,
}

/// Local names of document property elements holding translatable text
pub const DOC_PROPERTY_ELEMENTS: &[&str] = &["title", "subject", "description", "keywords", "category"];

/// Local name of the text element of a presentation comment
pub const PRESENTATION_COMMENT_ELEMENTS: &[&str] = &["text"];

/// Extracts parts of one document
pub struct PartExtractor<'a> {
    params: &'a FilterParams,
    styles: &'a StyleDefinitions,
    skip_placeholders: bool,
}

/// Per-part pipeline state
struct Pipeline<'p> {
    parser: BlockParser<'p>,
    filter: MarkupFilter,
    simplifier: ParagraphSimplifier,
    mapper: BlockMapper,
    ctx: PartContext,
    ns: &'p Namespaces,
    out: PartExtraction,
}

impl<'p> Pipeline<'p> {
    fn new(ns: &'p Namespaces, styles: &'p StyleDefinitions, params: &'p FilterParams) -> Self {
        Self {
            parser: BlockParser::new(ns, styles, params),
            filter: MarkupFilter::new(params),
            simplifier: ParagraphSimplifier::new(params),
            mapper: BlockMapper::new(),
            ctx: PartContext::default(),
            ns,
            out: PartExtraction::default(),
        }
    }

    /// Run one paragraph-like element through the block pipeline
    ///
    /// The skeleton keeps the element as read next to its simplified form.
    fn block(&mut self, events: &[XmlEvent]) -> Result<()> {
        let filtered = self.filter.apply(events, self.ns)?;
        let mut block = self.parser.parse(&filtered, &mut self.ctx)?;
        self.simplifier.simplify(&mut block);
        let mapped = self.mapper.text_units(&block, &mut self.out.skeleton);
        let source = SourceBlock {
            source: events_to_xml(events),
            units: mapped.units.iter().map(|u| u.id.clone()).collect(),
            segments: mapped.segments,
        };
        self.out.skeleton.extend(vec![Segment::Block(Box::new(source))]);
        self.out.units.extend(mapped.units);
        Ok(())
    }

    fn raw(&mut self, event: &XmlEvent) {
        self.out.skeleton.push_raw(&event.to_xml());
    }
}

impl<'a> PartExtractor<'a> {
    /// Create an extractor using the document's options and styles
    pub fn new(params: &'a FilterParams, styles: &'a StyleDefinitions) -> Self {
        Self {
            params,
            styles,
            skip_placeholders: false,
        }
    }

    /// Copy the text of presentation placeholder shapes without extracting it
    pub fn skipping_placeholders(mut self, skip: bool) -> Self {
        self.skip_placeholders = skip;
        self
    }

    /// Extract a part made of paragraphs (documents, slides, charts, comments)
    pub fn styled_part(&self, name: &str, xml: &[u8]) -> Result<PartExtraction> {
        self.walk_styled(xml).map_err(|e| e.in_part(name)).map(|out| {
            debug!(part = name, units = out.units.len(), "extracted styled part");
            out
        })
    }

    fn walk_styled(&self, xml: &[u8]) -> Result<PartExtraction> {
        let events = read_events(xml)?;
        let ns = Namespaces::collect(&events);
        let mut pipeline = Pipeline::new(&ns, self.styles, self.params);
        let mut in_placeholder = false;

        let mut i = 0;
        while i < events.len() {
            let event = &events[i];
            match event {
                XmlEvent::Start(tag) if is_block_start(&pipeline.parser, &ns, tag) => {
                    let end = element_end(&events, i);
                    if self.skip_placeholders && in_placeholder {
                        pipeline.out.skeleton.push_raw(&events_to_xml(&events[i..=end]));
                    } else {
                        pipeline.block(&events[i..=end])?;
                    }
                    i = end + 1;
                    continue;
                }
                XmlEvent::Start(tag) => {
                    pipeline.filter.check_structure(tag, &ns)?;
                    if ns.is(&tag.name, Ns::Presentation, "sp") && !tag.self_closing {
                        pipeline.ctx.text_style = Some(TextStyleKind::Other);
                        in_placeholder = false;
                    } else if ns.is(&tag.name, Ns::Presentation, "ph") {
                        pipeline.ctx.text_style =
                            Some(TextStyleKind::from_placeholder(tag.attr("type"), true));
                        in_placeholder = true;
                    }
                    pipeline.raw(event);
                }
                XmlEvent::End(tag) => {
                    if ns.is(&tag.name, Ns::Presentation, "sp") {
                        pipeline.ctx.text_style = None;
                        in_placeholder = false;
                    }
                    pipeline.raw(event);
                }
                _ => pipeline.raw(event),
            }
            i += 1;
        }

        if pipeline.ctx.fields.depth() > 0 {
            debug!(depth = pipeline.ctx.fields.depth(), "part ends inside a complex field");
        }
        Ok(pipeline.out)
    }

    /// Extract the shared string table in the order given by `map`
    pub fn shared_strings(
        &self,
        name: &str,
        table: &SharedStringTable,
        map: &SharedStringMap,
    ) -> Result<PartExtraction> {
        let run = || -> Result<PartExtraction> {
            let ns = table.namespaces();
            let placed = table.reordered(map)?;
            let mut pipeline = Pipeline::new(&ns, self.styles, self.params);
            pipeline.out.skeleton.push_raw(&table.header(placed.len()));
            for item in &placed {
                pipeline.out.skeleton.push_raw(item.lead);
                if item.extract {
                    pipeline.block(item.events)?;
                } else {
                    pipeline.out.skeleton.push_raw(&events_to_xml(item.events));
                }
            }
            pipeline.out.skeleton.push_raw(&table.trailer());
            debug!(
                part = name,
                strings = placed.len(),
                units = pipeline.out.units.len(),
                "extracted shared strings"
            );
            Ok(pipeline.out)
        };
        run().map_err(|e| e.in_part(name))
    }

    /// Extract a part whose translatable elements hold character data only
    ///
    /// Elements with child elements are copied as they are.
    pub fn simple_text_part(&self, name: &str, xml: &[u8], elements: &[&str]) -> Result<PartExtraction> {
        let events = read_events(xml).map_err(|e| e.in_part(name))?;
        let mut mapper = BlockMapper::new();
        let mut out = PartExtraction::default();

        let mut i = 0;
        while i < events.len() {
            let event = &events[i];
            out.skeleton.push_raw(&event.to_xml());
            let XmlEvent::Start(tag) = event else {
                i += 1;
                continue;
            };
            let end = element_end(&events, i);
            let inner = &events[i + 1..end.max(i + 1)];
            let text_only = inner.iter().all(|e| matches!(e, XmlEvent::Text(_)));
            if tag.self_closing || !elements.contains(&tag.local_name()) || !text_only {
                i += 1;
                continue;
            }

            let text: String = inner
                .iter()
                .filter_map(|e| match e {
                    XmlEvent::Text(t) => Some(t.text.as_str()),
                    _ => None,
                })
                .collect();
            if text.trim().is_empty() {
                out.skeleton.push_raw(&events_to_xml(inner));
            } else {
                let id = mapper.next_unit_id();
                let source = TextFragment::from_text(text);
                out.skeleton.insert_unit(
                    id.clone(),
                    UnitSkeleton {
                        original: vec![Segment::Raw(events_to_xml(inner))],
                        source: source.clone(),
                        body: UnitBody::Plain,
                    },
                );
                out.skeleton.extend(vec![Segment::Unit(id.clone())]);
                out.units.push(TextUnit::new(id, source));
            }
            out.skeleton.push_raw(&events[end].to_xml());
            i = end + 1;
        }

        debug!(part = name, units = out.units.len(), "extracted text part");
        Ok(out)
    }

    /// Extract attribute values of the elements picked by `select`
    ///
    /// `select` names the attribute to extract from a start tag, if any.
    pub fn attribute_part<F>(&self, name: &str, xml: &[u8], mut select: F) -> Result<PartExtraction>
    where
        F: FnMut(&StartTag) -> Option<&'static str>,
    {
        let events = read_events(xml).map_err(|e| e.in_part(name))?;
        let mut mapper = BlockMapper::new();
        let mut out = PartExtraction::default();

        for event in &events {
            let split = event.as_start().and_then(|tag| {
                let local = select(tag)?;
                let text = tag.attr_local(local).filter(|v| !v.trim().is_empty())?;
                let (before, raw, after) = tag.split_at_attr(local)?;
                Some((before, AttributeText { text: text.to_string(), raw }, after))
            });
            let Some((before, value, after)) = split else {
                out.skeleton.push_raw(&event.to_xml());
                continue;
            };
            out.skeleton.push_raw(&before);
            let mapped = mapper.attribute_unit(&value, &mut out.skeleton);
            out.skeleton.extend(mapped.segments);
            out.units.extend(mapped.units);
            out.skeleton.push_raw(&after);
        }

        debug!(part = name, units = out.units.len(), "extracted attribute part");
        Ok(out)
    }
}

/// Whether an element is handled as one block
fn is_block_start(parser: &BlockParser<'_>, ns: &Namespaces, tag: &StartTag) -> bool {
    parser.is_paragraph(tag) || ns.is(&tag.name, Ns::Spreadsheet, "text") || ns.is(&tag.name, Ns::Spreadsheet, "si")
}

/// Fail unless every unit of `units` is known to the skeleton
pub fn check_units(name: &str, extraction: &PartExtraction) -> Result<()> {
    match extraction
        .units
        .iter()
        .find(|u| extraction.skeleton.unit(&u.id).is_none())
    {
        Some(unit) => Err(OoxmlError::InvalidStructure(format!(
            "{name}: unit {} has no skeleton",
            unit.id
        ))),
        None => Ok(()),
    }
}
