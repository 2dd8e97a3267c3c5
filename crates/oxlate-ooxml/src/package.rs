//! Package pipeline: extract, merge, round trip
//!
//! [`extract`] opens a package, decides from its content types and
//! relationships which parts hold translatable text, loads the styles each
//! part needs and runs the part extractor over them. The result keeps the
//! original archive, so [`ExtractedPackage::merge`] only replaces the parts
//! it extracted (and, for workbooks, the worksheets whose shared string
//! indices were renumbered).
//!
//! Units travel between extraction and merge as [`PackageUnits`], a JSON
//! document grouping units by part name.

use std::collections::{HashMap, HashSet};

use oxlate_ast::{TagType, TextFragment, TextUnit};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::archive::OoxmlArchive;
use crate::config::FilterParams;
use crate::content_types::{types, ContentTypes, CONTENT_TYPES_PATH};
use crate::error::{OoxmlError, Result};
use crate::excel::{self, ExcelStyles, SheetInfo};
use crate::part::{
    check_units, PartExtraction, PartExtractor, DOC_PROPERTY_ELEMENTS,
    PRESENTATION_COMMENT_ELEMENTS,
};
use crate::relationships::{rels_path_for, resolve_target, Relationships};
use crate::shared_strings::{SharedStringMap, SharedStringTable};
use crate::styles::{PresentationStyles, StyleDefinitions, StyleSheet};
use crate::xml::{read_events, XmlEvent};

// ============================================================================
// Interchange
// ============================================================================

/// Units of one part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartUnits {
    /// Part name inside the package
    pub part: String,
    /// Units in document order
    pub units: Vec<TextUnit>,
}

/// Units of a whole package, as exchanged with translators
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageUnits {
    /// Parts in extraction order
    pub parts: Vec<PartUnits>,
}

impl PackageUnits {
    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Render as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Total number of units
    pub fn unit_count(&self) -> usize {
        self.parts.iter().map(|p| p.units.len()).sum()
    }

    /// Units of a part
    pub fn part(&self, name: &str) -> Option<&PartUnits> {
        self.parts.iter().find(|p| p.part == name)
    }

    /// Set every unit's target to its source with the text rewritten by `f`
    pub fn translate_with<F>(&mut self, mut f: F)
    where
        F: FnMut(&str) -> String,
    {
        for unit in self.parts.iter_mut().flat_map(|p| p.units.iter_mut()) {
            let target = unit.source().map_text(&mut f);
            unit.set_target(target);
        }
    }
}

// ============================================================================
// Package kinds
// ============================================================================

/// Office application a package belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    /// WordprocessingML (.docx, .docm, .dotx)
    Word,
    /// SpreadsheetML (.xlsx, .xlsm, .xltx)
    Excel,
    /// PresentationML (.pptx, .pptm, .ppsx)
    PowerPoint,
}

impl PackageKind {
    /// Kind of a main document content type
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type {
            types::WORD_DOCUMENT | types::WORD_TEMPLATE | types::WORD_MACRO_DOCUMENT => {
                Some(PackageKind::Word)
            }
            types::EXCEL_WORKBOOK | types::EXCEL_MACRO_WORKBOOK | types::EXCEL_TEMPLATE => {
                Some(PackageKind::Excel)
            }
            types::PRESENTATION | types::PRESENTATION_MACRO | types::PRESENTATION_SLIDESHOW => {
                Some(PackageKind::PowerPoint)
            }
            _ => None,
        }
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// One extracted part
#[derive(Debug, Clone)]
pub struct ExtractedPart {
    /// Part name
    pub name: String,
    /// Units and skeleton
    pub extraction: PartExtraction,
}

/// A package with its extracted parts
#[derive(Debug, Clone)]
pub struct ExtractedPackage {
    archive: OoxmlArchive,
    kind: PackageKind,
    parts: Vec<ExtractedPart>,
    /// Parts rewritten during extraction, written back on merge
    rewritten: Vec<(String, String)>,
}

/// Extract the translatable text of a package
///
/// Any failing part fails the whole package.
pub fn extract(bytes: &[u8], params: &FilterParams) -> Result<ExtractedPackage> {
    let archive = OoxmlArchive::from_bytes(bytes)?;
    ExtractedPackage::from_archive(archive, params)
}

/// Merge translated units into an extracted package
pub fn merge(extracted: &ExtractedPackage, translations: &PackageUnits) -> Result<Vec<u8>> {
    extracted.merge(translations)
}

/// Extract and merge back without translations
pub fn roundtrip(bytes: &[u8], params: &FilterParams) -> Result<Vec<u8>> {
    let extracted = extract(bytes, params)?;
    extracted.merge(&extracted.units())
}

impl ExtractedPackage {
    /// Extract from an unpacked archive
    pub fn from_archive(archive: OoxmlArchive, params: &FilterParams) -> Result<Self> {
        let content_types = ContentTypes::parse(archive.require(CONTENT_TYPES_PATH)?)
            .map_err(|e| e.in_part(CONTENT_TYPES_PATH))?;
        let root_rels = load_rels(&archive, "")?;
        let main = root_rels
            .first_of_type(Relationships::TYPE_OFFICE_DOCUMENT)
            .map(|target| resolve_target("", target))
            .ok_or_else(|| OoxmlError::InvalidStructure("package has no main document".into()))?;
        let kind = content_types
            .content_type(&main)
            .and_then(PackageKind::from_content_type)
            .ok_or_else(|| {
                OoxmlError::InvalidStructure(format!("{main} is not a Word, Excel or PowerPoint document"))
            })?;

        let mut builder = Builder {
            archive: &archive,
            content_types: &content_types,
            params,
            main: &main,
            parts: Vec::new(),
            rewritten: Vec::new(),
        };
        match kind {
            PackageKind::Word => builder.word()?,
            PackageKind::Excel => builder.excel()?,
            PackageKind::PowerPoint => builder.powerpoint()?,
        }
        let Builder {
            parts, rewritten, ..
        } = builder;

        let package = Self {
            kind,
            parts,
            rewritten,
            archive,
        };
        info!(
            kind = ?package.kind,
            parts = package.parts.len(),
            units = package.parts.iter().map(|p| p.extraction.units.len()).sum::<usize>(),
            "extracted package"
        );
        Ok(package)
    }

    /// Application the package belongs to
    pub fn kind(&self) -> PackageKind {
        self.kind
    }

    /// Extracted parts in extraction order
    pub fn parts(&self) -> &[ExtractedPart] {
        &self.parts
    }

    /// Extracted units, without targets
    pub fn units(&self) -> PackageUnits {
        PackageUnits {
            parts: self
                .parts
                .iter()
                .map(|p| PartUnits {
                    part: p.name.clone(),
                    units: p.extraction.units.clone(),
                })
                .collect(),
        }
    }

    /// Rebuild the package with the targets of `translations`
    ///
    /// Units without a target, and targets whose codes do not fit the
    /// source, keep their original markup.
    pub fn merge(&self, translations: &PackageUnits) -> Result<Vec<u8>> {
        let known: HashSet<&str> = self.parts.iter().map(|p| p.name.as_str()).collect();
        for part in &translations.parts {
            if !known.contains(part.part.as_str()) {
                warn!(part = %part.part, "translations for a part that was not extracted");
            }
        }

        let mut archive = self.archive.clone();
        for (name, xml) in &self.rewritten {
            archive.set_string(name.clone(), xml.clone());
        }
        for part in &self.parts {
            let targets = part_targets(part, translations.part(&part.name));
            debug!(part = %part.name, targets = targets.len(), "merging part");
            let xml = part.extraction.skeleton.render(&targets);
            archive.set_string(part.name.clone(), xml);
        }
        archive.to_bytes()
    }
}

/// Targets of one part that can be merged
fn part_targets(part: &ExtractedPart, units: Option<&PartUnits>) -> HashMap<String, TextFragment> {
    let mut targets = HashMap::new();
    let Some(units) = units else {
        return targets;
    };
    for unit in &units.units {
        let Some(target) = unit.target() else {
            continue;
        };
        let Some(skeleton) = part.extraction.skeleton.unit(&unit.id) else {
            warn!(part = %part.name, unit = %unit.id, "unknown unit, skipped");
            continue;
        };
        if !codes_fit(&skeleton.source, &target) {
            warn!(part = %part.name, unit = %unit.id, "target codes do not match the source, skipped");
            continue;
        }
        targets.insert(unit.id.clone(), target);
    }
    targets
}

/// Whether a target is balanced and uses only codes of its source
fn codes_fit(source: &TextFragment, target: &TextFragment) -> bool {
    let known: HashSet<(u32, TagType)> = source.codes().map(|c| (c.id, c.tag_type)).collect();
    target.is_balanced() && target.codes().all(|c| known.contains(&(c.id, c.tag_type)))
}

fn load_rels(archive: &OoxmlArchive, part: &str) -> Result<Relationships> {
    let path = rels_path_for(part);
    match archive.get(&path) {
        Some(xml) => Relationships::parse(xml).map_err(|e| e.in_part(&path)),
        None => Ok(Relationships::new()),
    }
}

/// Targets of relationships of one type, resolved to part names
fn related(archive: &OoxmlArchive, part: &str, rel_type: &str) -> Result<Vec<String>> {
    let rels = load_rels(archive, part)?;
    Ok(rels
        .of_type(rel_type)
        .map(|target| resolve_target(part, target))
        .collect())
}

/// Whether a part name is the relationships part of a slide
fn is_slide_rels(name: &str) -> bool {
    name.strip_suffix(".xml.rels")
        .and_then(|stem| stem.rsplit_once("slide"))
        .is_some_and(|(head, number)| {
            !head.is_empty() && !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit())
        })
}

/// Part selection and extraction for one package
struct Builder<'a> {
    archive: &'a OoxmlArchive,
    content_types: &'a ContentTypes,
    params: &'a FilterParams,
    main: &'a str,
    parts: Vec<ExtractedPart>,
    rewritten: Vec<(String, String)>,
}

/// How a selected part is extracted
enum Handler {
    Styled(StyleDefinitions),
    /// Slide masters and layouts, whose placeholders may be left alone
    Master(StyleDefinitions),
    Text(&'static [&'static str]),
}

impl<'a> Builder<'a> {
    /// Part names in archive order with their content types
    fn xml_parts(&self) -> Vec<(String, String)> {
        self.archive
            .entries()
            .iter()
            .filter(|e| !e.is_dir() && e.name.ends_with(".xml"))
            .filter_map(|e| {
                let ct = self.content_types.content_type(&e.name)?;
                Some((e.name.clone(), ct.to_string()))
            })
            .collect()
    }

    fn run(&mut self, name: &str, handler: Handler) -> Result<()> {
        let xml = self.archive.require(name)?;
        let extraction = match handler {
            Handler::Styled(styles) => {
                PartExtractor::new(self.params, &styles).styled_part(name, xml)?
            }
            Handler::Master(styles) => PartExtractor::new(self.params, &styles)
                .skipping_placeholders(self.params.ignore_placeholders_in_powerpoint_masters)
                .styled_part(name, xml)?,
            Handler::Text(elements) => PartExtractor::new(self.params, &StyleDefinitions::Empty)
                .simple_text_part(name, xml, elements)?,
        };
        self.push(name, extraction)
    }

    fn push(&mut self, name: &str, extraction: PartExtraction) -> Result<()> {
        check_units(name, &extraction)?;
        self.parts.push(ExtractedPart {
            name: name.to_string(),
            extraction,
        });
        Ok(())
    }

    /// Handler for parts every kind of package shares
    fn common_handler(&self, content_type: &str) -> Option<Handler> {
        match content_type {
            types::CORE_PROPERTIES if self.params.translate_doc_properties => {
                Some(Handler::Text(DOC_PROPERTY_ELEMENTS))
            }
            types::DRAWING_CHART | types::DRAWING_DIAGRAM_DATA => {
                Some(Handler::Styled(StyleDefinitions::Empty))
            }
            _ => None,
        }
    }

    // ------------------------------------------------------------------------
    // Word
    // ------------------------------------------------------------------------

    fn word(&mut self) -> Result<()> {
        let styles = match related(self.archive, self.main, Relationships::TYPE_STYLES)?.first() {
            Some(path) => match self.archive.get(path) {
                Some(xml) => StyleDefinitions::Word(StyleSheet::parse(xml).map_err(|e| e.in_part(path))?),
                None => StyleDefinitions::Empty,
            },
            None => StyleDefinitions::Empty,
        };

        let params = self.params;
        for (name, ct) in self.xml_parts() {
            let handler = match ct.as_str() {
                types::WORD_DOCUMENT | types::WORD_TEMPLATE | types::WORD_MACRO_DOCUMENT
                | types::WORD_FOOTNOTES | types::WORD_ENDNOTES => Some(Handler::Styled(styles.clone())),
                types::WORD_HEADER | types::WORD_FOOTER if params.translate_word_headers_footers => {
                    Some(Handler::Styled(styles.clone()))
                }
                types::WORD_COMMENTS if params.translate_comments => {
                    Some(Handler::Styled(styles.clone()))
                }
                other => self.common_handler(other),
            };
            if let Some(handler) = handler {
                self.run(&name, handler)?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Excel
    // ------------------------------------------------------------------------

    fn excel(&mut self) -> Result<()> {
        let workbook_rels = load_rels(self.archive, self.main)?;
        let sheets = excel::parse_workbook_sheets(self.archive.require(self.main)?)
            .map_err(|e| e.in_part(self.main))?;
        let styles = match workbook_rels.first_of_type(Relationships::TYPE_STYLES) {
            Some(target) => {
                let path = resolve_target(self.main, target);
                match self.archive.get(&path) {
                    Some(xml) => ExcelStyles::parse(xml).map_err(|e| e.in_part(&path))?,
                    None => ExcelStyles::default(),
                }
            }
            None => ExcelStyles::default(),
        };

        // Worksheets first, in tab order: they number the shared strings
        let mut map = SharedStringMap::new();
        let mut hidden_parts = HashSet::new();
        for (index, sheet) in sheets.iter().enumerate() {
            let Some(target) = workbook_rels.get(&sheet.rel_id) else {
                warn!(sheet = %sheet.name, "sheet without a worksheet relationship");
                continue;
            };
            let path = resolve_target(self.main, target);
            let Some(xml) = self.archive.get(&path) else {
                warn!(sheet = %sheet.name, part = %path, "worksheet part is missing");
                continue;
            };
            let info = SheetInfo {
                number: index + 1,
                hidden: sheet.hidden,
            };
            let rewritten = excel::rewrite_worksheet(xml, info, self.params, &styles, &mut map)
                .map_err(|e| e.in_part(&path))?;
            if sheet.hidden && !self.params.translate_excel_hidden {
                hidden_parts.extend(self.sheet_attachments(&path)?);
            }
            self.rewritten.push((path, rewritten));
        }

        let params = self.params;
        for (name, ct) in self.xml_parts() {
            match ct.as_str() {
                types::EXCEL_SHARED_STRINGS => {
                    let xml = self.archive.require(&name)?;
                    let table = SharedStringTable::parse(xml).map_err(|e| e.in_part(&name))?;
                    let extraction = PartExtractor::new(params, &StyleDefinitions::Empty)
                        .shared_strings(&name, &table, &map)?;
                    self.push(&name, extraction)?;
                }
                types::EXCEL_WORKBOOK | types::EXCEL_MACRO_WORKBOOK | types::EXCEL_TEMPLATE => {
                    if params.translate_excel_sheet_names && name == self.main {
                        let xml = self.archive.require(&name)?;
                        let extraction = PartExtractor::new(params, &StyleDefinitions::Empty)
                            .attribute_part(&name, xml, |tag| {
                                let hidden = matches!(tag.attr("state"), Some("hidden" | "veryHidden"));
                                (tag.local_name() == "sheet" && (params.translate_excel_hidden || !hidden))
                                    .then_some("name")
                            })?;
                        self.push(&name, extraction)?;
                    }
                }
                types::EXCEL_COMMENTS => {
                    if params.translate_comments && !hidden_parts.contains(&name) {
                        self.run(&name, Handler::Styled(StyleDefinitions::Empty))?;
                    }
                }
                types::EXCEL_DRAWING => {
                    if params.translate_excel_drawings && !hidden_parts.contains(&name) {
                        self.run(&name, Handler::Styled(StyleDefinitions::Empty))?;
                    }
                }
                types::DRAWING_CHART => {
                    if !hidden_parts.contains(&name) {
                        self.run(&name, Handler::Styled(StyleDefinitions::Empty))?;
                    } else {
                        debug!(part = %name, "chart of a hidden sheet skipped");
                    }
                }
                types::DRAWING_DIAGRAM_DATA => {
                    if params.translate_excel_diagram_data {
                        self.run(&name, Handler::Styled(StyleDefinitions::Empty))?;
                    }
                }
                other => {
                    if let Some(handler) = self.common_handler(other) {
                        self.run(&name, handler)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Comments, drawings and charts belonging to a worksheet
    fn sheet_attachments(&self, sheet: &str) -> Result<Vec<String>> {
        let mut parts = related(self.archive, sheet, Relationships::TYPE_COMMENTS)?;
        for drawing in related(self.archive, sheet, Relationships::TYPE_DRAWING)? {
            parts.extend(related(self.archive, &drawing, Relationships::TYPE_CHART)?);
            parts.push(drawing);
        }
        Ok(parts)
    }

    // ------------------------------------------------------------------------
    // PowerPoint
    // ------------------------------------------------------------------------

    fn powerpoint(&mut self) -> Result<()> {
        let included = self.included_slides()?;
        let params = self.params;
        for (name, ct) in self.xml_parts() {
            let handler = match ct.as_str() {
                types::SLIDE if included.contains(&name) => {
                    Some(Handler::Styled(self.slide_styles(&name)?))
                }
                types::NOTES_SLIDE if params.translate_powerpoint_notes => {
                    let slides = related(self.archive, &name, Relationships::TYPE_SLIDE)?;
                    if slides.iter().all(|s| included.contains(s)) {
                        Some(Handler::Styled(self.notes_styles(&name)?))
                    } else {
                        None
                    }
                }
                types::SLIDE_MASTER if params.translate_powerpoint_masters => {
                    let xml = self.archive.require(&name)?;
                    let styles = PresentationStyles::from_slide_master(xml).map_err(|e| e.in_part(&name))?;
                    Some(Handler::Master(StyleDefinitions::Presentation(styles)))
                }
                types::SLIDE_LAYOUT if params.translate_powerpoint_masters => {
                    Some(Handler::Master(self.layout_styles(&name)?))
                }
                types::NOTES_MASTER
                    if params.translate_powerpoint_masters && params.translate_powerpoint_notes =>
                {
                    let xml = self.archive.require(&name)?;
                    let styles = PresentationStyles::from_notes_master(xml).map_err(|e| e.in_part(&name))?;
                    Some(Handler::Master(StyleDefinitions::Presentation(styles)))
                }
                types::PRESENTATION_COMMENTS if params.translate_comments => {
                    Some(Handler::Text(PRESENTATION_COMMENT_ELEMENTS))
                }
                other => self.common_handler(other),
            };
            if let Some(handler) = handler {
                self.run(&name, handler)?;
            }
        }

        if params.extract_external_hyperlinks {
            let rels: Vec<String> = self
                .archive
                .file_list()
                .filter(|name| is_slide_rels(name))
                .map(str::to_string)
                .collect();
            for name in rels {
                let xml = self.archive.require(&name)?;
                let extraction = PartExtractor::new(params, &StyleDefinitions::Empty)
                    .attribute_part(&name, xml, |tag| {
                        let external = tag.attr("TargetMode") == Some("External")
                            && tag.attr("Type") == Some(Relationships::TYPE_HYPERLINK);
                        (tag.local_name() == "Relationship" && external).then_some("Target")
                    })?;
                if !extraction.units.is_empty() {
                    self.push(&name, extraction)?;
                }
            }
        }
        Ok(())
    }

    /// Slide parts selected by `included_slide_numbers`, numbered in show order
    fn included_slides(&self) -> Result<HashSet<String>> {
        let rels = load_rels(self.archive, self.main)?;
        let events = read_events(self.archive.require(self.main)?).map_err(|e| e.in_part(self.main))?;
        let mut included = HashSet::new();
        let slide_ids = events
            .iter()
            .filter_map(XmlEvent::as_start)
            .filter(|tag| tag.local_name() == "sldId");
        for (index, tag) in slide_ids.enumerate() {
            let number = index as u32 + 1;
            let target = tag
                .attributes()
                .iter()
                .find(|a| a.local_name() == "id" && a.name.contains(':'))
                .and_then(|a| rels.get(&a.value));
            match target {
                Some(target) if self.params.includes_slide(number) => {
                    included.insert(resolve_target(self.main, target));
                }
                Some(_) => debug!(slide = number, "slide not selected"),
                None => warn!(slide = number, "slide id without a relationship"),
            }
        }
        Ok(included)
    }

    /// Master text styles with the slide's layout on top
    fn slide_styles(&self, slide: &str) -> Result<StyleDefinitions> {
        match related(self.archive, slide, Relationships::TYPE_SLIDE_LAYOUT)?.first() {
            Some(layout) => self.layout_styles(layout),
            None => Ok(StyleDefinitions::Empty),
        }
    }

    fn layout_styles(&self, layout: &str) -> Result<StyleDefinitions> {
        let mut styles = match related(self.archive, layout, Relationships::TYPE_SLIDE_MASTER)?.first() {
            Some(master) => match self.archive.get(master) {
                Some(xml) => PresentationStyles::from_slide_master(xml).map_err(|e| e.in_part(master))?,
                None => PresentationStyles::default(),
            },
            None => PresentationStyles::default(),
        };
        if let Some(xml) = self.archive.get(layout) {
            styles.apply_layout(xml).map_err(|e| e.in_part(layout))?;
        }
        Ok(StyleDefinitions::Presentation(styles))
    }

    fn notes_styles(&self, notes: &str) -> Result<StyleDefinitions> {
        match related(self.archive, notes, Relationships::TYPE_NOTES_MASTER)?.first() {
            Some(master) => match self.archive.get(master) {
                Some(xml) => Ok(StyleDefinitions::Presentation(
                    PresentationStyles::from_notes_master(xml).map_err(|e| e.in_part(master))?,
                )),
                None => Ok(StyleDefinitions::Empty),
            },
            None => Ok(StyleDefinitions::Empty),
        }
    }
}
