//! Style definitions and run-property resolution
//!
//! A run's effective formatting is built from several levels. For Word:
//! document defaults, then the paragraph style chain, then the character
//! style chain, then the run's direct properties. For PowerPoint: the
//! master's text styles per list level, then the matching layout
//! placeholder, then direct properties. Other parts only have direct
//! properties.
//!
//! Style chains follow `basedOn` links with an explicit visited set, so a
//! malformed cyclic chain stops instead of looping.

use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::run_properties::RunProperties;
use crate::xml::{element_end, read_events, StartTag, XmlEvent};

// ============================================================================
// Word styles
// ============================================================================

/// Collection of styles from `word/styles.xml`
#[derive(Debug, Clone, Default)]
pub struct StyleSheet {
    /// All styles, keyed by style ID
    styles: HashMap<String, Style>,
    /// Default paragraph style ID
    pub default_paragraph: Option<String>,
    /// Default character style ID
    pub default_character: Option<String>,
    /// Run properties from `w:docDefaults/w:rPrDefault`
    pub doc_defaults: RunProperties,
}

/// A Word style definition
#[derive(Debug, Clone)]
pub struct Style {
    /// Style ID (used in document references)
    pub id: String,
    /// Display name
    pub name: String,
    /// Style type
    pub style_type: StyleType,
    /// Base style ID (for inheritance)
    pub based_on: Option<String>,
    /// Linked paragraph/character style ID
    pub link: Option<String>,
    /// Run properties declared by this style level
    pub run_properties: RunProperties,
}

/// Type of style
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleType {
    /// Paragraph style
    Paragraph,
    /// Character (run) style
    Character,
    /// Table style
    Table,
    /// Numbering style
    Numbering,
}

impl StyleSheet {
    /// Parse styles from XML bytes
    pub fn parse(xml: &[u8]) -> Result<Self> {
        let events = read_events(xml)?;
        let mut stylesheet = StyleSheet::default();
        let mut current_style: Option<StyleBuilder> = None;
        let mut in_rpr_default = false;

        let mut i = 0;
        while i < events.len() {
            match &events[i] {
                XmlEvent::Start(e) => match e.local_name() {
                    "style" => {
                        let mut builder = StyleBuilder::default();
                        builder.style_type = Some(match get_attr(e, "type") {
                            Some("character") => StyleType::Character,
                            Some("table") => StyleType::Table,
                            Some("numbering") => StyleType::Numbering,
                            _ => StyleType::Paragraph,
                        });
                        builder.id = get_attr(e, "styleId").map(str::to_string);
                        builder.is_default = matches!(get_attr(e, "default"), Some("1" | "true" | "on"));
                        if e.self_closing {
                            stylesheet.add(builder);
                        } else {
                            current_style = Some(builder);
                        }
                    }
                    "rPrDefault" if !e.self_closing => in_rpr_default = true,
                    "rPr" if in_rpr_default || current_style.is_some() => {
                        let end = element_end(&events, i);
                        let properties = RunProperties::from_events(String::new(), &events[i..=end]);
                        match current_style.as_mut() {
                            Some(builder) => builder.run_properties = properties,
                            None => stylesheet.doc_defaults = properties,
                        }
                        i = end;
                    }
                    "pPr" | "tblPr" | "trPr" | "tcPr" | "tblStylePr" if current_style.is_some() => {
                        // Paragraph and table formatting does not reach runs.
                        i = element_end(&events, i);
                    }
                    "name" | "basedOn" | "link" => {
                        if let Some(builder) = current_style.as_mut() {
                            let val = get_attr(e, "val").map(str::to_string);
                            match e.local_name() {
                                "name" => builder.name = val,
                                "basedOn" => builder.based_on = val,
                                _ => builder.link = val,
                            }
                        }
                    }
                    _ => {}
                },
                XmlEvent::End(e) => match e.local_name() {
                    "style" => {
                        if let Some(builder) = current_style.take() {
                            stylesheet.add(builder);
                        }
                    }
                    "rPrDefault" => in_rpr_default = false,
                    _ => {}
                },
                _ => {}
            }
            i += 1;
        }

        Ok(stylesheet)
    }

    fn add(&mut self, builder: StyleBuilder) {
        let is_default = builder.is_default;
        if let Some(style) = builder.build() {
            if is_default {
                match style.style_type {
                    StyleType::Paragraph => self.default_paragraph = Some(style.id.clone()),
                    StyleType::Character => self.default_character = Some(style.id.clone()),
                    _ => {}
                }
            }
            self.styles.insert(style.id.clone(), style);
        }
    }

    /// Get a style by ID
    pub fn get(&self, id: &str) -> Option<&Style> {
        self.styles.get(id)
    }

    /// Number of styles
    pub fn len(&self) -> usize {
        self.styles.len()
    }

    /// Whether the sheet has no styles
    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    /// Resolve the inheritance chain for a style, leaf first
    ///
    /// The walk stops at the first style ID seen twice.
    pub fn resolve_chain(&self, style_id: &str) -> Vec<&Style> {
        let mut chain = Vec::new();
        let mut current = style_id;
        let mut seen = HashSet::new();

        while let Some(style) = self.get(current) {
            if !seen.insert(&style.id) {
                break; // Avoid infinite loops
            }
            chain.push(style);
            if let Some(ref base) = style.based_on {
                current = base;
            } else {
                break;
            }
        }

        chain
    }

    /// Chain of one style type, root first, falling back to the type's
    /// default style when the id is missing, unknown or of another type
    fn typed_chain(&self, style_id: Option<&str>, style_type: StyleType) -> Vec<&Style> {
        let default = match style_type {
            StyleType::Paragraph => self.default_paragraph.as_deref(),
            StyleType::Character => self.default_character.as_deref(),
            _ => None,
        };
        let id = style_id
            .filter(|id| self.get(id).is_some_and(|s| s.style_type == style_type))
            .or(default);
        let Some(id) = id else {
            return Vec::new();
        };

        let mut chain: Vec<&Style> = self
            .resolve_chain(id)
            .into_iter()
            .take_while(|s| s.style_type == style_type)
            .collect();
        chain.reverse();
        chain
    }

    /// Effective run properties of a run
    ///
    /// Document defaults (toggles set aside) are combined with the paragraph
    /// style chain and then the character style chain, toggles XOR-ing
    /// between levels; the default toggles are then OR-ed back in and direct
    /// properties replace whatever they name.
    pub fn combined_run_properties(
        &self,
        paragraph_style: Option<&str>,
        run_style: Option<&str>,
        direct: &RunProperties,
    ) -> RunProperties {
        let mut combined = self.doc_defaults.without_toggles();
        for style in self.typed_chain(paragraph_style, StyleType::Paragraph) {
            combined = combined.combine_vertical(&style.run_properties.without_style());
        }
        for style in self.typed_chain(run_style, StyleType::Character) {
            combined = combined.combine_vertical(&style.run_properties.without_style());
        }
        combined
            .combine_default_toggles(&self.doc_defaults)
            .combine_distinct(&direct.without_style())
    }
}

#[derive(Default)]
struct StyleBuilder {
    id: Option<String>,
    name: Option<String>,
    style_type: Option<StyleType>,
    based_on: Option<String>,
    link: Option<String>,
    run_properties: RunProperties,
    is_default: bool,
}

impl StyleBuilder {
    fn build(self) -> Option<Style> {
        let id = self.id?;
        Some(Style {
            id: id.clone(),
            name: self.name.unwrap_or(id),
            style_type: self.style_type.unwrap_or(StyleType::Paragraph),
            based_on: self.based_on,
            link: self.link,
            run_properties: self.run_properties,
        })
    }
}

fn get_attr<'a>(e: &'a StartTag, local: &str) -> Option<&'a str> {
    e.attr_local(local)
}

// ============================================================================
// PowerPoint text styles
// ============================================================================

/// Text style family a placeholder draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextStyleKind {
    /// Title and centered title placeholders
    Title,
    /// Body, subtitle and object placeholders, and notes
    Body,
    /// Everything else
    Other,
}

impl TextStyleKind {
    /// Kind of a placeholder type (`p:ph/@type`); `None` for non-placeholders
    pub fn from_placeholder(ph_type: Option<&str>, is_placeholder: bool) -> Self {
        if !is_placeholder {
            return TextStyleKind::Other;
        }
        match ph_type {
            Some("title") | Some("ctrTitle") => TextStyleKind::Title,
            Some("body") | Some("subTitle") | Some("obj") | None => TextStyleKind::Body,
            Some(_) => TextStyleKind::Other,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            TextStyleKind::Title => "title",
            TextStyleKind::Body => "body",
            TextStyleKind::Other => "other",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "title" => Some(TextStyleKind::Title),
            "body" => Some(TextStyleKind::Body),
            "other" => Some(TextStyleKind::Other),
            _ => None,
        }
    }
}

/// Paragraph style key used for presentation paragraphs (`body:1`)
pub fn presentation_style_key(kind: TextStyleKind, level: u8) -> String {
    format!("{}:{}", kind.as_str(), level)
}

/// Master and layout text styles of one slide, notes page or master
#[derive(Debug, Clone, Default)]
pub struct PresentationStyles {
    /// Run defaults by style family and 1-based list level
    levels: HashMap<(TextStyleKind, u8), RunProperties>,
}

impl PresentationStyles {
    /// Read `p:txStyles` from a slide master
    pub fn from_slide_master(xml: &[u8]) -> Result<Self> {
        let events = read_events(xml)?;
        let mut styles = Self::default();
        for (i, event) in events.iter().enumerate() {
            let Some(tag) = event.as_start() else {
                continue;
            };
            let kind = match tag.local_name() {
                "titleStyle" => TextStyleKind::Title,
                "bodyStyle" => TextStyleKind::Body,
                "otherStyle" => TextStyleKind::Other,
                _ => continue,
            };
            styles.read_level_list(&events, i, kind);
        }
        Ok(styles)
    }

    /// Read `p:notesStyle` from a notes master
    pub fn from_notes_master(xml: &[u8]) -> Result<Self> {
        let events = read_events(xml)?;
        let mut styles = Self::default();
        if let Some(i) = events
            .iter()
            .position(|e| e.as_start().is_some_and(|t| t.local_name() == "notesStyle"))
        {
            styles.read_level_list(&events, i, TextStyleKind::Body);
        }
        Ok(styles)
    }

    /// Layer the placeholder list styles of a slide layout on top
    pub fn apply_layout(&mut self, xml: &[u8]) -> Result<()> {
        let events = read_events(xml)?;
        let mut kind = None;
        for (i, event) in events.iter().enumerate() {
            let Some(tag) = event.as_start() else {
                continue;
            };
            match tag.local_name() {
                "sp" => kind = Some(TextStyleKind::Other),
                "ph" => kind = Some(TextStyleKind::from_placeholder(tag.attr("type"), true)),
                "lstStyle" => {
                    if let Some(kind) = kind {
                        let mut layer = Self::default();
                        layer.read_level_list(&events, i, kind);
                        for (key, props) in layer.levels {
                            let merged = match self.levels.get(&key) {
                                Some(base) => base.combine_distinct(&props),
                                None => props,
                            };
                            self.levels.insert(key, merged);
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn read_level_list(&mut self, events: &[XmlEvent], start: usize, kind: TextStyleKind) {
        let end = element_end(events, start);
        let mut level = None;
        let mut i = start + 1;
        while i < end {
            if let XmlEvent::Start(tag) = &events[i] {
                let local = tag.local_name();
                if let Some(n) = local
                    .strip_prefix("lvl")
                    .and_then(|s| s.strip_suffix("pPr"))
                    .and_then(|s| s.parse::<u8>().ok())
                {
                    level = Some(n);
                } else if local == "defRPr" {
                    let def_end = element_end(events, i);
                    if let Some(n) = level {
                        let props = RunProperties::from_events(String::new(), &events[i..=def_end]);
                        self.levels.insert((kind, n), props.without_style());
                    }
                    i = def_end;
                }
            }
            i += 1;
        }
    }

    /// Run defaults for a paragraph style key
    fn defaults_for(&self, paragraph_style: Option<&str>) -> Option<&RunProperties> {
        let (kind, level) = paragraph_style?.split_once(':')?;
        let kind = TextStyleKind::parse(kind)?;
        let level: u8 = level.parse().ok()?;
        self.levels.get(&(kind, level))
    }

    /// Effective run properties: level defaults, then direct properties
    pub fn combined_run_properties(
        &self,
        paragraph_style: Option<&str>,
        direct: &RunProperties,
    ) -> RunProperties {
        match self.defaults_for(paragraph_style) {
            Some(defaults) => defaults.combine_distinct(&direct.without_style()),
            None => RunProperties::empty().combine_distinct(&direct.without_style()),
        }
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Style lookup for one document part
#[derive(Debug, Clone, Default)]
pub enum StyleDefinitions {
    /// Word `styles.xml`
    Word(StyleSheet),
    /// PowerPoint master/layout text styles
    Presentation(PresentationStyles),
    /// No styles: only direct properties count
    #[default]
    Empty,
}

impl StyleDefinitions {
    /// Effective run properties of a run, lowest to highest precedence:
    /// defaults, paragraph style, run style, direct properties
    pub fn combined_run_properties(
        &self,
        paragraph_style: Option<&str>,
        run_style: Option<&str>,
        direct: &RunProperties,
    ) -> RunProperties {
        match self {
            StyleDefinitions::Word(sheet) => {
                sheet.combined_run_properties(paragraph_style, run_style, direct)
            }
            StyleDefinitions::Presentation(styles) => {
                styles.combined_run_properties(paragraph_style, direct)
            }
            StyleDefinitions::Empty => {
                RunProperties::empty().combine_distinct(&direct.without_style())
            }
        }
    }
}
