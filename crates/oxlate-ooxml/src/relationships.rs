//! Relationships parsing for OOXML packages
//!
//! OOXML uses relationship files (`_rels/*.rels`) to link parts together:
//! the package root points at the main document, a slide points at its
//! layout, a layout at its master, a document at its styles. Targets are
//! relative to the folder of the source part.
//!
//! # Example
//!
//! ```ignore
//! use oxlate_ooxml::relationships::Relationships;
//!
//! let rels = Relationships::parse(xml_bytes)?;
//! let styles = rels.first_of_type(Relationships::TYPE_STYLES);
//! ```

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{OoxmlError, Result};

/// Common relationship type URIs
impl Relationships {
    /// Main document relationship type (package root)
    pub const TYPE_OFFICE_DOCUMENT: &'static str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
    /// Styles relationship type
    pub const TYPE_STYLES: &'static str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
    /// Worksheet relationship type
    pub const TYPE_WORKSHEET: &'static str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
    /// Shared strings relationship type
    pub const TYPE_SHARED_STRINGS: &'static str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";
    /// Slide relationship type
    pub const TYPE_SLIDE: &'static str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide";
    /// Slide layout relationship type
    pub const TYPE_SLIDE_LAYOUT: &'static str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout";
    /// Slide master relationship type
    pub const TYPE_SLIDE_MASTER: &'static str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster";
    /// Comments relationship type (worksheet comments)
    pub const TYPE_COMMENTS: &'static str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/comments";
    /// Notes master relationship type
    pub const TYPE_NOTES_MASTER: &'static str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/notesMaster";
    /// Drawing relationship type (worksheet drawings)
    pub const TYPE_DRAWING: &'static str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing";
    /// Chart relationship type
    pub const TYPE_CHART: &'static str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/chart";
    /// Hyperlink relationship type
    pub const TYPE_HYPERLINK: &'static str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";
}

/// Parsed relationships from a .rels file
///
/// Maintains document order for deterministic iteration.
#[derive(Debug, Clone, Default)]
pub struct Relationships {
    /// Ordered list of relationship IDs
    order: Vec<String>,
    /// Map of relationship ID to target (for fast lookups)
    map: HashMap<String, RelationshipTarget>,
}

/// A relationship target with its type and mode
#[derive(Debug, Clone)]
pub struct RelationshipTarget {
    /// The target URL or path
    pub target: String,
    /// The relationship type URI (e.g., styles, slideLayout)
    pub rel_type: String,
    /// Target mode: "External" for URLs, None for internal paths
    pub target_mode: Option<String>,
}

impl RelationshipTarget {
    /// Whether the target lives outside the package
    pub fn is_external(&self) -> bool {
        self.target_mode.as_deref() == Some("External")
    }
}

impl Relationships {
    /// Create an empty relationships map
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse relationships from XML bytes
    pub fn parse(xml: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);

        let mut rels = Relationships::default();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => {
                    if e.local_name().as_ref() == b"Relationship" {
                        let mut id = None;
                        let mut target = None;
                        let mut rel_type = None;
                        let mut target_mode = None;

                        for attr in e.attributes().filter_map(|a| a.ok()) {
                            let value = attr.unescape_value().ok().map(|s| s.to_string());
                            match attr.key.as_ref() {
                                b"Id" => id = value,
                                b"Target" => target = value,
                                b"Type" => rel_type = value,
                                b"TargetMode" => target_mode = value,
                                _ => {}
                            }
                        }

                        if let (Some(id), Some(target)) = (id, target) {
                            rels.order.push(id.clone());
                            rels.map.insert(
                                id,
                                RelationshipTarget {
                                    target,
                                    rel_type: rel_type.unwrap_or_default(),
                                    target_mode,
                                },
                            );
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(OoxmlError::Xml(e)),
                _ => {}
            }
            buf.clear();
        }

        Ok(rels)
    }

    /// Get the target for a relationship ID
    pub fn get(&self, id: &str) -> Option<&str> {
        self.map.get(id).map(|r| r.target.as_str())
    }

    /// Get the full relationship target for an ID
    pub fn get_target(&self, id: &str) -> Option<&RelationshipTarget> {
        self.map.get(id)
    }

    /// First internal target of a given type, in document order
    pub fn first_of_type(&self, rel_type: &str) -> Option<&str> {
        self.iter()
            .find(|(_, rel)| rel.rel_type == rel_type && !rel.is_external())
            .map(|(_, rel)| rel.target.as_str())
    }

    /// All internal targets of a given type, in document order
    pub fn of_type<'a>(&'a self, rel_type: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.iter()
            .filter(move |(_, rel)| rel.rel_type == rel_type && !rel.is_external())
            .map(|(_, rel)| rel.target.as_str())
    }

    /// Get the number of relationships
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if there are no relationships
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate over relationships in document order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RelationshipTarget)> {
        self.order
            .iter()
            .filter_map(|id| self.map.get(id).map(|rel| (id.as_str(), rel)))
    }
}

/// Path of the relationships part belonging to a part
///
/// `word/document.xml` maps to `word/_rels/document.xml.rels`; the package
/// itself (empty name) maps to `_rels/.rels`.
pub fn rels_path_for(part: &str) -> String {
    match part.rfind('/') {
        Some(pos) => format!("{}/_rels/{}.rels", &part[..pos], &part[pos + 1..]),
        None if part.is_empty() => "_rels/.rels".to_string(),
        None => format!("_rels/{}.rels", part),
    }
}

/// Resolve a relationship target against the part that owns the relationship
///
/// Handles absolute targets (`/xl/workbook.xml`), `./` and `../` segments.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return normalize(absolute);
    }
    let base = match source_part.rfind('/') {
        Some(pos) => &source_part[..pos],
        None => "",
    };
    if base.is_empty() {
        normalize(target)
    } else {
        normalize(&format!("{}/{}", base, target))
    }
}

fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_relationships() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
        <Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
            <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com" TargetMode="External"/>
            <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
        </Relationships>"#;

        let rels = Relationships::parse(xml).unwrap();

        assert_eq!(rels.get("rId1"), Some("https://example.com"));
        assert!(rels.get_target("rId1").unwrap().is_external());
        assert_eq!(rels.first_of_type(Relationships::TYPE_STYLES), Some("styles.xml"));
        assert_eq!(rels.len(), 2);
    }

    #[test]
    fn test_empty_relationships() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
        <Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
        </Relationships>"#;

        let rels = Relationships::parse(xml).unwrap();
        assert!(rels.get("rId1").is_none());
        assert!(rels.is_empty());
    }

    #[test]
    fn test_of_type_keeps_order() {
        let xml = br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
            <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/>
            <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
        </Relationships>"#;

        let rels = Relationships::parse(xml).unwrap();
        let sheets: Vec<_> = rels.of_type(Relationships::TYPE_WORKSHEET).collect();
        assert_eq!(sheets, vec!["worksheets/sheet2.xml", "worksheets/sheet1.xml"]);
    }

    #[test]
    fn test_rels_path_for() {
        assert_eq!(rels_path_for("word/document.xml"), "word/_rels/document.xml.rels");
        assert_eq!(
            rels_path_for("ppt/slides/slide1.xml"),
            "ppt/slides/_rels/slide1.xml.rels"
        );
        assert_eq!(rels_path_for(""), "_rels/.rels");
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(resolve_target("word/document.xml", "styles.xml"), "word/styles.xml");
        assert_eq!(
            resolve_target("ppt/slides/slide1.xml", "../slideLayouts/slideLayout2.xml"),
            "ppt/slideLayouts/slideLayout2.xml"
        );
        assert_eq!(resolve_target("", "word/document.xml"), "word/document.xml");
        assert_eq!(resolve_target("xl/workbook.xml", "/xl/sharedStrings.xml"), "xl/sharedStrings.xml");
        assert_eq!(resolve_target("xl/workbook.xml", "./worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
    }
}
