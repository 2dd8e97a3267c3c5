//! Content type resolution (`[Content_Types].xml`)
//!
//! Every part of a package has a content type, given either by an
//! `Override` for its exact name or by a `Default` for its extension.

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{OoxmlError, Result};

/// Path of the content types part
pub const CONTENT_TYPES_PATH: &str = "[Content_Types].xml";

/// Content type URIs the pipeline dispatches on
pub mod types {
    pub const WORD_DOCUMENT: &str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";
    pub const WORD_TEMPLATE: &str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.template.main+xml";
    pub const WORD_MACRO_DOCUMENT: &str = "application/vnd.ms-word.document.macroEnabled.main+xml";
    pub const WORD_HEADER: &str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.header+xml";
    pub const WORD_FOOTER: &str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.footer+xml";
    pub const WORD_FOOTNOTES: &str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.footnotes+xml";
    pub const WORD_ENDNOTES: &str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.endnotes+xml";
    pub const WORD_COMMENTS: &str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.comments+xml";
    pub const WORD_STYLES: &str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml";

    pub const EXCEL_WORKBOOK: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";
    pub const EXCEL_MACRO_WORKBOOK: &str = "application/vnd.ms-excel.sheet.macroEnabled.main+xml";
    pub const EXCEL_TEMPLATE: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.template.main+xml";
    pub const EXCEL_WORKSHEET: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
    pub const EXCEL_SHARED_STRINGS: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml";
    pub const EXCEL_STYLES: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml";
    pub const EXCEL_COMMENTS: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.comments+xml";

    pub const PRESENTATION: &str =
        "application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml";
    pub const PRESENTATION_MACRO: &str =
        "application/vnd.ms-powerpoint.presentation.macroEnabled.main+xml";
    pub const PRESENTATION_SLIDESHOW: &str =
        "application/vnd.openxmlformats-officedocument.presentationml.slideshow.main+xml";
    pub const SLIDE: &str = "application/vnd.openxmlformats-officedocument.presentationml.slide+xml";
    pub const SLIDE_LAYOUT: &str =
        "application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml";
    pub const SLIDE_MASTER: &str =
        "application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml";
    pub const NOTES_SLIDE: &str =
        "application/vnd.openxmlformats-officedocument.presentationml.notesSlide+xml";
    pub const NOTES_MASTER: &str =
        "application/vnd.openxmlformats-officedocument.presentationml.notesMaster+xml";
    pub const PRESENTATION_COMMENTS: &str =
        "application/vnd.openxmlformats-officedocument.presentationml.comments+xml";

    pub const EXCEL_DRAWING: &str = "application/vnd.openxmlformats-officedocument.drawing+xml";
    pub const DRAWING_CHART: &str = "application/vnd.openxmlformats-officedocument.drawingml.chart+xml";
    pub const DRAWING_DIAGRAM_DATA: &str =
        "application/vnd.openxmlformats-officedocument.drawingml.diagramData+xml";
    pub const CORE_PROPERTIES: &str = "application/vnd.openxmlformats-package.core-properties+xml";
}

/// Parsed `[Content_Types].xml`
#[derive(Debug, Clone, Default)]
pub struct ContentTypes {
    /// Content type by lower-cased extension
    defaults: HashMap<String, String>,
    /// Content type by part name (without leading slash)
    overrides: HashMap<String, String>,
}

impl ContentTypes {
    /// Parse content types from XML bytes
    pub fn parse(xml: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);

        let mut content_types = ContentTypes::default();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => {
                    let mut key = None;
                    let mut content_type = None;
                    let local = e.local_name();
                    for attr in e.attributes().filter_map(|a| a.ok()) {
                        let value = attr.unescape_value().ok().map(|s| s.to_string());
                        match attr.key.as_ref() {
                            b"Extension" | b"PartName" => key = value,
                            b"ContentType" => content_type = value,
                            _ => {}
                        }
                    }
                    if let (Some(key), Some(content_type)) = (key, content_type) {
                        match local.as_ref() {
                            b"Default" => {
                                content_types
                                    .defaults
                                    .insert(key.to_ascii_lowercase(), content_type);
                            }
                            b"Override" => {
                                let name = key.trim_start_matches('/').to_string();
                                content_types.overrides.insert(name, content_type);
                            }
                            _ => {}
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(OoxmlError::Xml(e)),
                _ => {}
            }
            buf.clear();
        }

        Ok(content_types)
    }

    /// Content type of a part, override first, then extension default
    pub fn content_type(&self, part: &str) -> Option<&str> {
        let part = part.trim_start_matches('/');
        if let Some(ct) = self.overrides.get(part) {
            return Some(ct.as_str());
        }
        let extension = part.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())?;
        self.defaults.get(&extension).map(|s| s.as_str())
    }

    /// Part names overridden with a given content type, sorted by name
    pub fn parts_with_type(&self, content_type: &str) -> Vec<&str> {
        let mut parts: Vec<&str> = self
            .overrides
            .iter()
            .filter(|(_, ct)| ct.as_str() == content_type)
            .map(|(name, _)| name.as_str())
            .collect();
        parts.sort_unstable();
        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const XML: &[u8] = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="XML" ContentType="application/xml"/>
  <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
  <Override PartName="/word/header1.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.header+xml"/>
</Types>"#;

    #[test]
    fn test_override_wins() {
        let ct = ContentTypes::parse(XML).unwrap();
        assert_eq!(ct.content_type("word/document.xml"), Some(types::WORD_DOCUMENT));
        assert_eq!(ct.content_type("/word/header1.xml"), Some(types::WORD_HEADER));
    }

    #[test]
    fn test_default_by_extension() {
        let ct = ContentTypes::parse(XML).unwrap();
        assert_eq!(ct.content_type("word/settings.xml"), Some("application/xml"));
        assert_eq!(ct.content_type("media/image1.png"), None);
        assert_eq!(ct.content_type("noextension"), None);
    }

    #[test]
    fn test_parts_with_type() {
        let ct = ContentTypes::parse(XML).unwrap();
        assert_eq!(ct.parts_with_type(types::WORD_HEADER), vec!["word/header1.xml"]);
    }
}
