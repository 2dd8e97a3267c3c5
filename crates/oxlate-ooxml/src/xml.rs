//! XML event model with verbatim re-emission
//!
//! Parts are read once into a flat list of [`XmlEvent`]s. Every event keeps
//! the exact text it was read from: start tags keep attribute order, quoting
//! and inner whitespace, text keeps its entity references, and declarations,
//! comments and processing instructions are stored as-is. Writing the events
//! back out reproduces the input byte for byte.
//!
//! Element names are classified through [`Namespaces`], which maps the
//! prefixes declared in the part to the OOXML vocabularies the engine knows.

use std::collections::HashMap;

use quick_xml::escape::{escape, unescape};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{OoxmlError, Result};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

// ============================================================================
// Tags and events
// ============================================================================

/// An attribute together with the exact text it was read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Qualified name (`w:val`)
    pub name: String,
    /// Unescaped value
    pub value: String,
    /// Source text including the leading whitespace (` w:val="x"`)
    raw: String,
}

impl Attribute {
    /// Create an attribute rendered with double quotes
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        let raw = format!(" {}=\"{}\"", name, escape(value.as_str()));
        Self { name, value, raw }
    }

    /// Local part of the name
    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }
}

/// A start or empty-element tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTag {
    /// Qualified element name
    pub name: String,
    attributes: Vec<Attribute>,
    /// Whitespace between the last attribute and the closing bracket
    tail: String,
    /// Whether the tag was written `<x/>`
    pub self_closing: bool,
}

impl StartTag {
    /// Create a tag with no attributes
    pub fn new(name: impl Into<String>, self_closing: bool) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            tail: String::new(),
            self_closing,
        }
    }

    /// Parse the content between `<` and `>` (without the trailing `/`)
    pub fn parse(content: &str, self_closing: bool) -> Result<Self> {
        let name_end = content
            .find(|c: char| c.is_ascii_whitespace())
            .unwrap_or(content.len());
        let name = content[..name_end].to_string();
        if name.is_empty() {
            return Err(OoxmlError::malformed("", 0, "empty element name"));
        }

        let mut attributes = Vec::new();
        let mut rest = &content[name_end..];
        loop {
            let trimmed = rest.trim_start_matches(|c: char| c.is_ascii_whitespace());
            if trimmed.is_empty() {
                break;
            }
            let eq = trimmed
                .find('=')
                .ok_or_else(|| malformed_attr(&name, trimmed))?;
            let attr_name = trimmed[..eq].trim_end();
            let after_eq = trimmed[eq + 1..].trim_start_matches(|c: char| c.is_ascii_whitespace());
            let quote = after_eq
                .chars()
                .next()
                .filter(|c| *c == '"' || *c == '\'')
                .ok_or_else(|| malformed_attr(&name, trimmed))?;
            let value_end = after_eq[1..]
                .find(quote)
                .ok_or_else(|| malformed_attr(&name, trimmed))?;
            let raw_value = &after_eq[1..1 + value_end];
            let value = unescape(raw_value)
                .map_err(|e| OoxmlError::malformed("", 0, e))?
                .into_owned();

            let consumed = rest.len() - after_eq.len() + value_end + 2;
            attributes.push(Attribute {
                name: attr_name.to_string(),
                value,
                raw: rest[..consumed].to_string(),
            });
            rest = &rest[consumed..];
        }

        Ok(Self {
            name,
            attributes,
            tail: rest.to_string(),
            self_closing,
        })
    }

    /// Local part of the element name
    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    /// All attributes in source order
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Value of an attribute by qualified name
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Value of the first attribute with the given local name, any prefix
    pub fn attr_local(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.local_name() == local && !a.name.starts_with("xmlns"))
            .map(|a| a.value.as_str())
    }

    /// Split the tag's markup around the raw value of an attribute
    ///
    /// Returns the markup up to and including the opening quote, the value
    /// as written, and the markup from the closing quote on.
    pub fn split_at_attr(&self, local: &str) -> Option<(String, String, String)> {
        let index = self
            .attributes
            .iter()
            .position(|a| a.local_name() == local && !a.name.starts_with("xmlns"))?;
        let raw = &self.attributes[index].raw;
        let open = raw.find(|c: char| c == '"' || c == '\'')?;

        let mut before = format!("<{}", self.name);
        for attr in &self.attributes[..index] {
            before.push_str(&attr.raw);
        }
        before.push_str(&raw[..=open]);

        let mut after = raw[raw.len() - 1..].to_string();
        for attr in &self.attributes[index + 1..] {
            after.push_str(&attr.raw);
        }
        after.push_str(&self.tail);
        if self.self_closing {
            after.push('/');
        }
        after.push('>');
        Some((before, raw[open + 1..raw.len() - 1].to_string(), after))
    }

    /// Remove an attribute; returns whether it was present
    pub fn remove_attr(&mut self, name: &str) -> bool {
        let before = self.attributes.len();
        self.attributes.retain(|a| a.name != name);
        before != self.attributes.len()
    }

    /// Append an attribute after the existing ones
    pub fn push_attr(&mut self, name: &str, value: &str) {
        self.attributes.push(Attribute::new(name, value));
    }

    /// Set an attribute, replacing its value in place when present
    pub fn set_attr(&mut self, name: &str, value: &str) {
        match self.attributes.iter().position(|a| a.name == name) {
            Some(i) => {
                let quote = if self.attributes[i].raw.ends_with('\'') { '\'' } else { '"' };
                let lead_len = self.attributes[i].raw.len()
                    - self.attributes[i].raw.trim_start().len();
                let lead = self.attributes[i].raw[..lead_len].to_string();
                self.attributes[i] = Attribute {
                    name: name.to_string(),
                    value: value.to_string(),
                    raw: format!("{lead}{name}={quote}{}{quote}", escape(value)),
                };
            }
            None => self.push_attr(name, value),
        }
    }

    /// Serialize the tag exactly as read
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    /// Append the tag to a buffer
    pub fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for attr in &self.attributes {
            out.push_str(&attr.raw);
        }
        out.push_str(&self.tail);
        if self.self_closing {
            out.push('/');
        }
        out.push('>');
    }

    /// The matching end tag
    pub fn end_tag(&self) -> String {
        format!("</{}>", self.name)
    }
}

fn malformed_attr(element: &str, at: &str) -> OoxmlError {
    let snippet: String = at.chars().take(24).collect();
    OoxmlError::malformed("", 0, format!("bad attribute in <{element}> near '{snippet}'"))
}

/// An end tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndTag {
    /// Qualified element name
    pub name: String,
    raw: String,
}

impl EndTag {
    /// Create from the content between `</` and `>`
    pub fn new(content: &str) -> Self {
        Self {
            name: content.trim_end().to_string(),
            raw: format!("</{content}>"),
        }
    }

    /// Local part of the element name
    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    /// Serialize exactly as read
    pub fn to_xml(&self) -> &str {
        &self.raw
    }
}

/// Character data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEvent {
    /// Source text (escaped, or the whole CDATA section)
    pub raw: String,
    /// Decoded text
    pub text: String,
    /// Whether the text came from a CDATA section
    pub cdata: bool,
}

/// One XML event with its source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    /// Start tag, including empty-element tags
    Start(StartTag),
    /// End tag
    End(EndTag),
    /// Character data or CDATA
    Text(TextEvent),
    /// Declaration, comment, processing instruction, doctype or BOM
    Other(String),
}

impl XmlEvent {
    /// Append the event's source text to a buffer
    pub fn write_to(&self, out: &mut String) {
        match self {
            XmlEvent::Start(tag) => tag.write_to(out),
            XmlEvent::End(tag) => out.push_str(tag.to_xml()),
            XmlEvent::Text(text) => out.push_str(&text.raw),
            XmlEvent::Other(raw) => out.push_str(raw),
        }
    }

    /// The event's source text
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    /// Whether this is character data made only of whitespace
    pub fn is_whitespace(&self) -> bool {
        matches!(self, XmlEvent::Text(t) if !t.cdata && t.text.chars().all(char::is_whitespace))
    }

    /// The start tag, if this is one
    pub fn as_start(&self) -> Option<&StartTag> {
        match self {
            XmlEvent::Start(tag) => Some(tag),
            _ => None,
        }
    }
}

/// Serialize a slice of events
pub fn events_to_xml(events: &[XmlEvent]) -> String {
    let mut out = String::new();
    for event in events {
        event.write_to(&mut out);
    }
    out
}

// ============================================================================
// Reading
// ============================================================================

/// Read a whole part into events
///
/// Errors are reported as [`OoxmlError::MalformedPart`] with an empty part
/// name; callers attach the name with [`OoxmlError::in_part`].
pub fn read_events(xml: &[u8]) -> Result<Vec<XmlEvent>> {
    let mut events = Vec::new();
    let body = match xml.strip_prefix(UTF8_BOM) {
        Some(rest) => {
            events.push(XmlEvent::Other("\u{feff}".to_string()));
            rest
        }
        None => xml,
    };
    std::str::from_utf8(body)
        .map_err(|e| OoxmlError::malformed("", e.valid_up_to() as u64, e))?;

    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(false);

    let mut depth = 0usize;
    let mut buf = Vec::new();
    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| OoxmlError::malformed("", reader.error_position() as u64, e))?;
        let position = reader.buffer_position() as u64;
        let at = |e: OoxmlError| match e {
            OoxmlError::MalformedPart { part, message, .. } => OoxmlError::MalformedPart {
                part,
                position,
                message,
            },
            other => other,
        };

        match event {
            Event::Start(e) => {
                depth += 1;
                let tag = StartTag::parse(utf8(&e)?, false).map_err(at)?;
                events.push(XmlEvent::Start(tag));
            }
            Event::Empty(e) => {
                let tag = StartTag::parse(utf8(&e)?, true).map_err(at)?;
                events.push(XmlEvent::Start(tag));
            }
            Event::End(e) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| OoxmlError::malformed("", position, "unexpected end tag"))?;
                events.push(XmlEvent::End(EndTag::new(utf8(&e)?)));
            }
            Event::Text(e) => {
                let raw = utf8(&e)?.to_string();
                let text = e
                    .unescape()
                    .map_err(|err| OoxmlError::malformed("", position, err))?
                    .into_owned();
                events.push(XmlEvent::Text(TextEvent {
                    raw,
                    text,
                    cdata: false,
                }));
            }
            Event::CData(e) => {
                let text = utf8(&e)?.to_string();
                events.push(XmlEvent::Text(TextEvent {
                    raw: format!("<![CDATA[{text}]]>"),
                    text,
                    cdata: true,
                }));
            }
            Event::Decl(e) => events.push(XmlEvent::Other(format!("<?{}?>", utf8(&e)?))),
            Event::PI(e) => events.push(XmlEvent::Other(format!("<?{}?>", utf8(&e)?))),
            Event::Comment(e) => events.push(XmlEvent::Other(format!("<!--{}-->", utf8(&e)?))),
            Event::DocType(e) => {
                events.push(XmlEvent::Other(format!("<!DOCTYPE {}>", utf8(&e)?)))
            }
            Event::Eof => break,
        }
        buf.clear();
    }

    if depth != 0 {
        return Err(OoxmlError::malformed(
            "",
            body.len() as u64,
            "unexpected end of document: unclosed element",
        ));
    }
    Ok(events)
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| OoxmlError::malformed("", 0, e))
}

/// Index of the end event matching the start event at `start`
///
/// Returns `start` itself for empty-element tags. Events must come from
/// [`read_events`], which guarantees balance.
pub fn element_end(events: &[XmlEvent], start: usize) -> usize {
    if let Some(XmlEvent::Start(tag)) = events.get(start) {
        if tag.self_closing {
            return start;
        }
    }
    let mut depth = 0usize;
    for (i, event) in events.iter().enumerate().skip(start) {
        match event {
            XmlEvent::Start(tag) if !tag.self_closing => depth += 1,
            XmlEvent::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return i;
                }
            }
            _ => {}
        }
    }
    events.len().saturating_sub(1)
}

/// Decoded text content of the element starting at `start`
pub fn element_text(events: &[XmlEvent], start: usize) -> String {
    let end = element_end(events, start);
    events[start..=end]
        .iter()
        .filter_map(|e| match e {
            XmlEvent::Text(t) => Some(t.text.as_str()),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Names and namespaces
// ============================================================================

/// Local part of a qualified name
pub fn local_name(qname: &str) -> &str {
    qname.rsplit_once(':').map(|(_, l)| l).unwrap_or(qname)
}

/// Prefix of a qualified name, empty when unprefixed
pub fn prefix(qname: &str) -> &str {
    qname.split_once(':').map(|(p, _)| p).unwrap_or("")
}

/// OOXML vocabularies the engine distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ns {
    /// WordprocessingML (`w:`)
    Word,
    /// DrawingML main (`a:`)
    Drawing,
    /// Office Math (`m:`)
    Math,
    /// SpreadsheetML
    Spreadsheet,
    /// PresentationML (`p:`)
    Presentation,
    /// Markup compatibility (`mc:`)
    MarkupCompat,
    /// VML (`v:`)
    Vml,
    /// Word drawing placement (`wp:`)
    WordDrawing,
    /// The reserved `xml:` prefix
    Xml,
    /// Anything else
    Other,
}

impl Ns {
    /// Classify a namespace URI
    pub fn from_uri(uri: &str) -> Ns {
        match uri {
            "http://schemas.openxmlformats.org/wordprocessingml/2006/main"
            | "http://purl.oclc.org/ooxml/wordprocessingml/main" => Ns::Word,
            "http://schemas.openxmlformats.org/drawingml/2006/main"
            | "http://purl.oclc.org/ooxml/drawingml/main" => Ns::Drawing,
            "http://schemas.openxmlformats.org/officeDocument/2006/math"
            | "http://purl.oclc.org/ooxml/officeDocument/math" => Ns::Math,
            "http://schemas.openxmlformats.org/spreadsheetml/2006/main"
            | "http://purl.oclc.org/ooxml/spreadsheetml/main" => Ns::Spreadsheet,
            "http://schemas.openxmlformats.org/presentationml/2006/main"
            | "http://purl.oclc.org/ooxml/presentationml/main" => Ns::Presentation,
            "http://schemas.openxmlformats.org/markup-compatibility/2006" => Ns::MarkupCompat,
            "urn:schemas-microsoft-com:vml" => Ns::Vml,
            "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing"
            | "http://purl.oclc.org/ooxml/drawingml/wordprocessingDrawing" => Ns::WordDrawing,
            "http://www.w3.org/XML/1998/namespace" => Ns::Xml,
            _ => Ns::Other,
        }
    }

    /// Conventional vocabulary of a prefix, used when a part omits a declaration
    fn from_conventional_prefix(prefix: &str) -> Ns {
        match prefix {
            "w" => Ns::Word,
            "a" => Ns::Drawing,
            "m" => Ns::Math,
            "p" => Ns::Presentation,
            "mc" => Ns::MarkupCompat,
            "v" => Ns::Vml,
            "wp" => Ns::WordDrawing,
            "xml" => Ns::Xml,
            _ => Ns::Other,
        }
    }
}

/// Prefix-to-vocabulary table of one part
///
/// OOXML producers declare all prefixes on the root element; the first
/// declaration of each prefix wins.
#[derive(Debug, Clone, Default)]
pub struct Namespaces {
    prefixes: HashMap<String, Ns>,
}

impl Namespaces {
    /// Collect declarations from every start tag
    pub fn collect(events: &[XmlEvent]) -> Self {
        let mut prefixes = HashMap::new();
        for tag in events.iter().filter_map(XmlEvent::as_start) {
            for attr in tag.attributes() {
                let declared = if attr.name == "xmlns" {
                    Some("")
                } else {
                    attr.name.strip_prefix("xmlns:")
                };
                if let Some(p) = declared {
                    prefixes
                        .entry(p.to_string())
                        .or_insert_with(|| Ns::from_uri(&attr.value));
                }
            }
        }
        Self { prefixes }
    }

    /// Vocabulary of a qualified name
    pub fn of(&self, qname: &str) -> Ns {
        let p = prefix(qname);
        if p == "xml" {
            return Ns::Xml;
        }
        match self.prefixes.get(p) {
            Some(ns) => *ns,
            None => Ns::from_conventional_prefix(p),
        }
    }

    /// Whether a qualified name is `local` in vocabulary `ns`
    pub fn is(&self, qname: &str, ns: Ns, local: &str) -> bool {
        local_name(qname) == local && self.of(qname) == ns
    }
}
