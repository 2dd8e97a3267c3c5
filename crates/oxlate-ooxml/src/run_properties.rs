//! Run properties (`w:rPr`, `a:rPr`, SpreadsheetML `rPr`)
//!
//! A [`RunProperties`] value is one level of a run's formatting: the direct
//! properties of a run, the run properties of one style, or the document
//! defaults. It keeps the markup it was read from, so untouched properties
//! re-emit verbatim, and compares structurally so that two runs formatted
//! the same way compare equal whatever the property order.

use crate::xml::{local_name, StartTag, XmlEvent};

/// Toggle properties: values XOR across style levels
const TOGGLES: &[&str] = &[
    "b", "bCs", "caps", "dstrike", "emboss", "i", "iCs", "imprint", "outline", "shadow", "smallCaps",
    "strike", "vanish",
];

/// A single run property
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunProperty {
    /// On/off property with toggle semantics (`w:b`, `w:vanish`, ...)
    Toggle {
        /// Local name
        name: String,
        /// Effective value
        on: bool,
        /// Source markup, including leading whitespace
        xml: String,
    },
    /// Character style reference (`w:rStyle`)
    Style {
        /// Referenced style id
        id: String,
        /// Source markup, including leading whitespace
        xml: String,
    },
    /// Attribute of the properties element itself (DrawingML `a:rPr`)
    Attribute {
        /// Qualified attribute name as written
        name: String,
        /// Attribute value
        value: String,
    },
    /// Any other property element, compared by attributes and content
    Element {
        /// Local name
        name: String,
        /// Normalized attributes and content
        value: String,
        /// Source markup, including leading whitespace
        xml: String,
    },
}

impl RunProperty {
    /// Name used to match the same property across levels
    ///
    /// Attribute properties are prefixed with `@`.
    pub fn name(&self) -> String {
        match self {
            RunProperty::Toggle { name, .. } | RunProperty::Element { name, .. } => name.clone(),
            RunProperty::Style { .. } => "rStyle".to_string(),
            RunProperty::Attribute { name, .. } => format!("@{}", local_name(name)),
        }
    }

    /// Comparison key: name plus normalized value
    pub fn key(&self) -> (String, String) {
        let value = match self {
            RunProperty::Toggle { on, .. } => on.to_string(),
            RunProperty::Style { id, .. } => id.clone(),
            RunProperty::Attribute { value, .. } | RunProperty::Element { value, .. } => {
                value.clone()
            }
        };
        (self.name(), value)
    }

    /// Source markup of element properties; empty for attributes
    pub fn xml(&self) -> &str {
        match self {
            RunProperty::Toggle { xml, .. }
            | RunProperty::Style { xml, .. }
            | RunProperty::Element { xml, .. } => xml,
            RunProperty::Attribute { .. } => "",
        }
    }

    /// Single attribute value of an element property (`w:val`)
    pub fn val(&self) -> Option<&str> {
        match self {
            RunProperty::Attribute { value, .. } => Some(value),
            RunProperty::Element { value, .. } => value
                .split('|')
                .next()
                .and_then(|attrs| attrs.split(';').find_map(|a| a.strip_prefix("val=")))
                .filter(|v| !v.is_empty()),
            RunProperty::Style { id, .. } => Some(id),
            RunProperty::Toggle { .. } => None,
        }
    }
}

/// Parse an ST_OnOff value (absent means on)
pub fn on_off(value: Option<&str>) -> bool {
    !matches!(value, Some("0") | Some("false") | Some("off"))
}

/// One level of run formatting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunProperties {
    /// Whitespace before the properties element
    lead: String,
    /// The properties element start tag; `None` when the run has none
    start: Option<StartTag>,
    properties: Vec<RunProperty>,
    /// Whitespace and end tag; empty for an empty-element tag
    close: String,
}

impl RunProperties {
    /// Properties with no markup
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from the events of a properties element (`start..=end`)
    ///
    /// `lead` is the whitespace preceding the element in the source.
    pub fn from_events(lead: String, events: &[XmlEvent]) -> Self {
        let Some(XmlEvent::Start(start)) = events.first() else {
            return Self::default();
        };

        let mut properties: Vec<RunProperty> = start
            .attributes()
            .iter()
            .filter(|a| !a.name.starts_with("xmlns"))
            .map(|a| RunProperty::Attribute {
                name: a.name.clone(),
                value: a.value.clone(),
            })
            .collect();

        let mut close = String::new();
        if !start.self_closing {
            let inner = &events[1..events.len().saturating_sub(1)];
            let mut pending = String::new();
            let mut i = 0;
            while i < inner.len() {
                match &inner[i] {
                    XmlEvent::Start(tag) => {
                        let end = crate::xml::element_end(inner, i);
                        let mut xml = std::mem::take(&mut pending);
                        for event in &inner[i..=end] {
                            event.write_to(&mut xml);
                        }
                        // Empty-element children end where they start
                        let children = if tag.self_closing {
                            &inner[0..0]
                        } else {
                            &inner[i + 1..end]
                        };
                        properties.push(property_from_element(tag, children, xml));
                        i = end + 1;
                    }
                    other => {
                        other.write_to(&mut pending);
                        i += 1;
                    }
                }
            }
            close = pending;
            if let Some(last) = events.last() {
                last.write_to(&mut close);
            }
        }

        Self {
            lead,
            start: Some(start.clone()),
            properties,
            close,
        }
    }

    /// Build from bare properties, with no markup (used by style levels)
    pub fn from_properties(properties: Vec<RunProperty>) -> Self {
        Self {
            properties,
            ..Self::default()
        }
    }

    /// Whether there is no properties element at all
    pub fn is_absent(&self) -> bool {
        self.start.is_none()
    }

    /// Whether there are no properties
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Properties in first-seen order
    pub fn properties(&self) -> &[RunProperty] {
        &self.properties
    }

    /// Find a property by name
    pub fn get(&self, name: &str) -> Option<&RunProperty> {
        self.properties.iter().find(|p| p.name() == name)
    }

    /// Value of a toggle property, if set
    pub fn toggle(&self, name: &str) -> Option<bool> {
        match self.get(name) {
            Some(RunProperty::Toggle { on, .. }) => Some(*on),
            _ => None,
        }
    }

    /// Referenced character style
    pub fn style_id(&self) -> Option<&str> {
        self.properties.iter().find_map(|p| match p {
            RunProperty::Style { id, .. } => Some(id.as_str()),
            _ => None,
        })
    }

    /// Language annotations (`w:lang`, `@lang`, `@altLang`) as comparison keys
    pub fn languages(&self) -> Vec<(String, String)> {
        self.properties
            .iter()
            .filter(|p| is_language(p))
            .map(RunProperty::key)
            .collect()
    }

    /// Sorted comparison keys of the properties not rejected by `ignore`
    pub fn comparison_keys<F>(&self, ignore: F) -> Vec<(String, String)>
    where
        F: Fn(&RunProperty) -> bool,
    {
        let mut keys: Vec<_> = self
            .properties
            .iter()
            .filter(|p| !matches!(p, RunProperty::Style { .. }) && !ignore(p))
            .map(RunProperty::key)
            .collect();
        keys.sort();
        keys
    }

    // ------------------------------------------------------------------------
    // Combination
    // ------------------------------------------------------------------------

    /// Same-named properties of `higher` replace ours, the rest are appended
    pub fn combine_distinct(&self, higher: &RunProperties) -> RunProperties {
        self.combine_with(higher, |_, high| high.clone())
    }

    /// Like [`combine_distinct`](Self::combine_distinct), but toggles XOR
    pub fn combine_vertical(&self, higher: &RunProperties) -> RunProperties {
        self.combine_with(higher, |low, high| match (low, high) {
            (
                RunProperty::Toggle { on: a, .. },
                RunProperty::Toggle {
                    name, on: b, xml, ..
                },
            ) => RunProperty::Toggle {
                name: name.clone(),
                on: a ^ b,
                xml: xml.clone(),
            },
            (_, high) => high.clone(),
        })
    }

    /// Re-apply document-default toggles: a toggle is on if either side is
    pub fn combine_default_toggles(&self, defaults: &RunProperties) -> RunProperties {
        self.combine_with(&defaults.toggles_only(), |ours, default| match (ours, default) {
            (RunProperty::Toggle { name, on: a, xml }, RunProperty::Toggle { on: b, .. }) => {
                RunProperty::Toggle {
                    name: name.clone(),
                    on: *a || *b,
                    xml: xml.clone(),
                }
            }
            (ours, _) => ours.clone(),
        })
    }

    fn combine_with<F>(&self, higher: &RunProperties, merge: F) -> RunProperties
    where
        F: Fn(&RunProperty, &RunProperty) -> RunProperty,
    {
        let mut properties: Vec<RunProperty> = self
            .properties
            .iter()
            .map(|low| match higher.get(&low.name()) {
                Some(high) => merge(low, high),
                None => low.clone(),
            })
            .collect();
        for high in &higher.properties {
            let name = high.name();
            if !properties.iter().any(|p| p.name() == name) {
                properties.push(high.clone());
            }
        }
        RunProperties::from_properties(properties)
    }

    /// Copy without toggle properties
    pub fn without_toggles(&self) -> RunProperties {
        self.filtered(|p| !matches!(p, RunProperty::Toggle { .. }))
    }

    /// Copy with only toggle properties
    pub fn toggles_only(&self) -> RunProperties {
        self.filtered(|p| matches!(p, RunProperty::Toggle { .. }))
    }

    /// Copy without the character style reference
    pub fn without_style(&self) -> RunProperties {
        self.filtered(|p| !matches!(p, RunProperty::Style { .. }))
    }

    fn filtered<F: Fn(&RunProperty) -> bool>(&self, keep: F) -> RunProperties {
        RunProperties::from_properties(self.properties.iter().filter(|p| keep(p)).cloned().collect())
    }

    // ------------------------------------------------------------------------
    // Editing and serialization
    // ------------------------------------------------------------------------

    /// Remove matching properties from the markup
    ///
    /// When the properties element ends up with neither children nor
    /// attributes, it is removed altogether. Returns whether anything changed.
    pub fn remove_where<F>(&mut self, remove: F) -> bool
    where
        F: Fn(&RunProperty) -> bool,
    {
        let before = self.properties.len();
        let mut removed_attrs = Vec::new();
        self.properties.retain(|p| {
            if !remove(p) {
                return true;
            }
            if let RunProperty::Attribute { name, .. } = p {
                removed_attrs.push(name.clone());
            }
            false
        });
        if before == self.properties.len() {
            return false;
        }
        if let Some(start) = self.start.as_mut() {
            for name in &removed_attrs {
                start.remove_attr(name);
            }
        }
        if self.properties.is_empty() && self.start.is_some() {
            let keeps_declarations = self
                .start
                .as_ref()
                .is_some_and(|s| !s.attributes().is_empty());
            if !keeps_declarations {
                self.start = None;
                self.lead.clear();
                self.close.clear();
            }
        }
        true
    }

    /// Serialize the properties element as read, minus removed properties
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    /// Append the properties element to a buffer
    pub fn write_to(&self, out: &mut String) {
        let Some(start) = &self.start else {
            return;
        };
        out.push_str(&self.lead);
        start.write_to(out);
        for property in &self.properties {
            out.push_str(property.xml());
        }
        out.push_str(&self.close);
    }
}

/// Whether a property is a language annotation
pub fn is_language(property: &RunProperty) -> bool {
    matches!(property.name().as_str(), "lang" | "@lang" | "@altLang")
}

fn property_from_element(tag: &StartTag, children: &[XmlEvent], xml: String) -> RunProperty {
    let local = tag.local_name();
    if local == "rStyle" {
        return RunProperty::Style {
            id: tag.attr_local("val").unwrap_or_default().to_string(),
            xml,
        };
    }
    if TOGGLES.contains(&local) {
        return RunProperty::Toggle {
            name: local.to_string(),
            on: on_off(tag.attr_local("val")),
            xml,
        };
    }

    let mut attrs: Vec<String> = tag
        .attributes()
        .iter()
        .map(|a| format!("{}={}", a.local_name(), a.value))
        .collect();
    attrs.sort();
    let mut value = attrs.join(";");
    value.push('|');
    for event in children {
        if !event.is_whitespace() {
            event.write_to(&mut value);
        }
    }
    RunProperty::Element {
        name: local.to_string(),
        value,
        xml,
    }
}
