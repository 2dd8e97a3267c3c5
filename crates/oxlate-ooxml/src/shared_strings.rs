//! Shared string table codec
//!
//! Worksheets refer to strings by index into `xl/sharedStrings.xml`. The
//! same string can be visible in one cell and excluded in another, so the
//! table is rebuilt: every `(original index, excluded)` pair met while
//! scanning worksheets gets its own entry, numbered in order of first use.
//! Worksheet cells are rewritten to the new numbers and the table is written
//! back in the new order, with strings nothing refers to appended at the end.

use std::collections::{HashMap, HashSet};

use crate::error::{OoxmlError, Result};
use crate::xml::{element_end, read_events, Namespaces, StartTag, XmlEvent};

/// One entry of the rebuilt table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedStringEntry {
    /// Index in the source table
    pub original_index: usize,
    /// Index in the rebuilt table
    pub new_index: usize,
    /// Whether the string is kept out of extraction
    pub excluded: bool,
}

/// Mapping from source string indices to rebuilt ones
#[derive(Debug, Clone, Default)]
pub struct SharedStringMap {
    entries: Vec<SharedStringEntry>,
    by_key: HashMap<(usize, bool), usize>,
}

impl SharedStringMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// New index for a cell's string, creating an entry on first use
    pub fn create_entry_for_string(&mut self, original_index: usize, excluded: bool) -> usize {
        if let Some(&new_index) = self.by_key.get(&(original_index, excluded)) {
            return new_index;
        }
        let new_index = self.entries.len();
        self.entries.push(SharedStringEntry {
            original_index,
            new_index,
            excluded,
        });
        self.by_key.insert((original_index, excluded), new_index);
        new_index
    }

    /// Entries ordered by new index
    pub fn entries(&self) -> &[SharedStringEntry] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no cell referred to a shared string
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Table part
// ============================================================================

/// `xl/sharedStrings.xml` split into its string items
#[derive(Debug, Clone)]
pub struct SharedStringTable {
    /// Events up to the `sst` start tag
    prolog: Vec<XmlEvent>,
    /// The `sst` start tag
    root: StartTag,
    /// Whitespace in front of each item slot
    leads: Vec<String>,
    /// Events of each `si`, start to end
    items: Vec<Vec<XmlEvent>>,
    /// Everything after the last item
    trailer: Vec<XmlEvent>,
}

/// An item placed in the rebuilt table
#[derive(Debug, Clone, Copy)]
pub struct PlacedItem<'a> {
    /// Whitespace of the slot the item lands in
    pub lead: &'a str,
    /// Events of the `si` element
    pub events: &'a [XmlEvent],
    /// Whether the item is extracted
    pub extract: bool,
}

impl SharedStringTable {
    /// Split a shared string table part
    pub fn parse(xml: &[u8]) -> Result<Self> {
        let events = read_events(xml)?;
        let root_at = events
            .iter()
            .position(|e| matches!(e, XmlEvent::Start(_)))
            .ok_or_else(|| OoxmlError::InvalidStructure("shared string table has no root".into()))?;
        let root = match &events[root_at] {
            XmlEvent::Start(tag) => tag.clone(),
            _ => return Err(OoxmlError::InvalidStructure("shared string table has no root".into())),
        };
        let prolog = events[..root_at].to_vec();
        if root.self_closing {
            return Ok(Self {
                prolog,
                root,
                leads: Vec::new(),
                items: Vec::new(),
                trailer: events[root_at + 1..].to_vec(),
            });
        }

        let root_end = element_end(&events, root_at);
        let mut leads = Vec::new();
        let mut items = Vec::new();
        let mut pending = String::new();
        let mut i = root_at + 1;
        while i < root_end {
            match &events[i] {
                XmlEvent::Start(tag) if tag.local_name() == "si" => {
                    let end = element_end(&events, i);
                    leads.push(std::mem::take(&mut pending));
                    items.push(events[i..=end].to_vec());
                    i = end + 1;
                    continue;
                }
                event if event.is_whitespace() => event.write_to(&mut pending),
                _ => break,
            }
            i += 1;
        }

        // Anything unexpected ends the item list; keep it verbatim
        let mut trailer = Vec::new();
        if !pending.is_empty() {
            trailer.push(XmlEvent::Other(pending));
        }
        trailer.extend(events[i..].iter().cloned());
        Ok(Self {
            prolog,
            root,
            leads,
            items,
            trailer,
        })
    }

    /// Number of string items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the table holds no strings
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in rebuilt order: mapped entries first, then unreferenced items
    pub fn reordered(&self, map: &SharedStringMap) -> Result<Vec<PlacedItem<'_>>> {
        let mut placed = Vec::with_capacity(map.len().max(self.items.len()));
        let mut used = HashSet::new();
        for entry in map.entries() {
            let events = self.items.get(entry.original_index).ok_or_else(|| {
                OoxmlError::InvalidStructure(format!(
                    "cell refers to shared string {} of {}",
                    entry.original_index,
                    self.items.len()
                ))
            })?;
            used.insert(entry.original_index);
            placed.push(PlacedItem {
                lead: "",
                events,
                extract: !entry.excluded,
            });
        }
        for (index, events) in self.items.iter().enumerate() {
            if !used.contains(&index) {
                placed.push(PlacedItem {
                    lead: "",
                    events,
                    extract: false,
                });
            }
        }

        let last_lead = self.leads.last().map(String::as_str).unwrap_or("");
        for (slot, item) in placed.iter_mut().enumerate() {
            item.lead = self.leads.get(slot).map(String::as_str).unwrap_or(last_lead);
        }
        Ok(placed)
    }

    /// Namespace declarations of the table root
    pub fn namespaces(&self) -> Namespaces {
        Namespaces::collect(&[XmlEvent::Start(self.root.clone())])
    }

    /// Markup in front of the first item, with `uniqueCount` set to `count`
    pub fn header(&self, count: usize) -> String {
        let mut out = String::new();
        for event in &self.prolog {
            event.write_to(&mut out);
        }
        let mut root = self.root.clone();
        if root.attr("uniqueCount").is_some() {
            root.set_attr("uniqueCount", &count.to_string());
        }
        root.write_to(&mut out);
        out
    }

    /// Markup after the last item
    pub fn trailer(&self) -> String {
        let mut out = String::new();
        for event in &self.trailer {
            event.write_to(&mut out);
        }
        out
    }
}
