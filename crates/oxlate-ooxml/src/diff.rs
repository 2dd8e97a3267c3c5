//! Package comparison
//!
//! Compares two packages part by part. XML parts (`.xml`, `.rels`, `.vml`)
//! are compared as event streams, so quoting, attribute order and the
//! spelling of empty elements do not count as differences; XML declarations
//! only compare their version. Everything else is compared byte for byte.

use std::collections::BTreeSet;
use std::fmt;

use crate::archive::OoxmlArchive;
use crate::error::Result;
use crate::xml::{read_events, XmlEvent};

/// One difference between two packages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartDifference {
    /// Part present only in the expected package
    Missing(String),
    /// Part present only in the actual package
    Extra(String),
    /// XML part whose events differ
    XmlMismatch { part: String, detail: String },
    /// Binary part whose bytes differ
    BytesMismatch(String),
}

impl fmt::Display for PartDifference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartDifference::Missing(part) => write!(f, "missing part: {part}"),
            PartDifference::Extra(part) => write!(f, "extra part: {part}"),
            PartDifference::XmlMismatch { part, detail } => write!(f, "{part}: {detail}"),
            PartDifference::BytesMismatch(part) => write!(f, "{part}: contents differ"),
        }
    }
}

/// Part-level package comparison
pub struct PackageDiff;

impl PackageDiff {
    /// Compare two packages; an empty list means they are equivalent
    pub fn compare(expected: &[u8], actual: &[u8]) -> Result<Vec<PartDifference>> {
        let expected = OoxmlArchive::from_bytes(expected)?;
        let actual = OoxmlArchive::from_bytes(actual)?;
        Self::compare_archives(&expected, &actual)
    }

    /// Compare two opened packages
    pub fn compare_archives(
        expected: &OoxmlArchive,
        actual: &OoxmlArchive,
    ) -> Result<Vec<PartDifference>> {
        let files = |archive: &OoxmlArchive| -> BTreeSet<String> {
            archive
                .entries()
                .iter()
                .filter(|e| !e.is_dir())
                .map(|e| e.name.clone())
                .collect()
        };
        let expected_files = files(expected);
        let actual_files = files(actual);

        let mut differences = Vec::new();
        for name in &expected_files {
            let (Some(left), Some(right)) = (expected.get(name), actual.get(name)) else {
                differences.push(PartDifference::Missing(name.clone()));
                continue;
            };
            if left == right {
                continue;
            }
            if is_xml_part(name) {
                if let Some(detail) = compare_xml(left, right).map_err(|e| e.in_part(name))? {
                    differences.push(PartDifference::XmlMismatch {
                        part: name.clone(),
                        detail,
                    });
                }
            } else {
                differences.push(PartDifference::BytesMismatch(name.clone()));
            }
        }
        for name in &actual_files {
            if !expected_files.contains(name) {
                differences.push(PartDifference::Extra(name.clone()));
            }
        }
        Ok(differences)
    }
}

fn is_xml_part(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".xml") || lower.ends_with(".rels") || lower.ends_with(".vml")
}

/// Event stream with empty elements expanded to start/end pairs
#[derive(Debug, PartialEq)]
enum Normalized {
    Start {
        name: String,
        attributes: Vec<(String, String)>,
    },
    End(String),
    Text(String),
    Declaration(Option<String>),
    Other(String),
}

impl fmt::Display for Normalized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Normalized::Start { name, .. } => write!(f, "<{name}>"),
            Normalized::End(name) => write!(f, "</{name}>"),
            Normalized::Text(text) => write!(f, "text {text:?}"),
            Normalized::Declaration(version) => {
                write!(f, "declaration version {}", version.as_deref().unwrap_or("?"))
            }
            Normalized::Other(raw) => write!(f, "{raw}"),
        }
    }
}

fn normalize(xml: &[u8]) -> Result<Vec<Normalized>> {
    let mut out = Vec::new();
    for event in read_events(xml)? {
        match event {
            XmlEvent::Start(tag) => {
                let mut attributes: Vec<(String, String)> = tag
                    .attributes()
                    .iter()
                    .map(|a| (a.name.clone(), a.value.clone()))
                    .collect();
                attributes.sort();
                out.push(Normalized::Start {
                    name: tag.name.clone(),
                    attributes,
                });
                if tag.self_closing {
                    out.push(Normalized::End(tag.name));
                }
            }
            XmlEvent::End(tag) => out.push(Normalized::End(tag.name)),
            XmlEvent::Text(text) => match out.last_mut() {
                // Adjacent text and CDATA read as one run of characters
                Some(Normalized::Text(previous)) => previous.push_str(&text.text),
                _ => out.push(Normalized::Text(text.text)),
            },
            XmlEvent::Other(raw) if raw == "\u{feff}" => {}
            XmlEvent::Other(raw) if raw.starts_with("<?xml ") => {
                out.push(Normalized::Declaration(declaration_version(&raw)));
            }
            XmlEvent::Other(raw) => out.push(Normalized::Other(raw)),
        }
    }
    Ok(out)
}

fn declaration_version(raw: &str) -> Option<String> {
    let rest = &raw[raw.find("version")? + "version".len()..];
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next()?;
    let value = &rest[quote.len_utf8()..];
    let end = value.find(quote)?;
    Some(value[..end].to_string())
}

/// First difference between two XML parts, if any
fn compare_xml(expected: &[u8], actual: &[u8]) -> Result<Option<String>> {
    let left = normalize(expected)?;
    let right = normalize(actual)?;
    for (index, (l, r)) in left.iter().zip(&right).enumerate() {
        if l != r {
            let detail = match (l, r) {
                (
                    Normalized::Start { name: a, attributes: x },
                    Normalized::Start { name: b, attributes: y },
                ) if a == b => format!("event {index}: attributes of <{a}> differ: {x:?} vs {y:?}"),
                _ => format!("event {index}: expected {l}, found {r}"),
            };
            return Ok(Some(detail));
        }
    }
    Ok(match left.len().cmp(&right.len()) {
        std::cmp::Ordering::Equal => None,
        std::cmp::Ordering::Greater => Some(format!(
            "actual part ends early: {} of {} events",
            right.len(),
            left.len()
        )),
        std::cmp::Ordering::Less => Some(format!(
            "actual part has {} extra events",
            right.len() - left.len()
        )),
    })
}
