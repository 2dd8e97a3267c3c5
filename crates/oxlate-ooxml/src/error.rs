//! Error types for OOXML operations

use thiserror::Error;

/// Errors that can occur during OOXML operations
#[derive(Error, Debug)]
pub enum OoxmlError {
    /// Error reading or writing the ZIP archive
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Error reading or writing files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error parsing XML content outside of a known part
    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// A package part is not well-formed XML
    #[error("Malformed XML in {part} near byte {position}: {message}")]
    MalformedPart {
        /// Part name inside the package
        part: String,
        /// Approximate byte offset of the failure
        position: u64,
        /// Underlying parser message
        message: String,
    },

    /// The package is an encrypted compound file, not a zip
    #[error("Encrypted package: decrypt the document before processing it")]
    EncryptedPackage,

    /// Revision markup found while automatic acceptance is disabled
    #[error("Unaccepted revisions in {part}: accept or reject tracked changes first")]
    UnacceptedRevisions {
        /// Part holding the revision markup
        part: String,
    },

    /// Required file not found in archive
    #[error("Required file not found: {0}")]
    MissingFile(String),

    /// Invalid document structure
    #[error("Invalid document structure: {0}")]
    InvalidStructure(String),

    /// Configuration could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration could not be written
    #[error("Configuration error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OoxmlError {
    /// Build a malformed-part error
    pub fn malformed(part: impl Into<String>, position: u64, message: impl ToString) -> Self {
        OoxmlError::MalformedPart {
            part: part.into(),
            position,
            message: message.to_string(),
        }
    }

    /// Attach a part name to an error raised without one
    pub fn in_part(self, part: &str) -> Self {
        match self {
            OoxmlError::MalformedPart {
                part: p,
                position,
                message,
            } if p.is_empty() => OoxmlError::MalformedPart {
                part: part.to_string(),
                position,
                message,
            },
            OoxmlError::UnacceptedRevisions { part: p } if p.is_empty() => {
                OoxmlError::UnacceptedRevisions {
                    part: part.to_string(),
                }
            }
            OoxmlError::Xml(e) => OoxmlError::malformed(part, 0, e),
            other => other,
        }
    }
}

/// Result type for OOXML operations
pub type Result<T> = std::result::Result<T, OoxmlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_part_fills_missing_name() {
        let err = OoxmlError::malformed("", 42, "unexpected end").in_part("word/document.xml");
        match err {
            OoxmlError::MalformedPart { part, position, .. } => {
                assert_eq!(part, "word/document.xml");
                assert_eq!(position, 42);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_in_part_keeps_existing_name() {
        let err = OoxmlError::UnacceptedRevisions {
            part: "word/footnotes.xml".into(),
        }
        .in_part("word/document.xml");
        assert!(err.to_string().contains("word/footnotes.xml"));
    }
}
