//! # oxlate-ooxml
//!
//! Lossless round-trip text extraction for Office Open XML packages
//! (.docx, .xlsx, .pptx and their template and macro variants).
//!
//! This crate provides functionality to:
//! - Extract translatable text as [`oxlate_ast::TextUnit`]s with inline codes
//! - Merge translated units back into the original package
//! - Compare two packages part by part
//!
//! Everything outside the translated text is reproduced as it was read.
//!
//! ## Example: Pseudo-translation
//!
//! ```no_run
//! use oxlate_ooxml::{extract, FilterParams};
//!
//! let bytes = std::fs::read("report.docx")?;
//! let extracted = extract(&bytes, &FilterParams::default())?;
//!
//! let mut units = extracted.units();
//! units.translate_with(|text| text.to_uppercase());
//!
//! let translated = extracted.merge(&units)?;
//! std::fs::write("report.upper.docx", translated)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod archive;
pub mod block;
pub mod config;
pub mod content_types;
pub mod diff;
pub mod error;
pub mod excel;
pub mod mapper;
pub mod package;
pub mod parser;
pub mod part;
pub mod relationships;
pub mod run_properties;
pub mod shared_strings;
pub mod simplifier;
pub mod skeleton;
pub mod styles;
pub mod xml;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use archive::OoxmlArchive;
pub use config::FilterParams;
pub use diff::{PackageDiff, PartDifference};
pub use error::{OoxmlError, Result};
pub use package::{
    extract, merge, roundtrip, ExtractedPackage, PackageKind, PackageUnits, PartUnits,
};
pub use relationships::Relationships;
pub use styles::{StyleDefinitions, StyleSheet};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
