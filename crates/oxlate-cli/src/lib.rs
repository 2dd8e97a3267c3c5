//! oxlate CLI - Command-line interface library
//!
//! This library provides the CLI functionality for oxlate, including:
//! - Extract: Write the text units of a document to JSON
//! - Merge: Write translated units back into the document
//! - Roundtrip: Extract and merge in one step, optionally pseudo-translated
//! - Diff: Compare two documents part by part
//!
//! # Binary Usage
//!
//! ```bash
//! # Extract text units
//! oxlate extract report.docx --output report.units.json
//!
//! # Merge translations
//! oxlate merge report.docx --units report.de.json --output report.de.docx
//!
//! # Check that a document survives the round trip
//! oxlate roundtrip report.docx --output copy.docx
//! oxlate diff report.docx copy.docx
//! ```

pub mod app;

// Re-export main entry point and commands
pub use app::{
    diff_command, extract_command, load_params, merge_command, roundtrip_command, run_cli,
};
