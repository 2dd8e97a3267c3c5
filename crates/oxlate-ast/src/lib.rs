//! oxlate-ast - Text unit model
//!
//! This crate provides the types exchanged between the OOXML extractor and
//! whatever translates the content: text units made of coded text, where
//! plain text is interleaved with numbered inline codes.

pub mod code;
pub mod unit;

pub use code::{Code, CodeKind, TagType};
pub use unit::{Fragment, TextFragment, TextPart, TextUnit};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
