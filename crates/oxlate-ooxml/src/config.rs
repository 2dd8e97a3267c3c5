//! Filter configuration
//!
//! [`FilterParams`] controls which parts are extracted and how paragraph
//! markup is simplified. It loads from TOML; every field is optional and
//! falls back to its default.
//!
//! ```toml
//! add_tab_as_character = true
//! excluded_columns = ["1A", "2C"]
//! included_slide_numbers = [1, 3]
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Extraction and simplification options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    /// Represent `w:tab` as a literal `\t` instead of an inline code
    pub add_tab_as_character: bool,
    /// Represent line breaks as `line_separator_replacement`
    pub add_line_separator_character: bool,
    /// Character used for line breaks when they become text
    pub line_separator_replacement: char,
    /// Drop formatting properties with no visual effect before merging runs
    pub cleanup_aggressively: bool,
    /// Drop `w:softHyphen` elements
    pub ignore_soft_hyphen_tag: bool,
    /// Turn `w:noBreakHyphen` into a literal `-`
    pub replace_no_break_hyphen_tag: bool,
    /// Accept tracked changes; when false, revision markup is an error
    pub automatically_accept_revisions: bool,
    /// Extract text formatted as hidden (`w:vanish`)
    pub translate_word_hidden: bool,
    /// Extract Word headers and footers
    pub translate_word_headers_footers: bool,
    /// Extract core document properties (title, subject, ...)
    pub translate_doc_properties: bool,
    /// Extract comments
    pub translate_comments: bool,
    /// Extract slide masters and layouts
    pub translate_powerpoint_masters: bool,
    /// Extract speaker notes
    pub translate_powerpoint_notes: bool,
    /// Extract cells in hidden rows, columns and sheets
    pub translate_excel_hidden: bool,
    /// Extract worksheet tab names from the workbook
    pub translate_excel_sheet_names: bool,
    /// Extract text boxes and shapes in worksheet drawings
    pub translate_excel_drawings: bool,
    /// Extract SmartArt diagram data in workbooks
    pub translate_excel_diagram_data: bool,
    /// Keep the `name` of Word drawing objects (`wp:docPr`, `pic:cNvPr`) out of extraction
    pub translate_word_exclude_graphic_metadata: bool,
    /// Complex field codes whose result text is extracted (`HYPERLINK`)
    pub complex_field_definitions_to_extract: BTreeSet<String>,
    /// Extract the targets of external hyperlinks in slide relationships
    pub extract_external_hyperlinks: bool,
    /// On slide masters and layouts, extract only shapes that are not placeholders
    pub ignore_placeholders_in_powerpoint_masters: bool,
    /// Excel cells never extracted, as sheet number plus column (`1A`)
    pub excluded_columns: BTreeSet<String>,
    /// Excel fill colors (`FF0000` or `FFFF0000`) whose cells are not extracted
    pub excluded_colors: BTreeSet<String>,
    /// Word paragraph or character style ids whose text is not extracted
    pub exclude_word_styles: BTreeSet<String>,
    /// Slides to extract (1-based); empty means all
    pub included_slide_numbers: BTreeSet<u32>,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            add_tab_as_character: false,
            add_line_separator_character: false,
            line_separator_replacement: '\n',
            cleanup_aggressively: false,
            ignore_soft_hyphen_tag: false,
            replace_no_break_hyphen_tag: false,
            automatically_accept_revisions: true,
            translate_word_hidden: false,
            translate_word_headers_footers: true,
            translate_doc_properties: true,
            translate_comments: true,
            translate_powerpoint_masters: true,
            translate_powerpoint_notes: true,
            translate_excel_hidden: false,
            translate_excel_sheet_names: false,
            translate_excel_drawings: false,
            translate_excel_diagram_data: false,
            translate_word_exclude_graphic_metadata: false,
            complex_field_definitions_to_extract: ["HYPERLINK".to_string()].into_iter().collect(),
            extract_external_hyperlinks: false,
            ignore_placeholders_in_powerpoint_masters: false,
            excluded_columns: BTreeSet::new(),
            excluded_colors: BTreeSet::new(),
            exclude_word_styles: BTreeSet::new(),
            included_slide_numbers: BTreeSet::new(),
        }
    }
}

impl FilterParams {
    /// Parse parameters from a TOML string
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Load parameters from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Render the parameters as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    /// Whether the result of a complex field is extracted
    ///
    /// `instruction` is the field instruction text; its first word names the
    /// field (`HYPERLINK "https://..."`).
    pub fn extracts_field_result(&self, instruction: &str) -> bool {
        instruction
            .split_whitespace()
            .next()
            .is_some_and(|name| {
                self.complex_field_definitions_to_extract
                    .iter()
                    .any(|f| f.eq_ignore_ascii_case(name))
            })
    }

    /// Whether a slide (1-based) is selected for extraction
    pub fn includes_slide(&self, number: u32) -> bool {
        self.included_slide_numbers.is_empty() || self.included_slide_numbers.contains(&number)
    }

    /// Excluded columns of one worksheet (1-based), as column letters
    pub fn excluded_columns_for_sheet(&self, sheet_number: usize) -> BTreeSet<String> {
        self.excluded_columns
            .iter()
            .filter_map(|entry| {
                let split = entry.find(|c: char| !c.is_ascii_digit())?;
                let (sheet, column) = entry.split_at(split);
                (sheet.parse::<usize>().ok()? == sheet_number)
                    .then(|| column.to_ascii_uppercase())
            })
            .collect()
    }

    /// Whether an ARGB or RGB fill color is excluded
    pub fn is_color_excluded(&self, argb: &str) -> bool {
        let rgb = normalize_rgb(argb);
        self.excluded_colors.iter().any(|c| normalize_rgb(c) == rgb)
    }
}

/// Reduce `FFRRGGBB` or `RRGGBB` to upper-case `RRGGBB`
fn normalize_rgb(color: &str) -> String {
    let color = color.trim().trim_start_matches('#');
    let rgb = if color.len() == 8 { &color[2..] } else { color };
    rgb.to_ascii_uppercase()
}
