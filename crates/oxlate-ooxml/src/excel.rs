//! SpreadsheetML workbooks and worksheets
//!
//! Worksheets are scanned in workbook order before the shared string table
//! is touched. Each shared-string cell gets its index rewritten through the
//! [`SharedStringMap`], tagged as excluded when its column is configured out,
//! its fill color is excluded, or it sits in a hidden row, column or sheet.

use std::collections::BTreeSet;

use tracing::debug;

use crate::config::FilterParams;
use crate::error::{OoxmlError, Result};
use crate::shared_strings::SharedStringMap;
use crate::xml::{read_events, StartTag, TextEvent, XmlEvent};

// ============================================================================
// Workbook
// ============================================================================

/// A sheet listed in `xl/workbook.xml`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkbookSheet {
    /// Display name
    pub name: String,
    /// Relationship id of the worksheet part
    pub rel_id: String,
    /// `state="hidden"` or `"veryHidden"`
    pub hidden: bool,
}

/// Sheets of a workbook in tab order
pub fn parse_workbook_sheets(xml: &[u8]) -> Result<Vec<WorkbookSheet>> {
    let events = read_events(xml)?;
    let sheets = events
        .iter()
        .filter_map(XmlEvent::as_start)
        .filter(|tag| tag.local_name() == "sheet")
        .filter_map(|tag| {
            let rel_id = tag
                .attributes()
                .iter()
                .find(|a| a.local_name() == "id" && a.name.contains(':'))?
                .value
                .clone();
            Some(WorkbookSheet {
                name: tag.attr("name").unwrap_or_default().to_string(),
                rel_id,
                hidden: matches!(tag.attr("state"), Some("hidden" | "veryHidden")),
            })
        })
        .collect();
    Ok(sheets)
}

// ============================================================================
// Styles
// ============================================================================

/// Fill colors of cell formats (`xl/styles.xml`)
#[derive(Debug, Clone, Default)]
pub struct ExcelStyles {
    /// `fgColor/@rgb` of each fill
    fills: Vec<Option<String>>,
    /// Fill id of each `cellXfs/xf`
    cell_fills: Vec<usize>,
}

impl ExcelStyles {
    /// Parse the styles part
    pub fn parse(xml: &[u8]) -> Result<Self> {
        let events = read_events(xml)?;
        let mut styles = ExcelStyles::default();
        let mut section: Option<&str> = None;
        for event in &events {
            match event {
                XmlEvent::Start(tag) => match (section, tag.local_name()) {
                    (None, "fills") if !tag.self_closing => section = Some("fills"),
                    (None, "cellXfs") if !tag.self_closing => section = Some("cellXfs"),
                    (Some("fills"), "fill") => styles.fills.push(None),
                    (Some("fills"), "fgColor") => {
                        if let (Some(last), Some(rgb)) = (styles.fills.last_mut(), tag.attr("rgb")) {
                            *last = Some(rgb.to_string());
                        }
                    }
                    (Some("cellXfs"), "xf") => styles.cell_fills.push(
                        tag.attr("fillId")
                            .and_then(|id| id.parse().ok())
                            .unwrap_or(0),
                    ),
                    _ => {}
                },
                XmlEvent::End(tag) if Some(tag.local_name()) == section => section = None,
                _ => {}
            }
        }
        Ok(styles)
    }

    /// Foreground fill color of a cell format
    pub fn fill_color(&self, style_index: usize) -> Option<&str> {
        let fill = *self.cell_fills.get(style_index)?;
        self.fills.get(fill)?.as_deref()
    }
}

// ============================================================================
// Cell references
// ============================================================================

/// Column letters for a 1-based index (`1` is `A`, `27` is `AA`)
pub fn column_name(mut index: u32) -> String {
    let mut name = Vec::new();
    while index > 0 {
        let modulo = (index - 1) % 26;
        name.push(b'A' + modulo as u8);
        index = (index - modulo) / 26;
    }
    name.reverse();
    String::from_utf8(name).unwrap_or_default()
}

/// 1-based index of column letters
pub fn column_index(name: &str) -> Option<u32> {
    if name.is_empty() {
        return None;
    }
    name.chars().try_fold(0u32, |acc, c| {
        let c = c.to_ascii_uppercase();
        c.is_ascii_uppercase()
            .then(|| acc * 26 + (c as u32 - 'A' as u32 + 1))
    })
}

/// Split `B12` into column index and row number
pub fn split_reference(reference: &str) -> Option<(u32, u32)> {
    let reference = reference.trim().replace('$', "");
    let digits = reference.find(|c: char| c.is_ascii_digit())?;
    let (column, row) = reference.split_at(digits);
    Some((column_index(column)?, row.parse().ok()?))
}

/// A `mergeCell` range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MergeArea {
    left: u32,
    right: u32,
    top: u32,
    bottom: u32,
}

impl MergeArea {
    fn parse(range: &str) -> Option<Self> {
        let (from, to) = range.split_once(':')?;
        let (left, top) = split_reference(from)?;
        let (right, bottom) = split_reference(to)?;
        Some(Self {
            left,
            right,
            top,
            bottom,
        })
    }

    fn contains(&self, column: u32, row: u32) -> bool {
        (self.left..=self.right).contains(&column) && (self.top..=self.bottom).contains(&row)
    }
}

// ============================================================================
// Worksheets
// ============================================================================

/// What a worksheet scan needs to know about its sheet
#[derive(Debug, Clone, Copy)]
pub struct SheetInfo {
    /// 1-based position in the workbook
    pub number: usize,
    /// Whether the sheet itself is hidden
    pub hidden: bool,
}

/// Exclusion state of one worksheet
struct SheetExclusions<'a> {
    params: &'a FilterParams,
    styles: &'a ExcelStyles,
    whole_sheet: bool,
    columns: BTreeSet<u32>,
    rows: BTreeSet<u32>,
    merges: Vec<MergeArea>,
}

impl<'a> SheetExclusions<'a> {
    /// Collect configured and hidden columns, hidden rows and merge areas
    fn scan(
        events: &[XmlEvent],
        sheet: SheetInfo,
        params: &'a FilterParams,
        styles: &'a ExcelStyles,
    ) -> Self {
        let skip_hidden = !params.translate_excel_hidden;
        let mut columns: BTreeSet<u32> = params
            .excluded_columns_for_sheet(sheet.number)
            .iter()
            .filter_map(|c| column_index(c))
            .collect();
        let mut rows = BTreeSet::new();
        let mut merges = Vec::new();
        let mut last_row = 0u32;

        for tag in events.iter().filter_map(XmlEvent::as_start) {
            match tag.local_name() {
                "row" => {
                    last_row = tag
                        .attr("r")
                        .and_then(|r| r.parse().ok())
                        .unwrap_or(last_row + 1);
                    if skip_hidden && is_true(tag.attr("hidden")) {
                        rows.insert(last_row);
                    }
                }
                "col" if skip_hidden && is_true(tag.attr("hidden")) => {
                    let min = tag.attr("min").and_then(|v| v.parse::<u32>().ok());
                    let max = tag.attr("max").and_then(|v| v.parse::<u32>().ok());
                    if let (Some(min), Some(max)) = (min, max) {
                        columns.extend(min..=max);
                    }
                }
                "mergeCell" => {
                    if let Some(area) = tag.attr("ref").and_then(MergeArea::parse) {
                        merges.push(area);
                    }
                }
                _ => {}
            }
        }

        Self {
            params,
            styles,
            whole_sheet: skip_hidden && sheet.hidden,
            columns,
            rows,
            merges,
        }
    }

    /// Whether a cell's string is kept out of extraction
    fn is_excluded(&self, column: u32, row: u32, style: Option<usize>) -> bool {
        if self.whole_sheet || self.is_position_excluded(column, row) {
            return true;
        }
        style
            .and_then(|s| self.styles.fill_color(s))
            .is_some_and(|color| self.params.is_color_excluded(color))
    }

    fn is_position_excluded(&self, column: u32, row: u32) -> bool {
        if !self.columns.contains(&column) && !self.rows.contains(&row) {
            return false;
        }
        // A merged area that stays partly visible keeps its text
        match self.merges.iter().find(|m| m.contains(column, row)) {
            Some(area) => {
                let all_columns = (area.left..=area.right).all(|c| self.columns.contains(&c));
                let all_rows = (area.top..=area.bottom).all(|r| self.rows.contains(&r));
                all_columns || all_rows
            }
            None => true,
        }
    }
}

fn is_true(value: Option<&str>) -> bool {
    matches!(value, Some("1" | "true"))
}

/// Rewrite the shared string indices of one worksheet
///
/// Returns the rewritten part. Indices are assigned through `map` in cell
/// order, so worksheets must be rewritten in workbook order.
pub fn rewrite_worksheet(
    xml: &[u8],
    sheet: SheetInfo,
    params: &FilterParams,
    styles: &ExcelStyles,
    map: &mut SharedStringMap,
) -> Result<String> {
    let mut events = read_events(xml)?;
    let exclusions = SheetExclusions::scan(&events, sheet, params, styles);

    let mut row = 0u32;
    let mut column = 0u32;
    let mut cell: Option<(bool, bool)> = None; // (shared string, excluded)
    let mut in_value = false;
    let mut rewritten = 0usize;

    for event in events.iter_mut() {
        match event {
            XmlEvent::Start(tag) => match tag.local_name() {
                "row" => {
                    row = tag.attr("r").and_then(|r| r.parse().ok()).unwrap_or(row + 1);
                    column = 0;
                }
                "c" => {
                    let (c, r) = cell_position(tag, column, row);
                    column = c;
                    let shared = tag.attr("t") == Some("s");
                    let style = tag.attr("s").and_then(|s| s.parse().ok());
                    cell = (!tag.self_closing)
                        .then(|| (shared, shared && exclusions.is_excluded(c, r, style)));
                }
                "v" => in_value = !tag.self_closing && cell.is_some(),
                _ => {}
            },
            XmlEvent::End(tag) => match tag.local_name() {
                "c" => cell = None,
                "v" => in_value = false,
                _ => {}
            },
            XmlEvent::Text(text) if in_value => {
                if let Some((true, excluded)) = cell {
                    let original: usize = text.text.trim().parse().map_err(|_| {
                        OoxmlError::malformed(
                            "",
                            0,
                            format!("unexpected shared string index '{}'", text.text),
                        )
                    })?;
                    let new_index = map.create_entry_for_string(original, excluded);
                    *text = TextEvent {
                        raw: new_index.to_string(),
                        text: new_index.to_string(),
                        cdata: false,
                    };
                    rewritten += 1;
                }
            }
            _ => {}
        }
    }

    debug!(sheet = sheet.number, cells = rewritten, "rewrote shared string cells");
    Ok(crate::xml::events_to_xml(&events))
}

/// Column and row of a cell, inferring them when `r` is missing
fn cell_position(tag: &StartTag, previous_column: u32, row: u32) -> (u32, u32) {
    tag.attr("r")
        .and_then(split_reference)
        .unwrap_or((previous_column + 1, row))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = "xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\"";

    fn sheet(body: &str) -> String {
        format!("<worksheet {NS}><sheetData>{body}</sheetData></worksheet>")
    }

    fn rewrite(xml: &str, params: &FilterParams, map: &mut SharedStringMap) -> String {
        rewrite_worksheet(
            xml.as_bytes(),
            SheetInfo {
                number: 1,
                hidden: false,
            },
            params,
            &ExcelStyles::default(),
            map,
        )
        .unwrap()
    }

    #[test]
    fn test_column_names() {
        assert_eq!(column_name(1), "A");
        assert_eq!(column_name(26), "Z");
        assert_eq!(column_name(27), "AA");
        assert_eq!(column_name(703), "AAA");
        assert_eq!(column_index("A"), Some(1));
        assert_eq!(column_index("ab"), Some(28));
        assert_eq!(column_index("A1"), None);
        assert_eq!(split_reference("$C$12"), Some((3, 12)));
    }

    #[test]
    fn test_indices_follow_cell_order() {
        let xml = sheet(
            r#"<row r="1"><c r="A1" t="s"><v>4</v></c><c r="B1" t="s"><v>1</v></c></row><row r="2"><c r="A2" t="s"><v>3</v></c><c r="B2"><v>42</v></c><c r="C2" t="s"><v>2</v></c></row>"#,
        );
        let mut map = SharedStringMap::new();
        let out = rewrite(&xml, &FilterParams::default(), &mut map);
        assert_eq!(
            out,
            sheet(
                r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row><row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2"><v>42</v></c><c r="C2" t="s"><v>3</v></c></row>"#
            )
        );
        let originals: Vec<usize> = map.entries().iter().map(|e| e.original_index).collect();
        assert_eq!(originals, vec![4, 1, 3, 2]);
    }

    #[test]
    fn test_excluded_column() {
        let xml = sheet(
            r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>0</v></c></row>"#,
        );
        let params = FilterParams {
            excluded_columns: ["1A".to_string()].into_iter().collect(),
            ..FilterParams::default()
        };
        let mut map = SharedStringMap::new();
        let out = rewrite(&xml, &params, &mut map);
        assert!(out.contains(r#"<c r="A1" t="s"><v>0</v>"#));
        assert!(out.contains(r#"<c r="B1" t="s"><v>1</v>"#));
        assert!(map.entries()[0].excluded);
        assert!(!map.entries()[1].excluded);
    }

    #[test]
    fn test_missing_references_are_inferred() {
        let xml = sheet(r#"<row><c t="s"><v>0</v></c><c t="s"><v>1</v></c></row>"#);
        let params = FilterParams {
            excluded_columns: ["1B".to_string()].into_iter().collect(),
            ..FilterParams::default()
        };
        let mut map = SharedStringMap::new();
        rewrite(&xml, &params, &mut map);
        assert!(!map.entries()[0].excluded);
        assert!(map.entries()[1].excluded);
    }

    #[test]
    fn test_hidden_rows_and_columns() {
        let xml = format!(
            "<worksheet {NS}><cols><col min=\"2\" max=\"2\" hidden=\"1\"/></cols><sheetData>\
<row r=\"1\"><c r=\"A1\" t=\"s\"><v>0</v></c><c r=\"B1\" t=\"s\"><v>1</v></c></row>\
<row r=\"2\" hidden=\"true\"><c r=\"A2\" t=\"s\"><v>2</v></c></row></sheetData></worksheet>"
        );
        let mut map = SharedStringMap::new();
        rewrite(&xml, &FilterParams::default(), &mut map);
        let excluded: Vec<bool> = map.entries().iter().map(|e| e.excluded).collect();
        assert_eq!(excluded, vec![false, true, true]);

        let params = FilterParams {
            translate_excel_hidden: true,
            ..FilterParams::default()
        };
        let mut map = SharedStringMap::new();
        rewrite(&xml, &params, &mut map);
        assert!(map.entries().iter().all(|e| !e.excluded));
    }

    #[test]
    fn test_partly_visible_merge_area_is_kept() {
        let xml = format!(
            "<worksheet {NS}><cols><col min=\"1\" max=\"1\" hidden=\"1\"/></cols><sheetData>\
<row r=\"1\"><c r=\"A1\" t=\"s\"><v>0</v></c><c r=\"C1\" t=\"s\"><v>1</v></c></row></sheetData>\
<mergeCells count=\"1\"><mergeCell ref=\"A1:B1\"/></mergeCells></worksheet>"
        );
        let mut map = SharedStringMap::new();
        rewrite(&xml, &FilterParams::default(), &mut map);
        assert!(map.entries().iter().all(|e| !e.excluded));
    }

    #[test]
    fn test_hidden_sheet() {
        let xml = sheet(r#"<row r="1"><c r="A1" t="s"><v>0</v></c></row>"#);
        let mut map = SharedStringMap::new();
        rewrite_worksheet(
            xml.as_bytes(),
            SheetInfo {
                number: 1,
                hidden: true,
            },
            &FilterParams::default(),
            &ExcelStyles::default(),
            &mut map,
        )
        .unwrap();
        assert!(map.entries()[0].excluded);
    }

    #[test]
    fn test_excluded_fill_color() {
        let styles = ExcelStyles::parse(
            br#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<fills count="3"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill>
<fill><patternFill patternType="solid"><fgColor rgb="FFFFFF00"/><bgColor indexed="64"/></patternFill></fill></fills>
<cellXfs count="2"><xf fillId="0"/><xf fillId="2" applyFill="1"/></cellXfs></styleSheet>"#,
        )
        .unwrap();
        assert_eq!(styles.fill_color(1), Some("FFFFFF00"));
        assert_eq!(styles.fill_color(0), None);

        let params = FilterParams {
            excluded_colors: ["FFFF00".to_string()].into_iter().collect(),
            ..FilterParams::default()
        };
        let xml = sheet(r#"<row r="1"><c r="A1" s="1" t="s"><v>0</v></c><c r="B1" s="0" t="s"><v>1</v></c></row>"#);
        let mut map = SharedStringMap::new();
        rewrite_worksheet(
            xml.as_bytes(),
            SheetInfo {
                number: 1,
                hidden: false,
            },
            &params,
            &styles,
            &mut map,
        )
        .unwrap();
        assert!(map.entries()[0].excluded);
        assert!(!map.entries()[1].excluded);
    }

    #[test]
    fn test_bad_index_is_malformed() {
        let xml = sheet(r#"<row r="1"><c r="A1" t="s"><v>x</v></c></row>"#);
        let err = rewrite_worksheet(
            xml.as_bytes(),
            SheetInfo {
                number: 1,
                hidden: false,
            },
            &FilterParams::default(),
            &ExcelStyles::default(),
            &mut SharedStringMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, OoxmlError::MalformedPart { .. }));
    }

    #[test]
    fn test_workbook_sheets() {
        let sheets = parse_workbook_sheets(
            br#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="One" sheetId="1" r:id="rId1"/><sheet name="Two" sheetId="2" state="hidden" r:id="rId2"/></sheets></workbook>"#,
        )
        .unwrap();
        assert_eq!(sheets.len(), 2);
        assert_eq!(sheets[0].rel_id, "rId1");
        assert!(!sheets[0].hidden);
        assert!(sheets[1].hidden);
    }
}
