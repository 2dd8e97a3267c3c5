//! Integration tests for the oxlate CLI
//!
//! These tests drive the command functions over files in a temporary
//! directory: extract -> edit JSON -> merge, roundtrip and diff.

use std::fs;

use tempfile::TempDir;

use oxlate_cli::{diff_command, extract_command, load_params, merge_command, roundtrip_command};
use oxlate_ooxml::archive::OoxmlArchive;
use oxlate_ooxml::test_utils::{create_docx, create_pptx};
use oxlate_ooxml::FilterParams;

const BODY: &str = r#"<w:p><w:r><w:t xml:space="preserve">Hello </w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>world</w:t></w:r></w:p>"#;

#[test]
fn test_extract_writes_units_json() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("doc.docx");
    let output = dir.path().join("doc.units.json");
    fs::write(&input, create_docx(BODY)).unwrap();

    let count = extract_command(&input, &output, &FilterParams::default()).unwrap();
    // The body paragraph and the document title
    assert_eq!(count, 2);

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(json["parts"][0]["part"], "word/document.xml");
    assert_eq!(json["parts"][0]["units"][0]["id"], "tu1");
}

#[test]
fn test_extract_merge_with_edited_json() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("doc.docx");
    let units = dir.path().join("units.json");
    let output = dir.path().join("doc.de.docx");
    fs::write(&input, create_docx(BODY)).unwrap();

    let params = FilterParams::default();
    extract_command(&input, &units, &params).unwrap();
    let json = fs::read_to_string(&units).unwrap();
    let mut package = oxlate_ooxml::PackageUnits::from_json(&json).unwrap();
    package.translate_with(|t| t.replace("Hello", "Hallo").replace("world", "Welt"));
    fs::write(&units, package.to_json().unwrap()).unwrap();

    merge_command(&input, &units, &output, &params).unwrap();
    let archive = OoxmlArchive::open(&output).unwrap();
    let document = archive.get_string("word/document.xml").unwrap().unwrap();
    assert!(document.contains("Hallo "));
    assert!(document.contains("<w:rPr><w:b/></w:rPr><w:t>Welt</w:t>"));
}

#[test]
fn test_roundtrip_and_diff() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("deck.pptx");
    let copy = dir.path().join("copy.pptx");
    let pseudo = dir.path().join("pseudo.pptx");
    fs::write(&input, create_pptx(&["Agenda", "Summary"])).unwrap();

    let params = FilterParams::default();
    roundtrip_command(&input, &copy, false, &params).unwrap();
    assert!(diff_command(&input, &copy).unwrap().is_empty());

    roundtrip_command(&input, &pseudo, true, &params).unwrap();
    let differences = diff_command(&input, &pseudo).unwrap();
    assert_eq!(differences.len(), 2);
    assert!(differences[0].starts_with("ppt/slides/slide1.xml"));
}

#[test]
fn test_missing_input() {
    let dir = TempDir::new().unwrap();
    let err = extract_command(
        &dir.path().join("missing.docx"),
        &dir.path().join("out.json"),
        &FilterParams::default(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("Input file not found"));
}

#[test]
fn test_load_params() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("oxlate.toml");
    fs::write(&config, "add_tab_as_character = true\nincluded_slide_numbers = [1]\n").unwrap();

    let params = load_params(Some(&config)).unwrap();
    assert!(params.add_tab_as_character);
    assert!(params.includes_slide(1));
    assert!(!params.includes_slide(2));
    assert_eq!(load_params(None).unwrap(), FilterParams::default());

    fs::write(&config, "add_tab_as_character = \"yes\"\n").unwrap();
    assert!(load_params(Some(&config)).is_err());
}
