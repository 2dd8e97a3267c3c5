//! Package pipeline tests
//!
//! Extraction and merge over complete packages built by `test_utils`.
//!
//! Test Categories:
//! 1. Round-trip identity and idempotence
//! 2. Pseudo-translation merge
//! 3. Shared strings and cell exclusion
//! 4. Inline codes
//! 5. Fatal errors

use oxlate_ooxml::archive::OoxmlArchive;
use oxlate_ooxml::test_utils::{
    create_docx, create_pptx, create_xlsx, create_xlsx_sheets, SheetFixture,
};
use oxlate_ooxml::{extract, roundtrip, FilterParams, OoxmlError, PackageDiff};

const RICH_BODY: &str = r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:t>Quarterly report</w:t></w:r></w:p><w:p><w:r><w:t xml:space="preserve">Sales grew by </w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>12%</w:t></w:r><w:r><w:t xml:space="preserve"> in the </w:t></w:r><w:hyperlink r:id="rId9"><w:r><w:rPr><w:i/></w:rPr><w:t>north</w:t></w:r></w:hyperlink><w:r><w:t>.</w:t></w:r></w:p><w:tbl><w:tr><w:tc><w:p><w:r><w:t>Cell</w:t></w:r></w:p></w:tc></w:tr></w:tbl><w:p/>"#;

/// Markup as Word writes it: revision ids on every run, proofing marks
/// splitting runs, a `_GoBack` bookmark, a text box and a named picture
const WORD_SAVED_BODY: &str = r#"<w:p w:rsidR="00A4" w:rsidRDefault="00B2"><w:pPr><w:pStyle w:val="Normal"/><w:spacing w:after="120"/></w:pPr><w:bookmarkStart w:id="0" w:name="_GoBack"/><w:bookmarkEnd w:id="0"/><w:r w:rsidRPr="00C1"><w:rPr><w:b/><w:sz w:val="24"/><w:lang w:val="en-US"/></w:rPr><w:t xml:space="preserve">Hello </w:t></w:r><w:proofErr w:type="spellStart"/><w:r w:rsidRPr="00D7"><w:rPr><w:b/><w:sz w:val="24"/><w:lang w:val="en-US"/></w:rPr><w:t>wrld</w:t></w:r><w:proofErr w:type="spellEnd"/><w:r w:rsidR="00E2"><w:rPr><w:b/><w:sz w:val="24"/><w:lang w:val="en-US"/></w:rPr><w:lastRenderedPageBreak/><w:t xml:space="preserve"> again</w:t></w:r></w:p>
<w:p w:rsidR="00A4"><w:r><w:t xml:space="preserve">See </w:t></w:r><w:r><w:pict><v:shape xmlns:v="urn:schemas-microsoft-com:vml" style="width:100pt"><v:textbox><w:txbxContent><w:p><w:r><w:rPr><w:i/></w:rPr><w:t>Inside</w:t></w:r><w:r w:rsidR="0012"><w:rPr><w:i/></w:rPr><w:t xml:space="preserve"> the box</w:t></w:r></w:p></w:txbxContent></v:textbox></v:shape></w:pict></w:r></w:p>
<w:p><w:r><w:drawing><wp:inline xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing"><wp:docPr id="1" name="Company logo"/></wp:inline></w:drawing></w:r></w:p>"#;

fn part(bytes: &[u8], name: &str) -> String {
    OoxmlArchive::from_bytes(bytes)
        .unwrap()
        .get_string(name)
        .unwrap()
        .unwrap()
}

// =============================================================================
// PART 1: ROUND-TRIP IDENTITY
// =============================================================================

mod identity {
    use super::*;

    fn assert_parts_identical(original: &[u8], merged: &[u8]) {
        let before = OoxmlArchive::from_bytes(original).unwrap();
        let after = OoxmlArchive::from_bytes(merged).unwrap();
        let names: Vec<&str> = before.file_list().collect();
        assert_eq!(names, after.file_list().collect::<Vec<_>>());
        for name in names {
            assert_eq!(before.get(name), after.get(name), "part {name} changed");
        }
    }

    #[test]
    fn test_docx_roundtrip_is_identity() {
        let original = create_docx(RICH_BODY);
        let merged = roundtrip(&original, &FilterParams::default()).unwrap();
        assert_parts_identical(&original, &merged);
        assert!(PackageDiff::compare(&original, &merged).unwrap().is_empty());
    }

    #[test]
    fn test_word_saved_docx_roundtrip_is_identity() {
        let original = create_docx(WORD_SAVED_BODY);
        let params = FilterParams::default();
        let merged = roundtrip(&original, &params).unwrap();
        assert_parts_identical(&original, &merged);

        let twice = roundtrip(&merged, &params).unwrap();
        assert_parts_identical(&merged, &twice);
    }

    #[test]
    fn test_pptx_roundtrip_is_identity() {
        let original = create_pptx(&["Welcome", "Agenda"]);
        let merged = roundtrip(&original, &FilterParams::default()).unwrap();
        assert_parts_identical(&original, &merged);
    }

    #[test]
    fn test_xlsx_in_table_order_is_identity() {
        let original = create_xlsx(
            &["Name", "Total"],
            r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c><c r="C1"><v>42</v></c></row>"#,
        );
        let merged = roundtrip(&original, &FilterParams::default()).unwrap();
        assert_parts_identical(&original, &merged);
    }

    #[test]
    fn test_roundtrip_is_idempotent() {
        let params = FilterParams::default();
        let original = create_xlsx(
            &["a", "b", "c", "d", "e"],
            r#"<row r="1"><c r="A1" t="s"><v>4</v></c><c r="B1" t="s"><v>1</v></c><c r="C1" t="s"><v>3</v></c><c r="D1" t="s"><v>2</v></c></row>"#,
        );
        let once = roundtrip(&original, &params).unwrap();
        let twice = roundtrip(&once, &params).unwrap();
        assert!(PackageDiff::compare(&once, &twice).unwrap().is_empty());
        assert_eq!(
            part(&once, "xl/sharedStrings.xml"),
            part(&twice, "xl/sharedStrings.xml")
        );
    }
}

// =============================================================================
// PART 2: PSEUDO-TRANSLATION
// =============================================================================

mod pseudo_translation {
    use super::*;

    #[test]
    fn test_uppercase_docx() {
        let params = FilterParams::default();
        let extracted = extract(&create_docx(RICH_BODY), &params).unwrap();
        let mut units = extracted.units();
        units.translate_with(|t| t.to_uppercase());
        let merged = extracted.merge(&units).unwrap();

        let document = part(&merged, "word/document.xml");
        assert!(document.contains("<w:t>QUARTERLY REPORT</w:t>"));
        assert!(document.contains("<w:rPr><w:b/></w:rPr><w:t>12%</w:t>"));
        assert!(document.contains("<w:rPr><w:i/></w:rPr><w:t>NORTH</w:t>"));
        assert!(document.contains(r#"<w:hyperlink r:id="rId9">"#));

        // The merged package extracts to the translated text
        let again = extract(&merged, &params).unwrap().units();
        let texts: Vec<String> = again.parts[0].units.iter().map(|u| u.source_text()).collect();
        assert_eq!(
            texts,
            vec!["QUARTERLY REPORT", "SALES GREW BY 12% IN THE NORTH.", "CELL"]
        );
    }

    #[test]
    fn test_uppercase_word_saved_docx() {
        let params = FilterParams::default();
        let original = create_docx(WORD_SAVED_BODY);
        let extracted = extract(&original, &params).unwrap();
        let mut units = extracted.units();
        let texts: Vec<String> = units.parts[0].units.iter().map(|u| u.source_text()).collect();
        assert_eq!(texts[0], "Hello wrld again");
        assert!(texts.contains(&"Inside the box".to_string()));
        assert!(texts.contains(&"Company logo".to_string()));

        units.translate_with(|t| t.to_uppercase());
        let merged = extracted.merge(&units).unwrap();
        let document = part(&merged, "word/document.xml");
        assert!(document.contains("<w:t>HELLO WRLD AGAIN</w:t>"));
        assert!(document.contains("<w:t>INSIDE THE BOX</w:t>"));
        assert!(document.contains(r#"<wp:docPr id="1" name="COMPANY LOGO"/>"#));
        assert!(document.contains(r#"<v:shape xmlns:v="urn:schemas-microsoft-com:vml" style="width:100pt">"#));
        assert!(!document.contains("proofErr"));

        let again = extract(&merged, &params).unwrap().units();
        assert_eq!(again.parts[0].units[0].source_text(), "HELLO WRLD AGAIN");
        assert_eq!(again.unit_count(), units.unit_count());

        // Merging twice gives the same package
        let once_more = extracted.merge(&units).unwrap();
        assert!(PackageDiff::compare(&merged, &once_more).unwrap().is_empty());
    }

    #[test]
    fn test_untranslated_units_keep_markup() {
        let extracted = extract(&create_docx(RICH_BODY), &FilterParams::default()).unwrap();
        let mut units = extracted.units();
        units.translate_with(|t| t.to_string());
        let merged = extracted.merge(&units).unwrap();
        assert!(PackageDiff::compare(&create_docx(RICH_BODY), &merged)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_json_interchange() {
        let extracted = extract(&create_pptx(&["Hello"]), &FilterParams::default()).unwrap();
        let mut units = extracted.units();
        units.translate_with(|t| format!("[{t}]"));
        let json = units.to_json().unwrap();

        let reloaded = oxlate_ooxml::PackageUnits::from_json(&json).unwrap();
        let merged = oxlate_ooxml::merge(&extracted, &reloaded).unwrap();
        assert!(part(&merged, "ppt/slides/slide1.xml").contains("<a:t>[Hello]</a:t>"));
    }

    #[test]
    fn test_translated_shared_strings() {
        let extracted = extract(
            &create_xlsx(
                &["one", "two"],
                r#"<row r="1"><c r="A1" t="s"><v>1</v></c><c r="B1" t="s"><v>0</v></c></row>"#,
            ),
            &FilterParams::default(),
        )
        .unwrap();
        let mut units = extracted.units();
        units.translate_with(|t| t.to_uppercase());
        let merged = extracted.merge(&units).unwrap();

        let strings = part(&merged, "xl/sharedStrings.xml");
        assert!(strings.contains("<si><t>TWO</t></si><si><t>ONE</t></si>"));
        let sheet = part(&merged, "xl/worksheets/sheet1.xml");
        assert!(sheet.contains(r#"<c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c>"#));
    }
}

// =============================================================================
// PART 3: SHARED STRINGS AND EXCLUSION
// =============================================================================

mod shared_strings {
    use super::*;

    #[test]
    fn test_cell_order_renumbers_table() {
        let original = create_xlsx(
            &["a", "b", "c", "d", "e"],
            r#"<row r="1"><c r="A1" t="s"><v>4</v></c><c r="B1" t="s"><v>1</v></c><c r="C1" t="s"><v>3</v></c><c r="D1" t="s"><v>2</v></c></row>"#,
        );
        let merged = roundtrip(&original, &FilterParams::default()).unwrap();

        let sheet = part(&merged, "xl/worksheets/sheet1.xml");
        for (cell, index) in [("A1", 0), ("B1", 1), ("C1", 2), ("D1", 3)] {
            assert!(sheet.contains(&format!(r#"<c r="{cell}" t="s"><v>{index}</v></c>"#)));
        }
        let strings = part(&merged, "xl/sharedStrings.xml");
        assert!(strings.contains(
            "<si><t>e</t></si><si><t>b</t></si><si><t>d</t></si><si><t>c</t></si><si><t>a</t></si>"
        ));
    }

    #[test]
    fn test_excluded_column() {
        let params = FilterParams {
            excluded_columns: ["1A".to_string()].into_iter().collect(),
            ..FilterParams::default()
        };
        let original = create_xlsx(
            &["code", "label"],
            r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row>"#,
        );
        let units = extract(&original, &params).unwrap().units();
        let strings = units.part("xl/sharedStrings.xml").unwrap();
        let texts: Vec<String> = strings.units.iter().map(|u| u.source_text()).collect();
        assert_eq!(texts, vec!["label"]);
    }

    #[test]
    fn test_exclusion_applies_to_first_sheet_only() {
        let params = FilterParams {
            excluded_columns: ["1A".to_string()].into_iter().collect(),
            ..FilterParams::default()
        };
        let original = create_xlsx_sheets(
            &["shared"],
            &[
                SheetFixture::new("First", r#"<row r="1"><c r="A1" t="s"><v>0</v></c></row>"#),
                SheetFixture::new("Second", r#"<row r="1"><c r="A1" t="s"><v>0</v></c></row>"#),
            ],
        );
        let extracted = extract(&original, &params).unwrap();
        let units = extracted.units();
        assert_eq!(units.part("xl/sharedStrings.xml").unwrap().units.len(), 1);

        // The string is split into an excluded and an extracted copy
        let merged = extracted.merge(&units).unwrap();
        assert!(part(&merged, "xl/worksheets/sheet1.xml").contains("<v>0</v>"));
        assert!(part(&merged, "xl/worksheets/sheet2.xml").contains("<v>1</v>"));
        assert!(part(&merged, "xl/sharedStrings.xml").contains(r#"uniqueCount="2""#));
    }

    #[test]
    fn test_hidden_sheet() {
        let original = create_xlsx_sheets(
            &["visible", "secret"],
            &[
                SheetFixture::new("Shown", r#"<row r="1"><c r="A1" t="s"><v>0</v></c></row>"#),
                SheetFixture {
                    hidden: true,
                    ..SheetFixture::new("Hidden", r#"<row r="1"><c r="A1" t="s"><v>1</v></c></row>"#)
                },
            ],
        );
        let units = extract(&original, &FilterParams::default()).unwrap().units();
        let texts: Vec<String> = units.parts[0].units.iter().map(|u| u.source_text()).collect();
        assert_eq!(texts, vec!["visible"]);

        let params = FilterParams {
            translate_excel_hidden: true,
            ..FilterParams::default()
        };
        let units = extract(&original, &params).unwrap().units();
        assert_eq!(units.unit_count(), 2);
    }
}

// =============================================================================
// PART 4: INLINE CODES
// =============================================================================

mod inline_codes {
    use super::*;
    use oxlate_ast::{CodeKind, TagType};

    const TAB_BODY: &str = r#"<w:p><w:r><w:t>Before</w:t><w:tab/><w:t>after.</w:t></w:r></w:p>"#;

    #[test]
    fn test_tab_as_code() {
        let units = extract(&create_docx(TAB_BODY), &FilterParams::default())
            .unwrap()
            .units();
        let source = units.parts[0].units[0].source();
        assert_eq!(source.text(), "Beforeafter.");
        let code = source.codes().next().unwrap();
        assert_eq!(code.kind, CodeKind::Tab);
        assert_eq!(code.tag_type, TagType::Isolated);
    }

    #[test]
    fn test_tab_as_character() {
        let params = FilterParams {
            add_tab_as_character: true,
            ..FilterParams::default()
        };
        let extracted = extract(&create_docx(TAB_BODY), &params).unwrap();
        let mut units = extracted.units();
        assert_eq!(units.parts[0].units[0].source_text(), "Before\tafter.");

        units.translate_with(|t| t.replace("after", "later"));
        let merged = extracted.merge(&units).unwrap();
        assert!(part(&merged, "word/document.xml")
            .contains("<w:t>Before</w:t><w:tab/><w:t>later.</w:t>"));
    }

    #[test]
    fn test_all_units_balanced() {
        let packages = [
            create_docx(RICH_BODY),
            create_pptx(&["One", "Two"]),
            create_xlsx(&["x"], r#"<row r="1"><c r="A1" t="s"><v>0</v></c></row>"#),
        ];
        for bytes in packages {
            let units = extract(&bytes, &FilterParams::default()).unwrap().units();
            for unit in units.parts.iter().flat_map(|p| &p.units) {
                assert!(unit.source().is_balanced(), "unit {} is unbalanced", unit.id);
            }
        }
    }

    #[test]
    fn test_doc_properties_toggle() {
        let params = FilterParams {
            translate_doc_properties: false,
            ..FilterParams::default()
        };
        let units = extract(&create_docx(TAB_BODY), &params).unwrap().units();
        assert!(units.part("docProps/core.xml").is_none());

        let units = extract(&create_docx(TAB_BODY), &FilterParams::default())
            .unwrap()
            .units();
        let core = units.part("docProps/core.xml").unwrap();
        assert_eq!(core.units[0].source_text(), "Fixture");
    }
}

// =============================================================================
// PART 5: FATAL ERRORS
// =============================================================================

mod errors {
    use super::*;

    #[test]
    fn test_unaccepted_revisions() {
        let params = FilterParams {
            automatically_accept_revisions: false,
            ..FilterParams::default()
        };
        let bytes = create_docx(
            r#"<w:p><w:ins w:id="1" w:author="A"><w:r><w:t>added</w:t></w:r></w:ins></w:p>"#,
        );
        match extract(&bytes, &params) {
            Err(OoxmlError::UnacceptedRevisions { part }) => assert_eq!(part, "word/document.xml"),
            other => panic!("unexpected result {:?}", other.map(|p| p.kind())),
        }
    }

    #[test]
    fn test_accepted_revisions() {
        let bytes = create_docx(
            r#"<w:p><w:r><w:t xml:space="preserve">Kept </w:t></w:r><w:ins w:id="1" w:author="A"><w:r><w:t>added</w:t></w:r></w:ins><w:del w:id="2" w:author="A"><w:r><w:delText>gone</w:delText></w:r></w:del></w:p>"#,
        );
        let units = extract(&bytes, &FilterParams::default()).unwrap().units();
        assert_eq!(units.parts[0].units[0].source_text(), "Kept added");
    }

    #[test]
    fn test_encrypted_package() {
        let mut bytes = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
        bytes.resize(512, 0);
        assert!(matches!(
            extract(&bytes, &FilterParams::default()),
            Err(OoxmlError::EncryptedPackage)
        ));
    }

    #[test]
    fn test_not_a_zip() {
        assert!(matches!(
            extract(b"plain text", &FilterParams::default()),
            Err(OoxmlError::Archive(_))
        ));
    }

    #[test]
    fn test_malformed_part_fails_document() {
        let bytes = create_docx(r#"<w:p><w:r><w:t>broken</w:r></w:p>"#);
        match extract(&bytes, &FilterParams::default()) {
            Err(OoxmlError::MalformedPart { part, .. }) => assert_eq!(part, "word/document.xml"),
            other => panic!("unexpected result {:?}", other.map(|p| p.kind())),
        }
    }
}
