//! Shared test fixtures
//!
//! Builders for small but complete .docx, .xlsx and .pptx packages. Enable
//! the `test-utils` feature to use them from other crates' tests.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::archive::OoxmlArchive;

const RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const REL_BASE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const S_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const P_NS: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
const A_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// Create a zip archive from `(name, contents)` pairs, in order
pub fn create_zip(files: &[(&str, &str)]) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(&mut buffer);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, contents) in files {
        zip.start_file(*name, options).unwrap();
        zip.write_all(contents.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
    buffer.into_inner()
}

/// Add parts to a finished package
///
/// Each entry is `(name, content type, contents)`; a non-empty content type
/// is registered as an override.
pub fn add_parts(package: &[u8], parts: &[(&str, &str, &str)]) -> Vec<u8> {
    let mut archive = OoxmlArchive::from_bytes(package).unwrap();
    let mut types = archive.get_string("[Content_Types].xml").unwrap().unwrap();
    for (name, content_type, contents) in parts {
        if !content_type.is_empty() {
            let entry = format!(r#"<Override PartName="/{name}" ContentType="{content_type}"/></Types>"#);
            types = types.replace("</Types>", &entry);
        }
        archive.set_string(*name, *contents);
    }
    archive.set_string("[Content_Types].xml", types);
    archive.to_bytes().unwrap()
}

fn content_types(overrides: &[(String, &str)]) -> String {
    let mut xml = format!(
        r#"{DECLARATION}
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/>"#
    );
    for (part, content_type) in overrides {
        xml.push_str(&format!(
            r#"<Override PartName="/{part}" ContentType="{content_type}"/>"#
        ));
    }
    xml.push_str("</Types>");
    xml
}

fn relationships(rels: &[(String, &str, String)]) -> String {
    let mut xml = format!(r#"{DECLARATION}
<Relationships xmlns="{RELS_NS}">"#);
    for (id, rel_type, target) in rels {
        xml.push_str(&format!(
            r#"<Relationship Id="{id}" Type="{REL_BASE}/{rel_type}" Target="{target}"/>"#
        ));
    }
    xml.push_str("</Relationships>");
    xml
}

fn root_rels(main: &str) -> String {
    relationships(&[("rId1".into(), "officeDocument", main.into())])
}

// ============================================================================
// Word
// ============================================================================

/// Styles part with a `Normal` paragraph style
pub const DEFAULT_WORD_STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/></w:style></w:styles>"#;

/// Wrap body content in a `w:document`
pub fn word_document(body: &str) -> String {
    format!(
        r#"{DECLARATION}
<w:document xmlns:w="{W_NS}" xmlns:r="{R_NS}"><w:body>{body}<w:sectPr/></w:body></w:document>"#
    )
}

/// Create a .docx whose body is `body`
pub fn create_docx(body: &str) -> Vec<u8> {
    create_docx_with_styles(body, DEFAULT_WORD_STYLES)
}

/// Create a .docx with its own styles part
pub fn create_docx_with_styles(body: &str, styles: &str) -> Vec<u8> {
    let content_types = content_types(&[
        (
            "word/document.xml".into(),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml",
        ),
        (
            "word/styles.xml".into(),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml",
        ),
        (
            "docProps/core.xml".into(),
            "application/vnd.openxmlformats-package.core-properties+xml",
        ),
    ]);
    let document_rels = relationships(&[("rId1".into(), "styles", "styles.xml".into())]);
    let core = format!(
        r#"{DECLARATION}
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>Fixture</dc:title><dc:creator>Tests</dc:creator></cp:coreProperties>"#
    );
    create_zip(&[
        ("[Content_Types].xml", content_types.as_str()),
        ("_rels/.rels", root_rels("word/document.xml").as_str()),
        ("word/_rels/document.xml.rels", document_rels.as_str()),
        ("word/document.xml", word_document(body).as_str()),
        ("word/styles.xml", styles),
        ("docProps/core.xml", core.as_str()),
    ])
}

// ============================================================================
// Excel
// ============================================================================

/// A worksheet of a fixture workbook
#[derive(Debug, Clone, Copy)]
pub struct SheetFixture<'a> {
    /// Tab name
    pub name: &'a str,
    /// Content of `sheetData`
    pub rows: &'a str,
    /// Markup after `sheetData` (`mergeCells` and the like)
    pub after: &'a str,
    /// Markup in front of `sheetData` (`cols`)
    pub before: &'a str,
    /// Whether the sheet is hidden
    pub hidden: bool,
}

impl<'a> SheetFixture<'a> {
    /// A visible sheet with the given rows
    pub fn new(name: &'a str, rows: &'a str) -> Self {
        Self {
            name,
            rows,
            after: "",
            before: "",
            hidden: false,
        }
    }
}

/// Create a one-sheet .xlsx with a shared string table
pub fn create_xlsx(strings: &[&str], rows: &str) -> Vec<u8> {
    create_xlsx_sheets(strings, &[SheetFixture::new("Sheet1", rows)])
}

/// Create an .xlsx with several sheets sharing one string table
pub fn create_xlsx_sheets(strings: &[&str], sheets: &[SheetFixture<'_>]) -> Vec<u8> {
    let mut overrides = vec![(
        "xl/workbook.xml".to_string(),
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml",
    )];
    let mut workbook_rels = Vec::new();
    let mut sheet_list = String::new();
    let mut sheet_parts = Vec::new();
    for (i, sheet) in sheets.iter().enumerate() {
        let n = i + 1;
        overrides.push((
            format!("xl/worksheets/sheet{n}.xml"),
            "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml",
        ));
        workbook_rels.push((format!("rId{n}"), "worksheet", format!("worksheets/sheet{n}.xml")));
        let state = if sheet.hidden { r#" state="hidden""# } else { "" };
        sheet_list.push_str(&format!(
            r#"<sheet name="{}" sheetId="{n}"{state} r:id="rId{n}"/>"#,
            sheet.name
        ));
        sheet_parts.push((
            format!("xl/worksheets/sheet{n}.xml"),
            format!(
                r#"{DECLARATION}
<worksheet xmlns="{S_NS}" xmlns:r="{R_NS}">{}<sheetData>{}</sheetData>{}</worksheet>"#,
                sheet.before, sheet.rows, sheet.after
            ),
        ));
    }
    let strings_id = format!("rId{}", sheets.len() + 1);
    workbook_rels.push((strings_id, "sharedStrings", "sharedStrings.xml".into()));
    overrides.push((
        "xl/sharedStrings.xml".into(),
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml",
    ));

    let workbook = format!(
        r#"{DECLARATION}
<workbook xmlns="{S_NS}" xmlns:r="{R_NS}"><sheets>{sheet_list}</sheets></workbook>"#
    );
    let mut shared = format!(
        r#"{DECLARATION}
<sst xmlns="{S_NS}" count="{0}" uniqueCount="{0}">"#,
        strings.len()
    );
    for s in strings {
        shared.push_str(&format!("<si><t>{s}</t></si>"));
    }
    shared.push_str("</sst>");

    let content_types = content_types(&overrides);
    let rels = relationships(&workbook_rels);
    let root = root_rels("xl/workbook.xml");
    let mut files: Vec<(&str, &str)> = vec![
        ("[Content_Types].xml", content_types.as_str()),
        ("_rels/.rels", root.as_str()),
        ("xl/workbook.xml", workbook.as_str()),
        ("xl/_rels/workbook.xml.rels", rels.as_str()),
    ];
    for (name, xml) in &sheet_parts {
        files.push((name.as_str(), xml.as_str()));
    }
    files.push(("xl/sharedStrings.xml", shared.as_str()));
    create_zip(&files)
}

// ============================================================================
// PowerPoint
// ============================================================================

/// A slide with a title placeholder holding `text`
pub fn slide_xml(text: &str) -> String {
    format!(
        r#"{DECLARATION}
<p:sld xmlns:a="{A_NS}" xmlns:r="{R_NS}" xmlns:p="{P_NS}"><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/><p:sp><p:nvSpPr><p:cNvPr id="2" name="Title 1"/><p:cNvSpPr/><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:lstStyle/><a:p><a:r><a:rPr lang="en-US"/><a:t>{text}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#
    )
}

/// Create a .pptx with one titled slide per entry of `titles`
pub fn create_pptx(titles: &[&str]) -> Vec<u8> {
    let slides: Vec<String> = titles.iter().map(|t| slide_xml(t)).collect();
    create_pptx_slides(&slides)
}

/// Create a .pptx from complete slide parts
pub fn create_pptx_slides(slides: &[String]) -> Vec<u8> {
    let mut overrides = vec![
        (
            "ppt/presentation.xml".to_string(),
            "application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml",
        ),
        (
            "ppt/slideMasters/slideMaster1.xml".into(),
            "application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml",
        ),
        (
            "ppt/slideLayouts/slideLayout1.xml".into(),
            "application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml",
        ),
    ];
    let mut presentation_rels = vec![(
        "rId1".to_string(),
        "slideMaster",
        "slideMasters/slideMaster1.xml".to_string(),
    )];
    let mut slide_ids = String::new();
    for n in 1..=slides.len() {
        overrides.push((
            format!("ppt/slides/slide{n}.xml"),
            "application/vnd.openxmlformats-officedocument.presentationml.slide+xml",
        ));
        presentation_rels.push((format!("rId{}", n + 1), "slide", format!("slides/slide{n}.xml")));
        slide_ids.push_str(&format!(r#"<p:sldId id="{}" r:id="rId{}"/>"#, 255 + n, n + 1));
    }

    let presentation = format!(
        r#"{DECLARATION}
<p:presentation xmlns:a="{A_NS}" xmlns:r="{R_NS}" xmlns:p="{P_NS}"><p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst><p:sldIdLst>{slide_ids}</p:sldIdLst></p:presentation>"#
    );
    let master = format!(
        r#"{DECLARATION}
<p:sldMaster xmlns:a="{A_NS}" xmlns:r="{R_NS}" xmlns:p="{P_NS}"><p:cSld><p:spTree/></p:cSld><p:txStyles><p:titleStyle><a:lvl1pPr><a:defRPr sz="4400"/></a:lvl1pPr></p:titleStyle><p:bodyStyle><a:lvl1pPr><a:defRPr sz="2800"/></a:lvl1pPr></p:bodyStyle></p:txStyles></p:sldMaster>"#
    );
    let layout = format!(
        r#"{DECLARATION}
<p:sldLayout xmlns:a="{A_NS}" xmlns:r="{R_NS}" xmlns:p="{P_NS}"><p:cSld><p:spTree/></p:cSld></p:sldLayout>"#
    );
    let layout_rels = relationships(&[(
        "rId1".into(),
        "slideMaster",
        "../slideMasters/slideMaster1.xml".into(),
    )]);
    let master_rels = relationships(&[(
        "rId1".into(),
        "slideLayout",
        "../slideLayouts/slideLayout1.xml".into(),
    )]);
    let slide_rels = relationships(&[(
        "rId1".into(),
        "slideLayout",
        "../slideLayouts/slideLayout1.xml".into(),
    )]);

    let content_types = content_types(&overrides);
    let root = root_rels("ppt/presentation.xml");
    let rels = relationships(&presentation_rels);
    let slide_names: Vec<(String, String)> = (1..=slides.len())
        .map(|n| {
            (
                format!("ppt/slides/slide{n}.xml"),
                format!("ppt/slides/_rels/slide{n}.xml.rels"),
            )
        })
        .collect();

    let mut files: Vec<(&str, &str)> = vec![
        ("[Content_Types].xml", content_types.as_str()),
        ("_rels/.rels", root.as_str()),
        ("ppt/presentation.xml", presentation.as_str()),
        ("ppt/_rels/presentation.xml.rels", rels.as_str()),
        ("ppt/slideMasters/slideMaster1.xml", master.as_str()),
        ("ppt/slideMasters/_rels/slideMaster1.xml.rels", master_rels.as_str()),
        ("ppt/slideLayouts/slideLayout1.xml", layout.as_str()),
        ("ppt/slideLayouts/_rels/slideLayout1.xml.rels", layout_rels.as_str()),
    ];
    for ((part, rels_part), xml) in slide_names.iter().zip(slides) {
        files.push((part.as_str(), xml.as_str()));
        files.push((rels_part.as_str(), slide_rels.as_str()));
    }
    create_zip(&files)
}
