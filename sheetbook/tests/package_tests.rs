use chrono::NaiveDate;
use sheetbook::model::{Panes, ViewType};
use sheetbook::{CellValue, Error, ProtectionOptions, Source, Visibility, Workbook};
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use zip::ZipArchive;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

const CT_RELS: &str = "application/vnd.openxmlformats-package.relationships+xml";
const CT_WORKBOOK: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";
const CT_MACRO_WORKBOOK: &str = "application/vnd.ms-excel.sheet.macroEnabled.main+xml";
const CT_WORKSHEET: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
const CT_CHARTSHEET: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.chartsheet+xml";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

// 2x1 PNG: signature, IHDR length and type, width, height
fn png(width: u32, height: u32) -> Vec<u8> {
    let mut data = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];
    data.extend_from_slice(b"IHDR");
    data.extend_from_slice(&width.to_be_bytes());
    data.extend_from_slice(&height.to_be_bytes());
    data.extend_from_slice(&[8, 6, 0, 0, 0]);
    data
}

fn parts(bytes: &[u8]) -> anyhow::Result<BTreeMap<String, Vec<u8>>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut out = BTreeMap::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        out.insert(file.name().to_string(), data);
    }
    Ok(out)
}

fn part_text(bytes: &[u8], name: &str) -> anyhow::Result<String> {
    let parts = parts(bytes)?;
    let data = parts
        .get(name)
        .ok_or_else(|| anyhow::anyhow!("missing part {}", name))?;
    Ok(String::from_utf8(data.clone())?)
}

/// A package written by another producer: a worksheet and a chart sheet,
/// document properties, a calculation chain and a VBA project
fn mock_package() -> anyhow::Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    zip.start_file("[Content_Types].xml", options)?;
    write!(
        zip,
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="{CT_RELS}"/>
<Default Extension="xml" ContentType="application/xml"/>
<Default Extension="bin" ContentType="application/vnd.ms-office.vbaProject"/>
<Override PartName="/xl/workbook.xml" ContentType="{CT_MACRO_WORKBOOK}"/>
<Override PartName="/xl/chartsheets/sheet1.xml" ContentType="{CT_CHARTSHEET}"/>
<Override PartName="/xl/worksheets/sheet1.xml" ContentType="{CT_WORKSHEET}"/>
<Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>
</Types>"#
    )?;

    zip.start_file("_rels/.rels", options)?;
    write!(
        zip,
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="{REL_NS}/officeDocument" Target="xl/workbook.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
</Relationships>"#
    )?;

    zip.start_file("docProps/core.xml", options)?;
    zip.write_all(br#"<cp:coreProperties xmlns:cp="urn:cp"><dc:creator xmlns:dc="urn:dc">someone</dc:creator></cp:coreProperties>"#)?;

    zip.start_file("xl/workbook.xml", options)?;
    write!(
        zip,
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="{REL_NS}">
<fileVersion appName="xl" lastEdited="7"/>
<bookViews><workbookView activeTab="1"/></bookViews>
<sheets>
<sheet name="Chart" sheetId="3" r:id="rId1"/>
<sheet name="Data" sheetId="5" r:id="rId2"/>
</sheets>
<definedNames>
<definedName name="OnChart" localSheetId="0">Data!$A$1</definedName>
<definedName name="Local" localSheetId="1">Data!$A$1:$A$2</definedName>
</definedNames>
<calcPr calcId="100000"/>
</workbook>"#
    )?;

    zip.start_file("xl/_rels/workbook.xml.rels", options)?;
    write!(
        zip,
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="{REL_NS}/chartsheet" Target="chartsheets/sheet1.xml"/>
<Relationship Id="rId2" Type="{REL_NS}/worksheet" Target="worksheets/sheet1.xml"/>
<Relationship Id="rId3" Type="{REL_NS}/calcChain" Target="calcChain.xml"/>
<Relationship Id="rId4" Type="http://schemas.microsoft.com/office/2006/relationships/vbaProject" Target="vbaProject.bin"/>
</Relationships>"#
    )?;

    zip.start_file("xl/chartsheets/sheet1.xml", options)?;
    zip.write_all(b"<chartsheet/>")?;
    zip.start_file("xl/calcChain.xml", options)?;
    zip.write_all(br#"<calcChain><c r="A3" i="2"/></calcChain>"#)?;
    zip.start_file("xl/vbaProject.bin", options)?;
    zip.write_all(&[0xD0, 0xCF, 0x11, 0xE0, 1, 2, 3])?;

    zip.start_file("xl/worksheets/sheet1.xml", options)?;
    zip.write_all(
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<sheetData>
<row r="1"><c r="A1"><v>2</v></c><c r="B1" t="inlineStr"><is><t>two</t></is></c></row>
<row r="2"><c r="A2"><v>3</v></c></row>
<row r="3"><c r="A3"><f>SUM(A1:A2)</f><v>5</v></c></row>
</sheetData>
<phoneticPr fontId="1" type="noConversion"/>
<pageMargins left="0.5" right="0.5" top="1" bottom="1" header="0.3" footer="0.3"/>
</worksheet>"#,
    )?;

    Ok(zip.finish()?.into_inner())
}

#[test]
fn test_foreign_package_keeps_unmanaged_content() -> anyhow::Result<()> {
    let book = Workbook::load_from_bytes(mock_package()?)?;
    assert_eq!(book.worksheet_names(), ["Data"]);
    assert_eq!(book.active_worksheet(), 0);
    let names: Vec<_> = book.defined_names().iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, ["Local"]);
    assert_eq!(book.defined_names()[0].local_sheet, Some(0));

    let sheet = book.worksheet("Data")?;
    assert_eq!(sheet.value("A3")?, &CellValue::Number(5.0));
    assert_eq!(sheet.formula("A3")?.as_deref(), Some("=SUM(A1:A2)"));
    assert_eq!(sheet.value("B1")?, &CellValue::text("two"));

    let bytes = book.to_bytes()?;
    let saved = parts(&bytes)?;
    assert!(saved.contains_key("docProps/core.xml"));
    assert_eq!(saved["xl/vbaProject.bin"], [0xD0, 0xCF, 0x11, 0xE0, 1, 2, 3]);
    assert!(!saved.contains_key("xl/calcChain.xml"));
    assert!(!saved.contains_key("xl/chartsheets/sheet1.xml"));

    let types = part_text(&bytes, "[Content_Types].xml")?;
    assert!(types.contains(CT_MACRO_WORKBOOK));
    assert!(!types.contains(CT_CHARTSHEET));
    assert!(types.contains(r#"Extension="bin""#));

    let root_rels = part_text(&bytes, "_rels/.rels")?;
    assert!(root_rels.contains(r#"Target="/docProps/core.xml""#));
    let workbook_rels = part_text(&bytes, "xl/_rels/workbook.xml.rels")?;
    assert!(workbook_rels.contains(r#"Target="/xl/vbaProject.bin""#));
    assert!(!workbook_rels.contains("calcChain"));

    let workbook = part_text(&bytes, "xl/workbook.xml")?;
    assert!(workbook.contains(r#"<fileVersion appName="xl" lastEdited="7"/>"#));
    assert!(workbook.contains(r#"sheetId="5""#));

    let worksheet = part_text(&bytes, "xl/worksheets/sheet1.xml")?;
    let phonetic = worksheet.find("<phoneticPr").expect("phoneticPr kept");
    let margins = worksheet.find("<pageMargins").expect("pageMargins kept");
    assert!(phonetic < margins);

    let again = Workbook::load_from_bytes(bytes)?;
    assert_eq!(again.worksheet(0)?.value("A1")?, &CellValue::Number(2.0));
    Ok(())
}

#[test]
fn test_truncated_package_is_corrupt() -> anyhow::Result<()> {
    let mut bytes = mock_package()?;
    bytes.truncate(bytes.len() / 2);
    let err = Workbook::load_from_bytes(bytes).unwrap_err();
    assert!(matches!(err, Error::CorruptPackage(_)));
    Ok(())
}

#[test]
fn test_annotations_round_trip() -> anyhow::Result<()> {
    let at = NaiveDate::from_ymd_opt(2024, 3, 1)
        .and_then(|d| d.and_hms_opt(9, 30, 0))
        .expect("valid timestamp");
    let mut book = Workbook::new();
    {
        let mut sheet = book.worksheet_mut(0)?;
        sheet.set_value("A1", 1)?;
        sheet.add_note("A1", "check this", "Ana")?;
        sheet.add_comment_at("C4", "Bo", "Why 4?", at)?;
        sheet.reply_at("C4", "Ana", "Because", at)?;
        sheet.set_comment_resolved("C4", true)?;
    }
    let bytes = book.to_bytes()?;
    let saved = parts(&bytes)?;
    for part in [
        "xl/comments1.xml",
        "xl/drawings/vmlDrawing1.vml",
        "xl/threadedComments/threadedComment1.xml",
        "xl/persons/person.xml",
    ] {
        assert!(saved.contains_key(part), "{} missing", part);
    }
    let worksheet = part_text(&bytes, "xl/worksheets/sheet1.xml")?;
    assert!(worksheet.contains("<legacyDrawing"));

    let loaded = Workbook::load_from_bytes(bytes)?;
    let sheet = loaded.worksheet(0)?;
    let note = sheet.annotation("A1")?.and_then(|a| a.as_note()).expect("note");
    assert_eq!(note.author, "Ana");
    assert_eq!(note.text.plain_text(), "check this");

    let thread = sheet.annotation("C4")?.and_then(|a| a.as_comment()).expect("thread");
    assert!(thread.resolved);
    assert_eq!(thread.root().author, "Bo");
    assert_eq!(thread.root().timestamp, at);
    assert_eq!(thread.replies().len(), 1);
    assert_eq!(thread.replies()[0].text, "Because");
    assert_eq!(
        thread.root().id,
        book.worksheet(0)?.annotation("C4")?.and_then(|a| a.as_comment()).expect("thread").root().id
    );
    Ok(())
}

#[test]
fn test_tables_links_and_merges_round_trip() -> anyhow::Result<()> {
    let mut book = Workbook::new();
    {
        let mut sheet = book.worksheet_mut(0)?;
        sheet.set_value("A1", "Name")?;
        sheet.set_value("B1", "Score")?;
        sheet.set_value("A2", "x")?;
        sheet.set_value("B2", 3)?;
        sheet.add_named_table("A1:B2", "Scores", None)?;
        sheet.add_hyperlink("D1", "https://example.com/docs")?;
        sheet.add_hyperlink("D2", "Sheet1!A1")?;
        sheet.merge_cells("F1:G2")?;
    }
    book.add_worksheet(Some("Other"))?;
    book.worksheet_mut("Other")?.set_value("A1", "k")?;
    book.worksheet_mut("Other")?.set_value("A2", 1)?;
    book.worksheet_mut("Other")?.add_table("A1:A2", None)?;

    let bytes = book.to_bytes()?;
    let saved = parts(&bytes)?;
    assert!(saved.contains_key("xl/tables/table1.xml"));
    assert!(saved.contains_key("xl/tables/table2.xml"));
    let rels = part_text(&bytes, "xl/worksheets/_rels/sheet1.xml.rels")?;
    assert!(rels.contains(r#"Target="https://example.com/docs" TargetMode="External""#));

    let loaded = Workbook::load_from_bytes(bytes)?;
    let sheet = loaded.worksheet(0)?;
    let table = sheet.table("Scores").expect("table");
    assert_eq!(table.range.to_string(), "A1:B2");
    assert_eq!(table.columns.len(), 2);
    assert_eq!(table.columns[1].name, "Score");
    assert!(loaded.worksheet("Other")?.tables().len() == 1);

    assert_eq!(sheet.hyperlinks().len(), 2);
    let web = sheet.hyperlink_at("D1")?.expect("link");
    assert_eq!(web.target, sheetbook::HyperlinkTarget::Url("https://example.com/docs".to_string()));
    let local = sheet.hyperlink_at("D2")?.expect("link");
    assert_eq!(local.target, sheetbook::HyperlinkTarget::Location("Sheet1!A1".to_string()));
    assert_eq!(sheet.merged_ranges().len(), 1);
    assert_eq!(sheet.merged_ranges()[0].to_string(), "F1:G2");
    Ok(())
}

#[test]
fn test_identical_pictures_share_one_media_part() -> anyhow::Result<()> {
    let mut book = Workbook::new();
    book.worksheet_mut(0)?.add_picture(png(2, 1), "B2")?;
    book.worksheet_mut(0)?.add_picture(png(2, 1), "E5")?;
    book.add_worksheet(None)?;
    book.worksheet_mut(1)?.add_picture(png(2, 1), "A1")?;

    let bytes = book.to_bytes()?;
    let saved = parts(&bytes)?;
    let media: Vec<_> = saved.keys().filter(|k| k.starts_with("xl/media/")).collect();
    assert_eq!(media, ["xl/media/image1.png"]);
    assert!(saved.contains_key("xl/drawings/drawing1.xml"));
    assert!(saved.contains_key("xl/drawings/drawing2.xml"));
    assert!(part_text(&bytes, "[Content_Types].xml")?.contains(r#"Extension="png" ContentType="image/png""#));

    let loaded = Workbook::load_from_bytes(bytes)?;
    let pictures = loaded.worksheet(0)?.pictures();
    assert_eq!(pictures.len(), 2);
    assert_eq!((pictures[0].width, pictures[0].height), (2, 1));
    assert_eq!(pictures[1].placement.from().cell.row, 4);
    assert_eq!(loaded.worksheet(1)?.pictures().len(), 1);
    Ok(())
}

#[test]
fn test_protection_view_and_visibility_round_trip() -> anyhow::Result<()> {
    let mut book = Workbook::new();
    book.add_worksheet(Some("Hidden"))?;
    {
        let mut sheet = book.worksheet_mut(0)?;
        let options = ProtectionOptions {
            format_cells: true,
            sort: true,
            ..ProtectionOptions::default()
        };
        sheet.protect(options, Some("secret"))?;
        let view = sheet.view_mut();
        view.freeze_panes(1, 2)?;
        view.set_zoom(150)?;
        view.view_type = ViewType::PageBreakPreview;
        view.show_gridlines = false;
    }
    book.worksheet_mut("Hidden")?.set_visibility(Visibility::Hidden)?;

    let loaded = Workbook::load_from_bytes(book.to_bytes()?)?;
    let sheet = loaded.worksheet(0)?;
    let protection = sheet.protection().expect("protected");
    assert!(protection.accepts(Some("secret")));
    assert!(!protection.accepts(Some("guess")));
    assert!(protection.options.format_cells);
    assert!(protection.options.sort);
    assert!(!protection.options.delete_rows);

    let view = sheet.view();
    assert_eq!(view.panes, Panes::Frozen { rows: 1, columns: 2 });
    assert_eq!(view.zoom(), 150);
    assert_eq!(view.view_type, ViewType::PageBreakPreview);
    assert!(!view.show_gridlines);
    assert_eq!(loaded.worksheet("Hidden")?.visibility(), Visibility::Hidden);
    Ok(())
}

#[test]
fn test_saving_unchanged_workbook_is_deterministic() -> anyhow::Result<()> {
    let at = NaiveDate::from_ymd_opt(2023, 12, 31)
        .and_then(|d| d.and_hms_opt(23, 0, 0))
        .expect("valid timestamp");
    let mut book = Workbook::new();
    {
        let mut sheet = book.worksheet_mut(0)?;
        sheet.set_value("A1", "alpha")?;
        sheet.set_value("A2", 2.5)?;
        sheet.set_formula("A3", "A2*2")?;
        sheet.add_comment_at("B1", "Cy", "note", at)?;
        sheet.add_picture(png(4, 4), "D4")?;
    }
    book.calculate_formulas()?;
    let first = book.to_bytes()?;
    assert_eq!(first, book.to_bytes()?);

    let reloaded = Workbook::load_from_bytes(first.clone())?;
    assert_eq!(parts(&reloaded.to_bytes()?)?.keys().collect::<Vec<_>>(), parts(&first)?.keys().collect::<Vec<_>>());
    Ok(())
}

#[test]
fn test_reloading_a_new_workbook_reaches_a_fixed_point() -> anyhow::Result<()> {
    let first = Workbook::load_from_bytes(Workbook::new().to_bytes()?)?.to_bytes()?;
    let second = Workbook::load_from_bytes(first.clone())?.to_bytes()?;
    assert_eq!(first, second);
    assert!(part_text(&first, "[Content_Types].xml")?.contains(CT_WORKBOOK));
    Ok(())
}

#[test]
fn test_uncalculated_formulas_request_full_calculation() -> anyhow::Result<()> {
    let mut book = Workbook::new();
    book.worksheet_mut(0)?.set_formula("A1", "1+1")?;
    let workbook = part_text(&book.to_bytes()?, "xl/workbook.xml")?;
    assert!(workbook.contains(r#"fullCalcOnLoad="1""#));

    book.calculate_formulas()?;
    let bytes = book.to_bytes()?;
    assert!(!part_text(&bytes, "xl/workbook.xml")?.contains("fullCalcOnLoad"));
    let loaded = Workbook::load_from_bytes(bytes)?;
    assert_eq!(loaded.worksheet(0)?.value("A1")?, &CellValue::Number(2.0));
    Ok(())
}

#[test]
fn test_renamed_and_removed_sheets_survive_reload() -> anyhow::Result<()> {
    let mut book = Workbook::new();
    book.add_worksheet(Some("Rates"))?;
    book.add_worksheet(Some("Scratch"))?;
    book.worksheet_mut("Rates")?.set_value("A1", 0.2)?;
    book.worksheet_mut("Scratch")?.set_value("A1", 9)?;
    {
        let mut sheet = book.worksheet_mut(0)?;
        sheet.set_formula("A1", "Rates!A1*100")?;
        sheet.set_formula("A2", "Scratch!A1")?;
    }
    book.rename_worksheet("Rates", "Tax Rates")?;
    book.remove_worksheet("Scratch")?;
    book.calculate_formulas()?;

    let loaded = Workbook::load_from_bytes(book.to_bytes()?)?;
    assert_eq!(loaded.worksheet_names(), ["Sheet1", "Tax Rates"]);
    let sheet = loaded.worksheet(0)?;
    assert_eq!(sheet.formula("A1")?.as_deref(), Some("='Tax Rates'!A1*100"));
    assert_eq!(sheet.value("A1")?, &CellValue::Number(20.0));
    assert_eq!(sheet.formula("A2")?.as_deref(), Some("=#REF!"));
    Ok(())
}

#[test]
fn test_save_and_load_through_files() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("book.xlsx");

    let mut book = Workbook::new();
    book.worksheet_mut(0)?.set_value("A1", "on disk")?;
    book.save_as(&path)?;

    let mut loaded = Workbook::load(&path)?;
    assert_eq!(loaded.path(), Some(path.as_path()));
    loaded.worksheet_mut(0)?.set_value("A2", 7)?;
    loaded.save()?;

    let again = Workbook::load_source(Source::Path(path.clone()), Default::default())?;
    assert_eq!(again.worksheet(0)?.value("A1")?, &CellValue::text("on disk"));
    assert_eq!(again.worksheet(0)?.value("A2")?, &CellValue::Number(7.0));

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())?.collect::<Result<_, _>>()?;
    assert_eq!(leftovers.len(), 1);
    Ok(())
}

#[test]
fn test_unreachable_url_is_unavailable() {
    let err = Workbook::load_url("http://127.0.0.1:9/missing.xlsx").unwrap_err();
    assert!(matches!(err, Error::SourceUnavailable(_)));
}
