use chrono::NaiveDate;
use sheetbook::{CellValue, EngineConfig, ErrorValue, HyperlinkTarget, ImportOptions, Workbook};
use std::io::{Cursor, Read};
use zip::ZipArchive;

fn reload(book: &Workbook) -> anyhow::Result<Workbook> {
    Ok(Workbook::load_from_bytes(book.to_bytes()?)?)
}

fn styles_xml(book: &Workbook) -> anyhow::Result<String> {
    let mut archive = ZipArchive::new(Cursor::new(book.to_bytes()?))?;
    let mut xml = String::new();
    archive.by_name("xl/styles.xml")?.read_to_string(&mut xml)?;
    Ok(xml)
}

#[test]
fn test_styles_and_dates_round_trip() -> anyhow::Result<()> {
    let day = NaiveDate::from_ymd_opt(2024, 2, 29)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("valid date");
    let mut book = Workbook::new();
    {
        let mut sheet = book.worksheet_mut(0)?;
        sheet.set_value("A1", day)?;
        sheet.set_value("B1", "bold")?;
        sheet.update_style("B1", |s| {
            s.font.bold = true;
            s.number_format = "0.0%".to_string();
        })?;
        sheet.set_value("B2", 0.5)?;
        sheet.update_style("B2", |s| {
            s.font.bold = true;
            s.number_format = "0.0%".to_string();
        })?;
    }
    let loaded = reload(&book)?;
    let sheet = loaded.worksheet(0)?;
    assert_eq!(sheet.value("A1")?, &CellValue::DateTime(day));
    assert_eq!(loaded.display_text(0, "A1")?, "2024-02-29");
    assert!(loaded.cell_style(0, "B1")?.font.bold);
    assert_eq!(sheet.style_id("B1")?, sheet.style_id("B2")?);
    assert_eq!(loaded.display_text(0, "B2")?, "50.0%");

    let xml = styles_xml(&loaded)?;
    assert_eq!(xml.matches(r#"formatCode="0.0%""#).count(), 1);
    Ok(())
}

#[test]
fn test_1904_date_system_survives_save() -> anyhow::Result<()> {
    let config = EngineConfig {
        date1904: true,
        ..EngineConfig::default()
    };
    let day = NaiveDate::from_ymd_opt(1910, 5, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("valid date");
    let mut book = Workbook::with_config(config)?;
    book.worksheet_mut(0)?.set_value("A1", day)?;
    let loaded = reload(&book)?;
    assert!(loaded.date1904());
    assert_eq!(loaded.worksheet(0)?.value("A1")?, &CellValue::DateTime(day));
    Ok(())
}

#[test]
fn test_imported_csv_feeds_formulas() -> anyhow::Result<()> {
    let csv = "item,qty\napples,3\npears,4\n";
    let mut book = Workbook::new();
    {
        let mut sheet = book.worksheet_mut(0)?;
        let range = sheet
            .import_csv(csv.as_bytes(), &ImportOptions::at("B2")?)?
            .expect("rows imported");
        assert_eq!(range.to_string(), "B2:C4");
        sheet.set_formula("C5", "SUM(C3:C4)")?;
    }
    book.calculate_formulas()?;
    let loaded = reload(&book)?;
    let sheet = loaded.worksheet(0)?;
    assert_eq!(sheet.value("B2")?, &CellValue::text("item"));
    assert_eq!(sheet.value("C5")?, &CellValue::Number(7.0));
    Ok(())
}

#[test]
fn test_inserted_rows_shift_content_before_save() -> anyhow::Result<()> {
    let mut book = Workbook::new();
    {
        let mut sheet = book.worksheet_mut(0)?;
        sheet.set_value("A1", 1)?;
        sheet.set_value("A2", 2)?;
        sheet.set_formula("B1", "A1+A2")?;
        sheet.merge_cells("C2:D2")?;
        sheet.insert_rows(1, 2)?;
    }
    book.calculate_formulas()?;
    let loaded = reload(&book)?;
    let sheet = loaded.worksheet(0)?;
    assert_eq!(sheet.value("A4")?, &CellValue::Number(2.0));
    assert_eq!(sheet.formula("B1")?.as_deref(), Some("=A1+A4"));
    assert_eq!(sheet.value("B1")?, &CellValue::Number(3.0));
    assert_eq!(sheet.merged_ranges()[0].to_string(), "C4:D4");
    Ok(())
}

#[test]
fn test_copied_and_moved_sheets_keep_order() -> anyhow::Result<()> {
    let mut book = Workbook::new();
    book.worksheet_mut(0)?.set_value("A1", "original")?;
    let copy = book.copy_worksheet(0, Some("Copy"))?;
    book.move_worksheet(copy, 0)?;
    book.set_active_worksheet("Sheet1")?;

    let loaded = reload(&book)?;
    assert_eq!(loaded.worksheet_names(), ["Copy", "Sheet1"]);
    assert_eq!(loaded.active_worksheet(), 1);
    assert_eq!(loaded.worksheet("Copy")?.value("A1")?, &CellValue::text("original"));
    Ok(())
}

#[test]
fn test_non_ascii_names_and_targets_round_trip() -> anyhow::Result<()> {
    let mut book = Workbook::new();
    let data = book.add_worksheet(Some("Données"))?;
    {
        let mut sheet = book.worksheet_mut(data)?;
        sheet.set_value("A2", "résumé")?;
        sheet.add_hyperlink("B1", "報告書.xlsx")?;
        sheet.set_formula("C1", "=Sheet1!abcdé")?;
    }
    {
        let mut sheet = book.worksheet_mut(0)?;
        sheet.set_formula("A1", "=DONNÉES!A2")?;
        sheet.set_formula("A2", "=ROUND(1.5,1E10)")?;
        sheet.set_formula("A3", "=POWER(10,400)")?;
    }
    book.worksheet_mut("données")?.insert_rows(0, 1)?;
    book.calculate_formulas()?;

    let loaded = reload(&book)?;
    assert_eq!(loaded.worksheet_names(), ["Sheet1", "Données"]);
    let first = loaded.worksheet(0)?;
    assert_eq!(first.formula("A1")?.as_deref(), Some("=DONNÉES!A3"));
    assert_eq!(first.value("A1")?.as_text().as_deref(), Some("résumé"));
    assert_eq!(first.value("A2")?, &CellValue::Number(1.5));
    assert_eq!(first.value("A3")?, &CellValue::Error(ErrorValue::Num));

    let data = loaded.worksheet("DONNÉES")?;
    assert_eq!(data.value("C2")?, &CellValue::Error(ErrorValue::Name));
    assert_eq!(
        data.hyperlink_at("B2")?.map(|h| h.target.clone()),
        Some(HyperlinkTarget::File("報告書.xlsx".into()))
    );
    Ok(())
}
