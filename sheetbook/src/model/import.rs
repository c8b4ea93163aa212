//! Bulk import of external data into a worksheet
//!
//! Every source is first shaped into a grid of values, then written from the
//! destination anchor in one batch so dependents are invalidated once.

use super::sheet_mut::WorksheetMut;
use super::value::CellValue;
use crate::address::{CellAddress, CellRange, IntoAddress, MAX_COLS, MAX_ROWS};
use crate::error::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::io::Read;

/// Where and how imported data lands
#[derive(Debug, Clone, PartialEq)]
pub struct ImportOptions {
    /// Top-left cell of the imported block
    pub destination: CellAddress,
    /// Lay sequences out down a column; `false` transposes every source
    pub vertical: bool,
    /// Write field or column names as a header line
    pub show_headers: bool,
    /// Subset and order of record fields or table columns to import
    pub columns: Option<Vec<String>>,
    /// Field separator of delimited text
    pub delimiter: u8,
    /// Turn delimited fields into numbers, booleans and dates where they parse
    pub infer_types: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            destination: CellAddress::new(0, 0),
            vertical: true,
            show_headers: true,
            columns: None,
            delimiter: b',',
            infer_types: true,
        }
    }
}

impl ImportOptions {
    pub fn at(destination: impl IntoAddress) -> Result<Self> {
        Ok(Self {
            destination: destination.into_address()?,
            ..Self::default()
        })
    }

    pub fn horizontal(mut self) -> Self {
        self.vertical = false;
        self
    }

    pub fn without_headers(mut self) -> Self {
        self.show_headers = false;
        self
    }

    pub fn with_columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

/// Named columns of values
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl DataTable {
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row<V: Into<CellValue>>(&mut self, row: impl IntoIterator<Item = V>) {
        self.rows.push(row.into_iter().map(Into::into).collect());
    }
}

/// A source accepted by [`WorksheetMut::import_data`]
#[derive(Debug, Clone, PartialEq)]
pub enum ImportData {
    /// One value per cell along a line
    Values(Vec<CellValue>),
    /// Rows of values
    Grid(Vec<Vec<CellValue>>),
    /// Serialized records; object fields become columns
    Records(Vec<serde_json::Value>),
    Table(DataTable),
    /// Delimited text such as CSV
    Delimited(String),
}

impl ImportData {
    pub fn values<V: Into<CellValue>>(values: impl IntoIterator<Item = V>) -> Self {
        ImportData::Values(values.into_iter().map(Into::into).collect())
    }

    pub fn grid<R, V>(rows: impl IntoIterator<Item = R>) -> Self
    where
        R: IntoIterator<Item = V>,
        V: Into<CellValue>,
    {
        ImportData::Grid(
            rows.into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
        )
    }

    /// Records of any serde-serializable type
    pub fn records<T: Serialize>(records: &[T]) -> Result<Self> {
        records
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(ImportData::Records)
            .map_err(|e| Error::InvalidState(format!("record does not serialize: {}", e)))
    }

    pub fn delimited(mut reader: impl Read) -> Result<Self> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Ok(ImportData::Delimited(text))
    }
}

fn json_value(value: &serde_json::Value) -> CellValue {
    match value {
        serde_json::Value::Null => CellValue::Empty,
        serde_json::Value::Bool(b) => CellValue::Boolean(*b),
        serde_json::Value::Number(n) => n.as_f64().map_or(CellValue::Empty, CellValue::Number),
        serde_json::Value::String(s) => CellValue::text(s.as_str()),
        other => CellValue::text(other.to_string()),
    }
}

/// Best-effort typing of one delimited field
fn infer_value(field: &str) -> CellValue {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return CellValue::Empty;
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return CellValue::Boolean(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return CellValue::Boolean(false);
    }
    if let Ok(n) = trimmed.parse::<f64>()
        && n.is_finite()
    {
        return CellValue::Number(n);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return CellValue::DateTime(dt);
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.into();
    }
    CellValue::text(field)
}

/// Pick and order columns by name; `None` keeps them all
fn select_columns(headers: &[String], wanted: Option<&[String]>) -> Result<Vec<usize>> {
    let Some(wanted) = wanted else {
        return Ok((0..headers.len()).collect());
    };
    wanted
        .iter()
        .map(|name| {
            headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
                .ok_or_else(|| Error::InvalidName(format!("no column named '{}'", name)))
        })
        .collect()
}

fn tabulate(headers: &[String], rows: &[Vec<CellValue>], options: &ImportOptions) -> Result<Vec<Vec<CellValue>>> {
    let picked = select_columns(headers, options.columns.as_deref())?;
    let mut grid = Vec::with_capacity(rows.len() + 1);
    if options.show_headers {
        grid.push(picked.iter().map(|&i| CellValue::text(headers[i].as_str())).collect());
    }
    for row in rows {
        grid.push(
            picked
                .iter()
                .map(|&i| row.get(i).cloned().unwrap_or_default())
                .collect(),
        );
    }
    Ok(grid)
}

fn records_grid(records: &[serde_json::Value], options: &ImportOptions) -> Result<Vec<Vec<CellValue>>> {
    let mut headers: Vec<String> = Vec::new();
    for record in records {
        if let serde_json::Value::Object(fields) = record {
            for key in fields.keys() {
                if !headers.contains(key) {
                    headers.push(key.clone());
                }
            }
        }
    }
    if headers.is_empty() {
        // scalars: one value per line
        let rows: Vec<Vec<CellValue>> = records.iter().map(|r| vec![json_value(r)]).collect();
        return Ok(rows);
    }
    let rows: Vec<Vec<CellValue>> = records
        .iter()
        .map(|record| {
            headers
                .iter()
                .map(|h| record.get(h).map(json_value).unwrap_or_default())
                .collect()
        })
        .collect();
    tabulate(&headers, &rows, options)
}

fn delimited_grid(text: &str, options: &ImportOptions) -> Result<Vec<Vec<CellValue>>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut grid = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| Error::Io(e.into()))?;
        grid.push(
            record
                .iter()
                .map(|field| {
                    if options.infer_types {
                        infer_value(field)
                    } else if field.is_empty() {
                        CellValue::Empty
                    } else {
                        CellValue::text(field)
                    }
                })
                .collect(),
        );
    }
    Ok(grid)
}

fn transpose(grid: Vec<Vec<CellValue>>) -> Vec<Vec<CellValue>> {
    let width = grid.iter().map(Vec::len).max().unwrap_or(0);
    let mut out: Vec<Vec<CellValue>> = vec![Vec::with_capacity(grid.len()); width];
    for row in grid {
        let len = row.len();
        for (c, value) in row.into_iter().enumerate() {
            out[c].push(value);
        }
        for column in out.iter_mut().skip(len) {
            column.push(CellValue::Empty);
        }
    }
    out
}

impl WorksheetMut<'_> {
    /// Write `data` at the destination anchor; returns the covered range,
    /// or `None` when the source was empty
    pub fn import_data(&mut self, data: ImportData, options: &ImportOptions) -> Result<Option<CellRange>> {
        self.book.ensure_open()?;
        let grid = match data {
            ImportData::Values(values) => values.into_iter().map(|v| vec![v]).collect(),
            ImportData::Grid(rows) => rows,
            ImportData::Records(records) => records_grid(&records, options)?,
            ImportData::Table(table) => tabulate(&table.headers, &table.rows, options)?,
            ImportData::Delimited(text) => delimited_grid(&text, options)?,
        };
        let grid = if options.vertical { grid } else { transpose(grid) };
        self.write_grid(grid, options.destination)
    }

    /// Shorthand for importing serde records
    pub fn import_records<T: Serialize>(&mut self, records: &[T], options: &ImportOptions) -> Result<Option<CellRange>> {
        self.import_data(ImportData::records(records)?, options)
    }

    /// Shorthand for importing delimited text from a reader
    pub fn import_csv(&mut self, reader: impl Read, options: &ImportOptions) -> Result<Option<CellRange>> {
        self.import_data(ImportData::delimited(reader)?, options)
    }

    fn write_grid(&mut self, grid: Vec<Vec<CellValue>>, at: CellAddress) -> Result<Option<CellRange>> {
        let height = grid.len() as u64;
        let width = grid.iter().map(Vec::len).max().unwrap_or(0) as u64;
        if height == 0 || width == 0 {
            return Ok(None);
        }
        if at.row as u64 + height > MAX_ROWS as u64 || at.col as u64 + width > MAX_COLS as u64 {
            return Err(Error::out_of_range(format!(
                "{} rows by {} columns do not fit at {}",
                height, width, at
            )));
        }
        let range = CellRange::new(
            at,
            CellAddress::new(at.row + height as u32 - 1, at.col + width as u32 - 1),
        );
        for (r, row) in grid.into_iter().enumerate() {
            for (c, value) in row.into_iter().enumerate() {
                let addr = CellAddress::new(at.row + r as u32, at.col + c as u32);
                self.store_value(addr, value);
            }
        }
        self.book.invalidate_dependents(self.index, [range]);
        log::debug!("imported {} into '{}'", range, self.name);
        Ok(Some(range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Workbook;

    #[derive(Serialize)]
    struct Sale {
        region: String,
        units: u32,
        paid: bool,
    }

    fn sales() -> Vec<Sale> {
        vec![
            Sale {
                region: "North".into(),
                units: 12,
                paid: true,
            },
            Sale {
                region: "South".into(),
                units: 7,
                paid: false,
            },
        ]
    }

    #[test]
    fn test_values_either_orientation() {
        let mut book = Workbook::new();
        let mut ws = book.worksheet_mut(0).unwrap();
        let down = ws
            .import_data(ImportData::values([1, 2, 3]), &ImportOptions::at("B2").unwrap())
            .unwrap();
        assert_eq!(down.unwrap().to_string(), "B2:B4");
        let across = ws
            .import_data(
                ImportData::values(["a", "b"]),
                &ImportOptions::at((9, 0)).unwrap().horizontal(),
            )
            .unwrap();
        assert_eq!(across.unwrap().to_string(), "A10:B10");
        assert_eq!(ws.value("B10").unwrap().as_text().as_deref(), Some("b"));
    }

    #[test]
    fn test_records_with_selected_columns() {
        let mut book = Workbook::new();
        let mut ws = book.worksheet_mut(0).unwrap();
        let options = ImportOptions::default().with_columns(["units", "region"]);
        let range = ws.import_records(&sales(), &options).unwrap().unwrap();
        assert_eq!(range.to_string(), "A1:B3");
        assert_eq!(ws.value("A1").unwrap().as_text().as_deref(), Some("units"));
        assert_eq!(ws.value("A2").unwrap(), &CellValue::Number(12.0));
        assert_eq!(ws.value("B3").unwrap().as_text().as_deref(), Some("South"));

        let bad = ImportOptions::default().with_columns(["missing"]);
        assert!(matches!(ws.import_records(&sales(), &bad), Err(Error::InvalidName(_))));
    }

    #[test]
    fn test_csv_type_inference() {
        let mut book = Workbook::new();
        let mut ws = book.worksheet_mut(0).unwrap();
        let text = "name;qty;when;ok\nbolt;4;2024-03-01;TRUE\nnut;;x;false\n";
        let options = ImportOptions::default().with_delimiter(b';');
        ws.import_csv(text.as_bytes(), &options).unwrap();
        assert_eq!(ws.value("B2").unwrap(), &CellValue::Number(4.0));
        assert!(matches!(ws.value("C2").unwrap(), CellValue::DateTime(_)));
        assert_eq!(ws.style_of("C2").unwrap().number_format, "yyyy-mm-dd");
        assert_eq!(ws.value("D3").unwrap(), &CellValue::Boolean(false));
        assert_eq!(ws.value("B3").unwrap(), &CellValue::Empty);
        assert_eq!(ws.value("C3").unwrap().as_text().as_deref(), Some("x"));
    }

    #[test]
    fn test_import_invalidates_dependents_once() {
        let mut book = Workbook::new();
        let mut ws = book.worksheet_mut(0).unwrap();
        ws.set_formula("D1", "=SUM(A1:A3)").unwrap();
        ws.calculate_formulas().unwrap();
        assert_eq!(ws.value("D1").unwrap(), &CellValue::Number(0.0));
        let mut table = DataTable::new(["n"]);
        table.push_row([5]);
        ws.import_data(ImportData::Table(table), &ImportOptions::default())
            .unwrap();
        assert_eq!(ws.value("D1").unwrap(), &CellValue::Empty);
    }

    #[test]
    fn test_import_must_fit() {
        let mut book = Workbook::new();
        let mut ws = book.worksheet_mut(0).unwrap();
        let options = ImportOptions::at((MAX_ROWS - 1, 0)).unwrap();
        assert!(matches!(
            ws.import_data(ImportData::values([1, 2]), &options),
            Err(Error::IndexOutOfRange(_))
        ));
        assert_eq!(ws.import_data(ImportData::Grid(vec![]), &options).unwrap(), None);
    }
}
