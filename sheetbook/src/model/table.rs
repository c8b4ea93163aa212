//! Tables (list objects) over worksheet ranges

use super::sheet_mut::WorksheetMut;
use super::value::CellValue;
use crate::address::{CellAddress, CellRange, IntoRange, fold_name, parse_cell_ref, same_name};
use crate::error::{Error, Result};
use std::collections::HashSet;

/// Filter on one table column: rows whose text is in `values` stay visible
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnFilter {
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumn {
    pub name: String,
    pub filter: Option<ColumnFilter>,
    /// Label written in the totals row, if any
    pub totals_label: Option<String>,
}

impl TableColumn {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filter: None,
            totals_label: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub range: CellRange,
    pub style_name: Option<String>,
    pub header_row: bool,
    pub totals_row: bool,
    pub show_row_stripes: bool,
    pub show_column_stripes: bool,
    pub show_first_column: bool,
    pub show_last_column: bool,
    /// Show filter buttons on the header row
    pub auto_filter: bool,
    pub columns: Vec<TableColumn>,
}

impl Table {
    /// Data rows, without header and totals
    pub fn data_range(&self) -> Option<CellRange> {
        let first = self.range.start.row + self.header_row as u32;
        let last = self.range.end.row.checked_sub(self.totals_row as u32)?;
        (first <= last).then(|| {
            CellRange::new(
                CellAddress::new(first, self.range.start.col),
                CellAddress::new(last, self.range.end.col),
            )
        })
    }

    /// Range covered by the AutoFilter, header through last data row
    pub fn filter_range(&self) -> CellRange {
        let last = if self.totals_row {
            self.range.end.row.saturating_sub(1).max(self.range.start.row)
        } else {
            self.range.end.row
        };
        CellRange::new(self.range.start, CellAddress::new(last, self.range.end.col))
    }

    pub fn column(&self, name: &str) -> Option<&TableColumn> {
        self.columns.iter().find(|c| same_name(&c.name, name))
    }

    /// Keep `columns` in step with the width of `range`
    pub(crate) fn sync_columns(&mut self) {
        let width = self.range.col_count() as usize;
        if self.columns.len() > width {
            self.columns.truncate(width);
        }
        let mut taken: HashSet<String> = self.columns.iter().map(|c| fold_name(&c.name)).collect();
        while self.columns.len() < width {
            let name = unique_column_name(&format!("Column{}", self.columns.len() + 1), &taken);
            taken.insert(fold_name(&name));
            self.columns.push(TableColumn::new(name));
        }
    }
}

fn unique_column_name(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(&fold_name(base)) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{}{}", base, n))
        .find(|candidate| !taken.contains(&fold_name(candidate)))
        .unwrap_or_else(|| base.to_string())
}

/// Table names are identifiers that cannot be mistaken for references
pub(crate) fn validate_table_name(name: &str) -> Result<()> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '\\')
        && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '\\')
        && parse_cell_ref(name).is_none()
        && name.chars().count() <= 255;
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidName(format!("'{}' is not a valid table name", name)))
    }
}

impl WorksheetMut<'_> {
    /// Create a table over `range` with a header row taken from its first row;
    /// returns the generated table name
    pub fn add_table(&mut self, range: impl IntoRange, style_name: Option<&str>) -> Result<String> {
        let name = self.book.unique_table_name("Table");
        self.add_named_table(range, &name, style_name)?;
        Ok(name)
    }

    pub fn add_named_table(&mut self, range: impl IntoRange, name: &str, style_name: Option<&str>) -> Result<()> {
        self.book.ensure_open()?;
        let range = range.into_range()?;
        validate_table_name(name)?;
        if self.book.table_name_taken(name) {
            return Err(Error::DuplicateName(format!("table '{}'", name)));
        }
        if range.row_count() < 2 {
            return Err(Error::invalid_range(format!(
                "table range {} needs a header and at least one data row",
                range
            )));
        }
        if let Some(existing) = self.tables.iter().find(|t| t.range.intersects(&range)) {
            return Err(Error::invalid_range(format!(
                "{} overlaps table '{}'",
                range, existing.name
            )));
        }
        if let Some(merge) = self.merges.iter().find(|m| m.intersects(&range)) {
            return Err(Error::invalid_range(format!("{} overlaps merged range {}", range, merge)));
        }

        let mut taken = HashSet::new();
        let mut columns = Vec::new();
        for (i, col) in (range.start.col..=range.end.col).enumerate() {
            let cell = CellAddress::new(range.start.row, col);
            let header = match self.value(cell)? {
                CellValue::Empty => String::new(),
                other => other.to_string(),
            };
            let base = if header.trim().is_empty() {
                format!("Column{}", i + 1)
            } else {
                header.clone()
            };
            let unique = unique_column_name(&base, &taken);
            taken.insert(fold_name(&unique));
            if unique != header {
                self.set_value(cell, unique.as_str())?;
            }
            columns.push(TableColumn::new(unique));
        }

        self.sheet_mut().tables.push(Table {
            name: name.to_string(),
            range,
            style_name: Some(style_name.unwrap_or("TableStyleMedium2").to_string()),
            header_row: true,
            totals_row: false,
            show_row_stripes: true,
            show_column_stripes: false,
            show_first_column: false,
            show_last_column: false,
            auto_filter: true,
            columns,
        });
        log::debug!("added table '{}' at {}", name, range);
        Ok(())
    }

    pub fn remove_table(&mut self, name: &str) -> Result<Table> {
        self.book.ensure_open()?;
        let sheet = self.sheet_mut();
        let index = sheet
            .tables
            .iter()
            .position(|t| same_name(&t.name, name))
            .ok_or_else(|| Error::out_of_range(format!("no table named '{}'", name)))?;
        Ok(sheet.tables.remove(index))
    }

    /// Mutable access to a table's flags, columns and filters
    pub fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.book.ensure_open()?;
        self.sheet_mut()
            .tables
            .iter_mut()
            .find(|t| same_name(&t.name, name))
            .ok_or_else(|| Error::out_of_range(format!("no table named '{}'", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_rules() {
        assert!(validate_table_name("Sales_2024").is_ok());
        assert!(validate_table_name("A1").is_err());
        assert!(validate_table_name("1Table").is_err());
        assert!(validate_table_name("My Table").is_err());
    }

    #[test]
    fn test_ranges_and_column_sync() {
        let mut table = Table {
            name: "T".into(),
            range: CellRange::parse("B2:D6").unwrap(),
            style_name: None,
            header_row: true,
            totals_row: true,
            show_row_stripes: true,
            show_column_stripes: false,
            show_first_column: false,
            show_last_column: false,
            auto_filter: true,
            columns: vec![TableColumn::new("Column1")],
        };
        assert_eq!(table.data_range().unwrap().to_string(), "B3:D5");
        assert_eq!(table.filter_range().to_string(), "B2:D5");
        table.sync_columns();
        let names: Vec<_> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Column1", "Column2", "Column3"]);
    }
}
