//! Row, column and range insertion and deletion
//!
//! Every structural edit is described by one [`Shift`] along an axis. The
//! same shift moves the cells, the sheet objects anchored to them and every
//! formula reference that points into the edited sheet.

use super::annotation::Annotation;
use super::cell::Cell;
use super::picture::{Marker, Placement};
use super::sheet_mut::WorksheetMut;
use super::table::{Table, TableColumn};
use super::worksheet::Worksheet;
use crate::address::{CellAddress, CellRange, IntoRange, MAX_COLS, MAX_ROWS, same_name};
use crate::error::{Error, Result};
use crate::formula::ast::{CellRef, Coord, RefTarget};
use crate::formula::rewrite::{RefEdit, rewrite_formula};
use std::collections::BTreeMap;

/// Direction existing cells move when a range is inserted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertShift {
    Right,
    Down,
}

/// Direction remaining cells move to fill a deleted range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteShift {
    Left,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Rows,
    Columns,
}

/// Outcome of shifting an inclusive span along the axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Span {
    Same,
    Moved(u32, u32),
    /// Entirely inside a deleted band
    Gone,
    /// Pushed past the last row or column
    Overflow,
}

#[derive(Debug, Clone, Copy)]
struct Shift {
    axis: Axis,
    index: u32,
    count: u32,
    insert: bool,
    /// Cross-axis span limiting the edit; `None` for whole rows or columns
    band: Option<(u32, u32)>,
}

impl Shift {
    fn limit(&self) -> u32 {
        match self.axis {
            Axis::Rows => MAX_ROWS,
            Axis::Columns => MAX_COLS,
        }
    }

    /// (along, cross) coordinates of a cell
    fn split(&self, addr: CellAddress) -> (u32, u32) {
        match self.axis {
            Axis::Rows => (addr.row, addr.col),
            Axis::Columns => (addr.col, addr.row),
        }
    }

    fn join(&self, along: u32, cross: u32) -> CellAddress {
        match self.axis {
            Axis::Rows => CellAddress::new(along, cross),
            Axis::Columns => CellAddress::new(cross, along),
        }
    }

    fn covers(&self, lo: u32, hi: u32) -> bool {
        self.band.is_none_or(|(a, b)| a <= lo && hi <= b)
    }

    fn touches(&self, lo: u32, hi: u32) -> bool {
        self.band.is_none_or(|(a, b)| lo <= b && a <= hi)
    }

    fn span(&self, s: u32, e: u32) -> Span {
        let (index, count) = (self.index as u64, self.count as u64);
        let (s64, e64) = (s as u64, e as u64);
        let (ns, ne) = if self.insert {
            let ns = if s64 >= index { s64 + count } else { s64 };
            let ne = if e64 >= index { e64 + count } else { e64 };
            if ne >= self.limit() as u64 {
                return Span::Overflow;
            }
            (ns, ne)
        } else {
            let last = index + count - 1;
            if s64 >= index && e64 <= last {
                return Span::Gone;
            }
            let ns = if s64 < index {
                s64
            } else if s64 <= last {
                index
            } else {
                s64 - count
            };
            let ne = if e64 < index {
                e64
            } else if e64 <= last {
                index - 1
            } else {
                e64 - count
            };
            (ns, ne)
        };
        if (ns, ne) == (s64, e64) {
            Span::Same
        } else {
            Span::Moved(ns as u32, ne as u32)
        }
    }

    /// New position of a cell; `None` when deleted
    fn point(&self, addr: CellAddress) -> Option<CellAddress> {
        let (along, cross) = self.split(addr);
        if !self.covers(cross, cross) {
            return Some(addr);
        }
        match self.span(along, along) {
            Span::Same | Span::Overflow => Some(addr),
            Span::Moved(a, _) => Some(self.join(a, cross)),
            Span::Gone => None,
        }
    }

    /// Position of a floating anchor; deleted or overflowing anchors are
    /// clamped instead of dropped
    fn clamp_point(&self, addr: CellAddress) -> CellAddress {
        let (along, cross) = self.split(addr);
        if !self.covers(cross, cross) {
            return addr;
        }
        match self.span(along, along) {
            Span::Same => addr,
            Span::Moved(a, _) => self.join(a, cross),
            Span::Gone => self.join(self.index.min(self.limit() - 1), cross),
            Span::Overflow => self.join(self.limit() - 1, cross),
        }
    }

    fn range(&self, range: CellRange) -> Span {
        let (s, cs) = self.split(range.start);
        let (e, ce) = self.split(range.end);
        if !self.covers(cs, ce) {
            return Span::Same;
        }
        self.span(s, e)
    }

    fn moved_range(&self, range: CellRange, s: u32, e: u32) -> CellRange {
        let (_, cs) = self.split(range.start);
        let (_, ce) = self.split(range.end);
        CellRange::new(self.join(s, cs), self.join(e, ce))
    }

    /// An object only partly inside the band cannot follow a band shift
    fn straddles(&self, range: CellRange) -> bool {
        let (_, cs) = self.split(range.start);
        let (e, ce) = self.split(range.end);
        self.band.is_some() && self.touches(cs, ce) && !self.covers(cs, ce) && e >= self.index
    }

    fn along_coord(&self, cell: &CellRef) -> Coord {
        match self.axis {
            Axis::Rows => cell.row,
            Axis::Columns => cell.col,
        }
    }

    fn cross_coord(&self, cell: &CellRef) -> Coord {
        match self.axis {
            Axis::Rows => cell.col,
            Axis::Columns => cell.row,
        }
    }

    fn with_along(&self, mut cell: CellRef, index: u32) -> CellRef {
        match self.axis {
            Axis::Rows => cell.row.index = index,
            Axis::Columns => cell.col.index = index,
        }
        cell
    }

    fn edit_target(&self, target: &RefTarget) -> RefEdit {
        let along_span = |s: u32, e: u32| match self.span(s, e) {
            Span::Same => None,
            Span::Moved(ns, ne) => Some(Ok((ns, ne))),
            Span::Gone | Span::Overflow => Some(Err(())),
        };
        match *target {
            RefTarget::Cell(cell) => {
                let cross = self.cross_coord(&cell).index;
                if !self.covers(cross, cross) {
                    return RefEdit::Keep;
                }
                let along = self.along_coord(&cell).index;
                match along_span(along, along) {
                    None => RefEdit::Keep,
                    Some(Ok((ns, _))) => RefEdit::Target(RefTarget::Cell(self.with_along(cell, ns))),
                    Some(Err(())) => RefEdit::Invalid,
                }
            }
            RefTarget::Area(a, b) => {
                let (ca, cb) = (self.cross_coord(&a).index, self.cross_coord(&b).index);
                if !self.covers(ca.min(cb), ca.max(cb)) {
                    return RefEdit::Keep;
                }
                let (lo, hi, swapped) = if self.along_coord(&a).index <= self.along_coord(&b).index {
                    (a, b, false)
                } else {
                    (b, a, true)
                };
                match along_span(self.along_coord(&lo).index, self.along_coord(&hi).index) {
                    None => RefEdit::Keep,
                    Some(Ok((ns, ne))) => {
                        let (lo, hi) = (self.with_along(lo, ns), self.with_along(hi, ne));
                        let (a, b) = if swapped { (hi, lo) } else { (lo, hi) };
                        RefEdit::Target(RefTarget::Area(a, b))
                    }
                    Some(Err(())) => RefEdit::Invalid,
                }
            }
            RefTarget::Rows(a, b) => self.edit_lines(Axis::Rows, a, b),
            RefTarget::Columns(a, b) => self.edit_lines(Axis::Columns, a, b),
        }
    }

    /// Whole-row or whole-column references follow only full-line edits
    /// along their own axis
    fn edit_lines(&self, axis: Axis, a: Coord, b: Coord) -> RefEdit {
        if axis != self.axis || self.band.is_some() {
            return RefEdit::Keep;
        }
        let (lo, hi) = (a.index.min(b.index), a.index.max(b.index));
        match self.span(lo, hi) {
            Span::Same => RefEdit::Keep,
            Span::Gone | Span::Overflow => RefEdit::Invalid,
            Span::Moved(ns, ne) => {
                let (a, b) = if a.index <= b.index {
                    (Coord::new(ns, a.absolute), Coord::new(ne, b.absolute))
                } else {
                    (Coord::new(ne, a.absolute), Coord::new(ns, b.absolute))
                };
                RefEdit::Target(match axis {
                    Axis::Rows => RefTarget::Rows(a, b),
                    Axis::Columns => RefTarget::Columns(a, b),
                })
            }
        }
    }

    fn describe(&self) -> String {
        let what = match self.axis {
            Axis::Rows => "rows",
            Axis::Columns => "columns",
        };
        let verb = if self.insert { "insert" } else { "delete" };
        format!("{} {} {}..{}", verb, what, self.index, self.index as u64 + self.count as u64)
    }
}

impl WorksheetMut<'_> {
    pub fn insert_rows(&mut self, index: u32, count: u32) -> Result<()> {
        Worksheet::check_row(index, count)?;
        self.apply_shift(Shift {
            axis: Axis::Rows,
            index,
            count,
            insert: true,
            band: None,
        })
    }

    pub fn delete_rows(&mut self, index: u32, count: u32) -> Result<()> {
        Worksheet::check_row(index, count)?;
        self.apply_shift(Shift {
            axis: Axis::Rows,
            index,
            count,
            insert: false,
            band: None,
        })
    }

    pub fn insert_columns(&mut self, index: u32, count: u32) -> Result<()> {
        Worksheet::check_column(index, count)?;
        self.apply_shift(Shift {
            axis: Axis::Columns,
            index,
            count,
            insert: true,
            band: None,
        })
    }

    pub fn delete_columns(&mut self, index: u32, count: u32) -> Result<()> {
        Worksheet::check_column(index, count)?;
        self.apply_shift(Shift {
            axis: Axis::Columns,
            index,
            count,
            insert: false,
            band: None,
        })
    }

    /// Insert blank cells over `range`, pushing the cells beside it
    pub fn insert_range(&mut self, range: impl IntoRange, shift: InsertShift) -> Result<()> {
        let range = range.into_range()?;
        self.apply_shift(match shift {
            InsertShift::Down => Shift {
                axis: Axis::Rows,
                index: range.start.row,
                count: range.row_count(),
                insert: true,
                band: Some((range.start.col, range.end.col)),
            },
            InsertShift::Right => Shift {
                axis: Axis::Columns,
                index: range.start.col,
                count: range.col_count(),
                insert: true,
                band: Some((range.start.row, range.end.row)),
            },
        })
    }

    /// Delete the cells of `range`, pulling the cells beside it in
    pub fn delete_range(&mut self, range: impl IntoRange, shift: DeleteShift) -> Result<()> {
        let range = range.into_range()?;
        self.apply_shift(match shift {
            DeleteShift::Up => Shift {
                axis: Axis::Rows,
                index: range.start.row,
                count: range.row_count(),
                insert: false,
                band: Some((range.start.col, range.end.col)),
            },
            DeleteShift::Left => Shift {
                axis: Axis::Columns,
                index: range.start.col,
                count: range.col_count(),
                insert: false,
                band: Some((range.start.row, range.end.row)),
            },
        })
    }

    fn apply_shift(&mut self, shift: Shift) -> Result<()> {
        self.book.ensure_open()?;
        self.check_shift(&shift)?;

        let sheet_name = self.name.clone();
        let index = self.index;
        self.book.rewrite_references(|owner, reference| {
            let on_sheet = match &reference.sheet {
                Some(sheet) => same_name(sheet, &sheet_name),
                None => same_name(owner, &sheet_name),
            };
            if on_sheet {
                shift.edit_target(&reference.target)
            } else {
                RefEdit::Keep
            }
        });
        for name in &mut self.book.defined_names {
            let local = name.local_sheet == Some(index);
            if let Some(text) = rewrite_formula(&name.formula, |r| {
                let on_sheet = match &r.sheet {
                    Some(sheet) => same_name(sheet, &sheet_name),
                    None => local,
                };
                if on_sheet {
                    shift.edit_target(&r.target)
                } else {
                    RefEdit::Keep
                }
            }) {
                name.formula = text;
            }
        }

        let sheet = self.sheet_mut();
        move_cells(sheet, &shift);
        if shift.band.is_none() {
            move_lines(sheet, &shift);
        }
        move_objects(sheet, &shift);
        sheet.reindex_formulas();
        self.book.invalidate_sheet(index);
        log::debug!("{} on '{}'", shift.describe(), self.name);
        Ok(())
    }

    /// Reject edits that would push content off the grid or cut through
    /// merges and tables
    fn check_shift(&self, shift: &Shift) -> Result<()> {
        if shift.insert {
            let limit = shift.limit() as u64 - shift.count as u64;
            let pushed_off = self.cells().any(|(addr, _)| {
                let (along, cross) = shift.split(addr);
                shift.covers(cross, cross) && along >= shift.index && along as u64 >= limit
            });
            if pushed_off {
                return Err(Error::out_of_range(format!(
                    "{} would push cells past the end of the sheet",
                    shift.describe()
                )));
            }
        }
        let objects = self
            .merges
            .iter()
            .copied()
            .chain(self.tables.iter().map(|t| t.range));
        for range in objects {
            if shift.straddles(range) {
                return Err(Error::invalid_range(format!(
                    "{} cuts through {}",
                    shift.describe(),
                    range
                )));
            }
            if shift.insert && shift.range(range) == Span::Overflow {
                return Err(Error::out_of_range(format!(
                    "{} would push {} past the end of the sheet",
                    shift.describe(),
                    range
                )));
            }
        }
        Ok(())
    }
}

fn move_cells(sheet: &mut Worksheet, shift: &Shift) {
    let cells = std::mem::take(&mut sheet.cells);
    let mut moved: BTreeMap<u32, BTreeMap<u32, Cell>> = BTreeMap::new();
    for (row, cols) in cells {
        for (col, cell) in cols {
            if let Some(addr) = shift.point(CellAddress::new(row, col)) {
                moved.entry(addr.row).or_default().insert(addr.col, cell);
            }
        }
    }
    sheet.cells = moved;
}

/// Row or column metadata follows whole-line edits only
fn move_lines(sheet: &mut Worksheet, shift: &Shift) {
    fn remap<T>(map: &mut BTreeMap<u32, T>, shift: &Shift) {
        *map = std::mem::take(map)
            .into_iter()
            .filter_map(|(i, info)| match shift.span(i, i) {
                Span::Same => Some((i, info)),
                Span::Moved(n, _) => Some((n, info)),
                Span::Gone | Span::Overflow => None,
            })
            .collect();
    }
    match shift.axis {
        Axis::Rows => remap(&mut sheet.rows, shift),
        Axis::Columns => remap(&mut sheet.columns, shift),
    }
}

fn move_objects(sheet: &mut Worksheet, shift: &Shift) {
    sheet.merges = std::mem::take(&mut sheet.merges)
        .into_iter()
        .filter_map(|m| match shift.range(m) {
            Span::Same => Some(m),
            Span::Moved(s, e) => Some(shift.moved_range(m, s, e)),
            Span::Gone | Span::Overflow => None,
        })
        .filter(|m| !m.is_single_cell())
        .collect();

    sheet.tables = std::mem::take(&mut sheet.tables)
        .into_iter()
        .filter_map(|table| move_table(table, shift))
        .collect();

    sheet.hyperlinks = std::mem::take(&mut sheet.hyperlinks)
        .into_iter()
        .filter_map(|mut link| {
            match shift.range(link.range) {
                Span::Same => {}
                Span::Moved(s, e) => link.range = shift.moved_range(link.range, s, e),
                Span::Gone | Span::Overflow => return None,
            }
            Some(link)
        })
        .collect();

    sheet.annotations = std::mem::take(&mut sheet.annotations)
        .into_iter()
        .filter_map(|(addr, mut annotation)| {
            let to = shift.point(addr)?;
            if let Annotation::Note(note) = &mut annotation {
                note.shape.translate(
                    to.row as i64 - addr.row as i64,
                    to.col as i64 - addr.col as i64,
                );
            }
            Some((to, annotation))
        })
        .collect();

    for picture in &mut sheet.pictures {
        let clamp = |m: &mut Marker| m.cell = shift.clamp_point(m.cell);
        match &mut picture.placement {
            Placement::OneCell { from, .. } => clamp(from),
            Placement::TwoCell { from, to } => {
                clamp(from);
                clamp(to);
            }
        }
    }
}

fn move_table(mut table: Table, shift: &Shift) -> Option<Table> {
    let old = table.range;
    match shift.range(old) {
        Span::Same => return Some(table),
        Span::Gone | Span::Overflow => return None,
        Span::Moved(s, e) => table.range = shift.moved_range(old, s, e),
    }
    if shift.axis == Axis::Columns && shift.band.is_none() {
        let first = old.start.col;
        let (lo, hi) = (shift.index, shift.index as u64 + shift.count as u64);
        if shift.insert && shift.index > first && shift.index <= old.end.col {
            let at = (shift.index - first) as usize;
            for _ in 0..shift.count {
                table.columns.insert(at, TableColumn::new(""));
            }
        } else if !shift.insert {
            let mut col = first;
            table.columns.retain(|_| {
                let keep = !(col >= lo && (col as u64) < hi);
                col += 1;
                keep
            });
        }
        let mut n = 0;
        for column in &mut table.columns {
            n += 1;
            if column.name.is_empty() {
                column.name = format!("Column{}", n);
            }
        }
    }
    table.sync_columns();
    if table.header_row && table.range.row_count() < 2 {
        log::debug!("table '{}' lost its data rows", table.name);
    }
    Some(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CellValue, Workbook};

    fn book_with_refs() -> Workbook {
        let mut book = Workbook::new();
        book.add_worksheet(Some("Other")).unwrap();
        let mut ws = book.worksheet_mut(0).unwrap();
        for row in 0..6 {
            ws.set_value((row, 0), row as f64 + 1.0).unwrap();
        }
        ws.set_formula("C1", "=SUM(A2:A5)").unwrap();
        ws.set_formula("C2", "=A4*$A$6").unwrap();
        let mut other = book.worksheet_mut(1).unwrap();
        other.set_formula("A1", "=Sheet1!A5+Sheet1!A1").unwrap();
        book
    }

    fn formula(book: &Workbook, sheet: usize, addr: &str) -> String {
        book.worksheet(sheet).unwrap().formula(addr).unwrap().unwrap_or_default()
    }

    #[test]
    fn test_insert_rows_moves_cells_and_references() {
        let mut book = book_with_refs();
        book.worksheet_mut(0).unwrap().insert_rows(2, 2).unwrap();
        let ws = book.worksheet(0).unwrap();
        assert_eq!(ws.value("A3").unwrap(), &CellValue::Empty);
        assert_eq!(ws.value("A5").unwrap(), &CellValue::Number(3.0));
        assert_eq!(formula(&book, 0, "C1"), "=SUM(A2:A7)");
        assert_eq!(formula(&book, 0, "C2"), "=A6*$A$8");
        assert_eq!(formula(&book, 1, "A1"), "=Sheet1!A7+Sheet1!A1");
    }

    #[test]
    fn test_delete_rows_invalidates_and_shrinks() {
        let mut book = book_with_refs();
        book.worksheet_mut(0).unwrap().delete_rows(3, 2).unwrap();
        assert_eq!(formula(&book, 0, "C1"), "=SUM(A2:A3)");
        assert_eq!(formula(&book, 0, "C2"), "=#REF!*$A$4");
        assert_eq!(formula(&book, 1, "A1"), "=Sheet1!#REF!+Sheet1!A1");
        let ws = book.worksheet(0).unwrap();
        assert_eq!(ws.value("A4").unwrap(), &CellValue::Number(6.0));
    }

    #[test]
    fn test_insert_then_delete_restores_formulas() {
        let mut book = book_with_refs();
        let mut ws = book.worksheet_mut(0).unwrap();
        ws.insert_columns(0, 3).unwrap();
        ws.delete_columns(0, 3).unwrap();
        assert_eq!(formula(&book, 0, "C1"), "=SUM(A2:A5)");
        assert_eq!(formula(&book, 1, "A1"), "=Sheet1!A5+Sheet1!A1");
    }

    #[test]
    fn test_objects_follow_rows() {
        let mut book = Workbook::new();
        let mut ws = book.worksheet_mut(0).unwrap();
        ws.merge_cells("B2:C3").unwrap();
        ws.set_row_height(4, Some(30.0)).unwrap();
        ws.add_note("D5", "note", "Ann").unwrap();
        ws.insert_rows(0, 1).unwrap();
        assert_eq!(ws.merged_ranges()[0].to_string(), "B3:C4");
        assert_eq!(ws.row_height(5), 30.0);
        assert!(ws.annotation("D6").unwrap().is_some());
        ws.delete_rows(2, 2).unwrap();
        assert!(ws.merged_ranges().is_empty());
    }

    #[test]
    fn test_range_shift_only_moves_band() {
        let mut book = Workbook::new();
        let mut ws = book.worksheet_mut(0).unwrap();
        ws.set_value("B2", 1).unwrap();
        ws.set_value("C2", 2).unwrap();
        ws.set_formula("E1", "=B2+C2").unwrap();
        ws.insert_range("B2", InsertShift::Down).unwrap();
        assert_eq!(ws.value("B3").unwrap(), &CellValue::Number(1.0));
        assert_eq!(ws.value("C2").unwrap(), &CellValue::Number(2.0));
        assert_eq!(ws.formula("E1").unwrap().as_deref(), Some("=B3+C2"));
        ws.delete_range("B2", DeleteShift::Up).unwrap();
        assert_eq!(ws.formula("E1").unwrap().as_deref(), Some("=B2+C2"));
    }

    #[test]
    fn test_band_shift_rejects_partial_merge() {
        let mut book = Workbook::new();
        let mut ws = book.worksheet_mut(0).unwrap();
        ws.merge_cells("B4:D5").unwrap();
        assert!(matches!(
            ws.insert_range("B2:C2", InsertShift::Down),
            Err(Error::InvalidRange(_))
        ));
    }

    #[test]
    fn test_insert_past_grid_fails() {
        let mut book = Workbook::new();
        let mut ws = book.worksheet_mut(0).unwrap();
        ws.set_value((MAX_ROWS - 1, 0), 1).unwrap();
        assert!(matches!(ws.insert_rows(0, 1), Err(Error::IndexOutOfRange(_))));
        assert!(matches!(ws.insert_rows(MAX_ROWS, 1), Err(Error::IndexOutOfRange(_))));
    }

    #[test]
    fn test_table_columns_follow_column_edits() {
        let mut book = Workbook::new();
        let mut ws = book.worksheet_mut(0).unwrap();
        ws.set_value("A1", "Name").unwrap();
        ws.set_value("B1", "Qty").unwrap();
        ws.set_value("C1", "Price").unwrap();
        let name = ws.add_table("A1:C3", None).unwrap();
        ws.delete_columns(1, 1).unwrap();
        let table = ws.table(&name).unwrap();
        assert_eq!(table.range.to_string(), "A1:B3");
        let names: Vec<_> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Name", "Price"]);
    }

    #[test]
    fn test_insert_then_delete_restores_tables_and_merges() {
        let mut book = Workbook::new();
        let mut ws = book.worksheet_mut(0).unwrap();
        ws.set_value("A1", "Item").unwrap();
        ws.set_value("B1", "Qty").unwrap();
        let name = ws.add_table("A1:B4", None).unwrap();
        ws.merge_cells("D2:E3").unwrap();

        ws.insert_rows(2, 2).unwrap();
        assert_eq!(ws.table(&name).unwrap().range.to_string(), "A1:B6");
        assert_eq!(ws.merged_ranges()[0].to_string(), "D2:E5");
        ws.delete_rows(2, 2).unwrap();
        assert_eq!(ws.table(&name).unwrap().range.to_string(), "A1:B4");
        assert_eq!(ws.merged_ranges()[0].to_string(), "D2:E3");

        ws.insert_columns(1, 3).unwrap();
        ws.delete_columns(1, 3).unwrap();
        assert_eq!(ws.table(&name).unwrap().range.to_string(), "A1:B4");
        assert_eq!(ws.merged_ranges()[0].to_string(), "D2:E3");
    }

    #[test]
    fn test_sheet_names_match_without_case_beyond_ascii() {
        let mut book = Workbook::new();
        let summer = book.add_worksheet(Some("ÉTÉ")).unwrap();
        book.worksheet_mut(summer).unwrap().set_value("A5", 7).unwrap();
        book.worksheet_mut(0).unwrap().set_formula("A1", "=été!A5").unwrap();
        book.calculate_formulas().unwrap();
        assert_eq!(book.worksheet(0).unwrap().value("A1").unwrap(), &CellValue::Number(7.0));

        book.worksheet_mut(summer).unwrap().insert_rows(0, 2).unwrap();
        book.calculate_formulas().unwrap();
        assert_eq!(formula(&book, 0, "A1"), "=été!A7");
        assert_eq!(book.worksheet(0).unwrap().value("A1").unwrap(), &CellValue::Number(7.0));

        book.rename_worksheet(summer, "Été 2024").unwrap();
        assert_eq!(formula(&book, 0, "A1"), "='Été 2024'!A7");
        book.remove_worksheet("été 2024").unwrap();
        assert_eq!(formula(&book, 0, "A1"), "=#REF!");
    }
}
