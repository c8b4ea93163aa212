//! Worksheet storage and read access
//!
//! Cells live in a sparse `row -> (col -> cell)` map; rows and columns only
//! get metadata entries once something was set on them. Mutation goes
//! through [`WorksheetMut`](super::WorksheetMut), which can reach the
//! workbook pools and the other sheets.

use super::annotation::Annotation;
use super::cell::Cell;
use super::hyperlink::Hyperlink;
use super::picture::Picture;
use super::protection::SheetProtection;
use super::table::Table;
use super::value::CellValue;
use super::view::SheetView;
use crate::address::{CellAddress, CellRange, IntoAddress, MAX_COLS, MAX_ROWS, same_name};
use crate::error::{Error, Result};
use crate::pool::StyleId;
use std::collections::{BTreeMap, BTreeSet};

static EMPTY: CellValue = CellValue::Empty;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
    /// Only reachable programmatically
    VeryHidden,
}

/// Metadata of one row
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RowInfo {
    /// Points
    pub height: Option<f64>,
    pub hidden: bool,
    pub style: Option<StyleId>,
}

impl RowInfo {
    pub fn custom_height(&self) -> bool {
        self.height.is_some()
    }

    pub(crate) fn is_default(&self) -> bool {
        self.height.is_none() && !self.hidden && self.style.is_none()
    }
}

/// Metadata of one column
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColumnInfo {
    /// Characters of the default font
    pub width: Option<f64>,
    pub hidden: bool,
    pub style: Option<StyleId>,
    /// Width was set by autofit rather than explicitly
    pub best_fit: bool,
}

impl ColumnInfo {
    pub fn custom_width(&self) -> bool {
        self.width.is_some()
    }

    pub(crate) fn is_default(&self) -> bool {
        self.width.is_none() && !self.hidden && self.style.is_none()
    }
}

/// Worksheet-level XML the engine does not model, kept for the next save
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PreservedElement {
    /// Local element name, used to find its schema position on save
    pub name: String,
    pub xml: String,
}

#[derive(Debug, Clone)]
pub struct Worksheet {
    pub(crate) name: String,
    /// Package-level id, stable across saves
    pub(crate) sheet_id: u32,
    pub(crate) cells: BTreeMap<u32, BTreeMap<u32, Cell>>,
    /// Positions of every cell holding a formula
    pub(crate) formula_cells: BTreeSet<CellAddress>,
    pub(crate) rows: BTreeMap<u32, RowInfo>,
    pub(crate) columns: BTreeMap<u32, ColumnInfo>,
    pub(crate) merges: Vec<CellRange>,
    pub(crate) tables: Vec<Table>,
    pub(crate) hyperlinks: Vec<Hyperlink>,
    pub(crate) annotations: BTreeMap<CellAddress, Annotation>,
    pub(crate) pictures: Vec<Picture>,
    pub(crate) view: SheetView,
    pub(crate) protection: Option<SheetProtection>,
    pub(crate) visibility: Visibility,
    pub(crate) default_row_height: f64,
    pub(crate) default_column_width: f64,
    pub(crate) preserved: Vec<PreservedElement>,
}

impl Worksheet {
    pub(crate) fn new(name: &str, default_row_height: f64, default_column_width: f64) -> Self {
        Self {
            name: name.to_string(),
            sheet_id: 0,
            cells: BTreeMap::new(),
            formula_cells: BTreeSet::new(),
            rows: BTreeMap::new(),
            columns: BTreeMap::new(),
            merges: Vec::new(),
            tables: Vec::new(),
            hyperlinks: Vec::new(),
            annotations: BTreeMap::new(),
            pictures: Vec::new(),
            view: SheetView::default(),
            protection: None,
            visibility: Visibility::Visible,
            default_row_height,
            default_column_width,
            preserved: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Materialized cell at `addr`, if any
    pub fn cell(&self, addr: impl IntoAddress) -> Result<Option<&Cell>> {
        let addr = addr.into_address()?;
        Ok(self.cell_at(addr))
    }

    pub(crate) fn cell_at(&self, addr: CellAddress) -> Option<&Cell> {
        self.cells.get(&addr.row)?.get(&addr.col)
    }

    pub(crate) fn cell_at_mut(&mut self, addr: CellAddress) -> Option<&mut Cell> {
        self.cells.get_mut(&addr.row)?.get_mut(&addr.col)
    }

    /// Materialize the cell at `addr`, inheriting the row or column style
    pub(crate) fn cell_entry(&mut self, addr: CellAddress) -> &mut Cell {
        let inherited = self.inherited_style(addr);
        self.cells
            .entry(addr.row)
            .or_default()
            .entry(addr.col)
            .or_insert_with(|| Cell::with_style(inherited))
    }

    pub(crate) fn remove_cell(&mut self, addr: CellAddress) -> Option<Cell> {
        let row = self.cells.get_mut(&addr.row)?;
        let cell = row.remove(&addr.col);
        if row.is_empty() {
            self.cells.remove(&addr.row);
        }
        self.formula_cells.remove(&addr);
        cell
    }

    /// Drop the cell at `addr` when it no longer carries anything
    pub(crate) fn prune_cell(&mut self, addr: CellAddress) {
        if self.cell_at(addr).is_some_and(|c| c.is_blank()) && self.inherited_style(addr) == StyleId::DEFAULT {
            self.remove_cell(addr);
        }
    }

    /// Stored value; `Empty` for untouched cells and uncalculated formulas
    pub fn value(&self, addr: impl IntoAddress) -> Result<&CellValue> {
        let addr = addr.into_address()?;
        Ok(self.value_at(addr))
    }

    pub(crate) fn value_at(&self, addr: CellAddress) -> &CellValue {
        self.cell_at(addr).map(Cell::value).unwrap_or(&EMPTY)
    }

    /// Formula text with a leading `=`
    pub fn formula(&self, addr: impl IntoAddress) -> Result<Option<String>> {
        let addr = addr.into_address()?;
        Ok(self.cell_at(addr).and_then(Cell::formula))
    }

    /// Effective style: cell, then row, then column, then the default
    pub fn style_id(&self, addr: impl IntoAddress) -> Result<StyleId> {
        let addr = addr.into_address()?;
        Ok(self.style_id_at(addr))
    }

    pub(crate) fn style_id_at(&self, addr: CellAddress) -> StyleId {
        match self.cell_at(addr) {
            Some(cell) => cell.style,
            None => self.inherited_style(addr),
        }
    }

    pub(crate) fn inherited_style(&self, addr: CellAddress) -> StyleId {
        self.rows
            .get(&addr.row)
            .and_then(|r| r.style)
            .or_else(|| self.columns.get(&addr.col).and_then(|c| c.style))
            .unwrap_or(StyleId::DEFAULT)
    }

    /// Every materialized cell, row-major
    pub fn cells(&self) -> impl Iterator<Item = (CellAddress, &Cell)> {
        self.cells.iter().flat_map(|(row, cols)| {
            cols.iter()
                .map(move |(col, cell)| (CellAddress::new(*row, *col), cell))
        })
    }

    /// Materialized cells inside `range`, row-major
    pub fn cells_in(&self, range: CellRange) -> impl Iterator<Item = (CellAddress, &Cell)> {
        self.cells
            .range(range.start.row..=range.end.row)
            .flat_map(move |(row, cols)| {
                cols.range(range.start.col..=range.end.col)
                    .map(move |(col, cell)| (CellAddress::new(*row, *col), cell))
            })
    }

    pub fn cell_count(&self) -> usize {
        self.cells.values().map(BTreeMap::len).sum()
    }

    /// Smallest range holding every materialized cell
    pub fn used_range(&self) -> Option<CellRange> {
        let first_row = *self.cells.keys().next()?;
        let last_row = *self.cells.keys().next_back()?;
        let first_col = self.cells.values().filter_map(|c| c.keys().next()).min()?;
        let last_col = self.cells.values().filter_map(|c| c.keys().next_back()).max()?;
        Some(CellRange::new(
            CellAddress::new(first_row, *first_col),
            CellAddress::new(last_row, *last_col),
        ))
    }

    pub fn row(&self, index: u32) -> Option<&RowInfo> {
        self.rows.get(&index)
    }

    pub fn column(&self, index: u32) -> Option<&ColumnInfo> {
        self.columns.get(&index)
    }

    pub fn rows(&self) -> impl Iterator<Item = (u32, &RowInfo)> {
        self.rows.iter().map(|(i, r)| (*i, r))
    }

    pub fn columns(&self) -> impl Iterator<Item = (u32, &ColumnInfo)> {
        self.columns.iter().map(|(i, c)| (*i, c))
    }

    /// Height in points; the sheet default for untouched rows
    pub fn row_height(&self, index: u32) -> f64 {
        self.rows
            .get(&index)
            .and_then(|r| r.height)
            .unwrap_or(self.default_row_height)
    }

    /// Width in characters; the sheet default for untouched columns
    pub fn column_width(&self, index: u32) -> f64 {
        self.columns
            .get(&index)
            .and_then(|c| c.width)
            .unwrap_or(self.default_column_width)
    }

    pub fn is_row_hidden(&self, index: u32) -> bool {
        self.rows.get(&index).is_some_and(|r| r.hidden)
    }

    pub fn is_column_hidden(&self, index: u32) -> bool {
        self.columns.get(&index).is_some_and(|c| c.hidden)
    }

    pub(crate) fn column_width_px(&self, index: u32) -> u32 {
        (self.column_width(index) * 7.0 + 5.0).floor().max(0.0) as u32
    }

    pub(crate) fn row_height_px(&self, index: u32) -> u32 {
        (self.row_height(index) * 96.0 / 72.0).round().max(0.0) as u32
    }

    pub fn default_row_height(&self) -> f64 {
        self.default_row_height
    }

    pub fn default_column_width(&self) -> f64 {
        self.default_column_width
    }

    pub fn merged_ranges(&self) -> &[CellRange] {
        &self.merges
    }

    /// Merged range containing `addr`
    pub fn merge_at(&self, addr: impl IntoAddress) -> Result<Option<CellRange>> {
        let addr = addr.into_address()?;
        Ok(self.merges.iter().find(|m| m.contains(addr)).copied())
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| same_name(&t.name, name))
    }

    pub fn hyperlinks(&self) -> &[Hyperlink] {
        &self.hyperlinks
    }

    pub fn hyperlink_at(&self, addr: impl IntoAddress) -> Result<Option<&Hyperlink>> {
        let addr = addr.into_address()?;
        Ok(self.hyperlinks.iter().find(|h| h.range.contains(addr)))
    }

    pub fn annotation(&self, addr: impl IntoAddress) -> Result<Option<&Annotation>> {
        let addr = addr.into_address()?;
        Ok(self.annotations.get(&addr))
    }

    pub fn annotations(&self) -> impl Iterator<Item = (CellAddress, &Annotation)> {
        self.annotations.iter().map(|(a, n)| (*a, n))
    }

    pub fn pictures(&self) -> &[Picture] {
        &self.pictures
    }

    pub fn view(&self) -> &SheetView {
        &self.view
    }

    pub fn protection(&self) -> Option<&SheetProtection> {
        self.protection.as_ref()
    }

    pub fn is_protected(&self) -> bool {
        self.protection.is_some()
    }

    pub(crate) fn check_row(index: u32, count: u32) -> Result<()> {
        if count == 0 || index >= MAX_ROWS || index as u64 + count as u64 > MAX_ROWS as u64 {
            return Err(Error::out_of_range(format!(
                "rows {}..{} outside 0..{}",
                index,
                index as u64 + count as u64,
                MAX_ROWS
            )));
        }
        Ok(())
    }

    pub(crate) fn check_column(index: u32, count: u32) -> Result<()> {
        if count == 0 || index >= MAX_COLS || index as u64 + count as u64 > MAX_COLS as u64 {
            return Err(Error::out_of_range(format!(
                "columns {}..{} outside 0..{}",
                index,
                index as u64 + count as u64,
                MAX_COLS
            )));
        }
        Ok(())
    }

    /// Rebuild the formula index after cells moved
    pub(crate) fn reindex_formulas(&mut self) {
        self.formula_cells = self
            .cells()
            .filter(|(_, cell)| cell.has_formula())
            .map(|(addr, _)| addr)
            .collect();
    }

    /// Formula cells inside `range`, row-major
    pub(crate) fn formula_cells_in(&self, range: CellRange) -> impl Iterator<Item = CellAddress> + '_ {
        self.formula_cells
            .range(range.start..=range.end)
            .copied()
            .filter(move |a| a.col >= range.start.col && a.col <= range.end.col)
    }
}
