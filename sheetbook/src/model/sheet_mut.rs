//! Editing handle for one worksheet
//!
//! [`WorksheetMut`] borrows the whole workbook so that an edit can intern
//! into the shared pools and clear dependent formula caches on other sheets
//! as part of the edit itself.

use super::cell::Formula;
use super::display::{DEFAULT_DATE_FORMAT, DEFAULT_DATETIME_FORMAT, DEFAULT_DURATION_FORMAT};
use super::style::{Font, Style};
use super::value::CellValue;
use super::view::SheetView;
use super::workbook::Workbook;
use super::worksheet::{ColumnInfo, RowInfo, Visibility, Worksheet};
use crate::address::{CellAddress, CellRange, IntoAddress, IntoRange};
use crate::error::{Error, Result};
use crate::formula::calc::{self, CalcReport, CalcScope};
use crate::pool::StyleId;
use chrono::Timelike;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

/// What [`WorksheetMut::clear`] removes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClearOptions {
    /// Values and formulas; formatting stays
    #[default]
    Contents,
    /// Styles only
    Formats,
    /// Values, formulas, styles, notes, hyperlinks and merges
    All,
}

pub struct WorksheetMut<'a> {
    pub(crate) book: &'a mut Workbook,
    pub(crate) index: usize,
}

impl Deref for WorksheetMut<'_> {
    type Target = Worksheet;

    fn deref(&self) -> &Worksheet {
        &self.book.sheets[self.index]
    }
}

type Restyle<'f> = dyn FnMut(&mut Workbook, StyleId) -> StyleId + 'f;

impl<'a> WorksheetMut<'a> {
    pub(crate) fn new(book: &'a mut Workbook, index: usize) -> Self {
        Self { book, index }
    }

    pub(crate) fn sheet_mut(&mut self) -> &mut Worksheet {
        &mut self.book.sheets[self.index]
    }

    /// Position of this worksheet in the workbook
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn workbook(&self) -> &Workbook {
        self.book
    }

    /// Effective style record of a cell
    pub fn style_of(&self, addr: impl IntoAddress) -> Result<&Arc<Style>> {
        let id = self.style_id(addr)?;
        Ok(self.book.styles.get(id))
    }

    /// Store a value, removing any formula from the cell
    pub fn set_value(&mut self, addr: impl IntoAddress, value: impl Into<CellValue>) -> Result<()> {
        self.book.ensure_open()?;
        let addr = addr.into_address()?;
        self.store_value(addr, value.into());
        self.book
            .invalidate_dependents(self.index, [CellRange::single(addr)]);
        Ok(())
    }

    /// Store without invalidating dependents; callers batch the invalidation
    pub(crate) fn store_value(&mut self, addr: CellAddress, value: CellValue) {
        let value = match value {
            CellValue::Text(text) => CellValue::Text(self.book.strings.intern_arc(text).1),
            other => other,
        };
        let default_format = match &value {
            CellValue::DateTime(dt) if dt.time().num_seconds_from_midnight() == 0 && dt.time().nanosecond() == 0 => {
                Some(DEFAULT_DATE_FORMAT)
            }
            CellValue::DateTime(_) => Some(DEFAULT_DATETIME_FORMAT),
            CellValue::Duration(_) => Some(DEFAULT_DURATION_FORMAT),
            _ => None,
        };
        let current = self.style_id_at(addr);
        let style = match default_format {
            Some(code) if self.book.styles.get(current).has_general_format() => self
                .book
                .styles
                .derive(current, |s| s.number_format = code.to_string()),
            _ => current,
        };
        let empty = value.is_empty();
        let sheet = self.sheet_mut();
        sheet.formula_cells.remove(&addr);
        let cell = sheet.cell_entry(addr);
        cell.value = value;
        cell.formula = None;
        cell.style = style;
        if empty {
            sheet.prune_cell(addr);
        }
    }

    /// Store a formula; its value reads as `Empty` until calculated
    pub fn set_formula(&mut self, addr: impl IntoAddress, formula: &str) -> Result<()> {
        self.book.ensure_open()?;
        let addr = addr.into_address()?;
        let formula = Formula::parse(formula);
        let sheet = self.sheet_mut();
        let cell = sheet.cell_entry(addr);
        cell.formula = Some(formula);
        cell.value = CellValue::Empty;
        sheet.formula_cells.insert(addr);
        self.book
            .invalidate_dependents(self.index, [CellRange::single(addr)]);
        Ok(())
    }

    /// Remove the cell's value, formula and style
    pub fn clear_cell(&mut self, addr: impl IntoAddress) -> Result<()> {
        self.book.ensure_open()?;
        let addr = addr.into_address()?;
        self.sheet_mut().remove_cell(addr);
        self.book
            .invalidate_dependents(self.index, [CellRange::single(addr)]);
        Ok(())
    }

    /// Point a cell at an already pooled style
    pub fn set_style_id(&mut self, addr: impl IntoAddress, style: StyleId) -> Result<()> {
        self.book.ensure_open()?;
        let addr = addr.into_address()?;
        if style.0 as usize >= self.book.styles.len() {
            return Err(Error::out_of_range(format!("style {}", style.0)));
        }
        self.assign_style(addr, style);
        Ok(())
    }

    fn assign_style(&mut self, addr: CellAddress, style: StyleId) {
        let sheet = self.sheet_mut();
        sheet.cell_entry(addr).style = style;
        sheet.prune_cell(addr);
    }

    /// Replace a cell's style; returns the pooled handle
    pub fn set_style(&mut self, addr: impl IntoAddress, style: Style) -> Result<StyleId> {
        self.book.ensure_open()?;
        let id = self.book.styles.intern(style);
        self.set_style_id(addr, id)?;
        Ok(id)
    }

    /// Copy-on-write edit of a cell's style; cells sharing the previous
    /// record keep it
    pub fn update_style(&mut self, addr: impl IntoAddress, edit: impl FnOnce(&mut Style)) -> Result<StyleId> {
        self.book.ensure_open()?;
        let addr = addr.into_address()?;
        let current = self.style_id_at(addr);
        let id = self.book.styles.derive(current, edit);
        self.assign_style(addr, id);
        Ok(id)
    }

    pub fn set_range_style(&mut self, range: impl IntoRange, style: Style) -> Result<()> {
        self.book.ensure_open()?;
        let range = range.into_range()?;
        let id = self.book.styles.intern(style);
        self.restyle_range(range, &mut |_, _| id);
        Ok(())
    }

    /// Apply `edit` to the style of every cell in `range`. Whole rows and
    /// whole columns are styled through their metadata.
    pub fn update_range_style(&mut self, range: impl IntoRange, edit: impl Fn(&mut Style)) -> Result<()> {
        self.book.ensure_open()?;
        let range = range.into_range()?;
        let mut derived: HashMap<StyleId, StyleId> = HashMap::new();
        self.restyle_range(range, &mut |book, id| {
            *derived
                .entry(id)
                .or_insert_with(|| book.styles.derive(id, &edit))
        });
        Ok(())
    }

    pub fn set_row_style(&mut self, index: u32, style: Style) -> Result<()> {
        self.set_range_style(CellRange::rows(index, index)?, style)
    }

    pub fn update_row_style(&mut self, index: u32, edit: impl Fn(&mut Style)) -> Result<()> {
        self.update_range_style(CellRange::rows(index, index)?, edit)
    }

    pub fn set_column_style(&mut self, index: u32, style: Style) -> Result<()> {
        self.set_range_style(CellRange::columns(index, index)?, style)
    }

    pub fn update_column_style(&mut self, index: u32, edit: impl Fn(&mut Style)) -> Result<()> {
        self.update_range_style(CellRange::columns(index, index)?, edit)
    }

    fn restyle_range(&mut self, range: CellRange, restyle: &mut Restyle<'_>) {
        if range.is_full_columns() {
            for col in range.start.col..=range.end.col {
                self.restyle_column(col, restyle);
            }
        } else if range.is_full_rows() {
            for row in range.start.row..=range.end.row {
                self.restyle_row(row, restyle);
            }
        } else {
            for addr in range.iter() {
                let current = self.style_id_at(addr);
                let id = restyle(self.book, current);
                self.assign_style(addr, id);
            }
        }
    }

    /// Row metadata plus every cell already present in the row, including
    /// cells implied by styled columns
    fn restyle_row(&mut self, row: u32, restyle: &mut Restyle<'_>) {
        let current = self.rows.get(&row).and_then(|r| r.style).unwrap_or(StyleId::DEFAULT);
        let mut targets: Vec<(u32, StyleId)> = self
            .cells
            .get(&row)
            .map(|cols| cols.iter().map(|(c, cell)| (*c, cell.style)).collect())
            .unwrap_or_default();
        for (col, info) in &self.columns {
            if let Some(style) = info.style
                && self.cell_at(CellAddress::new(row, *col)).is_none()
            {
                targets.push((*col, style));
            }
        }
        let row_style = restyle(self.book, current);
        for (col, style) in targets {
            let id = restyle(self.book, style);
            self.sheet_mut().cell_entry(CellAddress::new(row, col)).style = id;
        }
        self.sheet_mut().rows.entry(row).or_default().style = Some(row_style);
    }

    fn restyle_column(&mut self, col: u32, restyle: &mut Restyle<'_>) {
        let current = self
            .columns
            .get(&col)
            .and_then(|c| c.style)
            .unwrap_or(StyleId::DEFAULT);
        let mut targets: Vec<(u32, StyleId)> = self
            .cells
            .iter()
            .filter_map(|(row, cols)| cols.get(&col).map(|cell| (*row, cell.style)))
            .collect();
        for (row, info) in &self.rows {
            if let Some(style) = info.style
                && self.cell_at(CellAddress::new(*row, col)).is_none()
            {
                targets.push((*row, style));
            }
        }
        let col_style = restyle(self.book, current);
        for (row, style) in targets {
            let id = restyle(self.book, style);
            self.sheet_mut().cell_entry(CellAddress::new(row, col)).style = id;
        }
        self.sheet_mut().columns.entry(col).or_default().style = Some(col_style);
    }

    /// Re-font characters `start..start + length` of a text cell
    pub fn format_text(&mut self, addr: impl IntoAddress, font: &Font, start: usize, length: usize) -> Result<()> {
        self.book.ensure_open()?;
        let addr = addr.into_address()?;
        let Some(text) = self.value_at(addr).as_rich_text() else {
            return Err(Error::InvalidState(format!("cell {} holds no text", addr)));
        };
        let formatted = text.with_span_font(start, length, font).ok_or_else(|| {
            Error::out_of_range(format!(
                "characters {}..{} of a {}-character text",
                start,
                start + length,
                text.char_len()
            ))
        })?;
        let (_, pooled) = self.book.strings.intern(formatted);
        self.sheet_mut().cell_entry(addr).value = CellValue::Text(pooled);
        Ok(())
    }

    /// Replace `find` in every text cell; returns how many cells changed
    pub fn replace_content(&mut self, find: &str, replacement: &str) -> Result<usize> {
        self.book.ensure_open()?;
        let changes: Vec<(CellAddress, _)> = self
            .cells()
            .filter(|(_, cell)| !cell.has_formula())
            .filter_map(|(addr, cell)| {
                let text = cell.value().as_rich_text()?;
                text.replace(find, replacement).map(|t| (addr, t))
            })
            .collect();
        let count = changes.len();
        let mut touched = Vec::with_capacity(count);
        for (addr, text) in changes {
            let (_, pooled) = self.book.strings.intern(text);
            self.sheet_mut().cell_entry(addr).value = CellValue::Text(pooled);
            touched.push(CellRange::single(addr));
        }
        self.book.invalidate_dependents(self.index, touched);
        Ok(count)
    }

    /// Height in points; `None` restores the default height
    pub fn set_row_height(&mut self, index: u32, height: Option<f64>) -> Result<()> {
        self.book.ensure_open()?;
        Worksheet::check_row(index, 1)?;
        if let Some(h) = height
            && !(0.0..=409.0).contains(&h)
        {
            return Err(Error::out_of_range(format!("row height {}", h)));
        }
        self.row_info_mut(index, |info| info.height = height);
        Ok(())
    }

    pub fn set_row_hidden(&mut self, index: u32, hidden: bool) -> Result<()> {
        self.book.ensure_open()?;
        Worksheet::check_row(index, 1)?;
        self.row_info_mut(index, |info| info.hidden = hidden);
        Ok(())
    }

    /// Width in characters; `None` restores the default width
    pub fn set_column_width(&mut self, index: u32, width: Option<f64>) -> Result<()> {
        self.book.ensure_open()?;
        Worksheet::check_column(index, 1)?;
        if let Some(w) = width
            && !(0.0..=255.0).contains(&w)
        {
            return Err(Error::out_of_range(format!("column width {}", w)));
        }
        self.column_info_mut(index, |info| {
            info.width = width;
            info.best_fit = false;
        });
        Ok(())
    }

    pub fn set_column_hidden(&mut self, index: u32, hidden: bool) -> Result<()> {
        self.book.ensure_open()?;
        Worksheet::check_column(index, 1)?;
        self.column_info_mut(index, |info| info.hidden = hidden);
        Ok(())
    }

    pub(crate) fn row_info_mut(&mut self, index: u32, edit: impl FnOnce(&mut RowInfo)) {
        let rows = &mut self.sheet_mut().rows;
        let info = rows.entry(index).or_default();
        edit(info);
        if info.is_default() {
            rows.remove(&index);
        }
    }

    pub(crate) fn column_info_mut(&mut self, index: u32, edit: impl FnOnce(&mut ColumnInfo)) {
        let columns = &mut self.sheet_mut().columns;
        let info = columns.entry(index).or_default();
        edit(info);
        if info.is_default() {
            columns.remove(&index);
        }
    }

    /// Clear the cells of `range`. Whole-row and whole-column ranges also
    /// reset row or column metadata when formats are cleared.
    pub fn clear(&mut self, range: impl IntoRange, options: ClearOptions) -> Result<()> {
        self.book.ensure_open()?;
        let range = range.into_range()?;
        let cells: Vec<CellAddress> = self.cells_in(range).map(|(addr, _)| addr).collect();
        let contents = matches!(options, ClearOptions::Contents | ClearOptions::All);
        let formats = matches!(options, ClearOptions::Formats | ClearOptions::All);
        let sheet = self.sheet_mut();
        for addr in cells {
            if let Some(cell) = sheet.cell_at_mut(addr) {
                if contents {
                    cell.value = CellValue::Empty;
                    cell.formula = None;
                }
                if formats {
                    cell.style = StyleId::DEFAULT;
                }
            }
            if contents {
                sheet.formula_cells.remove(&addr);
            }
            sheet.prune_cell(addr);
        }
        if formats && range.is_full_rows() {
            for info in sheet.rows.range_mut(range.start.row..=range.end.row) {
                info.1.style = None;
            }
            sheet.rows.retain(|_, info| !info.is_default());
        }
        if formats && range.is_full_columns() {
            for info in sheet.columns.range_mut(range.start.col..=range.end.col) {
                info.1.style = None;
            }
            sheet.columns.retain(|_, info| !info.is_default());
        }
        if matches!(options, ClearOptions::All) {
            sheet.annotations.retain(|addr, _| !range.contains(*addr));
            sheet.hyperlinks.retain(|h| !range.contains_range(&h.range));
            sheet.merges.retain(|m| !range.contains_range(m));
        }
        if contents {
            self.book.invalidate_dependents(self.index, [range]);
        }
        Ok(())
    }

    pub fn clear_rows(&mut self, first: u32, last: u32, options: ClearOptions) -> Result<()> {
        self.clear(CellRange::rows(first, last)?, options)
    }

    pub fn clear_columns(&mut self, first: u32, last: u32, options: ClearOptions) -> Result<()> {
        self.clear(CellRange::columns(first, last)?, options)
    }

    pub fn view_mut(&mut self) -> &mut SheetView {
        &mut self.sheet_mut().view
    }

    /// Hide or show the worksheet; at least one worksheet stays visible
    pub fn set_visibility(&mut self, visibility: Visibility) -> Result<()> {
        self.book.ensure_open()?;
        if visibility != Visibility::Visible {
            let others_visible = self
                .book
                .sheets
                .iter()
                .enumerate()
                .any(|(i, s)| i != self.index && s.visibility == Visibility::Visible);
            if !others_visible {
                return Err(Error::InvalidState(
                    "the last visible worksheet cannot be hidden".to_string(),
                ));
            }
        }
        self.sheet_mut().visibility = visibility;
        if visibility != Visibility::Visible
            && self.book.active_sheet == self.index
            && let Some(next) = self
                .book
                .sheets
                .iter()
                .position(|s| s.visibility == Visibility::Visible)
        {
            self.book.active_sheet = next;
        }
        Ok(())
    }

    pub fn rename(&mut self, name: &str) -> Result<()> {
        self.book.rename_worksheet(self.index, name)
    }

    /// Recalculate the formulas of this worksheet only; other sheets are
    /// read as last calculated
    pub fn calculate_formulas(&mut self) -> Result<CalcReport> {
        self.book.ensure_open()?;
        Ok(calc::calculate(self.book, CalcScope::Worksheet(self.index)))
    }
}
