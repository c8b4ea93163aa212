use super::sheet_mut::WorksheetMut;
use super::value::CellValue;
use crate::address::{CellAddress, CellRange, IntoRange};
use crate::error::{Error, Result};

impl WorksheetMut<'_> {
    /// Merge `range` into one displayed cell. Values of every member except
    /// the top-left anchor are cleared.
    pub fn merge_cells(&mut self, range: impl IntoRange) -> Result<()> {
        self.book.ensure_open()?;
        let range = range.into_range()?;
        if range.is_single_cell() {
            return Err(Error::invalid_range(format!("cannot merge the single cell {}", range)));
        }
        if let Some(existing) = self.merges.iter().find(|m| m.intersects(&range)) {
            return Err(Error::invalid_range(format!(
                "{} overlaps merged range {}",
                range, existing
            )));
        }
        if let Some(table) = self.tables.iter().find(|t| t.range.intersects(&range)) {
            return Err(Error::invalid_range(format!(
                "{} overlaps table '{}'",
                range, table.name
            )));
        }

        let suppressed: Vec<CellAddress> = self
            .cells_in(range)
            .map(|(addr, _)| addr)
            .filter(|addr| *addr != range.start)
            .collect();
        let sheet = self.sheet_mut();
        for addr in &suppressed {
            if let Some(cell) = sheet.cell_at_mut(*addr) {
                cell.value = CellValue::Empty;
                cell.formula = None;
            }
            sheet.formula_cells.remove(addr);
            sheet.prune_cell(*addr);
        }
        sheet.merges.push(range);
        if !suppressed.is_empty() {
            self.book.invalidate_dependents(self.index, [range]);
        }
        Ok(())
    }

    /// Split every merged range intersecting `range`; suppressed values are
    /// not restored
    pub fn unmerge_cells(&mut self, range: impl IntoRange) -> Result<()> {
        self.book.ensure_open()?;
        let range = range.into_range()?;
        let merges = &mut self.sheet_mut().merges;
        let before = merges.len();
        merges.retain(|m| !m.intersects(&range));
        if merges.len() == before {
            return Err(Error::invalid_range(format!("no merged range at {}", range)));
        }
        Ok(())
    }

    pub fn remove_merge(&mut self, index: usize) -> Result<CellRange> {
        self.book.ensure_open()?;
        let merges = &mut self.sheet_mut().merges;
        if index >= merges.len() {
            return Err(Error::out_of_range(format!(
                "merge {} of {}",
                index,
                merges.len()
            )));
        }
        Ok(merges.remove(index))
    }
}
