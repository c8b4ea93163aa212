//! Sheet view: selection, zoom, frozen and split panes

use crate::address::{CellAddress, MAX_COLS, MAX_ROWS};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewType {
    #[default]
    Normal,
    PageLayout,
    PageBreakPreview,
}

impl ViewType {
    pub(crate) fn as_xml(&self) -> &'static str {
        match self {
            ViewType::Normal => "normal",
            ViewType::PageLayout => "pageLayout",
            ViewType::PageBreakPreview => "pageBreakPreview",
        }
    }

    pub(crate) fn from_xml(value: &str) -> Self {
        match value {
            "pageLayout" => ViewType::PageLayout,
            "pageBreakPreview" => ViewType::PageBreakPreview,
            _ => ViewType::Normal,
        }
    }
}

/// Pane layout of a sheet window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Panes {
    #[default]
    None,
    /// Rows above and columns left of the split stay in place
    Frozen { rows: u32, columns: u32 },
    /// Movable split, measured in rows and columns of default size
    Split { rows: u32, columns: u32 },
}

/// How a worksheet is shown when the package is opened
#[derive(Debug, Clone, PartialEq)]
pub struct SheetView {
    pub active_cell: CellAddress,
    pub top_left_cell: CellAddress,
    zoom: u32,
    page_layout_zoom: u32,
    pub view_type: ViewType,
    pub panes: Panes,
    pub show_gridlines: bool,
    pub show_headers: bool,
    pub right_to_left: bool,
}

impl Default for SheetView {
    fn default() -> Self {
        Self {
            active_cell: CellAddress::new(0, 0),
            top_left_cell: CellAddress::new(0, 0),
            zoom: 100,
            page_layout_zoom: 100,
            view_type: ViewType::Normal,
            panes: Panes::None,
            show_gridlines: true,
            show_headers: true,
            right_to_left: false,
        }
    }
}

fn check_zoom(zoom: u32) -> Result<u32> {
    if !(10..=400).contains(&zoom) {
        return Err(Error::out_of_range(format!(
            "zoom {}% is outside 10..=400",
            zoom
        )));
    }
    Ok(zoom)
}

impl SheetView {
    pub fn zoom(&self) -> u32 {
        self.zoom
    }

    pub fn set_zoom(&mut self, zoom: u32) -> Result<()> {
        self.zoom = check_zoom(zoom)?;
        Ok(())
    }

    pub fn page_layout_zoom(&self) -> u32 {
        self.page_layout_zoom
    }

    pub fn set_page_layout_zoom(&mut self, zoom: u32) -> Result<()> {
        self.page_layout_zoom = check_zoom(zoom)?;
        Ok(())
    }

    /// Freeze `rows` rows and `columns` columns; both zero removes the panes
    pub fn freeze_panes(&mut self, rows: u32, columns: u32) -> Result<()> {
        self.panes = Self::checked_panes(rows, columns, |rows, columns| Panes::Frozen {
            rows,
            columns,
        })?;
        Ok(())
    }

    pub fn split_panes(&mut self, rows: u32, columns: u32) -> Result<()> {
        self.panes = Self::checked_panes(rows, columns, |rows, columns| Panes::Split {
            rows,
            columns,
        })?;
        Ok(())
    }

    pub fn remove_panes(&mut self) {
        self.panes = Panes::None;
    }

    fn checked_panes(rows: u32, columns: u32, make: fn(u32, u32) -> Panes) -> Result<Panes> {
        if rows >= MAX_ROWS || columns >= MAX_COLS {
            return Err(Error::out_of_range(format!(
                "pane split at {} rows, {} columns",
                rows, columns
            )));
        }
        Ok(if rows == 0 && columns == 0 {
            Panes::None
        } else {
            make(rows, columns)
        })
    }

    pub(crate) fn set_zoom_unchecked(&mut self, zoom: u32, page_layout_zoom: u32) {
        self.zoom = zoom.clamp(10, 400);
        self.page_layout_zoom = page_layout_zoom.clamp(10, 400);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zoom_bounds() {
        let mut view = SheetView::default();
        assert!(view.set_zoom(150).is_ok());
        assert_eq!(view.zoom(), 150);
        assert!(matches!(view.set_zoom(5), Err(Error::IndexOutOfRange(_))));
        assert_eq!(view.zoom(), 150);
    }

    #[test]
    fn test_freeze_zero_clears() {
        let mut view = SheetView::default();
        view.freeze_panes(1, 2).unwrap();
        assert_eq!(view.panes, Panes::Frozen { rows: 1, columns: 2 });
        view.freeze_panes(0, 0).unwrap();
        assert_eq!(view.panes, Panes::None);
    }
}
