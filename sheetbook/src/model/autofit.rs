//! Content-based column widths and row heights
//!
//! There are no font files to measure against, so text is measured in
//! character classes relative to a digit of the 11pt default font. Columns
//! are measured in parallel and written back afterwards.

use super::cell::Cell;
use super::display::format_value;
use super::sheet_mut::WorksheetMut;
use super::style::Font;
use super::worksheet::Worksheet;
use crate::address::{CellAddress, CellRange};
use crate::config::AutoFitConfig;
use crate::error::{Error, Result};
use crate::pool::StylePool;
use rayon::prelude::*;

/// Points of row height per line of 11pt text
const LINE_HEIGHT: f64 = 15.0;
const MAX_COLUMN_WIDTH: f64 = 255.0;
const MAX_ROW_HEIGHT: f64 = 409.0;

/// Limits of an autofit pass. `start`/`end` bound the cells measured: rows
/// when fitting columns, columns when fitting rows.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AutoFitOptions {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub start: Option<u32>,
    pub end: Option<u32>,
}

impl AutoFitOptions {
    pub fn between(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
            ..Self::default()
        }
    }

    fn clamp(&self, size: f64) -> f64 {
        let size = self.min.map_or(size, |min| size.max(min));
        self.max.map_or(size, |max| size.min(max))
    }

    fn validate(&self) -> Result<()> {
        if let (Some(min), Some(max)) = (self.min, self.max)
            && min > max
        {
            return Err(Error::out_of_range(format!("autofit minimum {} above maximum {}", min, max)));
        }
        if let (Some(start), Some(end)) = (self.start, self.end)
            && start > end
        {
            return Err(Error::out_of_range(format!("autofit bounds {}..{}", start, end)));
        }
        Ok(())
    }
}

/// Width of one character in digit widths
fn char_width(c: char) -> f64 {
    match c {
        '\u{1100}'..='\u{115F}'
        | '\u{2E80}'..='\u{A4CF}'
        | '\u{AC00}'..='\u{D7A3}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{FF00}'..='\u{FF60}' => 2.0,
        'i' | 'l' | 'j' | 't' | 'f' | 'r' | 'I' | '.' | ',' | ':' | ';' | '\'' | '!' | '|' | ' ' => 0.5,
        'm' | 'w' | 'M' | 'W' | '@' => 1.3,
        c if c.is_ascii_uppercase() => 1.1,
        c if c.is_ascii_digit() => 1.0,
        _ => 0.9,
    }
}

/// Width in characters of the widest line of `text`
pub(crate) fn text_width(text: &str, font: &Font, config: &AutoFitConfig) -> f64 {
    let widest = text
        .lines()
        .map(|line| line.chars().map(char_width).sum::<f64>())
        .fold(0.0, f64::max);
    let bold = if font.bold { config.bold_factor } else { 1.0 };
    widest * font.size_points() / 11.0 * bold
}

/// Height in points of `text`, one line per newline
pub(crate) fn text_height(text: &str, font: &Font) -> f64 {
    let lines = text.lines().count().max(1) as f64;
    lines * font.size_points() * LINE_HEIGHT / 11.0
}

/// Round up to the 1/256 character granularity of stored widths
fn round_width(width: f64) -> f64 {
    (width * 256.0).ceil() / 256.0
}

struct Measure<'a> {
    sheet: &'a Worksheet,
    styles: &'a StylePool,
    date1904: bool,
}

impl Measure<'_> {
    fn texts<'c>(&self, cells: impl Iterator<Item = (CellAddress, &'c Cell)>) -> Vec<(String, Font)> {
        cells
            .filter(|(addr, _)| !self.sheet.merges.iter().any(|m| m.contains(*addr)))
            .filter(|(_, cell)| !cell.value().is_empty())
            .map(|(_, cell)| {
                let style = self.styles.get(cell.style_id());
                (
                    format_value(cell.value(), &style.number_format, self.date1904),
                    style.font.clone(),
                )
            })
            .collect()
    }

    fn column(&self, col: u32, rows: CellRange, config: &AutoFitConfig) -> Option<f64> {
        let range = CellRange::new(
            CellAddress::new(rows.start.row, col),
            CellAddress::new(rows.end.row, col),
        );
        self.texts(self.sheet.cells_in(range))
            .iter()
            .map(|(text, font)| text_width(text, font, config))
            .reduce(f64::max)
            .map(|w| round_width(w + config.padding))
    }

    fn row(&self, row: u32, cols: CellRange) -> Option<f64> {
        let range = CellRange::new(
            CellAddress::new(row, cols.start.col),
            CellAddress::new(row, cols.end.col),
        );
        self.texts(self.sheet.cells_in(range))
            .iter()
            .map(|(text, font)| text_height(text, font))
            .reduce(f64::max)
    }
}

impl WorksheetMut<'_> {
    /// Size columns `first..=last` to their widest displayed value. Columns
    /// without content and cells inside merged ranges are ignored.
    pub fn autofit_columns(&mut self, first: u32, last: u32, options: AutoFitOptions) -> Result<()> {
        self.book.ensure_open()?;
        options.validate()?;
        if first > last {
            return Err(Error::out_of_range(format!("columns {}..{}", first, last)));
        }
        Worksheet::check_column(first, last - first + 1)?;
        let rows = CellRange::from_coords(
            options.start.unwrap_or(0),
            0,
            options.end.unwrap_or(crate::address::MAX_ROWS - 1),
            0,
        )?;
        let config = self.book.config.autofit.clone();
        let widths: Vec<(u32, f64)> = {
            let measure = Measure {
                sheet: &self.book.sheets[self.index],
                styles: &self.book.styles,
                date1904: self.book.date1904,
            };
            (first..=last)
                .into_par_iter()
                .filter_map(|col| measure.column(col, rows, &config).map(|w| (col, w)))
                .collect()
        };
        for (col, width) in widths {
            let width = options.clamp(width).min(MAX_COLUMN_WIDTH);
            self.column_info_mut(col, |info| {
                info.width = Some(width);
                info.best_fit = true;
            });
        }
        Ok(())
    }

    /// Size rows `first..=last` to their tallest displayed value
    pub fn autofit_rows(&mut self, first: u32, last: u32, options: AutoFitOptions) -> Result<()> {
        self.book.ensure_open()?;
        options.validate()?;
        if first > last {
            return Err(Error::out_of_range(format!("rows {}..{}", first, last)));
        }
        Worksheet::check_row(first, last - first + 1)?;
        let cols = CellRange::from_coords(
            0,
            options.start.unwrap_or(0),
            0,
            options.end.unwrap_or(crate::address::MAX_COLS - 1),
        )?;
        let heights: Vec<(u32, f64)> = {
            let measure = Measure {
                sheet: &self.book.sheets[self.index],
                styles: &self.book.styles,
                date1904: self.book.date1904,
            };
            let rows: Vec<u32> = measure
                .sheet
                .cells
                .range(first..=last)
                .map(|(row, _)| *row)
                .collect();
            rows.into_par_iter()
                .filter_map(|row| measure.row(row, cols).map(|h| (row, h)))
                .collect()
        };
        for (row, height) in heights {
            let height = options.clamp(height).min(MAX_ROW_HEIGHT);
            self.row_info_mut(row, |info| info.height = Some(height));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Workbook;

    #[test]
    fn test_character_classes() {
        let config = AutoFitConfig::default();
        let font = Font::default();
        assert_eq!(text_width("1234", &font, &config), 4.0);
        assert!(text_width("WWW", &font, &config) > text_width("iii", &font, &config));
        assert_eq!(text_width("中文", &font, &config), 4.0);
        assert_eq!(text_width("ab\nabcd", &font, &config), text_width("abcd", &font, &config));
        let big = Font::new("Calibri", 22.0).bold();
        assert_eq!(text_width("1", &big, &config), 2.0 * config.bold_factor);
        assert_eq!(text_height("a\nb", &font), 30.0);
    }

    #[test]
    fn test_autofit_is_idempotent() {
        let mut book = Workbook::new();
        let mut ws = book.worksheet_mut(0).unwrap();
        ws.set_value("A1", "short").unwrap();
        ws.set_value("A2", "a considerably longer value").unwrap();
        ws.set_value("B1", 12345).unwrap();
        ws.autofit_columns(0, 2, AutoFitOptions::default()).unwrap();
        let first = (ws.column_width(0), ws.column_width(1));
        ws.autofit_columns(0, 2, AutoFitOptions::default()).unwrap();
        assert_eq!((ws.column_width(0), ws.column_width(1)), first);
        assert!(first.0 > first.1);
        assert!(ws.column(2).is_none());
        assert_eq!((first.1 * 256.0).fract(), 0.0);
    }

    #[test]
    fn test_bounds_and_merges() {
        let mut book = Workbook::new();
        let mut ws = book.worksheet_mut(0).unwrap();
        ws.set_value("A1", "a very very long title that spans columns").unwrap();
        ws.merge_cells("A1:D1").unwrap();
        ws.set_value("A2", "x").unwrap();
        ws.autofit_columns(0, 0, AutoFitOptions::between(5.0, 50.0)).unwrap();
        assert_eq!(ws.column_width(0), 5.0);

        ws.set_value("B3", "line one\nline two").unwrap();
        ws.autofit_rows(0, 5, AutoFitOptions::default()).unwrap();
        assert_eq!(ws.row_height(2), 30.0);
        assert!(matches!(
            ws.autofit_rows(0, 1, AutoFitOptions::between(10.0, 5.0)),
            Err(Error::IndexOutOfRange(_))
        ));
    }
}
