//! sheetbook: an in-memory spreadsheet engine
//!
//! Build or load a [`Workbook`], edit worksheets through the
//! [`WorksheetMut`] guard, recalculate formulas, and save the result as a
//! SpreadsheetML (`.xlsx`) package.
//!
//! ```no_run
//! use sheetbook::{Workbook, Result};
//!
//! fn main() -> Result<()> {
//!     let mut book = Workbook::new();
//!     let mut sheet = book.worksheet_mut(0)?;
//!     sheet.set_value("A1", 20)?;
//!     sheet.set_formula("A2", "=A1*2")?;
//!     book.calculate_formulas()?;
//!     book.save_as("report.xlsx")
//! }
//! ```

pub mod address;
pub mod config;
pub mod error;
pub mod formula;
pub mod model;
pub mod package;
pub mod pool;

pub use address::{CellAddress, CellRange, IntoAddress, IntoRange, MAX_COLS, MAX_ROWS};
pub use config::{AutoFitConfig, EngineConfig};
pub use error::{Error, Result};
pub use formula::{CalcReport, CalcScope};
pub use model::{
    Annotation, AutoFitOptions, CellValue, ClearOptions, Color, DataTable, DeleteShift, ErrorValue, Font, Hyperlink,
    HyperlinkTarget, ImportData, ImportOptions, InsertShift, PictureOptions, ProtectionOptions, RichText, SheetKey,
    Style, Visibility, Workbook, Worksheet, WorksheetMut,
};
pub use package::Source;
pub use pool::{SharedStringPool, StringId, StyleId, StylePool};
