//! Document model: workbook, worksheets, cells and the objects on them

mod annotation;
mod autofit;
mod cell;
pub mod date;
pub mod display;
mod hyperlink;
mod import;
mod merge;
mod picture;
mod protection;
mod sheet_mut;
mod structure;
mod style;
mod table;
mod value;
mod view;
mod workbook;
mod worksheet;

pub use annotation::{Annotation, AnchorPoint, CommentEntry, CommentThread, Note, NoteBox};
pub use autofit::AutoFitOptions;
pub use cell::{Cell, Formula};
pub use hyperlink::{Hyperlink, HyperlinkTarget};
pub use import::{DataTable, ImportData, ImportOptions};
pub use picture::{EMU_PER_PIXEL, ImageFormat, Marker, Picture, PictureOptions, Placement, image_size};
pub use protection::{PasswordHash, ProtectionOptions, SheetProtection, legacy_password_hash};
pub use sheet_mut::{ClearOptions, WorksheetMut};
pub use structure::{DeleteShift, InsertShift};
pub use style::{
    Alignment, Border, BorderLine, CellProtection, Color, Fill, FillPattern, Font, HorizontalAlignment, LineStyle,
    Style, Underline, VerticalAlignment, VerticalTextAlign,
};
pub use table::{ColumnFilter, Table, TableColumn};
pub use value::{CellValue, ErrorValue, RichText, TextRun};
pub use view::{Panes, SheetView, ViewType};
pub use workbook::{DefinedName, MAX_SHEET_NAME_LEN, SheetKey, Workbook, validate_sheet_name};
pub use worksheet::{ColumnInfo, RowInfo, Visibility, Worksheet};

pub(crate) use annotation::person_id;
pub(crate) use worksheet::PreservedElement;
