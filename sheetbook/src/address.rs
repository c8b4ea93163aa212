//! A1-style cell addresses and rectangular ranges
//!
//! Indices are zero-based everywhere in the API; the A1 text form is
//! one-based for rows, as in the spreadsheet UI.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Number of rows in a worksheet
pub const MAX_ROWS: u32 = 1_048_576;
/// Number of columns in a worksheet
pub const MAX_COLS: u32 = 16_384;

/// Case-folded form of a sheet, table or defined name
pub(crate) fn fold_name(name: &str) -> String {
    name.to_lowercase()
}

/// Sheet, table and defined names compare case-insensitively, beyond ASCII
pub(crate) fn same_name(a: &str, b: &str) -> bool {
    a == b || fold_name(a) == fold_name(b)
}

/// Convert a zero-based column index to letters ("A", "AB", ...)
pub fn column_name(col: u32) -> String {
    let mut n = col + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Convert column letters to a zero-based index
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let mut col = 0u32;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        col = col * 26 + (ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }
    if col == 0 || col > MAX_COLS {
        return None;
    }
    Some(col - 1)
}

/// Parse a cell reference like "A1" or "$B$2" into zero-based (row, col)
pub fn parse_cell_ref(cell_ref: &str) -> Option<(u32, u32)> {
    let s = cell_ref.trim();
    let letters_end = s
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphabetic() || *c == '$'))
        .map(|(i, _)| i)?;
    let letters: String = s[..letters_end].chars().filter(|c| *c != '$').collect();
    let digits = s[letters_end..].strip_prefix('$').unwrap_or(&s[letters_end..]);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let col = column_index(&letters)?;
    let row = digits.parse::<u32>().ok()?;
    if row == 0 || row > MAX_ROWS {
        return None;
    }
    Some((row - 1, col))
}

/// A single cell position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellAddress {
    pub row: u32,
    pub col: u32,
}

impl CellAddress {
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Build an address, failing when it lies outside the sheet bounds
    pub fn checked(row: u32, col: u32) -> Result<Self> {
        if row >= MAX_ROWS || col >= MAX_COLS {
            return Err(Error::out_of_range(format!(
                "cell ({}, {}) is outside the {}x{} grid",
                row, col, MAX_ROWS, MAX_COLS
            )));
        }
        Ok(Self { row, col })
    }

    pub fn parse(text: &str) -> Result<Self> {
        parse_cell_ref(text)
            .map(|(row, col)| Self { row, col })
            .ok_or_else(|| Error::invalid_range(format!("malformed cell address '{}'", text)))
    }

    pub fn to_a1(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_name(self.col), self.row + 1)
    }
}

impl FromStr for CellAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Inclusive rectangular range, always normalized so `start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRange {
    pub start: CellAddress,
    pub end: CellAddress,
}

impl CellRange {
    pub fn new(a: CellAddress, b: CellAddress) -> Self {
        Self {
            start: CellAddress::new(a.row.min(b.row), a.col.min(b.col)),
            end: CellAddress::new(a.row.max(b.row), a.col.max(b.col)),
        }
    }

    pub fn single(cell: CellAddress) -> Self {
        Self {
            start: cell,
            end: cell,
        }
    }

    pub fn from_coords(first_row: u32, first_col: u32, last_row: u32, last_col: u32) -> Result<Self> {
        let a = CellAddress::checked(first_row, first_col)?;
        let b = CellAddress::checked(last_row, last_col)?;
        Ok(Self::new(a, b))
    }

    /// Parse "A1:B2" or a single "A1"
    pub fn parse(text: &str) -> Result<Self> {
        let mut parts = text.trim().split(':');
        let first = parts.next().unwrap_or_default();
        let second = parts.next();
        if parts.next().is_some() {
            return Err(Error::invalid_range(format!("malformed range '{}'", text)));
        }
        let start = CellAddress::parse(first)
            .map_err(|_| Error::invalid_range(format!("malformed range '{}'", text)))?;
        let end = match second {
            Some(second) => CellAddress::parse(second)
                .map_err(|_| Error::invalid_range(format!("malformed range '{}'", text)))?,
            None => start,
        };
        Ok(Self::new(start, end))
    }

    /// Whole rows `first..=last`
    pub fn rows(first: u32, last: u32) -> Result<Self> {
        Self::from_coords(first, 0, last, MAX_COLS - 1)
    }

    /// Whole columns `first..=last`
    pub fn columns(first: u32, last: u32) -> Result<Self> {
        Self::from_coords(0, first, MAX_ROWS - 1, last)
    }

    pub fn row_count(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    pub fn col_count(&self) -> u32 {
        self.end.col - self.start.col + 1
    }

    pub fn cell_count(&self) -> u64 {
        self.row_count() as u64 * self.col_count() as u64
    }

    pub fn is_single_cell(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, cell: CellAddress) -> bool {
        (self.start.row..=self.end.row).contains(&cell.row)
            && (self.start.col..=self.end.col).contains(&cell.col)
    }

    pub fn contains_range(&self, other: &CellRange) -> bool {
        self.contains(other.start) && self.contains(other.end)
    }

    pub fn intersects(&self, other: &CellRange) -> bool {
        self.start.row <= other.end.row
            && other.start.row <= self.end.row
            && self.start.col <= other.end.col
            && other.start.col <= self.end.col
    }

    /// Spans every column of the sheet
    pub fn is_full_rows(&self) -> bool {
        self.start.col == 0 && self.end.col == MAX_COLS - 1
    }

    /// Spans every row of the sheet
    pub fn is_full_columns(&self) -> bool {
        self.start.row == 0 && self.end.row == MAX_ROWS - 1
    }

    /// Row-major iteration over every position of the range
    pub fn iter(&self) -> impl Iterator<Item = CellAddress> + use<> {
        let (r0, r1, c0, c1) = (self.start.row, self.end.row, self.start.col, self.end.col);
        (r0..=r1).flat_map(move |row| (c0..=c1).map(move |col| CellAddress::new(row, col)))
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single_cell() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

impl FromStr for CellRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Anything that names one cell: `"B6"`, `(row, col)` or a [`CellAddress`]
pub trait IntoAddress {
    fn into_address(self) -> Result<CellAddress>;
}

impl IntoAddress for CellAddress {
    fn into_address(self) -> Result<CellAddress> {
        CellAddress::checked(self.row, self.col)
    }
}

impl IntoAddress for (u32, u32) {
    fn into_address(self) -> Result<CellAddress> {
        CellAddress::checked(self.0, self.1)
    }
}

impl IntoAddress for &str {
    fn into_address(self) -> Result<CellAddress> {
        CellAddress::parse(self)
    }
}

impl IntoAddress for &String {
    fn into_address(self) -> Result<CellAddress> {
        CellAddress::parse(self)
    }
}

/// Anything that names a rectangle: `"A1:C3"`, `(first_row, first_col,
/// last_row, last_col)`, a pair of corners or a [`CellRange`]
pub trait IntoRange {
    fn into_range(self) -> Result<CellRange>;
}

impl IntoRange for CellRange {
    fn into_range(self) -> Result<CellRange> {
        CellRange::from_coords(self.start.row, self.start.col, self.end.row, self.end.col)
    }
}

impl IntoRange for CellAddress {
    fn into_range(self) -> Result<CellRange> {
        Ok(CellRange::single(self.into_address()?))
    }
}

impl IntoRange for (CellAddress, CellAddress) {
    fn into_range(self) -> Result<CellRange> {
        Ok(CellRange::new(self.0.into_address()?, self.1.into_address()?))
    }
}

impl IntoRange for (u32, u32) {
    fn into_range(self) -> Result<CellRange> {
        Ok(CellRange::single(self.into_address()?))
    }
}

impl IntoRange for (u32, u32, u32, u32) {
    fn into_range(self) -> Result<CellRange> {
        CellRange::from_coords(self.0, self.1, self.2, self.3)
    }
}

impl IntoRange for &str {
    fn into_range(self) -> Result<CellRange> {
        CellRange::parse(self)
    }
}

impl IntoRange for (&str, &str) {
    fn into_range(self) -> Result<CellRange> {
        Ok(CellRange::new(
            CellAddress::parse(self.0)?,
            CellAddress::parse(self.1)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cell_ref() {
        assert_eq!(parse_cell_ref("A1"), Some((0, 0)));
        assert_eq!(parse_cell_ref("B2"), Some((1, 1)));
        assert_eq!(parse_cell_ref("Z26"), Some((25, 25)));
        assert_eq!(parse_cell_ref("AA1"), Some((0, 26)));
        assert_eq!(parse_cell_ref("$AB$10"), Some((9, 27)));
        assert_eq!(parse_cell_ref("XFD1048576"), Some((1_048_575, 16_383)));
        assert_eq!(parse_cell_ref("XFE1"), None);
        assert_eq!(parse_cell_ref("A0"), None);
        assert_eq!(parse_cell_ref("A1048577"), None);
        assert_eq!(parse_cell_ref("1A"), None);
    }

    #[test]
    fn test_column_names() {
        assert_eq!(column_name(0), "A");
        assert_eq!(column_name(25), "Z");
        assert_eq!(column_name(26), "AA");
        assert_eq!(column_name(16_383), "XFD");
        assert_eq!(column_index("xfd"), Some(16_383));
    }

    #[test]
    fn test_parse_cell_range() {
        let range = CellRange::parse("C4:A1").unwrap();
        assert_eq!(range.start, CellAddress::new(0, 0));
        assert_eq!(range.end, CellAddress::new(3, 2));
        assert_eq!(range.to_string(), "A1:C4");
        assert_eq!(CellRange::parse("B2").unwrap().to_string(), "B2");
        assert!(CellRange::parse("A1:B2:C3").is_err());
        assert!(matches!(CellRange::parse("A1:?"), Err(Error::InvalidRange(_))));
    }

    #[test]
    fn test_bounds_are_enforced() {
        assert!(matches!(
            (MAX_ROWS, 0).into_address(),
            Err(Error::IndexOutOfRange(_))
        ));
        assert!((MAX_ROWS - 1, MAX_COLS - 1).into_address().is_ok());
    }

    #[test]
    fn test_range_geometry() {
        let a = CellRange::parse("B2:D5").unwrap();
        let b = CellRange::parse("D5:E9").unwrap();
        let c = CellRange::parse("E1:F1").unwrap();
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert_eq!(a.cell_count(), 12);
        assert_eq!(a.iter().count(), 12);
        assert!(CellRange::rows(2, 3).unwrap().is_full_rows());
    }
}
