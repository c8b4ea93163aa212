//! Formula syntax tree and reference types

use crate::address::{CellAddress, CellRange, MAX_COLS, MAX_ROWS, column_name, same_name};
use crate::model::ErrorValue;
use std::fmt;

/// One coordinate of a reference with its `$` anchoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coord {
    pub index: u32,
    pub absolute: bool,
}

impl Coord {
    pub fn new(index: u32, absolute: bool) -> Self {
        Self { index, absolute }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRef {
    pub row: Coord,
    pub col: Coord,
}

impl CellRef {
    pub fn relative(row: u32, col: u32) -> Self {
        Self {
            row: Coord::new(row, false),
            col: Coord::new(col, false),
        }
    }

    pub fn address(&self) -> CellAddress {
        CellAddress::new(self.row.index, self.col.index)
    }
}

/// Shape of the referenced area
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefTarget {
    Cell(CellRef),
    Area(CellRef, CellRef),
    /// `A:C`
    Columns(Coord, Coord),
    /// `2:5`
    Rows(Coord, Coord),
}

impl RefTarget {
    /// Normalized rectangle covered by the reference
    pub fn bounds(&self) -> CellRange {
        match self {
            RefTarget::Cell(c) => CellRange::single(c.address()),
            RefTarget::Area(a, b) => CellRange::new(a.address(), b.address()),
            RefTarget::Columns(a, b) => CellRange::new(
                CellAddress::new(0, a.index),
                CellAddress::new(MAX_ROWS - 1, b.index),
            ),
            RefTarget::Rows(a, b) => CellRange::new(
                CellAddress::new(a.index, 0),
                CellAddress::new(b.index, MAX_COLS - 1),
            ),
        }
    }

    /// Shift relative coordinates by (rows, cols); `None` when a coordinate
    /// leaves the grid
    pub fn offset(&self, rows: i64, cols: i64) -> Option<RefTarget> {
        fn shift(coord: Coord, delta: i64, max: u32) -> Option<Coord> {
            if coord.absolute {
                return Some(coord);
            }
            let moved = coord.index as i64 + delta;
            (0..max as i64)
                .contains(&moved)
                .then(|| Coord::new(moved as u32, false))
        }
        let cell = |c: &CellRef| -> Option<CellRef> {
            Some(CellRef {
                row: shift(c.row, rows, MAX_ROWS)?,
                col: shift(c.col, cols, MAX_COLS)?,
            })
        };
        Some(match self {
            RefTarget::Cell(c) => RefTarget::Cell(cell(c)?),
            RefTarget::Area(a, b) => RefTarget::Area(cell(a)?, cell(b)?),
            RefTarget::Columns(a, b) => {
                RefTarget::Columns(shift(*a, cols, MAX_COLS)?, shift(*b, cols, MAX_COLS)?)
            }
            RefTarget::Rows(a, b) => {
                RefTarget::Rows(shift(*a, rows, MAX_ROWS)?, shift(*b, rows, MAX_ROWS)?)
            }
        })
    }
}

fn write_col(f: &mut fmt::Formatter<'_>, c: Coord) -> fmt::Result {
    if c.absolute {
        f.write_str("$")?;
    }
    f.write_str(&column_name(c.index))
}

fn write_row(f: &mut fmt::Formatter<'_>, r: Coord) -> fmt::Result {
    if r.absolute {
        f.write_str("$")?;
    }
    write!(f, "{}", r.index + 1)
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_col(f, self.col)?;
        write_row(f, self.row)
    }
}

impl fmt::Display for RefTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefTarget::Cell(c) => write!(f, "{}", c),
            RefTarget::Area(a, b) => write!(f, "{}:{}", a, b),
            RefTarget::Columns(a, b) => {
                write_col(f, *a)?;
                f.write_str(":")?;
                write_col(f, *b)
            }
            RefTarget::Rows(a, b) => {
                write_row(f, *a)?;
                f.write_str(":")?;
                write_row(f, *b)
            }
        }
    }
}

/// A possibly sheet-qualified reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub sheet: Option<String>,
    pub target: RefTarget,
}

impl Reference {
    pub fn local(target: RefTarget) -> Self {
        Self {
            sheet: None,
            target,
        }
    }

    /// Does the reference point into `sheet`, given the sheet that owns the
    /// formula?
    pub fn targets_sheet(&self, owner: &str, sheet: &str) -> bool {
        match &self.sheet {
            Some(name) => same_name(name, sheet),
            None => same_name(owner, sheet),
        }
    }
}

/// Quote a sheet name for use in a formula when it is not a plain identifier
pub fn quote_sheet_name(name: &str) -> String {
    let plain = !name.is_empty()
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        && crate::address::parse_cell_ref(name).is_none()
        && !name.eq_ignore_ascii_case("TRUE")
        && !name.eq_ignore_ascii_case("FALSE");
    if plain {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sheet) = &self.sheet {
            write!(f, "{}!", quote_sheet_name(sheet))?;
        }
        write!(f, "{}", self.target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Bool(bool),
    Error(ErrorValue),
    Reference(Reference),
    /// Defined or unknown name
    Name(String),
    Unary(UnaryOp, Box<Expr>),
    Percent(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    /// Omitted function argument, as in `IF(A1,,1)`
    Missing,
}

impl Expr {
    /// Every reference in the tree, in source order
    pub fn references(&self) -> Vec<Reference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references(&self, out: &mut Vec<Reference>) {
        match self {
            Expr::Reference(r) => out.push(r.clone()),
            Expr::Unary(_, e) | Expr::Percent(e) => e.collect_references(out),
            Expr::Binary(_, a, b) => {
                a.collect_references(out);
                b.collect_references(out);
            }
            Expr::Call(_, args) => args.iter().for_each(|a| a.collect_references(out)),
            _ => {}
        }
    }
}
