//! Expression evaluation
//!
//! The evaluator is pure: it reads cell values through an [`EvalContext`]
//! and never recurses into other formulas. Ordering formula cells so that
//! every precedent is computed first is the job of the calculation pass.

use super::ast::{BinaryOp, Expr, RefTarget, Reference, UnaryOp};
use super::functions;
use crate::address::{CellAddress, CellRange};
use crate::model::ErrorValue;
use crate::model::display::general_number;
use std::cmp::Ordering;

/// Intermediate value during evaluation
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    Error(ErrorValue),
    /// Unresolved area; collapsed by functions or implicit intersection
    Range { sheet: usize, range: CellRange },
}

impl From<ErrorValue> for Value {
    fn from(e: ErrorValue) -> Self {
        Value::Error(e)
    }
}

impl From<Result<f64, ErrorValue>> for Value {
    fn from(r: Result<f64, ErrorValue>) -> Self {
        match r {
            Ok(n) if n.is_finite() => Value::Number(n),
            Ok(_) => Value::Error(ErrorValue::Num),
            Err(e) => Value::Error(e),
        }
    }
}

/// Read access to cell values for one calculation
pub(crate) trait EvalContext {
    fn sheet_index(&self, name: &str) -> Option<usize>;

    /// Scalar value of one cell; `Value::Empty` for untouched cells
    fn value_at(&self, sheet: usize, cell: CellAddress) -> Value;

    /// Non-empty cells inside `range`, row-major
    fn cells_in(&self, sheet: usize, range: &CellRange) -> Vec<(CellAddress, Value)>;

    fn date1904(&self) -> bool;
}

pub(crate) fn to_number(value: &Value) -> Result<f64, ErrorValue> {
    match value {
        Value::Empty => Ok(0.0),
        Value::Number(n) => Ok(*n),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Text(s) => parse_number_text(s).ok_or(ErrorValue::Value),
        Value::Error(e) => Err(*e),
        Value::Range { .. } => Err(ErrorValue::Value),
    }
}

/// Numeric text as typed into a cell: "12", " 1.5e3 ", "50%"
pub(crate) fn parse_number_text(text: &str) -> Option<f64> {
    let t = text.trim();
    if t.is_empty() {
        return None;
    }
    if let Some(percent) = t.strip_suffix('%') {
        return percent.trim().parse::<f64>().ok().map(|n| n / 100.0);
    }
    t.parse::<f64>().ok().filter(|n| n.is_finite())
}

pub(crate) fn to_text(value: &Value) -> Result<String, ErrorValue> {
    match value {
        Value::Empty => Ok(String::new()),
        Value::Number(n) => Ok(general_number(*n)),
        Value::Bool(true) => Ok("TRUE".to_string()),
        Value::Bool(false) => Ok("FALSE".to_string()),
        Value::Text(s) => Ok(s.clone()),
        Value::Error(e) => Err(*e),
        Value::Range { .. } => Err(ErrorValue::Value),
    }
}

pub(crate) fn to_bool(value: &Value) -> Result<bool, ErrorValue> {
    match value {
        Value::Empty => Ok(false),
        Value::Number(n) => Ok(*n != 0.0),
        Value::Bool(b) => Ok(*b),
        Value::Text(s) if s.eq_ignore_ascii_case("TRUE") => Ok(true),
        Value::Text(s) if s.eq_ignore_ascii_case("FALSE") => Ok(false),
        Value::Text(_) | Value::Range { .. } => Err(ErrorValue::Value),
        Value::Error(e) => Err(*e),
    }
}

/// Spreadsheet ordering: numbers < text < booleans, text case-insensitive,
/// empty takes the type of the other side
pub(crate) fn compare(a: &Value, b: &Value) -> Result<Ordering, ErrorValue> {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Number(_) => 0,
            Value::Text(_) => 1,
            Value::Bool(_) => 2,
            _ => 3,
        }
    }
    match (a, b) {
        (Value::Error(e), _) | (_, Value::Error(e)) => Err(*e),
        (Value::Range { .. }, _) | (_, Value::Range { .. }) => Err(ErrorValue::Value),
        (Value::Empty, Value::Empty) => Ok(Ordering::Equal),
        (Value::Empty, Value::Number(_)) => compare(&Value::Number(0.0), b),
        (Value::Number(_), Value::Empty) => compare(a, &Value::Number(0.0)),
        (Value::Empty, Value::Text(s)) => Ok("".cmp(s.as_str())),
        (Value::Text(s), Value::Empty) => Ok(s.as_str().cmp("")),
        (Value::Empty, Value::Bool(b)) => Ok(false.cmp(b)),
        (Value::Bool(b), Value::Empty) => Ok(b.cmp(&false)),
        (Value::Number(x), Value::Number(y)) => Ok(x.partial_cmp(y).unwrap_or(Ordering::Equal)),
        (Value::Text(x), Value::Text(y)) => Ok(x.to_lowercase().cmp(&y.to_lowercase())),
        (Value::Bool(x), Value::Bool(y)) => Ok(x.cmp(y)),
        _ => Ok(rank(a).cmp(&rank(b))),
    }
}

/// Evaluates expressions on behalf of one formula cell
pub(crate) struct Evaluator<'c, C: EvalContext + ?Sized> {
    pub ctx: &'c C,
    pub sheet: usize,
    pub cell: CellAddress,
}

impl<'c, C: EvalContext + ?Sized> Evaluator<'c, C> {
    pub fn new(ctx: &'c C, sheet: usize, cell: CellAddress) -> Self {
        Self { ctx, sheet, cell }
    }

    /// Evaluate to a scalar, as stored in a cell
    pub fn evaluate(&self, expr: &Expr) -> Value {
        self.scalar(expr)
    }

    /// Evaluate, collapsing ranges by implicit intersection
    pub fn scalar(&self, expr: &Expr) -> Value {
        let value = self.eval(expr);
        self.intersect(value)
    }

    pub fn intersect(&self, value: Value) -> Value {
        let Value::Range { sheet, range } = value else {
            return value;
        };
        if range.is_single_cell() {
            return self.ctx.value_at(sheet, range.start);
        }
        if range.start.col == range.end.col
            && (range.start.row..=range.end.row).contains(&self.cell.row)
        {
            return self
                .ctx
                .value_at(sheet, CellAddress::new(self.cell.row, range.start.col));
        }
        if range.start.row == range.end.row
            && (range.start.col..=range.end.col).contains(&self.cell.col)
        {
            return self
                .ctx
                .value_at(sheet, CellAddress::new(range.start.row, self.cell.col));
        }
        Value::Error(ErrorValue::Value)
    }

    pub fn resolve(&self, reference: &Reference) -> Option<usize> {
        match &reference.sheet {
            None => Some(self.sheet),
            Some(name) => self.ctx.sheet_index(name),
        }
    }

    pub fn eval(&self, expr: &Expr) -> Value {
        match expr {
            Expr::Number(n) => Value::Number(*n),
            Expr::Text(s) => Value::Text(s.clone()),
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Error(e) => Value::Error(*e),
            Expr::Missing => Value::Empty,
            Expr::Name(_) => Value::Error(ErrorValue::Name),
            Expr::Reference(reference) => {
                let Some(sheet) = self.resolve(reference) else {
                    return Value::Error(ErrorValue::Ref);
                };
                match reference.target {
                    RefTarget::Cell(cell) => self.ctx.value_at(sheet, cell.address()),
                    target => Value::Range {
                        sheet,
                        range: target.bounds(),
                    },
                }
            }
            Expr::Unary(op, inner) => {
                let value = self.scalar(inner);
                match op {
                    UnaryOp::Plus => value,
                    UnaryOp::Minus => to_number(&value).map(|n| -n).into(),
                }
            }
            Expr::Percent(inner) => to_number(&self.scalar(inner)).map(|n| n / 100.0).into(),
            Expr::Binary(op, lhs, rhs) => self.binary(*op, lhs, rhs),
            Expr::Call(name, args) => functions::call(self, name, args),
        }
    }

    fn binary(&self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Value {
        let a = self.scalar(lhs);
        let b = self.scalar(rhs);
        match op {
            BinaryOp::Concat => match (to_text(&a), to_text(&b)) {
                (Ok(x), Ok(y)) => Value::Text(x + &y),
                (Err(e), _) | (_, Err(e)) => Value::Error(e),
            },
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
                match compare(&a, &b) {
                    Ok(ord) => Value::Bool(match op {
                        BinaryOp::Eq => ord == Ordering::Equal,
                        BinaryOp::Ne => ord != Ordering::Equal,
                        BinaryOp::Lt => ord == Ordering::Less,
                        BinaryOp::Gt => ord == Ordering::Greater,
                        BinaryOp::Le => ord != Ordering::Greater,
                        _ => ord != Ordering::Less,
                    }),
                    Err(e) => Value::Error(e),
                }
            }
            _ => {
                let (x, y) = match (to_number(&a), to_number(&b)) {
                    (Ok(x), Ok(y)) => (x, y),
                    (Err(e), _) | (_, Err(e)) => return Value::Error(e),
                };
                let result = match op {
                    BinaryOp::Add => Ok(x + y),
                    BinaryOp::Sub => Ok(x - y),
                    BinaryOp::Mul => Ok(x * y),
                    BinaryOp::Div if y == 0.0 => Err(ErrorValue::Div0),
                    BinaryOp::Div => Ok(x / y),
                    BinaryOp::Pow if x == 0.0 && y < 0.0 => Err(ErrorValue::Div0),
                    BinaryOp::Pow => Ok(x.powf(y)),
                    _ => Err(ErrorValue::Value),
                };
                result.into()
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::formula::parse_formula;
    use std::collections::BTreeMap;

    /// Single-sheet context over a literal map
    #[derive(Default)]
    pub(crate) struct MapContext {
        pub cells: BTreeMap<CellAddress, Value>,
    }

    impl MapContext {
        pub fn with(cells: &[(&str, Value)]) -> Self {
            let cells = cells
                .iter()
                .map(|(a, v)| (CellAddress::parse(a).unwrap(), v.clone()))
                .collect();
            Self { cells }
        }

        pub fn eval(&self, formula: &str) -> Value {
            let expr = parse_formula(formula).unwrap();
            Evaluator::new(self, 0, CellAddress::new(0, 25)).evaluate(&expr)
        }
    }

    impl EvalContext for MapContext {
        fn sheet_index(&self, name: &str) -> Option<usize> {
            name.eq_ignore_ascii_case("Sheet1").then_some(0)
        }

        fn value_at(&self, _sheet: usize, cell: CellAddress) -> Value {
            self.cells.get(&cell).cloned().unwrap_or(Value::Empty)
        }

        fn cells_in(&self, _sheet: usize, range: &CellRange) -> Vec<(CellAddress, Value)> {
            self.cells
                .iter()
                .filter(|(a, v)| range.contains(**a) && **v != Value::Empty)
                .map(|(a, v)| (*a, v.clone()))
                .collect()
        }

        fn date1904(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_arithmetic_and_precedence() {
        let ctx = MapContext::default();
        assert_eq!(ctx.eval("=1+2*3"), Value::Number(7.0));
        assert_eq!(ctx.eval("=-2^2"), Value::Number(4.0));
        assert_eq!(ctx.eval("=2^3^2"), Value::Number(64.0));
        assert_eq!(ctx.eval("=50%*10"), Value::Number(5.0));
        assert_eq!(ctx.eval("=10-4-3"), Value::Number(3.0));
        assert_eq!(ctx.eval("=1/0"), Value::Error(ErrorValue::Div0));
        assert_eq!(ctx.eval("=\"a\"&1+1"), Value::Text("a2".to_string()));
    }

    #[test]
    fn test_comparisons() {
        let ctx = MapContext::default();
        assert_eq!(ctx.eval("=\"abc\"=\"ABC\""), Value::Bool(true));
        assert_eq!(ctx.eval("=1<\"a\""), Value::Bool(true));
        assert_eq!(ctx.eval("=A1=0"), Value::Bool(true));
        assert_eq!(ctx.eval("=A1=\"\""), Value::Bool(true));
        assert_eq!(ctx.eval("=2>=3"), Value::Bool(false));
    }

    #[test]
    fn test_references_and_errors() {
        let ctx = MapContext::with(&[
            ("A1", Value::Number(4.0)),
            ("A2", Value::Text("x".to_string())),
            ("A3", Value::Error(ErrorValue::NA)),
        ]);
        assert_eq!(ctx.eval("=A1*2"), Value::Number(8.0));
        assert_eq!(ctx.eval("=A2+1"), Value::Error(ErrorValue::Value));
        assert_eq!(ctx.eval("=A3+1"), Value::Error(ErrorValue::NA));
        assert_eq!(ctx.eval("=Other!A1"), Value::Error(ErrorValue::Ref));
        assert_eq!(ctx.eval("=Sheet1!A1"), Value::Number(4.0));
        assert_eq!(ctx.eval("=undefined_name"), Value::Error(ErrorValue::Name));
        assert_eq!(ctx.eval("=A1:B3"), Value::Error(ErrorValue::Value));
    }

    #[test]
    fn test_implicit_intersection() {
        let ctx = MapContext::with(&[("Z1", Value::Number(9.0)), ("B1", Value::Number(3.0))]);
        let expr = parse_formula("=Z1:Z5+0").unwrap();
        let value = Evaluator::new(&ctx, 0, CellAddress::new(0, 3)).evaluate(&expr);
        assert_eq!(value, Value::Number(9.0));
        let expr = parse_formula("=A1:C1").unwrap();
        let value = Evaluator::new(&ctx, 0, CellAddress::new(4, 1)).evaluate(&expr);
        assert_eq!(value, Value::Number(3.0));
    }
}
