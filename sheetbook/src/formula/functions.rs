//! Built-in worksheet functions
//!
//! Arguments arrive unevaluated so that `IF` and `IFERROR` only evaluate the
//! branch they return. Unknown names evaluate to `#NAME?`.

use super::ast::Expr;
use super::eval::{EvalContext, Evaluator, Value, compare, parse_number_text, to_bool, to_number, to_text};
use crate::address::{CellAddress, CellRange};
use crate::model::ErrorValue;
use crate::model::date::{datetime_to_serial, serial_to_datetime};
use chrono::{Datelike, Local, NaiveDate};
use regex::Regex;
use std::cmp::Ordering;

pub(crate) fn call<C: EvalContext + ?Sized>(ev: &Evaluator<'_, C>, name: &str, args: &[Expr]) -> Value {
    let arity = |min: usize, max: usize| (min..=max).contains(&args.len());
    match name {
        "SUM" => numbers(ev, args).map(|n| n.iter().sum::<f64>()).into(),
        "PRODUCT" => numbers(ev, args)
            .map(|n| if n.is_empty() { 0.0 } else { n.iter().product::<f64>() })
            .into(),
        "AVERAGE" => match numbers(ev, args) {
            Ok(n) if n.is_empty() => ErrorValue::Div0.into(),
            Ok(n) => Value::Number(n.iter().sum::<f64>() / n.len() as f64),
            Err(e) => e.into(),
        },
        "MIN" => numbers(ev, args)
            .map(|n| n.into_iter().reduce(f64::min).unwrap_or(0.0))
            .into(),
        "MAX" => numbers(ev, args)
            .map(|n| n.into_iter().reduce(f64::max).unwrap_or(0.0))
            .into(),
        "COUNT" => Value::Number(count(ev, args, |v, direct| match v {
            Value::Number(_) => true,
            Value::Bool(_) | Value::Text(_) if direct => to_number(v).is_ok(),
            _ => false,
        })),
        "COUNTA" => Value::Number(count(ev, args, |v, _| !matches!(v, Value::Empty))),
        "COUNTBLANK" if arity(1, 1) => count_blank(ev, &args[0]),
        "SUMIF" if arity(2, 3) => conditional(ev, args, Aggregate::Sum),
        "AVERAGEIF" if arity(2, 3) => conditional(ev, args, Aggregate::Average),
        "COUNTIF" if arity(2, 2) => count_if(ev, &args[0], &args[1]),
        "IF" if arity(1, 3) => {
            let condition = ev.scalar(&args[0]);
            match to_bool(&condition) {
                Ok(true) => args.get(1).map_or(Value::Bool(true), |e| branch(ev, e)),
                Ok(false) => args.get(2).map_or(Value::Bool(false), |e| branch(ev, e)),
                Err(e) => e.into(),
            }
        }
        "IFERROR" if arity(2, 2) => match ev.scalar(&args[0]) {
            Value::Error(_) => branch(ev, &args[1]),
            value => value,
        },
        "AND" => logical(ev, args, true),
        "OR" => logical(ev, args, false),
        "NOT" if arity(1, 1) => to_bool(&ev.scalar(&args[0])).map(|b| !b).map(Value::Bool).unwrap_or_else(Value::Error),
        "ABS" if arity(1, 1) => unary(ev, &args[0], |x| Ok(x.abs())),
        "INT" if arity(1, 1) => unary(ev, &args[0], |x| Ok(x.floor())),
        "SQRT" if arity(1, 1) => unary(ev, &args[0], |x| {
            if x < 0.0 { Err(ErrorValue::Num) } else { Ok(x.sqrt()) }
        }),
        "ROUND" if arity(1, 2) => rounding(ev, args, Rounding::Nearest),
        "ROUNDUP" if arity(1, 2) => rounding(ev, args, Rounding::Up),
        "ROUNDDOWN" if arity(1, 2) => rounding(ev, args, Rounding::Down),
        "MOD" if arity(2, 2) => binary(ev, args, |a, b| {
            if b == 0.0 { Err(ErrorValue::Div0) } else { Ok(a - b * (a / b).floor()) }
        }),
        "POWER" if arity(2, 2) => binary(ev, args, |a, b| {
            if a == 0.0 && b < 0.0 { Err(ErrorValue::Div0) } else { Ok(a.powf(b)) }
        }),
        "PI" if arity(0, 0) => Value::Number(std::f64::consts::PI),
        "CONCATENATE" => concat(ev, args, false),
        "CONCAT" => concat(ev, args, true),
        "LEN" if arity(1, 1) => text_fn(ev, &args[0], |s| Value::Number(s.chars().count() as f64)),
        "UPPER" if arity(1, 1) => text_fn(ev, &args[0], |s| Value::Text(s.to_uppercase())),
        "LOWER" if arity(1, 1) => text_fn(ev, &args[0], |s| Value::Text(s.to_lowercase())),
        "TRIM" if arity(1, 1) => text_fn(ev, &args[0], |s| {
            Value::Text(s.split(' ').filter(|w| !w.is_empty()).collect::<Vec<_>>().join(" "))
        }),
        "LEFT" if arity(1, 2) => substring(ev, args, Side::Left),
        "RIGHT" if arity(1, 2) => substring(ev, args, Side::Right),
        "MID" if arity(3, 3) => mid(ev, args),
        "DATE" if arity(3, 3) => date(ev, args),
        "YEAR" if arity(1, 1) => date_part(ev, &args[0], |d| d.year() as f64),
        "MONTH" if arity(1, 1) => date_part(ev, &args[0], |d| d.month() as f64),
        "DAY" if arity(1, 1) => date_part(ev, &args[0], |d| d.day() as f64),
        "TODAY" if arity(0, 0) => {
            let today = Local::now().date_naive().and_time(chrono::NaiveTime::MIN);
            Value::Number(datetime_to_serial(today, ev.ctx.date1904()))
        }
        "NOW" if arity(0, 0) => Value::Number(datetime_to_serial(
            Local::now().naive_local(),
            ev.ctx.date1904(),
        )),
        "ISBLANK" if arity(1, 1) => Value::Bool(matches!(ev.scalar(&args[0]), Value::Empty)),
        "ISNUMBER" if arity(1, 1) => Value::Bool(matches!(ev.scalar(&args[0]), Value::Number(_))),
        "ISTEXT" if arity(1, 1) => Value::Bool(matches!(ev.scalar(&args[0]), Value::Text(_))),
        "ISERROR" if arity(1, 1) => Value::Bool(matches!(ev.scalar(&args[0]), Value::Error(_))),
        "VLOOKUP" if arity(3, 4) => lookup(ev, args, true),
        "HLOOKUP" if arity(3, 4) => lookup(ev, args, false),
        "INDEX" if arity(2, 3) => index(ev, args),
        "MATCH" if arity(2, 3) => match_fn(ev, args),
        _ if is_known(name) => ErrorValue::Value.into(),
        _ => ErrorValue::Name.into(),
    }
}

/// Names of every function the evaluator implements
pub const SUPPORTED_FUNCTIONS: &[&str] = &[
    "SUM", "PRODUCT", "AVERAGE", "MIN", "MAX", "COUNT", "COUNTA", "COUNTBLANK", "SUMIF",
    "AVERAGEIF", "COUNTIF", "IF", "IFERROR", "AND", "OR", "NOT", "ABS", "INT", "SQRT", "ROUND",
    "ROUNDUP", "ROUNDDOWN", "MOD", "POWER", "PI", "CONCATENATE", "CONCAT", "LEN", "UPPER",
    "LOWER", "TRIM", "LEFT", "RIGHT", "MID", "DATE", "YEAR", "MONTH", "DAY", "TODAY", "NOW",
    "ISBLANK", "ISNUMBER", "ISTEXT", "ISERROR", "VLOOKUP", "HLOOKUP", "INDEX", "MATCH",
];

/// Known name called with the wrong number of arguments
fn is_known(name: &str) -> bool {
    SUPPORTED_FUNCTIONS.contains(&name)
}

/// Evaluated argument: direct scalars behave differently from referenced
/// cells in most aggregates
enum Arg {
    Scalar(Value),
    Cells(Vec<Value>),
}

fn expand<C: EvalContext + ?Sized>(ev: &Evaluator<'_, C>, expr: &Expr) -> Arg {
    match ev.eval(expr) {
        Value::Range { sheet, range } => Arg::Cells(
            ev.ctx
                .cells_in(sheet, &range)
                .into_iter()
                .map(|(_, v)| v)
                .collect(),
        ),
        value if matches!(expr, Expr::Reference(_)) => Arg::Cells(vec![value]),
        value => Arg::Scalar(value),
    }
}

/// Numbers for SUM-like functions: referenced text, booleans and blanks are
/// skipped, direct arguments are coerced
fn numbers<C: EvalContext + ?Sized>(ev: &Evaluator<'_, C>, args: &[Expr]) -> Result<Vec<f64>, ErrorValue> {
    let mut out = Vec::new();
    for arg in args {
        if matches!(arg, Expr::Missing) {
            continue;
        }
        match expand(ev, arg) {
            Arg::Cells(values) => {
                for value in values {
                    match value {
                        Value::Number(n) => out.push(n),
                        Value::Error(e) => return Err(e),
                        _ => {}
                    }
                }
            }
            Arg::Scalar(value) => out.push(to_number(&value)?),
        }
    }
    Ok(out)
}

fn count<C: EvalContext + ?Sized>(
    ev: &Evaluator<'_, C>,
    args: &[Expr],
    accept: impl Fn(&Value, bool) -> bool,
) -> f64 {
    let mut total = 0usize;
    for arg in args {
        if matches!(arg, Expr::Missing) {
            continue;
        }
        match expand(ev, arg) {
            Arg::Cells(values) => total += values.iter().filter(|v| accept(v, false)).count(),
            Arg::Scalar(value) => total += usize::from(accept(&value, true)),
        }
    }
    total as f64
}

fn range_arg<C: EvalContext + ?Sized>(ev: &Evaluator<'_, C>, expr: &Expr) -> Result<(usize, CellRange), ErrorValue> {
    match ev.eval(expr) {
        Value::Range { sheet, range } => Ok((sheet, range)),
        Value::Error(e) => Err(e),
        _ => match expr {
            Expr::Reference(reference) => ev
                .resolve(reference)
                .map(|sheet| (sheet, reference.target.bounds()))
                .ok_or(ErrorValue::Ref),
            _ => Err(ErrorValue::Value),
        },
    }
}

fn count_blank<C: EvalContext + ?Sized>(ev: &Evaluator<'_, C>, expr: &Expr) -> Value {
    match range_arg(ev, expr) {
        Ok((sheet, range)) => {
            let filled = ev
                .ctx
                .cells_in(sheet, &range)
                .iter()
                .filter(|(_, v)| !matches!(v, Value::Text(s) if s.is_empty()))
                .count() as u64;
            Value::Number((range.cell_count() - filled) as f64)
        }
        Err(e) => e.into(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CriteriaOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

/// Parsed SUMIF/COUNTIF condition such as `">=10"` or `"a*"`
struct Criteria {
    op: CriteriaOp,
    operand: Value,
    pattern: Option<Regex>,
}

impl Criteria {
    fn parse(value: Value) -> Result<Self, ErrorValue> {
        let text = match value {
            Value::Text(text) => text,
            Value::Error(e) => return Err(e),
            Value::Range { .. } => return Err(ErrorValue::Value),
            operand => {
                return Ok(Self {
                    op: CriteriaOp::Eq,
                    operand,
                    pattern: None,
                });
            }
        };
        let (op, rest) = [
            (">=", CriteriaOp::Ge),
            ("<=", CriteriaOp::Le),
            ("<>", CriteriaOp::Ne),
            (">", CriteriaOp::Gt),
            ("<", CriteriaOp::Lt),
            ("=", CriteriaOp::Eq),
        ]
        .iter()
        .find_map(|(prefix, op)| text.strip_prefix(prefix).map(|rest| (*op, rest)))
        .unwrap_or((CriteriaOp::Eq, text.as_str()));
        let operand = if rest.is_empty() {
            Value::Empty
        } else if let Some(n) = parse_number_text(rest) {
            Value::Number(n)
        } else if rest.eq_ignore_ascii_case("TRUE") || rest.eq_ignore_ascii_case("FALSE") {
            Value::Bool(rest.eq_ignore_ascii_case("TRUE"))
        } else {
            Value::Text(rest.to_string())
        };
        let pattern = match (&operand, op) {
            (Value::Text(t), CriteriaOp::Eq | CriteriaOp::Ne) if t.contains(['*', '?']) => {
                Some(wildcard_regex(t))
            }
            _ => None,
        };
        Ok(Self {
            op,
            operand,
            pattern,
        })
    }

    fn matches(&self, value: &Value) -> bool {
        if let Some(pattern) = &self.pattern {
            let hit = matches!(value, Value::Text(s) if pattern.is_match(s));
            return (self.op == CriteriaOp::Eq) == hit;
        }
        let empty_like = |v: &Value| matches!(v, Value::Empty) || matches!(v, Value::Text(s) if s.is_empty());
        if matches!(self.operand, Value::Empty) {
            return match self.op {
                CriteriaOp::Eq => empty_like(value),
                CriteriaOp::Ne => !empty_like(value),
                _ => false,
            };
        }
        let same_kind = matches!(
            (&self.operand, value),
            (Value::Number(_), Value::Number(_))
                | (Value::Text(_), Value::Text(_))
                | (Value::Bool(_), Value::Bool(_))
        );
        if !same_kind {
            return self.op == CriteriaOp::Ne;
        }
        let Ok(ord) = compare(value, &self.operand) else {
            return false;
        };
        match self.op {
            CriteriaOp::Eq => ord == Ordering::Equal,
            CriteriaOp::Ne => ord != Ordering::Equal,
            CriteriaOp::Lt => ord == Ordering::Less,
            CriteriaOp::Gt => ord == Ordering::Greater,
            CriteriaOp::Le => ord != Ordering::Greater,
            CriteriaOp::Ge => ord != Ordering::Less,
        }
    }
}

fn wildcard_regex(pattern: &str) -> Regex {
    let mut out = String::from("(?i)^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '~' => {
                if let Some(next) = chars.next() {
                    out.push_str(&regex::escape(&next.to_string()));
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out).unwrap_or_else(|_| Regex::new("^$").expect("static pattern"))
}

fn count_if<C: EvalContext + ?Sized>(ev: &Evaluator<'_, C>, range: &Expr, criteria: &Expr) -> Value {
    let (sheet, range) = match range_arg(ev, range) {
        Ok(r) => r,
        Err(e) => return e.into(),
    };
    let criteria = match Criteria::parse(ev.scalar(criteria)) {
        Ok(c) => c,
        Err(e) => return e.into(),
    };
    let cells = ev.ctx.cells_in(sheet, &range);
    let mut total = cells.iter().filter(|(_, v)| criteria.matches(v)).count() as u64;
    if criteria.matches(&Value::Empty) {
        total += range.cell_count() - cells.len() as u64;
    }
    Value::Number(total as f64)
}

enum Aggregate {
    Sum,
    Average,
}

fn conditional<C: EvalContext + ?Sized>(ev: &Evaluator<'_, C>, args: &[Expr], aggregate: Aggregate) -> Value {
    let (sheet, range) = match range_arg(ev, &args[0]) {
        Ok(r) => r,
        Err(e) => return e.into(),
    };
    let criteria = match Criteria::parse(ev.scalar(&args[1])) {
        Ok(c) => c,
        Err(e) => return e.into(),
    };
    let target = match args.get(2) {
        Some(expr) if !matches!(expr, Expr::Missing) => match range_arg(ev, expr) {
            Ok(r) => Some(r),
            Err(e) => return e.into(),
        },
        _ => None,
    };
    let (mut sum, mut n) = (0.0, 0usize);
    for (cell, value) in ev.ctx.cells_in(sheet, &range) {
        if !criteria.matches(&value) {
            continue;
        }
        let summed = match target {
            Some((target_sheet, target_range)) => {
                let at = CellAddress::new(
                    target_range.start.row + (cell.row - range.start.row),
                    target_range.start.col + (cell.col - range.start.col),
                );
                ev.ctx.value_at(target_sheet, at)
            }
            None => value,
        };
        match summed {
            Value::Number(x) => {
                sum += x;
                n += 1;
            }
            Value::Error(e) => return e.into(),
            _ => {}
        }
    }
    match aggregate {
        Aggregate::Sum => Value::Number(sum),
        Aggregate::Average if n == 0 => ErrorValue::Div0.into(),
        Aggregate::Average => Value::Number(sum / n as f64),
    }
}

/// Branch result of IF/IFERROR; an omitted branch yields 0
fn branch<C: EvalContext + ?Sized>(ev: &Evaluator<'_, C>, expr: &Expr) -> Value {
    match expr {
        Expr::Missing => Value::Number(0.0),
        _ => ev.eval(expr),
    }
}

fn logical<C: EvalContext + ?Sized>(ev: &Evaluator<'_, C>, args: &[Expr], all: bool) -> Value {
    let mut seen = false;
    let mut acc = all;
    for arg in args {
        let values = match expand(ev, arg) {
            Arg::Cells(values) => values
                .into_iter()
                .filter(|v| matches!(v, Value::Bool(_) | Value::Number(_) | Value::Error(_)))
                .collect(),
            Arg::Scalar(value) => vec![value],
        };
        for value in values {
            match to_bool(&value) {
                Ok(b) => {
                    seen = true;
                    acc = if all { acc && b } else { acc || b };
                }
                Err(e) => return e.into(),
            }
        }
    }
    if seen { Value::Bool(acc) } else { ErrorValue::Value.into() }
}

fn unary<C: EvalContext + ?Sized>(
    ev: &Evaluator<'_, C>,
    expr: &Expr,
    f: impl Fn(f64) -> Result<f64, ErrorValue>,
) -> Value {
    to_number(&ev.scalar(expr)).and_then(f).into()
}

fn binary<C: EvalContext + ?Sized>(
    ev: &Evaluator<'_, C>,
    args: &[Expr],
    f: impl Fn(f64, f64) -> Result<f64, ErrorValue>,
) -> Value {
    let a = to_number(&ev.scalar(&args[0]));
    let b = to_number(&ev.scalar(&args[1]));
    match (a, b) {
        (Ok(a), Ok(b)) => f(a, b).into(),
        (Err(e), _) | (_, Err(e)) => e.into(),
    }
}

#[derive(Clone, Copy)]
enum Rounding {
    Nearest,
    Up,
    Down,
}

/// Rounding in decimal digits, tolerant of binary representation error
fn round_digits(x: f64, digits: i32, mode: Rounding) -> f64 {
    let factor = 10f64.powi(digits.clamp(-308, 308).abs());
    let scaled = if digits >= 0 { x.abs() * factor } else { x.abs() / factor };
    if !scaled.is_finite() {
        return x;
    }
    let nudged = |v: f64| (v * 1e9).round() / 1e9;
    let magnitude = match mode {
        Rounding::Nearest => {
            let base = scaled.trunc();
            if nudged(scaled - base) >= 0.5 { base + 1.0 } else { base }
        }
        Rounding::Up => nudged(scaled).ceil(),
        Rounding::Down => nudged(scaled).trunc(),
    };
    let rounded = if digits >= 0 { magnitude / factor } else { magnitude * factor };
    rounded.copysign(x)
}

fn rounding<C: EvalContext + ?Sized>(ev: &Evaluator<'_, C>, args: &[Expr], mode: Rounding) -> Value {
    let x = to_number(&ev.scalar(&args[0]));
    let digits = match args.get(1) {
        Some(e) => to_number(&ev.scalar(e)),
        None => Ok(0.0),
    };
    match (x, digits) {
        (Ok(x), Ok(d)) => Value::Number(round_digits(x, d.trunc() as i32, mode)),
        (Err(e), _) | (_, Err(e)) => e.into(),
    }
}

fn concat<C: EvalContext + ?Sized>(ev: &Evaluator<'_, C>, args: &[Expr], ranges: bool) -> Value {
    let mut out = String::new();
    for arg in args {
        let values = if ranges {
            match expand(ev, arg) {
                Arg::Cells(values) => values,
                Arg::Scalar(value) => vec![value],
            }
        } else {
            vec![ev.scalar(arg)]
        };
        for value in values {
            match to_text(&value) {
                Ok(s) => out.push_str(&s),
                Err(e) => return e.into(),
            }
        }
    }
    Value::Text(out)
}

fn text_fn<C: EvalContext + ?Sized>(ev: &Evaluator<'_, C>, expr: &Expr, f: impl Fn(&str) -> Value) -> Value {
    match to_text(&ev.scalar(expr)) {
        Ok(s) => f(&s),
        Err(e) => e.into(),
    }
}

enum Side {
    Left,
    Right,
}

fn substring<C: EvalContext + ?Sized>(ev: &Evaluator<'_, C>, args: &[Expr], side: Side) -> Value {
    let text = match to_text(&ev.scalar(&args[0])) {
        Ok(s) => s,
        Err(e) => return e.into(),
    };
    let n = match args.get(1).map(|e| to_number(&ev.scalar(e))) {
        None => 1.0,
        Some(Ok(n)) if n >= 0.0 => n.trunc(),
        Some(Ok(_)) => return ErrorValue::Value.into(),
        Some(Err(e)) => return e.into(),
    };
    let chars: Vec<char> = text.chars().collect();
    let n = (n as usize).min(chars.len());
    let slice = match side {
        Side::Left => &chars[..n],
        Side::Right => &chars[chars.len() - n..],
    };
    Value::Text(slice.iter().collect())
}

fn mid<C: EvalContext + ?Sized>(ev: &Evaluator<'_, C>, args: &[Expr]) -> Value {
    let text = match to_text(&ev.scalar(&args[0])) {
        Ok(s) => s,
        Err(e) => return e.into(),
    };
    let (start, len) = match (to_number(&ev.scalar(&args[1])), to_number(&ev.scalar(&args[2]))) {
        (Ok(s), Ok(l)) if s >= 1.0 && l >= 0.0 => (s.trunc() as usize - 1, l.trunc() as usize),
        (Err(e), _) | (_, Err(e)) => return e.into(),
        _ => return ErrorValue::Value.into(),
    };
    Value::Text(text.chars().skip(start).take(len).collect())
}

fn date<C: EvalContext + ?Sized>(ev: &Evaluator<'_, C>, args: &[Expr]) -> Value {
    let mut parts = [0f64; 3];
    for (slot, expr) in parts.iter_mut().zip(args) {
        match to_number(&ev.scalar(expr)) {
            Ok(n) => *slot = n.trunc(),
            Err(e) => return e.into(),
        }
    }
    let [year, month, day] = parts;
    // wider than any reachable date, narrow enough for i64 month arithmetic
    if !(0.0..10000.0).contains(&year) || month.abs() > 120_000.0 || day.abs() > 3_660_000.0 {
        return ErrorValue::Num.into();
    }
    let (mut year, month, day) = (year as i64, month as i64, day as i64);
    if year < 1900 {
        year += 1900;
    }
    let months = year * 12 + (month - 1);
    let date = i32::try_from(months.div_euclid(12))
        .ok()
        .and_then(|y| NaiveDate::from_ymd_opt(y, months.rem_euclid(12) as u32 + 1, 1))
        .zip(chrono::TimeDelta::try_days(day - 1))
        .and_then(|(first, offset)| first.checked_add_signed(offset));
    match date {
        Some(d) if d.year() >= 1900 && d.year() <= 9999 => Value::Number(datetime_to_serial(
            d.and_time(chrono::NaiveTime::MIN),
            ev.ctx.date1904(),
        )),
        _ => ErrorValue::Num.into(),
    }
}

fn date_part<C: EvalContext + ?Sized>(ev: &Evaluator<'_, C>, expr: &Expr, f: impl Fn(NaiveDate) -> f64) -> Value {
    match to_number(&ev.scalar(expr)) {
        Ok(serial) => match serial_to_datetime(serial, ev.ctx.date1904()) {
            Some(dt) => Value::Number(f(dt.date())),
            None => ErrorValue::Num.into(),
        },
        Err(e) => e.into(),
    }
}

/// Values along the first column (vertical) or row of `range` with their
/// zero-based offsets
fn lookup_vector<C: EvalContext + ?Sized>(
    ev: &Evaluator<'_, C>,
    sheet: usize,
    range: &CellRange,
    vertical: bool,
) -> Vec<(u32, Value)> {
    let edge = if vertical {
        CellRange::new(range.start, CellAddress::new(range.end.row, range.start.col))
    } else {
        CellRange::new(range.start, CellAddress::new(range.start.row, range.end.col))
    };
    ev.ctx
        .cells_in(sheet, &edge)
        .into_iter()
        .map(|(cell, value)| {
            let offset = if vertical {
                cell.row - range.start.row
            } else {
                cell.col - range.start.col
            };
            (offset, value)
        })
        .collect()
}

fn exact_match(needle: &Value, candidate: &Value) -> bool {
    if let Value::Text(pattern) = needle
        && pattern.contains(['*', '?'])
    {
        return matches!(candidate, Value::Text(s) if wildcard_regex(pattern).is_match(s));
    }
    std::mem::discriminant(needle) == std::mem::discriminant(candidate)
        && compare(needle, candidate) == Ok(Ordering::Equal)
}

/// Largest candidate not greater than the needle in an ascending vector
fn approximate_match(needle: &Value, vector: &[(u32, Value)], descending: bool) -> Option<u32> {
    let mut found = None;
    for (offset, candidate) in vector {
        if std::mem::discriminant(needle) != std::mem::discriminant(candidate) {
            continue;
        }
        let ord = compare(candidate, needle).ok()?;
        let acceptable = if descending {
            ord != Ordering::Less
        } else {
            ord != Ordering::Greater
        };
        if acceptable {
            found = Some(*offset);
        } else {
            break;
        }
    }
    found
}

fn lookup<C: EvalContext + ?Sized>(ev: &Evaluator<'_, C>, args: &[Expr], vertical: bool) -> Value {
    let needle = ev.scalar(&args[0]);
    if let Value::Error(e) = needle {
        return e.into();
    }
    let (sheet, table) = match range_arg(ev, &args[1]) {
        Ok(r) => r,
        Err(e) => return e.into(),
    };
    let index = match to_number(&ev.scalar(&args[2])) {
        Ok(n) if n >= 1.0 => n.trunc() as u32 - 1,
        Ok(_) => return ErrorValue::Value.into(),
        Err(e) => return e.into(),
    };
    let width = if vertical { table.col_count() } else { table.row_count() };
    if index >= width {
        return ErrorValue::Ref.into();
    }
    let approximate = match args.get(3) {
        None | Some(Expr::Missing) => true,
        Some(e) => match to_bool(&ev.scalar(e)) {
            Ok(b) => b,
            Err(e) => return e.into(),
        },
    };
    let vector = lookup_vector(ev, sheet, &table, vertical);
    let hit = if approximate {
        approximate_match(&needle, &vector, false)
    } else {
        vector
            .iter()
            .find(|(_, candidate)| exact_match(&needle, candidate))
            .map(|(offset, _)| *offset)
    };
    match hit {
        Some(offset) => {
            let cell = if vertical {
                CellAddress::new(table.start.row + offset, table.start.col + index)
            } else {
                CellAddress::new(table.start.row + index, table.start.col + offset)
            };
            ev.ctx.value_at(sheet, cell)
        }
        None => ErrorValue::NA.into(),
    }
}

fn index<C: EvalContext + ?Sized>(ev: &Evaluator<'_, C>, args: &[Expr]) -> Value {
    let (sheet, range) = match range_arg(ev, &args[0]) {
        Ok(r) => r,
        Err(e) => return e.into(),
    };
    let mut coords = [0u32; 2];
    for (slot, expr) in coords.iter_mut().zip(&args[1..]) {
        match to_number(&ev.scalar(expr)) {
            Ok(n) if n >= 0.0 => *slot = n.trunc() as u32,
            Ok(_) => return ErrorValue::Value.into(),
            Err(e) => return e.into(),
        }
    }
    let [mut row, mut col] = coords;
    if args.len() == 2 && range.row_count() == 1 {
        (row, col) = (1, row);
    } else if args.len() == 2 && range.col_count() == 1 {
        col = 1;
    }
    if row > range.row_count() || col > range.col_count() {
        return ErrorValue::Ref.into();
    }
    let rows = if row == 0 {
        (range.start.row, range.end.row)
    } else {
        (range.start.row + row - 1, range.start.row + row - 1)
    };
    let cols = if col == 0 {
        (range.start.col, range.end.col)
    } else {
        (range.start.col + col - 1, range.start.col + col - 1)
    };
    let area = CellRange::new(CellAddress::new(rows.0, cols.0), CellAddress::new(rows.1, cols.1));
    if area.is_single_cell() {
        ev.ctx.value_at(sheet, area.start)
    } else {
        Value::Range { sheet, range: area }
    }
}

fn match_fn<C: EvalContext + ?Sized>(ev: &Evaluator<'_, C>, args: &[Expr]) -> Value {
    let needle = ev.scalar(&args[0]);
    if let Value::Error(e) = needle {
        return e.into();
    }
    let (sheet, range) = match range_arg(ev, &args[1]) {
        Ok(r) => r,
        Err(e) => return e.into(),
    };
    let vertical = range.col_count() == 1;
    if !vertical && range.row_count() != 1 {
        return ErrorValue::NA.into();
    }
    let kind = match args.get(2).map(|e| to_number(&ev.scalar(e))) {
        None => 1,
        Some(Ok(n)) if n == 0.0 => 0,
        Some(Ok(n)) if n > 0.0 => 1,
        Some(Ok(_)) => -1,
        Some(Err(e)) => return e.into(),
    };
    let vector = lookup_vector(ev, sheet, &range, vertical);
    let hit = match kind {
        0 => vector
            .iter()
            .find(|(_, candidate)| exact_match(&needle, candidate))
            .map(|(offset, _)| *offset),
        1 => approximate_match(&needle, &vector, false),
        _ => approximate_match(&needle, &vector, true),
    };
    match hit {
        Some(offset) => Value::Number((offset + 1) as f64),
        None => ErrorValue::NA.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::eval::tests::MapContext;

    fn n(x: f64) -> Value {
        Value::Number(x)
    }

    fn t(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    fn salaries() -> MapContext {
        MapContext::with(&[
            ("A6", t("Alice")),
            ("B6", n(52000.0)),
            ("A7", t("Bob")),
            ("B7", t("n/a")),
            ("A8", t("Carol")),
            ("A9", t("Dan")),
        ])
    }

    #[test]
    fn test_average_ignores_empty_and_text() {
        let ctx = salaries();
        assert_eq!(ctx.eval("=AVERAGE(B6:B9)"), n(52000.0));
        assert_eq!(ctx.eval("=SUM(B6:B9)"), n(52000.0));
        assert_eq!(ctx.eval("=COUNT(B6:B9)"), n(1.0));
        assert_eq!(ctx.eval("=COUNTA(A6:B9)"), n(6.0));
        assert_eq!(ctx.eval("=COUNTBLANK(B6:B9)"), n(2.0));
        assert_eq!(ctx.eval("=AVERAGE(C1:C9)"), ErrorValue::Div0.into());
        assert_eq!(ctx.eval("=SUM(\"abc\")"), ErrorValue::Value.into());
        assert_eq!(ctx.eval("=SUM(1,\"2\",TRUE)"), n(4.0));
    }

    #[test]
    fn test_conditionals() {
        let ctx = MapContext::with(&[
            ("A1", n(5.0)),
            ("A2", n(15.0)),
            ("A3", n(25.0)),
            ("B1", t("x")),
            ("B2", t("y")),
            ("B3", t("x")),
        ]);
        assert_eq!(ctx.eval("=SUMIF(A1:A3,\">10\")"), n(40.0));
        assert_eq!(ctx.eval("=SUMIF(B1:B3,\"x\",A1:A3)"), n(30.0));
        assert_eq!(ctx.eval("=COUNTIF(B1:B3,\"X\")"), n(2.0));
        assert_eq!(ctx.eval("=COUNTIF(A1:A4,\"\")"), n(1.0));
        assert_eq!(ctx.eval("=AVERAGEIF(A1:A3,\"<>15\")"), n(15.0));
        assert_eq!(ctx.eval("=COUNTIF(B1:B3,\"?\")"), n(3.0));
        assert_eq!(ctx.eval("=IF(A1>1,\"big\",\"small\")"), t("big"));
        assert_eq!(ctx.eval("=IF(FALSE,1)"), Value::Bool(false));
        assert_eq!(ctx.eval("=IFERROR(1/0,-1)"), n(-1.0));
        assert_eq!(ctx.eval("=AND(A1:A3)"), Value::Bool(true));
        assert_eq!(ctx.eval("=OR(FALSE,0)"), Value::Bool(false));
        assert_eq!(ctx.eval("=NOT(A1)"), Value::Bool(false));
    }

    #[test]
    fn test_math() {
        let ctx = MapContext::default();
        assert_eq!(ctx.eval("=ROUND(2.675,2)"), n(2.68));
        assert_eq!(ctx.eval("=ROUND(-1.5,0)"), n(-2.0));
        assert_eq!(ctx.eval("=ROUND(1234,-2)"), n(1200.0));
        assert_eq!(ctx.eval("=ROUNDUP(1.21,1)"), n(1.3));
        assert_eq!(ctx.eval("=ROUNDDOWN(-1.29,1)"), n(-1.2));
        assert_eq!(ctx.eval("=INT(-1.5)"), n(-2.0));
        assert_eq!(ctx.eval("=MOD(-3,2)"), n(1.0));
        assert_eq!(ctx.eval("=MOD(1,0)"), ErrorValue::Div0.into());
        assert_eq!(ctx.eval("=SQRT(-1)"), ErrorValue::Num.into());
        assert_eq!(ctx.eval("=POWER(2,10)"), n(1024.0));
        assert_eq!(ctx.eval("=MAX(1,7,3)+MIN(4,2)"), n(9.0));
        assert_eq!(ctx.eval("=PRODUCT(2,3,4)"), n(24.0));
    }

    #[test]
    fn test_text_functions() {
        let ctx = MapContext::with(&[("A1", t("  Hello   World ")), ("A2", n(3.5))]);
        assert_eq!(ctx.eval("=TRIM(A1)"), t("Hello World"));
        assert_eq!(ctx.eval("=LEN(TRIM(A1))"), n(11.0));
        assert_eq!(ctx.eval("=LEFT(\"abc\")"), t("a"));
        assert_eq!(ctx.eval("=RIGHT(\"abc\",2)"), t("bc"));
        assert_eq!(ctx.eval("=MID(\"spreadsheet\",7,5)"), t("sheet"));
        assert_eq!(ctx.eval("=UPPER(\"x\")&LOWER(\"Y\")"), t("Xy"));
        assert_eq!(ctx.eval("=CONCATENATE(\"v\",A2)"), t("v3.5"));
        assert_eq!(ctx.eval("=CONCAT(A1:A2)"), t("  Hello   World 3.5"));
    }

    #[test]
    fn test_dates() {
        let ctx = MapContext::default();
        assert_eq!(ctx.eval("=DATE(2024,1,15)"), n(45306.0));
        assert_eq!(ctx.eval("=DATE(2023,13,1)"), n(45292.0));
        assert_eq!(ctx.eval("=YEAR(45306)"), n(2024.0));
        assert_eq!(ctx.eval("=MONTH(45306)"), n(1.0));
        assert_eq!(ctx.eval("=DAY(DATE(2024,3,0))"), n(29.0));
    }

    #[test]
    fn test_lookups() {
        let ctx = MapContext::with(&[
            ("A1", n(1.0)),
            ("B1", t("one")),
            ("A2", n(5.0)),
            ("B2", t("five")),
            ("A3", n(10.0)),
            ("B3", t("ten")),
            ("D1", t("a")),
            ("E1", t("b")),
            ("D2", n(1.0)),
            ("E2", n(2.0)),
        ]);
        assert_eq!(ctx.eval("=VLOOKUP(5,A1:B3,2,FALSE)"), t("five"));
        assert_eq!(ctx.eval("=VLOOKUP(7,A1:B3,2)"), t("five"));
        assert_eq!(ctx.eval("=VLOOKUP(0,A1:B3,2)"), ErrorValue::NA.into());
        assert_eq!(ctx.eval("=VLOOKUP(5,A1:B3,3,FALSE)"), ErrorValue::Ref.into());
        assert_eq!(ctx.eval("=HLOOKUP(\"B\",D1:E2,2,FALSE)"), n(2.0));
        assert_eq!(ctx.eval("=INDEX(A1:B3,3,2)"), t("ten"));
        assert_eq!(ctx.eval("=INDEX(A1:A3,2)"), n(5.0));
        assert_eq!(ctx.eval("=SUM(INDEX(A1:B3,0,1))"), n(16.0));
        assert_eq!(ctx.eval("=MATCH(10,A1:A3,0)"), n(3.0));
        assert_eq!(ctx.eval("=MATCH(6,A1:A3)"), n(2.0));
        assert_eq!(ctx.eval("=MATCH(\"f*\",B1:B3,0)"), n(2.0));
    }

    #[test]
    fn test_exact_match_ignores_order() {
        let ctx = MapContext::with(&[("A1", n(10.0)), ("A2", n(5.0)), ("A3", n(1.0))]);
        assert_eq!(ctx.eval("=MATCH(5,A1:A3,0)"), n(2.0));
        assert_eq!(ctx.eval("=MATCH(1,A1:A3,0)"), n(3.0));
        assert_eq!(ctx.eval("=MATCH(7,A1:A3,-1)"), n(1.0));
        assert_eq!(ctx.eval("=MATCH(7,A1:A3,0)"), ErrorValue::NA.into());
    }

    #[test]
    fn test_out_of_range_arguments_are_num_errors() {
        let ctx = MapContext::default();
        assert_eq!(ctx.eval("=DATE(1E18,1,1)"), ErrorValue::Num.into());
        assert_eq!(ctx.eval("=DATE(2020,1,1E18)"), ErrorValue::Num.into());
        assert_eq!(ctx.eval("=DATE(2020,-1E18,1)"), ErrorValue::Num.into());
        assert_eq!(ctx.eval("=DATE(10000,1,1)"), ErrorValue::Num.into());
        assert_eq!(ctx.eval("=ROUND(1.5,1E10)"), n(1.5));
        assert_eq!(ctx.eval("=ROUNDUP(1E10,400)"), n(1e10));
        assert_eq!(ctx.eval("=ROUND(1234,-400)"), n(0.0));
    }

    #[test]
    fn test_unknown_functions() {
        let ctx = MapContext::default();
        assert_eq!(ctx.eval("=NOSUCH(1)"), ErrorValue::Name.into());
        assert_eq!(ctx.eval("=ABS()"), ErrorValue::Value.into());
        assert_eq!(ctx.eval("=ISBLANK(Q9)"), Value::Bool(true));
        assert_eq!(ctx.eval("=ISERROR(1/0)"), Value::Bool(true));
    }
}
