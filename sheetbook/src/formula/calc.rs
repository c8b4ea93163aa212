//! Calculation passes over formula cells
//!
//! A pass walks dependencies with an explicit stack and a memo of computed
//! values. Cells found on a reference cycle get the circular error value;
//! the walk itself always terminates.

use super::eval::{EvalContext, Evaluator, Value};
use crate::address::{CellAddress, CellRange, fold_name};
use crate::error::{Error, Result};
use crate::model::date::{datetime_to_serial, duration_to_serial};
use crate::model::{CellValue, ErrorValue, RichText, Workbook};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Which formula cells a pass recalculates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalcScope {
    /// One worksheet; formulas on other sheets are read as last calculated
    Worksheet(usize),
    Workbook,
}

/// Outcome of a calculation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalcReport {
    /// Formula cells evaluated
    pub calculated: usize,
    /// Cells found on reference cycles, by sheet name
    pub circular: Vec<(String, CellAddress)>,
}

impl CalcReport {
    pub fn has_cycles(&self) -> bool {
        !self.circular.is_empty()
    }

    /// Turn detected cycles into an error
    pub fn ensure_acyclic(&self) -> Result<()> {
        if self.circular.is_empty() {
            return Ok(());
        }
        let cells: Vec<String> = self
            .circular
            .iter()
            .map(|(sheet, addr)| format!("{}!{}", sheet, addr))
            .collect();
        Err(Error::CircularReference(cells.join(", ")))
    }
}

type Key = (usize, CellAddress);

/// Formula cell waiting for its precedents
struct Frame {
    key: Key,
    deps: Vec<Key>,
    next: usize,
}

struct Pass<'b> {
    book: &'b Workbook,
    scope: CalcScope,
    lower_names: Vec<String>,
    memo: HashMap<Key, Value>,
    circular: BTreeSet<Key>,
}

impl<'b> Pass<'b> {
    fn new(book: &'b Workbook, scope: CalcScope) -> Self {
        Self {
            book,
            scope,
            lower_names: book.sheets.iter().map(|s| fold_name(&s.name)).collect(),
            memo: HashMap::new(),
            circular: BTreeSet::new(),
        }
    }

    fn in_scope(&self, sheet: usize) -> bool {
        match self.scope {
            CalcScope::Workbook => true,
            CalcScope::Worksheet(s) => s == sheet,
        }
    }

    /// In-scope formula cells read by the formula at `key`
    fn dependencies(&self, (sheet, addr): Key) -> Vec<Key> {
        let Some(formula) = self.book.sheets[sheet]
            .cell_at(addr)
            .and_then(|c| c.formula.as_ref())
        else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        let mut deps = Vec::new();
        for reference in formula.references() {
            let target = match &reference.sheet {
                None => Some(sheet),
                Some(name) => self.sheet_index(name),
            };
            let Some(target) = target.filter(|t| self.in_scope(*t)) else {
                continue;
            };
            let bounds: CellRange = reference.target.bounds();
            for dep in self.book.sheets[target].formula_cells_in(bounds) {
                if seen.insert((target, dep)) {
                    deps.push((target, dep));
                }
            }
        }
        deps
    }

    fn compute(&mut self, root: Key) {
        if self.memo.contains_key(&root) {
            return;
        }
        let mut on_stack: HashMap<Key, usize> = HashMap::from([(root, 0)]);
        let mut stack = vec![Frame {
            key: root,
            deps: self.dependencies(root),
            next: 0,
        }];
        while let Some(top) = stack.last_mut() {
            if top.next < top.deps.len() {
                let dep = top.deps[top.next];
                top.next += 1;
                if self.memo.contains_key(&dep) {
                    continue;
                }
                if let Some(&pos) = on_stack.get(&dep) {
                    self.circular.extend(stack[pos..].iter().map(|f| f.key));
                    continue;
                }
                on_stack.insert(dep, stack.len());
                let deps = self.dependencies(dep);
                stack.push(Frame { key: dep, deps, next: 0 });
            } else {
                let key = top.key;
                stack.pop();
                on_stack.remove(&key);
                let value = if self.circular.contains(&key) {
                    Value::Error(ErrorValue::Circular)
                } else {
                    self.evaluate(key)
                };
                self.memo.insert(key, value);
            }
        }
    }

    fn evaluate(&self, (sheet, addr): Key) -> Value {
        let ast = self.book.sheets[sheet]
            .cell_at(addr)
            .and_then(|c| c.formula.as_ref())
            .and_then(|f| f.ast());
        match ast {
            Some(expr) => Evaluator::new(self, sheet, addr).evaluate(expr),
            None => Value::Error(ErrorValue::Name),
        }
    }

    fn stored(&self, value: &CellValue) -> Value {
        let date1904 = self.book.date1904;
        match value {
            CellValue::Empty => Value::Empty,
            CellValue::Number(n) => Value::Number(*n),
            CellValue::Boolean(b) => Value::Bool(*b),
            CellValue::Text(text) => Value::Text(text.plain_text()),
            CellValue::DateTime(dt) => Value::Number(datetime_to_serial(*dt, date1904)),
            CellValue::Duration(d) => Value::Number(duration_to_serial(*d)),
            CellValue::Error(e) => Value::Error(*e),
        }
    }
}

impl EvalContext for Pass<'_> {
    fn sheet_index(&self, name: &str) -> Option<usize> {
        let lower = fold_name(name);
        self.lower_names.iter().position(|n| *n == lower)
    }

    fn value_at(&self, sheet: usize, cell: CellAddress) -> Value {
        if let Some(value) = self.memo.get(&(sheet, cell)) {
            return value.clone();
        }
        match self.book.sheets.get(sheet) {
            Some(ws) => self.stored(ws.value_at(cell)),
            None => Value::Error(ErrorValue::Ref),
        }
    }

    fn cells_in(&self, sheet: usize, range: &CellRange) -> Vec<(CellAddress, Value)> {
        let Some(ws) = self.book.sheets.get(sheet) else {
            return Vec::new();
        };
        ws.cells_in(*range)
            .map(|(addr, cell)| match self.memo.get(&(sheet, addr)) {
                Some(value) => (addr, value.clone()),
                None => (addr, self.stored(cell.value())),
            })
            .filter(|(_, value)| *value != Value::Empty)
            .collect()
    }

    fn date1904(&self) -> bool {
        self.book.date1904
    }
}

/// Shape an evaluation result for storage; a formula showing nothing reads
/// as zero
fn result_value(value: Value, intern: &mut impl FnMut(String) -> CellValue) -> CellValue {
    match value {
        Value::Empty => CellValue::Number(0.0),
        Value::Number(n) if n.is_finite() => CellValue::Number(n),
        Value::Number(_) => CellValue::Error(ErrorValue::Num),
        Value::Bool(b) => CellValue::Boolean(b),
        Value::Text(s) => intern(s),
        Value::Error(e) => CellValue::Error(e),
        Value::Range { .. } => CellValue::Error(ErrorValue::Value),
    }
}

/// Recalculate the formula cells in `scope` and store their values
pub(crate) fn calculate(book: &mut Workbook, scope: CalcScope) -> CalcReport {
    let targets: Vec<Key> = book
        .sheets
        .iter()
        .enumerate()
        .filter(|(i, _)| match scope {
            CalcScope::Workbook => true,
            CalcScope::Worksheet(s) => s == *i,
        })
        .flat_map(|(i, ws)| ws.formula_cells.iter().map(move |addr| (i, *addr)))
        .collect();

    let (memo, circular) = {
        let mut pass = Pass::new(book, scope);
        for key in targets {
            pass.compute(key);
        }
        (pass.memo, pass.circular)
    };

    let calculated = memo.len();
    for ((sheet, addr), value) in memo {
        let strings = &mut book.strings;
        let stored = result_value(value, &mut |s| {
            CellValue::Text(strings.intern(RichText::plain(s)).1)
        });
        if let Some(cell) = book.sheets[sheet].cell_at_mut(addr) {
            cell.value = stored;
        }
    }
    let circular: Vec<(String, CellAddress)> = circular
        .into_iter()
        .map(|(sheet, addr)| (book.sheets[sheet].name.clone(), addr))
        .collect();
    if !circular.is_empty() {
        log::warn!("{} cells are on reference cycles", circular.len());
    }
    log::debug!("calculated {} formula cells ({:?})", calculated, scope);
    CalcReport {
        calculated,
        circular,
    }
}

/// Value of one cell computed from scratch, without storing anything
pub(crate) fn evaluate_cell(book: &Workbook, sheet: usize, addr: CellAddress) -> Result<CellValue> {
    let ws = &book.sheets[sheet];
    if !ws.formula_cells.contains(&addr) {
        return Ok(ws.value_at(addr).clone());
    }
    let mut pass = Pass::new(book, CalcScope::Workbook);
    pass.compute((sheet, addr));
    if pass.circular.contains(&(sheet, addr)) {
        return Err(Error::CircularReference(format!("{}!{}", ws.name, addr)));
    }
    let value = pass
        .memo
        .remove(&(sheet, addr))
        .unwrap_or(Value::Error(ErrorValue::Ref));
    Ok(result_value(value, &mut |s| CellValue::text(s)))
}
