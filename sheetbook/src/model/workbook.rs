//! The workbook: worksheet collection, pools and lifecycle

use super::cell::Formula;
use super::sheet_mut::WorksheetMut;
use super::style::{Font, Style};
use super::value::CellValue;
use super::worksheet::{Visibility, Worksheet};
use crate::address::{CellAddress, CellRange, IntoAddress, fold_name, same_name};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::formula::calc::{self, CalcReport, CalcScope};
use crate::formula::rewrite::{RefEdit, rewrite_formula};
use crate::formula::Reference;
use crate::package::{self, PackageState, Source};
use crate::pool::{SharedStringPool, StyleId, StylePool};
use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read, Seek, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Longest worksheet name a package accepts
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Anything that identifies a worksheet: its position or its name
pub trait SheetKey {
    fn sheet_index(&self, book: &Workbook) -> Result<usize>;
}

impl SheetKey for usize {
    fn sheet_index(&self, book: &Workbook) -> Result<usize> {
        if *self < book.sheets.len() {
            Ok(*self)
        } else {
            Err(Error::out_of_range(format!(
                "worksheet {} of {}",
                self,
                book.sheets.len()
            )))
        }
    }
}

impl SheetKey for &str {
    fn sheet_index(&self, book: &Workbook) -> Result<usize> {
        book.sheet_position(self)
            .ok_or_else(|| Error::out_of_range(format!("no worksheet named '{}'", self)))
    }
}

impl SheetKey for String {
    fn sheet_index(&self, book: &Workbook) -> Result<usize> {
        self.as_str().sheet_index(book)
    }
}

impl SheetKey for &String {
    fn sheet_index(&self, book: &Workbook) -> Result<usize> {
        self.as_str().sheet_index(book)
    }
}

/// A named formula, kept as text and never evaluated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinedName {
    pub name: String,
    /// Without the leading `=`
    pub formula: String,
    /// Position of the owning sheet for sheet-scoped names
    pub local_sheet: Option<usize>,
    pub hidden: bool,
}

/// In-memory spreadsheet document
#[derive(Debug)]
pub struct Workbook {
    pub(crate) sheets: Vec<Worksheet>,
    pub(crate) styles: StylePool,
    pub(crate) strings: SharedStringPool,
    pub(crate) config: EngineConfig,
    pub(crate) date1904: bool,
    pub(crate) active_sheet: usize,
    pub(crate) defined_names: Vec<DefinedName>,
    pub(crate) path: Option<PathBuf>,
    pub(crate) package: PackageState,
    pub(crate) next_sheet_id: u32,
    closed: bool,
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}

impl Workbook {
    /// Empty workbook with one worksheet named `Sheet1`
    pub fn new() -> Self {
        let mut book = Self::empty(EngineConfig::default());
        book.push_sheet("Sheet1");
        book
    }

    /// Like [`new`](Self::new), with `config` applied
    pub fn with_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        config.check_license()?;
        let mut book = Self::empty(config);
        book.push_sheet("Sheet1");
        Ok(book)
    }

    /// New workbook that [`save`](Self::save) writes to `path`
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let mut book = Self::new();
        book.path = Some(path.as_ref().to_path_buf());
        Ok(book)
    }

    /// Workbook without worksheets, pools seeded from `config`
    pub(crate) fn empty(config: EngineConfig) -> Self {
        let default_style = Style::with_font(Font::new(
            config.default_font_name.clone(),
            config.default_font_size,
        ));
        Self::with_default_style(config, default_style)
    }

    pub(crate) fn with_default_style(config: EngineConfig, default_style: Style) -> Self {
        Self {
            sheets: Vec::new(),
            styles: StylePool::new(default_style),
            strings: SharedStringPool::new(),
            date1904: config.date1904,
            config,
            active_sheet: 0,
            defined_names: Vec::new(),
            path: None,
            package: PackageState::default(),
            next_sheet_id: 1,
            closed: false,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut book = Self::load_source(Source::Path(path.to_path_buf()), EngineConfig::default())?;
        book.path = Some(path.to_path_buf());
        Ok(book)
    }

    /// Load from a caller-owned stream; the stream is not closed
    pub fn load_from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        package::read_workbook(reader, EngineConfig::default())
    }

    pub fn load_from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        Self::load_source(Source::Bytes(bytes.into()), EngineConfig::default())
    }

    /// Fetch a package over HTTP(S) and load it
    pub fn load_url(url: &str) -> Result<Self> {
        Self::load_source(Source::Url(url.to_string()), EngineConfig::default())
    }

    pub fn load_source(source: Source, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        config.check_license()?;
        package::load(source, config)
    }

    /// Write to the path the workbook was created with or loaded from
    pub fn save(&self) -> Result<()> {
        self.ensure_open()?;
        let path = self
            .path
            .clone()
            .ok_or_else(|| Error::InvalidState("workbook has no associated path".to_string()))?;
        self.save_as(path)
    }

    /// Write to `path` through a temporary file in the same directory
    pub fn save_as(&self, path: impl AsRef<Path>) -> Result<()> {
        self.ensure_open()?;
        package::save_to_path(self, path.as_ref())
    }

    pub fn save_to_writer<W: Write + Seek>(&self, writer: W) -> Result<W> {
        self.ensure_open()?;
        package::write_workbook(self, writer)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.save_to_writer(Cursor::new(Vec::new()))?.into_inner())
    }

    /// Release all content; every later call fails with `InvalidState`
    pub fn close(&mut self) {
        self.sheets.clear();
        self.defined_names.clear();
        self.strings = SharedStringPool::new();
        self.styles = StylePool::default();
        self.package = PackageState::default();
        self.path = None;
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::InvalidState("workbook is closed".to_string()));
        }
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Uses the 1904 date system
    pub fn date1904(&self) -> bool {
        self.date1904
    }

    pub fn styles(&self) -> &StylePool {
        &self.styles
    }

    pub fn strings(&self) -> &SharedStringPool {
        &self.strings
    }

    pub fn style(&self, id: StyleId) -> &Arc<Style> {
        self.styles.get(id)
    }

    pub fn default_style(&self) -> &Arc<Style> {
        self.styles.default_style()
    }

    /// Intern a style record, returning its handle
    pub fn add_style(&mut self, style: Style) -> StyleId {
        self.styles.intern(style)
    }

    /// Effective style of a cell
    pub fn cell_style(&self, sheet: impl SheetKey, addr: impl IntoAddress) -> Result<&Arc<Style>> {
        let ws = self.worksheet(sheet)?;
        Ok(self.styles.get(ws.style_id(addr)?))
    }

    /// Text a spreadsheet application would display for a cell
    pub fn display_text(&self, sheet: impl SheetKey, addr: impl IntoAddress) -> Result<String> {
        let ws = self.worksheet(sheet)?;
        let addr = addr.into_address()?;
        let style = self.styles.get(ws.style_id_at(addr));
        Ok(super::display::format_value(
            ws.value_at(addr),
            &style.number_format,
            self.date1904,
        ))
    }

    /// How many materialized cells, rows and columns use each style
    pub fn style_usage(&self) -> HashMap<StyleId, usize> {
        let mut usage = HashMap::new();
        for ws in &self.sheets {
            let ids = ws
                .cells()
                .map(|(_, c)| c.style)
                .chain(ws.rows.values().filter_map(|r| r.style))
                .chain(ws.columns.values().filter_map(|c| c.style));
            for id in ids {
                *usage.entry(id).or_insert(0) += 1;
            }
        }
        usage
    }

    pub fn worksheet_count(&self) -> usize {
        self.sheets.len()
    }

    pub fn contains_worksheet(&self, name: &str) -> bool {
        self.sheet_position(name).is_some()
    }

    pub fn worksheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn worksheets(&self) -> impl Iterator<Item = &Worksheet> {
        self.sheets.iter()
    }

    pub fn worksheet(&self, key: impl SheetKey) -> Result<&Worksheet> {
        self.ensure_open()?;
        let index = key.sheet_index(self)?;
        Ok(&self.sheets[index])
    }

    /// Editing handle for one worksheet
    pub fn worksheet_mut(&mut self, key: impl SheetKey) -> Result<WorksheetMut<'_>> {
        self.ensure_open()?;
        let index = key.sheet_index(self)?;
        Ok(WorksheetMut::new(self, index))
    }

    pub(crate) fn sheet_position(&self, name: &str) -> Option<usize> {
        self.sheets
            .iter()
            .position(|s| same_name(&s.name, name))
    }

    pub fn active_worksheet(&self) -> usize {
        self.active_sheet
    }

    pub fn set_active_worksheet(&mut self, key: impl SheetKey) -> Result<()> {
        self.ensure_open()?;
        let index = key.sheet_index(self)?;
        if self.sheets[index].visibility != Visibility::Visible {
            return Err(Error::InvalidState(format!(
                "hidden worksheet '{}' cannot be active",
                self.sheets[index].name
            )));
        }
        self.active_sheet = index;
        Ok(())
    }

    pub(crate) fn push_sheet(&mut self, name: &str) -> usize {
        let mut sheet = Worksheet::new(
            name,
            self.config.default_row_height,
            self.config.default_column_width,
        );
        sheet.sheet_id = self.next_sheet_id;
        self.next_sheet_id += 1;
        self.sheets.push(sheet);
        self.sheets.len() - 1
    }

    /// Append a worksheet; `None` picks the next free `SheetN` name
    pub fn add_worksheet(&mut self, name: Option<&str>) -> Result<usize> {
        self.ensure_open()?;
        let name = match name {
            Some(name) => {
                validate_sheet_name(name)?;
                if self.contains_worksheet(name) {
                    return Err(Error::DuplicateName(format!("worksheet '{}'", name)));
                }
                name.to_string()
            }
            None => {
                let mut n = self.sheets.len() + 1;
                while self.contains_worksheet(&format!("Sheet{}", n)) {
                    n += 1;
                }
                format!("Sheet{}", n)
            }
        };
        let index = self.push_sheet(&name);
        log::debug!("added worksheet '{}' at {}", name, index);
        Ok(index)
    }

    pub fn rename_worksheet(&mut self, key: impl SheetKey, new_name: &str) -> Result<()> {
        self.ensure_open()?;
        let index = key.sheet_index(self)?;
        validate_sheet_name(new_name)?;
        if let Some(other) = self.sheet_position(new_name)
            && other != index
        {
            return Err(Error::DuplicateName(format!("worksheet '{}'", new_name)));
        }
        let old_name = std::mem::replace(&mut self.sheets[index].name, new_name.to_string());
        let target = new_name.to_string();
        self.rewrite_references(|_, reference| match &reference.sheet {
            Some(sheet) if same_name(sheet, &old_name) => {
                RefEdit::Sheet(target.clone())
            }
            _ => RefEdit::Keep,
        });
        for name in &mut self.defined_names {
            if let Some(text) = rewrite_formula(&name.formula, |r| match &r.sheet {
                Some(sheet) if same_name(sheet, &old_name) => {
                    RefEdit::Sheet(target.clone())
                }
                _ => RefEdit::Keep,
            }) {
                name.formula = text;
            }
        }
        log::debug!("renamed worksheet '{}' to '{}'", old_name, new_name);
        Ok(())
    }

    /// Remove one worksheet; references to it become `#REF!`
    pub fn remove_worksheet(&mut self, key: impl SheetKey) -> Result<()> {
        self.ensure_open()?;
        let index = key.sheet_index(self)?;
        self.remove_worksheets(index..index + 1)
    }

    /// Remove the worksheets at positions `range`
    pub fn remove_worksheets(&mut self, range: Range<usize>) -> Result<()> {
        self.ensure_open()?;
        if range.start >= range.end || range.end > self.sheets.len() {
            return Err(Error::out_of_range(format!(
                "worksheets {}..{} of {}",
                range.start,
                range.end,
                self.sheets.len()
            )));
        }
        if range.len() == self.sheets.len() {
            return Err(Error::InvalidState(
                "a workbook must keep at least one worksheet".to_string(),
            ));
        }
        let removed: Vec<String> = self.sheets[range.clone()]
            .iter()
            .map(|s| s.name.clone())
            .collect();
        let is_removed = |name: &str| removed.iter().any(|r| same_name(r, name));

        // rewrite first, while owner names still resolve
        let edits = self.collect_rewrites(|owner, reference| match &reference.sheet {
            Some(sheet) if is_removed(sheet) && !is_removed(owner) => RefEdit::Removed,
            _ => RefEdit::Keep,
        });
        self.sheets.drain(range.clone());
        self.apply_rewrites(edits, &removed);

        let count = range.len();
        self.defined_names.retain(|n| !n.local_sheet.is_some_and(|s| range.contains(&s)));
        for name in &mut self.defined_names {
            if let Some(s) = name.local_sheet.as_mut()
                && *s >= range.end
            {
                *s -= count;
            }
            if let Some(text) = rewrite_formula(&name.formula, |r| match &r.sheet {
                Some(sheet) if is_removed(sheet) => RefEdit::Removed,
                _ => RefEdit::Keep,
            }) {
                name.formula = text;
            }
        }
        if self.active_sheet >= range.end {
            self.active_sheet -= count;
        } else if self.active_sheet >= range.start {
            self.active_sheet = range.start.min(self.sheets.len() - 1);
        }
        self.ensure_visible_active();
        log::debug!("removed worksheets {:?}", removed);
        Ok(())
    }

    /// Deep copy of a worksheet appended at the end; returns its position
    pub fn copy_worksheet(&mut self, key: impl SheetKey, new_name: Option<&str>) -> Result<usize> {
        self.ensure_open()?;
        let source = key.sheet_index(self)?;
        let name = match new_name {
            Some(name) => {
                validate_sheet_name(name)?;
                if self.contains_worksheet(name) {
                    return Err(Error::DuplicateName(format!("worksheet '{}'", name)));
                }
                name.to_string()
            }
            None => self.copy_name(&self.sheets[source].name),
        };
        let mut copy = self.sheets[source].clone();
        copy.name = name;
        copy.sheet_id = self.next_sheet_id;
        self.next_sheet_id += 1;
        rename_copied_tables(&mut copy, self);
        let index = self.sheets.len();
        let local: Vec<DefinedName> = self
            .defined_names
            .iter()
            .filter(|n| n.local_sheet == Some(source))
            .map(|n| DefinedName {
                local_sheet: Some(index),
                ..n.clone()
            })
            .collect();
        self.defined_names.extend(local);
        log::debug!("copied worksheet '{}' to '{}'", self.sheets[source].name, copy.name);
        self.sheets.push(copy);
        Ok(index)
    }

    fn copy_name(&self, base: &str) -> String {
        (2..)
            .map(|n| {
                let suffix = format!(" ({})", n);
                let keep = MAX_SHEET_NAME_LEN.saturating_sub(suffix.chars().count());
                let stem: String = base.chars().take(keep).collect();
                stem + &suffix
            })
            .find(|candidate| !self.contains_worksheet(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Move a worksheet to position `dest`
    pub fn move_worksheet(&mut self, key: impl SheetKey, dest: usize) -> Result<()> {
        self.ensure_open()?;
        let from = key.sheet_index(self)?;
        if dest >= self.sheets.len() {
            return Err(Error::out_of_range(format!(
                "destination {} of {}",
                dest,
                self.sheets.len()
            )));
        }
        if from == dest {
            return Ok(());
        }
        let remap = |i: usize| -> usize {
            if i == from {
                dest
            } else if from < dest && i > from && i <= dest {
                i - 1
            } else if dest < from && i >= dest && i < from {
                i + 1
            } else {
                i
            }
        };
        let sheet = self.sheets.remove(from);
        self.sheets.insert(dest, sheet);
        self.active_sheet = remap(self.active_sheet);
        for name in &mut self.defined_names {
            if let Some(s) = name.local_sheet.as_mut() {
                *s = remap(*s);
            }
        }
        Ok(())
    }

    fn ensure_visible_active(&mut self) {
        if self.sheets[self.active_sheet].visibility != Visibility::Visible
            && let Some(visible) = self
                .sheets
                .iter()
                .position(|s| s.visibility == Visibility::Visible)
        {
            self.active_sheet = visible;
        }
    }

    pub fn defined_names(&self) -> &[DefinedName] {
        &self.defined_names
    }

    pub fn defined_name(&self, name: &str) -> Option<&DefinedName> {
        self.defined_names
            .iter()
            .find(|n| same_name(&n.name, name))
    }

    /// Add a workbook- or sheet-scoped name for `formula`
    pub fn add_defined_name(&mut self, name: &str, formula: &str, local_sheet: Option<usize>) -> Result<()> {
        self.ensure_open()?;
        if let Some(sheet) = local_sheet {
            sheet.sheet_index(self)?;
        }
        let valid = name
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '\\')
            && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '\\')
            && crate::address::parse_cell_ref(name).is_none();
        if !valid {
            return Err(Error::InvalidName(format!("'{}' is not a valid name", name)));
        }
        if self
            .defined_names
            .iter()
            .any(|n| same_name(&n.name, name) && n.local_sheet == local_sheet)
        {
            return Err(Error::DuplicateName(format!("defined name '{}'", name)));
        }
        let formula = formula.trim();
        self.defined_names.push(DefinedName {
            name: name.to_string(),
            formula: formula.strip_prefix('=').unwrap_or(formula).to_string(),
            local_sheet,
            hidden: false,
        });
        Ok(())
    }

    pub fn remove_defined_name(&mut self, name: &str, local_sheet: Option<usize>) -> Result<DefinedName> {
        self.ensure_open()?;
        let index = self
            .defined_names
            .iter()
            .position(|n| same_name(&n.name, name) && n.local_sheet == local_sheet)
            .ok_or_else(|| Error::out_of_range(format!("no defined name '{}'", name)))?;
        Ok(self.defined_names.remove(index))
    }

    pub(crate) fn table_name_taken(&self, name: &str) -> bool {
        self.sheets
            .iter()
            .flat_map(|s| s.tables.iter())
            .any(|t| same_name(&t.name, name))
            || self.defined_name(name).is_some()
    }

    pub(crate) fn unique_table_name(&self, base: &str) -> String {
        (1..)
            .map(|n| format!("{}{}", base, n))
            .find(|candidate| !self.table_name_taken(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Recalculate every formula in the workbook
    pub fn calculate_formulas(&mut self) -> Result<CalcReport> {
        self.ensure_open()?;
        Ok(calc::calculate(self, CalcScope::Workbook))
    }

    /// Evaluate one cell without storing results; a cell on a reference
    /// cycle fails with `CircularReference`
    pub fn evaluate(&self, sheet: impl SheetKey, addr: impl IntoAddress) -> Result<CellValue> {
        self.ensure_open()?;
        let index = sheet.sheet_index(self)?;
        let addr = addr.into_address()?;
        calc::evaluate_cell(self, index, addr)
    }

    /// Clear the cached value of every formula that depends, directly or
    /// through other formulas, on the cells in `changed`
    pub(crate) fn invalidate_dependents(&mut self, sheet: usize, changed: impl IntoIterator<Item = CellRange>) {
        let names: Vec<String> = self.sheets.iter().map(|s| fold_name(&s.name)).collect();
        let mut work: Vec<(usize, CellRange)> = changed.into_iter().map(|r| (sheet, r)).collect();
        let mut visited: HashSet<(usize, CellAddress)> = HashSet::new();
        while let Some((target, range)) = work.pop() {
            for (s, ws) in self.sheets.iter_mut().enumerate() {
                let hits: Vec<CellAddress> = ws
                    .formula_cells
                    .iter()
                    .filter(|addr| !visited.contains(&(s, **addr)))
                    .filter(|addr| {
                        ws.cell_at(**addr)
                            .and_then(|c| c.formula.as_ref())
                            .is_some_and(|f| {
                                f.references().iter().any(|r| {
                                    references_sheet(r, s, target, &names)
                                        && r.target.bounds().intersects(&range)
                                })
                            })
                    })
                    .copied()
                    .collect();
                for addr in hits {
                    visited.insert((s, addr));
                    if let Some(cell) = ws.cell_at_mut(addr) {
                        cell.value = CellValue::Empty;
                    }
                    work.push((s, CellRange::single(addr)));
                }
            }
        }
    }

    /// Clear every formula cache of `sheet` and of everything depending on it
    pub(crate) fn invalidate_sheet(&mut self, sheet: usize) {
        let ws = &mut self.sheets[sheet];
        let formulas: Vec<CellAddress> = ws.formula_cells.iter().copied().collect();
        for addr in formulas {
            if let Some(cell) = ws.cell_at_mut(addr) {
                cell.value = CellValue::Empty;
            }
        }
        if let Ok(all) = CellRange::from_coords(0, 0, crate::address::MAX_ROWS - 1, crate::address::MAX_COLS - 1) {
            self.invalidate_dependents(sheet, [all]);
        }
    }

    /// Apply `edit` to every reference of every formula; rewritten formulas
    /// lose their cached value, as does everything depending on them
    pub(crate) fn rewrite_references(&mut self, edit: impl Fn(&str, &Reference) -> RefEdit) {
        let edits = self.collect_rewrites(edit);
        self.apply_rewrites(edits, &[]);
    }

    /// New formula texts keyed by (sheet name, cell)
    fn collect_rewrites(&self, edit: impl Fn(&str, &Reference) -> RefEdit) -> Vec<(String, CellAddress, String)> {
        let mut out = Vec::new();
        for ws in &self.sheets {
            for addr in &ws.formula_cells {
                let Some(formula) = ws.cell_at(*addr).and_then(|c| c.formula.as_ref()) else {
                    continue;
                };
                if let Some(text) = rewrite_formula(formula.body(), |r| edit(&ws.name, r)) {
                    out.push((ws.name.clone(), *addr, text));
                }
            }
        }
        out
    }

    fn apply_rewrites(&mut self, edits: Vec<(String, CellAddress, String)>, skip: &[String]) {
        let mut touched: Vec<(usize, CellAddress)> = Vec::new();
        for (sheet_name, addr, text) in edits {
            if skip.iter().any(|s| same_name(s, &sheet_name)) {
                continue;
            }
            let Some(s) = self.sheet_position(&sheet_name) else {
                continue;
            };
            if let Some(cell) = self.sheets[s].cell_at_mut(addr) {
                cell.formula = Some(Formula::parse(&text));
                cell.value = CellValue::Empty;
                touched.push((s, addr));
            }
        }
        for (s, addr) in touched {
            self.invalidate_dependents(s, [CellRange::single(addr)]);
        }
    }
}

/// Does `reference`, written on sheet `owner`, point into sheet `target`?
pub(crate) fn references_sheet(reference: &Reference, owner: usize, target: usize, lower_names: &[String]) -> bool {
    match &reference.sheet {
        None => owner == target,
        Some(name) => lower_names
            .get(target)
            .is_some_and(|t| *t == fold_name(name)),
    }
}

/// Give the tables of a fresh copy names unused in the workbook and
/// distinct among themselves
fn rename_copied_tables(copy: &mut Worksheet, book: &Workbook) {
    let mut seen: HashSet<String> = HashSet::new();
    for table in &mut copy.tables {
        let stem = table.name.trim_end_matches(|c: char| c.is_ascii_digit());
        let stem = if stem.is_empty() { "Table" } else { stem };
        let name = (1..)
            .map(|n| format!("{}{}", stem, n))
            .find(|candidate| !seen.contains(&fold_name(candidate)) && !book.table_name_taken(candidate))
            .unwrap_or_else(|| table.name.clone());
        seen.insert(fold_name(&name));
        table.name = name;
    }
}

/// Worksheet names: 1 to 31 characters, none of `[]:*?/\`, not quoted
pub fn validate_sheet_name(name: &str) -> Result<()> {
    let len = name.chars().count();
    if len == 0 || len > MAX_SHEET_NAME_LEN {
        return Err(Error::InvalidName(format!(
            "worksheet name '{}' must have 1 to {} characters",
            name, MAX_SHEET_NAME_LEN
        )));
    }
    if let Some(c) = name.chars().find(|c| matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\')) {
        return Err(Error::InvalidName(format!(
            "worksheet name '{}' contains '{}'",
            name, c
        )));
    }
    if name.starts_with('\'') || name.ends_with('\'') {
        return Err(Error::InvalidName(format!(
            "worksheet name '{}' starts or ends with an apostrophe",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_workbook_is_send_sync() {
        assert_send_sync::<Workbook>();
    }

    #[test]
    fn test_new_workbook_has_sheet1() {
        let book = Workbook::new();
        assert_eq!(book.worksheet_names(), ["Sheet1"]);
        assert_eq!(book.worksheet("sheet1").unwrap().name(), "Sheet1");
        assert!(matches!(book.worksheet(3), Err(Error::IndexOutOfRange(_))));
    }

    #[test]
    fn test_add_and_duplicate_names() {
        let mut book = Workbook::new();
        assert_eq!(book.add_worksheet(None).unwrap(), 1);
        assert_eq!(book.worksheet_names(), ["Sheet1", "Sheet2"]);
        assert!(matches!(
            book.add_worksheet(Some("SHEET2")),
            Err(Error::DuplicateName(_))
        ));
        assert!(matches!(
            book.add_worksheet(Some("a/b")),
            Err(Error::InvalidName(_))
        ));
        assert!(matches!(
            book.add_worksheet(Some(&"x".repeat(32))),
            Err(Error::InvalidName(_))
        ));
    }

    #[test]
    fn test_remove_keeps_one_sheet() {
        let mut book = Workbook::new();
        assert!(matches!(book.remove_worksheet(0), Err(Error::InvalidState(_))));
        book.add_worksheet(Some("Data")).unwrap();
        book.remove_worksheet("Sheet1").unwrap();
        assert_eq!(book.worksheet_names(), ["Data"]);
        assert_eq!(book.active_worksheet(), 0);
    }

    #[test]
    fn test_copy_names_and_move() {
        let mut book = Workbook::new();
        assert_eq!(book.copy_worksheet(0, None).unwrap(), 1);
        assert_eq!(book.copy_worksheet("Sheet1", None).unwrap(), 2);
        assert_eq!(book.worksheet_names(), ["Sheet1", "Sheet1 (2)", "Sheet1 (3)"]);
        assert!(matches!(
            book.copy_worksheet(0, Some("sheet1 (2)")),
            Err(Error::DuplicateName(_))
        ));
        book.set_active_worksheet(0).unwrap();
        book.move_worksheet(0, 2).unwrap();
        assert_eq!(book.worksheet_names(), ["Sheet1 (2)", "Sheet1 (3)", "Sheet1"]);
        assert_eq!(book.active_worksheet(), 2);
    }

    #[test]
    fn test_close_invalidates() {
        let mut book = Workbook::new();
        book.close();
        assert!(matches!(book.worksheet(0), Err(Error::InvalidState(_))));
        assert!(matches!(book.add_worksheet(None), Err(Error::InvalidState(_))));
        assert!(matches!(book.to_bytes(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_license_checked_on_construction() {
        let config = EngineConfig {
            license_key: Some("not-a-key".to_string()),
            ..EngineConfig::default()
        };
        assert!(matches!(Workbook::with_config(config), Err(Error::License(_))));
    }
}
