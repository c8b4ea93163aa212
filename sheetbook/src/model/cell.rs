//! Cells and stored formulas

use super::value::CellValue;
use crate::formula::{Expr, Reference, parse_formula};
use crate::pool::StyleId;
use std::sync::Arc;

/// Formula text plus its parsed form
#[derive(Debug, Clone)]
pub struct Formula {
    /// Without the leading `=`
    text: String,
    ast: Option<Arc<Expr>>,
    references: Arc<[Reference]>,
}

impl Formula {
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        let body = trimmed.strip_prefix('=').unwrap_or(trimmed).to_string();
        match parse_formula(&body) {
            Ok(expr) => {
                let references = expr.references().into();
                Self {
                    text: body,
                    ast: Some(Arc::new(expr)),
                    references,
                }
            }
            Err(e) => {
                log::warn!("formula '={}' does not parse: {}", body, e);
                Self {
                    text: body,
                    ast: None,
                    references: Arc::from(Vec::new()),
                }
            }
        }
    }

    /// Formula body without `=`
    pub fn body(&self) -> &str {
        &self.text
    }

    /// Formula text as typed, with `=`
    pub fn text(&self) -> String {
        format!("={}", self.text)
    }

    pub fn ast(&self) -> Option<&Expr> {
        self.ast.as_deref()
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }
}

impl PartialEq for Formula {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

/// A materialized cell
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Cell {
    pub(crate) value: CellValue,
    pub(crate) formula: Option<Formula>,
    pub(crate) style: StyleId,
}

impl Cell {
    pub(crate) fn with_style(style: StyleId) -> Self {
        Self {
            style,
            ..Self::default()
        }
    }

    /// Stored value; for formula cells the cached result, `Empty` until
    /// calculated
    pub fn value(&self) -> &CellValue {
        &self.value
    }

    /// Formula text with a leading `=`
    pub fn formula(&self) -> Option<String> {
        self.formula.as_ref().map(Formula::text)
    }

    pub fn formula_ref(&self) -> Option<&Formula> {
        self.formula.as_ref()
    }

    pub fn style_id(&self) -> StyleId {
        self.style
    }

    pub fn has_formula(&self) -> bool {
        self.formula.is_some()
    }

    /// Carries neither content nor formatting
    pub(crate) fn is_blank(&self) -> bool {
        self.value.is_empty() && self.formula.is_none() && self.style == StyleId::DEFAULT
    }
}
