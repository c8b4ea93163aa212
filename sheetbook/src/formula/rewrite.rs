//! Reference rewriting
//!
//! Formulas are edited at the token level: only the text of affected
//! references changes, everything else (spacing, casing of functions,
//! literals) is kept as written.

use super::ast::{RefTarget, Reference, quote_sheet_name};
use super::lexer::{TokenKind, tokenize};

/// What to do with one reference
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RefEdit {
    Keep,
    /// Replace the area, keeping any sheet qualifier as written
    Target(RefTarget),
    /// Point the qualifier at a renamed sheet
    Sheet(String),
    /// Area no longer exists; becomes `#REF!` behind the qualifier
    Invalid,
    /// Sheet no longer exists; the whole reference becomes `#REF!`
    Removed,
}

/// Rewrite every reference in `body` (formula text without `=`). Returns
/// `None` when nothing changed or the text does not tokenize.
pub(crate) fn rewrite_formula(body: &str, mut edit: impl FnMut(&Reference) -> RefEdit) -> Option<String> {
    let tokens = tokenize(body).ok()?;
    let mut out = String::with_capacity(body.len());
    let mut last = 0;
    let mut changed = false;
    for token in &tokens {
        let TokenKind::Reference {
            reference,
            prefix_len,
        } = &token.kind
        else {
            continue;
        };
        let prefix_end = token.span.start + prefix_len;
        let replacement = match edit(reference) {
            RefEdit::Keep => continue,
            RefEdit::Target(target) => {
                format!("{}{}", &body[token.span.start..prefix_end], target)
            }
            RefEdit::Sheet(name) => {
                if *prefix_len == 0 {
                    continue;
                }
                format!("{}!{}", quote_sheet_name(&name), &body[prefix_end..token.span.end])
            }
            RefEdit::Invalid => format!("{}#REF!", &body[token.span.start..prefix_end]),
            RefEdit::Removed => "#REF!".to_string(),
        };
        out.push_str(&body[last..token.span.start]);
        out.push_str(&replacement);
        last = token.span.end;
        changed = true;
    }
    if !changed {
        return None;
    }
    out.push_str(&body[last..]);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::ast::{CellRef, Coord};

    #[test]
    fn test_only_references_change() {
        let out = rewrite_formula("SUM( A1:A3 ) + \"A1\" & b2", |r| match r.target {
            RefTarget::Area(..) => RefEdit::Target(RefTarget::Area(
                CellRef::relative(0, 0),
                CellRef::relative(4, 0),
            )),
            _ => RefEdit::Keep,
        });
        assert_eq!(out.as_deref(), Some("SUM( A1:A5 ) + \"A1\" & b2"));
    }

    #[test]
    fn test_sheet_qualifiers() {
        let rename = |r: &Reference| match r.sheet.as_deref() {
            Some("Old") => RefEdit::Sheet("New Name".to_string()),
            _ => RefEdit::Keep,
        };
        assert_eq!(
            rewrite_formula("Old!$A$1+A1+'Old'!B2", rename).as_deref(),
            Some("'New Name'!$A$1+A1+'New Name'!B2")
        );

        let removed = |r: &Reference| {
            if r.sheet.is_some() {
                RefEdit::Removed
            } else {
                RefEdit::Invalid
            }
        };
        assert_eq!(
            rewrite_formula("Gone!A1*B$2", removed).as_deref(),
            Some("#REF!*#REF!")
        );
        let invalid = |_: &Reference| RefEdit::Invalid;
        assert_eq!(
            rewrite_formula("'My Sheet'!A1:B2", invalid).as_deref(),
            Some("'My Sheet'!#REF!")
        );
    }

    #[test]
    fn test_untouched_formula_yields_none() {
        assert_eq!(rewrite_formula("1+2", |_| RefEdit::Invalid), None);
        assert_eq!(rewrite_formula("A1", |_| RefEdit::Keep), None);
        let rows = RefTarget::Rows(Coord::new(1, false), Coord::new(3, false));
        assert_eq!(
            rewrite_formula("SUM(2:3)", |_| RefEdit::Target(rows)).as_deref(),
            Some("SUM(2:4)")
        );
    }
}
