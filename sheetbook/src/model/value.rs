//! Cell values and rich text

use super::style::Font;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use std::fmt;
use std::sync::Arc;

/// Formula error values; stored in cells like any other value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorValue {
    Null,
    Div0,
    Value,
    Ref,
    Name,
    Num,
    NA,
    /// Produced for every cell on a reference cycle; never written to a
    /// package
    Circular,
}

impl ErrorValue {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorValue::Null => "#NULL!",
            ErrorValue::Div0 => "#DIV/0!",
            ErrorValue::Value => "#VALUE!",
            ErrorValue::Ref => "#REF!",
            ErrorValue::Name => "#NAME?",
            ErrorValue::Num => "#NUM!",
            ErrorValue::NA => "#N/A",
            ErrorValue::Circular => "#CIRC!",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        let upper = text.trim().to_ascii_uppercase();
        Some(match upper.as_str() {
            "#NULL!" => ErrorValue::Null,
            "#DIV/0!" => ErrorValue::Div0,
            "#VALUE!" => ErrorValue::Value,
            "#REF!" => ErrorValue::Ref,
            "#NAME?" => ErrorValue::Name,
            "#NUM!" => ErrorValue::Num,
            "#N/A" => ErrorValue::NA,
            "#CIRC!" => ErrorValue::Circular,
            _ => return None,
        })
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A span of text with an optional font override
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextRun {
    pub text: String,
    /// `None` uses the cell font
    pub font: Option<Font>,
}

impl TextRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            font: None,
        }
    }

    pub fn styled(text: impl Into<String>, font: Font) -> Self {
        Self {
            text: text.into(),
            font: Some(font),
        }
    }
}

/// Text made of one or more runs. Plain text is a single unformatted run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RichText {
    runs: Vec<TextRun>,
}

impl RichText {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            runs: vec![TextRun::plain(text)],
        }
    }

    /// Adjacent runs with the same font are coalesced and empty runs dropped
    pub fn from_runs(runs: impl IntoIterator<Item = TextRun>) -> Self {
        let mut merged: Vec<TextRun> = Vec::new();
        for run in runs {
            if run.text.is_empty() {
                continue;
            }
            match merged.last_mut() {
                Some(last) if last.font == run.font => last.text.push_str(&run.text),
                _ => merged.push(run),
            }
        }
        if merged.is_empty() {
            merged.push(TextRun::plain(""));
        }
        Self { runs: merged }
    }

    pub fn runs(&self) -> &[TextRun] {
        &self.runs
    }

    pub fn is_plain(&self) -> bool {
        self.runs.iter().all(|run| run.font.is_none())
    }

    pub fn plain_text(&self) -> String {
        self.runs.iter().map(|run| run.text.as_str()).collect()
    }

    pub fn char_len(&self) -> usize {
        self.runs.iter().map(|run| run.text.chars().count()).sum()
    }

    /// Apply `font` to the characters `start..start + len`, splitting runs at
    /// the span boundaries. Returns `None` when the span exceeds the text.
    pub fn with_span_font(&self, start: usize, len: usize, font: &Font) -> Option<Self> {
        let end = start.checked_add(len)?;
        if end > self.char_len() {
            return None;
        }
        let mut out = Vec::new();
        let mut pos = 0usize;
        for run in &self.runs {
            let count = run.text.chars().count();
            let (run_start, run_end) = (pos, pos + count);
            pos = run_end;
            if run_end <= start || run_start >= end {
                out.push(run.clone());
                continue;
            }
            let local_start = start.saturating_sub(run_start);
            let local_end = end.min(run_end) - run_start;
            let chars: Vec<char> = run.text.chars().collect();
            let before: String = chars[..local_start].iter().collect();
            let inside: String = chars[local_start..local_end].iter().collect();
            let after: String = chars[local_end..].iter().collect();
            out.push(TextRun {
                text: before,
                font: run.font.clone(),
            });
            out.push(TextRun::styled(inside, font.clone()));
            out.push(TextRun {
                text: after,
                font: run.font.clone(),
            });
        }
        Some(Self::from_runs(out))
    }

    /// Replace every occurrence of `find` inside each run. Matches that
    /// straddle runs are replaced on a flattened copy using the first run's
    /// font. Returns `None` when nothing matched.
    pub fn replace(&self, find: &str, replacement: &str) -> Option<Self> {
        if find.is_empty() || !self.plain_text().contains(find) {
            return None;
        }
        if self.runs.iter().any(|run| run.text.contains(find)) {
            let runs = self.runs.iter().map(|run| TextRun {
                text: run.text.replace(find, replacement),
                font: run.font.clone(),
            });
            return Some(Self::from_runs(runs));
        }
        let font = self.runs.first().and_then(|run| run.font.clone());
        Some(Self::from_runs([TextRun {
            text: self.plain_text().replace(find, replacement),
            font,
        }]))
    }
}

impl From<&str> for RichText {
    fn from(value: &str) -> Self {
        RichText::plain(value)
    }
}

impl From<String> for RichText {
    fn from(value: String) -> Self {
        RichText::plain(value)
    }
}

impl fmt::Display for RichText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for run in &self.runs {
            f.write_str(&run.text)?;
        }
        Ok(())
    }
}

/// Content of a cell
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Boolean(bool),
    Text(Arc<RichText>),
    DateTime(NaiveDateTime),
    Duration(TimeDelta),
    Error(ErrorValue),
}

impl CellValue {
    pub fn text(text: impl Into<String>) -> Self {
        CellValue::Text(Arc::new(RichText::plain(text)))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Text(text) => Some(text.plain_text()),
            _ => None,
        }
    }

    pub fn as_rich_text(&self) -> Option<&RichText> {
        match self {
            CellValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<ErrorValue> {
        match self {
            CellValue::Error(e) => Some(*e),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Boolean(true) => f.write_str("TRUE"),
            CellValue::Boolean(false) => f.write_str("FALSE"),
            CellValue::Text(text) => write!(f, "{}", text),
            CellValue::DateTime(dt) => write!(f, "{}", dt),
            CellValue::Duration(d) => write!(f, "{}", d),
            CellValue::Error(e) => write!(f, "{}", e),
        }
    }
}

macro_rules! number_from {
    ($($t:ty),*) => {
        $(impl From<$t> for CellValue {
            fn from(value: $t) -> Self {
                CellValue::Number(value as f64)
            }
        })*
    };
}

number_from!(f64, f32, i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Boolean(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::text(value)
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::text(value)
    }
}

impl From<&String> for CellValue {
    fn from(value: &String) -> Self {
        CellValue::text(value.as_str())
    }
}

impl From<RichText> for CellValue {
    fn from(value: RichText) -> Self {
        CellValue::Text(Arc::new(value))
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(value: NaiveDateTime) -> Self {
        CellValue::DateTime(value)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::DateTime(value.and_time(chrono::NaiveTime::MIN))
    }
}

impl From<TimeDelta> for CellValue {
    fn from(value: TimeDelta) -> Self {
        CellValue::Duration(value)
    }
}

impl From<ErrorValue> for CellValue {
    fn from(value: ErrorValue) -> Self {
        CellValue::Error(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_value_text() {
        for e in [
            ErrorValue::Null,
            ErrorValue::Div0,
            ErrorValue::Value,
            ErrorValue::Ref,
            ErrorValue::Name,
            ErrorValue::Num,
            ErrorValue::NA,
        ] {
            assert_eq!(ErrorValue::parse(e.as_str()), Some(e));
        }
        assert_eq!(ErrorValue::parse("#n/a"), Some(ErrorValue::NA));
        assert_eq!(ErrorValue::parse("#BOGUS"), None);
    }

    #[test]
    fn test_span_font_splits_runs() {
        let text = RichText::plain("Hello world");
        let bold = Font::default().bold();
        let formatted = text.with_span_font(6, 5, &bold).unwrap();
        assert_eq!(formatted.runs().len(), 2);
        assert_eq!(formatted.runs()[0].text, "Hello ");
        assert_eq!(formatted.runs()[1].text, "world");
        assert_eq!(formatted.runs()[1].font.as_ref(), Some(&bold));
        assert_eq!(formatted.plain_text(), "Hello world");

        let middle = text.with_span_font(2, 2, &bold).unwrap();
        assert_eq!(middle.runs().len(), 3);
        assert!(text.with_span_font(8, 10, &bold).is_none());
    }

    #[test]
    fn test_replace_inside_runs() {
        let bold = Font::default().bold();
        let text = RichText::from_runs([
            TextRun::plain("Total "),
            TextRun::styled("2023", bold.clone()),
        ]);
        let replaced = text.replace("2023", "2024").unwrap();
        assert_eq!(replaced.plain_text(), "Total 2024");
        assert_eq!(replaced.runs()[1].font.as_ref(), Some(&bold));
        assert!(text.replace("missing", "x").is_none());

        let straddling = text.replace("l 2", "l-2").unwrap();
        assert_eq!(straddling.plain_text(), "Total-2023");
    }

    #[test]
    fn test_conversions() {
        assert_eq!(CellValue::from(3), CellValue::Number(3.0));
        assert_eq!(CellValue::from("x").as_text().as_deref(), Some("x"));
        assert_eq!(CellValue::from(None::<f64>), CellValue::Empty);
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert!(matches!(CellValue::from(date), CellValue::DateTime(_)));
    }
}
