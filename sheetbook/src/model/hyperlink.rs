//! Hyperlinks anchored on cell ranges

use super::sheet_mut::WorksheetMut;
use super::style::{Color, Underline};
use crate::address::{CellRange, IntoRange, parse_cell_ref};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HyperlinkTarget {
    /// Place inside the workbook, such as `Sheet2!A1`
    Location(String),
    Url(String),
    Email(String),
    File(String),
}

impl HyperlinkTarget {
    /// Classify free text the way a user would type it into a link dialog
    pub fn classify(target: &str) -> Self {
        let target = target.trim();
        if let Some(address) = target.strip_prefix("mailto:") {
            return HyperlinkTarget::Email(address.to_string());
        }
        if let Some(location) = target.strip_prefix('#') {
            return HyperlinkTarget::Location(location.to_string());
        }
        if target.contains("://") {
            return HyperlinkTarget::Url(target.to_string());
        }
        if target.contains('!') || parse_cell_ref(target).is_some() {
            return HyperlinkTarget::Location(target.to_string());
        }
        if target.contains('@') {
            return HyperlinkTarget::Email(target.to_string());
        }
        if target.len() > 4 && target.get(..4).is_some_and(|p| p.eq_ignore_ascii_case("www.")) {
            return HyperlinkTarget::Url(format!("http://{}", target));
        }
        HyperlinkTarget::File(target.to_string())
    }

    /// Relationship target for external links, `None` for locations
    pub(crate) fn external_target(&self) -> Option<String> {
        match self {
            HyperlinkTarget::Location(_) => None,
            HyperlinkTarget::Url(url) => Some(url.clone()),
            HyperlinkTarget::Email(address) => Some(format!("mailto:{}", address)),
            HyperlinkTarget::File(path) => Some(path.clone()),
        }
    }

    /// Text shown in an empty anchor cell
    pub fn default_display(&self) -> String {
        match self {
            HyperlinkTarget::Location(s) | HyperlinkTarget::Url(s) | HyperlinkTarget::File(s) => {
                s.clone()
            }
            HyperlinkTarget::Email(address) => address.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hyperlink {
    pub range: CellRange,
    pub target: HyperlinkTarget,
    pub display: Option<String>,
    pub tooltip: Option<String>,
}

impl Hyperlink {
    pub fn new(range: CellRange, target: HyperlinkTarget) -> Self {
        Self {
            range,
            target,
            display: None,
            tooltip: None,
        }
    }

    pub fn with_tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = Some(tooltip.into());
        self
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }
}

impl WorksheetMut<'_> {
    /// Link `range` to `target`, classified as a location, URL, e-mail
    /// address or file; returns the link's position
    pub fn add_hyperlink(&mut self, range: impl IntoRange, target: &str) -> Result<usize> {
        let range = range.into_range()?;
        self.insert_hyperlink(Hyperlink::new(range, HyperlinkTarget::classify(target)))
    }

    /// Add a fully described link. Links already covering part of its range
    /// are replaced. An empty anchor cell receives the display text in the
    /// hyperlink font.
    pub fn insert_hyperlink(&mut self, link: Hyperlink) -> Result<usize> {
        self.book.ensure_open()?;
        let anchor = link.range.start;
        if self.value_at(anchor).is_empty() && !self.cell_at(anchor).is_some_and(|c| c.has_formula()) {
            let text = link
                .display
                .clone()
                .unwrap_or_else(|| link.target.default_display());
            self.set_value(anchor, text)?;
            self.update_style(anchor, |s| {
                s.font.color = Some(Color::HYPERLINK);
                s.font.underline = Underline::Single;
            })?;
        }
        let links = &mut self.sheet_mut().hyperlinks;
        links.retain(|h| !h.range.intersects(&link.range));
        links.push(link);
        Ok(links.len() - 1)
    }

    pub fn remove_hyperlink(&mut self, index: usize) -> Result<Hyperlink> {
        self.book.ensure_open()?;
        let links = &mut self.sheet_mut().hyperlinks;
        if index >= links.len() {
            return Err(Error::out_of_range(format!("hyperlink {} of {}", index, links.len())));
        }
        Ok(links.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(
            HyperlinkTarget::classify("Sheet2!B3"),
            HyperlinkTarget::Location("Sheet2!B3".into())
        );
        assert_eq!(HyperlinkTarget::classify("C7"), HyperlinkTarget::Location("C7".into()));
        assert_eq!(
            HyperlinkTarget::classify("https://example.com/a?b=c@d"),
            HyperlinkTarget::Url("https://example.com/a?b=c@d".into())
        );
        assert_eq!(
            HyperlinkTarget::classify("someone@example.com"),
            HyperlinkTarget::Email("someone@example.com".into())
        );
        assert_eq!(
            HyperlinkTarget::classify("www.example.com"),
            HyperlinkTarget::Url("http://www.example.com".into())
        );
        assert_eq!(
            HyperlinkTarget::classify("report.xlsx"),
            HyperlinkTarget::File("report.xlsx".into())
        );
    }

    #[test]
    fn test_classify_non_ascii_targets() {
        assert_eq!(
            HyperlinkTarget::classify("報告書.xlsx"),
            HyperlinkTarget::File("報告書.xlsx".into())
        );
        assert_eq!(HyperlinkTarget::classify("wwwé.de"), HyperlinkTarget::File("wwwé.de".into()));
        assert_eq!(
            HyperlinkTarget::classify("'Übersicht'!A1"),
            HyperlinkTarget::Location("'Übersicht'!A1".into())
        );
    }

    #[test]
    fn test_external_targets() {
        let mail = HyperlinkTarget::Email("a@b.c".into());
        assert_eq!(mail.external_target().as_deref(), Some("mailto:a@b.c"));
        assert_eq!(HyperlinkTarget::Location("A1".into()).external_target(), None);
    }

    #[test]
    fn test_add_fills_empty_anchor() {
        use crate::model::Workbook;
        let mut book = Workbook::new();
        let mut ws = book.worksheet_mut(0).unwrap();
        ws.set_value("B1", "Docs").unwrap();
        ws.add_hyperlink("A1", "www.example.com").unwrap();
        ws.add_hyperlink("B1", "https://docs.example.com").unwrap();
        assert_eq!(ws.value("A1").unwrap().as_text().as_deref(), Some("http://www.example.com"));
        assert_eq!(ws.style_of("A1").unwrap().font.color, Some(Color::HYPERLINK));
        assert_eq!(ws.value("B1").unwrap().as_text().as_deref(), Some("Docs"));
        assert!(ws.style_of("B1").unwrap().font.color.is_none());
        ws.add_hyperlink("A1", "#Sheet1!C3").unwrap();
        assert_eq!(ws.hyperlinks().len(), 2);
        assert_eq!(
            ws.hyperlink_at("A1").unwrap().map(|h| h.target.clone()),
            Some(HyperlinkTarget::Location("Sheet1!C3".into()))
        );
        ws.remove_hyperlink(0).unwrap();
        assert!(matches!(ws.remove_hyperlink(5), Err(Error::IndexOutOfRange(_))));
    }
}
