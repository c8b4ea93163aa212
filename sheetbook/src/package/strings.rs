//! `xl/sharedStrings.xml` and rich text runs

use super::styles::{push_font_props, read_font};
use super::xml::{XML_DECLARATION, XmlNode, push_t};
use crate::model::{CellValue, RichText, TextRun, Workbook};
use crate::pool::{Remap, SharedStringPool, StringId};
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Rich text from an element holding `<t>` or `<r>` children (`si`, `is`,
/// comment `text`)
pub(crate) fn read_rich_text(node: &XmlNode) -> RichText {
    let mut runs = Vec::new();
    for child in node.elements() {
        match child.local_name() {
            "t" => runs.push(TextRun::plain(child.text())),
            "r" => {
                let text = child.child("t").map(XmlNode::text).unwrap_or_default();
                runs.push(TextRun {
                    text,
                    font: child.child("rPr").map(read_font),
                });
            }
            _ => {}
        }
    }
    RichText::from_runs(runs)
}

/// Content of `si`-like elements: one `<t>` for plain text, runs otherwise
pub(crate) fn push_rich_text(out: &mut String, text: &RichText) {
    if text.is_plain() {
        push_t(out, "t", &text.plain_text());
        return;
    }
    for run in text.runs() {
        out.push_str("<r>");
        if let Some(font) = &run.font {
            out.push_str("<rPr>");
            push_font_props(out, font, "rFont");
            out.push_str("</rPr>");
        }
        push_t(out, "t", &run.text);
        out.push_str("</r>");
    }
}

/// Parse the shared string table, interning every entry into `pool`
pub(crate) fn read_shared_strings(xml: &[u8], pool: &mut SharedStringPool) -> Result<Vec<Arc<RichText>>> {
    let root = XmlNode::parse(xml)?;
    Ok(root
        .children_named("si")
        .map(|si| pool.intern(read_rich_text(si)).1)
        .collect())
}

/// Shared strings referenced by the cells of one save
pub(crate) struct StringTable<'a> {
    order: Vec<&'a RichText>,
    index: HashMap<&'a RichText, u32>,
    references: usize,
}

impl<'a> StringTable<'a> {
    /// Pool entries used by constant text cells, in pool order, followed by
    /// any text that never went through the pool
    pub(crate) fn build(book: &'a Workbook) -> Self {
        let mut used: HashSet<u32> = HashSet::new();
        let mut extras: Vec<&'a RichText> = Vec::new();
        let mut references = 0;
        for ws in &book.sheets {
            for (_, cell) in ws.cells() {
                if cell.has_formula() {
                    continue;
                }
                let CellValue::Text(text) = cell.value() else {
                    continue;
                };
                references += 1;
                match book.strings.id_of(text) {
                    Some(id) => {
                        used.insert(id.0);
                    }
                    None => extras.push(text.as_ref()),
                }
            }
        }
        let remap = Remap::build(book.strings.len(), used, false);
        let mut table = Self {
            order: Vec::new(),
            index: HashMap::new(),
            references,
        };
        let pooled = remap
            .order()
            .iter()
            .filter_map(|i| book.strings.get(StringId(*i)))
            .map(Arc::as_ref);
        for text in pooled.chain(extras) {
            if !table.index.contains_key(text) {
                table.index.insert(text, table.order.len() as u32);
                table.order.push(text);
            }
        }
        table
    }

    pub(crate) fn index_of(&self, text: &RichText) -> Option<u32> {
        self.index.get(text).copied()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub(crate) fn to_xml(&self) -> String {
        let mut out = String::from(XML_DECLARATION);
        out.push_str(&format!(
            r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{}" uniqueCount="{}">"#,
            self.references,
            self.order.len()
        ));
        for text in &self.order {
            out.push_str("<si>");
            push_rich_text(&mut out, text);
            out.push_str("</si>");
        }
        out.push_str("</sst>");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Font;

    #[test]
    fn test_table_skips_unreferenced_entries() {
        let mut book = Workbook::new();
        let mut ws = book.worksheet_mut(0).unwrap();
        ws.set_value("A1", "first").unwrap();
        ws.set_value("A2", "dropped").unwrap();
        ws.set_value("A3", "last").unwrap();
        ws.set_value("A4", "first").unwrap();
        ws.set_value("A2", 2).unwrap();
        let table = StringTable::build(&book);
        assert_eq!(table.index_of(&RichText::plain("first")), Some(0));
        assert_eq!(table.index_of(&RichText::plain("last")), Some(1));
        assert_eq!(table.index_of(&RichText::plain("dropped")), None);
        let xml = table.to_xml();
        assert!(xml.contains(r#"count="3" uniqueCount="2""#));
    }

    #[test]
    fn test_rich_runs_round_trip() {
        let text = RichText::from_runs([
            TextRun::plain(" lead "),
            TextRun::styled("bold", Font::default().bold()),
        ]);
        let mut xml = String::from("<si>");
        push_rich_text(&mut xml, &text);
        xml.push_str("</si>");
        assert!(xml.contains(r#"<t xml:space="preserve"> lead </t>"#));
        let mut pool = SharedStringPool::new();
        let root = format!("<sst>{}</sst>", xml);
        let read = read_shared_strings(root.as_bytes(), &mut pool).unwrap();
        assert_eq!(*read[0], text);
        assert_eq!(pool.len(), 1);
    }
}
