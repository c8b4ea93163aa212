//! Small XML toolkit over quick-xml
//!
//! Large parts (`sheetData`) are read as events; everything else is read
//! into [`XmlNode`] subtrees, which can also be written back verbatim for
//! elements the engine keeps without modelling.

use anyhow::{Context, Result, bail};
use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};

pub(crate) const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

pub(crate) type XmlReader<'a> = Reader<&'a [u8]>;

pub(crate) fn reader(bytes: &[u8]) -> XmlReader<'_> {
    let mut reader = Reader::from_reader(bytes);
    let config = reader.config_mut();
    config.trim_text(false);
    config.check_end_names = false;
    reader
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum XmlContent {
    Element(XmlNode),
    Text(String),
}

/// An element with its attributes and content, names kept qualified
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct XmlNode {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlContent>,
}

pub(crate) fn local(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

impl XmlNode {
    /// Parse a whole document and return its root element
    pub(crate) fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = reader(bytes);
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    let start = e.into_owned();
                    return Self::read(&mut reader, &start);
                }
                Event::Empty(e) => return Self::open(&e),
                Event::Eof => bail!("document has no root element"),
                _ => {}
            }
            buf.clear();
        }
    }

    /// Read the content of `start`, whose start tag was just consumed.
    /// Unclosed tags are closed when an enclosing end tag arrives.
    pub(crate) fn read(reader: &mut XmlReader<'_>, start: &BytesStart<'_>) -> Result<Self> {
        let mut stack = vec![Self::open(start)?];
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => stack.push(Self::open(&e)?),
                Event::Empty(e) => {
                    let node = Self::open(&e)?;
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlContent::Element(node));
                    }
                }
                Event::Text(t) => {
                    let text = t.unescape()?.into_owned();
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlContent::Text(text));
                    }
                }
                Event::CData(c) => {
                    let text = String::from_utf8(c.into_inner().into_owned())?;
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlContent::Text(text));
                    }
                }
                Event::End(e) => {
                    let name = std::str::from_utf8(e.name().as_ref())?.to_string();
                    if !stack.iter().any(|n| n.name == name) {
                        buf.clear();
                        continue;
                    }
                    loop {
                        let node = stack.pop().context("unbalanced end tag")?;
                        let done = node.name == name;
                        match stack.last_mut() {
                            Some(parent) => parent.children.push(XmlContent::Element(node)),
                            None => return Ok(node),
                        }
                        if done {
                            break;
                        }
                    }
                }
                Event::Eof => {
                    let mut node = stack.pop().context("empty element stack")?;
                    while let Some(mut parent) = stack.pop() {
                        parent.children.push(XmlContent::Element(node));
                        node = parent;
                    }
                    if node.name == "xml" {
                        return Ok(node);
                    }
                    bail!("document ends inside <{}>", node.name);
                }
                _ => {}
            }
            buf.clear();
        }
    }

    pub(crate) fn open(start: &BytesStart<'_>) -> Result<Self> {
        let name = std::str::from_utf8(start.name().as_ref())?.to_string();
        let mut attrs = Vec::new();
        for attr in start.attributes().with_checks(false) {
            let attr = attr?;
            let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
            attrs.push((key, attr.unescape_value()?.into_owned()));
        }
        Ok(Self {
            name,
            attrs,
            children: Vec::new(),
        })
    }

    pub(crate) fn local_name(&self) -> &str {
        local(&self.name)
    }

    /// Attribute by exact qualified name
    pub(crate) fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute `local` under any namespace prefix, such as `r:id`
    pub(crate) fn prefixed_attr(&self, local_name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.contains(':') && local(k) == local_name)
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn attr_u32(&self, name: &str) -> Option<u32> {
        self.attr(name)?.trim().parse().ok()
    }

    pub(crate) fn attr_f64(&self, name: &str) -> Option<f64> {
        self.attr(name)?.trim().parse().ok()
    }

    /// Boolean attribute, `default` when absent
    pub(crate) fn attr_bool(&self, name: &str, default: bool) -> bool {
        self.attr(name).map_or(default, parse_bool)
    }

    pub(crate) fn elements(&self) -> impl Iterator<Item = &XmlNode> {
        self.children.iter().filter_map(|c| match c {
            XmlContent::Element(node) => Some(node),
            XmlContent::Text(_) => None,
        })
    }

    pub(crate) fn child(&self, local_name: &str) -> Option<&XmlNode> {
        self.elements().find(|n| n.local_name() == local_name)
    }

    pub(crate) fn children_named<'a>(&'a self, local_name: &'a str) -> impl Iterator<Item = &'a XmlNode> {
        self.elements().filter(move |n| n.local_name() == local_name)
    }

    /// First element named `local_name` anywhere below this one
    pub(crate) fn descendant(&self, local_name: &str) -> Option<&XmlNode> {
        self.elements().find_map(|n| {
            if n.local_name() == local_name {
                Some(n)
            } else {
                n.descendant(local_name)
            }
        })
    }

    /// Concatenated text of this element and its descendants
    pub(crate) fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                XmlContent::Text(t) => out.push_str(t),
                XmlContent::Element(node) => node.collect_text(out),
            }
        }
    }

    /// Does this element or a descendant carry a relationship reference?
    pub(crate) fn has_relationship(&self) -> bool {
        self.attrs
            .iter()
            .any(|(k, _)| k.starts_with("r:") || (k.contains(':') && matches!(local(k), "id" | "embed" | "link")))
            || self.elements().any(XmlNode::has_relationship)
    }

    pub(crate) fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attrs {
            push_attr(out, key, value);
        }
        if self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                XmlContent::Text(t) => out.push_str(&escape(t.as_str())),
                XmlContent::Element(node) => node.write_to(out),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }

    pub(crate) fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out);
        out
    }

    /// Copy carrying the prefixed namespace declarations of `root` that the
    /// element uses, so it can be written outside its document
    pub(crate) fn detach(&self, root: &XmlNode) -> XmlNode {
        let mut node = self.clone();
        let xml = self.to_xml();
        for (key, value) in &root.attrs {
            let Some(prefix) = key.strip_prefix("xmlns:") else {
                continue;
            };
            let used = xml.contains(&format!("<{}:", prefix)) || xml.contains(&format!(" {}:", prefix));
            if used && node.attr(key).is_none() {
                node.attrs.push((key.clone(), value.clone()));
            }
        }
        node
    }
}

/// Index of `name` in a schema child sequence; unknown names sort last
pub(crate) fn schema_position(order: &[&str], name: &str) -> usize {
    order.iter().position(|n| *n == name).unwrap_or(order.len())
}

pub(crate) fn parse_bool(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "True" | "TRUE" | "t")
}

pub(crate) fn bool_str(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

/// Append ` key="value"` with the value escaped
pub(crate) fn push_attr(out: &mut String, key: &str, value: &str) {
    out.push(' ');
    out.push_str(key);
    out.push_str("=\"");
    out.push_str(&escape(value));
    out.push('"');
}

/// Escaped element text
pub(crate) fn text(value: &str) -> std::borrow::Cow<'_, str> {
    escape(value)
}

/// Text element content, keeping leading and trailing whitespace
pub(crate) fn push_t(out: &mut String, tag: &str, value: &str) {
    let keep = value.starts_with(char::is_whitespace) || value.ends_with(char::is_whitespace) || value.contains('\n');
    out.push('<');
    out.push_str(tag);
    if keep {
        out.push_str(r#" xml:space="preserve""#);
    }
    out.push('>');
    out.push_str(&escape(value));
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

/// Number text without a trailing `.0`
pub(crate) fn number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tree_and_lookup() {
        let xml = br#"<?xml version="1.0"?><root xmlns:r="urn:r"><a val="1"/><b r:id="rId3">x &amp; <c>y</c></b></root>"#;
        let root = XmlNode::parse(xml).unwrap();
        assert_eq!(root.child("a").and_then(|a| a.attr("val")), Some("1"));
        let b = root.child("b").unwrap();
        assert_eq!(b.prefixed_attr("id"), Some("rId3"));
        assert_eq!(b.text(), "x & y");
        assert!(root.has_relationship());
        assert!(!root.child("a").unwrap().has_relationship());
    }

    #[test]
    fn test_unclosed_tags_are_closed_by_parent() {
        let vml = b"<xml><v:shape><div>one<br>two</div><x:Row>3</x:Row></v:shape></xml>";
        let root = XmlNode::parse(vml).unwrap();
        let shape = root.child("shape").unwrap();
        assert_eq!(shape.child("Row").unwrap().text(), "3");
        assert_eq!(shape.child("div").unwrap().text(), "onetwo");
    }

    #[test]
    fn test_write_round_trip() {
        let xml = r#"<x:ext uri="{A&amp;B}"><x:v>1 &lt; 2</x:v><x:e/></x:ext>"#;
        let node = XmlNode::parse(xml.as_bytes()).unwrap();
        assert_eq!(node.to_xml(), xml);
        assert_eq!(number(3.0), "3");
        assert_eq!(number(0.25), "0.25");
    }
}
