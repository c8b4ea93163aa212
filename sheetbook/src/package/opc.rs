//! Package plumbing: relationships, content types and part names

use super::xml::{XML_DECLARATION, XmlNode, push_attr};
use anyhow::Result;
use std::collections::{BTreeMap, HashSet};

pub(crate) mod rel {
    pub(crate) const OFFICE_DOCUMENT: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
    pub(crate) const WORKSHEET: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
    pub(crate) const STYLES: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
    pub(crate) const SHARED_STRINGS: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";
    pub(crate) const THEME: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme";
    pub(crate) const CALC_CHAIN: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/calcChain";
    pub(crate) const TABLE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/table";
    pub(crate) const HYPERLINK: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";
    pub(crate) const COMMENTS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/comments";
    pub(crate) const VML_DRAWING: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/vmlDrawing";
    pub(crate) const DRAWING: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/drawing";
    pub(crate) const IMAGE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
    pub(crate) const THREADED_COMMENT: &str = "http://schemas.microsoft.com/office/2017/10/relationships/threadedComment";
    pub(crate) const PERSON: &str = "http://schemas.microsoft.com/office/2017/10/relationships/person";
}

pub(crate) mod content_type {
    pub(crate) const RELS: &str = "application/vnd.openxmlformats-package.relationships+xml";
    pub(crate) const XML: &str = "application/xml";
    pub(crate) const WORKBOOK: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";
    pub(crate) const WORKSHEET: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
    pub(crate) const STYLES: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml";
    pub(crate) const SHARED_STRINGS: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml";
    pub(crate) const THEME: &str = "application/vnd.openxmlformats-officedocument.theme+xml";
    pub(crate) const TABLE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.table+xml";
    pub(crate) const COMMENTS: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.comments+xml";
    pub(crate) const VML: &str = "application/vnd.openxmlformats-officedocument.vmlDrawing";
    pub(crate) const DRAWING: &str = "application/vnd.openxmlformats-officedocument.drawing+xml";
    pub(crate) const THREADED_COMMENTS: &str = "application/vnd.ms-excel.threadedcomments+xml";
    pub(crate) const PERSONS: &str = "application/vnd.ms-excel.person+xml";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

impl Relationship {
    pub(crate) fn new(id: impl Into<String>, rel_type: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rel_type: rel_type.into(),
            target: target.into(),
            external: false,
        }
    }

    pub(crate) fn external(id: impl Into<String>, rel_type: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            external: true,
            ..Self::new(id, rel_type, target)
        }
    }

    pub(crate) fn is(&self, rel_type: &str) -> bool {
        self.rel_type == rel_type
    }
}

pub(crate) fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>> {
    let root = XmlNode::parse(xml)?;
    Ok(root
        .children_named("Relationship")
        .filter_map(|node| {
            Some(Relationship {
                id: node.attr("Id")?.to_string(),
                rel_type: node.attr("Type")?.to_string(),
                target: node.attr("Target")?.to_string(),
                external: node
                    .attr("TargetMode")
                    .is_some_and(|m| m.eq_ignore_ascii_case("External")),
            })
        })
        .collect())
}

pub(crate) fn relationships_xml(rels: &[Relationship]) -> String {
    let mut out = String::from(XML_DECLARATION);
    out.push_str(r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#);
    for r in rels {
        out.push_str("<Relationship");
        push_attr(&mut out, "Id", &r.id);
        push_attr(&mut out, "Type", &r.rel_type);
        push_attr(&mut out, "Target", &r.target);
        if r.external {
            push_attr(&mut out, "TargetMode", "External");
        }
        out.push_str("/>");
    }
    out.push_str("</Relationships>");
    out
}

/// Hands out `rIdN` ids, skipping ids already taken
#[derive(Debug, Default)]
pub(crate) struct RelIds {
    taken: HashSet<String>,
    next: u32,
}

impl RelIds {
    pub(crate) fn reserving<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            taken: ids.into_iter().map(str::to_string).collect(),
            next: 1,
        }
    }

    pub(crate) fn next_id(&mut self) -> String {
        loop {
            let id = format!("rId{}", self.next);
            self.next += 1;
            if self.taken.insert(id.clone()) {
                return id;
            }
        }
    }
}

/// `[Content_Types].xml`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ContentTypes {
    /// Extension (lowercase) to content type
    pub defaults: BTreeMap<String, String>,
    /// Part name without the leading `/` to content type
    pub overrides: BTreeMap<String, String>,
}

impl ContentTypes {
    pub(crate) fn parse(xml: &[u8]) -> Result<Self> {
        let root = XmlNode::parse(xml)?;
        let mut types = Self::default();
        for node in root.elements() {
            match node.local_name() {
                "Default" => {
                    if let (Some(ext), Some(ct)) = (node.attr("Extension"), node.attr("ContentType")) {
                        types.defaults.insert(ext.to_ascii_lowercase(), ct.to_string());
                    }
                }
                "Override" => {
                    if let (Some(part), Some(ct)) = (node.attr("PartName"), node.attr("ContentType")) {
                        types
                            .overrides
                            .insert(part.trim_start_matches('/').to_string(), ct.to_string());
                    }
                }
                _ => {}
            }
        }
        Ok(types)
    }

    /// Content type of `part`, override first
    pub(crate) fn of(&self, part: &str) -> Option<&str> {
        if let Some(ct) = self.overrides.get(part) {
            return Some(ct);
        }
        let ext = part.rsplit_once('.')?.1.to_ascii_lowercase();
        self.defaults.get(&ext).map(String::as_str)
    }

    pub(crate) fn add_default(&mut self, ext: &str, content_type: &str) {
        self.defaults.insert(ext.to_ascii_lowercase(), content_type.to_string());
    }

    pub(crate) fn add_override(&mut self, part: &str, content_type: &str) {
        self.overrides.insert(part.to_string(), content_type.to_string());
    }

    pub(crate) fn to_xml(&self) -> String {
        let mut out = String::from(XML_DECLARATION);
        out.push_str(r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#);
        for (ext, ct) in &self.defaults {
            out.push_str("<Default");
            push_attr(&mut out, "Extension", ext);
            push_attr(&mut out, "ContentType", ct);
            out.push_str("/>");
        }
        for (part, ct) in &self.overrides {
            out.push_str("<Override");
            push_attr(&mut out, "PartName", &format!("/{}", part));
            push_attr(&mut out, "ContentType", ct);
            out.push_str("/>");
        }
        out.push_str("</Types>");
        out
    }
}

/// Relationships part of `part`: `xl/workbook.xml` -> `xl/_rels/workbook.xml.rels`
pub(crate) fn rels_path(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// Resolve a relationship target against the part that owns it
pub(crate) fn resolve_target(base_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = match base_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "." | "" => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        assert_eq!(rels_path("xl/workbook.xml"), "xl/_rels/workbook.xml.rels");
        assert_eq!(rels_path("xl/worksheets/sheet2.xml"), "xl/worksheets/_rels/sheet2.xml.rels");
        assert_eq!(resolve_target("xl/workbook.xml", "worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(resolve_target("xl/worksheets/sheet1.xml", "../tables/table1.xml"), "xl/tables/table1.xml");
        assert_eq!(resolve_target("xl/workbook.xml", "/xl/styles.xml"), "xl/styles.xml");
    }

    #[test]
    fn test_relationship_round_trip() {
        let rels = vec![
            Relationship::new("rId1", rel::WORKSHEET, "worksheets/sheet1.xml"),
            Relationship::external("rId2", rel::HYPERLINK, "https://example.com/?a=1&b=2"),
        ];
        let parsed = parse_relationships(relationships_xml(&rels).as_bytes()).unwrap();
        assert_eq!(parsed, rels);
    }

    #[test]
    fn test_rel_ids_skip_reserved() {
        let mut ids = RelIds::reserving(["rId2"]);
        assert_eq!(ids.next_id(), "rId1");
        assert_eq!(ids.next_id(), "rId3");
    }

    #[test]
    fn test_content_type_lookup() {
        let mut types = ContentTypes::default();
        types.add_default("xml", content_type::XML);
        types.add_override("xl/workbook.xml", content_type::WORKBOOK);
        let parsed = ContentTypes::parse(types.to_xml().as_bytes()).unwrap();
        assert_eq!(parsed.of("xl/workbook.xml"), Some(content_type::WORKBOOK));
        assert_eq!(parsed.of("docProps/custom.XML"), Some(content_type::XML));
        assert_eq!(parsed.of("xl/media/image1.png"), None);
    }
}
