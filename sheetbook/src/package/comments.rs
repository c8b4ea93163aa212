//! Notes and threaded comments
//!
//! A sheet with annotations gets three parts: the legacy comments part
//! holding every annotation's text, a VML drawing with one shape per
//! annotation, and, when threads exist, a threaded comments part. Thread
//! authors are listed once per workbook in the persons part.

use super::strings::{push_rich_text, read_rich_text};
use super::xml::{XML_DECLARATION, XmlNode, push_attr, push_t};
use crate::address::CellAddress;
use crate::model::display::iso_timestamp;
use crate::model::{Annotation, CommentEntry, CommentThread, Note, NoteBox, RichText, Worksheet, person_id};
use anyhow::Result;
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

const THREADED_NS: &str = "http://schemas.microsoft.com/office/spreadsheetml/2018/threadedcomments";
const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const SHAPES_PER_BLOCK: usize = 1024;

const THREAD_PLACEHOLDER: &str = "[Threaded comment]\n\nYour version of Excel allows you to read this threaded comment; however, any edits to it will get removed if the file is opened in a newer version of Excel. Learn more: https://go.microsoft.com/fwlink/?linkid=870924\n\nComment:\n    ";

/// `{XXXXXXXX-…}` form used by the threaded comment parts
pub(crate) fn braced(id: &Uuid) -> String {
    format!("{{{}}}", id.hyphenated().to_string().to_uppercase())
}

fn id_key(text: &str) -> String {
    text.trim().trim_start_matches('{').trim_end_matches('}').to_ascii_lowercase()
}

fn parse_timestamp(text: &str) -> NaiveDateTime {
    let text = text.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
        .unwrap_or_default()
}

/// Person id (normalized) to display name
pub(crate) fn read_persons(xml: &[u8]) -> Result<HashMap<String, String>> {
    let root = XmlNode::parse(xml)?;
    Ok(root
        .children_named("person")
        .filter_map(|p| Some((id_key(p.attr("id")?), p.attr("displayName")?.to_string())))
        .collect())
}

pub(crate) fn persons_xml(authors: &[&str]) -> String {
    let mut out = String::from(XML_DECLARATION);
    out.push_str(&format!(r#"<personList xmlns="{}" xmlns:x="{}">"#, THREADED_NS, MAIN_NS));
    for author in authors {
        out.push_str("<person");
        push_attr(&mut out, "displayName", author);
        push_attr(&mut out, "id", &braced(&person_id(author)));
        push_attr(&mut out, "userId", author);
        push_attr(&mut out, "providerId", "None");
        out.push_str("/>");
    }
    out.push_str("</personList>");
    out
}

struct VmlShape {
    anchor: Option<NoteBox>,
    visible: bool,
}

fn read_vml(xml: &[u8]) -> HashMap<CellAddress, VmlShape> {
    let root = match XmlNode::parse(xml) {
        Ok(root) => root,
        Err(e) => {
            log::warn!("unreadable VML drawing, note shapes reset: {:#}", e);
            return HashMap::new();
        }
    };
    root.elements()
        .filter(|n| n.local_name() == "shape")
        .filter_map(|shape| {
            let data = shape.child("ClientData")?;
            if data.attr("ObjectType") != Some("Note") {
                return None;
            }
            let row: u32 = data.child("Row")?.text().trim().parse().ok()?;
            let col: u32 = data.child("Column")?.text().trim().parse().ok()?;
            let shape = VmlShape {
                anchor: data
                    .child("Anchor")
                    .and_then(|a| NoteBox::from_vml_anchor(&a.text())),
                visible: data.child("Visible").is_some(),
            };
            Some((CellAddress::new(row, col), shape))
        })
        .collect()
}

/// Fill `sheet.annotations` from the parts related to the worksheet
pub(crate) fn read_annotations(
    sheet: &mut Worksheet,
    comments: Option<&[u8]>,
    vml: Option<&[u8]>,
    threaded: Option<&[u8]>,
    persons: &HashMap<String, String>,
) -> Result<()> {
    if let Some(xml) = threaded {
        for (cell, thread) in read_threads(xml, persons)? {
            sheet.annotations.insert(cell, Annotation::Comment(thread));
        }
    }
    let Some(xml) = comments else {
        return Ok(());
    };
    let shapes = vml.map(read_vml).unwrap_or_default();
    let root = XmlNode::parse(xml)?;
    let authors: Vec<String> = root
        .child("authors")
        .map(|a| a.children_named("author").map(XmlNode::text).collect())
        .unwrap_or_default();
    let Some(list) = root.child("commentList") else {
        return Ok(());
    };
    for comment in list.children_named("comment") {
        let Some(cell) = comment.attr("ref").and_then(|r| CellAddress::parse(r).ok()) else {
            continue;
        };
        if sheet.annotations.contains_key(&cell) {
            continue;
        }
        let author = comment
            .attr_u32("authorId")
            .and_then(|i| authors.get(i as usize))
            .cloned()
            .unwrap_or_default();
        let text = comment.child("text").map(read_rich_text).unwrap_or_default();
        let shape = shapes.get(&cell);
        sheet.annotations.insert(
            cell,
            Annotation::Note(Note {
                author,
                text,
                visible: shape.is_some_and(|s| s.visible),
                shape: shape
                    .and_then(|s| s.anchor)
                    .unwrap_or_else(|| NoteBox::beside(cell)),
            }),
        );
    }
    Ok(())
}

fn read_threads(xml: &[u8], persons: &HashMap<String, String>) -> Result<BTreeMap<CellAddress, CommentThread>> {
    let root = XmlNode::parse(xml)?;
    let mut roots: BTreeMap<CellAddress, (String, bool, Vec<CommentEntry>)> = BTreeMap::new();
    let mut replies: Vec<(String, CommentEntry)> = Vec::new();
    for node in root.children_named("threadedComment") {
        let Some(cell) = node.attr("ref").and_then(|r| CellAddress::parse(r).ok()) else {
            continue;
        };
        let Some(id) = node.attr("id") else {
            continue;
        };
        let author = node
            .attr("personId")
            .and_then(|p| persons.get(&id_key(p)))
            .cloned()
            .unwrap_or_default();
        let entry = CommentEntry {
            id: Uuid::parse_str(&id_key(id)).unwrap_or_else(|_| Uuid::new_v5(&Uuid::NAMESPACE_OID, id.as_bytes())),
            author,
            timestamp: node.attr("dT").map(parse_timestamp).unwrap_or_default(),
            text: node.child("text").map(XmlNode::text).unwrap_or_default(),
        };
        match node.attr("parentId") {
            Some(parent) => replies.push((id_key(parent), entry)),
            None => {
                roots
                    .entry(cell)
                    .or_insert_with(|| (id_key(id), node.attr_bool("done", false), vec![entry]));
            }
        }
    }
    let by_root: HashMap<String, CellAddress> = roots.iter().map(|(cell, (id, _, _))| (id.clone(), *cell)).collect();
    for (parent, entry) in replies {
        if let Some(cell) = by_root.get(&parent)
            && let Some((_, _, entries)) = roots.get_mut(cell)
        {
            entries.push(entry);
        }
    }
    Ok(roots
        .into_iter()
        .filter_map(|(cell, (_, done, entries))| CommentThread::from_entries(entries, done).map(|t| (cell, t)))
        .collect())
}

/// Annotation parts of one worksheet
pub(crate) struct AnnotationParts {
    pub comments: String,
    pub vml: String,
    pub threaded: Option<String>,
}

/// VML id blocks a worksheet needs
pub(crate) fn vml_blocks(sheet: &Worksheet) -> u32 {
    (sheet.annotations.len() / SHAPES_PER_BLOCK) as u32 + 1
}

/// `first_block` is the first VML id block reserved for this sheet
pub(crate) fn annotation_parts(sheet: &Worksheet, first_block: u32) -> Option<AnnotationParts> {
    if sheet.annotations.is_empty() {
        return None;
    }
    Some(AnnotationParts {
        comments: comments_xml(sheet),
        vml: vml_xml(sheet, first_block),
        threaded: threaded_xml(sheet),
    })
}

fn comments_xml(sheet: &Worksheet) -> String {
    let mut authors: Vec<String> = Vec::new();
    let mut author_index = |name: String| -> usize {
        match authors.iter().position(|a| *a == name) {
            Some(i) => i,
            None => {
                authors.push(name);
                authors.len() - 1
            }
        }
    };
    let mut list = String::new();
    for (cell, annotation) in &sheet.annotations {
        let (author, text) = match annotation {
            Annotation::Note(note) => (note.author.clone(), note.text.clone()),
            Annotation::Comment(thread) => {
                let mut text = format!("{}{}", THREAD_PLACEHOLDER, thread.root().text);
                for reply in thread.replies() {
                    text.push_str("\nReply:\n    ");
                    text.push_str(&reply.text);
                }
                (format!("tc={}", braced(&thread.root().id)), RichText::plain(text))
            }
        };
        let author_id = author_index(author);
        list.push_str("<comment");
        push_attr(&mut list, "ref", &cell.to_string());
        push_attr(&mut list, "authorId", &author_id.to_string());
        push_attr(&mut list, "shapeId", "0");
        list.push_str("><text>");
        push_rich_text(&mut list, &text);
        list.push_str("</text></comment>");
    }

    let mut out = String::from(XML_DECLARATION);
    out.push_str(&format!(r#"<comments xmlns="{}"><authors>"#, MAIN_NS));
    for author in &authors {
        push_t(&mut out, "author", author);
    }
    out.push_str("</authors><commentList>");
    out.push_str(&list);
    out.push_str("</commentList></comments>");
    out
}

fn vml_xml(sheet: &Worksheet, first_block: u32) -> String {
    let blocks = vml_blocks(sheet);
    let data: Vec<String> = (first_block..first_block + blocks).map(|b| b.to_string()).collect();
    let mut out = String::from(
        r#"<xml xmlns:v="urn:schemas-microsoft-com:vml" xmlns:o="urn:schemas-microsoft-com:office:office" xmlns:x="urn:schemas-microsoft-com:office:excel">"#,
    );
    out.push_str(&format!(
        r#"<o:shapelayout v:ext="edit"><o:idmap v:ext="edit" data="{}"/></o:shapelayout>"#,
        data.join(",")
    ));
    out.push_str(r#"<v:shapetype id="_x0000_t202" coordsize="21600,21600" o:spt="202" path="m,l,21600r21600,l21600,xe"><v:stroke joinstyle="miter"/><v:path gradientshapeok="t" o:connecttype="rect"/></v:shapetype>"#);
    for (i, (cell, annotation)) in sheet.annotations.iter().enumerate() {
        let (shape, visible) = match annotation {
            Annotation::Note(note) => (note.shape, note.visible),
            Annotation::Comment(_) => (NoteBox::beside(*cell), false),
        };
        let id = SHAPES_PER_BLOCK as u32 * first_block + i as u32 + 1;
        out.push_str(&format!(
            r##"<v:shape id="_x0000_s{}" type="#_x0000_t202" style="position:absolute;margin-left:59.25pt;margin-top:1.5pt;width:108pt;height:59.25pt;z-index:{};visibility:{}" fillcolor="#ffffe1" o:insetmode="auto">"##,
            id,
            i + 1,
            if visible { "visible" } else { "hidden" }
        ));
        out.push_str(r##"<v:fill color2="#ffffe1"/><v:shadow on="t" color="black" obscured="t"/><v:path o:connecttype="none"/><v:textbox style="mso-direction-alt:auto"><div style="text-align:left"></div></v:textbox>"##);
        out.push_str(r#"<x:ClientData ObjectType="Note"><x:MoveWithCells/><x:SizeWithCells/>"#);
        out.push_str(&format!("<x:Anchor>{}</x:Anchor>", shape.to_vml_anchor()));
        out.push_str("<x:AutoFill>False</x:AutoFill>");
        out.push_str(&format!("<x:Row>{}</x:Row><x:Column>{}</x:Column>", cell.row, cell.col));
        if visible {
            out.push_str("<x:Visible/>");
        }
        out.push_str("</x:ClientData></v:shape>");
    }
    out.push_str("</xml>");
    out
}

fn threaded_xml(sheet: &Worksheet) -> Option<String> {
    let threads: Vec<(&CellAddress, &CommentThread)> = sheet
        .annotations
        .iter()
        .filter_map(|(cell, a)| a.as_comment().map(|t| (cell, t)))
        .collect();
    if threads.is_empty() {
        return None;
    }
    let mut out = String::from(XML_DECLARATION);
    out.push_str(&format!(r#"<ThreadedComments xmlns="{}" xmlns:x="{}">"#, THREADED_NS, MAIN_NS));
    for (cell, thread) in threads {
        let root_id = braced(&thread.root().id);
        for (i, entry) in thread.entries().iter().enumerate() {
            out.push_str("<threadedComment");
            push_attr(&mut out, "ref", &cell.to_string());
            push_attr(&mut out, "dT", &iso_timestamp(&entry.timestamp));
            push_attr(&mut out, "personId", &braced(&person_id(&entry.author)));
            push_attr(&mut out, "id", &braced(&entry.id));
            if i == 0 {
                if thread.resolved {
                    push_attr(&mut out, "done", "1");
                }
            } else {
                push_attr(&mut out, "parentId", &root_id);
            }
            out.push('>');
            push_t(&mut out, "text", &entry.text);
            out.push_str("</threadedComment>");
        }
    }
    out.push_str("</ThreadedComments>");
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Workbook;
    use chrono::NaiveDate;

    fn when() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    #[test]
    fn test_parts_read_back() {
        let mut book = Workbook::new();
        let mut ws = book.worksheet_mut(0).unwrap();
        ws.add_note("B2", "check this", "Ana").unwrap();
        let root = ws.add_comment_at("D4", "Ben", "Why?", when()).unwrap();
        ws.reply_at("D4", "Ana", "Because", when()).unwrap();
        ws.set_comment_resolved("D4", true).unwrap();
        let sheet = book.worksheet(0).unwrap();

        let parts = annotation_parts(sheet, 1).unwrap();
        let threaded = parts.threaded.as_deref().unwrap();
        assert!(threaded.contains(&format!(r#"parentId="{}""#, braced(&root))));
        assert!(parts.vml.contains(r#"<o:idmap v:ext="edit" data="1"/>"#));

        let persons_part = persons_xml(&["Ana", "Ben"]);
        let persons = read_persons(persons_part.as_bytes()).unwrap();
        let mut copy = Worksheet::new("Copy", 15.0, 8.43);
        read_annotations(
            &mut copy,
            Some(parts.comments.as_bytes()),
            Some(parts.vml.as_bytes()),
            Some(threaded.as_bytes()),
            &persons,
        )
        .unwrap();
        assert_eq!(copy.annotations, sheet.annotations);
    }

    #[test]
    fn test_visible_note_keeps_its_box() {
        let mut sheet = Worksheet::new("S", 15.0, 8.43);
        let cell = CellAddress::new(5, 2);
        let mut shape = NoteBox::beside(cell);
        shape.to.row += 3;
        sheet.annotations.insert(
            cell,
            Annotation::Note(Note {
                author: "Ana".to_string(),
                text: RichText::plain("tall"),
                visible: true,
                shape,
            }),
        );
        let parts = annotation_parts(&sheet, 3).unwrap();
        assert!(parts.vml.contains("_x0000_s3073"));
        assert!(parts.threaded.is_none());
        let mut copy = Worksheet::new("S", 15.0, 8.43);
        read_annotations(&mut copy, Some(parts.comments.as_bytes()), Some(parts.vml.as_bytes()), None, &HashMap::new())
            .unwrap();
        assert_eq!(copy.annotations, sheet.annotations);
    }
}
