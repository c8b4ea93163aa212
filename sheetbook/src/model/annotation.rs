//! Notes and threaded comments
//!
//! A cell carries at most one annotation: either a note (rich text in a
//! floating box) or a comment thread whose first entry is the root.

use super::sheet_mut::WorksheetMut;
use super::value::RichText;
use crate::address::{CellAddress, IntoAddress};
use crate::error::{Error, Result};
use chrono::{Local, NaiveDateTime};
use uuid::Uuid;

/// Corner of a floating shape: cell plus pixel offset into that cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorPoint {
    pub col: u32,
    pub col_offset: u32,
    pub row: u32,
    pub row_offset: u32,
}

/// Two-cell anchored box of a note
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteBox {
    pub from: AnchorPoint,
    pub to: AnchorPoint,
}

impl NoteBox {
    /// Box placed beside `cell` the way spreadsheet applications place new notes
    pub fn beside(cell: CellAddress) -> Self {
        let top = cell.row.saturating_sub(1);
        Self {
            from: AnchorPoint {
                col: cell.col + 1,
                col_offset: 15,
                row: top,
                row_offset: 10,
            },
            to: AnchorPoint {
                col: cell.col + 3,
                col_offset: 15,
                row: top + 4,
                row_offset: 4,
            },
        }
    }

    /// VML `x:Anchor` text
    pub(crate) fn to_vml_anchor(&self) -> String {
        format!(
            "{}, {}, {}, {}, {}, {}, {}, {}",
            self.from.col,
            self.from.col_offset,
            self.from.row,
            self.from.row_offset,
            self.to.col,
            self.to.col_offset,
            self.to.row,
            self.to.row_offset
        )
    }

    pub(crate) fn from_vml_anchor(text: &str) -> Option<Self> {
        let parts: Vec<u32> = text
            .split(',')
            .map(|p| p.trim().parse().ok())
            .collect::<Option<_>>()?;
        let [c1, dx1, r1, dy1, c2, dx2, r2, dy2] = parts[..] else {
            return None;
        };
        Some(Self {
            from: AnchorPoint {
                col: c1,
                col_offset: dx1,
                row: r1,
                row_offset: dy1,
            },
            to: AnchorPoint {
                col: c2,
                col_offset: dx2,
                row: r2,
                row_offset: dy2,
            },
        })
    }

    pub(crate) fn translate(&mut self, rows: i64, cols: i64) {
        let apply = |v: u32, d: i64| (v as i64 + d).max(0) as u32;
        self.from.row = apply(self.from.row, rows);
        self.to.row = apply(self.to.row, rows);
        self.from.col = apply(self.from.col, cols);
        self.to.col = apply(self.to.col, cols);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub author: String,
    pub text: RichText,
    pub visible: bool,
    pub shape: NoteBox,
}

/// One entry of a comment thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentEntry {
    pub id: Uuid,
    pub author: String,
    pub timestamp: NaiveDateTime,
    pub text: String,
}

impl CommentEntry {
    /// Entry with an id derived from `scope` and its content, so that equal
    /// edits produce equal packages
    pub(crate) fn new(scope: &str, author: &str, timestamp: NaiveDateTime, text: &str) -> Self {
        let seed = format!(
            "{}|{}|{}|{}",
            scope,
            author,
            super::display::iso_timestamp(&timestamp),
            text
        );
        Self {
            id: Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes()),
            author: author.to_string(),
            timestamp,
            text: text.to_string(),
        }
    }
}

/// Root comment plus replies, oldest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentThread {
    entries: Vec<CommentEntry>,
    pub resolved: bool,
}

impl CommentThread {
    pub(crate) fn new(root: CommentEntry) -> Self {
        Self {
            entries: vec![root],
            resolved: false,
        }
    }

    pub(crate) fn from_entries(entries: Vec<CommentEntry>, resolved: bool) -> Option<Self> {
        (!entries.is_empty()).then_some(Self { entries, resolved })
    }

    pub fn root(&self) -> &CommentEntry {
        &self.entries[0]
    }

    pub fn replies(&self) -> &[CommentEntry] {
        &self.entries[1..]
    }

    pub fn entries(&self) -> &[CommentEntry] {
        &self.entries
    }

    pub(crate) fn push_reply(&mut self, reply: CommentEntry) {
        self.entries.push(reply);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    Note(Note),
    Comment(CommentThread),
}

impl Annotation {
    pub fn as_note(&self) -> Option<&Note> {
        match self {
            Annotation::Note(note) => Some(note),
            Annotation::Comment(_) => None,
        }
    }

    pub fn as_comment(&self) -> Option<&CommentThread> {
        match self {
            Annotation::Comment(thread) => Some(thread),
            Annotation::Note(_) => None,
        }
    }

    /// Plain text of a note, or of the root comment
    pub fn text(&self) -> String {
        match self {
            Annotation::Note(note) => note.text.plain_text(),
            Annotation::Comment(thread) => thread.root().text.clone(),
        }
    }
}

/// Stable id of a comment author
pub(crate) fn person_id(author: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("person|{}", author).as_bytes())
}

impl WorksheetMut<'_> {
    /// Attach a note to a cell, replacing an earlier note there
    pub fn add_note(&mut self, addr: impl IntoAddress, text: impl Into<RichText>, author: &str) -> Result<()> {
        self.book.ensure_open()?;
        let addr = addr.into_address()?;
        if let Some(Annotation::Comment(_)) = self.annotations.get(&addr) {
            return Err(Error::InvalidState(format!("cell {} already has a comment thread", addr)));
        }
        let note = Note {
            author: author.to_string(),
            text: text.into(),
            visible: false,
            shape: NoteBox::beside(addr),
        };
        self.sheet_mut().annotations.insert(addr, Annotation::Note(note));
        Ok(())
    }

    /// Start a comment thread stamped with the local time
    pub fn add_comment(&mut self, addr: impl IntoAddress, author: &str, text: &str) -> Result<Uuid> {
        self.add_comment_at(addr, author, text, Local::now().naive_local())
    }

    pub fn add_comment_at(
        &mut self,
        addr: impl IntoAddress,
        author: &str,
        text: &str,
        timestamp: NaiveDateTime,
    ) -> Result<Uuid> {
        self.book.ensure_open()?;
        let addr = addr.into_address()?;
        if self.annotations.contains_key(&addr) {
            return Err(Error::InvalidState(format!("cell {} already has an annotation", addr)));
        }
        let entry = CommentEntry::new(&format!("{}!{}#0", self.name, addr), author, timestamp, text);
        let id = entry.id;
        self.sheet_mut()
            .annotations
            .insert(addr, Annotation::Comment(CommentThread::new(entry)));
        Ok(id)
    }

    /// Append a reply to the thread at `addr`
    pub fn reply_to_comment(&mut self, addr: impl IntoAddress, author: &str, text: &str) -> Result<Uuid> {
        self.reply_at(addr, author, text, Local::now().naive_local())
    }

    pub fn reply_at(
        &mut self,
        addr: impl IntoAddress,
        author: &str,
        text: &str,
        timestamp: NaiveDateTime,
    ) -> Result<Uuid> {
        self.book.ensure_open()?;
        let addr = addr.into_address()?;
        let scope = format!("{}!{}", self.name, addr);
        let thread = self.comment_thread_mut(addr)?;
        let entry = CommentEntry::new(
            &format!("{}#{}", scope, thread.entries.len()),
            author,
            timestamp,
            text,
        );
        let id = entry.id;
        thread.push_reply(entry);
        Ok(id)
    }

    pub fn set_comment_resolved(&mut self, addr: impl IntoAddress, resolved: bool) -> Result<()> {
        self.book.ensure_open()?;
        let addr = addr.into_address()?;
        self.comment_thread_mut(addr)?.resolved = resolved;
        Ok(())
    }

    fn comment_thread_mut(&mut self, addr: CellAddress) -> Result<&mut CommentThread> {
        match self.sheet_mut().annotations.get_mut(&addr) {
            Some(Annotation::Comment(thread)) => Ok(thread),
            _ => Err(Error::InvalidState(format!("cell {} has no comment thread", addr))),
        }
    }

    /// Remove the note or comment thread at `addr`
    pub fn remove_annotation(&mut self, addr: impl IntoAddress) -> Result<Option<Annotation>> {
        self.book.ensure_open()?;
        let addr = addr.into_address()?;
        Ok(self.sheet_mut().annotations.remove(&addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_vml_anchor_text() {
        let shape = NoteBox::beside(CellAddress::new(0, 0));
        let text = shape.to_vml_anchor();
        assert_eq!(text, "1, 15, 0, 10, 3, 15, 4, 4");
        assert_eq!(NoteBox::from_vml_anchor(&text), Some(shape));
        assert_eq!(NoteBox::from_vml_anchor("1, 2, 3"), None);
    }

    #[test]
    fn test_comment_ids_are_deterministic() {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let a = CommentEntry::new("Sheet1!A1#0", "Ann", ts, "hello");
        let b = CommentEntry::new("Sheet1!A1#0", "Ann", ts, "hello");
        let c = CommentEntry::new("Sheet1!A1#1", "Ann", ts, "hello");
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(person_id("Ann"), person_id("Ann"));
    }

    #[test]
    fn test_threads_and_notes() {
        use crate::model::Workbook;
        let mut book = Workbook::new();
        let mut ws = book.worksheet_mut(0).unwrap();
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        ws.add_note("A1", "check this", "Ann").unwrap();
        ws.add_comment_at("B2", "Bo", "why?", ts).unwrap();
        ws.reply_at("B2", "Ann", "because", ts).unwrap();
        assert!(matches!(ws.add_note("B2", "x", "Ann"), Err(Error::InvalidState(_))));
        assert!(matches!(ws.reply_at("A1", "Bo", "x", ts), Err(Error::InvalidState(_))));

        let thread = ws.annotation("B2").unwrap().and_then(Annotation::as_comment).unwrap();
        assert_eq!(thread.root().author, "Bo");
        assert_eq!(thread.replies().len(), 1);
        assert_ne!(thread.root().id, thread.replies()[0].id);
        assert_eq!(ws.annotation("A1").unwrap().map(Annotation::text).as_deref(), Some("check this"));

        assert!(ws.remove_annotation("A1").unwrap().is_some());
        assert!(ws.remove_annotation("A1").unwrap().is_none());
    }
}
