//! SpreadsheetML package reading and writing
//!
//! A package is a zip archive of XML parts tied together by relationship
//! parts. [`read_workbook`] turns one into a [`Workbook`] and keeps every part
//! the engine does not model in [`PackageState`]; [`write_workbook`] writes
//! the model back out together with those parts.

mod book;
mod comments;
mod drawing;
mod fetch;
mod opc;
mod reader;
mod sheet;
mod strings;
mod styles;
mod tables;
mod theme;
mod writer;
mod xml;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::model::{PreservedElement, Workbook};
use opc::{ContentTypes, Relationship};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Where a package comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Path(PathBuf),
    Bytes(Vec<u8>),
    /// HTTP(S) URL, fetched with the configured timeout
    Url(String),
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Source::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for Source {
    fn from(bytes: Vec<u8>) -> Self {
        Source::Bytes(bytes)
    }
}

/// Package content carried from load to save without being modelled
#[derive(Clone, Default)]
pub(crate) struct PackageState {
    /// Unmanaged parts by name, written back verbatim
    pub parts: BTreeMap<String, Vec<u8>>,
    /// Defaults and the overrides of unmanaged parts
    pub content_types: ContentTypes,
    /// Root relationships other than the office document
    pub root_rels: Vec<Relationship>,
    /// Workbook relationships to unmanaged parts, with absolute targets
    pub workbook_rels: Vec<Relationship>,
    pub workbook_elements: Vec<PreservedElement>,
    pub theme: Option<Vec<u8>>,
    /// Macro-enabled and template workbooks keep their content type
    pub workbook_content_type: Option<String>,
}

impl fmt::Debug for PackageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageState")
            .field("parts", &self.parts.keys().collect::<Vec<_>>())
            .field("root_rels", &self.root_rels.len())
            .field("workbook_rels", &self.workbook_rels.len())
            .field("workbook_elements", &self.workbook_elements.len())
            .field("theme", &self.theme.is_some())
            .field("workbook_content_type", &self.workbook_content_type)
            .finish()
    }
}

pub(crate) fn load(source: Source, config: EngineConfig) -> Result<Workbook> {
    match source {
        Source::Path(path) => {
            let file = File::open(&path)?;
            log::info!("loading {}", path.display());
            read_workbook(BufReader::new(file), config)
        }
        Source::Bytes(bytes) => read_workbook(Cursor::new(bytes), config),
        Source::Url(url) => {
            let bytes = fetch::fetch(&url, &config)?;
            read_workbook(Cursor::new(bytes), config)
        }
    }
}

pub(crate) fn read_workbook<R: Read + Seek>(reader: R, config: EngineConfig) -> Result<Workbook> {
    reader::read_package(reader, config).map_err(|e| Error::CorruptPackage(format!("{:#}", e)))
}

pub(crate) fn write_workbook<W: Write + Seek>(book: &Workbook, writer: W) -> Result<W> {
    writer::write_package(book, writer).map_err(|e| match e.downcast::<io::Error>() {
        Ok(io) => Error::Io(io),
        Err(other) => Error::Io(io::Error::other(format!("{:#}", other))),
    })
}

/// Write next to `path` and move into place, so a failed save leaves any
/// existing file untouched
pub(crate) fn save_to_path(book: &Workbook, path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let temp = NamedTempFile::new_in(dir)?;
    let writer = write_workbook(book, BufWriter::new(temp))?;
    let temp = writer.into_inner().map_err(|e| Error::Io(e.into_error()))?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    log::info!("saved {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CellValue;

    #[test]
    fn test_bytes_round_trip() {
        let mut book = Workbook::new();
        {
            let mut sheet = book.worksheet_mut(0).unwrap();
            sheet.set_value("A1", 2.5).unwrap();
            sheet.set_value("B1", "text").unwrap();
            sheet.set_formula("C1", "A1*2").unwrap();
        }
        let bytes = book.to_bytes().unwrap();
        let loaded = read_workbook(Cursor::new(bytes), EngineConfig::default()).unwrap();
        let sheet = loaded.worksheet(0).unwrap();
        assert_eq!(sheet.value("A1").unwrap(), &CellValue::Number(2.5));
        assert_eq!(sheet.value("B1").unwrap(), &CellValue::text("text"));
        assert_eq!(sheet.formula("C1").unwrap().as_deref(), Some("=A1*2"));
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let err = read_workbook(Cursor::new(b"not a zip".to_vec()), EngineConfig::default()).unwrap_err();
        assert!(matches!(err, Error::CorruptPackage(_)));
    }

    #[test]
    fn test_missing_file_is_io() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(Source::Path(dir.path().join("absent.xlsx")), EngineConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let book = Workbook::new();
        let err = save_to_path(&book, &dir.path().join("nope").join("out.xlsx")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_saving_twice_is_byte_identical() {
        let mut book = Workbook::new();
        book.worksheet_mut(0).unwrap().set_value("A1", "same").unwrap();
        assert_eq!(book.to_bytes().unwrap(), book.to_bytes().unwrap());
    }
}
