//! Writing a [`Workbook`] as a package
//!
//! Part names and numbering are fixed before the worksheets are serialized
//! in parallel, and every zip entry gets the same timestamp, so saving an
//! unchanged workbook twice yields identical bytes.

use super::book::workbook_xml;
use super::comments::{annotation_parts, persons_xml, vml_blocks};
use super::drawing::{MediaTable, drawing_part};
use super::opc::{ContentTypes, RelIds, Relationship, content_type, rel, rels_path, relationships_xml};
use super::sheet::{SheetLinks, WriteContext, worksheet_part};
use super::strings::StringTable;
use super::styles::StyleTable;
use super::tables::table_xml;
use super::theme::default_theme;
use crate::model::{Annotation, CellValue, ImageFormat, Workbook};
use anyhow::Result;
use rayon::prelude::*;
use std::collections::HashSet;
use std::io::{Seek, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

const WORKBOOK_PART: &str = "xl/workbook.xml";

/// Part names decided for one worksheet
struct SheetPlan {
    part: String,
    /// `(part, table id)` per table
    tables: Vec<(String, u32)>,
    vml_block: u32,
    drawing: Option<String>,
}

/// Everything one worksheet contributes to the package
struct SheetOutput {
    files: Vec<(String, Vec<u8>)>,
    /// `(part, content type)` overrides
    types: Vec<(String, &'static str)>,
    has_threads: bool,
}

fn plan(book: &Workbook) -> Vec<SheetPlan> {
    let mut next_table = 1;
    let mut next_block = 1;
    book.sheets
        .iter()
        .enumerate()
        .map(|(i, sheet)| {
            let tables = sheet
                .tables
                .iter()
                .map(|_| {
                    let id = next_table;
                    next_table += 1;
                    (format!("xl/tables/table{}.xml", id), id)
                })
                .collect();
            let vml_block = next_block;
            if !sheet.annotations.is_empty() {
                next_block += vml_blocks(sheet);
            }
            SheetPlan {
                part: format!("xl/worksheets/sheet{}.xml", i + 1),
                tables,
                vml_block,
                drawing: (!sheet.pictures.is_empty()).then(|| format!("xl/drawings/drawing{}.xml", i + 1)),
            }
        })
        .collect()
}

/// Target of `part` relative to a part in `xl/worksheets` or `xl/drawings`
fn from_subdir(part: &str) -> String {
    format!("../{}", part.trim_start_matches("xl/"))
}

fn write_sheet(book: &Workbook, position: usize, plan: &SheetPlan, ctx: &WriteContext<'_>, media: &MediaTable) -> SheetOutput {
    let sheet = &book.sheets[position];
    let mut output = SheetOutput {
        files: Vec::new(),
        types: Vec::new(),
        has_threads: false,
    };
    let mut links = SheetLinks::default();

    for (table, (part, id)) in sheet.tables.iter().zip(&plan.tables) {
        output.files.push((part.clone(), table_xml(table, *id).into_bytes()));
        output.types.push((part.clone(), content_type::TABLE));
        links.tables.push(from_subdir(part));
    }

    if let Some(parts) = annotation_parts(sheet, plan.vml_block) {
        let n = position + 1;
        let comments = format!("xl/comments{}.xml", n);
        let vml = format!("xl/drawings/vmlDrawing{}.vml", n);
        links.comments = Some(from_subdir(&comments));
        links.vml = Some(from_subdir(&vml));
        output.files.push((comments.clone(), parts.comments.into_bytes()));
        output.types.push((comments, content_type::COMMENTS));
        output.files.push((vml, parts.vml.into_bytes()));
        if let Some(threaded) = parts.threaded {
            let part = format!("xl/threadedComments/threadedComment{}.xml", n);
            links.threaded = Some(from_subdir(&part));
            output.files.push((part.clone(), threaded.into_bytes()));
            output.types.push((part, content_type::THREADED_COMMENTS));
            output.has_threads = true;
        }
    }

    if let Some(part) = &plan.drawing {
        let (xml, rels) = drawing_part(&sheet.pictures, media);
        links.drawing = Some(from_subdir(part));
        output.files.push((part.clone(), xml.into_bytes()));
        output.files.push((rels_path(part), relationships_xml(&rels).into_bytes()));
        output.types.push((part.clone(), content_type::DRAWING));
    }

    let (xml, rels) = worksheet_part(sheet, position, ctx, &links);
    output.files.insert(0, (plan.part.clone(), xml.into_bytes()));
    if !rels.is_empty() {
        output.files.insert(1, (rels_path(&plan.part), relationships_xml(&rels).into_bytes()));
    }
    output.types.push((plan.part.clone(), content_type::WORKSHEET));
    output
}

/// Distinct thread authors in workbook order
fn thread_authors(book: &Workbook) -> Vec<&str> {
    let mut authors: Vec<&str> = Vec::new();
    for sheet in &book.sheets {
        for annotation in sheet.annotations.values() {
            let Annotation::Comment(thread) = annotation else {
                continue;
            };
            for entry in thread.entries() {
                if !authors.contains(&entry.author.as_str()) {
                    authors.push(&entry.author);
                }
            }
        }
    }
    authors
}

pub(crate) fn write_package<W: Write + Seek>(book: &Workbook, writer: W) -> Result<W> {
    let state = &book.package;
    let strings = StringTable::build(book);
    let styles = StyleTable::build(book);
    let media = MediaTable::build(book.sheets.iter().flat_map(|s| s.pictures.iter()));
    let plans = plan(book);
    let ctx = WriteContext {
        strings: &strings,
        styles: &styles,
        date1904: book.date1904,
        active_sheet: book.active_sheet,
    };

    let sheets: Vec<SheetOutput> = plans
        .par_iter()
        .enumerate()
        .map(|(position, plan)| write_sheet(book, position, plan, &ctx, &media))
        .collect();

    let mut types: ContentTypes = state.content_types.clone();
    types.add_default("rels", content_type::RELS);
    types.add_default("xml", content_type::XML);
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();

    let mut workbook_ids = RelIds::reserving(state.workbook_rels.iter().map(|r| r.id.as_str()));
    let mut workbook_rels = state.workbook_rels.clone();
    let mut sheet_rel_ids = Vec::with_capacity(plans.len());
    for plan in &plans {
        let id = workbook_ids.next_id();
        workbook_rels.push(Relationship::new(
            id.clone(),
            rel::WORKSHEET,
            plan.part.trim_start_matches("xl/"),
        ));
        sheet_rel_ids.push(id);
    }
    workbook_rels.push(Relationship::new(workbook_ids.next_id(), rel::THEME, "theme/theme1.xml"));
    workbook_rels.push(Relationship::new(workbook_ids.next_id(), rel::STYLES, "styles.xml"));
    if !strings.is_empty() {
        workbook_rels.push(Relationship::new(workbook_ids.next_id(), rel::SHARED_STRINGS, "sharedStrings.xml"));
    }
    let has_threads = sheets.iter().any(|s| s.has_threads);
    if has_threads {
        workbook_rels.push(Relationship::new(workbook_ids.next_id(), rel::PERSON, "persons/person.xml"));
    }

    let full_calc = book.sheets.iter().any(|sheet| {
        sheet
            .formula_cells
            .iter()
            .any(|addr| sheet.cell_at(*addr).is_some_and(|c| matches!(c.value, CellValue::Empty)))
    });
    let workbook_type = state
        .workbook_content_type
        .as_deref()
        .unwrap_or(content_type::WORKBOOK);

    let mut root_ids = RelIds::reserving(state.root_rels.iter().map(|r| r.id.as_str()));
    let mut root_rels = vec![Relationship::new(root_ids.next_id(), rel::OFFICE_DOCUMENT, WORKBOOK_PART)];
    root_rels.extend(state.root_rels.iter().cloned());

    files.push(("_rels/.rels".to_string(), relationships_xml(&root_rels).into_bytes()));
    files.push((
        WORKBOOK_PART.to_string(),
        workbook_xml(book, &state.workbook_elements, &sheet_rel_ids, full_calc).into_bytes(),
    ));
    types.add_override(WORKBOOK_PART, workbook_type);
    files.push((rels_path(WORKBOOK_PART), relationships_xml(&workbook_rels).into_bytes()));

    let theme = match &state.theme {
        Some(bytes) => bytes.clone(),
        None => default_theme(&book.styles.default_style().font.name).into_bytes(),
    };
    files.push(("xl/theme/theme1.xml".to_string(), theme));
    types.add_override("xl/theme/theme1.xml", content_type::THEME);
    files.push(("xl/styles.xml".to_string(), styles.xml().as_bytes().to_vec()));
    types.add_override("xl/styles.xml", content_type::STYLES);
    if !strings.is_empty() {
        files.push(("xl/sharedStrings.xml".to_string(), strings.to_xml().into_bytes()));
        types.add_override("xl/sharedStrings.xml", content_type::SHARED_STRINGS);
    }
    if has_threads {
        files.push(("xl/persons/person.xml".to_string(), persons_xml(&thread_authors(book)).into_bytes()));
        types.add_override("xl/persons/person.xml", content_type::PERSONS);
    }

    let mut has_vml = false;
    for sheet in sheets {
        has_vml |= sheet.files.iter().any(|(name, _)| name.ends_with(".vml"));
        for (part, content_type) in sheet.types {
            types.add_override(&part, content_type);
        }
        files.extend(sheet.files);
    }
    if has_vml {
        types.add_default("vml", content_type::VML);
    }
    for (part, data) in media.parts() {
        if let Some((_, ext)) = part.rsplit_once('.')
            && let Some(format) = ImageFormat::from_extension(ext)
        {
            types.add_default(ext, format.content_type());
        }
        files.push((part.to_string(), data.to_vec()));
    }

    let managed: HashSet<String> = files.iter().map(|(name, _)| name.clone()).collect();
    for (name, data) in &state.parts {
        if managed.contains(name) {
            log::warn!("dropping preserved part {}: the name is taken", name);
            continue;
        }
        files.push((name.clone(), data.clone()));
    }
    files.insert(0, ("[Content_Types].xml".to_string(), types.to_xml().into_bytes()));

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());
    let mut zip = ZipWriter::new(writer);
    for (name, data) in files {
        log::trace!("writing part {} ({} bytes)", name, data.len());
        zip.start_file(name, options)?;
        zip.write_all(&data)?;
    }
    log::debug!("wrote {} worksheets", book.sheets.len());
    Ok(zip.finish()?)
}
