//! Loading a package into a [`Workbook`]

use super::book::read_workbook_part;
use super::comments::{read_annotations, read_persons};
use super::drawing::read_drawing;
use super::opc::{ContentTypes, Relationship, parse_relationships, rel, rels_path, resolve_target};
use super::sheet::{ReadContext, read_worksheet};
use super::strings::read_shared_strings;
use super::styles::read_styles;
use super::tables::read_table;
use super::PackageState;
use crate::config::EngineConfig;
use crate::model::display::temporal_kind;
use crate::model::{Style, Workbook};
use crate::pool::StyleId;
use anyhow::{Context, Result, bail};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{Read, Seek};
use std::sync::Arc;
use zip::ZipArchive;

/// Every part of the archive, removed from the map as it is consumed.
/// Whatever is left at the end is kept verbatim.
struct Parts {
    files: BTreeMap<String, Vec<u8>>,
}

impl Parts {
    fn read<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader).context("not a zip archive")?;
        let mut files = BTreeMap::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().trim_start_matches('/').to_string();
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)
                .with_context(|| format!("failed to read part {}", name))?;
            log::trace!("read part {} ({} bytes)", name, data.len());
            files.insert(name, data);
        }
        Ok(Self { files })
    }

    fn take(&mut self, name: &str) -> Option<Vec<u8>> {
        self.files.remove(name)
    }

    /// Relationships of `part`, empty when the part has none
    fn take_rels(&mut self, part: &str) -> Result<Vec<Relationship>> {
        match self.take(&rels_path(part)) {
            Some(xml) => parse_relationships(&xml).with_context(|| format!("relationships of {}", part)),
            None => Ok(Vec::new()),
        }
    }
}

fn target_of(rels: &[Relationship], id: &str, base: &str) -> Option<String> {
    rels.iter()
        .find(|r| r.id == id && !r.external)
        .map(|r| resolve_target(base, &r.target))
}

fn first_of(rels: &[Relationship], rel_type: &str, base: &str) -> Option<String> {
    rels.iter()
        .find(|r| r.is(rel_type) && !r.external)
        .map(|r| resolve_target(base, &r.target))
}

/// Internal targets become absolute so they stay valid wherever the owner
/// is written
fn absolute(rel: &Relationship, base: &str) -> Relationship {
    if rel.external {
        return rel.clone();
    }
    Relationship {
        target: format!("/{}", resolve_target(base, &rel.target)),
        ..rel.clone()
    }
}

pub(crate) fn read_package<R: Read + Seek>(reader: R, config: EngineConfig) -> Result<Workbook> {
    let mut parts = Parts::read(reader)?;
    let content_types = ContentTypes::parse(
        &parts
            .take("[Content_Types].xml")
            .context("missing [Content_Types].xml")?,
    )?;

    let root_rels = parts.take_rels("")?;
    let workbook_part = first_of(&root_rels, rel::OFFICE_DOCUMENT, "")
        .context("package has no office document relationship")?;
    let workbook_xml = parts
        .take(&workbook_part)
        .with_context(|| format!("missing workbook part {}", workbook_part))?;
    let workbook_rels = parts.take_rels(&workbook_part)?;
    let info = read_workbook_part(&workbook_xml).context("workbook part")?;

    let styles = match first_of(&workbook_rels, rel::STYLES, &workbook_part).and_then(|p| parts.take(&p)) {
        Some(xml) => read_styles(&xml).context("styles part")?,
        None => Vec::new(),
    };
    let mut book = match styles.first() {
        Some(default) => Workbook::with_default_style(config, default.clone()),
        None => Workbook::empty(config),
    };
    let xf_styles: Vec<StyleId> = styles.iter().map(|s| book.styles.intern(s.clone())).collect();
    let xf_kinds: Vec<_> = styles.iter().map(|s: &Style| temporal_kind(&s.number_format)).collect();

    let strings = match first_of(&workbook_rels, rel::SHARED_STRINGS, &workbook_part).and_then(|p| parts.take(&p)) {
        Some(xml) => read_shared_strings(&xml, &mut book.strings).context("shared strings part")?,
        None => Vec::new(),
    };
    let theme = first_of(&workbook_rels, rel::THEME, &workbook_part).and_then(|p| parts.take(&p));
    if let Some(chain) = first_of(&workbook_rels, rel::CALC_CHAIN, &workbook_part) {
        parts.take(&chain);
    }
    let persons = match first_of(&workbook_rels, rel::PERSON, &workbook_part).and_then(|p| parts.take(&p)) {
        Some(xml) => read_persons(&xml).context("persons part")?,
        None => HashMap::new(),
    };

    book.date1904 = info.date1904;
    let ctx = ReadContext {
        strings: &strings,
        xf_styles: &xf_styles,
        xf_kinds: &xf_kinds,
        date1904: info.date1904,
    };
    let mut sheet_rel_ids = Vec::new();
    let mut skipped = Vec::new();
    let mut used_media: HashSet<String> = HashSet::new();
    for (position, entry) in info.sheets.iter().enumerate() {
        sheet_rel_ids.push(entry.rel_id.clone());
        let Some(sheet_rel) = workbook_rels.iter().find(|r| r.id == entry.rel_id) else {
            bail!("sheet '{}' has no relationship {}", entry.name, entry.rel_id);
        };
        let part = resolve_target(&workbook_part, &sheet_rel.target);
        if !sheet_rel.is(rel::WORKSHEET) {
            log::warn!("dropping sheet '{}': only worksheets are supported", entry.name);
            parts.take(&part);
            parts.take_rels(&part)?;
            skipped.push(position);
            continue;
        }
        let xml = parts
            .take(&part)
            .with_context(|| format!("missing worksheet part {}", part))?;
        let rels = parts.take_rels(&part)?;
        let index = book.push_sheet(&entry.name);
        book.sheets[index].sheet_id = entry.sheet_id;
        book.sheets[index].visibility = entry.visibility;
        let refs = read_worksheet(&xml, &mut book.sheets[index], &rels, &ctx, &mut book.strings)
            .with_context(|| format!("worksheet '{}'", entry.name))?;
        let sheet = &mut book.sheets[index];

        for id in &refs.tables {
            let Some(path) = target_of(&rels, id, &part) else {
                continue;
            };
            if let Some(xml) = parts.take(&path) {
                parts.take_rels(&path)?;
                sheet.tables.push(read_table(&xml).with_context(|| format!("table part {}", path))?);
            }
        }

        if let Some(path) = refs.drawing.as_deref().and_then(|id| target_of(&rels, id, &part))
            && let Some(xml) = parts.take(&path)
        {
            let drawing_rels = parts.take_rels(&path)?;
            let media: HashMap<String, (Arc<Vec<u8>>, String)> = drawing_rels
                .iter()
                .filter(|r| r.is(rel::IMAGE) && !r.external)
                .filter_map(|r| {
                    let media_part = resolve_target(&path, &r.target);
                    let data = parts.files.get(&media_part)?;
                    Some((r.id.clone(), (Arc::new(data.clone()), media_part)))
                })
                .collect();
            sheet.pictures = read_drawing(&xml, |id| media.get(id).map(|(d, p)| (d.clone(), p.as_str())))
                .with_context(|| format!("drawing part {}", path))?;
            used_media.extend(media.into_values().map(|(_, media_part)| media_part));
        }

        let comments = first_of(&rels, rel::COMMENTS, &part).and_then(|p| parts.take(&p));
        let vml = refs
            .legacy_drawing
            .as_deref()
            .and_then(|id| target_of(&rels, id, &part))
            .or_else(|| first_of(&rels, rel::VML_DRAWING, &part));
        let vml = match vml {
            Some(path) => {
                parts.take_rels(&path)?;
                parts.take(&path)
            }
            None => None,
        };
        let threaded = first_of(&rels, rel::THREADED_COMMENT, &part).and_then(|p| parts.take(&p));
        read_annotations(sheet, comments.as_deref(), vml.as_deref(), threaded.as_deref(), &persons)
            .with_context(|| format!("comments of worksheet '{}'", entry.name))?;

        // parts only referenced from elements that were dropped
        for orphan in rels.iter().filter(|r| !r.external) {
            let path = resolve_target(&part, &orphan.target);
            if parts.take(&path).is_some() {
                log::debug!("dropping {} of worksheet '{}'", path, entry.name);
                parts.take_rels(&path)?;
            }
        }
    }
    if book.sheets.is_empty() {
        bail!("workbook has no worksheets");
    }
    book.next_sheet_id = book.sheets.iter().map(|s| s.sheet_id).max().unwrap_or(0) + 1;

    // media can be shared between drawings, so it is released last
    for media_part in &used_media {
        parts.take(media_part);
    }

    let remap_sheet = |old: usize| -> Option<usize> {
        if skipped.contains(&old) {
            return None;
        }
        Some(old - skipped.iter().filter(|s| **s < old).count())
    };
    book.defined_names = info
        .defined_names
        .into_iter()
        .filter_map(|mut name| {
            if let Some(local) = name.local_sheet {
                name.local_sheet = Some(remap_sheet(local)?);
            }
            Some(name)
        })
        .collect();
    book.active_sheet = remap_sheet(info.active_tab)
        .filter(|i| *i < book.sheets.len())
        .unwrap_or(0);

    let managed = [
        rel::WORKSHEET,
        rel::STYLES,
        rel::SHARED_STRINGS,
        rel::THEME,
        rel::CALC_CHAIN,
        rel::PERSON,
    ];
    let preserved_workbook_rels = workbook_rels
        .iter()
        .filter(|r| !managed.iter().any(|t| r.is(t)) && !sheet_rel_ids.contains(&r.id))
        .map(|r| absolute(r, &workbook_part))
        .collect();
    let preserved_root_rels = root_rels
        .iter()
        .filter(|r| !r.is(rel::OFFICE_DOCUMENT))
        .map(|r| absolute(r, ""))
        .collect();

    let workbook_content_type = content_types.of(&workbook_part).map(str::to_string);
    let mut preserved_types = content_types;
    preserved_types
        .overrides
        .retain(|part, _| parts.files.contains_key(part));
    book.package = PackageState {
        parts: parts.files,
        content_types: preserved_types,
        root_rels: preserved_root_rels,
        workbook_rels: preserved_workbook_rels,
        workbook_elements: info.preserved,
        theme,
        workbook_content_type,
    };
    log::debug!(
        "loaded {} worksheets, {} preserved parts",
        book.sheets.len(),
        book.package.parts.len()
    );
    Ok(book)
}
