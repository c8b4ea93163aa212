//! Worksheet parts
//!
//! `sheetData` is read as a stream of events so large sheets never become a
//! node tree; the other children are small and read as [`XmlNode`]s.
//! Children the engine does not model are kept verbatim and written back at
//! their schema position, unless they point at other parts.

use super::opc::{Relationship, RelIds, rel};
use super::strings::{StringTable, read_rich_text};
use super::styles::StyleTable;
use super::xml::{XML_DECLARATION, XmlNode, XmlReader, bool_str, number, push_attr, push_t, reader, schema_position};
use crate::address::{CellAddress, CellRange};
use crate::formula::rewrite::{RefEdit, rewrite_formula};
use crate::model::date::{datetime_to_serial, duration_to_serial, serial_to_datetime, serial_to_duration};
use crate::model::display::TemporalKind;
use crate::model::{
    Cell, CellValue, ColumnInfo, ErrorValue, Formula, Hyperlink, HyperlinkTarget, Panes, PasswordHash,
    PreservedElement, ProtectionOptions, RichText, RowInfo, SheetProtection, SheetView, ViewType, Worksheet,
};
use crate::pool::{SharedStringPool, StyleId};
use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, NaiveDateTime};
use quick_xml::events::Event;
use std::collections::HashMap;
use std::sync::Arc;

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Split pane offsets per row and per column of default size, in twips
const SPLIT_ROW_TWIPS: f64 = 300.0;
const SPLIT_COL_TWIPS: f64 = 960.0;

const WORKSHEET_ORDER: &[&str] = &[
    "sheetPr",
    "dimension",
    "sheetViews",
    "sheetFormatPr",
    "cols",
    "sheetData",
    "sheetCalcPr",
    "sheetProtection",
    "protectedRanges",
    "scenarios",
    "autoFilter",
    "sortState",
    "dataConsolidate",
    "customSheetViews",
    "mergeCells",
    "phoneticPr",
    "conditionalFormatting",
    "dataValidations",
    "hyperlinks",
    "printOptions",
    "pageMargins",
    "pageSetup",
    "headerFooter",
    "rowBreaks",
    "colBreaks",
    "customProperties",
    "cellWatches",
    "ignoredErrors",
    "smartTags",
    "drawing",
    "legacyDrawing",
    "legacyDrawingHF",
    "drawingHF",
    "picture",
    "oleObjects",
    "controls",
    "webPublishItems",
    "tableParts",
    "extLst",
];

const DEFAULT_PAGE_MARGINS: &str =
    r#"<pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/>"#;

/// `sheetProtection` attribute, its schema default, and the matching option.
/// An attribute set to `1` forbids the action.
fn protection_flags(options: &mut ProtectionOptions) -> [(&'static str, bool, &mut bool); 15] {
    [
        ("objects", false, &mut options.edit_objects),
        ("scenarios", false, &mut options.edit_scenarios),
        ("formatCells", true, &mut options.format_cells),
        ("formatColumns", true, &mut options.format_columns),
        ("formatRows", true, &mut options.format_rows),
        ("insertColumns", true, &mut options.insert_columns),
        ("insertRows", true, &mut options.insert_rows),
        ("insertHyperlinks", true, &mut options.insert_hyperlinks),
        ("deleteColumns", true, &mut options.delete_columns),
        ("deleteRows", true, &mut options.delete_rows),
        ("selectLockedCells", false, &mut options.select_locked_cells),
        ("sort", true, &mut options.sort),
        ("autoFilter", true, &mut options.auto_filter),
        ("pivotTables", true, &mut options.pivot_tables),
        ("selectUnlockedCells", false, &mut options.select_unlocked_cells),
    ]
}

/// Lookup tables shared by every worksheet of one load
pub(crate) struct ReadContext<'a> {
    pub strings: &'a [Arc<RichText>],
    /// Style handle per `cellXfs` index
    pub xf_styles: &'a [StyleId],
    /// Date or duration interpretation per `cellXfs` index
    pub xf_kinds: &'a [TemporalKind],
    pub date1904: bool,
}

/// Relationship ids of parts a worksheet links to
#[derive(Debug, Default)]
pub(crate) struct SheetRefs {
    pub tables: Vec<String>,
    pub drawing: Option<String>,
    pub legacy_drawing: Option<String>,
}

/// Fill `sheet` from a worksheet part. `rels` are the part's relationships.
pub(crate) fn read_worksheet(
    xml: &[u8],
    sheet: &mut Worksheet,
    rels: &[Relationship],
    ctx: &ReadContext<'_>,
    pool: &mut SharedStringPool,
) -> Result<SheetRefs> {
    let mut reader = reader(xml);
    let mut buf = Vec::new();
    let root = loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => break XmlNode::open(&e)?,
            Event::Empty(_) | Event::Eof => return Ok(SheetRefs::default()),
            _ => {}
        }
        buf.clear();
    };

    let mut refs = SheetRefs::default();
    loop {
        buf.clear();
        let node = match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"sheetData" => {
                read_sheet_data(&mut reader, sheet, ctx, pool)?;
                continue;
            }
            Event::Start(e) => {
                let start = e.into_owned();
                XmlNode::read(&mut reader, &start)?
            }
            Event::Empty(e) => XmlNode::open(&e)?,
            Event::End(_) | Event::Eof => break,
            _ => continue,
        };
        match node.local_name() {
            "dimension" | "sheetData" => {}
            "sheetViews" => {
                if let Some(view) = node.child("sheetView") {
                    sheet.view = read_view(view);
                }
            }
            "sheetFormatPr" => {
                if let Some(height) = node.attr_f64("defaultRowHeight") {
                    sheet.default_row_height = height;
                }
                if let Some(width) = node.attr_f64("defaultColWidth") {
                    sheet.default_column_width = width;
                }
            }
            "cols" => read_columns(&node, sheet, ctx),
            "sheetProtection" => sheet.protection = read_protection(&node),
            "mergeCells" => {
                sheet.merges = node
                    .children_named("mergeCell")
                    .filter_map(|m| CellRange::parse(m.attr("ref")?).ok())
                    .collect();
            }
            "hyperlinks" => sheet.hyperlinks = read_hyperlinks(&node, rels),
            "drawing" => refs.drawing = node.prefixed_attr("id").map(str::to_string),
            "legacyDrawing" => refs.legacy_drawing = node.prefixed_attr("id").map(str::to_string),
            "tableParts" => {
                refs.tables = node
                    .children_named("tablePart")
                    .filter_map(|t| t.prefixed_attr("id").map(str::to_string))
                    .collect();
            }
            name if node.has_relationship() => {
                log::warn!("dropping <{}> of worksheet '{}': it links to other parts", name, sheet.name);
            }
            name => sheet.preserved.push(PreservedElement {
                name: name.to_string(),
                xml: node.detach(&root).to_xml(),
            }),
        }
    }
    Ok(refs)
}

fn read_sheet_data(
    reader: &mut XmlReader<'_>,
    sheet: &mut Worksheet,
    ctx: &ReadContext<'_>,
    pool: &mut SharedStringPool,
) -> Result<()> {
    let mut buf = Vec::new();
    let mut shared: HashMap<String, (CellAddress, String)> = HashMap::new();
    let mut row = 0u32;
    let mut next_row = 0u32;
    let mut next_col = 0u32;
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                let node = XmlNode::open(&e)?;
                row = node
                    .attr_u32("r")
                    .map_or(next_row, |r| r.saturating_sub(1));
                next_row = row + 1;
                next_col = 0;
                let info = RowInfo {
                    height: node
                        .attr_f64("ht")
                        .filter(|_| node.attr_bool("customHeight", false)),
                    hidden: node.attr_bool("hidden", false),
                    style: node
                        .attr_u32("s")
                        .filter(|_| node.attr_bool("customFormat", false))
                        .map(|xf| ctx.style(xf)),
                };
                if !info.is_default() {
                    sheet.rows.insert(row, info);
                }
            }
            Event::Start(e) if e.local_name().as_ref() == b"c" => {
                let start = e.into_owned();
                let node = XmlNode::read(reader, &start)?;
                next_col = read_cell(&node, row, next_col, sheet, ctx, pool, &mut shared)? + 1;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                let node = XmlNode::open(&e)?;
                next_col = read_cell(&node, row, next_col, sheet, ctx, pool, &mut shared)? + 1;
            }
            Event::End(e) if e.local_name().as_ref() == b"sheetData" => break,
            Event::Eof => bail!("worksheet ends inside sheetData"),
            _ => {}
        }
    }
    sheet.reindex_formulas();
    Ok(())
}

impl ReadContext<'_> {
    fn style(&self, xf: u32) -> StyleId {
        self.xf_styles.get(xf as usize).copied().unwrap_or(StyleId::DEFAULT)
    }

    fn number(&self, value: f64, xf: u32) -> CellValue {
        let kind = self.xf_kinds.get(xf as usize).copied().unwrap_or(TemporalKind::None);
        match kind {
            TemporalKind::DateTime => serial_to_datetime(value, self.date1904)
                .map_or(CellValue::Number(value), CellValue::DateTime),
            TemporalKind::Duration => serial_to_duration(value).map_or(CellValue::Number(value), CellValue::Duration),
            TemporalKind::None => CellValue::Number(value),
        }
    }
}

fn parse_iso_date(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
}

/// Store one `<c>` element; returns its column
fn read_cell(
    node: &XmlNode,
    row: u32,
    next_col: u32,
    sheet: &mut Worksheet,
    ctx: &ReadContext<'_>,
    pool: &mut SharedStringPool,
    shared: &mut HashMap<String, (CellAddress, String)>,
) -> Result<u32> {
    let addr = match node.attr("r") {
        Some(r) => CellAddress::parse(r).with_context(|| format!("bad cell reference '{}'", r))?,
        None => CellAddress::new(row, next_col),
    };
    let xf = node.attr_u32("s").unwrap_or(0);
    let raw = node.child("v").map(XmlNode::text);
    let value = match (node.attr("t").unwrap_or("n"), raw) {
        ("inlineStr", _) => match node.child("is") {
            Some(is) => CellValue::Text(pool.intern(read_rich_text(is)).1),
            None => CellValue::Empty,
        },
        (_, None) => CellValue::Empty,
        ("s", Some(v)) => {
            let index: usize = v.trim().parse().context("bad shared string index")?;
            let text = ctx
                .strings
                .get(index)
                .with_context(|| format!("shared string {} out of range", index))?;
            CellValue::Text(text.clone())
        }
        ("str", Some(v)) => CellValue::text(v),
        ("b", Some(v)) => CellValue::Boolean(v.trim() == "1" || v.trim().eq_ignore_ascii_case("true")),
        ("e", Some(v)) => ErrorValue::parse(&v).map_or(CellValue::Error(ErrorValue::Value), CellValue::Error),
        ("d", Some(v)) => parse_iso_date(&v).map_or_else(|| CellValue::text(v), CellValue::DateTime),
        (_, Some(v)) => match v.trim().parse::<f64>() {
            Ok(n) => ctx.number(n, xf),
            Err(_) => CellValue::text(v),
        },
    };
    let formula = node.child("f").and_then(|f| read_formula(f, addr, shared));
    let style = ctx.style(xf);
    if value.is_empty() && formula.is_none() && style == StyleId::DEFAULT {
        return Ok(addr.col);
    }
    let cell = sheet.cell_entry(addr);
    *cell = Cell {
        value,
        formula,
        style,
    };
    Ok(addr.col)
}

fn read_formula(f: &XmlNode, addr: CellAddress, shared: &mut HashMap<String, (CellAddress, String)>) -> Option<Formula> {
    let text = f.text();
    if f.attr("t") != Some("shared") {
        return (!text.trim().is_empty()).then(|| Formula::parse(&text));
    }
    let index = f.attr("si")?.to_string();
    if !text.trim().is_empty() {
        shared.insert(index, (addr, text.clone()));
        return Some(Formula::parse(&text));
    }
    let (master, body) = shared.get(&index)?;
    let rows = addr.row as i64 - master.row as i64;
    let cols = addr.col as i64 - master.col as i64;
    let moved = rewrite_formula(body, |r| match r.target.offset(rows, cols) {
        Some(target) => RefEdit::Target(target),
        None => RefEdit::Invalid,
    });
    Some(Formula::parse(moved.as_deref().unwrap_or(body)))
}

fn read_columns(node: &XmlNode, sheet: &mut Worksheet, ctx: &ReadContext<'_>) {
    for col in node.children_named("col") {
        let (Some(min), Some(max)) = (col.attr_u32("min"), col.attr_u32("max")) else {
            continue;
        };
        let best_fit = col.attr_bool("bestFit", false);
        let width = col.attr_f64("width").filter(|w| {
            col.attr_bool("customWidth", false) || best_fit || (w - sheet.default_column_width).abs() > 1e-9
        });
        let info = ColumnInfo {
            width,
            hidden: col.attr_bool("hidden", false),
            style: col.attr_u32("style").filter(|s| *s != 0).map(|xf| ctx.style(xf)),
            best_fit: best_fit && width.is_some(),
        };
        if info.is_default() {
            continue;
        }
        let last = max.min(crate::address::MAX_COLS);
        for index in min.max(1)..=last {
            sheet.columns.insert(index - 1, info);
        }
    }
}

fn read_view(node: &XmlNode) -> SheetView {
    let mut view = SheetView::default();
    view.show_gridlines = node.attr_bool("showGridLines", true);
    view.show_headers = node.attr_bool("showRowColHeaders", true);
    view.right_to_left = node.attr_bool("rightToLeft", false);
    view.view_type = node.attr("view").map(ViewType::from_xml).unwrap_or_default();
    view.set_zoom_unchecked(
        node.attr_u32("zoomScale").filter(|z| *z != 0).unwrap_or(100),
        node.attr_u32("zoomScalePageLayoutView").filter(|z| *z != 0).unwrap_or(100),
    );
    if let Some(cell) = node.attr("topLeftCell").and_then(|c| CellAddress::parse(c).ok()) {
        view.top_left_cell = cell;
    }
    if let Some(pane) = node.child("pane") {
        let x = pane.attr_f64("xSplit").unwrap_or(0.0).max(0.0);
        let y = pane.attr_f64("ySplit").unwrap_or(0.0).max(0.0);
        view.panes = match pane.attr("state") {
            Some("frozen") | Some("frozenSplit") => Panes::Frozen {
                rows: y as u32,
                columns: x as u32,
            },
            _ => Panes::Split {
                rows: (y / SPLIT_ROW_TWIPS).round() as u32,
                columns: (x / SPLIT_COL_TWIPS).round() as u32,
            },
        };
        if matches!(view.panes, Panes::Frozen { rows: 0, columns: 0 } | Panes::Split { rows: 0, columns: 0 }) {
            view.panes = Panes::None;
        }
    }
    if let Some(cell) = node
        .children_named("selection")
        .last()
        .and_then(|s| s.attr("activeCell"))
        .and_then(|c| CellAddress::parse(c).ok())
    {
        view.active_cell = cell;
    }
    view
}

fn read_protection(node: &XmlNode) -> Option<SheetProtection> {
    if !node.attr_bool("sheet", false) {
        return None;
    }
    let mut options = ProtectionOptions::default();
    for (name, default, allowed) in protection_flags(&mut options) {
        *allowed = !node.attr_bool(name, default);
    }
    let password = if let Some(hex) = node.attr("password") {
        u16::from_str_radix(hex.trim(), 16).ok().map(PasswordHash::Legacy)
    } else {
        match (node.attr("algorithmName"), node.attr("hashValue"), node.attr("saltValue")) {
            (Some(algorithm), Some(hash), Some(salt)) => Some(PasswordHash::Modern {
                algorithm: algorithm.to_string(),
                hash: hash.to_string(),
                salt: salt.to_string(),
                spin_count: node.attr_u32("spinCount").unwrap_or(0),
            }),
            _ => None,
        }
    };
    Some(SheetProtection { options, password })
}

fn read_hyperlinks(node: &XmlNode, rels: &[Relationship]) -> Vec<Hyperlink> {
    node.children_named("hyperlink")
        .filter_map(|link| {
            let range = CellRange::parse(link.attr("ref")?).ok()?;
            let location = link.attr("location");
            let external = link
                .prefixed_attr("id")
                .and_then(|id| rels.iter().find(|r| r.id == id))
                .map(|r| r.target.as_str());
            let target = match (external, location) {
                (Some(url), _) if url.starts_with("mailto:") => {
                    HyperlinkTarget::Email(url.trim_start_matches("mailto:").to_string())
                }
                (Some(url), location) => {
                    let url = match location {
                        Some(fragment) => format!("{}#{}", url, fragment),
                        None => url.to_string(),
                    };
                    if url.contains("://") {
                        HyperlinkTarget::Url(url)
                    } else {
                        HyperlinkTarget::File(url)
                    }
                }
                (None, Some(location)) => HyperlinkTarget::Location(location.to_string()),
                (None, None) => return None,
            };
            Some(Hyperlink {
                range,
                target,
                display: link.attr("display").map(str::to_string),
                tooltip: link.attr("tooltip").map(str::to_string),
            })
        })
        .collect()
}

/// Lookup tables shared by every worksheet of one save
pub(crate) struct WriteContext<'a> {
    pub strings: &'a StringTable<'a>,
    pub styles: &'a StyleTable,
    pub date1904: bool,
    pub active_sheet: usize,
}

/// Targets of the parts a worksheet links to, relative to the worksheet
#[derive(Debug, Default)]
pub(crate) struct SheetLinks {
    pub drawing: Option<String>,
    pub vml: Option<String>,
    pub comments: Option<String>,
    pub threaded: Option<String>,
    pub tables: Vec<String>,
}

/// Worksheet part for the sheet at `position`, plus its relationships
pub(crate) fn worksheet_part(
    sheet: &Worksheet,
    position: usize,
    ctx: &WriteContext<'_>,
    links: &SheetLinks,
) -> (String, Vec<Relationship>) {
    let mut ids = RelIds::default();
    let mut rels = Vec::new();
    let mut parts: Vec<(usize, String)> = Vec::new();
    let mut place = |name: &str, xml: String| parts.push((schema_position(WORKSHEET_ORDER, name), xml));

    let dimension = sheet
        .used_range()
        .map_or_else(|| "A1".to_string(), |r| r.to_string());
    place("dimension", format!(r#"<dimension ref="{}"/>"#, dimension));
    place("sheetViews", view_xml(&sheet.view, position == ctx.active_sheet));
    place("sheetFormatPr", format_pr_xml(sheet));
    if let Some(cols) = columns_xml(sheet, ctx) {
        place("cols", cols);
    }
    place("sheetData", sheet_data_xml(sheet, ctx));
    if let Some(protection) = &sheet.protection {
        place("sheetProtection", protection_xml(protection));
    }
    if !sheet.merges.is_empty() {
        let mut xml = format!(r#"<mergeCells count="{}">"#, sheet.merges.len());
        for range in &sheet.merges {
            xml.push_str(&format!(r#"<mergeCell ref="{}"/>"#, range));
        }
        xml.push_str("</mergeCells>");
        place("mergeCells", xml);
    }
    if !sheet.hyperlinks.is_empty() {
        let mut xml = String::from("<hyperlinks>");
        for link in &sheet.hyperlinks {
            xml.push_str("<hyperlink");
            push_attr(&mut xml, "ref", &link.range.to_string());
            match link.target.external_target() {
                Some(target) => {
                    let id = ids.next_id();
                    push_attr(&mut xml, "r:id", &id);
                    rels.push(Relationship::external(id, rel::HYPERLINK, target));
                }
                None => {
                    if let HyperlinkTarget::Location(location) = &link.target {
                        push_attr(&mut xml, "location", location);
                    }
                }
            }
            if let Some(display) = &link.display {
                push_attr(&mut xml, "display", display);
            }
            if let Some(tooltip) = &link.tooltip {
                push_attr(&mut xml, "tooltip", tooltip);
            }
            xml.push_str("/>");
        }
        xml.push_str("</hyperlinks>");
        place("hyperlinks", xml);
    }
    if !sheet.preserved.iter().any(|p| p.name == "pageMargins") {
        place("pageMargins", DEFAULT_PAGE_MARGINS.to_string());
    }
    if let Some(target) = &links.drawing {
        let id = ids.next_id();
        place("drawing", format!(r#"<drawing r:id="{}"/>"#, id));
        rels.push(Relationship::new(id, rel::DRAWING, target.clone()));
    }
    if let Some(target) = &links.vml {
        let id = ids.next_id();
        place("legacyDrawing", format!(r#"<legacyDrawing r:id="{}"/>"#, id));
        rels.push(Relationship::new(id, rel::VML_DRAWING, target.clone()));
    }
    if let Some(target) = &links.comments {
        rels.push(Relationship::new(ids.next_id(), rel::COMMENTS, target.clone()));
    }
    if let Some(target) = &links.threaded {
        rels.push(Relationship::new(ids.next_id(), rel::THREADED_COMMENT, target.clone()));
    }
    if !links.tables.is_empty() {
        let mut xml = format!(r#"<tableParts count="{}">"#, links.tables.len());
        for target in &links.tables {
            let id = ids.next_id();
            xml.push_str(&format!(r#"<tablePart r:id="{}"/>"#, id));
            rels.push(Relationship::new(id, rel::TABLE, target.clone()));
        }
        xml.push_str("</tableParts>");
        place("tableParts", xml);
    }
    for element in &sheet.preserved {
        place(&element.name, element.xml.clone());
    }
    parts.sort_by_key(|(position, _)| *position);

    let mut out = String::from(XML_DECLARATION);
    out.push_str(&format!(r#"<worksheet xmlns="{}" xmlns:r="{}">"#, MAIN_NS, REL_NS));
    for (_, xml) in parts {
        out.push_str(&xml);
    }
    out.push_str("</worksheet>");
    (out, rels)
}

fn view_xml(view: &SheetView, selected: bool) -> String {
    let mut out = String::from("<sheetViews><sheetView");
    if !view.show_gridlines {
        push_attr(&mut out, "showGridLines", "0");
    }
    if !view.show_headers {
        push_attr(&mut out, "showRowColHeaders", "0");
    }
    if view.right_to_left {
        push_attr(&mut out, "rightToLeft", "1");
    }
    if selected {
        push_attr(&mut out, "tabSelected", "1");
    }
    if view.view_type != ViewType::Normal {
        push_attr(&mut out, "view", view.view_type.as_xml());
    }
    if view.top_left_cell != CellAddress::new(0, 0) {
        push_attr(&mut out, "topLeftCell", &view.top_left_cell.to_string());
    }
    if view.zoom() != 100 {
        push_attr(&mut out, "zoomScale", &view.zoom().to_string());
        push_attr(&mut out, "zoomScaleNormal", &view.zoom().to_string());
    }
    if view.page_layout_zoom() != 100 {
        push_attr(&mut out, "zoomScalePageLayoutView", &view.page_layout_zoom().to_string());
    }
    push_attr(&mut out, "workbookViewId", "0");
    out.push('>');

    let active_pane = match view.panes {
        Panes::None => None,
        Panes::Frozen { rows, columns } | Panes::Split { rows, columns } => Some(match (rows > 0, columns > 0) {
            (true, true) => "bottomRight",
            (true, false) => "bottomLeft",
            _ => "topRight",
        }),
    };
    match view.panes {
        Panes::None => {}
        Panes::Frozen { rows, columns } => {
            out.push_str("<pane");
            if columns > 0 {
                push_attr(&mut out, "xSplit", &columns.to_string());
            }
            if rows > 0 {
                push_attr(&mut out, "ySplit", &rows.to_string());
            }
            push_attr(&mut out, "topLeftCell", &CellAddress::new(rows, columns).to_string());
            push_attr(&mut out, "activePane", active_pane.unwrap_or("bottomRight"));
            push_attr(&mut out, "state", "frozen");
            out.push_str("/>");
        }
        Panes::Split { rows, columns } => {
            out.push_str("<pane");
            if columns > 0 {
                push_attr(&mut out, "xSplit", &number(columns as f64 * SPLIT_COL_TWIPS));
            }
            if rows > 0 {
                push_attr(&mut out, "ySplit", &number(rows as f64 * SPLIT_ROW_TWIPS));
            }
            push_attr(&mut out, "topLeftCell", &CellAddress::new(rows, columns).to_string());
            push_attr(&mut out, "activePane", active_pane.unwrap_or("bottomRight"));
            push_attr(&mut out, "state", "split");
            out.push_str("/>");
        }
    }
    out.push_str("<selection");
    if let Some(pane) = active_pane {
        push_attr(&mut out, "pane", pane);
    }
    let active = view.active_cell.to_string();
    push_attr(&mut out, "activeCell", &active);
    push_attr(&mut out, "sqref", &active);
    out.push_str("/></sheetView></sheetViews>");
    out
}

fn format_pr_xml(sheet: &Worksheet) -> String {
    let mut out = String::from("<sheetFormatPr");
    push_attr(&mut out, "defaultRowHeight", &number(sheet.default_row_height));
    if (sheet.default_column_width - 8.43).abs() > 1e-9 {
        push_attr(&mut out, "defaultColWidth", &number(sheet.default_column_width));
    }
    if (sheet.default_row_height - 15.0).abs() > 1e-9 {
        push_attr(&mut out, "customHeight", "1");
    }
    out.push_str("/>");
    out
}

fn columns_xml(sheet: &Worksheet, ctx: &WriteContext<'_>) -> Option<String> {
    let mut runs: Vec<(u32, u32, ColumnInfo)> = Vec::new();
    for (&index, info) in &sheet.columns {
        if info.is_default() {
            continue;
        }
        match runs.last_mut() {
            Some((_, last, run)) if *last + 1 == index && run == info => *last = index,
            _ => runs.push((index, index, *info)),
        }
    }
    if runs.is_empty() {
        return None;
    }
    let mut out = String::from("<cols>");
    for (first, last, info) in runs {
        out.push_str("<col");
        push_attr(&mut out, "min", &(first + 1).to_string());
        push_attr(&mut out, "max", &(last + 1).to_string());
        push_attr(&mut out, "width", &number(info.width.unwrap_or(sheet.default_column_width)));
        if let Some(style) = info.style {
            push_attr(&mut out, "style", &ctx.styles.xf(style).to_string());
        }
        if info.hidden {
            push_attr(&mut out, "hidden", "1");
        }
        if info.best_fit {
            push_attr(&mut out, "bestFit", "1");
        }
        if info.width.is_some() {
            push_attr(&mut out, "customWidth", "1");
        }
        out.push_str("/>");
    }
    out.push_str("</cols>");
    Some(out)
}

fn sheet_data_xml(sheet: &Worksheet, ctx: &WriteContext<'_>) -> String {
    let mut rows: Vec<u32> = sheet
        .rows
        .iter()
        .filter(|(_, info)| !info.is_default())
        .map(|(i, _)| *i)
        .chain(sheet.cells.keys().copied())
        .collect();
    rows.sort_unstable();
    rows.dedup();

    let mut out = String::from("<sheetData>");
    for index in rows {
        out.push_str("<row");
        push_attr(&mut out, "r", &(index + 1).to_string());
        if let Some(info) = sheet.rows.get(&index) {
            if let Some(style) = info.style {
                push_attr(&mut out, "s", &ctx.styles.xf(style).to_string());
                push_attr(&mut out, "customFormat", "1");
            }
            if let Some(height) = info.height {
                push_attr(&mut out, "ht", &number(height));
                push_attr(&mut out, "customHeight", "1");
            }
            if info.hidden {
                push_attr(&mut out, "hidden", "1");
            }
        }
        let cells = sheet.cells.get(&index);
        if cells.is_none_or(|c| c.is_empty()) {
            out.push_str("/>");
            continue;
        }
        out.push('>');
        for (&col, cell) in cells.into_iter().flatten() {
            push_cell(&mut out, CellAddress::new(index, col), cell, ctx);
        }
        out.push_str("</row>");
    }
    out.push_str("</sheetData>");
    out
}

/// Value of a cell as `(t attribute, <v> text)`; `None` writes no value
fn stored_value(value: &CellValue, date1904: bool) -> Option<(Option<&'static str>, String)> {
    let numeric = |n: f64| -> Option<(Option<&'static str>, String)> {
        if n.is_finite() {
            Some((None, number(n)))
        } else {
            Some((Some("e"), ErrorValue::Num.as_str().to_string()))
        }
    };
    match value {
        CellValue::Empty | CellValue::Error(ErrorValue::Circular) => None,
        CellValue::Number(n) => numeric(*n),
        CellValue::DateTime(dt) => numeric(datetime_to_serial(*dt, date1904)),
        CellValue::Duration(d) => numeric(duration_to_serial(*d)),
        CellValue::Boolean(b) => Some((Some("b"), bool_str(*b).to_string())),
        CellValue::Error(e) => Some((Some("e"), e.as_str().to_string())),
        CellValue::Text(text) => Some((Some("str"), text.plain_text())),
    }
}

fn push_cell(out: &mut String, addr: CellAddress, cell: &Cell, ctx: &WriteContext<'_>) {
    out.push_str("<c");
    push_attr(out, "r", &addr.to_string());
    let xf = ctx.styles.xf(cell.style);
    if xf != 0 {
        push_attr(out, "s", &xf.to_string());
    }

    if let Some(formula) = &cell.formula {
        let stored = stored_value(&cell.value, ctx.date1904);
        if let Some((Some(t), _)) = &stored {
            push_attr(out, "t", t);
        }
        out.push('>');
        push_t(out, "f", formula.body());
        if let Some((_, v)) = stored {
            push_t(out, "v", &v);
        }
        out.push_str("</c>");
        return;
    }

    if let CellValue::Text(text) = &cell.value {
        match ctx.strings.index_of(text) {
            Some(index) => {
                push_attr(out, "t", "s");
                out.push_str(&format!("><v>{}</v></c>", index));
            }
            None => {
                push_attr(out, "t", "inlineStr");
                out.push_str("><is>");
                super::strings::push_rich_text(out, text);
                out.push_str("</is></c>");
            }
        }
        return;
    }
    match stored_value(&cell.value, ctx.date1904) {
        Some((t, v)) => {
            if let Some(t) = t {
                push_attr(out, "t", t);
            }
            out.push('>');
            push_t(out, "v", &v);
            out.push_str("</c>");
        }
        None => out.push_str("/>"),
    }
}

fn protection_xml(protection: &SheetProtection) -> String {
    let mut out = String::from("<sheetProtection");
    match &protection.password {
        Some(PasswordHash::Legacy(hash)) => push_attr(&mut out, "password", &format!("{:04X}", hash)),
        Some(PasswordHash::Modern {
            algorithm,
            hash,
            salt,
            spin_count,
        }) => {
            push_attr(&mut out, "algorithmName", algorithm);
            push_attr(&mut out, "hashValue", hash);
            push_attr(&mut out, "saltValue", salt);
            push_attr(&mut out, "spinCount", &spin_count.to_string());
        }
        None => {}
    }
    push_attr(&mut out, "sheet", "1");
    let mut options = protection.options;
    for (name, default, allowed) in protection_flags(&mut options) {
        let forbidden = !*allowed;
        if forbidden != default {
            push_attr(&mut out, name, bool_str(forbidden));
        }
    }
    out.push_str("/>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Workbook;

    fn context<'a>(strings: &'a [Arc<RichText>], kinds: &'a [TemporalKind], styles: &'a [StyleId]) -> ReadContext<'a> {
        ReadContext {
            strings,
            xf_styles: styles,
            xf_kinds: kinds,
            date1904: false,
        }
    }

    #[test]
    fn test_shared_formulas_are_expanded() {
        let xml = br#"<worksheet><sheetData>
            <row r="1"><c r="A1"><v>1</v></c><c r="B1"><f t="shared" ref="B1:B3" si="0">A1*2</f><v>2</v></c></row>
            <row r="2"><c r="B2"><f t="shared" si="0"/></c></row>
            <row r="3"><c r="B3"><f t="shared" si="0"/></c></row>
        </sheetData></worksheet>"#;
        let mut sheet = Worksheet::new("S", 15.0, 8.43);
        let mut pool = SharedStringPool::new();
        read_worksheet(xml, &mut sheet, &[], &context(&[], &[], &[]), &mut pool).unwrap();
        assert_eq!(sheet.formula("B3").unwrap().as_deref(), Some("=A3*2"));
        assert_eq!(sheet.value("B1").unwrap(), &CellValue::Number(2.0));
        assert_eq!(sheet.formula_cells.len(), 3);
    }

    #[test]
    fn test_cells_without_references_follow_on() {
        let xml = br#"<worksheet><sheetData><row><c t="inlineStr"><is><t>a</t></is></c><c t="b"><v>1</v></c></row><row><c t="e"><v>#N/A</v></c></row></sheetData></worksheet>"#;
        let mut sheet = Worksheet::new("S", 15.0, 8.43);
        let mut pool = SharedStringPool::new();
        read_worksheet(xml, &mut sheet, &[], &context(&[], &[], &[]), &mut pool).unwrap();
        assert_eq!(sheet.value("A1").unwrap(), &CellValue::text("a"));
        assert_eq!(sheet.value("B1").unwrap(), &CellValue::Boolean(true));
        assert_eq!(sheet.value("A2").unwrap(), &CellValue::Error(ErrorValue::NA));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_dates_follow_the_cell_format() {
        let xml = br#"<worksheet><sheetData><row r="1"><c r="A1" s="1"><v>45000.5</v></c><c r="B1" s="2"><v>1.5</v></c><c r="C1"><v>45000</v></c></row></sheetData></worksheet>"#;
        let kinds = [TemporalKind::None, TemporalKind::DateTime, TemporalKind::Duration];
        let styles = [StyleId(0), StyleId(1), StyleId(2)];
        let mut sheet = Worksheet::new("S", 15.0, 8.43);
        let mut pool = SharedStringPool::new();
        read_worksheet(xml, &mut sheet, &[], &context(&[], &kinds, &styles), &mut pool).unwrap();
        assert!(matches!(sheet.value("A1").unwrap(), CellValue::DateTime(_)));
        assert_eq!(
            sheet.value("B1").unwrap(),
            &CellValue::Duration(chrono::TimeDelta::hours(36))
        );
        assert_eq!(sheet.value("C1").unwrap(), &CellValue::Number(45000.0));
    }

    #[test]
    fn test_protection_attributes_round_trip() {
        let options = ProtectionOptions {
            format_cells: true,
            select_locked_cells: false,
            edit_objects: true,
            ..ProtectionOptions::default()
        };
        let protection = SheetProtection::new(options, Some("secret"));
        let xml = protection_xml(&protection);
        assert!(xml.contains(r#"formatCells="0""#));
        assert!(xml.contains(r#"selectLockedCells="1""#));
        assert!(!xml.contains("formatRows"));
        let node = XmlNode::parse(xml.as_bytes()).unwrap();
        assert_eq!(read_protection(&node), Some(protection));
    }

    #[test]
    fn test_panes_and_view_round_trip() {
        let mut view = SheetView::default();
        view.freeze_panes(2, 1).unwrap();
        view.set_zoom(150).unwrap();
        view.show_gridlines = false;
        view.active_cell = CellAddress::new(4, 3);
        let xml = view_xml(&view, true);
        assert!(xml.contains(r#"<pane xSplit="1" ySplit="2" topLeftCell="B3" activePane="bottomRight" state="frozen"/>"#));
        let node = XmlNode::parse(xml.as_bytes()).unwrap();
        assert_eq!(read_view(node.child("sheetView").unwrap()), view);

        view.split_panes(3, 0).unwrap();
        let xml = view_xml(&view, false);
        assert!(xml.contains(r#"ySplit="900""#));
        let node = XmlNode::parse(xml.as_bytes()).unwrap();
        assert_eq!(read_view(node.child("sheetView").unwrap()).panes, Panes::Split { rows: 3, columns: 0 });
    }

    #[test]
    fn test_unknown_elements_are_kept_in_order() {
        let xml = br#"<worksheet xmlns="m" xmlns:r="r" xmlns:x14ac="urn:x14ac"><sheetPr><tabColor rgb="FFFF0000"/></sheetPr><sheetData/><conditionalFormatting sqref="A1"><cfRule type="expression" priority="1"><formula>A1&gt;0</formula></cfRule></conditionalFormatting><pageMargins left="1" right="1" top="1" bottom="1" header="0" footer="0"/><legacyDrawingHF r:id="rId9"/></worksheet>"#;
        let mut book = Workbook::new();
        let sheet = &mut book.sheets[0];
        let mut pool = SharedStringPool::new();
        read_worksheet(xml, sheet, &[], &context(&[], &[], &[]), &mut pool).unwrap();
        let names: Vec<_> = sheet.preserved.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["sheetPr", "conditionalFormatting", "pageMargins"]);

        let strings = StringTable::build(&book);
        let styles = StyleTable::build(&book);
        let ctx = WriteContext {
            strings: &strings,
            styles: &styles,
            date1904: false,
            active_sheet: 0,
        };
        let (out, rels) = worksheet_part(&book.sheets[0], 0, &ctx, &SheetLinks::default());
        assert!(rels.is_empty());
        let at = |needle: &str| out.find(needle).unwrap();
        assert!(at("<sheetPr>") < at("<dimension"));
        assert!(at("<sheetData") < at("<conditionalFormatting"));
        assert!(at("<conditionalFormatting") < at(r#"<pageMargins left="1""#));
        assert!(!out.contains("legacyDrawingHF"));
    }
}
