//! `xl/styles.xml`: cell formats in and out of the style pool

use super::xml::{XML_DECLARATION, XmlNode, bool_str, number, push_attr};
use crate::model::display::{builtin_format, builtin_format_id};
use crate::model::{
    Alignment, Border, BorderLine, CellProtection, Color, Fill, FillPattern, Font, HorizontalAlignment, LineStyle,
    Style, Underline, VerticalAlignment, VerticalTextAlign, Workbook,
};
use crate::pool::{Remap, StyleId};
use anyhow::Result;
use ordered_float::OrderedFloat;
use std::collections::{BTreeMap, HashMap};

/// First id available to custom number formats
const FIRST_CUSTOM_FORMAT: u32 = 164;

pub(crate) fn read_color(node: &XmlNode) -> Option<Color> {
    if node.attr_bool("auto", false) {
        return Some(Color::Auto);
    }
    if let Some(rgb) = node.attr("rgb") {
        return Color::from_hex(rgb);
    }
    if let Some(theme) = node.attr_u32("theme") {
        return Some(Color::theme(theme, node.attr_f64("tint").unwrap_or(0.0)));
    }
    node.attr_u32("indexed").map(Color::Indexed)
}

pub(crate) fn push_color(out: &mut String, tag: &str, color: &Color) {
    out.push('<');
    out.push_str(tag);
    match color {
        Color::Argb(argb) => push_attr(out, "rgb", &format!("{:08X}", argb)),
        Color::Theme { index, tint } => {
            push_attr(out, "theme", &index.to_string());
            if tint.0 != 0.0 {
                push_attr(out, "tint", &tint.0.to_string());
            }
        }
        Color::Indexed(index) => push_attr(out, "indexed", &index.to_string()),
        Color::Auto => push_attr(out, "auto", "1"),
    }
    out.push_str("/>");
}

/// Font from a `<font>` or run properties `<rPr>` element
pub(crate) fn read_font(node: &XmlNode) -> Font {
    let mut font = Font::default();
    for child in node.elements() {
        let flag = || child.attr("val").is_none_or(super::xml::parse_bool);
        match child.local_name() {
            "name" | "rFont" => {
                if let Some(name) = child.attr("val") {
                    font.name = name.to_string();
                }
            }
            "sz" => {
                if let Some(size) = child.attr_f64("val") {
                    font.size = OrderedFloat(size);
                }
            }
            "b" => font.bold = flag(),
            "i" => font.italic = flag(),
            "strike" => font.strikethrough = flag(),
            "u" => font.underline = Underline::from_xml(child.attr("val").unwrap_or("single")),
            "vertAlign" => {
                font.vertical_align = match child.attr("val") {
                    Some("superscript") => VerticalTextAlign::Superscript,
                    Some("subscript") => VerticalTextAlign::Subscript,
                    _ => VerticalTextAlign::Baseline,
                }
            }
            "color" => font.color = read_color(child),
            _ => {}
        }
    }
    font
}

/// Font properties; `name_tag` is `name` in the font table and `rFont` in runs
pub(crate) fn push_font_props(out: &mut String, font: &Font, name_tag: &str) {
    if font.bold {
        out.push_str("<b/>");
    }
    if font.italic {
        out.push_str("<i/>");
    }
    if font.strikethrough {
        out.push_str("<strike/>");
    }
    match font.underline {
        Underline::None => {}
        Underline::Single => out.push_str("<u/>"),
        other => {
            out.push_str("<u");
            push_attr(out, "val", other.as_xml().unwrap_or("single"));
            out.push_str("/>");
        }
    }
    match font.vertical_align {
        VerticalTextAlign::Baseline => {}
        VerticalTextAlign::Superscript => out.push_str(r#"<vertAlign val="superscript"/>"#),
        VerticalTextAlign::Subscript => out.push_str(r#"<vertAlign val="subscript"/>"#),
    }
    out.push_str("<sz");
    push_attr(out, "val", &number(font.size_points()));
    out.push_str("/>");
    if let Some(color) = &font.color {
        push_color(out, "color", color);
    }
    out.push('<');
    out.push_str(name_tag);
    push_attr(out, "val", &font.name);
    out.push_str("/>");
}

fn read_fill(node: &XmlNode) -> Fill {
    let Some(pattern) = node.child("patternFill") else {
        log::debug!("gradient fill replaced by an empty fill");
        return Fill::default();
    };
    let mut fill = Fill {
        pattern: pattern
            .attr("patternType")
            .map(FillPattern::from_xml)
            .unwrap_or_default(),
        foreground: pattern.child("fgColor").and_then(read_color),
        background: pattern.child("bgColor").and_then(read_color),
    };
    if fill.pattern == FillPattern::None && fill.foreground.is_some() {
        fill.pattern = FillPattern::Solid;
    }
    fill
}

fn push_fill(out: &mut String, fill: &Fill) {
    out.push_str("<fill><patternFill");
    push_attr(out, "patternType", fill.pattern.as_xml());
    if fill.foreground.is_none() && fill.background.is_none() {
        out.push_str("/></fill>");
        return;
    }
    out.push('>');
    if let Some(color) = &fill.foreground {
        push_color(out, "fgColor", color);
    }
    if let Some(color) = &fill.background {
        push_color(out, "bgColor", color);
    }
    out.push_str("</patternFill></fill>");
}

fn read_border_line(node: Option<&XmlNode>) -> BorderLine {
    node.map(|n| BorderLine {
        style: n.attr("style").map(LineStyle::from_xml).unwrap_or_default(),
        color: n.child("color").and_then(read_color),
    })
    .unwrap_or_default()
}

fn read_border(node: &XmlNode) -> Border {
    Border {
        left: read_border_line(node.child("left").or_else(|| node.child("start"))),
        right: read_border_line(node.child("right").or_else(|| node.child("end"))),
        top: read_border_line(node.child("top")),
        bottom: read_border_line(node.child("bottom")),
        diagonal: read_border_line(node.child("diagonal")),
        diagonal_up: node.attr_bool("diagonalUp", false),
        diagonal_down: node.attr_bool("diagonalDown", false),
    }
}

fn push_border(out: &mut String, border: &Border) {
    out.push_str("<border");
    if border.diagonal_up {
        push_attr(out, "diagonalUp", "1");
    }
    if border.diagonal_down {
        push_attr(out, "diagonalDown", "1");
    }
    out.push('>');
    for (tag, line) in [
        ("left", &border.left),
        ("right", &border.right),
        ("top", &border.top),
        ("bottom", &border.bottom),
        ("diagonal", &border.diagonal),
    ] {
        out.push('<');
        out.push_str(tag);
        if line.is_none() {
            out.push_str("/>");
            continue;
        }
        push_attr(out, "style", line.style.as_xml());
        out.push('>');
        if let Some(color) = &line.color {
            push_color(out, "color", color);
        }
        out.push_str("</");
        out.push_str(tag);
        out.push('>');
    }
    out.push_str("</border>");
}

fn read_alignment(node: &XmlNode) -> Alignment {
    Alignment {
        horizontal: node
            .attr("horizontal")
            .map(HorizontalAlignment::from_xml)
            .unwrap_or_default(),
        vertical: node
            .attr("vertical")
            .map(VerticalAlignment::from_xml)
            .unwrap_or_default(),
        wrap_text: node.attr_bool("wrapText", false),
        shrink_to_fit: node.attr_bool("shrinkToFit", false),
        indent: node.attr_u32("indent").unwrap_or(0),
        text_rotation: node.attr_u32("textRotation").unwrap_or(0),
    }
}

fn push_alignment(out: &mut String, alignment: &Alignment) {
    out.push_str("<alignment");
    if alignment.horizontal != HorizontalAlignment::General {
        push_attr(out, "horizontal", alignment.horizontal.as_xml());
    }
    if alignment.vertical != VerticalAlignment::Bottom {
        push_attr(out, "vertical", alignment.vertical.as_xml());
    }
    if alignment.wrap_text {
        push_attr(out, "wrapText", "1");
    }
    if alignment.shrink_to_fit {
        push_attr(out, "shrinkToFit", "1");
    }
    if alignment.indent > 0 {
        push_attr(out, "indent", &alignment.indent.to_string());
    }
    if alignment.text_rotation > 0 {
        push_attr(out, "textRotation", &alignment.text_rotation.to_string());
    }
    out.push_str("/>");
}

/// Cell formats of a styles part, in `cellXfs` order
pub(crate) fn read_styles(xml: &[u8]) -> Result<Vec<Style>> {
    let root = XmlNode::parse(xml)?;
    let custom_formats: HashMap<u32, String> = root
        .child("numFmts")
        .map(|n| {
            n.children_named("numFmt")
                .filter_map(|f| Some((f.attr_u32("numFmtId")?, f.attr("formatCode")?.to_string())))
                .collect()
        })
        .unwrap_or_default();
    let fonts: Vec<Font> = root
        .child("fonts")
        .map(|n| n.children_named("font").map(read_font).collect())
        .unwrap_or_default();
    let fills: Vec<Fill> = root
        .child("fills")
        .map(|n| n.children_named("fill").map(read_fill).collect())
        .unwrap_or_default();
    let borders: Vec<Border> = root
        .child("borders")
        .map(|n| n.children_named("border").map(read_border).collect())
        .unwrap_or_default();

    let Some(xfs) = root.child("cellXfs") else {
        return Ok(Vec::new());
    };
    let pick = |list: &[Font], id: Option<u32>| id.and_then(|i| list.get(i as usize)).cloned();
    let styles = xfs
        .children_named("xf")
        .map(|xf| {
            let format_id = xf.attr_u32("numFmtId").unwrap_or(0);
            let number_format = custom_formats
                .get(&format_id)
                .cloned()
                .or_else(|| builtin_format(format_id).map(str::to_string))
                .unwrap_or_else(|| "General".to_string());
            Style {
                font: pick(&fonts, xf.attr_u32("fontId")).unwrap_or_default(),
                fill: xf
                    .attr_u32("fillId")
                    .and_then(|i| fills.get(i as usize))
                    .cloned()
                    .unwrap_or_default(),
                border: xf
                    .attr_u32("borderId")
                    .and_then(|i| borders.get(i as usize))
                    .cloned()
                    .unwrap_or_default(),
                alignment: xf.child("alignment").map(read_alignment).unwrap_or_default(),
                number_format,
                protection: xf
                    .child("protection")
                    .map(|p| CellProtection {
                        locked: p.attr_bool("locked", true),
                        hidden: p.attr_bool("hidden", false),
                    })
                    .unwrap_or_default(),
            }
        })
        .collect();
    Ok(styles)
}

/// Index assignment for the formats of one save
struct Interner<'a, T: Eq + std::hash::Hash> {
    items: Vec<&'a T>,
    index: HashMap<&'a T, u32>,
}

impl<'a, T: Eq + std::hash::Hash> Interner<'a, T> {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn add(&mut self, item: &'a T) -> u32 {
        if let Some(i) = self.index.get(item) {
            return *i;
        }
        let i = self.items.len() as u32;
        self.items.push(item);
        self.index.insert(item, i);
        i
    }
}

/// Styles used by a workbook, numbered for `s="…"` attributes
pub(crate) struct StyleTable {
    remap: Remap,
    xml: String,
}

impl StyleTable {
    pub(crate) fn build(book: &Workbook) -> Self {
        let used = book.sheets.iter().flat_map(|ws| {
            ws.cells()
                .map(|(_, c)| c.style.0)
                .chain(ws.rows.values().filter_map(|r| r.style.map(|s| s.0)))
                .chain(ws.columns.values().filter_map(|c| c.style.map(|s| s.0)))
        });
        let remap = Remap::build(book.styles.len(), used, true);
        let styles: Vec<&Style> = remap
            .order()
            .iter()
            .map(|i| book.styles.get(StyleId(*i)).as_ref())
            .collect();
        let xml = styles_xml(&styles);
        Self { remap, xml }
    }

    /// `cellXfs` index of a pool handle
    pub(crate) fn xf(&self, id: StyleId) -> u32 {
        self.remap.get(id.0).unwrap_or(0)
    }

    pub(crate) fn xml(&self) -> &str {
        &self.xml
    }
}

fn styles_xml(styles: &[&Style]) -> String {
    let none_fill = Fill::default();
    let gray_fill = Fill {
        pattern: FillPattern::Gray125,
        ..Fill::default()
    };
    let mut fonts = Interner::new();
    let mut fills = Interner::new();
    fills.add(&none_fill);
    fills.add(&gray_fill);
    let mut borders = Interner::new();
    let mut custom_formats: BTreeMap<u32, &str> = BTreeMap::new();
    let mut format_ids: HashMap<&str, u32> = HashMap::new();

    let mut xfs = String::new();
    for style in styles {
        let font_id = fonts.add(&style.font);
        let fill_id = fills.add(&style.fill);
        let border_id = borders.add(&style.border);
        let format_id = match builtin_format_id(&style.number_format) {
            Some(id) => id,
            None if style.has_general_format() => 0,
            None => {
                let next = FIRST_CUSTOM_FORMAT + format_ids.len() as u32;
                let id = *format_ids.entry(style.number_format.as_str()).or_insert(next);
                custom_formats.insert(id, &style.number_format);
                id
            }
        };
        xfs.push_str("<xf");
        push_attr(&mut xfs, "numFmtId", &format_id.to_string());
        push_attr(&mut xfs, "fontId", &font_id.to_string());
        push_attr(&mut xfs, "fillId", &fill_id.to_string());
        push_attr(&mut xfs, "borderId", &border_id.to_string());
        push_attr(&mut xfs, "xfId", "0");
        if format_id != 0 {
            push_attr(&mut xfs, "applyNumberFormat", "1");
        }
        if font_id != 0 {
            push_attr(&mut xfs, "applyFont", "1");
        }
        if fill_id != 0 {
            push_attr(&mut xfs, "applyFill", "1");
        }
        if border_id != 0 {
            push_attr(&mut xfs, "applyBorder", "1");
        }
        let custom_alignment = !style.alignment.is_default();
        let custom_protection = style.protection != CellProtection::default();
        if custom_alignment {
            push_attr(&mut xfs, "applyAlignment", "1");
        }
        if custom_protection {
            push_attr(&mut xfs, "applyProtection", "1");
        }
        if !custom_alignment && !custom_protection {
            xfs.push_str("/>");
            continue;
        }
        xfs.push('>');
        if custom_alignment {
            push_alignment(&mut xfs, &style.alignment);
        }
        if custom_protection {
            xfs.push_str("<protection");
            push_attr(&mut xfs, "locked", bool_str(style.protection.locked));
            push_attr(&mut xfs, "hidden", bool_str(style.protection.hidden));
            xfs.push_str("/>");
        }
        xfs.push_str("</xf>");
    }

    let mut out = String::from(XML_DECLARATION);
    out.push_str(r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#);
    if !custom_formats.is_empty() {
        out.push_str(&format!(r#"<numFmts count="{}">"#, custom_formats.len()));
        for (id, code) in &custom_formats {
            out.push_str("<numFmt");
            push_attr(&mut out, "numFmtId", &id.to_string());
            push_attr(&mut out, "formatCode", code);
            out.push_str("/>");
        }
        out.push_str("</numFmts>");
    }
    out.push_str(&format!(r#"<fonts count="{}">"#, fonts.items.len()));
    for font in &fonts.items {
        out.push_str("<font>");
        push_font_props(&mut out, font, "name");
        out.push_str("</font>");
    }
    out.push_str("</fonts>");
    out.push_str(&format!(r#"<fills count="{}">"#, fills.items.len()));
    for fill in &fills.items {
        push_fill(&mut out, fill);
    }
    out.push_str("</fills>");
    out.push_str(&format!(r#"<borders count="{}">"#, borders.items.len()));
    for border in &borders.items {
        push_border(&mut out, border);
    }
    out.push_str("</borders>");
    out.push_str(r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#);
    out.push_str(&format!(r#"<cellXfs count="{}">{}</cellXfs>"#, styles.len(), xfs));
    out.push_str(r#"<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>"#);
    out.push_str(r#"<dxfs count="0"/>"#);
    out.push_str(r#"<tableStyles count="0" defaultTableStyle="TableStyleMedium2" defaultPivotStyle="PivotStyleLight16"/>"#);
    out.push_str("</styleSheet>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_styles_survive_a_write_and_read() {
        let mut bold = Style::with_font(Font::new("Arial", 12.0).bold().with_color(Color::RED));
        bold.fill = Fill::solid(Color::YELLOW);
        bold.border = Border::all(BorderLine::new(LineStyle::Thin, Color::BLACK));
        bold.alignment.horizontal = HorizontalAlignment::Center;
        bold.alignment.wrap_text = true;
        bold.number_format = "0.000%".to_string();
        bold.protection.locked = false;
        let mut date = Style::default();
        date.number_format = "mm-dd-yy".to_string();
        let default = Style::default();

        let xml = styles_xml(&[&default, &bold, &date]);
        assert!(xml.contains(r#"<numFmt numFmtId="164" formatCode="0.000%"/>"#));
        assert!(xml.contains(r#"<xf numFmtId="14""#));
        assert!(xml.contains(r#"<patternFill patternType="gray125"/>"#));
        let read = read_styles(xml.as_bytes()).unwrap();
        assert_eq!(read, vec![default, bold, date]);
    }

    #[test]
    fn test_run_properties_use_rfont() {
        let font = Font::new("Consolas", 9.0).italic().with_underline(Underline::Double);
        let mut out = String::from("<rPr>");
        push_font_props(&mut out, &font, "rFont");
        out.push_str("</rPr>");
        assert!(out.contains(r#"<rFont val="Consolas"/>"#));
        assert_eq!(read_font(&XmlNode::parse(out.as_bytes()).unwrap()), font);
    }

    #[test]
    fn test_theme_and_indexed_colors() {
        let node = XmlNode::parse(br#"<color theme="4" tint="-0.25"/>"#).unwrap();
        assert_eq!(read_color(&node), Some(Color::theme(4, -0.25)));
        let mut out = String::new();
        push_color(&mut out, "color", &Color::Indexed(64));
        assert_eq!(out, r#"<color indexed="64"/>"#);
    }
}
