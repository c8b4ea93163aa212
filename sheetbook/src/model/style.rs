//! Immutable style records
//!
//! A [`Style`] is a plain value. Cells never own one directly: they hold a
//! [`StyleId`](crate::StyleId) into the workbook's style pool, and every
//! change produces (or finds) another pooled record.

use ordered_float::OrderedFloat;
use std::sync::OnceLock;

/// Color as stored in the package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    /// 0xAARRGGBB
    Argb(u32),
    /// Theme palette slot with a tint in [-1, 1]
    Theme { index: u32, tint: OrderedFloat<f64> },
    /// Legacy indexed palette
    Indexed(u32),
    Auto,
}

impl Color {
    pub const BLACK: Color = Color::Argb(0xFF00_0000);
    pub const WHITE: Color = Color::Argb(0xFFFF_FFFF);
    pub const RED: Color = Color::Argb(0xFFFF_0000);
    pub const GREEN: Color = Color::Argb(0xFF00_8000);
    pub const BLUE: Color = Color::Argb(0xFF00_00FF);
    pub const YELLOW: Color = Color::Argb(0xFFFF_FF00);
    pub const HYPERLINK: Color = Color::Argb(0xFF05_63C1);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color::Argb(0xFF00_0000 | (r as u32) << 16 | (g as u32) << 8 | b as u32)
    }

    pub fn theme(index: u32, tint: f64) -> Self {
        Color::Theme {
            index,
            tint: OrderedFloat(tint),
        }
    }

    /// Parse "FFRRGGBB" or "RRGGBB"
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        let value = u32::from_str_radix(hex, 16).ok()?;
        match hex.len() {
            8 => Some(Color::Argb(value)),
            6 => Some(Color::Argb(0xFF00_0000 | value)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Underline {
    #[default]
    None,
    Single,
    Double,
    SingleAccounting,
    DoubleAccounting,
}

impl Underline {
    pub(crate) fn as_xml(&self) -> Option<&'static str> {
        match self {
            Underline::None => None,
            Underline::Single => Some("single"),
            Underline::Double => Some("double"),
            Underline::SingleAccounting => Some("singleAccounting"),
            Underline::DoubleAccounting => Some("doubleAccounting"),
        }
    }

    pub(crate) fn from_xml(value: &str) -> Self {
        match value {
            "double" => Underline::Double,
            "singleAccounting" => Underline::SingleAccounting,
            "doubleAccounting" => Underline::DoubleAccounting,
            "none" => Underline::None,
            _ => Underline::Single,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VerticalTextAlign {
    #[default]
    Baseline,
    Superscript,
    Subscript,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Font {
    pub name: String,
    /// Points
    pub size: OrderedFloat<f64>,
    pub bold: bool,
    pub italic: bool,
    pub underline: Underline,
    pub strikethrough: bool,
    pub vertical_align: VerticalTextAlign,
    pub color: Option<Color>,
}

impl Default for Font {
    fn default() -> Self {
        Self {
            name: "Calibri".to_string(),
            size: OrderedFloat(11.0),
            bold: false,
            italic: false,
            underline: Underline::None,
            strikethrough: false,
            vertical_align: VerticalTextAlign::Baseline,
            color: None,
        }
    }
}

impl Font {
    pub fn new(name: impl Into<String>, size: f64) -> Self {
        Self {
            name: name.into(),
            size: OrderedFloat(size),
            ..Self::default()
        }
    }

    pub fn size_points(&self) -> f64 {
        self.size.0
    }

    pub fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_underline(mut self, underline: Underline) -> Self {
        self.underline = underline;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FillPattern {
    #[default]
    None,
    Solid,
    MediumGray,
    DarkGray,
    LightGray,
    DarkHorizontal,
    DarkVertical,
    DarkDown,
    DarkUp,
    DarkGrid,
    DarkTrellis,
    LightHorizontal,
    LightVertical,
    LightDown,
    LightUp,
    LightGrid,
    LightTrellis,
    Gray125,
    Gray0625,
}

const FILL_PATTERNS: [(FillPattern, &str); 19] = [
    (FillPattern::None, "none"),
    (FillPattern::Solid, "solid"),
    (FillPattern::MediumGray, "mediumGray"),
    (FillPattern::DarkGray, "darkGray"),
    (FillPattern::LightGray, "lightGray"),
    (FillPattern::DarkHorizontal, "darkHorizontal"),
    (FillPattern::DarkVertical, "darkVertical"),
    (FillPattern::DarkDown, "darkDown"),
    (FillPattern::DarkUp, "darkUp"),
    (FillPattern::DarkGrid, "darkGrid"),
    (FillPattern::DarkTrellis, "darkTrellis"),
    (FillPattern::LightHorizontal, "lightHorizontal"),
    (FillPattern::LightVertical, "lightVertical"),
    (FillPattern::LightDown, "lightDown"),
    (FillPattern::LightUp, "lightUp"),
    (FillPattern::LightGrid, "lightGrid"),
    (FillPattern::LightTrellis, "lightTrellis"),
    (FillPattern::Gray125, "gray125"),
    (FillPattern::Gray0625, "gray0625"),
];

impl FillPattern {
    pub(crate) fn as_xml(&self) -> &'static str {
        FILL_PATTERNS
            .iter()
            .find(|(p, _)| p == self)
            .map(|(_, name)| *name)
            .unwrap_or("none")
    }

    pub(crate) fn from_xml(value: &str) -> Self {
        FILL_PATTERNS
            .iter()
            .find(|(_, name)| *name == value)
            .map(|(p, _)| *p)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Fill {
    pub pattern: FillPattern,
    pub foreground: Option<Color>,
    pub background: Option<Color>,
}

impl Fill {
    /// Solid fill; the package stores the visible color as the pattern
    /// foreground
    pub fn solid(color: Color) -> Self {
        Self {
            pattern: FillPattern::Solid,
            foreground: Some(color),
            background: None,
        }
    }

    pub fn pattern(pattern: FillPattern, foreground: Color, background: Color) -> Self {
        Self {
            pattern,
            foreground: Some(foreground),
            background: Some(background),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LineStyle {
    #[default]
    None,
    Thin,
    Medium,
    Dashed,
    Dotted,
    Thick,
    Double,
    Hair,
    MediumDashed,
    DashDot,
    MediumDashDot,
    DashDotDot,
    MediumDashDotDot,
    SlantDashDot,
}

const LINE_STYLES: [(LineStyle, &str); 14] = [
    (LineStyle::None, "none"),
    (LineStyle::Thin, "thin"),
    (LineStyle::Medium, "medium"),
    (LineStyle::Dashed, "dashed"),
    (LineStyle::Dotted, "dotted"),
    (LineStyle::Thick, "thick"),
    (LineStyle::Double, "double"),
    (LineStyle::Hair, "hair"),
    (LineStyle::MediumDashed, "mediumDashed"),
    (LineStyle::DashDot, "dashDot"),
    (LineStyle::MediumDashDot, "mediumDashDot"),
    (LineStyle::DashDotDot, "dashDotDot"),
    (LineStyle::MediumDashDotDot, "mediumDashDotDot"),
    (LineStyle::SlantDashDot, "slantDashDot"),
];

impl LineStyle {
    pub(crate) fn as_xml(&self) -> &'static str {
        LINE_STYLES
            .iter()
            .find(|(s, _)| s == self)
            .map(|(_, name)| *name)
            .unwrap_or("none")
    }

    pub(crate) fn from_xml(value: &str) -> Self {
        LINE_STYLES
            .iter()
            .find(|(_, name)| *name == value)
            .map(|(s, _)| *s)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BorderLine {
    pub style: LineStyle,
    pub color: Option<Color>,
}

impl BorderLine {
    pub fn new(style: LineStyle, color: Color) -> Self {
        Self {
            style,
            color: Some(color),
        }
    }

    pub fn is_none(&self) -> bool {
        self.style == LineStyle::None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Border {
    pub left: BorderLine,
    pub right: BorderLine,
    pub top: BorderLine,
    pub bottom: BorderLine,
    pub diagonal: BorderLine,
    pub diagonal_up: bool,
    pub diagonal_down: bool,
}

impl Border {
    pub fn all(line: BorderLine) -> Self {
        Self {
            left: line,
            right: line,
            top: line,
            bottom: line,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HorizontalAlignment {
    #[default]
    General,
    Left,
    Center,
    Right,
    Fill,
    Justify,
    CenterContinuous,
    Distributed,
}

const HORIZONTAL: [(HorizontalAlignment, &str); 8] = [
    (HorizontalAlignment::General, "general"),
    (HorizontalAlignment::Left, "left"),
    (HorizontalAlignment::Center, "center"),
    (HorizontalAlignment::Right, "right"),
    (HorizontalAlignment::Fill, "fill"),
    (HorizontalAlignment::Justify, "justify"),
    (HorizontalAlignment::CenterContinuous, "centerContinuous"),
    (HorizontalAlignment::Distributed, "distributed"),
];

impl HorizontalAlignment {
    pub(crate) fn as_xml(&self) -> &'static str {
        HORIZONTAL
            .iter()
            .find(|(a, _)| a == self)
            .map(|(_, name)| *name)
            .unwrap_or("general")
    }

    pub(crate) fn from_xml(value: &str) -> Self {
        HORIZONTAL
            .iter()
            .find(|(_, name)| *name == value)
            .map(|(a, _)| *a)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VerticalAlignment {
    #[default]
    Bottom,
    Top,
    Center,
    Justify,
    Distributed,
}

impl VerticalAlignment {
    pub(crate) fn as_xml(&self) -> &'static str {
        match self {
            VerticalAlignment::Bottom => "bottom",
            VerticalAlignment::Top => "top",
            VerticalAlignment::Center => "center",
            VerticalAlignment::Justify => "justify",
            VerticalAlignment::Distributed => "distributed",
        }
    }

    pub(crate) fn from_xml(value: &str) -> Self {
        match value {
            "top" => VerticalAlignment::Top,
            "center" => VerticalAlignment::Center,
            "justify" => VerticalAlignment::Justify,
            "distributed" => VerticalAlignment::Distributed,
            _ => VerticalAlignment::Bottom,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Alignment {
    pub horizontal: HorizontalAlignment,
    pub vertical: VerticalAlignment,
    pub wrap_text: bool,
    pub shrink_to_fit: bool,
    pub indent: u32,
    /// Degrees, 0..=180, or 255 for stacked text
    pub text_rotation: u32,
}

impl Alignment {
    pub fn is_default(&self) -> bool {
        *self == Alignment::default()
    }
}

/// Lock state used once the sheet is protected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellProtection {
    pub locked: bool,
    pub hidden: bool,
}

impl Default for CellProtection {
    fn default() -> Self {
        Self {
            locked: true,
            hidden: false,
        }
    }
}

/// Complete formatting of a cell
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Style {
    pub font: Font,
    pub fill: Fill,
    pub border: Border,
    pub alignment: Alignment,
    /// Number format code, "General" when unformatted
    pub number_format: String,
    pub protection: CellProtection,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            font: Font::default(),
            fill: Fill::default(),
            border: Border::default(),
            alignment: Alignment::default(),
            number_format: "General".to_string(),
            protection: CellProtection::default(),
        }
    }
}

impl Style {
    /// Process-wide default record
    pub fn default_ref() -> &'static Style {
        static DEFAULT: OnceLock<Style> = OnceLock::new();
        DEFAULT.get_or_init(Style::default)
    }

    /// Default style with the given base font
    pub fn with_font(font: Font) -> Self {
        Self {
            font,
            ..Self::default()
        }
    }

    pub fn has_general_format(&self) -> bool {
        self.number_format.is_empty() || self.number_format.eq_ignore_ascii_case("General")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_from_hex() {
        assert_eq!(Color::from_hex("FF112233"), Some(Color::Argb(0xFF11_2233)));
        assert_eq!(Color::from_hex("#112233"), Some(Color::Argb(0xFF11_2233)));
        assert_eq!(Color::from_hex("12345"), None);
        assert_eq!(Color::rgb(255, 0, 0), Color::RED);
    }

    #[test]
    fn test_xml_names_round_trip() {
        for (pattern, name) in FILL_PATTERNS {
            assert_eq!(FillPattern::from_xml(name), pattern);
            assert_eq!(pattern.as_xml(), name);
        }
        for (style, name) in LINE_STYLES {
            assert_eq!(LineStyle::from_xml(name), style);
        }
        assert_eq!(HorizontalAlignment::from_xml("centerContinuous").as_xml(), "centerContinuous");
    }

    #[test]
    fn test_styles_compare_by_value() {
        let a = Style::with_font(Font::default().bold());
        let mut b = Style::default();
        b.font.bold = true;
        assert_eq!(a, b);
        assert_ne!(a, *Style::default_ref());
    }
}
