//! Number formats and display text
//!
//! Produces the text a spreadsheet would show for a value under a format
//! code. Used for autofit measurement and for text coercion of numbers in
//! formulas; it is not a full implementation of the format language.

use super::date::{serial_to_datetime, serial_to_duration};
use super::value::CellValue;
use super::date::{datetime_to_serial, duration_to_serial};
use chrono::{Datelike, NaiveDateTime, Timelike};

/// Format codes with implicit ids in every package
const BUILTIN_FORMATS: [(u32, &str); 28] = [
    (0, "General"),
    (1, "0"),
    (2, "0.00"),
    (3, "#,##0"),
    (4, "#,##0.00"),
    (9, "0%"),
    (10, "0.00%"),
    (11, "0.00E+00"),
    (12, "# ?/?"),
    (13, "# ??/??"),
    (14, "mm-dd-yy"),
    (15, "d-mmm-yy"),
    (16, "d-mmm"),
    (17, "mmm-yy"),
    (18, "h:mm AM/PM"),
    (19, "h:mm:ss AM/PM"),
    (20, "h:mm"),
    (21, "h:mm:ss"),
    (22, "m/d/yy h:mm"),
    (37, "#,##0 ;(#,##0)"),
    (38, "#,##0 ;[Red](#,##0)"),
    (39, "#,##0.00;(#,##0.00)"),
    (40, "#,##0.00;[Red](#,##0.00)"),
    (45, "mm:ss"),
    (46, "[h]:mm:ss"),
    (47, "mmss.0"),
    (48, "##0.0E+0"),
    (49, "@"),
];

/// First id available to custom format codes
pub const FIRST_CUSTOM_FORMAT_ID: u32 = 164;

/// Format applied when a date is stored into an unformatted cell
pub const DEFAULT_DATE_FORMAT: &str = "yyyy-mm-dd";
pub const DEFAULT_DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";
pub const DEFAULT_DURATION_FORMAT: &str = "[h]:mm:ss";

pub fn builtin_format(id: u32) -> Option<&'static str> {
    BUILTIN_FORMATS
        .iter()
        .find(|(i, _)| *i == id)
        .map(|(_, code)| *code)
}

pub fn builtin_format_id(code: &str) -> Option<u32> {
    BUILTIN_FORMATS
        .iter()
        .find(|(_, c)| *c == code)
        .map(|(id, _)| *id)
}

/// What kind of temporal value a format displays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalKind {
    None,
    /// Has day, month or year parts
    DateTime,
    /// Time-of-day parts only, or elapsed `[h]`/`[m]`/`[s]`
    Duration,
}

/// Strip quoted literals, escapes and bracketed sections except elapsed
/// markers; lowercase the rest
fn format_skeleton(code: &str) -> String {
    let mut out = String::new();
    let mut chars = code.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                for d in chars.by_ref() {
                    if d == '"' {
                        break;
                    }
                }
            }
            '\\' | '_' | '*' => {
                chars.next();
            }
            '[' => {
                let mut inner = String::new();
                for d in chars.by_ref() {
                    if d == ']' {
                        break;
                    }
                    inner.push(d);
                }
                let lower = inner.to_ascii_lowercase();
                if !lower.is_empty() && lower.chars().all(|ch| matches!(ch, 'h' | 'm' | 's')) {
                    out.push('[');
                    out.push_str(&lower);
                    out.push(']');
                }
            }
            other => out.push(other.to_ascii_lowercase()),
        }
    }
    out
}

pub fn temporal_kind(code: &str) -> TemporalKind {
    let first_section = code.split(';').next().unwrap_or_default();
    let skeleton = format_skeleton(first_section);
    if skeleton.contains("[h") || skeleton.contains("[m") || skeleton.contains("[s") {
        return TemporalKind::Duration;
    }
    if skeleton.contains('y') || skeleton.contains('d') {
        return TemporalKind::DateTime;
    }
    let has_month_or_minute = skeleton.contains('m');
    if skeleton.contains('h') || skeleton.contains('s') {
        return TemporalKind::Duration;
    }
    if has_month_or_minute && !skeleton.contains('0') && !skeleton.contains('#') {
        return TemporalKind::DateTime;
    }
    TemporalKind::None
}

/// Text of a number in the General format: at most 11 significant digits
pub fn general_number(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if n.fract() == 0.0 && abs < 1e11 {
        return format!("{}", n as i64);
    }
    if !(1e-9..1e11).contains(&abs) {
        let formatted = format!("{:.5E}", n);
        let (mantissa, exponent) = formatted.split_once('E').unwrap_or((&formatted, "0"));
        let mantissa = trim_zeros(mantissa);
        let exp: i32 = exponent.parse().unwrap_or(0);
        let sign = if exp < 0 { '-' } else { '+' };
        return format!("{}E{}{:02}", mantissa, sign, exp.abs());
    }
    let int_digits = if abs >= 1.0 {
        abs.log10().floor() as i32 + 1
    } else {
        0
    };
    let decimals = (10 - int_digits).clamp(0, 10) as usize;
    trim_zeros(&format!("{:.*}", decimals, n)).to_string()
}

fn trim_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Display text for a cell value under `format`
pub fn format_value(value: &CellValue, format: &str, date1904: bool) -> String {
    match value {
        CellValue::Empty => String::new(),
        CellValue::Text(text) => text.plain_text(),
        CellValue::Boolean(true) => "TRUE".to_string(),
        CellValue::Boolean(false) => "FALSE".to_string(),
        CellValue::Error(e) => e.as_str().to_string(),
        CellValue::Number(n) => format_number(*n, format, date1904),
        CellValue::DateTime(dt) => {
            let code = if temporal_kind(format) == TemporalKind::None {
                DEFAULT_DATETIME_FORMAT
            } else {
                format
            };
            format_number(datetime_to_serial(*dt, date1904), code, date1904)
        }
        CellValue::Duration(d) => {
            let code = if temporal_kind(format) == TemporalKind::None {
                DEFAULT_DURATION_FORMAT
            } else {
                format
            };
            format_number(duration_to_serial(*d), code, date1904)
        }
    }
}

pub fn format_number(n: f64, format: &str, date1904: bool) -> String {
    if format.is_empty() || format.eq_ignore_ascii_case("General") {
        return general_number(n);
    }
    if format == "@" {
        return general_number(n);
    }
    let sections: Vec<&str> = format.split(';').collect();
    let (section, negate) = if n < 0.0 && sections.len() > 1 {
        (sections[1], true)
    } else if n == 0.0 && sections.len() > 2 {
        (sections[2], false)
    } else {
        (sections[0], false)
    };
    let value = if negate { -n } else { n };
    match temporal_kind(section) {
        TemporalKind::None => format_plain_number(value, section),
        _ => format_temporal(value, section, date1904),
    }
}

/// Digit placeholders, grouping, percent, scientific and literal text
fn format_plain_number(n: f64, section: &str) -> String {
    let mut prefix = String::new();
    let mut suffix = String::new();
    let mut pattern = String::new();
    let mut chars = section.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                let target = if pattern.is_empty() { &mut prefix } else { &mut suffix };
                for d in chars.by_ref() {
                    if d == '"' {
                        break;
                    }
                    target.push(d);
                }
            }
            '\\' => {
                if let Some(d) = chars.next() {
                    if pattern.is_empty() {
                        prefix.push(d);
                    } else {
                        suffix.push(d);
                    }
                }
            }
            '[' => {
                for d in chars.by_ref() {
                    if d == ']' {
                        break;
                    }
                }
            }
            '_' | '*' => {
                chars.next();
                if c == '_' {
                    if pattern.is_empty() {
                        prefix.push(' ');
                    } else {
                        suffix.push(' ');
                    }
                }
            }
            '0' | '#' | '?' | '.' | ',' | 'E' | 'e' | '+' | '-' if !pattern.is_empty() || "0#?.".contains(c) => {
                if !suffix.is_empty() {
                    suffix.push(c);
                } else {
                    pattern.push(c);
                }
            }
            '%' => suffix.push('%'),
            other => {
                if pattern.is_empty() {
                    prefix.push(other);
                } else {
                    suffix.push(other);
                }
            }
        }
    }
    if pattern.is_empty() {
        return format!("{}{}", prefix, suffix);
    }
    let mut value = n;
    if suffix.contains('%') {
        value *= 100.0;
    }
    if let Some(pos) = pattern.find(['E', 'e']) {
        let decimals = pattern[..pos]
            .split_once('.')
            .map(|(_, d)| d.len())
            .unwrap_or(0);
        let formatted = format!("{:.*E}", decimals, value);
        let (mantissa, exponent) = formatted.split_once('E').unwrap_or((&formatted, "0"));
        let exp: i32 = exponent.parse().unwrap_or(0);
        let sign = if exp < 0 { '-' } else { '+' };
        return format!("{}{}E{}{:02}{}", prefix, mantissa, sign, exp.abs(), suffix);
    }
    let grouping = pattern.split('.').next().unwrap_or_default().contains(',');
    let decimals = pattern
        .split_once('.')
        .map(|(_, d)| d.chars().filter(|c| matches!(c, '0' | '#' | '?')).count())
        .unwrap_or(0);
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((&formatted, ""));
    let int_part = if grouping { group_thousands(int_part) } else { int_part.to_string() };
    let sign = if value < 0.0 && formatted.chars().any(|c| c != '0' && c != '.') {
        "-"
    } else {
        ""
    };
    if frac_part.is_empty() {
        format!("{}{}{}{}", sign, prefix, int_part, suffix)
    } else {
        format!("{}{}{}.{}{}", sign, prefix, int_part, frac_part, suffix)
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
enum DateToken {
    Literal(String),
    Year(usize),
    Month(usize),
    Day(usize),
    Hour(usize),
    Minute(usize),
    Second(usize),
    Elapsed(char),
    AmPm,
}

fn tokenize_temporal(section: &str) -> Vec<DateToken> {
    let chars: Vec<char> = section.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let run = |ch: char| chars[i..].iter().take_while(|x| x.eq_ignore_ascii_case(&ch)).count();
        match c.to_ascii_lowercase() {
            '"' => {
                let end = chars[i + 1..].iter().position(|x| *x == '"').map_or(chars.len(), |p| i + 1 + p);
                tokens.push(DateToken::Literal(chars[i + 1..end].iter().collect()));
                i = end + 1;
            }
            '\\' => {
                if let Some(next) = chars.get(i + 1) {
                    tokens.push(DateToken::Literal(next.to_string()));
                }
                i += 2;
            }
            '[' => {
                let end = chars[i..].iter().position(|x| *x == ']').map_or(chars.len(), |p| i + p);
                let inner: String = chars[i + 1..end].iter().collect::<String>().to_ascii_lowercase();
                if let Some(first) = inner.chars().next()
                    && inner.chars().all(|ch| ch == first)
                    && matches!(first, 'h' | 'm' | 's')
                {
                    tokens.push(DateToken::Elapsed(first));
                }
                i = end + 1;
            }
            'y' => {
                let n = run('y');
                tokens.push(DateToken::Year(n));
                i += n;
            }
            'd' => {
                let n = run('d');
                tokens.push(DateToken::Day(n));
                i += n;
            }
            'h' => {
                let n = run('h');
                tokens.push(DateToken::Hour(n));
                i += n;
            }
            's' => {
                let n = run('s');
                tokens.push(DateToken::Second(n));
                i += n;
            }
            'm' => {
                let n = run('m');
                tokens.push(DateToken::Month(n));
                i += n;
            }
            'a' if chars[i..].iter().take(5).collect::<String>().eq_ignore_ascii_case("AM/PM") => {
                tokens.push(DateToken::AmPm);
                i += 5;
            }
            _ => {
                tokens.push(DateToken::Literal(c.to_string()));
                i += 1;
            }
        }
    }
    // `m` right after an hour or right before a second means minutes
    for k in 0..tokens.len() {
        if let DateToken::Month(n) = tokens[k]
            && n <= 2
        {
            let after_hour = tokens[..k]
                .iter()
                .rev()
                .find(|t| !matches!(t, DateToken::Literal(_)))
                .is_some_and(|t| matches!(t, DateToken::Hour(_) | DateToken::Elapsed('h')));
            let before_second = tokens[k + 1..]
                .iter()
                .find(|t| !matches!(t, DateToken::Literal(_)))
                .is_some_and(|t| matches!(t, DateToken::Second(_) | DateToken::Elapsed('s')));
            if after_hour || before_second {
                tokens[k] = DateToken::Minute(n);
            }
        }
    }
    tokens
}

fn format_temporal(serial: f64, section: &str, date1904: bool) -> String {
    let tokens = tokenize_temporal(section);
    let Some(dt) = serial_to_datetime(serial.max(0.0), date1904) else {
        return general_number(serial);
    };
    let twelve_hour = tokens.contains(&DateToken::AmPm);
    let total_seconds = serial_to_duration(serial)
        .map(|d| d.num_seconds())
        .unwrap_or_default();
    let mut out = String::new();
    for token in &tokens {
        match token {
            DateToken::Literal(s) => out.push_str(s),
            DateToken::Year(n) if *n <= 2 => out.push_str(&format!("{:02}", dt.year() % 100)),
            DateToken::Year(_) => out.push_str(&format!("{:04}", dt.year())),
            DateToken::Month(1) => out.push_str(&dt.month().to_string()),
            DateToken::Month(2) => out.push_str(&format!("{:02}", dt.month())),
            DateToken::Month(3) => out.push_str(&dt.format("%b").to_string()),
            DateToken::Month(4) => out.push_str(&dt.format("%B").to_string()),
            DateToken::Month(_) => out.push_str(&dt.format("%B").to_string()[..1]),
            DateToken::Day(1) => out.push_str(&dt.day().to_string()),
            DateToken::Day(2) => out.push_str(&format!("{:02}", dt.day())),
            DateToken::Day(3) => out.push_str(&dt.format("%a").to_string()),
            DateToken::Day(_) => out.push_str(&dt.format("%A").to_string()),
            DateToken::Hour(n) => {
                let hour = if twelve_hour {
                    match dt.hour() % 12 {
                        0 => 12,
                        h => h,
                    }
                } else {
                    dt.hour()
                };
                out.push_str(&pad(hour as i64, *n));
            }
            DateToken::Minute(n) => out.push_str(&pad(dt.minute() as i64, *n)),
            DateToken::Second(n) => out.push_str(&pad(dt.second() as i64, *n)),
            DateToken::Elapsed('h') => out.push_str(&(total_seconds / 3600).to_string()),
            DateToken::Elapsed('m') => out.push_str(&(total_seconds / 60).to_string()),
            DateToken::Elapsed(_) => out.push_str(&total_seconds.to_string()),
            DateToken::AmPm => out.push_str(if dt.hour() < 12 { "AM" } else { "PM" }),
        }
    }
    out
}

fn pad(value: i64, width: usize) -> String {
    if width >= 2 {
        format!("{:02}", value)
    } else {
        value.to_string()
    }
}

/// Timestamp text used by threaded comments
pub(crate) fn iso_timestamp(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_builtin_table() {
        assert_eq!(builtin_format(14), Some("mm-dd-yy"));
        assert_eq!(builtin_format_id("[h]:mm:ss"), Some(46));
        assert_eq!(builtin_format(163), None);
    }

    #[test]
    fn test_temporal_kind() {
        assert_eq!(temporal_kind("yyyy-mm-dd"), TemporalKind::DateTime);
        assert_eq!(temporal_kind("m/d/yy h:mm"), TemporalKind::DateTime);
        assert_eq!(temporal_kind("[h]:mm:ss"), TemporalKind::Duration);
        assert_eq!(temporal_kind("h:mm AM/PM"), TemporalKind::Duration);
        assert_eq!(temporal_kind("#,##0.00"), TemporalKind::None);
        assert_eq!(temporal_kind("[Red]0.00"), TemporalKind::None);
        assert_eq!(temporal_kind("\"days\" 0"), TemporalKind::None);
        assert_eq!(temporal_kind("General"), TemporalKind::None);
    }

    #[test]
    fn test_general_number() {
        assert_eq!(general_number(52000.0), "52000");
        assert_eq!(general_number(3.5), "3.5");
        assert_eq!(general_number(1.0 / 3.0), "0.3333333333");
        assert_eq!(general_number(-0.25), "-0.25");
        assert_eq!(general_number(1.5e12), "1.5E+12");
    }

    #[test]
    fn test_number_formats() {
        assert_eq!(format_number(1234.567, "#,##0.00", false), "1,234.57");
        assert_eq!(format_number(0.256, "0.0%", false), "25.6%");
        assert_eq!(format_number(-5.0, "0.00;(0.00)", false), "(5.00)");
        assert_eq!(format_number(42.0, "\"$\"#,##0", false), "$42");
        assert_eq!(format_number(12345.0, "0.00E+00", false), "1.23E+04");
    }

    #[test]
    fn test_date_formats() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 7, 9)
            .unwrap();
        let serial = datetime_to_serial(dt, false);
        assert_eq!(format_number(serial, "yyyy-mm-dd", false), "2024-03-05");
        assert_eq!(format_number(serial, "d-mmm-yy", false), "5-Mar-24");
        assert_eq!(format_number(serial, "h:mm AM/PM", false), "2:07 PM");
        assert_eq!(format_number(serial, "hh:mm:ss", false), "14:07:09");
        assert_eq!(format_number(1.5, "[h]:mm:ss", false), "36:00:00");
        let value = CellValue::DateTime(dt);
        assert_eq!(format_value(&value, "General", false), "2024-03-05 14:07:09");
    }
}
