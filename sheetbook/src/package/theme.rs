//! Theme part written for workbooks that did not come with one

use super::xml::XML_DECLARATION;

const COLORS: [(&str, &str); 12] = [
    ("dk1", r#"<a:sysClr val="windowText" lastClr="000000"/>"#),
    ("lt1", r#"<a:sysClr val="window" lastClr="FFFFFF"/>"#),
    ("dk2", r#"<a:srgbClr val="44546A"/>"#),
    ("lt2", r#"<a:srgbClr val="E7E6E6"/>"#),
    ("accent1", r#"<a:srgbClr val="4472C4"/>"#),
    ("accent2", r#"<a:srgbClr val="ED7D31"/>"#),
    ("accent3", r#"<a:srgbClr val="A5A5A5"/>"#),
    ("accent4", r#"<a:srgbClr val="FFC000"/>"#),
    ("accent5", r#"<a:srgbClr val="5B9BD5"/>"#),
    ("accent6", r#"<a:srgbClr val="70AD47"/>"#),
    ("hlink", r#"<a:srgbClr val="0563C1"/>"#),
    ("folHlink", r#"<a:srgbClr val="954F72"/>"#),
];

const SOLID_FILL: &str = r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#;

pub(crate) fn default_theme(font_name: &str) -> String {
    let mut out = String::from(XML_DECLARATION);
    out.push_str(r#"<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Office Theme"><a:themeElements>"#);
    out.push_str(r#"<a:clrScheme name="Office">"#);
    for (slot, color) in COLORS {
        out.push_str(&format!("<a:{slot}>{color}</a:{slot}>"));
    }
    out.push_str("</a:clrScheme>");

    let font = super::xml::text(font_name);
    out.push_str(&format!(
        r#"<a:fontScheme name="Office"><a:majorFont><a:latin typeface="{font} Light"/><a:ea typeface=""/><a:cs typeface=""/></a:majorFont><a:minorFont><a:latin typeface="{font}"/><a:ea typeface=""/><a:cs typeface=""/></a:minorFont></a:fontScheme>"#
    ));

    out.push_str(r#"<a:fmtScheme name="Office"><a:fillStyleLst>"#);
    out.push_str(&SOLID_FILL.repeat(3));
    out.push_str("</a:fillStyleLst><a:lnStyleLst>");
    for width in [6350, 12700, 19050] {
        out.push_str(&format!(
            r#"<a:ln w="{width}" cap="flat" cmpd="sng" algn="ctr">{SOLID_FILL}<a:prstDash val="solid"/><a:miter lim="800000"/></a:ln>"#
        ));
    }
    out.push_str("</a:lnStyleLst><a:effectStyleLst>");
    out.push_str(&"<a:effectStyle><a:effectLst/></a:effectStyle>".repeat(3));
    out.push_str("</a:effectStyleLst><a:bgFillStyleLst>");
    out.push_str(&SOLID_FILL.repeat(3));
    out.push_str("</a:bgFillStyleLst></a:fmtScheme>");
    out.push_str("</a:themeElements><a:objectDefaults/><a:extraClrSchemeLst/></a:theme>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::xml::XmlNode;

    #[test]
    fn test_default_theme_is_well_formed() {
        let xml = default_theme("Calibri");
        let root = XmlNode::parse(xml.as_bytes()).unwrap();
        let scheme = root.descendant("clrScheme").unwrap();
        assert_eq!(scheme.elements().count(), 12);
        assert_eq!(root.descendant("minorFont").unwrap().child("latin").unwrap().attr("typeface"), Some("Calibri"));
    }
}
