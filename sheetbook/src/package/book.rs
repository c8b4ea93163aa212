//! `xl/workbook.xml`

use super::xml::{XML_DECLARATION, XmlNode, push_attr, schema_position, text};
use crate::model::{DefinedName, PreservedElement, Visibility, Workbook};
use anyhow::{Context, Result};

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const CALC_ID: &str = "191029";
const FILTER_DATABASE: &str = "_xlnm._FilterDatabase";

const WORKBOOK_ORDER: &[&str] = &[
    "fileVersion",
    "fileSharing",
    "workbookPr",
    "workbookProtection",
    "bookViews",
    "sheets",
    "functionGroups",
    "externalReferences",
    "definedNames",
    "calcPr",
    "oleSize",
    "customWorkbookViews",
    "pivotCaches",
    "smartTagPr",
    "smartTagTypes",
    "webPublishing",
    "fileRecoveryPr",
    "webPublishObjects",
    "extLst",
];

const MANAGED: &[&str] = &["workbookPr", "bookViews", "sheets", "definedNames", "calcPr"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SheetEntry {
    pub name: String,
    pub sheet_id: u32,
    pub rel_id: String,
    pub visibility: Visibility,
}

/// What the engine takes from `workbook.xml`
#[derive(Debug, Default)]
pub(crate) struct WorkbookInfo {
    pub date1904: bool,
    pub active_tab: usize,
    pub sheets: Vec<SheetEntry>,
    pub defined_names: Vec<DefinedName>,
    pub preserved: Vec<PreservedElement>,
}

pub(crate) fn read_workbook_part(xml: &[u8]) -> Result<WorkbookInfo> {
    let root = XmlNode::parse(xml)?;
    let mut info = WorkbookInfo {
        date1904: root
            .child("workbookPr")
            .is_some_and(|pr| pr.attr_bool("date1904", false)),
        active_tab: root
            .child("bookViews")
            .and_then(|v| v.child("workbookView"))
            .and_then(|v| v.attr_u32("activeTab"))
            .unwrap_or(0) as usize,
        ..WorkbookInfo::default()
    };

    let sheets = root.child("sheets").context("workbook lists no sheets")?;
    for sheet in sheets.children_named("sheet") {
        let name = sheet.attr("name").context("sheet without a name")?;
        let rel_id = sheet.prefixed_attr("id").context("sheet without a relationship")?;
        info.sheets.push(SheetEntry {
            name: name.to_string(),
            sheet_id: sheet.attr_u32("sheetId").unwrap_or(0),
            rel_id: rel_id.to_string(),
            visibility: match sheet.attr("state") {
                Some("hidden") => Visibility::Hidden,
                Some("veryHidden") => Visibility::VeryHidden,
                _ => Visibility::Visible,
            },
        });
    }

    if let Some(names) = root.child("definedNames") {
        for name in names.children_named("definedName") {
            let Some(label) = name.attr("name") else {
                continue;
            };
            if label.eq_ignore_ascii_case(FILTER_DATABASE) {
                continue;
            }
            let formula = name.text();
            let formula = formula.trim();
            info.defined_names.push(DefinedName {
                name: label.to_string(),
                formula: formula.strip_prefix('=').unwrap_or(formula).to_string(),
                local_sheet: name.attr_u32("localSheetId").map(|i| i as usize),
                hidden: name.attr_bool("hidden", false),
            });
        }
    }

    for child in root.elements() {
        let local = child.local_name();
        if !MANAGED.contains(&local) {
            info.preserved.push(PreservedElement {
                name: local.to_string(),
                xml: child.detach(&root).to_xml(),
            });
        }
    }
    Ok(info)
}

/// `sheet_rel_ids[i]` is the relationship id of worksheet `i`
pub(crate) fn workbook_xml(
    book: &Workbook,
    preserved: &[PreservedElement],
    sheet_rel_ids: &[String],
    full_calc_on_load: bool,
) -> String {
    let mut parts: Vec<(usize, String)> = Vec::new();
    let mut place = |name: &str, xml: String| parts.push((schema_position(WORKBOOK_ORDER, name), xml));

    place(
        "workbookPr",
        if book.date1904 {
            r#"<workbookPr date1904="1" defaultThemeVersion="166925"/>"#.to_string()
        } else {
            r#"<workbookPr defaultThemeVersion="166925"/>"#.to_string()
        },
    );
    place(
        "bookViews",
        match book.active_sheet {
            0 => "<bookViews><workbookView/></bookViews>".to_string(),
            n => format!(r#"<bookViews><workbookView activeTab="{}"/></bookViews>"#, n),
        },
    );

    let mut sheets = String::from("<sheets>");
    for (sheet, rel_id) in book.sheets.iter().zip(sheet_rel_ids) {
        sheets.push_str("<sheet");
        push_attr(&mut sheets, "name", &sheet.name);
        push_attr(&mut sheets, "sheetId", &sheet.sheet_id.to_string());
        match sheet.visibility {
            Visibility::Visible => {}
            Visibility::Hidden => push_attr(&mut sheets, "state", "hidden"),
            Visibility::VeryHidden => push_attr(&mut sheets, "state", "veryHidden"),
        }
        push_attr(&mut sheets, "r:id", rel_id);
        sheets.push_str("/>");
    }
    sheets.push_str("</sheets>");
    place("sheets", sheets);

    if !book.defined_names.is_empty() {
        let mut names = String::from("<definedNames>");
        for name in &book.defined_names {
            names.push_str("<definedName");
            push_attr(&mut names, "name", &name.name);
            if let Some(sheet) = name.local_sheet {
                push_attr(&mut names, "localSheetId", &sheet.to_string());
            }
            if name.hidden {
                push_attr(&mut names, "hidden", "1");
            }
            names.push('>');
            names.push_str(&text(&name.formula));
            names.push_str("</definedName>");
        }
        names.push_str("</definedNames>");
        place("definedNames", names);
    }

    place(
        "calcPr",
        if full_calc_on_load {
            format!(r#"<calcPr calcId="{}" fullCalcOnLoad="1"/>"#, CALC_ID)
        } else {
            format!(r#"<calcPr calcId="{}"/>"#, CALC_ID)
        },
    );

    for element in preserved {
        place(&element.name, element.xml.clone());
    }
    parts.sort_by_key(|(position, _)| *position);

    let mut out = String::from(XML_DECLARATION);
    out.push_str(&format!(r#"<workbook xmlns="{}" xmlns:r="{}">"#, MAIN_NS, REL_NS));
    for (_, xml) in parts {
        out.push_str(&xml);
    }
    out.push_str("</workbook>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_skips_filter_database_and_keeps_unknown_elements() {
        let xml = br#"<workbook xmlns="m" xmlns:r="r" xmlns:x15="urn:x15">
            <fileVersion appName="xl"/>
            <workbookPr date1904="1"/>
            <bookViews><workbookView activeTab="1"/></bookViews>
            <sheets><sheet name="A" sheetId="4" r:id="rId2"/><sheet name="B" sheetId="7" state="hidden" r:id="rId1"/></sheets>
            <definedNames>
              <definedName name="_xlnm._FilterDatabase" localSheetId="0" hidden="1">A!$A$1:$B$4</definedName>
              <definedName name="Rate">=B!$C$1</definedName>
            </definedNames>
            <extLst><ext uri="u"><x15:workbookPr chartTrackingRefBase="1"/></ext></extLst>
        </workbook>"#;
        let info = read_workbook_part(xml).unwrap();
        assert!(info.date1904);
        assert_eq!(info.active_tab, 1);
        assert_eq!(info.sheets[1].visibility, Visibility::Hidden);
        assert_eq!(info.sheets[1].sheet_id, 7);
        assert_eq!(info.defined_names.len(), 1);
        assert_eq!(info.defined_names[0].formula, "B!$C$1");
        let names: Vec<_> = info.preserved.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["fileVersion", "extLst"]);
        assert!(info.preserved[1].xml.contains(r#"xmlns:x15="urn:x15""#));
    }

    #[test]
    fn test_written_elements_follow_schema_order() {
        let mut book = Workbook::new();
        book.add_defined_name("Rate", "Sheet1!$A$1", None).unwrap();
        let preserved = vec![
            PreservedElement {
                name: "extLst".to_string(),
                xml: "<extLst/>".to_string(),
            },
            PreservedElement {
                name: "fileVersion".to_string(),
                xml: r#"<fileVersion appName="xl"/>"#.to_string(),
            },
        ];
        let xml = workbook_xml(&book, &preserved, &["rId1".to_string()], true);
        let at = |needle: &str| xml.find(needle).unwrap();
        assert!(at("<fileVersion") < at("<workbookPr"));
        assert!(at("<sheets>") < at("<definedNames>"));
        assert!(at(r#"fullCalcOnLoad="1""#) < at("<extLst/>"));
        assert!(xml.contains(r#"<sheet name="Sheet1" sheetId="1" r:id="rId1"/>"#));

        let info = read_workbook_part(xml.as_bytes()).unwrap();
        assert_eq!(info.defined_names, book.defined_names);
    }
}
