//! Table parts (`xl/tables/tableN.xml`)

use super::xml::{XML_DECLARATION, XmlNode, bool_str, push_attr};
use crate::address::CellRange;
use crate::model::{ColumnFilter, Table, TableColumn};
use anyhow::{Context, Result};

pub(crate) fn read_table(xml: &[u8]) -> Result<Table> {
    let root = XmlNode::parse(xml)?;
    let name = root
        .attr("displayName")
        .or_else(|| root.attr("name"))
        .context("table without a name")?
        .to_string();
    let range = CellRange::parse(root.attr("ref").context("table without a range")?)?;
    let auto_filter = root.child("autoFilter");
    let mut columns: Vec<TableColumn> = root
        .child("tableColumns")
        .map(|cols| {
            cols.children_named("tableColumn")
                .map(|c| TableColumn {
                    name: c.attr("name").unwrap_or_default().to_string(),
                    filter: None,
                    totals_label: c.attr("totalsRowLabel").map(str::to_string),
                })
                .collect()
        })
        .unwrap_or_default();
    if let Some(filter) = auto_filter {
        for column in filter.children_named("filterColumn") {
            let Some(slot) = column.attr_u32("colId").and_then(|i| columns.get_mut(i as usize)) else {
                continue;
            };
            let values = column
                .child("filters")
                .map(|f| {
                    f.children_named("filter")
                        .filter_map(|v| v.attr("val").map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            slot.filter = Some(ColumnFilter { values });
        }
    }
    let info = root.child("tableStyleInfo");
    let flag = |name: &str, default: bool| info.map_or(default, |i| i.attr_bool(name, false));
    let mut table = Table {
        name,
        range,
        style_name: info.and_then(|i| i.attr("name")).map(str::to_string),
        header_row: root.attr_u32("headerRowCount").is_none_or(|n| n > 0),
        totals_row: root.attr_u32("totalsRowCount").is_some_and(|n| n > 0),
        show_row_stripes: flag("showRowStripes", true),
        show_column_stripes: flag("showColumnStripes", false),
        show_first_column: flag("showFirstColumn", false),
        show_last_column: flag("showLastColumn", false),
        auto_filter: auto_filter.is_some(),
        columns,
    };
    table.sync_columns();
    Ok(table)
}

/// Table part for `table`; `id` is unique across the workbook
pub(crate) fn table_xml(table: &Table, id: u32) -> String {
    let mut out = String::from(XML_DECLARATION);
    out.push_str(r#"<table xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main""#);
    push_attr(&mut out, "id", &id.to_string());
    push_attr(&mut out, "name", &table.name);
    push_attr(&mut out, "displayName", &table.name);
    push_attr(&mut out, "ref", &table.range.to_string());
    if !table.header_row {
        push_attr(&mut out, "headerRowCount", "0");
    }
    if table.totals_row {
        push_attr(&mut out, "totalsRowCount", "1");
    } else {
        push_attr(&mut out, "totalsRowShown", "0");
    }
    out.push('>');

    if table.auto_filter && table.header_row {
        out.push_str("<autoFilter");
        push_attr(&mut out, "ref", &table.filter_range().to_string());
        let filtered: Vec<(usize, &ColumnFilter)> = table
            .columns
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.filter.as_ref().map(|f| (i, f)))
            .collect();
        if filtered.is_empty() {
            out.push_str("/>");
        } else {
            out.push('>');
            for (i, filter) in filtered {
                out.push_str(&format!(r#"<filterColumn colId="{}"><filters>"#, i));
                for value in &filter.values {
                    out.push_str("<filter");
                    push_attr(&mut out, "val", value);
                    out.push_str("/>");
                }
                out.push_str("</filters></filterColumn>");
            }
            out.push_str("</autoFilter>");
        }
    }

    out.push_str(&format!(r#"<tableColumns count="{}">"#, table.columns.len()));
    for (i, column) in table.columns.iter().enumerate() {
        out.push_str("<tableColumn");
        push_attr(&mut out, "id", &(i + 1).to_string());
        push_attr(&mut out, "name", &column.name);
        if let Some(label) = &column.totals_label {
            push_attr(&mut out, "totalsRowLabel", label);
        }
        out.push_str("/>");
    }
    out.push_str("</tableColumns>");

    out.push_str("<tableStyleInfo");
    if let Some(style) = &table.style_name {
        push_attr(&mut out, "name", style);
    }
    push_attr(&mut out, "showFirstColumn", bool_str(table.show_first_column));
    push_attr(&mut out, "showLastColumn", bool_str(table.show_last_column));
    push_attr(&mut out, "showRowStripes", bool_str(table.show_row_stripes));
    push_attr(&mut out, "showColumnStripes", bool_str(table.show_column_stripes));
    out.push_str("/></table>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table {
            name: "Sales".to_string(),
            range: CellRange::parse("B2:D6").unwrap(),
            style_name: Some("TableStyleLight9".to_string()),
            header_row: true,
            totals_row: true,
            show_row_stripes: true,
            show_column_stripes: false,
            show_first_column: true,
            show_last_column: false,
            auto_filter: true,
            columns: vec![
                TableColumn {
                    name: "Region".to_string(),
                    filter: Some(ColumnFilter {
                        values: vec!["North".to_string(), "South & East".to_string()],
                    }),
                    totals_label: Some("Total".to_string()),
                },
                TableColumn::new("Units"),
                TableColumn::new("Price"),
            ],
        }
    }

    #[test]
    fn test_table_part_round_trip() {
        let table = sample();
        let xml = table_xml(&table, 3);
        assert!(xml.contains(r#"<autoFilter ref="B2:D5">"#));
        assert!(xml.contains(r#"id="3""#));
        assert_eq!(read_table(xml.as_bytes()).unwrap(), table);
    }

    #[test]
    fn test_missing_columns_are_filled_in() {
        let xml = br#"<table name="T" ref="A1:C3"><tableColumns count="1"><tableColumn id="1" name="Id"/></tableColumns></table>"#;
        let table = read_table(xml).unwrap();
        let names: Vec<_> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Id", "Column2", "Column3"]);
        assert!(table.header_row && !table.auto_filter);
        assert!(table.show_row_stripes);
    }
}
