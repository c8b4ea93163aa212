//! Drawing parts holding pictures, and the media they embed

use super::opc::{Relationship, rel};
use super::xml::{XML_DECLARATION, XmlNode, push_attr};
use crate::address::CellAddress;
use crate::model::{EMU_PER_PIXEL, ImageFormat, Marker, Picture, Placement, image_size};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

const NAMESPACES: &str = r#"xmlns:xdr="http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships""#;

fn read_marker(node: &XmlNode) -> Option<Marker> {
    let value = |name: &str| -> Option<i64> { node.child(name)?.text().trim().parse().ok() };
    Some(Marker {
        cell: CellAddress::new(value("row")?.max(0) as u32, value("col")?.max(0) as u32),
        col_offset: value("colOff").unwrap_or(0),
        row_offset: value("rowOff").unwrap_or(0),
    })
}

/// Pictures of a drawing part. `media` resolves an embed relationship id
/// to the image bytes and the media part name.
pub(crate) fn read_drawing<'a>(
    xml: &[u8],
    media: impl Fn(&str) -> Option<(Arc<Vec<u8>>, &'a str)>,
) -> anyhow::Result<Vec<Picture>> {
    let root = XmlNode::parse(xml)?;
    let mut pictures = Vec::new();
    for anchor in root.elements() {
        let kind = anchor.local_name();
        let Some(pic) = anchor.child("pic") else {
            if matches!(kind, "oneCellAnchor" | "twoCellAnchor" | "absoluteAnchor") {
                log::warn!("dropping drawing object without a picture ({})", kind);
            }
            continue;
        };
        let Some(from) = anchor.child("from").and_then(read_marker) else {
            log::warn!("dropping picture with an unsupported {}", kind);
            continue;
        };
        let placement = match kind {
            "oneCellAnchor" => {
                let ext = anchor.child("ext");
                Placement::OneCell {
                    from,
                    width: ext.and_then(|e| e.attr("cx")?.parse().ok()).unwrap_or(0),
                    height: ext.and_then(|e| e.attr("cy")?.parse().ok()).unwrap_or(0),
                }
            }
            "twoCellAnchor" => match anchor.child("to").and_then(read_marker) {
                Some(to) => Placement::TwoCell { from, to },
                None => continue,
            },
            _ => continue,
        };
        let Some(embed) = pic.descendant("blip").and_then(|b| b.prefixed_attr("embed")) else {
            continue;
        };
        let Some((data, part)) = media(embed) else {
            log::warn!("picture references missing media {}", embed);
            continue;
        };
        let format = ImageFormat::detect(&data).or_else(|| {
            part.rsplit_once('.')
                .and_then(|(_, ext)| ImageFormat::from_extension(ext))
        });
        let Some(format) = format else {
            log::warn!("dropping picture in unsupported format: {}", part);
            continue;
        };
        let (width, height) = image_size(format, &data).unwrap_or_else(|| match placement {
            Placement::OneCell { width, height, .. } => {
                ((width / EMU_PER_PIXEL) as u32, (height / EMU_PER_PIXEL) as u32)
            }
            Placement::TwoCell { .. } => (0, 0),
        });
        let props = pic.descendant("cNvPr");
        pictures.push(Picture {
            name: props
                .and_then(|p| p.attr("name"))
                .map(str::to_string)
                .unwrap_or_else(|| format!("Picture {}", pictures.len() + 1)),
            description: props.and_then(|p| p.attr("descr")).map(str::to_string),
            format,
            data,
            width,
            height,
            placement,
        });
    }
    Ok(pictures)
}

/// Media parts of one save, deduplicated by content
#[derive(Debug, Default)]
pub(crate) struct MediaTable {
    parts: Vec<(String, Arc<Vec<u8>>)>,
    by_digest: HashMap<[u8; 32], usize>,
}

impl MediaTable {
    pub(crate) fn build<'a>(pictures: impl IntoIterator<Item = &'a Picture>) -> Self {
        let mut table = Self::default();
        for picture in pictures {
            let digest: [u8; 32] = Sha256::digest(picture.data.as_slice()).into();
            if table.by_digest.contains_key(&digest) {
                continue;
            }
            let name = format!(
                "xl/media/image{}.{}",
                table.parts.len() + 1,
                picture.format.extension()
            );
            table.by_digest.insert(digest, table.parts.len());
            table.parts.push((name, picture.data.clone()));
        }
        table
    }

    /// Part name holding the bytes of `picture`
    pub(crate) fn part_of(&self, picture: &Picture) -> Option<&str> {
        let digest: [u8; 32] = Sha256::digest(picture.data.as_slice()).into();
        let index = *self.by_digest.get(&digest)?;
        Some(self.parts[index].0.as_str())
    }

    pub(crate) fn parts(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.parts.iter().map(|(name, data)| (name.as_str(), data.as_slice()))
    }
}

fn push_marker(out: &mut String, tag: &str, marker: &Marker) {
    out.push_str(&format!(
        "<xdr:{tag}><xdr:col>{}</xdr:col><xdr:colOff>{}</xdr:colOff><xdr:row>{}</xdr:row><xdr:rowOff>{}</xdr:rowOff></xdr:{tag}>",
        marker.cell.col, marker.col_offset, marker.cell.row, marker.row_offset
    ));
}

/// Drawing part for `pictures` plus its relationships to media parts
pub(crate) fn drawing_part(pictures: &[Picture], media: &MediaTable) -> (String, Vec<Relationship>) {
    let mut rels: Vec<Relationship> = Vec::new();
    let mut out = String::from(XML_DECLARATION);
    out.push_str(&format!("<xdr:wsDr {}>", NAMESPACES));
    for (i, picture) in pictures.iter().enumerate() {
        let Some(part) = media.part_of(picture) else {
            continue;
        };
        let target = format!("../media/{}", part.rsplit('/').next().unwrap_or(part));
        let rel_id = match rels.iter().find(|r| r.target == target) {
            Some(existing) => existing.id.clone(),
            None => {
                let id = format!("rId{}", rels.len() + 1);
                rels.push(Relationship::new(id.clone(), rel::IMAGE, target));
                id
            }
        };
        let (cx, cy) = match picture.placement {
            Placement::OneCell { width, height, .. } => (width, height),
            Placement::TwoCell { .. } => (
                picture.width as i64 * EMU_PER_PIXEL,
                picture.height as i64 * EMU_PER_PIXEL,
            ),
        };
        match &picture.placement {
            Placement::OneCell { from, .. } => {
                out.push_str("<xdr:oneCellAnchor>");
                push_marker(&mut out, "from", from);
                out.push_str(&format!(r#"<xdr:ext cx="{}" cy="{}"/>"#, cx, cy));
            }
            Placement::TwoCell { from, to } => {
                out.push_str(r#"<xdr:twoCellAnchor editAs="oneCell">"#);
                push_marker(&mut out, "from", from);
                push_marker(&mut out, "to", to);
            }
        }
        out.push_str("<xdr:pic><xdr:nvPicPr><xdr:cNvPr");
        push_attr(&mut out, "id", &(i + 2).to_string());
        push_attr(&mut out, "name", &picture.name);
        if let Some(description) = &picture.description {
            push_attr(&mut out, "descr", description);
        }
        out.push_str(r#"/><xdr:cNvPicPr><a:picLocks noChangeAspect="1"/></xdr:cNvPicPr></xdr:nvPicPr>"#);
        out.push_str(&format!(
            r#"<xdr:blipFill><a:blip r:embed="{}"/><a:stretch><a:fillRect/></a:stretch></xdr:blipFill>"#,
            rel_id
        ));
        out.push_str(&format!(
            r#"<xdr:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{}" cy="{}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></xdr:spPr></xdr:pic><xdr:clientData/>"#,
            cx, cy
        ));
        out.push_str(match picture.placement {
            Placement::OneCell { .. } => "</xdr:oneCellAnchor>",
            Placement::TwoCell { .. } => "</xdr:twoCellAnchor>",
        });
    }
    out.push_str("</xdr:wsDr>");
    (out, rels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut data = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        data.extend_from_slice(&13u32.to_be_bytes());
        data.extend_from_slice(b"IHDR");
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&[8, 6, 0, 0, 0]);
        data
    }

    fn picture(data: &Arc<Vec<u8>>, placement: Placement) -> Picture {
        Picture {
            name: "Logo".to_string(),
            description: Some("company logo".to_string()),
            format: ImageFormat::Png,
            data: data.clone(),
            width: 40,
            height: 20,
            placement,
        }
    }

    #[test]
    fn test_drawing_round_trip_shares_media() {
        let data = Arc::new(png(40, 20));
        let from = Marker {
            cell: CellAddress::new(1, 1),
            col_offset: 9525,
            row_offset: 0,
        };
        let pictures = vec![
            picture(
                &data,
                Placement::OneCell {
                    from,
                    width: 40 * EMU_PER_PIXEL,
                    height: 20 * EMU_PER_PIXEL,
                },
            ),
            picture(
                &Arc::new(png(40, 20)),
                Placement::TwoCell {
                    from: Marker::at(CellAddress::new(5, 0)),
                    to: Marker::at(CellAddress::new(8, 3)),
                },
            ),
        ];
        let media = MediaTable::build(&pictures);
        assert_eq!(media.parts().count(), 1);
        let (xml, rels) = drawing_part(&pictures, &media);
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].target, "../media/image1.png");

        let read = read_drawing(xml.as_bytes(), |id| {
            (id == "rId1").then(|| (data.clone(), "xl/media/image1.png"))
        })
        .unwrap();
        assert_eq!(read, pictures);
    }

    #[test]
    fn test_shapes_are_skipped() {
        let xml = format!(
            r#"<xdr:wsDr {}><xdr:twoCellAnchor><xdr:from><xdr:col>0</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>0</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from><xdr:sp/></xdr:twoCellAnchor></xdr:wsDr>"#,
            NAMESPACES
        );
        let read = read_drawing(xml.as_bytes(), |_| None).unwrap();
        assert!(read.is_empty());
    }
}
