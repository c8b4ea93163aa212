//! Embedded pictures

use super::sheet_mut::WorksheetMut;
use crate::address::{CellAddress, IntoAddress};
use crate::error::{Error, Result};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

/// EMU per pixel at 96 dpi
pub const EMU_PER_PIXEL: i64 = 9525;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
}

impl ImageFormat {
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(ImageFormat::Png)
        } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            Some(ImageFormat::Gif)
        } else if data.starts_with(b"BM") && data.len() >= 26 {
            Some(ImageFormat::Bmp)
        } else {
            None
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Gif => "gif",
            ImageFormat::Bmp => "bmp",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Bmp => "image/bmp",
        }
    }

    pub(crate) fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "gif" => Some(ImageFormat::Gif),
            "bmp" => Some(ImageFormat::Bmp),
            _ => None,
        }
    }
}

/// Pixel dimensions read from the image header
pub fn image_size(format: ImageFormat, data: &[u8]) -> Option<(u32, u32)> {
    let be32 = |at: usize| {
        data.get(at..at + 4)
            .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    };
    let le16 = |at: usize| data.get(at..at + 2).map(|b| u16::from_le_bytes([b[0], b[1]]) as u32);
    let le32 = |at: usize| {
        data.get(at..at + 4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]).unsigned_abs())
    };
    match format {
        ImageFormat::Png => Some((be32(16)?, be32(20)?)),
        ImageFormat::Gif => Some((le16(6)?, le16(8)?)),
        ImageFormat::Bmp => Some((le32(18)?, le32(22)?)),
        ImageFormat::Jpeg => jpeg_size(data),
    }
}

fn jpeg_size(data: &[u8]) -> Option<(u32, u32)> {
    let mut pos = 2;
    while pos + 9 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        let marker = data[pos + 1];
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        let is_frame = (0xC0..=0xCF).contains(&marker) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_frame {
            let height = u16::from_be_bytes([data[pos + 5], data[pos + 6]]) as u32;
            let width = u16::from_be_bytes([data[pos + 7], data[pos + 8]]) as u32;
            return Some((width, height));
        }
        pos += 2 + len;
    }
    None
}

/// Cell corner plus offset into the cell, in EMU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub cell: CellAddress,
    pub col_offset: i64,
    pub row_offset: i64,
}

impl Marker {
    pub fn at(cell: CellAddress) -> Self {
        Self {
            cell,
            col_offset: 0,
            row_offset: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Moves with its top-left cell, fixed size in EMU
    OneCell { from: Marker, width: i64, height: i64 },
    /// Moves and resizes with both corner cells
    TwoCell { from: Marker, to: Marker },
}

impl Placement {
    pub fn from(&self) -> &Marker {
        match self {
            Placement::OneCell { from, .. } | Placement::TwoCell { from, .. } => from,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Picture {
    pub name: String,
    pub description: Option<String>,
    pub format: ImageFormat,
    pub data: Arc<Vec<u8>>,
    /// Natural size in pixels
    pub width: u32,
    pub height: u32,
    pub placement: Placement,
}

/// Where and how large to place a new picture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PictureOptions {
    /// Bottom-right cell; makes the picture two-cell anchored
    pub to: Option<CellAddress>,
    /// Displayed size in pixels, natural size when absent
    pub extent: Option<(u32, u32)>,
    /// Pixel offset of the top-left corner, may be negative
    pub from_offset: (i32, i32),
    /// Pixel offset of the bottom-right corner, may be negative
    pub to_offset: (i32, i32),
}

impl WorksheetMut<'_> {
    /// Insert a picture with its top-left corner on `anchor` at natural size;
    /// returns its index
    pub fn add_picture(&mut self, data: Vec<u8>, anchor: impl IntoAddress) -> Result<usize> {
        self.add_picture_with(data, anchor, PictureOptions::default())
    }

    pub fn add_picture_from_path(&mut self, path: impl AsRef<Path>, anchor: impl IntoAddress) -> Result<usize> {
        let data = std::fs::read(path.as_ref())?;
        self.add_picture(data, anchor)
    }

    pub fn add_picture_from_reader<R: Read>(&mut self, mut reader: R, anchor: impl IntoAddress) -> Result<usize> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        self.add_picture(data, anchor)
    }

    pub fn add_picture_with(
        &mut self,
        data: Vec<u8>,
        anchor: impl IntoAddress,
        options: PictureOptions,
    ) -> Result<usize> {
        self.book.ensure_open()?;
        let anchor = anchor.into_address()?;
        let format = ImageFormat::detect(&data)
            .ok_or_else(|| Error::InvalidState("unsupported image format".to_string()))?;
        let (width, height) = image_size(format, &data)
            .ok_or_else(|| Error::InvalidState("image header is truncated".to_string()))?;
        let from = self.normalize_marker(anchor, options.from_offset)?;
        let placement = match options.to {
            Some(to) => {
                let to = CellAddress::checked(to.row, to.col)?;
                Placement::TwoCell {
                    from,
                    to: self.normalize_marker(to, options.to_offset)?,
                }
            }
            None => {
                let (w, h) = options.extent.unwrap_or((width, height));
                Placement::OneCell {
                    from,
                    width: w as i64 * EMU_PER_PIXEL,
                    height: h as i64 * EMU_PER_PIXEL,
                }
            }
        };
        let sheet = self.sheet_mut();
        let name = format!("Picture {}", sheet.pictures.len() + 1);
        sheet.pictures.push(Picture {
            name,
            description: None,
            format,
            data: Arc::new(data),
            width,
            height,
            placement,
        });
        Ok(sheet.pictures.len() - 1)
    }

    pub fn remove_picture(&mut self, index: usize) -> Result<Picture> {
        self.book.ensure_open()?;
        let sheet = self.sheet_mut();
        if index >= sheet.pictures.len() {
            return Err(Error::out_of_range(format!("picture {}", index)));
        }
        Ok(sheet.pictures.remove(index))
    }

    /// Turn a pixel offset into a marker with a non-negative EMU offset,
    /// walking into neighbouring cells as needed
    fn normalize_marker(&self, cell: CellAddress, offset_px: (i32, i32)) -> Result<Marker> {
        let (dx, dy) = offset_px;
        let mut col = cell.col as i64;
        let mut col_offset = dx as i64 * EMU_PER_PIXEL;
        while col_offset < 0 {
            if col == 0 {
                return Err(Error::out_of_range("picture offset left of column A"));
            }
            col -= 1;
            col_offset += self.column_width_px(col as u32) as i64 * EMU_PER_PIXEL;
        }
        let mut row = cell.row as i64;
        let mut row_offset = dy as i64 * EMU_PER_PIXEL;
        while row_offset < 0 {
            if row == 0 {
                return Err(Error::out_of_range("picture offset above row 1"));
            }
            row -= 1;
            row_offset += self.row_height_px(row as u32) as i64 * EMU_PER_PIXEL;
        }
        Ok(Marker {
            cell: CellAddress::checked(row as u32, col as u32)?,
            col_offset,
            row_offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_png(width: u32, height: u32) -> Vec<u8> {
        let mut data = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        data.extend_from_slice(&13u32.to_be_bytes());
        data.extend_from_slice(b"IHDR");
        data.extend_from_slice(&width.to_be_bytes());
        data.extend_from_slice(&height.to_be_bytes());
        data.extend_from_slice(&[8, 6, 0, 0, 0]);
        data
    }

    #[test]
    fn test_detect_and_size() {
        let png = tiny_png(64, 32);
        assert_eq!(ImageFormat::detect(&png), Some(ImageFormat::Png));
        assert_eq!(image_size(ImageFormat::Png, &png), Some((64, 32)));

        let mut gif = b"GIF89a".to_vec();
        gif.extend_from_slice(&[10, 0, 20, 0]);
        assert_eq!(ImageFormat::detect(&gif), Some(ImageFormat::Gif));
        assert_eq!(image_size(ImageFormat::Gif, &gif), Some((10, 20)));

        let jpeg = [
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x04, 0x00, 0x00, 0xFF, 0xC0, 0x00, 0x11, 0x08, 0x00,
            0x30, 0x00, 0x40, 0x03,
        ];
        assert_eq!(ImageFormat::detect(&jpeg), Some(ImageFormat::Jpeg));
        assert_eq!(image_size(ImageFormat::Jpeg, &jpeg), Some((64, 48)));
        assert_eq!(ImageFormat::detect(b"hello"), None);
    }
}
