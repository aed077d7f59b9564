//! Bitmap definitions.
//!
//! Pixels are never decoded here. The header is read (or sniffed from the
//! embedded JPEG/PNG/GIF stream) so dimensions are known at scan time, and
//! the payload is later handed to an external image codec.

use serde::Serialize;

use crate::bit_reader::BitReader;
use crate::error::ReaderError;
use crate::tag::ByteSpan;

type Result<T> = std::result::Result<T, ReaderError>;

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];
const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const GIF_MAGIC: [u8; 4] = *b"GIF8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LosslessFormat {
    ColorMapped,
    Rgb15,
    Rgb32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Lossless {
        format: LosslessFormat,
        /// Number of palette entries for colour-mapped data.
        color_table_size: u16,
        has_alpha: bool,
    },
    Unknown,
}

/// Classify an embedded image stream by its magic bytes.
pub fn sniff_format(data: &[u8]) -> ImageFormat {
    let data = strip_erroneous_header(data);
    if data.starts_with(&JPEG_SOI) {
        ImageFormat::Jpeg
    } else if data.starts_with(&PNG_MAGIC) {
        ImageFormat::Png
    } else if data.starts_with(&GIF_MAGIC) {
        ImageFormat::Gif
    } else {
        ImageFormat::Unknown
    }
}

/// Some authoring tools prefix JPEG data with an end-of-image marker before
/// the real start-of-image.
pub fn strip_erroneous_header(data: &[u8]) -> &[u8] {
    match data {
        [0xFF, 0xD9, 0xFF, 0xD8, rest @ ..] => {
            if rest.starts_with(&JPEG_SOI) {
                rest
            } else {
                &data[2..]
            }
        }
        _ => data,
    }
}

/// Width and height of a JPEG, PNG or GIF stream, read from its header.
pub fn sniff_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    let data = strip_erroneous_header(data);
    match sniff_format(data) {
        ImageFormat::Png => {
            let width = u32::from_be_bytes(data.get(16..20)?.try_into().ok()?);
            let height = u32::from_be_bytes(data.get(20..24)?.try_into().ok()?);
            Some((width, height))
        }
        ImageFormat::Gif => {
            let width = u16::from_le_bytes(data.get(6..8)?.try_into().ok()?);
            let height = u16::from_le_bytes(data.get(8..10)?.try_into().ok()?);
            Some((u32::from(width), u32::from(height)))
        }
        ImageFormat::Jpeg => jpeg_dimensions(data),
        _ => None,
    }
}

fn jpeg_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        let marker = data[pos + 1];
        match marker {
            // fill bytes and standalone markers
            0xFF => {
                pos += 1;
                continue;
            }
            0xD0..=0xD9 | 0x01 => {
                pos += 2;
                continue;
            }
            _ => {}
        }
        let length = usize::from(u16::from_be_bytes([data[pos + 2], data[pos + 3]]));
        let is_frame_header =
            matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_frame_header {
            let segment = data.get(pos + 4..pos + 9)?;
            let height = u16::from_be_bytes([segment[1], segment[2]]);
            let width = u16::from_be_bytes([segment[3], segment[4]]);
            return Some((u32::from(width), u32::from(height)));
        }
        pos += 2 + length;
    }
    None
}

/// Join shared JPEG tables with an image stream that omits them.
pub fn merge_jpeg_tables(tables: &[u8], image: &[u8]) -> Vec<u8> {
    let tables = strip_erroneous_header(tables);
    let image = strip_erroneous_header(image);
    if tables.is_empty() {
        return image.to_vec();
    }
    let tables = tables.strip_suffix(&JPEG_EOI).unwrap_or(tables);
    let image = image.strip_prefix(&JPEG_SOI).unwrap_or(image);
    let mut merged = Vec::with_capacity(tables.len() + image.len());
    merged.extend_from_slice(tables);
    merged.extend_from_slice(image);
    merged
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    /// Straight (non-premultiplied) RGBA, row-major.
    pub rgba: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageDefinition {
    pub id: u16,
    /// Tag family version: 1-4 for JPEG tags, 1-2 for lossless tags.
    pub version: u8,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    /// Encoded image stream (JPEG/PNG/GIF) or zlib-compressed pixel data.
    pub data: ByteSpan,
    /// Zlib-compressed alpha plane of JPEG versions 3 and 4.
    pub alpha: Option<ByteSpan>,
    pub deblock: Option<f32>,
    /// Version 1 JPEGs rely on the shared JPEG tables.
    pub uses_jpeg_tables: bool,
    #[serde(skip)]
    pub decoded: Option<DecodedImage>,
}

pub fn decode_jpeg(r: &mut BitReader<'_>, version: u8) -> Result<ImageDefinition> {
    let id = r.read_u16()?;
    let (alpha_offset, deblock) = match version {
        3 => (Some(r.read_u32()? as usize), None),
        4 => {
            let offset = r.read_u32()? as usize;
            (Some(offset), Some(r.read_fixed8()?))
        }
        _ => (None, None),
    };

    let start = r.position();
    let image_length = alpha_offset.map_or(r.remaining(), |offset| offset.min(r.remaining()));
    let image = r.read_bytes(image_length)?;
    let alpha = alpha_offset.map(|_| {
        let alpha_start = r.position();
        ByteSpan::new(alpha_start, r.read_rest().len())
    });

    let format = if version == 1 {
        ImageFormat::Jpeg
    } else {
        sniff_format(image)
    };
    let (width, height) = sniff_dimensions(image).unwrap_or_else(|| {
        if version != 1 {
            tracing::warn!(id, "could not read image dimensions");
        }
        (0, 0)
    });

    Ok(ImageDefinition {
        id,
        version,
        format,
        width,
        height,
        data: ByteSpan::new(start, image_length),
        alpha: alpha.filter(|span| !span.is_empty()),
        deblock,
        uses_jpeg_tables: version == 1,
        decoded: None,
    })
}

pub fn decode_lossless(r: &mut BitReader<'_>, version: u8) -> Result<ImageDefinition> {
    let id = r.read_u16()?;
    let offset = r.position();
    let format = match r.read_u8()? {
        3 => LosslessFormat::ColorMapped,
        4 if version == 1 => LosslessFormat::Rgb15,
        5 => LosslessFormat::Rgb32,
        other => {
            return Err(ReaderError::InvalidValue {
                what: "lossless bitmap format",
                value: u32::from(other),
                offset,
            });
        }
    };
    let width = u32::from(r.read_u16()?);
    let height = u32::from(r.read_u16()?);
    let color_table_size = if format == LosslessFormat::ColorMapped {
        u16::from(r.read_u8()?) + 1
    } else {
        0
    };
    let start = r.position();
    let data = r.read_rest();

    Ok(ImageDefinition {
        id,
        version,
        format: ImageFormat::Lossless {
            format,
            color_table_size,
            has_alpha: version == 2,
        },
        width,
        height,
        data: ByteSpan::new(start, data.len()),
        alpha: None,
        deblock: None,
        uses_jpeg_tables: false,
        decoded: None,
    })
}
