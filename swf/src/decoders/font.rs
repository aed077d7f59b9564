//! Font definitions: glyph outlines, layout metrics and font info.

use serde::Serialize;

use crate::bit_reader::BitReader;
use crate::decoders::shape::{ShapePath, decode_glyph};
use crate::error::ReaderError;
use crate::reader::Rect;
use crate::tag::ByteSpan;

type Result<T> = std::result::Result<T, ReaderError>;

/// EM square of version 1 and 2 outlines, in twips.
pub const EM_SQUARE: u32 = 1024;
/// Version 3 outlines are stored at 20x resolution.
pub const EM_SQUARE_V3: u32 = 1024 * 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum FontStyle {
    #[default]
    Regular,
    Bold,
    Italic,
    BoldItalic,
}

impl FontStyle {
    pub fn from_flags(bold: bool, italic: bool) -> Self {
        match (bold, italic) {
            (false, false) => Self::Regular,
            (true, false) => Self::Bold,
            (false, true) => Self::Italic,
            (true, true) => Self::BoldItalic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Glyph {
    /// Character code; zero until a code table is known.
    pub code: u16,
    pub paths: Vec<ShapePath>,
    pub advance: Option<i16>,
    pub bounds: Option<Rect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KerningRecord {
    pub left: u16,
    pub right: u16,
    pub adjustment: i16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FontLayout {
    pub ascent: u16,
    pub descent: u16,
    pub leading: i16,
    pub kerning: Vec<KerningRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FontDefinition {
    pub id: u16,
    pub version: u8,
    pub name: String,
    pub style: FontStyle,
    pub language: u8,
    pub is_small_text: bool,
    pub em_square: u32,
    pub glyphs: Vec<Glyph>,
    pub layout: Option<FontLayout>,
    /// Embedded OpenType/CFF data of version 4 fonts.
    pub font_data: Option<ByteSpan>,
}

impl FontDefinition {
    /// Device fonts carry no outlines and are rendered with a system font of
    /// the same name.
    pub fn is_device(&self) -> bool {
        self.glyphs.is_empty() && self.font_data.is_none()
    }

    pub fn glyph_for_code(&self, code: u16) -> Option<&Glyph> {
        self.glyphs.iter().find(|glyph| glyph.code == code)
    }
}

pub fn decode_font(r: &mut BitReader<'_>, version: u8) -> Result<FontDefinition> {
    match version {
        1 => decode_font1(r),
        4 => decode_font4(r),
        _ => decode_font2(r, version),
    }
}

/// Version 1 has only an offset table and outlines; name, style and codes
/// come later from a font-info tag.
fn decode_font1(r: &mut BitReader<'_>) -> Result<FontDefinition> {
    let id = r.read_u16()?;
    let table_start = r.position();
    let mut glyphs = Vec::new();

    if !r.is_empty() {
        let first = usize::from(r.read_u16()?);
        let count = first / 2;
        let mut offsets = Vec::with_capacity(count);
        offsets.push(first);
        for _ in 1..count {
            offsets.push(usize::from(r.read_u16()?));
        }
        for (i, offset) in offsets.iter().enumerate() {
            let start = table_start + offset;
            let end = offsets
                .get(i + 1)
                .map_or(r.end(), |next| table_start + next);
            let mut glyph_reader = r.substream(start, end.max(start))?;
            glyphs.push(Glyph {
                code: 0,
                paths: decode_glyph(&mut glyph_reader)?,
                advance: None,
                bounds: None,
            });
        }
    }

    Ok(FontDefinition {
        id,
        version: 1,
        name: String::new(),
        style: FontStyle::Regular,
        language: 0,
        is_small_text: false,
        em_square: EM_SQUARE,
        glyphs,
        layout: None,
        font_data: None,
    })
}

fn decode_font2(r: &mut BitReader<'_>, version: u8) -> Result<FontDefinition> {
    let id = r.read_u16()?;
    let flags = r.read_u8()?;
    let has_layout = flags & 0x80 != 0;
    let is_small_text = flags & 0x20 != 0;
    let wide_offsets = flags & 0x08 != 0;
    let wide_codes = flags & 0x04 != 0;
    let style = FontStyle::from_flags(flags & 0x01 != 0, flags & 0x02 != 0);
    let language = r.read_u8()?;
    let name_length = usize::from(r.read_u8()?);
    let name = r.read_string(Some(name_length))?;
    let glyph_count = usize::from(r.read_u16()?);

    let table_start = r.position();
    let mut offsets = Vec::with_capacity(glyph_count);
    let read_offset = |r: &mut BitReader<'_>| -> Result<usize> {
        if wide_offsets {
            Ok(r.read_u32()? as usize)
        } else {
            Ok(usize::from(r.read_u16()?))
        }
    };
    for _ in 0..glyph_count {
        offsets.push(read_offset(r)?);
    }
    // Fonts without glyphs may omit the code table offset entirely.
    let code_table_offset = if glyph_count > 0 || !r.is_empty() {
        read_offset(r)?
    } else {
        0
    };

    let mut glyphs = Vec::with_capacity(glyph_count);
    for (i, offset) in offsets.iter().enumerate() {
        let start = table_start + offset;
        let end = table_start + offsets.get(i + 1).copied().unwrap_or(code_table_offset);
        let mut glyph_reader = r.substream(start, end.max(start))?;
        glyphs.push(Glyph {
            code: 0,
            paths: decode_glyph(&mut glyph_reader)?,
            advance: None,
            bounds: None,
        });
    }

    if glyph_count > 0 {
        r.seek(table_start + code_table_offset);
    }
    for glyph in &mut glyphs {
        glyph.code = if wide_codes {
            r.read_u16()?
        } else {
            u16::from(r.read_u8()?)
        };
    }

    let layout = if has_layout {
        let ascent = r.read_u16()?;
        let descent = r.read_u16()?;
        let leading = r.read_i16()?;
        for glyph in &mut glyphs {
            glyph.advance = Some(r.read_i16()?);
        }
        for glyph in &mut glyphs {
            glyph.bounds = Some(r.read_rect()?);
        }
        // Some writers drop the kerning count when there are no pairs.
        let kerning_count = if r.is_empty() { 0 } else { r.read_u16()? };
        let mut kerning = Vec::with_capacity(usize::from(kerning_count));
        for _ in 0..kerning_count {
            let (left, right) = if wide_codes {
                (r.read_u16()?, r.read_u16()?)
            } else {
                (u16::from(r.read_u8()?), u16::from(r.read_u8()?))
            };
            kerning.push(KerningRecord {
                left,
                right,
                adjustment: r.read_i16()?,
            });
        }
        Some(FontLayout {
            ascent,
            descent,
            leading,
            kerning,
        })
    } else {
        None
    };

    Ok(FontDefinition {
        id,
        version,
        name,
        style,
        language,
        is_small_text,
        em_square: if version >= 3 { EM_SQUARE_V3 } else { EM_SQUARE },
        glyphs,
        layout,
        font_data: None,
    })
}

fn decode_font4(r: &mut BitReader<'_>) -> Result<FontDefinition> {
    let id = r.read_u16()?;
    let flags = r.read_u8()?;
    let has_font_data = flags & 0x04 != 0;
    let style = FontStyle::from_flags(flags & 0x01 != 0, flags & 0x02 != 0);
    let name = r.read_string(None)?;
    let font_data = if has_font_data {
        let start = r.position();
        let rest = r.read_rest();
        Some(ByteSpan::new(start, rest.len()))
    } else {
        None
    };

    Ok(FontDefinition {
        id,
        version: 4,
        name,
        style,
        language: 0,
        is_small_text: false,
        em_square: EM_SQUARE_V3,
        glyphs: Vec::new(),
        layout: None,
        font_data,
    })
}

/// Name, style and code table carried by a font-info tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontInfo {
    pub font_id: u16,
    pub name: String,
    pub style: FontStyle,
    pub is_small_text: bool,
    pub language: u8,
    pub codes: Vec<u16>,
}

pub fn decode_font_info(r: &mut BitReader<'_>, version: u8) -> Result<FontInfo> {
    let font_id = r.read_u16()?;
    let name_length = usize::from(r.read_u8()?);
    let name = r.read_string(Some(name_length))?;
    let flags = r.read_u8()?;
    let is_small_text = flags & 0x20 != 0;
    let style = FontStyle::from_flags(flags & 0x02 != 0, flags & 0x04 != 0);
    // Version 2 always uses wide codes.
    let wide_codes = flags & 0x01 != 0 || version >= 2;
    let language = if version >= 2 { r.read_u8()? } else { 0 };

    let mut codes = Vec::new();
    while !r.is_empty() {
        let code = if wide_codes {
            match r.read_u16() {
                Ok(code) => code,
                // odd trailing byte
                Err(_) => break,
            }
        } else {
            u16::from(r.read_u8()?)
        };
        codes.push(code);
    }

    Ok(FontInfo {
        font_id,
        name,
        style,
        is_small_text,
        language,
        codes,
    })
}

/// Merge font info into an existing definition. Codes are assigned in glyph
/// order; extra codes are ignored.
pub fn apply_font_info(font: &mut FontDefinition, info: &FontInfo) {
    font.name.clone_from(&info.name);
    font.style = info.style;
    font.is_small_text = info.is_small_text;
    if info.language != 0 {
        font.language = info.language;
    }
    for (glyph, code) in font.glyphs.iter_mut().zip(&info.codes) {
        glyph.code = *code;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_font2_bytes(name: &str, flags: u8) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&7u16.to_le_bytes());
        bytes.push(flags);
        bytes.push(1); // language
        bytes.push(name.len() as u8);
        bytes.extend_from_slice(name.as_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes
    }

    #[test]
    fn test_device_font_without_glyphs() {
        let bytes = device_font2_bytes("Arial", 0x01);
        let font = decode_font(&mut BitReader::new(&bytes), 2).unwrap();
        assert_eq!(font.id, 7);
        assert_eq!(font.name, "Arial");
        assert_eq!(font.style, FontStyle::Bold);
        assert!(font.is_device());
        assert_eq!(font.em_square, EM_SQUARE);
    }

    #[test]
    fn test_version3_em_square() {
        let bytes = device_font2_bytes("Serif", 0x02);
        let font = decode_font(&mut BitReader::new(&bytes), 3).unwrap();
        assert_eq!(font.style, FontStyle::Italic);
        assert_eq!(font.em_square, EM_SQUARE_V3);
    }

    #[test]
    fn test_font4_data_span() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&3u16.to_le_bytes());
        bytes.push(0x04);
        bytes.extend_from_slice(b"Embedded\0");
        bytes.extend_from_slice(b"OTTO");
        let font = decode_font(&mut BitReader::new(&bytes), 4).unwrap();
        assert_eq!(font.name, "Embedded");
        assert_eq!(font.font_data, Some(ByteSpan::new(12, 4)));
        assert!(!font.is_device());
    }

    #[test]
    fn test_font_info_assigns_codes() {
        // font 1 with two empty glyph outlines (one fill bit, end record)
        let mut font_bytes = Vec::new();
        font_bytes.extend_from_slice(&1u16.to_le_bytes());
        font_bytes.extend_from_slice(&4u16.to_le_bytes());
        font_bytes.extend_from_slice(&6u16.to_le_bytes());
        font_bytes.extend_from_slice(&[0x10, 0x00, 0x10, 0x00]);
        let mut font = decode_font(&mut BitReader::new(&font_bytes), 1).unwrap();
        assert_eq!(font.glyphs.len(), 2);

        let mut info_bytes = Vec::new();
        info_bytes.extend_from_slice(&1u16.to_le_bytes());
        info_bytes.push(4);
        info_bytes.extend_from_slice(b"Mono");
        info_bytes.push(0x04); // italic, narrow codes
        info_bytes.extend_from_slice(b"AB");
        let info = decode_font_info(&mut BitReader::new(&info_bytes), 1).unwrap();
        apply_font_info(&mut font, &info);

        assert_eq!(font.name, "Mono");
        assert_eq!(font.style, FontStyle::Italic);
        assert_eq!(font.glyphs[0].code, u16::from(b'A'));
        assert_eq!(font.glyphs[1].code, u16::from(b'B'));
    }
}
