//! Static text (labels) and editable text fields.

use bitflags::bitflags;
use serde::Serialize;

use crate::bit_reader::BitReader;
use crate::context::FontRegistry;
use crate::error::{ReaderError, SymbolError};
use crate::reader::{Matrix, Rect, Rgba};
use crate::symbol::{Symbol, SymbolSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GlyphEntry {
    pub index: u32,
    pub advance: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextRecord {
    pub font_id: Option<u16>,
    pub color: Option<Rgba>,
    pub x_offset: Option<i16>,
    pub y_offset: Option<i16>,
    pub height: Option<u16>,
    pub glyphs: Vec<GlyphEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelDefinition {
    pub id: u16,
    pub bounds: Rect,
    pub matrix: Matrix,
    pub records: Vec<TextRecord>,
}

impl LabelDefinition {
    pub fn font_ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.records.iter().filter_map(|r| r.font_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

pub fn decode_label(r: &mut BitReader<'_>, version: u8) -> Result<LabelDefinition, ReaderError> {
    let id = r.read_u16()?;
    let bounds = r.read_rect()?;
    let matrix = r.read_matrix()?;
    let glyph_bits = u32::from(r.read_u8()?);
    let advance_bits = u32::from(r.read_u8()?);

    let mut records = Vec::new();
    loop {
        let flags = r.read_u8()?;
        if flags == 0 {
            break;
        }
        let font_id = if flags & 0x08 != 0 {
            Some(r.read_u16()?)
        } else {
            None
        };
        let color = if flags & 0x04 != 0 {
            Some(if version >= 2 { r.read_rgba()? } else { r.read_rgb()? })
        } else {
            None
        };
        let x_offset = if flags & 0x01 != 0 {
            Some(r.read_i16()?)
        } else {
            None
        };
        let y_offset = if flags & 0x02 != 0 {
            Some(r.read_i16()?)
        } else {
            None
        };
        let height = if font_id.is_some() {
            Some(r.read_u16()?)
        } else {
            None
        };
        let count = r.read_u8()?;
        let mut glyphs = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            glyphs.push(GlyphEntry {
                index: r.read_ub(glyph_bits)?,
                advance: r.read_sb(advance_bits)?,
            });
        }
        r.align();
        records.push(TextRecord {
            font_id,
            color,
            x_offset,
            y_offset,
            height,
            glyphs,
        });
    }

    Ok(LabelDefinition {
        id,
        bounds,
        matrix,
        records,
    })
}

bitflags! {
    /// Flag word of an edit-text definition, first byte high.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct EditTextFlags: u16 {
        const HAS_TEXT = 0x8000;
        const WORD_WRAP = 0x4000;
        const MULTILINE = 0x2000;
        const PASSWORD = 0x1000;
        const READ_ONLY = 0x0800;
        const HAS_TEXT_COLOR = 0x0400;
        const HAS_MAX_LENGTH = 0x0200;
        const HAS_FONT = 0x0100;
        const HAS_FONT_CLASS = 0x0080;
        const AUTO_SIZE = 0x0040;
        const HAS_LAYOUT = 0x0020;
        const NO_SELECT = 0x0010;
        const BORDER = 0x0008;
        const WAS_STATIC = 0x0004;
        const HTML = 0x0002;
        const USE_OUTLINES = 0x0001;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TextAlign {
    Left,
    Right,
    Center,
    Justify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TextLayout {
    pub align: TextAlign,
    pub left_margin: u16,
    pub right_margin: u16,
    pub indent: u16,
    pub leading: i16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditTextDefinition {
    pub id: u16,
    pub bounds: Rect,
    pub flags: EditTextFlags,
    pub font_id: Option<u16>,
    pub font_class: Option<String>,
    pub font_height: Option<u16>,
    /// Name of the referenced font, once resolved.
    pub font_name: Option<String>,
    /// Embedded font registered under the same name and style as a
    /// referenced device font.
    pub embedded_font_id: Option<u16>,
    pub color: Option<Rgba>,
    pub max_length: Option<u16>,
    pub layout: Option<TextLayout>,
    pub variable_name: String,
    pub initial_text: Option<String>,
}

pub fn decode_edit_text(r: &mut BitReader<'_>) -> Result<EditTextDefinition, ReaderError> {
    let id = r.read_u16()?;
    let bounds = r.read_rect()?;
    let high = r.read_u8()?;
    let low = r.read_u8()?;
    let flags = EditTextFlags::from_bits_retain(u16::from_be_bytes([high, low]));

    let font_id = if flags.contains(EditTextFlags::HAS_FONT) {
        Some(r.read_u16()?)
    } else {
        None
    };
    let font_class = if flags.contains(EditTextFlags::HAS_FONT_CLASS) {
        Some(r.read_string(None)?)
    } else {
        None
    };
    let font_height = if flags.intersects(EditTextFlags::HAS_FONT | EditTextFlags::HAS_FONT_CLASS) {
        Some(r.read_u16()?)
    } else {
        None
    };
    let color = if flags.contains(EditTextFlags::HAS_TEXT_COLOR) {
        Some(r.read_rgba()?)
    } else {
        None
    };
    let max_length = if flags.contains(EditTextFlags::HAS_MAX_LENGTH) {
        Some(r.read_u16()?)
    } else {
        None
    };
    let layout = if flags.contains(EditTextFlags::HAS_LAYOUT) {
        let align = match r.read_u8()? {
            1 => TextAlign::Right,
            2 => TextAlign::Center,
            3 => TextAlign::Justify,
            _ => TextAlign::Left,
        };
        Some(TextLayout {
            align,
            left_margin: r.read_u16()?,
            right_margin: r.read_u16()?,
            indent: r.read_u16()?,
            leading: r.read_i16()?,
        })
    } else {
        None
    };
    let variable_name = r.read_string(None)?;
    let initial_text = if flags.contains(EditTextFlags::HAS_TEXT) {
        Some(r.read_string(None)?)
    } else {
        None
    };

    Ok(EditTextDefinition {
        id,
        bounds,
        flags,
        font_id,
        font_class,
        font_height,
        font_name: None,
        embedded_font_id: None,
        color,
        max_length,
        layout,
        variable_name,
        initial_text,
    })
}

/// Look up the referenced font. A device font is paired with an embedded
/// font of the same name and style when one is registered.
pub fn resolve_edit_text_font(
    text: &mut EditTextDefinition,
    source: &mut dyn SymbolSource,
    fonts: &FontRegistry,
) -> Result<(), SymbolError> {
    let Some(font_id) = text.font_id else {
        return Ok(());
    };
    let Some(symbol) = source.try_symbol(font_id)? else {
        return Ok(());
    };
    match &*symbol {
        Symbol::Font(font) => {
            text.font_name = Some(font.name.clone());
            if font.is_device() {
                text.embedded_font_id = fonts
                    .find(&font.name, font.style)
                    .filter(|entry| !entry.is_device)
                    .map(|entry| entry.id);
            }
        }
        other => {
            tracing::warn!(
                id = text.id,
                font_id,
                kind = %other.kind(),
                "text field references a non-font symbol"
            );
        }
    }
    Ok(())
}

/// Labels only need their fonts to exist; a cycle is still an error.
pub fn resolve_label_fonts(
    label: &LabelDefinition,
    source: &mut dyn SymbolSource,
) -> Result<(), SymbolError> {
    for font_id in label.font_ids() {
        if let Some(symbol) = source.try_symbol(font_id)? {
            if !matches!(&*symbol, Symbol::Font(_)) {
                tracing::warn!(id = label.id, font_id, "label references a non-font symbol");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_text_fields() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.push(0x00); // empty rect, nbits 0
        // HAS_TEXT | HAS_FONT, then HAS_LAYOUT
        bytes.push(0x81);
        bytes.push(0x20);
        bytes.extend_from_slice(&2u16.to_le_bytes()); // font id
        bytes.extend_from_slice(&240u16.to_le_bytes()); // height
        bytes.push(2); // center
        bytes.extend_from_slice(&[1, 0, 2, 0, 3, 0, 0xFE, 0xFF]);
        bytes.extend_from_slice(b"score\0");
        bytes.extend_from_slice(b"100\0");

        let text = decode_edit_text(&mut BitReader::new(&bytes)).unwrap();
        assert_eq!(text.id, 4);
        assert_eq!(text.font_id, Some(2));
        assert_eq!(text.font_height, Some(240));
        assert_eq!(
            text.layout,
            Some(TextLayout {
                align: TextAlign::Center,
                left_margin: 1,
                right_margin: 2,
                indent: 3,
                leading: -2
            })
        );
        assert_eq!(text.variable_name, "score");
        assert_eq!(text.initial_text.as_deref(), Some("100"));
    }

    #[test]
    fn test_label_records() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&8u16.to_le_bytes());
        bytes.push(0x00); // rect
        bytes.push(0x00); // identity matrix flags
        bytes.push(4); // glyph bits
        bytes.push(4); // advance bits
        // record: font + x offset
        bytes.push(0x89);
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&10i16.to_le_bytes());
        bytes.extend_from_slice(&200u16.to_le_bytes());
        bytes.push(1);
        // glyph 3, advance 5
        bytes.push(0b0011_0101);
        bytes.push(0);

        let label = decode_label(&mut BitReader::new(&bytes), 1).unwrap();
        assert_eq!(label.records.len(), 1);
        let record = &label.records[0];
        assert_eq!(record.font_id, Some(1));
        assert_eq!(record.x_offset, Some(10));
        assert_eq!(record.height, Some(200));
        assert_eq!(record.glyphs, vec![GlyphEntry { index: 3, advance: 5 }]);
        assert_eq!(label.font_ids(), vec![1]);
    }
}
