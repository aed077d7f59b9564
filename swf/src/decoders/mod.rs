//! One decoder per definition tag family.
//!
//! Each decoder turns the body of an [`UnparsedTag`] into a typed
//! definition. [`decode_definition`] dispatches on the tag family and
//! applies auxiliary tags that target the same id.

pub mod bitmap;
pub mod button;
pub mod font;
pub mod shape;
pub mod sound;
pub mod sprite;
pub mod text;
pub mod video;

use std::rc::Rc;

use serde::Serialize;

use crate::bit_reader::BitReader;
use crate::context::DecodeEnv;
use crate::dictionary::{Dictionary, PendingDefinition};
use crate::error::{ReaderError, SymbolError};
use crate::reader::Rect;
use crate::symbol::{Symbol, SymbolSource};
use crate::tag::{ByteSpan, DefinitionKind, TagCode, UnparsedTag};

/// Opaque bytes attached to an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinaryDefinition {
    pub id: u16,
    pub data: ByteSpan,
}

pub fn decode_binary(r: &mut BitReader<'_>) -> Result<BinaryDefinition, ReaderError> {
    let id = r.read_u16()?;
    // reserved
    r.read_u32()?;
    let start = r.position();
    let data = r.read_rest();
    Ok(BinaryDefinition {
        id,
        data: ByteSpan::new(start, data.len()),
    })
}

/// Resolves nested references through the dictionary that is decoding.
pub(crate) struct DecodeContext<'a> {
    pub env: DecodeEnv<'a>,
    pub dictionary: &'a mut Dictionary,
}

impl SymbolSource for DecodeContext<'_> {
    fn symbol(&mut self, id: u16) -> Result<Rc<Symbol>, SymbolError> {
        self.dictionary.resolve(self.env, id)
    }
}

/// Decode one pending definition. `extras` are the auxiliary tags that
/// target `id`, in file order.
pub(crate) fn decode_definition(
    cx: &mut DecodeContext<'_>,
    id: u16,
    pending: &PendingDefinition,
    extras: &[UnparsedTag],
) -> Result<Symbol, SymbolError> {
    let env = cx.env;
    let decode_error = |source| SymbolError::Decode { id, source };

    let (tag, kind) = match pending {
        PendingDefinition::Sprite { frame_count, frames, .. } => {
            let grid = scaling_grid(extras, env.data);
            return sprite::decode_sprite(cx, id, *frame_count, frames, grid).map(Symbol::Sprite);
        }
        PendingDefinition::Tag { tag, kind } => (tag, *kind),
    };

    let mut r = tag.reader(env.data);
    let symbol = match kind {
        DefinitionKind::Shape(version) => {
            let grid = scaling_grid(extras, env.data);
            Symbol::Shape(shape::decode_shape(&mut r, version, grid).map_err(decode_error)?)
        }
        DefinitionKind::MorphShape(version) => {
            Symbol::MorphShape(shape::decode_morph_shape(&mut r, version).map_err(decode_error)?)
        }
        DefinitionKind::Font(version) => {
            let mut font = font::decode_font(&mut r, version).map_err(decode_error)?;
            for extra in extras {
                if let TagCode::DefineFontInfo | TagCode::DefineFontInfo2 = extra.tag_code() {
                    let info_version = if extra.tag_code() == TagCode::DefineFontInfo { 1 } else { 2 };
                    match font::decode_font_info(&mut extra.reader(env.data), info_version) {
                        Ok(info) => font::apply_font_info(&mut font, &info),
                        Err(err) => tracing::warn!(id, %err, "ignoring malformed font info"),
                    }
                }
            }
            Symbol::Font(font)
        }
        DefinitionKind::Label(version) => {
            let label = text::decode_label(&mut r, version).map_err(decode_error)?;
            text::resolve_label_fonts(&label, cx)?;
            Symbol::Label(label)
        }
        DefinitionKind::EditText => {
            let mut field = text::decode_edit_text(&mut r).map_err(decode_error)?;
            text::resolve_edit_text_font(&mut field, cx, env.fonts)?;
            Symbol::Text(field)
        }
        DefinitionKind::Button(version) => {
            Symbol::Button(button::decode_button(cx, id, &mut r, version, extras)?)
        }
        DefinitionKind::Sound => Symbol::Sound(sound::decode_sound(&mut r).map_err(decode_error)?),
        DefinitionKind::Jpeg(version) => {
            Symbol::Image(bitmap::decode_jpeg(&mut r, version).map_err(decode_error)?)
        }
        DefinitionKind::Lossless(version) => {
            Symbol::Image(bitmap::decode_lossless(&mut r, version).map_err(decode_error)?)
        }
        DefinitionKind::Video => {
            Symbol::Video(video::decode_video(&mut r, extras, env.data).map_err(decode_error)?)
        }
        DefinitionKind::Binary => Symbol::Binary(decode_binary(&mut r).map_err(decode_error)?),
        DefinitionKind::Sprite => {
            return Err(SymbolError::Failed {
                id,
                reason: "sprite registered without its frames".to_string(),
            });
        }
    };

    if !r.is_empty() {
        tracing::trace!(id, unread = r.remaining(), "definition tag has trailing bytes");
    }
    Ok(symbol)
}

/// Last `DefineScalingGrid` attached to an id.
fn scaling_grid(extras: &[UnparsedTag], data: &[u8]) -> Option<Rect> {
    extras
        .iter()
        .filter(|tag| tag.tag_code() == TagCode::DefineScalingGrid)
        .filter_map(|tag| {
            let mut r = tag.reader(data);
            r.skip(2).and_then(|()| r.read_rect()).ok()
        })
        .last()
}
