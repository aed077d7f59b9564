//! Decoded symbol definitions.

use std::fmt;
use std::rc::Rc;

use serde::Serialize;

use crate::decoders::BinaryDefinition;
use crate::decoders::bitmap::ImageDefinition;
use crate::decoders::button::ButtonDefinition;
use crate::decoders::font::FontDefinition;
use crate::decoders::shape::{MorphShapeDefinition, ShapeDefinition};
use crate::decoders::sound::SoundDefinition;
use crate::decoders::sprite::SpriteDefinition;
use crate::decoders::text::{EditTextDefinition, LabelDefinition};
use crate::decoders::video::VideoDefinition;
use crate::error::SymbolError;

/// One resolved dictionary entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Symbol {
    Shape(ShapeDefinition),
    MorphShape(MorphShapeDefinition),
    Font(FontDefinition),
    Sprite(SpriteDefinition),
    /// Editable text field.
    Text(EditTextDefinition),
    /// Static text.
    Label(LabelDefinition),
    Button(ButtonDefinition),
    Sound(SoundDefinition),
    Image(ImageDefinition),
    Video(VideoDefinition),
    Binary(BinaryDefinition),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SymbolKind {
    Shape,
    MorphShape,
    Font,
    Sprite,
    Text,
    Label,
    Button,
    Sound,
    Image,
    Video,
    Binary,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Shape => "shape",
            Self::MorphShape => "morph-shape",
            Self::Font => "font",
            Self::Sprite => "sprite",
            Self::Text => "text",
            Self::Label => "label",
            Self::Button => "button",
            Self::Sound => "sound",
            Self::Image => "image",
            Self::Video => "video",
            Self::Binary => "binary",
        };
        f.write_str(name)
    }
}

impl Symbol {
    pub fn id(&self) -> u16 {
        match self {
            Self::Shape(s) => s.id,
            Self::MorphShape(s) => s.id,
            Self::Font(s) => s.id,
            Self::Sprite(s) => s.id,
            Self::Text(s) => s.id,
            Self::Label(s) => s.id,
            Self::Button(s) => s.id,
            Self::Sound(s) => s.id,
            Self::Image(s) => s.id,
            Self::Video(s) => s.id,
            Self::Binary(s) => s.id,
        }
    }

    pub fn kind(&self) -> SymbolKind {
        match self {
            Self::Shape(_) => SymbolKind::Shape,
            Self::MorphShape(_) => SymbolKind::MorphShape,
            Self::Font(_) => SymbolKind::Font,
            Self::Sprite(_) => SymbolKind::Sprite,
            Self::Text(_) => SymbolKind::Text,
            Self::Label(_) => SymbolKind::Label,
            Self::Button(_) => SymbolKind::Button,
            Self::Sound(_) => SymbolKind::Sound,
            Self::Image(_) => SymbolKind::Image,
            Self::Video(_) => SymbolKind::Video,
            Self::Binary(_) => SymbolKind::Binary,
        }
    }
}

impl SymbolKind {
    /// Pure graphics with no transform state of their own; the timeline
    /// wraps them in a container.
    pub fn is_graphics_only(self) -> bool {
        matches!(self, Self::Shape | Self::MorphShape | Self::Label)
    }

    /// Symbols whose appearance depends on a place-object ratio.
    pub fn accepts_ratio(self) -> bool {
        matches!(self, Self::MorphShape | Self::Video)
    }

    /// Symbols that can be placed on a display list.
    pub fn is_displayable(self) -> bool {
        !matches!(self, Self::Font | Self::Sound | Self::Binary)
    }
}

/// Resolves symbol ids while decoding or compiling.
pub trait SymbolSource {
    fn symbol(&mut self, id: u16) -> Result<Rc<Symbol>, SymbolError>;

    /// Like [`symbol`](Self::symbol), but missing or failed symbols are
    /// logged and reported as `None` so the caller can skip the reference.
    /// A cyclic reference or a symbol still waiting on its asset is an
    /// error: the caller cannot be completed yet.
    fn try_symbol(&mut self, id: u16) -> Result<Option<Rc<Symbol>>, SymbolError> {
        match self.symbol(id) {
            Ok(symbol) => Ok(Some(symbol)),
            Err(err @ (SymbolError::CyclicSymbolReference(_) | SymbolError::Pending(_))) => {
                Err(err)
            }
            Err(err) => {
                tracing::warn!(id, %err, "skipping reference to unavailable symbol");
                Ok(None)
            }
        }
    }
}
