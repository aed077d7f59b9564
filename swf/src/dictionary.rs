//! Id to symbol table with lazy, memoized resolution.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use serde::Serialize;

use crate::context::DecodeEnv;
use crate::decoders::{DecodeContext, decode_definition};
use crate::error::SymbolError;
use crate::gate::DecodedAsset;
use crate::scanner::SwfFrame;
use crate::symbol::{Symbol, SymbolKind};
use crate::tag::{DefinitionKind, UnparsedTag};

/// A definition located by the scanner but not decoded yet.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingDefinition {
    Tag {
        tag: UnparsedTag,
        kind: DefinitionKind,
    },
    /// Sprite bodies are scanned up front; only their frames are kept.
    Sprite {
        tag: UnparsedTag,
        frame_count: u16,
        frames: Vec<SwfFrame>,
    },
}

impl PendingDefinition {
    pub fn tag(&self) -> &UnparsedTag {
        match self {
            Self::Tag { tag, .. } | Self::Sprite { tag, .. } => tag,
        }
    }

    pub fn kind(&self) -> DefinitionKind {
        match self {
            Self::Tag { kind, .. } => *kind,
            Self::Sprite { .. } => DefinitionKind::Sprite,
        }
    }
}

#[derive(Debug)]
enum Slot {
    Unresolved(PendingDefinition),
    /// Being decoded further up the call stack.
    Resolving,
    Resolved(Rc<Symbol>),
    /// Decoded, but the pixel or sample data is still with an external
    /// decoder.
    AwaitingAsset(Symbol),
    Failed(String),
}

/// Where an id stands, for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SymbolState {
    Unresolved,
    Resolving,
    Resolved,
    AwaitingAsset,
    Failed,
}

#[derive(Debug, Default)]
pub struct Dictionary {
    slots: BTreeMap<u16, Slot>,
    /// Auxiliary tags targeting an id, in file order.
    extras: HashMap<u16, Vec<UnparsedTag>>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: u16) -> bool {
        self.slots.contains_key(&id)
    }

    /// Ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.slots.keys().copied()
    }

    pub fn state(&self, id: u16) -> Option<SymbolState> {
        self.slots.get(&id).map(|slot| match slot {
            Slot::Unresolved(_) => SymbolState::Unresolved,
            Slot::Resolving => SymbolState::Resolving,
            Slot::Resolved(_) => SymbolState::Resolved,
            Slot::AwaitingAsset(_) => SymbolState::AwaitingAsset,
            Slot::Failed(_) => SymbolState::Failed,
        })
    }

    /// Where an undecoded definition was found.
    pub fn pending(&self, id: u16) -> Option<&PendingDefinition> {
        match self.slots.get(&id)? {
            Slot::Unresolved(pending) => Some(pending),
            _ => None,
        }
    }

    /// Kind of an id without decoding it.
    pub fn kind(&self, id: u16) -> Option<SymbolKind> {
        match self.slots.get(&id)? {
            Slot::Unresolved(pending) => Some(kind_of(pending.kind())),
            Slot::Resolved(symbol) => Some(symbol.kind()),
            Slot::AwaitingAsset(symbol) => Some(symbol.kind()),
            Slot::Resolving | Slot::Failed(_) => None,
        }
    }

    /// Record a lazily decoded definition. The first definition of an id
    /// wins.
    pub fn register(&mut self, id: u16, pending: PendingDefinition) -> Result<(), SymbolError> {
        self.insert(id, Slot::Unresolved(pending))
    }

    /// Record a definition decoded while scanning.
    pub fn insert_resolved(&mut self, id: u16, symbol: Symbol) -> Result<(), SymbolError> {
        self.insert(id, Slot::Resolved(Rc::new(symbol)))
    }

    /// Record a definition whose asset data was handed to an external
    /// decoder. Resolving it fails with [`SymbolError::Pending`] until
    /// [`complete_asset`](Self::complete_asset) or
    /// [`fail_asset`](Self::fail_asset).
    pub fn await_asset(&mut self, id: u16, symbol: Symbol) -> Result<(), SymbolError> {
        self.insert(id, Slot::AwaitingAsset(symbol))
    }

    /// Record a definition that could not be decoded.
    pub fn insert_failed(&mut self, id: u16, reason: String) -> Result<(), SymbolError> {
        self.insert(id, Slot::Failed(reason))
    }

    fn insert(&mut self, id: u16, slot: Slot) -> Result<(), SymbolError> {
        if self.slots.contains_key(&id) {
            return Err(SymbolError::Duplicate(id));
        }
        self.slots.insert(id, slot);
        Ok(())
    }

    /// Attach decoded asset data to an id waiting on it.
    pub fn complete_asset(&mut self, id: u16, asset: DecodedAsset) -> Result<(), SymbolError> {
        let slot = self.slots.get_mut(&id).ok_or(SymbolError::Undefined(id))?;
        let Slot::AwaitingAsset(symbol) = &mut *slot else {
            return Err(SymbolError::Failed {
                id,
                reason: "symbol is not waiting on an asset".to_string(),
            });
        };
        let mismatch = match (symbol, asset) {
            (Symbol::Image(image), DecodedAsset::Image(decoded)) => {
                image.decoded = Some(decoded);
                None
            }
            (Symbol::Sound(sound), DecodedAsset::Sound(decoded)) => {
                sound.decoded = Some(decoded);
                None
            }
            (symbol, _) => Some(format!("asset does not match {} symbol", symbol.kind())),
        };
        if let Some(reason) = mismatch {
            *slot = Slot::Failed(reason.clone());
            return Err(SymbolError::Failed { id, reason });
        }
        if let Slot::AwaitingAsset(symbol) = std::mem::replace(slot, Slot::Resolving) {
            *slot = Slot::Resolved(Rc::new(symbol));
        }
        Ok(())
    }

    /// The external decoder gave up on `id`. References to it are skipped
    /// by timelines. Only ids waiting on an asset are affected; returns
    /// whether the slot changed.
    pub fn fail_asset(&mut self, id: u16, reason: impl Into<String>) -> bool {
        let Some(slot) = self.slots.get_mut(&id) else {
            return false;
        };
        if !matches!(slot, Slot::AwaitingAsset(_)) {
            return false;
        }
        let reason = reason.into();
        tracing::warn!(id, %reason, "asset failed");
        *slot = Slot::Failed(reason);
        true
    }

    pub fn attach_extra(&mut self, id: u16, tag: UnparsedTag) {
        self.extras.entry(id).or_default().push(tag);
    }

    pub fn extras(&self, id: u16) -> &[UnparsedTag] {
        self.extras.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Modify an already decoded symbol in place. Returns `false` if the id
    /// is not decoded.
    pub fn with_resolved_mut(&mut self, id: u16, f: impl FnOnce(&mut Symbol)) -> bool {
        match self.slots.get_mut(&id) {
            Some(Slot::Resolved(symbol)) => {
                f(Rc::make_mut(symbol));
                true
            }
            Some(Slot::AwaitingAsset(symbol)) => {
                f(symbol);
                true
            }
            _ => false,
        }
    }

    /// The decoded symbol for `id`, if it has been decoded. Never decodes.
    pub fn get(&self, id: u16) -> Option<Rc<Symbol>> {
        match self.slots.get(&id)? {
            Slot::Resolved(symbol) => Some(Rc::clone(symbol)),
            _ => None,
        }
    }

    /// Decode `id` if needed and return it. Nested references resolve
    /// through this dictionary; an id reached again while it is being
    /// decoded fails with [`SymbolError::CyclicSymbolReference`] and is left
    /// unresolved so a later call can retry it. The same holds when a
    /// dependency is still waiting on its asset.
    pub(crate) fn resolve(&mut self, env: DecodeEnv<'_>, id: u16) -> Result<Rc<Symbol>, SymbolError> {
        let slot = self.slots.get_mut(&id).ok_or(SymbolError::Undefined(id))?;
        let pending = match std::mem::replace(slot, Slot::Resolving) {
            Slot::Unresolved(pending) => pending,
            Slot::Resolving => return Err(SymbolError::CyclicSymbolReference(id)),
            Slot::Resolved(symbol) => {
                *slot = Slot::Resolved(Rc::clone(&symbol));
                return Ok(symbol);
            }
            Slot::AwaitingAsset(symbol) => {
                *slot = Slot::AwaitingAsset(symbol);
                return Err(SymbolError::Pending(id));
            }
            Slot::Failed(reason) => {
                let err = SymbolError::Failed {
                    id,
                    reason: reason.clone(),
                };
                *slot = Slot::Failed(reason);
                return Err(err);
            }
        };

        tracing::trace!(id, kind = ?pending.kind(), "decoding symbol");
        let extras = self.extras.get(&id).cloned().unwrap_or_default();
        let result = decode_definition(
            &mut DecodeContext {
                env,
                dictionary: self,
            },
            id,
            &pending,
            &extras,
        );

        match result {
            Ok(symbol) => {
                let symbol = Rc::new(symbol);
                self.slots.insert(id, Slot::Resolved(Rc::clone(&symbol)));
                Ok(symbol)
            }
            Err(err @ (SymbolError::CyclicSymbolReference(_) | SymbolError::Pending(_))) => {
                self.slots.insert(id, Slot::Unresolved(pending));
                Err(err)
            }
            Err(err) => {
                tracing::warn!(id, %err, "failed to decode symbol");
                self.slots.insert(id, Slot::Failed(err.to_string()));
                Err(err)
            }
        }
    }
}

fn kind_of(kind: DefinitionKind) -> SymbolKind {
    match kind {
        DefinitionKind::Shape(_) => SymbolKind::Shape,
        DefinitionKind::MorphShape(_) => SymbolKind::MorphShape,
        DefinitionKind::Font(_) => SymbolKind::Font,
        DefinitionKind::Label(_) => SymbolKind::Label,
        DefinitionKind::EditText => SymbolKind::Text,
        DefinitionKind::Button(_) => SymbolKind::Button,
        DefinitionKind::Sound => SymbolKind::Sound,
        DefinitionKind::Jpeg(_) | DefinitionKind::Lossless(_) => SymbolKind::Image,
        DefinitionKind::Sprite => SymbolKind::Sprite,
        DefinitionKind::Video => SymbolKind::Video,
        DefinitionKind::Binary => SymbolKind::Binary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FontRegistry;
    use crate::tag::TagCode;

    fn binary_tag(data: &mut Vec<u8>, id: u16) -> PendingDefinition {
        let offset = data.len();
        data.extend_from_slice(&id.to_le_bytes());
        data.extend_from_slice(&[0, 0, 0, 0, 0xAB]);
        PendingDefinition::Tag {
            tag: UnparsedTag {
                code: TagCode::DefineBinaryData.to_u16(),
                byte_offset: offset as u32,
                byte_length: 7,
            },
            kind: DefinitionKind::Binary,
        }
    }

    #[test]
    fn test_resolve_is_memoized() {
        let mut data = Vec::new();
        let pending = binary_tag(&mut data, 4);
        let mut dictionary = Dictionary::new();
        dictionary.register(4, pending).unwrap();
        assert_eq!(dictionary.state(4), Some(SymbolState::Unresolved));
        assert_eq!(dictionary.kind(4), Some(SymbolKind::Binary));

        let fonts = FontRegistry::default();
        let env = DecodeEnv {
            data: &data,
            version: 10,
            fonts: &fonts,
        };
        let first = dictionary.resolve(env, 4).unwrap();
        let second = dictionary.resolve(env, 4).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(dictionary.state(4), Some(SymbolState::Resolved));
    }

    #[test]
    fn test_duplicate_keeps_first() {
        let mut data = Vec::new();
        let first = binary_tag(&mut data, 4);
        let second = binary_tag(&mut data, 4);
        let mut dictionary = Dictionary::new();
        dictionary.register(4, first.clone()).unwrap();
        assert_eq!(dictionary.register(4, second), Err(SymbolError::Duplicate(4)));
        assert_eq!(dictionary.len(), 1);
    }

    #[test]
    fn test_undefined_and_failed() {
        let mut data = Vec::new();
        let mut pending = binary_tag(&mut data, 4);
        if let PendingDefinition::Tag { tag, .. } = &mut pending {
            tag.byte_length = 3;
        }
        let mut dictionary = Dictionary::new();
        dictionary.register(4, pending).unwrap();

        let fonts = FontRegistry::default();
        let env = DecodeEnv {
            data: &data,
            version: 10,
            fonts: &fonts,
        };
        assert_eq!(dictionary.resolve(env, 9), Err(SymbolError::Undefined(9)));
        assert!(matches!(
            dictionary.resolve(env, 4),
            Err(SymbolError::Decode { id: 4, .. })
        ));
        assert!(matches!(
            dictionary.resolve(env, 4),
            Err(SymbolError::Failed { id: 4, .. })
        ));
    }

    #[test]
    fn test_asset_completion() {
        use crate::decoders::sound::{DecodedSound, SoundDefinition, SoundFormat, SoundHeader};
        use crate::tag::ByteSpan;

        let sound = SoundDefinition {
            id: 2,
            header: SoundHeader {
                format: SoundFormat::UncompressedLittleEndian,
                sample_rate: 44100,
                is_16_bit: true,
                is_stereo: false,
            },
            sample_count: 1,
            seek_samples: None,
            data: ByteSpan::new(0, 2),
            decoded: None,
        };
        let mut dictionary = Dictionary::new();
        dictionary.await_asset(2, Symbol::Sound(sound)).unwrap();
        assert_eq!(dictionary.state(2), Some(SymbolState::AwaitingAsset));

        let decoded = DecodedSound {
            sample_rate: 44100,
            channels: 1,
            samples: vec![7],
        };
        dictionary.complete_asset(2, DecodedAsset::Sound(decoded)).unwrap();
        let Some(symbol) = dictionary.get(2) else {
            panic!("sound was not resolved");
        };
        let Symbol::Sound(sound) = &*symbol else {
            panic!("expected a sound");
        };
        assert_eq!(sound.decoded.as_ref().map(|d| d.samples.clone()), Some(vec![7]));
    }
}
