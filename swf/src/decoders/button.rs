//! `DefineButton`/`DefineButton2` and their auxiliary tags.
//!
//! A button's four states are compiled as a four-frame timeline in button
//! mode, so hosts drive buttons with the same program format as sprites.

use bitflags::bitflags;
use serde::Serialize;

use crate::bit_reader::BitReader;
use crate::decoders::DecodeContext;
use crate::error::{ReaderError, SymbolError};
use crate::reader::{BlendMode, ColorTransform, Filter, Matrix, SoundInfo};
use crate::tag::{ByteSpan, TagCode, UnparsedTag};
use crate::timeline::{ControlDirective, FrameDirectives, PlaceObject, TimelineCompiler, TimelineProgram};

/// Frame labels given to the synthesized state frames.
pub const STATE_LABELS: [&str; 4] = ["_up", "_over", "_down", "_hit"];

bitflags! {
    /// States a button record is shown in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct ButtonStates: u8 {
        const UP = 0x01;
        const OVER = 0x02;
        const DOWN = 0x04;
        const HIT_TEST = 0x08;
    }
}

bitflags! {
    /// State transitions that trigger a button action. The top seven bits
    /// hold a key code instead and are split off into
    /// [`ButtonAction::key_code`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
    pub struct ButtonConditions: u16 {
        const IDLE_TO_OVER_UP = 1 << 0;
        const OVER_UP_TO_IDLE = 1 << 1;
        const OVER_UP_TO_OVER_DOWN = 1 << 2;
        const OVER_DOWN_TO_OVER_UP = 1 << 3;
        const OVER_DOWN_TO_OUT_DOWN = 1 << 4;
        const OUT_DOWN_TO_OVER_DOWN = 1 << 5;
        const OUT_DOWN_TO_IDLE = 1 << 6;
        const IDLE_TO_OVER_DOWN = 1 << 7;
        const OVER_DOWN_TO_IDLE = 1 << 8;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ButtonRecord {
    pub states: ButtonStates,
    pub character_id: u16,
    pub depth: u16,
    pub matrix: Matrix,
    pub color_transform: Option<ColorTransform>,
    pub filters: Vec<Filter>,
    pub blend_mode: Option<BlendMode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ButtonAction {
    pub conditions: ButtonConditions,
    pub key_code: Option<u8>,
    pub actions: ByteSpan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ButtonSound {
    pub sound_id: u16,
    pub info: SoundInfo,
}

/// Sounds played on `OverUpToIdle`, `IdleToOverUp`, `OverUpToOverDown` and
/// `OverDownToOverUp`, in that order.
pub type ButtonSounds = [Option<ButtonSound>; 4];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ButtonDefinition {
    pub id: u16,
    pub version: u8,
    pub track_as_menu: bool,
    pub records: Vec<ButtonRecord>,
    /// One keyframe per state, labelled with [`STATE_LABELS`].
    pub states: TimelineProgram,
    pub actions: Vec<ButtonAction>,
    pub sounds: ButtonSounds,
}

/// Button fields read from the definition tag itself.
#[derive(Debug)]
struct RawButton {
    id: u16,
    track_as_menu: bool,
    records: Vec<ButtonRecord>,
    actions: Vec<ButtonAction>,
}

pub(crate) fn decode_button(
    cx: &mut DecodeContext<'_>,
    id: u16,
    r: &mut BitReader<'_>,
    version: u8,
    extras: &[UnparsedTag],
) -> Result<ButtonDefinition, SymbolError> {
    let data = cx.env.data;
    let mut button = read_button(r, version).map_err(|source| SymbolError::Decode { id, source })?;
    let mut sounds = ButtonSounds::default();

    for extra in extras {
        let result = match extra.tag_code() {
            TagCode::DefineButtonCxform => read_button_cxform(&mut extra.reader(data)).map(|cxform| {
                if version == 1 {
                    for record in &mut button.records {
                        record.color_transform = Some(cxform);
                    }
                }
            }),
            TagCode::DefineButtonSound => {
                read_button_sounds(&mut extra.reader(data)).map(|read| sounds = read)
            }
            _ => Ok(()),
        };
        if let Err(err) = result {
            tracing::warn!(id, code = extra.code, %err, "ignoring malformed button auxiliary tag");
        }
    }

    let frames = state_frames(&button.records);
    let states = TimelineCompiler::new(cx.env.version)
        .button_mode(true)
        .compile(&frames, cx)?;
    Ok(ButtonDefinition {
        id: button.id,
        version,
        track_as_menu: button.track_as_menu,
        records: button.records,
        states,
        actions: button.actions,
        sounds,
    })
}

fn read_button(r: &mut BitReader<'_>, version: u8) -> Result<RawButton, ReaderError> {
    let id = r.read_u16()?;
    let mut track_as_menu = false;
    let mut action_offset = 0;
    if version >= 2 {
        track_as_menu = r.read_u8()? & 0x01 != 0;
        let offset_position = r.position();
        action_offset = usize::from(r.read_u16()?);
        if action_offset != 0 {
            action_offset += offset_position;
        }
    }

    let mut records = Vec::new();
    loop {
        let flags = r.read_u8()?;
        if flags == 0 {
            break;
        }
        records.push(read_button_record(r, flags, version)?);
    }

    let actions = if version == 1 {
        let start = r.position();
        let bytes = r.read_rest();
        vec![ButtonAction {
            conditions: ButtonConditions::OVER_DOWN_TO_OVER_UP,
            key_code: None,
            actions: ByteSpan::new(start, bytes.len()),
        }]
    } else if action_offset != 0 {
        r.seek(action_offset.min(r.end()));
        read_condition_actions(r)?
    } else {
        Vec::new()
    };

    Ok(RawButton {
        id,
        track_as_menu,
        records,
        actions,
    })
}

fn read_button_record(r: &mut BitReader<'_>, flags: u8, version: u8) -> Result<ButtonRecord, ReaderError> {
    let states = ButtonStates::from_bits_truncate(flags);
    let character_id = r.read_u16()?;
    let depth = r.read_u16()?;
    let matrix = r.read_matrix()?;
    let mut record = ButtonRecord {
        states,
        character_id,
        depth,
        matrix,
        color_transform: None,
        filters: Vec::new(),
        blend_mode: None,
    };
    if version >= 2 {
        record.color_transform = Some(r.read_color_transform(true)?);
        if flags & 0x10 != 0 {
            record.filters = r.read_filters()?;
        }
        if flags & 0x20 != 0 {
            record.blend_mode = Some(BlendMode::from_u8(r.read_u8()?));
        }
    }
    Ok(record)
}

fn read_condition_actions(r: &mut BitReader<'_>) -> Result<Vec<ButtonAction>, ReaderError> {
    let mut actions = Vec::new();
    loop {
        let record_start = r.position();
        let size = usize::from(r.read_u16()?);
        let flags = r.read_u16()?;
        let body_start = r.position();
        let end = if size == 0 {
            r.end()
        } else {
            (record_start + size).min(r.end())
        };
        let key_code = (flags >> 9) as u8;
        actions.push(ButtonAction {
            conditions: ButtonConditions::from_bits_truncate(flags),
            key_code: (key_code != 0).then_some(key_code),
            actions: ByteSpan::new(body_start, end.saturating_sub(body_start)),
        });
        if size == 0 || end >= r.end() {
            break;
        }
        r.seek(end);
    }
    Ok(actions)
}

fn read_button_cxform(r: &mut BitReader<'_>) -> Result<ColorTransform, ReaderError> {
    r.read_u16()?;
    r.read_color_transform(false)
}

fn read_button_sounds(r: &mut BitReader<'_>) -> Result<ButtonSounds, ReaderError> {
    r.read_u16()?;
    let mut sounds = ButtonSounds::default();
    for slot in &mut sounds {
        let sound_id = r.read_u16()?;
        if sound_id != 0 {
            *slot = Some(ButtonSound {
                sound_id,
                info: r.read_sound_info()?,
            });
        }
    }
    Ok(sounds)
}

/// One frame per state holding the records shown in it.
fn state_frames(records: &[ButtonRecord]) -> Vec<FrameDirectives> {
    let states = [
        ButtonStates::UP,
        ButtonStates::OVER,
        ButtonStates::DOWN,
        ButtonStates::HIT_TEST,
    ];
    states
        .iter()
        .zip(STATE_LABELS)
        .map(|(state, label)| FrameDirectives {
            labels: vec![label.to_string()],
            commands: records
                .iter()
                .filter(|record| record.states.contains(*state))
                .map(|record| {
                    ControlDirective::Place(PlaceObject {
                        version: 2,
                        depth: record.depth,
                        character_id: Some(record.character_id),
                        matrix: Some(record.matrix),
                        color_transform: record.color_transform,
                        filters: (!record.filters.is_empty()).then(|| record.filters.clone()),
                        blend_mode: record.blend_mode,
                        ..PlaceObject::default()
                    })
                })
                .collect(),
            ..FrameDirectives::default()
        })
        .collect()
}
