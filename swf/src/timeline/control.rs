//! Per-frame display-list directives decoded from control tags.

use serde::Serialize;

use crate::bit_reader::BitReader;
use crate::error::ReaderError;
use crate::reader::{BlendMode, ColorTransform, Filter, Matrix, Rgba, SoundInfo};
use crate::scanner::SwfFrame;
use crate::tag::{ByteSpan, TagCode, UnparsedTag};

type Result<T> = std::result::Result<T, ReaderError>;

/// Clip-event flag for key presses; such records carry a key code.
const CLIP_EVENT_KEY_PRESS: u32 = 0x0002_0000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClipAction {
    /// Raw clip-event flags.
    pub events: u32,
    pub key_code: Option<u8>,
    pub actions: ByteSpan,
}

/// One place-object directive of any version. `None` fields were absent
/// from the tag and leave the instance unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PlaceObject {
    pub version: u8,
    pub depth: u16,
    pub is_move: bool,
    pub character_id: Option<u16>,
    pub matrix: Option<Matrix>,
    pub color_transform: Option<ColorTransform>,
    pub ratio: Option<u16>,
    pub name: Option<String>,
    pub clip_depth: Option<u16>,
    pub class_name: Option<String>,
    pub filters: Option<Vec<Filter>>,
    pub blend_mode: Option<BlendMode>,
    pub cache_as_bitmap: Option<bool>,
    pub visible: Option<bool>,
    pub background_color: Option<Rgba>,
    pub clip_actions: Option<Vec<ClipAction>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SoundTarget {
    Symbol(u16),
    /// Sound referenced through its exported class name.
    Class(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ControlDirective {
    Place(PlaceObject),
    Remove {
        depth: u16,
        character_id: Option<u16>,
    },
    StartSound {
        target: SoundTarget,
        info: SoundInfo,
    },
}

/// The compiler's view of one source frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameDirectives {
    pub labels: Vec<String>,
    pub commands: Vec<ControlDirective>,
    /// The source frame carried control tags, even if none decoded.
    pub had_control_tags: bool,
    pub action_blocks: Vec<ByteSpan>,
    pub sound_stream_block: Option<ByteSpan>,
}

impl FrameDirectives {
    /// Decode the control tags of a scanned frame. A tag that fails to
    /// decode is dropped with a warning and does not affect the others.
    pub fn from_frame(frame: &SwfFrame, data: &[u8], version: u8) -> Self {
        let commands = frame
            .control_tags
            .iter()
            .filter_map(|tag| match decode_control_tag(tag, data, version) {
                Ok(directive) => directive,
                Err(err) => {
                    tracing::warn!(
                        code = tag.code,
                        offset = tag.byte_offset,
                        %err,
                        "dropping malformed control tag"
                    );
                    None
                }
            })
            .collect();

        Self {
            labels: frame.labels.clone(),
            commands,
            had_control_tags: !frame.control_tags.is_empty(),
            action_blocks: frame.action_blocks.clone(),
            sound_stream_block: frame.sound_stream_block,
        }
    }

    /// No control tags, labels or actions: the frame extends the previous
    /// keyframe.
    pub fn is_empty(&self) -> bool {
        !self.had_control_tags
            && self.commands.is_empty()
            && self.labels.is_empty()
            && self.action_blocks.is_empty()
    }
}

pub fn decode_control_tag(
    tag: &UnparsedTag,
    data: &[u8],
    version: u8,
) -> Result<Option<ControlDirective>> {
    let mut r = tag.reader(data);
    let directive = match tag.tag_code() {
        TagCode::PlaceObject => ControlDirective::Place(read_place_object1(&mut r)?),
        TagCode::PlaceObject2 => ControlDirective::Place(read_place_object2(&mut r, 2, version)?),
        TagCode::PlaceObject3 => ControlDirective::Place(read_place_object2(&mut r, 3, version)?),
        TagCode::RemoveObject => {
            let character_id = r.read_u16()?;
            ControlDirective::Remove {
                depth: r.read_u16()?,
                character_id: Some(character_id),
            }
        }
        TagCode::RemoveObject2 => ControlDirective::Remove {
            depth: r.read_u16()?,
            character_id: None,
        },
        TagCode::StartSound => {
            let id = r.read_u16()?;
            ControlDirective::StartSound {
                target: SoundTarget::Symbol(id),
                info: r.read_sound_info()?,
            }
        }
        TagCode::StartSound2 => {
            let class_name = r.read_string(None)?;
            ControlDirective::StartSound {
                target: SoundTarget::Class(class_name),
                info: r.read_sound_info()?,
            }
        }
        other => {
            tracing::trace!(?other, "not a display-list directive");
            return Ok(None);
        }
    };
    Ok(Some(directive))
}

fn read_place_object1(r: &mut BitReader<'_>) -> Result<PlaceObject> {
    let character_id = r.read_u16()?;
    let depth = r.read_u16()?;
    let matrix = r.read_matrix()?;
    let color_transform = if r.is_empty() {
        None
    } else {
        Some(r.read_color_transform(false)?)
    };
    Ok(PlaceObject {
        version: 1,
        depth,
        character_id: Some(character_id),
        matrix: Some(matrix),
        color_transform,
        ..PlaceObject::default()
    })
}

/// Versions 2 and 3 share a layout; version 3 adds a second flag byte and
/// the fields it guards.
fn read_place_object2(r: &mut BitReader<'_>, tag_version: u8, swf_version: u8) -> Result<PlaceObject> {
    let flags = r.read_u8()?;
    let flags3 = if tag_version >= 3 { r.read_u8()? } else { 0 };
    let depth = r.read_u16()?;

    let has_clip_actions = flags & 0x80 != 0;
    let has_clip_depth = flags & 0x40 != 0;
    let has_name = flags & 0x20 != 0;
    let has_ratio = flags & 0x10 != 0;
    let has_color_transform = flags & 0x08 != 0;
    let has_matrix = flags & 0x04 != 0;
    let has_character = flags & 0x02 != 0;
    let is_move = flags & 0x01 != 0;

    let has_background = flags3 & 0x40 != 0;
    let has_visible = flags3 & 0x20 != 0;
    let has_image = flags3 & 0x10 != 0;
    let has_class_name = flags3 & 0x08 != 0;
    let has_cache_as_bitmap = flags3 & 0x04 != 0;
    let has_blend_mode = flags3 & 0x02 != 0;
    let has_filters = flags3 & 0x01 != 0;

    let mut place = PlaceObject {
        version: tag_version,
        depth,
        is_move,
        ..PlaceObject::default()
    };

    if has_class_name || (has_image && has_character) {
        place.class_name = Some(r.read_string(None)?);
    }
    if has_character {
        place.character_id = Some(r.read_u16()?);
    }
    if has_matrix {
        place.matrix = Some(r.read_matrix()?);
    }
    if has_color_transform {
        place.color_transform = Some(r.read_color_transform(true)?);
    }
    if has_ratio {
        place.ratio = Some(r.read_u16()?);
    }
    if has_name {
        place.name = Some(r.read_string(None)?);
    }
    if has_clip_depth {
        place.clip_depth = Some(r.read_u16()?);
    }
    if has_filters {
        place.filters = Some(r.read_filters()?);
    }
    if has_blend_mode {
        place.blend_mode = Some(BlendMode::from_u8(r.read_u8()?));
    }
    if has_cache_as_bitmap {
        // Some writers set the flag without the byte.
        place.cache_as_bitmap = Some(if r.is_empty() { true } else { r.read_u8()? != 0 });
    }
    if has_visible {
        place.visible = Some(r.read_u8()? != 0);
    }
    if has_background {
        place.background_color = Some(r.read_rgba()?);
    }
    if has_clip_actions {
        place.clip_actions = Some(read_clip_actions(r, swf_version)?);
    }
    Ok(place)
}

fn read_clip_event_flags(r: &mut BitReader<'_>, swf_version: u8) -> Result<u32> {
    if swf_version <= 5 {
        Ok(u32::from(r.read_u16()?))
    } else {
        r.read_u32()
    }
}

fn read_clip_actions(r: &mut BitReader<'_>, swf_version: u8) -> Result<Vec<ClipAction>> {
    r.read_u16()?;
    read_clip_event_flags(r, swf_version)?;
    let mut actions = Vec::new();
    while !r.is_empty() {
        let events = read_clip_event_flags(r, swf_version)?;
        if events == 0 {
            break;
        }
        let mut length = r.read_u32()? as usize;
        let key_code = if events & CLIP_EVENT_KEY_PRESS != 0 {
            length = length.saturating_sub(1);
            Some(r.read_u8()?)
        } else {
            None
        };
        let start = r.position();
        r.skip(length)?;
        actions.push(ClipAction {
            events,
            key_code,
            actions: ByteSpan::new(start, length),
        });
    }
    Ok(actions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(code: TagCode, body: &[u8]) -> (UnparsedTag, Vec<u8>) {
        (
            UnparsedTag {
                code: code.to_u16(),
                byte_offset: 0,
                byte_length: body.len() as u32,
            },
            body.to_vec(),
        )
    }

    #[test]
    fn test_malformed_control_tag_keeps_frame() {
        let (tag, data) = tag(TagCode::RemoveObject2, &[0x01]);
        let frame = SwfFrame {
            control_tags: vec![tag],
            ..SwfFrame::default()
        };
        let directives = FrameDirectives::from_frame(&frame, &data, 10);
        assert!(directives.commands.is_empty());
        assert!(!directives.is_empty());
        assert!(FrameDirectives::from_frame(&SwfFrame::default(), &data, 10).is_empty());
    }

    #[test]
    fn test_place_object2_fields() {
        let mut body = vec![0x26]; // name, matrix, character
        body.extend_from_slice(&3u16.to_le_bytes());
        body.extend_from_slice(&10u16.to_le_bytes());
        body.push(0x00); // identity matrix
        body.extend_from_slice(b"ball\0");
        let (tag, data) = tag(TagCode::PlaceObject2, &body);

        let Some(ControlDirective::Place(place)) = decode_control_tag(&tag, &data, 8).unwrap()
        else {
            panic!("expected a place directive");
        };
        assert_eq!(place.depth, 3);
        assert_eq!(place.character_id, Some(10));
        assert_eq!(place.matrix, Some(Matrix::IDENTITY));
        assert_eq!(place.name.as_deref(), Some("ball"));
        assert!(!place.is_move);
    }

    #[test]
    fn test_place_object3_blend_and_visibility() {
        let body = [0x01, 0x22, 0x05, 0x00, 0x03, 0x00];
        let (tag, data) = tag(TagCode::PlaceObject3, &body);

        let Some(ControlDirective::Place(place)) = decode_control_tag(&tag, &data, 10).unwrap()
        else {
            panic!("expected a place directive");
        };
        assert!(place.is_move);
        assert_eq!(place.depth, 5);
        assert_eq!(place.blend_mode, Some(BlendMode::from_u8(3)));
        assert_eq!(place.visible, Some(false));
    }

    #[test]
    fn test_remove_and_sound() {
        let (remove, data) = tag(TagCode::RemoveObject2, &7u16.to_le_bytes());
        assert_eq!(
            decode_control_tag(&remove, &data, 8).unwrap(),
            Some(ControlDirective::Remove {
                depth: 7,
                character_id: None
            })
        );

        let mut body = 4u16.to_le_bytes().to_vec();
        body.push(0x20); // sync stop
        let (sound, data) = tag(TagCode::StartSound, &body);
        let Some(ControlDirective::StartSound { target, info }) =
            decode_control_tag(&sound, &data, 8).unwrap()
        else {
            panic!("expected a sound directive");
        };
        assert_eq!(target, SoundTarget::Symbol(4));
        assert!(info.sync_stop);
    }

    #[test]
    fn test_clip_actions_with_key_press() {
        let mut body = vec![0x80]; // clip actions only
        body.extend_from_slice(&1u16.to_le_bytes());
        body.extend_from_slice(&0u16.to_le_bytes());
        body.extend_from_slice(&CLIP_EVENT_KEY_PRESS.to_le_bytes());
        body.extend_from_slice(&CLIP_EVENT_KEY_PRESS.to_le_bytes());
        body.extend_from_slice(&3u32.to_le_bytes());
        body.push(13);
        body.extend_from_slice(&[0x07, 0x00]);
        body.extend_from_slice(&0u32.to_le_bytes());
        let (tag, data) = tag(TagCode::PlaceObject2, &body);

        let Some(ControlDirective::Place(place)) = decode_control_tag(&tag, &data, 6).unwrap()
        else {
            panic!("expected a place directive");
        };
        let actions = place.clip_actions.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].key_code, Some(13));
        assert_eq!(actions[0].actions, ByteSpan::new(18, 2));
    }
}
