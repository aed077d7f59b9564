//! Compiled timelines.
//!
//! A [`TimelineProgram`] is a flat, randomly seekable description of how a
//! display list changes: one entry per keyframe in each command stream, with
//! property updates stored as typed payload arrays. Applying keyframes
//! `0..=k` in order to an empty display list reproduces frame
//! `keyframe_first_frames[k]`.

mod compiler;
pub mod control;
pub mod session;

use bitflags::bitflags;
use serde::Serialize;

use crate::reader::{Filter, SoundInfo};
use crate::tag::ByteSpan;

pub use compiler::{TimelineCompiler, normalize_matrix};
pub use control::{ClipAction, ControlDirective, FrameDirectives, PlaceObject, SoundTarget};
pub use session::SessionInfo;

bitflags! {
    /// Which command groups a keyframe contains.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
    pub struct FrameRecipe: u8 {
        const REMOVE = 0x01;
        const ADD = 0x02;
        const UPDATE = 0x04;
        const SOUND = 0x08;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RemoveCommand {
    pub session_id: u32,
    pub depth: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AddCommand {
    pub session_id: u32,
    pub depth: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpdateCommand {
    pub session_id: u32,
    pub depth: u16,
    /// First entry in `property_types`/`property_indices`.
    pub property_start: u32,
    pub property_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoundCommand {
    pub target: SoundTarget,
    pub info: SoundInfo,
}

/// Commands of one kind for every keyframe: keyframe `k` owns
/// `commands[index[k]..index[k] + length[k]]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandStream<T> {
    pub index: Box<[u32]>,
    pub length: Box<[u32]>,
    pub commands: Box<[T]>,
}

impl<T> CommandStream<T> {
    pub fn for_keyframe(&self, keyframe: usize) -> &[T] {
        match (self.index.get(keyframe), self.length.get(keyframe)) {
            (Some(&start), Some(&length)) => {
                let start = start as usize;
                self.commands
                    .get(start..start + length as usize)
                    .unwrap_or(&[])
            }
            _ => &[],
        }
    }
}

/// Property kinds an update command can carry, and the payload array each
/// one indexes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum PropertyType {
    /// `matrices`
    Matrix,
    /// `color_transforms`
    ColorTransform,
    /// `strings`
    Name,
    /// `ints`
    Ratio,
    /// `mask_lists`
    Masks,
    /// `ints`, 0 or 1
    IsMask,
    /// `ints`
    BlendMode,
    /// `filters`
    Filters,
    /// `ints`, 0 or 1
    Visible,
    /// `ints`, 0 or 1
    CacheAsBitmap,
    /// `ints`, ARGB
    OpaqueBackground,
    /// `ints`, the new graphics symbol id
    SwapGraphics,
    /// `strings`
    ClassName,
    /// `clip_actions`
    ClipActions,
}

/// Typed property payloads shared by every update in a program.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PropertyPayloads {
    pub ints: Box<[i32]>,
    pub matrices: Box<[[f32; 6]]>,
    pub color_transforms: Box<[[f32; 8]]>,
    pub strings: Box<[String]>,
    pub filters: Box<[Vec<Filter>]>,
    pub mask_lists: Box<[Box<[u32]>]>,
    pub clip_actions: Box<[Vec<ClipAction>]>,
}

/// A property resolved against its payload array.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyValue<'a> {
    Matrix(&'a [f32; 6]),
    ColorTransform(&'a [f32; 8]),
    Name(&'a str),
    Ratio(i32),
    Masks(&'a [u32]),
    IsMask(bool),
    BlendMode(i32),
    Filters(&'a [Filter]),
    Visible(bool),
    CacheAsBitmap(bool),
    OpaqueBackground(u32),
    SwapGraphics(u16),
    ClassName(&'a str),
    ClipActions(&'a [ClipAction]),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameLabel {
    pub name: String,
    pub keyframe: u32,
    pub frame: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameScript {
    pub keyframe: u32,
    pub actions: ByteSpan,
}

/// Streaming sound data for one source frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamBlock {
    pub frame: u32,
    pub data: ByteSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineProgram {
    pub frame_count: u32,
    pub is_button: bool,
    /// Source frames covered by each keyframe; sums to `frame_count`.
    pub keyframe_durations: Box<[u32]>,
    pub keyframe_first_frames: Box<[u32]>,
    pub frame_to_keyframe: Box<[u32]>,
    pub frame_recipes: Box<[FrameRecipe]>,
    pub removes: CommandStream<RemoveCommand>,
    pub adds: CommandStream<AddCommand>,
    pub updates: CommandStream<UpdateCommand>,
    pub sounds: CommandStream<SoundCommand>,
    pub property_types: Box<[PropertyType]>,
    pub property_indices: Box<[u32]>,
    pub payloads: PropertyPayloads,
    pub labels: Box<[FrameLabel]>,
    /// Labels of files before version 7 are matched case-insensitively and
    /// stored lower-cased.
    pub case_sensitive_labels: bool,
    pub frame_scripts: Box<[FrameScript]>,
    pub stream_blocks: Box<[StreamBlock]>,
    /// Indexed by session id.
    pub sessions: Box<[SessionInfo]>,
}

impl TimelineProgram {
    pub fn keyframe_count(&self) -> usize {
        self.keyframe_durations.len()
    }

    pub fn keyframe_for_frame(&self, frame: u32) -> Option<u32> {
        self.frame_to_keyframe.get(frame as usize).copied()
    }

    /// Keyframe a label points at.
    pub fn label_keyframe(&self, name: &str) -> Option<u32> {
        let folded;
        let name = if self.case_sensitive_labels {
            name
        } else {
            folded = name.to_lowercase();
            folded.as_str()
        };
        self.labels
            .iter()
            .find(|label| label.name == name)
            .map(|label| label.keyframe)
    }

    pub fn scripts_for_keyframe(&self, keyframe: u32) -> impl Iterator<Item = ByteSpan> + '_ {
        self.frame_scripts
            .iter()
            .filter(move |script| script.keyframe == keyframe)
            .map(|script| script.actions)
    }

    /// Properties carried by one update command, in emission order.
    pub fn properties(&self, update: &UpdateCommand) -> impl Iterator<Item = PropertyValue<'_>> {
        let start = update.property_start as usize;
        let end = start + update.property_count as usize;
        (start..end).filter_map(move |i| self.property(i))
    }

    pub fn property(&self, index: usize) -> Option<PropertyValue<'_>> {
        let ty = *self.property_types.get(index)?;
        let at = *self.property_indices.get(index)? as usize;
        let payloads = &self.payloads;
        let int = || payloads.ints.get(at).copied();
        let value = match ty {
            PropertyType::Matrix => PropertyValue::Matrix(payloads.matrices.get(at)?),
            PropertyType::ColorTransform => {
                PropertyValue::ColorTransform(payloads.color_transforms.get(at)?)
            }
            PropertyType::Name => PropertyValue::Name(payloads.strings.get(at)?),
            PropertyType::ClassName => PropertyValue::ClassName(payloads.strings.get(at)?),
            PropertyType::Ratio => PropertyValue::Ratio(int()?),
            PropertyType::Masks => PropertyValue::Masks(payloads.mask_lists.get(at)?),
            PropertyType::IsMask => PropertyValue::IsMask(int()? != 0),
            PropertyType::BlendMode => PropertyValue::BlendMode(int()?),
            PropertyType::Filters => PropertyValue::Filters(payloads.filters.get(at)?),
            PropertyType::Visible => PropertyValue::Visible(int()? != 0),
            PropertyType::CacheAsBitmap => PropertyValue::CacheAsBitmap(int()? != 0),
            PropertyType::OpaqueBackground => PropertyValue::OpaqueBackground(int()? as u32),
            PropertyType::SwapGraphics => PropertyValue::SwapGraphics(int()? as u16),
            PropertyType::ClipActions => PropertyValue::ClipActions(payloads.clip_actions.get(at)?),
        };
        Some(value)
    }
}
