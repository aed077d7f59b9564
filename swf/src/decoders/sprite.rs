use serde::Serialize;

use crate::decoders::DecodeContext;
use crate::decoders::sound::SoundStreamHead;
use crate::error::SymbolError;
use crate::reader::Rect;
use crate::scanner::SwfFrame;
use crate::timeline::{FrameDirectives, TimelineCompiler, TimelineProgram};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpriteDefinition {
    pub id: u16,
    /// Frame count declared by the tag.
    pub frame_count: u16,
    pub timeline: TimelineProgram,
    pub sound_stream_head: Option<SoundStreamHead>,
    pub scaling_grid: Option<Rect>,
}

/// Compile the frames scanned from a sprite body. Missing trailing frames
/// are padded so the timeline covers the declared frame count.
pub(crate) fn decode_sprite(
    cx: &mut DecodeContext<'_>,
    id: u16,
    frame_count: u16,
    frames: &[SwfFrame],
    scaling_grid: Option<Rect>,
) -> Result<SpriteDefinition, SymbolError> {
    let env = cx.env;
    let mut directives: Vec<FrameDirectives> = frames
        .iter()
        .map(|frame| FrameDirectives::from_frame(frame, env.data, env.version))
        .collect();
    if directives.len() < usize::from(frame_count) {
        tracing::debug!(
            id,
            declared = frame_count,
            scanned = directives.len(),
            "padding sprite timeline"
        );
        directives.resize_with(usize::from(frame_count), FrameDirectives::default);
    }

    let timeline = TimelineCompiler::new(env.version).compile(&directives, cx)?;
    Ok(SpriteDefinition {
        id,
        frame_count,
        timeline,
        sound_stream_head: frames.iter().find_map(|frame| frame.sound_stream_head),
        scaling_grid,
    })
}
