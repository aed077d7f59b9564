use serde::Serialize;

use crate::bit_reader::BitReader;
use crate::error::ReaderError;
use crate::tag::{ByteSpan, TagCode, UnparsedTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VideoCodec {
    H263,
    ScreenVideo,
    Vp6,
    Vp6WithAlpha,
    ScreenVideoV2,
    Unknown(u8),
}

impl VideoCodec {
    pub fn from_u8(value: u8) -> Self {
        match value {
            2 => Self::H263,
            3 => Self::ScreenVideo,
            4 => Self::Vp6,
            5 => Self::Vp6WithAlpha,
            6 => Self::ScreenVideoV2,
            other => Self::Unknown(other),
        }
    }
}

/// Encoded payload of one `VideoFrame` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VideoFrameData {
    pub frame: u16,
    pub data: ByteSpan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoDefinition {
    pub id: u16,
    pub frame_count: u16,
    pub width: u16,
    pub height: u16,
    pub deblocking: u8,
    pub smoothing: bool,
    pub codec: VideoCodec,
    /// Sorted by frame number; a later tag for the same frame wins.
    pub frames: Vec<VideoFrameData>,
}

pub fn decode_video(
    r: &mut BitReader<'_>,
    extras: &[UnparsedTag],
    data: &[u8],
) -> Result<VideoDefinition, ReaderError> {
    let id = r.read_u16()?;
    let frame_count = r.read_u16()?;
    let width = r.read_u16()?;
    let height = r.read_u16()?;
    r.read_ub(4)?;
    let deblocking = r.read_ub(3)? as u8;
    let smoothing = r.read_bit()?;
    let codec = VideoCodec::from_u8(r.read_u8()?);

    let mut frames: Vec<VideoFrameData> = Vec::new();
    for extra in extras.iter().filter(|tag| tag.tag_code() == TagCode::VideoFrame) {
        match read_video_frame(&mut extra.reader(data)) {
            Ok(frame) => match frames.binary_search_by_key(&frame.frame, |f| f.frame) {
                Ok(index) => frames[index] = frame,
                Err(index) => frames.insert(index, frame),
            },
            Err(err) => tracing::warn!(id, %err, "ignoring malformed video frame"),
        }
    }

    Ok(VideoDefinition {
        id,
        frame_count,
        width,
        height,
        deblocking,
        smoothing,
        codec,
        frames,
    })
}

fn read_video_frame(r: &mut BitReader<'_>) -> Result<VideoFrameData, ReaderError> {
    // stream id
    r.read_u16()?;
    let frame = r.read_u16()?;
    let start = r.position();
    let bytes = r.read_rest();
    Ok(VideoFrameData {
        frame,
        data: ByteSpan::new(start, bytes.len()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_tag(data: &mut Vec<u8>, frame: u16, payload: &[u8]) -> UnparsedTag {
        let offset = data.len();
        data.extend_from_slice(&1u16.to_le_bytes());
        data.extend_from_slice(&frame.to_le_bytes());
        data.extend_from_slice(payload);
        UnparsedTag {
            code: TagCode::VideoFrame.to_u16(),
            byte_offset: offset as u32,
            byte_length: (data.len() - offset) as u32,
        }
    }

    #[test]
    fn test_video_stream_and_frames() {
        let mut data = vec![1, 0, 3, 0, 160, 0, 120, 0, 0b0000_010_1, 4];
        let header_len = data.len();
        let second = frame_tag(&mut data, 1, &[0xBB]);
        let first = frame_tag(&mut data, 0, &[0xAA, 0xAA]);
        let replaced = frame_tag(&mut data, 1, &[0xCC]);

        let mut r = BitReader::with_range(&data, 0, header_len);
        let video = decode_video(&mut r, &[second, first, replaced], &data).unwrap();
        assert_eq!((video.width, video.height), (160, 120));
        assert_eq!(video.deblocking, 2);
        assert!(video.smoothing);
        assert_eq!(video.codec, VideoCodec::Vp6);
        let frames: Vec<_> = video.frames.iter().map(|f| (f.frame, f.data.length)).collect();
        assert_eq!(frames, vec![(0, 2), (1, 1)]);
        assert_eq!(video.frames[1].data.slice(&data), Some(&[0xCC][..]));
    }
}
