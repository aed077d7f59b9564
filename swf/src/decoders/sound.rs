//! Event sound definitions and sound-stream heads.
//!
//! Only headers are decoded here; sample data is handed to an external
//! codec through the dependency gate.

use serde::Serialize;

use crate::bit_reader::BitReader;
use crate::error::ReaderError;
use crate::tag::ByteSpan;

type Result<T> = std::result::Result<T, ReaderError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SoundFormat {
    UncompressedNativeEndian,
    Adpcm,
    Mp3,
    UncompressedLittleEndian,
    Nellymoser16Khz,
    Nellymoser8Khz,
    Nellymoser,
    Speex,
    Unknown(u8),
}

impl SoundFormat {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::UncompressedNativeEndian,
            1 => Self::Adpcm,
            2 => Self::Mp3,
            3 => Self::UncompressedLittleEndian,
            4 => Self::Nellymoser16Khz,
            5 => Self::Nellymoser8Khz,
            6 => Self::Nellymoser,
            11 => Self::Speex,
            other => Self::Unknown(other),
        }
    }
}

/// The two-bit rate field.
pub fn sample_rate(bits: u8) -> u32 {
    match bits & 0x03 {
        0 => 5512,
        1 => 11025,
        2 => 22050,
        _ => 44100,
    }
}

/// Format, rate, size and channel layout shared by definitions and stream
/// heads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SoundHeader {
    pub format: SoundFormat,
    pub sample_rate: u32,
    pub is_16_bit: bool,
    pub is_stereo: bool,
}

impl SoundHeader {
    fn read(r: &mut BitReader<'_>) -> Result<Self> {
        let format = SoundFormat::from_u8(r.read_ub(4)? as u8);
        let rate = r.read_ub(2)? as u8;
        let is_16_bit = r.read_bit()?;
        let is_stereo = r.read_bit()?;
        Ok(Self {
            format,
            sample_rate: sample_rate(rate),
            is_16_bit,
            is_stereo,
        })
    }

    pub fn channels(&self) -> u8 {
        if self.is_stereo { 2 } else { 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedSound {
    pub sample_rate: u32,
    pub channels: u8,
    /// Interleaved 16-bit samples.
    pub samples: Vec<i16>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoundDefinition {
    pub id: u16,
    pub header: SoundHeader,
    pub sample_count: u32,
    /// Samples to skip at the start of MP3 data.
    pub seek_samples: Option<i16>,
    pub data: ByteSpan,
    #[serde(skip)]
    pub decoded: Option<DecodedSound>,
}

pub fn decode_sound(r: &mut BitReader<'_>) -> Result<SoundDefinition> {
    let id = r.read_u16()?;
    let header = SoundHeader::read(r)?;
    let sample_count = r.read_u32()?;
    let seek_samples = if header.format == SoundFormat::Mp3 {
        Some(r.read_i16()?)
    } else {
        None
    };
    let start = r.position();
    let data = r.read_rest();
    Ok(SoundDefinition {
        id,
        header,
        sample_count,
        seek_samples,
        data: ByteSpan::new(start, data.len()),
        decoded: None,
    })
}

/// Format of the streaming sound whose blocks follow on each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SoundStreamHead {
    pub playback: SoundHeader,
    pub stream: SoundHeader,
    pub samples_per_block: u16,
    pub latency_seek: Option<i16>,
}

pub fn decode_sound_stream_head(r: &mut BitReader<'_>) -> Result<SoundStreamHead> {
    r.read_ub(4)?;
    let rate = r.read_ub(2)? as u8;
    let is_16_bit = r.read_bit()?;
    let is_stereo = r.read_bit()?;
    let playback = SoundHeader {
        format: SoundFormat::UncompressedLittleEndian,
        sample_rate: sample_rate(rate),
        is_16_bit,
        is_stereo,
    };
    let stream = SoundHeader::read(r)?;
    let samples_per_block = r.read_u16()?;
    // The latency field is frequently missing even for MP3 streams.
    let latency_seek = if stream.format == SoundFormat::Mp3 && r.remaining() >= 2 {
        Some(r.read_i16()?)
    } else {
        None
    };
    Ok(SoundStreamHead {
        playback,
        stream,
        samples_per_block,
        latency_seek,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mp3_definition() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&12u16.to_le_bytes());
        // mp3 (2), 44 kHz (3), 16-bit, stereo
        bytes.push(0b0010_1111);
        bytes.extend_from_slice(&1152u32.to_le_bytes());
        bytes.extend_from_slice(&(-3i16).to_le_bytes());
        bytes.extend_from_slice(&[0xFF, 0xFB, 0x90]);

        let sound = decode_sound(&mut BitReader::new(&bytes)).unwrap();
        assert_eq!(sound.id, 12);
        assert_eq!(sound.header.format, SoundFormat::Mp3);
        assert_eq!(sound.header.sample_rate, 44100);
        assert_eq!(sound.header.channels(), 2);
        assert_eq!(sound.sample_count, 1152);
        assert_eq!(sound.seek_samples, Some(-3));
        assert_eq!(sound.data, ByteSpan::new(9, 3));
    }

    #[test]
    fn test_stream_head_without_latency() {
        // playback 22 kHz 16-bit mono, stream mp3 22 kHz 16-bit mono
        let bytes = [0b0000_1010, 0b0010_1010, 0x40, 0x02];
        let head = decode_sound_stream_head(&mut BitReader::new(&bytes)).unwrap();
        assert_eq!(head.stream.format, SoundFormat::Mp3);
        assert_eq!(head.playback.sample_rate, 22050);
        assert_eq!(head.samples_per_block, 576);
        assert_eq!(head.latency_seek, None);
    }
}
