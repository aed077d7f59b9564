//! In-process asset decoding for the inspector.

use std::io::Read;

use flate2::read::ZlibDecoder;
use swf::decoders::bitmap::{DecodedImage, ImageFormat, LosslessFormat};
use swf::decoders::sound::{DecodedSound, SoundFormat, SoundHeader};
use swf::{AssetDecoder, AssetKind, AssetRequest, DecodedAsset};

/// Decodes embedded images with `image`, lossless bitmaps with `flate2`
/// and uncompressed PCM sounds. Compressed sound formats are reported as
/// failures.
#[derive(Debug, Default)]
pub struct NativeCodec;

impl AssetDecoder for NativeCodec {
    fn decode(&mut self, request: &AssetRequest) -> Result<DecodedAsset, String> {
        match &request.kind {
            AssetKind::Image {
                format,
                width,
                height,
            } => decode_image(request, *format, *width, *height).map(DecodedAsset::Image),
            AssetKind::Sound { header, .. } => {
                decode_pcm(&request.data, header).map(DecodedAsset::Sound)
            }
        }
    }
}

fn inflate(data: &[u8], expected: usize) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(expected);
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|err| format!("zlib: {err}"))?;
    Ok(out)
}

fn decode_image(
    request: &AssetRequest,
    format: ImageFormat,
    width: u32,
    height: u32,
) -> Result<DecodedImage, String> {
    let encoded = match format {
        ImageFormat::Jpeg => image::ImageFormat::Jpeg,
        ImageFormat::Png => image::ImageFormat::Png,
        ImageFormat::Gif => image::ImageFormat::Gif,
        ImageFormat::Lossless {
            format,
            color_table_size,
            has_alpha,
        } => {
            return decode_lossless(&request.data, format, color_table_size, has_alpha, width, height);
        }
        ImageFormat::Unknown => return Err("unrecognised image data".to_string()),
    };

    let decoded = image::load_from_memory_with_format(&request.data, encoded)
        .map_err(|err| err.to_string())?
        .to_rgba8();
    let (width, height) = decoded.dimensions();
    let mut rgba = decoded.into_raw();

    if let Some(alpha) = &request.alpha {
        let plane = inflate(alpha, (width * height) as usize)?;
        if plane.len() < (width * height) as usize {
            tracing::warn!(id = request.id, "alpha plane is shorter than the image");
        }
        for (pixel, a) in rgba.chunks_exact_mut(4).zip(plane) {
            pixel[3] = a;
        }
    }

    Ok(DecodedImage {
        width,
        height,
        rgba,
    })
}

/// Rows of colour-mapped and 15-bit bitmaps are padded to four bytes.
fn padded(row_bytes: usize) -> usize {
    (row_bytes + 3) & !3
}

fn decode_lossless(
    data: &[u8],
    format: LosslessFormat,
    color_table_size: u16,
    has_alpha: bool,
    width: u32,
    height: u32,
) -> Result<DecodedImage, String> {
    let (w, h) = (width as usize, height as usize);
    let pixels = inflate(data, w * h * 4)?;
    let mut rgba = Vec::with_capacity(w * h * 4);
    let short = || format!("bitmap data ends early ({} bytes)", pixels.len());

    match format {
        LosslessFormat::ColorMapped => {
            let entry = if has_alpha { 4 } else { 3 };
            let table_len = usize::from(color_table_size) * entry;
            let table = pixels.get(..table_len).ok_or_else(short)?;
            let stride = padded(w);
            for y in 0..h {
                let start = table_len + y * stride;
                let row = pixels.get(start..start + w).ok_or_else(short)?;
                for &index in row {
                    let color = table
                        .chunks_exact(entry)
                        .nth(usize::from(index))
                        .unwrap_or(&[0, 0, 0, 0]);
                    let alpha = if has_alpha { color[3] } else { 0xFF };
                    rgba.extend_from_slice(&unmultiply([color[0], color[1], color[2], alpha]));
                }
            }
        }
        LosslessFormat::Rgb15 => {
            let stride = padded(w * 2);
            for y in 0..h {
                let row = pixels.get(y * stride..y * stride + w * 2).ok_or_else(short)?;
                for pair in row.chunks_exact(2) {
                    let value = u16::from_be_bytes([pair[0], pair[1]]);
                    let expand = |bits: u16| {
                        let c = (bits & 0x1F) as u8;
                        c << 3 | c >> 2
                    };
                    rgba.extend_from_slice(&[expand(value >> 10), expand(value >> 5), expand(value), 0xFF]);
                }
            }
        }
        LosslessFormat::Rgb32 => {
            let body = pixels.get(..w * h * 4).ok_or_else(short)?;
            for argb in body.chunks_exact(4) {
                let alpha = if has_alpha { argb[0] } else { 0xFF };
                rgba.extend_from_slice(&unmultiply([argb[1], argb[2], argb[3], alpha]));
            }
        }
    }

    Ok(DecodedImage {
        width,
        height,
        rgba,
    })
}

/// Lossless bitmaps with alpha store premultiplied colour.
fn unmultiply([r, g, b, a]: [u8; 4]) -> [u8; 4] {
    match a {
        0 => [0, 0, 0, 0],
        0xFF => [r, g, b, a],
        _ => {
            let scale = |c: u8| ((u16::from(c) * 255 / u16::from(a)).min(255)) as u8;
            [scale(r), scale(g), scale(b), a]
        }
    }
}

fn decode_pcm(data: &[u8], header: &SoundHeader) -> Result<DecodedSound, String> {
    let samples = match header.format {
        SoundFormat::UncompressedLittleEndian | SoundFormat::UncompressedNativeEndian => {
            if header.is_16_bit {
                data.chunks_exact(2)
                    .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
                    .collect()
            } else {
                data.iter().map(|&s| (i16::from(s) - 128) << 8).collect()
            }
        }
        other => return Err(format!("no codec for {other:?} sound")),
    };
    Ok(DecodedSound {
        sample_rate: header.sample_rate,
        channels: header.channels(),
        samples,
    })
}
