//! Push-driven decompressors for the three container encodings.
//!
//! Compressed bytes go in through [`Decompressor::push`]; whatever output
//! becomes available is handed to the `on_data` callback before `push`
//! returns. A decompressor reports at most one error and ignores all input
//! after it.

use std::io::Write;

use flate2::{Decompress, FlushDecompress, Status};
use lzma_rs::decompress::{Options, Stream, UnpackedSize};

use crate::error::DecompressionError;

/// How the body after the 8-byte file prefix is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Compression {
    None,
    Deflate,
    Lzma,
}

impl Compression {
    /// Map the first magic byte (`F`, `C` or `Z`) to an encoding.
    pub fn from_magic(byte: u8) -> Option<Self> {
        match byte {
            b'F' => Some(Self::None),
            b'C' => Some(Self::Deflate),
            b'Z' => Some(Self::Lzma),
            _ => None,
        }
    }
}

pub trait Decompressor {
    fn push(
        &mut self,
        chunk: &[u8],
        on_data: &mut dyn FnMut(&[u8]),
    ) -> Result<(), DecompressionError>;

    /// Flush anything still buffered once the input is exhausted.
    fn close(&mut self, on_data: &mut dyn FnMut(&[u8])) -> Result<(), DecompressionError>;
}

/// Build the decompressor for `compression`. `uncompressed_body_length` is
/// the declared file length minus the 8-byte prefix.
pub fn decompressor_for(
    compression: Compression,
    uncompressed_body_length: u32,
    lzma_memlimit: Option<usize>,
) -> Box<dyn Decompressor> {
    match compression {
        Compression::None => Box::new(Passthrough),
        Compression::Deflate => Box::new(DeflateDecompressor::new()),
        Compression::Lzma => Box::new(LzmaDecompressor::new(
            uncompressed_body_length,
            lzma_memlimit,
        )),
    }
}

/// Uncompressed files: every chunk is forwarded untouched.
pub struct Passthrough;

impl Decompressor for Passthrough {
    fn push(
        &mut self,
        chunk: &[u8],
        on_data: &mut dyn FnMut(&[u8]),
    ) -> Result<(), DecompressionError> {
        if !chunk.is_empty() {
            on_data(chunk);
        }
        Ok(())
    }

    fn close(&mut self, _on_data: &mut dyn FnMut(&[u8])) -> Result<(), DecompressionError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Running,
    Finished,
    Failed,
}

/// Output window handed to the inflater on each step.
const INFLATE_WINDOW: usize = 32 * 1024;

pub struct DeflateDecompressor {
    inner: Decompress,
    window: Vec<u8>,
    state: StreamState,
}

impl DeflateDecompressor {
    pub fn new() -> Self {
        Self {
            inner: Decompress::new(true),
            window: vec![0; INFLATE_WINDOW],
            state: StreamState::Running,
        }
    }
}

impl Default for DeflateDecompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Decompressor for DeflateDecompressor {
    fn push(
        &mut self,
        chunk: &[u8],
        on_data: &mut dyn FnMut(&[u8]),
    ) -> Result<(), DecompressionError> {
        if self.state != StreamState::Running {
            tracing::trace!("ignoring {} bytes after end of zlib stream", chunk.len());
            return Ok(());
        }
        let mut input = chunk;
        loop {
            let (in_before, out_before) = (self.inner.total_in(), self.inner.total_out());
            let status = self
                .inner
                .decompress(input, &mut self.window, FlushDecompress::None);
            let consumed = (self.inner.total_in() - in_before) as usize;
            let produced = (self.inner.total_out() - out_before) as usize;
            input = &input[consumed..];
            if produced > 0 {
                on_data(&self.window[..produced]);
            }
            match status {
                Ok(Status::StreamEnd) => {
                    if !input.is_empty() {
                        tracing::debug!("zlib stream ended with {} trailing bytes", input.len());
                    }
                    self.state = StreamState::Finished;
                    return Ok(());
                }
                Ok(Status::Ok | Status::BufError) => {
                    // a full window may still leave output behind
                    let stalled = consumed == 0 && produced == 0;
                    if stalled || (input.is_empty() && produced < self.window.len()) {
                        return Ok(());
                    }
                }
                Err(err) => {
                    self.state = StreamState::Failed;
                    return Err(DecompressionError::Deflate(err.to_string()));
                }
            }
        }
    }

    /// All output is released by `push`. A stream cut short before its
    /// end marker keeps what was inflated.
    fn close(&mut self, _on_data: &mut dyn FnMut(&[u8])) -> Result<(), DecompressionError> {
        if self.state == StreamState::Running {
            tracing::warn!(
                inflated = self.inner.total_out(),
                "zlib stream ended before its end marker"
            );
            self.state = StreamState::Finished;
        }
        Ok(())
    }
}

/// Bytes between the 8-byte prefix and the LZMA properties: the compressed
/// length, which the decoder does not need.
const LZMA_COMPRESSED_LENGTH_BYTES: usize = 4;

/// LZMA-encoded bodies: a 32-bit compressed length, five property bytes and
/// the raw stream. The unpacked size comes from the file header. Writers
/// may or may not terminate the stream with an end marker; once the
/// declared size is reached, remaining input (the marker included) is
/// ignored.
///
/// The decoder only releases output when its dictionary window wraps or the
/// stream finishes, so most data tends to arrive from `close`.
pub struct LzmaDecompressor {
    stream: Option<Stream<Vec<u8>>>,
    skipped: usize,
    /// The decoder stopped accepting input.
    complete: bool,
    failed: bool,
}

impl LzmaDecompressor {
    pub fn new(uncompressed_body_length: u32, memlimit: Option<usize>) -> Self {
        let options = Options {
            unpacked_size: UnpackedSize::UseProvided(Some(u64::from(uncompressed_body_length))),
            memlimit,
            allow_incomplete: false,
        };
        Self {
            stream: Some(Stream::new_with_options(&options, Vec::new())),
            skipped: 0,
            complete: false,
            failed: false,
        }
    }

    fn drain(&mut self, on_data: &mut dyn FnMut(&[u8])) {
        if let Some(output) = self.stream.as_mut().and_then(|s| s.get_output_mut()) {
            let output = std::mem::take(output);
            if !output.is_empty() {
                on_data(&output);
            }
        }
    }
}

impl Decompressor for LzmaDecompressor {
    fn push(
        &mut self,
        chunk: &[u8],
        on_data: &mut dyn FnMut(&[u8]),
    ) -> Result<(), DecompressionError> {
        if self.failed || self.complete {
            return Ok(());
        }
        let skip = (LZMA_COMPRESSED_LENGTH_BYTES - self.skipped).min(chunk.len());
        self.skipped += skip;
        let input = &chunk[skip..];
        if input.is_empty() {
            return Ok(());
        }
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        let mut input = input;
        while !input.is_empty() && !self.complete {
            match stream.write(input) {
                Ok(0) => {
                    tracing::trace!("ignoring {} bytes after the unpacked size", input.len());
                    self.complete = true;
                }
                Ok(n) => input = &input[n..],
                Err(err) => {
                    self.failed = true;
                    self.drain(on_data);
                    return Err(DecompressionError::Lzma(err.to_string()));
                }
            }
        }
        self.drain(on_data);
        Ok(())
    }

    fn close(&mut self, on_data: &mut dyn FnMut(&[u8])) -> Result<(), DecompressionError> {
        if self.failed {
            return Ok(());
        }
        self.drain(on_data);
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        match stream.finish() {
            Ok(rest) => {
                if !rest.is_empty() {
                    on_data(&rest);
                }
                Ok(())
            }
            Err(err) => {
                self.failed = true;
                Err(DecompressionError::Lzma(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression as Level;
    use flate2::write::ZlibEncoder;

    fn collect(decompressor: &mut dyn Decompressor, chunks: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for chunk in chunks {
            decompressor
                .push(chunk, &mut |data| out.extend_from_slice(data))
                .unwrap();
        }
        decompressor
            .close(&mut |data| out.extend_from_slice(data))
            .unwrap();
        out
    }

    #[test]
    fn test_passthrough_forwards_chunks() {
        let mut calls = 0;
        let mut passthrough = Passthrough;
        passthrough
            .push(b"whole buffer", &mut |data| {
                calls += 1;
                assert_eq!(data, b"whole buffer");
            })
            .unwrap();
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_deflate_chunk_splits_agree() {
        let plain: Vec<u8> = (0..4000u32).map(|i| (i % 251) as u8).collect();
        let mut encoder = ZlibEncoder::new(Vec::new(), Level::default());
        encoder.write_all(&plain).unwrap();
        let packed = encoder.finish().unwrap();

        let whole = collect(&mut DeflateDecompressor::new(), &[&packed]);
        let pieces: Vec<&[u8]> = packed.chunks(7).collect();
        let split = collect(&mut DeflateDecompressor::new(), &pieces);

        assert_eq!(whole, plain);
        assert_eq!(split, plain);
    }

    #[test]
    fn test_deflate_close_after_stream_end() {
        let plain = vec![0x5Au8; 300];
        let mut encoder = ZlibEncoder::new(Vec::new(), Level::default());
        encoder.write_all(&plain).unwrap();
        let mut packed = encoder.finish().unwrap();
        packed.extend_from_slice(b"junk");

        let mut decompressor = DeflateDecompressor::new();
        let mut out = Vec::new();
        decompressor
            .push(&packed, &mut |data| out.extend_from_slice(data))
            .unwrap();
        assert_eq!(decompressor.state, StreamState::Finished);
        assert!(decompressor.close(&mut |_| panic!("no output after the end")).is_ok());
        assert!(decompressor.push(b"more", &mut |_| panic!("no output after the end")).is_ok());
        assert_eq!(out, plain);
    }

    #[test]
    fn test_deflate_large_output_from_small_input() {
        // compresses far below one output window
        let plain = vec![0u8; INFLATE_WINDOW * 3 + 17];
        let mut encoder = ZlibEncoder::new(Vec::new(), Level::best());
        encoder.write_all(&plain).unwrap();
        let packed = encoder.finish().unwrap();
        assert_eq!(collect(&mut DeflateDecompressor::new(), &[&packed]), plain);
    }

    #[test]
    fn test_deflate_cut_short_keeps_output() {
        let plain: Vec<u8> = (0..2000u32).map(|i| (i * 7 % 256) as u8).collect();
        let mut encoder = ZlibEncoder::new(Vec::new(), Level::fast());
        encoder.write_all(&plain).unwrap();
        let packed = encoder.finish().unwrap();

        let out = collect(&mut DeflateDecompressor::new(), &[&packed[..packed.len() - 6]]);
        assert!(!out.is_empty());
        assert!(plain.starts_with(&out));
    }

    /// Body layout after the file prefix: compressed length, properties,
    /// then the stream `lzma_compress` wrote (it ends with a marker).
    fn lzma_body(plain: &[u8]) -> Vec<u8> {
        let mut packed = Vec::new();
        lzma_rs::lzma_compress(&mut &plain[..], &mut packed).unwrap();
        // drop the 8-byte unpacked size of the .lzma header
        let stream = &packed[13..];
        let mut body = (stream.len() as u32).to_le_bytes().to_vec();
        body.extend_from_slice(&packed[..5]);
        body.extend_from_slice(stream);
        body
    }

    #[test]
    fn test_lzma_with_end_marker() {
        let plain: Vec<u8> = (0..3000u32).map(|i| (i % 13) as u8).collect();
        let body = lzma_body(&plain);

        let whole = collect(
            &mut LzmaDecompressor::new(plain.len() as u32, None),
            &[&body],
        );
        assert_eq!(whole, plain);

        for size in [1, 3, 64] {
            let pieces: Vec<&[u8]> = body.chunks(size).collect();
            let split = collect(&mut LzmaDecompressor::new(plain.len() as u32, None), &pieces);
            assert_eq!(split, plain, "chunk size {size}");
        }
    }

    #[test]
    fn test_lzma_garbage_is_an_error() {
        let mut decompressor = LzmaDecompressor::new(100, None);
        let mut body = vec![0, 0, 0, 0];
        // property bytes above 224 are invalid
        body.push(0xFF);
        body.extend_from_slice(&[0; 4]);
        body.extend_from_slice(&[0xFF; 32]);
        let pushed = decompressor.push(&body, &mut |_| {});
        let closed = decompressor.close(&mut |_| {});
        assert!(pushed.is_err() || closed.is_err());
    }

    #[test]
    fn test_deflate_reports_error_once() {
        let mut decompressor = DeflateDecompressor::new();
        let garbage = [0xFFu8; 16];
        assert!(decompressor.push(&garbage, &mut |_| {}).is_err());
        assert!(decompressor.push(&garbage, &mut |_| {}).is_ok());
        assert!(decompressor.close(&mut |_| {}).is_ok());
    }

    #[test]
    fn test_magic_bytes() {
        assert_eq!(Compression::from_magic(b'F'), Some(Compression::None));
        assert_eq!(Compression::from_magic(b'C'), Some(Compression::Deflate));
        assert_eq!(Compression::from_magic(b'Z'), Some(Compression::Lzma));
        assert_eq!(Compression::from_magic(b'X'), None);
    }
}
