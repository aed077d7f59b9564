//! The push-driven parsing session.

use std::rc::Rc;

use serde::Serialize;

use crate::compression::{Decompressor, decompressor_for};
use crate::context::{DecodeEnv, FontRegistry, ParseOptions, RegisteredFont};
use crate::decoders::DecodeContext;
use crate::dictionary::{Dictionary, SymbolState};
use crate::error::{Result, SwfError, SymbolError};
use crate::gate::{AssetDecoder, AssetRequest, DecodedAsset, DependencyGate};
use crate::scanner::{
    ExportEntry, FilePrefix, MovieAttributes, PREFIX_LENGTH, ScanTargets, Scanner, SwfFrame,
    SwfHeader, SymbolClass,
};
use crate::symbol::{Symbol, SymbolKind};
use crate::timeline::{FrameDirectives, TimelineCompiler, TimelineProgram};

/// One file being parsed.
///
/// Feed bytes with [`push`](Self::push) as they arrive and call
/// [`finish`](Self::finish) once the input ends. Definitions become
/// available while the file is still loading; the root timeline can be
/// compiled once scanning is complete and every asset request is settled.
pub struct Movie {
    options: ParseOptions,
    /// Raw bytes until the 8-byte prefix is complete.
    prefix_bytes: Vec<u8>,
    prefix: Option<FilePrefix>,
    header: Option<SwfHeader>,
    decompressor: Option<Box<dyn Decompressor>>,
    /// Uncompressed file, prefix included, so spans index it directly.
    data: Vec<u8>,
    limit: usize,
    truncated: bool,
    scanner: Scanner,
    dictionary: Dictionary,
    fonts: FontRegistry,
    gate: DependencyGate,
    closed: bool,
    failed: bool,
    root_timeline: Option<Rc<TimelineProgram>>,
}

/// Serializable snapshot of a parsed movie.
#[derive(Debug, Clone, Serialize)]
pub struct MovieSummary {
    pub header: SwfHeader,
    pub attributes: MovieAttributes,
    pub symbols: Vec<SymbolSummary>,
    pub fonts: Vec<RegisteredFont>,
    pub symbol_classes: Vec<SymbolClass>,
    pub exports: Vec<ExportEntry>,
    pub root_frames: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolSummary {
    pub id: u16,
    pub kind: Option<SymbolKind>,
    pub state: Option<SymbolState>,
}

impl Default for Movie {
    fn default() -> Self {
        Self::new(ParseOptions::default())
    }
}

impl Movie {
    pub fn new(options: ParseOptions) -> Self {
        Self {
            options,
            prefix_bytes: Vec::with_capacity(PREFIX_LENGTH),
            prefix: None,
            header: None,
            decompressor: None,
            data: Vec::new(),
            limit: 0,
            truncated: false,
            scanner: Scanner::default(),
            dictionary: Dictionary::new(),
            fonts: FontRegistry::default(),
            gate: DependencyGate::default(),
            closed: false,
            failed: false,
            root_timeline: None,
        }
    }

    /// Parse a complete file in one call.
    pub fn from_bytes(bytes: &[u8], options: ParseOptions) -> Result<Self> {
        let mut movie = Self::new(options);
        movie.push(bytes)?;
        movie.finish()?;
        Ok(movie)
    }

    /// Append the next chunk of the file.
    pub fn push(&mut self, chunk: &[u8]) -> Result<()> {
        if self.failed {
            return Err(SwfError::NotReady("an earlier error ended the parse"));
        }
        if self.closed {
            tracing::warn!(bytes = chunk.len(), "ignoring data pushed after finish");
            return Ok(());
        }
        let result = self.push_inner(chunk);
        self.failed = result.is_err();
        result
    }

    fn push_inner(&mut self, chunk: &[u8]) -> Result<()> {
        if self.options.is_cancelled() {
            return Err(SwfError::Cancelled);
        }

        let mut body = chunk;
        if self.prefix.is_none() {
            let wanted = PREFIX_LENGTH - self.prefix_bytes.len();
            let (head, rest) = chunk.split_at(wanted.min(chunk.len()));
            self.prefix_bytes.extend_from_slice(head);
            body = rest;
            if self.prefix_bytes.len() < PREFIX_LENGTH {
                return Ok(());
            }
            self.start(FilePrefix::parse(&self.prefix_bytes)?);
        }

        if let Some(decompressor) = self.decompressor.as_mut() {
            let data = &mut self.data;
            let limit = self.limit;
            let truncated = &mut self.truncated;
            decompressor.push(body, &mut |bytes| append(data, limit, truncated, bytes))?;
        }
        self.scan();
        Ok(())
    }

    fn start(&mut self, prefix: FilePrefix) {
        let declared = prefix.uncompressed_length as usize;
        self.limit = declared.min(self.options.max_uncompressed_length as usize);
        if self.limit < declared {
            tracing::warn!(declared, limit = self.limit, "declared length exceeds the configured maximum");
        }
        tracing::debug!(compression = ?prefix.compression, version = prefix.version, declared, "starting parse");
        self.data = Vec::with_capacity(self.limit.min(1 << 20));
        self.data.extend_from_slice(&self.prefix_bytes);
        self.decompressor = Some(decompressor_for(
            prefix.compression,
            prefix.uncompressed_length - PREFIX_LENGTH as u32,
            self.options.lzma_memlimit,
        ));
        self.scanner = Scanner::new(prefix.version);
        self.prefix = Some(prefix);
    }

    fn scan(&mut self) {
        if self.header.is_none() {
            let Some(prefix) = self.prefix else {
                return;
            };
            self.header = self.scanner.read_header(prefix, &self.data);
            if self.header.is_none() {
                return;
            }
        }
        let mut targets = ScanTargets {
            dictionary: &mut self.dictionary,
            fonts: &mut self.fonts,
            gate: &mut self.gate,
        };
        self.scanner.scan(&self.data, &mut targets);
    }

    /// Signal the end of input. Flushes the decompressor and completes the
    /// scan.
    pub fn finish(&mut self) -> Result<()> {
        if self.failed {
            return Err(SwfError::NotReady("an earlier error ended the parse"));
        }
        if self.closed {
            return Ok(());
        }
        let result = self.finish_inner();
        self.failed = result.is_err();
        self.closed = true;
        result
    }

    fn finish_inner(&mut self) -> Result<()> {
        if self.prefix.is_none() {
            return Err(SwfError::HeaderTooShort(self.prefix_bytes.len()));
        }
        if let Some(mut decompressor) = self.decompressor.take() {
            let data = &mut self.data;
            let limit = self.limit;
            let truncated = &mut self.truncated;
            decompressor.close(&mut |bytes| append(data, limit, truncated, bytes))?;
        }
        self.scan();
        if self.header.is_none() {
            return Err(SwfError::HeaderTooShort(self.data.len()));
        }
        if self.data.len() < self.limit {
            tracing::warn!(
                declared = self.limit,
                received = self.data.len(),
                "file is shorter than its declared length"
            );
        }
        self.scanner.close(&self.data);
        tracing::debug!(
            symbols = self.dictionary.len(),
            frames = self.scanner.frames().len(),
            pending_assets = self.gate.outstanding(),
            "scan complete"
        );
        Ok(())
    }

    pub fn header(&self) -> Option<&SwfHeader> {
        self.header.as_ref()
    }

    pub fn version(&self) -> Option<u8> {
        self.prefix.map(|prefix| prefix.version)
    }

    /// The uncompressed bytes received so far. Every span points into this.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_scan_complete(&self) -> bool {
        self.closed || self.scanner.is_finished()
    }

    /// Scanning is complete and no asset request is outstanding.
    pub fn is_ready(&self) -> bool {
        self.is_scan_complete() && self.gate.is_open()
    }

    /// Asset requests queued since the last call.
    pub fn pending_assets(&mut self) -> Vec<AssetRequest> {
        self.gate.take_requests()
    }

    pub fn outstanding_assets(&self) -> usize {
        self.gate.outstanding()
    }

    pub fn complete_asset(&mut self, id: u16, asset: DecodedAsset) -> Result<(), SymbolError> {
        if !self.gate.settle(id) {
            tracing::debug!(id, "completing an asset that was not outstanding");
        }
        self.dictionary.complete_asset(id, asset)
    }

    /// The host could not decode `id`. Only that symbol fails; ids that are
    /// not waiting on an asset are left alone.
    pub fn fail_asset(&mut self, id: u16, reason: impl Into<String>) {
        let settled = self.gate.settle(id);
        if !self.dictionary.fail_asset(id, reason) && !settled {
            tracing::debug!(id, "failing an asset that was not outstanding");
        }
    }

    /// Run every queued request through `decoder` and settle it.
    pub fn decode_assets(&mut self, decoder: &mut dyn AssetDecoder) {
        for request in self.gate.take_requests() {
            match decoder.decode(&request) {
                Ok(asset) => {
                    if let Err(err) = self.complete_asset(request.id, asset) {
                        tracing::warn!(id = request.id, %err, "could not attach decoded asset");
                    }
                }
                Err(reason) => self.fail_asset(request.id, reason),
            }
        }
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    /// Decode `id` if it has not been decoded yet.
    pub fn symbol(&mut self, id: u16) -> Result<Rc<Symbol>, SymbolError> {
        let env = DecodeEnv {
            data: &self.data,
            version: self.scanner_version(),
            fonts: &self.fonts,
        };
        self.dictionary.resolve(env, id)
    }

    /// Compile the main timeline. Available once [`is_ready`](Self::is_ready)
    /// holds; the result is memoized.
    pub fn root_timeline(&mut self) -> Result<Rc<TimelineProgram>> {
        if let Some(timeline) = &self.root_timeline {
            return Ok(Rc::clone(timeline));
        }
        if !self.is_scan_complete() {
            return Err(SwfError::NotReady("the file is still loading"));
        }
        if !self.gate.is_open() {
            return Err(SwfError::NotReady("asset requests are outstanding"));
        }
        let Some(header) = self.header else {
            return Err(SwfError::NotReady("the header was never parsed"));
        };

        let version = header.version;
        let mut directives: Vec<FrameDirectives> = self
            .scanner
            .frames()
            .iter()
            .map(|frame| FrameDirectives::from_frame(frame, &self.data, version))
            .collect();
        if directives.len() < usize::from(header.frame_count) {
            directives.resize_with(usize::from(header.frame_count), FrameDirectives::default);
        }

        let mut cx = DecodeContext {
            env: DecodeEnv {
                data: &self.data,
                version,
                fonts: &self.fonts,
            },
            dictionary: &mut self.dictionary,
        };
        let timeline = Rc::new(TimelineCompiler::new(version).compile(&directives, &mut cx)?);
        tracing::debug!(
            frames = timeline.frame_count,
            keyframes = timeline.keyframe_count(),
            sessions = timeline.sessions.len(),
            "compiled root timeline"
        );
        self.root_timeline = Some(Rc::clone(&timeline));
        Ok(timeline)
    }

    pub fn root_frames(&self) -> &[SwfFrame] {
        self.scanner.frames()
    }

    pub fn fonts(&self) -> &FontRegistry {
        &self.fonts
    }

    pub fn attributes(&self) -> &MovieAttributes {
        self.scanner.attributes()
    }

    pub fn symbol_classes(&self) -> &[SymbolClass] {
        self.scanner.symbol_classes()
    }

    /// Class bound to the main timeline.
    pub fn main_class(&self) -> Option<&str> {
        self.symbol_classes()
            .iter()
            .find(|class| class.id == 0)
            .map(|class| class.name.as_str())
    }

    pub fn exports(&self) -> &[ExportEntry] {
        self.scanner.exports()
    }

    pub fn export_id(&self, name: &str) -> Option<u16> {
        self.exports()
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.id)
    }

    /// Snapshot of everything scanned so far. `None` before the header.
    pub fn summary(&self) -> Option<MovieSummary> {
        let header = self.header?;
        let symbols = self
            .dictionary
            .ids()
            .map(|id| SymbolSummary {
                id,
                kind: self.dictionary.kind(id),
                state: self.dictionary.state(id),
            })
            .collect();
        Some(MovieSummary {
            header,
            attributes: self.attributes().clone(),
            symbols,
            fonts: self.fonts.iter().cloned().collect(),
            symbol_classes: self.symbol_classes().to_vec(),
            exports: self.exports().to_vec(),
            root_frames: self.root_frames().len(),
        })
    }

    fn scanner_version(&self) -> u8 {
        self.prefix.map_or(0, |prefix| prefix.version)
    }
}

/// Append decompressed output, dropping anything past `limit`.
fn append(data: &mut Vec<u8>, limit: usize, truncated: &mut bool, bytes: &[u8]) {
    let room = limit.saturating_sub(data.len());
    if bytes.len() > room && !*truncated {
        tracing::warn!(limit, "decompressed data exceeds the declared length, truncating");
        *truncated = true;
    }
    data.extend_from_slice(&bytes[..bytes.len().min(room)]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CancelToken;

    fn minimal_file() -> Vec<u8> {
        // one-bit-wide rect (all zero), 12 fps, 1 frame, ShowFrame, End
        let mut body = vec![0x08, 0x00, 0x00, 0x0C, 0x01, 0x00];
        body.extend_from_slice(&[0x40, 0x00, 0x00, 0x00]);
        let mut file = b"FWS\x0a".to_vec();
        file.extend_from_slice(&((body.len() + 8) as u32).to_le_bytes());
        file.extend(body);
        file
    }

    #[test]
    fn test_minimal_file() {
        let mut movie = Movie::from_bytes(&minimal_file(), ParseOptions::default()).unwrap();
        let header = movie.header().unwrap();
        assert_eq!(header.version, 10);
        assert_eq!(header.frame_rate, 12.0);
        assert_eq!(header.frame_count, 1);
        assert!(movie.is_ready());
        let timeline = movie.root_timeline().unwrap();
        assert_eq!(timeline.frame_count, 1);
    }

    #[test]
    fn test_byte_at_a_time() {
        let file = minimal_file();
        let mut movie = Movie::default();
        for byte in &file {
            movie.push(std::slice::from_ref(byte)).unwrap();
        }
        assert!(movie.is_scan_complete());
        movie.finish().unwrap();
        assert_eq!(movie.root_frames().len(), 1);
    }

    #[test]
    fn test_not_ready_before_finish() {
        let file = minimal_file();
        let mut movie = Movie::default();
        movie.push(&file[..14]).unwrap();
        assert!(matches!(movie.root_timeline(), Err(SwfError::NotReady(_))));
    }

    #[test]
    fn test_short_input() {
        let mut movie = Movie::default();
        movie.push(b"FWS").unwrap();
        assert!(matches!(movie.finish(), Err(SwfError::HeaderTooShort(3))));
    }

    #[test]
    fn test_cancelled() {
        let cancel = CancelToken::new();
        let mut movie = Movie::new(ParseOptions {
            cancel: Some(cancel.clone()),
            ..ParseOptions::default()
        });
        cancel.cancel();
        assert!(matches!(movie.push(&minimal_file()), Err(SwfError::Cancelled)));
        assert!(movie.push(&[]).is_err());
    }

    #[test]
    fn test_data_past_declared_length_is_dropped() {
        let mut file = minimal_file();
        file.extend_from_slice(&[0xAA; 16]);
        let movie = Movie::from_bytes(&file, ParseOptions::default()).unwrap();
        assert_eq!(movie.data().len(), file.len() - 16);
    }
}
