//! Header parsing and the tag scanner.
//!
//! The scanner walks tags as decompressed bytes arrive. It always resumes
//! at the last fully consumed tag boundary; a tag whose body is not
//! complete yet is left for the next pass.

use std::mem;

use bitflags::bitflags;
use serde::Serialize;

use crate::bit_reader::BitReader;
use crate::compression::Compression;
use crate::context::FontRegistry;
use crate::decoders::bitmap::{
    self, ImageDefinition, ImageFormat, merge_jpeg_tables, sniff_dimensions,
    strip_erroneous_header,
};
use crate::decoders::font::{self, apply_font_info, decode_font_info};
use crate::decoders::sound::{self, SoundStreamHead, decode_sound_stream_head};
use crate::dictionary::{Dictionary, PendingDefinition};
use crate::error::{ReaderError, SwfError, SymbolError};
use crate::gate::{AssetKind, AssetRequest, DependencyGate};
use crate::reader::{Rect, Rgba};
use crate::symbol::Symbol;
use crate::tag::{AuxiliaryKind, ByteSpan, DefinitionKind, TagClass, TagCode, UnparsedTag};

/// Magic, version and declared length.
pub const PREFIX_LENGTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilePrefix {
    pub compression: Compression,
    pub version: u8,
    /// Length of the whole uncompressed file, prefix included.
    pub uncompressed_length: u32,
}

impl FilePrefix {
    pub fn parse(bytes: &[u8]) -> Result<Self, SwfError> {
        let Some(prefix) = bytes.get(..PREFIX_LENGTH) else {
            return Err(SwfError::HeaderTooShort(bytes.len()));
        };
        let magic = [prefix[0], prefix[1], prefix[2]];
        let compression = Compression::from_magic(magic[0])
            .filter(|_| magic[1] == b'W' && magic[2] == b'S')
            .ok_or(SwfError::InvalidMagic(magic))?;
        let uncompressed_length = u32::from_le_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);
        if (uncompressed_length as usize) < PREFIX_LENGTH {
            return Err(SwfError::HeaderTooShort(uncompressed_length as usize));
        }
        Ok(Self {
            compression,
            version: prefix[3],
            uncompressed_length,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SwfHeader {
    pub compression: Compression,
    pub version: u8,
    pub uncompressed_length: u32,
    /// Stage size in twips.
    pub frame_size: Rect,
    pub frame_rate: f32,
    pub frame_count: u16,
}

impl SwfHeader {
    /// Parse the header tail that follows the prefix. Returns the header
    /// and the offset of the first tag.
    fn read_tail(prefix: FilePrefix, data: &[u8]) -> Result<(Self, usize), ReaderError> {
        let mut r = BitReader::with_range(data, PREFIX_LENGTH, data.len());
        let frame_size = r.read_rect()?;
        let frame_rate = f32::from(r.read_u16()?) / 256.0;
        let frame_count = r.read_u16()?;
        let header = Self {
            compression: prefix.compression,
            version: prefix.version,
            uncompressed_length: prefix.uncompressed_length,
            frame_size,
            frame_rate,
            frame_count,
        };
        Ok((header, r.position()))
    }

    pub fn width(&self) -> f32 {
        (self.frame_size.x_max - self.frame_size.x_min) as f32 / 20.0
    }

    pub fn height(&self) -> f32 {
        (self.frame_size.y_max - self.frame_size.y_min) as f32 / 20.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InitActionBlock {
    pub sprite_id: u16,
    pub actions: ByteSpan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbcBlock {
    /// `1` requests lazy initialization.
    pub flags: u32,
    pub name: String,
    pub data: ByteSpan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportEntry {
    pub id: u16,
    pub name: String,
}

/// Everything collected between two `ShowFrame` tags of one timeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SwfFrame {
    pub control_tags: Vec<UnparsedTag>,
    pub labels: Vec<String>,
    pub sound_stream_head: Option<SoundStreamHead>,
    pub sound_stream_block: Option<ByteSpan>,
    pub action_blocks: Vec<ByteSpan>,
    pub init_action_blocks: Vec<InitActionBlock>,
    pub abc_blocks: Vec<AbcBlock>,
    pub exports: Vec<ExportEntry>,
}

impl SwfFrame {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Frames of one timeline plus the frame being collected.
#[derive(Debug, Default)]
struct FrameCollector {
    current: SwfFrame,
    frames: Vec<SwfFrame>,
}

impl FrameCollector {
    fn show_frame(&mut self) {
        self.frames.push(mem::take(&mut self.current));
    }

    /// Finished frames. Content after the last `ShowFrame` is dropped.
    fn into_frames(self) -> Vec<SwfFrame> {
        if !self.current.is_empty() {
            tracing::debug!("dropping tags after the last frame");
        }
        self.frames
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
    pub struct FileAttributes: u32 {
        const USE_NETWORK = 0x01;
        const ACTIONSCRIPT_3 = 0x08;
        const HAS_METADATA = 0x10;
        const USE_GPU = 0x20;
        const USE_DIRECT_BLIT = 0x40;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScriptLimits {
    pub max_recursion_depth: u16,
    pub timeout_seconds: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scene {
    pub first_frame: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SceneFrameLabel {
    pub frame: u32,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProductInfo {
    pub product_id: u32,
    pub edition: u32,
    pub major_version: u8,
    pub minor_version: u8,
    pub build: u64,
    /// Milliseconds since the Unix epoch.
    pub compile_date: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportEntry {
    pub url: String,
    pub id: u16,
    pub name: String,
}

/// Movie-wide settings from root metadata tags.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MovieAttributes {
    pub file_attributes: FileAttributes,
    pub background_color: Option<Rgba>,
    pub metadata: Option<String>,
    pub script_limits: Option<ScriptLimits>,
    pub scenes: Vec<Scene>,
    pub scene_frame_labels: Vec<SceneFrameLabel>,
    pub imports: Vec<ImportEntry>,
    pub debugger_enabled: bool,
    pub protected: bool,
    pub product_info: Option<ProductInfo>,
}

impl MovieAttributes {
    pub fn uses_actionscript_3(&self) -> bool {
        self.file_attributes.contains(FileAttributes::ACTIONSCRIPT_3)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolClass {
    /// `0` names the main timeline's class.
    pub id: u16,
    pub name: String,
}

/// What the scanner fills in besides frames.
pub(crate) struct ScanTargets<'a> {
    pub dictionary: &'a mut Dictionary,
    pub fonts: &'a mut FontRegistry,
    pub gate: &'a mut DependencyGate,
}

/// State shared by the root timeline and every sprite body.
#[derive(Debug, Default)]
struct ScanState {
    version: u8,
    jpeg_tables: Option<ByteSpan>,
    attributes: MovieAttributes,
    symbol_classes: Vec<SymbolClass>,
    exports: Vec<ExportEntry>,
}

#[derive(Debug, Default)]
pub(crate) struct Scanner {
    /// Offset of the next tag header.
    position: usize,
    /// The end tag was reached.
    finished: bool,
    root: FrameCollector,
    state: ScanState,
}

impl Scanner {
    pub fn new(version: u8) -> Self {
        Self {
            state: ScanState {
                version,
                ..ScanState::default()
            },
            ..Self::default()
        }
    }

    /// Parse the header tail once enough bytes exist. Tag scanning starts
    /// after it.
    pub fn read_header(&mut self, prefix: FilePrefix, data: &[u8]) -> Option<SwfHeader> {
        match SwfHeader::read_tail(prefix, data) {
            Ok((header, first_tag)) => {
                tracing::debug!(
                    version = header.version,
                    frames = header.frame_count,
                    rate = header.frame_rate,
                    "parsed header"
                );
                self.position = first_tag;
                Some(header)
            }
            Err(_) => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Scan every complete tag in `data[position..]`.
    pub fn scan(&mut self, data: &[u8], targets: &mut ScanTargets<'_>) {
        while !self.finished && self.position + 2 <= data.len() {
            let mut r = BitReader::with_range(data, self.position, data.len());
            let Ok(header) = r.read_tag_header() else {
                break;
            };
            let body_start = r.position();
            let body_end = body_start + header.length as usize;
            if header.code == TagCode::End.to_u16() {
                tracing::debug!(frames = self.root.frames.len(), "reached end tag");
                self.finished = true;
                self.position = body_end.min(data.len());
                break;
            }
            if body_end > data.len() {
                // wait for the rest of the tag
                break;
            }
            self.position = body_end;
            let tag = UnparsedTag {
                code: header.code,
                byte_offset: body_start as u32,
                byte_length: header.length,
            };
            self.state.handle(tag, data, &mut self.root, targets);
        }
    }

    /// The input ended. Marks the scan complete even without an end tag.
    pub fn close(&mut self, data: &[u8]) {
        if !self.finished && self.position < data.len() {
            tracing::warn!(
                offset = self.position,
                unread = data.len() - self.position,
                "input ended inside a tag"
            );
        }
        self.finished = true;
    }

    pub fn frames(&self) -> &[SwfFrame] {
        &self.root.frames
    }

    pub fn attributes(&self) -> &MovieAttributes {
        &self.state.attributes
    }

    pub fn symbol_classes(&self) -> &[SymbolClass] {
        &self.state.symbol_classes
    }

    pub fn exports(&self) -> &[ExportEntry] {
        &self.state.exports
    }
}

impl ScanState {
    fn handle(
        &mut self,
        tag: UnparsedTag,
        data: &[u8],
        timeline: &mut FrameCollector,
        targets: &mut ScanTargets<'_>,
    ) {
        tracing::trace!(code = tag.code, offset = tag.byte_offset, length = tag.byte_length, "tag");
        let code = tag.tag_code();
        let result = match code.class() {
            TagClass::Definition(kind) => self.define(tag, kind, data, targets),
            TagClass::Auxiliary(kind) => self.attach(tag, kind, data, targets),
            TagClass::Control => {
                timeline.current.control_tags.push(tag);
                Ok(())
            }
            TagClass::Structural => self.structural(tag, code, data, timeline),
            TagClass::Unknown => {
                tracing::warn!(code = tag.code, offset = tag.byte_offset, "skipping unknown tag");
                Ok(())
            }
        };
        if let Err(err) = result {
            tracing::warn!(?code, offset = tag.byte_offset, %err, "skipping malformed tag");
        }
    }

    fn define(
        &mut self,
        tag: UnparsedTag,
        kind: DefinitionKind,
        data: &[u8],
        targets: &mut ScanTargets<'_>,
    ) -> Result<(), ReaderError> {
        let id = tag.reader(data).read_u16()?;
        if targets.dictionary.contains(id) {
            tracing::warn!(id, ?kind, "ignoring redefinition of symbol");
            return Ok(());
        }

        let registered = match kind {
            DefinitionKind::Sprite => {
                let (frame_count, frames) = self.scan_sprite(tag, data, targets)?;
                targets.dictionary.register(
                    id,
                    PendingDefinition::Sprite {
                        tag,
                        frame_count,
                        frames,
                    },
                )
            }
            DefinitionKind::Font(version) => match font::decode_font(&mut tag.reader(data), version) {
                Ok(font) => {
                    targets.fonts.register(&font);
                    targets.dictionary.insert_resolved(id, Symbol::Font(font))
                }
                Err(err) => {
                    tracing::warn!(id, %err, "failed to decode font");
                    targets.dictionary.insert_failed(id, err.to_string())
                }
            },
            DefinitionKind::Jpeg(version) => {
                let decoded = bitmap::decode_jpeg(&mut tag.reader(data), version);
                self.request_image(id, decoded, data, targets)
            }
            DefinitionKind::Lossless(version) => {
                let decoded = bitmap::decode_lossless(&mut tag.reader(data), version);
                self.request_image(id, decoded, data, targets)
            }
            DefinitionKind::Sound => match sound::decode_sound(&mut tag.reader(data)) {
                Ok(sound) => {
                    let request = AssetRequest {
                        id,
                        kind: AssetKind::Sound {
                            header: sound.header,
                            sample_count: sound.sample_count,
                        },
                        data: sound.data.slice(data).unwrap_or_default().to_vec(),
                        alpha: None,
                    };
                    targets.gate.request(request);
                    targets.dictionary.await_asset(id, Symbol::Sound(sound))
                }
                Err(err) => {
                    tracing::warn!(id, %err, "failed to decode sound header");
                    targets.dictionary.insert_failed(id, err.to_string())
                }
            },
            _ => targets
                .dictionary
                .register(id, PendingDefinition::Tag { tag, kind }),
        };
        if let Err(err) = registered {
            tracing::warn!(id, %err, "could not register symbol");
        }
        Ok(())
    }

    fn request_image(
        &self,
        id: u16,
        decoded: Result<ImageDefinition, ReaderError>,
        data: &[u8],
        targets: &mut ScanTargets<'_>,
    ) -> Result<(), SymbolError> {
        let mut image = match decoded {
            Ok(image) => image,
            Err(err) => {
                tracing::warn!(id, %err, "failed to decode image header");
                return targets.dictionary.insert_failed(id, err.to_string());
            }
        };
        let bytes = image.data.slice(data).unwrap_or_default();
        let encoded = if image.uses_jpeg_tables {
            let tables = self
                .jpeg_tables
                .and_then(|span| span.slice(data))
                .unwrap_or_default();
            if tables.is_empty() {
                tracing::warn!(id, "jpeg relies on tables that were not defined");
            }
            let merged = merge_jpeg_tables(tables, bytes);
            if let Some((width, height)) = sniff_dimensions(&merged) {
                image.width = width;
                image.height = height;
            }
            merged
        } else if image.format == ImageFormat::Jpeg {
            strip_erroneous_header(bytes).to_vec()
        } else {
            bytes.to_vec()
        };

        targets.gate.request(AssetRequest {
            id,
            kind: AssetKind::Image {
                format: image.format,
                width: image.width,
                height: image.height,
            },
            data: encoded,
            alpha: image.alpha.and_then(|span| span.slice(data)).map(<[u8]>::to_vec),
        });
        targets.dictionary.await_asset(id, Symbol::Image(image))
    }

    /// Collect a sprite's frames. Definitions inside the body are hoisted
    /// into the movie dictionary.
    fn scan_sprite(
        &mut self,
        tag: UnparsedTag,
        data: &[u8],
        targets: &mut ScanTargets<'_>,
    ) -> Result<(u16, Vec<SwfFrame>), ReaderError> {
        let mut r = tag.reader(data);
        let id = r.read_u16()?;
        let frame_count = r.read_u16()?;
        let end = tag.end().min(data.len());
        let mut position = r.position();
        let mut timeline = FrameCollector::default();

        while position + 2 <= end {
            let mut r = BitReader::with_range(data, position, end);
            let header = match r.read_tag_header() {
                Ok(header) => header,
                Err(err) => {
                    tracing::warn!(id, %err, "truncated tag header in sprite");
                    break;
                }
            };
            if header.code == TagCode::End.to_u16() {
                break;
            }
            let body_start = r.position();
            let body_end = body_start + header.length as usize;
            if body_end > end {
                tracing::warn!(
                    id,
                    code = header.code,
                    overrun = body_end - end,
                    "sprite child overruns its parent, dropping remaining children"
                );
                break;
            }
            position = body_end;
            let child = UnparsedTag {
                code: header.code,
                byte_offset: body_start as u32,
                byte_length: header.length,
            };
            self.handle(child, data, &mut timeline, targets);
        }

        Ok((frame_count, timeline.into_frames()))
    }

    fn attach(
        &mut self,
        tag: UnparsedTag,
        kind: AuxiliaryKind,
        data: &[u8],
        targets: &mut ScanTargets<'_>,
    ) -> Result<(), ReaderError> {
        let id = tag.reader(data).read_u16()?;
        match kind {
            AuxiliaryKind::FontInfo(version) => {
                targets.dictionary.attach_extra(id, tag);
                let info = decode_font_info(&mut tag.reader(data), version)?;
                let fonts = &mut *targets.fonts;
                let applied = targets.dictionary.with_resolved_mut(id, |symbol| {
                    if let Symbol::Font(font) = symbol {
                        apply_font_info(font, &info);
                        fonts.register(font);
                    }
                });
                if !applied {
                    tracing::debug!(id, "font info for a font that is not decoded");
                }
            }
            AuxiliaryKind::ButtonSound
            | AuxiliaryKind::ButtonCxform
            | AuxiliaryKind::ScalingGrid
            | AuxiliaryKind::VideoFrame => {
                if !targets.dictionary.contains(id) {
                    tracing::debug!(id, ?kind, "auxiliary tag precedes its definition");
                }
                targets.dictionary.attach_extra(id, tag);
            }
            AuxiliaryKind::FontAlignZones
            | AuxiliaryKind::CsmTextSettings
            | AuxiliaryKind::FontName => {
                tracing::trace!(id, ?kind, "skipping font hinting tag");
            }
        }
        Ok(())
    }

    fn structural(
        &mut self,
        tag: UnparsedTag,
        code: TagCode,
        data: &[u8],
        timeline: &mut FrameCollector,
    ) -> Result<(), ReaderError> {
        if code == TagCode::ShowFrame {
            timeline.show_frame();
            return Ok(());
        }
        let mut r = tag.reader(data);
        let frame = &mut timeline.current;
        let as3 = self.attributes.uses_actionscript_3();
        match code {
            TagCode::End => {}
            TagCode::JpegTables => self.jpeg_tables = Some(tag.span()),
            TagCode::SetBackgroundColor => self.attributes.background_color = Some(r.read_rgb()?),
            TagCode::DoAction if !as3 => frame.action_blocks.push(tag.span()),
            TagCode::DoInitAction if !as3 => {
                let sprite_id = r.read_u16()?;
                let start = r.position();
                frame.init_action_blocks.push(InitActionBlock {
                    sprite_id,
                    actions: ByteSpan::new(start, r.read_rest().len()),
                });
            }
            TagCode::DoAbc if as3 => {
                let flags = r.read_u32()?;
                let name = r.read_string(None)?;
                let start = r.position();
                frame.abc_blocks.push(AbcBlock {
                    flags,
                    name,
                    data: ByteSpan::new(start, r.read_rest().len()),
                });
            }
            TagCode::DoAbcDefine if as3 => frame.abc_blocks.push(AbcBlock {
                flags: 0,
                name: String::new(),
                data: tag.span(),
            }),
            TagCode::DoAction | TagCode::DoInitAction | TagCode::DoAbc | TagCode::DoAbcDefine => {
                tracing::debug!(?code, as3, "skipping script tag for the other script version");
            }
            TagCode::SoundStreamHead | TagCode::SoundStreamHead2 => {
                frame.sound_stream_head = Some(decode_sound_stream_head(&mut r)?);
            }
            TagCode::SoundStreamBlock => frame.sound_stream_block = Some(tag.span()),
            TagCode::FrameLabel => frame.labels.push(r.read_string(None)?),
            TagCode::ExportAssets => {
                for entry in read_id_names(&mut r)? {
                    if let Some(existing) = self.exports.iter().find(|e| e.name == entry.name) {
                        tracing::warn!(name = %entry.name, first = existing.id, ignored = entry.id, "duplicate export name");
                    } else {
                        self.exports.push(entry.clone());
                    }
                    frame.exports.push(entry);
                }
            }
            TagCode::SymbolClass => {
                for entry in read_id_names(&mut r)? {
                    if let Some(existing) = self.symbol_classes.iter().find(|c| c.id == entry.id) {
                        tracing::warn!(id = entry.id, first = %existing.name, ignored = %entry.name, "duplicate symbol class");
                        continue;
                    }
                    self.symbol_classes.push(SymbolClass {
                        id: entry.id,
                        name: entry.name,
                    });
                }
            }
            TagCode::ImportAssets | TagCode::ImportAssets2 => {
                let url = r.read_string(None)?;
                if code == TagCode::ImportAssets2 {
                    r.skip(2)?;
                }
                for entry in read_id_names(&mut r)? {
                    self.attributes.imports.push(ImportEntry {
                        url: url.clone(),
                        id: entry.id,
                        name: entry.name,
                    });
                }
            }
            TagCode::FileAttributes => {
                self.attributes.file_attributes = FileAttributes::from_bits_truncate(r.read_u32()?);
            }
            TagCode::Metadata => self.attributes.metadata = Some(r.read_string(None)?),
            TagCode::ScriptLimits => {
                self.attributes.script_limits = Some(ScriptLimits {
                    max_recursion_depth: r.read_u16()?,
                    timeout_seconds: r.read_u16()?,
                });
            }
            TagCode::DefineSceneAndFrameLabelData => self.read_scenes(&mut r)?,
            TagCode::EnableDebugger | TagCode::EnableDebugger2 => {
                self.attributes.debugger_enabled = true;
            }
            TagCode::Protect => self.attributes.protected = true,
            TagCode::ProductInfo => self.attributes.product_info = Some(read_product_info(&mut r)?),
            TagCode::DebugId | TagCode::SetTabIndex => {
                tracing::trace!(?code, "ignoring tag");
            }
            other => tracing::debug!(?other, "structural tag with no handler"),
        }
        Ok(())
    }

    fn read_scenes(&mut self, r: &mut BitReader<'_>) -> Result<(), ReaderError> {
        let scene_count = r.read_encoded_u32()?;
        for _ in 0..scene_count {
            let first_frame = r.read_encoded_u32()?;
            let name = r.read_string(None)?;
            self.attributes.scenes.push(Scene { first_frame, name });
        }
        let label_count = r.read_encoded_u32()?;
        for _ in 0..label_count {
            let frame = r.read_encoded_u32()?;
            let name = r.read_string(None)?;
            self.attributes
                .scene_frame_labels
                .push(SceneFrameLabel { frame, name });
        }
        Ok(())
    }
}

/// Count-prefixed `(id, name)` table of export and symbol-class tags.
fn read_id_names(r: &mut BitReader<'_>) -> Result<Vec<ExportEntry>, ReaderError> {
    let count = r.read_u16()?;
    let mut entries = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let id = r.read_u16()?;
        let name = r.read_string(None)?;
        entries.push(ExportEntry { id, name });
    }
    Ok(entries)
}

fn read_product_info(r: &mut BitReader<'_>) -> Result<ProductInfo, ReaderError> {
    let product_id = r.read_u32()?;
    let edition = r.read_u32()?;
    let major_version = r.read_u8()?;
    let minor_version = r.read_u8()?;
    let build = u64::from(r.read_u32()?) | u64::from(r.read_u32()?) << 32;
    let compile_date = u64::from(r.read_u32()?) | u64::from(r.read_u32()?) << 32;
    Ok(ProductInfo {
        product_id,
        edition,
        major_version,
        minor_version,
        build,
        compile_date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_bytes(code: TagCode, body: &[u8]) -> Vec<u8> {
        let code = code.to_u16();
        let mut bytes = Vec::new();
        if body.len() < 0x3F {
            bytes.extend_from_slice(&(code << 6 | body.len() as u16).to_le_bytes());
        } else {
            bytes.extend_from_slice(&(code << 6 | 0x3F).to_le_bytes());
            bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
        }
        bytes.extend_from_slice(body);
        bytes
    }

    struct Fixture {
        dictionary: Dictionary,
        fonts: FontRegistry,
        gate: DependencyGate,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dictionary: Dictionary::new(),
                fonts: FontRegistry::default(),
                gate: DependencyGate::default(),
            }
        }

        fn scan(&mut self, scanner: &mut Scanner, data: &[u8]) {
            let mut targets = ScanTargets {
                dictionary: &mut self.dictionary,
                fonts: &mut self.fonts,
                gate: &mut self.gate,
            };
            scanner.scan(data, &mut targets);
        }
    }

    #[test]
    fn test_prefix_validation() {
        assert!(matches!(
            FilePrefix::parse(b"XWS\x0a\x10\0\0\0"),
            Err(SwfError::InvalidMagic(_))
        ));
        assert!(matches!(
            FilePrefix::parse(b"FWS"),
            Err(SwfError::HeaderTooShort(3))
        ));
        let prefix = FilePrefix::parse(b"CWS\x0a\x20\0\0\0").unwrap();
        assert_eq!(prefix.compression, Compression::Deflate);
        assert_eq!(prefix.version, 10);
        assert_eq!(prefix.uncompressed_length, 32);
    }

    #[test]
    fn test_frames_split_on_show_frame() {
        let mut data = tag_bytes(TagCode::FrameLabel, b"intro\0");
        data.extend(tag_bytes(TagCode::RemoveObject2, &[1, 0]));
        data.extend(tag_bytes(TagCode::ShowFrame, &[]));
        data.extend(tag_bytes(TagCode::ShowFrame, &[]));
        data.extend(tag_bytes(TagCode::End, &[]));

        let mut scanner = Scanner::new(10);
        let mut fixture = Fixture::new();
        fixture.scan(&mut scanner, &data);

        assert!(scanner.is_finished());
        assert_eq!(scanner.frames().len(), 2);
        assert_eq!(scanner.frames()[0].labels, vec!["intro".to_string()]);
        assert_eq!(scanner.frames()[0].control_tags.len(), 1);
        assert_eq!(scanner.frames()[0].control_tags[0].byte_offset, 10);
        assert!(scanner.frames()[1].is_empty());
    }

    /// Append a tag and record where its body lands.
    fn append(data: &mut Vec<u8>, layout: &mut Vec<UnparsedTag>, code: TagCode, body: &[u8], long: bool) {
        if long || body.len() >= 0x3F {
            data.extend_from_slice(&(code.to_u16() << 6 | 0x3F).to_le_bytes());
            data.extend_from_slice(&(body.len() as u32).to_le_bytes());
        } else {
            data.extend_from_slice(&(code.to_u16() << 6 | body.len() as u16).to_le_bytes());
        }
        layout.push(UnparsedTag {
            code: code.to_u16(),
            byte_offset: data.len() as u32,
            byte_length: body.len() as u32,
        });
        data.extend_from_slice(body);
    }

    #[test]
    fn test_tags_come_back_in_file_order() {
        let mut data = Vec::new();
        let mut layout = Vec::new();
        let mut blob = vec![2, 0, 0, 0, 0, 0];
        blob.extend(0..200u8);
        append(&mut data, &mut layout, TagCode::DefineBinaryData, &[1, 0, 0, 0, 0, 0, 9], false);
        append(&mut data, &mut layout, TagCode::PlaceObject2, &[0x06, 1, 0, 1, 0, 0x00], false);
        append(&mut data, &mut layout, TagCode::DefineBinaryData, &blob, false);
        append(&mut data, &mut layout, TagCode::RemoveObject2, &[1, 0], true);
        append(&mut data, &mut layout, TagCode::DefineShape, &[3, 0, 0x00, 0, 0, 0x00, 0x00], true);
        append(&mut data, &mut layout, TagCode::PlaceObject2, &[0x06, 2, 0, 3, 0, 0x00], false);
        data.extend(tag_bytes(TagCode::ShowFrame, &[]));
        data.extend(tag_bytes(TagCode::End, &[]));

        let mut scanner = Scanner::new(10);
        let mut fixture = Fixture::new();
        fixture.scan(&mut scanner, &data);
        assert!(scanner.is_finished());
        assert_eq!(scanner.position(), data.len());

        let control = &scanner.frames()[0].control_tags;
        let definitions: Vec<UnparsedTag> = fixture
            .dictionary
            .ids()
            .filter_map(|id| fixture.dictionary.pending(id).map(|pending| *pending.tag()))
            .collect();
        assert_eq!(control.len(), 3);
        assert_eq!(definitions.len(), 3);

        let mut scanned: Vec<UnparsedTag> = definitions.iter().chain(control).copied().collect();
        scanned.sort_by_key(|tag| tag.byte_offset);
        assert_eq!(scanned, layout);
        // each list on its own is already in file order
        assert!(control.windows(2).all(|pair| pair[0].byte_offset < pair[1].byte_offset));
        assert!(definitions.windows(2).all(|pair| pair[0].byte_offset < pair[1].byte_offset));
    }

    #[test]
    fn test_incomplete_tag_waits() {
        let mut data = tag_bytes(TagCode::ShowFrame, &[]);
        data.extend(tag_bytes(TagCode::DefineBinaryData, &[5, 0, 0, 0, 0, 0, 1, 2]));

        let mut scanner = Scanner::new(10);
        let mut fixture = Fixture::new();
        fixture.scan(&mut scanner, &data[..data.len() - 3]);
        assert_eq!(scanner.position(), 2);
        assert!(fixture.dictionary.is_empty());

        fixture.scan(&mut scanner, &data);
        assert_eq!(scanner.position(), data.len());
        assert!(fixture.dictionary.contains(5));
    }

    #[test]
    fn test_long_header_for_short_tags() {
        let mut data = (TagCode::ShowFrame.to_u16() << 6 | 0x3F).to_le_bytes().to_vec();
        data.extend_from_slice(&0u32.to_le_bytes());
        let mut scanner = Scanner::new(10);
        let mut fixture = Fixture::new();
        fixture.scan(&mut scanner, &data);
        assert_eq!(scanner.frames().len(), 1);
        assert_eq!(scanner.position(), 6);
    }

    #[test]
    fn test_sprite_children_are_hoisted() {
        let mut body = vec![7, 0, 2, 0];
        body.extend(tag_bytes(TagCode::DefineBinaryData, &[8, 0, 0, 0, 0, 0]));
        body.extend(tag_bytes(TagCode::RemoveObject2, &[1, 0]));
        body.extend(tag_bytes(TagCode::ShowFrame, &[]));
        body.extend(tag_bytes(TagCode::End, &[]));
        let data = tag_bytes(TagCode::DefineSprite, &body);

        let mut scanner = Scanner::new(10);
        let mut fixture = Fixture::new();
        fixture.scan(&mut scanner, &data);
        assert!(fixture.dictionary.contains(7));
        assert!(fixture.dictionary.contains(8));
        assert!(scanner.frames().is_empty());
    }

    #[test]
    fn test_sprite_child_overrun_is_dropped() {
        let mut body = vec![7, 0, 1, 0];
        body.extend(tag_bytes(TagCode::ShowFrame, &[]));
        // claims four bytes, only two remain in the sprite
        body.extend_from_slice(&(TagCode::RemoveObject2.to_u16() << 6 | 4).to_le_bytes());
        body.extend_from_slice(&[1, 0]);
        let data = tag_bytes(TagCode::DefineSprite, &body);

        let mut scanner = Scanner::new(10);
        let mut fixture = Fixture::new();
        fixture.scan(&mut scanner, &data);
        assert_eq!(scanner.position(), data.len());
        assert!(fixture.dictionary.contains(7));
    }

    #[test]
    fn test_redefinition_keeps_first() {
        let mut data = tag_bytes(TagCode::DefineBinaryData, &[5, 0, 0, 0, 0, 0, 1]);
        data.extend(tag_bytes(TagCode::DefineBinaryData, &[5, 0, 0, 0, 0, 0, 2, 2]));
        let mut scanner = Scanner::new(10);
        let mut fixture = Fixture::new();
        fixture.scan(&mut scanner, &data);
        assert_eq!(fixture.dictionary.len(), 1);
    }

    #[test]
    fn test_unknown_tag_is_skipped() {
        let mut data = tag_bytes(TagCode::Unknown(200), &[1, 2, 3]);
        data.extend(tag_bytes(TagCode::ShowFrame, &[]));
        let mut scanner = Scanner::new(10);
        let mut fixture = Fixture::new();
        fixture.scan(&mut scanner, &data);
        assert_eq!(scanner.frames().len(), 1);
    }

    #[test]
    fn test_script_tags_follow_file_attributes() {
        let mut data = tag_bytes(TagCode::FileAttributes, &[0x08, 0, 0, 0]);
        data.extend(tag_bytes(TagCode::DoAction, &[0]));
        let mut abc = 1u32.to_le_bytes().to_vec();
        abc.extend_from_slice(b"main\0");
        abc.extend_from_slice(&[0x10, 0x00]);
        data.extend(tag_bytes(TagCode::DoAbc, &abc));
        data.extend(tag_bytes(TagCode::ShowFrame, &[]));

        let mut scanner = Scanner::new(10);
        let mut fixture = Fixture::new();
        fixture.scan(&mut scanner, &data);
        let frame = &scanner.frames()[0];
        assert!(frame.action_blocks.is_empty());
        assert_eq!(frame.abc_blocks.len(), 1);
        assert_eq!(frame.abc_blocks[0].name, "main");
        assert_eq!(frame.abc_blocks[0].data.length, 2);
        assert!(scanner.attributes().uses_actionscript_3());
    }

    #[test]
    fn test_symbol_classes_and_exports() {
        let mut table = 2u16.to_le_bytes().to_vec();
        table.extend_from_slice(&[3, 0]);
        table.extend_from_slice(b"Ball\0");
        table.extend_from_slice(&[3, 0]);
        table.extend_from_slice(b"Other\0");
        let mut data = tag_bytes(TagCode::SymbolClass, &table);
        data.extend(tag_bytes(TagCode::ExportAssets, &table));
        data.extend(tag_bytes(TagCode::ShowFrame, &[]));

        let mut scanner = Scanner::new(10);
        let mut fixture = Fixture::new();
        fixture.scan(&mut scanner, &data);
        assert_eq!(scanner.symbol_classes().len(), 1);
        assert_eq!(scanner.symbol_classes()[0].name, "Ball");
        assert_eq!(scanner.exports().len(), 2);
        assert_eq!(scanner.frames()[0].exports.len(), 2);
    }

    #[test]
    fn test_scene_data() {
        let mut body = vec![1, 0];
        body.extend_from_slice(b"Scene 1\0");
        body.push(1);
        body.push(0x8A);
        body.push(0x01);
        body.extend_from_slice(b"end\0");
        let data = tag_bytes(TagCode::DefineSceneAndFrameLabelData, &body);

        let mut scanner = Scanner::new(10);
        let mut fixture = Fixture::new();
        fixture.scan(&mut scanner, &data);
        let attributes = scanner.attributes();
        assert_eq!(attributes.scenes[0].name, "Scene 1");
        assert_eq!(attributes.scene_frame_labels[0].frame, 138);
    }

    #[test]
    fn test_eager_sound_requests_asset() {
        let mut body = vec![4, 0];
        // uncompressed little-endian, 44 kHz, 16-bit, mono
        body.push(0x3E);
        body.extend_from_slice(&2u32.to_le_bytes());
        body.extend_from_slice(&[0x10, 0x00, 0x20, 0x00]);
        let data = tag_bytes(TagCode::DefineSound, &body);

        let mut scanner = Scanner::new(10);
        let mut fixture = Fixture::new();
        fixture.scan(&mut scanner, &data);
        assert_eq!(fixture.gate.outstanding(), 1);
        let requests = fixture.gate.take_requests();
        assert_eq!(requests[0].id, 4);
        assert_eq!(requests[0].data, vec![0x10, 0x00, 0x20, 0x00]);
    }
}
