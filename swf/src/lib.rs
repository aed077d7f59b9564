//! Streaming decoder for SWF movie files.
//!
//! Bytes are pushed into a [`Movie`] as they arrive. The scanner locates
//! every tag, registers definitions in a lazily decoding [`Dictionary`] and
//! collects per-frame directives. Once loading completes, timelines are
//! compiled into flat [`TimelineProgram`]s that can be seeked to any frame.
//!
//! Image and sound data is decoded by the host through [`AssetDecoder`] or
//! the [`Movie::pending_assets`] / [`Movie::complete_asset`] pair.
//!
//! # Example
//!
//! ```ignore
//! use swf::{Movie, ParseOptions};
//!
//! let data = std::fs::read("movie.swf").unwrap();
//! let mut movie = Movie::from_bytes(&data, ParseOptions::default()).unwrap();
//! for request in movie.pending_assets() {
//!     movie.fail_asset(request.id, "no codec");
//! }
//!
//! let timeline = movie.root_timeline().unwrap();
//! println!("{} frames, {} keyframes", timeline.frame_count, timeline.keyframe_count());
//! ```

pub mod bit_reader;
pub mod compression;
mod context;
pub mod decoders;
mod dictionary;
mod error;
mod gate;
mod movie;
pub mod reader;
mod scanner;
mod symbol;
pub mod tag;
pub mod timeline;

pub use context::{CancelToken, FontRegistry, ParseOptions, RegisteredFont};
pub use dictionary::{Dictionary, PendingDefinition, SymbolState};
pub use error::{DecompressionError, ReaderError, Result, SwfError, SymbolError};
pub use gate::{AssetDecoder, AssetKind, AssetRequest, DecodedAsset, DependencyGate};
pub use movie::{Movie, MovieSummary, SymbolSummary};
pub use scanner::{
    AbcBlock, ExportEntry, FileAttributes, FilePrefix, ImportEntry, InitActionBlock,
    MovieAttributes, ProductInfo, Scene, SceneFrameLabel, ScriptLimits, SwfFrame, SwfHeader,
    SymbolClass,
};
pub use symbol::{Symbol, SymbolKind, SymbolSource};
pub use timeline::{TimelineCompiler, TimelineProgram};
