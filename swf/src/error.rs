use thiserror::Error;

/// Failure while reading primitive values or records out of a byte range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReaderError {
    #[error("unexpected end of data at offset {offset:#x} (need {need} bytes, have {have})")]
    UnexpectedEndOfData {
        offset: usize,
        need: usize,
        have: usize,
    },

    #[error("invalid {what} value {value} at offset {offset:#x}")]
    InvalidValue {
        what: &'static str,
        value: u32,
        offset: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecompressionError {
    #[error("zlib stream error: {0}")]
    Deflate(String),

    #[error("lzma stream error: {0}")]
    Lzma(String),
}

/// Failure resolving one dictionary id. Isolated to the symbol's consumers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    #[error("symbol {0} is not defined")]
    Undefined(u16),

    #[error("cyclic reference while resolving symbol {0}")]
    CyclicSymbolReference(u16),

    #[error("symbol {0} is already defined")]
    Duplicate(u16),

    #[error("failed to decode symbol {id}: {source}")]
    Decode { id: u16, source: ReaderError },

    #[error("symbol {id} is unavailable: {reason}")]
    Failed { id: u16, reason: String },

    #[error("symbol {0} is waiting on an external decoder")]
    Pending(u16),
}

/// Session-level failure. Any of these ends the parse.
#[derive(Debug, Error)]
pub enum SwfError {
    #[error("invalid magic bytes {0:02x?}")]
    InvalidMagic([u8; 3]),

    #[error("header too short: {0} bytes")]
    HeaderTooShort(usize),

    #[error("decompression failed: {0}")]
    Decompression(#[from] DecompressionError),

    #[error(transparent)]
    Reader(#[from] ReaderError),

    #[error(transparent)]
    Symbol(#[from] SymbolError),

    #[error("parse was cancelled")]
    Cancelled,

    #[error("movie is not ready: {0}")]
    NotReady(&'static str),
}

pub type Result<T, E = SwfError> = std::result::Result<T, E>;
