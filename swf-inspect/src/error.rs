use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] swf::SwfError),

    #[error(transparent)]
    Symbol(#[from] swf::SymbolError),

    #[error("failed to encode json: {0}")]
    Json(#[from] serde_json::Error),
}
