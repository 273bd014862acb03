use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A dotted version string that cannot be encoded as an integer.
    #[error("invalid version '{version}': {reason}")]
    Format { version: String, reason: String },

    #[error("corrupt descriptor: {0}")]
    CorruptDescriptor(String),

    /// The catalog layout on disk is incomplete or ambiguous.
    #[error("startup error: {0}")]
    Startup(String),

    /// A binary image does not match its descriptor.
    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed command: {0}")]
    MalformedCommand(#[from] serde_json::Error),

    #[error("binary command must be {expected} bytes, got {actual}")]
    FrameLength { expected: usize, actual: usize },

    #[error("failed to encode reply: {0}")]
    Encode(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
