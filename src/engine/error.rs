// Error taxonomy for the encode path

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Which of the two pipeline streams an error was detected on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Video => write!(f, "video"),
            StreamKind::Audio => write!(f, "audio"),
        }
    }
}

/// Everything that can stop an encode. Validation variants are raised
/// before any external process is spawned; stream variants abort a run
/// that is already writing.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("invalid output geometry {width}x{height} (need 1..=128 x 1..=64)")]
    InvalidGeometry { width: u32, height: u32 },

    #[error("thresholding and dithering are mutually exclusive, pick one")]
    InvalidThreshold,

    #[error("expected exactly one {kind} stream, found {count}")]
    MissingStream { kind: StreamKind, count: usize },

    #[error("{field} must be positive")]
    InvalidRate { field: &'static str },

    #[error("{field} {value} does not fit the bundle header (max {limit})")]
    FormatLimit {
        field: &'static str,
        value: u64,
        limit: u64,
    },

    #[error("cannot open output file {path}")]
    OutputUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{stream} stream ended early at frame {frame}")]
    PipelineDesync { stream: StreamKind, frame: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
