// Core encoding engine - independent of the CLI surface

pub mod bundle;
pub mod error;
pub mod fetch;
pub mod header;
pub mod params;
pub mod pipeline;
pub mod probe;

pub use bundle::{create_output, BundleEncoder, EncodeReport};
pub use error::{EncodeError, StreamKind};
pub use header::{BundleHeader, FORMAT_VERSION, HEADER_SIZE, SIGNATURE};
pub use params::{EncodeOptions, EncodeParams, Rational, Scale};
pub use pipeline::{
    build_audio_cmd, build_video_cmd, render_command, spawn_pipeline, ConversionMode,
    DitherAlgorithm, PipelineChild,
};
pub use probe::{ffmpeg_version, ffprobe_version, probe_source, SourceInfo};
