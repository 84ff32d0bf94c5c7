// Source probing using ffprobe

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::process::Command;

use crate::engine::error::{EncodeError, StreamKind};
use crate::engine::params::Rational;

/// Probed source metadata the resolver needs. Guaranteed to come from a
/// file with exactly one video and one audio stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: Rational,
    pub frame_count: u64,
    pub sample_rate: u32,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    // ffprobe emits counts and rates as JSON strings
    nb_read_packets: Option<String>,
    sample_rate: Option<String>,
}

/// Probe a source file. `-count_packets` walks the whole file so the
/// frame count is exact, not estimated from duration.
pub fn probe_source(path: &Path) -> Result<SourceInfo> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            "-count_packets",
        ])
        .arg(path)
        .output()
        .context("Failed to execute ffprobe. Is ffprobe installed and in PATH?")?;

    if !output.status.success() {
        anyhow::bail!(
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr)
        );
    }

    let json_str = String::from_utf8_lossy(&output.stdout);
    parse_probe_output(&json_str)
}

/// Parse ffprobe JSON into `SourceInfo` (separated for testing).
pub fn parse_probe_output(json: &str) -> Result<SourceInfo> {
    let probe: FfprobeOutput =
        serde_json::from_str(json).context("Failed to parse ffprobe JSON output")?;

    let videos: Vec<&FfprobeStream> = probe
        .streams
        .iter()
        .filter(|s| s.codec_type.as_deref() == Some("video"))
        .collect();
    let audios: Vec<&FfprobeStream> = probe
        .streams
        .iter()
        .filter(|s| s.codec_type.as_deref() == Some("audio"))
        .collect();

    if videos.len() != 1 {
        return Err(EncodeError::MissingStream {
            kind: StreamKind::Video,
            count: videos.len(),
        }
        .into());
    }
    if audios.len() != 1 {
        return Err(EncodeError::MissingStream {
            kind: StreamKind::Audio,
            count: audios.len(),
        }
        .into());
    }

    let video = videos[0];
    let audio = audios[0];

    let width = video.width.context("No video width in ffprobe output")?;
    let height = video.height.context("No video height in ffprobe output")?;
    if width == 0 || height == 0 {
        anyhow::bail!("Source reports zero video dimensions ({}x{})", width, height);
    }

    let rate_str = video
        .r_frame_rate
        .as_deref()
        .context("No r_frame_rate in ffprobe output")?;
    let frame_rate: Rational = rate_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Failed to parse r_frame_rate '{}': {}", rate_str, e))?;
    if frame_rate.is_zero() {
        return Err(EncodeError::InvalidRate {
            field: "source frame rate",
        }
        .into());
    }

    let frame_count: u64 = video
        .nb_read_packets
        .as_deref()
        .context("No packet count in ffprobe output")?
        .parse()
        .context("Failed to parse packet count")?;

    let sample_rate: u32 = audio
        .sample_rate
        .as_deref()
        .context("No audio sample rate in ffprobe output")?
        .parse()
        .context("Failed to parse audio sample rate")?;
    if sample_rate == 0 {
        return Err(EncodeError::InvalidRate {
            field: "source sample rate",
        }
        .into());
    }

    Ok(SourceInfo {
        width,
        height,
        frame_rate,
        frame_count,
        sample_rate,
    })
}

/// Check if ffmpeg is available and return its version line
pub fn ffmpeg_version() -> Result<String> {
    tool_version("ffmpeg")
}

/// Check if ffprobe is available and return its version line
pub fn ffprobe_version() -> Result<String> {
    tool_version("ffprobe")
}

fn tool_version(tool: &str) -> Result<String> {
    let output = Command::new(tool)
        .arg("-version")
        .output()
        .with_context(|| format!("Failed to execute {}. Is it installed and in PATH?", tool))?;

    if !output.status.success() {
        anyhow::bail!("{} command failed with status: {}", tool, output.status);
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    let first_line = version_output.lines().next().unwrap_or("Unknown version");

    Ok(first_line.to_string())
}
