// Fetching sources with yt-dlp

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use crate::engine::pipeline::render_command;

/// Canonicalize share links before handing them to yt-dlp: the watch URL
/// collapses to the short form and a `si=` tracking suffix is dropped
/// together with its `?` or `&` separator.
pub fn normalize_url(url: &str) -> String {
    let short = url
        .replace("youtube.com/watch?v=", "youtu.be/")
        .replace("https://www.", "https://");
    // Only an ASCII separator marks a tracking suffix, so the cut index
    // is always a char boundary.
    let cut = match (short.find("?si="), short.find("&si=")) {
        (Some(q), Some(a)) => Some(q.min(a)),
        (q, a) => q.or(a),
    };
    match cut {
        Some(pos) => short[..pos].to_string(),
        None => short,
    }
}

/// Build the yt-dlp invocation: mp4 only, playlist expansion off,
/// generous retries, sponsor and self-promo segments cut out.
pub fn build_fetch_cmd(url: &str, output: &Path) -> Command {
    let mut cmd = Command::new("yt-dlp");
    cmd.args([
        "-f",
        "mp4",
        "--no-playlist",
        "--retries",
        "10",
        "--fragment-retries",
        "10",
    ])
    .args(["--sponsorblock-remove", "sponsor,selfpromo"])
    .args(["--recode-video", "mp4"])
    .arg("-o")
    .arg(output)
    .arg(url);
    cmd
}

/// Louder copy of a fetched file, video stream untouched.
pub fn build_boost_cmd(input: &Path, output: &Path) -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-v", "error", "-i"])
        .arg(input)
        .args(["-af", "volume=3", "-c:v", "copy"])
        .arg(output);
    cmd
}

/// Download `url` to `output`. With `boost_volume` the download lands in
/// an intermediate file first and a volume-boosted copy becomes the
/// final output.
pub fn fetch(url: &str, output: &Path, boost_volume: bool, keep_intermediate: bool) -> Result<()> {
    let short = normalize_url(url);
    if short != url {
        debug!("normalized source url to {}", short);
    }

    if !boost_volume {
        return run_fetch(&short, output);
    }

    let intermediate = intermediate_path(output);
    run_fetch(&short, &intermediate)?;

    let mut boost = build_boost_cmd(&intermediate, output);
    debug!(command = %render_command(&boost), "boosting volume");
    let status = boost
        .status()
        .context("Failed to run ffmpeg. Is ffmpeg installed and in PATH?")?;
    if !status.success() {
        anyhow::bail!("volume boost failed with {}", status);
    }

    if !keep_intermediate {
        std::fs::remove_file(&intermediate).with_context(|| {
            format!(
                "Failed to remove intermediate file {}",
                intermediate.display()
            )
        })?;
    }
    Ok(())
}

fn run_fetch(url: &str, output: &Path) -> Result<()> {
    let mut cmd = build_fetch_cmd(url, output);
    debug!(command = %render_command(&cmd), "downloading");
    let status = cmd
        .status()
        .context("Failed to run yt-dlp. Is yt-dlp installed and in PATH?")?;
    if !status.success() {
        anyhow::bail!("yt-dlp exited with {}", status);
    }
    Ok(())
}

fn intermediate_path(output: &Path) -> PathBuf {
    match output.extension().and_then(|e| e.to_str()) {
        Some(ext) => output.with_extension(format!("raw.{}", ext)),
        None => output.with_extension("raw"),
    }
}
