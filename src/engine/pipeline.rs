/// Building and driving the two ffmpeg pipeline legs.
///
/// The video leg emits raw 1-bit `monow` frames on stdout, the audio leg
/// raw unsigned 8-bit mono samples. Both run concurrently; the encoder
/// drains them in lockstep. Stderr of each child is collected on its own
/// thread so a chatty ffmpeg can never stall on a full pipe.
use anyhow::{Context, Result};
use clap::ValueEnum;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use tracing::{debug, warn};

use crate::engine::error::EncodeError;
use crate::engine::params::EncodeParams;

/// Dithering algorithms understood by paletteuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DitherAlgorithm {
    Bayer,
    Heckbert,
    #[value(name = "floyd_steinberg")]
    FloydSteinberg,
    Sierra2,
    #[value(name = "sierra2_4a")]
    Sierra24a,
    Sierra3,
    Burkes,
    Atkinson,
    /// Plain palette mapping with no error diffusion.
    None,
}

impl DitherAlgorithm {
    /// The name paletteuse expects in its `dither=` option.
    pub fn filter_value(&self) -> &'static str {
        match self {
            DitherAlgorithm::Bayer => "bayer",
            DitherAlgorithm::Heckbert => "heckbert",
            DitherAlgorithm::FloydSteinberg => "floyd_steinberg",
            DitherAlgorithm::Sierra2 => "sierra2",
            DitherAlgorithm::Sierra24a => "sierra2_4a",
            DitherAlgorithm::Sierra3 => "sierra3",
            DitherAlgorithm::Burkes => "burkes",
            DitherAlgorithm::Atkinson => "atkinson",
            DitherAlgorithm::None => "none",
        }
    }
}

/// How grayscale collapses to black and white. Built once from CLI and
/// config, read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionMode {
    /// Hard luma cut: at or above the value is white, below is black.
    Threshold(u8),
    /// Error diffusion against a two-entry black/white palette.
    Dither(DitherAlgorithm),
    /// Palette mapping with dithering disabled.
    None,
}

impl ConversionMode {
    /// Combine the mutually exclusive flags, falling back to the given
    /// default algorithm when neither is set.
    pub fn resolve(
        dither: Option<DitherAlgorithm>,
        threshold: Option<u8>,
        fallback: DitherAlgorithm,
    ) -> Result<Self, EncodeError> {
        match (dither, threshold) {
            (Some(_), Some(_)) => Err(EncodeError::InvalidThreshold),
            (None, Some(t)) => Ok(ConversionMode::Threshold(t)),
            (Some(DitherAlgorithm::None), None) => Ok(ConversionMode::None),
            (Some(algorithm), None) => Ok(ConversionMode::Dither(algorithm)),
            (None, None) => match fallback {
                DitherAlgorithm::None => Ok(ConversionMode::None),
                algorithm => Ok(ConversionMode::Dither(algorithm)),
            },
        }
    }
}

/// Video leg: scale, gray conversion, rate conversion, black/white
/// collapse, then white padding out to the stored width, emitted as raw
/// packed `monow` frames.
pub fn build_video_cmd(source: &Path, params: &EncodeParams, mode: ConversionMode) -> Command {
    let scale_chain = format!(
        "scale={}:{},format=gray,fps={}",
        params.pre_pad_width, params.frame_height, params.frame_rate
    );
    let pad = format!("pad={}:{}:0:0:white", params.frame_width, params.frame_height);

    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-v", "error", "-i"]).arg(source);

    match mode {
        ConversionMode::Threshold(t) => {
            cmd.arg("-vf").arg(format!(
                "{},maskfun=low={}:high={}:sum=256:fill=255,{}",
                scale_chain, t, t, pad
            ));
        }
        ConversionMode::Dither(_) | ConversionMode::None => {
            let dither = match mode {
                ConversionMode::Dither(algorithm) => algorithm.filter_value(),
                _ => "none",
            };
            // An 8x16 black strip stacked against an 8x16 white strip is
            // the two-color palette paletteuse maps every frame onto.
            let graph = format!(
                "[0:v]{}[v];\
                 color=c=black:r=1:d=1:s=8x16[blk];\
                 color=c=white:r=1:d=1:s=8x16[wht];\
                 [blk][wht]hstack=inputs=2[pal];\
                 [v][pal]paletteuse=new=true:dither={}[bw];\
                 [bw]{}[out]",
                scale_chain, dither, pad
            );
            cmd.arg("-filter_complex").arg(graph).args(["-map", "[out]"]);
        }
    }

    cmd.args(["-sws_dither", "none", "-f", "rawvideo", "-pix_fmt", "monow", "pipe:1"]);
    cmd
}

/// Audio leg: loudness-normalized mono unsigned 8-bit PCM on stdout.
pub fn build_audio_cmd(source: &Path, params: &EncodeParams) -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-v", "error", "-i"])
        .arg(source)
        .args(["-af", "loudnorm", "-f", "u8", "-c:a", "pcm_u8", "-ac", "1", "-ar"])
        .arg(params.sample_rate.to_string())
        .arg("pipe:1");
    cmd
}

/// A running pipeline leg and the thread draining its stderr.
pub struct PipelineChild {
    name: &'static str,
    child: Child,
    stderr_thread: JoinHandle<String>,
}

/// Spawn one leg with stdout piped back to us.
pub fn spawn_pipeline(name: &'static str, mut cmd: Command) -> Result<(PipelineChild, ChildStdout)> {
    debug!(command = %render_command(&cmd), "spawning {} pipeline", name);

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn().with_context(|| {
        format!(
            "Failed to spawn the {} pipeline. Is ffmpeg installed and in PATH?",
            name
        )
    })?;

    let stdout = child.stdout.take().context("Failed to capture stdout")?;
    let stderr = child.stderr.take().context("Failed to capture stderr")?;
    let stderr_thread = std::thread::spawn(move || {
        let mut stderr_output = String::new();
        let reader = BufReader::new(stderr);
        for line in reader.lines().map_while(Result::ok) {
            stderr_output.push_str(&line);
            stderr_output.push('\n');
        }
        stderr_output
    });

    Ok((
        PipelineChild {
            name,
            child,
            stderr_thread,
        },
        stdout,
    ))
}

impl PipelineChild {
    /// Wait for the child and surface a failed exit together with
    /// whatever it wrote to stderr.
    pub fn finish(mut self) -> Result<()> {
        let status = self
            .child
            .wait()
            .with_context(|| format!("Failed to wait for the {} pipeline", self.name))?;
        let stderr_output = self
            .stderr_thread
            .join()
            .unwrap_or_else(|_| "Failed to capture stderr".to_string());

        if !status.success() {
            anyhow::bail!(
                "{} pipeline exited with {}: {}",
                self.name,
                status,
                stderr_output.trim_end()
            );
        }
        if !stderr_output.trim().is_empty() {
            warn!(pipeline = self.name, "ffmpeg reported: {}", stderr_output.trim_end());
        }
        Ok(())
    }

    /// Kill the child without caring how it exits. Used when the run is
    /// already failing and the pipes are being torn down.
    pub fn abort(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Render a command for logs and dry runs, quoting args with spaces.
pub fn render_command(cmd: &Command) -> String {
    let args = cmd.get_args().map(|arg| {
        let s = arg.to_string_lossy();
        if s.contains(' ') {
            format!("\"{}\"", s)
        } else {
            s.to_string()
        }
    });
    std::iter::once(cmd.get_program().to_string_lossy().to_string())
        .chain(args)
        .collect::<Vec<_>>()
        .join(" ")
}
