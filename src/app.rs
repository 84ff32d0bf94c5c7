use crate::cli::{Cli, Commands};
use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process;
use tracing::warn;
use vid2bnd::{config, engine};

pub fn run(mut cli: Cli) {
    // Handle subcommands first
    if let Some(command) = cli.command.take() {
        match command {
            Commands::CheckFfmpeg => handle_check_ffmpeg(),
            Commands::Probe { file } => handle_probe(file),
            Commands::Inspect { bundle } => handle_inspect(bundle),
            Commands::Fetch {
                url,
                output,
                boost_volume,
                keep_intermediate,
            } => handle_fetch(url, output, boost_volume, keep_intermediate),
            Commands::InitConfig => handle_init_config(),
        }
        return;
    }

    // Default behavior: encode SOURCE into OUTPUT
    let (source, output) = match (&cli.source, &cli.output) {
        (Some(source), Some(output)) => (source.clone(), output.clone()),
        _ => {
            eprintln!("Usage: vid2bnd <SOURCE> <OUTPUT> [options]");
            eprintln!("Run 'vid2bnd --help' for the full option list.");
            process::exit(2);
        }
    };

    if let Err(e) = run_encode(&source, &output, &cli) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run_encode(source: &Path, output: &Path, cli: &Cli) -> Result<()> {
    let config = config::Config::load().unwrap_or_default();
    let quiet = cli.quiet || config.defaults.quiet;

    let fallback = config_dither(&config)?;
    let mode = engine::ConversionMode::resolve(cli.dither, cli.threshold, fallback)?;

    let info = engine::probe_source(source)?;
    let opts = engine::EncodeOptions {
        scale: cli.scale,
        frame_rate: cli.frame_rate,
        sample_rate: cli.sample_rate,
    };
    let params = engine::EncodeParams::resolve(&info, &opts)?;
    // Build the header up front so a field-width overflow fails before
    // any ffmpeg process is started.
    let header = engine::BundleHeader::from_params(&params)?;

    if !quiet {
        print_summary(&params, mode);
    }
    warn_about_rates(&params);

    let video_cmd = engine::build_video_cmd(source, &params, mode);
    let audio_cmd = engine::build_audio_cmd(source, &params);

    if cli.dry_run {
        println!("{}", engine::render_command(&video_cmd));
        println!("{}", engine::render_command(&audio_cmd));
        return Ok(());
    }

    let out = engine::create_output(output)?;

    let (video_child, video_out) = engine::spawn_pipeline("video", video_cmd)?;
    let (audio_child, audio_out) = match engine::spawn_pipeline("audio", audio_cmd) {
        Ok(pair) => pair,
        Err(e) => {
            video_child.abort();
            return Err(e);
        }
    };

    let progress = make_progress_bar(params.frame_count, quiet);
    let mut video = BufReader::new(video_out);
    let mut audio = BufReader::new(audio_out);

    let encoder = engine::BundleEncoder::new(out, &params);
    match encoder.encode(header, &mut video, &mut audio, |frame| {
        progress.set_position(frame)
    }) {
        Ok(report) => {
            progress.finish_and_clear();
            // A leg that exits nonzero after delivering every byte gets
            // reported but does not invalidate the finished file.
            if let Err(e) = video_child.finish() {
                eprintln!("Warning: {:#}", e);
            }
            if let Err(e) = audio_child.finish() {
                eprintln!("Warning: {:#}", e);
            }
            if !report.size_matches() {
                warn!(
                    "wrote {} bytes where the header implies {}",
                    report.bytes_written, report.estimated_file_size
                );
            }
            if !quiet {
                println!(
                    "Wrote {} frames ({} bytes) to {}",
                    report.frames_written,
                    report.bytes_written,
                    output.display()
                );
            }
            Ok(())
        }
        Err(e) => {
            progress.finish_and_clear();
            video_child.abort();
            audio_child.abort();
            Err(e).with_context(|| format!("writing {}", output.display()))
        }
    }
}

fn config_dither(config: &config::Config) -> Result<engine::DitherAlgorithm> {
    engine::DitherAlgorithm::from_str(&config.defaults.dither, true).map_err(|_| {
        anyhow!(
            "config default dither '{}' is not a known algorithm",
            config.defaults.dither
        )
    })
}

fn print_summary(params: &engine::EncodeParams, mode: engine::ConversionMode) {
    let conversion = match mode {
        engine::ConversionMode::Threshold(t) => format!("threshold {}", t),
        engine::ConversionMode::Dither(algorithm) => {
            format!("{} dithering", algorithm.filter_value())
        }
        engine::ConversionMode::None => "palette mapping, no dithering".to_string(),
    };

    println!(
        "Source:         {}x{} @ {} fps, {} frames",
        params.source.width, params.source.height, params.source.frame_rate, params.source.frame_count
    );
    println!("Conversion:     {}", conversion);
    if params.frame_rate.den() == 1 {
        println!("Frame rate:     {} fps", params.frame_rate);
    } else {
        println!(
            "Frame rate:     {} fps (~{:.3})",
            params.frame_rate,
            params.frame_rate.as_f64()
        );
    }
    println!("Frame count:    {}", params.frame_count);
    println!(
        "Geometry:       {}x{}, stored as {}x{} ({} bytes/frame)",
        params.pre_pad_width,
        params.frame_height,
        params.frame_width,
        params.frame_height,
        params.frame_size
    );
    println!(
        "Audio:          {} Hz, {} bytes/frame",
        params.sample_rate, params.audio_chunk_size
    );
    println!("Estimated size: {} bytes", params.estimated_file_size);
}

fn warn_about_rates(params: &engine::EncodeParams) {
    if params.frame_rate > engine::Rational::from(30) {
        warn!("frame rates above 30 fps overwhelm most target devices; consider --frame-rate 30");
    }
    let duplicated = params.duplicated_frames();
    if duplicated > 0 {
        warn!("rate conversion will duplicate about {} frames", duplicated);
    }
    let dropped = params.dropped_frames();
    if dropped > 0 {
        warn!("rate conversion will drop about {} frames", dropped);
    }
    if params.sample_rate > 48000 {
        warn!("sample rates above 48000 Hz are unlikely to play back correctly");
    }
    if params.audio_remainder != 0 {
        warn!(
            "audio chunks drop {} samples every {} frames; expect slight desync on long videos",
            params.audio_remainder,
            params.frame_rate.num()
        );
    }
}

fn make_progress_bar(frame_count: u64, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(frame_count);
    pb.set_style(
        ProgressStyle::with_template(
            "Encoding {bar:40.cyan/blue} {pos}/{len} frames [{elapsed_precise}<{eta_precise}]",
        )
        .unwrap()
        .progress_chars("##-"),
    );
    pb
}

fn handle_check_ffmpeg() {
    match engine::ffmpeg_version() {
        Ok(version) => {
            println!("ffmpeg found: {}", version);
            match engine::ffprobe_version() {
                Ok(probe_version) => {
                    println!("ffprobe found: {}", probe_version);
                    process::exit(0);
                }
                Err(e) => {
                    eprintln!("Error: {:#}", e);
                    process::exit(1);
                }
            }
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn handle_probe(file: PathBuf) {
    match engine::probe_source(&file) {
        Ok(info) => {
            println!(
                "Video: {}x{} @ {} fps, {} frames",
                info.width, info.height, info.frame_rate, info.frame_count
            );
            println!("Audio: {} Hz", info.sample_rate);
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn handle_inspect(bundle: PathBuf) {
    if let Err(e) = inspect_bundle(&bundle) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn inspect_bundle(path: &Path) -> Result<()> {
    let mut file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut buf = [0u8; engine::HEADER_SIZE];
    file.read_exact(&mut buf)
        .with_context(|| format!("Failed to read a bundle header from {}", path.display()))?;
    let header = engine::BundleHeader::decode(&buf)?;

    println!("Version:   {}", header.version);
    println!("Frames:    {}", header.frame_count);
    println!(
        "Geometry:  {}x{} ({} bytes/frame)",
        header.frame_width,
        header.frame_height,
        header.frame_size()
    );
    println!(
        "Audio:     {} Hz, {} bytes/frame",
        header.sample_rate, header.audio_chunk_size
    );

    let actual = file.metadata().context("Failed to stat bundle")?.len();
    let expected = header.expected_file_size();
    if actual == expected {
        println!("File size: {} bytes (matches the header)", actual);
    } else {
        println!(
            "File size: {} bytes, but the header implies {} (truncated or trailing data)",
            actual, expected
        );
    }
    Ok(())
}

fn handle_fetch(
    url: String,
    output: Option<PathBuf>,
    boost_volume: bool,
    keep_intermediate: bool,
) {
    let config = config::Config::load().unwrap_or_default();
    let boost = boost_volume || config.fetch.boost_volume;
    let keep = keep_intermediate || config.fetch.keep_intermediate;
    let output = output.unwrap_or_else(|| PathBuf::from("vid.mp4"));

    match engine::fetch::fetch(&url, &output, boost, keep) {
        Ok(()) => println!("Saved {}", output.display()),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn handle_init_config() {
    match config::Config::load() {
        Ok(cfg) => {
            match config::Config::config_path() {
                Ok(path) => println!("Config loaded successfully from {}", path.display()),
                Err(e) => println!("Config loaded, but config path unknown: {:#}", e),
            }
            println!("{:#?}", cfg);
        }
        Err(e) => {
            println!("Config missing or invalid: {:#}", e);
            println!("Creating default config...");

            let cfg = config::Config::default();
            if let Err(err) = cfg.save() {
                eprintln!("Failed to save default config: {:#}", err);
                process::exit(1);
            } else {
                match config::Config::config_path() {
                    Ok(path) => println!("Default config saved to {}", path.display()),
                    Err(e) => println!("Default config saved (path unknown): {:#}", e),
                }
            }
        }
    }
}
