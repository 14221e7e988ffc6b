use anyhow::{Context, Result};
use audiolift::audio::check_ffmpeg;
use audiolift::config::{Config, OutputFormat};
use audiolift::interactive::run_interactive_wizard;
use audiolift::notify::{ChannelSink, Notification, TracingSink};
use audiolift::pipeline::{print_summary, CancelToken, RunReport, Session, UpscaleJob};
use audiolift::{repair_media, run_separation, spawn_upscale};
use clap::{Parser, Subcommand};
use crossbeam_channel::Receiver;
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "audiolift")]
#[command(version, about = "Chunked audio super-resolution using AudioSR")]
#[command(
    long_about = "Upscale audio to 48 kHz with AudioSR, optionally after Demucs stem separation, and repair damaged MP4 containers with FFmpeg."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Upscale an audio or video file
    Upscale {
        /// Input audio/video file
        input: PathBuf,

        /// Output directory (defaults to the configured output directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Chunk duration in seconds
        #[arg(short, long)]
        chunk_seconds: Option<f64>,

        /// Output format: flac, wav
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Separate a track into stems and recombine them
    Separate {
        /// Input audio/video file
        input: PathBuf,

        /// Directory the separation model writes into
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Separation model name (e.g. htdemucs)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Separate, recombine, then upscale the combined mix
    Enhance {
        /// Input audio/video file
        input: PathBuf,

        /// Output directory for the upscaled file
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Output format: flac, wav
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Remux a damaged MP4 without re-encoding
    Repair {
        /// Damaged video file
        input: PathBuf,

        /// Repaired file (defaults to <input>_repaired.mp4)
        output: Option<PathBuf>,
    },

    /// Choose a file and settings interactively, then upscale it
    Wizard,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

fn derive_repair_output(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default();
    let mut output = input.to_path_buf();
    output.set_file_name(format!("{}_repaired.mp4", stem.to_string_lossy()));
    output
}

fn parse_format(format: Option<String>, config: &Config) -> Result<OutputFormat> {
    match format {
        Some(f) => f.parse().map_err(|e: String| anyhow::anyhow!(e)),
        None => Ok(config.output_format),
    }
}

fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    Ok(runtime.block_on(future))
}

/// Run `job` on the worker thread while this thread renders progress.
fn upscale_in_background(session: &Session, job: UpscaleJob) -> Result<RunReport> {
    info!("Input:    {}", job.input.display());
    info!("Output:   {}", job.output_path().display());
    info!("Format:   {}", job.format);
    info!("Chunks:   {:.2}s", job.chunk_seconds);

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        warn!("Interrupt received, stopping after the current chunk...");
        handler_token.cancel();
    }) {
        warn!("Failed to install Ctrl+C handler: {e}");
    }

    let (sink, rx) = ChannelSink::new();
    let handle = spawn_upscale(session.clone(), job, Arc::new(sink), cancel)
        .context("Failed to spawn worker thread")?;

    drive_progress(rx, handle)
}

fn drive_progress(rx: Receiver<Notification>, handle: JoinHandle<()>) -> Result<RunReport> {
    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    progress.enable_steady_tick(Duration::from_millis(120));

    let mut report = None;
    for notification in rx.iter() {
        match notification {
            Notification::Progress(message) => progress.set_message(message),
            Notification::Chunk { done, total } => {
                if progress.length() != Some(total as u64) {
                    progress.set_style(
                        ProgressStyle::default_bar()
                            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({eta})")
                            .unwrap_or_else(|_| ProgressStyle::default_bar())
                            .progress_chars("#>-"),
                    );
                    progress.set_length(total as u64);
                }
                progress.set_position(done as u64);
            }
            Notification::Complete(r) => {
                report = Some(*r);
                break;
            }
        }
    }
    progress.finish_and_clear();

    if handle.join().is_err() {
        anyhow::bail!("Worker thread panicked");
    }
    report.context("Worker exited without a completion report")
}

fn finish(report: RunReport) -> Result<()> {
    print_summary(&report);
    match report.error {
        Some(e) => anyhow::bail!("Super-resolution failed: {e}"),
        None => Ok(()),
    }
}

fn load_config() -> Result<Config> {
    let config = Config::load().context("Failed to load configuration")?;
    config
        .validate()
        .context("Configuration validation failed")?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match cli.command {
        Command::Upscale {
            input,
            output_dir,
            chunk_seconds,
            format,
        } => {
            let mut config = load_config()?;
            if let Some(secs) = chunk_seconds {
                config.chunk_seconds = secs;
            }
            config.output_format = parse_format(format, &config)?;
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            config.validate().context("Invalid upscale options")?;
            check_ffmpeg(&config.ffmpeg_path)?;

            let job = UpscaleJob::new(input, &config);
            let session = Session::from_config(config);
            finish(upscale_in_background(&session, job)?)
        }

        Command::Separate {
            input,
            output_dir,
            model,
        } => {
            let mut config = load_config()?;
            if let Some(model) = model {
                config.separation_model = model;
            }
            let output_dir = output_dir.unwrap_or_else(|| config.output_dir.join("separated"));

            let session = Session::from_config(config);
            let outcome = block_on(run_separation(&session, &input, &output_dir, &TracingSink))??;

            info!("Stems:    {}", outcome.stems_dir.display());
            for name in &outcome.stems.missing {
                warn!("Stem missing: {}", name);
            }
            info!("Combined: {}", outcome.combined.display());
            Ok(())
        }

        Command::Enhance {
            input,
            output_dir,
            format,
        } => {
            let mut config = load_config()?;
            config.output_format = parse_format(format, &config)?;
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }
            check_ffmpeg(&config.ffmpeg_path)?;

            let separated_dir = config.output_dir.join("separated");
            let session = Session::from_config(config);
            let outcome =
                block_on(run_separation(&session, &input, &separated_dir, &TracingSink))??;

            let mut job = UpscaleJob::new(&outcome.combined, &session.config);
            job.output_stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned());
            finish(upscale_in_background(&session, job)?)
        }

        Command::Repair { input, output } => {
            let config = load_config()?;
            check_ffmpeg(&config.ffmpeg_path)?;

            let output = output.unwrap_or_else(|| derive_repair_output(&input));
            let session = Session::from_config(config);
            block_on(repair_media(session.transcoder.as_ref(), &input, &output))??;
            Ok(())
        }

        Command::Wizard => {
            let result = run_interactive_wizard()?;
            result
                .config
                .validate()
                .context("Configuration validation failed")?;
            check_ffmpeg(&result.config.ffmpeg_path)?;

            let session = Session::from_config(result.config);
            finish(upscale_in_background(&session, result.job)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_repair_output() {
        let input = PathBuf::from("/path/to/video.mp4");
        assert_eq!(
            derive_repair_output(&input),
            PathBuf::from("/path/to/video_repaired.mp4")
        );

        let input = PathBuf::from("clip.mov");
        assert_eq!(derive_repair_output(&input), PathBuf::from("clip_repaired.mp4"));
    }

    #[test]
    fn test_parse_format_falls_back_to_config() {
        let config = Config::default();
        assert_eq!(parse_format(None, &config).unwrap(), OutputFormat::Flac);
        assert_eq!(
            parse_format(Some("WAV".to_string()), &config).unwrap(),
            OutputFormat::Wav
        );
        assert!(parse_format(Some("mp3".to_string()), &config).is_err());
    }

    #[test]
    fn test_cli_parses_upscale() {
        let cli = Cli::try_parse_from([
            "audiolift",
            "upscale",
            "song.wav",
            "--chunk-seconds",
            "5",
            "-f",
            "wav",
        ])
        .unwrap();
        match cli.command {
            Command::Upscale {
                input,
                chunk_seconds,
                format,
                ..
            } => {
                assert_eq!(input, PathBuf::from("song.wav"));
                assert_eq!(chunk_seconds, Some(5.0));
                assert_eq!(format.as_deref(), Some("wav"));
            }
            _ => panic!("expected upscale subcommand"),
        }
    }
}
