use crate::assemble::{assemble, persist};
use crate::audio::{AudioBuffer, FfmpegTranscoder, InputNormalizer, PreparedInput, Transcoder};
use crate::config::{Config, OutputFormat};
use crate::error::{AudioliftError, Result};
use crate::notify::EventSink;
use crate::separate::{DemucsCommand, StemSeparator};
use crate::upscale::{AudioSrCommand, ChunkScheduler, SuperResolver};
use ndarray::Array2;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Explicit per-session state handed to every stage.
#[derive(Clone)]
pub struct Session {
    pub config: Config,
    pub transcoder: Arc<dyn Transcoder>,
    pub resolver: Arc<dyn SuperResolver>,
    pub separator: Arc<dyn StemSeparator>,
}

impl Session {
    /// Build a session backed by the FFmpeg, AudioSR and Demucs command-line tools.
    pub fn from_config(config: Config) -> Self {
        let transcoder = Arc::new(FfmpegTranscoder::new(config.ffmpeg_path.clone()));
        let resolver = Arc::new(
            AudioSrCommand::new(config.python_path.clone())
                .with_model(config.model_name.clone())
                .with_ddim_steps(config.ddim_steps)
                .with_guidance_scale(config.guidance_scale),
        );
        let separator = Arc::new(DemucsCommand::new(config.demucs_path.clone()));

        Self {
            config,
            transcoder,
            resolver,
            separator,
        }
    }
}

/// Cooperative cancellation flag, checked between chunks.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One end-to-end super-resolution request.
#[derive(Debug, Clone)]
pub struct UpscaleJob {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub chunk_seconds: f64,
    pub format: OutputFormat,
    /// Overrides the input's file stem when naming the output.
    pub output_stem: Option<String>,
}

impl UpscaleJob {
    pub fn new(input: impl Into<PathBuf>, config: &Config) -> Self {
        Self {
            input: input.into(),
            output_dir: config.output_dir.clone(),
            chunk_seconds: config.chunk_seconds,
            format: config.output_format,
            output_stem: None,
        }
    }

    /// `<output_dir>/<stem>_upscaled.<ext>`
    pub fn output_path(&self) -> PathBuf {
        let stem = self.output_stem.clone().unwrap_or_else(|| {
            self.input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "output".to_string())
        });
        self.output_dir
            .join(format!("{}_upscaled.{}", stem, self.format.extension()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Succeeded => write!(f, "succeeded"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one dispatched chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkResult {
    Success { index: usize, samples: Array2<f32> },
    Failure { index: usize, error: String },
}

impl ChunkResult {
    pub fn index(&self) -> usize {
        match self {
            ChunkResult::Success { index, .. } | ChunkResult::Failure { index, .. } => *index,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ChunkResult::Success { .. })
    }
}

/// Aggregate state of one pipeline invocation.
#[derive(Debug)]
pub struct PipelineRun {
    pub input: PathBuf,
    pub output: PathBuf,
    pub sample_rate: u32,
    pub total_chunks: usize,
    pub results: Vec<ChunkResult>,
    pub status: RunStatus,
}

impl PipelineRun {
    pub fn new(job: &UpscaleJob) -> Self {
        Self {
            input: job.input.clone(),
            output: job.output_path(),
            sample_rate: 0,
            total_chunks: 0,
            results: Vec::new(),
            status: RunStatus::Running,
        }
    }
}

/// Per-chunk summary carried in a [`RunReport`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    Succeeded { index: usize, samples: usize },
    Failed { index: usize, error: String },
}

impl From<&ChunkResult> for ChunkOutcome {
    fn from(result: &ChunkResult) -> Self {
        match result {
            ChunkResult::Success { index, samples } => ChunkOutcome::Succeeded {
                index: *index,
                samples: samples.ncols(),
            },
            ChunkResult::Failure { index, error } => ChunkOutcome::Failed {
                index: *index,
                error: error.clone(),
            },
        }
    }
}

/// Timing and size statistics for one run.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub total_time: Duration,
    pub normalize_time: Duration,
    pub upscale_time: Duration,
    pub write_time: Duration,
    pub input_duration: Duration,
    pub output_duration: Duration,
    pub chunks_processed: usize,
}

/// Terminal report delivered through [`EventSink::on_complete`].
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    pub input: PathBuf,
    pub output: PathBuf,
    pub total_chunks: usize,
    pub outcomes: Vec<ChunkOutcome>,
    pub error: Option<String>,
    pub stats: PipelineStats,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

/// Run the chunked super-resolution pipeline to a terminal state.
///
/// Errors never escape: they end up in the returned report, which is also
/// delivered to `sink`. Staged artifacts are cleaned up on every path.
pub async fn run_upscale(
    session: &Session,
    job: &UpscaleJob,
    sink: &dyn EventSink,
    cancel: &CancelToken,
) -> RunReport {
    let start_time = Instant::now();
    let mut run = PipelineRun::new(job);
    let mut stats = PipelineStats::default();
    let mut prepared = None;

    let outcome = execute(
        session,
        job,
        &mut run,
        &mut stats,
        &mut prepared,
        sink,
        cancel,
    )
    .await;

    if let Some(prepared) = prepared {
        if !session.config.keep_converted {
            prepared.cleanup();
        }
    }

    run.status = match outcome {
        Ok(()) => RunStatus::Succeeded,
        Err(_) => RunStatus::Failed,
    };
    stats.chunks_processed = run.results.iter().filter(|r| r.is_success()).count();
    stats.total_time = start_time.elapsed();

    let error = outcome.err().map(|e| e.to_string());
    if let Some(ref e) = error {
        warn!("Super-resolution of {} failed: {}", job.input.display(), e);
        sink.on_progress(&format!("An error occurred during super-resolution: {e}"));
    }

    let report = RunReport {
        status: run.status,
        input: run.input.clone(),
        output: run.output.clone(),
        total_chunks: run.total_chunks,
        outcomes: run.results.iter().map(ChunkOutcome::from).collect(),
        error,
        stats,
    };

    sink.on_complete(&report);
    report
}

async fn execute(
    session: &Session,
    job: &UpscaleJob,
    run: &mut PipelineRun,
    stats: &mut PipelineStats,
    prepared: &mut Option<PreparedInput>,
    sink: &dyn EventSink,
    cancel: &CancelToken,
) -> Result<()> {
    let config = &session.config;

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 1: Input normalization
    // ═══════════════════════════════════════════════════════════════════════
    info!("Stage 1/3: Preparing {}", job.input.display());
    sink.on_progress(&format!("Preparing input audio {}...", job.input.display()));
    let normalize_start = Instant::now();

    if !job.input.exists() {
        return Err(AudioliftError::InputNotFound(job.input.clone()));
    }

    std::fs::create_dir_all(&job.output_dir)
        .map_err(|e| AudioliftError::write_failed(&job.output_dir, e))?;

    let normalizer = InputNormalizer::new(session.transcoder.clone(), &config.staging_dir);
    let staged = prepared.insert(normalizer.prepare(&job.input).await?);
    let buffer: AudioBuffer = normalizer.load(staged)?;

    stats.normalize_time = normalize_start.elapsed();
    stats.input_duration = buffer.duration();
    sink.on_progress(&format!(
        "Input loaded: {} Hz, {:.2}s",
        buffer.sample_rate,
        buffer.duration().as_secs_f64()
    ));

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 2: Chunked super-resolution
    // ═══════════════════════════════════════════════════════════════════════
    info!("Stage 2/3: Super-resolution with {}", session.resolver.name());
    let output_rate = session.resolver.output_sample_rate();
    if output_rate == 0 {
        return Err(AudioliftError::Config(format!(
            "{} reports an output sample rate of 0 Hz",
            session.resolver.name()
        )));
    }
    let upscale_start = Instant::now();

    let scheduler = ChunkScheduler::new(
        session.resolver.clone(),
        job.chunk_seconds,
        &config.staging_dir,
    );
    scheduler.run(&buffer, run, sink, cancel).await?;
    drop(buffer);

    stats.upscale_time = upscale_start.elapsed();

    // ═══════════════════════════════════════════════════════════════════════
    // Stage 3: Assembly
    // ═══════════════════════════════════════════════════════════════════════
    info!("Stage 3/3: Assembling {} chunks", run.results.len());
    sink.on_progress("All chunks processed. Concatenating upsampled audio...");
    let write_start = Instant::now();

    let assembled = assemble(&run.results)?;
    stats.output_duration = Duration::from_secs_f64(assembled.ncols() as f64 / output_rate as f64);

    if let Err(e) = persist(
        assembled.view(),
        &run.output,
        job.format,
        output_rate,
        session.transcoder.as_ref(),
        &config.staging_dir,
    )
    .await
    {
        remove_partial_output(&run.output);
        return Err(e);
    }

    stats.write_time = write_start.elapsed();
    sink.on_progress(&format!(
        "Upsampled audio saved successfully to {}",
        run.output.display()
    ));

    Ok(())
}

fn remove_partial_output(path: &Path) {
    if path.exists() {
        match std::fs::remove_file(path) {
            Ok(()) => debug!("Removed partial output {}", path.display()),
            Err(e) => warn!("Failed to remove partial output {}: {e}", path.display()),
        }
    }
}

/// Print a summary of the pipeline results.
pub fn print_summary(report: &RunReport) {
    println!();
    println!("═══════════════════════════════════════════════════════════════");
    println!("                  Audio Super-Resolution {}", report.status);
    println!("═══════════════════════════════════════════════════════════════");
    println!();
    println!("  Input:      {}", report.input.display());
    if report.is_success() {
        println!("  Output:     {}", report.output.display());
    }
    println!(
        "  Chunks:     {}/{}",
        report.stats.chunks_processed, report.total_chunks
    );
    println!(
        "  Duration:   {:.1}s in, {:.1}s out",
        report.stats.input_duration.as_secs_f64(),
        report.stats.output_duration.as_secs_f64()
    );
    println!();
    println!("  Timing:");
    println!(
        "    Prepare:     {:.2}s",
        report.stats.normalize_time.as_secs_f64()
    );
    println!(
        "    Upscale:     {:.2}s",
        report.stats.upscale_time.as_secs_f64()
    );
    println!(
        "    Write:       {:.2}s",
        report.stats.write_time.as_secs_f64()
    );
    println!(
        "    Total:       {:.2}s",
        report.stats.total_time.as_secs_f64()
    );
    if let Some(ref error) = report.error {
        println!();
        println!("  Error: {}", error);
    }
    println!();
    println!("═══════════════════════════════════════════════════════════════");
}
