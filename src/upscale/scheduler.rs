use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use ndarray::{s, Array2};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::audio::{
    chunk_file_name, chunk_length_samples, plan_chunks, remove_staged_file, write_wav,
    AudioBuffer, Chunk,
};
use crate::error::{AudioliftError, Result};
use crate::notify::EventSink;
use crate::pipeline::{CancelToken, ChunkResult, PipelineRun};

use super::{normalize_model_output, SuperResolver};

/// Removes the per-run chunk directory on every exit path.
struct StagingGuard {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl StagingGuard {
    fn new(dir: TempDir) -> Self {
        let path = dir.path().to_path_buf();
        Self {
            dir: Some(dir),
            path,
        }
    }
}

impl Drop for StagingGuard {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => debug!("Removed chunk staging directory {}", self.path.display()),
                Err(e) => warn!(
                    "Failed to remove chunk staging directory {}: {e}",
                    self.path.display()
                ),
            }
        }
    }
}

/// Drives the model over fixed-length windows, strictly one chunk at a time.
pub struct ChunkScheduler {
    resolver: Arc<dyn SuperResolver>,
    chunk_seconds: f64,
    staging_dir: PathBuf,
}

impl ChunkScheduler {
    pub fn new(
        resolver: Arc<dyn SuperResolver>,
        chunk_seconds: f64,
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            resolver,
            chunk_seconds,
            staging_dir: staging_dir.into(),
        }
    }

    /// Process every chunk of `buffer` in order, recording one result per
    /// dispatched chunk into `run`. Stops at the first failure.
    ///
    /// The resolver is shut down before returning, whatever the outcome.
    pub async fn run(
        &self,
        buffer: &AudioBuffer,
        run: &mut PipelineRun,
        sink: &dyn EventSink,
        cancel: &CancelToken,
    ) -> Result<()> {
        let result = self.run_chunks(buffer, run, sink, cancel).await;
        self.resolver.shutdown().await;
        result
    }

    async fn run_chunks(
        &self,
        buffer: &AudioBuffer,
        run: &mut PipelineRun,
        sink: &dyn EventSink,
        cancel: &CancelToken,
    ) -> Result<()> {
        let chunk_length = chunk_length_samples(self.chunk_seconds, buffer.sample_rate)?;
        let chunks = plan_chunks(buffer.len(), chunk_length);
        let total = chunks.len();
        run.sample_rate = buffer.sample_rate;
        run.total_chunks = total;

        std::fs::create_dir_all(&self.staging_dir)
            .map_err(|e| AudioliftError::write_failed(&self.staging_dir, e))?;
        let staging = StagingGuard::new(
            tempfile::Builder::new()
                .prefix("chunks-")
                .tempdir_in(&self.staging_dir)
                .map_err(|e| AudioliftError::write_failed(&self.staging_dir, e))?,
        );

        let message = format!(
            "Performing audio super-resolution in {} chunks of ~{:.2} seconds with {}",
            total,
            self.chunk_seconds,
            self.resolver.name()
        );
        info!("{}", message);
        sink.on_progress(&message);

        for chunk in chunks {
            if cancel.is_cancelled() {
                warn!("Cancelled before chunk {}/{}", chunk.index + 1, total);
                return Err(AudioliftError::Cancelled);
            }

            let message = format!(
                "Processing chunk {}/{} (samples {}-{})...",
                chunk.index + 1,
                total,
                chunk.start,
                chunk.end
            );
            info!("{}", message);
            sink.on_progress(&message);

            let chunk_path = staging.path.join(chunk_file_name(chunk.index));
            let started = Instant::now();
            let outcome = self.process_chunk(buffer, chunk, &chunk_path).await;

            match outcome {
                Ok(samples) => {
                    debug!(
                        "Chunk {} produced {} samples in {:.2}s",
                        chunk.index,
                        samples.ncols(),
                        started.elapsed().as_secs_f64()
                    );
                    run.results.push(ChunkResult::Success {
                        index: chunk.index,
                        samples,
                    });
                    remove_staged_file(&chunk_path);
                }
                Err(e) => {
                    warn!("Chunk {} failed: {}", chunk.index, e);
                    run.results.push(ChunkResult::Failure {
                        index: chunk.index,
                        error: e.to_string(),
                    });
                    remove_staged_file(&chunk_path);
                    return Err(e);
                }
            }

            sink.on_chunk(chunk.index + 1, total);
        }

        Ok(())
    }

    async fn process_chunk(
        &self,
        buffer: &AudioBuffer,
        chunk: Chunk,
        chunk_path: &Path,
    ) -> Result<Array2<f32>> {
        let segment = buffer.samples.slice(s![.., chunk.start..chunk.end]);
        write_wav(chunk_path, segment, buffer.sample_rate)?;

        let raw = self
            .resolver
            .upsample(chunk_path, buffer.sample_rate)
            .await
            .map_err(|e| AudioliftError::ChunkInvocationFailed {
                index: chunk.index,
                message: e.to_string(),
            })?;

        normalize_model_output(raw).map_err(|message| AudioliftError::ChunkInvocationFailed {
            index: chunk.index,
            message,
        })
    }
}
