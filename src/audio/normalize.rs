use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::{Array2, Axis};
use tracing::{debug, info, warn};

use crate::error::{AudioliftError, Result};

use super::transcode::Transcoder;
use super::wav::read_wav;
use super::{remove_staged_file, AudioBuffer};

/// A source file staged into the pipeline's native WAV container.
#[derive(Debug, Clone)]
pub struct PreparedInput {
    /// The WAV the pipeline will decode.
    pub wav_path: PathBuf,
    /// Artifacts written by this call (not reused from an earlier run).
    pub created: Vec<PathBuf>,
}

impl PreparedInput {
    /// Remove the artifacts this call created. Failures are logged only.
    pub fn cleanup(&self) {
        for path in &self.created {
            remove_staged_file(path);
        }
    }
}

/// Turns an arbitrary media path into a mono [`AudioBuffer`].
pub struct InputNormalizer {
    transcoder: Arc<dyn Transcoder>,
    staging_dir: PathBuf,
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string())
}

impl InputNormalizer {
    pub fn new(transcoder: Arc<dyn Transcoder>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            transcoder,
            staging_dir: staging_dir.into(),
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Stage `input` as a WAV, reusing converted artifacts from earlier runs.
    pub async fn prepare(&self, input: &Path) -> Result<PreparedInput> {
        if !input.exists() {
            return Err(AudioliftError::InputNotFound(input.to_path_buf()));
        }

        if has_extension(input, "wav") {
            return Ok(PreparedInput {
                wav_path: input.to_path_buf(),
                created: Vec::new(),
            });
        }

        // Named after the original input so a repaired MP4 shares its cache entry
        let wav_path = self.staging_dir.join(format!("{}.wav", file_stem(input)));

        if wav_path.exists() {
            info!("Converted WAV already exists: {}", wav_path.display());
            return Ok(PreparedInput {
                wav_path,
                created: Vec::new(),
            });
        }

        std::fs::create_dir_all(&self.staging_dir)
            .map_err(|e| AudioliftError::write_failed(&self.staging_dir, e))?;

        let mut created = Vec::new();
        let mut source = input.to_path_buf();

        if has_extension(input, "mp4") {
            let repaired = self
                .staging_dir
                .join(format!("{}_repaired.mp4", file_stem(input)));

            if repaired.exists() {
                info!("Repaired MP4 already exists: {}", repaired.display());
                source = repaired;
            } else {
                match self.transcoder.repair(input, &repaired).await {
                    Ok(()) => {
                        info!("MP4 repaired: {}", repaired.display());
                        created.push(repaired.clone());
                        source = repaired;
                    }
                    Err(e) => {
                        warn!("{e}");
                        warn!("Proceeding with original MP4, but issues might persist");
                        // ffmpeg can leave a truncated file behind
                        remove_staged_file(&repaired);
                    }
                }
            }
        }

        if let Err(e) = self.transcoder.convert(&source, &wav_path).await {
            remove_staged_file(&wav_path);
            PreparedInput {
                wav_path: wav_path.clone(),
                created,
            }
            .cleanup();
            return Err(e);
        }
        created.push(wav_path.clone());

        Ok(PreparedInput { wav_path, created })
    }

    /// Decode a prepared WAV and down-mix it to mono.
    pub fn load(&self, prepared: &PreparedInput) -> Result<AudioBuffer> {
        let buffer = read_wav(&prepared.wav_path)?;
        info!(
            "Loaded {}: {} Hz, {} channel(s), {:.2}s",
            prepared.wav_path.display(),
            buffer.sample_rate,
            buffer.channels(),
            buffer.duration().as_secs_f64()
        );

        if buffer.is_empty() {
            return Err(AudioliftError::DecodeFailed(format!(
                "{} contains no samples",
                prepared.wav_path.display()
            )));
        }

        if buffer.channels() > 1 {
            debug!("Down-mixing {} channels to mono", buffer.channels());
        }

        Ok(AudioBuffer::new(
            downmix_to_mono(buffer.samples),
            buffer.sample_rate,
        ))
    }

    pub async fn normalize(&self, input: &Path) -> Result<(AudioBuffer, PreparedInput)> {
        let prepared = self.prepare(input).await?;
        let buffer = self.load(&prepared)?;
        Ok((buffer, prepared))
    }
}

/// Average all channels sample-wise into a single `(1, samples)` channel.
pub fn downmix_to_mono(samples: Array2<f32>) -> Array2<f32> {
    if samples.nrows() <= 1 {
        return samples;
    }

    match samples.mean_axis(Axis(0)) {
        Some(mean) => mean.insert_axis(Axis(0)),
        None => Array2::zeros((1, samples.ncols())),
    }
}
