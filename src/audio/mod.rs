pub mod chunk;
pub mod normalize;
pub mod transcode;
pub mod wav;

pub use chunk::{chunk_file_name, chunk_length_samples, plan_chunks, Chunk};
pub use normalize::{downmix_to_mono, InputNormalizer, PreparedInput};
pub use transcode::{check_ffmpeg, FfmpegTranscoder, Transcoder};
pub use wav::{read_wav, write_wav};

use ndarray::Array2;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Decoded audio laid out as (channels, samples).
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Array2<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Array2<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn channels(&self) -> usize {
        self.samples.nrows()
    }

    /// Number of sample frames.
    pub fn len(&self) -> usize {
        self.samples.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.len() as f64 / self.sample_rate as f64)
    }
}

/// Remove a staging artifact. Missing files are fine; other failures are logged.
pub(crate) fn remove_staged_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed staged file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove staged file {}: {e}", path.display()),
    }
}
