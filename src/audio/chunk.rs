use crate::error::{AudioliftError, Result};

/// Half-open sample range `[start, end)` over the normalized buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Number of samples in one nominal chunk, `floor(duration * sample_rate)`.
pub fn chunk_length_samples(duration_secs: f64, sample_rate: u32) -> Result<usize> {
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return Err(AudioliftError::Config(format!(
            "Chunk duration must be positive, got {duration_secs}"
        )));
    }

    let length = (duration_secs * sample_rate as f64).floor() as usize;
    if length == 0 {
        return Err(AudioliftError::Config(format!(
            "Chunk duration {duration_secs}s is shorter than one sample at {sample_rate} Hz"
        )));
    }

    Ok(length)
}

/// Split `total_samples` into `ceil(total / chunk_length)` contiguous chunks.
///
/// The last chunk may be shorter than `chunk_length`.
pub fn plan_chunks(total_samples: usize, chunk_length: usize) -> Vec<Chunk> {
    if chunk_length == 0 {
        return Vec::new();
    }

    let num_chunks = total_samples.div_ceil(chunk_length);
    (0..num_chunks)
        .map(|index| Chunk {
            index,
            start: index * chunk_length,
            end: ((index + 1) * chunk_length).min(total_samples),
        })
        .collect()
}

/// Staging file name for a chunk; unique within one run.
pub fn chunk_file_name(index: usize) -> String {
    format!("chunk_{:03}.wav", index)
}
