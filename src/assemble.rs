//! Result Assembler: stitches chunk outputs back into one timeline.

use std::path::Path;

use ndarray::{concatenate, Array2, ArrayView2, Axis};
use tracing::{debug, info, warn};

use crate::audio::{transcode::Transcoder, write_wav};
use crate::config::OutputFormat;
use crate::error::{AudioliftError, Result};
use crate::pipeline::ChunkResult;

/// Concatenate successful chunk outputs along the time axis in index order.
///
/// Boundaries abut sample-exactly; there is no cross-fade.
pub fn assemble(results: &[ChunkResult]) -> Result<Array2<f32>> {
    let mut views: Vec<ArrayView2<f32>> = Vec::with_capacity(results.len());

    for (expected, result) in results.iter().enumerate() {
        match result {
            ChunkResult::Success { index, samples } => {
                if *index != expected {
                    return Err(AudioliftError::ChunkInvocationFailed {
                        index: *index,
                        message: format!("chunk result out of order, expected index {expected}"),
                    });
                }
                views.push(samples.view());
            }
            ChunkResult::Failure { index, error } => {
                return Err(AudioliftError::ChunkInvocationFailed {
                    index: *index,
                    message: error.clone(),
                });
            }
        }
    }

    if views.is_empty() {
        return Ok(Array2::zeros((1, 0)));
    }

    concatenate(Axis(1), &views).map_err(|e| AudioliftError::ChunkInvocationFailed {
        index: 0,
        message: format!("chunk outputs have mismatched channel counts: {e}"),
    })
}

/// Write the assembled waveform to `output` at `sample_rate` in `format`.
///
/// Non-WAV formats are staged as WAV in `staging_dir` and encoded by the
/// transcoder; the staged file is removed afterwards.
pub async fn persist(
    samples: ArrayView2<'_, f32>,
    output: &Path,
    format: OutputFormat,
    sample_rate: u32,
    transcoder: &dyn Transcoder,
    staging_dir: &Path,
) -> Result<()> {
    info!(
        "Saving final upsampled audio to '{}' ({} Hz)...",
        output.display(),
        sample_rate
    );

    match format {
        OutputFormat::Wav => write_wav(output, samples, sample_rate),
        OutputFormat::Flac => {
            std::fs::create_dir_all(staging_dir)
                .map_err(|e| AudioliftError::write_failed(staging_dir, e))?;
            let staged = tempfile::Builder::new()
                .prefix("assembled-")
                .suffix(".wav")
                .tempfile_in(staging_dir)
                .map_err(|e| AudioliftError::write_failed(staging_dir, e))?
                .into_temp_path();

            write_wav(&staged, samples, sample_rate)?;
            debug!("Staged assembled WAV at {}", staged.display());
            let encoded = transcoder.encode(&staged, output, format).await;

            if let Err(e) = staged.close() {
                warn!("Failed to remove staged assembled WAV: {e}");
            }
            encoded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn success(index: usize, samples: Array2<f32>) -> ChunkResult {
        ChunkResult::Success { index, samples }
    }

    #[test]
    fn test_assemble_concatenates_in_order() {
        let results = vec![
            success(0, array![[1.0f32, 2.0]]),
            success(1, array![[3.0f32]]),
            success(2, array![[4.0f32, 5.0, 6.0]]),
        ];
        let assembled = assemble(&results).unwrap();
        assert_eq!(assembled, array![[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]]);
    }

    #[test]
    fn test_assemble_rejects_reordered_results() {
        let results = vec![success(1, array![[3.0f32]]), success(0, array![[1.0f32]])];
        assert!(assemble(&results).is_err());
    }

    #[test]
    fn test_assemble_rejects_failures() {
        let results = vec![
            success(0, array![[1.0f32]]),
            ChunkResult::Failure {
                index: 1,
                error: "boom".to_string(),
            },
        ];
        match assemble(&results) {
            Err(AudioliftError::ChunkInvocationFailed { index, message }) => {
                assert_eq!(index, 1);
                assert_eq!(message, "boom");
            }
            other => panic!("Expected ChunkInvocationFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_assemble_does_not_mutate_inputs() {
        let results = vec![success(0, array![[0.5f32]]), success(1, array![[0.25f32]])];
        let before = results.clone();
        let _ = assemble(&results).unwrap();
        assert_eq!(results, before);
    }

    #[test]
    fn test_assemble_empty() {
        assert_eq!(assemble(&[]).unwrap().dim(), (1, 0));
    }
}
