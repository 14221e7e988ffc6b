pub mod audiosr;
pub mod scheduler;

pub use audiosr::AudioSrCommand;
pub use scheduler::ChunkScheduler;

use crate::error::Result;
use async_trait::async_trait;
use ndarray::{Array2, ArrayD, Axis, Ix2};
use std::path::Path;

/// Native output rate of the super-resolution model.
pub const TARGET_SAMPLE_RATE: u32 = 48_000;

/// Model invocation collaborator: one staged mono segment in, one upsampled segment out.
///
/// The input is passed at its native rate; implementations resample internally.
#[async_trait]
pub trait SuperResolver: Send + Sync {
    async fn upsample(&self, staged_chunk: &Path, sample_rate: u32) -> Result<ArrayD<f32>>;

    fn name(&self) -> &'static str;

    fn output_sample_rate(&self) -> u32 {
        TARGET_SAMPLE_RATE
    }

    /// Release anything held between chunks. Called once when a run ends.
    async fn shutdown(&self) {}
}

/// Coerce a model result of any rank into a `(1, samples)` mono buffer.
///
/// Singleton leading (batch) axes are squeezed, a bare sample vector is
/// promoted to one channel, and multi-channel output is averaged.
pub fn normalize_model_output(output: ArrayD<f32>) -> std::result::Result<Array2<f32>, String> {
    let mut output = output;

    while output.ndim() > 2 {
        if output.shape()[0] != 1 {
            return Err(format!(
                "unexpected model output shape {:?}: leading axis is not singleton",
                output.shape()
            ));
        }
        output = output.index_axis_move(Axis(0), 0);
    }

    if output.ndim() == 1 {
        output = output.insert_axis(Axis(0));
    }

    let output = output
        .into_dimensionality::<Ix2>()
        .map_err(|e| format!("model output is not a waveform: {e}"))?;

    Ok(crate::audio::downmix_to_mono(output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, IxDyn};

    #[test]
    fn test_squeezes_batch_dimension() {
        let raw = ArrayD::from_shape_vec(IxDyn(&[1, 1, 4]), vec![0.1f32, 0.2, 0.3, 0.4]).unwrap();
        let mono = normalize_model_output(raw).unwrap();
        assert_eq!(mono, array![[0.1f32, 0.2, 0.3, 0.4]]);
    }

    #[test]
    fn test_promotes_one_dimensional_output() {
        let raw = ArrayD::from_shape_vec(IxDyn(&[3]), vec![1.0f32, 2.0, 3.0]).unwrap();
        let mono = normalize_model_output(raw).unwrap();
        assert_eq!(mono.dim(), (1, 3));
    }

    #[test]
    fn test_keeps_two_dimensional_mono() {
        let raw = array![[0.5f32, -0.5]].into_dyn();
        assert_eq!(normalize_model_output(raw).unwrap(), array![[0.5f32, -0.5]]);
    }

    #[test]
    fn test_averages_stereo_output() {
        let raw = array![[1.0f32, 1.0], [3.0, -1.0]].into_dyn();
        assert_eq!(normalize_model_output(raw).unwrap(), array![[2.0f32, 0.0]]);
    }

    #[test]
    fn test_rejects_non_singleton_batch() {
        let raw = ArrayD::<f32>::zeros(IxDyn(&[2, 1, 8]));
        assert!(normalize_model_output(raw).is_err());
    }

    #[test]
    fn test_rejects_scalar() {
        let raw = ArrayD::<f32>::zeros(IxDyn(&[]));
        assert!(normalize_model_output(raw).is_err());
    }
}
