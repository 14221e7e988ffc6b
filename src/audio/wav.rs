use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use ndarray::{Array2, ArrayView2};

use crate::error::{AudioliftError, Result};

use super::AudioBuffer;

fn hound_io(e: hound::Error) -> std::io::Error {
    match e {
        hound::Error::IoError(io) => io,
        other => std::io::Error::other(other.to_string()),
    }
}

/// Loads a WAV file into a (channels, samples) buffer.
///
/// Integer PCM is scaled into `[-1.0, 1.0)`.
pub fn read_wav(path: &Path) -> Result<AudioBuffer> {
    let reader = WavReader::open(path).map_err(|e| {
        AudioliftError::DecodeFailed(format!("Failed to open {}: {e}", path.display()))
    })?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(AudioliftError::DecodeFailed(format!(
            "{} declares zero channels",
            path.display()
        )));
    }

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, hound::Error>>(),
        SampleFormat::Int => {
            let max_val = (1u64 << (spec.bits_per_sample as u32 - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|x| x as f32 / max_val))
                .collect::<std::result::Result<Vec<f32>, hound::Error>>()
        }
    }
    .map_err(|e| {
        AudioliftError::DecodeFailed(format!("Failed to decode {}: {e}", path.display()))
    })?;

    let len = samples.len() / channels;

    // hound yields interleaved frames [L, R, L, R]
    let mut audio = Array2::<f32>::zeros((channels, len));
    for (i, sample) in samples.iter().take(len * channels).enumerate() {
        audio[[i % channels, i / channels]] = *sample;
    }

    Ok(AudioBuffer::new(audio, spec.sample_rate))
}

/// Saves a (channels, samples) buffer as 32-bit float WAV.
pub fn write_wav(path: &Path, data: ArrayView2<f32>, sample_rate: u32) -> Result<()> {
    let (channels, len) = data.dim();

    let spec = WavSpec {
        channels: channels as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let write = || -> std::result::Result<(), hound::Error> {
        let mut writer = WavWriter::create(path, spec)?;
        for t in 0..len {
            for c in 0..channels {
                writer.write_sample(data[[c, t]])?;
            }
        }
        writer.finalize()
    };

    write().map_err(|e| AudioliftError::write_failed(path, hound_io(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read_preserves_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stereo.wav");
        let data = array![[0.1f32, 0.2, 0.3], [-0.1, -0.2, -0.3]];

        write_wav(&path, data.view(), 22_050).unwrap();
        let buffer = read_wav(&path).unwrap();

        assert_eq!(buffer.sample_rate, 22_050);
        assert_eq!(buffer.samples, data);
    }

    #[test]
    fn test_read_int_wav_scales_samples() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("int.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        writer.write_sample(16_384i16).unwrap();
        writer.write_sample(-32_768i16).unwrap();
        writer.finalize().unwrap();

        let buffer = read_wav(&path).unwrap();
        assert_eq!(buffer.samples, array![[0.5f32, -1.0]]);
    }

    #[test]
    fn test_read_garbage_is_decode_failure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("not_audio.wav");
        std::fs::write(&path, b"definitely not RIFF").unwrap();

        assert!(matches!(
            read_wav(&path),
            Err(AudioliftError::DecodeFailed(_))
        ));
    }

    #[test]
    fn test_write_into_missing_dir_is_write_failure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("out.wav");
        let data = Array2::<f32>::zeros((1, 4));

        match write_wav(&path, data.view(), 48_000) {
            Err(AudioliftError::WriteFailed { path: p, .. }) => assert_eq!(p, path),
            other => panic!("Expected WriteFailed, got {other:?}"),
        }
    }
}
