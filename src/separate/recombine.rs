use std::path::Path;

use ndarray::{s, Array2};
use tracing::{debug, info, warn};

use crate::audio::{read_wav, write_wav};
use crate::error::{AudioliftError, Result};

use super::StemSet;

/// Sum the present stems into a single mix at `output`.
///
/// Shorter stems are zero-padded to the longest; the sum is clamped to
/// `[-1.0, 1.0]`. Stems whose rate or channel count differs from the first
/// decoded stem are skipped.
pub fn recombine(stems: &StemSet, output: &Path) -> Result<()> {
    let mut mix: Option<(Array2<f32>, u32)> = None;
    let mut used = 0;

    for (name, path) in &stems.present {
        let stem = match read_wav(path) {
            Ok(stem) => stem,
            Err(e) => {
                warn!("Skipping stem {}: {e}", name);
                continue;
            }
        };
        debug!("Loading stem: {}", name);

        match mix.as_mut() {
            None => mix = Some((stem.samples, stem.sample_rate)),
            Some((acc, rate)) => {
                if stem.sample_rate != *rate || stem.channels() != acc.nrows() {
                    warn!(
                        "Skipping stem {}: {} Hz x{} does not match {} Hz x{}",
                        name,
                        stem.sample_rate,
                        stem.channels(),
                        rate,
                        acc.nrows()
                    );
                    continue;
                }
                if stem.len() > acc.ncols() {
                    let mut grown = Array2::zeros((acc.nrows(), stem.len()));
                    grown.slice_mut(s![.., ..acc.ncols()]).assign(acc);
                    *acc = grown;
                }
                let mut head = acc.slice_mut(s![.., ..stem.len()]);
                head += &stem.samples;
            }
        }
        used += 1;
    }

    let (mut mixed, rate) = mix.ok_or_else(|| AudioliftError::StemsNotFound {
        track: output
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        searched: stems.missing.iter().map(|m| m.to_string()).collect(),
    })?;

    mixed.mapv_inplace(|x| x.clamp(-1.0, 1.0));
    write_wav(output, mixed.view(), rate)?;
    info!("Overlaid {} stems into {}", used, output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::TempDir;

    fn stem_set(dir: &Path, stems: &[(&'static str, Array2<f32>, u32)]) -> StemSet {
        let mut set = StemSet::default();
        for (name, samples, rate) in stems {
            let path = dir.join(format!("{name}.wav"));
            write_wav(&path, samples.view(), *rate).unwrap();
            set.present.push((*name, path));
        }
        set
    }

    #[test]
    fn test_sums_and_pads_stems() {
        let dir = TempDir::new().unwrap();
        let set = stem_set(
            dir.path(),
            &[
                ("vocals", array![[0.25f32, 0.25]], 44_100),
                ("drums", array![[0.25f32, 0.25, 0.5]], 44_100),
            ],
        );
        let out = dir.path().join("mix.wav");
        recombine(&set, &out).unwrap();

        let mix = read_wav(&out).unwrap();
        assert_eq!(mix.samples, array![[0.5f32, 0.5, 0.5]]);
        assert_eq!(mix.sample_rate, 44_100);
    }

    #[test]
    fn test_clamps_and_skips_mismatched_rate() {
        let dir = TempDir::new().unwrap();
        let set = stem_set(
            dir.path(),
            &[
                ("vocals", array![[0.75f32]], 44_100),
                ("drums", array![[0.75f32]], 44_100),
                ("bass", array![[0.5f32]], 22_050),
            ],
        );
        let out = dir.path().join("mix.wav");
        recombine(&set, &out).unwrap();

        assert_eq!(read_wav(&out).unwrap().samples, array![[1.0f32]]);
    }

    #[test]
    fn test_no_stems_is_error() {
        let dir = TempDir::new().unwrap();
        let result = recombine(&StemSet::default(), &dir.path().join("mix.wav"));
        assert!(matches!(result, Err(AudioliftError::StemsNotFound { .. })));
    }
}
