use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Result;

use super::STEM_NAMES;

/// Where the separator put its stems for one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StemDiscovery {
    Found(PathBuf),
    /// `searched` lists the model directories that exist under the output root.
    NotFound { searched: Vec<String> },
}

/// The stems present in a discovered folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StemSet {
    pub present: Vec<(&'static str, PathBuf)>,
    pub missing: Vec<&'static str>,
}

impl StemSet {
    pub fn len(&self) -> usize {
        self.present.len()
    }

    pub fn is_empty(&self) -> bool {
        self.present.is_empty()
    }
}

/// Look for `<output_dir>/<model>/<track>` across every model directory.
///
/// `preferred_model` is checked first when present.
pub fn discover_stems(
    output_dir: &Path,
    track: &str,
    preferred_model: Option<&str>,
) -> Result<StemDiscovery> {
    if !output_dir.is_dir() {
        return Ok(StemDiscovery::NotFound {
            searched: Vec::new(),
        });
    }

    let mut model_dirs = Vec::new();
    for entry in std::fs::read_dir(output_dir)? {
        let entry = entry?;
        if entry.path().is_dir() {
            model_dirs.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    model_dirs.sort();
    if let Some(preferred) = preferred_model {
        if let Some(pos) = model_dirs.iter().position(|m| m == preferred) {
            let model = model_dirs.remove(pos);
            model_dirs.insert(0, model);
        }
    }
    debug!("Found model folders: {:?}", model_dirs);

    for model in &model_dirs {
        let candidate = output_dir.join(model).join(track);
        debug!("Checking for folder: {}", candidate.display());
        if candidate.is_dir() {
            return Ok(StemDiscovery::Found(candidate));
        }
    }

    Ok(StemDiscovery::NotFound {
        searched: model_dirs,
    })
}

/// List which of the known stems exist in `dir`; absent ones are skipped.
pub fn collect_stems(dir: &Path) -> StemSet {
    let mut set = StemSet::default();

    for name in STEM_NAMES {
        let path = dir.join(format!("{name}.wav"));
        if path.is_file() {
            set.present.push((name, path));
        } else {
            warn!("Missing stem file: {}", path.display());
            set.missing.push(name);
        }
    }

    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_discovers_track_under_any_model() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("mdx_extra")).unwrap();
        std::fs::create_dir_all(root.path().join("htdemucs").join("song")).unwrap();

        let found = discover_stems(root.path(), "song", None).unwrap();
        assert_eq!(
            found,
            StemDiscovery::Found(root.path().join("htdemucs").join("song"))
        );
    }

    #[test]
    fn test_prefers_configured_model() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("a_model").join("song")).unwrap();
        std::fs::create_dir_all(root.path().join("htdemucs").join("song")).unwrap();

        let found = discover_stems(root.path(), "song", Some("htdemucs")).unwrap();
        assert_eq!(
            found,
            StemDiscovery::Found(root.path().join("htdemucs").join("song"))
        );
    }

    #[test]
    fn test_not_found_lists_model_dirs() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join("htdemucs").join("other_song")).unwrap();
        std::fs::write(root.path().join("stray.txt"), b"").unwrap();

        let result = discover_stems(root.path(), "song", None).unwrap();
        assert_eq!(
            result,
            StemDiscovery::NotFound {
                searched: vec!["htdemucs".to_string()]
            }
        );
    }

    #[test]
    fn test_missing_output_root() {
        let root = TempDir::new().unwrap();
        let result = discover_stems(&root.path().join("nope"), "song", None).unwrap();
        assert_eq!(result, StemDiscovery::NotFound { searched: vec![] });
    }

    #[test]
    fn test_collect_skips_missing_stems() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("vocals.wav"), b"").unwrap();
        std::fs::write(dir.path().join("bass.wav"), b"").unwrap();

        let set = collect_stems(dir.path());
        let names: Vec<_> = set.present.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["vocals", "bass"]);
        assert_eq!(set.missing, vec!["drums", "other"]);
    }
}
