pub mod demucs;
pub mod discover;
pub mod recombine;

pub use demucs::DemucsCommand;
pub use discover::{collect_stems, discover_stems, StemDiscovery, StemSet};
pub use recombine::recombine;

use crate::error::{AudioliftError, Result};
use crate::notify::EventSink;
use crate::pipeline::Session;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

/// Stem names the separation model is expected to produce.
pub const STEM_NAMES: [&str; 4] = ["vocals", "drums", "bass", "other"];

/// File name of the stems summed back into one mix.
pub const COMBINED_FILE_NAME: &str = "combined_enhanced.wav";

/// Source-separation collaborator.
#[async_trait]
pub trait StemSeparator: Send + Sync {
    /// Write stems for `input` below `output_dir/<model>/<track>/`.
    async fn separate(&self, input: &Path, output_dir: &Path, model: &str) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Result of a completed separation run.
#[derive(Debug, Clone)]
pub struct SeparationOutcome {
    pub stems_dir: PathBuf,
    pub stems: StemSet,
    pub combined: PathBuf,
}

/// Separate `input`, locate the stems it produced and sum them into one mix.
pub async fn run_separation(
    session: &Session,
    input: &Path,
    output_dir: &Path,
    sink: &dyn EventSink,
) -> Result<SeparationOutcome> {
    if !input.exists() {
        return Err(AudioliftError::InputNotFound(input.to_path_buf()));
    }

    std::fs::create_dir_all(output_dir)
        .map_err(|e| AudioliftError::write_failed(output_dir, e))?;

    let model = &session.config.separation_model;
    sink.on_progress(&format!(
        "Separating {} with {} ({})...",
        input.display(),
        session.separator.name(),
        model
    ));
    session.separator.separate(input, output_dir, model).await?;

    let track = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let stems_dir = match discover_stems(output_dir, &track, Some(model))? {
        StemDiscovery::Found(dir) => dir,
        StemDiscovery::NotFound { searched } => {
            return Err(AudioliftError::StemsNotFound { track, searched });
        }
    };
    info!("Found stems folder: {}", stems_dir.display());

    let stems = collect_stems(&stems_dir);
    sink.on_progress(&format!(
        "Recombining {} stem(s) from {}...",
        stems.len(),
        stems_dir.display()
    ));

    let combined = stems_dir.join(COMBINED_FILE_NAME);
    recombine(&stems, &combined)?;
    sink.on_progress(&format!("Combined audio saved to {}", combined.display()));

    Ok(SeparationOutcome {
        stems_dir,
        stems,
        combined,
    })
}
