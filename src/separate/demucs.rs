use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{AudioliftError, Result};
use crate::process::collaborator_command;

use super::StemSeparator;

/// Runs the `demucs` command-line separator.
#[derive(Debug, Clone)]
pub struct DemucsCommand {
    binary: PathBuf,
}

impl DemucsCommand {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self, input: &Path, output_dir: &Path, model: &str) -> Command {
        let mut command = collaborator_command(&self.binary);
        command
            .args(["-n", model, "-o"])
            .arg(output_dir)
            .arg(input);
        command
    }
}

#[async_trait]
impl StemSeparator for DemucsCommand {
    async fn separate(&self, input: &Path, output_dir: &Path, model: &str) -> Result<()> {
        let mut command = self.command(input, output_dir, model);
        info!("Running Demucs on {}", input.display());
        debug!("Running {:?}", command.as_std());

        let result = command.output().await.map_err(|e| {
            AudioliftError::SeparationFailed(format!(
                "Demucs command not found or failed to start ({}): {e}",
                self.binary.display()
            ))
        })?;

        let stdout = String::from_utf8_lossy(&result.stdout);
        if !stdout.is_empty() {
            debug!("Demucs stdout: {}", stdout);
        }

        if !result.status.success() {
            return Err(AudioliftError::SeparationFailed(
                String::from_utf8_lossy(&result.stderr).trim().to_string(),
            ));
        }

        info!("Demucs separation complete");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Demucs"
    }
}
