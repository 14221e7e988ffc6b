use std::path::Path;

use tracing::info;

use crate::audio::Transcoder;
use crate::error::{AudioliftError, Result};

/// Remux `input` into `output` (`-c copy -movflags faststart`).
pub async fn repair_media(transcoder: &dyn Transcoder, input: &Path, output: &Path) -> Result<()> {
    if !input.exists() {
        return Err(AudioliftError::InputNotFound(input.to_path_buf()));
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| AudioliftError::write_failed(parent, e))?;
    }

    transcoder.repair(input, output).await.map_err(|e| match e {
        AudioliftError::RepairFailed(_) => e,
        other => AudioliftError::RepairFailed(other.to_string()),
    })?;

    info!("Video repaired and saved to {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct StubTranscoder {
        fail: bool,
    }

    #[async_trait]
    impl Transcoder for StubTranscoder {
        async fn convert(&self, _input: &Path, _output: &Path) -> Result<()> {
            unreachable!("repair never converts")
        }

        async fn repair(&self, input: &Path, output: &Path) -> Result<()> {
            if self.fail {
                return Err(AudioliftError::Io(std::io::Error::other("moov atom not found")));
            }
            std::fs::copy(input, output)?;
            Ok(())
        }

        async fn encode(&self, _input: &Path, _output: &Path, _format: OutputFormat) -> Result<()> {
            unreachable!("repair never encodes")
        }

        fn name(&self) -> &'static str {
            "stub"
        }
    }

    #[tokio::test]
    async fn test_repair_creates_output_directory() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("clip.mp4");
        std::fs::write(&input, b"mp4").unwrap();
        let output = dir.path().join("fixed").join("clip_repaired.mp4");

        repair_media(&StubTranscoder { fail: false }, &input, &output)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"mp4");
    }

    #[tokio::test]
    async fn test_repair_missing_input() {
        let dir = TempDir::new().unwrap();
        let result = repair_media(
            &StubTranscoder { fail: false },
            &dir.path().join("missing.mp4"),
            &dir.path().join("out.mp4"),
        )
        .await;
        assert!(matches!(result, Err(AudioliftError::InputNotFound(_))));
    }

    #[tokio::test]
    async fn test_repair_failure_is_repair_failed() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("clip.mp4");
        std::fs::write(&input, b"mp4").unwrap();

        match repair_media(&StubTranscoder { fail: true }, &input, &dir.path().join("out.mp4")).await {
            Err(AudioliftError::RepairFailed(message)) => assert!(message.contains("moov atom")),
            other => panic!("Expected RepairFailed, got {other:?}"),
        }
    }
}
