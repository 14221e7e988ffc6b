use std::path::Path;
use std::process::{Command, Output};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::OutputFormat;
use crate::error::{AudioliftError, Result};
use crate::process::collaborator_command;

/// External media transcoding collaborator.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Convert any decodable media file into a PCM WAV, keeping rate and channels.
    async fn convert(&self, input: &Path, output: &Path) -> Result<()>;

    /// Remux an MP4 container without re-encoding.
    async fn repair(&self, input: &Path, output: &Path) -> Result<()>;

    /// Encode a WAV into the requested output container.
    async fn encode(&self, input: &Path, output: &Path, format: OutputFormat) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Check if FFmpeg is installed and accessible.
pub fn check_ffmpeg(binary: &str) -> Result<()> {
    let output = Command::new(binary)
        .arg("-version")
        .output()
        .map_err(|e| {
            AudioliftError::DecodeFailed(format!(
                "FFmpeg not found. Please install FFmpeg and ensure it's in your PATH. Error: {e}"
            ))
        })?;

    if !output.status.success() {
        return Err(AudioliftError::DecodeFailed(
            "FFmpeg check failed".to_string(),
        ));
    }

    debug!("FFmpeg is available");
    Ok(())
}

/// [`Transcoder`] backed by the `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    binary: String,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, input: &Path, args: &[&str], output: &Path) -> std::io::Result<Output> {
        let mut command = collaborator_command(&self.binary);
        command
            .args(["-y", "-i"])
            .arg(input)
            .args(args)
            .arg(output);
        debug!("Running {:?}", command.as_std());
        command.output().await
    }
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        info!("Converting {} to WAV", input.display());

        let result = self
            .run(input, &["-vn", "-acodec", "pcm_s16le"], output)
            .await
            .map_err(|e| AudioliftError::DecodeFailed(format!("Failed to run FFmpeg: {e}")))?;

        if !result.status.success() {
            return Err(AudioliftError::DecodeFailed(format!(
                "FFmpeg conversion of {} failed: {}",
                input.display(),
                stderr_of(&result)
            )));
        }

        if !output.exists() {
            return Err(AudioliftError::DecodeFailed(
                "Output file was not created".to_string(),
            ));
        }

        Ok(())
    }

    async fn repair(&self, input: &Path, output: &Path) -> Result<()> {
        info!("Repairing {} with FFmpeg", input.display());

        let result = self
            .run(input, &["-c", "copy", "-movflags", "faststart"], output)
            .await
            .map_err(|e| AudioliftError::RepairFailed(format!("Failed to run FFmpeg: {e}")))?;

        if !result.status.success() {
            return Err(AudioliftError::RepairFailed(stderr_of(&result)));
        }

        Ok(())
    }

    async fn encode(&self, input: &Path, output: &Path, format: OutputFormat) -> Result<()> {
        debug!("Encoding {} as {}", input.display(), format);

        let codec: &[&str] = match format {
            OutputFormat::Flac => &["-c:a", "flac"],
            OutputFormat::Wav => &["-c:a", "pcm_f32le"],
        };

        let result = self
            .run(input, codec, output)
            .await
            .map_err(|e| AudioliftError::write_failed(output, e))?;

        if !result.status.success() {
            return Err(AudioliftError::write_failed(
                output,
                std::io::Error::other(format!("FFmpeg encode failed: {}", stderr_of(&result))),
            ));
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "FFmpeg"
    }
}
