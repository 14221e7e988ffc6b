use crate::error::{AudioliftError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Container format of the final upscaled file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Flac,
    Wav,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Flac => write!(f, "flac"),
            OutputFormat::Wav => write!(f, "wav"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "flac" => Ok(OutputFormat::Flac),
            "wav" => Ok(OutputFormat::Wav),
            _ => Err(format!("Unknown format: {}. Use 'flac' or 'wav'", s)),
        }
    }
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Flac => "flac",
            OutputFormat::Wav => "wav",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ffmpeg_path: String,
    pub python_path: String,
    pub demucs_path: String,
    /// Nominal chunk duration fed to the super-resolution model.
    pub chunk_seconds: f64,
    pub output_format: OutputFormat,
    pub output_dir: PathBuf,
    /// Converted inputs, repaired MP4s and per-run chunk directories live here.
    pub staging_dir: PathBuf,
    pub model_name: String,
    pub ddim_steps: u32,
    pub guidance_scale: f32,
    pub separation_model: String,
    /// Keep converted WAVs between runs so the same input is not transcoded twice.
    pub keep_converted: bool,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let staging_dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("audiolift");

        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            python_path: "python3".to_string(),
            demucs_path: "demucs".to_string(),
            chunk_seconds: 10.0,
            output_format: OutputFormat::default(),
            output_dir: home.join("AudioSR_Upscaled"),
            staging_dir,
            model_name: "basic".to_string(),
            ddim_steps: 50,
            guidance_scale: 3.5,
            separation_model: "htdemucs".to_string(),
            keep_converted: true,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                match toml::from_str::<Config>(&contents) {
                    Ok(file_config) => config = file_config,
                    Err(e) => tracing::warn!(
                        "Ignoring unreadable config file {}: {e}",
                        config_path.display()
                    ),
                }
            }
        }

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("AUDIOLIFT_FFMPEG") {
            self.ffmpeg_path = path;
        }
        if let Ok(path) = std::env::var("AUDIOLIFT_PYTHON") {
            self.python_path = path;
        }
        if let Ok(path) = std::env::var("AUDIOLIFT_DEMUCS") {
            self.demucs_path = path;
        }
        if let Ok(secs) = std::env::var("AUDIOLIFT_CHUNK_SECONDS") {
            if let Ok(s) = secs.parse() {
                self.chunk_seconds = s;
            }
        }
        if let Ok(format) = std::env::var("AUDIOLIFT_OUTPUT_FORMAT") {
            if let Ok(f) = format.parse() {
                self.output_format = f;
            }
        }
        if let Ok(dir) = std::env::var("AUDIOLIFT_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("AUDIOLIFT_STAGING_DIR") {
            self.staging_dir = PathBuf::from(dir);
        }
        if let Ok(model) = std::env::var("AUDIOLIFT_SEPARATION_MODEL") {
            self.separation_model = model;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.chunk_seconds.is_finite() || self.chunk_seconds <= 0.0 {
            return Err(AudioliftError::Config(format!(
                "chunk_seconds must be a positive number, got {}",
                self.chunk_seconds
            )));
        }

        if self.ddim_steps == 0 {
            return Err(AudioliftError::Config(
                "ddim_steps must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("ffmpeg_path", &self.ffmpeg_path),
            ("python_path", &self.python_path),
            ("demucs_path", &self.demucs_path),
        ] {
            if value.trim().is_empty() {
                return Err(AudioliftError::Config(format!("{name} must not be empty")));
            }
        }

        Ok(())
    }

    pub fn save(&self) -> Result<PathBuf> {
        let config_path = Self::config_file_path().ok_or_else(|| {
            AudioliftError::Config("No config directory on this platform".to_string())
        })?;
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| AudioliftError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&config_path, contents)
            .map_err(|e| AudioliftError::write_failed(&config_path, e))?;
        Ok(config_path)
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("audiolift").join("config.toml"))
    }
}
