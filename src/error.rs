use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioliftError {
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Decoding failed: {0}")]
    DecodeFailed(String),

    #[error("Repair failed: {0}")]
    RepairFailed(String),

    #[error("Chunk {index} failed: {message}")]
    ChunkInvocationFailed { index: usize, message: String },

    #[error("Source separation failed: {0}")]
    SeparationFailed(String),

    #[error("No stems folder for track '{track}' (found: {})", .searched.join(", "))]
    StemsNotFound { track: String, searched: Vec<String> },

    #[error("Failed to write {}: {source}", .path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Pipeline cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AudioliftError {
    pub fn write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AudioliftError::WriteFailed {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, AudioliftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stems_not_found_lists_searched_dirs() {
        let err = AudioliftError::StemsNotFound {
            track: "song".to_string(),
            searched: vec!["htdemucs".to_string(), "mdx".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "No stems folder for track 'song' (found: htdemucs, mdx)"
        );
    }

    #[test]
    fn test_chunk_failure_mentions_index() {
        let err = AudioliftError::ChunkInvocationFailed {
            index: 2,
            message: "bad shape".to_string(),
        };
        assert_eq!(err.to_string(), "Chunk 2 failed: bad shape");
    }

    #[test]
    fn test_write_failed_includes_path() {
        let err = AudioliftError::write_failed(
            "/nope/out.flac",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/nope/out.flac"));
        assert!(err.to_string().contains("denied"));
    }
}
