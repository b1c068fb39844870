//! Error types for koi-cli

use koi_classifier::KoiError;
use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;

/// Result type alias for CLI operations
pub(crate) type Result<T> = std::result::Result<T, CliError>;

/// CLI error types
#[derive(Error, Debug)]
pub(crate) enum CliError {
    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Input that cannot be read as a record or table
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error raised by the classifier library
    #[error(transparent)]
    Koi(#[from] KoiError),
}

impl CliError {
    /// Get exit code for this error
    pub(crate) fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    fn code(&self) -> u8 {
        match self {
            Self::FileNotFound(_) => 3,
            Self::InvalidInput(_) => 4,
            Self::Io(_) => 7,
            Self::Koi(e) => match e {
                KoiError::SchemaMismatch { .. }
                | KoiError::RowProcessing(_)
                | KoiError::Validation(_)
                | KoiError::InvalidLabel(_) => 5,
                KoiError::ArtifactLoad { .. } => 6,
                KoiError::Io(_) => 7,
                _ => 1,
            },
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidInput(e.to_string())
    }
}

/// Fails with [`CliError::FileNotFound`] unless `path` exists.
pub(crate) fn require_exists(path: &std::path::Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(CliError::FileNotFound(path.to_path_buf()))
    }
}
