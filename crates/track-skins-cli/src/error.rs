//! Error types for skinctl

use thiserror::Error;
use track_skins::CompositionError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Track not found: {0}")]
    TrackNotFound(String),

    #[error("Skin not found: {0}")]
    SkinNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Skins folder unavailable: {0}")]
    MountUnavailable(String),

    #[error("Too many failed file operations: {0}")]
    BudgetExceeded(String),

    #[error("Composition failed: {0}")]
    Composition(CompositionError),
}

impl From<CompositionError> for CliError {
    fn from(error: CompositionError) -> Self {
        match error {
            CompositionError::UnknownSkin(id) => Self::SkinNotFound(id),
            CompositionError::Config(message) => Self::InvalidConfiguration(message),
            CompositionError::MountUnavailable { ref path } => {
                Self::MountUnavailable(path.display().to_string())
            }
            CompositionError::RetryBudgetExceeded { .. } => Self::BudgetExceeded(error.to_string()),
            other => Self::Composition(other),
        }
    }
}

impl CliError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::TrackNotFound(_) | Self::MountUnavailable(_) => 2,
            Self::SkinNotFound(_) => 3,
            Self::InvalidConfiguration(_) => 4,
            Self::BudgetExceeded(_) => 5,
            Self::Composition(_) => 1,
        }
    }
}
