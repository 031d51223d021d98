//! Error types for skin composition

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Kind of filesystem operation attempted by the composer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Permanently remove a file
    Delete,
    /// Move a file into the recycle destination
    Recycle,
    /// Hard-link (or copy) a source file into the output directory
    Link,
    /// Read the active skin manifest
    ReadManifest,
    /// Write the active skin manifest
    WriteManifest,
    /// Remove the active skin manifest
    RemoveManifest,
    /// Create the output directory
    CreateDirectory,
    /// List or inspect files in the output directory
    Inspect,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Delete => "delete",
            Self::Recycle => "recycle",
            Self::Link => "link",
            Self::ReadManifest => "read manifest",
            Self::WriteManifest => "write manifest",
            Self::RemoveManifest => "remove manifest",
            Self::CreateDirectory => "create directory",
            Self::Inspect => "inspect",
        };
        f.write_str(name)
    }
}

/// A single filesystem operation, kept for error context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOperation {
    /// What was attempted
    pub kind: OperationKind,
    /// The file being written or removed
    pub target: PathBuf,
    /// Source file for link operations
    pub source: Option<PathBuf>,
}

impl FileOperation {
    /// Operation on a single path
    pub fn new(kind: OperationKind, target: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            target: target.into(),
            source: None,
        }
    }

    /// Link operation from `source` to `target`
    pub fn link(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            kind: OperationKind::Link,
            target: target.into(),
            source: Some(source.into()),
        }
    }
}

impl fmt::Display for FileOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(
                f,
                "{} {} -> {}",
                self.kind,
                source.display(),
                self.target.display()
            ),
            None => write!(f, "{} {}", self.kind, self.target.display()),
        }
    }
}

/// Errors that can abort a composition pass or a provider mutation
#[derive(Error, Debug)]
pub enum CompositionError {
    /// The track's skins folder is missing or its mount is detached
    #[error("Skins folder unavailable: {path}")]
    MountUnavailable {
        /// The folder that could not be reached
        path: PathBuf,
    },

    /// Too many failed attempts accumulated during a single pass
    #[error("Retry budget exceeded after {failures} failures while trying to {operation}: {source}")]
    RetryBudgetExceeded {
        /// The operation that tipped the budget
        operation: FileOperation,
        /// Failures counted in the pass so far
        failures: u32,
        /// Last I/O error observed
        source: std::io::Error,
    },

    /// An operation failed on every attempt
    #[error("Failed to {operation}: {source}")]
    Io {
        /// The operation being attempted
        operation: FileOperation,
        /// Last I/O error observed
        source: std::io::Error,
    },

    /// The manifest could not be read or serialized
    #[error("Manifest error for {path}: {source}")]
    Manifest {
        /// Manifest location
        path: PathBuf,
        /// Underlying JSON error
        source: serde_json::Error,
    },

    /// A skin id the provider does not know
    #[error("Unknown skin: {0}")]
    UnknownSkin(String),

    /// The skin set provider failed
    #[error("Skin provider error: {0}")]
    Provider(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A background task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),
}

impl CompositionError {
    /// Check if a later pass can be expected to succeed without user action
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::MountUnavailable { .. } => false,
            Self::RetryBudgetExceeded { .. } => true,
            Self::Io { .. } => true,
            Self::Manifest { .. } => false,
            Self::UnknownSkin(_) => false,
            Self::Provider(_) => true,
            Self::Config(_) => false,
            Self::Task(_) => true,
        }
    }

    /// The filesystem operation involved, if any
    pub fn operation(&self) -> Option<&FileOperation> {
        match self {
            Self::RetryBudgetExceeded { operation, .. } | Self::Io { operation, .. } => {
                Some(operation)
            }
            _ => None,
        }
    }

    /// Create a mount unavailable error
    pub fn mount_unavailable(path: impl Into<PathBuf>) -> Self {
        Self::MountUnavailable { path: path.into() }
    }

    /// Create an I/O error for an operation
    pub fn io(operation: FileOperation, source: std::io::Error) -> Self {
        Self::Io { operation, source }
    }

    /// Create a manifest error
    pub fn manifest(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Manifest {
            path: path.into(),
            source,
        }
    }
}
