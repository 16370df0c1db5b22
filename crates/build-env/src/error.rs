//! Error types for environment operations.

use std::path::PathBuf;

use build_launch::{LaunchError, ToolError};

/// Result type for environment operations.
pub type EnvResult<T> = Result<T, EnvError>;

/// Errors that can occur while provisioning or driving an environment.
///
/// Invocation failures (a tool exited non-zero) and missing artifacts (a
/// tool succeeded but left nothing behind) are kept distinct.
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to install {packages} (exit code {code})")]
    InstallFailed { packages: String, code: i32 },

    #[error("Failed to uninstall {packages} (exit code {code})")]
    UninstallFailed { packages: String, code: i32 },

    #[error("Failed to upgrade {packages} (exit code {code})")]
    UpgradeFailed { packages: String, code: i32 },

    #[error("Failed to list packages (exit code {code})")]
    ListFailed { code: i32 },

    #[error("Failed to freeze environment (exit code {code})")]
    FreezeFailed { code: i32 },

    #[error("Failed to create virtual environment {name} (exit code {code})")]
    CreationFailed { name: String, code: i32 },

    #[error("Failed to generate documentation for {package} (exit code {code})")]
    GenerationFailed { package: String, code: i32 },

    #[error("Failed to clone {url} (exit code {code})")]
    CloneFailed { url: String, code: i32 },

    #[error("Failed to query interpreter {interpreter:?}: {reason}")]
    InterpreterQuery {
        interpreter: PathBuf,
        reason: String,
    },

    #[error("Python interpreter doesn't exist at known location {0:?}")]
    InterpreterMissing(PathBuf),

    #[error("{0:?} not found")]
    NotFound(PathBuf),

    #[error("Backing out of directories is not supported: {0}")]
    PathTraversal(String),

    #[error("Invalid environment name {0:?}: expected a single directory name")]
    InvalidName(String),

    #[error("Operating system {0} is not supported")]
    UnsupportedPlatform(String),
}

impl EnvError {
    /// Whether this error reports a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        match self {
            EnvError::NotFound(_) => true,
            EnvError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
