//! Application error types.

use std::path::PathBuf;
use thiserror::Error;

use massive_connectors::ConnectorError;
use massive_domain::DomainError;
use massive_exec::ExecError;
use massive_stream::StreamError;

use crate::exit::ExitStatus;

/// Application-level errors.
#[derive(Debug, Error)]
pub enum AppError {
    /// Domain error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Record stream error
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Execution error
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// Ledger connector error
    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// Input or output file could not be opened
    #[error("Cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Allowance runs only approve unlimited amounts
    #[error("Only unlimited allowances are supported, set MASSIVE_UNLIMITED=true")]
    UnlimitedRequired,

    /// Background task stopped unexpectedly
    #[error("Task failed: {0}")]
    Task(String),
}

impl AppError {
    /// Process exit status for this error.
    pub fn exit_status(&self) -> ExitStatus {
        match self {
            AppError::Config(_) => ExitStatus::UsageError,
            _ => ExitStatus::Failure,
        }
    }
}

/// Result type for application operations.
pub type AppResult<T> = Result<T, AppError>;
