//! Record stream error types.

use thiserror::Error;

/// Errors that can occur while reading or writing record streams.
#[derive(Debug, Error)]
pub enum StreamError {
    /// A line could not be decoded into a record
    #[error("Error parsing record on line {line}: {message}")]
    Decode { line: usize, message: String },

    /// Reading the input stream failed
    #[error("Read error: {0}")]
    Read(#[source] std::io::Error),

    /// A record could not be encoded
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Writing the output stream failed
    #[error("Write error: {0}")]
    Write(#[source] std::io::Error),

    /// Stream task stopped unexpectedly
    #[error("Stream task failed: {0}")]
    Task(String),
}

/// Result type for record stream operations.
pub type StreamResult<T> = Result<T, StreamError>;
