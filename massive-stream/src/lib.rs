//! Massive Record Streams
//!
//! Line-delimited JSON record framing between byte streams and the pipeline.
//!
//! # Architecture
//!
//! ```text
//! AsyncRead → RecordSource (producer task) → bounded channel → consumer
//! producer(s) → SinkSender → bounded channel → RecordSink (writer task) → AsyncWrite
//! ```
//!
//! The source is fatal on the first malformed line. The sink writes records in
//! the order it receives them and is fatal on the first write error.

#![warn(clippy::all)]

pub mod error;
pub mod sink;
pub mod source;

// Re-exports for convenience
pub use error::{StreamError, StreamResult};
pub use sink::{RecordSink, RecordWriter, SinkItem, SinkReport, SinkSender};
pub use source::RecordSource;
