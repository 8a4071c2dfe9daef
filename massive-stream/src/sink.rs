//! Record stream sink.
//!
//! Records are written one JSON object per line, in the order they are
//! handed over. Failure markers are counted but produce no output.

use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::{StreamError, StreamResult};

// =============================================================================
// RecordWriter
// =============================================================================

/// Newline-delimited JSON encoder over an async writer.
pub struct RecordWriter<W> {
    writer: W,
    written: u64,
}

impl<W: AsyncWrite + Unpin> RecordWriter<W> {
    /// Wrap an output stream.
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Encode and write one record followed by a newline.
    pub async fn write_record<T: Serialize>(&mut self, record: &T) -> StreamResult<()> {
        let line = encode_line(record)?;
        self.write_line(line).await
    }

    /// Write one already encoded line.
    pub async fn write_line(&mut self, line: Vec<u8>) -> StreamResult<()> {
        self.writer.write_all(&line).await.map_err(StreamError::Write)?;
        self.written += 1;
        Ok(())
    }

    /// Number of records written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush the output and return the number of records written.
    pub async fn finish(mut self) -> StreamResult<u64> {
        self.writer.flush().await.map_err(StreamError::Write)?;
        Ok(self.written)
    }
}

/// Encode a record as one JSON line.
fn encode_line<T: Serialize>(record: &T) -> StreamResult<Vec<u8>> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');
    Ok(line)
}

// =============================================================================
// Sink channel
// =============================================================================

/// Item handed to the sink.
#[derive(Debug, Clone)]
pub enum SinkItem<T> {
    /// Record to write
    Record(T),
    /// Record that could not be processed; nothing is written
    Failed {
        /// Why the record was dropped
        reason: String,
    },
}

/// Totals reported by the sink once its channel closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkReport {
    /// Records written to the output
    pub written: u64,
    /// Failure markers received
    pub failed: u64,
}

/// Cloneable handle for sending items to a running sink.
pub struct SinkSender<T> {
    sender: mpsc::Sender<SinkItem<T>>,
}

impl<T> Clone for SinkSender<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T> SinkSender<T> {
    /// Hand a record to the sink.
    ///
    /// Returns `false` if the sink has stopped.
    pub async fn forward(&self, record: T) -> bool {
        self.sender.send(SinkItem::Record(record)).await.is_ok()
    }

    /// Report a dropped record to the sink.
    ///
    /// Returns `false` if the sink has stopped.
    pub async fn fail(&self, reason: impl Into<String>) -> bool {
        self.sender
            .send(SinkItem::Failed {
                reason: reason.into(),
            })
            .await
            .is_ok()
    }

    /// Check whether the sink has stopped receiving.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Background writer task draining a bounded channel into an output stream.
pub struct RecordSink;

impl RecordSink {
    /// Start the sink on a background task.
    ///
    /// The task finishes once every `SinkSender` is dropped, or on the first
    /// write error.
    pub fn spawn<T, W>(
        writer: W,
        capacity: usize,
    ) -> (SinkSender<T>, JoinHandle<StreamResult<SinkReport>>)
    where
        T: Serialize + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(drain(RecordWriter::new(writer), receiver));
        (SinkSender { sender }, task)
    }
}

async fn drain<T, W>(
    mut writer: RecordWriter<W>,
    mut receiver: mpsc::Receiver<SinkItem<T>>,
) -> StreamResult<SinkReport>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let mut failed = 0u64;

    while let Some(item) = receiver.recv().await {
        match item {
            SinkItem::Record(record) => {
                // Records are only Send: nothing borrowed from one may cross an await
                let line = encode_line(&record)?;
                drop(record);
                if let Err(e) = writer.write_line(line).await {
                    error!(error = %e, written = writer.written(), "Failed to write record");
                    return Err(e);
                }
            }
            SinkItem::Failed { reason } => {
                failed += 1;
                warn!(%reason, "Record dropped from output");
            }
        }
    }

    let written = writer.finish().await?;
    debug!(written, failed, "Record sink closed");

    Ok(SinkReport { written, failed })
}

// =============================================================================
// Tests
// =============================================================================
