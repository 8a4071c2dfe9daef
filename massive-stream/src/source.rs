//! Record stream source.
//!
//! A single producer task reads the input one line at a time, decodes each
//! line and hands it over a bounded channel. When the channel is full the
//! producer waits, so the input is never buffered beyond `capacity` records.

use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{StreamError, StreamResult};

/// Lazy, ordered sequence of records decoded from a byte stream.
///
/// The first error (malformed line or read failure) is delivered in order and
/// ends the sequence. Dropping the source stops the producer.
pub struct RecordSource<T> {
    receiver: mpsc::Receiver<StreamResult<T>>,
    producer: JoinHandle<()>,
}

impl<T> RecordSource<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Start decoding `reader` on a background task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<R>(reader: R, capacity: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let producer = tokio::spawn(produce(reader, sender));
        Self { receiver, producer }
    }

    /// Receive the next record.
    ///
    /// Returns `None` once the input is exhausted.
    pub async fn next(&mut self) -> Option<StreamResult<T>> {
        self.receiver.recv().await
    }
}

impl<T> Drop for RecordSource<T> {
    fn drop(&mut self) {
        self.producer.abort();
    }
}

async fn produce<T, R>(reader: R, sender: mpsc::Sender<StreamResult<T>>)
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut line_number = 0usize;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                let _ = sender.send(Err(StreamError::Read(e))).await;
                return;
            }
        };
        line_number += 1;

        if line.trim().is_empty() {
            continue;
        }

        let item = serde_json::from_str::<T>(&line).map_err(|e| StreamError::Decode {
            line: line_number,
            message: e.to_string(),
        });
        let fatal = item.is_err();

        if sender.send(item).await.is_err() {
            debug!(line = line_number, "Record consumer dropped, stopping source");
            return;
        }
        if fatal {
            return;
        }
    }

    debug!(lines = line_number, "Record source exhausted");
}

// =============================================================================
// Tests
// =============================================================================
