//! Ordered per-record transforms.
//!
//! Orders are read, rewritten and written one at a time, so the output keeps
//! the input order exactly.

use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

use massive_connectors::OrderSigner;
use massive_domain::{Order, OrderTransform};
use massive_stream::{RecordSource, RecordWriter};

use crate::error::AppResult;
use crate::pipeline::PipelineReport;

/// A rewrite applied to each order in turn.
pub trait RecordRewrite {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Rewrite one order in place.
    fn rewrite(&self, order: &mut Order, now: DateTime<Utc>) -> AppResult<()>;
}

impl RecordRewrite for OrderTransform {
    fn name(&self) -> &'static str {
        OrderTransform::name(self)
    }

    fn rewrite(&self, order: &mut Order, now: DateTime<Utc>) -> AppResult<()> {
        Ok(self.apply(order, now)?)
    }
}

impl RecordRewrite for OrderSigner {
    fn name(&self) -> &'static str {
        "sign"
    }

    fn rewrite(&self, order: &mut Order, _now: DateTime<Utc>) -> AppResult<()> {
        self.sign(order)?;
        Ok(())
    }
}

/// Apply `transform` to every order of `input`, writing results to `output`.
///
/// The first malformed line, failed rewrite or write error stops the run.
pub async fn run_ordered<T, R, W>(
    transform: T,
    input: R,
    output: W,
    capacity: usize,
) -> AppResult<PipelineReport>
where
    T: RecordRewrite,
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    let mut source = RecordSource::<Order>::spawn(input, capacity);
    let mut writer = RecordWriter::new(output);
    let mut read = 0u64;

    while let Some(next) = source.next().await {
        let mut order = next?;
        read += 1;
        transform.rewrite(&mut order, Utc::now())?;
        writer.write_record(&order).await?;
    }

    let forwarded = writer.finish().await?;
    info!(transform = transform.name(), records = forwarded, "Transform finished");

    Ok(PipelineReport {
        read,
        forwarded,
        failed: 0,
    })
}
