//! Allowance pipeline: source → per-record resolution → sink.
//!
//! # Flow
//!
//! 1. Read the next order from the source
//! 2. Look up the exchange's fee token and token proxy
//! 3. Request the (maker, maker token) and (maker, fee token) allowances
//! 4. Spawn a record task awaiting both, then forwarding or failing the order
//! 5. At end of input, wait for every record task and for the sink
//!
//! Reading never waits on a record's resolution, so output follows
//! completion order rather than input order.

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use massive_domain::Order;
use massive_exec::{AllowanceResolver, ExchangeConfigPort, LedgerPort, ResolverPolicy};
use massive_stream::{RecordSink, RecordSource, SinkSender};

use crate::error::{AppError, AppResult};
use crate::exit::ExitStatus;

/// Totals for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Records decoded from the input
    pub read: u64,
    /// Records written to the output
    pub forwarded: u64,
    /// Records dropped because a dependency failed
    pub failed: u64,
}

impl PipelineReport {
    /// Exit status for a run that completed.
    pub fn status(&self) -> ExitStatus {
        if self.failed == 0 {
            ExitStatus::Success
        } else {
            ExitStatus::Failure
        }
    }
}

// =============================================================================
// Allowance Pipeline
// =============================================================================

/// Orchestrator for allowance runs.
pub struct AllowancePipeline<L: LedgerPort + 'static, X: ExchangeConfigPort> {
    /// Key table shared by every record
    resolver: Arc<AllowanceResolver<L>>,
    /// Fee token and token proxy lookups
    exchanges: Arc<X>,
}

impl<L: LedgerPort + 'static, X: ExchangeConfigPort> AllowancePipeline<L, X> {
    /// Create a pipeline with an empty key table.
    pub fn new(ledger: Arc<L>, exchanges: Arc<X>, policy: ResolverPolicy) -> Self {
        Self {
            resolver: Arc::new(AllowanceResolver::new(ledger, policy)),
            exchanges,
        }
    }

    /// Key table of this pipeline.
    pub fn resolver(&self) -> &AllowanceResolver<L> {
        &self.resolver
    }

    /// Run the pipeline until the input is exhausted and every record has
    /// reached the output.
    ///
    /// Malformed input, a failed exchange lookup or an output error stops the
    /// run with an error. A failed allowance only drops the records that
    /// depend on it.
    pub async fn run<R, W>(&self, input: R, output: W, capacity: usize) -> AppResult<PipelineReport>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut source = RecordSource::<Order>::spawn(input, capacity);
        let (sink, sink_task) = RecordSink::spawn::<Order, W>(output, capacity);
        let mut records = JoinSet::new();
        let mut read = 0u64;

        let outcome: AppResult<()> = loop {
            tokio::select! {
                biased;

                Some(joined) = records.join_next(), if !records.is_empty() => {
                    if let Err(e) = check_record_task(joined) {
                        break Err(e);
                    }
                }

                next = source.next() => {
                    let order = match next {
                        Some(Ok(order)) => order,
                        Some(Err(e)) => break Err(e.into()),
                        None => break Ok(()),
                    };
                    if sink.is_closed() {
                        warn!(read, "Output closed, no longer reading input");
                        break Ok(());
                    }
                    read += 1;
                    if let Err(e) = self.dispatch(order, &sink, &mut records).await {
                        break Err(e);
                    }
                }
            }
        };
        drop(source);
        drop(sink);

        let outcome = match outcome {
            Ok(()) => {
                let mut result = Ok(());
                while let Some(joined) = records.join_next().await {
                    if let Err(e) = check_record_task(joined) {
                        result = Err(e);
                    }
                }
                result
            }
            Err(e) => {
                records.shutdown().await;
                Err(e)
            }
        };

        let sink_report = sink_task
            .await
            .map_err(|e| AppError::Task(format!("record sink: {}", e)))?;
        outcome?;
        let sink_report = sink_report?;

        let report = PipelineReport {
            read,
            forwarded: sink_report.written,
            failed: sink_report.failed,
        };
        info!(
            read = report.read,
            forwarded = report.forwarded,
            failed = report.failed,
            keys = self.resolver.len(),
            "Allowance pipeline finished"
        );
        Ok(report)
    }

    /// Register the order's allowance keys and spawn its record task.
    async fn dispatch(
        &self,
        order: Order,
        sink: &SinkSender<Order>,
        records: &mut JoinSet<()>,
    ) -> AppResult<()> {
        let exchange = order.exchange_contract_address;
        let fee_token = self.exchanges.fee_token(exchange).await?;
        let spender = self.exchanges.token_proxy(exchange).await?;

        let maker_token = self.resolver.request(order.maker_token_key(), spender)?;
        let fee = self.resolver.request(order.fee_token_key(fee_token), spender)?;

        let sink = sink.clone();
        records.spawn(async move {
            let maker = order.maker;
            let (maker_token, fee) = tokio::join!(maker_token.wait(), fee.wait());

            let delivered = match maker_token.and(fee) {
                Ok(_) => sink.forward(order).await,
                Err(e) => {
                    warn!(
                        maker = ?maker,
                        error = %e,
                        "Dropping order, allowance not set"
                    );
                    sink.fail(format!("order from {:#x}: {}", maker, e)).await
                }
            };
            if !delivered {
                debug!(maker = ?maker, "Output closed before order arrived");
            }
        });

        Ok(())
    }
}

fn check_record_task(joined: Result<(), JoinError>) -> AppResult<()> {
    joined.map_err(|e| AppError::Task(format!("record task: {}", e)))
}
