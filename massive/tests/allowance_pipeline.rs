//! Integration tests for the allowance pipeline.
//!
//! Orders flow from an in-memory input through the pipeline into a duplex
//! pipe; the ledger is a call-counting stub.

use std::io::Cursor;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use massive::{AllowancePipeline, AppError, ExitStatus, PipelineReport};
use massive_domain::{Address, AllowanceKey, Order, U256};
use massive_exec::{
    unlimited_allowance, ExecError, LedgerCall, ResolverPolicy, RetryPolicy, StaticExchangeConfig,
    StubLedger,
};
use massive_stream::StreamError;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, BufReader, DuplexStream};

const OUTPUT_BUFFER: usize = 1024 * 1024;

fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

fn fee_token() -> Address {
    addr(0xfee)
}

fn token_proxy() -> Address {
    addr(0x9)
}

fn order(maker: u64, token: u64) -> Order {
    Order {
        maker: addr(maker),
        maker_token_address: addr(token),
        exchange_contract_address: addr(0xe),
        salt: U256::from(maker * 1000 + token),
        ..Order::default()
    }
}

fn input(orders: &[Order]) -> Cursor<Vec<u8>> {
    let mut bytes = Vec::new();
    for order in orders {
        bytes.extend(serde_json::to_vec(order).unwrap());
        bytes.push(b'\n');
    }
    Cursor::new(bytes)
}

fn policy() -> ResolverPolicy {
    ResolverPolicy::unlimited(
        RetryPolicy::none(),
        Duration::from_secs(5),
        Duration::from_secs(5),
    )
}

fn pipeline(ledger: &Arc<StubLedger>) -> AllowancePipeline<StubLedger, StaticExchangeConfig> {
    AllowancePipeline::new(
        ledger.clone(),
        Arc::new(StaticExchangeConfig::new(fee_token(), token_proxy())),
        policy(),
    )
}

async fn read_orders(mut output: DuplexStream) -> Vec<Order> {
    let mut text = String::new();
    output.read_to_string(&mut text).await.unwrap();
    text.lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

async fn run(
    pipeline: &AllowancePipeline<StubLedger, StaticExchangeConfig>,
    orders: &[Order],
) -> (Result<PipelineReport, AppError>, Vec<Order>) {
    let (writer, reader) = tokio::io::duplex(OUTPUT_BUFFER);
    let result = pipeline.run(input(orders), writer, 1).await;
    (result, read_orders(reader).await)
}

#[tokio::test]
async fn test_shared_key_resolved_once() {
    let ledger = Arc::new(StubLedger::new());
    let pipeline = pipeline(&ledger);
    let orders: Vec<Order> = (0..20).map(|_| order(0xa, 0x70)).collect();

    let (result, output) = run(&pipeline, &orders).await;
    let report = result.unwrap();

    let maker_key = AllowanceKey::new(addr(0xa), addr(0x70));
    let fee_key = AllowanceKey::new(addr(0xa), fee_token());
    assert_eq!(ledger.query_count(maker_key), 1);
    assert_eq!(ledger.query_count(fee_key), 1);
    assert_eq!(ledger.approval_count(maker_key), 1);
    assert_eq!(ledger.approval_count(fee_key), 1);
    assert_eq!(pipeline.resolver().len(), 2);

    assert_eq!(report.read, 20);
    assert_eq!(report.forwarded, 20);
    assert_eq!(report.failed, 0);
    assert_eq!(report.status(), ExitStatus::Success);
    assert_eq!(output.len(), 20);
    assert!(output.iter().all(|o| *o == order(0xa, 0x70)));
}

#[tokio::test]
async fn test_spender_is_token_proxy() {
    let ledger = Arc::new(StubLedger::new());
    let pipeline = pipeline(&ledger);

    let (result, _) = run(&pipeline, &[order(0xa, 0x70)]).await;
    result.unwrap();

    for call in ledger.calls() {
        match call {
            LedgerCall::GetAllowance { spender, .. } => assert_eq!(spender, token_proxy()),
            LedgerCall::SubmitApproval { spender, value, .. } => {
                assert_eq!(spender, token_proxy());
                assert_eq!(value, unlimited_allowance());
            }
            LedgerCall::WaitMined { .. } => {}
        }
    }
}

#[tokio::test]
async fn test_sufficient_allowances_need_no_approval() {
    let ledger = Arc::new(StubLedger::with_default_allowance(U256::MAX));
    let pipeline = pipeline(&ledger);
    let orders = vec![order(0xa, 0x70), order(0xb, 0x70), order(0xa, 0x71)];

    let (result, output) = run(&pipeline, &orders).await;
    let report = result.unwrap();

    assert_eq!(report.forwarded, 3);
    assert_eq!(ledger.mined_count(), 0);
    assert!(ledger
        .calls()
        .iter()
        .all(|call| matches!(call, LedgerCall::GetAllowance { .. })));
    assert_eq!(output.len(), 3);
}

#[tokio::test]
async fn test_failed_key_drops_only_dependent_records() {
    let ledger = Arc::new(StubLedger::new());
    let pipeline = pipeline(&ledger);
    let bad_key = AllowanceKey::new(addr(0xb), addr(0x70));
    ledger.fail_queries(bad_key, 1);
    let orders = vec![
        order(0xa, 0x70),
        order(0xb, 0x70),
        order(0xc, 0x70),
        order(0xb, 0x70),
    ];

    let (result, output) = run(&pipeline, &orders).await;
    let report = result.unwrap();

    assert_eq!(report.read, 4);
    assert_eq!(report.forwarded, 2);
    assert_eq!(report.failed, 2);
    assert_eq!(report.status(), ExitStatus::Failure);
    assert_eq!(ledger.query_count(bad_key), 1);
    assert_eq!(output.len(), 2);
    assert!(output.iter().all(|o| o.maker != addr(0xb)));
}

#[tokio::test]
async fn test_reverted_fee_approval_fails_record() {
    let ledger = Arc::new(StubLedger::new());
    let pipeline = pipeline(&ledger);
    ledger.revert_approvals(AllowanceKey::new(addr(0xa), fee_token()));

    let (result, output) = run(&pipeline, &[order(0xa, 0x70), order(0xd, 0x70)]).await;
    let report = result.unwrap();

    assert_eq!(report.forwarded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(output, vec![order(0xd, 0x70)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_records_complete_out_of_order() {
    let ledger = Arc::new(StubLedger::new());
    let pipeline = Arc::new(pipeline(&ledger));
    let slow_key = AllowanceKey::new(addr(0xa), addr(0x70));
    ledger.hold_queries(slow_key);

    let (writer, reader) = tokio::io::duplex(OUTPUT_BUFFER);
    let run = {
        let pipeline = pipeline.clone();
        let orders = vec![order(0xa, 0x70), order(0xb, 0x71)];
        tokio::spawn(async move { pipeline.run(input(&orders), writer, 1).await })
    };

    // Second record arrives while the first is still waiting on its query
    let mut lines = BufReader::new(reader).lines();
    let first_out: Order = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(first_out, order(0xb, 0x71));
    assert!(!run.is_finished());

    ledger.release_queries(slow_key);

    let second_out: Order = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
    assert_eq!(second_out, order(0xa, 0x70));

    let report = run.await.unwrap().unwrap();
    assert_eq!(report.forwarded, 2);
    assert!(lines.next_line().await.unwrap().is_none());
}

#[tokio::test]
async fn test_malformed_record_is_fatal() {
    let ledger = Arc::new(StubLedger::new());
    let pipeline = pipeline(&ledger);
    let mut bytes = input(&[order(0xa, 0x70)]).into_inner();
    bytes.extend_from_slice(b"{\"maker\": \"not an address\"}\n");
    bytes.extend(serde_json::to_vec(&order(0xb, 0x70)).unwrap());

    let (writer, _reader) = tokio::io::duplex(OUTPUT_BUFFER);
    let result = pipeline.run(Cursor::new(bytes), writer, 1).await;

    let err = result.unwrap_err();
    assert!(matches!(err, AppError::Stream(StreamError::Decode { line: 2, .. })));
    assert_eq!(err.exit_status(), ExitStatus::Failure);
    assert_eq!(
        ledger.query_count(AllowanceKey::new(addr(0xb), addr(0x70))),
        0
    );
}

#[tokio::test]
async fn test_exchange_lookup_failure_is_fatal() {
    let ledger = Arc::new(StubLedger::new());
    let pipeline = AllowancePipeline::new(
        ledger.clone(),
        Arc::new(StaticExchangeConfig::new(fee_token(), token_proxy()).without_exchange(addr(0xe))),
        policy(),
    );

    let (result, output) = run(&pipeline, &[order(0xa, 0x70)]).await;

    assert!(matches!(result, Err(AppError::Exec(ExecError::ExchangeConfig(_)))));
    assert!(output.is_empty());
    assert_eq!(ledger.total_calls(), 0);
}

struct BrokenPipe;

impl AsyncWrite for BrokenPipe {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed")))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn test_write_failure_is_fatal() {
    let ledger = Arc::new(StubLedger::with_default_allowance(U256::MAX));
    let pipeline = pipeline(&ledger);
    let orders: Vec<Order> = (0..5).map(|n| order(n + 1, 0x70)).collect();

    let result = pipeline.run(input(&orders), BrokenPipe, 1).await;

    let err = result.unwrap_err();
    assert!(matches!(err, AppError::Stream(StreamError::Write(_))));
    assert_eq!(err.exit_status(), ExitStatus::Failure);
}

#[tokio::test]
async fn test_empty_input() {
    let ledger = Arc::new(StubLedger::new());
    let pipeline = pipeline(&ledger);

    let (result, output) = run(&pipeline, &[]).await;

    assert_eq!(result.unwrap(), PipelineReport::default());
    assert!(output.is_empty());
    assert_eq!(ledger.total_calls(), 0);
}
