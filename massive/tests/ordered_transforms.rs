//! Integration tests for ordered order transforms.

use std::io::Cursor;

use chrono::Utc;
use massive::{run_ordered, AppError, RecordRewrite};
use massive_connectors::{ConnectorError, OrderSigner};
use massive_domain::{
    parse_address, Address, ExchangeNetwork, ExpirationMode, MakerMismatch, Order, OrderTransform,
    SaltMode, U256,
};
use massive_stream::StreamError;
use tokio::io::{AsyncReadExt, DuplexStream};

fn order(n: u64) -> Order {
    Order {
        maker: Address::from_low_u64_be(n),
        maker_token_amount: U256::from(n * 10),
        salt: U256::from(n),
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

async fn read_orders(mut output: DuplexStream) -> Vec<Order> {
    let mut text = String::new();
    output.read_to_string(&mut text).await.unwrap();
    text.lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

const SIGNING_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
const SIGNING_ADDRESS: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";

async fn transform<T: RecordRewrite>(transform: T, orders: &[Order]) -> anyhow::Result<Vec<Order>> {
    let (writer, reader) = tokio::io::duplex(1024 * 1024);
    let report = run_ordered(transform, input(orders), writer, 1).await?;
    let output = read_orders(reader).await;
    assert_eq!(report.forwarded as usize, output.len());
    assert_eq!(report.failed, 0);
    Ok(output)
}

#[tokio::test]
async fn test_fixed_salt_keeps_order_and_other_fields() {
    let orders: Vec<Order> = (1..=50).map(order).collect();

    let output = transform(OrderTransform::Salt(SaltMode::Value(7)), &orders)
        .await
        .unwrap();

    assert_eq!(output.len(), 50);
    for (original, rewritten) in orders.iter().zip(&output) {
        assert_eq!(rewritten.salt, U256::from(7));
        assert_eq!(rewritten.maker, original.maker);
        assert_eq!(rewritten.maker_token_amount, original.maker_token_amount);
    }
}

#[tokio::test]
async fn test_random_salts_differ() {
    let orders: Vec<Order> = (1..=3).map(order).collect();

    let output = transform(OrderTransform::Salt(SaltMode::Random), &orders)
        .await
        .unwrap();

    assert_ne!(output[0].salt, output[1].salt);
    assert_ne!(output[1].salt, output[2].salt);
}

#[tokio::test]
async fn test_relative_expiration() {
    let before = Utc::now().timestamp() as u64;

    let output = transform(
        OrderTransform::Expiration(ExpirationMode::AfterSeconds(U256::from(3600))),
        &[order(1)],
    )
    .await
    .unwrap();

    let after = Utc::now().timestamp() as u64;
    let expiration = output[0].expiration_unix_timestamp_sec;
    assert!(expiration >= U256::from(before + 3600));
    assert!(expiration <= U256::from(after + 3600));
}

#[tokio::test]
async fn test_expiration_overflow_is_fatal() {
    let (writer, _reader) = tokio::io::duplex(1024);

    let result = run_ordered(
        OrderTransform::Expiration(ExpirationMode::AfterSeconds(U256::MAX)),
        input(&[order(1)]),
        writer,
        1,
    )
    .await;

    assert!(matches!(result, Err(AppError::Domain(_))));
}

#[tokio::test]
async fn test_set_exchange() {
    let exchange = ExchangeNetwork::Rinkeby.exchange_address();

    let output = transform(OrderTransform::Exchange(exchange), &[order(1), order(2)])
        .await
        .unwrap();

    assert!(output.iter().all(|o| o.exchange_contract_address == exchange));
    assert_eq!(output[0].maker, order(1).maker);
    assert_eq!(output[1].maker, order(2).maker);
}

#[tokio::test]
async fn test_malformed_line_stops_transform() {
    let mut bytes = input(&[order(1)]).into_inner();
    bytes.extend_from_slice(b"\n[1, 2, 3]\n");
    let (writer, reader) = tokio::io::duplex(1024 * 1024);

    let result = run_ordered(
        OrderTransform::Salt(SaltMode::Value(1)),
        Cursor::new(bytes),
        writer,
        1,
    )
    .await;

    assert!(matches!(
        result,
        Err(AppError::Stream(StreamError::Decode { line: 3, .. }))
    ));
    // Records before the bad line were already written
    assert_eq!(read_orders(reader).await.len(), 1);
}

#[tokio::test]
async fn test_sign_replace_makes_every_order_valid() {
    let signer = OrderSigner::new(SIGNING_KEY, MakerMismatch::Replace).unwrap();
    let orders: Vec<Order> = (1..=3).map(order).collect();
    assert!(orders.iter().all(|o| !o.is_signed_by_maker()));

    let output = transform(signer, &orders).await.unwrap();

    let address = parse_address(SIGNING_ADDRESS).unwrap();
    assert_eq!(output.len(), 3);
    for (original, signed) in orders.iter().zip(&output) {
        assert_eq!(signed.maker, address);
        assert_eq!(signed.salt, original.salt);
        assert!(signed.is_signed_by_maker());
    }
}

#[tokio::test]
async fn test_sign_pass_through_leaves_foreign_orders_unsigned() {
    let signer = OrderSigner::new(SIGNING_KEY, MakerMismatch::PassThrough).unwrap();
    let orders = vec![order(1), order(2)];

    let output = transform(signer, &orders).await.unwrap();

    assert_eq!(output, orders);
    assert!(output.iter().all(|o| !o.is_signed_by_maker()));
}

#[tokio::test]
async fn test_sign_fail_accepts_own_orders() {
    let signer = OrderSigner::new(SIGNING_KEY, MakerMismatch::Fail).unwrap();
    let own = Order {
        maker: parse_address(SIGNING_ADDRESS).unwrap(),
        ..order(1)
    };

    let output = transform(signer, &[own.clone()]).await.unwrap();

    assert_eq!(output[0].maker, own.maker);
    assert!(output[0].is_signed_by_maker());
}

#[tokio::test]
async fn test_sign_fail_stops_on_foreign_maker() {
    let signer = OrderSigner::new(SIGNING_KEY, MakerMismatch::Fail).unwrap();
    let own = Order {
        maker: parse_address(SIGNING_ADDRESS).unwrap(),
        ..order(1)
    };
    let (writer, reader) = tokio::io::duplex(1024 * 1024);

    let result = run_ordered(signer, input(&[own, order(2), order(3)]), writer, 1).await;

    let err = result.unwrap_err();
    assert!(matches!(
        err,
        AppError::Connector(ConnectorError::MakerMismatch { .. })
    ));
    assert_eq!(err.exit_status(), massive::ExitStatus::Failure);
    assert_eq!(read_orders(reader).await.len(), 1);
}
