//! Massive Ledger Connectors
//!
//! Adapters for the Ethereum JSON-RPC API and local order signing.
//! Normalizes node responses to execution-layer errors.

#![warn(clippy::all)]

pub mod order_signer;
pub mod rpc_ledger;

pub use order_signer::{OrderSigner, SignOutcome};
pub use rpc_ledger::{ConnectorError, RpcLedger};
