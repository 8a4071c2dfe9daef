//! Massive Execution Layer
//!
//! On-chain allowance resolution behind a single-flight key table.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator → AllowanceResolver → key table (one entry per owner/token)
//!                                          ↓ first sighting only
//!                                    LedgerPort: query → approve → wait mined
//! ```
//!
//! # Components
//!
//! - **Ports**: Traits for the remote ledger and per-exchange contract lookups
//! - **Allowance Resolver**: Memoizing, key-scoped gate around the ledger
//! - **Retry**: Bounded retry with exponential backoff for remote calls
//! - **Exchange**: Static exchange lookups (fixed fee token and token proxy)
//! - **Stub**: Call-counting ledger for tests
//!
//! # Example
//!
//! ```rust,ignore
//! use massive_exec::{AllowanceResolver, ResolverPolicy, StubLedger};
//! use std::sync::Arc;
//!
//! let ledger = Arc::new(StubLedger::new());
//! let resolver = AllowanceResolver::new(ledger, ResolverPolicy::default());
//!
//! let allowance = resolver.resolve(owner, token, spender).await?;
//! ```

#![warn(clippy::all)]

pub mod allowance;
pub mod error;
pub mod exchange;
pub mod ports;
pub mod retry;
pub mod stub;

// Re-exports for convenience
pub use allowance::{
    approval_threshold, unlimited_allowance, AllowanceHandle, AllowanceResolver, AllowanceState,
    ResolverPolicy,
};
pub use error::{ExecError, ExecResult};
pub use exchange::StaticExchangeConfig;
pub use ports::{ExchangeConfigPort, LedgerPort, TxHandle};
pub use retry::RetryPolicy;
pub use stub::{LedgerCall, StubLedger};
