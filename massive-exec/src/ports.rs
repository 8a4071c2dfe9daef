//! Execution layer port definitions.
//!
//! Ports define the interfaces for external services (remote ledger, exchange
//! contract lookups). Adapters implement these ports for specific backends
//! (JSON-RPC node, static configuration, stub).

use async_trait::async_trait;
use std::fmt;

use massive_domain::{Address, H256, U256};

use crate::error::ExecError;

// =============================================================================
// Ledger Port
// =============================================================================

/// Port for token allowance reads and approvals on the remote ledger.
///
/// Implementations:
/// - `StubLedger` - For testing (in-memory allowances, call log)
/// - `RpcLedger` - Ethereum JSON-RPC node with a local signing key
///
/// None of these calls retry on their own; the resolver owns the retry
/// policy.
#[async_trait]
pub trait LedgerPort: Send + Sync {
    /// Read the allowance `owner` granted `spender` on `token`.
    async fn get_allowance(
        &self,
        owner: Address,
        token: Address,
        spender: Address,
    ) -> Result<U256, ExecError>;

    /// Submit an approval raising `owner`'s allowance for `spender` to `value`.
    ///
    /// Returns as soon as the node accepted the transaction.
    async fn submit_approval(
        &self,
        owner: Address,
        token: Address,
        spender: Address,
        value: U256,
    ) -> Result<TxHandle, ExecError>;

    /// Wait until a submitted transaction is mined successfully.
    async fn wait_mined(&self, tx: &TxHandle) -> Result<(), ExecError>;
}

/// Handle to a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHandle {
    /// Transaction hash
    pub hash: H256,
}

impl TxHandle {
    /// Create a handle from a transaction hash.
    pub fn new(hash: H256) -> Self {
        Self { hash }
    }
}

impl fmt::Display for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.hash)
    }
}

// =============================================================================
// Exchange Config Port
// =============================================================================

/// Port for per-exchange contract lookups.
///
/// Implementations:
/// - `StaticExchangeConfig` - Fixed addresses from configuration
/// - `RpcLedger` - Reads the exchange contract, memoized per exchange
#[async_trait]
pub trait ExchangeConfigPort: Send + Sync {
    /// Token the exchange charges fees in.
    async fn fee_token(&self, exchange: Address) -> Result<Address, ExecError>;

    /// Proxy contract the exchange moves tokens through (the allowance spender).
    async fn token_proxy(&self, exchange: Address) -> Result<Address, ExecError>;
}

// =============================================================================
// Tests
// =============================================================================
