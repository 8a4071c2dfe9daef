//! Ethereum JSON-RPC ledger.
//!
//! Provides on-chain integration for:
//! - Reading ERC-20 allowances
//! - Submitting ERC-20 approvals signed with a local key
//! - Waiting for approvals to be mined (receipt polling)
//! - Looking up the fee token and token proxy of a 0x exchange
//!
//! # Signing
//!
//! Approvals can only be issued by the account of the loaded key. Requests
//! for any other owner fail with `ExecError::SignerMismatch` before anything
//! is sent to the node.

use async_trait::async_trait;
use ethers::abi::parse_abi;
use ethers::contract::{BaseContract, Contract};
use ethers::prelude::{
    Http, LocalWallet, Middleware, NonceManagerMiddleware, Provider, Signer, SignerMiddleware,
};
use ethers::types::U64;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use massive_domain::{Address, U256};
use massive_exec::{ExchangeConfigPort, ExecError, LedgerPort, TxHandle};

// =============================================================================
// Constants
// =============================================================================

/// ERC-20 functions used for allowances
const ERC20_ABI: &[&str] = &[
    "function allowance(address owner, address spender) external view returns (uint256)",
    "function approve(address spender, uint256 value) external returns (bool)",
];

/// 0x v1 exchange getters
const EXCHANGE_ABI: &[&str] = &[
    "function ZRX_TOKEN_CONTRACT() external view returns (address)",
    "function TOKEN_TRANSFER_PROXY_CONTRACT() external view returns (address)",
];

/// Delay between receipt polls
const RECEIPT_POLL_INTERVAL_MS: u64 = 2_000;

// =============================================================================
// Errors
// =============================================================================

/// Errors that can occur in the RPC ledger.
#[derive(Debug, Clone, Error)]
pub enum ConnectorError {
    /// RPC endpoint URL could not be used
    #[error("Invalid RPC URL: {0}")]
    InvalidUrl(String),

    /// Private key could not be parsed
    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    /// Contract ABI could not be built or encoded
    #[error("ABI error: {0}")]
    Abi(String),

    /// Node request failed
    #[error("RPC request failed: {0}")]
    Rpc(String),

    /// Node refused the transaction
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// Transaction was mined with a failure status
    #[error("Transaction reverted: {0}")]
    Reverted(String),

    /// Transaction disappeared from the node before being mined
    #[error("Transaction dropped: {0}")]
    Dropped(String),

    /// Order maker is not the account of the loaded key
    #[error("Maker {maker} does not match signing account {signer}")]
    MakerMismatch { maker: String, signer: String },

    /// Local signing failed
    #[error("Signing failed: {0}")]
    Signing(String),
}

impl From<ConnectorError> for ExecError {
    fn from(e: ConnectorError) -> Self {
        match e {
            ConnectorError::Rejected(_) => ExecError::ApprovalRejected(e.to_string()),
            ConnectorError::Reverted(_) | ConnectorError::Dropped(_) => {
                ExecError::ApprovalFailed(e.to_string())
            }
            ConnectorError::MakerMismatch { maker, signer } => ExecError::SignerMismatch {
                owner: maker,
                signer,
            },
            ConnectorError::InvalidUrl(_)
            | ConnectorError::InvalidKey(_)
            | ConnectorError::Abi(_)
            | ConnectorError::Rpc(_)
            | ConnectorError::Signing(_) => ExecError::Ledger(e.to_string()),
        }
    }
}

// =============================================================================
// RPC Ledger
// =============================================================================

/// Approvals from one account share a local nonce counter.
type SigningClient = SignerMiddleware<NonceManagerMiddleware<Provider<Http>>, LocalWallet>;

/// Contract addresses for one exchange deployment.
#[derive(Debug, Clone, Copy)]
struct ExchangeContracts {
    fee_token: Address,
    token_proxy: Address,
}

/// Ledger backed by an Ethereum JSON-RPC node and a local signing key.
pub struct RpcLedger {
    /// Read-only provider
    provider: Arc<Provider<Http>>,
    /// Provider plus nonce manager and signer for approvals
    client: Arc<SigningClient>,
    /// Account of the loaded key
    signer: Address,
    /// ERC-20 interface
    erc20: BaseContract,
    /// Exchange interface
    exchange: BaseContract,
    /// Memoized exchange lookups
    exchanges: Mutex<HashMap<Address, ExchangeContracts>>,
    /// Delay between receipt polls
    poll_interval: Duration,
}

impl RpcLedger {
    /// Create a ledger for a known chain id.
    ///
    /// No request is sent to the node.
    pub fn new(rpc_url: &str, private_key: &str, chain_id: u64) -> Result<Self, ConnectorError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| ConnectorError::InvalidUrl(format!("{}: {}", rpc_url, e)))?;
        let provider = Arc::new(provider);

        let wallet = parse_wallet(private_key)?.with_chain_id(chain_id);
        let signer = wallet.address();
        let nonces = NonceManagerMiddleware::new(provider.as_ref().clone(), signer);
        let client = Arc::new(SignerMiddleware::new(nonces, wallet));

        let erc20 = BaseContract::from(
            parse_abi(ERC20_ABI).map_err(|e| ConnectorError::Abi(e.to_string()))?,
        );
        let exchange = BaseContract::from(
            parse_abi(EXCHANGE_ABI).map_err(|e| ConnectorError::Abi(e.to_string()))?,
        );

        Ok(Self {
            provider,
            client,
            signer,
            erc20,
            exchange,
            exchanges: Mutex::new(HashMap::new()),
            poll_interval: Duration::from_millis(RECEIPT_POLL_INTERVAL_MS),
        })
    }

    /// Create a ledger, asking the node for its chain id.
    pub async fn connect(rpc_url: &str, private_key: &str) -> Result<Self, ConnectorError> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| ConnectorError::InvalidUrl(format!("{}: {}", rpc_url, e)))?;
        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| ConnectorError::Rpc(format!("eth_chainId: {}", e)))?;

        let ledger = Self::new(rpc_url, private_key, chain_id.as_u64())?;
        info!(
            rpc_url,
            chain_id = chain_id.as_u64(),
            signer = ?ledger.signer,
            "Connected to ledger"
        );
        Ok(ledger)
    }

    /// Account approvals are signed with.
    pub fn signer(&self) -> Address {
        self.signer
    }

    /// Change the delay between receipt polls.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    async fn exchange_contracts(&self, exchange: Address) -> Result<ExchangeContracts, ExecError> {
        // Held across the lookup: one lookup per exchange
        let mut exchanges = self.exchanges.lock().await;
        if let Some(contracts) = exchanges.get(&exchange) {
            return Ok(*contracts);
        }

        let contract = Contract::new(exchange, self.exchange.clone(), self.provider.clone());
        let fee_token: Address = contract
            .method::<_, Address>("ZRX_TOKEN_CONTRACT", ())
            .map_err(|e| ExecError::ExchangeConfig(format!("ZRX_TOKEN_CONTRACT: {}", e)))?
            .call()
            .await
            .map_err(|e| {
                ExecError::ExchangeConfig(format!("ZRX_TOKEN_CONTRACT on {:#x}: {}", exchange, e))
            })?;
        let token_proxy: Address = contract
            .method::<_, Address>("TOKEN_TRANSFER_PROXY_CONTRACT", ())
            .map_err(|e| ExecError::ExchangeConfig(format!("TOKEN_TRANSFER_PROXY_CONTRACT: {}", e)))?
            .call()
            .await
            .map_err(|e| {
                ExecError::ExchangeConfig(format!(
                    "TOKEN_TRANSFER_PROXY_CONTRACT on {:#x}: {}",
                    exchange, e
                ))
            })?;

        let contracts = ExchangeContracts {
            fee_token,
            token_proxy,
        };
        debug!(
            exchange = ?exchange,
            fee_token = ?fee_token,
            token_proxy = ?token_proxy,
            "Exchange contracts loaded"
        );
        exchanges.insert(exchange, contracts);
        Ok(contracts)
    }

    fn check_signer(&self, owner: Address) -> Result<(), ExecError> {
        if owner != self.signer {
            return Err(ExecError::SignerMismatch {
                owner: format!("{:#x}", owner),
                signer: format!("{:#x}", self.signer),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerPort for RpcLedger {
    async fn get_allowance(
        &self,
        owner: Address,
        token: Address,
        spender: Address,
    ) -> Result<U256, ExecError> {
        let contract = Contract::new(token, self.erc20.clone(), self.provider.clone());
        let value = contract
            .method::<_, U256>("allowance", (owner, spender))
            .map_err(|e| ConnectorError::Abi(e.to_string()))?
            .call()
            .await
            .map_err(|e| ConnectorError::Rpc(format!("allowance on {:#x}: {}", token, e)))?;

        Ok(value)
    }

    async fn submit_approval(
        &self,
        owner: Address,
        token: Address,
        spender: Address,
        value: U256,
    ) -> Result<TxHandle, ExecError> {
        self.check_signer(owner)?;

        let contract = Contract::new(token, self.erc20.clone(), self.client.clone());
        let call = contract
            .method::<_, bool>("approve", (spender, value))
            .map_err(|e| ConnectorError::Abi(e.to_string()))?;
        let pending = call
            .send()
            .await
            .map_err(|e| ConnectorError::Rejected(format!("approve on {:#x}: {}", token, e)))?;

        Ok(TxHandle::new(pending.tx_hash()))
    }

    async fn wait_mined(&self, tx: &TxHandle) -> Result<(), ExecError> {
        loop {
            match self.provider.get_transaction_receipt(tx.hash).await {
                Ok(Some(receipt)) => {
                    if receipt.status == Some(U64::from(1)) {
                        debug!(%tx, block = ?receipt.block_number, "Transaction mined");
                        return Ok(());
                    }
                    return Err(ConnectorError::Reverted(tx.to_string()).into());
                }
                Ok(None) => {
                    let known = self
                        .provider
                        .get_transaction(tx.hash)
                        .await
                        .map_err(|e| ConnectorError::Rpc(e.to_string()))?;
                    if known.is_none() {
                        return Err(ConnectorError::Dropped(tx.to_string()).into());
                    }
                }
                Err(e) => {
                    warn!(%tx, error = %e, "Error checking transaction receipt");
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl ExchangeConfigPort for RpcLedger {
    async fn fee_token(&self, exchange: Address) -> Result<Address, ExecError> {
        Ok(self.exchange_contracts(exchange).await?.fee_token)
    }

    async fn token_proxy(&self, exchange: Address) -> Result<Address, ExecError> {
        Ok(self.exchange_contracts(exchange).await?.token_proxy)
    }
}

pub(crate) fn parse_wallet(private_key: &str) -> Result<LocalWallet, ConnectorError> {
    let hex = private_key.trim();
    let hex = hex
        .strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .unwrap_or(hex);

    hex.parse::<LocalWallet>()
        .map_err(|e| ConnectorError::InvalidKey(e.to_string()))
}

// =============================================================================
// Tests
// =============================================================================
