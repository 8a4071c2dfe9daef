//! Static exchange lookups.
//!
//! Used when the fee token and token proxy are known up front, and in tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

use massive_domain::Address;

use crate::error::ExecError;
use crate::ports::ExchangeConfigPort;

/// Contract addresses for one exchange deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ExchangeContracts {
    fee_token: Address,
    token_proxy: Address,
}

/// Exchange lookups answered from fixed addresses.
///
/// Every exchange resolves to the default pair unless an override is
/// registered with [`StaticExchangeConfig::with_exchange`].
#[derive(Debug, Clone)]
pub struct StaticExchangeConfig {
    default: ExchangeContracts,
    overrides: HashMap<Address, ExchangeContracts>,
    unknown: HashSet<Address>,
}

impl StaticExchangeConfig {
    /// Create a config answering every exchange with the same addresses.
    pub fn new(fee_token: Address, token_proxy: Address) -> Self {
        Self {
            default: ExchangeContracts {
                fee_token,
                token_proxy,
            },
            overrides: HashMap::new(),
            unknown: HashSet::new(),
        }
    }

    /// Register addresses for a specific exchange.
    pub fn with_exchange(mut self, exchange: Address, fee_token: Address, token_proxy: Address) -> Self {
        self.overrides.insert(
            exchange,
            ExchangeContracts {
                fee_token,
                token_proxy,
            },
        );
        self
    }

    /// Make lookups for `exchange` fail.
    pub fn without_exchange(mut self, exchange: Address) -> Self {
        self.unknown.insert(exchange);
        self
    }

    fn contracts(&self, exchange: Address) -> Result<ExchangeContracts, ExecError> {
        if self.unknown.contains(&exchange) {
            return Err(ExecError::ExchangeConfig(format!(
                "No contracts known for exchange {:#x}",
                exchange
            )));
        }
        Ok(self.overrides.get(&exchange).copied().unwrap_or(self.default))
    }
}

#[async_trait]
impl ExchangeConfigPort for StaticExchangeConfig {
    async fn fee_token(&self, exchange: Address) -> Result<Address, ExecError> {
        Ok(self.contracts(exchange)?.fee_token)
    }

    async fn token_proxy(&self, exchange: Address) -> Result<Address, ExecError> {
        Ok(self.contracts(exchange)?.token_proxy)
    }
}

// =============================================================================
// Tests
// =============================================================================
