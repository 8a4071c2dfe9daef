//! Value Objects for the Massive Domain
//!
//! Validated domain primitives shared by every pipeline stage.

use ethers_core::types::{Address, H160};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Domain errors for value object validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Address is not 20 bytes of hex
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Salt mode could not be parsed
    #[error("Invalid salt: {0}")]
    InvalidSalt(String),

    /// Expiration could not be computed
    #[error("Invalid expiration: {0}")]
    InvalidExpiration(String),

    /// Maker mismatch handling could not be parsed
    #[error("Invalid mismatch mode: {0}")]
    InvalidMismatch(String),

    /// Network name is not a known exchange deployment
    #[error("Unknown network: {0}")]
    UnknownNetwork(String),
}

// =============================================================================
// Address parsing
// =============================================================================

/// Parse a 20-byte address written as 40 hex characters with optional `0x`.
///
/// # Examples
/// ```
/// # use massive_domain::parse_address;
/// let address = parse_address("0x12459c951127e0c374ff9105dda097662a027093").unwrap();
/// assert_eq!(address.as_bytes()[0], 0x12);
/// assert!(parse_address("0x1234").is_err());
/// ```
pub fn parse_address(value: &str) -> Result<Address, DomainError> {
    let hex = value.strip_prefix("0X").unwrap_or(value);

    Address::from_str(hex).map_err(|e| {
        DomainError::InvalidAddress(format!(
            "'{}': {}. Expected 40 hex characters, with optional '0x' prefix",
            value, e
        ))
    })
}

// =============================================================================
// AllowanceKey
// =============================================================================

/// The (owner, token) pair identifying one on-chain spend allowance.
///
/// The spender is the exchange's token proxy and is not part of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AllowanceKey {
    /// Account granting the allowance
    pub owner: Address,
    /// Token the allowance is granted on
    pub token: Address,
}

impl AllowanceKey {
    /// Create a new key.
    pub fn new(owner: Address, token: Address) -> Self {
        Self { owner, token }
    }
}

impl fmt::Display for AllowanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}/{:#x}", self.owner, self.token)
    }
}

// =============================================================================
// ExchangeNetwork
// =============================================================================

const MAINNET_EXCHANGE: Address = H160([
    0x12, 0x45, 0x9c, 0x95, 0x11, 0x27, 0xe0, 0xc3, 0x74, 0xff,
    0x91, 0x05, 0xdd, 0xa0, 0x97, 0x66, 0x2a, 0x02, 0x70, 0x93,
]);
const ROPSTEN_EXCHANGE: Address = H160([
    0x47, 0x9c, 0xc4, 0x61, 0xfe, 0xcd, 0x07, 0x8f, 0x76, 0x6e,
    0xcc, 0x58, 0x53, 0x3d, 0x6f, 0x69, 0x58, 0x0c, 0xf3, 0xac,
]);
const KOVAN_EXCHANGE: Address = H160([
    0x90, 0xfe, 0x2a, 0xf7, 0x04, 0xb3, 0x4e, 0x02, 0x24, 0xbf,
    0x22, 0x99, 0xc8, 0x38, 0xe0, 0x4d, 0x4d, 0xcf, 0x13, 0x64,
]);
const RINKEBY_EXCHANGE: Address = H160([
    0x1d, 0x16, 0xef, 0x40, 0xfa, 0xc0, 0x1c, 0xec, 0x8a, 0xda,
    0xc2, 0xac, 0x49, 0x42, 0x7b, 0x93, 0x84, 0x19, 0x2c, 0x05,
]);
const TESTRPC_EXCHANGE: Address = H160([
    0x48, 0xba, 0xcb, 0x92, 0x66, 0xa5, 0x70, 0xd5, 0x21, 0x06,
    0x3e, 0xf5, 0xdd, 0x96, 0xe6, 0x16, 0x86, 0xdb, 0xe7, 0x88,
]);

/// Networks with a known exchange contract deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeNetwork {
    /// Ethereum mainnet
    Mainnet,
    /// Ropsten testnet
    Ropsten,
    /// Kovan testnet
    Kovan,
    /// Rinkeby testnet
    Rinkeby,
    /// Local test RPC snapshot
    TestRpc,
}

impl ExchangeNetwork {
    /// Exchange contract address deployed on this network.
    pub fn exchange_address(&self) -> Address {
        match self {
            ExchangeNetwork::Mainnet => MAINNET_EXCHANGE,
            ExchangeNetwork::Ropsten => ROPSTEN_EXCHANGE,
            ExchangeNetwork::Kovan => KOVAN_EXCHANGE,
            ExchangeNetwork::Rinkeby => RINKEBY_EXCHANGE,
            ExchangeNetwork::TestRpc => TESTRPC_EXCHANGE,
        }
    }
}

impl FromStr for ExchangeNetwork {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" => Ok(ExchangeNetwork::Mainnet),
            "ropsten" => Ok(ExchangeNetwork::Ropsten),
            "kovan" => Ok(ExchangeNetwork::Kovan),
            "rinkeby" => Ok(ExchangeNetwork::Rinkeby),
            "testrpc" => Ok(ExchangeNetwork::TestRpc),
            other => Err(DomainError::UnknownNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for ExchangeNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeNetwork::Mainnet => write!(f, "mainnet"),
            ExchangeNetwork::Ropsten => write!(f, "ropsten"),
            ExchangeNetwork::Kovan => write!(f, "kovan"),
            ExchangeNetwork::Rinkeby => write!(f, "rinkeby"),
            ExchangeNetwork::TestRpc => write!(f, "testrpc"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address_with_and_without_prefix() {
        let with_prefix = parse_address("0x90fe2af704b34e0224bf2299c838e04d4dcf1364").unwrap();
        let without_prefix = parse_address("90FE2AF704B34E0224BF2299C838E04D4DCF1364").unwrap();

        assert_eq!(with_prefix, without_prefix);
        assert_eq!(with_prefix.as_bytes()[19], 0x64);
    }

    #[test]
    fn test_parse_address_rejects_bad_length() {
        let result = parse_address("0x90fe2af704");
        assert!(matches!(result, Err(DomainError::InvalidAddress(_))));
    }

    #[test]
    fn test_parse_address_rejects_non_hex() {
        let result = parse_address("0xzzfe2af704b34e0224bf2299c838e04d4dcf1364");
        assert!(matches!(result, Err(DomainError::InvalidAddress(_))));
    }

    #[test]
    fn test_parse_address_rejects_non_ascii() {
        // 40 bytes, with a two-byte character straddling a hex pair
        let value = format!("{}éa", "a".repeat(37));
        assert_eq!(value.len(), 40);

        let result = parse_address(&value);
        assert!(matches!(result, Err(DomainError::InvalidAddress(_))));
        assert!(parse_address(&format!("0x{}", value)).is_err());
    }

    #[test]
    fn test_network_addresses() {
        assert_eq!(
            ExchangeNetwork::Mainnet.exchange_address(),
            parse_address("0x12459c951127e0c374ff9105dda097662a027093").unwrap()
        );
        assert_eq!(
            ExchangeNetwork::TestRpc.exchange_address(),
            parse_address("0x48bacb9266a570d521063ef5dd96e61686dbe788").unwrap()
        );
        assert_eq!(
            ExchangeNetwork::Kovan.exchange_address(),
            parse_address("0x90fe2af704b34e0224bf2299c838e04d4dcf1364").unwrap()
        );
        assert_eq!(
            ExchangeNetwork::Ropsten.exchange_address(),
            parse_address("0x479cc461fecd078f766ecc58533d6f69580cf3ac").unwrap()
        );
        assert_eq!(
            ExchangeNetwork::Rinkeby.exchange_address(),
            parse_address("0x1d16ef40fac01cec8adac2ac49427b9384192c05").unwrap()
        );
    }

    #[test]
    fn test_network_from_str() {
        assert_eq!("Kovan".parse::<ExchangeNetwork>().unwrap(), ExchangeNetwork::Kovan);
        assert_eq!("testrpc".parse::<ExchangeNetwork>().unwrap(), ExchangeNetwork::TestRpc);
        assert!("goerli".parse::<ExchangeNetwork>().is_err());
    }

    #[test]
    fn test_allowance_key_display() {
        let owner = Address::from_low_u64_be(1);
        let token = Address::from_low_u64_be(2);
        let key = AllowanceKey::new(owner, token);

        assert_eq!(
            key.to_string(),
            "0x0000000000000000000000000000000000000001/0x0000000000000000000000000000000000000002"
        );
    }
}
