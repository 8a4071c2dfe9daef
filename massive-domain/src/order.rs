//! Signed exchange order record.
//!
//! One `Order` is decoded from each input line and encoded back to exactly one
//! output line. Addresses and signature parts travel as `0x` hex, amounts as
//! base-10 strings.

use ethers_core::types::{Address, Signature, H256, U256};
use ethers_core::utils::{hash_message, keccak256};
use serde::{Deserialize, Serialize};

use crate::value_objects::AllowanceKey;

// =============================================================================
// Order
// =============================================================================

/// A signed exchange order.
///
/// Missing fields decode as zero, matching an order that has not been filled
/// in yet by earlier pipeline stages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Order {
    /// Account selling `maker_token_address`
    pub maker: Address,
    /// Account allowed to fill (zero for anyone)
    pub taker: Address,
    /// Token offered by the maker
    pub maker_token_address: Address,
    /// Token requested from the taker
    pub taker_token_address: Address,
    /// Relayer receiving fees
    pub fee_recipient: Address,
    /// Exchange contract the order is valid on
    pub exchange_contract_address: Address,
    /// Amount of maker token offered
    #[serde(with = "decimal_u256")]
    pub maker_token_amount: U256,
    /// Amount of taker token requested
    #[serde(with = "decimal_u256")]
    pub taker_token_amount: U256,
    /// Fee paid by the maker
    #[serde(with = "decimal_u256")]
    pub maker_fee: U256,
    /// Fee paid by the taker
    #[serde(with = "decimal_u256")]
    pub taker_fee: U256,
    /// Expiration as unix seconds
    #[serde(with = "decimal_u256")]
    pub expiration_unix_timestamp_sec: U256,
    /// Uniqueness salt
    #[serde(with = "decimal_u256")]
    pub salt: U256,
    /// Maker signature over the order hash
    pub ec_signature: EcSignature,
    /// Amount of taker token already filled
    #[serde(with = "decimal_u256")]
    pub taker_token_amount_filled: U256,
    /// Amount of taker token already cancelled
    #[serde(with = "decimal_u256")]
    pub taker_token_amount_cancelled: U256,
}

impl Order {
    /// Allowance the maker must grant on the token it sells.
    pub fn maker_token_key(&self) -> AllowanceKey {
        AllowanceKey::new(self.maker, self.maker_token_address)
    }

    /// Allowance the maker must grant on the exchange's fee token.
    pub fn fee_token_key(&self, fee_token: Address) -> AllowanceKey {
        AllowanceKey::new(self.maker, fee_token)
    }

    /// Order hash the maker signs.
    ///
    /// Keccak-256 over the tightly packed exchange, maker, taker, maker token,
    /// taker token and fee recipient addresses (20 bytes each), followed by
    /// both token amounts, both fees, the expiration and the salt (32 bytes
    /// each). Signature and fill state are not covered.
    pub fn hash(&self) -> H256 {
        let addresses = [
            self.exchange_contract_address,
            self.maker,
            self.taker,
            self.maker_token_address,
            self.taker_token_address,
            self.fee_recipient,
        ];
        let words = [
            self.maker_token_amount,
            self.taker_token_amount,
            self.maker_fee,
            self.taker_fee,
            self.expiration_unix_timestamp_sec,
            self.salt,
        ];

        let mut packed = Vec::with_capacity(addresses.len() * 20 + words.len() * 32);
        for address in &addresses {
            packed.extend_from_slice(address.as_bytes());
        }
        for word in &words {
            let mut bytes = [0u8; 32];
            word.to_big_endian(&mut bytes);
            packed.extend_from_slice(&bytes);
        }

        H256::from(keccak256(packed))
    }

    /// Check that `ec_signature` is the maker's signature of this order.
    pub fn is_signed_by_maker(&self) -> bool {
        self.ec_signature.verify(self.hash(), self.maker)
    }
}

/// ECDSA signature split into recovery id and the two curve scalars.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcSignature {
    /// Recovery id (27 or 28 once signed)
    pub v: u8,
    /// First signature scalar
    pub r: H256,
    /// Second signature scalar
    pub s: H256,
}

impl EcSignature {
    /// Build from a recoverable signature.
    ///
    /// Returns `None` if the recovery id does not fit in a byte.
    pub fn from_signature(signature: &Signature) -> Option<Self> {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        signature.r.to_big_endian(&mut r);
        signature.s.to_big_endian(&mut s);

        Some(Self {
            v: u8::try_from(signature.v).ok()?,
            r: H256::from(r),
            s: H256::from(s),
        })
    }

    /// Check that this is `signer`'s signature of `hash` as a prefixed
    /// personal message.
    pub fn verify(&self, hash: H256, signer: Address) -> bool {
        let signature = Signature {
            r: U256::from_big_endian(self.r.as_bytes()),
            s: U256::from_big_endian(self.s.as_bytes()),
            v: u64::from(self.v),
        };
        signature.verify(hash_message(hash), signer).is_ok()
    }
}

// =============================================================================
// Decimal U256 serde
// =============================================================================

mod decimal_u256 {
    use ethers_core::types::U256;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.is_empty() {
            return Ok(U256::zero());
        }
        U256::from_dec_str(&raw)
            .map_err(|e| de::Error::custom(format!("invalid amount '{}': {:?}", raw, e)))
    }
}

// =============================================================================
// Tests
// =============================================================================
