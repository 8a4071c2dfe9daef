//! Per-record order transforms.
//!
//! Each transform rewrites one group of fields in place. They are pure apart
//! from the random salt source; the current time is passed in by the caller.

use chrono::{DateTime, Utc};
use ethers_core::types::{Address, U256};
use rand::RngCore;
use std::str::FromStr;

use crate::order::Order;
use crate::value_objects::DomainError;

// =============================================================================
// Salt
// =============================================================================

/// How a new salt is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaltMode {
    /// Fixed value
    Value(u64),
    /// Current unix timestamp in seconds
    Timestamp,
    /// 32 random bytes
    Random,
}

impl FromStr for SaltMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "timestamp" | "time" => Ok(SaltMode::Timestamp),
            "random" => Ok(SaltMode::Random),
            other => other.parse::<u64>().map(SaltMode::Value).map_err(|_| {
                DomainError::InvalidSalt(format!(
                    "{}. Expected: timestamp, random, or a non-negative integer",
                    other
                ))
            }),
        }
    }
}

// =============================================================================
// Expiration
// =============================================================================

/// How the expiration timestamp is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpirationMode {
    /// Absolute unix timestamp
    At(U256),
    /// Number of seconds from now
    AfterSeconds(U256),
}

// =============================================================================
// Signing
// =============================================================================

/// What signing does with an order whose maker is not the signing account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MakerMismatch {
    /// Write the order through unsigned
    #[default]
    PassThrough,
    /// Stop the run
    Fail,
    /// Make the signing account the maker, then sign
    Replace,
}

impl FromStr for MakerMismatch {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pass" | "pass-through" | "skip" => Ok(MakerMismatch::PassThrough),
            "fail" | "error" => Ok(MakerMismatch::Fail),
            "replace" => Ok(MakerMismatch::Replace),
            other => Err(DomainError::InvalidMismatch(format!(
                "{}. Expected: pass, fail, or replace",
                other
            ))),
        }
    }
}

impl std::fmt::Display for MakerMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MakerMismatch::PassThrough => write!(f, "pass"),
            MakerMismatch::Fail => write!(f, "fail"),
            MakerMismatch::Replace => write!(f, "replace"),
        }
    }
}

// =============================================================================
// OrderTransform
// =============================================================================

/// A single-field rewrite applied to every order of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderTransform {
    /// Replace the salt
    Salt(SaltMode),
    /// Replace the expiration timestamp
    Expiration(ExpirationMode),
    /// Replace the exchange contract address
    Exchange(Address),
}

impl OrderTransform {
    /// Apply the transform to an order.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidExpiration` if a relative expiration
    /// overflows 256 bits.
    pub fn apply(&self, order: &mut Order, now: DateTime<Utc>) -> Result<(), DomainError> {
        match self {
            OrderTransform::Salt(mode) => {
                order.salt = match mode {
                    SaltMode::Value(value) => U256::from(*value),
                    SaltMode::Timestamp => U256::from(now.timestamp().max(0) as u64),
                    SaltMode::Random => {
                        let mut bytes = [0u8; 32];
                        rand::thread_rng().fill_bytes(&mut bytes);
                        U256::from_big_endian(&bytes)
                    }
                };
            }
            OrderTransform::Expiration(ExpirationMode::At(timestamp)) => {
                order.expiration_unix_timestamp_sec = *timestamp;
            }
            OrderTransform::Expiration(ExpirationMode::AfterSeconds(seconds)) => {
                let now_secs = U256::from(now.timestamp().max(0) as u64);
                order.expiration_unix_timestamp_sec =
                    seconds.checked_add(now_secs).ok_or_else(|| {
                        DomainError::InvalidExpiration(format!(
                            "{} seconds from now overflows a 256-bit timestamp",
                            seconds
                        ))
                    })?;
            }
            OrderTransform::Exchange(address) => {
                order.exchange_contract_address = *address;
            }
        }
        Ok(())
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            OrderTransform::Salt(_) => "set-salt",
            OrderTransform::Expiration(_) => "set-expiration",
            OrderTransform::Exchange(_) => "set-exchange",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
