//! Massive Domain Layer
//!
//! Pure order model with zero I/O dependencies.
//! Contains the signed order record, its hash, value objects and per-record
//! transforms.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod order;
pub mod transform;
pub mod value_objects;

// Re-export commonly used types
pub use ethers_core::types::{Address, H256, U256};
pub use order::{EcSignature, Order};
pub use transform::{ExpirationMode, MakerMismatch, OrderTransform, SaltMode};
pub use value_objects::{parse_address, AllowanceKey, DomainError, ExchangeNetwork};
