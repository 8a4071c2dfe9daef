//! Offline order signing with a local key.
//!
//! The maker signs the order hash as a prefixed personal message; the
//! recovery id is stored as 27 or 28.

use ethers::prelude::{LocalWallet, Signer};
use ethers::utils::hash_message;
use tracing::debug;

use massive_domain::{Address, EcSignature, MakerMismatch, Order};

use crate::rpc_ledger::{parse_wallet, ConnectorError};

/// Outcome of signing one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutcome {
    /// Maker matched and the order was signed
    Signed,
    /// Maker was replaced by the signing account, then signed
    Replaced,
    /// Maker did not match; the order is unchanged
    Unsigned,
}

/// Signs orders whose maker is the account of the loaded key.
pub struct OrderSigner {
    wallet: LocalWallet,
    on_mismatch: MakerMismatch,
}

impl OrderSigner {
    /// Load a hex private key, with optional `0x` prefix and surrounding
    /// whitespace.
    pub fn new(private_key: &str, on_mismatch: MakerMismatch) -> Result<Self, ConnectorError> {
        Ok(Self {
            wallet: parse_wallet(private_key)?,
            on_mismatch,
        })
    }

    /// Account orders are signed with.
    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Handling of orders made by another account.
    pub fn on_mismatch(&self) -> MakerMismatch {
        self.on_mismatch
    }

    /// Sign `order` in place.
    ///
    /// # Errors
    /// `ConnectorError::MakerMismatch` when the maker is another account and
    /// mismatches are fatal.
    pub fn sign(&self, order: &mut Order) -> Result<SignOutcome, ConnectorError> {
        let signer = self.address();
        let mut outcome = SignOutcome::Signed;

        if order.maker != signer {
            match self.on_mismatch {
                MakerMismatch::PassThrough => {
                    debug!(
                        maker = ?order.maker,
                        signer = ?signer,
                        "Maker is not the signer, order left unsigned"
                    );
                    return Ok(SignOutcome::Unsigned);
                }
                MakerMismatch::Fail => {
                    return Err(ConnectorError::MakerMismatch {
                        maker: format!("{:#x}", order.maker),
                        signer: format!("{:#x}", signer),
                    });
                }
                MakerMismatch::Replace => {
                    order.maker = signer;
                    outcome = SignOutcome::Replaced;
                }
            }
        }

        let signature = self
            .wallet
            .sign_hash(hash_message(order.hash()))
            .map_err(|e| ConnectorError::Signing(e.to_string()))?;
        order.ec_signature = EcSignature::from_signature(&signature).ok_or_else(|| {
            ConnectorError::Signing(format!("recovery id {} out of range", signature.v))
        })?;

        Ok(outcome)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use massive_domain::{parse_address, U256};

    const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ADDRESS: &str = "f39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    fn order_from(maker: Address) -> Order {
        Order {
            maker,
            maker_token_address: Address::from_low_u64_be(0x70),
            taker_token_address: Address::from_low_u64_be(0x71),
            exchange_contract_address: Address::from_low_u64_be(0xe),
            maker_token_amount: U256::from(1000),
            taker_token_amount: U256::from(10),
            salt: U256::from(42),
            ..Order::default()
        }
    }

    fn dev_address() -> Address {
        parse_address(DEV_ADDRESS).unwrap()
    }

    #[test]
    fn test_signer_address_from_key() {
        let signer = OrderSigner::new(&format!("0x{}\n", DEV_KEY), MakerMismatch::Fail).unwrap();

        assert_eq!(signer.address(), dev_address());
    }

    #[test]
    fn test_sign_own_order() {
        let signer = OrderSigner::new(DEV_KEY, MakerMismatch::Fail).unwrap();
        let mut order = order_from(dev_address());
        assert!(!order.is_signed_by_maker());

        let outcome = signer.sign(&mut order).unwrap();

        assert_eq!(outcome, SignOutcome::Signed);
        assert!(order.ec_signature.v == 27 || order.ec_signature.v == 28);
        assert!(order.is_signed_by_maker());
    }

    #[test]
    fn test_signature_breaks_when_terms_change() {
        let signer = OrderSigner::new(DEV_KEY, MakerMismatch::Fail).unwrap();
        let mut order = order_from(dev_address());
        signer.sign(&mut order).unwrap();

        order.salt = U256::from(43);

        assert!(!order.is_signed_by_maker());
    }

    #[test]
    fn test_mismatch_replace_signs_as_signer() {
        let signer = OrderSigner::new(DEV_KEY, MakerMismatch::Replace).unwrap();
        let mut order = order_from(Address::from_low_u64_be(0xdead));

        let outcome = signer.sign(&mut order).unwrap();

        assert_eq!(outcome, SignOutcome::Replaced);
        assert_eq!(order.maker, dev_address());
        assert!(order.is_signed_by_maker());
    }

    #[test]
    fn test_mismatch_pass_through_leaves_order_unsigned() {
        let signer = OrderSigner::new(DEV_KEY, MakerMismatch::PassThrough).unwrap();
        let original = order_from(Address::from_low_u64_be(0xdead));
        let mut order = original.clone();

        let outcome = signer.sign(&mut order).unwrap();

        assert_eq!(outcome, SignOutcome::Unsigned);
        assert_eq!(order, original);
        assert!(!order.is_signed_by_maker());
    }

    #[test]
    fn test_mismatch_fail_is_error() {
        let signer = OrderSigner::new(DEV_KEY, MakerMismatch::Fail).unwrap();
        let mut order = order_from(Address::from_low_u64_be(0xdead));

        let result = signer.sign(&mut order);

        assert!(matches!(result, Err(ConnectorError::MakerMismatch { .. })));
    }

    #[test]
    fn test_invalid_key_rejected() {
        let result = OrderSigner::new("0x1234", MakerMismatch::PassThrough);

        assert!(matches!(result, Err(ConnectorError::InvalidKey(_))));
    }
}
