//! Execution layer error types.

use thiserror::Error;

/// Errors that can occur during allowance resolution.
///
/// Errors are `Clone` so that one resolved failure can be handed to every
/// record waiting on the same allowance key.
#[derive(Debug, Clone, Error)]
pub enum ExecError {
    /// Remote ledger call failed
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Approval transaction was not accepted by the node
    #[error("Approval rejected: {0}")]
    ApprovalRejected(String),

    /// Approval transaction was mined but failed, or was dropped
    #[error("Approval failed on chain: {0}")]
    ApprovalFailed(String),

    /// Owner does not match the account able to sign approvals
    #[error("Cannot approve for {owner}: signing account is {signer}")]
    SignerMismatch {
        /// Owner the approval was requested for
        owner: String,
        /// Account of the loaded key
        signer: String,
    },

    /// Exchange contract lookup failed
    #[error("Exchange config error: {0}")]
    ExchangeConfig(String),

    /// Timeout waiting for a remote call
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The task resolving a key stopped without producing a result
    #[error("Allowance resolution abandoned for {0}")]
    Abandoned(String),

    /// Key table could not be accessed
    #[error("Key table error: {0}")]
    KeyTable(String),
}

impl ExecError {
    /// Whether a read may succeed if issued again.
    pub fn is_transient(&self) -> bool {
        matches!(self, ExecError::Ledger(_) | ExecError::Timeout(_))
    }
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;
