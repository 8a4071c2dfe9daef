//! Stub implementations for testing.
//!
//! `StubLedger` simulates token allowances without a node. Every call is
//! logged so tests can assert exactly how often the remote ledger was hit.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::Semaphore;

use massive_domain::{Address, AllowanceKey, H256, U256};

use crate::error::ExecError;
use crate::ports::{LedgerPort, TxHandle};

// =============================================================================
// Call log
// =============================================================================

/// One call made against the stub ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCall {
    /// `get_allowance`
    GetAllowance {
        key: AllowanceKey,
        spender: Address,
    },
    /// `submit_approval`
    SubmitApproval {
        key: AllowanceKey,
        spender: Address,
        value: U256,
    },
    /// `wait_mined`
    WaitMined { tx: TxHandle },
}

// =============================================================================
// Stub Ledger
// =============================================================================

/// Stub ledger for testing.
///
/// Allowances default to zero. Approvals take effect once `wait_mined`
/// returns. Queries for a key and mining can be held back with gates to
/// control interleavings.
pub struct StubLedger {
    /// Current allowances (spender is not tracked)
    allowances: RwLock<HashMap<AllowanceKey, U256>>,
    /// Allowance for keys never set
    default_allowance: U256,
    /// Remaining query failures per key
    failing_queries: RwLock<HashMap<AllowanceKey, u32>>,
    /// Keys whose approval submission is rejected
    rejected_approvals: RwLock<HashSet<AllowanceKey>>,
    /// Keys whose approval reverts when mined
    reverted_approvals: RwLock<HashSet<AllowanceKey>>,
    /// Queries for these keys wait until the gate closes
    query_gates: RwLock<HashMap<AllowanceKey, Arc<Semaphore>>>,
    /// Mining waits until this gate closes
    mining_gate: RwLock<Option<Arc<Semaphore>>>,
    /// Submitted, not yet mined approvals
    pending: RwLock<HashMap<H256, (AllowanceKey, U256)>>,
    /// Every call in arrival order
    calls: Mutex<Vec<LedgerCall>>,
    /// Transaction counter for generating hashes
    tx_counter: AtomicU64,
}

impl StubLedger {
    /// Create a stub where every allowance starts at zero.
    pub fn new() -> Self {
        Self::with_default_allowance(U256::zero())
    }

    /// Create a stub where unknown keys report `default_allowance`.
    pub fn with_default_allowance(default_allowance: U256) -> Self {
        Self {
            allowances: RwLock::new(HashMap::new()),
            default_allowance,
            failing_queries: RwLock::new(HashMap::new()),
            rejected_approvals: RwLock::new(HashSet::new()),
            reverted_approvals: RwLock::new(HashSet::new()),
            query_gates: RwLock::new(HashMap::new()),
            mining_gate: RwLock::new(None),
            pending: RwLock::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            tx_counter: AtomicU64::new(0),
        }
    }

    /// Set the current allowance for a key.
    pub fn set_allowance(&self, key: AllowanceKey, value: U256) {
        write(&self.allowances).insert(key, value);
    }

    /// Current allowance for a key.
    pub fn allowance(&self, key: AllowanceKey) -> U256 {
        read(&self.allowances)
            .get(&key)
            .copied()
            .unwrap_or(self.default_allowance)
    }

    /// Make the next `times` queries for a key fail.
    pub fn fail_queries(&self, key: AllowanceKey, times: u32) {
        write(&self.failing_queries).insert(key, times);
    }

    /// Reject every approval submitted for a key.
    pub fn reject_approvals(&self, key: AllowanceKey) {
        write(&self.rejected_approvals).insert(key);
    }

    /// Make approvals for a key revert when mined.
    pub fn revert_approvals(&self, key: AllowanceKey) {
        write(&self.reverted_approvals).insert(key);
    }

    /// Hold queries for a key until [`StubLedger::release_queries`].
    pub fn hold_queries(&self, key: AllowanceKey) {
        write(&self.query_gates).insert(key, Arc::new(Semaphore::new(0)));
    }

    /// Let held queries for a key proceed.
    pub fn release_queries(&self, key: AllowanceKey) {
        if let Some(gate) = write(&self.query_gates).remove(&key) {
            gate.close();
        }
    }

    /// Hold every `wait_mined` until [`StubLedger::release_mining`].
    pub fn hold_mining(&self) {
        *write(&self.mining_gate) = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let held `wait_mined` calls proceed.
    pub fn release_mining(&self) {
        if let Some(gate) = write(&self.mining_gate).take() {
            gate.close();
        }
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<LedgerCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of allowance queries made for a key.
    pub fn query_count(&self, key: AllowanceKey) -> usize {
        self.count(|call| matches!(call, LedgerCall::GetAllowance { key: k, .. } if *k == key))
    }

    /// Number of approvals submitted for a key.
    pub fn approval_count(&self, key: AllowanceKey) -> usize {
        self.count(|call| matches!(call, LedgerCall::SubmitApproval { key: k, .. } if *k == key))
    }

    /// Number of `wait_mined` calls.
    pub fn mined_count(&self) -> usize {
        self.count(|call| matches!(call, LedgerCall::WaitMined { .. }))
    }

    /// Total number of calls of any kind.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn count(&self, predicate: impl Fn(&LedgerCall) -> bool) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|call| predicate(call))
            .count()
    }

    fn record(&self, call: LedgerCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    /// Generate a unique transaction hash.
    fn next_tx(&self) -> TxHandle {
        let n = self.tx_counter.fetch_add(1, Ordering::SeqCst) + 1;
        TxHandle::new(H256::from_low_u64_be(n))
    }

    /// Consume one configured failure for a key.
    fn should_fail_query(&self, key: AllowanceKey) -> bool {
        let mut failing = write(&self.failing_queries);
        match failing.get_mut(&key) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

impl Default for StubLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerPort for StubLedger {
    async fn get_allowance(
        &self,
        owner: Address,
        token: Address,
        spender: Address,
    ) -> Result<U256, ExecError> {
        let key = AllowanceKey::new(owner, token);
        self.record(LedgerCall::GetAllowance { key, spender });

        let gate = read(&self.query_gates).get(&key).cloned();
        if let Some(gate) = gate {
            // Closed gate means released
            let _ = gate.acquire().await;
        }

        if self.should_fail_query(key) {
            return Err(ExecError::Ledger(format!("Simulated query failure for {}", key)));
        }

        Ok(self.allowance(key))
    }

    async fn submit_approval(
        &self,
        owner: Address,
        token: Address,
        spender: Address,
        value: U256,
    ) -> Result<TxHandle, ExecError> {
        let key = AllowanceKey::new(owner, token);
        self.record(LedgerCall::SubmitApproval {
            key,
            spender,
            value,
        });

        if read(&self.rejected_approvals).contains(&key) {
            return Err(ExecError::ApprovalRejected(format!(
                "Simulated approval rejection for {}",
                key
            )));
        }

        let tx = self.next_tx();
        write(&self.pending).insert(tx.hash, (key, value));
        tracing::debug!(%key, %tx, "Stub: approval submitted");
        Ok(tx)
    }

    async fn wait_mined(&self, tx: &TxHandle) -> Result<(), ExecError> {
        self.record(LedgerCall::WaitMined { tx: *tx });

        let gate = read(&self.mining_gate).clone();
        if let Some(gate) = gate {
            let _ = gate.acquire().await;
        }

        let (key, value) = write(&self.pending)
            .remove(&tx.hash)
            .ok_or_else(|| ExecError::ApprovalFailed(format!("Unknown transaction {}", tx)))?;

        if read(&self.reverted_approvals).contains(&key) {
            return Err(ExecError::ApprovalFailed(format!(
                "Simulated revert of {} for {}",
                tx, key
            )));
        }

        self.set_allowance(key, value);
        Ok(())
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Tests
// =============================================================================
