//! Allowance resolver: memoizing, single-flight gate around the ledger.
//!
//! Every (owner, token) key is resolved at most once per resolver. The first
//! request for a key inserts a pending entry and spawns the on-chain work;
//! every later request for the same key waits on that entry.
//!
//! # Flow (first request for a key)
//!
//! 1. Insert pending entry (single critical section with the lookup)
//! 2. Query the allowance (retried on transient errors)
//! 3. Below threshold: submit approval and wait until it is mined
//! 4. Publish the value or error to every waiter
//!
//! Resolution is terminal. A failed key stays failed for the lifetime of
//! the resolver.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, info};

use massive_domain::{Address, AllowanceKey, U256};

use crate::error::{ExecError, ExecResult};
use crate::ports::LedgerPort;
use crate::retry::RetryPolicy;

/// Largest representable allowance, granted by unlimited approvals.
pub fn unlimited_allowance() -> U256 {
    U256::MAX
}

/// Allowances below this (a quarter of the maximum) trigger an approval.
pub fn approval_threshold() -> U256 {
    U256::MAX >> 2
}

// =============================================================================
// Policy
// =============================================================================

/// When to approve, what to approve, and how patiently to talk to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverPolicy {
    /// Allowances strictly below this are raised
    pub threshold: U256,
    /// Value submitted in approvals
    pub approval_value: U256,
    /// Retry policy for queries and rejected submissions
    pub retry: RetryPolicy,
    /// Bound on each query and each submission
    pub call_timeout: Duration,
    /// Bound on waiting for an approval to be mined
    pub mined_timeout: Duration,
}

impl ResolverPolicy {
    /// Unlimited approvals with the given retry and timeouts.
    pub fn unlimited(retry: RetryPolicy, call_timeout: Duration, mined_timeout: Duration) -> Self {
        Self {
            threshold: approval_threshold(),
            approval_value: unlimited_allowance(),
            retry,
            call_timeout,
            mined_timeout,
        }
    }
}

impl Default for ResolverPolicy {
    fn default() -> Self {
        Self::unlimited(
            RetryPolicy::default(),
            Duration::from_secs(30),
            Duration::from_secs(600),
        )
    }
}

// =============================================================================
// Entry state
// =============================================================================

/// State of one key-table entry.
#[derive(Debug, Clone)]
pub enum AllowanceState {
    /// On-chain work in flight
    Pending,
    /// Terminal value or error
    Resolved(ExecResult<U256>),
}

impl AllowanceState {
    /// Check if the entry reached its terminal state.
    pub fn is_resolved(&self) -> bool {
        matches!(self, AllowanceState::Resolved(_))
    }
}

/// A waiter's view of one key-table entry.
///
/// Any number of handles may wait on the same entry; all observe the same
/// outcome.
#[derive(Debug, Clone)]
pub struct AllowanceHandle {
    key: AllowanceKey,
    receiver: watch::Receiver<AllowanceState>,
}

impl AllowanceHandle {
    /// Key this handle waits on.
    pub fn key(&self) -> AllowanceKey {
        self.key
    }

    /// Check if the outcome is already available.
    pub fn is_resolved(&self) -> bool {
        self.receiver.borrow().is_resolved()
    }

    /// Wait for the entry to resolve.
    ///
    /// Returns `ExecError::Abandoned` if the resolving task died first.
    pub async fn wait(mut self) -> ExecResult<U256> {
        let key = self.key;
        let state = self
            .receiver
            .wait_for(AllowanceState::is_resolved)
            .await
            .map_err(|_| ExecError::Abandoned(key.to_string()))?;

        match &*state {
            AllowanceState::Resolved(outcome) => outcome.clone(),
            AllowanceState::Pending => Err(ExecError::Abandoned(key.to_string())),
        }
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Key table plus the ledger it resolves against.
///
/// The table only grows; entries are never removed or re-resolved.
pub struct AllowanceResolver<L: LedgerPort> {
    /// Ledger for queries and approvals
    ledger: Arc<L>,
    /// Threshold, approval value, retry and timeouts
    policy: ResolverPolicy,
    /// One entry per key ever requested
    entries: Mutex<HashMap<AllowanceKey, watch::Receiver<AllowanceState>>>,
}

impl<L: LedgerPort + 'static> AllowanceResolver<L> {
    /// Create a resolver with an empty key table.
    pub fn new(ledger: Arc<L>, policy: ResolverPolicy) -> Self {
        Self {
            ledger,
            policy,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Get the entry for `key`, creating it and starting its on-chain work if
    /// this is the first request.
    ///
    /// `spender` is only used when the entry is created. Must be called from
    /// within a tokio runtime.
    pub fn request(&self, key: AllowanceKey, spender: Address) -> ExecResult<AllowanceHandle> {
        let receiver = {
            let mut entries = self.entries.lock().map_err(|e| {
                ExecError::KeyTable(format!("Failed to acquire key table lock: {}", e))
            })?;

            if let Some(receiver) = entries.get(&key) {
                return Ok(AllowanceHandle {
                    key,
                    receiver: receiver.clone(),
                });
            }

            let (sender, receiver) = watch::channel(AllowanceState::Pending);
            entries.insert(key, receiver.clone());
            self.spawn_resolution(key, spender, sender);
            receiver
        };

        Ok(AllowanceHandle { key, receiver })
    }

    /// Resolve the allowance for (owner, token), waiting for the outcome.
    pub async fn resolve(&self, owner: Address, token: Address, spender: Address) -> ExecResult<U256> {
        self.request(AllowanceKey::new(owner, token), spender)?
            .wait()
            .await
    }

    /// Outcome for `key` if it has already resolved.
    pub fn cached(&self, key: AllowanceKey) -> Option<ExecResult<U256>> {
        let entries = self.entries.lock().ok()?;
        let state = entries.get(&key)?.borrow().clone();
        match state {
            AllowanceState::Resolved(outcome) => Some(outcome),
            AllowanceState::Pending => None,
        }
    }

    /// Number of keys ever requested.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Check if no key was requested yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Policy this resolver applies.
    pub fn policy(&self) -> &ResolverPolicy {
        &self.policy
    }

    fn spawn_resolution(
        &self,
        key: AllowanceKey,
        spender: Address,
        sender: watch::Sender<AllowanceState>,
    ) {
        let ledger = self.ledger.clone();
        let policy = self.policy;

        debug!(%key, spender = ?spender, "New allowance key");

        tokio::spawn(async move {
            let outcome = populate(ledger.as_ref(), &policy, key, spender).await;
            match &outcome {
                Ok(value) => debug!(%key, %value, "Allowance resolved"),
                Err(e) => error!(%key, error = %e, "Error getting / setting allowance"),
            }
            sender.send_replace(AllowanceState::Resolved(outcome));
        });
    }
}

/// Query, and if needed raise, one allowance.
async fn populate<L: LedgerPort + ?Sized>(
    ledger: &L,
    policy: &ResolverPolicy,
    key: AllowanceKey,
    spender: Address,
) -> ExecResult<U256> {
    let call_timeout = policy.call_timeout;

    let current = policy
        .retry
        .run("allowance query", ExecError::is_transient, move || async move {
            match timeout(call_timeout, ledger.get_allowance(key.owner, key.token, spender)).await {
                Ok(result) => result,
                Err(_) => Err(ExecError::Timeout(format!(
                    "allowance query for {} after {:?}",
                    key, call_timeout
                ))),
            }
        })
        .await?;

    if current >= policy.threshold {
        return Ok(current);
    }

    info!(%key, %current, "Allowance below threshold, submitting approval");

    let approval_value = policy.approval_value;
    let tx = policy
        .retry
        .run(
            "approval submission",
            |e: &ExecError| matches!(e, ExecError::ApprovalRejected(_)),
            move || async move {
                match timeout(
                    call_timeout,
                    ledger.submit_approval(key.owner, key.token, spender, approval_value),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ExecError::Timeout(format!(
                        "approval submission for {} after {:?}",
                        key, call_timeout
                    ))),
                }
            },
        )
        .await?;

    info!(%key, %tx, "Approval submitted, waiting for it to be mined");

    match timeout(policy.mined_timeout, ledger.wait_mined(&tx)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(ExecError::Timeout(format!(
                "approval {} for {} not mined after {:?}",
                tx, key, policy.mined_timeout
            )))
        }
    }

    info!(%key, %tx, "Approval mined");
    Ok(approval_value)
}

// =============================================================================
// Tests
// =============================================================================
