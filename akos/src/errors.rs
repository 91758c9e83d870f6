//! Kernel error types.
//!
//! Governance rejections and escalations are *not* errors; they are ordinary
//! decision outcomes carried on `GovernanceDecision`. The variants here cover
//! the failures that propagate as `Result`s: the execution pre-guard, storage
//! faults, and integrity violations found on demand by chain verification.

use thiserror::Error;

use crate::types::GovernanceVerdict;

pub type KernelResult<T> = Result<T, KernelError>;

#[derive(Debug, Error)]
pub enum KernelError {
    /// The dispatcher was handed a proposal without an approved verdict.
    /// Fatal to the call; never retried.
    #[error("cannot execute proposal {proposal_id}: governance verdict is {verdict:?}, not approved")]
    UnapprovedExecution {
        proposal_id: String,
        verdict: GovernanceVerdict,
    },

    #[error("intent not found: {0}")]
    IntentNotFound(String),

    #[error("escalation not found or already resolved: {0}")]
    EscalationNotFound(String),

    /// Ledger verification found a broken signature or chain link.
    #[error("lineage chain integrity failure: {0}")]
    IntegrityFailure(String),

    #[error("ledger storage error: {0}")]
    Ledger(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for KernelError {
    fn from(e: rusqlite::Error) -> Self {
        KernelError::Ledger(e.to_string())
    }
}
