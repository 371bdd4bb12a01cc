//! Failure taxonomy for the trading agent

use crate::address::Address;

/// Errors surfaced by the trading agent and its execution core.
///
/// The split matters to the sweep: oracle and decision failures are
/// absorbed locally, capability/balance failures abort before any
/// submission, and `ExecutionTimedOut` is deliberately distinct from
/// `ExecutionFailed` because a timed-out operation may still land and must
/// not be assumed reverted.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("price oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("no active capability for account {0}")]
    NoActiveCapability(Address),

    #[error("balance read failed: {0}")]
    BalanceReadFailed(String),

    #[error("insufficient {asset} balance: need {needed}, have {available}")]
    InsufficientBalance {
        asset: &'static str,
        needed: u128,
        available: u128,
    },

    #[error("capability scope does not authorize step: {0}")]
    ScopeViolation(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("execution timed out awaiting finality of {0}")]
    ExecutionTimedOut(String),

    #[error("atomic batch partially applied ({0}); ledger state inconsistent")]
    PartialApplication(String),
}
