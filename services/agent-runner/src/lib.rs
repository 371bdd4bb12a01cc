//! Agent Runner Library
//!
//! Scoped-delegation trading agent: a user's smart account grants a
//! time-boxed, allow-listed signing capability to this process, and a
//! periodic sweep decides when to convert pending stablecoin deposits
//! into tokenized gold through an atomic approve+swap batch.

pub mod address;
pub mod agent;
pub mod amount;
pub mod capability;
pub mod config;
pub mod decision;
pub mod deposit;
pub mod error;
pub mod issuer;
pub mod ledger;
pub mod reconciler;
pub mod runner;
pub mod signer;
pub mod store;

// Re-export main types for convenience
pub use address::Address;
pub use agent::{Balances, TradeOutcome, TradeReceipt, TradingAgent};
pub use capability::{Capability, CapabilityScope, CapabilityStatus, Permission};
pub use config::{Config, Contracts};
pub use decision::{DecisionEngine, DecisionThresholds, TradeAction, TradeDecision};
pub use deposit::{Deposit, DepositStatus, DepositStore, InMemoryDepositStore};
pub use error::AgentError;
pub use issuer::CapabilityIssuer;
pub use ledger::{CallStep, Ledger, LedgerReceipt, SignedBatch, SignerContext};
pub use reconciler::SubmissionReconciler;
pub use runner::{AgentRuntime, SweepRunner};
pub use signer::{LocalKeySigner, Signer};
pub use store::{CapabilityRecord, CapabilityStore, InMemoryCapabilityStore};
