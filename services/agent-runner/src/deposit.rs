//! Deposit lifecycle tracking
//!
//! The coordination point between off-chain intent and on-chain
//! execution. Deposits move `pending -> analyzing -> completed | failed`;
//! terminal states never transition again, and a WAIT decision re-queues
//! the deposit as pending with the decision attached rather than parking
//! it in a separate state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::address::Address;
use crate::decision::TradeDecision;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    Pending,
    Analyzing,
    Completed,
    Failed,
}

impl DepositStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DepositStatus::Completed | DepositStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deposit {
    pub deposit_id: Uuid,
    pub wallet_address: Address,
    /// Deposited stable amount, UI units
    pub amount: Decimal,
    pub status: DepositStatus,
    /// Transaction reference: the completed trade, or the in-flight
    /// operation a timed-out submission is waiting on.
    pub tx_hash: Option<String>,
    pub ai_analysis: Option<TradeDecision>,
    /// Realized gold, UI units, from the post-trade balance delta
    pub gold_received: Option<Decimal>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// State transitions the tracker accepts. Everything else is rejected.
#[derive(Debug, Clone)]
pub enum DepositTransition {
    /// pending -> analyzing: a sweep picked the deposit up
    BeginAnalysis,
    /// analyzing -> pending: WAIT decision, confidence below threshold,
    /// or a recoverable condition (missing capability, transient
    /// shortfall). The deposit stays eligible for the next sweep.
    Requeue { decision: Option<TradeDecision> },
    /// analyzing (stays): submission outcome ambiguous; record the
    /// operation reference for reconciliation
    AwaitFinality {
        decision: TradeDecision,
        op_ref: String,
    },
    /// analyzing -> completed: trade finalized
    Complete {
        decision: Option<TradeDecision>,
        gold_received: Decimal,
        tx_hash: String,
    },
    /// pending|analyzing -> failed
    Fail { reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("deposit not found: {0}")]
    NotFound(Uuid),

    #[error("invalid transition from {from:?}: {attempted}")]
    Invalid {
        from: DepositStatus,
        attempted: &'static str,
    },
}

#[async_trait]
pub trait DepositStore: Send + Sync {
    async fn create(&self, wallet: Address, amount: Decimal) -> Deposit;

    async fn get(&self, id: Uuid) -> Option<Deposit>;

    async fn list_for_wallet(&self, wallet: &Address) -> Vec<Deposit>;

    /// Deposits a sweep should pick up, oldest first. Each deposit
    /// appears at most once per call.
    async fn sweepable(&self) -> Vec<Deposit>;

    /// Analyzing deposits holding an operation reference whose outcome is
    /// still unknown — the reconciler's work queue.
    async fn awaiting_finality(&self) -> Vec<Deposit>;

    async fn transition(
        &self,
        id: Uuid,
        transition: DepositTransition,
    ) -> Result<Deposit, TransitionError>;
}

/// In-memory tracker behind the store trait, swappable for a persistent
/// backend.
#[derive(Default)]
pub struct InMemoryDepositStore {
    deposits: RwLock<HashMap<Uuid, Deposit>>,
}

impl InMemoryDepositStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(
        deposit: &mut Deposit,
        transition: DepositTransition,
    ) -> Result<(), TransitionError> {
        let from = deposit.status;
        match transition {
            DepositTransition::BeginAnalysis => {
                if from != DepositStatus::Pending {
                    return Err(TransitionError::Invalid {
                        from,
                        attempted: "begin_analysis",
                    });
                }
                deposit.status = DepositStatus::Analyzing;
            }
            DepositTransition::Requeue { decision } => {
                if from != DepositStatus::Analyzing {
                    return Err(TransitionError::Invalid {
                        from,
                        attempted: "requeue",
                    });
                }
                deposit.status = DepositStatus::Pending;
                if decision.is_some() {
                    deposit.ai_analysis = decision;
                }
            }
            DepositTransition::AwaitFinality { decision, op_ref } => {
                if from != DepositStatus::Analyzing {
                    return Err(TransitionError::Invalid {
                        from,
                        attempted: "await_finality",
                    });
                }
                deposit.ai_analysis = Some(decision);
                deposit.tx_hash = Some(op_ref);
            }
            DepositTransition::Complete {
                decision,
                gold_received,
                tx_hash,
            } => {
                if from != DepositStatus::Analyzing {
                    return Err(TransitionError::Invalid {
                        from,
                        attempted: "complete",
                    });
                }
                deposit.status = DepositStatus::Completed;
                if decision.is_some() {
                    deposit.ai_analysis = decision;
                }
                deposit.gold_received = Some(gold_received);
                deposit.tx_hash = Some(tx_hash);
            }
            DepositTransition::Fail { reason } => {
                if from.is_terminal() {
                    return Err(TransitionError::Invalid {
                        from,
                        attempted: "fail",
                    });
                }
                deposit.status = DepositStatus::Failed;
                deposit.failure_reason = Some(reason);
            }
        }

        deposit.updated_at = Utc::now();
        debug!(
            "Deposit {} {:?} -> {:?}",
            deposit.deposit_id, from, deposit.status
        );
        Ok(())
    }
}

#[async_trait]
impl DepositStore for InMemoryDepositStore {
    async fn create(&self, wallet: Address, amount: Decimal) -> Deposit {
        let now = Utc::now();
        let deposit = Deposit {
            deposit_id: Uuid::new_v4(),
            wallet_address: wallet,
            amount,
            status: DepositStatus::Pending,
            tx_hash: None,
            ai_analysis: None,
            gold_received: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };

        self.deposits
            .write()
            .await
            .insert(deposit.deposit_id, deposit.clone());
        deposit
    }

    async fn get(&self, id: Uuid) -> Option<Deposit> {
        self.deposits.read().await.get(&id).cloned()
    }

    async fn list_for_wallet(&self, wallet: &Address) -> Vec<Deposit> {
        let deposits = self.deposits.read().await;
        let mut out: Vec<Deposit> = deposits
            .values()
            .filter(|d| &d.wallet_address == wallet)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    async fn sweepable(&self) -> Vec<Deposit> {
        let deposits = self.deposits.read().await;
        let mut out: Vec<Deposit> = deposits
            .values()
            .filter(|d| d.status == DepositStatus::Pending)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }

    async fn awaiting_finality(&self) -> Vec<Deposit> {
        let deposits = self.deposits.read().await;
        let mut out: Vec<Deposit> = deposits
            .values()
            .filter(|d| d.status == DepositStatus::Analyzing && d.tx_hash.is_some())
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }

    async fn transition(
        &self,
        id: Uuid,
        transition: DepositTransition,
    ) -> Result<Deposit, TransitionError> {
        let mut deposits = self.deposits.write().await;
        let deposit = deposits.get_mut(&id).ok_or(TransitionError::NotFound(id))?;
        Self::apply(deposit, transition)?;
        Ok(deposit.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{TradeAction, TradeDecision};

    fn wallet() -> Address {
        "0x53b8e9e6513a2e7a4d23f8f9bfe3f5985c9788e4".parse().unwrap()
    }

    fn decision(action: TradeAction) -> TradeDecision {
        TradeDecision {
            action,
            confidence: 80,
            reasoning: "test".into(),
            current_price: 2400.0,
            price_target: 2352.0,
            decided_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_happy_path_transitions() {
        let store = InMemoryDepositStore::new();
        let d = store.create(wallet(), Decimal::from(1000)).await;
        assert_eq!(d.status, DepositStatus::Pending);

        store
            .transition(d.deposit_id, DepositTransition::BeginAnalysis)
            .await
            .unwrap();

        let done = store
            .transition(
                d.deposit_id,
                DepositTransition::Complete {
                    decision: Some(decision(TradeAction::Buy)),
                    gold_received: Decimal::from_str_exact("0.41").unwrap(),
                    tx_hash: "op-1".into(),
                },
            )
            .await
            .unwrap();

        assert_eq!(done.status, DepositStatus::Completed);
        assert_eq!(done.tx_hash.as_deref(), Some("op-1"));
        assert!(done.gold_received.is_some());
    }

    #[tokio::test]
    async fn test_requeue_keeps_decision_visible() {
        let store = InMemoryDepositStore::new();
        let d = store.create(wallet(), Decimal::from(1000)).await;

        store
            .transition(d.deposit_id, DepositTransition::BeginAnalysis)
            .await
            .unwrap();
        let requeued = store
            .transition(
                d.deposit_id,
                DepositTransition::Requeue {
                    decision: Some(decision(TradeAction::Wait)),
                },
            )
            .await
            .unwrap();

        // Back to pending, but the user can still see why nothing traded.
        assert_eq!(requeued.status, DepositStatus::Pending);
        assert_eq!(
            requeued.ai_analysis.as_ref().map(|a| a.action),
            Some(TradeAction::Wait)
        );

        // Eligible for the next sweep again.
        assert_eq!(store.sweepable().await.len(), 1);
    }

    #[tokio::test]
    async fn test_requeue_without_decision_preserves_previous_analysis() {
        let store = InMemoryDepositStore::new();
        let d = store.create(wallet(), Decimal::from(1000)).await;

        store
            .transition(d.deposit_id, DepositTransition::BeginAnalysis)
            .await
            .unwrap();
        store
            .transition(
                d.deposit_id,
                DepositTransition::Requeue {
                    decision: Some(decision(TradeAction::Wait)),
                },
            )
            .await
            .unwrap();

        store
            .transition(d.deposit_id, DepositTransition::BeginAnalysis)
            .await
            .unwrap();
        let requeued = store
            .transition(d.deposit_id, DepositTransition::Requeue { decision: None })
            .await
            .unwrap();

        assert!(requeued.ai_analysis.is_some());
    }

    #[tokio::test]
    async fn test_terminal_states_reject_transitions() {
        let store = InMemoryDepositStore::new();
        let d = store.create(wallet(), Decimal::from(1000)).await;

        store
            .transition(d.deposit_id, DepositTransition::BeginAnalysis)
            .await
            .unwrap();
        store
            .transition(
                d.deposit_id,
                DepositTransition::Fail {
                    reason: "execution reverted".into(),
                },
            )
            .await
            .unwrap();

        // Failed is terminal: no re-analysis, no late completion.
        assert!(matches!(
            store
                .transition(d.deposit_id, DepositTransition::BeginAnalysis)
                .await,
            Err(TransitionError::Invalid { .. })
        ));
        assert!(matches!(
            store
                .transition(
                    d.deposit_id,
                    DepositTransition::Fail {
                        reason: "again".into()
                    }
                )
                .await,
            Err(TransitionError::Invalid { .. })
        ));

        let stored = store.get(d.deposit_id).await.unwrap();
        assert_eq!(stored.failure_reason.as_deref(), Some("execution reverted"));
    }

    #[tokio::test]
    async fn test_complete_requires_analyzing() {
        let store = InMemoryDepositStore::new();
        let d = store.create(wallet(), Decimal::from(1000)).await;

        assert!(matches!(
            store
                .transition(
                    d.deposit_id,
                    DepositTransition::Complete {
                        decision: None,
                        gold_received: Decimal::ONE,
                        tx_hash: "op-2".into(),
                    }
                )
                .await,
            Err(TransitionError::Invalid { .. })
        ));
    }

    #[tokio::test]
    async fn test_await_finality_parks_deposit_for_reconciliation() {
        let store = InMemoryDepositStore::new();
        let d = store.create(wallet(), Decimal::from(1000)).await;

        store
            .transition(d.deposit_id, DepositTransition::BeginAnalysis)
            .await
            .unwrap();
        store
            .transition(
                d.deposit_id,
                DepositTransition::AwaitFinality {
                    decision: decision(TradeAction::Buy),
                    op_ref: "op-3".into(),
                },
            )
            .await
            .unwrap();

        // Not sweepable (still analyzing), but visible to the reconciler.
        assert!(store.sweepable().await.is_empty());
        let waiting = store.awaiting_finality().await;
        assert_eq!(waiting.len(), 1);
        assert_eq!(waiting[0].tx_hash.as_deref(), Some("op-3"));
    }
}
