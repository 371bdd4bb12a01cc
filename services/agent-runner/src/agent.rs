//! Trading agent execution core
//!
//! Authenticates as the delegated session key and drives the atomic
//! approve+swap path through the ledger. Every check that can abort a
//! trade runs before the batch is submitted; after submission the only
//! recourse is awaiting the outcome.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use oracle_feed::MarketDataSource;
use rust_decimal::Decimal;

use crate::address::Address;
use crate::amount::from_raw_amount;
use crate::capability::{SEL_APPROVE, SEL_BUY_GOLD, SEL_SELL_GOLD};
use crate::config::Contracts;
use crate::decision::{DecisionEngine, TradeDecision};
use crate::error::AgentError;
use crate::ledger::{batch_digest, CallStep, Ledger, ReceiptStatus, SignedBatch, SignerContext};
use crate::store::{CapabilityRecord, CapabilityStore};

/// Read-through balance snapshot for one account. Valid for a single
/// decision cycle only; always re-read before committing to a spend.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Balances {
    pub stable: u128,
    pub gold: u128,
}

/// Outcome of a finalized trade, with realized amounts taken from the
/// post-trade balance delta rather than a price*amount estimate.
#[derive(Debug, Clone, Serialize)]
pub struct TradeReceipt {
    pub tx_ref: String,
    pub stable_delta: i128,
    pub gold_delta: i128,
    pub balances: Balances,
    pub executed_at: DateTime<Utc>,
}

/// Decision plus whatever execution it led to. `execution` is `None` when
/// the decision did not clear the BUY threshold.
pub struct TradeOutcome {
    pub decision: TradeDecision,
    pub execution: Option<Result<TradeReceipt, AgentError>>,
}

pub struct TradingAgent {
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn CapabilityStore>,
    oracle: Arc<dyn MarketDataSource>,
    engine: Arc<DecisionEngine>,
    contracts: Contracts,
    confirm_timeout: Duration,
}

impl TradingAgent {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        store: Arc<dyn CapabilityStore>,
        oracle: Arc<dyn MarketDataSource>,
        engine: Arc<DecisionEngine>,
        contracts: Contracts,
        confirm_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            store,
            oracle,
            engine,
            contracts,
            confirm_timeout,
        }
    }

    /// Current stable/gold balances for an account.
    pub async fn balances(&self, account: &Address) -> Result<Balances, AgentError> {
        let stable = self
            .ledger
            .balance_of(&self.contracts.stable_token.address, account)
            .await
            .map_err(|e| AgentError::BalanceReadFailed(e.to_string()))?;
        let gold = self
            .ledger
            .balance_of(&self.contracts.gold_token.address, account)
            .await
            .map_err(|e| AgentError::BalanceReadFailed(e.to_string()))?;

        Ok(Balances { stable, gold })
    }

    /// Swap `stable_amount` raw stable units into gold through the pool.
    pub async fn buy(&self, account: &Address, stable_amount: u128) -> Result<TradeReceipt, AgentError> {
        let record = self
            .store
            .get(account)
            .await
            .ok_or_else(|| AgentError::NoActiveCapability(account.clone()))?;

        let before = self.balances(account).await?;
        if before.stable < stable_amount {
            // Abort before submission; a call guaranteed to revert is a
            // wasted round-trip.
            return Err(AgentError::InsufficientBalance {
                asset: "stable",
                needed: stable_amount,
                available: before.stable,
            });
        }

        let steps = vec![
            CallStep::call(
                self.contracts.stable_token.address.clone(),
                SEL_APPROVE,
                vec![self.contracts.pool.to_string(), stable_amount.to_string()],
            ),
            CallStep::call(
                self.contracts.pool.clone(),
                SEL_BUY_GOLD,
                vec![stable_amount.to_string()],
            ),
        ];

        info!(
            "BUY {} raw stable for {} via session {}",
            stable_amount, account, record.capability.session_address
        );
        self.execute(account, &record, steps, before).await
    }

    /// Swap `gold_amount` raw gold units back into stable through the pool.
    pub async fn sell(&self, account: &Address, gold_amount: u128) -> Result<TradeReceipt, AgentError> {
        let record = self
            .store
            .get(account)
            .await
            .ok_or_else(|| AgentError::NoActiveCapability(account.clone()))?;

        let before = self.balances(account).await?;
        if before.gold < gold_amount {
            return Err(AgentError::InsufficientBalance {
                asset: "gold",
                needed: gold_amount,
                available: before.gold,
            });
        }

        let steps = vec![
            CallStep::call(
                self.contracts.gold_token.address.clone(),
                SEL_APPROVE,
                vec![self.contracts.pool.to_string(), gold_amount.to_string()],
            ),
            CallStep::call(
                self.contracts.pool.clone(),
                SEL_SELL_GOLD,
                vec![gold_amount.to_string()],
            ),
        ];

        info!(
            "SELL {} raw gold for {} via session {}",
            gold_amount, account, record.capability.session_address
        );
        self.execute(account, &record, steps, before).await
    }

    /// Decision-driven wrapper: snapshot the market, decide, and execute a
    /// buy when the decision clears the confidence gate. Execution errors
    /// are returned inside the outcome so the caller still sees the
    /// decision that led to them.
    pub async fn monitor_and_trade(
        &self,
        account: &Address,
        stable_amount: u128,
    ) -> Result<TradeOutcome, AgentError> {
        let snapshot = self
            .oracle
            .market_snapshot()
            .await
            .map_err(|e| AgentError::OracleUnavailable(e.to_string()))?;

        let ui_amount = from_raw_amount(stable_amount, self.contracts.stable_token.decimals)
            .unwrap_or(Decimal::ZERO);
        let decision = self.engine.decide(&snapshot, ui_amount).await;

        info!(
            "Decision for {}: {} (confidence {}) — {}",
            account, decision.action, decision.confidence, decision.reasoning
        );

        if !self.engine.meets_execution_threshold(&decision) {
            return Ok(TradeOutcome {
                decision,
                execution: None,
            });
        }

        let execution = self.buy(account, stable_amount).await;
        Ok(TradeOutcome {
            decision,
            execution: Some(execution),
        })
    }

    /// Submit a batch through the delegated key and settle the receipt.
    async fn execute(
        &self,
        account: &Address,
        record: &CapabilityRecord,
        steps: Vec<CallStep>,
        before: Balances,
    ) -> Result<TradeReceipt, AgentError> {
        // A step outside the issued scope means issuance and execution
        // disagree; surface it here rather than burning a submission the
        // ledger will reject.
        for step in &steps {
            if !record.capability.scope.authorizes(step) {
                return Err(AgentError::ScopeViolation(format!(
                    "{} on {}",
                    step.selector, step.target
                )));
            }
        }

        let signature = record.signer.sign(&batch_digest(&steps));
        let batch = SignedBatch {
            steps: steps.clone(),
            context: SignerContext::Session {
                account: account.clone(),
                session_address: record.capability.session_address.clone(),
            },
            signature: hex::encode(signature),
        };

        let op_ref = self
            .ledger
            .submit_batch(batch)
            .await
            .map_err(|e| AgentError::ExecutionFailed(e.to_string()))?;

        let receipt = match tokio::time::timeout(
            self.confirm_timeout,
            self.ledger.await_receipt(&op_ref),
        )
        .await
        {
            Err(_) => {
                // The operation may still land; the caller must reconcile,
                // not assume a revert.
                warn!("Operation {} not final within {:?}", op_ref, self.confirm_timeout);
                return Err(AgentError::ExecutionTimedOut(op_ref));
            }
            Ok(Err(e)) => return Err(AgentError::ExecutionFailed(e.to_string())),
            Ok(Ok(receipt)) => receipt,
        };

        match &receipt.status {
            ReceiptStatus::Applied => {
                if receipt.steps_applied != steps.len() {
                    return Err(AgentError::PartialApplication(format!(
                        "{}/{} steps of {}",
                        receipt.steps_applied,
                        steps.len(),
                        op_ref
                    )));
                }
            }
            ReceiptStatus::Reverted { reason } => {
                if receipt.steps_applied != 0 {
                    return Err(AgentError::PartialApplication(format!(
                        "revert of {} left {} steps applied",
                        op_ref, receipt.steps_applied
                    )));
                }
                return Err(AgentError::ExecutionFailed(reason.clone()));
            }
        }

        let after = match self.balances(account).await {
            Ok(b) => b,
            Err(e) => {
                // The batch is final but the realized amounts are not
                // observable right now; hand off to reconciliation.
                warn!("Post-trade balance read failed for {}: {}", op_ref, e);
                return Err(AgentError::ExecutionTimedOut(op_ref));
            }
        };

        let receipt = TradeReceipt {
            tx_ref: receipt.op_ref,
            stable_delta: after.stable as i128 - before.stable as i128,
            gold_delta: after.gold as i128 - before.gold as i128,
            balances: after,
            executed_at: Utc::now(),
        };

        info!(
            "Trade {} finalized: stable {:+}, gold {:+}",
            receipt.tx_ref, receipt.stable_delta, receipt.gold_delta
        );
        Ok(receipt)
    }
}
