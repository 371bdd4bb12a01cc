//! Sweep runner - drives pending deposits through decision and execution
//!
//! One sweep at a time: a tick that fires while the previous sweep is
//! still in flight is skipped, and deposits inside a sweep are processed
//! sequentially so only one operation from the delegated key is ever in
//! flight.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::agent::TradingAgent;
use crate::amount::{from_raw_amount, to_raw_amount};
use crate::deposit::{Deposit, DepositStore, DepositTransition};
use crate::error::AgentError;
use crate::reconciler::SubmissionReconciler;

/// What one sweep pass did, for logging and tests.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SweepReport {
    pub skipped: bool,
    pub processed: usize,
    pub completed: usize,
    pub requeued: usize,
    pub failed: usize,
    pub awaiting_finality: usize,
}

pub struct SweepRunner {
    agent: Arc<TradingAgent>,
    deposits: Arc<dyn DepositStore>,
    stable_decimals: u8,
    gold_decimals: u8,
    in_flight: tokio::sync::Mutex<()>,
}

impl SweepRunner {
    pub fn new(
        agent: Arc<TradingAgent>,
        deposits: Arc<dyn DepositStore>,
        stable_decimals: u8,
        gold_decimals: u8,
    ) -> Self {
        Self {
            agent,
            deposits,
            stable_decimals,
            gold_decimals,
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    /// Run one sweep pass over the pending deposits.
    pub async fn sweep_once(&self) -> SweepReport {
        let _guard = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Previous sweep still in flight, skipping tick");
                return SweepReport {
                    skipped: true,
                    ..SweepReport::default()
                };
            }
        };

        let batch = self.deposits.sweepable().await;
        if batch.is_empty() {
            return SweepReport::default();
        }

        info!("Sweep picked up {} pending deposit(s)", batch.len());
        let mut report = SweepReport::default();

        for deposit in batch {
            report.processed += 1;
            match self.process(deposit).await {
                ProcessedAs::Completed => report.completed += 1,
                ProcessedAs::Requeued => report.requeued += 1,
                ProcessedAs::Failed => report.failed += 1,
                ProcessedAs::AwaitingFinality => report.awaiting_finality += 1,
                ProcessedAs::Skipped => {}
            }
        }

        info!(
            "Sweep done: {} processed, {} completed, {} waiting, {} failed, {} reconciling",
            report.processed,
            report.completed,
            report.requeued,
            report.failed,
            report.awaiting_finality
        );
        report
    }

    async fn process(&self, deposit: Deposit) -> ProcessedAs {
        let id = deposit.deposit_id;

        // Claim the deposit. A failure here means it is no longer pending
        // (terminal, or claimed elsewhere) and must not be touched again.
        if self
            .deposits
            .transition(id, DepositTransition::BeginAnalysis)
            .await
            .is_err()
        {
            debug!("Deposit {} no longer pending, skipping", id);
            return ProcessedAs::Skipped;
        }

        let amount_raw = match to_raw_amount(deposit.amount, self.stable_decimals) {
            Ok(raw) => raw,
            Err(e) => {
                // The recorded amount itself can never execute.
                return self
                    .fail(id, format!("unprocessable deposit amount: {}", e))
                    .await;
            }
        };

        let outcome = match self
            .agent
            .monitor_and_trade(&deposit.wallet_address, amount_raw)
            .await
        {
            Ok(outcome) => outcome,
            Err(AgentError::OracleUnavailable(reason)) => {
                // Recoverable: no market data this pass, try again on the
                // next sweep.
                warn!("Deposit {}: oracle unavailable ({}), re-queued", id, reason);
                return self.requeue(id, None).await;
            }
            Err(e) => {
                return self.fail(id, e.to_string()).await;
            }
        };

        let decision = outcome.decision;
        match outcome.execution {
            None => {
                // WAIT, or BUY below the confidence gate.
                self.requeue(id, Some(decision)).await
            }
            Some(Ok(receipt)) => {
                let gold_received = receipt.gold_delta.max(0) as u128;
                let gold_ui = match from_raw_amount(gold_received, self.gold_decimals) {
                    Ok(ui) => ui,
                    Err(e) => {
                        return self
                            .fail(id, format!("unrepresentable gold amount: {}", e))
                            .await
                    }
                };

                match self
                    .deposits
                    .transition(
                        id,
                        DepositTransition::Complete {
                            decision: Some(decision),
                            gold_received: gold_ui,
                            tx_hash: receipt.tx_ref,
                        },
                    )
                    .await
                {
                    Ok(_) => ProcessedAs::Completed,
                    Err(e) => {
                        error!("Deposit {}: completion transition rejected: {}", id, e);
                        ProcessedAs::Skipped
                    }
                }
            }
            Some(Err(AgentError::NoActiveCapability(account))) => {
                // A future sweep may find a freshly issued capability.
                info!(
                    "Deposit {}: no active capability for {}, re-queued",
                    id, account
                );
                self.requeue(id, Some(decision)).await
            }
            Some(Err(AgentError::InsufficientBalance {
                available, needed, ..
            })) => {
                if available == 0 {
                    // Structural: the deposited funds never arrived.
                    self.fail(
                        id,
                        format!("deposited funds not present on-chain (need {})", needed),
                    )
                    .await
                } else {
                    // Transient shortfall (e.g. another deposit spent
                    // first); eligible again next sweep.
                    info!(
                        "Deposit {}: balance {} below {} this pass, re-queued",
                        id, available, needed
                    );
                    self.requeue(id, Some(decision)).await
                }
            }
            Some(Err(AgentError::ExecutionTimedOut(op_ref))) => {
                // Ambiguous outcome: neither completed nor failed until
                // the ledger answers.
                warn!("Deposit {}: awaiting finality of {}", id, op_ref);
                match self
                    .deposits
                    .transition(id, DepositTransition::AwaitFinality { decision, op_ref })
                    .await
                {
                    Ok(_) => ProcessedAs::AwaitingFinality,
                    Err(e) => {
                        error!("Deposit {}: await-finality transition rejected: {}", id, e);
                        ProcessedAs::Skipped
                    }
                }
            }
            Some(Err(e)) => self.fail(id, e.to_string()).await,
        }
    }

    async fn requeue(
        &self,
        id: uuid::Uuid,
        decision: Option<crate::decision::TradeDecision>,
    ) -> ProcessedAs {
        match self
            .deposits
            .transition(id, DepositTransition::Requeue { decision })
            .await
        {
            Ok(_) => ProcessedAs::Requeued,
            Err(e) => {
                error!("Deposit {}: requeue transition rejected: {}", id, e);
                ProcessedAs::Skipped
            }
        }
    }

    async fn fail(&self, id: uuid::Uuid, reason: String) -> ProcessedAs {
        error!("Deposit {} failed: {}", id, reason);
        match self
            .deposits
            .transition(id, DepositTransition::Fail { reason })
            .await
        {
            Ok(_) => ProcessedAs::Failed,
            Err(e) => {
                error!("Deposit {}: fail transition rejected: {}", id, e);
                ProcessedAs::Skipped
            }
        }
    }
}

enum ProcessedAs {
    Completed,
    Requeued,
    Failed,
    AwaitingFinality,
    Skipped,
}

/// Long-running loop: periodic sweeps plus periodic reconciliation of
/// operations whose finality was never observed.
pub struct AgentRuntime {
    pub sweeper: Arc<SweepRunner>,
    pub reconciler: Arc<SubmissionReconciler>,
    pub sweep_interval: Duration,
    pub reconcile_interval: Duration,
}

impl AgentRuntime {
    pub async fn run(self) -> anyhow::Result<()> {
        info!(
            "Agent runtime starting (sweep every {:?}, reconcile every {:?})",
            self.sweep_interval, self.reconcile_interval
        );

        let mut sweep_tick = interval(self.sweep_interval);
        let mut reconcile_tick = interval(self.reconcile_interval);

        loop {
            tokio::select! {
                _ = sweep_tick.tick() => {
                    self.sweeper.sweep_once().await;
                }
                _ = reconcile_tick.tick() => {
                    if let Err(e) = self.reconciler.reconcile_once().await {
                        error!("Reconciliation error: {}", e);
                    }
                }
            }
        }
    }
}
