//! Submission reconciliation - settle deposits whose finality was missed
//!
//! A timed-out submission may still have landed. This component asks the
//! ledger for the recorded outcome of each such operation and transitions
//! the deposit only on definitive evidence; an operation the ledger does
//! not know about yet stays parked.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::address::Address;
use crate::amount::from_raw_amount;
use crate::deposit::{Deposit, DepositStore, DepositTransition};
use crate::ledger::{Ledger, LedgerReceipt, ReceiptStatus};

/// Summary of one reconciliation pass
#[derive(Debug, Default, Clone)]
pub struct ReconcileReport {
    pub inspected: usize,
    pub completed: usize,
    pub failed: usize,
    pub still_pending: usize,
}

pub struct SubmissionReconciler {
    ledger: Arc<dyn Ledger>,
    deposits: Arc<dyn DepositStore>,
    gold_token: Address,
    gold_decimals: u8,
}

impl SubmissionReconciler {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        deposits: Arc<dyn DepositStore>,
        gold_token: Address,
        gold_decimals: u8,
    ) -> Self {
        Self {
            ledger,
            deposits,
            gold_token,
            gold_decimals,
        }
    }

    pub async fn reconcile_once(&self) -> anyhow::Result<ReconcileReport> {
        let waiting = self.deposits.awaiting_finality().await;
        let mut report = ReconcileReport::default();

        if waiting.is_empty() {
            return Ok(report);
        }

        info!("Reconciling {} deposit(s) awaiting finality", waiting.len());

        for deposit in waiting {
            report.inspected += 1;

            let Some(op_ref) = deposit.tx_hash.clone() else {
                continue;
            };

            match self.ledger.receipt_status(&op_ref).await {
                Ok(Some(receipt)) => self.settle(&deposit, &op_ref, receipt, &mut report).await,
                Ok(None) => {
                    debug!("Operation {} still unknown to the ledger", op_ref);
                    report.still_pending += 1;
                }
                Err(e) => {
                    warn!("Reconciliation read failed for {}: {}", op_ref, e);
                    report.still_pending += 1;
                }
            }
        }

        info!(
            "Reconciliation done: {} inspected, {} completed, {} failed, {} still pending",
            report.inspected, report.completed, report.failed, report.still_pending
        );
        Ok(report)
    }

    async fn settle(
        &self,
        deposit: &Deposit,
        op_ref: &str,
        receipt: LedgerReceipt,
        report: &mut ReconcileReport,
    ) {
        match receipt.status {
            ReceiptStatus::Applied => {
                // Realized gold comes from the operation's emitted
                // transfer events; the pre-trade balance is long gone.
                let gold_raw: u128 = receipt
                    .events
                    .iter()
                    .filter(|e| e.token == self.gold_token && e.to == deposit.wallet_address)
                    .map(|e| e.amount)
                    .sum();

                let gold_ui = match from_raw_amount(gold_raw, self.gold_decimals) {
                    Ok(ui) => ui,
                    Err(e) => {
                        warn!("Unrepresentable gold amount in {}: {}", op_ref, e);
                        report.still_pending += 1;
                        return;
                    }
                };

                match self
                    .deposits
                    .transition(
                        deposit.deposit_id,
                        DepositTransition::Complete {
                            decision: None,
                            gold_received: gold_ui,
                            tx_hash: op_ref.to_string(),
                        },
                    )
                    .await
                {
                    Ok(_) => {
                        info!(
                            "Deposit {} settled as completed via {}",
                            deposit.deposit_id, op_ref
                        );
                        report.completed += 1;
                    }
                    Err(e) => warn!(
                        "Deposit {}: reconcile completion rejected: {}",
                        deposit.deposit_id, e
                    ),
                }
            }
            ReceiptStatus::Reverted { reason } => {
                match self
                    .deposits
                    .transition(
                        deposit.deposit_id,
                        DepositTransition::Fail {
                            reason: format!("operation {} reverted: {}", op_ref, reason),
                        },
                    )
                    .await
                {
                    Ok(_) => {
                        info!(
                            "Deposit {} settled as failed via {}",
                            deposit.deposit_id, op_ref
                        );
                        report.failed += 1;
                    }
                    Err(e) => warn!(
                        "Deposit {}: reconcile failure rejected: {}",
                        deposit.deposit_id, e
                    ),
                }
            }
        }
    }
}
