//! Abstract ledger submission interface
//!
//! The execution core depends only on this batch-submit/await-receipt
//! contract plus token balance reads; any ledger that can install a
//! permission validator and apply a batch atomically can sit behind it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::address::Address;
use crate::capability::Capability;

/// One step of an atomic batch: target contract, native value, call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallStep {
    pub target: Address,
    pub value: u128,
    pub selector: String,
    pub args: Vec<String>,
}

impl CallStep {
    pub fn call(target: Address, selector: &str, args: Vec<String>) -> Self {
        Self {
            target,
            value: 0,
            selector: selector.to_string(),
            args,
        }
    }
}

/// Which authority signs a batch: the account's primary key, or an
/// installed capability's session key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SignerContext {
    Primary { account: Address },
    Session { account: Address, session_address: Address },
}

impl SignerContext {
    pub fn account(&self) -> &Address {
        match self {
            SignerContext::Primary { account } => account,
            SignerContext::Session { account, .. } => account,
        }
    }
}

/// A batch of steps plus the signature that authorizes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedBatch {
    pub steps: Vec<CallStep>,
    pub context: SignerContext,
    /// Hex signature over [`batch_digest`] of the steps.
    pub signature: String,
}

/// Capability installation request, signed once by the primary key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedInstall {
    pub capability: Capability,
    /// Hex signature over [`install_digest`] of the capability.
    pub signature: String,
}

/// Token movement recorded by an applied operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferEvent {
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub amount: u128,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ReceiptStatus {
    Applied,
    Reverted { reason: String },
}

/// Finalized outcome of a submitted operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub op_ref: String,
    pub status: ReceiptStatus,
    /// Number of batch steps the ledger reports as applied. Anything
    /// between zero and the full batch is a consistency violation the
    /// caller must surface.
    pub steps_applied: usize,
    pub events: Vec<TransferEvent>,
}

/// Error types for ledger access
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger unreachable: {0}")]
    Unreachable(String),

    #[error("operation rejected: {0}")]
    Rejected(String),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),
}

/// Digest a batch for signing.
pub fn batch_digest(steps: &[CallStep]) -> [u8; 32] {
    let encoded = serde_json::to_vec(steps).unwrap_or_default();
    Sha256::digest(&encoded).into()
}

/// Digest a capability for the installation signature.
pub fn install_digest(capability: &Capability) -> [u8; 32] {
    let encoded = serde_json::to_vec(capability).unwrap_or_default();
    Sha256::digest(&encoded).into()
}

/// Ledger submission interface
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Read-through token balance for an account.
    async fn balance_of(&self, token: &Address, account: &Address) -> Result<u128, LedgerError>;

    /// Submit an atomic batch. Returns an operation reference immediately;
    /// the outcome arrives via [`Ledger::await_receipt`].
    async fn submit_batch(&self, batch: SignedBatch) -> Result<String, LedgerError>;

    /// Block until the operation reaches finality and return its receipt.
    /// Callers bound this with their own timeout.
    async fn await_receipt(&self, op_ref: &str) -> Result<LedgerReceipt, LedgerError>;

    /// Non-blocking lookup of an operation's outcome, if known yet.
    /// Used for reconciliation of operations whose await timed out.
    async fn receipt_status(&self, op_ref: &str) -> Result<Option<LedgerReceipt>, LedgerError>;

    /// Install a capability's permission validator on the owning account.
    /// Atomic: either the capability becomes active on-chain or the
    /// account's authorization state is unchanged.
    async fn install_capability(&self, install: SignedInstall) -> Result<LedgerReceipt, LedgerError>;
}

/// HTTP client for a ledger node exposing the batch-submit contract
pub struct HttpLedgerClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLedgerClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, LedgerError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LedgerError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LedgerError::Rejected(format!("{} - {}", status, text)));
        }

        response
            .json()
            .await
            .map_err(|e| LedgerError::Unreachable(format!("bad response body: {}", e)))
    }
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    op_ref: String,
}

#[async_trait]
impl Ledger for HttpLedgerClient {
    async fn balance_of(&self, token: &Address, account: &Address) -> Result<u128, LedgerError> {
        let url = format!("{}/v1/tokens/{}/balances/{}", self.base_url, token, account);
        let resp: BalanceResponse = self.get_json(&url).await?;
        resp.balance
            .parse()
            .map_err(|_| LedgerError::Unreachable(format!("bad balance value: {}", resp.balance)))
    }

    async fn submit_batch(&self, batch: SignedBatch) -> Result<String, LedgerError> {
        let url = format!("{}/v1/batches", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&batch)
            .send()
            .await
            .map_err(|e| LedgerError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LedgerError::Rejected(format!("{} - {}", status, text)));
        }

        let resp: SubmitResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Unreachable(format!("bad submit response: {}", e)))?;
        Ok(resp.op_ref)
    }

    async fn await_receipt(&self, op_ref: &str) -> Result<LedgerReceipt, LedgerError> {
        // Poll until the node reports finality; the caller owns the
        // overall deadline.
        let url = format!("{}/v1/batches/{}", self.base_url, op_ref);
        loop {
            let receipt: Option<LedgerReceipt> = self.get_json(&url).await?;
            if let Some(receipt) = receipt {
                return Ok(receipt);
            }
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        }
    }

    async fn receipt_status(&self, op_ref: &str) -> Result<Option<LedgerReceipt>, LedgerError> {
        let url = format!("{}/v1/batches/{}", self.base_url, op_ref);
        self.get_json(&url).await
    }

    async fn install_capability(&self, install: SignedInstall) -> Result<LedgerReceipt, LedgerError> {
        let url = format!(
            "{}/v1/accounts/{}/capabilities",
            self.base_url,
            install.capability.owner_account
        );
        let response = self
            .client
            .post(&url)
            .json(&install)
            .send()
            .await
            .map_err(|e| LedgerError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LedgerError::Rejected(format!("{} - {}", status, text)));
        }

        response
            .json()
            .await
            .map_err(|e| LedgerError::Unreachable(format!("bad install response: {}", e)))
    }
}
