//! Delegated capability issuance
//!
//! Runs wherever the account's primary key lives. Issuance derives a
//! fresh session keypair, pins the trading allow-list, binds an expiry,
//! and installs the capability on-chain with exactly one primary-key
//! signature. Only after the ledger confirms the installation does the
//! record reach the capability store.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::address::Address;
use crate::capability::{trading_scope, Capability, CapabilityStatus};
use crate::config::Contracts;
use crate::ledger::{install_digest, Ledger, LedgerError, ReceiptStatus, SignedInstall};
use crate::signer::{LocalKeySigner, Signer, SignerError};
use crate::store::{CapabilityRecord, CapabilityStore};

/// Error types for capability issuance
#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    #[error("ttl must be positive, got {0}")]
    InvalidTtl(i64),

    #[error("session key generation failed: {0}")]
    Signer(#[from] SignerError),

    #[error("on-chain installation rejected: {0}")]
    InstallRejected(String),

    #[error("ledger error during installation: {0}")]
    Ledger(#[from] LedgerError),
}

pub struct CapabilityIssuer {
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn CapabilityStore>,
    contracts: Contracts,
}

impl CapabilityIssuer {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        store: Arc<dyn CapabilityStore>,
        contracts: Contracts,
    ) -> Self {
        Self {
            ledger,
            store,
            contracts,
        }
    }

    /// Issue a capability for `owner`, valid for `ttl_secs` from now.
    ///
    /// `primary` is the account's primary key; it signs exactly once, over
    /// the installation payload. The install is atomic: a rejection leaves
    /// both the account's on-chain authorization state and the local store
    /// unchanged.
    pub async fn issue(
        &self,
        owner: &Address,
        primary: &dyn Signer,
        ttl_secs: i64,
    ) -> Result<Capability, IssueError> {
        if ttl_secs <= 0 {
            return Err(IssueError::InvalidTtl(ttl_secs));
        }

        let session = LocalKeySigner::generate()?;
        let now = Utc::now();

        let capability = Capability {
            session_key_id: Uuid::new_v4(),
            session_public_key: hex::encode(session.public_key()),
            session_address: session.address(),
            owner_account: owner.clone(),
            scope: trading_scope(
                &self.contracts.stable_token.address,
                &self.contracts.gold_token.address,
                &self.contracts.pool,
            ),
            issued_at: now,
            expires_at: now + Duration::seconds(ttl_secs),
            status: CapabilityStatus::Active,
        };

        // The single user-approved signature of the issuance flow.
        let signature = primary.sign(&install_digest(&capability));
        let install = SignedInstall {
            capability: capability.clone(),
            signature: hex::encode(signature),
        };

        let receipt = self.ledger.install_capability(install).await?;
        if let ReceiptStatus::Reverted { reason } = receipt.status {
            return Err(IssueError::InstallRejected(reason));
        }

        info!(
            "Capability {} installed for {} (session {}, expires {})",
            capability.session_key_id,
            owner,
            capability.session_address,
            capability.expires_at
        );

        self.store
            .put(CapabilityRecord {
                capability: capability.clone(),
                signer: Arc::new(session),
            })
            .await;

        Ok(capability)
    }
}
