//! Capability store
//!
//! Holds issued capability material keyed by owning account. This is a
//! trust boundary: whoever can read a record's signer can act as the
//! agent. Listings therefore expose public metadata only; the signing
//! handle is surfaced solely to the execution path via `get`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::address::Address;
use crate::capability::{Capability, CapabilityStatus};
use crate::signer::Signer;

/// Stored capability material: the public record plus its signing handle.
#[derive(Clone)]
pub struct CapabilityRecord {
    pub capability: Capability,
    pub signer: Arc<dyn Signer>,
}

/// Public metadata safe to expose in enumeration responses.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilitySummary {
    pub owner_account: Address,
    pub session_address: Address,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: CapabilityStatus,
}

#[async_trait]
pub trait CapabilityStore: Send + Sync {
    /// Install a record for its owner account, superseding any previous
    /// capability for the same account (the old one is logically revoked).
    async fn put(&self, record: CapabilityRecord);

    /// Live record for the execution path. Expiry is recomputed against
    /// the wall clock on every read, never trusted from stored state;
    /// expired or revoked capabilities behave as not found.
    async fn get(&self, account: &Address) -> Option<CapabilityRecord>;

    /// Public summaries of every stored capability. Never includes key
    /// material.
    async fn list(&self) -> Vec<CapabilitySummary>;

    /// Immediately invalidate the account's capability, ahead of natural
    /// expiry. Returns false when there was nothing to revoke.
    async fn revoke(&self, account: &Address) -> bool;
}

/// In-memory store, suitable for a single agent process. The trait keeps
/// it swappable for a persistent backend.
#[derive(Default)]
pub struct InMemoryCapabilityStore {
    records: RwLock<HashMap<Address, CapabilityRecord>>,
}

impl InMemoryCapabilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn effective_status(capability: &Capability, now: DateTime<Utc>) -> CapabilityStatus {
        match capability.status {
            CapabilityStatus::Revoked => CapabilityStatus::Revoked,
            _ if capability.is_expired_at(now) => CapabilityStatus::Expired,
            status => status,
        }
    }
}

#[async_trait]
impl CapabilityStore for InMemoryCapabilityStore {
    async fn put(&self, record: CapabilityRecord) {
        let owner = record.capability.owner_account.clone();
        let mut records = self.records.write().await;
        if records.insert(owner.clone(), record).is_some() {
            info!("Superseded existing capability for {}", owner);
        } else {
            debug!("Stored capability for {}", owner);
        }
    }

    async fn get(&self, account: &Address) -> Option<CapabilityRecord> {
        let mut records = self.records.write().await;
        let record = records.get_mut(account)?;

        match Self::effective_status(&record.capability, Utc::now()) {
            CapabilityStatus::Active => Some(record.clone()),
            status => {
                // Persist the computed status so listings reflect it, but
                // never hand the record out.
                record.capability.status = status;
                None
            }
        }
    }

    async fn list(&self) -> Vec<CapabilitySummary> {
        let now = Utc::now();
        let records = self.records.read().await;

        let mut summaries: Vec<CapabilitySummary> = records
            .values()
            .map(|r| CapabilitySummary {
                owner_account: r.capability.owner_account.clone(),
                session_address: r.capability.session_address.clone(),
                issued_at: r.capability.issued_at,
                expires_at: r.capability.expires_at,
                status: Self::effective_status(&r.capability, now),
            })
            .collect();

        summaries.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        summaries
    }

    async fn revoke(&self, account: &Address) -> bool {
        let mut records = self.records.write().await;
        match records.get_mut(account) {
            Some(record) => {
                record.capability.status = CapabilityStatus::Revoked;
                info!("Revoked capability for {}", account);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::trading_scope;
    use crate::signer::LocalKeySigner;
    use chrono::Duration;
    use uuid::Uuid;

    fn addr(n: u8) -> Address {
        format!("0x{:040x}", n).parse().unwrap()
    }

    fn record_for(owner: Address, expires_at: DateTime<Utc>) -> CapabilityRecord {
        let signer = Arc::new(LocalKeySigner::generate().unwrap());
        let capability = Capability {
            session_key_id: Uuid::new_v4(),
            session_public_key: hex::encode(signer.public_key()),
            session_address: signer.address(),
            owner_account: owner,
            scope: trading_scope(&addr(1), &addr(2), &addr(3)),
            issued_at: expires_at - Duration::days(7),
            expires_at,
            status: CapabilityStatus::Active,
        };
        CapabilityRecord { capability, signer }
    }

    #[tokio::test]
    async fn test_get_returns_active_record() {
        let store = InMemoryCapabilityStore::new();
        let owner = addr(10);
        store
            .put(record_for(owner.clone(), Utc::now() + Duration::days(7)))
            .await;

        assert!(store.get(&owner).await.is_some());
    }

    #[tokio::test]
    async fn test_expiry_computed_on_read() {
        let store = InMemoryCapabilityStore::new();
        let owner = addr(10);

        // Stored status still says Active; only the timestamp has passed.
        store
            .put(record_for(owner.clone(), Utc::now() - Duration::seconds(1)))
            .await;

        assert!(store.get(&owner).await.is_none());

        let listed = store.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, CapabilityStatus::Expired);
    }

    #[tokio::test]
    async fn test_revoke_makes_get_not_found_before_expiry() {
        let store = InMemoryCapabilityStore::new();
        let owner = addr(10);
        store
            .put(record_for(owner.clone(), Utc::now() + Duration::days(7)))
            .await;

        assert!(store.revoke(&owner).await);
        assert!(store.get(&owner).await.is_none());
        assert!(!store.revoke(&addr(11)).await);
    }

    #[tokio::test]
    async fn test_put_supersedes_previous_capability() {
        let store = InMemoryCapabilityStore::new();
        let owner = addr(10);

        store
            .put(record_for(owner.clone(), Utc::now() + Duration::days(1)))
            .await;
        let replacement = record_for(owner.clone(), Utc::now() + Duration::days(30));
        let replacement_session = replacement.capability.session_address.clone();
        store.put(replacement).await;

        let record = store.get(&owner).await.unwrap();
        assert_eq!(record.capability.session_address, replacement_session);
        assert_eq!(store.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_list_exposes_metadata_only() {
        let store = InMemoryCapabilityStore::new();
        store
            .put(record_for(addr(10), Utc::now() + Duration::days(7)))
            .await;

        let listed = store.list().await;
        let json = serde_json::to_value(&listed).unwrap();

        // Summaries serialize to exactly the public fields.
        let entry = json.as_array().unwrap()[0].as_object().unwrap();
        let mut fields: Vec<&str> = entry.keys().map(String::as_str).collect();
        fields.sort();
        assert_eq!(
            fields,
            vec![
                "expires_at",
                "issued_at",
                "owner_account",
                "session_address",
                "status"
            ]
        );
    }
}
