//! Backend-agnostic persistence layer for UNITARES (spec.md §4.1, C1).
//!
//! Ships one concrete backend, sled, behind the [`StorageBackend`] trait seam a
//! Postgres-primary implementation would later fill in (spec.md names Postgres as
//! primary with an embedded KV/SQL fallback; this crate builds the fallback first).

pub mod error;
pub mod records;
pub mod retry;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use records::*;
pub use store::UnitaresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Async seam over the storage layer's operations (spec.md §4.1 "Operations consumed
/// by the core"). [`UnitaresStore`]'s sled calls are synchronous and fast enough to
/// run inline; this trait is what a network-backed (e.g. Postgres) implementation
/// would need to satisfy instead.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn upsert_identity(&self, record: &IdentityRecord) -> StoreResult<()>;
    async fn get_identity_by_uuid(&self, agent_uuid: Uuid) -> StoreResult<Option<IdentityRecord>>;
    async fn get_identity_by_agent_id(&self, agent_id: &str) -> StoreResult<Option<IdentityRecord>>;
    async fn append_audit_event(
        &self,
        agent_id: &str,
        event_type: &str,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> StoreResult<AuditEventRecord>;
    async fn health_probe(&self) -> StoreResult<HealthProbe>;
}

#[async_trait]
impl StorageBackend for UnitaresStore {
    async fn upsert_identity(&self, record: &IdentityRecord) -> StoreResult<()> {
        UnitaresStore::upsert_identity(self, record)
    }

    async fn get_identity_by_uuid(&self, agent_uuid: Uuid) -> StoreResult<Option<IdentityRecord>> {
        UnitaresStore::get_identity_by_uuid(self, agent_uuid)
    }

    async fn get_identity_by_agent_id(&self, agent_id: &str) -> StoreResult<Option<IdentityRecord>> {
        UnitaresStore::get_identity_by_agent_id(self, agent_id)
    }

    async fn append_audit_event(
        &self,
        agent_id: &str,
        event_type: &str,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> StoreResult<AuditEventRecord> {
        UnitaresStore::append_audit_event(self, agent_id, event_type, payload, now)
    }

    async fn health_probe(&self) -> StoreResult<HealthProbe> {
        UnitaresStore::health_probe(self)
    }
}
