//! Per-agent advisory locks with stale-lock reclamation (spec.md §4.3, C3).
//!
//! Locks live in an in-process registry keyed by `agent_uuid`, each carrying
//! `(pid, acquired_at)`. A lock is stale if its owning process is no longer
//! alive or its age exceeds `max_age`; stale locks are removed and acquisition
//! retried before the caller ever sees a timeout.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{IdentityError, IdentityResult};

const DEFAULT_MAX_AGE_SECS: i64 = 300;
const DEFAULT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_RETRIES: u32 = 10;
const RETRY_DELAY_MS: u64 = 50;

#[derive(Debug, Clone)]
struct LockEntry {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// RAII guard releasing the per-agent lock on drop.
pub struct AgentLockGuard<'a> {
    registry: &'a AgentLockRegistry,
    agent_uuid: Uuid,
}

impl Drop for AgentLockGuard<'_> {
    fn drop(&mut self) {
        self.registry.locks.remove(&self.agent_uuid);
    }
}

/// In-process advisory lock table. One entry per agent; acquisition is
/// strictly serialized per agent and unconstrained across distinct agents
/// (spec.md §4.3 "Ordering").
pub struct AgentLockRegistry {
    locks: DashMap<Uuid, LockEntry>,
    max_age_secs: i64,
}

impl AgentLockRegistry {
    pub fn new(max_age_secs: i64) -> Self {
        Self { locks: DashMap::new(), max_age_secs }
    }

    /// Acquires the lock for `agent_uuid`, retrying past stale holders until
    /// `timeout` elapses. On final timeout, runs one aggressive sweep over all
    /// locks before surfacing `LOCK_TIMEOUT`.
    pub async fn acquire(
        &self,
        agent_uuid: Uuid,
        timeout: Duration,
        max_retries: u32,
    ) -> IdentityResult<AgentLockGuard<'_>> {
        let deadline = std::time::Instant::now() + timeout;
        let pid = std::process::id();
        let mut attempts = 0;

        loop {
            let now = Utc::now();
            let acquired = match self.locks.entry(agent_uuid) {
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    slot.insert(LockEntry { pid, acquired_at: now });
                    true
                }
                dashmap::mapref::entry::Entry::Occupied(slot) => {
                    if self.is_stale(slot.get(), now) {
                        slot.remove();
                        false
                    } else {
                        false
                    }
                }
            };

            if acquired {
                return Ok(AgentLockGuard { registry: self, agent_uuid });
            }

            attempts += 1;
            if attempts >= max_retries || std::time::Instant::now() >= deadline {
                self.sweep_stale(Utc::now());
                return Err(IdentityError::LockTimeout {
                    agent_uuid: agent_uuid.to_string(),
                    recovery_hint: "retry the request; a stale-lock sweep has just run".to_string(),
                });
            }

            tracing::warn!(%agent_uuid, attempts, "agent lock contended, retrying");
            tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS)).await;
        }
    }

    /// Convenience wrapper using spec.md's default timeout/retry/max_age.
    pub async fn acquire_default(&self, agent_uuid: Uuid) -> IdentityResult<AgentLockGuard<'_>> {
        self.acquire(agent_uuid, Duration::from_millis(DEFAULT_TIMEOUT_MS), DEFAULT_MAX_RETRIES).await
    }

    fn is_stale(&self, entry: &LockEntry, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(entry.acquired_at).num_seconds();
        age > self.max_age_secs || !process_is_alive(entry.pid)
    }

    /// Removes every stale lock in the registry regardless of which agent it
    /// was requested for (spec.md §4.3 "one aggressive cleanup pass").
    pub fn sweep_stale(&self, now: DateTime<Utc>) -> usize {
        let stale: Vec<Uuid> = self
            .locks
            .iter()
            .filter(|entry| self.is_stale(entry.value(), now))
            .map(|entry| *entry.key())
            .collect();
        for agent_uuid in &stale {
            self.locks.remove(agent_uuid);
        }
        stale.len()
    }

    pub fn held_count(&self) -> usize {
        self.locks.len()
    }
}

impl Default for AgentLockRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AGE_SECS)
    }
}

#[cfg(unix)]
fn process_is_alive(pid: u32) -> bool {
    // Signal 0 performs no action but still validates pid existence/permission.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn process_is_alive(pid: u32) -> bool {
    pid == std::process::id()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_then_release_allows_reacquire() {
        let registry = AgentLockRegistry::default();
        let agent_uuid = Uuid::new_v4();

        {
            let _guard = registry.acquire_default(agent_uuid).await.unwrap();
            assert_eq!(registry.held_count(), 1);
        }
        assert_eq!(registry.held_count(), 0);

        let _guard2 = registry.acquire_default(agent_uuid).await.unwrap();
        assert_eq!(registry.held_count(), 1);
    }

    #[tokio::test]
    async fn distinct_agents_do_not_contend() {
        let registry = AgentLockRegistry::default();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let _guard_a = registry.acquire_default(a).await.unwrap();
        let _guard_b = registry.acquire_default(b).await.unwrap();
        assert_eq!(registry.held_count(), 2);
    }

    #[tokio::test]
    async fn stale_lock_from_dead_pid_is_reclaimed() {
        let registry = AgentLockRegistry::default();
        let agent_uuid = Uuid::new_v4();

        registry.locks.insert(agent_uuid, LockEntry { pid: 999_999, acquired_at: Utc::now() });

        let guard = registry.acquire(agent_uuid, Duration::from_millis(500), 5).await;
        assert!(guard.is_ok());
    }

    #[tokio::test]
    async fn stale_lock_from_age_is_reclaimed() {
        let registry = AgentLockRegistry::new(1);
        let agent_uuid = Uuid::new_v4();
        let own_pid = std::process::id();

        registry.locks.insert(
            agent_uuid,
            LockEntry { pid: own_pid, acquired_at: Utc::now() - chrono::Duration::seconds(10) },
        );

        let guard = registry.acquire(agent_uuid, Duration::from_millis(500), 5).await;
        assert!(guard.is_ok());
    }

    #[tokio::test]
    async fn sweep_stale_clears_dead_entries_only() {
        let registry = AgentLockRegistry::default();
        let live = Uuid::new_v4();
        let dead = Uuid::new_v4();
        let own_pid = std::process::id();

        registry.locks.insert(live, LockEntry { pid: own_pid, acquired_at: Utc::now() });
        registry.locks.insert(dead, LockEntry { pid: 999_999, acquired_at: Utc::now() });

        let removed = registry.sweep_stale(Utc::now());
        assert_eq!(removed, 1);
        assert_eq!(registry.held_count(), 1);
    }
}
