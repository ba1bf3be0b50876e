//! Cross-process worker registry with zombie cleanup (spec.md §4.3 C3).
//!
//! Tracks active worker PIDs and heartbeats so crash recovery can identify
//! stale locks and orphaned sessions. A background routine prunes entries for
//! processes that no longer exist and enforces a cap on tracked processes.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::lock::AgentLockRegistry;

const DEFAULT_MAX_TRACKED: usize = 256;
const DEFAULT_HEARTBEAT_STALE_SECS: i64 = 120;

#[derive(Debug, Clone)]
pub struct WorkerEntry {
    pub pid: u32,
    pub last_heartbeat: DateTime<Utc>,
}

/// Shared process-wide registry of live workers, enforcing a cap on the
/// number of tracked processes (spec.md §4.3 "Zombie cleanup").
pub struct ProcessRegistry {
    workers: DashMap<u32, WorkerEntry>,
    max_tracked: usize,
    heartbeat_stale_secs: i64,
}

impl ProcessRegistry {
    pub fn new(max_tracked: usize, heartbeat_stale_secs: i64) -> Self {
        Self { workers: DashMap::new(), max_tracked, heartbeat_stale_secs }
    }

    /// Registers or refreshes a worker's heartbeat. When the tracked-process
    /// cap is exceeded, evicts the oldest heartbeat to make room.
    pub fn heartbeat(&self, pid: u32, now: DateTime<Utc>) {
        self.workers.insert(pid, WorkerEntry { pid, last_heartbeat: now });
        if self.workers.len() > self.max_tracked {
            self.evict_oldest();
        }
    }

    fn evict_oldest(&self) {
        let oldest = self
            .workers
            .iter()
            .min_by_key(|entry| entry.value().last_heartbeat)
            .map(|entry| *entry.key());
        if let Some(pid) = oldest {
            self.workers.remove(&pid);
        }
    }

    /// Prunes entries for processes no longer alive or whose heartbeat has
    /// gone stale, returning the number of entries removed.
    pub fn zombie_cleanup(&self, now: DateTime<Utc>) -> usize {
        let dead: Vec<u32> = self
            .workers
            .iter()
            .filter(|entry| {
                let e = entry.value();
                !process_is_alive(e.pid)
                    || now.signed_duration_since(e.last_heartbeat).num_seconds() > self.heartbeat_stale_secs
            })
            .map(|entry| *entry.key())
            .collect();
        for pid in &dead {
            self.workers.remove(pid);
        }
        dead.len()
    }

    pub fn tracked_count(&self) -> usize {
        self.workers.len()
    }

    pub fn is_tracked(&self, pid: u32) -> bool {
        self.workers.contains_key(&pid)
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TRACKED, DEFAULT_HEARTBEAT_STALE_SECS)
    }
}

#[cfg(unix)]
fn process_is_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn process_is_alive(pid: u32) -> bool {
    pid == std::process::id()
}

/// Runs both background sweeps used by crash recovery: zombie process
/// pruning and stale agent-lock reclamation (spec.md §4.3, §6 "Background
/// loops... must tolerate persistence unavailability without crashing").
pub fn run_maintenance_sweep(registry: &ProcessRegistry, locks: &AgentLockRegistry, now: DateTime<Utc>) -> (usize, usize) {
    let zombies = registry.zombie_cleanup(now);
    let stale_locks = locks.sweep_stale(now);
    (zombies, stale_locks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_tracks_and_evicts_over_cap() {
        let registry = ProcessRegistry::new(2, 120);
        let now = Utc::now();
        registry.heartbeat(1, now);
        registry.heartbeat(2, now + chrono::Duration::seconds(1));
        registry.heartbeat(3, now + chrono::Duration::seconds(2));
        assert_eq!(registry.tracked_count(), 2);
        assert!(!registry.is_tracked(1));
    }

    #[test]
    fn zombie_cleanup_removes_dead_pids() {
        let registry = ProcessRegistry::default();
        let now = Utc::now();
        registry.heartbeat(999_999, now);
        registry.heartbeat(std::process::id(), now);

        let removed = registry.zombie_cleanup(now);
        assert_eq!(removed, 1);
        assert!(registry.is_tracked(std::process::id()));
    }

    #[test]
    fn zombie_cleanup_removes_stale_heartbeats() {
        let registry = ProcessRegistry::new(256, 10);
        let own_pid = std::process::id();
        let now = Utc::now();
        registry.heartbeat(own_pid, now - chrono::Duration::seconds(60));

        let removed = registry.zombie_cleanup(now);
        assert_eq!(removed, 1);
    }

    #[test]
    fn maintenance_sweep_runs_both_routines() {
        let registry = ProcessRegistry::default();
        let locks = AgentLockRegistry::default();
        let now = Utc::now();

        registry.heartbeat(999_999, now);

        let (zombies, stale_locks) = run_maintenance_sweep(&registry, &locks, now);
        assert_eq!(zombies, 1);
        assert_eq!(stale_locks, 0);
    }
}
