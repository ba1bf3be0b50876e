//! Process-wide facade bundling the governance core crates into one handle
//! (spec.md §6 "External interfaces"): one store, one identity resolver, one
//! lock registry, one process registry, one rate limiter, one calibration
//! tracker per agent. A transport layer (HTTP, stdio MCP, …) is out of scope;
//! this crate wires the pieces a transport would sit in front of.

use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use std::path::Path;

use unitares_core::{AgentBaseline, CalibrationTracker, ContinuityLog, GovernanceConfig, RestorativeMonitor};
use unitares_dispatch::RateLimiter;
use unitares_identity::{registry::ProcessRegistry, AgentLockRegistry, IdentityResolver};
use unitares_store::{StoreResult, UnitaresStore};

pub struct GovernanceServer {
    pub store: UnitaresStore,
    pub config: GovernanceConfig,
    pub resolver: IdentityResolver,
    pub locks: AgentLockRegistry,
    pub registry: ProcessRegistry,
    pub limiter: RateLimiter,
    pub calibration: DashMap<String, CalibrationTracker>,
    /// Dual-log continuity state (C5), one per agent; in-memory only, rebuilt
    /// from scratch on restart like the calibration trackers.
    pub continuity: DashMap<String, ContinuityLog>,
    /// Ethical-drift baselines (C6), one per agent.
    pub drift_baselines: DashMap<String, AgentBaseline>,
    /// Restorative-balance monitors (C5), one per agent.
    pub restorative: DashMap<String, RestorativeMonitor>,
}

impl GovernanceServer {
    pub fn new(store: UnitaresStore, config: GovernanceConfig) -> Self {
        let resolver = IdentityResolver::new(config.session_inactivity_hours * 3600, config.onboard_pin_ttl_secs);
        let locks = AgentLockRegistry::new(config.lock_max_age_secs);
        let registry = ProcessRegistry::default();
        let limiter = RateLimiter::default();
        Self {
            store,
            config,
            resolver,
            locks,
            registry,
            limiter,
            calibration: DashMap::new(),
            continuity: DashMap::new(),
            drift_baselines: DashMap::new(),
            restorative: DashMap::new(),
        }
    }

    pub fn open(path: impl AsRef<Path>, config: GovernanceConfig) -> StoreResult<Self> {
        Ok(Self::new(UnitaresStore::open(path)?, config))
    }

    pub fn open_temporary(config: GovernanceConfig) -> StoreResult<Self> {
        Ok(Self::new(UnitaresStore::open_temporary()?, config))
    }

    /// Fetches (creating if absent) the in-memory calibration tracker for one agent.
    pub fn calibration_tracker_for(&self, agent_id: &str) -> RefMut<'_, String, CalibrationTracker> {
        self.calibration.entry(agent_id.to_string()).or_insert_with(|| {
            CalibrationTracker::new(
                agent_id,
                self.config.calibration_min_samples,
                self.config.calibration_drift_window,
                self.config.calibration_error_threshold,
                self.config.calibration_drift_threshold,
            )
        })
    }

    /// Fetches (creating if absent) the in-memory continuity log for one agent (C5).
    pub fn continuity_log_for(&self, agent_id: &str) -> RefMut<'_, String, ContinuityLog> {
        self.continuity.entry(agent_id.to_string()).or_insert_with(ContinuityLog::new)
    }

    /// Fetches (creating if absent) the in-memory drift baseline for one agent (C6).
    pub fn drift_baseline_for(&self, agent_id: &str) -> RefMut<'_, String, AgentBaseline> {
        self.drift_baselines.entry(agent_id.to_string()).or_insert_with(AgentBaseline::new)
    }

    /// Fetches (creating if absent) the in-memory restorative-balance monitor for one agent (C5).
    pub fn restorative_monitor_for(&self, agent_id: &str) -> RefMut<'_, String, RestorativeMonitor> {
        self.restorative.entry(agent_id.to_string()).or_insert_with(|| {
            RestorativeMonitor::new(
                self.config.restorative_window_secs,
                self.config.restorative_activity_threshold,
                self.config.restorative_divergence_threshold,
            )
        })
    }
}
