//! Governance thresholds and environment configuration (spec.md §4.4, §5, §6).
//!
//! Defaults match the values spec.md states explicitly; every field is overridable
//! from the environment via `config`+`dotenvy`, the way the teacher's `SovereignConfig`
//! documents one env var per field.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

fn default_risk_approve() -> f64 {
    0.3
}
fn default_risk_revise() -> f64 {
    0.6
}
fn default_risk_reject() -> f64 {
    0.85
}
fn default_coherence_warning() -> f64 {
    0.4
}
fn default_coherence_critical() -> f64 {
    0.2
}
fn default_void_active_threshold() -> f64 {
    0.15
}
fn default_loop_threshold() -> usize {
    4
}
fn default_loop_cooldown_secs() -> i64 {
    60
}
fn default_history_window() -> usize {
    5
}
fn default_min_samples() -> u32 {
    5
}
fn default_calibration_error_threshold() -> f64 {
    0.15
}
fn default_drift_detector_window() -> usize {
    100
}
fn default_drift_detector_threshold() -> f64 {
    0.1
}
fn default_stuck_session_hours() -> i64 {
    2
}
fn default_max_synthesis_rounds() -> u32 {
    3
}
fn default_self_recovery_max_risk() -> f64 {
    0.70
}
fn default_self_recovery_min_coherence() -> f64 {
    0.30
}
fn default_quick_resume_min_coherence() -> f64 {
    0.60
}
fn default_quick_resume_max_risk() -> f64 {
    0.40
}
fn default_activity_threshold() -> usize {
    15
}
fn default_divergence_threshold() -> f64 {
    0.4
}
fn default_restorative_window_secs() -> i64 {
    300
}
fn default_lock_max_age_secs() -> i64 {
    300
}
fn default_lock_timeout_secs() -> u64 {
    5
}
fn default_lock_max_retries() -> u32 {
    10
}
fn default_session_inactivity_hours() -> i64 {
    24
}
fn default_onboard_pin_ttl_secs() -> i64 {
    1800
}

/// Governance thresholds driving the decision rule (§4.4) and the satellite
/// protocols that reuse them (§4.9 dialectic auto-resolve, §4.10 self-recovery).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// RISK_APPROVE_THRESHOLD: below this, always proceed (absent other triggers).
    #[serde(default = "default_risk_approve")]
    pub risk_approve_threshold: f64,
    /// RISK_REVISE_THRESHOLD: guide/pause band starts here.
    #[serde(default = "default_risk_revise")]
    pub risk_revise_threshold: f64,
    /// RISK_REJECT_THRESHOLD: reject at or above this risk.
    #[serde(default = "default_risk_reject")]
    pub risk_reject_threshold: f64,
    /// COHERENCE_WARNING_THRESHOLD: degraded health / guide band.
    #[serde(default = "default_coherence_warning")]
    pub coherence_warning_threshold: f64,
    /// COHERENCE_CRITICAL_THRESHOLD: reject / critical health.
    #[serde(default = "default_coherence_critical")]
    pub coherence_critical_threshold: f64,
    /// VOID_ACTIVE_THRESHOLD (τ_V_active): |V| above this marks void_active.
    #[serde(default = "default_void_active_threshold")]
    pub void_active_threshold: f64,
    /// LOOP_THRESHOLD: consecutive identical decisions before loop detection fires.
    #[serde(default = "default_loop_threshold")]
    pub loop_threshold: usize,
    /// LOOP_COOLDOWN_SECS: cooldown duration once a loop is detected.
    #[serde(default = "default_loop_cooldown_secs")]
    pub loop_cooldown_secs: i64,
    /// HISTORY_WINDOW: bounded history capacity for risk/coherence/decisions (~5).
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// CALIBRATION_MIN_SAMPLES: samples required in a bin before correcting.
    #[serde(default = "default_min_samples")]
    pub calibration_min_samples: u32,
    /// CALIBRATION_ERROR_THRESHOLD: |accuracy - mean_confidence| miscalibration cutoff.
    #[serde(default = "default_calibration_error_threshold")]
    pub calibration_error_threshold: f64,
    /// CALIBRATION_DRIFT_WINDOW: bounded deque size for the drift detector.
    #[serde(default = "default_drift_detector_window")]
    pub calibration_drift_window: usize,
    /// CALIBRATION_DRIFT_THRESHOLD: delta between window halves that signals drift.
    #[serde(default = "default_drift_detector_threshold")]
    pub calibration_drift_threshold: f64,
    /// UNITARES_STUCK_SESSION_HOURS: dialectic auto-resolve inactivity threshold.
    #[serde(default = "default_stuck_session_hours")]
    pub stuck_session_hours: i64,
    /// UNITARES_MAX_SYNTHESIS_ROUNDS: dialectic synthesis round cap.
    #[serde(default = "default_max_synthesis_rounds")]
    pub max_synthesis_rounds: u32,
    /// Self-recovery review: above this risk, escalate to a human.
    #[serde(default = "default_self_recovery_max_risk")]
    pub self_recovery_max_risk: f64,
    /// Self-recovery review: below this coherence, escalate to a human.
    #[serde(default = "default_self_recovery_min_coherence")]
    pub self_recovery_min_coherence: f64,
    /// Quick resume: minimum coherence (stricter than self-recovery review).
    #[serde(default = "default_quick_resume_min_coherence")]
    pub quick_resume_min_coherence: f64,
    /// Quick resume: maximum risk (stricter than self-recovery review).
    #[serde(default = "default_quick_resume_max_risk")]
    pub quick_resume_max_risk: f64,
    /// Restorative-balance monitor: max updates within the 5-minute window.
    #[serde(default = "default_activity_threshold")]
    pub restorative_activity_threshold: usize,
    /// Restorative-balance monitor: max summed divergence within the window.
    #[serde(default = "default_divergence_threshold")]
    pub restorative_divergence_threshold: f64,
    /// Restorative-balance monitor: sliding window width in seconds.
    #[serde(default = "default_restorative_window_secs")]
    pub restorative_window_secs: i64,
    /// Per-agent lock: age after which an uncontested lock is considered stale.
    #[serde(default = "default_lock_max_age_secs")]
    pub lock_max_age_secs: i64,
    /// Per-agent lock: acquisition timeout before surfacing LOCK_TIMEOUT.
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
    /// Per-agent lock: retry attempts within the timeout budget.
    #[serde(default = "default_lock_max_retries")]
    pub lock_max_retries: u32,
    /// Session inactivity window before a session expires.
    #[serde(default = "default_session_inactivity_hours")]
    pub session_inactivity_hours: i64,
    /// Onboard fingerprint pin TTL in seconds (~1800s per spec.md §6).
    #[serde(default = "default_onboard_pin_ttl_secs")]
    pub onboard_pin_ttl_secs: i64,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            risk_approve_threshold: default_risk_approve(),
            risk_revise_threshold: default_risk_revise(),
            risk_reject_threshold: default_risk_reject(),
            coherence_warning_threshold: default_coherence_warning(),
            coherence_critical_threshold: default_coherence_critical(),
            void_active_threshold: default_void_active_threshold(),
            loop_threshold: default_loop_threshold(),
            loop_cooldown_secs: default_loop_cooldown_secs(),
            history_window: default_history_window(),
            calibration_min_samples: default_min_samples(),
            calibration_error_threshold: default_calibration_error_threshold(),
            calibration_drift_window: default_drift_detector_window(),
            calibration_drift_threshold: default_drift_detector_threshold(),
            stuck_session_hours: default_stuck_session_hours(),
            max_synthesis_rounds: default_max_synthesis_rounds(),
            self_recovery_max_risk: default_self_recovery_max_risk(),
            self_recovery_min_coherence: default_self_recovery_min_coherence(),
            quick_resume_min_coherence: default_quick_resume_min_coherence(),
            quick_resume_max_risk: default_quick_resume_max_risk(),
            restorative_activity_threshold: default_activity_threshold(),
            restorative_divergence_threshold: default_divergence_threshold(),
            restorative_window_secs: default_restorative_window_secs(),
            lock_max_age_secs: default_lock_max_age_secs(),
            lock_timeout_secs: default_lock_timeout_secs(),
            lock_max_retries: default_lock_max_retries(),
            session_inactivity_hours: default_session_inactivity_hours(),
            onboard_pin_ttl_secs: default_onboard_pin_ttl_secs(),
        }
    }
}

impl GovernanceConfig {
    /// Loads configuration from `.env` + process environment, falling back to defaults
    /// for anything unset. Mirrors the teacher's `dotenvy::dotenv().ok()` + `config::Config`
    /// layering (env vars win, defaults fill gaps).
    pub fn load() -> CoreResult<Self> {
        dotenvy::dotenv().ok();
        let builder = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("UNITARES")
                    .try_parsing(true)
                    .separator("_"),
            )
            .build();
        let cfg = match builder {
            Ok(c) => c.try_deserialize::<Self>().unwrap_or_default(),
            Err(_) => Self::default(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates the declared threshold ordering invariant from spec.md §4.4:
    /// `risk_approve_threshold < risk_revise_threshold < risk_reject_threshold`.
    pub fn validate(&self) -> CoreResult<()> {
        if !(self.risk_approve_threshold < self.risk_revise_threshold
            && self.risk_revise_threshold < self.risk_reject_threshold)
        {
            return Err(CoreError::InvalidThresholds(format!(
                "risk thresholds must satisfy approve < revise < reject, got {} < {} < {}",
                self.risk_approve_threshold, self.risk_revise_threshold, self.risk_reject_threshold
            )));
        }
        if !(self.coherence_critical_threshold < self.coherence_warning_threshold) {
            return Err(CoreError::InvalidThresholds(format!(
                "coherence thresholds must satisfy critical < warning, got {} < {}",
                self.coherence_critical_threshold, self.coherence_warning_threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(GovernanceConfig::default().validate().is_ok());
    }

    #[test]
    fn bad_ordering_rejected() {
        let mut cfg = GovernanceConfig::default();
        cfg.risk_revise_threshold = 0.1;
        assert!(cfg.validate().is_err());
    }
}
