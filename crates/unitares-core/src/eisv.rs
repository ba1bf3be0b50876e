//! Governance state engine (spec.md §4.4, C4).
//!
//! EISV dynamics, coherence/risk derivation, the decision rule, proprioceptive margin,
//! and loop detection. Weights are declared heuristic (spec.md §9 Open Questions): they
//! are chosen to satisfy the qualitative laws spec.md §4.4 states and are documented here
//! rather than derived from the (unspecified) original constants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::GovernanceConfig;
use crate::types::{clip, BoundedHistory, Decision, HealthStatus, ParsedCondition, Regime};

/// EMA speed for the E channel.
const ALPHA_E: f64 = 0.3;
/// EMA speed for the I channel.
const ALPHA_I: f64 = 0.3;
/// EMA speed for the S channel.
const ALPHA_S: f64 = 0.3;
/// Extra S increment driven by complexity under low coherence.
const S_COMPLEXITY_GAIN: f64 = 0.2;
/// Void accumulation rate from the E-I imbalance.
const V_GAIN: f64 = 0.15;
/// Void relaxation (decay) rate.
const V_DECAY: f64 = 0.10;
/// EMA speed for coherence.
const ALPHA_COHERENCE: f64 = 0.3;
/// Void ceiling beyond the active threshold, above which the regime locks.
const VOID_LOCK_MULTIPLIER: f64 = 2.0;

/// Per-check-in inputs to the dynamics step (spec.md §4.4 preamble).
#[derive(Debug, Clone, Copy)]
pub struct StepInputs {
    pub e_input: f64,
    pub i_input: f64,
    pub s_input: f64,
    pub confidence: f64,
    pub complexity: f64,
    pub ethical_drift_norm: f64,
    pub task_context: Option<&'static str>,
}

/// The full per-agent governance state (spec.md §3 "Agent state").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub e: f64,
    pub i: f64,
    pub s: f64,
    pub v: f64,
    pub coherence: f64,
    pub regime: Regime,
    pub risk_score: f64,
    pub void_active: bool,
    pub risk_history: BoundedHistory<f64>,
    pub coherence_history: BoundedHistory<f64>,
    pub update_count: u64,
    pub recent_decisions: BoundedHistory<Decision>,
    pub recent_update_timestamps: BoundedHistory<DateTime<Utc>>,
    pub last_response_at: Option<DateTime<Utc>>,
    pub response_completed: bool,
    pub health_status: HealthStatus,
    pub dialectic_conditions: Vec<ParsedCondition>,
    pub loop_detected_at: Option<DateTime<Utc>>,
    pub loop_cooldown_until: Option<DateTime<Utc>>,
}

impl AgentState {
    pub fn new(history_window: usize) -> Self {
        Self {
            e: 0.6,
            i: 0.6,
            s: 0.2,
            v: 0.0,
            coherence: 0.6,
            regime: Regime::Exploration,
            risk_score: 0.1,
            void_active: false,
            risk_history: BoundedHistory::new(history_window),
            coherence_history: BoundedHistory::new(history_window),
            update_count: 0,
            recent_decisions: BoundedHistory::new(history_window.max(10)),
            recent_update_timestamps: BoundedHistory::new(history_window.max(10)),
            last_response_at: None,
            response_completed: false,
            health_status: HealthStatus::Healthy,
            dialectic_conditions: Vec::new(),
            loop_detected_at: None,
            loop_cooldown_until: None,
        }
    }
}

/// Full outcome of one `step()` call: the new state (already mutated) plus the
/// decision-facing results a caller reports back to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub decision: Decision,
    pub health: HealthStatus,
    pub regime: Regime,
    pub risk_score: f64,
    pub coherence: f64,
    pub margin: f64,
    pub void_active: bool,
    pub guidance: Vec<String>,
    pub loop_detected: bool,
}

/// Computes the bounded proprioceptive margin (spec.md §4.4 step 7): a dimensionless
/// signed distance from the nearest decision boundary, positive meaning headroom.
pub fn compute_margin(risk_score: f64, coherence: f64, config: &GovernanceConfig) -> f64 {
    let risk_component = (config.risk_reject_threshold - risk_score) / 0.5;
    let coherence_component = (coherence - config.coherence_critical_threshold) / 0.5;
    clip(risk_component.min(coherence_component), -1.0, 1.0)
}

fn derive_regime(state: &AgentState, prev_s: f64, prev_i: f64, config: &GovernanceConfig) -> Regime {
    if state.void_active && state.v.abs() > config.void_active_threshold * VOID_LOCK_MULTIPLIER {
        return Regime::Locked;
    }
    if state.i < 0.4 && state.s > prev_s {
        return Regime::Exploration;
    }
    if state.s < prev_s && state.i > prev_i {
        return Regime::Convergence;
    }
    if state.risk_score > prev_s {
        return Regime::Divergence;
    }
    Regime::Transition
}

/// Runs the EISV dynamics + decision rule for one check-in, mutating `state` in place
/// and returning the decision-facing outcome. This is the impure, persisting path;
/// see [`simulate`] for the pure dry-run variant.
pub fn step(state: &mut AgentState, inputs: StepInputs, config: &GovernanceConfig, now: DateTime<Utc>) -> StepOutcome {
    // Loop cooldown: further check-ins return `guide` and do not advance state.
    if let Some(until) = state.loop_cooldown_until {
        if now < until {
            return StepOutcome {
                decision: Decision::Guide,
                health: state.health_status,
                regime: state.regime,
                risk_score: state.risk_score,
                coherence: state.coherence,
                margin: compute_margin(state.risk_score, state.coherence, config),
                void_active: state.void_active,
                guidance: vec!["try a different approach".to_string()],
                loop_detected: true,
            };
        }
        state.loop_cooldown_until = None;
    }

    let (decision, health, guidance, loop_detected) = advance(state, inputs, config, now);

    StepOutcome {
        decision,
        health,
        regime: state.regime,
        risk_score: state.risk_score,
        coherence: state.coherence,
        margin: compute_margin(state.risk_score, state.coherence, config),
        void_active: state.void_active,
        guidance,
        loop_detected,
    }
}

/// Pure variant of [`step`] for dry-run tooling (spec.md §4.4 "Simulate"): computes the
/// next state and decision without mutating the original.
pub fn simulate(state: &AgentState, inputs: StepInputs, config: &GovernanceConfig, now: DateTime<Utc>) -> (AgentState, StepOutcome) {
    let mut clone = state.clone();
    let outcome = step(&mut clone, inputs, config, now);
    (clone, outcome)
}

fn advance(
    state: &mut AgentState,
    inputs: StepInputs,
    config: &GovernanceConfig,
    now: DateTime<Utc>,
) -> (Decision, HealthStatus, Vec<String>, bool) {
    let prev_s = state.s;
    let prev_i = state.i;
    let prev_coherence = state.coherence;

    // 1. Step EISV dynamics.
    state.e = clip(ALPHA_E * inputs.e_input + (1.0 - ALPHA_E) * state.e, 0.0, 1.0);
    state.i = clip(ALPHA_I * inputs.i_input + (1.0 - ALPHA_I) * state.i, 0.0, 1.0);

    let low_coherence_gain = S_COMPLEXITY_GAIN * inputs.complexity * (1.0 - prev_coherence);
    state.s = clip(
        ALPHA_S * inputs.s_input + (1.0 - ALPHA_S) * state.s + low_coherence_gain,
        0.0,
        1.0,
    );

    state.v = state.v + V_GAIN * (state.e - state.i) - V_DECAY * state.v;

    let drift_clamped = clip(inputs.ethical_drift_norm, 0.0, 2.0);
    let coherence_target = clip(state.i * (1.0 - (drift_clamped / 2.0)), 0.0, 1.0);
    state.coherence = clip(
        ALPHA_COHERENCE * coherence_target + (1.0 - ALPHA_COHERENCE) * prev_coherence,
        0.0,
        1.0,
    );

    // 2. Risk score.
    let slope = state
        .risk_history
        .back()
        .map(|prev_risk| clip(state.risk_score - prev_risk, -1.0, 1.0))
        .unwrap_or(0.0);
    state.risk_score = clip(
        0.35 * state.s
            + 0.25 * state.v.abs().min(1.0)
            + 0.20 * inputs.complexity
            + 0.15 * (drift_clamped / 2.0)
            + 0.05 * slope,
        0.0,
        1.0,
    );

    // 3. Bounded histories + void_active.
    state.risk_history.push(state.risk_score);
    state.coherence_history.push(state.coherence);
    state.void_active = state.v.abs() > config.void_active_threshold;

    // 4. Regime.
    state.regime = derive_regime(state, prev_s, prev_i, config);

    // 5. Health status.
    let health = if state.void_active
        || state.risk_score >= config.risk_reject_threshold
        || state.coherence <= config.coherence_critical_threshold
    {
        HealthStatus::Critical
    } else if state.risk_score >= config.risk_revise_threshold
        || state.coherence <= config.coherence_warning_threshold
    {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };
    state.health_status = health;

    // 6. Decision + guidance.
    let mut guidance = Vec::new();
    let decision = if state.risk_score >= config.risk_reject_threshold
        || state.coherence <= config.coherence_critical_threshold
    {
        guidance.push("reduce complexity".to_string());
        guidance.push("reflect before continuing".to_string());
        Decision::Reject
    } else if state.void_active && state.risk_score >= config.risk_revise_threshold {
        guidance.push("pause and let void dissipate".to_string());
        Decision::Pause
    } else if (state.risk_score >= config.risk_approve_threshold && state.risk_score < config.risk_revise_threshold)
        || (state.coherence <= config.coherence_warning_threshold && state.coherence > config.coherence_critical_threshold)
    {
        guidance.push("reduce complexity".to_string());
        Decision::Guide
    } else {
        Decision::Proceed
    };

    // 7 (continued in step()). 8. Record decision + loop detection.
    let loop_detected = detect_loop(state, decision, config, now);

    state.update_count += 1;
    state.recent_update_timestamps.push(now);
    state.last_response_at = Some(now);
    state.response_completed = true;

    (decision, health, guidance, loop_detected)
}

/// Counts alternations (sign changes) between consecutive decisions in the window: a
/// decision sequence that flips back and forth (e.g. guide/proceed/guide/proceed) never
/// forms a consecutive run but still oscillates at high frequency.
fn oscillation_count(recent: &[Decision]) -> usize {
    recent.windows(2).filter(|pair| pair[0] != pair[1]).count()
}

fn detect_loop(state: &mut AgentState, decision: Decision, config: &GovernanceConfig, now: DateTime<Utc>) -> bool {
    state.recent_decisions.push(decision);
    let recent: Vec<Decision> = state.recent_decisions.as_vec();
    let run_len = recent
        .iter()
        .rev()
        .take_while(|d| **d == decision)
        .count();
    let window: Vec<Decision> = recent.iter().rev().take(config.loop_threshold.max(2) * 2).cloned().collect();
    let alternations = oscillation_count(&window);
    let oscillating = window.len() >= config.loop_threshold.max(2) && alternations >= window.len() - 1;
    let detected = run_len >= config.loop_threshold || oscillating;
    if detected {
        state.loop_detected_at = Some(now);
        state.loop_cooldown_until = Some(now + chrono::Duration::seconds(config.loop_cooldown_secs));
    }
    detected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> GovernanceConfig {
        GovernanceConfig::default()
    }

    fn inputs(complexity: f64, drift: f64) -> StepInputs {
        StepInputs {
            e_input: 0.6,
            i_input: 0.6,
            s_input: 0.2,
            confidence: 0.6,
            complexity,
            ethical_drift_norm: drift,
            task_context: None,
        }
    }

    #[test]
    fn eisv_scalars_stay_in_range() {
        let config = cfg();
        let mut state = AgentState::new(config.history_window);
        let now = Utc::now();
        for _ in 0..20 {
            step(&mut state, inputs(0.9, 1.8), &config, now);
            assert!((0.0..=1.0).contains(&state.e));
            assert!((0.0..=1.0).contains(&state.i));
            assert!((0.0..=1.0).contains(&state.s));
            assert!((0.0..=1.0).contains(&state.coherence));
            assert!((0.0..=1.0).contains(&state.risk_score));
        }
    }

    #[test]
    fn high_complexity_low_coherence_raises_risk() {
        let config = cfg();
        let mut low_complexity_state = AgentState::new(config.history_window);
        let mut high_complexity_state = AgentState::new(config.history_window);
        let now = Utc::now();

        for _ in 0..5 {
            step(&mut low_complexity_state, inputs(0.1, 0.1), &config, now);
            step(&mut high_complexity_state, inputs(0.95, 1.9), &config, now);
        }

        assert!(high_complexity_state.risk_score > low_complexity_state.risk_score);
        assert!(high_complexity_state.s > low_complexity_state.s);
    }

    #[test]
    fn persistent_high_e_low_i_accumulates_void_strain() {
        let config = cfg();
        let mut state = AgentState::new(config.history_window);
        let now = Utc::now();
        for _ in 0..15 {
            step(
                &mut state,
                StepInputs {
                    e_input: 0.95,
                    i_input: 0.1,
                    s_input: 0.2,
                    confidence: 0.5,
                    complexity: 0.3,
                    ethical_drift_norm: 0.2,
                    task_context: None,
                },
                &config,
                now,
            );
        }
        assert!(state.v > 0.0, "expected positive void strain, got {}", state.v);
    }

    #[test]
    fn balanced_e_i_relaxes_void_toward_zero() {
        let config = cfg();
        let mut state = AgentState::new(config.history_window);
        state.v = 1.0;
        let now = Utc::now();
        for _ in 0..30 {
            step(
                &mut state,
                StepInputs {
                    e_input: 0.5,
                    i_input: 0.5,
                    s_input: 0.2,
                    confidence: 0.6,
                    complexity: 0.2,
                    ethical_drift_norm: 0.1,
                    task_context: None,
                },
                &config,
                now,
            );
        }
        assert!(state.v.abs() < 0.2, "expected void to relax, got {}", state.v);
    }

    #[test]
    fn low_drift_high_integrity_raises_coherence() {
        let config = cfg();
        let mut good_state = AgentState::new(config.history_window);
        let mut bad_state = AgentState::new(config.history_window);
        let now = Utc::now();
        for _ in 0..10 {
            step(
                &mut good_state,
                StepInputs {
                    e_input: 0.6,
                    i_input: 0.9,
                    s_input: 0.1,
                    confidence: 0.8,
                    complexity: 0.2,
                    ethical_drift_norm: 0.05,
                    task_context: None,
                },
                &config,
                now,
            );
            step(
                &mut bad_state,
                StepInputs {
                    e_input: 0.6,
                    i_input: 0.1,
                    s_input: 0.8,
                    confidence: 0.2,
                    complexity: 0.8,
                    ethical_drift_norm: 1.8,
                    task_context: None,
                },
                &config,
                now,
            );
        }
        assert!(good_state.coherence > bad_state.coherence);
    }

    #[test]
    fn loop_detection_forces_guide_with_cooldown() {
        let config = cfg();
        let mut state = AgentState::new(config.history_window);
        let now = Utc::now();
        let mut last_outcome = None;
        for _ in 0..(config.loop_threshold + 2) {
            last_outcome = Some(step(&mut state, inputs(0.95, 1.9), &config, now));
        }
        let outcome = last_outcome.unwrap();
        assert!(outcome.loop_detected);

        // Next call within cooldown must return guide without advancing update_count.
        let count_before = state.update_count;
        let cooled = step(&mut state, inputs(0.1, 0.1), &config, now);
        assert_eq!(cooled.decision, Decision::Guide);
        assert_eq!(state.update_count, count_before);
    }

    #[test]
    fn simulate_does_not_mutate_original_state() {
        let config = cfg();
        let state = AgentState::new(config.history_window);
        let before = state.update_count;
        let (_next, _outcome) = simulate(&state, inputs(0.5, 0.5), &config, Utc::now());
        assert_eq!(state.update_count, before);
    }

    #[test]
    fn margin_is_bounded() {
        let config = cfg();
        assert!((-1.0..=1.0).contains(&compute_margin(0.0, 1.0, &config)));
        assert!((-1.0..=1.0).contains(&compute_margin(1.0, 0.0, &config)));
    }
}
