//! `unitares-demo`: bootstraps one [`GovernanceServer`] and walks a single
//! agent through onboarding, a governed check-in, and a dry-run simulation,
//! printing the shaped envelopes. No network transport; this is the
//! in-process smoke test a real transport (HTTP, stdio MCP, …) would sit on
//! top of.

use chrono::Utc;
use tracing::info;
use unitares_core::GovernanceConfig;
use unitares_server::GovernanceServer;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = GovernanceConfig::default();
    let server = match std::env::var("UNITARES_STORAGE_PATH") {
        Ok(path) => {
            info!("unitares-demo: opening store at {}", path);
            GovernanceServer::open(&path, config)?
        }
        Err(_) => {
            info!("unitares-demo: UNITARES_STORAGE_PATH unset, using a temporary store");
            GovernanceServer::open_temporary(config)?
        }
    };

    let now = Utc::now();
    let session_key = "unitares-demo-session";

    let onboard = server.handle("onboard", serde_json::json!({"model_type": "claude-demo"}), session_key, None, now);
    info!(response = %onboard, "onboard");

    let update = server.handle(
        "process_agent_update",
        serde_json::json!({"e_input": 0.6, "i_input": 0.55, "s_input": 0.2, "confidence": 0.7, "complexity": 0.4}),
        session_key,
        None,
        now,
    );
    info!(response = %update, "process_agent_update");

    let simulated = server.handle(
        "simulate_update",
        serde_json::json!({"e_input": 0.3, "i_input": 0.2, "ethical_drift_norm": 1.6, "complexity": 0.9}),
        session_key,
        None,
        now,
    );
    info!(response = %simulated, "simulate_update (not persisted)");

    let metrics = server.handle("get_governance_metrics", serde_json::json!({}), session_key, None, now);
    println!("{}", serde_json::to_string_pretty(&metrics)?);

    Ok(())
}
