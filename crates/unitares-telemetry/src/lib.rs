pub mod error;
pub mod events;

pub use error::{TelemetryError, TelemetryResult};
pub use events::{
    backfill_from_jsonl, fts_search, query, record_event, skip_rate_metrics, BackfillReport, QueryParams,
    SkipRateMetrics, TelemetryEvent, EVENT_AUTO_ATTEST, EVENT_AUTO_RESUME, EVENT_CALIBRATION_CHECK,
    EVENT_COMPLEXITY_DERIVATION, EVENT_CROSS_DEVICE_CALL, EVENT_DEVICE_HEALTH_CHECK, EVENT_DIALECTIC_NUDGE,
    EVENT_LAMBDA1_SKIP, EVENT_ORCHESTRATION_COMPLETE, EVENT_ORCHESTRATION_REQUEST, EVENT_RECOVERY,
};
