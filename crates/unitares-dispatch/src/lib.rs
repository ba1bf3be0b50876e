pub mod alias;
pub mod envelope;
pub mod error;
pub mod pipeline;
pub mod ratelimit;
pub mod schema;
pub mod unwrap;

pub use alias::resolve_alias;
pub use envelope::{shape_error, shape_success, MAX_ARRAY_LEN};
pub use error::{DispatchError, DispatchResult, ErrorCategory};
pub use pipeline::{dispatch_request, DispatchContext, DispatchedCall, ToolHandler, ToolSpec};
pub use ratelimit::{RateLimiter, DEFAULT_BUCKET_CAPACITY, DEFAULT_LOOP_THRESHOLD, DEFAULT_LOOP_WINDOW_SECS, DEFAULT_REFILL_PER_SEC};
pub use schema::{validate_and_coerce, FieldSpec, FieldType, ToolSchema};
pub use unwrap::unwrap_kwargs;
