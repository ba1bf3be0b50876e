pub mod error;
pub mod fingerprint;
pub mod lock;
pub mod registry;
pub mod resolver;

pub use error::{IdentityError, IdentityResult};
pub use fingerprint::{extract_base_fingerprint, ua_hash_from_header};
pub use lock::{AgentLockGuard, AgentLockRegistry};
pub use registry::{run_maintenance_sweep, ProcessRegistry, WorkerEntry};
pub use resolver::{IdentityResolver, ResolvedIdentity};
