//! The full seven-step pipeline (spec.md §4.11), wired end to end: unwrap,
//! alias resolve, validate/coerce, rate-limit + loop short-circuit, session
//! pin injection, dispatch, shape.

use chrono::{DateTime, Utc};
use serde_json::Value;

use unitares_identity::{IdentityResolver, ResolvedIdentity};
use unitares_store::UnitaresStore;

use crate::alias::resolve_alias;
use crate::envelope::{shape_error, shape_success};
use crate::error::{DispatchError, DispatchResult};
use crate::ratelimit::RateLimiter;
use crate::schema::{validate_and_coerce, ToolSchema};
use crate::unwrap::unwrap_kwargs;

/// A tool's static contract: its validation schema and whether it mutates
/// state (read-only tools skip rate limiting, per spec.md §4.11 step 4 and
/// §5 "Dispatch, validation, rate-limiting, and read-only queries do not hold
/// the lock").
pub struct ToolSpec {
    pub name: &'static str,
    pub schema: ToolSchema,
    pub read_only: bool,
}

/// A resolved, validated call ready for a handler to execute.
pub struct DispatchedCall {
    pub identity: ResolvedIdentity,
    pub arguments: Value,
    pub coercions: Vec<String>,
    pub migration_note: Option<String>,
    pub user_agent: Option<String>,
}

pub type ToolHandler<'h> = dyn Fn(&DispatchedCall) -> DispatchResult<Value> + 'h;

/// Shared, reusable pipeline state: the identity resolver and the rate
/// limiter outlive any single call.
pub struct DispatchContext<'a> {
    pub store: &'a UnitaresStore,
    pub resolver: &'a IdentityResolver,
    pub limiter: &'a RateLimiter,
}

fn resolve_call(
    ctx: &DispatchContext,
    spec: &ToolSpec,
    arguments: Value,
    session_key: &str,
    user_agent: Option<&str>,
    now: DateTime<Utc>,
) -> DispatchResult<DispatchedCall> {
    let unwrapped = unwrap_kwargs(arguments)?;
    let (_resolved_name, arguments, migration_note) = resolve_alias(spec.name, unwrapped);

    let (arguments, coercions) = validate_and_coerce(&spec.schema, arguments)?;

    let client_session_id = arguments.get("client_session_id").and_then(Value::as_str).map(str::to_string);

    let session_key_for_resolve = client_session_id
        .clone()
        .or_else(|| ctx.resolver.lookup_pin_for_session_key(session_key, now))
        .unwrap_or_else(|| session_key.to_string());

    let model_type = arguments.get("model_type").and_then(Value::as_str);
    let client_hint = arguments.get("client_hint").and_then(Value::as_str);
    let identity = ctx.resolver.resolve(ctx.store, &session_key_for_resolve, model_type, client_hint, now, true)?;

    if !spec.read_only {
        ctx.limiter.check(&identity.agent_id, spec.name, now)?;
    }

    Ok(DispatchedCall { identity, arguments, coercions, migration_note, user_agent: user_agent.map(str::to_string) })
}

/// Runs the full pipeline for one call and shapes the result into the RPC
/// envelope. `handler` receives the resolved identity and validated
/// arguments (spec.md §4.11 step 6); it is never invoked if an earlier stage
/// rejects the call.
pub fn dispatch_request(
    ctx: &DispatchContext,
    spec: &ToolSpec,
    arguments: Value,
    session_key: &str,
    user_agent: Option<&str>,
    handler: &ToolHandler,
    now: DateTime<Utc>,
) -> Value {
    let call = match resolve_call(ctx, spec, arguments, session_key, user_agent, now) {
        Ok(call) => call,
        Err(err) => return shape_error(&err, None),
    };

    match handler(&call) {
        Ok(mut payload) => {
            if let (Some(note), Value::Object(ref mut map)) = (&call.migration_note, &mut payload) {
                map.entry("migration_note").or_insert_with(|| Value::String(note.clone()));
            }
            if !call.coercions.is_empty() {
                if let Value::Object(ref mut map) = payload {
                    map.entry("coerced_fields").or_insert_with(|| serde_json::json!(call.coercions));
                }
            }
            shape_success(payload)
        }
        Err(err) => shape_error(&err, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSpec, FieldType};
    use serde_json::json;

    fn ctx_fixture(store: &UnitaresStore, resolver: &IdentityResolver, limiter: &RateLimiter) -> DispatchContext<'_> {
        DispatchContext { store, resolver, limiter }
    }

    const ECHO_SCHEMA: ToolSchema = ToolSchema { fields: &[FieldSpec::required("msg", FieldType::String)] };

    #[test]
    fn happy_path_resolves_identity_and_invokes_handler() {
        let store = UnitaresStore::open_temporary().unwrap();
        let resolver = IdentityResolver::new(3600, 1800);
        let limiter = RateLimiter::default();
        let ctx = ctx_fixture(&store, &resolver, &limiter);
        let spec = ToolSpec { name: "echo_tool", schema: ECHO_SCHEMA.clone(), read_only: true };

        let response = dispatch_request(
            &ctx,
            &spec,
            json!({"msg": "hi"}),
            "session-key-1",
            None,
            &|call: &DispatchedCall| Ok(json!({"echoed": call.arguments["msg"]})),
            Utc::now(),
        );

        assert_eq!(response["success"], true);
        assert_eq!(response["echoed"], "hi");
    }

    #[test]
    fn missing_field_short_circuits_before_handler_runs() {
        let store = UnitaresStore::open_temporary().unwrap();
        let resolver = IdentityResolver::new(3600, 1800);
        let limiter = RateLimiter::default();
        let ctx = ctx_fixture(&store, &resolver, &limiter);
        let spec = ToolSpec { name: "echo_tool", schema: ECHO_SCHEMA.clone(), read_only: true };

        let response = dispatch_request(
            &ctx,
            &spec,
            json!({}),
            "session-key-1",
            None,
            &|_: &DispatchedCall| panic!("handler should not run"),
            Utc::now(),
        );

        assert_eq!(response["success"], false);
        assert_eq!(response["error_code"], "MISSING_FIELD");
    }

    #[test]
    fn kwargs_wrapped_arguments_are_unwrapped_before_validation() {
        let store = UnitaresStore::open_temporary().unwrap();
        let resolver = IdentityResolver::new(3600, 1800);
        let limiter = RateLimiter::default();
        let ctx = ctx_fixture(&store, &resolver, &limiter);
        let spec = ToolSpec { name: "echo_tool", schema: ECHO_SCHEMA.clone(), read_only: true };

        let response = dispatch_request(
            &ctx,
            &spec,
            json!({"kwargs": {"msg": "wrapped"}}),
            "session-key-2",
            None,
            &|call: &DispatchedCall| Ok(json!({"echoed": call.arguments["msg"]})),
            Utc::now(),
        );

        assert_eq!(response["echoed"], "wrapped");
    }

    #[test]
    fn rate_limited_write_tool_short_circuits() {
        let store = UnitaresStore::open_temporary().unwrap();
        let resolver = IdentityResolver::new(3600, 1800);
        let limiter = RateLimiter::new(1.0, 0.0, 100, 60);
        let ctx = ctx_fixture(&store, &resolver, &limiter);
        let spec = ToolSpec { name: "echo_tool", schema: ECHO_SCHEMA.clone(), read_only: false };
        let now = Utc::now();

        let first = dispatch_request(&ctx, &spec, json!({"msg": "a", "client_session_id": "agent-x"}), "s", None, &|_| Ok(json!({})), now);
        assert_eq!(first["success"], true);

        let second = dispatch_request(&ctx, &spec, json!({"msg": "b", "client_session_id": "agent-x"}), "s", None, &|_| Ok(json!({})), now);
        assert_eq!(second["success"], false);
        assert_eq!(second["error_code"], "RATE_LIMITED");
    }
}
