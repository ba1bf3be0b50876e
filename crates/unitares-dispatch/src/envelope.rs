//! Response shaping into the one RPC envelope (spec.md §6 "RPC surface",
//! §4.11 step 7 "Shape").

use serde_json::{json, Value};

use crate::error::DispatchError;

/// Arrays longer than this are truncated with a trailing marker entry, so a
/// single oversized payload never blows up a client's response buffer.
pub const MAX_ARRAY_LEN: usize = 500;

/// Strips anything that looks like a filesystem path or an internal module
/// name out of an error message before it reaches a caller.
fn sanitize_message(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    for token in message.split_whitespace() {
        let looks_like_path = token.contains('/') && (token.starts_with('/') || token.contains(".rs"));
        let looks_like_module_path = token.contains("::");
        if looks_like_path || looks_like_module_path {
            out.push_str("<redacted>");
        } else {
            out.push_str(token);
        }
        out.push(' ');
    }
    out.trim_end().to_string()
}

/// Recursively normalizes a value for JSON transport: truncates over-length
/// arrays with a marker entry. Objects/strings/numbers pass through; serde_json
/// already maps Rust sets/enums/datetimes to arrays/strings during `to_value`.
fn shape_value(value: Value) -> Value {
    match value {
        Value::Array(mut items) => {
            let truncated = items.len() > MAX_ARRAY_LEN;
            if truncated {
                items.truncate(MAX_ARRAY_LEN);
            }
            let mut shaped: Vec<Value> = items.into_iter().map(shape_value).collect();
            if truncated {
                shaped.push(json!({"_truncated": true}));
            }
            Value::Array(shaped)
        }
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, shape_value(v))).collect()),
        other => other,
    }
}

/// Builds the `{success: true, ...}` envelope from a handler's JSON payload.
pub fn shape_success(payload: Value) -> Value {
    let mut shaped = shape_value(payload);
    if let Value::Object(ref mut map) = shaped {
        map.insert("success".to_string(), Value::Bool(true));
        shaped
    } else {
        json!({"success": true, "result": shaped})
    }
}

/// Builds the `{success: false, error, error_code, error_category, recovery?, context?}`
/// envelope from a [`DispatchError`], sanitizing the message.
pub fn shape_error(err: &DispatchError, context: Option<Value>) -> Value {
    let mut envelope = json!({
        "success": false,
        "error": sanitize_message(&err.to_string()),
        "error_code": err.error_code(),
        "error_category": err.category(),
    });
    if let Some(recovery) = err.recovery_hint() {
        envelope["recovery"] = json!(recovery);
    }
    if let Some(context) = context {
        envelope["context"] = shape_value(context);
    }
    envelope
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_merges_success_flag_into_object_payload() {
        let shaped = shape_success(json!({"agent_id": "agent-1"}));
        assert_eq!(shaped["success"], true);
        assert_eq!(shaped["agent_id"], "agent-1");
    }

    #[test]
    fn error_envelope_sanitizes_paths_and_module_names() {
        let err = DispatchError::Handler("failed at /root/crate/src/foo.rs in unitares_core::eisv::step".to_string());
        let shaped = shape_error(&err, None);
        let message = shaped["error"].as_str().unwrap();
        assert!(!message.contains("/root"));
        assert!(!message.contains("::"));
        assert_eq!(shaped["error_code"], "HANDLER_ERROR");
    }

    #[test]
    fn oversized_arrays_are_truncated_with_marker() {
        let items: Vec<Value> = (0..600).map(Value::from).collect();
        let shaped = shape_value(Value::Array(items));
        let arr = shaped.as_array().unwrap();
        assert_eq!(arr.len(), MAX_ARRAY_LEN + 1);
        assert_eq!(arr.last().unwrap()["_truncated"], true);
    }
}
