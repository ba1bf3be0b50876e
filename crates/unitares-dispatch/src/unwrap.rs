//! Step 1 of the pipeline: flatten a `kwargs`-wrapped argument bag (spec.md
//! §4.11 "if arguments contain a single key `kwargs`... flatten into the
//! top-level arguments"). Grounded in the CLI-vs-Claude.ai split documented in
//! `examples/original_source/src/mcp_handlers/wrapper_generator.py`: some
//! callers send `{"kwargs": {...}}` or `{"kwargs": "<json string>"}`, others
//! send arguments directly.

use serde_json::Value;

use crate::error::{DispatchError, DispatchResult};

pub fn unwrap_kwargs(arguments: Value) -> DispatchResult<Value> {
    let Value::Object(map) = &arguments else {
        return Ok(arguments);
    };
    if map.len() != 1 {
        return Ok(arguments);
    }
    let Some(kwargs) = map.get("kwargs") else {
        return Ok(arguments);
    };

    match kwargs {
        Value::Object(_) => Ok(kwargs.clone()),
        Value::String(s) => serde_json::from_str::<Value>(s)
            .map_err(|_| DispatchError::MalformedKwargs)
            .and_then(|v| if v.is_object() { Ok(v) } else { Err(DispatchError::MalformedKwargs) }),
        _ => Err(DispatchError::MalformedKwargs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_kwargs_object() {
        let out = unwrap_kwargs(json!({"kwargs": {"name": "x"}})).unwrap();
        assert_eq!(out, json!({"name": "x"}));
    }

    #[test]
    fn flattens_kwargs_json_string() {
        let out = unwrap_kwargs(json!({"kwargs": "{\"name\": \"x\"}"})).unwrap();
        assert_eq!(out, json!({"name": "x"}));
    }

    #[test]
    fn passes_through_plain_arguments() {
        let out = unwrap_kwargs(json!({"name": "x", "other": 1})).unwrap();
        assert_eq!(out, json!({"name": "x", "other": 1}));
    }

    #[test]
    fn rejects_malformed_kwargs_string() {
        let result = unwrap_kwargs(json!({"kwargs": "not json"}));
        assert!(matches!(result, Err(DispatchError::MalformedKwargs)));
    }
}
