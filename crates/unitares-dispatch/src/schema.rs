//! Step 3 of the pipeline: per-tool validation and coercion (spec.md §4.11
//! "required fields present; types coerced (numeric strings -> numbers;
//! boolean-ish strings -> bools); ranges enforced; enumerations respected").

use serde_json::Value;

use crate::error::{DispatchError, DispatchResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Bool,
    Object,
    Array,
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub enum_values: Option<&'static [&'static str]>,
}

impl FieldSpec {
    pub const fn required(name: &'static str, field_type: FieldType) -> Self {
        Self { name, field_type, required: true, min: None, max: None, enum_values: None }
    }

    pub const fn optional(name: &'static str, field_type: FieldType) -> Self {
        Self { name, field_type, required: false, min: None, max: None, enum_values: None }
    }

    pub const fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub const fn with_enum(mut self, values: &'static [&'static str]) -> Self {
        self.enum_values = Some(values);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolSchema {
    pub fields: &'static [FieldSpec],
}

fn coerce_bool(s: &str) -> Option<bool> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Validates and coerces `arguments` against `schema`. Returns the (possibly
/// rewritten) arguments plus the list of field names where a string-to-typed
/// coercion was applied, so the caller can flag soft deprecations.
pub fn validate_and_coerce(schema: &ToolSchema, arguments: Value) -> DispatchResult<(Value, Vec<String>)> {
    let Value::Object(mut map) = arguments else {
        return Err(DispatchError::TypeMismatch {
            field: "<arguments>".to_string(),
            expected: "object".to_string(),
            actual: value_type_name(&arguments).to_string(),
        });
    };

    let mut coercions = Vec::new();

    for field in schema.fields {
        let Some(value) = map.get(field.name).cloned() else {
            if field.required {
                return Err(DispatchError::MissingField(field.name.to_string()));
            }
            continue;
        };
        if value.is_null() {
            continue;
        }

        let coerced = coerce_field(field, value, &mut coercions)?;

        if let Some(enum_values) = field.enum_values {
            let as_str = coerced.as_str().unwrap_or_default();
            if !enum_values.contains(&as_str) {
                return Err(DispatchError::InvalidEnum {
                    field: field.name.to_string(),
                    allowed: enum_values.iter().map(|s| s.to_string()).collect(),
                    actual: as_str.to_string(),
                });
            }
        }

        if let (Some(min), Some(max)) = (field.min, field.max) {
            if let Some(n) = coerced.as_f64() {
                if n < min || n > max {
                    return Err(DispatchError::OutOfRange { field: field.name.to_string(), value: n, min, max });
                }
            }
        }

        map.insert(field.name.to_string(), coerced);
    }

    Ok((Value::Object(map), coercions))
}

fn coerce_field(field: &FieldSpec, value: Value, coercions: &mut Vec<String>) -> DispatchResult<Value> {
    match (field.field_type, &value) {
        (FieldType::Number, Value::Number(_)) => Ok(value),
        (FieldType::Number, Value::String(s)) => s
            .parse::<f64>()
            .map(|n| {
                coercions.push(field.name.to_string());
                serde_json::json!(n)
            })
            .map_err(|_| DispatchError::TypeMismatch {
                field: field.name.to_string(),
                expected: "number".to_string(),
                actual: "string".to_string(),
            }),
        (FieldType::Bool, Value::Bool(_)) => Ok(value),
        (FieldType::Bool, Value::String(s)) => coerce_bool(&s)
            .map(|b| {
                coercions.push(field.name.to_string());
                Value::Bool(b)
            })
            .ok_or_else(|| DispatchError::TypeMismatch {
                field: field.name.to_string(),
                expected: "bool".to_string(),
                actual: format!("string '{s}'"),
            }),
        (FieldType::String, Value::String(_)) => Ok(value),
        (FieldType::Object, Value::Object(_)) => Ok(value),
        (FieldType::Array, Value::Array(_)) => Ok(value),
        (expected, actual) => Err(DispatchError::TypeMismatch {
            field: field.name.to_string(),
            expected: format!("{expected:?}"),
            actual: value_type_name(actual).to_string(),
        }),
    }
}

fn value_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SCHEMA: ToolSchema = ToolSchema {
        fields: &[
            FieldSpec::required("agent_id", FieldType::String),
            FieldSpec::optional("confidence", FieldType::Number).with_range(0.0, 1.0),
            FieldSpec::optional("task_type", FieldType::String).with_enum(&["coding", "research"]),
            FieldSpec::optional("force_new", FieldType::Bool),
        ],
    };

    #[test]
    fn missing_required_field_errors() {
        let result = validate_and_coerce(&SCHEMA, json!({}));
        assert!(matches!(result, Err(DispatchError::MissingField(f)) if f == "agent_id"));
    }

    #[test]
    fn coerces_numeric_and_boolean_strings_and_records_coercions() {
        let (coerced, coercions) =
            validate_and_coerce(&SCHEMA, json!({"agent_id": "a1", "confidence": "0.9", "force_new": "true"})).unwrap();
        assert_eq!(coerced["confidence"], 0.9);
        assert_eq!(coerced["force_new"], true);
        assert!(coercions.contains(&"confidence".to_string()));
        assert!(coercions.contains(&"force_new".to_string()));
    }

    #[test]
    fn enforces_range() {
        let result = validate_and_coerce(&SCHEMA, json!({"agent_id": "a1", "confidence": 1.5}));
        assert!(matches!(result, Err(DispatchError::OutOfRange { .. })));
    }

    #[test]
    fn enforces_enum() {
        let result = validate_and_coerce(&SCHEMA, json!({"agent_id": "a1", "task_type": "cooking"}));
        assert!(matches!(result, Err(DispatchError::InvalidEnum { .. })));
    }

    #[test]
    fn null_optional_field_is_skipped() {
        let (coerced, _) = validate_and_coerce(&SCHEMA, json!({"agent_id": "a1", "confidence": null})).unwrap();
        assert_eq!(coerced["confidence"], Value::Null);
    }
}
