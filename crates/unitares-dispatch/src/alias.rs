//! Step 2 of the pipeline: legacy tool name resolution (spec.md §4.11 "map
//! legacy tool names to current names, optionally injecting a default
//! `action` argument for unified tools; attach a migration note").

use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;

struct Alias {
    current_name: &'static str,
    default_action: Option<&'static str>,
}

static ALIASES: Lazy<HashMap<&'static str, Alias>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("check_in", Alias { current_name: "process_agent_update", default_action: None });
    m.insert("dry_run_update", Alias { current_name: "simulate_update", default_action: None });
    m.insert("record_discovery", Alias { current_name: "store_knowledge", default_action: None });
    m.insert("graph_search", Alias { current_name: "search_knowledge", default_action: None });
    m.insert("update_discovery", Alias { current_name: "update_discovery_status_graph", default_action: Some("update") });
    m.insert("resolve_discovery", Alias { current_name: "update_discovery_status_graph", default_action: Some("resolve") });
    m.insert("request_review", Alias { current_name: "request_dialectic_review", default_action: None });
    m.insert("agent_resume", Alias { current_name: "quick_resume", default_action: None });
    m
});

/// Resolves `tool_name` to its current name. Returns `(current_name, arguments,
/// migration_note)`; `migration_note` is `Some(..)` only when an alias fired.
pub fn resolve_alias(tool_name: &str, mut arguments: Value) -> (String, Value, Option<String>) {
    let Some(alias) = ALIASES.get(tool_name) else {
        return (tool_name.to_string(), arguments, None);
    };

    if let Some(default_action) = alias.default_action {
        if let Value::Object(ref mut map) = arguments {
            map.entry("action").or_insert_with(|| Value::String(default_action.to_string()));
        }
    }

    let note = format!("'{tool_name}' is deprecated; use '{}' instead", alias.current_name);
    (alias.current_name.to_string(), arguments, Some(note))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_tool_passes_through_unchanged() {
        let (name, args, note) = resolve_alias("onboard", json!({"name": "x"}));
        assert_eq!(name, "onboard");
        assert_eq!(args, json!({"name": "x"}));
        assert!(note.is_none());
    }

    #[test]
    fn legacy_name_resolves_and_attaches_migration_note() {
        let (name, _args, note) = resolve_alias("check_in", json!({}));
        assert_eq!(name, "process_agent_update");
        assert!(note.unwrap().contains("process_agent_update"));
    }

    #[test]
    fn alias_injects_default_action_without_overriding_explicit_one() {
        let (name, args, _) = resolve_alias("resolve_discovery", json!({"discovery_id": "d1"}));
        assert_eq!(name, "update_discovery_status_graph");
        assert_eq!(args["action"], "resolve");

        let (_, args2, _) = resolve_alias("resolve_discovery", json!({"action": "archive"}));
        assert_eq!(args2["action"], "archive");
    }
}
