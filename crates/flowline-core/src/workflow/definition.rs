//! Workflow definition parsing, validation, and filesystem operations.
//!
//! Definitions are plain YAML or JSON documents deserialized straight into
//! `Workflow`. Validation checks structure only: it never consults the
//! action registry, so definitions can name application actions that are
//! registered later.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use flowline_types::config::EngineConfig;
use flowline_types::workflow::Workflow;
use serde_json::Value;
use thiserror::Error;

use super::actions::timing::delay_seconds;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DefinitionError {
    /// YAML/JSON parse failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// Structural validation failure.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn invalid(message: impl Into<String>) -> DefinitionError {
    DefinitionError::Validation(message.into())
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

pub fn parse_workflow_yaml(yaml: &str) -> Result<Workflow, DefinitionError> {
    serde_yaml_ng::from_str(yaml).map_err(|e| DefinitionError::Parse(e.to_string()))
}

pub fn parse_workflow_json(json: &str) -> Result<Workflow, DefinitionError> {
    serde_json::from_str(json).map_err(|e| DefinitionError::Parse(e.to_string()))
}

pub fn serialize_workflow_yaml(workflow: &Workflow) -> Result<String, DefinitionError> {
    serde_yaml_ng::to_string(workflow).map_err(|e| DefinitionError::Parse(e.to_string()))
}

/// Load a definition, picking the format from the file extension.
/// `.json` is JSON; anything else is read as YAML.
pub fn load_workflow_file(path: &Path) -> Result<Workflow, DefinitionError> {
    let content = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => parse_workflow_json(&content),
        _ => parse_workflow_yaml(&content),
    }
}

/// Save a definition as YAML, creating parent directories.
pub fn save_workflow_file(path: &Path, workflow: &Workflow) -> Result<(), DefinitionError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serialize_workflow_yaml(workflow)?)?;
    Ok(())
}

/// Load every `.yaml`, `.yml` and `.json` definition directly under `dir`.
///
/// Files that fail to parse are skipped with a warning.
pub fn discover_workflows(dir: &Path) -> Result<Vec<(PathBuf, Workflow)>, DefinitionError> {
    let mut found = Vec::new();
    if !dir.exists() {
        return Ok(found);
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("yaml" | "yml" | "json")
                )
        })
        .collect();
    paths.sort();

    for path in paths {
        match load_workflow_file(&path) {
            Ok(workflow) => found.push((path, workflow)),
            Err(e) => tracing::warn!(?path, error = %e, "skipping unparseable workflow file"),
        }
    }
    Ok(found)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a definition.
///
/// Checks:
/// - Name is non-empty
/// - At least one action, and no more than `limits.max_actions_per_workflow`
/// - `node_id`s are unique
/// - `goto`, `if_else` and `split` targets name existing nodes
/// - Node delays and `delay` actions stay within `actions.delay.max_delay`
pub fn validate_workflow(workflow: &Workflow, config: &EngineConfig) -> Result<(), DefinitionError> {
    if workflow.name.trim().is_empty() {
        return Err(invalid("workflow name must not be empty"));
    }

    if workflow.actions.is_empty() {
        return Err(invalid("workflow must have at least one action"));
    }
    let limit = config.limits.max_actions_per_workflow;
    if workflow.actions.len() > limit {
        return Err(invalid(format!(
            "workflow has {} actions, the limit is {limit}",
            workflow.actions.len()
        )));
    }

    let mut node_ids = HashSet::new();
    for node in &workflow.actions {
        if node.action_type.trim().is_empty() {
            return Err(invalid(format!("action {} has no type", node.id)));
        }
        if let Some(node_id) = &node.node_id {
            if !node_ids.insert(node_id.as_str()) {
                return Err(invalid(format!("duplicate node_id: '{node_id}'")));
            }
        }
    }

    let max_delay = config.actions.delay.max_delay;
    for node in &workflow.actions {
        for target in routing_targets(&node.action_type, &node.config) {
            if !node_ids.contains(target) && !is_template(target) {
                return Err(invalid(format!(
                    "{} action '{}' targets unknown node '{target}'",
                    node.action_type,
                    node.label()
                )));
            }
        }

        if node.delay > max_delay {
            return Err(invalid(format!(
                "node '{}' delay of {}s exceeds the maximum of {max_delay}s",
                node.label(),
                node.delay
            )));
        }

        if node.action_type == "delay" && !has_template(&node.config) {
            delay_seconds(&node.config, max_delay).map_err(|e| {
                invalid(format!("delay action '{}': {e}", node.label()))
            })?;
        }
    }

    Ok(())
}

/// Node ids a built-in control-flow action may route to.
fn routing_targets<'a>(action_type: &str, config: &'a Value) -> Vec<&'a str> {
    match action_type {
        "goto" => config
            .get("node_id")
            .and_then(Value::as_str)
            .into_iter()
            .collect(),
        "if_else" => ["true_node_id", "false_node_id"]
            .into_iter()
            .filter_map(|key| config.get(key).and_then(Value::as_str))
            .collect(),
        "wait_for_event" => ["continue_node_id", "timeout_node_id"]
            .into_iter()
            .filter_map(|key| config.get(key).and_then(Value::as_str))
            .collect(),
        "split" => config
            .get("branches")
            .and_then(Value::as_array)
            .map(|branches| {
                branches
                    .iter()
                    .filter_map(|b| match b {
                        Value::String(id) => Some(id.as_str()),
                        other => other.get("node_id").and_then(Value::as_str),
                    })
                    .collect()
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn is_template(s: &str) -> bool {
    s.contains("{{")
}

fn has_template(value: &Value) -> bool {
    match value {
        Value::String(s) => is_template(s),
        Value::Array(items) => items.iter().any(has_template),
        Value::Object(map) => map.values().any(has_template),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER_FLOW: &str = r#"
name: order-follow-up
description: Nudge customers about unpaid orders
triggers:
  - type: event
    config:
      event: order.created
conditions:
  - field: order.total
    operator: greater_than
    value: 100
  - field: customer.vip
    operator: is_true
    logic: or
actions:
  - node_id: check
    type: if_else
    order: 0
    config:
      field: order.paid
      operator: is_true
      true_node_id: done
  - node_id: remind
    type: set_variable
    order: 1
    delay: 3600
    config:
      name: reminded
      value: true
  - node_id: done
    type: set_variable
    order: 2
    config:
      variables:
        finished: true
"#;

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    fn check(yaml: &str) -> Result<(), DefinitionError> {
        validate_workflow(&parse_workflow_yaml(yaml)?, &config())
    }

    #[test]
    fn parses_yaml_definition() {
        let wf = parse_workflow_yaml(ORDER_FLOW).unwrap();
        assert_eq!(wf.name, "order-follow-up");
        assert!(wf.is_active);
        assert_eq!(wf.triggers[0].trigger_type, "event");
        assert_eq!(wf.conditions.len(), 2);
        assert!(wf.conditions[1].is_or());
        assert_eq!(wf.actions[1].delay, 3600);
        assert_eq!(wf.actions[0].action_type, "if_else");
        validate_workflow(&wf, &config()).unwrap();
    }

    #[test]
    fn yaml_round_trip_keeps_structure() {
        let wf = parse_workflow_yaml(ORDER_FLOW).unwrap();
        let again = parse_workflow_yaml(&serialize_workflow_yaml(&wf).unwrap()).unwrap();
        assert_eq!(again.id, wf.id);
        assert_eq!(again.actions.len(), 3);
        assert_eq!(again.actions[0].node_id.as_deref(), Some("check"));
    }

    #[test]
    fn parse_errors_are_reported() {
        let err = parse_workflow_yaml("name: [unclosed").unwrap_err();
        assert!(matches!(err, DefinitionError::Parse(_)));
        let err = parse_workflow_json("{\"actions\": []}").unwrap_err();
        assert!(matches!(err, DefinitionError::Parse(_)));
    }

    #[test]
    fn rejects_empty_name_and_no_actions() {
        let err = check("name: ''\nactions:\n  - type: goto\n").unwrap_err();
        assert!(err.to_string().contains("must not be empty"), "got: {err}");

        let err = check("name: empty\n").unwrap_err();
        assert!(err.to_string().contains("at least one action"), "got: {err}");
    }

    #[test]
    fn rejects_duplicate_node_ids() {
        let yaml = r#"
name: dupes
actions:
  - { node_id: a, type: set_variable }
  - { node_id: a, type: set_variable }
"#;
        let err = check(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate node_id"), "got: {err}");
    }

    #[test]
    fn rejects_dangling_targets() {
        let goto = "name: g\nactions:\n  - { type: goto, config: { node_id: nowhere } }\n";
        let err = check(goto).unwrap_err();
        assert!(err.to_string().contains("unknown node 'nowhere'"), "got: {err}");

        let split = r#"
name: s
actions:
  - { node_id: fan, type: split, config: { branches: [a, { node_id: b }] } }
  - { node_id: a, type: set_variable }
"#;
        let err = check(split).unwrap_err();
        assert!(err.to_string().contains("unknown node 'b'"), "got: {err}");

        let wait = "name: w\nactions:\n  - { type: wait_for_event, config: { event: ok, continue_node_id: gone } }\n";
        let err = check(wait).unwrap_err();
        assert!(err.to_string().contains("unknown node 'gone'"), "got: {err}");

        let templated = "name: t\nactions:\n  - { type: goto, config: { node_id: '{{ next }}' } }\n";
        check(templated).unwrap();
    }

    #[test]
    fn enforces_limits() {
        let mut config = config();
        config.limits.max_actions_per_workflow = 2;
        let wf = parse_workflow_yaml(ORDER_FLOW).unwrap();
        let err = validate_workflow(&wf, &config).unwrap_err();
        assert!(err.to_string().contains("the limit is 2"), "got: {err}");

        let mut config = self::config();
        config.actions.delay.max_delay = 60;
        let err = validate_workflow(&wf, &config).unwrap_err();
        assert!(err.to_string().contains("exceeds the maximum"), "got: {err}");

        let yaml = "name: d\nactions:\n  - { type: delay, config: { duration: 2, unit: fortnights } }\n";
        let err = check(yaml).unwrap_err();
        assert!(err.to_string().contains("unknown delay unit"), "got: {err}");
    }

    #[test]
    fn loads_by_extension_and_discovers() {
        let dir = tempfile::tempdir().unwrap();

        let yaml_path = dir.path().join("flows/order.yaml");
        let wf = parse_workflow_yaml(ORDER_FLOW).unwrap();
        save_workflow_file(&yaml_path, &wf).unwrap();
        assert_eq!(load_workflow_file(&yaml_path).unwrap().name, "order-follow-up");

        let json_path = dir.path().join("flows/ping.json");
        std::fs::write(
            &json_path,
            r#"{"name": "ping", "actions": [{"type": "set_variable", "config": {"name": "pong", "value": 1}}]}"#,
        )
        .unwrap();
        assert_eq!(load_workflow_file(&json_path).unwrap().name, "ping");

        std::fs::write(dir.path().join("flows/broken.yml"), "name: [").unwrap();
        std::fs::write(dir.path().join("flows/notes.txt"), "not a workflow").unwrap();

        let found = discover_workflows(&dir.path().join("flows")).unwrap();
        let names: Vec<&str> = found.iter().map(|(_, wf)| wf.name.as_str()).collect();
        assert_eq!(names, ["order-follow-up", "ping"]);

        assert!(discover_workflows(&dir.path().join("missing")).unwrap().is_empty());
        assert!(matches!(
            load_workflow_file(&dir.path().join("missing.yaml")),
            Err(DefinitionError::Io(_))
        ));
    }
}
