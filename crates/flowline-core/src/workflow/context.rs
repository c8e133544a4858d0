//! Workflow run context with dot-path access and a separate metadata namespace.
//!
//! `WorkflowContext` is the mutable state threaded through one run. Action
//! outputs are merged into it, interpolation and conditions read from it, and
//! it is snapshotted to JSON for suspension and queued work units.
//!
//! The context is a single-writer value: parallel branches must take a
//! `fork()` before dispatch, never share one instance.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Metadata key holding per-target jump counters for loop fencing.
pub const LOOP_COUNTERS_KEY: &str = "loop_counters";

/// Metadata key holding the trigger type of the run.
pub const TRIGGER_TYPE_KEY: &str = "trigger_type";

const REF_TAG: &str = "$ref";
const KEY_TAG: &str = "$key";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("invalid context path: '{0}'")]
    InvalidPath(String),
}

// ---------------------------------------------------------------------------
// Entity references
// ---------------------------------------------------------------------------

/// Identity of a domain object held by reference rather than by value.
///
/// Stored in the context as `{"$ref": kind, "$key": key}` so the object
/// itself is never copied into run state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: String,
    pub key: String,
}

impl EntityRef {
    pub fn new(kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            key: key.into(),
        }
    }

    pub fn to_value(&self) -> Value {
        json!({ REF_TAG: self.kind, KEY_TAG: self.key })
    }

    /// Recognize a tagged reference object.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        if obj.len() != 2 {
            return None;
        }
        let kind = obj.get(REF_TAG)?.as_str()?;
        let key = match obj.get(KEY_TAG)? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        Some(Self::new(kind, key))
    }

    /// The key, used when a reference is rendered into a string.
    pub fn identity(&self) -> &str {
        &self.key
    }
}

// ---------------------------------------------------------------------------
// WorkflowContext
// ---------------------------------------------------------------------------

/// Ordered key/value store addressed by dot-paths (`a.b.c`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowContext {
    data: Map<String, Value>,
    metadata: Map<String, Value>,
}

impl WorkflowContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a JSON value. Non-object values yield an empty context.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(data) => Self {
                data,
                metadata: Map::new(),
            },
            _ => Self::default(),
        }
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    // -----------------------------------------------------------------------
    // Data access
    // -----------------------------------------------------------------------

    /// Resolve a dot-path. Numeric segments index into arrays.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.data.get(first)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Resolve a dot-path, falling back to `default` when absent.
    pub fn get_or(&self, path: &str, default: Value) -> Value {
        self.get(path).cloned().unwrap_or(default)
    }

    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Write `value` at a dot-path, creating intermediate maps as needed.
    ///
    /// The path is validated before anything is touched, so an error leaves
    /// the context unchanged.
    pub fn set(&mut self, path: &str, value: Value) -> Result<(), ContextError> {
        let segments = parse_path(path)?;
        set_in_map(&mut self.data, &segments, value);
        Ok(())
    }

    /// Deep-merge a map into the data: nested objects merge recursively,
    /// any other value replaces what was there.
    pub fn merge(&mut self, other: Map<String, Value>) {
        deep_merge(&mut self.data, other);
    }

    /// Store a domain reference at `path`.
    pub fn set_ref(&mut self, path: &str, entity: &EntityRef) -> Result<(), ContextError> {
        self.set(path, entity.to_value())
    }

    pub fn get_ref(&self, path: &str) -> Option<EntityRef> {
        self.get(path).and_then(EntityRef::from_value)
    }

    // -----------------------------------------------------------------------
    // Metadata
    // -----------------------------------------------------------------------

    pub fn get_meta(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Trigger type recorded in metadata, `"manual"` when unset.
    pub fn trigger_type(&self) -> &str {
        self.metadata
            .get(TRIGGER_TYPE_KEY)
            .and_then(Value::as_str)
            .unwrap_or("manual")
    }

    // -----------------------------------------------------------------------
    // Loop fencing
    // -----------------------------------------------------------------------

    /// Bump and return the jump counter for `target`.
    pub fn record_visit(&mut self, target: &str) -> u32 {
        let counters = self
            .metadata
            .entry(LOOP_COUNTERS_KEY)
            .or_insert_with(|| Value::Object(Map::new()));
        if !counters.is_object() {
            *counters = Value::Object(Map::new());
        }
        let Value::Object(map) = counters else {
            return 0;
        };
        let next = map
            .get(target)
            .and_then(Value::as_u64)
            .map_or(1, |n| n.saturating_add(1));
        map.insert(target.to_string(), json!(next));
        u32::try_from(next).unwrap_or(u32::MAX)
    }

    pub fn visits(&self, target: &str) -> u32 {
        self.metadata
            .get(LOOP_COUNTERS_KEY)
            .and_then(|c| c.get(target))
            .and_then(Value::as_u64)
            .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX))
    }

    /// Clear all jump counters. Called at the start of every run.
    pub fn reset_visits(&mut self) {
        self.metadata.remove(LOOP_COUNTERS_KEY);
    }

    // -----------------------------------------------------------------------
    // Branching and snapshots
    // -----------------------------------------------------------------------

    /// Independent copy for a parallel branch.
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Snapshot data and metadata together.
    pub fn to_json(&self) -> Value {
        json!({ "data": self.data, "metadata": self.metadata })
    }

    /// Restore a snapshot produced by `to_json`.
    pub fn from_json(snapshot: &Value) -> Self {
        let take = |key: &str| {
            snapshot
                .get(key)
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default()
        };
        Self {
            data: take("data"),
            metadata: take("metadata"),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_path(path: &str) -> Result<Vec<&str>, ContextError> {
    let segments: Vec<&str> = path.split('.').collect();
    if path.is_empty() || segments.iter().any(|s| s.trim().is_empty()) {
        return Err(ContextError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

fn set_in_map(map: &mut Map<String, Value>, segments: &[&str], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        map.insert((*head).to_string(), value);
        return;
    }
    let child = map
        .entry(*head)
        .or_insert_with(|| Value::Object(Map::new()));
    set_in_value(child, rest, value);
}

fn set_in_value(target: &mut Value, segments: &[&str], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };

    // Existing arrays are addressed by in-bounds numeric segments.
    if let Value::Array(items) = target {
        if let Some(item) = head.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
            if rest.is_empty() {
                *item = value;
            } else {
                set_in_value(item, rest, value);
            }
            return;
        }
    }

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        set_in_map(map, segments, value);
    }
}

fn deep_merge(target: &mut Map<String, Value>, incoming: Map<String, Value>) {
    for (key, value) in incoming {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(nested)) => deep_merge(existing, nested),
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let mut ctx = WorkflowContext::new();
        for (path, value) in [
            ("a", json!(1)),
            ("a.b", json!(5)),
            ("x.y.z", json!("deep")),
            ("list", json!([1, 2, 3])),
            ("flag", json!(true)),
            ("nothing", Value::Null),
        ] {
            ctx.set(path, value.clone()).unwrap();
            assert_eq!(ctx.get(path), Some(&value), "path {path}");
        }
    }

    #[test]
    fn set_creates_intermediate_maps() {
        let mut ctx = WorkflowContext::new();
        ctx.set("order.customer.email", json!("a@b.c")).unwrap();
        assert!(ctx.get("order").unwrap().is_object());
        assert_eq!(ctx.get("order.customer.email"), Some(&json!("a@b.c")));
    }

    #[test]
    fn set_replaces_scalar_intermediate() {
        let mut ctx = WorkflowContext::new();
        ctx.set("a", json!(1)).unwrap();
        ctx.set("a.b", json!(2)).unwrap();
        assert_eq!(ctx.get("a"), Some(&json!({ "b": 2 })));
    }

    #[test]
    fn invalid_path_leaves_context_untouched() {
        let mut ctx = WorkflowContext::from_value(json!({ "a": 1 }));
        let before = ctx.clone();
        assert!(ctx.set("", json!(1)).is_err());
        assert!(ctx.set("a..b", json!(1)).is_err());
        assert!(ctx.set("a.", json!(1)).is_err());
        assert_eq!(ctx, before);
    }

    #[test]
    fn numeric_segments_index_arrays() {
        let mut ctx = WorkflowContext::from_value(json!({ "items": [{ "sku": "A" }, { "sku": "B" }] }));
        assert_eq!(ctx.get("items.1.sku"), Some(&json!("B")));
        assert!(ctx.get("items.5.sku").is_none());

        ctx.set("items.0.sku", json!("Z")).unwrap();
        assert_eq!(ctx.get("items.0.sku"), Some(&json!("Z")));
    }

    #[test]
    fn get_or_and_has() {
        let ctx = WorkflowContext::from_value(json!({ "a": { "b": null } }));
        assert!(ctx.has("a.b"));
        assert!(!ctx.has("a.c"));
        assert_eq!(ctx.get_or("a.c", json!("fallback")), json!("fallback"));
    }

    #[test]
    fn merge_is_deep_for_objects() {
        let mut ctx = WorkflowContext::from_value(json!({ "user": { "name": "Ann", "age": 30 }, "n": 1 }));
        let incoming = json!({ "user": { "age": 31 }, "n": [1] });
        ctx.merge(incoming.as_object().unwrap().clone());

        assert_eq!(ctx.get("user.name"), Some(&json!("Ann")));
        assert_eq!(ctx.get("user.age"), Some(&json!(31)));
        assert_eq!(ctx.get("n"), Some(&json!([1])));
    }

    #[test]
    fn metadata_is_separate_namespace() {
        let mut ctx = WorkflowContext::new();
        ctx.set_meta("event", json!("order.paid"));
        assert!(!ctx.has("event"));
        assert_eq!(ctx.get_meta("event"), Some(&json!("order.paid")));
        assert_eq!(ctx.trigger_type(), "manual");
    }

    #[test]
    fn fork_is_independent() {
        let mut ctx = WorkflowContext::from_value(json!({ "a": 1 }));
        let mut branch = ctx.fork();
        branch.set("a", json!(2)).unwrap();
        ctx.set("b", json!(3)).unwrap();

        assert_eq!(ctx.get("a"), Some(&json!(1)));
        assert_eq!(branch.get("a"), Some(&json!(2)));
        assert!(!branch.has("b"));
    }

    #[test]
    fn snapshot_round_trip_keeps_metadata() {
        let mut ctx = WorkflowContext::from_value(json!({ "a": { "b": 5 } }));
        ctx.set_meta("trigger_type", json!("event"));
        let restored = WorkflowContext::from_json(&ctx.to_json());
        assert_eq!(restored, ctx);
        assert_eq!(restored.trigger_type(), "event");
    }

    #[test]
    fn entity_refs_are_tagged() {
        let mut ctx = WorkflowContext::new();
        let order = EntityRef::new("order", "42");
        ctx.set_ref("order", &order).unwrap();

        assert_eq!(ctx.get("order.$ref"), Some(&json!("order")));
        assert_eq!(ctx.get_ref("order"), Some(order.clone()));
        assert_eq!(order.identity(), "42");
        assert!(EntityRef::from_value(&json!({ "$ref": "x" })).is_none());
    }

    #[test]
    fn visit_counters_increment_and_reset() {
        let mut ctx = WorkflowContext::new();
        assert_eq!(ctx.record_visit("loop"), 1);
        assert_eq!(ctx.record_visit("loop"), 2);
        assert_eq!(ctx.record_visit("other"), 1);
        assert_eq!(ctx.visits("loop"), 2);

        ctx.reset_visits();
        assert_eq!(ctx.visits("loop"), 0);
    }
}
