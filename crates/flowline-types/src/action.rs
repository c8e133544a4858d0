//! Action results and the routing signals the engine interprets.
//!
//! An action reports success or failure, an output map that is merged into
//! the run context, and a `Routing` decision. Routing is an exhaustive enum
//! so the router's dispatch is checked at compile time.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Describes what a suspended run is waiting for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaitDescriptor {
    /// Name of the external event that resumes the run.
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Caller-defined value used to match the resuming event to this run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<Value>,
    /// Node the resumed walk starts at instead of the one after the wait.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_node_id: Option<String>,
    /// `continue`, `fail` or `goto`, kept for whoever expires the wait.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_node_id: Option<String>,
}

/// Control-flow signal returned alongside an action result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Routing {
    /// Advance to the next node by ascending order.
    #[default]
    Continue,
    /// Jump to the node with this `node_id`.
    JumpTo {
        node_id: String,
        /// Per-target visit limit; falls back to the engine default.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_loops: Option<u32>,
    },
    /// Dispatch one independent continuation per node id and end this walk.
    Fork { node_ids: Vec<String> },
    /// Persist the run as waiting and end the walk.
    Suspend(WaitDescriptor),
}

impl Routing {
    pub fn is_continue(&self) -> bool {
        matches!(self, Routing::Continue)
    }

    /// Flat metadata view of the signal, recorded in action log output.
    pub fn to_metadata(&self) -> Map<String, Value> {
        let mut meta = Map::new();
        match self {
            Routing::Continue => {}
            Routing::JumpTo { node_id, max_loops } => {
                meta.insert("next_node_id".into(), json!(node_id));
                if let Some(max) = max_loops {
                    meta.insert("max_loops".into(), json!(max));
                }
            }
            Routing::Fork { node_ids } => {
                meta.insert("branch_node_ids".into(), json!(node_ids));
            }
            Routing::Suspend(wait) => {
                meta.insert("wait_for_event".into(), json!(wait));
            }
        }
        meta
    }
}

// ---------------------------------------------------------------------------
// ActionResult
// ---------------------------------------------------------------------------

/// Outcome of a single action execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Merged into the run context when `success` is true.
    #[serde(default)]
    pub output: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Routing::is_continue")]
    pub routing: Routing,
    /// Fault detail when the handler failed or panicked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    pub fn success(output: Map<String, Value>) -> Self {
        Self {
            success: true,
            message: None,
            output,
            routing: Routing::Continue,
            error: None,
        }
    }

    pub fn success_with_message(message: impl Into<String>, output: Map<String, Value>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::success(output)
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            message: Some(message.clone()),
            output: Map::new(),
            routing: Routing::Continue,
            error: Some(message),
        }
    }

    /// A failed result that keeps a separate fault detail.
    pub fn fault(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            error: Some(detail.into()),
            ..Self::failure(message)
        }
    }

    pub fn with_routing(mut self, routing: Routing) -> Self {
        self.routing = routing;
        self
    }

    pub fn jump_to(node_id: impl Into<String>, max_loops: Option<u32>) -> Self {
        Self::success(Map::new()).with_routing(Routing::JumpTo {
            node_id: node_id.into(),
            max_loops,
        })
    }

    pub fn fork(node_ids: Vec<String>) -> Self {
        Self::success(Map::new()).with_routing(Routing::Fork { node_ids })
    }

    pub fn suspend(wait: WaitDescriptor) -> Self {
        Self::success(Map::new()).with_routing(Routing::Suspend(wait))
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn is_failure(&self) -> bool {
        !self.success
    }

    /// Output plus routing metadata, as recorded in the execution log.
    pub fn log_output(&self) -> Value {
        let mut out = self.output.clone();
        for (key, value) in self.routing.to_metadata() {
            out.insert(key, value);
        }
        Value::Object(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_carries_message_as_error() {
        let r = ActionResult::failure("boom");
        assert!(r.is_failure());
        assert_eq!(r.message.as_deref(), Some("boom"));
        assert_eq!(r.error.as_deref(), Some("boom"));
    }

    #[test]
    fn routing_metadata_uses_signal_keys() {
        let jump = Routing::JumpTo {
            node_id: "c".into(),
            max_loops: Some(3),
        };
        let meta = jump.to_metadata();
        assert_eq!(meta["next_node_id"], "c");
        assert_eq!(meta["max_loops"], 3);

        let fork = Routing::Fork {
            node_ids: vec!["b1".into(), "b2".into()],
        };
        assert_eq!(fork.to_metadata()["branch_node_ids"], json!(["b1", "b2"]));

        assert!(Routing::Continue.to_metadata().is_empty());
    }

    #[test]
    fn routing_serializes_tagged() {
        let value = serde_json::to_value(Routing::Suspend(WaitDescriptor {
            event: "approved".into(),
            timeout_secs: Some(60),
            ..WaitDescriptor::default()
        }))
        .unwrap();
        assert_eq!(value["kind"], "suspend");
        assert_eq!(value["event"], "approved");

        let parsed: Routing = serde_json::from_value(value).unwrap();
        assert!(matches!(parsed, Routing::Suspend(w) if w.event == "approved"));
    }

    #[test]
    fn log_output_includes_routing() {
        let mut output = Map::new();
        output.insert("x".into(), json!(1));
        let r = ActionResult::success(output).with_routing(Routing::JumpTo {
            node_id: "a".into(),
            max_loops: None,
        });
        let logged = r.log_output();
        assert_eq!(logged["x"], 1);
        assert_eq!(logged["next_node_id"], "a");
    }
}
