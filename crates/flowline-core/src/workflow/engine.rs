//! Workflow engine: lifecycle state machine and control-flow router.
//!
//! # Execution flow
//!
//! 1. Reject inactive workflows before any record exists.
//! 2. Create the execution (pending), publish `Started`, mark it running.
//! 3. Evaluate the gating conditions. False skips the run.
//! 4. Walk the action nodes from the lowest `order`, one node at a time:
//!    - a node with a positive `delay` is handed to the queue and the walk
//!      moves on without waiting for it
//!    - otherwise the node runs through the `ActionExecutor` and its routing
//!      signal picks the next node (continue, jump, fork, or suspend)
//!    - a failure stops the walk unless the node sets `continue_on_failure`
//! 5. Apply exactly one terminal transition: completed, failed (any failed
//!    step), or waiting (suspended).
//!
//! Repository and queue errors during a run are engine faults: the execution
//! is marked failed and `EngineError::ExecutionFailed` is returned.
//!
//! Delayed nodes and fork branches come back through [`WorkflowEngine::process`]
//! under the original execution id. They append trace entries and events but
//! never change the execution's status.
//!
//! A branch walks on from its target in default order, like the main walk,
//! and ends when the next node is another target of the same fork. Jumps
//! inside a branch are not restricted. A branch that suspends is logged and
//! dropped, since wait state belongs to the execution as a whole.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use flowline_types::action::{ActionResult, Routing, WaitDescriptor};
use flowline_types::config::{EngineConfig, ExecutionMode};
use flowline_types::error::{QueueError, RepositoryError};
use flowline_types::event::WorkflowEvent;
use flowline_types::execution::{
    Execution, ExecutionLog, ExecutionStatus, LogEntryType, LogStatus, WaitState, WorkUnit,
};
use flowline_types::workflow::{ActionNode, Workflow};
use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;
use uuid::Uuid;

use crate::event::EventBus;
use crate::repository::{WorkQueue, WorkflowRepository};

use super::actions::{self, CustomActionRegistry};
use super::condition::{ConditionError, ConditionEvaluator};
use super::conditions::{self, CustomConditionRegistry};
use super::context::{TRIGGER_TYPE_KEY, WorkflowContext};
use super::executor::ActionExecutor;
use super::interpolate::Interpolator;
use super::trigger::TriggerManager;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EngineError {
    /// Raised before any execution record is created.
    #[error("workflow '{workflow}' is inactive")]
    Inactive { workflow: String },

    #[error("condition evaluation failed: {0}")]
    Condition(#[from] ConditionError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// A run faulted after its execution record existed. The execution has
    /// already been marked failed.
    #[error("workflow '{workflow}' execution {} failed: {message}", execution.id)]
    ExecutionFailed {
        workflow: String,
        execution: Box<Execution>,
        message: String,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("execution {0} is not waiting")]
    NotWaiting(Uuid),
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// One evaluated node, in walk order.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub action_id: Uuid,
    pub node_id: Option<String>,
    pub action_type: String,
    pub status: LogStatus,
    pub result: ActionResult,
}

impl StepResult {
    fn new(node: &ActionNode, status: LogStatus, result: ActionResult) -> Self {
        Self {
            action_id: node.id,
            node_id: node.node_id.clone(),
            action_type: node.action_type.clone(),
            status,
            result,
        }
    }
}

/// Outcome of a run that reached a terminal (or waiting) state.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// False only for failed runs. Skipped and waiting runs are not failures.
    pub success: bool,
    pub status: ExecutionStatus,
    pub message: String,
    pub action_results: Vec<StepResult>,
    pub execution: Execution,
    pub context: WorkflowContext,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn is_skipped(&self) -> bool {
        self.status == ExecutionStatus::Skipped
    }

    pub fn failed_steps(&self) -> usize {
        self.action_results
            .iter()
            .filter(|s| s.result.is_failure())
            .count()
    }
}

/// What [`WorkflowEngine::process`] did with a unit of work.
#[derive(Debug, Clone)]
pub enum Processed {
    /// A whole run, executed from the queue.
    Run(Box<ExecutionResult>),
    /// A delayed node or fork branch of an existing execution.
    Continuation {
        execution_id: Uuid,
        steps: Vec<StepResult>,
    },
}

/// Per-workflow outcome of [`WorkflowEngine::trigger`].
#[derive(Debug, Clone)]
pub enum TriggerOutcome {
    Executed(Box<ExecutionResult>),
    Queued { workflow_id: Uuid, unit_id: Uuid },
    Failed { workflow_id: Uuid, error: String },
}

// ---------------------------------------------------------------------------
// Walk state
// ---------------------------------------------------------------------------

/// Where the router goes after a node.
enum Route {
    Next,
    Jump(usize),
    Fork(Vec<String>),
    Suspend(WaitDescriptor),
}

#[derive(Default)]
enum WalkEnd {
    #[default]
    Finished,
    Forked(usize),
    Suspended(WaitState),
}

#[derive(Default)]
struct Walk {
    steps: Vec<StepResult>,
    failed: usize,
    end: WalkEnd,
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn summary(steps: &[StepResult]) -> Value {
    let results = serde_json::to_value(steps).unwrap_or(Value::Null);
    json!({ "action_results": results })
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// Runs workflows against injected persistence and queue collaborators.
///
/// Generic over `R: WorkflowRepository` and `Q: WorkQueue` for storage and
/// transport flexibility.
pub struct WorkflowEngine<R: WorkflowRepository, Q: WorkQueue> {
    repo: Arc<R>,
    queue: Arc<Q>,
    executor: ActionExecutor,
    conditions: ConditionEvaluator,
    triggers: TriggerManager,
    event_bus: EventBus,
    config: Arc<EngineConfig>,
}

impl<R: WorkflowRepository, Q: WorkQueue> WorkflowEngine<R, Q> {
    /// Create an engine with every built-in action, condition and trigger.
    pub fn new(repo: Arc<R>, queue: Arc<Q>, config: EngineConfig) -> Self {
        let config = Arc::new(config);

        let mut executor = ActionExecutor::new(Interpolator::new(Arc::clone(&config)));
        actions::register_builtins(&mut executor, &config, CustomActionRegistry::new());

        let mut conditions = ConditionEvaluator::new();
        conditions::register_builtins(&mut conditions, CustomConditionRegistry::new());

        Self {
            repo,
            queue,
            executor,
            conditions,
            triggers: TriggerManager::with_builtins(),
            event_bus: EventBus::default(),
            config,
        }
    }

    pub fn with_executor(mut self, executor: ActionExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_conditions(mut self, conditions: ConditionEvaluator) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_triggers(mut self, triggers: TriggerManager) -> Self {
        self.triggers = triggers;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    /// Mutable access for registering application actions after construction.
    pub fn executor_mut(&mut self) -> &mut ActionExecutor {
        &mut self.executor
    }

    pub fn conditions(&self) -> &ConditionEvaluator {
        &self.conditions
    }

    pub fn conditions_mut(&mut self) -> &mut ConditionEvaluator {
        &mut self.conditions
    }

    pub fn triggers(&self) -> &TriggerManager {
        &self.triggers
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Run a workflow synchronously.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        mut ctx: WorkflowContext,
    ) -> Result<ExecutionResult, EngineError> {
        if !workflow.is_active {
            return Err(EngineError::Inactive {
                workflow: workflow.name.clone(),
            });
        }

        let started = Instant::now();
        ctx.reset_visits();

        let mut execution = Execution::new(workflow, ctx.trigger_type(), ctx.to_json());
        self.repo.create_execution(&execution).await?;

        self.event_bus.publish(WorkflowEvent::Started {
            execution_id: execution.id,
            workflow_id: workflow.id,
            workflow_name: workflow.name.clone(),
            trigger_type: execution.trigger_type.clone(),
        });
        tracing::info!(
            execution_id = %execution.id,
            workflow = workflow.name.as_str(),
            trigger_type = execution.trigger_type.as_str(),
            "starting workflow execution"
        );

        match self.run(workflow, &mut execution, &mut ctx, started).await {
            Ok(result) => Ok(result),
            Err(err) => Err(self.abort(workflow, execution, err).await),
        }
    }

    /// Enqueue the whole run as one unit of work. Returns the unit id.
    pub async fn execute_async(
        &self,
        workflow: &Workflow,
        ctx: WorkflowContext,
    ) -> Result<Uuid, EngineError> {
        if !workflow.is_active {
            return Err(EngineError::Inactive {
                workflow: workflow.name.clone(),
            });
        }

        let unit = WorkUnit::Run {
            workflow_id: workflow.id,
            trigger_type: ctx.trigger_type().to_string(),
            context: ctx.to_json(),
        };
        let unit_id = self
            .queue
            .enqueue(unit, &self.config.execution.queue, None)
            .await?;
        tracing::debug!(
            workflow = workflow.name.as_str(),
            unit_id = %unit_id,
            queue = self.config.execution.queue.as_str(),
            "workflow queued"
        );
        Ok(unit_id)
    }

    /// Queue-worker entry point.
    pub async fn process(&self, unit: WorkUnit) -> Result<Processed, EngineError> {
        match unit {
            WorkUnit::Run {
                workflow_id,
                trigger_type,
                context,
            } => {
                let workflow = self.load_workflow(&workflow_id).await?;
                let mut ctx = WorkflowContext::from_json(&context);
                if ctx.get_meta(TRIGGER_TYPE_KEY).is_none() {
                    ctx.set_meta(TRIGGER_TYPE_KEY, Value::String(trigger_type));
                }
                let result = self.execute(&workflow, ctx).await?;
                Ok(Processed::Run(Box::new(result)))
            }
            WorkUnit::Node {
                execution_id,
                workflow_id,
                action_id,
                context,
            } => {
                let workflow = self.load_workflow(&workflow_id).await?;
                self.load_execution(&execution_id).await?;
                let node = workflow
                    .actions
                    .iter()
                    .find(|n| n.id == action_id)
                    .ok_or_else(|| EngineError::NotFound(format!("action {action_id}")))?;

                let mut ctx = WorkflowContext::from_json(&context);
                let dispatch = self
                    .executor
                    .execute(&node.action_type, &node.config, &mut ctx)
                    .await;
                self.record_step(execution_id, node, &dispatch.input, &dispatch.result, dispatch.duration_ms)
                    .await?;

                let status = Self::step_status(&dispatch.result);
                Ok(Processed::Continuation {
                    execution_id,
                    steps: vec![StepResult::new(node, status, dispatch.result)],
                })
            }
            WorkUnit::Branch {
                execution_id,
                workflow_id,
                node_id,
                siblings,
                context,
            } => {
                let workflow = self.load_workflow(&workflow_id).await?;
                self.load_execution(&execution_id).await?;
                let start = workflow
                    .ordered_actions()
                    .iter()
                    .position(|n| n.node_id.as_deref() == Some(node_id.as_str()))
                    .ok_or_else(|| EngineError::NotFound(format!("node '{node_id}'")))?;

                let mut ctx = WorkflowContext::from_json(&context);
                let walk = self
                    .walk(&workflow, execution_id, &mut ctx, start, &siblings)
                    .await?;
                if let WalkEnd::Suspended(wait) = &walk.end {
                    tracing::warn!(
                        execution_id = %execution_id,
                        node_id = node_id.as_str(),
                        event = wait.descriptor.event.as_str(),
                        "branch suspended; branches do not persist wait state"
                    );
                }
                Ok(Processed::Continuation {
                    execution_id,
                    steps: walk.steps,
                })
            }
        }
    }

    /// Continue a waiting execution after its event arrived.
    ///
    /// The saved context is restored, `payload` is merged under `event`, and
    /// the walk resumes at the wait's `continue_node_id`, or at the node after
    /// the one that suspended when none was given.
    pub async fn resume(
        &self,
        execution_id: &Uuid,
        payload: Value,
    ) -> Result<ExecutionResult, EngineError> {
        let mut execution = self.load_execution(execution_id).await?;
        let wait = match (&execution.status, &execution.wait) {
            (ExecutionStatus::Waiting, Some(wait)) => wait.clone(),
            _ => return Err(EngineError::NotWaiting(*execution_id)),
        };
        let workflow = self.load_workflow(&execution.workflow_id).await?;

        let mut ctx = WorkflowContext::from_json(&wait.snapshot);
        let mut event = Map::new();
        event.insert("event".into(), payload);
        ctx.merge(event);

        let started = Instant::now();
        match self
            .continue_after(&workflow, &mut execution, &wait, &mut ctx, started)
            .await
        {
            Ok(result) => Ok(result),
            Err(err) => Err(self.abort(&workflow, execution, err).await),
        }
    }

    /// Start every active workflow whose `trigger_type` trigger accepts `ctx`.
    ///
    /// Runs synchronously or via the queue according to
    /// `execution.default_mode`. One workflow failing does not stop the rest.
    pub async fn trigger(
        &self,
        trigger_type: &str,
        mut ctx: WorkflowContext,
    ) -> Result<Vec<TriggerOutcome>, EngineError> {
        ctx.set_meta(TRIGGER_TYPE_KEY, Value::String(trigger_type.to_string()));
        let workflows = self.repo.list_workflows().await?;
        let matched = self.triggers.matching_workflows(&workflows, trigger_type, &ctx);
        tracing::debug!(trigger_type, matched = matched.len(), "trigger matched workflows");

        let mut outcomes = Vec::with_capacity(matched.len());
        for workflow in matched {
            let run_ctx = ctx.fork();
            let outcome = match self.config.execution.default_mode {
                ExecutionMode::Sync => match self.execute(workflow, run_ctx).await {
                    Ok(result) => TriggerOutcome::Executed(Box::new(result)),
                    Err(err) => TriggerOutcome::Failed {
                        workflow_id: workflow.id,
                        error: err.to_string(),
                    },
                },
                ExecutionMode::Async => match self.execute_async(workflow, run_ctx).await {
                    Ok(unit_id) => TriggerOutcome::Queued {
                        workflow_id: workflow.id,
                        unit_id,
                    },
                    Err(err) => TriggerOutcome::Failed {
                        workflow_id: workflow.id,
                        error: err.to_string(),
                    },
                },
            };
            if let TriggerOutcome::Failed { error, .. } = &outcome {
                tracing::warn!(workflow = workflow.name.as_str(), error = error.as_str(), "triggered run failed");
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    // -----------------------------------------------------------------------
    // Run lifecycle
    // -----------------------------------------------------------------------

    async fn run(
        &self,
        workflow: &Workflow,
        execution: &mut Execution,
        ctx: &mut WorkflowContext,
        started: Instant,
    ) -> Result<ExecutionResult, EngineError> {
        self.repo.mark_started(&execution.id).await?;
        execution.status = ExecutionStatus::Running;
        execution.started_at = Some(Utc::now());

        let trigger_log = ExecutionLog::new(execution.id, LogEntryType::Trigger, LogStatus::Success)
            .with_input(json!({ "trigger_type": execution.trigger_type }));
        self.repo.append_log(&trigger_log).await?;

        if !self.check_conditions(workflow, execution.id, ctx).await? {
            return self.skip(workflow, execution, ctx.clone(), started).await;
        }

        let walk = self.walk(workflow, execution.id, ctx, 0, &[]).await?;
        self.finish(workflow, execution, ctx.clone(), walk, started)
            .await
    }

    async fn continue_after(
        &self,
        workflow: &Workflow,
        execution: &mut Execution,
        wait: &WaitState,
        ctx: &mut WorkflowContext,
        started: Instant,
    ) -> Result<ExecutionResult, EngineError> {
        self.repo.mark_started(&execution.id).await?;
        execution.status = ExecutionStatus::Running;
        execution.wait = None;

        self.event_bus.publish(WorkflowEvent::Resumed {
            execution_id: execution.id,
            workflow_id: workflow.id,
        });
        tracing::info!(
            execution_id = %execution.id,
            event = wait.descriptor.event.as_str(),
            "resuming workflow execution"
        );

        let nodes = workflow.ordered_actions();
        let start = match wait.descriptor.continue_node_id.as_deref() {
            Some(target) => nodes
                .iter()
                .position(|n| n.node_id.as_deref() == Some(target))
                .ok_or_else(|| EngineError::NotFound(format!("node '{target}'")))?,
            None => nodes
                .iter()
                .position(|n| n.id == wait.action_id)
                .map_or(usize::MAX, |pos| pos + 1),
        };
        let walk = self.walk(workflow, execution.id, ctx, start, &[]).await?;
        self.finish(workflow, execution, ctx.clone(), walk, started)
            .await
    }

    /// Evaluate the gating conditions and record one condition trace entry.
    async fn check_conditions(
        &self,
        workflow: &Workflow,
        execution_id: Uuid,
        ctx: &WorkflowContext,
    ) -> Result<bool, EngineError> {
        let started = Instant::now();

        if workflow.conditions.is_empty() {
            let log = ExecutionLog::new(execution_id, LogEntryType::Condition, LogStatus::Success)
                .with_input(json!({ "message": "no conditions" }))
                .with_output(json!({ "result": true }))
                .with_duration(elapsed_ms(started));
            self.repo.append_log(&log).await?;
            return Ok(true);
        }

        let input = json!({ "conditions_count": workflow.conditions.len() });
        match self.conditions.evaluate(&workflow.conditions, ctx) {
            Ok(passed) => {
                let status = if passed {
                    LogStatus::Success
                } else {
                    LogStatus::Skipped
                };
                let log = ExecutionLog::new(execution_id, LogEntryType::Condition, status)
                    .with_input(input)
                    .with_output(json!({ "result": passed }))
                    .with_duration(elapsed_ms(started));
                self.repo.append_log(&log).await?;
                Ok(passed)
            }
            Err(err) => {
                let log = ExecutionLog::new(execution_id, LogEntryType::Condition, LogStatus::Failed)
                    .with_input(input)
                    .with_error(err.to_string())
                    .with_duration(elapsed_ms(started));
                self.repo.append_log(&log).await?;
                Err(err.into())
            }
        }
    }

    async fn skip(
        &self,
        workflow: &Workflow,
        execution: &mut Execution,
        ctx: WorkflowContext,
        started: Instant,
    ) -> Result<ExecutionResult, EngineError> {
        const REASON: &str = "Conditions not met";

        self.repo.mark_skipped(&execution.id, REASON).await?;
        execution.status = ExecutionStatus::Skipped;
        execution.completed_at = Some(Utc::now());
        execution.error = Some(REASON.to_string());

        self.event_bus.publish(WorkflowEvent::Skipped {
            execution_id: execution.id,
            workflow_id: workflow.id,
            reason: REASON.to_string(),
        });
        tracing::info!(execution_id = %execution.id, "workflow skipped, conditions not met");

        Ok(ExecutionResult {
            success: true,
            status: ExecutionStatus::Skipped,
            message: "Workflow conditions not met".to_string(),
            action_results: Vec::new(),
            execution: execution.clone(),
            context: ctx,
            duration_ms: elapsed_ms(started),
        })
    }

    /// Apply the single terminal (or waiting) transition for a finished walk.
    async fn finish(
        &self,
        workflow: &Workflow,
        execution: &mut Execution,
        ctx: WorkflowContext,
        walk: Walk,
        started: Instant,
    ) -> Result<ExecutionResult, EngineError> {
        let duration_ms = elapsed_ms(started);
        let Walk { steps, failed, end } = walk;

        let (success, message) = match end {
            WalkEnd::Suspended(wait) => {
                self.repo.mark_waiting(&execution.id, &wait).await?;
                let event = wait.descriptor.event.clone();
                execution.status = ExecutionStatus::Waiting;
                execution.wait = Some(wait);

                self.event_bus.publish(WorkflowEvent::Suspended {
                    execution_id: execution.id,
                    workflow_id: workflow.id,
                    event: event.clone(),
                });
                tracing::info!(
                    execution_id = %execution.id,
                    event = event.as_str(),
                    "workflow waiting for event"
                );
                (true, format!("Waiting for event '{event}'"))
            }
            _ if failed > 0 => {
                let message = format!("{failed} action(s) failed");
                self.repo
                    .mark_failed(&execution.id, &message, Some(summary(&steps)))
                    .await?;
                execution.status = ExecutionStatus::Failed;
                execution.completed_at = Some(Utc::now());
                execution.error = Some(message.clone());

                self.event_bus.publish(WorkflowEvent::Failed {
                    execution_id: execution.id,
                    workflow_id: workflow.id,
                    error: message.clone(),
                });
                if self.config.logging.enabled {
                    tracing::error!(
                        execution_id = %execution.id,
                        workflow = workflow.name.as_str(),
                        failed,
                        "workflow execution failed"
                    );
                }
                (false, message)
            }
            end => {
                let result = summary(&steps);
                self.repo.mark_completed(&execution.id, result.clone()).await?;
                execution.status = ExecutionStatus::Completed;
                execution.completed_at = Some(Utc::now());
                execution.result = Some(result);

                self.event_bus.publish(WorkflowEvent::Completed {
                    execution_id: execution.id,
                    workflow_id: workflow.id,
                    duration_ms,
                });
                let branches = match end {
                    WalkEnd::Forked(n) => n,
                    _ => 0,
                };
                tracing::info!(
                    execution_id = %execution.id,
                    steps = steps.len(),
                    branches,
                    duration_ms,
                    "workflow completed"
                );
                (true, "Workflow executed successfully".to_string())
            }
        };

        Ok(ExecutionResult {
            success,
            status: execution.status,
            message,
            action_results: steps,
            execution: execution.clone(),
            context: ctx,
            duration_ms,
        })
    }

    /// Record an engine fault as a failed execution and wrap the error.
    async fn abort(
        &self,
        workflow: &Workflow,
        mut execution: Execution,
        err: EngineError,
    ) -> EngineError {
        let message = err.to_string();
        if self.config.logging.enabled {
            tracing::error!(
                execution_id = %execution.id,
                workflow = workflow.name.as_str(),
                error = message.as_str(),
                "workflow execution failed"
            );
        }

        if let Err(e) = self.repo.mark_failed(&execution.id, &message, None).await {
            tracing::warn!(execution_id = %execution.id, error = %e, "could not record failed execution");
        }
        execution.status = ExecutionStatus::Failed;
        execution.completed_at = Some(Utc::now());
        execution.error = Some(message.clone());

        self.event_bus.publish(WorkflowEvent::Failed {
            execution_id: execution.id,
            workflow_id: workflow.id,
            error: message.clone(),
        });

        EngineError::ExecutionFailed {
            workflow: workflow.name.clone(),
            execution: Box::new(execution),
            message,
        }
    }

    // -----------------------------------------------------------------------
    // Router
    // -----------------------------------------------------------------------

    /// Walk nodes starting at position `start` of the ordered node list.
    async fn walk(
        &self,
        workflow: &Workflow,
        execution_id: Uuid,
        ctx: &mut WorkflowContext,
        start: usize,
        stop_before: &[String],
    ) -> Result<Walk, EngineError> {
        let nodes = workflow.ordered_actions();
        let index: HashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .filter_map(|(pos, n)| n.node_id.as_deref().map(|id| (id, pos)))
            .collect();

        let mut walk = Walk::default();
        let mut cursor = (start < nodes.len()).then_some(start);

        while let Some(pos) = cursor {
            let node = nodes[pos];
            // Default order never runs into a sibling branch; explicit jumps may.
            let next = nodes.get(pos + 1).and_then(|n| {
                let sibling = n
                    .node_id
                    .as_ref()
                    .is_some_and(|id| stop_before.contains(id));
                (!sibling).then_some(pos + 1)
            });

            if node.has_delay() {
                let step = self.schedule_node(workflow, execution_id, node, ctx).await?;
                walk.steps.push(step);
                cursor = next;
                continue;
            }

            tracing::debug!(execution_id = %execution_id, node = node.label(), "executing action");
            let dispatch = self
                .executor
                .execute(&node.action_type, &node.config, ctx)
                .await;
            let mut result = dispatch.result;

            let route = if result.is_success() {
                match self.plan_route(&result.routing, ctx, &index) {
                    Ok(route) => route,
                    Err(message) => {
                        tracing::warn!(
                            execution_id = %execution_id,
                            node = node.label(),
                            error = message.as_str(),
                            "routing failed"
                        );
                        result.success = false;
                        result.message = Some(message.clone());
                        result.error = Some(message);
                        Route::Next
                    }
                }
            } else {
                Route::Next
            };

            self.record_step(execution_id, node, &dispatch.input, &result, dispatch.duration_ms)
                .await?;
            let failed = result.is_failure();
            walk.steps
                .push(StepResult::new(node, Self::step_status(&result), result));

            if failed {
                walk.failed += 1;
                if !node.continue_on_failure {
                    tracing::debug!(execution_id = %execution_id, node = node.label(), "walk halted");
                    break;
                }
            }

            cursor = match route {
                Route::Next => next,
                Route::Jump(target) => Some(target),
                Route::Fork(node_ids) => {
                    let count = self
                        .dispatch_branches(workflow, execution_id, &node_ids, ctx)
                        .await?;
                    walk.end = WalkEnd::Forked(count);
                    None
                }
                Route::Suspend(descriptor) => {
                    walk.end = WalkEnd::Suspended(WaitState {
                        action_id: node.id,
                        node_id: node.node_id.clone(),
                        descriptor,
                        snapshot: ctx.to_json(),
                        since: Utc::now(),
                    });
                    None
                }
            };
        }

        Ok(walk)
    }

    /// Turn a routing signal into a decision. Errors are step failures
    /// (dangling target, exceeded loop limit, empty fork).
    fn plan_route(
        &self,
        routing: &Routing,
        ctx: &mut WorkflowContext,
        index: &HashMap<&str, usize>,
    ) -> Result<Route, String> {
        match routing {
            Routing::Continue => Ok(Route::Next),
            Routing::JumpTo { node_id, max_loops } => {
                let target = *index
                    .get(node_id.as_str())
                    .ok_or_else(|| format!("jump target '{node_id}' does not exist"))?;
                let limit = max_loops.unwrap_or(self.config.execution.max_loops);
                let visits = ctx.record_visit(node_id);
                if visits > limit {
                    return Err(format!(
                        "loop limit of {limit} exceeded for node '{node_id}'"
                    ));
                }
                Ok(Route::Jump(target))
            }
            Routing::Fork { node_ids } => {
                if node_ids.is_empty() {
                    return Err("fork without branches".to_string());
                }
                if let Some(missing) = node_ids.iter().find(|id| !index.contains_key(id.as_str())) {
                    return Err(format!("branch target '{missing}' does not exist"));
                }
                Ok(Route::Fork(node_ids.clone()))
            }
            Routing::Suspend(descriptor) => Ok(Route::Suspend(descriptor.clone())),
        }
    }

    /// Enqueue one branch unit per node id, each with its own context copy.
    async fn dispatch_branches(
        &self,
        workflow: &Workflow,
        execution_id: Uuid,
        node_ids: &[String],
        ctx: &WorkflowContext,
    ) -> Result<usize, EngineError> {
        for node_id in node_ids {
            let unit = WorkUnit::Branch {
                execution_id,
                workflow_id: workflow.id,
                node_id: node_id.clone(),
                siblings: node_ids.iter().filter(|id| *id != node_id).cloned().collect(),
                context: ctx.fork().to_json(),
            };
            self.queue
                .enqueue(unit, &self.config.execution.queue, None)
                .await?;
        }
        tracing::debug!(execution_id = %execution_id, branches = node_ids.len(), "branches dispatched");
        Ok(node_ids.len())
    }

    /// Hand a delayed node to the queue and record the `delayed` step.
    async fn schedule_node(
        &self,
        workflow: &Workflow,
        execution_id: Uuid,
        node: &ActionNode,
        ctx: &WorkflowContext,
    ) -> Result<StepResult, EngineError> {
        let unit = WorkUnit::Node {
            execution_id,
            workflow_id: workflow.id,
            action_id: node.id,
            context: ctx.to_json(),
        };
        let unit_id = self
            .queue
            .enqueue(
                unit,
                &self.config.execution.queue,
                Some(Duration::from_secs(node.delay)),
            )
            .await?;

        let mut output = Map::new();
        output.insert("delayed".into(), Value::Bool(true));
        output.insert("delay_seconds".into(), json!(node.delay));
        output.insert("unit_id".into(), json!(unit_id));
        let result =
            ActionResult::success_with_message("Action scheduled for delayed execution", output);

        let log = ExecutionLog::for_action(execution_id, node, LogStatus::Delayed)
            .with_output(Value::Object(result.output.clone()));
        self.repo.append_log(&log).await?;
        tracing::debug!(
            execution_id = %execution_id,
            node = node.label(),
            delay_secs = node.delay,
            "action delayed"
        );

        Ok(StepResult::new(node, LogStatus::Delayed, result))
    }

    /// Append the action trace entry and publish the matching event.
    async fn record_step(
        &self,
        execution_id: Uuid,
        node: &ActionNode,
        input: &Value,
        result: &ActionResult,
        duration_ms: u64,
    ) -> Result<(), EngineError> {
        let mut log = ExecutionLog::for_action(execution_id, node, Self::step_status(result))
            .with_input(input.clone())
            .with_output(result.log_output())
            .with_duration(duration_ms);

        if result.is_success() {
            self.repo.append_log(&log).await?;
            self.event_bus.publish(WorkflowEvent::ActionExecuted {
                execution_id,
                action_id: node.id,
                action_type: node.action_type.clone(),
                node_id: node.node_id.clone(),
                duration_ms,
            });
        } else {
            let error = result
                .message
                .clone()
                .or_else(|| result.error.clone())
                .unwrap_or_else(|| "action failed".to_string());
            log = log.with_error(error.clone());
            self.repo.append_log(&log).await?;
            self.event_bus.publish(WorkflowEvent::ActionFailed {
                execution_id,
                action_id: node.id,
                action_type: node.action_type.clone(),
                node_id: node.node_id.clone(),
                error,
            });
        }
        Ok(())
    }

    fn step_status(result: &ActionResult) -> LogStatus {
        if result.is_success() {
            LogStatus::Success
        } else {
            LogStatus::Failed
        }
    }

    async fn load_workflow(&self, id: &Uuid) -> Result<Workflow, EngineError> {
        self.repo
            .get_workflow(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("workflow {id}")))
    }

    async fn load_execution(&self, id: &Uuid) -> Result<Execution, EngineError> {
        self.repo
            .get_execution(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("execution {id}")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
