use super::handler::{NodeContext, NodeHandler, NodeMemory, TIME_EPSILON};
use super::{LogLevel, LogLine, Status};
use crate::blackboard::{Blackboard, Scope, TypeChange, Value};
use crate::builder::{Behavior, CompositeKind, DecoratorKind, EvalScope, ExecutableTree};
use crate::error::NodeError;
use crate::graph::NodeId;
use ahash::AHashMap;
use rand::rngs::StdRng;
use std::sync::Arc;

/// Per-node state that survives between ticks.
#[derive(Debug, Clone, Default)]
pub(crate) struct NodeRuntime {
    /// Composite: index of the child to resume from.
    cursor: usize,
    /// Repeat: completed iterations. Retry: failed attempts.
    counter: u32,
    /// Leaves: time spent in the current run. Timeout: time its child has been running.
    running_time: f64,
    running: bool,
    /// Cooldown: logical time at which the child may run again.
    ready_at: Option<f64>,
    memory: NodeMemory,
}

/// What one tick produced besides node statuses.
pub(crate) struct TickOutcome {
    /// Visited nodes in post-order, aborted subtrees included.
    pub visited: Vec<usize>,
    pub logs: Vec<LogLine>,
    pub type_changes: Vec<TypeChange>,
}

/// Evaluates one tick of an executable tree.
pub(crate) struct TickRunner<'a> {
    tree: &'a ExecutableTree,
    runtime: &'a mut [NodeRuntime],
    statuses: &'a mut [Status],
    outputs: &'a mut AHashMap<NodeId, Value>,
    blackboard: &'a mut Blackboard,
    rng: &'a mut StdRng,
    logs: Vec<LogLine>,
    visited: Vec<usize>,
    type_changes: Vec<TypeChange>,
    delta_time: f64,
    now: f64,
    tick: u64,
}

impl<'a> TickRunner<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        tree: &'a ExecutableTree,
        runtime: &'a mut [NodeRuntime],
        statuses: &'a mut [Status],
        outputs: &'a mut AHashMap<NodeId, Value>,
        blackboard: &'a mut Blackboard,
        rng: &'a mut StdRng,
        delta_time: f64,
        now: f64,
        tick: u64,
    ) -> Self {
        Self {
            tree,
            runtime,
            statuses,
            outputs,
            blackboard,
            rng,
            logs: Vec::new(),
            visited: Vec::new(),
            type_changes: Vec::new(),
            delta_time,
            now,
            tick,
        }
    }

    /// Runs the tick from the root.
    pub(crate) fn run(mut self) -> TickOutcome {
        if !self.tree.is_empty() {
            self.evaluate(0);
        }
        TickOutcome {
            visited: self.visited,
            logs: self.logs,
            type_changes: self.type_changes,
        }
    }

    fn evaluate(&mut self, index: usize) -> Status {
        let tree = self.tree;
        let node = tree.node(index);
        let status = match &node.behavior {
            Behavior::Root => match node.children.first() {
                Some(&child) => self.evaluate(child),
                None => Status::Idle,
            },
            Behavior::Composite(kind) => self.composite(index, *kind),
            Behavior::Decorator(kind) => self.decorator(index, *kind),
            Behavior::Condition => self.condition(index),
            Behavior::Handler(handler) => self.leaf(index, handler.clone()),
        };
        self.statuses[index] = status;
        self.visited.push(index);
        status
    }

    fn composite(&mut self, index: usize, kind: CompositeKind) -> Status {
        let tree = self.tree;
        let children = &tree.node(index).children;
        let (proceed, settle) = match kind {
            CompositeKind::Sequence => (Status::Success, Status::Failure),
            CompositeKind::Selector => (Status::Failure, Status::Success),
        };

        let mut cursor = self.runtime[index].cursor;
        while cursor < children.len() {
            let status = self.evaluate(children[cursor]);
            if status == Status::Running {
                self.runtime[index].cursor = cursor;
                return Status::Running;
            }
            if status == settle {
                self.runtime[index].cursor = 0;
                return settle;
            }
            cursor += 1;
        }
        self.runtime[index].cursor = 0;
        proceed
    }

    fn decorator(&mut self, index: usize, kind: DecoratorKind) -> Status {
        let child = self.tree.node(index).children[0];
        match kind {
            DecoratorKind::Inverter => match self.evaluate(child) {
                Status::Success => Status::Failure,
                Status::Failure => Status::Success,
                other => other,
            },
            DecoratorKind::AlwaysSucceed => match self.evaluate(child) {
                Status::Running => Status::Running,
                _ => Status::Success,
            },
            DecoratorKind::AlwaysFail => match self.evaluate(child) {
                Status::Running => Status::Running,
                _ => Status::Failure,
            },
            DecoratorKind::Repeat => {
                let count = self.number_property(index, "count", 1.0);
                match self.evaluate(child) {
                    Status::Success => {
                        let runtime = &mut self.runtime[index];
                        runtime.counter += 1;
                        if count >= 1.0 && f64::from(runtime.counter) + TIME_EPSILON >= count {
                            runtime.counter = 0;
                            Status::Success
                        } else {
                            Status::Running
                        }
                    }
                    Status::Running => Status::Running,
                    Status::Failure | Status::Idle => {
                        self.runtime[index].counter = 0;
                        Status::Failure
                    }
                }
            }
            DecoratorKind::Retry => {
                let attempts = self.number_property(index, "attempts", 3.0).max(1.0);
                match self.evaluate(child) {
                    Status::Failure | Status::Idle => {
                        let runtime = &mut self.runtime[index];
                        runtime.counter += 1;
                        if f64::from(runtime.counter) + TIME_EPSILON >= attempts {
                            runtime.counter = 0;
                            Status::Failure
                        } else {
                            Status::Running
                        }
                    }
                    Status::Running => Status::Running,
                    Status::Success => {
                        self.runtime[index].counter = 0;
                        Status::Success
                    }
                }
            }
            DecoratorKind::Cooldown => {
                if let Some(ready_at) = self.runtime[index].ready_at {
                    if self.now + TIME_EPSILON < ready_at {
                        return Status::Failure;
                    }
                }
                let duration = self.number_property(index, "duration", 1.0);
                let status = self.evaluate(child);
                if status.is_resolved() {
                    self.runtime[index].ready_at = Some(self.now + duration);
                }
                status
            }
            DecoratorKind::Timeout => {
                let duration = self.number_property(index, "duration", 1.0);
                if self.runtime[index].running {
                    let runtime = &mut self.runtime[index];
                    runtime.running_time += self.delta_time;
                    if runtime.running_time + TIME_EPSILON >= duration {
                        runtime.running = false;
                        runtime.running_time = 0.0;
                        self.abort(child);
                        let id = &self.tree.node(index).id;
                        tracing::debug!(node_id = %id, "Timeout aborted its child");
                        return Status::Failure;
                    }
                }
                let status = self.evaluate(child);
                let runtime = &mut self.runtime[index];
                if status == Status::Running {
                    if !runtime.running {
                        runtime.running_time = 0.0;
                    }
                    runtime.running = true;
                } else {
                    runtime.running = false;
                    runtime.running_time = 0.0;
                }
                status
            }
        }
    }

    fn condition(&mut self, index: usize) -> Status {
        let tree = self.tree;
        let node = tree.node(index);
        let scope = EvalScope {
            blackboard: &*self.blackboard,
            outputs: &*self.outputs,
        };
        let key = match node.property("key", &scope) {
            Some(Value::String(key)) if !key.is_empty() => key,
            _ => {
                return self.fail(
                    index,
                    NodeError::MissingProperty {
                        node_id: node.id.clone(),
                        property: "key".to_string(),
                    },
                );
            }
        };
        let scope_name = node.property("scope", &scope);
        let variable_scope = scope_name
            .as_ref()
            .and_then(Value::as_str)
            .and_then(Scope::parse)
            .unwrap_or_default();
        let expected = node.property("value", &scope).unwrap_or_default();
        let matched = self
            .blackboard
            .get(&key, variable_scope)
            .is_some_and(|actual| actual.loosely_equals(&expected));
        Status::from_bool(matched)
    }

    fn leaf(&mut self, index: usize, handler: Arc<dyn NodeHandler>) -> Status {
        let tree = self.tree;
        let node = tree.node(index);
        let runtime = &mut self.runtime[index];
        runtime.running_time = if runtime.running {
            runtime.running_time + self.delta_time
        } else {
            self.delta_time
        };

        let mut ctx = NodeContext {
            node,
            blackboard: &mut *self.blackboard,
            outputs: &mut *self.outputs,
            memory: &mut runtime.memory,
            logs: &mut self.logs,
            type_changes: &mut self.type_changes,
            rng: &mut *self.rng,
            delta_time: self.delta_time,
            running_time: runtime.running_time,
            tick: self.tick,
        };
        let status = match handler.tick(&mut ctx) {
            Ok(Status::Idle) => Err(NodeError::Failed {
                node_id: node.id.clone(),
                message: format!("handler '{}' returned idle", handler.node_type()),
            }),
            result => result,
        };

        let status = match status {
            Ok(status) => status,
            Err(e) => self.fail(index, e),
        };
        self.runtime[index].running = status == Status::Running;
        status
    }

    /// Forces a node to failure after its logic raised an error.
    fn fail(&mut self, index: usize, error: NodeError) -> Status {
        let line = LogLine {
            tick: self.tick,
            node_id: Some(self.tree.node(index).id.clone()),
            level: LogLevel::Error,
            message: error.to_string(),
        };
        line.trace();
        self.logs.push(line);
        Status::Failure
    }

    /// Resets a subtree whose evaluation was cut short and reports it as idle.
    fn abort(&mut self, index: usize) {
        for i in self.tree.subtree(index) {
            self.runtime[i] = NodeRuntime::default();
            self.statuses[i] = Status::Idle;
            self.visited.push(i);
        }
    }

    fn number_property(&self, index: usize, name: &str, default: f64) -> f64 {
        let scope = EvalScope {
            blackboard: &*self.blackboard,
            outputs: &*self.outputs,
        };
        self.tree
            .node(index)
            .property(name, &scope)
            .as_ref()
            .and_then(Value::as_f64)
            .unwrap_or(default)
    }
}
