use super::{LogLevel, LogLine, Status};
use crate::blackboard::{Blackboard, Scope, TypeChange, Value};
use crate::builder::{CompiledNode, EvalScope};
use crate::error::NodeError;
use crate::graph::{NodeId, types};
use ahash::AHashMap;
use rand::Rng;
use rand::rngs::StdRng;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Scratch values a handler keeps between ticks. Cleared when the executor
/// stops or when the node's subtree is aborted.
pub type NodeMemory = BTreeMap<String, Value>;

/// Tolerance for comparisons of accumulated logical time.
pub(crate) const TIME_EPSILON: f64 = 1e-9;

/// Defines the logic of an action (or condition) node type.
pub trait NodeHandler: Send + Sync {
    fn node_type(&self) -> &str;
    fn tick(&self, ctx: &mut NodeContext<'_>) -> Result<Status, NodeError>;
}

/// Everything a handler may see and touch while its node is ticked.
pub struct NodeContext<'a> {
    pub(crate) node: &'a CompiledNode,
    pub(crate) blackboard: &'a mut Blackboard,
    pub(crate) outputs: &'a mut AHashMap<NodeId, Value>,
    pub(crate) memory: &'a mut NodeMemory,
    pub(crate) logs: &'a mut Vec<LogLine>,
    pub(crate) type_changes: &'a mut Vec<TypeChange>,
    pub(crate) rng: &'a mut StdRng,
    pub(crate) delta_time: f64,
    pub(crate) running_time: f64,
    pub(crate) tick: u64,
}

impl NodeContext<'_> {
    pub fn node_id(&self) -> &str {
        &self.node.id
    }

    pub fn node(&self) -> &CompiledNode {
        self.node
    }

    /// Reads a property, evaluating its binding if the slot is connected.
    pub fn property(&self, name: &str) -> Option<Value> {
        let scope = EvalScope {
            blackboard: &*self.blackboard,
            outputs: &*self.outputs,
        };
        self.node.property(name, &scope)
    }

    /// Like [`NodeContext::property`], but a missing or null value is an error.
    pub fn require(&self, name: &str) -> Result<Value, NodeError> {
        match self.property(name) {
            Some(value) if !value.is_null() => Ok(value),
            _ => Err(NodeError::MissingProperty {
                node_id: self.node.id.clone(),
                property: name.to_string(),
            }),
        }
    }

    pub fn number(&self, name: &str) -> Result<f64, NodeError> {
        let value = self.require(name)?;
        value.as_f64().ok_or_else(|| self.mismatch(name, "number", value))
    }

    pub fn string(&self, name: &str) -> Result<String, NodeError> {
        match self.require(name)? {
            Value::String(s) => Ok(s),
            other => Err(self.mismatch(name, "string", other)),
        }
    }

    /// The blackboard scope named by the `scope` property, local by default.
    pub fn scope(&self) -> Scope {
        self.property("scope")
            .as_ref()
            .and_then(Value::as_str)
            .and_then(Scope::parse)
            .unwrap_or_default()
    }

    pub fn blackboard(&self) -> &Blackboard {
        &*self.blackboard
    }

    /// Direct write access. Type changes caused through this handle are not
    /// reported; prefer [`NodeContext::set_variable`].
    pub fn blackboard_mut(&mut self) -> &mut Blackboard {
        &mut *self.blackboard
    }

    /// Writes a blackboard variable and reports a resulting type change in
    /// the tick report.
    pub fn set_variable(&mut self, name: &str, value: Value, scope: Scope) {
        if let Some(change) = self.blackboard.set(name, value, scope) {
            self.type_changes.push(change);
        }
    }

    pub fn memory(&mut self) -> &mut NodeMemory {
        &mut *self.memory
    }

    /// Publishes this node's output for `NodeOutput` bindings.
    pub fn set_output(&mut self, value: Value) {
        self.outputs.insert(self.node.id.clone(), value);
    }

    /// Emits a log line for the tick report, mirrored to `tracing`.
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        let line = LogLine {
            tick: self.tick,
            node_id: Some(self.node.id.clone()),
            level,
            message: message.into(),
        };
        line.trace();
        self.logs.push(line);
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut *self.rng
    }

    /// Logical seconds covered by this tick.
    pub fn delta_time(&self) -> f64 {
        self.delta_time
    }

    /// Logical seconds the node has been running, including this tick.
    pub fn running_time(&self) -> f64 {
        self.running_time
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    fn mismatch(&self, property: &str, expected: &str, found: Value) -> NodeError {
        NodeError::TypeMismatch {
            node_id: self.node.id.clone(),
            property: property.to_string(),
            expected: expected.to_string(),
            found,
        }
    }
}

/// Resolves to a fixed status every tick.
#[derive(Debug, Clone)]
pub struct StaticHandler {
    node_type: String,
    status: Status,
}

impl StaticHandler {
    pub fn new(node_type: &str, status: Status) -> Self {
        Self {
            node_type: node_type.to_string(),
            status,
        }
    }
}

impl NodeHandler for StaticHandler {
    fn node_type(&self) -> &str {
        &self.node_type
    }

    fn tick(&self, _ctx: &mut NodeContext<'_>) -> Result<Status, NodeError> {
        Ok(self.status)
    }
}

/// Succeeds with probability `successProbability` (or the configured default).
#[derive(Debug, Clone)]
pub struct RandomOutcome {
    node_type: String,
    success_probability: f64,
}

impl RandomOutcome {
    pub fn new(node_type: &str, success_probability: f64) -> Self {
        Self {
            node_type: node_type.to_string(),
            success_probability,
        }
    }
}

impl NodeHandler for RandomOutcome {
    fn node_type(&self) -> &str {
        &self.node_type
    }

    fn tick(&self, ctx: &mut NodeContext<'_>) -> Result<Status, NodeError> {
        let p = ctx
            .property("successProbability")
            .as_ref()
            .and_then(Value::as_f64)
            .unwrap_or(self.success_probability);
        let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
        Ok(Status::from_bool(ctx.rng().random_bool(p)))
    }
}

struct Wait;

impl NodeHandler for Wait {
    fn node_type(&self) -> &str {
        types::WAIT
    }

    fn tick(&self, ctx: &mut NodeContext<'_>) -> Result<Status, NodeError> {
        let duration = ctx.number("duration")?;
        if ctx.running_time() + TIME_EPSILON >= duration {
            Ok(Status::Success)
        } else {
            Ok(Status::Running)
        }
    }
}

struct SetVariable;

impl NodeHandler for SetVariable {
    fn node_type(&self) -> &str {
        types::SET_VARIABLE
    }

    fn tick(&self, ctx: &mut NodeContext<'_>) -> Result<Status, NodeError> {
        let key = ctx.string("key")?;
        let value = ctx.property("value").unwrap_or_default();
        let scope = ctx.scope();
        ctx.set_variable(&key, value.clone(), scope);
        ctx.set_output(value);
        Ok(Status::Success)
    }
}

struct Increment;

impl NodeHandler for Increment {
    fn node_type(&self) -> &str {
        types::INCREMENT
    }

    fn tick(&self, ctx: &mut NodeContext<'_>) -> Result<Status, NodeError> {
        let key = ctx.string("key")?;
        let amount = match ctx.property("amount") {
            None | Some(Value::Null) => 1.0,
            Some(value) => value
                .as_f64()
                .ok_or_else(|| ctx.mismatch("amount", "number", value.clone()))?,
        };
        let scope = ctx.scope();
        let current = match ctx.blackboard().get(&key, scope) {
            None | Some(Value::Null) => 0.0,
            Some(Value::Number(n)) => *n,
            Some(other) => {
                return Err(NodeError::TypeMismatch {
                    node_id: ctx.node_id().to_string(),
                    property: key,
                    expected: "number".to_string(),
                    found: other.clone(),
                });
            }
        };
        let next = Value::Number(current + amount);
        ctx.set_variable(&key, next.clone(), scope);
        ctx.set_output(next);
        Ok(Status::Success)
    }
}

struct Log;

impl NodeHandler for Log {
    fn node_type(&self) -> &str {
        types::LOG
    }

    fn tick(&self, ctx: &mut NodeContext<'_>) -> Result<Status, NodeError> {
        let message = match ctx.property("message") {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        ctx.log(LogLevel::Info, message);
        Ok(Status::Success)
    }
}

macro_rules! register_handlers {
    ($registry:ident, $( $handler:expr ),* $(,)?) => {
        $(
            let handler: Arc<dyn NodeHandler> = Arc::new($handler);
            $registry.insert(handler.node_type().to_string(), handler);
        )*
    };
}

/// Registers the handlers of every builtin action type.
pub(crate) fn register_default_handlers(registry: &mut AHashMap<String, Arc<dyn NodeHandler>>) {
    register_handlers!(
        registry,
        StaticHandler::new(types::SUCCEED, Status::Success),
        StaticHandler::new(types::FAIL, Status::Failure),
        StaticHandler::new(types::RUNNING, Status::Running),
        RandomOutcome::new(types::RANDOM_OUTCOME, 0.5),
        Wait,
        SetVariable,
        Increment,
        Log,
    );
}
