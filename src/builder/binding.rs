use crate::blackboard::{Blackboard, Scope, Value};
use crate::graph::NodeId;
use ahash::AHashMap;
use std::fmt;

/// What a value provider may read while a tick is in progress.
pub struct EvalScope<'a> {
    pub blackboard: &'a Blackboard,
    pub outputs: &'a AHashMap<NodeId, Value>,
}

/// Produces a property value lazily, at tick time.
pub trait ValueProvider: fmt::Debug + Send + Sync {
    fn provide(&self, scope: &EvalScope<'_>) -> Option<Value>;
}

/// Where a bound property takes its value from.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertySource {
    Constant(Value),
    BlackboardRef { name: String, scope: Scope },
    NodeOutput(NodeId),
}

impl PropertySource {
    pub fn into_provider(self) -> Box<dyn ValueProvider> {
        match self {
            PropertySource::Constant(value) => Box::new(ConstantProvider(value)),
            PropertySource::BlackboardRef { name, scope } => {
                Box::new(BlackboardProvider { name, scope })
            }
            PropertySource::NodeOutput(node_id) => Box::new(NodeOutputProvider(node_id)),
        }
    }
}

#[derive(Debug)]
struct ConstantProvider(Value);

impl ValueProvider for ConstantProvider {
    fn provide(&self, _scope: &EvalScope<'_>) -> Option<Value> {
        Some(self.0.clone())
    }
}

#[derive(Debug)]
struct BlackboardProvider {
    name: String,
    scope: Scope,
}

impl ValueProvider for BlackboardProvider {
    fn provide(&self, scope: &EvalScope<'_>) -> Option<Value> {
        scope.blackboard.get(&self.name, self.scope).cloned()
    }
}

#[derive(Debug)]
struct NodeOutputProvider(NodeId);

impl ValueProvider for NodeOutputProvider {
    fn provide(&self, scope: &EvalScope<'_>) -> Option<Value> {
        scope.outputs.get(&self.0).cloned()
    }
}

/// Collects the values of every source bound to a multiplexed slot.
#[derive(Debug)]
struct ArrayProvider(Vec<Box<dyn ValueProvider>>);

impl ValueProvider for ArrayProvider {
    fn provide(&self, scope: &EvalScope<'_>) -> Option<Value> {
        Some(Value::Array(
            self.0.iter().filter_map(|p| p.provide(scope)).collect(),
        ))
    }
}

/// A property slot bound to one or more sources.
#[derive(Debug)]
pub struct Binding {
    sources: Vec<PropertySource>,
    provider: Box<dyn ValueProvider>,
}

impl Binding {
    /// A multiplexed slot always yields an array, even with a single source.
    pub(crate) fn new(sources: Vec<PropertySource>, multiplexed: bool) -> Self {
        let provider: Box<dyn ValueProvider> = if sources.len() == 1 && !multiplexed {
            sources[0].clone().into_provider()
        } else {
            Box::new(ArrayProvider(
                sources.iter().cloned().map(PropertySource::into_provider).collect(),
            ))
        };
        Self { sources, provider }
    }

    pub fn sources(&self) -> &[PropertySource] {
        &self.sources
    }

    pub fn provide(&self, scope: &EvalScope<'_>) -> Option<Value> {
        self.provider.provide(scope)
    }
}
