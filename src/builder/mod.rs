//! Compiles an authored [`NodeGraph`] into an [`ExecutableTree`].

use crate::blackboard::{BlackboardSnapshot, Value};
use crate::error::BuildError;
use crate::executor::{NodeHandler, RandomOutcome, StaticHandler, Status, register_default_handlers};
use crate::graph::{Connection, Node, NodeGraph, NodeId, NodeKind, ROOT_ID, types};
use ahash::{AHashMap, AHashSet};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

mod binding;

pub use binding::{Binding, EvalScope, PropertySource, ValueProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeKind {
    Sequence,
    Selector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoratorKind {
    Inverter,
    AlwaysSucceed,
    AlwaysFail,
    Repeat,
    Retry,
    Cooldown,
    Timeout,
}

/// What a compiled node does when it is ticked.
#[derive(Clone)]
pub enum Behavior {
    Root,
    Composite(CompositeKind),
    Decorator(DecoratorKind),
    /// Compares a blackboard key with a configured value.
    Condition,
    Handler(Arc<dyn NodeHandler>),
}

impl fmt::Debug for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Behavior::Root => write!(f, "Root"),
            Behavior::Composite(kind) => write!(f, "Composite({:?})", kind),
            Behavior::Decorator(kind) => write!(f, "Decorator({:?})", kind),
            Behavior::Condition => write!(f, "Condition"),
            Behavior::Handler(handler) => write!(f, "Handler({})", handler.node_type()),
        }
    }
}

/// How action and condition types without a registered handler are compiled.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum FallbackPolicy {
    /// Fail the build with [`BuildError::UnknownNodeType`].
    #[default]
    Reject,
    Succeed,
    Fail,
    /// Resolve randomly. Meant for mock trees, never as production behavior.
    Random { success_probability: f64 },
}

#[derive(Debug)]
pub struct CompiledNode {
    pub id: NodeId,
    pub type_id: String,
    pub kind: NodeKind,
    pub behavior: Behavior,
    pub children: Vec<usize>,
    config: BTreeMap<String, Value>,
    bindings: AHashMap<String, Binding>,
}

impl CompiledNode {
    /// Resolves a property: a bound source wins over the node's own configuration.
    pub fn property(&self, name: &str, scope: &EvalScope<'_>) -> Option<Value> {
        self.bindings
            .get(name)
            .and_then(|binding| binding.provide(scope))
            .or_else(|| self.config.get(name).cloned())
    }

    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    pub fn config(&self) -> &BTreeMap<String, Value> {
        &self.config
    }
}

/// An immutable, arena-allocated compiled tree. Index 0 is the root.
#[derive(Debug)]
pub struct ExecutableTree {
    nodes: Vec<CompiledNode>,
    index: AHashMap<NodeId, usize>,
    excluded: Vec<NodeId>,
}

impl ExecutableTree {
    pub fn root(&self) -> &CompiledNode {
        &self.nodes[0]
    }

    pub fn node(&self, index: usize) -> &CompiledNode {
        &self.nodes[index]
    }

    pub fn get(&self, id: &str) -> Option<&CompiledNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in depth-first pre-order.
    pub fn iter(&self) -> impl Iterator<Item = &CompiledNode> {
        self.nodes.iter()
    }

    /// Control-flow nodes of the authored graph that are unreachable from the root.
    pub fn excluded(&self) -> &[NodeId] {
        &self.excluded
    }

    /// `index` and all of its descendants.
    pub fn subtree(&self, index: usize) -> Vec<usize> {
        let mut stack = vec![index];
        let mut result = Vec::new();
        while let Some(i) = stack.pop() {
            result.push(i);
            stack.extend(self.nodes[i].children.iter().rev());
        }
        result
    }
}

/// Validates and compiles node graphs.
///
/// ```rust,no_run
/// use koudou::builder::{FallbackPolicy, TreeBuilder};
///
/// let builder = TreeBuilder::new()
///     .with_type_mapping("MoveTo", "wait")
///     .with_fallback(FallbackPolicy::Fail);
/// ```
pub struct TreeBuilder {
    handlers: AHashMap<String, Arc<dyn NodeHandler>>,
    type_mapping: AHashMap<String, String>,
    root_id: String,
    fallback: FallbackPolicy,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        let mut handlers = AHashMap::new();
        register_default_handlers(&mut handlers);
        Self {
            handlers,
            type_mapping: AHashMap::new(),
            root_id: ROOT_ID.to_string(),
            fallback: FallbackPolicy::default(),
        }
    }

    pub fn with_root(mut self, root_id: &str) -> Self {
        self.root_id = root_id.to_string();
        self
    }

    /// Treats nodes of `user_type` as the builtin `builtin_type`.
    pub fn with_type_mapping(mut self, user_type: &str, builtin_type: &str) -> Self {
        self.type_mapping
            .insert(user_type.to_string(), builtin_type.to_string());
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn NodeHandler>) -> Self {
        self.handlers
            .insert(handler.node_type().to_string(), handler);
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    /// Compiles the tree hanging off the root. Property bindings to blackboard
    /// variables are checked against `snapshot` but read lazily at tick time.
    pub fn build(
        &self,
        graph: &NodeGraph,
        snapshot: &BlackboardSnapshot,
    ) -> Result<ExecutableTree, BuildError> {
        let root = graph.node(&self.root_id).ok_or_else(|| BuildError::NoRoot {
            root_id: self.root_id.clone(),
        })?;
        if root.children.len() > 1 {
            return Err(BuildError::MultipleRootChildren {
                count: root.children.len(),
            });
        }

        let mut compilation = Compilation {
            builder: self,
            graph,
            snapshot,
            nodes: Vec::new(),
            index: AHashMap::new(),
            visiting: AHashSet::new(),
            output_sources: Vec::new(),
        };
        compilation.compile_node(&root.id, &root.id)?;
        compilation.check_output_sources()?;

        let Compilation { nodes, index, .. } = compilation;
        let excluded: Vec<NodeId> = graph
            .nodes()
            .filter(|n| n.kind() != NodeKind::Data && !index.contains_key(&n.id))
            .map(|n| n.id.clone())
            .collect();
        tracing::debug!(
            nodes = nodes.len(),
            excluded = excluded.len(),
            "Compiled behavior tree"
        );
        Ok(ExecutableTree {
            nodes,
            index,
            excluded,
        })
    }

    fn canonical<'a>(&'a self, type_id: &'a str) -> &'a str {
        self.type_mapping
            .get(type_id)
            .map(String::as_str)
            .unwrap_or(type_id)
    }
}

struct Compilation<'a> {
    builder: &'a TreeBuilder,
    graph: &'a NodeGraph,
    snapshot: &'a BlackboardSnapshot,
    nodes: Vec<CompiledNode>,
    index: AHashMap<NodeId, usize>,
    visiting: AHashSet<NodeId>,
    /// `(target, slot, source)` of every `NodeOutput` binding.
    output_sources: Vec<(NodeId, String, NodeId)>,
}

impl Compilation<'_> {
    fn compile_node(&mut self, id: &str, parent_id: &str) -> Result<usize, BuildError> {
        if self.visiting.contains(id) {
            return Err(BuildError::CyclicStructure {
                node_id: id.to_string(),
            });
        }
        if self.index.contains_key(id) {
            return Err(BuildError::InvalidStructure {
                node_id: id.to_string(),
                message: "the node is reachable through more than one parent".to_string(),
            });
        }
        let graph = self.graph;
        let node = graph
            .node(id)
            .ok_or_else(|| BuildError::InvalidStructure {
                node_id: parent_id.to_string(),
                message: format!("child '{}' does not exist", id),
            })?;

        let behavior = self.resolve_behavior(node)?;
        let bindings = self.resolve_bindings(node)?;

        let slot = self.nodes.len();
        self.nodes.push(CompiledNode {
            id: node.id.clone(),
            type_id: node.type_id().to_string(),
            kind: node.kind(),
            behavior,
            children: Vec::new(),
            config: node.data.clone(),
            bindings,
        });
        self.index.insert(node.id.clone(), slot);
        self.visiting.insert(node.id.clone());

        let mut children = Vec::with_capacity(node.children.len());
        for child in &node.children {
            children.push(self.compile_node(child, &node.id)?);
        }
        self.nodes[slot].children = children;
        self.visiting.remove(&node.id);
        Ok(slot)
    }

    fn resolve_behavior(&self, node: &Node) -> Result<Behavior, BuildError> {
        let type_name = self.builder.canonical(node.type_id());
        let unknown = || BuildError::UnknownNodeType {
            node_id: node.id.clone(),
            type_name: node.type_id().to_string(),
        };

        let behavior = match node.kind() {
            NodeKind::Root => Behavior::Root,
            NodeKind::Composite => match type_name {
                types::SEQUENCE => Behavior::Composite(CompositeKind::Sequence),
                types::SELECTOR => Behavior::Composite(CompositeKind::Selector),
                _ => return Err(unknown()),
            },
            NodeKind::Decorator => {
                if node.children.len() != 1 {
                    return Err(BuildError::InvalidStructure {
                        node_id: node.id.clone(),
                        message: format!(
                            "a decorator needs exactly one child, found {}",
                            node.children.len()
                        ),
                    });
                }
                let kind = match type_name {
                    types::INVERTER => DecoratorKind::Inverter,
                    types::ALWAYS_SUCCEED => DecoratorKind::AlwaysSucceed,
                    types::ALWAYS_FAIL => DecoratorKind::AlwaysFail,
                    types::REPEAT => DecoratorKind::Repeat,
                    types::RETRY => DecoratorKind::Retry,
                    types::COOLDOWN => DecoratorKind::Cooldown,
                    types::TIMEOUT => DecoratorKind::Timeout,
                    _ => return Err(unknown()),
                };
                Behavior::Decorator(kind)
            }
            NodeKind::Condition => match self.builder.handlers.get(type_name) {
                Some(handler) => Behavior::Handler(handler.clone()),
                None => Behavior::Condition,
            },
            NodeKind::Action => match self.builder.handlers.get(type_name) {
                Some(handler) => Behavior::Handler(handler.clone()),
                None => self.fallback(node).ok_or_else(unknown)?,
            },
            NodeKind::Data => {
                return Err(BuildError::InvalidStructure {
                    node_id: node.id.clone(),
                    message: "data nodes cannot take part in control flow".to_string(),
                });
            }
        };
        Ok(behavior)
    }

    fn fallback(&self, node: &Node) -> Option<Behavior> {
        let handler: Arc<dyn NodeHandler> = match self.builder.fallback {
            FallbackPolicy::Reject => return None,
            FallbackPolicy::Succeed => Arc::new(StaticHandler::new(node.type_id(), Status::Success)),
            FallbackPolicy::Fail => Arc::new(StaticHandler::new(node.type_id(), Status::Failure)),
            FallbackPolicy::Random {
                success_probability,
            } => Arc::new(RandomOutcome::new(node.type_id(), success_probability)),
        };
        tracing::debug!(node_id = %node.id, type_name = %node.type_id(), "Using fallback handler");
        Some(Behavior::Handler(handler))
    }

    fn resolve_bindings(&mut self, node: &Node) -> Result<AHashMap<String, Binding>, BuildError> {
        let graph = self.graph;
        let mut grouped: BTreeMap<&str, Vec<PropertySource>> = BTreeMap::new();
        for connection in graph.property_connections_into(&node.id) {
            let Some(slot) = connection.to_property.as_deref() else {
                continue;
            };
            let source = self.resolve_source(node, slot, connection)?;
            grouped.entry(slot).or_default().push(source);
        }

        Ok(grouped
            .into_iter()
            .map(|(slot, sources)| {
                let multiplexed = node
                    .template
                    .property(slot)
                    .is_some_and(|p| p.allow_multiple_connections);
                (slot.to_string(), Binding::new(sources, multiplexed))
            })
            .collect())
    }

    fn resolve_source(
        &mut self,
        node: &Node,
        slot: &str,
        connection: &Connection,
    ) -> Result<PropertySource, BuildError> {
        let unresolved = |reason: String| BuildError::UnresolvedBinding {
            node_id: node.id.clone(),
            property: slot.to_string(),
            reason,
        };
        let graph = self.graph;
        let source = graph
            .node(&connection.from)
            .ok_or_else(|| unresolved(format!("source node '{}' does not exist", connection.from)))?;

        match self.builder.canonical(source.type_id()) {
            types::BLACKBOARD_VARIABLE => {
                let (name, scope) = source.variable_reference().ok_or_else(|| {
                    unresolved(format!("variable node '{}' names no variable", source.id))
                })?;
                if !self.snapshot.contains(name, scope) {
                    return Err(unresolved(format!(
                        "variable '{}' is not defined in the {} scope",
                        name, scope
                    )));
                }
                Ok(PropertySource::BlackboardRef {
                    name: name.to_string(),
                    scope,
                })
            }
            types::CONSTANT => Ok(PropertySource::Constant(
                source.property("value").cloned().unwrap_or_default(),
            )),
            _ if source.kind() == NodeKind::Data => Err(unresolved(format!(
                "data node '{}' of type '{}' provides no value",
                source.id,
                source.type_id()
            ))),
            _ => {
                self.output_sources
                    .push((node.id.clone(), slot.to_string(), source.id.clone()));
                Ok(PropertySource::NodeOutput(source.id.clone()))
            }
        }
    }

    /// A node output can only feed a binding when its source is compiled too.
    fn check_output_sources(&self) -> Result<(), BuildError> {
        match self
            .output_sources
            .iter()
            .find(|(_, _, source)| !self.index.contains_key(source))
        {
            Some((node_id, property, source)) => Err(BuildError::UnresolvedBinding {
                node_id: node_id.clone(),
                property: property.clone(),
                reason: format!("source node '{}' is not reachable from the root", source),
            }),
            None => Ok(()),
        }
    }
}
