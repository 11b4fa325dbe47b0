use crate::blackboard::{Scope, Value, ValueType};
use crate::executor::ExecutorState;
use crate::graph::NodeKind;
use thiserror::Error;

/// Errors raised synchronously by node graph mutations. The graph is left
/// unchanged whenever one of these is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Node '{0}' not found in the graph")]
    NodeNotFound(String),

    #[error("A node with id '{0}' already exists")]
    DuplicateNode(String),

    #[error("The graph already has a root node")]
    DuplicateRoot,

    #[error("The root node cannot be removed")]
    RootRemoval,

    #[error("The graph has no root node '{0}'")]
    MissingRoot(String),

    #[error("The root node has {0} children, but at most one is allowed")]
    MultipleRootChildren(usize),

    #[error("Node '{0}' cannot be connected to itself")]
    SelfConnection(String),

    #[error("Connection '{0}' already exists")]
    DuplicateConnection(String),

    #[error("Connection from '{from}' to '{to}' not found")]
    ConnectionNotFound { from: String, to: String },

    #[error("The root node already has a child ('{existing}')")]
    RootAlreadyHasChild { existing: String },

    #[error("The root node cannot be the child of another node")]
    RootAsChild,

    #[error("Node '{child}' already has the parent '{parent}'")]
    AlreadyParented { child: String, parent: String },

    #[error("Node '{node_id}' of kind '{kind}' cannot have children")]
    ChildrenNotAllowed { node_id: String, kind: NodeKind },

    #[error("Decorator '{node_id}' already has a child")]
    DecoratorHasChild { node_id: String },

    #[error("Connecting '{from}' to '{to}' would create a cycle")]
    Cycle { from: String, to: String },

    #[error("Property connections into '{0}' must name a target slot")]
    MissingTargetProperty(String),

    #[error("Node '{node_id}' has no property slot named '{property}'")]
    UnknownProperty { node_id: String, property: String },

    #[error(
        "Slot '{property}' on node '{node_id}' is already connected and does not accept multiple connections"
    )]
    SlotOccupied { node_id: String, property: String },

    #[error("The graph is inconsistent: {0}")]
    Inconsistent(String),
}

/// Errors that prevent a node graph from being compiled into an executable tree.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error("Root node '{root_id}' not found in the graph")]
    NoRoot { root_id: String },

    #[error("The root node has {count} children, but at most one is allowed")]
    MultipleRootChildren { count: usize },

    #[error("Property '{property}' on node '{node_id}' could not be bound: {reason}")]
    UnresolvedBinding {
        node_id: String,
        property: String,
        reason: String,
    },

    #[error("Node '{node_id}' is reachable from itself")]
    CyclicStructure { node_id: String },

    #[error("Node '{node_id}' has an unregistered node type: '{type_name}'")]
    UnknownNodeType { node_id: String, type_name: String },

    #[error("Node '{node_id}' is malformed: {message}")]
    InvalidStructure { node_id: String, message: String },
}

/// A failure raised by a single node's logic during a tick. The executor
/// catches it, forces the node to `failure` and keeps evaluating the tree.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Node '{node_id}' requires the property '{property}'")]
    MissingProperty { node_id: String, property: String },

    #[error(
        "Property '{property}' on node '{node_id}' has the wrong type: expected {expected}, but found value '{found}'"
    )]
    TypeMismatch {
        node_id: String,
        property: String,
        expected: String,
        found: Value,
    },

    #[error("Node '{node_id}' failed: {message}")]
    Failed { node_id: String, message: String },
}

/// Errors raised by executor control operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("Cannot {action} while the executor is {state}")]
    InvalidTransition {
        action: &'static str,
        state: ExecutorState,
    },

    #[error("The executor has been destroyed")]
    Destroyed,

    #[error("Invalid executor configuration: {0}")]
    InvalidConfig(String),
}

/// Errors raised by blackboard operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlackboardError {
    #[error("Variable '{name}' is already defined in the {scope} scope")]
    DuplicateVariable { name: String, scope: Scope },

    #[error("Variable '{name}' is not defined in the {scope} scope")]
    UnknownVariable { name: String, scope: Scope },

    #[error("Variable '{name}' is declared as {declared}, but its value is {found}")]
    TypeMismatch {
        name: String,
        declared: ValueType,
        found: ValueType,
    },
}

/// Errors that can occur when encoding or decoding a tree document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    #[error("Failed to process tree document JSON: {0}")]
    Json(String),

    #[error("Binary encoding failed: {0}")]
    Encode(String),

    #[error("Binary decoding failed: {0}")]
    Decode(String),

    #[error("Node '{node_id}' references an unknown template: '{type_name}'")]
    UnknownTemplate { node_id: String, type_name: String },

    #[error("Invalid tree document: {0}")]
    Graph(#[from] GraphError),

    #[error("Invalid blackboard variable in document: {0}")]
    Blackboard(#[from] BlackboardError),
}

/// Errors surfaced by the [`Workspace`](crate::workspace::Workspace) facade.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkspaceError {
    #[error("Unknown node template: '{0}'")]
    UnknownTemplate(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Blackboard(#[from] BlackboardError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Document(#[from] DocumentError),
}
