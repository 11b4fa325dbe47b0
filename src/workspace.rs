//! The explicit context object tying one authored tree together: its graph,
//! undo history, blackboard and template registry.

use crate::blackboard::{
    Blackboard, Scope, SharedBlackboard, TypeChange, Value, ValueType, Variable,
};
use crate::builder::{ExecutableTree, TreeBuilder};
use crate::command::{
    AddConnectionCommand, AddNodeCommand, CommandManager, MoveNodesCommand,
    RemoveConnectionsCommand, RemoveNodesCommand, SetNodePropertyCommand,
};
use crate::document::TreeDocument;
use crate::error::{GraphError, WorkspaceError};
use crate::executor::{Executor, ExecutorConfig};
use crate::graph::{
    Connection, ConnectionId, Node, NodeGraph, NodeId, Position, TemplateRegistry, types,
};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeMetadata {
    pub name: String,
    pub description: String,
}

/// Reported when a variable's type change removed property connections that
/// could no longer accept it.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeCompatibilityWarning {
    pub variable: String,
    pub scope: Scope,
    pub new_type: ValueType,
    pub removed: Vec<Connection>,
}

impl TypeCompatibilityWarning {
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }
}

impl fmt::Display for TypeCompatibilityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Removed {} connection(s) bound to '{}': slots cannot accept {}",
            self.removed.len(),
            self.variable,
            self.new_type
        )
    }
}

pub struct Workspace {
    metadata: TreeMetadata,
    graph: NodeGraph,
    commands: CommandManager,
    blackboard: SharedBlackboard,
    registry: TemplateRegistry,
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workspace")
            .field("metadata", &self.metadata)
            .field("nodes", &self.graph.len())
            .field("connections", &self.graph.connections().len())
            .field("can_undo", &self.commands.can_undo())
            .finish()
    }
}

impl Workspace {
    /// A workspace with the builtin templates and a graph holding only the root.
    pub fn new(name: &str) -> Self {
        let registry = TemplateRegistry::builtin();
        let graph = registry
            .get(types::ROOT)
            .map(NodeGraph::new)
            .unwrap_or_else(NodeGraph::empty);
        Self {
            metadata: TreeMetadata {
                name: name.to_string(),
                description: String::new(),
            },
            graph,
            commands: CommandManager::new(),
            blackboard: Blackboard::shared(),
            registry,
        }
    }

    /// A workspace over a custom registry, which must provide a `root` template.
    pub fn with_registry(name: &str, registry: TemplateRegistry) -> Result<Self, WorkspaceError> {
        let root = registry
            .get(types::ROOT)
            .ok_or_else(|| WorkspaceError::UnknownTemplate(types::ROOT.to_string()))?;
        let graph = NodeGraph::new(root);
        Ok(Self {
            metadata: TreeMetadata {
                name: name.to_string(),
                description: String::new(),
            },
            graph,
            commands: CommandManager::new(),
            blackboard: Blackboard::shared(),
            registry,
        })
    }

    pub(crate) fn from_parts(
        metadata: TreeMetadata,
        graph: NodeGraph,
        blackboard: Blackboard,
        registry: TemplateRegistry,
    ) -> Self {
        Self {
            metadata,
            graph,
            commands: CommandManager::new(),
            blackboard: Rc::new(RefCell::new(blackboard)),
            registry,
        }
    }

    pub fn with_history_depth(mut self, depth: usize) -> Self {
        self.commands = CommandManager::with_depth(depth);
        self
    }

    pub fn metadata(&self) -> &TreeMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut TreeMetadata {
        &mut self.metadata
    }

    pub fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    pub fn blackboard(&self) -> &SharedBlackboard {
        &self.blackboard
    }

    pub fn commands(&self) -> &CommandManager {
        &self.commands
    }

    // --- Graph mutations ---

    /// Creates a node from the template `type_id` and returns its new id.
    pub fn add_node(
        &mut self,
        type_id: &str,
        position: Position,
        data: BTreeMap<String, Value>,
    ) -> Result<NodeId, WorkspaceError> {
        let template = self
            .registry
            .get(type_id)
            .ok_or_else(|| WorkspaceError::UnknownTemplate(type_id.to_string()))?;
        let id = self.graph.allocate_id(type_id);
        let node = Node::from_template(id.clone(), template, position, data);
        self.commands
            .execute(&mut self.graph, Box::new(AddNodeCommand::new(node)))?;
        Ok(id)
    }

    pub fn remove_nodes(&mut self, ids: &[NodeId]) -> Result<(), WorkspaceError> {
        self.commands
            .execute(&mut self.graph, Box::new(RemoveNodesCommand::new(ids.to_vec())))?;
        Ok(())
    }

    pub fn move_nodes(&mut self, moves: BTreeMap<NodeId, Position>) -> Result<(), WorkspaceError> {
        self.commands
            .execute(&mut self.graph, Box::new(MoveNodesCommand::new(moves)))?;
        Ok(())
    }

    pub fn add_connection(&mut self, connection: Connection) -> Result<ConnectionId, WorkspaceError> {
        let id = connection.id();
        self.commands
            .execute(&mut self.graph, Box::new(AddConnectionCommand::new(connection)))?;
        Ok(id)
    }

    /// Adds a structural parent to child connection.
    pub fn connect(&mut self, parent: &str, child: &str) -> Result<ConnectionId, WorkspaceError> {
        self.add_connection(Connection::node(parent, child))
    }

    /// Binds the output of `source` to the slot `property` of `target`.
    pub fn bind(
        &mut self,
        source: &str,
        target: &str,
        property: &str,
    ) -> Result<ConnectionId, WorkspaceError> {
        self.add_connection(Connection::property(source, None, target, property))
    }

    pub fn remove_connection(
        &mut self,
        from: &str,
        to: &str,
        from_property: Option<&str>,
        to_property: Option<&str>,
    ) -> Result<(), WorkspaceError> {
        let connection = self
            .graph
            .connections()
            .iter()
            .find(|c| c.matches(from, to, from_property, to_property))
            .cloned()
            .ok_or_else(|| GraphError::ConnectionNotFound {
                from: from.to_string(),
                to: to.to_string(),
            })?;
        self.commands.execute(
            &mut self.graph,
            Box::new(RemoveConnectionsCommand::new(vec![connection])),
        )?;
        Ok(())
    }

    /// Writes (`Some`) or clears (`None`) one entry of a node's data.
    pub fn set_node_property(
        &mut self,
        node_id: &str,
        key: &str,
        value: Option<Value>,
    ) -> Result<(), WorkspaceError> {
        self.commands.execute(
            &mut self.graph,
            Box::new(SetNodePropertyCommand::new(node_id, key, value)),
        )?;
        Ok(())
    }

    pub fn undo(&mut self) -> bool {
        self.commands.undo(&mut self.graph)
    }

    pub fn redo(&mut self) -> bool {
        self.commands.redo(&mut self.graph)
    }

    pub fn can_undo(&self) -> bool {
        self.commands.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.commands.can_redo()
    }

    // --- Blackboard ---

    pub fn define_variable(
        &mut self,
        name: &str,
        value_type: ValueType,
        initial: Value,
        scope: Scope,
    ) -> Result<(), WorkspaceError> {
        Blackboard::with_deferred_events(&self.blackboard, |blackboard| {
            blackboard.define(name, value_type, initial, scope)
        })?;
        Ok(())
    }

    pub fn variable(&self, name: &str, scope: Scope) -> Option<Variable> {
        self.blackboard.borrow().variable(name, scope).cloned()
    }

    /// Writes a variable. When the write changes the variable's type, every
    /// property connection it feeds into a slot that cannot hold the new type
    /// is removed through one undoable command and reported back.
    pub fn set_variable(
        &mut self,
        name: &str,
        value: Value,
        scope: Scope,
    ) -> Result<Option<TypeCompatibilityWarning>, WorkspaceError> {
        let change = Blackboard::with_deferred_events(&self.blackboard, |blackboard| {
            blackboard.set(name, value, scope)
        });
        match change {
            Some(change) => self.cascade(&change.name, change.scope),
            None => Ok(None),
        }
    }

    /// Applies the type-change cascade for changes that happened outside
    /// [`Workspace::set_variable`], such as queued writes and node writes
    /// reported by an executor. Bindings are checked against each variable's
    /// current type, so changes undone since (a local scope restored by
    /// `stop`) remove nothing.
    pub fn reconcile_type_changes(
        &mut self,
        changes: &[TypeChange],
    ) -> Result<Vec<TypeCompatibilityWarning>, WorkspaceError> {
        let mut seen = Vec::new();
        let mut warnings = Vec::new();
        for change in changes {
            let key = (change.name.as_str(), change.scope);
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);
            warnings.extend(self.cascade(&change.name, change.scope)?);
        }
        Ok(warnings)
    }

    /// Removes the property connections fed by `name` whose slots cannot hold
    /// its current type, as one undoable command.
    fn cascade(
        &mut self,
        name: &str,
        scope: Scope,
    ) -> Result<Option<TypeCompatibilityWarning>, WorkspaceError> {
        let Some(new_type) = self
            .blackboard
            .borrow()
            .variable(name, scope)
            .map(|v| v.value_type)
        else {
            return Ok(None);
        };
        let removed = self
            .graph
            .incompatible_variable_bindings(name, scope, new_type);
        if removed.is_empty() {
            return Ok(None);
        }
        self.commands.execute(
            &mut self.graph,
            Box::new(RemoveConnectionsCommand::new(removed.clone())),
        )?;

        let warning = TypeCompatibilityWarning {
            variable: name.to_string(),
            scope,
            new_type,
            removed,
        };
        tracing::warn!(
            variable = name,
            %scope,
            to = %new_type,
            removed = warning.removed_count(),
            "Removed property connections incompatible with the variable's new type"
        );
        Ok(Some(warning))
    }

    pub fn remove_variable(&mut self, name: &str, scope: Scope) -> Option<Variable> {
        Blackboard::with_deferred_events(&self.blackboard, |blackboard| {
            blackboard.remove(name, scope)
        })
    }

    /// Renames a variable and repoints the `blackboard-variable` nodes that
    /// referenced it. The node updates are undoable; the rename itself is not.
    pub fn rename_variable(&mut self, from: &str, to: &str, scope: Scope) -> Result<(), WorkspaceError> {
        Blackboard::with_deferred_events(&self.blackboard, |blackboard| {
            blackboard.rename(from, to, scope)
        })?;
        let referencing: Vec<NodeId> = self
            .graph
            .nodes()
            .filter(|n| n.variable_reference() == Some((from, scope)))
            .map(|n| n.id.clone())
            .collect();
        for id in referencing {
            self.set_node_property(&id, "variableName", Some(Value::from(to)))?;
        }
        Ok(())
    }

    /// Every variable of a scope, ordered by name.
    pub fn variables(&self, scope: Scope) -> Vec<Variable> {
        self.blackboard
            .borrow()
            .list_all(scope)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Queues a write to be applied before the next tick of a running executor.
    pub fn queue_variable_write(&self, name: &str, value: Value, scope: Scope) {
        self.blackboard.borrow_mut().queue_set(name, value, scope);
    }

    // --- Execution ---

    /// Compiles the current graph against a snapshot of the blackboard.
    pub fn build(&self, builder: &TreeBuilder) -> Result<ExecutableTree, WorkspaceError> {
        let snapshot = self.blackboard.borrow().snapshot();
        Ok(builder.build(&self.graph, &snapshot)?)
    }

    /// An executor sharing this workspace's blackboard.
    pub fn executor(&self, tree: ExecutableTree, config: ExecutorConfig) -> Executor {
        Executor::new(tree, Rc::clone(&self.blackboard), config)
    }

    pub fn to_document(&self) -> TreeDocument {
        TreeDocument::from_workspace(self)
    }
}
