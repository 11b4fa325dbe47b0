use super::Command;
use crate::blackboard::Value;
use crate::error::GraphError;
use crate::graph::{Connection, ConnectionChange, Node, NodeGraph, NodeId, Position, RemovedNodes};
use itertools::Itertools;
use std::collections::BTreeMap;

#[derive(Debug)]
pub struct AddNodeCommand {
    node: Node,
}

impl AddNodeCommand {
    /// `node` must already carry its final id so that redo re-creates the same node.
    pub fn new(node: Node) -> Self {
        Self { node }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node.id
    }
}

impl Command for AddNodeCommand {
    fn label(&self) -> String {
        format!("Add {}", self.node.template.display_name)
    }

    fn execute(&mut self, graph: &mut NodeGraph) -> Result<(), GraphError> {
        graph.insert_node(self.node.clone(), None)
    }

    fn undo(&mut self, graph: &mut NodeGraph) {
        if let Err(e) = graph.remove_nodes(std::slice::from_ref(&self.node.id)) {
            tracing::error!(node_id = %self.node.id, error = %e, "Failed to undo node insertion");
        }
    }
}

#[derive(Debug)]
pub struct RemoveNodesCommand {
    ids: Vec<NodeId>,
    removed: Option<RemovedNodes>,
}

impl RemoveNodesCommand {
    pub fn new(ids: Vec<NodeId>) -> Self {
        Self { ids, removed: None }
    }
}

impl Command for RemoveNodesCommand {
    fn label(&self) -> String {
        match self.ids.len() {
            1 => "Remove node".to_string(),
            n => format!("Remove {} nodes", n),
        }
    }

    fn execute(&mut self, graph: &mut NodeGraph) -> Result<(), GraphError> {
        self.removed = Some(graph.remove_nodes(&self.ids)?);
        Ok(())
    }

    fn undo(&mut self, graph: &mut NodeGraph) {
        if let Some(removed) = self.removed.take() {
            graph.restore_nodes(&removed);
        }
    }
}

#[derive(Debug)]
pub struct MoveNodesCommand {
    moves: BTreeMap<NodeId, Position>,
    previous: BTreeMap<NodeId, Position>,
}

impl MoveNodesCommand {
    pub fn new(moves: BTreeMap<NodeId, Position>) -> Self {
        Self {
            moves,
            previous: BTreeMap::new(),
        }
    }
}

impl Command for MoveNodesCommand {
    fn label(&self) -> String {
        match self.moves.len() {
            1 => "Move node".to_string(),
            n => format!("Move {} nodes", n),
        }
    }

    fn execute(&mut self, graph: &mut NodeGraph) -> Result<(), GraphError> {
        self.previous = graph.move_nodes(&self.moves)?;
        Ok(())
    }

    fn undo(&mut self, graph: &mut NodeGraph) {
        if let Err(e) = graph.move_nodes(&self.previous) {
            tracing::error!(error = %e, "Failed to undo node move");
        }
    }
}

#[derive(Debug)]
pub struct AddConnectionCommand {
    connection: Connection,
    change: Option<ConnectionChange>,
}

impl AddConnectionCommand {
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            change: None,
        }
    }
}

impl Command for AddConnectionCommand {
    fn label(&self) -> String {
        format!("Connect {}", self.connection.id())
    }

    fn execute(&mut self, graph: &mut NodeGraph) -> Result<(), GraphError> {
        self.change = Some(graph.connect(self.connection.clone())?);
        Ok(())
    }

    fn undo(&mut self, graph: &mut NodeGraph) {
        if let Some(change) = self.change.take() {
            graph.revert_connect(&change);
        }
    }
}

/// Removes one or more connections as a single step.
#[derive(Debug)]
pub struct RemoveConnectionsCommand {
    connections: Vec<Connection>,
    changes: Vec<ConnectionChange>,
}

impl RemoveConnectionsCommand {
    pub fn new(connections: Vec<Connection>) -> Self {
        Self {
            connections: connections.into_iter().unique_by(Connection::id).collect(),
            changes: Vec::new(),
        }
    }
}

impl Command for RemoveConnectionsCommand {
    fn label(&self) -> String {
        match self.connections.as_slice() {
            [single] => format!("Disconnect {}", single.id()),
            many => format!("Remove {} connections", many.len()),
        }
    }

    fn execute(&mut self, graph: &mut NodeGraph) -> Result<(), GraphError> {
        for connection in &self.connections {
            if graph.connection(&connection.id()).is_none() {
                return Err(GraphError::ConnectionNotFound {
                    from: connection.from.clone(),
                    to: connection.to.clone(),
                });
            }
        }
        self.changes.clear();
        for connection in &self.connections {
            let change = graph.disconnect_id(&connection.id())?;
            self.changes.push(change);
        }
        Ok(())
    }

    fn undo(&mut self, graph: &mut NodeGraph) {
        for change in self.changes.drain(..).rev() {
            graph.revert_disconnect(&change);
        }
    }
}

#[derive(Debug)]
pub struct SetNodePropertyCommand {
    node_id: NodeId,
    key: String,
    value: Option<Value>,
    previous: Option<Value>,
}

impl SetNodePropertyCommand {
    /// `None` clears the entry.
    pub fn new(node_id: &str, key: &str, value: Option<Value>) -> Self {
        Self {
            node_id: node_id.to_string(),
            key: key.to_string(),
            value,
            previous: None,
        }
    }
}

impl Command for SetNodePropertyCommand {
    fn label(&self) -> String {
        format!("Set {}.{}", self.node_id, self.key)
    }

    fn execute(&mut self, graph: &mut NodeGraph) -> Result<(), GraphError> {
        self.previous = graph.set_property(&self.node_id, &self.key, self.value.clone())?;
        Ok(())
    }

    fn undo(&mut self, graph: &mut NodeGraph) {
        if let Err(e) = graph.set_property(&self.node_id, &self.key, self.previous.take()) {
            tracing::error!(node_id = %self.node_id, error = %e, "Failed to undo property change");
        }
    }
}
