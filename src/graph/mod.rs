//! The authored node graph.
//!
//! Nodes live in a flat table keyed by id, with an insertion-ordered id list
//! next to it; parent/child structure is expressed purely through the
//! `children` id lists and their matching `node` connections. Mutating
//! methods are crate-private: outside the crate every change goes through a
//! [`Command`](crate::command::Command) so that it can be undone.

use crate::blackboard::{Scope, Value, ValueType, is_compatible};
use crate::error::GraphError;
use ahash::{AHashMap, AHashSet};
use itertools::Itertools;
use std::collections::BTreeMap;

mod connection;
mod node;
mod template;

pub use connection::{Connection, ConnectionId, ConnectionType};
pub use node::{Node, NodeId, Position, ROOT_ID};
pub use template::{NodeKind, NodeTemplate, PropertyDef, PropertyType, TemplateRegistry, types};

/// Everything a node removal deleted, kept so the removal can be reversed exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedNodes {
    nodes: Vec<(usize, Node)>,
    connections: Vec<(usize, Connection)>,
    parents: Vec<(NodeId, Vec<NodeId>)>,
}

impl RemovedNodes {
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().map(|(_, node)| node)
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter().map(|(_, connection)| connection)
    }
}

/// One connection insertion or deletion, with the parent's child order before it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionChange {
    index: usize,
    connection: Connection,
    prior_children: Option<Vec<NodeId>>,
}

impl ConnectionChange {
    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

#[derive(Debug, Clone)]
pub struct NodeGraph {
    nodes: AHashMap<NodeId, Node>,
    order: Vec<NodeId>,
    connections: Vec<Connection>,
    next_id: u64,
}

impl PartialEq for NodeGraph {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order
            && self.connections == other.connections
            && self.nodes().zip(other.nodes()).all(|(a, b)| a == b)
    }
}

impl NodeGraph {
    /// Creates a graph holding only the root node.
    pub fn new(root_template: &NodeTemplate) -> Self {
        let mut graph = Self::empty();
        let root = Node::from_template(
            ROOT_ID,
            root_template,
            Position::default(),
            BTreeMap::new(),
        );
        graph.order.push(root.id.clone());
        graph.nodes.insert(root.id.clone(), root);
        graph
    }

    pub(crate) fn empty() -> Self {
        Self {
            nodes: AHashMap::new(),
            order: Vec::new(),
            connections: Vec::new(),
            next_id: 0,
        }
    }

    /// Reassembles a graph from stored nodes (children included) and
    /// connections, then checks the whole-graph invariants.
    pub(crate) fn from_parts(
        nodes: Vec<Node>,
        connections: Vec<Connection>,
    ) -> Result<Self, GraphError> {
        let mut graph = Self::empty();
        for node in nodes {
            if graph.nodes.contains_key(&node.id) {
                return Err(GraphError::DuplicateNode(node.id));
            }
            graph.order.push(node.id.clone());
            graph.nodes.insert(node.id.clone(), node);
        }
        let mut seen = AHashSet::new();
        for connection in &connections {
            let id = connection.id();
            if connection.from == connection.to {
                return Err(GraphError::SelfConnection(connection.from.clone()));
            }
            if !seen.insert(id.clone()) {
                return Err(GraphError::DuplicateConnection(id.to_string()));
            }
        }
        graph.connections = connections;
        graph.validate()?;
        Ok(graph)
    }

    pub fn root(&self) -> Option<&Node> {
        self.nodes.get(ROOT_ID)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn connection(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.iter().find(|c| &c.id() == id)
    }

    pub fn children(&self, id: &str) -> &[NodeId] {
        self.nodes
            .get(id)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
    }

    pub fn parent_of(&self, id: &str) -> Option<&NodeId> {
        self.nodes()
            .find(|n| n.children.iter().any(|c| c == id))
            .map(|n| &n.id)
    }

    pub fn property_connections_into<'a>(
        &'a self,
        id: &'a str,
    ) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections
            .iter()
            .filter(move |c| !c.is_node() && c.to == id)
    }

    /// Property connections fed by `blackboard-variable` nodes that reference
    /// `name`, whose target slot cannot hold a value of `new_type`.
    pub fn incompatible_variable_bindings(
        &self,
        name: &str,
        scope: Scope,
        new_type: ValueType,
    ) -> Vec<Connection> {
        self.connections
            .iter()
            .filter(|c| !c.is_node())
            .filter(|c| {
                self.nodes
                    .get(&c.from)
                    .and_then(Node::variable_reference)
                    .is_some_and(|reference| reference == (name, scope))
            })
            .filter(|c| {
                self.nodes
                    .get(&c.to)
                    .zip(c.to_property.as_deref())
                    .and_then(|(target, slot)| target.template.property(slot))
                    .is_some_and(|slot| !is_compatible(new_type, slot.property_type))
            })
            .cloned()
            .collect()
    }

    /// Checks the whole-graph invariants: a single root with at most one
    /// child, children lists that agree with the node connections, at most one
    /// parent per node and no cycles.
    pub fn validate(&self) -> Result<(), GraphError> {
        let root = self
            .root()
            .ok_or_else(|| GraphError::MissingRoot(ROOT_ID.to_string()))?;
        if root.kind() != NodeKind::Root {
            return Err(GraphError::Inconsistent(format!(
                "'{}' is reserved for the root node",
                ROOT_ID
            )));
        }
        if self.nodes.values().filter(|n| n.kind() == NodeKind::Root).count() > 1 {
            return Err(GraphError::DuplicateRoot);
        }
        if root.children.len() > 1 {
            return Err(GraphError::MultipleRootChildren(root.children.len()));
        }

        let mut parents: AHashMap<&str, &str> = AHashMap::new();
        for node in self.nodes() {
            if !node.children.is_empty() && !node.kind().accepts_children() {
                return Err(GraphError::ChildrenNotAllowed {
                    node_id: node.id.clone(),
                    kind: node.kind(),
                });
            }
            if node.kind() == NodeKind::Decorator && node.children.len() > 1 {
                return Err(GraphError::DecoratorHasChild {
                    node_id: node.id.clone(),
                });
            }
            for child in &node.children {
                if !self.contains(child) {
                    return Err(GraphError::NodeNotFound(child.clone()));
                }
                if child == ROOT_ID {
                    return Err(GraphError::RootAsChild);
                }
                if let Some(previous) = parents.insert(child.as_str(), node.id.as_str()) {
                    return Err(GraphError::AlreadyParented {
                        child: child.clone(),
                        parent: previous.to_string(),
                    });
                }
                if !self
                    .connections
                    .iter()
                    .any(|c| c.is_node() && c.from == node.id && &c.to == child)
                {
                    return Err(GraphError::Inconsistent(format!(
                        "child '{}' of '{}' has no node connection",
                        child, node.id
                    )));
                }
            }
        }

        for connection in &self.connections {
            for endpoint in [&connection.from, &connection.to] {
                if !self.contains(endpoint) {
                    return Err(GraphError::NodeNotFound(endpoint.clone()));
                }
            }
            if connection.is_node() && !self.children(&connection.from).contains(&connection.to) {
                return Err(GraphError::Inconsistent(format!(
                    "connection '{}' is missing from the children of '{}'",
                    connection.id(),
                    connection.from
                )));
            }
        }

        for node in self.nodes() {
            for child in &node.children {
                if self.is_reachable(child, &node.id) {
                    return Err(GraphError::Cycle {
                        from: node.id.clone(),
                        to: child.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub(crate) fn allocate_id(&mut self, type_id: &str) -> NodeId {
        loop {
            self.next_id += 1;
            let id = format!("{}-{}", type_id, self.next_id);
            if !self.nodes.contains_key(&id) {
                return id;
            }
        }
    }

    /// Inserts a node at `index` in the insertion order, or at the end.
    pub(crate) fn insert_node(&mut self, node: Node, index: Option<usize>) -> Result<(), GraphError> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode(node.id));
        }
        if node.kind() == NodeKind::Root {
            if self.nodes.values().any(|n| n.kind() == NodeKind::Root) {
                return Err(GraphError::DuplicateRoot);
            }
            if node.id != ROOT_ID {
                return Err(GraphError::Inconsistent(format!(
                    "the root node must use the id '{}'",
                    ROOT_ID
                )));
            }
        } else if node.id == ROOT_ID {
            return Err(GraphError::Inconsistent(format!(
                "'{}' is reserved for the root node",
                ROOT_ID
            )));
        }

        let index = index.unwrap_or(self.order.len()).min(self.order.len());
        self.order.insert(index, node.id.clone());
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Removes nodes together with their incident connections and their
    /// entries in surviving parents' children lists.
    pub(crate) fn remove_nodes(&mut self, ids: &[NodeId]) -> Result<RemovedNodes, GraphError> {
        let targets: AHashSet<&str> = ids.iter().map(String::as_str).collect();
        for id in &targets {
            if *id == ROOT_ID {
                return Err(GraphError::RootRemoval);
            }
            if !self.nodes.contains_key(*id) {
                return Err(GraphError::NodeNotFound(id.to_string()));
            }
        }

        let connections: Vec<(usize, Connection)> = self
            .connections
            .iter()
            .enumerate()
            .filter(|(_, c)| targets.contains(c.from.as_str()) || targets.contains(c.to.as_str()))
            .map(|(i, c)| (i, c.clone()))
            .collect();
        let parents: Vec<(NodeId, Vec<NodeId>)> = self
            .nodes()
            .filter(|n| !targets.contains(n.id.as_str()))
            .filter(|n| n.children.iter().any(|c| targets.contains(c.as_str())))
            .map(|n| (n.id.clone(), n.children.clone()))
            .collect();
        let nodes: Vec<(usize, Node)> = self
            .order
            .iter()
            .enumerate()
            .filter(|(_, id)| targets.contains(id.as_str()))
            .filter_map(|(i, id)| self.nodes.get(id).map(|n| (i, n.clone())))
            .collect();

        for (index, _) in connections.iter().rev() {
            self.connections.remove(*index);
        }
        for (parent, _) in &parents {
            if let Some(node) = self.nodes.get_mut(parent) {
                node.children.retain(|c| !targets.contains(c.as_str()));
            }
        }
        for (index, node) in nodes.iter().rev() {
            self.order.remove(*index);
            self.nodes.remove(&node.id);
        }

        Ok(RemovedNodes {
            nodes,
            connections,
            parents,
        })
    }

    pub(crate) fn restore_nodes(&mut self, removed: &RemovedNodes) {
        for (index, node) in &removed.nodes {
            let index = (*index).min(self.order.len());
            self.order.insert(index, node.id.clone());
            self.nodes.insert(node.id.clone(), node.clone());
        }
        for (index, connection) in &removed.connections {
            let index = (*index).min(self.connections.len());
            self.connections.insert(index, connection.clone());
        }
        for (parent, children) in &removed.parents {
            if let Some(node) = self.nodes.get_mut(parent) {
                node.children = children.clone();
            }
        }
    }

    /// Moves nodes and returns their previous positions. Sibling order is not
    /// touched; it is only re-derived when a node connection changes.
    pub(crate) fn move_nodes(
        &mut self,
        moves: &BTreeMap<NodeId, Position>,
    ) -> Result<BTreeMap<NodeId, Position>, GraphError> {
        let mut previous = BTreeMap::new();
        for id in moves.keys() {
            let node = self
                .nodes
                .get(id)
                .ok_or_else(|| GraphError::NodeNotFound(id.clone()))?;
            previous.insert(id.clone(), node.position);
        }
        for (id, position) in moves {
            if let Some(node) = self.nodes.get_mut(id) {
                node.position = *position;
            }
        }
        Ok(previous)
    }

    /// Writes (`Some`) or clears (`None`) one data entry, returning the previous value.
    pub(crate) fn set_property(
        &mut self,
        id: &str,
        key: &str,
        value: Option<Value>,
    ) -> Result<Option<Value>, GraphError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;
        Ok(match value {
            Some(value) => node.data.insert(key.to_string(), value),
            None => node.data.remove(key),
        })
    }

    pub(crate) fn connect(&mut self, connection: Connection) -> Result<ConnectionChange, GraphError> {
        self.check_connection(&connection)?;

        let prior_children = if connection.is_node() {
            let parent = self
                .nodes
                .get_mut(&connection.from)
                .ok_or_else(|| GraphError::NodeNotFound(connection.from.clone()))?;
            let prior = parent.children.clone();
            parent.children.push(connection.to.clone());
            self.sort_children(&connection.from);
            Some(prior)
        } else {
            None
        };

        let index = self.connections.len();
        self.connections.push(connection.clone());
        Ok(ConnectionChange {
            index,
            connection,
            prior_children,
        })
    }

    pub(crate) fn disconnect_id(&mut self, id: &ConnectionId) -> Result<ConnectionChange, GraphError> {
        let index = self
            .connections
            .iter()
            .position(|c| &c.id() == id)
            .ok_or_else(|| GraphError::ConnectionNotFound {
                from: id.to_string(),
                to: id.to_string(),
            })?;
        Ok(self.disconnect_at(index))
    }

    /// Reverses a [`NodeGraph::connect`].
    pub(crate) fn revert_connect(&mut self, change: &ConnectionChange) {
        let id = change.connection.id();
        if let Some(index) = self.connections.iter().position(|c| c.id() == id) {
            self.connections.remove(index);
        }
        self.restore_children(change);
    }

    /// Reverses a [`NodeGraph::disconnect`].
    pub(crate) fn revert_disconnect(&mut self, change: &ConnectionChange) {
        let index = change.index.min(self.connections.len());
        self.connections.insert(index, change.connection.clone());
        self.restore_children(change);
    }

    fn disconnect_at(&mut self, index: usize) -> ConnectionChange {
        let connection = self.connections.remove(index);
        let prior_children = if connection.is_node() {
            self.nodes.get_mut(&connection.from).map(|parent| {
                let prior = parent.children.clone();
                parent.children.retain(|c| c != &connection.to);
                prior
            })
        } else {
            None
        };
        if prior_children.is_some() {
            self.sort_children(&connection.from);
        }
        ConnectionChange {
            index,
            connection,
            prior_children,
        }
    }

    fn restore_children(&mut self, change: &ConnectionChange) {
        if let Some(prior) = &change.prior_children {
            if let Some(parent) = self.nodes.get_mut(&change.connection.from) {
                parent.children = prior.clone();
            }
        }
    }

    fn check_connection(&self, connection: &Connection) -> Result<(), GraphError> {
        let source = self
            .nodes
            .get(&connection.from)
            .ok_or_else(|| GraphError::NodeNotFound(connection.from.clone()))?;
        let target = self
            .nodes
            .get(&connection.to)
            .ok_or_else(|| GraphError::NodeNotFound(connection.to.clone()))?;

        if connection.is_node() && source.kind() == NodeKind::Root {
            if let Some(existing) = source.children.first() {
                return Err(GraphError::RootAlreadyHasChild {
                    existing: existing.clone(),
                });
            }
        }
        if connection.from == connection.to {
            return Err(GraphError::SelfConnection(connection.from.clone()));
        }
        let id = connection.id();
        if self.connections.iter().any(|c| c.id() == id) {
            return Err(GraphError::DuplicateConnection(id.to_string()));
        }

        match connection.connection_type {
            ConnectionType::Node => {
                if target.kind() == NodeKind::Root {
                    return Err(GraphError::RootAsChild);
                }
                if target.kind() == NodeKind::Data {
                    return Err(GraphError::Inconsistent(format!(
                        "data node '{}' cannot be a child",
                        target.id
                    )));
                }
                if !source.kind().accepts_children() {
                    return Err(GraphError::ChildrenNotAllowed {
                        node_id: source.id.clone(),
                        kind: source.kind(),
                    });
                }
                if source.kind() == NodeKind::Decorator && !source.children.is_empty() {
                    return Err(GraphError::DecoratorHasChild {
                        node_id: source.id.clone(),
                    });
                }
                if let Some(parent) = self.parent_of(&target.id) {
                    return Err(GraphError::AlreadyParented {
                        child: target.id.clone(),
                        parent: parent.clone(),
                    });
                }
                if self.is_reachable(&target.id, &source.id) {
                    return Err(GraphError::Cycle {
                        from: source.id.clone(),
                        to: target.id.clone(),
                    });
                }
            }
            ConnectionType::Property => {
                let slot = connection
                    .to_property
                    .as_deref()
                    .ok_or_else(|| GraphError::MissingTargetProperty(target.id.clone()))?;
                let definition =
                    target
                        .template
                        .property(slot)
                        .ok_or_else(|| GraphError::UnknownProperty {
                            node_id: target.id.clone(),
                            property: slot.to_string(),
                        })?;
                let occupied = self.property_connections_into(&target.id).any(|c| {
                    c.to_property.as_deref() == Some(slot)
                });
                if occupied && !definition.allow_multiple_connections {
                    return Err(GraphError::SlotOccupied {
                        node_id: target.id.clone(),
                        property: slot.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Whether `target` can be reached from `start` by following children.
    fn is_reachable(&self, start: &str, target: &str) -> bool {
        let mut visited: AHashSet<&str> = AHashSet::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if !visited.insert(id) {
                continue;
            }
            stack.extend(self.children(id).iter().map(String::as_str));
        }
        false
    }

    /// Orders a parent's children by ascending x, then y, then insertion order.
    fn sort_children(&mut self, parent_id: &str) {
        let Some(parent) = self.nodes.get(parent_id) else {
            return;
        };
        let rank: AHashMap<&str, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let position = |id: &str| self.nodes.get(id).map(|n| n.position).unwrap_or_default();
        let sorted: Vec<NodeId> = parent
            .children
            .iter()
            .sorted_by(|a, b| {
                let (pa, pb) = (position(a.as_str()), position(b.as_str()));
                pa.x.total_cmp(&pb.x)
                    .then(pa.y.total_cmp(&pb.y))
                    .then(rank.get(a.as_str()).cmp(&rank.get(b.as_str())))
            })
            .cloned()
            .collect();
        if let Some(parent) = self.nodes.get_mut(parent_id) {
            parent.children = sorted;
        }
    }
}
