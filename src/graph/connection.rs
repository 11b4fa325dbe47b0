use super::node::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    /// Structural parent to child edge.
    Node,
    /// Data binding from a source node into a named slot of the target.
    Property,
}

/// Deterministic connection identity derived from its endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub from: NodeId,
    pub to: NodeId,
    pub from_property: Option<String>,
    pub to_property: Option<String>,
    pub connection_type: ConnectionType,
}

impl Connection {
    pub fn node(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            from_property: None,
            to_property: None,
            connection_type: ConnectionType::Node,
        }
    }

    pub fn property(from: &str, from_property: Option<&str>, to: &str, to_property: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            from_property: from_property.map(str::to_string),
            to_property: Some(to_property.to_string()),
            connection_type: ConnectionType::Property,
        }
    }

    /// `parent->child` for node connections. Property connections append
    /// `.slot` to an endpoint only when that slot is named, so an unnamed
    /// output never shares an id with a named one.
    pub fn id(&self) -> ConnectionId {
        fn endpoint(node: &str, property: Option<&str>) -> String {
            match property {
                Some(property) => format!("{}.{}", node, property),
                None => node.to_string(),
            }
        }
        match self.connection_type {
            ConnectionType::Node => ConnectionId(format!("{}->{}", self.from, self.to)),
            ConnectionType::Property => ConnectionId(format!(
                "{}=>{}",
                endpoint(&self.from, self.from_property.as_deref()),
                endpoint(&self.to, self.to_property.as_deref()),
            )),
        }
    }

    pub fn is_node(&self) -> bool {
        self.connection_type == ConnectionType::Node
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.from == node_id || self.to == node_id
    }

    pub fn matches(
        &self,
        from: &str,
        to: &str,
        from_property: Option<&str>,
        to_property: Option<&str>,
    ) -> bool {
        self.from == from
            && self.to == to
            && self.from_property.as_deref() == from_property
            && self.to_property.as_deref() == to_property
    }
}
