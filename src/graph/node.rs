use super::template::{NodeKind, NodeTemplate, types};
use crate::blackboard::{Scope, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type NodeId = String;

/// The reserved id of the single root node.
pub const ROOT_ID: &str = "root";

/// Editor position of a node. Only used to order siblings.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// An authored node.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub template: NodeTemplate,
    pub data: BTreeMap<String, Value>,
    pub position: Position,
    pub children: Vec<NodeId>,
}

impl Node {
    /// Creates a node from a template. `initial` overrides the template's default config.
    pub fn from_template(
        id: impl Into<NodeId>,
        template: &NodeTemplate,
        position: Position,
        initial: BTreeMap<String, Value>,
    ) -> Self {
        let mut data = template.default_config.clone();
        data.extend(initial);
        Self {
            id: id.into(),
            template: template.clone(),
            data,
            position,
            children: Vec::new(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.template.kind
    }

    pub fn type_id(&self) -> &str {
        &self.template.id
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }
}

impl Node {
    /// The variable a `blackboard-variable` node points at, with its scope.
    pub fn variable_reference(&self) -> Option<(&str, Scope)> {
        if self.type_id() != types::BLACKBOARD_VARIABLE {
            return None;
        }
        let name = self.data.get("variableName").and_then(Value::as_str)?;
        let scope = self
            .data
            .get("scope")
            .and_then(Value::as_str)
            .and_then(Scope::parse)
            .unwrap_or_default();
        Some((name, scope))
    }
}
