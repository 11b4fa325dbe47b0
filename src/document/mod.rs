//! The persisted form of a tree: pretty JSON or a compact binary encoding.
//!
//! Both encodings carry the same [`TreeDocument`] and decode to identical
//! workspaces. The binary form is bincode (standard configuration) behind a
//! four byte magic, which [`TreeDocument::decode`] uses to tell the two apart.

use crate::blackboard::{Blackboard, Scope, Value, ValueType};
use crate::error::DocumentError;
use crate::graph::{Connection, Node, NodeGraph, NodeId, Position, TemplateRegistry};
use crate::workspace::{TreeMetadata, Workspace};
use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Prefix of the binary encoding.
pub const BINARY_MAGIC: &[u8; 4] = b"KDT1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub node_type: String,
    pub config: BTreeMap<String, Value>,
    pub children: Vec<NodeId>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRecord {
    pub name: String,
    pub scope: Scope,
    pub value_type: ValueType,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeDocument {
    pub metadata: TreeMetadata,
    pub nodes: Vec<NodeRecord>,
    pub connections: Vec<Connection>,
    pub variables: Vec<VariableRecord>,
}

impl TreeDocument {
    /// Captures the graph (in insertion order) and both blackboard scopes.
    pub fn from_workspace(workspace: &Workspace) -> Self {
        let nodes = workspace
            .graph()
            .nodes()
            .map(|node| NodeRecord {
                id: node.id.clone(),
                node_type: node.type_id().to_string(),
                config: node.data.clone(),
                children: node.children.clone(),
                position: node.position,
            })
            .collect();

        let blackboard = workspace.blackboard().borrow();
        let variables = [Scope::Local, Scope::Global]
            .into_iter()
            .flat_map(|scope| blackboard.list_all(scope))
            .map(|variable| VariableRecord {
                name: variable.name.clone(),
                scope: variable.scope,
                value_type: variable.value_type,
                value: variable.value.clone(),
            })
            .collect();

        Self {
            metadata: workspace.metadata().clone(),
            nodes,
            connections: workspace.graph().connections().to_vec(),
            variables,
        }
    }

    /// Rebuilds a workspace, resolving node types against `registry`. The
    /// reassembled graph must satisfy every structural invariant.
    pub fn into_workspace(self, registry: TemplateRegistry) -> Result<Workspace, DocumentError> {
        let mut nodes = Vec::with_capacity(self.nodes.len());
        for record in self.nodes {
            let template =
                registry
                    .get(&record.node_type)
                    .ok_or_else(|| DocumentError::UnknownTemplate {
                        node_id: record.id.clone(),
                        type_name: record.node_type.clone(),
                    })?;
            let mut node =
                Node::from_template(record.id, template, record.position, BTreeMap::new());
            node.data = record.config;
            node.children = record.children;
            nodes.push(node);
        }
        let graph = NodeGraph::from_parts(nodes, self.connections)?;

        let mut blackboard = Blackboard::new();
        for variable in self.variables {
            blackboard.define(
                &variable.name,
                variable.value_type,
                variable.value,
                variable.scope,
            )?;
        }

        tracing::debug!(
            name = %self.metadata.name,
            nodes = graph.len(),
            connections = graph.connections().len(),
            "Decoded tree document"
        );
        Ok(Workspace::from_parts(
            self.metadata,
            graph,
            blackboard,
            registry,
        ))
    }

    pub fn to_json_pretty(&self) -> Result<String, DocumentError> {
        serde_json::to_string_pretty(self).map_err(|e| DocumentError::Json(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        serde_json::from_str(json).map_err(|e| DocumentError::Json(e.to_string()))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DocumentError> {
        let body =
            encode_to_vec(self, standard()).map_err(|e| DocumentError::Encode(e.to_string()))?;
        let mut bytes = Vec::with_capacity(BINARY_MAGIC.len() + body.len());
        bytes.extend_from_slice(BINARY_MAGIC);
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DocumentError> {
        let body = bytes
            .strip_prefix(BINARY_MAGIC.as_slice())
            .ok_or_else(|| DocumentError::Decode("missing the binary document header".to_string()))?;
        let (document, read) = decode_from_slice::<Self, _>(body, standard())
            .map_err(|e| DocumentError::Decode(e.to_string()))?;
        if read != body.len() {
            return Err(DocumentError::Decode(format!(
                "{} trailing bytes after the document",
                body.len() - read
            )));
        }
        Ok(document)
    }

    /// Decodes either encoding, telling them apart by the binary header.
    pub fn decode(bytes: &[u8]) -> Result<Self, DocumentError> {
        if bytes.starts_with(BINARY_MAGIC) {
            return Self::from_bytes(bytes);
        }
        let json = std::str::from_utf8(bytes)
            .map_err(|e| DocumentError::Json(format!("document is not UTF-8: {}", e)))?;
        Self::from_json(json)
    }

    pub fn is_binary(bytes: &[u8]) -> bool {
        bytes.starts_with(BINARY_MAGIC)
    }
}
