//! Undoable graph mutations.

use crate::error::GraphError;
use crate::graph::NodeGraph;
use std::collections::VecDeque;
use std::fmt;

mod commands;

pub use commands::{
    AddConnectionCommand, AddNodeCommand, MoveNodesCommand, RemoveConnectionsCommand,
    RemoveNodesCommand, SetNodePropertyCommand,
};

pub const DEFAULT_HISTORY_DEPTH: usize = 100;

/// A reversible graph mutation.
///
/// `execute` must validate before it mutates: on error the graph is unchanged.
/// `undo` is only ever called after a successful `execute` and must restore
/// the exact prior state.
pub trait Command: fmt::Debug {
    fn label(&self) -> String;
    fn execute(&mut self, graph: &mut NodeGraph) -> Result<(), GraphError>;
    fn undo(&mut self, graph: &mut NodeGraph);
}

/// Bounded undo/redo history.
#[derive(Debug)]
pub struct CommandManager {
    undo_stack: VecDeque<Box<dyn Command>>,
    redo_stack: Vec<Box<dyn Command>>,
    depth: usize,
}

impl Default for CommandManager {
    fn default() -> Self {
        Self::with_depth(DEFAULT_HISTORY_DEPTH)
    }
}

impl CommandManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_depth(depth: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            depth: depth.max(1),
        }
    }

    /// Runs a command and records it. A rejected command is not recorded and
    /// leaves the redo stack intact.
    pub fn execute(
        &mut self,
        graph: &mut NodeGraph,
        mut command: Box<dyn Command>,
    ) -> Result<(), GraphError> {
        command.execute(graph)?;
        tracing::debug!(command = %command.label(), "Executed command");
        self.redo_stack.clear();
        self.undo_stack.push_back(command);
        while self.undo_stack.len() > self.depth {
            self.undo_stack.pop_front();
        }
        Ok(())
    }

    pub fn undo(&mut self, graph: &mut NodeGraph) -> bool {
        let Some(mut command) = self.undo_stack.pop_back() else {
            return false;
        };
        command.undo(graph);
        tracing::debug!(command = %command.label(), "Undid command");
        self.redo_stack.push(command);
        true
    }

    pub fn redo(&mut self, graph: &mut NodeGraph) -> bool {
        let Some(mut command) = self.redo_stack.pop() else {
            return false;
        };
        match command.execute(graph) {
            Ok(()) => {
                tracing::debug!(command = %command.label(), "Redid command");
                self.undo_stack.push_back(command);
                true
            }
            Err(e) => {
                tracing::warn!(command = %command.label(), error = %e, "Dropping command that can no longer be redone");
                false
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_label(&self) -> Option<String> {
        self.undo_stack.back().map(|c| c.label())
    }

    pub fn redo_label(&self) -> Option<String> {
        self.redo_stack.last().map(|c| c.label())
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}
