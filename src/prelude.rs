//! Prelude module for convenient imports
//!
//! Re-exports the types most callers need to author, compile and run a tree.
//!
//! ```rust,no_run
//! use koudou::prelude::*;
//!
//! # fn run_example() -> Result<()> {
//! let bytes = std::fs::read("patrol.kdt")?;
//! let workspace = TreeDocument::decode(&bytes)?.into_workspace(TemplateRegistry::builtin())?;
//! let tree = workspace.build(&TreeBuilder::new())?;
//! let mut executor = workspace.executor(tree, ExecutorConfig::default().with_seed(7));
//! executor.start()?;
//! let ticks = executor.update(1.0 / 60.0)?;
//! println!("performed {} ticks", ticks);
//! # Ok(())
//! # }
//! ```

// Authoring
pub use crate::blackboard::{Blackboard, Scope, SharedBlackboard, Value, ValueType};
pub use crate::graph::{
    Connection, NodeGraph, NodeKind, NodeTemplate, Position, ROOT_ID, TemplateRegistry,
};
pub use crate::workspace::{TypeCompatibilityWarning, Workspace};

// Compilation and execution
pub use crate::builder::{ExecutableTree, FallbackPolicy, TreeBuilder};
pub use crate::executor::{
    Executor, ExecutorConfig, ExecutorState, NodeContext, NodeHandler, Status, TickReport,
};

// Persistence
pub use crate::document::TreeDocument;

// Error types
pub use crate::error::{
    BlackboardError, BuildError, DocumentError, ExecutorError, GraphError, NodeError,
    WorkspaceError,
};

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
