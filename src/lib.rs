//! # Koudou - Behavior Tree Authoring and Execution Core
//!
//! **Koudou** holds the parts of a behavior-tree editor that need real
//! algorithmic care: an editable node graph, undoable mutations, a compiler
//! that turns the graph into an executable tree, and a tick scheduler that
//! runs that tree against a shared blackboard.
//!
//! ## Core Workflow
//!
//! 1.  **Author**: Mutate a [`workspace::Workspace`]. Every graph change runs
//!     as a [`command::Command`], so it can be undone and redone.
//! 2.  **Compile**: Use a [`builder::TreeBuilder`] to validate the graph and
//!     compile it into an immutable [`builder::ExecutableTree`]. Property
//!     connections become lazily evaluated bindings.
//! 3.  **Run**: Create an [`executor::Executor`] over the compiled tree and
//!     drive it with `tick` or, once per frame, with `update`.
//! 4.  **Persist**: Encode the workspace as a [`document::TreeDocument`] in
//!     pretty JSON or the compact binary form.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use koudou::prelude::*;
//! use std::collections::BTreeMap;
//!
//! fn main() -> Result<()> {
//!     let mut workspace = Workspace::new("patrol");
//!     workspace.define_variable("alerts", ValueType::Number, Value::from(0), Scope::Local)?;
//!
//!     // root -> sequence -> [wait 0.3s, increment alerts]
//!     let sequence = workspace.add_node("sequence", Position::new(0.0, 100.0), BTreeMap::new())?;
//!     let wait = workspace.add_node("wait", Position::new(0.0, 200.0), BTreeMap::from([
//!         ("duration".to_string(), Value::from(0.3)),
//!     ]))?;
//!     let bump = workspace.add_node("increment", Position::new(100.0, 200.0), BTreeMap::from([
//!         ("key".to_string(), Value::from("alerts")),
//!     ]))?;
//!     workspace.connect(ROOT_ID, &sequence)?;
//!     workspace.connect(&sequence, &wait)?;
//!     workspace.connect(&sequence, &bump)?;
//!
//!     let tree = workspace.build(&TreeBuilder::new())?;
//!     let mut executor = workspace.executor(tree, ExecutorConfig::default());
//!     executor.on_report(|report| println!("tick {}: {:?}", report.tick, report.root_status()));
//!
//!     executor.start()?;
//!     for _ in 0..4 {
//!         executor.tick(0.1)?;
//!     }
//!     println!("alerts = {:?}", workspace.variable("alerts", Scope::Local));
//!
//!     // Stopping restores the local scope captured at start.
//!     executor.stop()?;
//!     Ok(())
//! }
//! ```

pub mod blackboard;
pub mod builder;
pub mod command;
pub mod document;
pub mod error;
pub mod executor;
pub mod graph;
pub mod prelude;
pub mod workspace;
