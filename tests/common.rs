//! Common test utilities for assembling workspaces and running trees.
use koudou::prelude::*;
use std::collections::BTreeMap;

/// Builds a node data map from `(key, value)` pairs.
#[allow(dead_code)]
pub fn data(entries: &[(&str, Value)]) -> BTreeMap<String, Value> {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

/// Adds a node at `(x, 0)`.
#[allow(dead_code)]
pub fn add(workspace: &mut Workspace, type_id: &str, x: f64, entries: &[(&str, Value)]) -> String {
    workspace
        .add_node(type_id, Position::new(x, 0.0), data(entries))
        .unwrap()
}

/// Adds a node and makes it the last child of `parent`. Children are laid
/// out left to right by `x`, so callers pass increasing values.
#[allow(dead_code)]
pub fn add_child(
    workspace: &mut Workspace,
    parent: &str,
    type_id: &str,
    x: f64,
    entries: &[(&str, Value)],
) -> String {
    let id = add(workspace, type_id, x, entries);
    workspace.connect(parent, &id).unwrap();
    id
}

/// The builtin leaf that always resolves to `status`.
#[allow(dead_code)]
pub fn leaf_for(status: Status) -> &'static str {
    match status {
        Status::Success => "succeed",
        Status::Failure => "fail",
        Status::Running => "running",
        Status::Idle => panic!("no leaf resolves to idle"),
    }
}

/// A seeded configuration with the default tick interval.
#[allow(dead_code)]
pub fn seeded_config() -> ExecutorConfig {
    ExecutorConfig::default().with_seed(42)
}

/// Compiles the workspace with the default builder and starts an executor.
#[allow(dead_code)]
pub fn start(workspace: &Workspace) -> Executor {
    let tree = workspace.build(&TreeBuilder::new()).unwrap();
    let mut executor = workspace.executor(tree, seeded_config());
    executor.start().unwrap();
    executor
}

/// Performs `n` ticks of `delta` seconds and returns the reports.
#[allow(dead_code)]
pub fn run_ticks(executor: &mut Executor, n: usize, delta: f64) -> Vec<TickReport> {
    (0..n).map(|_| executor.tick(delta).unwrap()).collect()
}

/// Reads a local variable's value.
#[allow(dead_code)]
pub fn local(workspace: &Workspace, name: &str) -> Option<Value> {
    workspace.variable(name, Scope::Local).map(|v| v.value)
}
