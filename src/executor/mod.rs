//! The tick scheduler.
//!
//! An [`Executor`] owns a compiled [`ExecutableTree`] plus a handle to the
//! shared blackboard and advances the tree one logical tick at a time. Node
//! state (running children, repeat counters, cooldown clocks) persists across
//! ticks until the run is stopped.
//!
//! Ticks are either driven directly with [`Executor::tick`] or derived from
//! frame time with [`Executor::update`], which accumulates scaled frame
//! deltas and performs as many fixed-size ticks as fit. The number of logical
//! ticks therefore does not depend on the frame rate.

use crate::blackboard::{Blackboard, BlackboardSnapshot, SharedBlackboard, TypeChange, Value};
use crate::builder::ExecutableTree;
use crate::error::ExecutorError;
use crate::graph::NodeId;
use ahash::AHashMap;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::fmt;

mod handler;
mod runner;
mod status;

pub use handler::{NodeContext, NodeHandler, NodeMemory, RandomOutcome, StaticHandler};
pub(crate) use handler::register_default_handlers;
pub use status::{ExecutorState, Status};

use handler::TIME_EPSILON;
use runner::{NodeRuntime, TickOutcome, TickRunner};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Logical seconds per tick.
    pub tick_interval: f64,
    /// Multiplier applied to frame time before accumulation.
    pub speed: f64,
    /// Upper bound on ticks performed by one `update` call. Time beyond the
    /// cap stays in the accumulator.
    pub max_ticks_per_update: u32,
    /// Seed for probabilistic nodes. Unseeded executors draw from the OS.
    pub seed: Option<u64>,
    /// Log lines kept per tick report.
    pub max_log_lines: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            tick_interval: 0.1,
            speed: 1.0,
            max_ticks_per_update: 64,
            seed: None,
            max_log_lines: 256,
        }
    }
}

impl ExecutorConfig {
    pub fn from_json(json: &str) -> Result<Self, ExecutorError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ExecutorError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_tick_interval(mut self, tick_interval: f64) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn validate(&self) -> Result<(), ExecutorError> {
        if self.tick_interval.is_nan() || self.tick_interval <= 0.0 {
            return Err(ExecutorError::InvalidConfig(format!(
                "tick_interval must be positive, got {}",
                self.tick_interval
            )));
        }
        if self.speed.is_nan() || self.speed < 0.0 {
            return Err(ExecutorError::InvalidConfig(format!(
                "speed must not be negative, got {}",
                self.speed
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => f.write_str("info"),
            LogLevel::Warn => f.write_str("warn"),
            LogLevel::Error => f.write_str("error"),
        }
    }
}

/// A log line produced during a tick, destined for the rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    pub tick: u64,
    pub node_id: Option<NodeId>,
    pub level: LogLevel,
    pub message: String,
}

impl LogLine {
    pub(crate) fn trace(&self) {
        let node_id = self.node_id.as_deref().unwrap_or("-");
        match self.level {
            LogLevel::Info => tracing::info!(tick = self.tick, node_id, "{}", self.message),
            LogLevel::Warn | LogLevel::Error => {
                tracing::warn!(tick = self.tick, node_id, "{}", self.message)
            }
        }
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node_id {
            Some(id) => write!(f, "[{}] {}: {}", self.level, id, self.message),
            None => write!(f, "[{}] {}", self.level, self.message),
        }
    }
}

/// Everything that happened in one tick, delivered in a single batch.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub elapsed: f64,
    /// Every node visited this tick, in post-order.
    pub statuses: Vec<(NodeId, Status)>,
    pub logs: Vec<LogLine>,
    /// Variable type changes caused by queued writes and node writes. Hand
    /// them to `Workspace::reconcile_type_changes` to drop stale bindings.
    pub type_changes: Vec<TypeChange>,
    pub blackboard: BlackboardSnapshot,
}

impl TickReport {
    pub fn status(&self, id: &str) -> Option<Status> {
        self.statuses
            .iter()
            .find(|(node_id, _)| node_id == id)
            .map(|(_, status)| *status)
    }

    /// Status of the root node, `Idle` if the root was not visited.
    pub fn root_status(&self) -> Status {
        self.statuses.last().map(|(_, s)| *s).unwrap_or_default()
    }
}

type Reporter = Box<dyn FnMut(&TickReport)>;

pub struct Executor {
    tree: Option<ExecutableTree>,
    blackboard: Option<SharedBlackboard>,
    config: ExecutorConfig,
    state: ExecutorState,
    runtime: Vec<NodeRuntime>,
    statuses: Vec<Status>,
    outputs: AHashMap<NodeId, Value>,
    snapshot: Option<BlackboardSnapshot>,
    type_changes: Vec<TypeChange>,
    rng: StdRng,
    accumulator: f64,
    elapsed: f64,
    tick_count: u64,
    reporter: Option<Reporter>,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("tick_count", &self.tick_count)
            .field("elapsed", &self.elapsed)
            .field("destroyed", &self.tree.is_none())
            .finish()
    }
}

impl Executor {
    pub fn new(tree: ExecutableTree, blackboard: SharedBlackboard, config: ExecutorConfig) -> Self {
        let len = tree.len();
        let rng = make_rng(config.seed);
        Self {
            tree: Some(tree),
            blackboard: Some(blackboard),
            config,
            state: ExecutorState::Idle,
            runtime: vec![NodeRuntime::default(); len],
            statuses: vec![Status::Idle; len],
            outputs: AHashMap::new(),
            snapshot: None,
            type_changes: Vec::new(),
            rng,
            accumulator: 0.0,
            elapsed: 0.0,
            tick_count: 0,
            reporter: None,
        }
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn tree(&self) -> Option<&ExecutableTree> {
        self.tree.as_ref()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Logical seconds advanced since the run began.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn is_destroyed(&self) -> bool {
        self.tree.is_none()
    }

    pub fn status(&self, id: &str) -> Status {
        self.tree
            .as_ref()
            .and_then(|tree| tree.index_of(id))
            .map(|i| self.statuses[i])
            .unwrap_or_default()
    }

    /// Current status of every node of the tree, in pre-order.
    pub fn statuses(&self) -> Vec<(NodeId, Status)> {
        self.tree
            .iter()
            .flat_map(|tree| tree.iter())
            .zip(self.statuses.iter())
            .map(|(node, status)| (node.id.clone(), *status))
            .collect()
    }

    /// The value a node last published for `NodeOutput` bindings.
    pub fn output(&self, id: &str) -> Option<&Value> {
        self.outputs.get(id)
    }

    /// Drains the type changes gathered by every tick since the last call.
    pub fn take_type_changes(&mut self) -> Vec<TypeChange> {
        std::mem::take(&mut self.type_changes)
    }

    /// Installs the callback that receives one [`TickReport`] per tick.
    ///
    /// The callback runs after the blackboard borrow of the tick is released,
    /// so it may read the shared blackboard.
    pub fn on_report(&mut self, reporter: impl FnMut(&TickReport) + 'static) {
        self.reporter = Some(Box::new(reporter));
    }

    /// Begins a run: resets node state and snapshots the blackboard as the
    /// run's restore point. A stepping session's snapshot is kept.
    pub fn start(&mut self) -> Result<(), ExecutorError> {
        self.ensure_alive()?;
        if self.state != ExecutorState::Idle {
            return Err(self.invalid("start"));
        }
        if self.snapshot.is_none() {
            let snapshot = self.shared_blackboard()?.borrow().snapshot();
            self.snapshot = Some(snapshot);
        }
        self.reset();
        self.state = ExecutorState::Running;
        tracing::info!(nodes = self.runtime.len(), "Executor started");
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), ExecutorError> {
        self.ensure_alive()?;
        if self.state != ExecutorState::Running {
            return Err(self.invalid("pause"));
        }
        self.state = ExecutorState::Paused;
        tracing::debug!(tick = self.tick_count, "Executor paused");
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), ExecutorError> {
        self.ensure_alive()?;
        if self.state != ExecutorState::Paused {
            return Err(self.invalid("resume"));
        }
        self.state = ExecutorState::Running;
        tracing::debug!(tick = self.tick_count, "Executor resumed");
        Ok(())
    }

    /// Ends the run, restoring the local blackboard scope to the run's
    /// snapshot and discarding all node state. Stopping an idle executor
    /// without a stepping session does nothing.
    pub fn stop(&mut self) -> Result<(), ExecutorError> {
        self.ensure_alive()?;
        if let Some(snapshot) = self.snapshot.take() {
            Blackboard::with_deferred_events(self.shared_blackboard()?, |blackboard| {
                blackboard.restore_local(&snapshot)
            });
        }
        if self.state != ExecutorState::Idle {
            tracing::info!(ticks = self.tick_count, "Executor stopped");
        }
        self.state = ExecutorState::Idle;
        self.reset();
        Ok(())
    }

    /// Performs exactly one tick of `tick_interval` from Idle or Paused and
    /// stays in that state. Stepping from Idle opens a session whose snapshot
    /// a later [`Executor::stop`] restores.
    pub fn step(&mut self) -> Result<TickReport, ExecutorError> {
        self.ensure_alive()?;
        match self.state {
            ExecutorState::Running => Err(self.invalid("step")),
            ExecutorState::Idle => {
                if self.snapshot.is_none() {
                    let snapshot = self.shared_blackboard()?.borrow().snapshot();
                    self.snapshot = Some(snapshot);
                    self.reset();
                    tracing::debug!("Opened a stepping session");
                }
                self.run_tick(self.config.tick_interval)
            }
            ExecutorState::Paused => self.run_tick(self.config.tick_interval),
        }
    }

    /// Performs one logical tick of `delta_time` seconds. Only valid while Running.
    pub fn tick(&mut self, delta_time: f64) -> Result<TickReport, ExecutorError> {
        self.ensure_alive()?;
        if self.state != ExecutorState::Running {
            return Err(self.invalid("tick"));
        }
        self.run_tick(delta_time)
    }

    /// Feeds one frame's worth of wall-clock time and performs every whole
    /// tick that fits. Returns the number of ticks performed; nothing happens
    /// unless Running.
    pub fn update(&mut self, frame_delta: f64) -> Result<usize, ExecutorError> {
        self.ensure_alive()?;
        if self.state != ExecutorState::Running {
            return Ok(0);
        }
        let interval = self.config.tick_interval;
        if interval.is_nan() || interval <= 0.0 {
            return Err(ExecutorError::InvalidConfig(format!(
                "tick_interval must be positive, got {}",
                interval
            )));
        }

        self.accumulator += frame_delta.max(0.0) * self.config.speed;
        let mut performed = 0;
        while self.accumulator + TIME_EPSILON >= interval
            && performed < self.config.max_ticks_per_update as usize
        {
            self.accumulator = (self.accumulator - interval).max(0.0);
            self.run_tick(interval)?;
            performed += 1;
        }
        Ok(performed)
    }

    /// Releases the tree and detaches from the blackboard. Every later call fails.
    pub fn destroy(&mut self) {
        self.tree = None;
        self.blackboard = None;
        self.reporter = None;
        self.snapshot = None;
        self.type_changes.clear();
        self.state = ExecutorState::Idle;
        self.runtime.clear();
        self.statuses.clear();
        self.outputs.clear();
        tracing::debug!("Executor destroyed");
    }

    fn run_tick(&mut self, delta_time: f64) -> Result<TickReport, ExecutorError> {
        let tree = self.tree.as_ref().ok_or(ExecutorError::Destroyed)?;
        let shared = self.blackboard.clone().ok_or(ExecutorError::Destroyed)?;

        self.tick_count += 1;
        self.elapsed += delta_time;
        let report = Blackboard::with_deferred_events(&shared, |blackboard| {
            let mut type_changes = blackboard.apply_pending();
            if !type_changes.is_empty() {
                tracing::debug!(
                    changed = type_changes.len(),
                    "Queued blackboard writes changed variable types"
                );
            }
            let runner = TickRunner::new(
                tree,
                &mut self.runtime,
                &mut self.statuses,
                &mut self.outputs,
                blackboard,
                &mut self.rng,
                delta_time,
                self.elapsed,
                self.tick_count,
            );
            let TickOutcome {
                visited,
                mut logs,
                type_changes: written,
            } = runner.run();
            logs.truncate(self.config.max_log_lines);
            type_changes.extend(written);
            TickReport {
                tick: self.tick_count,
                elapsed: self.elapsed,
                statuses: visited
                    .into_iter()
                    .map(|i| (tree.node(i).id.clone(), self.statuses[i]))
                    .collect(),
                logs,
                type_changes,
                blackboard: blackboard.snapshot(),
            }
        });
        self.type_changes.extend(report.type_changes.iter().cloned());

        if let Some(reporter) = self.reporter.as_mut() {
            reporter(&report);
        }
        Ok(report)
    }

    fn reset(&mut self) {
        self.runtime.iter_mut().for_each(|r| *r = NodeRuntime::default());
        self.statuses.iter_mut().for_each(|s| *s = Status::Idle);
        self.outputs.clear();
        self.accumulator = 0.0;
        self.elapsed = 0.0;
        self.tick_count = 0;
        if let Some(seed) = self.config.seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
    }

    fn ensure_alive(&self) -> Result<(), ExecutorError> {
        if self.tree.is_none() {
            Err(ExecutorError::Destroyed)
        } else {
            Ok(())
        }
    }

    fn shared_blackboard(&self) -> Result<&SharedBlackboard, ExecutorError> {
        self.blackboard.as_ref().ok_or(ExecutorError::Destroyed)
    }

    fn invalid(&self, action: &'static str) -> ExecutorError {
        ExecutorError::InvalidTransition {
            action,
            state: self.state,
        }
    }
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}
