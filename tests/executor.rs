mod common;

use common::{add, add_child, leaf_for, local, run_ticks, seeded_config, start};
use itertools::Itertools;
use koudou::blackboard::{BlackboardEvent, TypeChange};
use koudou::error::NodeError;
use koudou::executor::LogLevel;
use koudou::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

const OUTCOMES: [Status; 3] = [Status::Success, Status::Failure, Status::Running];

fn composite_with(kind: &str, children: &[Status]) -> (Workspace, Vec<String>) {
    let mut ws = Workspace::new(kind);
    let composite = add_child(&mut ws, ROOT_ID, kind, 0.0, &[]);
    let ids = children
        .iter()
        .enumerate()
        .map(|(i, status)| add_child(&mut ws, &composite, leaf_for(*status), i as f64 * 10.0, &[]))
        .collect();
    (ws, ids)
}

fn assert_composite_law(kind: &str, proceed: Status) {
    for len in 1..=3 {
        for children in std::iter::repeat_n(OUTCOMES.iter().copied(), len).multi_cartesian_product() {
            let (ws, ids) = composite_with(kind, &children);
            let mut executor = start(&ws);
            let report = executor.tick(0.1).unwrap();

            let stop_at = children.iter().position(|s| *s != proceed);
            let expected = stop_at.map(|i| children[i]).unwrap_or(proceed);
            assert_eq!(report.root_status(), expected, "{} over {:?}", kind, children);

            let last_visited = stop_at.unwrap_or(children.len() - 1);
            for (i, id) in ids.iter().enumerate() {
                let visited = report.status(id).is_some();
                assert_eq!(visited, i <= last_visited, "{} child {} of {:?}", kind, i, children);
            }
        }
    }
}

#[test]
fn test_sequence_settles_on_first_non_success() {
    assert_composite_law("sequence", Status::Success);
}

#[test]
fn test_selector_settles_on_first_non_failure() {
    assert_composite_law("selector", Status::Failure);
}

#[test]
fn test_empty_composites_and_childless_root() {
    for (kind, expected) in [("sequence", Status::Success), ("selector", Status::Failure)] {
        let (ws, _) = composite_with(kind, &[]);
        let mut executor = start(&ws);
        assert_eq!(executor.tick(0.1).unwrap().root_status(), expected);
    }

    let ws = Workspace::new("empty");
    let mut executor = start(&ws);
    let report = executor.tick(0.1).unwrap();
    assert_eq!(report.statuses, [(ROOT_ID.to_string(), Status::Idle)]);
}

#[test]
fn test_running_child_resumes_without_rerunning_siblings() {
    let mut ws = Workspace::new("resume");
    let seq = add_child(&mut ws, ROOT_ID, "sequence", 0.0, &[]);
    let bump = add_child(&mut ws, &seq, "increment", 0.0, &[("key", Value::from("hits"))]);
    let wait = add_child(&mut ws, &seq, "wait", 10.0, &[("duration", Value::from(0.2))]);
    let mut executor = start(&ws);

    let first = executor.tick(0.1).unwrap();
    assert_eq!(first.status(&wait), Some(Status::Running));
    assert_eq!(first.root_status(), Status::Running);

    let second = executor.tick(0.1).unwrap();
    assert_eq!(second.status(&bump), None);
    assert_eq!(second.status(&wait), Some(Status::Success));
    assert_eq!(second.root_status(), Status::Success);
    assert_eq!(local(&ws, "hits"), Some(Value::from(1)));

    executor.tick(0.1).unwrap();
    assert_eq!(local(&ws, "hits"), Some(Value::from(2)));
}

fn decorated(
    decorator: &str,
    config: &[(&str, Value)],
    leaf: &str,
    leaf_config: &[(&str, Value)],
) -> (Workspace, String, String) {
    let mut ws = Workspace::new(decorator);
    let node = add_child(&mut ws, ROOT_ID, decorator, 0.0, config);
    let child = add_child(&mut ws, &node, leaf, 0.0, leaf_config);
    (ws, node, child)
}

fn root_statuses(ws: &Workspace, ticks: usize, delta: f64) -> Vec<Status> {
    let mut executor = start(ws);
    run_ticks(&mut executor, ticks, delta)
        .iter()
        .map(TickReport::root_status)
        .collect()
}

#[test]
fn test_simple_decorators() {
    let cases = [
        ("inverter", "fail", Status::Success),
        ("inverter", "succeed", Status::Failure),
        ("inverter", "running", Status::Running),
        ("always-succeed", "fail", Status::Success),
        ("always-succeed", "running", Status::Running),
        ("always-fail", "succeed", Status::Failure),
        ("always-fail", "running", Status::Running),
    ];
    for (decorator, leaf, expected) in cases {
        let (ws, _, _) = decorated(decorator, &[], leaf, &[]);
        assert_eq!(root_statuses(&ws, 1, 0.1), [expected], "{} over {}", decorator, leaf);
    }
}

#[test]
fn test_repeat_counts_successes() {
    let (ws, _, _) = decorated("repeat", &[("count", Value::from(3))], "succeed", &[]);
    assert_eq!(
        root_statuses(&ws, 4, 0.1),
        [Status::Running, Status::Running, Status::Success, Status::Running]
    );

    let (ws, _, _) = decorated("repeat", &[("count", Value::from(3))], "fail", &[]);
    assert_eq!(root_statuses(&ws, 1, 0.1), [Status::Failure]);
}

#[test]
fn test_retry_counts_failures() {
    let (ws, _, _) = decorated("retry", &[("attempts", Value::from(2))], "fail", &[]);
    assert_eq!(
        root_statuses(&ws, 3, 0.1),
        [Status::Running, Status::Failure, Status::Running]
    );

    let (ws, _, _) = decorated("retry", &[("attempts", Value::from(2))], "succeed", &[]);
    assert_eq!(root_statuses(&ws, 1, 0.1), [Status::Success]);
}

#[test]
fn test_cooldown_blocks_until_elapsed() {
    let (ws, _, child) = decorated("cooldown", &[("duration", Value::from(0.25))], "succeed", &[]);
    let mut executor = start(&ws);
    let reports = run_ticks(&mut executor, 4, 0.1);

    let statuses: Vec<Status> = reports.iter().map(TickReport::root_status).collect();
    assert_eq!(
        statuses,
        [Status::Success, Status::Failure, Status::Failure, Status::Success]
    );
    // the child is not ticked while cooling down
    assert_eq!(reports[1].status(&child), None);
}

#[test]
fn test_timeout_aborts_running_child() {
    let (ws, timeout, wait) = decorated(
        "timeout",
        &[("duration", Value::from(0.3))],
        "wait",
        &[("duration", Value::from(1))],
    );
    let mut executor = start(&ws);
    let reports = run_ticks(&mut executor, 4, 0.1);

    for report in &reports[..3] {
        assert_eq!(report.status(&timeout), Some(Status::Running));
    }
    assert_eq!(reports[3].status(&timeout), Some(Status::Failure));
    assert_eq!(reports[3].status(&wait), Some(Status::Idle));
    assert_eq!(executor.status(&wait), Status::Idle);
}

#[test]
fn test_wait_succeeds_after_its_duration() {
    let mut ws = Workspace::new("wait");
    add_child(&mut ws, ROOT_ID, "wait", 0.0, &[("duration", Value::from(0.3))]);
    assert_eq!(
        root_statuses(&ws, 3, 0.1),
        [Status::Running, Status::Running, Status::Success]
    );
}

#[test]
fn test_condition_compares_blackboard_value() {
    let mut ws = Workspace::new("condition");
    ws.define_variable("armed", ValueType::Boolean, Value::from(false), Scope::Local)
        .unwrap();
    ws.define_variable("level", ValueType::Number, Value::from(2), Scope::Global)
        .unwrap();
    let selector = add_child(&mut ws, ROOT_ID, "selector", 0.0, &[]);
    let armed = add_child(
        &mut ws,
        &selector,
        "check-blackboard",
        0.0,
        &[("key", Value::from("armed")), ("value", Value::from(true))],
    );
    let level = add_child(
        &mut ws,
        &selector,
        "check-blackboard",
        10.0,
        &[
            ("key", Value::from("level")),
            ("value", Value::from(2.0)),
            ("scope", Value::from("global")),
        ],
    );

    let mut executor = start(&ws);
    let report = executor.tick(0.1).unwrap();
    assert_eq!(report.status(&armed), Some(Status::Failure));
    assert_eq!(report.status(&level), Some(Status::Success));
}

#[test]
fn test_condition_without_key_fails_with_a_log() {
    let mut ws = Workspace::new("keyless");
    let check = add_child(&mut ws, ROOT_ID, "check-blackboard", 0.0, &[]);
    let mut executor = start(&ws);
    let report = executor.tick(0.1).unwrap();

    assert_eq!(report.status(&check), Some(Status::Failure));
    assert_eq!(report.logs.len(), 1);
    assert_eq!(report.logs[0].level, LogLevel::Error);
}

#[test]
fn test_node_error_fails_the_node_and_the_tick_continues() {
    let mut ws = Workspace::new("errors");
    let selector = add_child(&mut ws, ROOT_ID, "selector", 0.0, &[]);
    let broken = add_child(&mut ws, &selector, "wait", 0.0, &[("duration", Value::from("soon"))]);
    let fallback = add_child(&mut ws, &selector, "succeed", 10.0, &[]);

    let mut executor = start(&ws);
    let report = executor.tick(0.1).unwrap();
    assert_eq!(report.status(&broken), Some(Status::Failure));
    assert_eq!(report.status(&fallback), Some(Status::Success));
    assert_eq!(report.root_status(), Status::Success);

    let error = report
        .logs
        .iter()
        .find(|line| line.level == LogLevel::Error)
        .unwrap();
    assert_eq!(error.node_id.as_deref(), Some(broken.as_str()));
    assert_eq!(error.tick, 1);
}

struct Idler;

impl NodeHandler for Idler {
    fn node_type(&self) -> &str {
        "idler"
    }

    fn tick(&self, _ctx: &mut NodeContext<'_>) -> std::result::Result<Status, NodeError> {
        Ok(Status::Idle)
    }
}

#[test]
fn test_handler_returning_idle_is_an_error() {
    let mut ws = Workspace::new("idler");
    let leaf = add_child(&mut ws, ROOT_ID, "succeed", 0.0, &[]);
    let builder = TreeBuilder::new()
        .with_handler(Arc::new(Idler))
        .with_type_mapping("succeed", "idler");
    let tree = ws.build(&builder).unwrap();
    let mut executor = ws.executor(tree, seeded_config());
    executor.start().unwrap();

    let report = executor.tick(0.1).unwrap();
    assert_eq!(report.status(&leaf), Some(Status::Failure));
    assert_eq!(report.logs[0].level, LogLevel::Error);
}

fn gamble_workspace() -> Workspace {
    let mut ws = Workspace::new("gamble");
    ws.define_variable("wins", ValueType::Number, Value::from(0), Scope::Local)
        .unwrap();
    let always = add_child(&mut ws, ROOT_ID, "always-succeed", 0.0, &[]);
    let seq = add_child(&mut ws, &always, "sequence", 0.0, &[]);
    add_child(&mut ws, &seq, "random-outcome", 0.0, &[]);
    add_child(&mut ws, &seq, "increment", 10.0, &[("key", Value::from("wins"))]);
    ws
}

#[test]
fn test_pause_and_resume_do_not_change_the_run() {
    let straight = gamble_workspace();
    let mut executor = start(&straight);
    let expected: Vec<_> = run_ticks(&mut executor, 10, 0.1)
        .into_iter()
        .map(|r| r.statuses)
        .collect();
    let expected_wins = local(&straight, "wins");

    let paused = gamble_workspace();
    let mut executor = start(&paused);
    let mut actual: Vec<_> = run_ticks(&mut executor, 4, 0.1)
        .into_iter()
        .map(|r| r.statuses)
        .collect();

    executor.pause().unwrap();
    assert_eq!(executor.state(), ExecutorState::Paused);
    assert_eq!(
        executor.tick(0.1).unwrap_err(),
        ExecutorError::InvalidTransition {
            action: "tick",
            state: ExecutorState::Paused
        }
    );
    assert_eq!(executor.update(1.0).unwrap(), 0);
    assert!(executor.pause().is_err());
    executor.resume().unwrap();

    actual.extend(run_ticks(&mut executor, 6, 0.1).into_iter().map(|r| r.statuses));
    assert_eq!(actual, expected);
    assert_eq!(local(&paused, "wins"), expected_wins);
    assert_eq!(executor.tick_count(), 10);
}

#[test]
fn test_stop_restores_local_scope_only() {
    let mut ws = Workspace::new("restore");
    ws.define_variable("hp", ValueType::Number, Value::from(10), Scope::Local)
        .unwrap();
    ws.define_variable("score", ValueType::Number, Value::from(0), Scope::Global)
        .unwrap();
    let seq = add_child(&mut ws, ROOT_ID, "sequence", 0.0, &[]);
    add_child(
        &mut ws,
        &seq,
        "set-variable",
        0.0,
        &[("key", Value::from("hp")), ("value", Value::from(3))],
    );
    add_child(
        &mut ws,
        &seq,
        "set-variable",
        10.0,
        &[
            ("key", Value::from("score")),
            ("value", Value::from(7)),
            ("scope", Value::from("global")),
        ],
    );
    add_child(
        &mut ws,
        &seq,
        "set-variable",
        20.0,
        &[("key", Value::from("temp")), ("value", Value::from(true))],
    );

    let mut executor = start(&ws);
    executor.tick(0.1).unwrap();
    assert_eq!(local(&ws, "hp"), Some(Value::from(3)));
    assert_eq!(local(&ws, "temp"), Some(Value::from(true)));

    executor.stop().unwrap();
    assert_eq!(executor.state(), ExecutorState::Idle);
    assert_eq!(executor.tick_count(), 0);
    assert_eq!(local(&ws, "hp"), Some(Value::from(10)));
    assert_eq!(local(&ws, "temp"), None);
    assert_eq!(
        ws.variable("score", Scope::Global).map(|v| v.value),
        Some(Value::from(7))
    );
}

#[test]
fn test_step_from_each_state() {
    let mut ws = Workspace::new("step");
    ws.define_variable("n", ValueType::Number, Value::from(0), Scope::Local)
        .unwrap();
    add_child(&mut ws, ROOT_ID, "increment", 0.0, &[("key", Value::from("n"))]);
    let tree = ws.build(&TreeBuilder::new()).unwrap();
    let mut executor = ws.executor(tree, seeded_config());

    let report = executor.step().unwrap();
    assert_eq!(report.tick, 1);
    assert_eq!(executor.state(), ExecutorState::Idle);
    executor.step().unwrap();
    assert_eq!(local(&ws, "n"), Some(Value::from(2)));

    executor.start().unwrap();
    assert_eq!(
        executor.step().unwrap_err(),
        ExecutorError::InvalidTransition {
            action: "step",
            state: ExecutorState::Running
        }
    );
    executor.tick(0.1).unwrap();
    executor.pause().unwrap();
    let report = executor.step().unwrap();
    assert_eq!(report.tick, 2);
    assert_eq!(executor.state(), ExecutorState::Paused);
    assert_eq!(local(&ws, "n"), Some(Value::from(4)));

    // the restore point is the one taken by the first step
    executor.stop().unwrap();
    assert_eq!(local(&ws, "n"), Some(Value::from(0)));
}

#[test]
fn test_update_performs_fixed_steps() {
    let mut ws = Workspace::new("frames");
    add_child(&mut ws, ROOT_ID, "running", 0.0, &[]);

    let tree = ws.build(&TreeBuilder::new()).unwrap();
    let mut executor = ws.executor(tree, seeded_config());
    assert_eq!(executor.update(1.0).unwrap(), 0);
    executor.start().unwrap();
    assert_eq!(executor.update(0.25).unwrap(), 2);
    assert_eq!(executor.update(0.05).unwrap(), 1);
    assert_eq!(executor.tick_count(), 3);

    let tree = ws.build(&TreeBuilder::new()).unwrap();
    let mut fast = ws.executor(tree, seeded_config().with_speed(2.0));
    fast.start().unwrap();
    assert_eq!(fast.update(0.1).unwrap(), 2);
    assert!((fast.elapsed() - 0.2).abs() < 1e-9);

    let tree = ws.build(&TreeBuilder::new()).unwrap();
    let config = ExecutorConfig {
        max_ticks_per_update: 3,
        ..seeded_config()
    };
    let mut capped = ws.executor(tree, config);
    capped.start().unwrap();
    let performed: Vec<usize> = [1.0, 0.0, 0.0, 0.0, 0.0]
        .into_iter()
        .map(|frame| capped.update(frame).unwrap())
        .collect();
    assert_eq!(performed, [3, 3, 3, 1, 0]);
}

#[test]
fn test_tick_count_does_not_depend_on_frame_rate() {
    let mut ws = Workspace::new("frame-rate");
    add_child(&mut ws, ROOT_ID, "running", 0.0, &[]);

    let mut totals = Vec::new();
    for frames in [30, 60, 144] {
        let tree = ws.build(&TreeBuilder::new()).unwrap();
        let mut executor = ws.executor(tree, seeded_config());
        executor.start().unwrap();
        for _ in 0..frames {
            executor.update(1.0 / frames as f64).unwrap();
        }
        totals.push(executor.tick_count());
    }
    assert_eq!(totals, [10, 10, 10]);
}

#[test]
fn test_reporter_receives_one_report_per_tick() {
    let mut ws = Workspace::new("reports");
    ws.define_variable("n", ValueType::Number, Value::from(0), Scope::Local)
        .unwrap();
    add_child(&mut ws, ROOT_ID, "increment", 0.0, &[("key", Value::from("n"))]);
    let tree = ws.build(&TreeBuilder::new()).unwrap();
    let mut executor = ws.executor(tree, seeded_config());

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let blackboard = Rc::clone(ws.blackboard());
    executor.on_report(move |report| {
        let live = blackboard.borrow().get("n", Scope::Local).cloned();
        sink.borrow_mut().push((report.tick, live));
    });
    executor.start().unwrap();
    assert_eq!(executor.update(0.35).unwrap(), 3);

    assert_eq!(
        *seen.borrow(),
        [
            (1, Some(Value::from(1))),
            (2, Some(Value::from(2))),
            (3, Some(Value::from(3))),
        ]
    );
}

#[test]
fn test_queued_writes_apply_before_next_tick() {
    let mut ws = Workspace::new("queued");
    ws.define_variable("flag", ValueType::Boolean, Value::from(false), Scope::Local)
        .unwrap();
    add_child(
        &mut ws,
        ROOT_ID,
        "check-blackboard",
        0.0,
        &[("key", Value::from("flag")), ("value", Value::from(true))],
    );
    let mut executor = start(&ws);
    assert_eq!(executor.tick(0.1).unwrap().root_status(), Status::Failure);

    ws.queue_variable_write("flag", Value::from(true), Scope::Local);
    assert_eq!(ws.blackboard().borrow().pending_writes(), 1);
    assert_eq!(local(&ws, "flag"), Some(Value::from(false)));

    let report = executor.tick(0.1).unwrap();
    assert_eq!(report.root_status(), Status::Success);
    assert_eq!(report.blackboard.get("flag", Scope::Local), Some(&Value::from(true)));
    assert_eq!(ws.blackboard().borrow().pending_writes(), 0);
}

#[test]
fn test_statuses_cover_every_compiled_node() {
    let (ws, ids) = composite_with("sequence", &[Status::Failure, Status::Success]);
    let mut executor = start(&ws);
    executor.tick(0.1).unwrap();

    let statuses = executor.statuses();
    assert_eq!(statuses.len(), 4);
    assert_eq!(executor.status(&ids[0]), Status::Failure);
    assert_eq!(executor.status(&ids[1]), Status::Idle);
    assert_eq!(statuses[0], (ROOT_ID.to_string(), Status::Failure));
}

#[test]
fn test_invalid_transitions() {
    let ws = Workspace::new("transitions");
    let tree = ws.build(&TreeBuilder::new()).unwrap();
    let mut executor = ws.executor(tree, seeded_config());

    assert!(executor.tick(0.1).is_err());
    assert!(executor.pause().is_err());
    assert!(executor.resume().is_err());
    executor.stop().unwrap();
    executor.start().unwrap();
    assert_eq!(
        executor.start().unwrap_err(),
        ExecutorError::InvalidTransition {
            action: "start",
            state: ExecutorState::Running
        }
    );
}

#[test]
fn test_destroyed_executor_rejects_everything() {
    let mut ws = Workspace::new("destroy");
    let leaf = add(&mut ws, "succeed", 0.0, &[]);
    ws.connect(ROOT_ID, &leaf).unwrap();
    let mut executor = start(&ws);
    executor.tick(0.1).unwrap();

    executor.destroy();
    assert!(executor.is_destroyed());
    assert_eq!(executor.start().unwrap_err(), ExecutorError::Destroyed);
    assert_eq!(executor.tick(0.1).unwrap_err(), ExecutorError::Destroyed);
    assert_eq!(executor.step().unwrap_err(), ExecutorError::Destroyed);
    assert_eq!(executor.update(0.1).unwrap_err(), ExecutorError::Destroyed);
    assert_eq!(executor.stop().unwrap_err(), ExecutorError::Destroyed);
    assert_eq!(executor.status(&leaf), Status::Idle);
    assert!(executor.statuses().is_empty());
}

#[test]
fn test_config_from_json() {
    assert_eq!(ExecutorConfig::from_json("{}").unwrap(), ExecutorConfig::default());

    let config = ExecutorConfig::from_json(r#"{"tick_interval": 0.05, "seed": 7}"#).unwrap();
    assert_eq!(config.tick_interval, 0.05);
    assert_eq!(config.seed, Some(7));
    assert_eq!(config.speed, 1.0);

    for json in [r#"{"tick_interval": 0}"#, r#"{"speed": -1}"#, "not json"] {
        assert!(matches!(
            ExecutorConfig::from_json(json),
            Err(ExecutorError::InvalidConfig(_))
        ));
    }
}

fn bound_wait(ws: &mut Workspace, variable: &str, scope: &str) -> String {
    let wait = add_child(ws, ROOT_ID, "wait", 0.0, &[]);
    let source = add(
        ws,
        "blackboard-variable",
        -100.0,
        &[
            ("variableName", Value::from(variable)),
            ("scope", Value::from(scope)),
        ],
    );
    ws.bind(&source, &wait, "duration").unwrap();
    wait
}

#[test]
fn test_queued_type_change_drops_stale_bindings() {
    let mut ws = Workspace::new("queued-type");
    ws.define_variable("delay", ValueType::Number, Value::from(0.1), Scope::Global)
        .unwrap();
    let wait = bound_wait(&mut ws, "delay", "global");
    let mut executor = start(&ws);

    ws.queue_variable_write("delay", Value::from("soon"), Scope::Global);
    let report = executor.tick(0.1).unwrap();
    assert_eq!(
        report.type_changes,
        [TypeChange {
            name: "delay".to_string(),
            scope: Scope::Global,
            from: ValueType::Number,
            to: ValueType::String,
        }]
    );
    executor.stop().unwrap();

    let warnings = ws
        .reconcile_type_changes(&executor.take_type_changes())
        .unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].removed_count(), 1);
    assert_eq!(warnings[0].removed[0].to, wait);
    assert_eq!(ws.graph().property_connections_into(&wait).count(), 0);
    assert!(executor.take_type_changes().is_empty());

    // the removal is an ordinary undoable command
    assert!(ws.undo());
    assert_eq!(ws.graph().property_connections_into(&wait).count(), 1);
}

#[test]
fn test_node_writes_report_type_changes() {
    let mut ws = Workspace::new("node-type");
    ws.define_variable("label", ValueType::Number, Value::from(1), Scope::Local)
        .unwrap();
    let seq = add_child(&mut ws, ROOT_ID, "sequence", 0.0, &[]);
    add_child(
        &mut ws,
        &seq,
        "set-variable",
        0.0,
        &[("key", Value::from("label")), ("value", Value::from("one"))],
    );
    let wait = add(&mut ws, "wait", 10.0, &[]);
    ws.connect(&seq, &wait).unwrap();
    let source = add(
        &mut ws,
        "blackboard-variable",
        -100.0,
        &[("variableName", Value::from("label"))],
    );
    ws.bind(&source, &wait, "duration").unwrap();
    let mut executor = start(&ws);

    let report = executor.tick(0.1).unwrap();
    let changes: Vec<(&str, ValueType)> = report
        .type_changes
        .iter()
        .map(|c| (c.name.as_str(), c.to))
        .collect();
    assert_eq!(changes, [("label", ValueType::String)]);

    // stop restores the local type, so nothing is stale any more
    executor.stop().unwrap();
    let warnings = ws
        .reconcile_type_changes(&executor.take_type_changes())
        .unwrap();
    assert!(warnings.is_empty());
    assert_eq!(ws.graph().property_connections_into(&wait).count(), 1);
}

#[test]
fn test_listeners_may_read_the_shared_blackboard() {
    let mut ws = Workspace::new("listeners");
    ws.define_variable("n", ValueType::Number, Value::from(0), Scope::Local)
        .unwrap();
    add_child(&mut ws, ROOT_ID, "increment", 0.0, &[("key", Value::from("n"))]);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let shared = Rc::clone(ws.blackboard());
    ws.blackboard().borrow_mut().subscribe(move |event| {
        if let BlackboardEvent::Changed { name, scope, .. } = event {
            let live = shared.borrow().get(name, *scope).cloned();
            sink.borrow_mut().push(live);
        }
    });

    let mut executor = start(&ws);
    executor.tick(0.1).unwrap();
    ws.set_variable("n", Value::from(10), Scope::Local).unwrap();
    executor.stop().unwrap();

    assert_eq!(
        *seen.borrow(),
        [Some(Value::from(1)), Some(Value::from(10))]
    );
}
