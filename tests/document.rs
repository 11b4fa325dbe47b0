mod common;

use common::{add, add_child, run_ticks, seeded_config};
use koudou::document::{BINARY_MAGIC, NodeRecord};
use koudou::prelude::*;
use std::collections::BTreeMap;

fn sample_workspace() -> Workspace {
    let mut ws = Workspace::new("guard");
    ws.metadata_mut().description = "Patrols, then reports".to_string();
    ws.define_variable("delay", ValueType::Number, Value::from(0.2), Scope::Local)
        .unwrap();
    ws.define_variable("alerts", ValueType::Number, Value::from(0), Scope::Local)
        .unwrap();
    ws.define_variable(
        "route",
        ValueType::Array,
        Value::Array(vec![Value::from("north"), Value::from(2.5), Value::Null]),
        Scope::Global,
    )
    .unwrap();

    let seq = add_child(&mut ws, ROOT_ID, "sequence", 0.0, &[]);
    let wait = add_child(&mut ws, &seq, "wait", 0.0, &[]);
    let retry = add_child(&mut ws, &seq, "retry", 10.0, &[("attempts", Value::from(2))]);
    add_child(&mut ws, &retry, "random-outcome", 10.0, &[]);
    add_child(&mut ws, &seq, "increment", 20.0, &[("key", Value::from("alerts"))]);
    let log = add_child(&mut ws, &seq, "log", 30.0, &[]);

    let delay = add(
        &mut ws,
        "blackboard-variable",
        -100.0,
        &[("variableName", Value::from("delay"))],
    );
    ws.bind(&delay, &wait, "duration").unwrap();
    let message = add(&mut ws, "constant", -100.0, &[("value", Value::from("all clear"))]);
    ws.bind(&message, &log, "message").unwrap();
    ws.move_nodes(BTreeMap::from([(message, Position::new(-120.5, 42.25))]))
        .unwrap();
    add(&mut ws, "fail", 400.0, &[]);
    ws
}

fn assert_same_workspace(a: &Workspace, b: &Workspace) {
    assert_eq!(a.graph(), b.graph());
    assert_eq!(a.metadata(), b.metadata());
    for scope in [Scope::Local, Scope::Global] {
        assert_eq!(a.variables(scope), b.variables(scope));
    }
}

#[test]
fn test_json_round_trip() {
    let ws = sample_workspace();
    let document = ws.to_document();
    let json = document.to_json_pretty().unwrap();
    assert!(json.contains("\"all clear\""));

    let decoded = TreeDocument::from_json(&json).unwrap();
    assert_eq!(decoded, document);
    let restored = decoded.into_workspace(TemplateRegistry::builtin()).unwrap();
    assert_same_workspace(&ws, &restored);
}

#[test]
fn test_binary_round_trip() {
    let ws = sample_workspace();
    let document = ws.to_document();
    let bytes = document.to_bytes().unwrap();
    assert!(bytes.starts_with(BINARY_MAGIC));
    assert!(TreeDocument::is_binary(&bytes));

    let decoded = TreeDocument::from_bytes(&bytes).unwrap();
    assert_eq!(decoded, document);
    let restored = decoded.into_workspace(TemplateRegistry::builtin()).unwrap();
    assert_same_workspace(&ws, &restored);
}

#[test]
fn test_decode_detects_the_encoding() {
    let document = sample_workspace().to_document();
    let json = document.to_json_pretty().unwrap();
    let bytes = document.to_bytes().unwrap();

    assert!(!TreeDocument::is_binary(json.as_bytes()));
    assert_eq!(TreeDocument::decode(json.as_bytes()).unwrap(), document);
    assert_eq!(TreeDocument::decode(&bytes).unwrap(), document);
}

#[test]
fn test_document_lists_nodes_and_variables_in_order() {
    let ws = sample_workspace();
    let document = ws.to_document();

    assert_eq!(document.nodes.len(), ws.graph().len());
    assert_eq!(document.nodes[0].id, ROOT_ID);
    let root: &NodeRecord = &document.nodes[0];
    assert_eq!(root.children.len(), 1);

    let names: Vec<(&str, Scope)> = document
        .variables
        .iter()
        .map(|v| (v.name.as_str(), v.scope))
        .collect();
    assert_eq!(
        names,
        [
            ("alerts", Scope::Local),
            ("delay", Scope::Local),
            ("route", Scope::Global)
        ]
    );
}

#[test]
fn test_unknown_template_is_rejected() {
    let mut document = sample_workspace().to_document();
    document.nodes.push(NodeRecord {
        id: "teleport-1".to_string(),
        node_type: "teleport".to_string(),
        config: BTreeMap::new(),
        children: Vec::new(),
        position: Position::default(),
    });

    assert_eq!(
        document
            .into_workspace(TemplateRegistry::builtin())
            .unwrap_err(),
        DocumentError::UnknownTemplate {
            node_id: "teleport-1".to_string(),
            type_name: "teleport".to_string()
        }
    );
}

#[test]
fn test_structural_violations_are_rejected() {
    let document = sample_workspace().to_document();

    // a second child of the root
    let mut two_roots = document.clone();
    let orphan = two_roots
        .nodes
        .iter()
        .find(|n| n.node_type == "fail")
        .map(|n| n.id.clone())
        .unwrap();
    two_roots.nodes[0].children.push(orphan.clone());
    two_roots.connections.push(Connection::node(ROOT_ID, &orphan));
    assert!(matches!(
        two_roots.into_workspace(TemplateRegistry::builtin()),
        Err(DocumentError::Graph(_))
    ));

    // children lists that disagree with the connections
    let mut dangling = document.clone();
    dangling.connections.retain(|c| !c.is_node());
    assert!(matches!(
        dangling.into_workspace(TemplateRegistry::builtin()),
        Err(DocumentError::Graph(_))
    ));

    let mut duplicate = document;
    let copy = duplicate.nodes[1].clone();
    duplicate.nodes.push(copy);
    assert!(matches!(
        duplicate.into_workspace(TemplateRegistry::builtin()),
        Err(DocumentError::Graph(GraphError::DuplicateNode(_)))
    ));
}

#[test]
fn test_malformed_input_is_rejected() {
    let bytes = sample_workspace().to_document().to_bytes().unwrap();

    assert!(matches!(
        TreeDocument::from_bytes(b"NOPE"),
        Err(DocumentError::Decode(_))
    ));
    assert!(matches!(
        TreeDocument::from_bytes(&bytes[..bytes.len() / 2]),
        Err(DocumentError::Decode(_))
    ));
    let mut padded = bytes.clone();
    padded.push(0);
    assert!(matches!(
        TreeDocument::from_bytes(&padded),
        Err(DocumentError::Decode(_))
    ));
    assert!(matches!(
        TreeDocument::decode(b"{ \"metadata\": "),
        Err(DocumentError::Json(_))
    ));
}

#[test]
fn test_restored_workspace_runs_identically() {
    let original = sample_workspace();
    let bytes = original.to_document().to_bytes().unwrap();
    let restored = TreeDocument::decode(&bytes)
        .unwrap()
        .into_workspace(TemplateRegistry::builtin())
        .unwrap();

    let mut runs = Vec::new();
    for ws in [&original, &restored] {
        let tree = ws.build(&TreeBuilder::new()).unwrap();
        assert_eq!(tree.excluded().len(), 1);
        let mut executor = ws.executor(tree, seeded_config());
        executor.start().unwrap();
        let reports = run_ticks(&mut executor, 12, 0.1);
        runs.push(
            reports
                .into_iter()
                .map(|r| (r.statuses, r.blackboard))
                .collect::<Vec<_>>(),
        );
    }
    assert_eq!(runs[0], runs[1]);
}

#[test]
fn test_restored_workspace_allocates_fresh_ids() {
    let mut restored = sample_workspace()
        .to_document()
        .into_workspace(TemplateRegistry::builtin())
        .unwrap();
    let before = restored.graph().len();

    let id = restored
        .add_node("sequence", Position::default(), BTreeMap::new())
        .unwrap();
    assert_eq!(restored.graph().len(), before + 1);
    assert!(restored.graph().node(&id).is_some());
    assert!(!restored.can_redo());
}
