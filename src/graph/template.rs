use crate::blackboard::Value;
use ahash::AHashMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Type ids of the builtin templates.
pub mod types {
    pub const ROOT: &str = "root";

    pub const SEQUENCE: &str = "sequence";
    pub const SELECTOR: &str = "selector";

    pub const INVERTER: &str = "inverter";
    pub const ALWAYS_SUCCEED: &str = "always-succeed";
    pub const ALWAYS_FAIL: &str = "always-fail";
    pub const REPEAT: &str = "repeat";
    pub const RETRY: &str = "retry";
    pub const COOLDOWN: &str = "cooldown";
    pub const TIMEOUT: &str = "timeout";

    pub const CHECK_BLACKBOARD: &str = "check-blackboard";

    pub const SUCCEED: &str = "succeed";
    pub const FAIL: &str = "fail";
    pub const RUNNING: &str = "running";
    pub const WAIT: &str = "wait";
    pub const SET_VARIABLE: &str = "set-variable";
    pub const INCREMENT: &str = "increment";
    pub const LOG: &str = "log";
    pub const RANDOM_OUTCOME: &str = "random-outcome";

    pub const BLACKBOARD_VARIABLE: &str = "blackboard-variable";
    pub const CONSTANT: &str = "constant";
}

/// The structural role of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Root,
    Composite,
    Decorator,
    Condition,
    Action,
    /// Value-only nodes that feed property connections and never run.
    Data,
}

impl NodeKind {
    pub fn accepts_children(&self) -> bool {
        matches!(
            self,
            NodeKind::Root | NodeKind::Composite | NodeKind::Decorator
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Root => "root",
            NodeKind::Composite => "composite",
            NodeKind::Decorator => "decorator",
            NodeKind::Condition => "condition",
            NodeKind::Action => "action",
            NodeKind::Data => "data",
        };
        f.write_str(name)
    }
}

/// The declared type of a configuration slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    Number,
    String,
    Boolean,
    Select,
    Object,
    Array,
    Any,
    Blackboard,
    Variable,
}

/// A named, typed configuration slot of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    pub property_type: PropertyType,
    pub default: Option<Value>,
    pub options: Vec<String>,
    pub allow_multiple_connections: bool,
}

impl PropertyDef {
    pub fn new(name: &str, property_type: PropertyType) -> Self {
        Self {
            name: name.to_string(),
            property_type,
            default: None,
            options: Vec::new(),
            allow_multiple_connections: false,
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }

    pub fn multiple(mut self) -> Self {
        self.allow_multiple_connections = true;
        self
    }
}

/// Describes a node type: its kind, display metadata and property schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTemplate {
    pub id: String,
    pub kind: NodeKind,
    pub display_name: String,
    pub category: String,
    pub default_config: BTreeMap<String, Value>,
    pub properties: Vec<PropertyDef>,
}

impl NodeTemplate {
    pub fn new(id: &str, kind: NodeKind, display_name: &str) -> Self {
        Self {
            id: id.to_string(),
            kind,
            display_name: display_name.to_string(),
            category: kind.to_string(),
            default_config: BTreeMap::new(),
            properties: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = category.to_string();
        self
    }

    /// Adds a property slot. Its default, if any, becomes part of the default config.
    pub fn with_property(mut self, property: PropertyDef) -> Self {
        if let Some(default) = &property.default {
            self.default_config
                .insert(property.name.clone(), default.clone());
        }
        self.properties.push(property);
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// Templates addressable by type id.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: AHashMap<String, NodeTemplate>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every builtin template.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        register_builtin_templates(&mut registry);
        registry
    }

    pub fn register(&mut self, template: NodeTemplate) {
        self.templates.insert(template.id.clone(), template);
    }

    pub fn get(&self, id: &str) -> Option<&NodeTemplate> {
        self.templates.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Templates grouped for palettes: ordered by category, then id.
    pub fn iter(&self) -> impl Iterator<Item = &NodeTemplate> {
        self.templates
            .values()
            .sorted_by(|a, b| (&a.category, &a.id).cmp(&(&b.category, &b.id)))
    }
}

fn scope_property() -> PropertyDef {
    PropertyDef::new("scope", PropertyType::Select)
        .with_default("local")
        .with_options(&["local", "global"])
}

fn register_builtin_templates(registry: &mut TemplateRegistry) {
    use PropertyType as P;

    registry.register(NodeTemplate::new(types::ROOT, NodeKind::Root, "Root"));

    for (id, name) in [(types::SEQUENCE, "Sequence"), (types::SELECTOR, "Selector")] {
        registry.register(NodeTemplate::new(id, NodeKind::Composite, name));
    }

    for (id, name) in [
        (types::INVERTER, "Inverter"),
        (types::ALWAYS_SUCCEED, "Always Succeed"),
        (types::ALWAYS_FAIL, "Always Fail"),
    ] {
        registry.register(NodeTemplate::new(id, NodeKind::Decorator, name));
    }
    registry.register(
        NodeTemplate::new(types::REPEAT, NodeKind::Decorator, "Repeat")
            .with_property(PropertyDef::new("count", P::Number).with_default(1)),
    );
    registry.register(
        NodeTemplate::new(types::RETRY, NodeKind::Decorator, "Retry")
            .with_property(PropertyDef::new("attempts", P::Number).with_default(3)),
    );
    registry.register(
        NodeTemplate::new(types::COOLDOWN, NodeKind::Decorator, "Cooldown")
            .with_property(PropertyDef::new("duration", P::Number).with_default(1)),
    );
    registry.register(
        NodeTemplate::new(types::TIMEOUT, NodeKind::Decorator, "Timeout")
            .with_property(PropertyDef::new("duration", P::Number).with_default(1)),
    );

    registry.register(
        NodeTemplate::new(
            types::CHECK_BLACKBOARD,
            NodeKind::Condition,
            "Check Blackboard",
        )
        .with_property(PropertyDef::new("key", P::String))
        .with_property(PropertyDef::new("value", P::Any))
        .with_property(scope_property()),
    );

    for (id, name) in [
        (types::SUCCEED, "Succeed"),
        (types::FAIL, "Fail"),
        (types::RUNNING, "Running"),
    ] {
        registry.register(NodeTemplate::new(id, NodeKind::Action, name).with_category("debug"));
    }
    registry.register(
        NodeTemplate::new(types::WAIT, NodeKind::Action, "Wait")
            .with_property(PropertyDef::new("duration", P::Number).with_default(1)),
    );
    registry.register(
        NodeTemplate::new(types::SET_VARIABLE, NodeKind::Action, "Set Variable")
            .with_property(PropertyDef::new("key", P::String))
            .with_property(PropertyDef::new("value", P::Any))
            .with_property(scope_property()),
    );
    registry.register(
        NodeTemplate::new(types::INCREMENT, NodeKind::Action, "Increment")
            .with_property(PropertyDef::new("key", P::String))
            .with_property(PropertyDef::new("amount", P::Number).with_default(1))
            .with_property(scope_property()),
    );
    registry.register(
        NodeTemplate::new(types::LOG, NodeKind::Action, "Log")
            .with_property(PropertyDef::new("message", P::String).with_default("")),
    );
    registry.register(
        NodeTemplate::new(types::RANDOM_OUTCOME, NodeKind::Action, "Random Outcome")
            .with_category("debug")
            .with_property(PropertyDef::new("successProbability", P::Number).with_default(0.5)),
    );

    registry.register(
        NodeTemplate::new(
            types::BLACKBOARD_VARIABLE,
            NodeKind::Data,
            "Blackboard Variable",
        )
        .with_property(PropertyDef::new("variableName", P::Variable))
        .with_property(scope_property()),
    );
    registry.register(
        NodeTemplate::new(types::CONSTANT, NodeKind::Data, "Constant")
            .with_property(PropertyDef::new("value", P::Any)),
    );
}
