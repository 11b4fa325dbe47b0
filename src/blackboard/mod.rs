//! The blackboard: a two-scope, type-tagged variable store shared between
//! the authoring layer and a running executor.

use crate::error::BlackboardError;
use ahash::AHashMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::rc::Rc;

mod compat;
mod value;

pub use compat::is_compatible;
pub use value::{Value, ValueType};

/// A blackboard shared by a workspace and the executors it spawns.
pub type SharedBlackboard = Rc<RefCell<Blackboard>>;

/// Visibility of a variable: local to one tree or global to the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Local,
    Global,
}

impl Scope {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "local" => Some(Scope::Local),
            "global" => Some(Scope::Global),
            _ => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Local => f.write_str("local"),
            Scope::Global => f.write_str("global"),
        }
    }
}

/// A named blackboard entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub scope: Scope,
    pub value_type: ValueType,
    pub value: Value,
}

/// Reported by [`Blackboard::set`] when a write changes a variable's inferred type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeChange {
    pub name: String,
    pub scope: Scope,
    pub from: ValueType,
    pub to: ValueType,
}

/// Change notifications delivered to blackboard listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum BlackboardEvent {
    Defined {
        name: String,
        scope: Scope,
    },
    Changed {
        name: String,
        scope: Scope,
        value: Value,
        type_change: Option<TypeChange>,
    },
    Removed {
        name: String,
        scope: Scope,
    },
    Renamed {
        from: String,
        to: String,
        scope: Scope,
    },
    Restored {
        scope: Scope,
    },
}

pub type ListenerId = u64;

type Listener = Rc<RefCell<dyn FnMut(&BlackboardEvent)>>;

/// An immutable copy of both scopes, ordered by variable name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlackboardSnapshot {
    pub local: BTreeMap<String, Variable>,
    pub global: BTreeMap<String, Variable>,
}

impl BlackboardSnapshot {
    pub fn get(&self, name: &str, scope: Scope) -> Option<&Value> {
        self.scope(scope).get(name).map(|v| &v.value)
    }

    pub fn contains(&self, name: &str, scope: Scope) -> bool {
        self.scope(scope).contains_key(name)
    }

    fn scope(&self, scope: Scope) -> &BTreeMap<String, Variable> {
        match scope {
            Scope::Local => &self.local,
            Scope::Global => &self.global,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingWrite {
    name: String,
    value: Value,
    scope: Scope,
}

/// Key/value variable store with local and global scopes.
#[derive(Default)]
pub struct Blackboard {
    local: AHashMap<String, Variable>,
    global: AHashMap<String, Variable>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: ListenerId,
    pending: VecDeque<PendingWrite>,
    holding: bool,
    held: Vec<BlackboardEvent>,
}

impl fmt::Debug for Blackboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blackboard")
            .field("local", &self.local)
            .field("global", &self.global)
            .field("listeners", &self.listeners.len())
            .field("pending", &self.pending.len())
            .field("held", &self.held.len())
            .finish()
    }
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a new, empty blackboard for sharing.
    pub fn shared() -> SharedBlackboard {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn get(&self, name: &str, scope: Scope) -> Option<&Value> {
        self.variables(scope).get(name).map(|v| &v.value)
    }

    pub fn variable(&self, name: &str, scope: Scope) -> Option<&Variable> {
        self.variables(scope).get(name)
    }

    pub fn contains(&self, name: &str, scope: Scope) -> bool {
        self.variables(scope).contains_key(name)
    }

    /// Declares a new variable. A non-null initial value must match a
    /// declared type other than `any`.
    pub fn define(
        &mut self,
        name: &str,
        value_type: ValueType,
        initial: Value,
        scope: Scope,
    ) -> Result<(), BlackboardError> {
        if self.contains(name, scope) {
            return Err(BlackboardError::DuplicateVariable {
                name: name.to_string(),
                scope,
            });
        }
        if value_type != ValueType::Any && !initial.is_null() {
            let found = initial.infer_type(scope);
            if found != value_type {
                return Err(BlackboardError::TypeMismatch {
                    name: name.to_string(),
                    declared: value_type,
                    found,
                });
            }
        }
        self.variables_mut(scope).insert(
            name.to_string(),
            Variable {
                name: name.to_string(),
                scope,
                value_type,
                value: initial,
            },
        );
        self.notify(&BlackboardEvent::Defined {
            name: name.to_string(),
            scope,
        });
        Ok(())
    }

    /// Writes a value, defining the variable if it does not exist yet.
    ///
    /// Returns the type change when the new value's inferred type differs from
    /// the previous one. Writing `null` keeps the previous type.
    pub fn set(&mut self, name: &str, value: Value, scope: Scope) -> Option<TypeChange> {
        let Some(variable) = self.variables_mut(scope).get_mut(name) else {
            let value_type = value.infer_type(scope);
            self.variables_mut(scope).insert(
                name.to_string(),
                Variable {
                    name: name.to_string(),
                    scope,
                    value_type,
                    value,
                },
            );
            self.notify(&BlackboardEvent::Defined {
                name: name.to_string(),
                scope,
            });
            return None;
        };

        let previous = variable.value_type;
        let next = if value.is_null() {
            previous
        } else {
            value.infer_type(scope)
        };
        variable.value_type = next;
        variable.value = value.clone();

        let type_change = (previous != next).then(|| TypeChange {
            name: name.to_string(),
            scope,
            from: previous,
            to: next,
        });
        self.notify(&BlackboardEvent::Changed {
            name: name.to_string(),
            scope,
            value,
            type_change: type_change.clone(),
        });
        type_change
    }

    pub fn remove(&mut self, name: &str, scope: Scope) -> Option<Variable> {
        let removed = self.variables_mut(scope).remove(name);
        if removed.is_some() {
            self.notify(&BlackboardEvent::Removed {
                name: name.to_string(),
                scope,
            });
        }
        removed
    }

    pub fn rename(&mut self, from: &str, to: &str, scope: Scope) -> Result<(), BlackboardError> {
        if self.contains(to, scope) {
            return Err(BlackboardError::DuplicateVariable {
                name: to.to_string(),
                scope,
            });
        }
        let mut variable =
            self.variables_mut(scope)
                .remove(from)
                .ok_or_else(|| BlackboardError::UnknownVariable {
                    name: from.to_string(),
                    scope,
                })?;
        variable.name = to.to_string();
        self.variables_mut(scope).insert(to.to_string(), variable);
        self.notify(&BlackboardEvent::Renamed {
            from: from.to_string(),
            to: to.to_string(),
            scope,
        });
        Ok(())
    }

    /// Lists every variable of a scope, ordered by name.
    pub fn list_all(&self, scope: Scope) -> Vec<&Variable> {
        self.variables(scope)
            .values()
            .sorted_by(|a, b| a.name.cmp(&b.name))
            .collect()
    }

    pub fn snapshot(&self) -> BlackboardSnapshot {
        BlackboardSnapshot {
            local: self
                .local
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            global: self
                .global
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Replaces the local scope with the one captured in `snapshot`.
    pub fn restore_local(&mut self, snapshot: &BlackboardSnapshot) {
        self.local = snapshot
            .local
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.notify(&BlackboardEvent::Restored {
            scope: Scope::Local,
        });
    }

    /// Queues a write from an external writer. Queued writes are applied, in
    /// order, by [`Blackboard::apply_pending`] before the next tick begins.
    pub fn queue_set(&mut self, name: &str, value: Value, scope: Scope) {
        self.pending.push_back(PendingWrite {
            name: name.to_string(),
            value,
            scope,
        });
    }

    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    /// Applies all queued writes in order and returns the type changes they
    /// caused.
    pub fn apply_pending(&mut self) -> Vec<TypeChange> {
        let mut changes = Vec::new();
        while let Some(write) = self.pending.pop_front() {
            changes.extend(self.set(&write.name, write.value, write.scope));
        }
        changes
    }

    /// Registers a change listener.
    ///
    /// Listeners run as soon as the change happens, while the blackboard is
    /// still borrowed. Changes made through [`Blackboard::with_deferred_events`],
    /// which the workspace and the executor use for the shared blackboard, are
    /// delivered after the borrow is released, so those listeners may read it.
    /// A listener never observes the events it causes itself.
    pub fn subscribe(&mut self, listener: impl FnMut(&BlackboardEvent) + 'static) -> ListenerId {
        let id = self.next_listener;
        self.next_listener += 1;
        let listener: Listener = Rc::new(RefCell::new(listener));
        self.listeners.push((id, listener));
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Runs `f` on the shared blackboard with events held back, then delivers
    /// them with the blackboard unborrowed.
    pub fn with_deferred_events<R>(
        shared: &SharedBlackboard,
        f: impl FnOnce(&mut Blackboard) -> R,
    ) -> R {
        let result = {
            let mut blackboard = shared.borrow_mut();
            blackboard.holding = true;
            f(&mut blackboard)
        };
        Self::dispatch_held(shared);
        result
    }

    fn dispatch_held(shared: &SharedBlackboard) {
        loop {
            let (events, listeners) = {
                let mut blackboard = shared.borrow_mut();
                if blackboard.held.is_empty() {
                    blackboard.holding = false;
                    return;
                }
                let listeners: Vec<Listener> = blackboard
                    .listeners
                    .iter()
                    .map(|(_, listener)| Rc::clone(listener))
                    .collect();
                (std::mem::take(&mut blackboard.held), listeners)
            };
            for event in &events {
                deliver(&listeners, event);
            }
        }
    }

    fn notify(&mut self, event: &BlackboardEvent) {
        if self.holding {
            self.held.push(event.clone());
        } else {
            let listeners: Vec<Listener> =
                self.listeners.iter().map(|(_, l)| Rc::clone(l)).collect();
            deliver(&listeners, event);
        }
    }

    fn variables(&self, scope: Scope) -> &AHashMap<String, Variable> {
        match scope {
            Scope::Local => &self.local,
            Scope::Global => &self.global,
        }
    }

    fn variables_mut(&mut self, scope: Scope) -> &mut AHashMap<String, Variable> {
        match scope {
            Scope::Local => &mut self.local,
            Scope::Global => &mut self.global,
        }
    }
}

fn deliver(listeners: &[Listener], event: &BlackboardEvent) {
    for listener in listeners {
        if let Ok(mut listener) = listener.try_borrow_mut() {
            (*listener)(event);
        }
    }
}
