//! Condition and action type registries
//!
//! Condition and action types self-describe through string ids. The
//! registries map an id to a factory so the persistence layer can
//! instantiate arbitrary condition/action lists without compile-time
//! coupling. First registration for an id wins; later duplicates are
//! rejected so types registered from different modules cannot silently
//! clash. Unknown ids resolve to `None`, letting a corrupted settings
//! document degrade to "entry omitted" instead of a failed load.

use std::collections::HashMap;
use tracing::warn;

use crate::automation::{Action, Condition};

/// Factory entry for a condition type.
pub struct ConditionFactory {
    pub create: fn() -> Box<dyn Condition>,
    pub display_name: &'static str,
    /// Whether the settings UI should offer a duration gate for this type.
    pub uses_duration: bool,
}

/// Factory entry for an action type.
pub struct ActionFactory {
    pub create: fn() -> Box<dyn Action>,
    pub display_name: &'static str,
}

#[derive(Default)]
pub struct ConditionRegistry {
    factories: HashMap<String, ConditionFactory>,
}

impl ConditionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a condition type. Returns false (and keeps the existing
    /// entry) if the id is already taken.
    pub fn register(&mut self, id: &str, factory: ConditionFactory) -> bool {
        if self.factories.contains_key(id) {
            warn!("condition id '{}' already registered, ignoring duplicate", id);
            return false;
        }
        self.factories.insert(id.to_string(), factory);
        true
    }

    pub fn create(&self, id: &str) -> Option<Box<dyn Condition>> {
        self.factories.get(id).map(|f| (f.create)())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn display_name(&self, id: &str) -> Option<&'static str> {
        self.factories.get(id).map(|f| f.display_name)
    }

    pub fn uses_duration(&self, id: &str) -> bool {
        self.factories.get(id).map(|f| f.uses_duration).unwrap_or(false)
    }
}

#[derive(Default)]
pub struct ActionRegistry {
    factories: HashMap<String, ActionFactory>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action type. Returns false if the id is already taken.
    pub fn register(&mut self, id: &str, factory: ActionFactory) -> bool {
        if self.factories.contains_key(id) {
            warn!("action id '{}' already registered, ignoring duplicate", id);
            return false;
        }
        self.factories.insert(id.to_string(), factory);
        true
    }

    pub fn create(&self, id: &str) -> Option<Box<dyn Action>> {
        self.factories.get(id).map(|f| (f.create)())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }
}

/// Both registries, shared by the engine, the persistence layer and the
/// action queues.
pub struct Registries {
    pub conditions: ConditionRegistry,
    pub actions: ActionRegistry,
}

impl Registries {
    /// Empty registries, mainly for tests that bring their own types.
    pub fn empty() -> Self {
        Self {
            conditions: ConditionRegistry::new(),
            actions: ActionRegistry::new(),
        }
    }

    /// Registries pre-populated with every built-in condition and action
    /// type.
    pub fn with_builtins() -> Self {
        let mut regs = Self::empty();
        crate::automation::conditions::register_builtins(&mut regs.conditions);
        crate::automation::actions::register_builtins(&mut regs.actions);
        regs
    }
}
