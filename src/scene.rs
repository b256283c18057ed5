//! Weak scene references
//!
//! The engine never owns OBS scene lifetime. A [`SceneRef`] is just a name
//! that is re-resolved against the frontend on every use; a scene that no
//! longer exists resolves to `None` and is treated as absent by callers.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::frontend::Frontend;
use crate::variables::VariableStore;

/// Non-owning reference to an OBS scene, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneRef {
    pub name: String,
}

impl SceneRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    /// Resolve against the frontend's current scene list. Variable
    /// references in the name are substituted first. A dangling reference
    /// yields `None`.
    pub fn resolve(
        &self,
        frontend: &Arc<dyn Frontend>,
        variables: &VariableStore,
    ) -> Option<String> {
        if self.name.is_empty() {
            return None;
        }
        let name = variables.resolve(&self.name);
        if frontend.scene_names().iter().any(|s| s == &name) {
            Some(name)
        } else {
            None
        }
    }
}

impl From<&str> for SceneRef {
    fn from(name: &str) -> Self {
        SceneRef::new(name)
    }
}
