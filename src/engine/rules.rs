//! Classic switching rules
//!
//! Besides macros, the engine evaluates flat per-category rule lists
//! (window title, process, idle, file, time). Each category is one entry
//! in the priority order; the first category that produces a match wins
//! the cycle.

use serde::{Deserialize, Serialize};

use crate::automation::conditions::TimeOfDay;
use crate::scene::SceneRef;

/// Condition category tags in dispatch priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Window-title rules ("title").
    WindowTitle,
    /// Executable/process rules ("exe").
    Process,
    Idle,
    File,
    Time,
    /// Macro evaluation, usually last.
    Macro,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::WindowTitle => "title",
            Category::Process => "exe",
            Category::Idle => "idle",
            Category::File => "file",
            Category::Time => "time",
            Category::Macro => "macro",
        }
    }

    pub fn from_str(name: &str) -> Option<Category> {
        match name {
            "title" => Some(Category::WindowTitle),
            "exe" => Some(Category::Process),
            "idle" => Some(Category::Idle),
            "file" => Some(Category::File),
            "time" => Some(Category::Time),
            "macro" => Some(Category::Macro),
            _ => None,
        }
    }
}

/// Default dispatch order; macros evaluate after all classic rules.
pub fn default_priority() -> Vec<Category> {
    vec![
        Category::WindowTitle,
        Category::Process,
        Category::Idle,
        Category::File,
        Category::Time,
        Category::Macro,
    ]
}

/// Switch when the focused window title matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowRule {
    pub pattern: String,
    #[serde(default)]
    pub use_regex: bool,
    pub scene: SceneRef,
    #[serde(default)]
    pub transition: Option<String>,
    /// Delay before the switch is applied; a manual scene change during
    /// the delay discards the match.
    #[serde(default)]
    pub linger_ms: u64,
}

/// Switch when a matching process is in the foreground (or running, if
/// focus is unavailable).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessRule {
    pub process: String,
    #[serde(default)]
    pub use_regex: bool,
    pub scene: SceneRef,
    #[serde(default)]
    pub transition: Option<String>,
}

/// Switch after a period without user input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdleRule {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub seconds: u64,
    pub scene: SceneRef,
    #[serde(default)]
    pub transition: Option<String>,
}

/// Switch while a file's contents match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileRule {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub use_regex: bool,
    pub scene: SceneRef,
    #[serde(default)]
    pub transition: Option<String>,
}

/// Switch during a time-of-day window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeRule {
    pub window: TimeOfDay,
    pub scene: SceneRef,
    #[serde(default)]
    pub transition: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_name_round_trip() {
        for category in default_priority() {
            assert_eq!(Category::from_str(category.as_str()), Some(category));
        }
        assert_eq!(Category::from_str("video"), None);
    }
}
