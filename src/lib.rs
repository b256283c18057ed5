//! autoscene
//!
//! Automatic scene switching for OBS Studio over the WebSocket API.
//! A polling engine evaluates classic per-category rules (window title,
//! process, idle, file, time of day) and user-defined macros built from
//! registered condition and action types, with duration gating, action
//! queues and variable substitution.

pub mod automation;
pub mod config;
pub mod duration;
pub mod engine;
pub mod frontend;
pub mod logging;
pub mod logic;
pub mod persist;
pub mod probe;
pub mod queue;
pub mod registry;
pub mod scene;
pub mod variables;

pub use automation::{Action, Condition, Macro, RunContext};
pub use engine::{Switcher, SwitcherOptions};
pub use frontend::Frontend;
