//! System probing
//!
//! Window title, foreground process and idle queries feed the per-cycle
//! precondition snapshot. Every probe method is best effort: a platform
//! that cannot answer returns `None` and the dependent rules simply never
//! match (fail open).

use chrono::{DateTime, Local};
use std::sync::Mutex;
use sysinfo::System;

/// Per-cycle snapshot of runtime signals the condition checks read from.
///
/// Captured once at the top of every evaluation cycle so all conditions
/// in the cycle see consistent data.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Focused window title, after ignore-list filtering.
    pub window_title: Option<String>,
    /// Title captured on the previous cycle.
    pub previous_title: Option<String>,
    /// Foreground process name, if the platform exposes it.
    pub foreground_process: Option<String>,
    /// Names of all running processes.
    pub processes: Vec<String>,
    /// Seconds without user input, if the platform exposes it.
    pub idle_seconds: Option<u64>,
    /// Scene tracked from the last frontend scene-changed event.
    pub current_scene: Option<String>,
    pub previous_scene: Option<String>,
    /// Wall-clock time of the snapshot.
    pub time: DateTime<Local>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            window_title: None,
            previous_title: None,
            foreground_process: None,
            processes: Vec::new(),
            idle_seconds: None,
            current_scene: None,
            previous_scene: None,
            time: Local::now(),
        }
    }
}

/// Source of window/process/idle signals.
pub trait SystemProbe: Send + Sync {
    fn focused_window_title(&self) -> Option<String>;
    fn foreground_process(&self) -> Option<String>;
    fn process_names(&self) -> Vec<String>;
    fn idle_seconds(&self) -> Option<u64>;
}

/// Probe backed by `sysinfo` process enumeration.
///
/// Focused-window and idle queries need a compositor-specific backend and
/// are unanswered here; process rules fall back to matching against the
/// running process list.
pub struct SysinfoProbe {
    system: Mutex<System>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe for SysinfoProbe {
    fn focused_window_title(&self) -> Option<String> {
        None
    }

    fn foreground_process(&self) -> Option<String> {
        None
    }

    fn process_names(&self) -> Vec<String> {
        let mut system = self.system.lock().unwrap();
        system.refresh_all();
        let mut names: Vec<String> = system
            .processes()
            .values()
            .map(|p| p.name().to_string_lossy().into_owned())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    fn idle_seconds(&self) -> Option<u64> {
        None
    }
}

/// Fixed-value probe for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    pub window_title: Option<String>,
    pub foreground_process: Option<String>,
    pub processes: Vec<String>,
    pub idle_seconds: Option<u64>,
}

impl SystemProbe for StaticProbe {
    fn focused_window_title(&self) -> Option<String> {
        self.window_title.clone()
    }

    fn foreground_process(&self) -> Option<String> {
        self.foreground_process.clone()
    }

    fn process_names(&self) -> Vec<String> {
        self.processes.clone()
    }

    fn idle_seconds(&self) -> Option<u64> {
        self.idle_seconds
    }
}
