//! Macro model: conditions, actions and their evaluation
//!
//! A macro is a named rule: an ordered condition list folded through
//! [`Logic`] tags, an action list, and an optional else-action list.
//! Conditions and actions are registry-instantiated trait objects so the
//! persistence layer can rebuild arbitrary trees from their string ids.

pub mod actions;
pub mod conditions;

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::duration::DurationModifier;
use crate::frontend::Frontend;
use crate::logic::Logic;
use crate::probe::Snapshot;
use crate::queue::QueueRegistry;
use crate::registry::Registries;
use crate::variables::VariableStore;

/// A boolean check evaluated once per engine cycle.
///
/// Checks may carry side effects (duration timers, variable updates), so
/// the engine runs every enabled condition on every cycle regardless of
/// whether the fold result is already determined.
pub trait Condition: Send {
    fn id(&self) -> &'static str;
    fn check(&mut self, ctx: &CheckContext) -> bool;
    fn save(&self) -> Value;
    fn load(&mut self, data: &Value) -> anyhow::Result<()>;
}

/// A side-effecting operation run when a macro fires or a queue drains.
pub trait Action: Send {
    fn id(&self) -> &'static str;
    /// Perform the action; false reports a non-fatal failure.
    fn perform(&mut self, ctx: &RunContext) -> bool;
    fn save(&self) -> Value;
    fn load(&mut self, data: &Value) -> anyhow::Result<()>;
}

/// Read-only context handed to condition checks.
pub struct CheckContext<'a> {
    pub frontend: &'a Arc<dyn Frontend>,
    pub variables: &'a Arc<VariableStore>,
    pub snapshot: &'a Snapshot,
    /// Match results of all macros from the previous cycle, by name.
    pub macro_matched: &'a HashMap<String, bool>,
}

/// Shared context handed to action execution, cloneable across the engine
/// thread, queue workers and parallel macro runs.
#[derive(Clone)]
pub struct RunContext {
    pub frontend: Arc<dyn Frontend>,
    pub variables: Arc<VariableStore>,
    pub queues: Arc<QueueRegistry>,
    pub registries: Arc<Registries>,
    pub interrupt: Arc<Interrupt>,
    pub macro_pause: Arc<MacroPauseRequests>,
}

/// Deferred pause/unpause requests for macros by name.
///
/// Actions cannot touch the macro list directly (it is guarded by the
/// engine state lock, which may be held while they run), so pause
/// requests queue here and the engine applies them at the top of the
/// next cycle.
#[derive(Default)]
pub struct MacroPauseRequests {
    pending: Mutex<Vec<(String, bool)>>,
}

impl MacroPauseRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self, name: impl Into<String>, paused: bool) {
        self.pending.lock().unwrap().push((name.into(), paused));
    }

    pub fn drain(&self) -> Vec<(String, bool)> {
        self.pending.lock().unwrap().drain(..).collect()
    }
}

/// Cooperative interruption point shared by wait actions and queue
/// workers. `stop` wakes every waiter; waits report whether they ran to
/// completion.
#[derive(Default)]
pub struct Interrupt {
    stopped: AtomicBool,
    guard: Mutex<()>,
    cv: Condvar,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let _lock = self.guard.lock().unwrap();
        self.cv.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Re-arm after a stop, for engine restarts.
    pub fn reset(&self) {
        self.stopped.store(false, Ordering::SeqCst);
    }

    /// Sleep for `duration` unless stopped. Returns true if the full
    /// duration elapsed, false if the sleep was interrupted.
    pub fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut lock = self.guard.lock().unwrap();
        loop {
            if self.is_stopped() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let (guard, _) = self.cv.wait_timeout(lock, deadline - now).unwrap();
            lock = guard;
        }
    }
}

/// One condition slot in a macro: the condition itself plus its logic tag,
/// enable flag and duration gate.
pub struct ConditionEntry {
    pub logic: Logic,
    pub enabled: bool,
    pub duration: DurationModifier,
    pub condition: Box<dyn Condition>,
}

impl ConditionEntry {
    pub fn new(logic: Logic, condition: Box<dyn Condition>) -> Self {
        Self {
            logic,
            enabled: true,
            duration: DurationModifier::default(),
            condition,
        }
    }
}

/// One action slot in a macro.
pub struct ActionEntry {
    pub enabled: bool,
    pub action: Box<dyn Action>,
}

impl ActionEntry {
    pub fn new(action: Box<dyn Action>) -> Self {
        Self {
            enabled: true,
            action,
        }
    }
}

/// What a macro evaluation decided to run this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Actions,
    ElseActions,
}

/// A named automation rule.
pub struct Macro {
    pub name: String,
    pub paused: bool,
    pub run_in_parallel: bool,
    /// Suppress re-triggering while the condition result stays matched.
    pub match_on_change: bool,
    pub conditions: Vec<ConditionEntry>,
    pub actions: Vec<ActionEntry>,
    pub else_actions: Vec<ActionEntry>,
    matched: bool,
    previous_matched: bool,
    run_count: u64,
}

impl Macro {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            paused: false,
            run_in_parallel: false,
            match_on_change: false,
            conditions: Vec::new(),
            actions: Vec::new(),
            else_actions: Vec::new(),
            matched: false,
            previous_matched: false,
            run_count: 0,
        }
    }

    pub fn matched(&self) -> bool {
        self.matched
    }

    pub fn run_count(&self) -> u64 {
        self.run_count
    }

    /// Evaluate the condition list as a left fold over the logic tags.
    ///
    /// Every enabled condition is checked even when the fold result is
    /// already determined; conditions carry side effects that must run
    /// each cycle. Disabled conditions are skipped entirely and leave the
    /// accumulator unchanged. Returns what, if anything, should run.
    pub fn evaluate(&mut self, ctx: &CheckContext) -> Option<RunKind> {
        if self.paused {
            return None;
        }

        let mut acc = false;
        for (index, entry) in self.conditions.iter_mut().enumerate() {
            if !entry.enabled {
                continue;
            }
            let raw = entry.condition.check(ctx);
            let gated = entry.duration.evaluate(raw);
            acc = entry.logic.apply_checked(acc, gated, index == 0);
        }

        self.previous_matched = self.matched;
        self.matched = acc;

        if self.matched {
            if self.match_on_change && self.previous_matched {
                debug!("macro '{}' still matching, re-trigger suppressed", self.name);
                None
            } else {
                Some(RunKind::Actions)
            }
        } else if !self.else_actions.is_empty() {
            if self.match_on_change && !self.previous_matched {
                None
            } else {
                Some(RunKind::ElseActions)
            }
        } else {
            None
        }
    }

    /// Run the action list. Failures are logged by the caller via the
    /// per-action bool; they never abort the remaining actions.
    pub fn run(&mut self, kind: RunKind, ctx: &RunContext) {
        if kind == RunKind::Actions {
            self.run_count += 1;
        }
        let (label, entries) = match kind {
            RunKind::Actions => ("action", &mut self.actions),
            RunKind::ElseActions => ("else action", &mut self.else_actions),
        };
        for (index, entry) in entries.iter_mut().enumerate() {
            if ctx.interrupt.is_stopped() {
                debug!("macro '{}' interrupted before {} {}", self.name, label, index);
                return;
            }
            if !entry.enabled {
                continue;
            }
            if !entry.action.perform(ctx) {
                debug!(
                    "macro '{}' {} {} ({}) reported failure",
                    self.name,
                    label,
                    index,
                    entry.action.id()
                );
            }
        }
    }

    /// Drop transient evaluation state, e.g. after loading settings.
    pub fn reset_state(&mut self) {
        self.matched = false;
        self.previous_matched = false;
        self.run_count = 0;
        for entry in &mut self.conditions {
            entry.duration.reset();
        }
    }
}
