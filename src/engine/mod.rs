//! Macro evaluation engine
//!
//! The [`Switcher`] is the explicit context object owning all engine
//! state: the macro list, the classic rule lists, the dispatch priority
//! order and the evaluation thread. One engine mutex guards the mutable
//! state; the condition variable is waited on only under that mutex and
//! is notified on stop, on a manual scene change and on state transitions
//! that should cut a sleep short.

pub mod rules;
mod run;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::automation::{Interrupt, Macro, MacroPauseRequests, RunContext};
use crate::frontend::{Frontend, FrontendEvent};
use crate::probe::SystemProbe;
use crate::queue::QueueRegistry;
use crate::registry::Registries;
use crate::variables::VariableStore;

use rules::{Category, FileRule, IdleRule, ProcessRule, TimeRule, WindowRule};

/// Construction options for the engine.
pub struct SwitcherOptions {
    /// Polling period in milliseconds.
    pub interval_ms: u64,
    /// Optional path of the JSON status heartbeat written every cycle.
    pub status_path: Option<PathBuf>,
}

impl Default for SwitcherOptions {
    fn default() -> Self {
        Self {
            interval_ms: 300,
            status_path: None,
        }
    }
}

/// A scene switch decided by one of the classic rule categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneMatch {
    pub scene: String,
    pub transition: Option<String>,
    pub linger_ms: u64,
}

/// Mutable engine state, guarded by the engine mutex.
pub(crate) struct SwitcherState {
    pub interval_ms: u64,
    pub paused: bool,
    pub priority: Vec<Category>,
    pub macros: Vec<Arc<Mutex<Macro>>>,
    pub window_rules: Vec<WindowRule>,
    pub process_rules: Vec<ProcessRule>,
    pub idle_rule: IdleRule,
    pub file_rules: Vec<FileRule>,
    pub time_rules: Vec<TimeRule>,
    /// Window titles excluded from the precondition snapshot, exact or
    /// regex.
    pub ignore_titles: Vec<String>,
    /// Scene tracked from frontend scene-changed events only; the polling
    /// loop never writes it.
    pub current_scene: Option<String>,
    pub previous_scene: Option<String>,
    pub last_title: Option<String>,
    /// Bumped on every scene-changed event; used to detect manual
    /// overrides during a linger wait.
    pub scene_change_seq: u64,
    /// One-shot wake request consumed by the cooperative sleep.
    pub wake: bool,
    /// Macros to drop at the next prune step, by name. Deletion is
    /// deferred so the list is never mutated mid-evaluation.
    pub pending_macro_removals: Vec<String>,
    /// Match results of the previous cycle, read by macro-reference
    /// conditions.
    pub macro_matched: HashMap<String, bool>,
}

pub(crate) struct Shared {
    pub state: Mutex<SwitcherState>,
    pub cv: Condvar,
    pub stop: AtomicBool,
    pub running: AtomicBool,
    pub frontend: Arc<dyn Frontend>,
    pub probe: Arc<dyn SystemProbe>,
    pub variables: Arc<VariableStore>,
    pub queues: Arc<QueueRegistry>,
    pub registries: Arc<Registries>,
    pub interrupt: Arc<Interrupt>,
    pub macro_pause: Arc<MacroPauseRequests>,
    pub warnings: Mutex<Vec<String>>,
    pub status_path: Option<PathBuf>,
    pub instance_id: Uuid,
}

/// The engine context object; constructed at startup, dropped at
/// shutdown, passed by reference to every collaborator.
pub struct Switcher {
    pub(crate) shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Switcher {
    pub fn new(
        frontend: Arc<dyn Frontend>,
        probe: Arc<dyn SystemProbe>,
        options: SwitcherOptions,
    ) -> Self {
        let current_scene = frontend.current_scene();
        let state = SwitcherState {
            interval_ms: options.interval_ms.max(1),
            paused: false,
            priority: rules::default_priority(),
            macros: Vec::new(),
            window_rules: Vec::new(),
            process_rules: Vec::new(),
            idle_rule: IdleRule::default(),
            file_rules: Vec::new(),
            time_rules: Vec::new(),
            ignore_titles: Vec::new(),
            current_scene,
            previous_scene: None,
            last_title: None,
            scene_change_seq: 0,
            wake: false,
            pending_macro_removals: Vec::new(),
            macro_matched: HashMap::new(),
        };

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                cv: Condvar::new(),
                stop: AtomicBool::new(false),
                running: AtomicBool::new(false),
                frontend,
                probe,
                variables: Arc::new(VariableStore::new()),
                queues: Arc::new(QueueRegistry::new()),
                registries: Arc::new(Registries::with_builtins()),
                interrupt: Arc::new(Interrupt::new()),
                macro_pause: Arc::new(MacroPauseRequests::new()),
                warnings: Mutex::new(Vec::new()),
                status_path: options.status_path,
                instance_id: Uuid::new_v4(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Context handed to action execution (queue workers, macro runs).
    pub fn run_context(&self) -> RunContext {
        RunContext {
            frontend: self.shared.frontend.clone(),
            variables: self.shared.variables.clone(),
            queues: self.shared.queues.clone(),
            registries: self.shared.registries.clone(),
            interrupt: self.shared.interrupt.clone(),
            macro_pause: self.shared.macro_pause.clone(),
        }
    }

    /// Start the evaluation thread and all run-on-startup queues.
    /// Idempotent while running.
    pub fn start(&self) -> anyhow::Result<()> {
        let mut worker = self.worker.lock().unwrap();
        if worker.is_some() && self.is_running() {
            debug!("engine already running");
            return Ok(());
        }
        if let Some(stale) = worker.take() {
            let _ = stale.join();
        }

        self.shared.stop.store(false, Ordering::SeqCst);
        self.shared.interrupt.reset();

        let ctx = self.run_context();
        let startup_warnings = self.shared.queues.start_startup_queues(&ctx);
        if !startup_warnings.is_empty() {
            let mut warnings = self.shared.warnings.lock().unwrap();
            for w in startup_warnings {
                warn!("{}", w);
                warnings.push(w);
            }
        }

        let shared = self.shared.clone();
        let handle = std::thread::Builder::new()
            .name("autoscene-engine".to_string())
            .spawn(move || run::run_loop(shared))
            .map_err(|e| anyhow::anyhow!("failed to start evaluation thread: {}", e))?;

        self.shared.running.store(true, Ordering::SeqCst);
        *worker = Some(handle);
        info!("engine started");
        Ok(())
    }

    /// Stop the evaluation thread, all queue workers and any in-flight
    /// wait actions. Cooperative; safe to call repeatedly and from any
    /// thread, including an action running on the engine thread itself.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        {
            // Notify under the mutex so a sleeper cannot miss the wakeup.
            let _st = self.shared.state.lock().unwrap();
            self.shared.cv.notify_all();
        }
        self.shared.interrupt.stop();
        self.shared.queues.stop_all();

        let handle = {
            let mut worker = self.worker.lock().unwrap();
            let self_call = worker
                .as_ref()
                .map(|h| h.thread().id() == std::thread::current().id())
                .unwrap_or(false);
            if self_call {
                debug!("engine stop requested from the engine thread, skipping join");
                None
            } else {
                worker.take()
            }
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        info!("engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn set_paused(&self, paused: bool) {
        let mut st = self.shared.state.lock().unwrap();
        st.paused = paused;
        st.wake = true;
        self.shared.cv.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.shared.state.lock().unwrap().paused
    }

    /// React to a frontend event. Scene changes update the tracked
    /// current/previous scene and interrupt the engine sleep early.
    pub fn handle_event(&self, event: FrontendEvent) {
        match event {
            FrontendEvent::SceneChanged { scene } => {
                let mut st = self.shared.state.lock().unwrap();
                if st.current_scene.as_deref() != Some(scene.as_str()) {
                    debug!("scene changed to '{}'", scene);
                    st.previous_scene = st.current_scene.take();
                    st.current_scene = Some(scene);
                    st.scene_change_seq += 1;
                    st.wake = true;
                    self.shared.cv.notify_all();
                }
            }
            FrontendEvent::Disconnected => {
                warn!("OBS connection lost");
                self.shared
                    .warnings
                    .lock()
                    .unwrap()
                    .push("OBS WebSocket connection lost".to_string());
            }
            other => {
                // Recording/streaming state is queried live by conditions.
                debug!("frontend event: {:?}", other);
            }
        }
    }

    pub fn add_macro(&self, mac: Macro) {
        let mut st = self.shared.state.lock().unwrap();
        st.macros.push(Arc::new(Mutex::new(mac)));
    }

    /// Mark a macro for removal. The macro is dropped at the engine's
    /// next prune step; macro-reference conditions pointing at it then
    /// resolve to "not matched".
    pub fn remove_macro(&self, name: &str) {
        let mut st = self.shared.state.lock().unwrap();
        st.pending_macro_removals.push(name.to_string());
        st.wake = true;
        self.shared.cv.notify_all();
    }

    pub fn macro_names(&self) -> Vec<String> {
        let st = self.shared.state.lock().unwrap();
        st.macros
            .iter()
            .map(|m| m.lock().unwrap().name.clone())
            .collect()
    }

    pub fn macro_run_count(&self, name: &str) -> Option<u64> {
        let st = self.shared.state.lock().unwrap();
        st.macros
            .iter()
            .map(|m| m.lock().unwrap())
            .find(|m| m.name == name)
            .map(|m| m.run_count())
    }

    pub fn set_interval_ms(&self, interval_ms: u64) {
        self.shared.state.lock().unwrap().interval_ms = interval_ms.max(1);
    }

    pub fn set_priority(&self, priority: Vec<Category>) {
        self.shared.state.lock().unwrap().priority = priority;
    }

    pub fn add_window_rule(&self, rule: WindowRule) {
        self.shared.state.lock().unwrap().window_rules.push(rule);
    }

    pub fn add_process_rule(&self, rule: ProcessRule) {
        self.shared.state.lock().unwrap().process_rules.push(rule);
    }

    pub fn set_idle_rule(&self, rule: IdleRule) {
        self.shared.state.lock().unwrap().idle_rule = rule;
    }

    pub fn add_file_rule(&self, rule: FileRule) {
        self.shared.state.lock().unwrap().file_rules.push(rule);
    }

    pub fn add_time_rule(&self, rule: TimeRule) {
        self.shared.state.lock().unwrap().time_rules.push(rule);
    }

    pub fn add_ignore_title(&self, pattern: impl Into<String>) {
        self.shared
            .state
            .lock()
            .unwrap()
            .ignore_titles
            .push(pattern.into());
    }

    pub fn current_scene(&self) -> Option<String> {
        self.shared.state.lock().unwrap().current_scene.clone()
    }

    pub fn previous_scene(&self) -> Option<String> {
        self.shared.state.lock().unwrap().previous_scene.clone()
    }

    pub fn variables(&self) -> &Arc<VariableStore> {
        &self.shared.variables
    }

    pub fn queues(&self) -> &Arc<QueueRegistry> {
        &self.shared.queues
    }

    pub fn registries(&self) -> &Arc<Registries> {
        &self.shared.registries
    }

    /// Serialize the full configuration; see [`crate::persist`].
    pub fn save_settings(&self) -> serde_json::Value {
        crate::persist::save_settings(self)
    }

    /// Replace the configuration from a saved document, returning the
    /// degradation warnings.
    pub fn load_settings(&self, doc: &serde_json::Value) -> anyhow::Result<Vec<String>> {
        crate::persist::load_settings(self, doc)
    }

    /// User-visible warnings accumulated since startup (failed queue
    /// workers, lost connections). Surfaced once by the caller.
    pub fn warnings(&self) -> Vec<String> {
        self.shared.warnings.lock().unwrap().clone()
    }
}

impl Drop for Switcher {
    fn drop(&mut self) {
        self.stop();
    }
}
