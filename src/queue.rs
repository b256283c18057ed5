//! Action queues
//!
//! A queue decouples "request an action" from "perform an action": macro
//! execution pushes onto a named FIFO and an independent worker thread
//! drains it. Each queue is strictly single-consumer; across queues there
//! is no ordering guarantee. Stopping is cooperative and safe to call
//! from inside the worker itself.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{JoinHandle, ThreadId};
use std::time::Instant;
use tracing::{debug, warn};

use crate::automation::{Action, RunContext};

/// A named FIFO of deferred actions with its own worker thread.
pub struct ActionQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    name: String,
    run_on_startup: bool,
    resolve_on_add: bool,
    state: Mutex<QueueState>,
    cv: Condvar,
}

struct QueueState {
    actions: VecDeque<Box<dyn Action>>,
    stop: bool,
    worker: Option<JoinHandle<()>>,
    worker_id: Option<ThreadId>,
    /// Set when the queue is observed empty, cleared when it is not.
    last_empty: Option<Instant>,
}

impl ActionQueue {
    pub fn new(name: impl Into<String>, run_on_startup: bool, resolve_on_add: bool) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                name: name.into(),
                run_on_startup,
                resolve_on_add,
                state: Mutex::new(QueueState {
                    actions: VecDeque::new(),
                    stop: false,
                    worker: None,
                    worker_id: None,
                    last_empty: Some(Instant::now()),
                }),
                cv: Condvar::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn run_on_startup(&self) -> bool {
        self.inner.run_on_startup
    }

    pub fn resolve_on_add(&self) -> bool {
        self.inner.resolve_on_add
    }

    /// Start the worker thread. No-op if it is already running; a
    /// previously stopped worker is joined before the new one spawns so
    /// at most one consumer ever drains the queue.
    pub fn start(&self, ctx: &RunContext) -> anyhow::Result<()> {
        let stale = {
            let mut st = self.inner.state.lock().unwrap();
            if st.worker.is_some() && !st.stop {
                debug!("queue '{}' already running", self.inner.name);
                return Ok(());
            }
            st.worker.take()
        };
        if let Some(handle) = stale {
            // Joining outside the lock; the old worker may still need it
            // to observe the stop flag.
            let _ = handle.join();
        }

        // The flag must be clear before the new worker first checks it,
        // or a fresh worker can observe a stale stop and exit while we
        // record it as live.
        self.inner.state.lock().unwrap().stop = false;

        let inner = self.inner.clone();
        let ctx = ctx.clone();
        let handle = std::thread::Builder::new()
            .name(format!("queue-{}", self.inner.name))
            .spawn(move || run_actions(inner, ctx))
            .map_err(|e| {
                anyhow::anyhow!("failed to start worker for queue '{}': {}", self.inner.name, e)
            })?;

        let mut st = self.inner.state.lock().unwrap();
        st.worker_id = Some(handle.thread().id());
        st.worker = Some(handle);
        debug!("queue '{}' worker started", self.inner.name);
        Ok(())
    }

    /// Stop the worker cooperatively. When called from inside the worker
    /// thread itself (an action stopping its own queue), the join is
    /// skipped to avoid self-deadlock; the stale handle is joined by the
    /// next `start` or on drop.
    pub fn stop(&self) {
        let handle = {
            let mut st = self.inner.state.lock().unwrap();
            st.stop = true;
            self.inner.cv.notify_all();
            if st.worker_id == Some(std::thread::current().id()) {
                debug!("queue '{}' stopped from its own worker", self.inner.name);
                None
            } else {
                st.worker.take()
            }
        };
        if let Some(handle) = handle {
            let _ = handle.join();
            let mut st = self.inner.state.lock().unwrap();
            st.worker_id = None;
        }
    }

    pub fn is_running(&self) -> bool {
        let st = self.inner.state.lock().unwrap();
        st.worker.is_some() && !st.stop
    }

    /// Enqueue an action. With resolve-on-add the action is deep-copied
    /// through its save/load round trip with variable references
    /// substituted, so later variable changes cannot retroactively affect
    /// it; otherwise the action resolves live when it runs.
    pub fn add(&self, action: Box<dyn Action>, ctx: &RunContext) {
        let action = if self.inner.resolve_on_add {
            match resolve_snapshot(action.as_ref(), ctx) {
                Some(resolved) => resolved,
                None => {
                    warn!(
                        "queue '{}': could not snapshot action '{}', queuing live copy",
                        self.inner.name,
                        action.id()
                    );
                    action
                }
            }
        } else {
            action
        };

        let mut st = self.inner.state.lock().unwrap();
        st.actions.push_back(action);
        st.last_empty = None;
        self.inner.cv.notify_all();
    }

    /// Drop all pending actions without running them.
    pub fn clear(&self) {
        let mut st = self.inner.state.lock().unwrap();
        let dropped = st.actions.len();
        st.actions.clear();
        if dropped > 0 {
            debug!("queue '{}' cleared {} pending actions", self.inner.name, dropped);
        }
    }

    pub fn size(&self) -> usize {
        self.inner.state.lock().unwrap().actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().unwrap().actions.is_empty()
    }

    /// Timestamp of when the queue was last observed to become empty,
    /// updated lazily on query. `None` while actions are pending.
    pub fn last_empty_time(&self) -> Option<Instant> {
        let mut st = self.inner.state.lock().unwrap();
        if st.actions.is_empty() {
            if st.last_empty.is_none() {
                st.last_empty = Some(Instant::now());
            }
        } else {
            st.last_empty = None;
        }
        st.last_empty
    }
}

impl Drop for ActionQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Worker loop: wait while empty, pop the front action, run it.
fn run_actions(inner: Arc<QueueInner>, ctx: RunContext) {
    loop {
        let mut action = {
            let mut st = inner.state.lock().unwrap();
            loop {
                if st.stop {
                    debug!("queue '{}' worker exiting", inner.name);
                    return;
                }
                if let Some(action) = st.actions.pop_front() {
                    break action;
                }
                if st.last_empty.is_none() {
                    st.last_empty = Some(Instant::now());
                }
                st = inner.cv.wait(st).unwrap();
            }
        };

        debug!("queue '{}' running action '{}'", inner.name, action.id());
        if !action.perform(&ctx) {
            warn!(
                "queue '{}': action '{}' reported failure",
                inner.name,
                action.id()
            );
        }
    }
}

/// Deep-copy an action through its save/load round trip, substituting
/// variable references in the saved settings. Returns `None` when the id
/// is not registered or the round trip fails.
fn resolve_snapshot(action: &dyn Action, ctx: &RunContext) -> Option<Box<dyn Action>> {
    let saved = ctx.variables.resolve_value(&action.save());
    let mut copy = ctx.registries.actions.create(action.id())?;
    copy.load(&saved).ok()?;
    Some(copy)
}

/// Owner of all named queues. Creation enforces name uniqueness; removal
/// is deferred to the engine's prune step so a queue is never torn down
/// mid-evaluation.
#[derive(Default)]
pub struct QueueRegistry {
    queues: Mutex<Vec<Arc<ActionQueue>>>,
    pending_removal: Mutex<Vec<String>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue. Returns `None` if the name is already taken.
    pub fn create(
        &self,
        name: &str,
        run_on_startup: bool,
        resolve_on_add: bool,
    ) -> Option<Arc<ActionQueue>> {
        let mut queues = self.queues.lock().unwrap();
        if queues.iter().any(|q| q.name() == name) {
            warn!("queue '{}' already exists", name);
            return None;
        }
        let queue = Arc::new(ActionQueue::new(name, run_on_startup, resolve_on_add));
        queues.push(queue.clone());
        Some(queue)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ActionQueue>> {
        self.queues
            .lock()
            .unwrap()
            .iter()
            .find(|q| q.name() == name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.queues
            .lock()
            .unwrap()
            .iter()
            .map(|q| q.name().to_string())
            .collect()
    }

    pub fn all(&self) -> Vec<Arc<ActionQueue>> {
        self.queues.lock().unwrap().clone()
    }

    /// Mark a queue for removal at the next prune.
    pub fn mark_for_removal(&self, name: &str) {
        self.pending_removal.lock().unwrap().push(name.to_string());
    }

    /// Stop and drop all queues marked for removal.
    pub fn prune(&self) {
        let pending: Vec<String> = self.pending_removal.lock().unwrap().drain(..).collect();
        if pending.is_empty() {
            return;
        }
        let removed: Vec<Arc<ActionQueue>> = {
            let mut queues = self.queues.lock().unwrap();
            let mut removed = Vec::new();
            queues.retain(|q| {
                if pending.iter().any(|n| n == q.name()) {
                    removed.push(q.clone());
                    false
                } else {
                    true
                }
            });
            removed
        };
        for queue in removed {
            debug!("removing queue '{}'", queue.name());
            queue.stop();
        }
    }

    /// Start every queue flagged to run on startup. Spawn failures are
    /// collected for the caller's warning list instead of aborting.
    pub fn start_startup_queues(&self, ctx: &RunContext) -> Vec<String> {
        let mut warnings = Vec::new();
        for queue in self.all() {
            if queue.run_on_startup() {
                if let Err(e) = queue.start(ctx) {
                    warnings.push(e.to_string());
                }
            }
        }
        warnings
    }

    pub fn stop_all(&self) {
        for queue in self.all() {
            queue.stop();
        }
    }

    /// Stop and drop every queue, e.g. before loading settings.
    pub fn reset(&self) {
        let queues: Vec<Arc<ActionQueue>> = {
            let mut queues = self.queues.lock().unwrap();
            queues.drain(..).collect()
        };
        for queue in queues {
            queue.stop();
        }
        self.pending_removal.lock().unwrap().clear();
    }
}
