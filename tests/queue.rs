//! Action queue behavior through the public API.

use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use autoscene::automation::{Action, Interrupt, MacroPauseRequests, RunContext};
use autoscene::frontend::testing::FakeFrontend;
use autoscene::queue::QueueRegistry;
use autoscene::registry::Registries;
use autoscene::variables::VariableStore;

fn run_context() -> RunContext {
    RunContext {
        frontend: Arc::new(FakeFrontend::with_scenes(&["A"])),
        variables: Arc::new(VariableStore::new()),
        queues: Arc::new(QueueRegistry::new()),
        registries: Arc::new(Registries::with_builtins()),
        interrupt: Arc::new(Interrupt::new()),
        macro_pause: Arc::new(MacroPauseRequests::new()),
    }
}

/// Action that appends its label to a shared log when performed.
struct Record {
    label: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl Action for Record {
    fn id(&self) -> &'static str {
        "record"
    }
    fn perform(&mut self, _ctx: &RunContext) -> bool {
        self.log.lock().unwrap().push(self.label.clone());
        true
    }
    fn save(&self) -> Value {
        Value::Null
    }
    fn load(&mut self, _data: &Value) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Action that stops its own queue from inside the worker thread.
struct StopOwnQueue {
    queue: String,
    performed: Arc<AtomicUsize>,
}

impl Action for StopOwnQueue {
    fn id(&self) -> &'static str {
        "stop_own_queue"
    }
    fn perform(&mut self, ctx: &RunContext) -> bool {
        self.performed.fetch_add(1, Ordering::SeqCst);
        if let Some(queue) = ctx.queues.get(&self.queue) {
            queue.stop();
        }
        true
    }
    fn save(&self) -> Value {
        Value::Null
    }
    fn load(&mut self, _data: &Value) -> anyhow::Result<()> {
        Ok(())
    }
}

fn wait_until(deadline: Duration, mut probe: impl FnMut() -> bool) -> bool {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if probe() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    probe()
}

#[test]
fn actions_drain_in_fifo_order() {
    let ctx = run_context();
    let queue = ctx.queues.create("jobs", false, false).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    for label in ["first", "second", "third"] {
        queue.add(
            Box::new(Record {
                label: label.to_string(),
                log: log.clone(),
            }),
            &ctx,
        );
    }

    queue.start(&ctx).unwrap();
    assert!(wait_until(Duration::from_secs(5), || queue.is_empty()));
    queue.stop();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["first".to_string(), "second".to_string(), "third".to_string()]
    );
}

#[test]
fn stopped_queue_keeps_pending_actions_until_restart() {
    let ctx = run_context();
    let queue = ctx.queues.create("jobs", false, false).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    queue.start(&ctx).unwrap();
    queue.add(
        Box::new(Record {
            label: "before".to_string(),
            log: log.clone(),
        }),
        &ctx,
    );
    assert!(wait_until(Duration::from_secs(5), || queue.is_empty()));
    queue.stop();
    assert!(!queue.is_running());

    // No worker: actions pile up instead of running.
    queue.add(
        Box::new(Record {
            label: "while-stopped".to_string(),
            log: log.clone(),
        }),
        &ctx,
    );
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(queue.size(), 1);

    queue.start(&ctx).unwrap();
    assert!(wait_until(Duration::from_secs(5), || queue.is_empty()));
    assert!(wait_until(Duration::from_secs(5), || {
        log.lock().unwrap().len() == 2
    }));
    queue.stop();

    assert_eq!(
        *log.lock().unwrap(),
        vec!["before".to_string(), "while-stopped".to_string()]
    );
}

#[test]
fn action_stopping_its_own_queue_does_not_deadlock() {
    let ctx = run_context();
    let queue = ctx.queues.create("self-stop", false, false).unwrap();
    let performed = Arc::new(AtomicUsize::new(0));

    queue.add(
        Box::new(StopOwnQueue {
            queue: "self-stop".to_string(),
            performed: performed.clone(),
        }),
        &ctx,
    );
    queue.start(&ctx).unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        performed.load(Ordering::SeqCst) == 1 && !queue.is_running()
    }));

    // The queue can be restarted after stopping itself.
    let log = Arc::new(Mutex::new(Vec::new()));
    queue.add(
        Box::new(Record {
            label: "after-restart".to_string(),
            log: log.clone(),
        }),
        &ctx,
    );
    queue.start(&ctx).unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        log.lock().unwrap().len() == 1
    }));
    queue.stop();
}

#[test]
fn restarted_queue_always_drains() {
    let ctx = run_context();
    let queue = ctx.queues.create("churn", false, false).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    // A fresh worker must never observe the stop flag left over from the
    // previous run; every restart has to drain what is queued for it.
    for round in 0..40 {
        queue.stop();
        queue.add(
            Box::new(Record {
                label: format!("round-{}", round),
                log: log.clone(),
            }),
            &ctx,
        );
        queue.start(&ctx).unwrap();
        assert!(
            wait_until(Duration::from_secs(5), || queue.is_empty()),
            "round {} never drained",
            round
        );
    }
    queue.stop();

    assert_eq!(log.lock().unwrap().len(), 40);
}

#[test]
fn resolve_on_add_pins_variable_values() {
    let ctx = run_context();
    let queue = ctx.queues.create("pinned", false, true).unwrap();
    ctx.variables.set("target", "before");

    // set_variable's value is resolved against the variable store; with
    // resolve-on-add that happens at enqueue time.
    let mut action = ctx.registries.actions.create("set_variable").unwrap();
    action
        .load(&serde_json::json!({"name": "result", "value": "${target}"}))
        .unwrap();
    queue.add(action, &ctx);

    ctx.variables.set("target", "after");
    queue.start(&ctx).unwrap();
    assert!(wait_until(Duration::from_secs(5), || queue.is_empty()));
    assert!(wait_until(Duration::from_secs(5), || {
        ctx.variables.get("result").is_some()
    }));
    queue.stop();

    assert_eq!(ctx.variables.get("result").as_deref(), Some("before"));
}
