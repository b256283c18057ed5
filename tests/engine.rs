//! End-to-end engine behavior with a fake frontend and a static probe.

use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use autoscene::automation::actions::{PauseMacro, SwitchScene};
use autoscene::automation::{
    Action, ActionEntry, CheckContext, Condition, ConditionEntry, Macro, RunContext,
};
use autoscene::engine::rules::{Category, WindowRule};
use autoscene::engine::{Switcher, SwitcherOptions};
use autoscene::frontend::testing::FakeFrontend;
use autoscene::frontend::FrontendEvent;
use autoscene::logic::Logic;
use autoscene::probe::StaticProbe;
use autoscene::scene::SceneRef;

/// Condition with a fixed result that counts how often it is checked.
struct Counting {
    result: bool,
    checks: Arc<AtomicUsize>,
}

impl Condition for Counting {
    fn id(&self) -> &'static str {
        "counting"
    }
    fn check(&mut self, _ctx: &CheckContext) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.result
    }
    fn save(&self) -> Value {
        Value::Null
    }
    fn load(&mut self, _data: &Value) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Action that counts how often it runs.
struct Flag {
    runs: Arc<AtomicUsize>,
}

impl Action for Flag {
    fn id(&self) -> &'static str {
        "flag"
    }
    fn perform(&mut self, _ctx: &RunContext) -> bool {
        self.runs.fetch_add(1, Ordering::SeqCst);
        true
    }
    fn save(&self) -> Value {
        Value::Null
    }
    fn load(&mut self, _data: &Value) -> anyhow::Result<()> {
        Ok(())
    }
}

fn switch_to(scene: &str) -> ActionEntry {
    ActionEntry::new(Box::new(SwitchScene {
        scene: SceneRef::new(scene),
        transition: None,
    }))
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

fn fast_options() -> SwitcherOptions {
    SwitcherOptions {
        interval_ms: 20,
        status_path: None,
    }
}

#[test]
fn macro_switches_scene_when_conditions_match() {
    let frontend = Arc::new(FakeFrontend::with_scenes(&["Desktop", "Game"]));
    let switcher = Switcher::new(
        frontend.clone(),
        Arc::new(StaticProbe::default()),
        fast_options(),
    );

    let checks = Arc::new(AtomicUsize::new(0));
    let mut mac = Macro::new("go-game");
    mac.match_on_change = true;
    mac.conditions.push(ConditionEntry::new(
        Logic::RootNone,
        Box::new(Counting {
            result: true,
            checks: checks.clone(),
        }),
    ));
    mac.actions.push(switch_to("Game"));
    switcher.add_macro(mac);

    switcher.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        !frontend.switches().is_empty()
    }));
    switcher.stop();

    assert_eq!(frontend.switches()[0].0, "Game");
    // match_on_change: one rising edge, one run.
    assert_eq!(switcher.macro_run_count("go-game"), Some(1));
}

#[test]
fn higher_priority_rule_match_skips_macro_evaluation() {
    let frontend = Arc::new(FakeFrontend::with_scenes(&["Desktop", "Game"]));
    let probe = Arc::new(StaticProbe {
        window_title: Some("Factorio 2.0".to_string()),
        ..StaticProbe::default()
    });
    let switcher = Switcher::new(frontend.clone(), probe, fast_options());

    switcher.add_window_rule(WindowRule {
        pattern: "Factorio.*".to_string(),
        use_regex: true,
        scene: SceneRef::new("Game"),
        transition: None,
        linger_ms: 0,
    });

    let checks = Arc::new(AtomicUsize::new(0));
    let mut mac = Macro::new("never-reached");
    mac.conditions.push(ConditionEntry::new(
        Logic::RootNone,
        Box::new(Counting {
            result: true,
            checks: checks.clone(),
        }),
    ));
    mac.actions.push(switch_to("Desktop"));
    switcher.add_macro(mac);

    switcher.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        !frontend.switches().is_empty()
    }));
    switcher.stop();

    // The title category won every cycle, so the macro category was
    // never reached and its conditions never ran.
    assert_eq!(checks.load(Ordering::SeqCst), 0);
    assert!(frontend.switches().iter().all(|(scene, _)| scene == "Game"));
}

#[test]
fn unmatched_macro_category_does_not_mask_lower_rules() {
    let frontend = Arc::new(FakeFrontend::with_scenes(&["Desktop", "Game"]));
    let probe = Arc::new(StaticProbe {
        window_title: Some("Factorio 2.0".to_string()),
        ..StaticProbe::default()
    });
    let switcher = Switcher::new(frontend.clone(), probe, fast_options());

    // Macros evaluate first; a macro that never matches must not stop
    // the scan before the title category gets its turn.
    switcher.set_priority(vec![Category::Macro, Category::WindowTitle]);

    let else_runs = Arc::new(AtomicUsize::new(0));
    let mut mac = Macro::new("never-matches");
    mac.conditions.push(ConditionEntry::new(
        Logic::RootNone,
        Box::new(Counting {
            result: false,
            checks: Arc::new(AtomicUsize::new(0)),
        }),
    ));
    mac.else_actions.push(ActionEntry::new(Box::new(Flag {
        runs: else_runs.clone(),
    })));
    switcher.add_macro(mac);

    switcher.add_window_rule(WindowRule {
        pattern: "Factorio.*".to_string(),
        use_regex: true,
        scene: SceneRef::new("Game"),
        transition: None,
        linger_ms: 0,
    });

    switcher.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        !frontend.switches().is_empty()
    }));
    switcher.stop();

    assert!(frontend.switches().iter().all(|(scene, _)| scene == "Game"));
    // The collected else-action runs still executed.
    assert!(else_runs.load(Ordering::SeqCst) > 0);
}

/// Condition that reports a scene event from inside its own check, the
/// way the frontend event task can land one mid-cycle.
struct ReportsScene {
    switcher: Arc<Switcher>,
    checks: Arc<AtomicUsize>,
}

impl Condition for ReportsScene {
    fn id(&self) -> &'static str {
        "reports_scene"
    }
    fn check(&mut self, _ctx: &CheckContext) -> bool {
        self.switcher.handle_event(FrontendEvent::SceneChanged {
            scene: "Game".to_string(),
        });
        self.checks.fetch_add(1, Ordering::SeqCst);
        false
    }
    fn save(&self) -> Value {
        Value::Null
    }
    fn load(&mut self, _data: &Value) -> anyhow::Result<()> {
        Ok(())
    }
}

#[test]
fn event_delivery_is_not_blocked_by_condition_checks() {
    let frontend = Arc::new(FakeFrontend::with_scenes(&["Desktop", "Game"]));
    let switcher = Arc::new(Switcher::new(
        frontend,
        Arc::new(StaticProbe::default()),
        fast_options(),
    ));

    let checks = Arc::new(AtomicUsize::new(0));
    let mut mac = Macro::new("reporter");
    mac.conditions.push(ConditionEntry::new(
        Logic::RootNone,
        Box::new(ReportsScene {
            switcher: switcher.clone(),
            checks: checks.clone(),
        }),
    ));
    switcher.add_macro(mac);

    switcher.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        checks.load(Ordering::SeqCst) >= 3
    }));
    switcher.stop();

    assert_eq!(switcher.current_scene().as_deref(), Some("Game"));
}

/// Condition that stops the engine from inside its own check.
struct StopsEngine {
    switcher: Arc<Switcher>,
}

impl Condition for StopsEngine {
    fn id(&self) -> &'static str {
        "stops_engine"
    }
    fn check(&mut self, _ctx: &CheckContext) -> bool {
        self.switcher.stop();
        false
    }
    fn save(&self) -> Value {
        Value::Null
    }
    fn load(&mut self, _data: &Value) -> anyhow::Result<()> {
        Ok(())
    }
}

#[test]
fn stop_during_a_scan_skips_the_remaining_categories() {
    let frontend = Arc::new(FakeFrontend::with_scenes(&["Desktop", "Game"]));
    let probe = Arc::new(StaticProbe {
        window_title: Some("Factorio".to_string()),
        ..StaticProbe::default()
    });
    let switcher = Arc::new(Switcher::new(frontend.clone(), probe, fast_options()));
    switcher.set_priority(vec![Category::Macro, Category::WindowTitle]);

    let mut mac = Macro::new("halting");
    mac.conditions.push(ConditionEntry::new(
        Logic::RootNone,
        Box::new(StopsEngine {
            switcher: switcher.clone(),
        }),
    ));
    switcher.add_macro(mac);

    switcher.add_window_rule(WindowRule {
        pattern: "Factorio".to_string(),
        use_regex: false,
        scene: SceneRef::new("Game"),
        transition: None,
        linger_ms: 0,
    });

    switcher.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || !switcher.is_running()));

    // The title category never got a turn after the stop landed.
    assert!(frontend.switches().is_empty());
}

#[test]
fn linger_delays_the_switch() {
    let frontend = Arc::new(FakeFrontend::with_scenes(&["Desktop", "Game"]));
    let probe = Arc::new(StaticProbe {
        window_title: Some("Factorio".to_string()),
        ..StaticProbe::default()
    });
    let switcher = Switcher::new(frontend.clone(), probe, fast_options());

    switcher.add_window_rule(WindowRule {
        pattern: "Factorio".to_string(),
        use_regex: false,
        scene: SceneRef::new("Game"),
        transition: None,
        linger_ms: 400,
    });

    switcher.start().unwrap();
    std::thread::sleep(Duration::from_millis(150));
    assert!(frontend.switches().is_empty());
    assert!(wait_until(Duration::from_secs(5), || {
        !frontend.switches().is_empty()
    }));
    switcher.stop();

    assert_eq!(frontend.switches()[0].0, "Game");
}

#[test]
fn scene_change_during_linger_discards_the_match() {
    let frontend = Arc::new(FakeFrontend::with_scenes(&["Desktop", "Game"]));
    let probe = Arc::new(StaticProbe {
        window_title: Some("Factorio".to_string()),
        ..StaticProbe::default()
    });
    let switcher = Switcher::new(frontend.clone(), probe, fast_options());

    switcher.add_window_rule(WindowRule {
        pattern: "Factorio".to_string(),
        use_regex: false,
        scene: SceneRef::new("Game"),
        transition: None,
        linger_ms: 200,
    });

    switcher.start().unwrap();
    std::thread::sleep(Duration::from_millis(50));
    // The user switches to the target scene by hand mid-linger.
    switcher.handle_event(FrontendEvent::SceneChanged {
        scene: "Game".to_string(),
    });
    std::thread::sleep(Duration::from_millis(600));
    switcher.stop();

    // The lingering match was discarded, and every later match finds the
    // scene already current, so no switch request ever reaches OBS.
    assert!(frontend.switches().is_empty());
}

#[test]
fn paused_engine_switches_nothing() {
    let frontend = Arc::new(FakeFrontend::with_scenes(&["Desktop", "Game"]));
    let switcher = Switcher::new(
        frontend.clone(),
        Arc::new(StaticProbe::default()),
        fast_options(),
    );

    let mut mac = Macro::new("always");
    mac.conditions.push(ConditionEntry::new(
        Logic::RootNone,
        Box::new(Counting {
            result: true,
            checks: Arc::new(AtomicUsize::new(0)),
        }),
    ));
    mac.actions.push(switch_to("Game"));
    switcher.add_macro(mac);

    switcher.set_paused(true);
    switcher.start().unwrap();
    std::thread::sleep(Duration::from_millis(150));
    switcher.stop();

    assert!(frontend.switches().is_empty());

    // Unpausing lets the next cycles evaluate again.
    switcher.set_paused(false);
    switcher.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        !frontend.switches().is_empty()
    }));
    switcher.stop();
}

#[test]
fn scene_events_drive_current_and_previous_scene() {
    let frontend = Arc::new(FakeFrontend::with_scenes(&["Desktop", "Game"]));
    let switcher = Switcher::new(
        frontend,
        Arc::new(StaticProbe::default()),
        fast_options(),
    );

    assert_eq!(switcher.current_scene().as_deref(), Some("Desktop"));

    switcher.handle_event(FrontendEvent::SceneChanged {
        scene: "Game".to_string(),
    });
    assert_eq!(switcher.current_scene().as_deref(), Some("Game"));
    assert_eq!(switcher.previous_scene().as_deref(), Some("Desktop"));

    // A repeated event for the same scene changes nothing.
    switcher.handle_event(FrontendEvent::SceneChanged {
        scene: "Game".to_string(),
    });
    assert_eq!(switcher.previous_scene().as_deref(), Some("Desktop"));
}

#[test]
fn removed_macro_stops_running() {
    let frontend = Arc::new(FakeFrontend::with_scenes(&["Desktop", "Game"]));
    let switcher = Switcher::new(
        frontend.clone(),
        Arc::new(StaticProbe::default()),
        fast_options(),
    );

    let checks = Arc::new(AtomicUsize::new(0));
    let mut mac = Macro::new("short-lived");
    mac.conditions.push(ConditionEntry::new(
        Logic::RootNone,
        Box::new(Counting {
            result: true,
            checks: checks.clone(),
        }),
    ));
    mac.actions.push(switch_to("Game"));
    switcher.add_macro(mac);

    switcher.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        checks.load(Ordering::SeqCst) > 0
    }));

    switcher.remove_macro("short-lived");
    assert!(wait_until(Duration::from_secs(5), || {
        switcher.macro_names().is_empty()
    }));

    let after_removal = checks.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(checks.load(Ordering::SeqCst), after_removal);
    switcher.stop();
}

#[test]
fn pause_macro_action_stops_target_macro() {
    let frontend = Arc::new(FakeFrontend::with_scenes(&["Desktop", "Game"]));
    let switcher = Switcher::new(
        frontend,
        Arc::new(StaticProbe::default()),
        fast_options(),
    );

    let target_checks = Arc::new(AtomicUsize::new(0));
    let mut target = Macro::new("target");
    target.conditions.push(ConditionEntry::new(
        Logic::RootNone,
        Box::new(Counting {
            result: false,
            checks: target_checks.clone(),
        }),
    ));
    switcher.add_macro(target);

    let mut controller = Macro::new("controller");
    controller.match_on_change = true;
    controller.conditions.push(ConditionEntry::new(
        Logic::RootNone,
        Box::new(Counting {
            result: true,
            checks: Arc::new(AtomicUsize::new(0)),
        }),
    ));
    controller
        .actions
        .push(ActionEntry::new(Box::new(PauseMacro {
            name: "target".to_string(),
            paused: true,
        })));
    switcher.add_macro(controller);

    switcher.start().unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        target_checks.load(Ordering::SeqCst) > 0
    }));

    // Once the pause request is applied the target stops being checked.
    assert!(wait_until(Duration::from_secs(5), || {
        let before = target_checks.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(100));
        target_checks.load(Ordering::SeqCst) == before
    }));
    switcher.stop();
}

#[test]
fn engine_start_is_idempotent() {
    let frontend = Arc::new(FakeFrontend::with_scenes(&["Desktop"]));
    let switcher = Switcher::new(
        frontend,
        Arc::new(StaticProbe::default()),
        fast_options(),
    );

    switcher.start().unwrap();
    switcher.start().unwrap();
    assert!(switcher.is_running());
    switcher.stop();
    assert!(!switcher.is_running());

    // Restart after a stop works.
    switcher.start().unwrap();
    assert!(switcher.is_running());
    switcher.stop();
}
