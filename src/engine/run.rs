//! Engine evaluation loop
//!
//! One cycle: sleep out the remainder of the interval, prune deferred
//! removals, capture a precondition snapshot and a plan of the state the
//! scan needs, walk the priority categories until one matches, apply the
//! resulting scene switch, then run any macro action lists. The state
//! lock is never held across frontend calls; rule and macro evaluation
//! work from the captured plan.

use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::automation::{CheckContext, Macro, RunContext, RunKind};
use crate::probe::Snapshot;

use super::rules::{Category, FileRule, IdleRule, ProcessRule, TimeRule, WindowRule};
use super::{SceneMatch, Shared, SwitcherState};

/// Shortest sleep the loop will take; intervals that would leave less
/// than a millisecond of slack fall back to this to avoid busy-spinning.
const MIN_SLEEP: Duration = Duration::from_millis(10);

enum WakeReason {
    Stop,
    Notified,
    Timeout,
}

/// What a priority scan decided for this cycle.
enum MatchDecision {
    None,
    Scene(SceneMatch),
    /// The macro category produced the match; switches happen through
    /// macro actions rather than a direct scene decision.
    MacroCategory,
}

/// A macro whose evaluation decided something should run this cycle.
struct MacroRun {
    mac: Arc<Mutex<Macro>>,
    kind: RunKind,
}

/// Per-cycle copy of everything the priority scan reads, captured under
/// the state lock and evaluated with the lock released so condition
/// checks can issue frontend requests without stalling event delivery.
struct CyclePlan {
    priority: Vec<Category>,
    window_rules: Vec<WindowRule>,
    process_rules: Vec<ProcessRule>,
    idle_rule: IdleRule,
    file_rules: Vec<FileRule>,
    time_rules: Vec<TimeRule>,
    macros: Vec<Arc<Mutex<Macro>>>,
    /// Match results of the previous cycle, moved out of the state; the
    /// cycle writes back either the fresh results or this map untouched.
    previous_matched: HashMap<String, bool>,
    seq: u64,
}

pub(super) fn run_loop(shared: Arc<Shared>) {
    let ctx = RunContext {
        frontend: shared.frontend.clone(),
        variables: shared.variables.clone(),
        queues: shared.queues.clone(),
        registries: shared.registries.clone(),
        interrupt: shared.interrupt.clone(),
        macro_pause: shared.macro_pause.clone(),
    };

    let mut first_cycle = true;
    let mut last_cycle = Duration::ZERO;

    loop {
        if !first_cycle {
            let interval = Duration::from_millis(shared.state.lock().unwrap().interval_ms);
            let remaining = interval.saturating_sub(last_cycle);
            let sleep = if remaining <= Duration::from_millis(1) {
                MIN_SLEEP
            } else {
                remaining
            };
            if let WakeReason::Stop = cooperative_sleep(&shared, sleep) {
                break;
            }
        }
        first_cycle = false;
        let cycle_start = Instant::now();

        {
            let mut st = shared.state.lock().unwrap();
            prune_removed_macros(&mut st);
            apply_pause_requests(&shared, &mut st);
        }
        shared.queues.prune();

        if shared.stop.load(std::sync::atomic::Ordering::SeqCst) {
            break;
        }

        let paused = shared.state.lock().unwrap().paused;
        if paused {
            write_status(&shared, true);
            last_cycle = cycle_start.elapsed();
            continue;
        }

        let snapshot = build_snapshot(&shared);
        let plan = capture_plan(&shared);

        let (decision, macro_runs, matched_now) = check_for_match(&shared, &plan, &snapshot);
        let seq_at_match = plan.seq;

        {
            let mut st = shared.state.lock().unwrap();
            st.macro_matched = matched_now.unwrap_or(plan.previous_matched);
        }

        if shared.stop.load(std::sync::atomic::Ordering::SeqCst) {
            break;
        }

        if let MatchDecision::Scene(m) = decision {
            apply_scene_match(&shared, m, seq_at_match);
        }
        execute_macro_runs(&shared, &ctx, macro_runs);

        write_status(&shared, false);
        last_cycle = cycle_start.elapsed();
    }

    shared
        .running
        .store(false, std::sync::atomic::Ordering::SeqCst);
    write_status(&shared, shared.state.lock().unwrap().paused);
    debug!("evaluation loop exited");
}

/// Wait on the engine condvar for up to `duration`. Wakes early on stop
/// or on a one-shot wake request (scene change, pause toggle).
fn cooperative_sleep(shared: &Shared, duration: Duration) -> WakeReason {
    let deadline = Instant::now() + duration;
    let mut st = shared.state.lock().unwrap();
    loop {
        if shared.stop.load(std::sync::atomic::Ordering::SeqCst) {
            return WakeReason::Stop;
        }
        if st.wake {
            st.wake = false;
            return WakeReason::Notified;
        }
        let now = Instant::now();
        if now >= deadline {
            return WakeReason::Timeout;
        }
        let (guard, _) = shared.cv.wait_timeout(st, deadline - now).unwrap();
        st = guard;
    }
}

fn prune_removed_macros(st: &mut MutexGuard<'_, SwitcherState>) {
    if st.pending_macro_removals.is_empty() {
        return;
    }
    let pending = std::mem::take(&mut st.pending_macro_removals);
    st.macros.retain(|m| {
        let name = m.lock().unwrap().name.clone();
        if pending.iter().any(|p| *p == name) {
            info!("removing macro '{}'", name);
            false
        } else {
            true
        }
    });
    for name in &pending {
        st.macro_matched.remove(name);
    }
}

/// Apply pause/unpause requests queued by pause-macro actions. Unknown
/// names are dropped silently; the macro may have been removed since.
fn apply_pause_requests(shared: &Shared, st: &mut MutexGuard<'_, SwitcherState>) {
    for (name, paused) in shared.macro_pause.drain() {
        for mac in &st.macros {
            let mut mac_guard = mac.lock().unwrap();
            if mac_guard.name == name {
                debug!(
                    "macro '{}' {}",
                    name,
                    if paused { "paused" } else { "resumed" }
                );
                mac_guard.paused = paused;
            }
        }
    }
}

/// Capture the per-cycle snapshot. Probe calls happen with the state
/// lock released; only the title bookkeeping touches the lock.
fn build_snapshot(shared: &Shared) -> Snapshot {
    let raw_title = shared.probe.focused_window_title();
    let foreground_process = shared.probe.foreground_process();
    let processes = shared.probe.process_names();
    let idle_seconds = shared.probe.idle_seconds();

    let mut st = shared.state.lock().unwrap();
    let previous_title = st.last_title.clone();
    // An ignored title does not replace the last recorded one, so rules
    // keep reacting to the window the user actually works in.
    let window_title = match raw_title {
        Some(title) if title_ignored(&st.ignore_titles, &title) => st.last_title.clone(),
        Some(title) => Some(title),
        None => None,
    };
    st.last_title = window_title.clone();

    Snapshot {
        window_title,
        previous_title,
        foreground_process,
        processes,
        idle_seconds,
        current_scene: st.current_scene.clone(),
        previous_scene: st.previous_scene.clone(),
        time: chrono::Local::now(),
    }
}

fn capture_plan(shared: &Shared) -> CyclePlan {
    let mut st = shared.state.lock().unwrap();
    CyclePlan {
        priority: st.priority.clone(),
        window_rules: st.window_rules.clone(),
        process_rules: st.process_rules.clone(),
        idle_rule: st.idle_rule.clone(),
        file_rules: st.file_rules.clone(),
        time_rules: st.time_rules.clone(),
        macros: st.macros.clone(),
        previous_matched: std::mem::take(&mut st.macro_matched),
        seq: st.scene_change_seq,
    }
}

/// An ignore entry matches exactly, or as a regex when it compiles as
/// one. Patterns that compile to nothing useful simply never match.
fn title_ignored(ignore_titles: &[String], title: &str) -> bool {
    ignore_titles.iter().any(|pattern| {
        pattern == title
            || Regex::new(pattern)
                .map(|re| re.is_match(title))
                .unwrap_or(false)
    })
}

/// Walk the priority order; the first category that matches wins the
/// cycle and the remaining categories are not evaluated. Two carve-outs:
/// within the macro category every macro is always evaluated, since
/// condition checks carry side effects; and an unmatched macro category
/// is not a match, so its collected else-action runs are carried along
/// while lower-priority categories still get their turn. A stop check
/// between categories keeps shutdown fast mid-scan.
fn check_for_match(
    shared: &Shared,
    plan: &CyclePlan,
    snapshot: &Snapshot,
) -> (MatchDecision, Vec<MacroRun>, Option<HashMap<String, bool>>) {
    let mut runs = Vec::new();
    let mut matched_now = None;

    for category in &plan.priority {
        if shared.stop.load(std::sync::atomic::Ordering::SeqCst) {
            return (MatchDecision::None, runs, matched_now);
        }
        match category {
            Category::Macro => {
                let (mut macro_runs, any_matched, results) =
                    check_macros(shared, plan, snapshot);
                runs.append(&mut macro_runs);
                matched_now = Some(results);
                if any_matched {
                    return (MatchDecision::MacroCategory, runs, matched_now);
                }
            }
            _ => {
                if let Some(m) = check_rules(shared, plan, snapshot, *category) {
                    debug!(
                        "category '{}' matched, switching to '{}'",
                        category.as_str(),
                        m.scene
                    );
                    return (MatchDecision::Scene(m), runs, matched_now);
                }
            }
        }
    }
    (MatchDecision::None, runs, matched_now)
}

fn check_rules(
    shared: &Shared,
    plan: &CyclePlan,
    snapshot: &Snapshot,
    category: Category,
) -> Option<SceneMatch> {
    use crate::automation::conditions::pattern_matches;

    let resolve = |scene: &crate::scene::SceneRef| {
        scene.resolve(&shared.frontend, &shared.variables)
    };

    match category {
        Category::WindowTitle => {
            let title = snapshot.window_title.as_deref()?;
            plan.window_rules.iter().find_map(|rule| {
                if !pattern_matches(&rule.pattern, title, rule.use_regex) {
                    return None;
                }
                Some(SceneMatch {
                    scene: resolve(&rule.scene)?,
                    transition: rule.transition.clone(),
                    linger_ms: rule.linger_ms,
                })
            })
        }
        Category::Process => plan.process_rules.iter().find_map(|rule| {
            let matched = match snapshot.foreground_process.as_deref() {
                Some(fg) => pattern_matches(&rule.process, fg, rule.use_regex),
                None => snapshot
                    .processes
                    .iter()
                    .any(|p| pattern_matches(&rule.process, p, rule.use_regex)),
            };
            if !matched {
                return None;
            }
            Some(SceneMatch {
                scene: resolve(&rule.scene)?,
                transition: rule.transition.clone(),
                linger_ms: 0,
            })
        }),
        Category::Idle => {
            let rule = &plan.idle_rule;
            if !rule.enabled || snapshot.idle_seconds? < rule.seconds {
                return None;
            }
            Some(SceneMatch {
                scene: resolve(&rule.scene)?,
                transition: rule.transition.clone(),
                linger_ms: 0,
            })
        }
        Category::File => plan.file_rules.iter().find_map(|rule| {
            let content = std::fs::read_to_string(&rule.path).ok()?;
            if !pattern_matches(&rule.content, content.trim_end(), rule.use_regex) {
                return None;
            }
            Some(SceneMatch {
                scene: resolve(&rule.scene)?,
                transition: rule.transition.clone(),
                linger_ms: 0,
            })
        }),
        Category::Time => plan.time_rules.iter().find_map(|rule| {
            if !rule.window.contains(snapshot.time.time()) {
                return None;
            }
            Some(SceneMatch {
                scene: resolve(&rule.scene)?,
                transition: rule.transition.clone(),
                linger_ms: 0,
            })
        }),
        Category::Macro => None,
    }
}

/// Evaluate every macro against the snapshot, with only the per-macro
/// mutexes held. The previous cycle's match map is what macro-reference
/// conditions observe, so evaluation order within the cycle cannot
/// affect them.
fn check_macros(
    shared: &Shared,
    plan: &CyclePlan,
    snapshot: &Snapshot,
) -> (Vec<MacroRun>, bool, HashMap<String, bool>) {
    let ctx = CheckContext {
        frontend: &shared.frontend,
        variables: &shared.variables,
        snapshot,
        macro_matched: &plan.previous_matched,
    };

    let mut runs = Vec::new();
    let mut any_matched = false;
    let mut matched_now = HashMap::new();
    for mac in &plan.macros {
        let (name, matched, kind) = {
            let mut mac_guard = mac.lock().unwrap();
            let kind = mac_guard.evaluate(&ctx);
            (mac_guard.name.clone(), mac_guard.matched(), kind)
        };
        any_matched |= matched;
        matched_now.insert(name, matched);
        if let Some(kind) = kind {
            runs.push(MacroRun {
                mac: mac.clone(),
                kind,
            });
        }
    }

    (runs, any_matched, matched_now)
}

/// Apply a rule-decided scene switch, honoring the linger delay. A
/// manual scene change observed during the linger discards the match.
fn apply_scene_match(shared: &Shared, m: SceneMatch, seq_at_match: u64) {
    if m.linger_ms > 0 {
        if let WakeReason::Stop =
            cooperative_sleep(shared, Duration::from_millis(m.linger_ms))
        {
            return;
        }
        let st = shared.state.lock().unwrap();
        if st.scene_change_seq != seq_at_match {
            debug!(
                "scene changed during linger, discarding switch to '{}'",
                m.scene
            );
            return;
        }
    }

    let already_current = {
        let st = shared.state.lock().unwrap();
        st.current_scene.as_deref() == Some(m.scene.as_str())
    };
    if already_current {
        return;
    }

    if let Err(e) = shared
        .frontend
        .switch_scene(&m.scene, m.transition.as_deref())
    {
        warn!("scene switch to '{}' failed: {}", m.scene, e);
    } else {
        info!("switched to scene '{}'", m.scene);
    }
}

/// Run the collected macro action lists. Parallel macros get their own
/// thread; everything else runs inline on the engine thread.
fn execute_macro_runs(shared: &Shared, ctx: &RunContext, runs: Vec<MacroRun>) {
    for run in runs {
        if shared.stop.load(std::sync::atomic::Ordering::SeqCst) {
            return;
        }
        let parallel = run.mac.lock().unwrap().run_in_parallel;
        if parallel {
            let ctx = ctx.clone();
            let mac = run.mac;
            let kind = run.kind;
            let name = mac.lock().unwrap().name.clone();
            let spawn = std::thread::Builder::new()
                .name(format!("macro-{}", name))
                .spawn(move || {
                    let mut mac_guard = mac.lock().unwrap();
                    mac_guard.run(kind, &ctx);
                });
            if let Err(e) = spawn {
                warn!("failed to spawn thread for macro '{}': {}", name, e);
            }
        } else {
            let mut mac_guard = run.mac.lock().unwrap();
            mac_guard.run(run.kind, ctx);
        }
    }
}

/// Best-effort JSON heartbeat for external tooling.
fn write_status(shared: &Shared, paused: bool) {
    let Some(path) = shared.status_path.as_ref() else {
        return;
    };
    let current_scene = shared.state.lock().unwrap().current_scene.clone();
    let status = serde_json::json!({
        "instance_id": shared.instance_id.to_string(),
        "running": shared.running.load(std::sync::atomic::Ordering::SeqCst),
        "paused": paused,
        "current_scene": current_scene,
        "updated_at": chrono::Local::now().to_rfc3339(),
    });
    if let Err(e) = std::fs::write(path, status.to_string()) {
        warn!("failed to write status file {}: {}", path.display(), e);
    }
}
