//! Settings persistence
//!
//! The whole engine configuration serializes to a single JSON document:
//! rule lists, macros (conditions and actions by registry id plus their
//! settings blob), queues and variables. Loading degrades gracefully:
//! entries with unknown ids or invalid logic tags are dropped with a
//! warning instead of failing the whole document, so a settings file
//! written by a newer build still loads.

use anyhow::Context;
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::automation::{ActionEntry, ConditionEntry, Macro};
use crate::duration::DurationModifier;
use crate::engine::rules::Category;
use crate::engine::Switcher;
use crate::logic::Logic;
use crate::registry::Registries;

const FORMAT_VERSION: u64 = 1;

/// Serialize the full engine configuration.
pub fn save_settings(switcher: &Switcher) -> Value {
    let shared = &switcher.shared;
    let st = shared.state.lock().unwrap();

    let macros: Vec<Value> = st
        .macros
        .iter()
        .map(|m| save_macro(&m.lock().unwrap()))
        .collect();

    let queues: Vec<Value> = shared
        .queues
        .all()
        .iter()
        .map(|q| {
            json!({
                "name": q.name(),
                "run_on_startup": q.run_on_startup(),
                "resolve_on_add": q.resolve_on_add(),
            })
        })
        .collect();

    json!({
        "version": FORMAT_VERSION,
        "interval_ms": st.interval_ms,
        "paused": st.paused,
        "priority": st.priority.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
        "ignore_titles": st.ignore_titles,
        "window_rules": serde_json::to_value(&st.window_rules).unwrap_or(Value::Null),
        "process_rules": serde_json::to_value(&st.process_rules).unwrap_or(Value::Null),
        "idle_rule": serde_json::to_value(&st.idle_rule).unwrap_or(Value::Null),
        "file_rules": serde_json::to_value(&st.file_rules).unwrap_or(Value::Null),
        "time_rules": serde_json::to_value(&st.time_rules).unwrap_or(Value::Null),
        "macros": macros,
        "queues": queues,
        "variables": shared.variables.snapshot(),
    })
}

fn save_macro(mac: &Macro) -> Value {
    let conditions: Vec<Value> = mac
        .conditions
        .iter()
        .map(|entry| {
            json!({
                "id": entry.condition.id(),
                "logic": entry.logic.raw(),
                "enabled": entry.enabled,
                "duration": serde_json::to_value(&entry.duration).unwrap_or(Value::Null),
                "settings": entry.condition.save(),
            })
        })
        .collect();

    let save_actions = |entries: &[ActionEntry]| -> Vec<Value> {
        entries
            .iter()
            .map(|entry| {
                json!({
                    "id": entry.action.id(),
                    "enabled": entry.enabled,
                    "settings": entry.action.save(),
                })
            })
            .collect()
    };

    json!({
        "name": mac.name,
        "paused": mac.paused,
        "run_in_parallel": mac.run_in_parallel,
        "match_on_change": mac.match_on_change,
        "conditions": conditions,
        "actions": save_actions(&mac.actions),
        "else_actions": save_actions(&mac.else_actions),
    })
}

/// Replace the engine configuration with a previously saved document.
///
/// Returns the list of degradation warnings (dropped entries). Errors
/// only on a structurally unusable document.
pub fn load_settings(switcher: &Switcher, doc: &Value) -> anyhow::Result<Vec<String>> {
    let obj = doc
        .as_object()
        .context("settings document is not a JSON object")?;
    let mut warnings = Vec::new();

    let shared = &switcher.shared;
    let mut st = shared.state.lock().unwrap();

    if let Some(interval) = obj.get("interval_ms").and_then(Value::as_u64) {
        st.interval_ms = interval.max(1);
    }
    if let Some(paused) = obj.get("paused").and_then(Value::as_bool) {
        st.paused = paused;
    }

    if let Some(priority) = obj.get("priority").and_then(Value::as_array) {
        let mut order = Vec::new();
        for entry in priority {
            match entry.as_str().and_then(Category::from_str) {
                Some(category) => order.push(category),
                None => {
                    let w = format!("unknown priority category {}, dropped", entry);
                    warn!("{}", w);
                    warnings.push(w);
                }
            }
        }
        // Categories missing from the saved order keep their default
        // position at the end.
        for category in crate::engine::rules::default_priority() {
            if !order.contains(&category) {
                order.push(category);
            }
        }
        st.priority = order;
    }

    if let Some(titles) = obj.get("ignore_titles") {
        st.ignore_titles = serde_json::from_value(titles.clone()).unwrap_or_default();
    }
    if let Some(v) = obj.get("window_rules") {
        st.window_rules = serde_json::from_value(v.clone()).unwrap_or_default();
    }
    if let Some(v) = obj.get("process_rules") {
        st.process_rules = serde_json::from_value(v.clone()).unwrap_or_default();
    }
    if let Some(v) = obj.get("idle_rule") {
        st.idle_rule = serde_json::from_value(v.clone()).unwrap_or_default();
    }
    if let Some(v) = obj.get("file_rules") {
        st.file_rules = serde_json::from_value(v.clone()).unwrap_or_default();
    }
    if let Some(v) = obj.get("time_rules") {
        st.time_rules = serde_json::from_value(v.clone()).unwrap_or_default();
    }

    st.macros.clear();
    st.macro_matched.clear();
    if let Some(macros) = obj.get("macros").and_then(Value::as_array) {
        for entry in macros {
            match load_macro(entry, &shared.registries, &mut warnings) {
                Some(mac) => st
                    .macros
                    .push(std::sync::Arc::new(std::sync::Mutex::new(mac))),
                None => {
                    let w = format!(
                        "macro entry without a usable name dropped: {}",
                        truncate(entry)
                    );
                    warn!("{}", w);
                    warnings.push(w);
                }
            }
        }
    }
    drop(st);

    shared.queues.reset();
    if let Some(queues) = obj.get("queues").and_then(Value::as_array) {
        for entry in queues {
            let Some(name) = entry.get("name").and_then(Value::as_str) else {
                let w = format!("queue entry without a name dropped: {}", truncate(entry));
                warn!("{}", w);
                warnings.push(w);
                continue;
            };
            let run_on_startup = entry
                .get("run_on_startup")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let resolve_on_add = entry
                .get("resolve_on_add")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if shared
                .queues
                .create(name, run_on_startup, resolve_on_add)
                .is_none()
            {
                let w = format!("duplicate queue name '{}' dropped", name);
                warn!("{}", w);
                warnings.push(w);
            }
        }
    }

    if let Some(variables) = obj.get("variables").and_then(Value::as_object) {
        let map = variables
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect();
        shared.variables.replace_all(map);
    }

    info!(
        "settings loaded ({} warnings)",
        warnings.len()
    );
    Ok(warnings)
}

fn load_macro(entry: &Value, registries: &Registries, warnings: &mut Vec<String>) -> Option<Macro> {
    let name = entry.get("name").and_then(Value::as_str)?;
    let mut mac = Macro::new(name);
    mac.paused = entry.get("paused").and_then(Value::as_bool).unwrap_or(false);
    mac.run_in_parallel = entry
        .get("run_in_parallel")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    mac.match_on_change = entry
        .get("match_on_change")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if let Some(conditions) = entry.get("conditions").and_then(Value::as_array) {
        for saved in conditions {
            // Root position is where the entry ends up after drops, not
            // where it sat in the saved array.
            let is_root = mac.conditions.is_empty();
            if let Some(cond) = load_condition(saved, registries, name, is_root, warnings) {
                mac.conditions.push(cond);
            }
        }
    }

    let mut load_actions = |key: &str, target: &mut Vec<ActionEntry>| {
        if let Some(actions) = entry.get(key).and_then(Value::as_array) {
            for saved in actions {
                if let Some(action) = load_action(saved, registries, name, warnings) {
                    target.push(action);
                }
            }
        }
    };
    load_actions("actions", &mut mac.actions);
    load_actions("else_actions", &mut mac.else_actions);

    mac.reset_state();
    Some(mac)
}

fn load_condition(
    saved: &Value,
    registries: &Registries,
    macro_name: &str,
    is_root: bool,
    warnings: &mut Vec<String>,
) -> Option<ConditionEntry> {
    let id = saved.get("id").and_then(Value::as_str)?;
    let Some(mut condition) = registries.conditions.create(id) else {
        let w = format!("macro '{}': unknown condition id '{}', dropped", macro_name, id);
        warn!("{}", w);
        warnings.push(w);
        return None;
    };

    let raw_logic = saved.get("logic").and_then(Value::as_u64).unwrap_or(0) as u32;
    let Some(logic) = Logic::from_raw(raw_logic) else {
        let w = format!(
            "macro '{}': condition '{}' has unknown logic tag {}, dropped",
            macro_name, id, raw_logic
        );
        warn!("{}", w);
        warnings.push(w);
        return None;
    };
    if !logic.is_valid_selection(is_root) {
        // Kept: the fold validates position again at evaluation time and
        // leaves the accumulator unchanged for a mispositioned tag.
        let w = if is_root {
            format!(
                "macro '{}': root condition '{}' has non-root logic tag {:?}; the macro can never match",
                macro_name, id, logic
            )
        } else {
            format!(
                "macro '{}': condition '{}' has mispositioned logic tag {:?}",
                macro_name, id, logic
            )
        };
        warn!("{}", w);
        warnings.push(w);
    }

    if let Some(settings) = saved.get("settings") {
        if let Err(e) = condition.load(settings) {
            let w = format!(
                "macro '{}': condition '{}' settings failed to load ({}), dropped",
                macro_name, id, e
            );
            warn!("{}", w);
            warnings.push(w);
            return None;
        }
    }

    let duration: DurationModifier = saved
        .get("duration")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();

    Some(ConditionEntry {
        logic,
        enabled: saved.get("enabled").and_then(Value::as_bool).unwrap_or(true),
        duration,
        condition,
    })
}

fn load_action(
    saved: &Value,
    registries: &Registries,
    macro_name: &str,
    warnings: &mut Vec<String>,
) -> Option<ActionEntry> {
    let id = saved.get("id").and_then(Value::as_str)?;
    let Some(mut action) = registries.actions.create(id) else {
        let w = format!("macro '{}': unknown action id '{}', dropped", macro_name, id);
        warn!("{}", w);
        warnings.push(w);
        return None;
    };
    if let Some(settings) = saved.get("settings") {
        if let Err(e) = action.load(settings) {
            let w = format!(
                "macro '{}': action '{}' settings failed to load ({}), dropped",
                macro_name, id, e
            );
            warn!("{}", w);
            warnings.push(w);
            return None;
        }
    }
    Some(ActionEntry {
        enabled: saved.get("enabled").and_then(Value::as_bool).unwrap_or(true),
        action,
    })
}

fn truncate(value: &Value) -> String {
    let mut s = value.to_string();
    if s.len() > 80 {
        s.truncate(80);
        s.push_str("...");
    }
    s
}

/// Location of the settings document on disk.
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Read and parse the settings document. `Ok(None)` when the file
    /// does not exist yet.
    pub fn load(&self) -> anyhow::Result<Option<Value>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        let doc = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(Some(doc))
    }

    pub fn save(&self, doc: &Value) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(doc)?;
        fs::write(&self.path, text)
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}
