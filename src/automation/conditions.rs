//! Built-in condition types
//!
//! Each type carries its own settings struct, serializes through serde and
//! registers itself under a stable string id. Checks are best effort: any
//! missing signal (no window title, unknown input, unreadable file) simply
//! reports false.

use chrono::{NaiveTime, Timelike};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{CheckContext, Condition};
use crate::frontend::MediaPlayback;
use crate::registry::{ConditionFactory, ConditionRegistry};
use crate::scene::SceneRef;

/// Match `text` against `pattern`, exact or as a regex. A pattern that
/// fails to compile matches nothing.
pub(crate) fn pattern_matches(pattern: &str, text: &str, use_regex: bool) -> bool {
    if !use_regex {
        return pattern == text;
    }
    match Regex::new(pattern) {
        Ok(re) => re.is_match(text),
        Err(e) => {
            debug!("invalid pattern '{}': {}", pattern, e);
            false
        }
    }
}

fn save_settings<T: Serialize>(settings: &T) -> Value {
    serde_json::to_value(settings).unwrap_or(Value::Null)
}

/// Focused window title matches a pattern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowTitle {
    pub pattern: String,
    #[serde(default)]
    pub use_regex: bool,
}

impl Condition for WindowTitle {
    fn id(&self) -> &'static str {
        "window_title"
    }

    fn check(&mut self, ctx: &CheckContext) -> bool {
        let Some(title) = ctx.snapshot.window_title.as_deref() else {
            return false;
        };
        let pattern = ctx.variables.resolve(&self.pattern);
        pattern_matches(&pattern, title, self.use_regex)
    }

    fn save(&self) -> Value {
        save_settings(self)
    }

    fn load(&mut self, data: &Value) -> anyhow::Result<()> {
        *self = serde_json::from_value(data.clone())?;
        Ok(())
    }
}

/// A process with a matching name is in the foreground, or running at all
/// when the platform cannot report focus.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Process {
    pub process: String,
    #[serde(default)]
    pub use_regex: bool,
}

impl Condition for Process {
    fn id(&self) -> &'static str {
        "process"
    }

    fn check(&mut self, ctx: &CheckContext) -> bool {
        let pattern = ctx.variables.resolve(&self.process);
        if let Some(foreground) = ctx.snapshot.foreground_process.as_deref() {
            return pattern_matches(&pattern, foreground, self.use_regex);
        }
        ctx.snapshot
            .processes
            .iter()
            .any(|p| pattern_matches(&pattern, p, self.use_regex))
    }

    fn save(&self) -> Value {
        save_settings(self)
    }

    fn load(&mut self, data: &Value) -> anyhow::Result<()> {
        *self = serde_json::from_value(data.clone())?;
        Ok(())
    }
}

/// No user input for at least the configured number of seconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Idle {
    pub seconds: u64,
}

impl Condition for Idle {
    fn id(&self) -> &'static str {
        "idle"
    }

    fn check(&mut self, ctx: &CheckContext) -> bool {
        ctx.snapshot
            .idle_seconds
            .map(|idle| idle >= self.seconds)
            .unwrap_or(false)
    }

    fn save(&self) -> Value {
        save_settings(self)
    }

    fn load(&mut self, data: &Value) -> anyhow::Result<()> {
        *self = serde_json::from_value(data.clone())?;
        Ok(())
    }
}

/// A file's contents match a pattern. Unreadable files never match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileContent {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub use_regex: bool,
}

impl Condition for FileContent {
    fn id(&self) -> &'static str {
        "file"
    }

    fn check(&mut self, ctx: &CheckContext) -> bool {
        let path = ctx.variables.resolve(&self.path);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                debug!("file condition could not read '{}': {}", path, e);
                return false;
            }
        };
        let pattern = ctx.variables.resolve(&self.content);
        pattern_matches(&pattern, text.trim_end(), self.use_regex)
    }

    fn save(&self) -> Value {
        save_settings(self)
    }

    fn load(&mut self, data: &Value) -> anyhow::Result<()> {
        *self = serde_json::from_value(data.clone())?;
        Ok(())
    }
}

/// Wall-clock time is inside a window. Windows crossing midnight wrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Default for TimeOfDay {
    fn default() -> Self {
        Self {
            start: NaiveTime::MIN,
            end: NaiveTime::MIN,
        }
    }
}

impl TimeOfDay {
    pub(crate) fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= time && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

impl Condition for TimeOfDay {
    fn id(&self) -> &'static str {
        "time"
    }

    fn check(&mut self, ctx: &CheckContext) -> bool {
        let now = ctx.snapshot.time.time();
        // Compare at second granularity, the polling interval is coarser.
        let now = NaiveTime::from_hms_opt(now.hour(), now.minute(), now.second())
            .unwrap_or(NaiveTime::MIN);
        self.contains(now)
    }

    fn save(&self) -> Value {
        save_settings(self)
    }

    fn load(&mut self, data: &Value) -> anyhow::Result<()> {
        *self = serde_json::from_value(data.clone())?;
        Ok(())
    }
}

/// The current program scene is a specific scene.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneIs {
    pub scene: SceneRef,
}

impl Condition for SceneIs {
    fn id(&self) -> &'static str {
        "scene"
    }

    fn check(&mut self, ctx: &CheckContext) -> bool {
        let Some(current) = ctx.snapshot.current_scene.as_deref() else {
            return false;
        };
        ctx.variables.resolve(&self.scene.name) == current
    }

    fn save(&self) -> Value {
        save_settings(self)
    }

    fn load(&mut self, data: &Value) -> anyhow::Result<()> {
        *self = serde_json::from_value(data.clone())?;
        Ok(())
    }
}

/// Audio input mute/volume check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum AudioCheck {
    Muted,
    Unmuted,
    VolumeAboveDb(f32),
    VolumeBelowDb(f32),
}

impl Default for AudioCheck {
    fn default() -> Self {
        AudioCheck::Muted
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Audio {
    pub input: String,
    #[serde(default)]
    pub check: AudioCheck,
}

impl Condition for Audio {
    fn id(&self) -> &'static str {
        "audio"
    }

    fn check(&mut self, ctx: &CheckContext) -> bool {
        let input = ctx.variables.resolve(&self.input);
        match &self.check {
            AudioCheck::Muted => ctx.frontend.input_muted(&input).unwrap_or(false),
            AudioCheck::Unmuted => ctx
                .frontend
                .input_muted(&input)
                .map(|m| !m)
                .unwrap_or(false),
            AudioCheck::VolumeAboveDb(db) => ctx
                .frontend
                .input_volume_db(&input)
                .map(|v| v > *db)
                .unwrap_or(false),
            AudioCheck::VolumeBelowDb(db) => ctx
                .frontend
                .input_volume_db(&input)
                .map(|v| v < *db)
                .unwrap_or(false),
        }
    }

    fn save(&self) -> Value {
        save_settings(self)
    }

    fn load(&mut self, data: &Value) -> anyhow::Result<()> {
        *self = serde_json::from_value(data.clone())?;
        Ok(())
    }
}

/// A media input is in a specific playback state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    pub input: String,
    pub state: MediaPlayback,
}

impl Default for Media {
    fn default() -> Self {
        Self {
            input: String::new(),
            state: MediaPlayback::Playing,
        }
    }
}

impl Condition for Media {
    fn id(&self) -> &'static str {
        "media"
    }

    fn check(&mut self, ctx: &CheckContext) -> bool {
        let input = ctx.variables.resolve(&self.input);
        ctx.frontend.media_state(&input) == Some(self.state)
    }

    fn save(&self) -> Value {
        save_settings(self)
    }

    fn load(&mut self, data: &Value) -> anyhow::Result<()> {
        *self = serde_json::from_value(data.clone())?;
        Ok(())
    }
}

/// Another macro matched on the previous cycle. A reference to a removed
/// macro reports false, mirroring weak-reference semantics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MacroMatched {
    pub name: String,
}

impl Condition for MacroMatched {
    fn id(&self) -> &'static str {
        "macro"
    }

    fn check(&mut self, ctx: &CheckContext) -> bool {
        ctx.macro_matched.get(&self.name).copied().unwrap_or(false)
    }

    fn save(&self) -> Value {
        save_settings(self)
    }

    fn load(&mut self, data: &Value) -> anyhow::Result<()> {
        *self = serde_json::from_value(data.clone())?;
        Ok(())
    }
}

/// Register every built-in condition type.
pub fn register_builtins(registry: &mut ConditionRegistry) {
    registry.register(
        "window_title",
        ConditionFactory {
            create: || Box::new(WindowTitle::default()),
            display_name: "Window title",
            uses_duration: true,
        },
    );
    registry.register(
        "process",
        ConditionFactory {
            create: || Box::new(Process::default()),
            display_name: "Process",
            uses_duration: true,
        },
    );
    registry.register(
        "idle",
        ConditionFactory {
            create: || Box::new(Idle::default()),
            display_name: "Idle",
            uses_duration: false,
        },
    );
    registry.register(
        "file",
        ConditionFactory {
            create: || Box::new(FileContent::default()),
            display_name: "File",
            uses_duration: true,
        },
    );
    registry.register(
        "time",
        ConditionFactory {
            create: || Box::new(TimeOfDay::default()),
            display_name: "Time",
            uses_duration: false,
        },
    );
    registry.register(
        "scene",
        ConditionFactory {
            create: || Box::new(SceneIs::default()),
            display_name: "Scene",
            uses_duration: true,
        },
    );
    registry.register(
        "audio",
        ConditionFactory {
            create: || Box::new(Audio::default()),
            display_name: "Audio",
            uses_duration: true,
        },
    );
    registry.register(
        "media",
        ConditionFactory {
            create: || Box::new(Media::default()),
            display_name: "Media",
            uses_duration: true,
        },
    );
    registry.register(
        "macro",
        ConditionFactory {
            create: || Box::new(MacroMatched::default()),
            display_name: "Macro",
            uses_duration: false,
        },
    );
}
