//! Built-in action types
//!
//! Actions report failure through their bool return; a failed action is
//! logged by the caller and never aborts the rest of a macro or a queue.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Action, RunContext};
use crate::registry::{ActionFactory, ActionRegistry};
use crate::scene::SceneRef;

fn save_settings<T: Serialize>(settings: &T) -> Value {
    serde_json::to_value(settings).unwrap_or(Value::Null)
}

/// Switch the program scene, optionally through a named transition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchScene {
    pub scene: SceneRef,
    #[serde(default)]
    pub transition: Option<String>,
}

impl Action for SwitchScene {
    fn id(&self) -> &'static str {
        "switch_scene"
    }

    fn perform(&mut self, ctx: &RunContext) -> bool {
        let Some(scene) = self.scene.resolve(&ctx.frontend, &ctx.variables) else {
            warn!("switch_scene: scene '{}' not found, skipping", self.scene.name);
            return false;
        };
        let transition = self
            .transition
            .as_deref()
            .map(|t| ctx.variables.resolve(t));
        match ctx.frontend.switch_scene(&scene, transition.as_deref()) {
            Ok(()) => {
                debug!("switched scene to '{}'", scene);
                true
            }
            Err(e) => {
                warn!("switch_scene failed: {}", e);
                false
            }
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

/// Sleep inside the action list. Interruptible; a cut-short wait counts
/// as failed so callers can tell shutdown from completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Wait {
    pub seconds: f64,
}

impl Action for Wait {
    fn id(&self) -> &'static str {
        "wait"
    }

    fn perform(&mut self, ctx: &RunContext) -> bool {
        ctx.interrupt
            .wait(Duration::from_secs_f64(self.seconds.max(0.0)))
    }

    fn save(&self) -> Value {
        save_settings(self)
    }

    fn load(&mut self, data: &Value) -> anyhow::Result<()> {
        *self = serde_json::from_value(data.clone())?;
        Ok(())
    }
}

/// Assign a variable. The value may itself reference other variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetVariable {
    pub name: String,
    pub value: String,
}

impl Action for SetVariable {
    fn id(&self) -> &'static str {
        "set_variable"
    }

    fn perform(&mut self, ctx: &RunContext) -> bool {
        if self.name.is_empty() {
            return false;
        }
        let value = ctx.variables.resolve(&self.value);
        ctx.variables.set(&self.name, value);
        true
    }

    fn save(&self) -> Value {
        save_settings(self)
    }

    fn load(&mut self, data: &Value) -> anyhow::Result<()> {
        *self = serde_json::from_value(data.clone())?;
        Ok(())
    }
}

/// Start or stop the OBS recording output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Recording {
    pub start: bool,
}

impl Action for Recording {
    fn id(&self) -> &'static str {
        "recording"
    }

    fn perform(&mut self, ctx: &RunContext) -> bool {
        let result = if self.start {
            ctx.frontend.start_recording()
        } else {
            ctx.frontend.stop_recording()
        };
        if let Err(e) = result {
            warn!("recording action failed: {}", e);
            return false;
        }
        true
    }

    fn save(&self) -> Value {
        save_settings(self)
    }

    fn load(&mut self, data: &Value) -> anyhow::Result<()> {
        *self = serde_json::from_value(data.clone())?;
        Ok(())
    }
}

/// Start or stop the OBS streaming output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Streaming {
    pub start: bool,
}

impl Action for Streaming {
    fn id(&self) -> &'static str {
        "streaming"
    }

    fn perform(&mut self, ctx: &RunContext) -> bool {
        let result = if self.start {
            ctx.frontend.start_streaming()
        } else {
            ctx.frontend.stop_streaming()
        };
        if let Err(e) = result {
            warn!("streaming action failed: {}", e);
            return false;
        }
        true
    }

    fn save(&self) -> Value {
        save_settings(self)
    }

    fn load(&mut self, data: &Value) -> anyhow::Result<()> {
        *self = serde_json::from_value(data.clone())?;
        Ok(())
    }
}

/// Mute or unmute an audio input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetMute {
    pub input: String,
    pub muted: bool,
}

impl Action for SetMute {
    fn id(&self) -> &'static str {
        "mute"
    }

    fn perform(&mut self, ctx: &RunContext) -> bool {
        let input = ctx.variables.resolve(&self.input);
        match ctx.frontend.set_input_muted(&input, self.muted) {
            Ok(()) => true,
            Err(e) => {
                warn!("mute action failed for '{}': {}", input, e);
                false
            }
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

/// Pause or resume another macro by name. Applied by the engine at the
/// start of the next cycle; a name that no longer exists is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PauseMacro {
    pub name: String,
    pub paused: bool,
}

impl Action for PauseMacro {
    fn id(&self) -> &'static str {
        "pause_macro"
    }

    fn perform(&mut self, ctx: &RunContext) -> bool {
        if self.name.is_empty() {
            return false;
        }
        let name = ctx.variables.resolve(&self.name);
        ctx.macro_pause.request(name, self.paused);
        true
    }

    fn save(&self) -> Value {
        save_settings(self)
    }

    fn load(&mut self, data: &Value) -> anyhow::Result<()> {
        *self = serde_json::from_value(data.clone())?;
        Ok(())
    }
}

/// Push another action onto a named queue for asynchronous execution.
///
/// The nested action is described by id plus settings and instantiated
/// through the action registry at enqueue time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Enqueue {
    pub queue: String,
    pub action_id: String,
    #[serde(default)]
    pub settings: Value,
}

impl Action for Enqueue {
    fn id(&self) -> &'static str {
        "enqueue"
    }

    fn perform(&mut self, ctx: &RunContext) -> bool {
        let Some(queue) = ctx.queues.get(&self.queue) else {
            warn!("enqueue: unknown queue '{}'", self.queue);
            return false;
        };
        let Some(mut action) = ctx.registries.actions.create(&self.action_id) else {
            warn!("enqueue: unknown action id '{}'", self.action_id);
            return false;
        };
        if let Err(e) = action.load(&self.settings) {
            warn!(
                "enqueue: failed to load settings for '{}': {}",
                self.action_id, e
            );
            return false;
        }
        queue.add(action, ctx);
        true
    }

    fn save(&self) -> Value {
        save_settings(self)
    }

    fn load(&mut self, data: &Value) -> anyhow::Result<()> {
        *self = serde_json::from_value(data.clone())?;
        Ok(())
    }
}

/// Register every built-in action type.
pub fn register_builtins(registry: &mut ActionRegistry) {
    registry.register(
        "switch_scene",
        ActionFactory {
            create: || Box::new(SwitchScene::default()),
            display_name: "Switch scene",
        },
    );
    registry.register(
        "wait",
        ActionFactory {
            create: || Box::new(Wait::default()),
            display_name: "Wait",
        },
    );
    registry.register(
        "set_variable",
        ActionFactory {
            create: || Box::new(SetVariable::default()),
            display_name: "Set variable",
        },
    );
    registry.register(
        "recording",
        ActionFactory {
            create: || Box::new(Recording::default()),
            display_name: "Recording",
        },
    );
    registry.register(
        "streaming",
        ActionFactory {
            create: || Box::new(Streaming::default()),
            display_name: "Streaming",
        },
    );
    registry.register(
        "mute",
        ActionFactory {
            create: || Box::new(SetMute::default()),
            display_name: "Mute",
        },
    );
    registry.register(
        "pause_macro",
        ActionFactory {
            create: || Box::new(PauseMacro::default()),
            display_name: "Pause macro",
        },
    );
    registry.register(
        "enqueue",
        ActionFactory {
            create: || Box::new(Enqueue::default()),
            display_name: "Enqueue",
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::{Interrupt, MacroPauseRequests};
    use crate::frontend::testing::FakeFrontend;
    use crate::frontend::Frontend;
    use crate::queue::QueueRegistry;
    use crate::registry::Registries;
    use crate::variables::VariableStore;
    use std::sync::Arc;

    fn ctx_with(frontend: FakeFrontend) -> (RunContext, Arc<FakeFrontend>) {
        let frontend = Arc::new(frontend);
        let ctx = RunContext {
            frontend: frontend.clone(),
            variables: Arc::new(VariableStore::new()),
            queues: Arc::new(QueueRegistry::new()),
            registries: Arc::new(Registries::with_builtins()),
            interrupt: Arc::new(Interrupt::new()),
            macro_pause: Arc::new(MacroPauseRequests::new()),
        };
        (ctx, frontend)
    }

    #[test]
    fn switch_scene_resolves_and_switches() {
        let (ctx, frontend) = ctx_with(FakeFrontend::with_scenes(&["Intro", "Game"]));
        let mut action = SwitchScene {
            scene: SceneRef::new("Game"),
            transition: Some("Fade".to_string()),
        };
        assert!(action.perform(&ctx));
        assert_eq!(
            frontend.switches(),
            vec![("Game".to_string(), Some("Fade".to_string()))]
        );
    }

    #[test]
    fn switch_scene_dangling_reference_fails_softly() {
        let (ctx, frontend) = ctx_with(FakeFrontend::with_scenes(&["Intro"]));
        let mut action = SwitchScene {
            scene: SceneRef::new("Removed"),
            transition: None,
        };
        assert!(!action.perform(&ctx));
        assert!(frontend.switches().is_empty());
    }

    #[test]
    fn set_variable_resolves_nested_references() {
        let (ctx, _) = ctx_with(FakeFrontend::with_scenes(&["A"]));
        ctx.variables.set("game", "Factorio");
        let mut action = SetVariable {
            name: "title".to_string(),
            value: "Playing ${game}".to_string(),
        };
        assert!(action.perform(&ctx));
        assert_eq!(
            ctx.variables.get("title").as_deref(),
            Some("Playing Factorio")
        );
    }

    #[test]
    fn recording_and_streaming_toggle_frontend() {
        let (ctx, frontend) = ctx_with(FakeFrontend::with_scenes(&["A"]));
        assert!(Recording { start: true }.perform(&ctx));
        assert!(frontend.is_recording());
        assert!(Recording { start: false }.perform(&ctx));
        assert!(!frontend.is_recording());
        assert!(Streaming { start: true }.perform(&ctx));
        assert!(frontend.is_streaming());
    }

    #[test]
    fn interrupted_wait_reports_failure() {
        let (ctx, _) = ctx_with(FakeFrontend::with_scenes(&["A"]));
        ctx.interrupt.stop();
        let mut action = Wait { seconds: 30.0 };
        assert!(!action.perform(&ctx));
    }

    #[test]
    fn enqueue_unknown_queue_or_action_fails() {
        let (ctx, _) = ctx_with(FakeFrontend::with_scenes(&["A"]));
        let mut action = Enqueue {
            queue: "missing".to_string(),
            action_id: "wait".to_string(),
            settings: Value::Null,
        };
        assert!(!action.perform(&ctx));

        ctx.queues.create("jobs", false, false);
        let mut bad_id = Enqueue {
            queue: "jobs".to_string(),
            action_id: "no_such_action".to_string(),
            settings: Value::Null,
        };
        assert!(!bad_id.perform(&ctx));
    }
}
