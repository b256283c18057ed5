//! In-memory frontend used by unit and integration tests.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{Frontend, FrontendError, MediaPlayback};

/// Fake OBS frontend with a fixed scene list and recorded switches.
#[derive(Default)]
pub struct FakeFrontend {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    scenes: Vec<String>,
    current: Option<String>,
    switches: Vec<(String, Option<String>)>,
    recording: bool,
    streaming: bool,
    muted: HashMap<String, bool>,
    volumes: HashMap<String, f32>,
    media: HashMap<String, MediaPlayback>,
}

impl FakeFrontend {
    pub fn with_scenes(scenes: &[&str]) -> Self {
        let frontend = Self::default();
        {
            let mut st = frontend.state.lock().unwrap();
            st.scenes = scenes.iter().map(|s| s.to_string()).collect();
            st.current = st.scenes.first().cloned();
        }
        frontend
    }

    pub fn set_current(&self, scene: &str) {
        self.state.lock().unwrap().current = Some(scene.to_string());
    }

    pub fn set_muted(&self, input: &str, muted: bool) {
        self.state.lock().unwrap().muted.insert(input.to_string(), muted);
    }

    pub fn set_volume_db(&self, input: &str, db: f32) {
        self.state.lock().unwrap().volumes.insert(input.to_string(), db);
    }

    pub fn set_media_state(&self, input: &str, state: MediaPlayback) {
        self.state.lock().unwrap().media.insert(input.to_string(), state);
    }

    /// Scene switches performed so far, in order.
    pub fn switches(&self) -> Vec<(String, Option<String>)> {
        self.state.lock().unwrap().switches.clone()
    }
}

impl Frontend for FakeFrontend {
    fn scene_names(&self) -> Vec<String> {
        self.state.lock().unwrap().scenes.clone()
    }

    fn current_scene(&self) -> Option<String> {
        self.state.lock().unwrap().current.clone()
    }

    fn switch_scene(&self, scene: &str, transition: Option<&str>) -> Result<(), FrontendError> {
        let mut st = self.state.lock().unwrap();
        if !st.scenes.iter().any(|s| s == scene) {
            return Err(FrontendError::SceneNotFound(scene.to_string()));
        }
        st.current = Some(scene.to_string());
        st.switches
            .push((scene.to_string(), transition.map(|t| t.to_string())));
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.state.lock().unwrap().recording
    }

    fn start_recording(&self) -> Result<(), FrontendError> {
        self.state.lock().unwrap().recording = true;
        Ok(())
    }

    fn stop_recording(&self) -> Result<(), FrontendError> {
        self.state.lock().unwrap().recording = false;
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        self.state.lock().unwrap().streaming
    }

    fn start_streaming(&self) -> Result<(), FrontendError> {
        self.state.lock().unwrap().streaming = true;
        Ok(())
    }

    fn stop_streaming(&self) -> Result<(), FrontendError> {
        self.state.lock().unwrap().streaming = false;
        Ok(())
    }

    fn input_muted(&self, input: &str) -> Option<bool> {
        self.state.lock().unwrap().muted.get(input).copied()
    }

    fn set_input_muted(&self, input: &str, muted: bool) -> Result<(), FrontendError> {
        self.state.lock().unwrap().muted.insert(input.to_string(), muted);
        Ok(())
    }

    fn input_volume_db(&self, input: &str) -> Option<f32> {
        self.state.lock().unwrap().volumes.get(input).copied()
    }

    fn media_state(&self, input: &str) -> Option<MediaPlayback> {
        self.state.lock().unwrap().media.get(input).copied()
    }
}
