//! OBS frontend boundary
//!
//! The engine reaches OBS exclusively through the [`Frontend`] trait:
//! scene lookup/switch, recording and streaming control, and audio/media
//! queries. The production implementation talks to OBS Studio over the
//! WebSocket API ([`obs::ObsFrontend`]); tests plug in
//! [`testing::FakeFrontend`].

pub mod obs;
pub mod testing;

use thiserror::Error;

/// Playback state of a media input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaPlayback {
    None,
    Playing,
    Paused,
    Stopped,
    Ended,
    Opening,
    Buffering,
    Error,
}

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("scene '{0}' not found")]
    SceneNotFound(String),
    #[error("not connected to OBS")]
    NotConnected,
    #[error("OBS request failed: {0}")]
    Request(String),
}

/// Narrow interface over the OBS frontend.
///
/// All scene references cross this boundary by name; implementations must
/// treat a name that no longer resolves as [`FrontendError::SceneNotFound`]
/// rather than guessing.
pub trait Frontend: Send + Sync {
    fn scene_names(&self) -> Vec<String>;
    fn current_scene(&self) -> Option<String>;
    /// Switch the program scene, optionally setting the transition first.
    fn switch_scene(&self, scene: &str, transition: Option<&str>) -> Result<(), FrontendError>;

    fn is_recording(&self) -> bool;
    fn start_recording(&self) -> Result<(), FrontendError>;
    fn stop_recording(&self) -> Result<(), FrontendError>;

    fn is_streaming(&self) -> bool;
    fn start_streaming(&self) -> Result<(), FrontendError>;
    fn stop_streaming(&self) -> Result<(), FrontendError>;

    /// Mute state of an audio input; `None` if the input is unknown.
    fn input_muted(&self, input: &str) -> Option<bool>;
    fn set_input_muted(&self, input: &str, muted: bool) -> Result<(), FrontendError>;
    /// Input volume in dB; `None` if the input is unknown.
    fn input_volume_db(&self, input: &str) -> Option<f32>;

    /// Playback state of a media input; `None` if the input is unknown.
    fn media_state(&self, input: &str) -> Option<MediaPlayback>;
}

/// Events the frontend pushes back into the engine.
#[derive(Debug, Clone)]
pub enum FrontendEvent {
    /// The program scene changed (manually or through us).
    SceneChanged { scene: String },
    RecordingStarted,
    RecordingStopped,
    StreamingStarted,
    StreamingStopped,
    /// The WebSocket connection dropped.
    Disconnected,
}
