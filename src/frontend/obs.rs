//! OBS WebSocket frontend implementation
//!
//! Wraps an `obws` client behind the synchronous [`Frontend`] trait. The
//! engine and queue workers run on dedicated OS threads, so trait calls
//! block on the shared tokio runtime handle; none of these methods may be
//! called from inside the runtime itself.

use anyhow::{Context, Result};
use futures::StreamExt;
use obws::events::{Event, OutputState};
use obws::Client;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{Frontend, FrontendError, FrontendEvent, MediaPlayback};
use crate::config::ObsConfig;

/// OBS Studio frontend reached over the WebSocket API.
pub struct ObsFrontend {
    client: Arc<Client>,
    handle: Handle,
}

impl ObsFrontend {
    /// Connect to the OBS WebSocket server described by the config.
    pub async fn connect(config: &ObsConfig) -> Result<Self> {
        let client = Client::connect(
            config.host.clone(),
            config.port,
            config.password.clone(),
        )
        .await
        .context("Failed to connect to OBS WebSocket")?;

        info!("Connected to OBS WebSocket at {}:{}", config.host, config.port);

        Ok(Self {
            client: Arc::new(client),
            handle: Handle::current(),
        })
    }

    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.handle.block_on(fut)
    }

    /// Subscribe to OBS events and forward the ones the engine reacts to.
    ///
    /// Spawns a background task; the returned receiver yields scene and
    /// output state changes until the connection drops.
    pub fn subscribe_events(&self) -> Result<mpsc::UnboundedReceiver<FrontendEvent>> {
        let raw_events = self
            .client
            .events()
            .context("Failed to subscribe to OBS events")?;

        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            tokio::pin!(raw_events);

            while let Some(event) = raw_events.next().await {
                let forwarded = match event {
                    Event::CurrentProgramSceneChanged { id } => Some(FrontendEvent::SceneChanged {
                        scene: id.name,
                    }),
                    Event::RecordStateChanged { active, state, .. } => match state {
                        OutputState::Started if active => Some(FrontendEvent::RecordingStarted),
                        OutputState::Stopped if !active => Some(FrontendEvent::RecordingStopped),
                        _ => None,
                    },
                    Event::StreamStateChanged { active, state } => match state {
                        OutputState::Started if active => Some(FrontendEvent::StreamingStarted),
                        OutputState::Stopped if !active => Some(FrontendEvent::StreamingStopped),
                        _ => None,
                    },
                    _ => None,
                };

                if let Some(e) = forwarded {
                    if tx.send(e).is_err() {
                        // Receiver dropped, exit task
                        break;
                    }
                }
            }

            debug!("OBS event stream ended");
            let _ = tx.send(FrontendEvent::Disconnected);
        });

        Ok(rx)
    }
}

fn request_err(err: obws::error::Error) -> FrontendError {
    FrontendError::Request(err.to_string())
}

impl Frontend for ObsFrontend {
    fn scene_names(&self) -> Vec<String> {
        match self.block_on(self.client.scenes().list()) {
            Ok(list) => list.scenes.into_iter().map(|s| s.id.name).collect(),
            Err(e) => {
                warn!("Failed to list scenes: {}", e);
                Vec::new()
            }
        }
    }

    fn current_scene(&self) -> Option<String> {
        match self.block_on(self.client.scenes().current_program_scene()) {
            Ok(scene) => Some(scene.id.name),
            Err(e) => {
                warn!("Failed to query current scene: {}", e);
                None
            }
        }
    }

    fn switch_scene(&self, scene: &str, transition: Option<&str>) -> Result<(), FrontendError> {
        self.block_on(async {
            if let Some(transition) = transition {
                if let Err(e) = self.client.transitions().set_current(transition).await {
                    warn!("Failed to set transition '{}': {}", transition, e);
                }
            }
            self.client
                .scenes()
                .set_current_program_scene(scene)
                .await
                .map_err(request_err)
        })
    }

    fn is_recording(&self) -> bool {
        self.block_on(self.client.recording().status())
            .map(|s| s.active)
            .unwrap_or(false)
    }

    fn start_recording(&self) -> Result<(), FrontendError> {
        self.block_on(self.client.recording().start())
            .map_err(request_err)
    }

    fn stop_recording(&self) -> Result<(), FrontendError> {
        self.block_on(self.client.recording().stop())
            .map(|_| ())
            .map_err(request_err)
    }

    fn is_streaming(&self) -> bool {
        self.block_on(self.client.streaming().status())
            .map(|s| s.active)
            .unwrap_or(false)
    }

    fn start_streaming(&self) -> Result<(), FrontendError> {
        self.block_on(self.client.streaming().start())
            .map_err(request_err)
    }

    fn stop_streaming(&self) -> Result<(), FrontendError> {
        self.block_on(self.client.streaming().stop())
            .map_err(request_err)
    }

    fn input_muted(&self, input: &str) -> Option<bool> {
        self.block_on(self.client.inputs().muted(input.into())).ok()
    }

    fn set_input_muted(&self, input: &str, muted: bool) -> Result<(), FrontendError> {
        self.block_on(self.client.inputs().set_muted(input.into(), muted))
            .map_err(request_err)
    }

    fn input_volume_db(&self, input: &str) -> Option<f32> {
        self.block_on(self.client.inputs().volume(input.into()))
            .map(|v| v.db)
            .ok()
    }

    fn media_state(&self, input: &str) -> Option<MediaPlayback> {
        use obws::responses::media_inputs::MediaState;

        let status = self
            .block_on(self.client.media_inputs().status(input.into()))
            .ok()?;

        Some(match status.state {
            MediaState::None => MediaPlayback::None,
            MediaState::Playing => MediaPlayback::Playing,
            MediaState::Opening => MediaPlayback::Opening,
            MediaState::Buffering => MediaPlayback::Buffering,
            MediaState::Paused => MediaPlayback::Paused,
            MediaState::Stopped => MediaPlayback::Stopped,
            MediaState::Ended => MediaPlayback::Ended,
            MediaState::Error => MediaPlayback::Error,
            _ => MediaPlayback::None,
        })
    }
}
