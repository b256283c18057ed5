//! autoscene
//!
//! Automatic scene switching for OBS Studio.
//! Connects via WebSocket, evaluates switching rules and macros on a
//! polling thread and applies the resulting scene changes.

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

use autoscene::config::Config;
use autoscene::engine::{Switcher, SwitcherOptions};
use autoscene::frontend::obs::ObsFrontend;
use autoscene::persist::SettingsFile;
use autoscene::probe::SysinfoProbe;

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = autoscene::logging::init_logging()?;

    info!("autoscene starting...");

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    // Load configuration
    let config = Config::load()?;

    // Connect to OBS (must be running with the WebSocket server enabled)
    let frontend = match ObsFrontend::connect(&config.obs).await {
        Ok(frontend) => Arc::new(frontend),
        Err(e) => {
            error!("Failed to connect to OBS: {}", e);
            error!("Make sure OBS is running and WebSocket server is enabled.");
            std::process::exit(1);
        }
    };

    // Construction queries the current scene, which blocks on the
    // runtime handle and therefore must happen off the runtime threads.
    let switcher = {
        let frontend = frontend.clone();
        let options = SwitcherOptions {
            interval_ms: config.engine.interval_ms,
            status_path: config.engine.status_path.clone(),
        };
        tokio::task::spawn_blocking(move || {
            Arc::new(Switcher::new(frontend, Arc::new(SysinfoProbe::new()), options))
        })
        .await?
    };

    // Forward frontend events (scene changes, disconnects) to the engine
    let mut events = frontend.subscribe_events()?;
    let event_switcher = switcher.clone();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            event_switcher.handle_event(event);
        }
    });

    // Load the persisted rules, macros and queues
    let settings_file = SettingsFile::new(config.settings_path()?);
    match settings_file.load() {
        Ok(Some(doc)) => {
            let warnings = switcher.load_settings(&doc)?;
            for w in &warnings {
                warn!("settings: {}", w);
            }
            info!("Settings loaded from {:?}", settings_file.path());
        }
        Ok(None) => {
            info!("No settings document yet at {:?}", settings_file.path());
        }
        Err(e) => {
            error!("Failed to load settings: {}", e);
            std::process::exit(1);
        }
    }

    switcher.start()?;
    for w in switcher.warnings() {
        warn!("startup: {}", w);
    }

    // Block until Ctrl-C, then shut the engine down cleanly
    let (shutdown_tx, shutdown_rx) = std::sync::mpsc::channel::<()>();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })?;
    let _ = tokio::task::spawn_blocking(move || shutdown_rx.recv()).await?;

    info!("autoscene shutting down");
    let stopping = switcher.clone();
    tokio::task::spawn_blocking(move || stopping.stop()).await?;

    // Persist anything actions changed at runtime (variables, counters)
    if let Err(e) = settings_file.save(&switcher.save_settings()) {
        warn!("Failed to save settings: {}", e);
    }

    Ok(())
}

fn print_help() {
    println!("autoscene - Automatic scene switching for OBS Studio");
    println!();
    println!("USAGE:");
    println!("    autoscene [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help            Print this help message");
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG              Set log level (e.g., debug, info, warn)");
    println!("    AUTOSCENE_LOG_PATH    Override the log directory");
    println!();
    println!("Configuration lives in the platform config directory, e.g.");
    println!("~/.config/autoscene/config.toml on Linux.");
}
