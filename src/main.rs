//! leo-terminal: voice-controlled field terminal
//!
//! Arbitrates one camera between a face scan and a license plate scan:
//! - Voice commands acquired under a bounded listening window
//! - Scan-mode state machine with stop-before-start camera hand-over
//! - Per-frame recognition sessions that end themselves on a match
//! - Status socket for operator tools
//!
//! Feature extraction, storage and presentation live outside this process.

mod analysis;
mod arbiter;
mod camera;
mod command;
mod config;
mod events;
mod ipc;
mod lifecycle;
mod output;
mod session;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::analysis::{CatalogAnalyzers, PersonCatalog, VehicleCatalog};
use crate::arbiter::{ArbiterExit, ArbiterSettings, ModeArbiter};
use crate::camera::{CameraDriver, CameraResource, TestPatternDriver};
use crate::command::{CommandSource, ConsoleRecognizer, ProcessRecognizer, SpeechRecognizer};
use crate::config::Config;
use crate::events::TerminalEvent;
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::output::{LogSink, OutputSink, TtsSink};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "leo-terminal starting");

    let config = Config::load().context("failed to load configuration")?;
    config.ensure_dirs()?;
    info!(?config.socket_path, ?config.data_dir, "configuration loaded");

    let shutdown = ShutdownSignal::new();

    // Arbiter -> status server and subscribers
    let (event_tx, _event_rx) = broadcast::channel::<TerminalEvent>(64);

    let persons = PersonCatalog::load(&config.persons_catalog)
        .context("failed to load persons catalog")?;
    let vehicles = VehicleCatalog::load(&config.vehicles_catalog)
        .context("failed to load vehicles catalog")?;
    info!(persons = persons.len(), vehicles = vehicles.len(), "catalogs loaded");
    if persons.is_empty() {
        warn!(path = ?config.persons_catalog, "no known persons, face scans cannot match");
    }
    if vehicles.is_empty() {
        warn!(path = ?config.vehicles_catalog, "no known vehicles, plate scans cannot match");
    }

    let analyzers = CatalogAnalyzers::new(
        persons,
        vehicles,
        config.face_sidecar.clone(),
        config.plate_sidecar.clone(),
        config.face_tolerance,
    );

    let camera = CameraResource::new(camera_driver(&config), config.camera_warmup);
    let commands = CommandSource::new(speech_recognizer(&config)?);

    let mut arbiter = ModeArbiter::new(
        commands,
        camera,
        Arc::new(analyzers),
        output_sink(&config),
        event_tx.clone(),
        ArbiterSettings {
            listen_timeout: config.listen_timeout,
            analyzer_failure_limit: config.analyzer_failure_limit,
        },
    );

    let server = Server::new(&config.socket_path, event_tx.clone())?;

    info!("terminal initialized, entering main loop");

    tokio::select! {
        exit = arbiter.run(shutdown.wait()) => match exit {
            ArbiterExit::StopCommand => info!("stop command heard, arbiter exited"),
            ArbiterExit::Interrupted => info!("shutdown signal received, arbiter exited"),
        },

        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "status server error");
            }
        }
    }

    // Cleanup
    info!("shutting down...");

    arbiter.shutdown().await;
    server.shutdown().await;

    info!(stats = ?arbiter.stats(), "leo-terminal stopped");

    Ok(())
}

fn camera_driver(config: &Config) -> Box<dyn CameraDriver> {
    match config.camera_device {
        #[cfg(feature = "v4l2")]
        Some(index) => {
            info!(index, "using V4L2 camera");
            Box::new(camera::V4l2Driver::new(
                index,
                config.frame_width,
                config.frame_height,
            ))
        }
        #[cfg(not(feature = "v4l2"))]
        Some(index) => {
            warn!(index, "built without v4l2 support, using test pattern");
            Box::new(TestPatternDriver::new(config.frame_width, config.frame_height))
        }
        None => {
            info!("no camera device configured, using test pattern");
            Box::new(TestPatternDriver::new(config.frame_width, config.frame_height))
        }
    }
}

fn speech_recognizer(config: &Config) -> Result<Arc<dyn SpeechRecognizer>> {
    if let Some(command_line) = config.speech_command.as_deref() {
        if let Some(recognizer) = ProcessRecognizer::new(command_line) {
            info!(%command_line, "using external speech recognizer");
            return Ok(Arc::new(recognizer));
        }
    }

    info!("no speech command configured, reading commands from stdin");
    let recognizer =
        ConsoleRecognizer::spawn(config.phrase_window).context("failed to start console reader")?;
    Ok(Arc::new(recognizer))
}

fn output_sink(config: &Config) -> Arc<dyn OutputSink> {
    let Some(command_line) = config.tts_command.as_deref() else {
        return Arc::new(LogSink);
    };

    match TtsSink::spawn(command_line) {
        Ok(sink) => {
            info!(%command_line, "narrating through tts command");
            Arc::new(sink)
        }
        Err(e) => {
            warn!(?e, "failed to start tts worker, narrating to log");
            Arc::new(LogSink)
        }
    }
}
