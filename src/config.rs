//! Configuration loading and management
//!
//! Everything comes from `LEO_*` environment variables with defaults under
//! `$HOME/.local/share/leo-terminal`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Terminal configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Path to the Unix domain socket for status queries
    pub socket_path: PathBuf,

    /// Listening window for each command request
    pub listen_timeout: Duration,

    /// How long a typed phrase is waited for in console mode
    pub phrase_window: Duration,

    /// Delay after starting the camera before frames are trusted
    pub camera_warmup: Duration,

    /// V4L2 device index; `None` selects the synthetic test pattern
    pub camera_device: Option<u32>,

    pub frame_width: u32,
    pub frame_height: u32,

    /// Consecutive analyzer failures a session tolerates
    pub analyzer_failure_limit: u32,

    /// Largest embedding distance still counted as a face match
    pub face_tolerance: f32,

    pub persons_catalog: PathBuf,
    pub vehicles_catalog: PathBuf,

    /// Extractor command lines
    pub face_sidecar: Option<String>,
    pub plate_sidecar: Option<String>,

    /// External speech-to-text command; console input when unset
    pub speech_command: Option<String>,

    /// External text-to-speech command; log narration when unset
    pub tts_command: Option<String>,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let data_dir = match var("LEO_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = var("HOME").context("HOME is not set and LEO_DATA_DIR is missing")?;
                PathBuf::from(home)
                    .join(".local")
                    .join("share")
                    .join("leo-terminal")
            }
        };

        let path_or = |key: &str, file: &str| {
            var(key).map_or_else(|| data_dir.join(file), PathBuf::from)
        };

        let config = Self {
            socket_path: path_or("LEO_SOCKET_PATH", "terminal.sock"),
            listen_timeout: Duration::from_millis(parse_or(&var, "LEO_LISTEN_TIMEOUT_MS", 10_000)?),
            phrase_window: Duration::from_millis(parse_or(&var, "LEO_PHRASE_WINDOW_MS", 5_000)?),
            camera_warmup: Duration::from_millis(parse_or(&var, "LEO_CAMERA_WARMUP_MS", 2_000)?),
            camera_device: var("LEO_CAMERA_DEVICE")
                .map(|value| parse("LEO_CAMERA_DEVICE", &value))
                .transpose()?,
            frame_width: parse_or(&var, "LEO_FRAME_WIDTH", 640)?,
            frame_height: parse_or(&var, "LEO_FRAME_HEIGHT", 480)?,
            analyzer_failure_limit: parse_or(&var, "LEO_ANALYZER_FAILURE_LIMIT", 5)?,
            face_tolerance: parse_or(&var, "LEO_FACE_TOLERANCE", 0.6)?,
            persons_catalog: path_or("LEO_PERSONS_CATALOG", "persons.json"),
            vehicles_catalog: path_or("LEO_VEHICLES_CATALOG", "vehicles.json"),
            face_sidecar: var("LEO_FACE_SIDECAR"),
            plate_sidecar: var("LEO_PLATE_SIDECAR"),
            speech_command: var("LEO_SPEECH_COMMAND"),
            tts_command: var("LEO_TTS_COMMAND"),
            data_dir,
        };

        anyhow::ensure!(
            !config.listen_timeout.is_zero(),
            "LEO_LISTEN_TIMEOUT_MS must be greater than zero"
        );
        // console reads must end before their listen does
        anyhow::ensure!(
            config.phrase_window < config.listen_timeout,
            "LEO_PHRASE_WINDOW_MS ({} ms) must be shorter than LEO_LISTEN_TIMEOUT_MS ({} ms)",
            config.phrase_window.as_millis(),
            config.listen_timeout.as_millis()
        );

        Ok(config)
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid value {value:?} for {key}"))
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(key).map_or(Ok(default), |value| parse(key, &value))
}
