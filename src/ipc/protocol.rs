//! Status socket message protocol
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::arbiter::ScanMode;
use crate::events::TerminalEvent;
use crate::session::MatchResult;

/// Requests from a client to the terminal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request the current status snapshot
    GetStatus,

    /// Ping to check connectivity
    Ping,

    /// Receive every terminal event from now on
    Subscribe,
}

/// Responses from the terminal to a client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current terminal status
    Status(TerminalStatus),

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Pushed to subscribed clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Event { event: TerminalEvent },
}

/// Status snapshot kept up to date from terminal events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalStatus {
    /// Terminal version
    pub version: String,

    /// Current scan mode
    pub mode: ScanMode,

    /// Uptime in seconds
    pub uptime_secs: u64,

    /// Scans that got the camera since startup
    pub scans_started: u64,

    /// Matches reported since startup
    pub matches: u64,

    /// Most recent match, if any
    #[serde(default)]
    pub last_match: Option<MatchResult>,

    /// Set once the terminal has begun shutting down
    pub shutting_down: bool,
}

impl Default for TerminalStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            mode: ScanMode::default(),
            uptime_secs: 0,
            scans_started: 0,
            matches: 0,
            last_match: None,
            shutting_down: false,
        }
    }
}

impl TerminalStatus {
    /// Fold one event into the snapshot
    pub fn apply(&mut self, event: &TerminalEvent) {
        match event {
            TerminalEvent::ScanStarted { kind } => {
                self.mode = (*kind).into();
                self.scans_started += 1;
            }
            TerminalEvent::ScanEnded { .. } => self.mode = ScanMode::Idle,
            TerminalEvent::MatchFound { result, .. } => {
                self.matches += 1;
                self.last_match = Some(result.clone());
            }
            TerminalEvent::ShuttingDown => {
                self.mode = ScanMode::Idle;
                self.shutting_down = true;
            }
            TerminalEvent::ScanStartFailed { .. } | TerminalEvent::SpeechError => {}
        }
    }
}
