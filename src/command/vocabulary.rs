//! Command vocabulary and utterance normalization
//!
//! Maps a recognized phrase onto the small fixed set of commands the
//! terminal understands.

use serde::{Deserialize, Serialize};

/// One acquired voice command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Start face scanning
    Scan,
    /// Stop face scanning
    StopScan,
    /// Start license plate scanning
    License,
    /// Stop license plate scanning
    StopLicense,
    /// Shut the terminal down
    Stop,
    /// Speech was understood but is not part of the vocabulary
    Unknown,
    /// Nothing intelligible was heard before the listening window closed
    NoInput,
    /// The speech backend failed
    Error,
}

impl Command {
    /// Parse a recognized utterance into a command.
    ///
    /// Matching is case-insensitive and ignores punctuation and repeated
    /// whitespace, so "stop  scan." parses the same as "STOP SCAN".
    pub fn parse(utterance: &str) -> Self {
        match normalize(utterance).as_str() {
            "SCAN" => Command::Scan,
            "STOP SCAN" => Command::StopScan,
            "LICENSE" | "LICENCE" => Command::License,
            "STOP LICENSE" | "STOP LICENCE" => Command::StopLicense,
            "STOP" | "QUIT" => Command::Stop,
            "" => Command::NoInput,
            _ => Command::Unknown,
        }
    }

    /// Whether this command carries an actual request for the arbiter
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Command::Unknown | Command::NoInput | Command::Error)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Scan => write!(f, "SCAN"),
            Command::StopScan => write!(f, "STOP SCAN"),
            Command::License => write!(f, "LICENSE"),
            Command::StopLicense => write!(f, "STOP LICENSE"),
            Command::Stop => write!(f, "STOP"),
            Command::Unknown => write!(f, "UNKNOWN"),
            Command::NoInput => write!(f, "NO_INPUT"),
            Command::Error => write!(f, "ERROR"),
        }
    }
}

/// Uppercase, strip punctuation and collapse whitespace
fn normalize(utterance: &str) -> String {
    utterance
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .map(str::to_uppercase)
        .collect::<Vec<_>>()
        .join(" ")
}
