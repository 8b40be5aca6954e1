//! Events emitted by the arbiter
//!
//! Broadcast to the status server, which forwards them to subscribed
//! clients such as a result viewer on the operator's desk.

use serde::{Deserialize, Serialize};

use crate::session::{MatchResult, ScanKind};

/// Why a scan ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanEndReason {
    /// Stopped by its own stop command
    Requested,
    /// Stopped because the other scan was requested
    Preempted,
    /// Ended itself after finding a match
    Matched,
    /// Capture or analysis failed
    Failed,
    /// Stopped because the terminal is shutting down
    Shutdown,
}

impl std::fmt::Display for ScanEndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanEndReason::Requested => write!(f, "requested"),
            ScanEndReason::Preempted => write!(f, "preempted"),
            ScanEndReason::Matched => write!(f, "matched"),
            ScanEndReason::Failed => write!(f, "failed"),
            ScanEndReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Events emitted by the arbiter during transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TerminalEvent {
    /// A scan took the camera
    ScanStarted { kind: ScanKind },

    /// A scan could not start; the terminal stays idle
    ScanStartFailed { kind: ScanKind, error: String },

    /// A scan gave the camera back
    ScanEnded {
        kind: ScanKind,
        reason: ScanEndReason,
        /// Frames captured during the scan
        frames: u64,
        /// How long the scan was active
        duration_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// A scan matched a known subject
    MatchFound { kind: ScanKind, result: MatchResult },

    /// The speech backend failed
    SpeechError,

    /// The terminal is stopping
    ShuttingDown,
}

impl std::fmt::Display for TerminalEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalEvent::ScanStarted { kind } => write!(f, "SCAN_STARTED ({kind})"),
            TerminalEvent::ScanStartFailed { kind, error } => {
                write!(f, "SCAN_START_FAILED ({kind}: {error})")
            }
            TerminalEvent::ScanEnded {
                kind,
                reason,
                duration_ms,
                ..
            } => write!(f, "SCAN_ENDED ({kind}, {reason}, {duration_ms}ms)"),
            TerminalEvent::MatchFound { kind, result } => {
                write!(f, "MATCH_FOUND ({kind}: {})", result.subject_id)
            }
            TerminalEvent::SpeechError => write!(f, "SPEECH_ERROR"),
            TerminalEvent::ShuttingDown => write!(f, "SHUTTING_DOWN"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = TerminalEvent::ScanEnded {
            kind: ScanKind::Plate,
            reason: ScanEndReason::Preempted,
            frames: 42,
            duration_ms: 1500,
            error: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"scan_ended""#));
        assert!(json.contains(r#""kind":"plate""#));
        assert!(json.contains(r#""reason":"preempted""#));
        assert!(!json.contains("error"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"scan_started","kind":"face"}"#;
        let event: TerminalEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(
            event,
            TerminalEvent::ScanStarted {
                kind: ScanKind::Face
            }
        ));
    }

    #[test]
    fn test_display() {
        let event = TerminalEvent::ScanStartFailed {
            kind: ScanKind::Face,
            error: "no camera".to_string(),
        };
        assert_eq!(event.to_string(), "SCAN_START_FAILED (face scan: no camera)");
    }
}
