//! Recognition sessions
//!
//! A session runs one per-frame recognition loop over the camera it was
//! handed, until it finds a match, is asked to stop, or fails.

mod runner;

use serde::{Deserialize, Serialize};

use crate::analysis::Record;
use crate::camera::{CameraError, Frame};

pub use runner::{RecognitionSession, SessionHandle, SessionReport};

/// Which recognition task a session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanKind {
    /// Match faces against the known-persons catalog
    Face,
    /// Read license plates against the known-vehicles catalog
    Plate,
}

impl ScanKind {
    /// Capitalized name used in narration
    pub fn label(&self) -> &'static str {
        match self {
            ScanKind::Face => "Face scan",
            ScanKind::Plate => "License plate scan",
        }
    }
}

impl std::fmt::Display for ScanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanKind::Face => write!(f, "face scan"),
            ScanKind::Plate => write!(f, "plate scan"),
        }
    }
}

/// What the analyzer saw that led to a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Evidence {
    /// Embedding distance to the closest known face
    FaceDistance { distance: f32 },
    /// Normalized plate text
    PlateText { text: String },
}

/// A frame correlated with a known catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Catalog identifier of the matched subject
    pub subject_id: String,
    /// The catalog record for the subject
    pub record: Record,
    /// Why the analyzer considers this a match
    pub evidence: Evidence,
}

/// Per-frame analysis capability injected into a session
pub trait Analyzer: Send {
    /// Look at one frame; `Ok(None)` means nothing known was found
    fn analyze(&mut self, frame: &Frame) -> Result<Option<MatchResult>, AnalyzerError>;
}

/// Builds a fresh analyzer for each session
pub trait AnalyzerFactory: Send + Sync {
    fn create(&self, kind: ScanKind) -> Result<Box<dyn Analyzer>, AnalyzerError>;
}

/// Errors from the analysis layer
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("feature extraction failed: {0}")]
    Extraction(String),

    #[error("no extractor configured for {0}")]
    NotConfigured(ScanKind),

    #[error("sidecar I/O failed: {0}")]
    Sidecar(#[from] std::io::Error),

    #[error("sidecar protocol error: {0}")]
    Protocol(String),

    #[error("analyzer panicked: {0}")]
    Panicked(String),
}

/// Why a session gave up
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("capture failed: {0}")]
    Capture(#[from] CameraError),

    #[error("{consecutive} consecutive analyzer failures, last: {last}")]
    Analyzer {
        consecutive: u32,
        last: AnalyzerError,
    },
}

/// How a session ended
#[derive(Debug)]
pub enum SessionTerminal {
    /// The analyzer found a known subject
    Matched(MatchResult),
    /// The stop flag was raised
    Stopped,
    /// Capture or analysis failed for good
    Failed(SessionError),
}

impl SessionTerminal {
    /// The match, if the session ended with one
    #[cfg(test)]
    pub fn matched(&self) -> Option<&MatchResult> {
        match self {
            SessionTerminal::Matched(result) => Some(result),
            _ => None,
        }
    }
}
