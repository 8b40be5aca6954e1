//! Scan mode: which recognition task, if any, owns the camera

use serde::{Deserialize, Serialize};

use crate::session::ScanKind;

/// The three modes of the terminal while it is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// No scan active, camera released
    Idle,
    /// Face scan owns the camera
    FaceScanning,
    /// Plate scan owns the camera
    PlateScanning,
}

impl ScanMode {
    /// The session kind running in this mode
    pub fn kind(&self) -> Option<ScanKind> {
        match self {
            ScanMode::Idle => None,
            ScanMode::FaceScanning => Some(ScanKind::Face),
            ScanMode::PlateScanning => Some(ScanKind::Plate),
        }
    }
}

impl Default for ScanMode {
    fn default() -> Self {
        Self::Idle
    }
}

impl From<ScanKind> for ScanMode {
    fn from(kind: ScanKind) -> Self {
        match kind {
            ScanKind::Face => ScanMode::FaceScanning,
            ScanKind::Plate => ScanMode::PlateScanning,
        }
    }
}

impl std::fmt::Display for ScanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanMode::Idle => write!(f, "Idle"),
            ScanMode::FaceScanning => write!(f, "FaceScanning"),
            ScanMode::PlateScanning => write!(f, "PlateScanning"),
        }
    }
}
