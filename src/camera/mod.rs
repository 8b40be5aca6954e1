//! Shared capture device
//!
//! One `CameraResource` wraps the single physical camera. Recognition
//! sessions take it by value while they run and hand it back when they end,
//! so there is never more than one owner.

mod pattern;
mod resource;
#[cfg(feature = "v4l2")]
mod v4l2;

use serde::{Deserialize, Serialize};

use crate::session::ScanKind;

pub use pattern::TestPatternDriver;
pub use resource::CameraResource;
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Driver;

/// Pixel layout of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// Packed 24-bit RGB
    Rgb24,
    /// YUYV 4:2:2, two bytes per pixel
    Yuyv,
}

/// A captured video frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel data
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel layout of `data`
    pub format: PixelFormat,
    /// Sequence number since the driver was created
    pub sequence: u64,
}

/// Low-level capture device
pub trait CameraDriver: Send {
    /// Start streaming
    fn start(&mut self) -> Result<(), CameraError>;

    /// Stop streaming
    fn stop(&mut self) -> Result<(), CameraError>;

    /// Grab the current frame
    fn capture_array(&mut self) -> Result<Frame, CameraError>;
}

/// Errors from the capture device
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("failed to start camera: {0}")]
    Start(String),

    #[error("failed to stop camera: {0}")]
    Stop(String),

    #[error("frame capture failed: {0}")]
    Capture(String),

    #[error("camera is not acquired")]
    NotAcquired,

    #[error("camera is held by the {0}")]
    Busy(ScanKind),
}
