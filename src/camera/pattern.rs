//! Synthetic capture device producing scrolling colour bars
//!
//! Used when no physical camera is configured so the rest of the terminal
//! can run end to end.

use std::thread;
use std::time::Duration;

use super::{CameraDriver, CameraError, Frame, PixelFormat};

/// 8 bars: white, yellow, cyan, green, magenta, red, blue, black
const BARS: [[u8; 3]; 8] = [
    [235, 235, 235],
    [235, 235, 16],
    [16, 235, 235],
    [16, 235, 16],
    [235, 16, 235],
    [235, 16, 16],
    [16, 16, 235],
    [16, 16, 16],
];

/// Generates RGB colour-bar frames at a fixed rate
pub struct TestPatternDriver {
    width: u32,
    height: u32,
    frame_interval: Duration,
    sequence: u64,
    streaming: bool,
}

impl TestPatternDriver {
    /// Create a generator for frames of the given size, paced at ~30 fps
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_interval: Duration::from_millis(33),
            sequence: 0,
            streaming: false,
        }
    }

    /// Override the pacing between frames
    #[cfg(test)]
    pub fn with_frame_interval(mut self, frame_interval: Duration) -> Self {
        self.frame_interval = frame_interval;
        self
    }
}

impl CameraDriver for TestPatternDriver {
    fn start(&mut self) -> Result<(), CameraError> {
        if self.width == 0 || self.height == 0 {
            return Err(CameraError::Start(format!(
                "invalid frame size {}x{}",
                self.width, self.height
            )));
        }
        self.streaming = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CameraError> {
        if !self.streaming {
            return Err(CameraError::Stop("stream not started".to_string()));
        }
        self.streaming = false;
        Ok(())
    }

    fn capture_array(&mut self) -> Result<Frame, CameraError> {
        if !self.streaming {
            return Err(CameraError::Capture("stream not started".to_string()));
        }

        thread::sleep(self.frame_interval);
        self.sequence += 1;

        Ok(Frame {
            data: color_bars(self.width, self.height, self.sequence),
            width: self.width,
            height: self.height,
            format: PixelFormat::Rgb24,
            sequence: self.sequence,
        })
    }
}

/// Colour bars shifted right by a few pixels every frame
fn color_bars(width: u32, height: u32, sequence: u64) -> Vec<u8> {
    let bar_width = (width / 8).max(1);
    let shift = (sequence % u64::from(width)) as u32;
    let mut data = Vec::with_capacity((width * height * 3) as usize);

    for _ in 0..height {
        for x in 0..width {
            let bar = (((x + shift) % width) / bar_width).min(7) as usize;
            data.extend_from_slice(&BARS[bar]);
        }
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_requires_start() {
        let mut driver = TestPatternDriver::new(16, 8).with_frame_interval(Duration::ZERO);
        assert!(driver.capture_array().is_err());

        driver.start().unwrap();
        let frame = driver.capture_array().unwrap();
        assert_eq!(frame.sequence, 1);
        assert_eq!(frame.data.len(), 16 * 8 * 3);
        assert_eq!(frame.format, PixelFormat::Rgb24);

        driver.stop().unwrap();
        assert!(driver.capture_array().is_err());
        assert!(matches!(driver.stop(), Err(CameraError::Stop(_))));
    }

    #[test]
    fn test_first_bar_is_white() {
        let data = color_bars(64, 2, 0);
        assert_eq!(&data[0..3], &[235, 235, 235]);
    }

    #[test]
    fn test_bars_scroll() {
        assert_ne!(color_bars(64, 1, 0), color_bars(64, 1, 4));
    }

    #[test]
    fn test_zero_size_fails_to_start() {
        let mut driver = TestPatternDriver::new(0, 480);
        assert!(matches!(driver.start(), Err(CameraError::Start(_))));
    }
}
