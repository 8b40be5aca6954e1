//! V4L2 capture device using the v4l crate

use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use tracing::info;

use super::{CameraDriver, CameraError, Frame, PixelFormat};

/// mmap streaming capture from `/dev/videoN` in YUYV
pub struct V4l2Driver {
    index: u32,
    width: u32,
    height: u32,
    buffer_count: u32,
    stream: Option<Stream<'static>>,
    format: (u32, u32),
}

impl V4l2Driver {
    /// Prepare a driver for device `index`; nothing is opened until `start`
    pub fn new(index: u32, width: u32, height: u32) -> Self {
        Self {
            index,
            width,
            height,
            buffer_count: 4,
            stream: None,
            format: (width, height),
        }
    }
}

impl CameraDriver for V4l2Driver {
    fn start(&mut self) -> Result<(), CameraError> {
        let device = Device::new(self.index as usize)
            .map_err(|err| CameraError::Start(format!("open /dev/video{}: {err}", self.index)))?;

        let mut fmt = device
            .format()
            .map_err(|err| CameraError::Start(err.to_string()))?;
        fmt.width = self.width;
        fmt.height = self.height;
        fmt.fourcc = FourCC::new(b"YUYV");

        let fmt = device
            .set_format(&fmt)
            .map_err(|err| CameraError::Start(err.to_string()))?;
        if fmt.fourcc != FourCC::new(b"YUYV") {
            return Err(CameraError::Start(format!("device refused YUYV, got {}", fmt.fourcc)));
        }
        self.format = (fmt.width, fmt.height);

        let stream = Stream::with_buffers(&device, Type::VideoCapture, self.buffer_count)
            .map_err(|err| CameraError::Start(err.to_string()))?;
        self.stream = Some(stream);

        info!(
            index = self.index,
            width = fmt.width,
            height = fmt.height,
            "v4l2 stream opened"
        );
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CameraError> {
        // dropping the stream turns streaming off and unmaps the buffers
        self.stream = None;
        Ok(())
    }

    fn capture_array(&mut self) -> Result<Frame, CameraError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| CameraError::Capture("stream not started".to_string()))?;

        let (buf, meta) = stream
            .next()
            .map_err(|err| CameraError::Capture(err.to_string()))?;

        let used = (meta.bytesused as usize).min(buf.len());
        Ok(Frame {
            data: buf[..used].to_vec(),
            width: self.format.0,
            height: self.format.1,
            format: PixelFormat::Yuyv,
            sequence: u64::from(meta.sequence),
        })
    }
}
