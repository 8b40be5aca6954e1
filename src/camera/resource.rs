//! Start/stop lifecycle of the shared camera

use std::time::Duration;

use tracing::{debug, info, warn};

use super::{CameraDriver, CameraError, Frame};
use crate::session::ScanKind;

/// The single shared capture device.
///
/// `acquire` and `release` are idempotent. No locking happens here: whoever
/// holds the value is the only one who can touch the device.
pub struct CameraResource {
    driver: Box<dyn CameraDriver>,
    warmup: Duration,
    /// Set while the device is streaming
    owner: Option<ScanKind>,
}

impl CameraResource {
    /// Wrap a driver with a fixed warm-up delay applied after every start
    pub fn new(driver: Box<dyn CameraDriver>, warmup: Duration) -> Self {
        Self {
            driver,
            warmup,
            owner: None,
        }
    }

    /// Whether the device is currently streaming
    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.owner.is_some()
    }

    /// The session kind the device was acquired for
    #[cfg(test)]
    pub fn owner(&self) -> Option<ScanKind> {
        self.owner
    }

    /// Start the device for `owner` and wait out the warm-up delay
    pub async fn acquire(&mut self, owner: ScanKind) -> Result<(), CameraError> {
        match self.owner {
            Some(current) if current == owner => {
                debug!(%owner, "camera already acquired");
                return Ok(());
            }
            Some(current) => return Err(CameraError::Busy(current)),
            None => {}
        }

        self.driver.start()?;
        self.owner = Some(owner);
        info!(
            %owner,
            warmup_ms = self.warmup.as_millis() as u64,
            "camera started, warming up"
        );

        tokio::time::sleep(self.warmup).await;
        Ok(())
    }

    /// Stop the device if it is running
    pub fn release(&mut self) -> Result<(), CameraError> {
        let Some(owner) = self.owner.take() else {
            debug!("camera already released");
            return Ok(());
        };

        self.driver.stop()?;
        info!(%owner, "camera released");
        Ok(())
    }

    /// Capture the current frame
    pub fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        if self.owner.is_none() {
            return Err(CameraError::NotAcquired);
        }
        self.driver.capture_array()
    }
}

impl Drop for CameraResource {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.take() {
            if let Err(e) = self.driver.stop() {
                warn!(%owner, ?e, "failed to stop camera on drop");
            }
        }
    }
}
