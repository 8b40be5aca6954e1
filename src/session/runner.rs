//! The per-frame recognition loop
//!
//! Runs on a blocking thread. The arbiter raises the stop flag and then
//! joins the task, which hands the camera back once the current
//! capture/analyze pair has finished.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use super::{Analyzer, AnalyzerError, MatchResult, ScanKind, SessionError, SessionTerminal};
use crate::camera::{CameraResource, Frame};

/// One run of a recognition loop, from activation to its terminal state
pub struct RecognitionSession {
    kind: ScanKind,
    camera: CameraResource,
    analyzer: Box<dyn Analyzer>,
    stop: Arc<AtomicBool>,
    failure_limit: u32,
}

/// Everything a finished session hands back
pub struct SessionReport {
    pub terminal: SessionTerminal,
    /// Frames captured during the session
    pub frames: u64,
    /// The camera, still acquired; the arbiter releases it
    pub camera: CameraResource,
}

impl RecognitionSession {
    /// Create a session over an already acquired camera.
    ///
    /// `failure_limit` is the number of consecutive analyzer failures that
    /// are tolerated; one more ends the session.
    pub fn new(
        kind: ScanKind,
        camera: CameraResource,
        analyzer: Box<dyn Analyzer>,
        failure_limit: u32,
    ) -> Self {
        Self {
            kind,
            camera,
            analyzer,
            stop: Arc::new(AtomicBool::new(false)),
            failure_limit,
        }
    }

    /// Flag that ends the loop after the frame in progress
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Run the loop on the current thread until it reaches a terminal state
    pub fn run(mut self) -> SessionReport {
        let kind = self.kind;
        info!(%kind, "session loop started");

        let mut frames = 0u64;
        let mut consecutive_failures = 0u32;

        let terminal = loop {
            let frame = match self.camera.capture_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    error!(%kind, ?e, frames, "capture failed, ending session");
                    break SessionTerminal::Failed(SessionError::Capture(e));
                }
            };
            frames += 1;

            match self.analyze(&frame) {
                Ok(Some(result)) => {
                    info!(%kind, subject_id = %result.subject_id, frames, "match found");
                    break SessionTerminal::Matched(result);
                }
                Ok(None) => consecutive_failures = 0,
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(%kind, ?e, consecutive_failures, "analyzer failed on frame");
                    if consecutive_failures > self.failure_limit {
                        break SessionTerminal::Failed(SessionError::Analyzer {
                            consecutive: consecutive_failures,
                            last: e,
                        });
                    }
                }
            }

            if self.stop.load(Ordering::SeqCst) {
                debug!(%kind, frames, "stop flag observed");
                break SessionTerminal::Stopped;
            }
        };

        info!(%kind, frames, "session loop finished");

        SessionReport {
            terminal,
            frames,
            camera: self.camera,
        }
    }

    /// Run the analyzer, turning a panic into an ordinary failure
    fn analyze(&mut self, frame: &Frame) -> Result<Option<MatchResult>, AnalyzerError> {
        let analyzer = &mut self.analyzer;
        panic::catch_unwind(AssertUnwindSafe(|| analyzer.analyze(frame)))
            .unwrap_or_else(|payload| Err(AnalyzerError::Panicked(panic_message(payload.as_ref()))))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A session running on the blocking pool
pub struct SessionHandle {
    kind: ScanKind,
    stop: Arc<AtomicBool>,
    task: JoinHandle<SessionReport>,
    started_at: Instant,
}

impl SessionHandle {
    /// Move the session onto a blocking thread and start its loop
    pub fn spawn(session: RecognitionSession) -> Self {
        let kind = session.kind;
        let stop = session.stop_flag();
        let task = tokio::task::spawn_blocking(move || session.run());

        Self {
            kind,
            stop,
            task,
            started_at: Instant::now(),
        }
    }

    pub fn kind(&self) -> ScanKind {
        self.kind
    }

    /// When the session was spawned
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Ask the loop to end after the frame in progress
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Wait for the session to reach a terminal state on its own.
    ///
    /// Cancel-safe. Once this has returned the handle must be discarded.
    pub async fn wait(&mut self) -> Result<SessionReport, JoinError> {
        (&mut self.task).await
    }

    /// Raise the stop flag and wait for the loop to hand the camera back
    pub async fn stop(self) -> Result<SessionReport, JoinError> {
        self.request_stop();
        self.task.await
    }
}
