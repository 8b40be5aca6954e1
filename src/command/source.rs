//! Timeout-bound command acquisition
//!
//! Every request runs the blocking recognizer on its own named thread and
//! waits for the result on a single-use channel. If the window elapses first
//! the request returns `NoInput` and the thread is left to finish on its own;
//! its eventual result has nowhere to go and is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::vocabulary::Command;

/// Errors reported by a speech recognizer
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("no intelligible utterance")]
    NoUtterance,

    #[error("speech service unavailable: {0}")]
    Service(String),
}

/// A blocking speech-to-text backend
pub trait SpeechRecognizer: Send + Sync + 'static {
    /// Adjust to ambient conditions. Called once before every `recognize`.
    fn calibrate(&self) -> Result<(), SpeechError> {
        Ok(())
    }

    /// Block until one utterance has been heard and transcribed
    fn recognize(&self) -> Result<String, SpeechError>;
}

/// Produces one `Command` per request without ever blocking past the timeout
#[derive(Clone)]
pub struct CommandSource {
    recognizer: Arc<dyn SpeechRecognizer>,
    next_request: Arc<AtomicU64>,
}

impl CommandSource {
    /// Create a command source over the given recognizer
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        Self {
            recognizer,
            next_request: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Listen for one command, giving up after `timeout`
    pub async fn acquire_command(&self, timeout: Duration) -> Command {
        let request = self.next_request.fetch_add(1, Ordering::Relaxed);
        let (result_tx, result_rx) = oneshot::channel();
        let recognizer = Arc::clone(&self.recognizer);

        let spawned = thread::Builder::new()
            .name(format!("speech-listen-{request}"))
            .spawn(move || {
                let command = listen_once(recognizer.as_ref());
                if result_tx.send(command).is_err() {
                    debug!(request, ?command, "discarding late speech result");
                }
            });

        if let Err(e) = spawned {
            error!(?e, request, "failed to spawn speech listener thread");
            return Command::Error;
        }

        match tokio::time::timeout(timeout, result_rx).await {
            Ok(Ok(command)) => command,
            Ok(Err(_)) => {
                warn!(request, "speech listener exited without a result");
                Command::Error
            }
            Err(_) => {
                debug!(
                    request,
                    timeout_ms = timeout.as_millis() as u64,
                    "listening window elapsed"
                );
                Command::NoInput
            }
        }
    }
}

/// Calibrate, listen once and map the outcome onto the vocabulary
fn listen_once(recognizer: &dyn SpeechRecognizer) -> Command {
    let heard = recognizer
        .calibrate()
        .and_then(|()| recognizer.recognize());

    match heard {
        Ok(utterance) => {
            let command = Command::parse(&utterance);
            info!(%utterance, %command, "speech recognized");
            command
        }
        Err(SpeechError::NoUtterance) => Command::NoInput,
        Err(SpeechError::Service(message)) => {
            warn!(%message, "speech recognition service unavailable");
            Command::Error
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{HangingRecognizer, ScriptedRecognizer, Utterance};
    use std::time::Instant;

    #[tokio::test]
    async fn test_recognized_phrase_becomes_command() {
        let recognizer = Arc::new(ScriptedRecognizer::new(vec![Utterance::say("scan")]));
        let source = CommandSource::new(recognizer.clone());

        let command = source.acquire_command(Duration::from_secs(1)).await;
        assert_eq!(command, Command::Scan);
        assert_eq!(recognizer.calibrations(), 1);
    }

    #[tokio::test]
    async fn test_error_and_silence_are_distinct() {
        let recognizer = Arc::new(ScriptedRecognizer::new(vec![
            Utterance::ServiceDown,
            Utterance::Silence,
            Utterance::say("hello there"),
        ]));
        let source = CommandSource::new(recognizer);

        assert_eq!(source.acquire_command(Duration::from_secs(1)).await, Command::Error);
        assert_eq!(source.acquire_command(Duration::from_secs(1)).await, Command::NoInput);
        assert_eq!(source.acquire_command(Duration::from_secs(1)).await, Command::Unknown);
    }

    #[tokio::test]
    async fn test_calibrates_once_per_request() {
        let recognizer = Arc::new(ScriptedRecognizer::new(vec![
            Utterance::say("scan"),
            Utterance::say("stop scan"),
            Utterance::say("quit"),
        ]));
        let source = CommandSource::new(recognizer.clone());

        for _ in 0..3 {
            source.acquire_command(Duration::from_secs(1)).await;
        }
        assert_eq!(recognizer.calibrations(), 3);
    }

    #[tokio::test]
    async fn test_returns_within_timeout_when_backend_hangs() {
        let recognizer = Arc::new(HangingRecognizer::new());
        let source = CommandSource::new(recognizer.clone());

        let timeout = Duration::from_millis(50);
        let started = Instant::now();
        let command = source.acquire_command(timeout).await;
        let elapsed = started.elapsed();

        assert_eq!(command, Command::NoInput);
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout + Duration::from_millis(500), "took {elapsed:?}");

        recognizer.release();
    }

    #[tokio::test]
    async fn test_late_result_is_not_delivered_to_next_request() {
        let recognizer = Arc::new(ScriptedRecognizer::new(vec![
            Utterance::after(Duration::from_millis(150), "scan"),
            Utterance::say("license"),
        ]));
        let source = CommandSource::new(recognizer);

        let first = source.acquire_command(Duration::from_millis(20)).await;
        assert_eq!(first, Command::NoInput);

        // let the abandoned call finish in the background
        tokio::time::sleep(Duration::from_millis(250)).await;

        let second = source.acquire_command(Duration::from_secs(1)).await;
        assert_eq!(second, Command::License);
    }

    #[tokio::test(start_paused = true)]
    async fn test_thousand_hanging_requests_all_time_out() {
        let recognizer = Arc::new(HangingRecognizer::new());
        let source = CommandSource::new(recognizer.clone());

        for _ in 0..1000 {
            let command = source.acquire_command(Duration::from_millis(10)).await;
            assert_eq!(command, Command::NoInput);
        }

        recognizer.release();
    }
}
