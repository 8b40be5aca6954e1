//! Typed-phrase recognizer for terminals without a speech backend
//!
//! A single reader thread owns stdin and forwards lines over a channel. Each
//! request waits at most one phrase window for a line, and that window must
//! be shorter than the listen timeout so a request is never abandoned while
//! it still holds the channel.

use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use super::source::{SpeechError, SpeechRecognizer};

/// Reads commands from standard input, one line per utterance
pub struct ConsoleRecognizer {
    lines: Mutex<Receiver<String>>,
    phrase_window: Duration,
}

impl ConsoleRecognizer {
    /// Start the stdin reader thread
    pub fn spawn(phrase_window: Duration) -> io::Result<Self> {
        let (line_tx, line_rx) = mpsc::channel();

        thread::Builder::new()
            .name("console-reader".to_string())
            .spawn(move || {
                info!("console reader started, type a command and press enter");
                for line in io::stdin().lock().lines() {
                    let Ok(line) = line else { break };
                    if line_tx.send(line).is_err() {
                        break;
                    }
                }
                debug!("console reader stopped");
            })?;

        Ok(Self::from_receiver(line_rx, phrase_window))
    }

    fn from_receiver(lines: Receiver<String>, phrase_window: Duration) -> Self {
        Self {
            lines: Mutex::new(lines),
            phrase_window,
        }
    }
}

impl SpeechRecognizer for ConsoleRecognizer {
    fn recognize(&self) -> Result<String, SpeechError> {
        let lines = self
            .lines
            .lock()
            .map_err(|_| SpeechError::Service("console reader lock poisoned".to_string()))?;

        match lines.recv_timeout(self.phrase_window) {
            Ok(line) if line.trim().is_empty() => Err(SpeechError::NoUtterance),
            Ok(line) => Ok(line),
            Err(RecvTimeoutError::Timeout) => Err(SpeechError::NoUtterance),
            Err(RecvTimeoutError::Disconnected) => {
                // input is gone for good; hold the window so callers don't spin
                thread::sleep(self.phrase_window);
                Err(SpeechError::Service("console input closed".to_string()))
            }
        }
    }
}
