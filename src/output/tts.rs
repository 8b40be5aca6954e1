//! Narration through an external text-to-speech command
//!
//! Utterances are queued to one worker thread and spoken in order, so
//! `speak` never waits on the synthesizer and narrations never overlap.

use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Sender};
use std::sync::Mutex;
use std::thread;

use tracing::{debug, info, warn};

use super::OutputSink;

/// Speaks by running `<program> <args...> <text>` once per utterance
pub struct TtsSink {
    queue: Mutex<Sender<String>>,
}

impl TtsSink {
    /// Start the worker for a whitespace-separated command line such as `espeak -s 150`
    pub fn spawn(command_line: &str) -> std::io::Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty TTS command")
        })?;
        let args: Vec<String> = parts.collect();
        let (queue_tx, queue_rx) = mpsc::channel::<String>();

        thread::Builder::new()
            .name("tts-worker".to_string())
            .spawn(move || {
                info!(%program, "tts worker started");
                for text in queue_rx {
                    let status = Command::new(&program)
                        .args(&args)
                        .arg(&text)
                        .stdin(Stdio::null())
                        .stdout(Stdio::null())
                        .status();
                    match status {
                        Ok(status) if status.success() => debug!(%text, "spoken"),
                        Ok(status) => warn!(%status, %text, "tts command failed"),
                        Err(e) => warn!(?e, %text, "failed to run tts command"),
                    }
                }
                debug!("tts worker stopped");
            })?;

        Ok(Self {
            queue: Mutex::new(queue_tx),
        })
    }
}

impl OutputSink for TtsSink {
    fn speak(&self, text: &str) {
        info!(target: "narration", "{text}");
        let Ok(queue) = self.queue.lock() else {
            warn!("tts queue lock poisoned, dropping narration");
            return;
        };
        if queue.send(text.to_string()).is_err() {
            warn!("tts worker gone, dropping narration");
        }
    }
}
