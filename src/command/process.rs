//! Recognizer backed by an external speech-to-text command
//!
//! The command records and transcribes one phrase per run and prints the
//! transcript on stdout.

use std::process::{Command as Process, Stdio};

use tracing::debug;

use super::source::{SpeechError, SpeechRecognizer};

/// Runs an external STT program once per utterance
pub struct ProcessRecognizer {
    program: String,
    args: Vec<String>,
}

impl ProcessRecognizer {
    /// Build from a whitespace-separated command line
    pub fn new(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl SpeechRecognizer for ProcessRecognizer {
    fn recognize(&self) -> Result<String, SpeechError> {
        let output = Process::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| SpeechError::Service(format!("failed to run {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SpeechError::Service(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let transcript = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(program = %self.program, %transcript, "speech command finished");

        if transcript.is_empty() {
            Err(SpeechError::NoUtterance)
        } else {
            Ok(transcript)
        }
    }
}
