//! Out-of-process feature extractor
//!
//! The helper is spawned once per session and kept alive for its duration.
//! For every frame it receives a JSON header line followed by `len` raw
//! bytes, and answers with exactly one JSON line:
//!
//! ```text
//! -> {"width":640,"height":480,"format":"rgb24","sequence":7,"len":921600}\n<bytes>
//! <- {"encodings":[[0.12, ...]]}      face helpers
//! <- {"plates":["KA01AB1234"]}        plate helpers
//! <- {"error":"model not loaded"}     either
//! ```

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::face::FaceEncoder;
use super::plate::PlateReader;
use crate::camera::{Frame, PixelFormat};
use crate::session::AnalyzerError;

#[derive(Serialize)]
struct FrameHeader {
    width: u32,
    height: u32,
    format: PixelFormat,
    sequence: u64,
    len: usize,
}

#[derive(Deserialize)]
struct SidecarReply {
    #[serde(default)]
    encodings: Vec<Vec<f32>>,
    #[serde(default)]
    plates: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

/// A helper process speaking the frame protocol over stdin/stdout
pub struct SidecarExtractor {
    program: String,
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl SidecarExtractor {
    /// Spawn the helper from a whitespace-separated command line
    pub fn spawn(command_line: &str) -> Result<Self, AnalyzerError> {
        let mut parts = command_line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| AnalyzerError::Protocol("empty sidecar command".to_string()))?
            .to_string();

        let mut child = Command::new(&program)
            .args(parts)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(AnalyzerError::Protocol("sidecar pipes unavailable".to_string()));
        };

        info!(%program, pid = child.id(), "extractor sidecar started");

        Ok(Self {
            program,
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Send one frame and read the helper's reply
    fn exchange(&mut self, frame: &Frame) -> Result<SidecarReply, AnalyzerError> {
        let header = FrameHeader {
            width: frame.width,
            height: frame.height,
            format: frame.format,
            sequence: frame.sequence,
            len: frame.data.len(),
        };

        serde_json::to_writer(&mut self.stdin, &header)
            .map_err(|e| AnalyzerError::Protocol(e.to_string()))?;
        self.stdin.write_all(b"\n")?;
        self.stdin.write_all(&frame.data)?;
        self.stdin.flush()?;

        let mut line = String::new();
        if self.stdout.read_line(&mut line)? == 0 {
            return Err(AnalyzerError::Protocol(format!(
                "{} closed its output",
                self.program
            )));
        }

        let reply: SidecarReply = serde_json::from_str(line.trim())
            .map_err(|e| AnalyzerError::Protocol(format!("bad reply from {}: {e}", self.program)))?;

        if let Some(error) = reply.error {
            return Err(AnalyzerError::Extraction(error));
        }

        debug!(
            sequence = frame.sequence,
            encodings = reply.encodings.len(),
            plates = reply.plates.len(),
            "sidecar reply"
        );
        Ok(reply)
    }
}

impl FaceEncoder for SidecarExtractor {
    fn encode(&mut self, frame: &Frame) -> Result<Vec<Vec<f32>>, AnalyzerError> {
        Ok(self.exchange(frame)?.encodings)
    }
}

impl PlateReader for SidecarExtractor {
    fn read_plates(&mut self, frame: &Frame) -> Result<Vec<String>, AnalyzerError> {
        Ok(self.exchange(frame)?.plates)
    }
}

impl Drop for SidecarExtractor {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            debug!(?e, program = %self.program, "sidecar already exited");
        }
        if let Err(e) = self.child.wait() {
            warn!(?e, program = %self.program, "failed to reap sidecar");
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::testing::blank_frame;
    use std::path::PathBuf;

    /// Write a throwaway helper script and return the command line to run it
    fn script(name: &str, reply: &str) -> (String, PathBuf) {
        let path = std::env::temp_dir().join(format!(
            "leo-terminal-sidecar-{name}-{}.sh",
            std::process::id()
        ));
        let body = format!(
            "while IFS= read -r header; do\n\
             len=$(echo \"$header\" | sed 's/.*\"len\":\\([0-9]*\\).*/\\1/')\n\
             head -c \"$len\" > /dev/null\n\
             echo '{reply}'\n\
             done\n"
        );
        std::fs::write(&path, body).unwrap();
        (format!("sh {}", path.display()), path)
    }

    #[test]
    fn test_plate_reply() {
        let (command, path) = script("plates", r#"{"plates":["ABC123","Q1"]}"#);
        let mut sidecar = SidecarExtractor::spawn(&command).unwrap();

        let plates = sidecar.read_plates(&blank_frame()).unwrap();
        assert_eq!(plates, vec!["ABC123", "Q1"]);
        // the helper keeps serving frames
        assert_eq!(sidecar.read_plates(&blank_frame()).unwrap().len(), 2);

        drop(sidecar);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_face_reply() {
        let (command, path) = script("faces", r#"{"encodings":[[0.5,0.25]]}"#);
        let mut sidecar = SidecarExtractor::spawn(&command).unwrap();

        assert_eq!(sidecar.encode(&blank_frame()).unwrap(), vec![vec![0.5, 0.25]]);

        drop(sidecar);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_error_reply_is_extraction_failure() {
        let (command, path) = script("error", r#"{"error":"model not loaded"}"#);
        let mut sidecar = SidecarExtractor::spawn(&command).unwrap();

        assert!(matches!(
            sidecar.encode(&blank_frame()),
            Err(AnalyzerError::Extraction(message)) if message == "model not loaded"
        ));

        drop(sidecar);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_exited_helper_is_protocol_error() {
        let mut sidecar = SidecarExtractor::spawn("true").unwrap();
        let result = sidecar.read_plates(&blank_frame());
        assert!(matches!(
            result,
            Err(AnalyzerError::Protocol(_)) | Err(AnalyzerError::Sidecar(_))
        ));
    }

    #[test]
    fn test_missing_program_fails_to_spawn() {
        assert!(matches!(
            SidecarExtractor::spawn("leo-no-such-sidecar"),
            Err(AnalyzerError::Sidecar(_))
        ));
        assert!(matches!(
            SidecarExtractor::spawn("  "),
            Err(AnalyzerError::Protocol(_))
        ));
    }
}
