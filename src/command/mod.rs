//! Voice command acquisition
//!
//! Wraps a blocking speech recognizer behind a timeout-bound request so the
//! control loop always gets a `Command` back within its listening window.

mod console;
mod process;
mod source;
mod vocabulary;

pub use console::ConsoleRecognizer;
pub use process::ProcessRecognizer;
pub use source::{CommandSource, SpeechRecognizer};
#[cfg(test)]
pub use source::SpeechError;
pub use vocabulary::Command;
