//! Narration and result presentation
//!
//! Both are fire-and-forget from the arbiter's point of view.

mod tts;

use tracing::{info, warn};

use crate::session::MatchResult;

pub use tts::TtsSink;

/// Spoken status narration
pub trait OutputSink: Send + Sync {
    /// Queue `text` for narration without blocking the caller
    fn speak(&self, text: &str);
}

/// Shows a match to the operator
pub trait ResultPresenter: Send + Sync {
    fn present(&self, result: &MatchResult);
}

/// Narration written to the log instead of a speaker
#[derive(Debug, Default)]
pub struct LogSink;

impl OutputSink for LogSink {
    fn speak(&self, text: &str) {
        info!(target: "narration", "{text}");
    }
}

/// Presents matches as a JSON record in the log
#[derive(Debug, Default)]
pub struct LogPresenter;

impl ResultPresenter for LogPresenter {
    fn present(&self, result: &MatchResult) {
        match serde_json::to_string(&result.record) {
            Ok(record) => info!(
                subject_id = %result.subject_id,
                %record,
                "match presented"
            ),
            Err(e) => warn!(?e, subject_id = %result.subject_id, "failed to encode match record"),
        }
    }
}
