//! License plate matching

use std::sync::Arc;

use tracing::debug;

use super::RecordLookup;
use crate::camera::Frame;
use crate::session::{Analyzer, AnalyzerError, Evidence, MatchResult};

/// Text recognition over plate-shaped regions of a frame
pub trait PlateReader: Send {
    /// Raw text of every plate candidate found in the frame
    fn read_plates(&mut self, frame: &Frame) -> Result<Vec<String>, AnalyzerError>;
}

/// Keep only ASCII letters and digits, uppercased
pub fn normalize_plate(text: &str) -> String {
    text.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Reads plates and looks them up in the vehicle catalog
pub struct PlateAnalyzer {
    reader: Box<dyn PlateReader>,
    vehicles: Arc<dyn RecordLookup>,
}

impl PlateAnalyzer {
    pub fn new(reader: Box<dyn PlateReader>, vehicles: Arc<dyn RecordLookup>) -> Self {
        Self { reader, vehicles }
    }
}

impl Analyzer for PlateAnalyzer {
    fn analyze(&mut self, frame: &Frame) -> Result<Option<MatchResult>, AnalyzerError> {
        for text in self.reader.read_plates(frame)? {
            let plate = normalize_plate(&text);
            if plate.is_empty() {
                continue;
            }

            match self.vehicles.lookup(&plate) {
                Some(record) => {
                    return Ok(Some(MatchResult {
                        subject_id: plate.clone(),
                        record,
                        evidence: Evidence::PlateText { text: plate },
                    }))
                }
                None => debug!(%plate, sequence = frame.sequence, "plate not in catalog"),
            }
        }

        Ok(None)
    }
}
