//! Face matching against reference embeddings

use std::sync::Arc;

use tracing::{debug, warn};

use super::{PersonCatalog, RecordLookup};
use crate::camera::Frame;
use crate::session::{Analyzer, AnalyzerError, Evidence, MatchResult};

/// Face detection plus embedding computation
pub trait FaceEncoder: Send {
    /// One embedding per face found in the frame
    fn encode(&mut self, frame: &Frame) -> Result<Vec<Vec<f32>>, AnalyzerError>;
}

/// Nearest-neighbour matching of face embeddings
pub struct FaceAnalyzer {
    encoder: Box<dyn FaceEncoder>,
    persons: Arc<PersonCatalog>,
    tolerance: f32,
}

impl FaceAnalyzer {
    /// A face matches when its closest reference embedding lies within `tolerance`
    pub fn new(encoder: Box<dyn FaceEncoder>, persons: Arc<PersonCatalog>, tolerance: f32) -> Self {
        Self {
            encoder,
            persons,
            tolerance,
        }
    }

    /// Closest reference embedding to `encoding`
    fn nearest(&self, encoding: &[f32]) -> Option<(&str, f32)> {
        self.persons
            .encodings()
            .iter()
            .filter(|(_, known)| known.len() == encoding.len())
            .map(|(id, known)| (id.as_str(), distance(known, encoding)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

impl Analyzer for FaceAnalyzer {
    fn analyze(&mut self, frame: &Frame) -> Result<Option<MatchResult>, AnalyzerError> {
        let encodings = self.encoder.encode(frame)?;

        for encoding in &encodings {
            let Some((id, distance)) = self.nearest(encoding) else {
                continue;
            };
            if distance > self.tolerance {
                debug!(closest = %id, distance, "face not recognized");
                continue;
            }

            match self.persons.lookup(id) {
                Some(record) => {
                    return Ok(Some(MatchResult {
                        subject_id: id.to_string(),
                        record,
                        evidence: Evidence::FaceDistance { distance },
                    }))
                }
                None => warn!(%id, "matched encoding has no catalog record"),
            }
        }

        Ok(None)
    }
}

/// Euclidean distance between two embeddings of equal length
fn distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
