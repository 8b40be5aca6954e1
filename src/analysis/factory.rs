//! Builds per-session analyzers from the catalogs and configured extractors

use std::sync::Arc;

use tracing::debug;

use super::{FaceAnalyzer, PersonCatalog, PlateAnalyzer, SidecarExtractor, VehicleCatalog};
use crate::session::{Analyzer, AnalyzerError, AnalyzerFactory, ScanKind};

/// Analyzer factory backed by the JSON catalogs and sidecar extractors
pub struct CatalogAnalyzers {
    persons: Arc<PersonCatalog>,
    vehicles: Arc<VehicleCatalog>,
    face_sidecar: Option<String>,
    plate_sidecar: Option<String>,
    face_tolerance: f32,
}

impl CatalogAnalyzers {
    pub fn new(
        persons: PersonCatalog,
        vehicles: VehicleCatalog,
        face_sidecar: Option<String>,
        plate_sidecar: Option<String>,
        face_tolerance: f32,
    ) -> Self {
        Self {
            persons: Arc::new(persons),
            vehicles: Arc::new(vehicles),
            face_sidecar,
            plate_sidecar,
            face_tolerance,
        }
    }
}

impl AnalyzerFactory for CatalogAnalyzers {
    fn create(&self, kind: ScanKind) -> Result<Box<dyn Analyzer>, AnalyzerError> {
        let command = match kind {
            ScanKind::Face => self.face_sidecar.as_deref(),
            ScanKind::Plate => self.plate_sidecar.as_deref(),
        }
        .ok_or(AnalyzerError::NotConfigured(kind))?;

        debug!(%kind, %command, "starting extractor");
        let extractor = Box::new(SidecarExtractor::spawn(command)?);

        let analyzer: Box<dyn Analyzer> = match kind {
            ScanKind::Face => Box::new(FaceAnalyzer::new(
                extractor,
                Arc::clone(&self.persons),
                self.face_tolerance,
            )),
            ScanKind::Plate => Box::new(PlateAnalyzer::new(extractor, self.vehicles.clone())),
        };
        Ok(analyzer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_extractor_is_reported() {
        let factory = CatalogAnalyzers::new(
            PersonCatalog::default(),
            VehicleCatalog::default(),
            None,
            None,
            0.6,
        );

        assert!(matches!(
            factory.create(ScanKind::Face),
            Err(AnalyzerError::NotConfigured(ScanKind::Face))
        ));
        assert!(matches!(
            factory.create(ScanKind::Plate),
            Err(AnalyzerError::NotConfigured(ScanKind::Plate))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_configured_extractor_builds_analyzer() {
        let factory = CatalogAnalyzers::new(
            PersonCatalog::default(),
            VehicleCatalog::default(),
            None,
            Some("cat".to_string()),
            0.6,
        );

        assert!(factory.create(ScanKind::Plate).is_ok());
    }
}
