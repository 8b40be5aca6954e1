//! Analysis layer: catalogs, matching and extractor plumbing
//!
//! Feature extraction itself (face embeddings, plate OCR) happens outside
//! this process. What lives here is turning extracted features into a
//! `MatchResult` by looking them up in the known-persons and known-vehicles
//! catalogs.

mod catalog;
mod face;
mod factory;
mod plate;
mod sidecar;

use serde::{Deserialize, Serialize};

pub use catalog::{PersonCatalog, VehicleCatalog};
pub use face::FaceAnalyzer;
pub use factory::CatalogAnalyzers;
pub use plate::PlateAnalyzer;
pub use sidecar::SidecarExtractor;

/// A known person
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRecord {
    pub name: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub offence: String,
    #[serde(default)]
    pub status: String,
}

/// A known vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub plate_number: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub make: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub status: String,
}

/// Catalog entry attached to a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Person(PersonRecord),
    Vehicle(VehicleRecord),
}

impl Record {
    /// One-line description for narration and logs
    pub fn summary(&self) -> String {
        match self {
            Record::Person(person) if person.offence.is_empty() => person.name.clone(),
            Record::Person(person) => format!("{}, {}", person.name, person.offence),
            Record::Vehicle(vehicle) => {
                let mut summary = vehicle.plate_number.clone();
                let make_model = format!("{} {}", vehicle.make, vehicle.model);
                if !make_model.trim().is_empty() {
                    summary.push_str(", ");
                    summary.push_str(make_model.trim());
                }
                if !vehicle.status.is_empty() {
                    summary.push_str(", ");
                    summary.push_str(&vehicle.status);
                }
                summary
            }
        }
    }
}

/// Resolve a subject identifier to its catalog record
pub trait RecordLookup: Send + Sync {
    fn lookup(&self, id: &str) -> Option<Record>;
}
