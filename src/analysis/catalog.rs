//! Known-persons and known-vehicles catalogs
//!
//! Both are read-only JSON documents maintained by the operator tooling.
//! The terminal never writes them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use super::plate::normalize_plate;
use super::{PersonRecord, Record, RecordLookup, VehicleRecord};

/// Errors loading a catalog file
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse catalog {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct PersonsFile {
    #[serde(default)]
    persons: Vec<PersonEntry>,
}

#[derive(Deserialize)]
struct PersonEntry {
    id: String,
    #[serde(flatten)]
    record: PersonRecord,
    /// Reference face embeddings for this person
    #[serde(default)]
    encodings: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct VehiclesFile {
    #[serde(default)]
    vehicles: Vec<VehicleRecord>,
}

/// Known persons with their reference face embeddings
#[derive(Debug, Default)]
pub struct PersonCatalog {
    records: HashMap<String, PersonRecord>,
    encodings: Vec<(String, Vec<f32>)>,
}

impl PersonCatalog {
    /// Load from a JSON file; a missing file yields an empty catalog
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let Some(contents) = read_optional(path)? else {
            return Ok(Self::default());
        };
        let catalog = Self::from_json(&contents).map_err(|source| CatalogError::Parse {
            path: path.to_owned(),
            source,
        })?;
        info!(
            ?path,
            persons = catalog.records.len(),
            encodings = catalog.encodings.len(),
            "person catalog loaded"
        );
        Ok(catalog)
    }

    /// Parse a catalog document
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let file: PersonsFile = serde_json::from_str(json)?;
        let mut catalog = Self::default();

        for entry in file.persons {
            if entry.encodings.is_empty() {
                warn!(id = %entry.id, "person has no reference encodings and can never match");
            }
            for encoding in entry.encodings {
                catalog.encodings.push((entry.id.clone(), encoding));
            }
            if catalog.records.insert(entry.id.clone(), entry.record).is_some() {
                warn!(id = %entry.id, "duplicate person id, keeping the last entry");
            }
        }

        Ok(catalog)
    }

    /// Every reference embedding with the id it belongs to
    pub fn encodings(&self) -> &[(String, Vec<f32>)] {
        &self.encodings
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordLookup for PersonCatalog {
    fn lookup(&self, id: &str) -> Option<Record> {
        self.records.get(id).cloned().map(Record::Person)
    }
}

/// Known vehicles keyed by normalized plate
#[derive(Debug, Default)]
pub struct VehicleCatalog {
    vehicles: HashMap<String, VehicleRecord>,
}

impl VehicleCatalog {
    /// Load from a JSON file; a missing file yields an empty catalog
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let Some(contents) = read_optional(path)? else {
            return Ok(Self::default());
        };
        let catalog = Self::from_json(&contents).map_err(|source| CatalogError::Parse {
            path: path.to_owned(),
            source,
        })?;
        info!(?path, vehicles = catalog.vehicles.len(), "vehicle catalog loaded");
        Ok(catalog)
    }

    /// Parse a catalog document
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let file: VehiclesFile = serde_json::from_str(json)?;
        let mut catalog = Self::default();

        for vehicle in file.vehicles {
            let key = normalize_plate(&vehicle.plate_number);
            if key.is_empty() {
                warn!(plate = %vehicle.plate_number, "skipping vehicle with empty plate");
                continue;
            }
            catalog.vehicles.insert(key, vehicle);
        }

        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }
}

impl RecordLookup for VehicleCatalog {
    fn lookup(&self, id: &str) -> Option<Record> {
        self.vehicles
            .get(&normalize_plate(id))
            .cloned()
            .map(Record::Vehicle)
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, CatalogError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(?path, "catalog file not found, starting with an empty catalog");
            Ok(None)
        }
        Err(source) => Err(CatalogError::Io {
            path: path.to_owned(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERSONS: &str = r#"{
        "persons": [
            {
                "id": "A123",
                "name": "Jane Roe",
                "age": 41,
                "offence": "fraud",
                "status": "wanted",
                "encodings": [[0.0, 0.0, 0.0], [0.1, 0.0, 0.0]]
            },
            { "id": "B456", "name": "John Doe", "encodings": [[1.0, 1.0, 1.0]] }
        ]
    }"#;

    const VEHICLES: &str = r#"{
        "vehicles": [
            {
                "plate_number": "abc 123",
                "owner": "J. Doe",
                "make": "Toyota",
                "model": "Corolla",
                "status": "stolen"
            },
            { "plate_number": "--", "owner": "nobody" }
        ]
    }"#;

    #[test]
    fn test_person_catalog_parse() {
        let catalog = PersonCatalog::from_json(PERSONS).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.encodings().len(), 3);

        match catalog.lookup("A123") {
            Some(Record::Person(person)) => {
                assert_eq!(person.name, "Jane Roe");
                assert_eq!(person.age, Some(41));
            }
            other => panic!("unexpected lookup result: {other:?}"),
        }
        assert!(catalog.lookup("missing").is_none());
    }

    #[test]
    fn test_vehicle_lookup_is_normalized() {
        let catalog = VehicleCatalog::from_json(VEHICLES).unwrap();
        assert_eq!(catalog.len(), 1);

        assert!(catalog.lookup("ABC123").is_some());
        assert!(catalog.lookup("abc-123").is_some());
        assert!(catalog.lookup("ABC124").is_none());
    }

    #[test]
    fn test_missing_file_is_empty_catalog() {
        let path = std::env::temp_dir().join("leo-terminal-no-such-catalog.json");
        assert!(PersonCatalog::load(&path).unwrap().is_empty());
        assert!(VehicleCatalog::load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let path = std::env::temp_dir().join(format!(
            "leo-terminal-bad-catalog-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, "{ not json").unwrap();

        let err = VehicleCatalog::load(&path).unwrap_err();
        assert!(matches!(err, CatalogError::Parse { .. }));

        std::fs::remove_file(&path).unwrap();
    }
}
