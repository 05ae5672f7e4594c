//! Destination catalog
//!
//! The catalog is a static JSON registry of named search targets. It is
//! loaded once at startup and immutable for the duration of a run.

use crate::CatalogError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A logical search destination
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Destination {
    /// Unique catalog key
    pub key: String,

    /// Grouping label (e.g. a region name)
    #[serde(default)]
    pub group: String,

    /// Display name shown in logs and persisted snapshots
    pub name: String,

    /// Backend location identifier
    #[serde(default)]
    pub location_id: Option<String>,

    #[serde(default)]
    pub latitude: Option<f64>,

    #[serde(default)]
    pub longitude: Option<f64>,
}

impl Destination {
    /// Names the metadata fields that are still missing
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.location_id.as_deref().map_or(true, str::is_empty) {
            missing.push("location_id");
        }
        if self.latitude.is_none() {
            missing.push("latitude");
        }
        if self.longitude.is_none() {
            missing.push("longitude");
        }
        missing
    }

    /// A destination is ready for search iff the backend location id and
    /// both coordinates are present
    pub fn is_ready(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    destinations: Vec<Destination>,
}

/// Loads destination metadata from disk
#[derive(Debug)]
pub struct DestinationCatalog {
    destinations: BTreeMap<String, Destination>,
    source: PathBuf,
}

impl DestinationCatalog {
    /// Loads the catalog from a JSON file of the form
    /// `{ "destinations": [ { "key": ..., "group": ..., ... } ] }`
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        if !path.exists() {
            return Err(CatalogError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let file: CatalogFile = serde_json::from_str(&content)?;

        let mut destinations = BTreeMap::new();
        for destination in file.destinations {
            destinations.insert(destination.key.clone(), destination);
        }

        Ok(Self {
            destinations,
            source: path.to_path_buf(),
        })
    }

    /// Path the catalog was loaded from
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Looks up a destination by key
    pub fn get(&self, key: &str) -> Result<&Destination, CatalogError> {
        self.destinations
            .get(key)
            .ok_or_else(|| CatalogError::UnknownKey {
                key: key.to_string(),
                known: self
                    .destinations
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    /// Iterates every destination in key order
    pub fn values(&self) -> impl Iterator<Item = &Destination> {
        self.destinations.values()
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }
}
