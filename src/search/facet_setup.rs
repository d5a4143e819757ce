use std::fs;
use std::io;
use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::core::error::{Error, ErrorKind, Result};
use crate::search::facet::FacetDefinition;
use crate::storage::layout::StorageLayout;
use crate::storage::segment_writer::write_atomic;

/// A persisted, reusable list of facet definitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetSetup {
    pub id: String,
    pub facets: Vec<FacetDefinition>,
}

/// Where an aggregation takes its facet definitions from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FacetSource {
    Inline(Vec<FacetDefinition>),
    Stored(String),
}

impl From<Vec<FacetDefinition>> for FacetSource {
    fn from(facets: Vec<FacetDefinition>) -> Self {
        FacetSource::Inline(facets)
    }
}

// Ids like "facets/EmployeeFacets" must map to one flat file name
fn encode_id(id: &str) -> String {
    let mut encoded = String::with_capacity(id.len());
    for byte in id.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' => encoded.push(byte as char),
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

/// `Facets/<encoded id>.json` files under the index directory
#[derive(Debug, Clone)]
pub struct FacetSetupStore {
    dir: PathBuf,
}

impl FacetSetupStore {
    pub fn new(layout: &StorageLayout) -> Self {
        FacetSetupStore {
            dir: layout.facets_dir.clone(),
        }
    }

    fn path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_id(id)))
    }

    pub fn save(&self, setup: &FacetSetup) -> Result<()> {
        if setup.id.is_empty() {
            return Err(Error::new(ErrorKind::InvalidArgument, "facet setup id is empty"));
        }
        let data = serde_json::to_vec_pretty(setup)?;
        write_atomic(&self.path(&setup.id), &data)?;
        debug!(id = %setup.id, facets = setup.facets.len(), "Facet setup saved");
        Ok(())
    }

    pub fn load(&self, id: &str) -> Result<FacetSetup> {
        let data = fs::read(self.path(id)).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::new(ErrorKind::NotFound, format!("facet setup '{}' not found", id)),
            _ => Error::from(e),
        })?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        match fs::remove_file(self.path(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Definitions named by `source`
    pub fn resolve(&self, source: FacetSource) -> Result<Vec<FacetDefinition>> {
        match source {
            FacetSource::Inline(facets) => Ok(facets),
            FacetSource::Stored(id) => Ok(self.load(&id)?.facets),
        }
    }
}
