//! JSON-backed signature database and label index.

use crate::error::{SigDbError, SigDbResult};
use crate::signature::Signature;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Label returned for ids the index cannot resolve.
pub const UNKNOWN_LABEL: &str = "???";

/// Supplies an ordered sequence of signatures and resolves label ids.
pub trait SignatureSource {
    /// Signatures in curator order; earlier entries take precedence.
    /// The order is stable across calls.
    fn signatures(&self) -> &[Signature];

    /// Resolves a label id, returning [`UNKNOWN_LABEL`] if it is not indexed.
    fn label_for_id(&self, id: u32) -> &str;
}

/// Extra label index entry not tied to an installed signature.
#[derive(Debug, Clone, Deserialize)]
struct LabelRecord {
    label_id: u32,
    label: String,
}

#[derive(Debug, Deserialize)]
struct DatabaseFile {
    #[serde(default)]
    signatures: Vec<Signature>,
    #[serde(default)]
    labels: Vec<LabelRecord>,
}

/// An in-memory signature database.
#[derive(Debug, Clone, Default)]
pub struct SignatureDatabase {
    signatures: Vec<Signature>,
    labels: HashMap<u32, String>,
}

impl SignatureDatabase {
    /// Builds a database from signatures in curator order.
    ///
    /// # Errors
    ///
    /// Fails if two signatures share a label id.
    pub fn new(signatures: Vec<Signature>) -> SigDbResult<Self> {
        let mut labels = HashMap::with_capacity(signatures.len());
        let mut owner: HashMap<u32, usize> = HashMap::with_capacity(signatures.len());
        for (idx, sig) in signatures.iter().enumerate() {
            if let Some(first) = owner.insert(sig.label_id, idx) {
                return Err(SigDbError::DuplicateLabelId {
                    id: sig.label_id,
                    first,
                    second: idx,
                });
            }
            labels.insert(sig.label_id, sig.label.clone());
        }
        Ok(Self { signatures, labels })
    }

    /// Adds a label to the index without adding a signature.
    ///
    /// # Errors
    ///
    /// Fails if the id is already indexed with a different label.
    pub fn add_label(&mut self, id: u32, label: impl Into<String>) -> SigDbResult<()> {
        let label = label.into();
        match self.labels.get(&id) {
            Some(existing) if *existing != label => Err(SigDbError::ConflictingLabel {
                id,
                first: existing.clone(),
                second: label,
            }),
            Some(_) => Ok(()),
            None => {
                self.labels.insert(id, label);
                Ok(())
            }
        }
    }

    /// Parses a database from its JSON form.
    pub fn from_json_str(json: &str) -> SigDbResult<Self> {
        let file: DatabaseFile = serde_json::from_str(json)?;
        let mut db = Self::new(file.signatures)?;
        for record in file.labels {
            db.add_label(record.label_id, record.label)?;
        }
        debug!(
            signatures = db.signatures.len(),
            labels = db.labels.len(),
            "Parsed signature database"
        );
        Ok(db)
    }

    /// Loads a database file.
    pub fn load(path: impl AsRef<Path>) -> SigDbResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SigDbError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self::from_json_str(&json)?;
        info!(path = %path.display(), signatures = db.len(), "Loaded signature database");
        Ok(db)
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

impl SignatureSource for SignatureDatabase {
    fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    fn label_for_id(&self, id: u32) -> &str {
        self.labels.get(&id).map(String::as_str).unwrap_or(UNKNOWN_LABEL)
    }
}
