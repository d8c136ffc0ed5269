//! SHA-256 helpers and export manifests

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::AppError;

/// Lowercase hex SHA-256 of `data`.
pub fn compute_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Case-insensitive comparison against an expected hex digest.
pub fn verify_hash(data: &[u8], expected: &str) -> bool {
    compute_sha256(data).eq_ignore_ascii_case(expected.trim())
}

pub fn compute_file_hash(path: &Path) -> Result<String, AppError> {
    let bytes = std::fs::read(path).map_err(|e| AppError::io(path, e))?;
    Ok(compute_sha256(&bytes))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub hash: String,
    /// Epoch milliseconds when the entry was written
    pub timestamp: i64,
    pub size: u64,
}

/// File name to digest map written beside exported files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashManifest {
    pub files: BTreeMap<String, ManifestEntry>,
}

impl HashManifest {
    pub fn insert(&mut self, name: impl Into<String>, data: &[u8]) -> &ManifestEntry {
        let name = name.into();
        let entry = ManifestEntry {
            hash: compute_sha256(data),
            timestamp: chrono::Utc::now().timestamp_millis(),
            size: data.len() as u64,
        };
        self.files.insert(name.clone(), entry);
        &self.files[&name]
    }

    pub fn get(&self, name: &str) -> Option<&ManifestEntry> {
        self.files.get(name)
    }

    /// `Ok(false)` on mismatch, `Err` when the name is not in the manifest.
    pub fn verify(&self, name: &str, data: &[u8]) -> Result<bool, AppError> {
        let entry = self
            .get(name)
            .ok_or_else(|| AppError::InvalidInput(format!("'{name}' is not in the manifest")))?;
        Ok(entry.size == data.len() as u64 && verify_hash(data, &entry.hash))
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path).map_err(|e| AppError::io(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| AppError::io(path, e))
    }
}
