//! Output manifest: what one run produced, with content hashes
//!
//! The manifest is written next to the converted files as `manifest.json`.
//! Every input and output is recorded by its SHA256 so a later run or an
//! external tool can tell whether anything changed.

use rig2jbeam_core::ConversionReport;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// A file written by the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputFile {
    /// Path relative to the output directory
    pub path: String,
    /// SHA256 of the written content
    pub sha: String,
}

impl OutputFile {
    pub fn new(path: impl Into<String>, content: &[u8]) -> Self {
        Self {
            path: path.into(),
            sha: sha256_hex(content),
        }
    }
}

/// One exported mesh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshEntry {
    /// Name as written in the rig
    pub original: String,
    /// Name after duplicate resolution
    pub resolved: String,
    /// `None` when the mesh file was not found
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputFile>,
    #[serde(default)]
    pub placeholder: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Converted,
    Failed,
}

/// Manifest entry for a single input document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub source: String,
    /// SHA256 of the input document
    pub source_sha: String,
    pub status: DocumentStatus,
    /// The `.jbeam` file; absent for failed documents and dry runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jbeam: Option<OutputFile>,
    #[serde(default)]
    pub meshes: Vec<MeshEntry>,
    pub report: ConversionReport,
}

impl DocumentEntry {
    pub fn is_failed(&self) -> bool {
        self.status == DocumentStatus::Failed
    }
}

/// The run manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputManifest {
    /// Version of the manifest format
    #[serde(default = "default_version")]
    pub version: String,
    pub generator: String,
    /// When the run finished (RFC 3339)
    pub created_at: String,
    pub documents: Vec<DocumentEntry>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl OutputManifest {
    pub fn new(documents: Vec<DocumentEntry>) -> Self {
        Self {
            version: default_version(),
            generator: format!("rig2jbeam {}", env!("CARGO_PKG_VERSION")),
            created_at: chrono::Utc::now().to_rfc3339(),
            documents,
        }
    }

    pub fn failed(&self) -> usize {
        self.documents.iter().filter(|d| d.is_failed()).count()
    }

    /// Save manifest to a file
    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Compute SHA256 hash of data and return as hex string
pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
