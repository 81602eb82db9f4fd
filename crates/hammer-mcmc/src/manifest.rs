use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use hammer_core::errors::{ErrorInfo, HammerError};
use hammer_core::RunProvenance;
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::continuation::ContinuationDecision;

/// Extension appended to the file prefix of a run.
pub const MANIFEST_SUFFIX: &str = "manifest.json";

/// Structured record of a completed sampling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    /// Configuration used for the run.
    pub config: RunConfig,
    /// Backend that produced the samples.
    pub backend: String,
    /// How the run related to a previous one.
    pub continuation: ContinuationDecision,
    /// Whether the chain descriptor was written.
    pub descriptor_written: bool,
    /// Seed, descriptor fingerprint, timestamp and tool versions.
    pub provenance: RunProvenance,
    /// Iterations completed by the backend.
    pub iterations: usize,
    /// Number of samples returned.
    pub samples: usize,
    /// Artefacts written by the backend.
    pub outputs: Vec<PathBuf>,
}

impl RunManifest {
    /// Provenance stamped with the current time and this crate's version.
    pub fn provenance(descriptor_fingerprint: String, seed: u64) -> RunProvenance {
        let mut tool_versions = BTreeMap::new();
        tool_versions.insert(
            env!("CARGO_PKG_NAME").to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        );
        RunProvenance {
            descriptor_fingerprint,
            seed,
            created_at: chrono::Utc::now().to_rfc3339(),
            tool_versions,
        }
    }

    /// Writes the manifest to a JSON file.
    pub fn write(&self, path: &Path) -> Result<(), HammerError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| HammerError::io("manifest-mkdir", err, parent))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|err| {
            HammerError::Serde(
                ErrorInfo::new("manifest-serialize", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        fs::write(path, json).map_err(|err| HammerError::io("manifest-write", err, path))
    }

    /// Loads a manifest from disk.
    pub fn load(path: &Path) -> Result<Self, HammerError> {
        let contents =
            fs::read_to_string(path).map_err(|err| HammerError::io("manifest-read", err, path))?;
        serde_json::from_str(&contents)
            .map_err(|err| HammerError::io("manifest-parse", err, path))
    }
}

/// Location of the manifest for `model_name` inside `output_dir`.
pub fn manifest_path(output_dir: &Path, model_name: &str) -> PathBuf {
    output_dir.join(format!("{model_name}.{MANIFEST_SUFFIX}"))
}
