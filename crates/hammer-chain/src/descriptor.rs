use std::fs;
use std::path::{Path, PathBuf};

use hammer_core::errors::{ErrorInfo, HammerError};
use hammer_core::{ModuleDescriptor, ParameterSet, SchemaVersion};
use serde::{Deserialize, Serialize};

use crate::hash::stable_hash_string;

/// Schema version written into every descriptor file.
pub const DESCRIPTOR_SCHEMA: SchemaVersion = SchemaVersion::new(1, 0, 0);

/// File extension (after the model name) of persisted descriptors.
pub const DESCRIPTOR_SUFFIX: &str = "LCC.yml";

/// Serializable identity of a likelihood computation chain.
///
/// Two runs sample the same chain iff their descriptors compare equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainDescriptor {
    /// Schema the descriptor was written with.
    #[serde(default)]
    pub schema_version: SchemaVersion,
    /// Core modules in evaluation order.
    #[serde(default)]
    pub core_modules: Vec<ModuleDescriptor>,
    /// Likelihood modules in evaluation order.
    #[serde(default)]
    pub likelihood_modules: Vec<ModuleDescriptor>,
    /// Sampled parameters, if the chain defines any.
    #[serde(default)]
    pub params: Option<ParameterSet>,
}

impl ChainDescriptor {
    /// Returns true when `other` describes the same run under a compatible schema.
    pub fn matches(&self, other: &ChainDescriptor) -> bool {
        self.schema_version.is_compatible_with(&other.schema_version)
            && self.core_modules == other.core_modules
            && self.likelihood_modules == other.likelihood_modules
            && self.params == other.params
    }

    /// Stable SHA-256 fingerprint of the descriptor's canonical JSON form.
    pub fn fingerprint(&self) -> Result<String, HammerError> {
        stable_hash_string(self)
    }

    /// Renders the descriptor as YAML.
    pub fn to_yaml(&self) -> Result<String, HammerError> {
        serde_yaml::to_string(self).map_err(|err| {
            HammerError::Serde(ErrorInfo::new("descriptor-serialize", err.to_string()))
        })
    }

    /// Parses a descriptor from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, HammerError> {
        serde_yaml::from_str(yaml)
            .map_err(|err| HammerError::Serde(ErrorInfo::new("descriptor-parse", err.to_string())))
    }

    /// Loads a descriptor file written by [`ChainDescriptor::store`].
    pub fn load(path: &Path) -> Result<Self, HammerError> {
        let contents =
            fs::read_to_string(path).map_err(|err| HammerError::io("descriptor-read", err, path))?;
        Self::from_yaml(&contents).map_err(|err| match err {
            HammerError::Serde(info) => {
                HammerError::Serde(info.with_context("path", path.display().to_string()))
            }
            other => other,
        })
    }

    /// Writes the descriptor as YAML, creating parent directories as needed.
    pub fn store(&self, path: &Path) -> Result<(), HammerError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| HammerError::io("descriptor-mkdir", err, parent))?;
        }
        let yaml = self.to_yaml()?;
        fs::write(path, yaml).map_err(|err| HammerError::io("descriptor-write", err, path))
    }
}

/// Location of the descriptor for `model_name` inside `output_dir`.
pub fn descriptor_path(output_dir: &Path, model_name: &str) -> PathBuf {
    output_dir.join(format!("{model_name}.{DESCRIPTOR_SUFFIX}"))
}
