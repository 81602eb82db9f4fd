use std::fs;
use std::path::{Path, PathBuf};

use hammer_core::errors::{ErrorInfo, HammerError};
use hammer_core::SchemaVersion;
use serde::{Deserialize, Serialize};

/// Schema of nested-sampling resume files.
pub const NESTED_CHECKPOINT_SCHEMA: SchemaVersion = SchemaVersion::new(1, 0, 0);

/// A live point of the nested sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LivePoint {
    /// Coordinates in the unit hypercube.
    pub unit: Vec<f64>,
    /// Coordinates after the prior transform.
    pub physical: Vec<f64>,
    /// Log-likelihood at `physical`; `None` encodes negative infinity.
    pub log_likelihood: Option<f64>,
}

impl LivePoint {
    /// Log-likelihood with negative infinity restored.
    pub fn log_l(&self) -> f64 {
        self.log_likelihood.unwrap_or(f64::NEG_INFINITY)
    }
}

/// A point retired from the live set together with its prior-mass weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadPoint {
    /// Coordinates after the prior transform.
    pub physical: Vec<f64>,
    /// Log-likelihood at retirement; `None` encodes negative infinity.
    pub log_likelihood: Option<f64>,
    /// Log of the prior-mass shell width times the likelihood.
    pub log_weight: Option<f64>,
}

/// Serializable state of an interrupted nested-sampling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedCheckpoint {
    /// Schema the checkpoint was written with.
    pub schema_version: SchemaVersion,
    /// Master seed of the run.
    pub seed: u64,
    /// Sampled dimension.
    pub ndim: usize,
    /// Number of live points.
    pub n_live_points: usize,
    /// Completed iterations.
    pub iteration: usize,
    /// Current random-walk step scale in unit-cube coordinates.
    pub step_scale: f64,
    /// Live set at the time of writing.
    pub live: Vec<LivePoint>,
    /// Retired points in retirement order.
    pub dead: Vec<DeadPoint>,
}

impl NestedCheckpoint {
    /// Returns true when a run with these settings may continue from this checkpoint.
    pub fn is_resumable(&self, seed: u64, ndim: usize, n_live_points: usize) -> bool {
        self.schema_version
            .is_compatible_with(&NESTED_CHECKPOINT_SCHEMA)
            && self.seed == seed
            && self.ndim == ndim
            && self.n_live_points == n_live_points
            && self.live.len() == n_live_points
    }

    /// Restores the payload from disk.
    pub fn load(path: &Path) -> Result<Self, HammerError> {
        let contents = fs::read_to_string(path)
            .map_err(|err| HammerError::io("checkpoint-read", err, path))?;
        serde_json::from_str(&contents)
            .map_err(|err| HammerError::io("checkpoint-parse", err, path))
    }

    /// Writes the payload to disk, replacing any previous checkpoint atomically.
    pub fn store(&self, path: &Path) -> Result<(), HammerError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| HammerError::io("checkpoint-mkdir", err, parent))?;
        }
        let json = serde_json::to_string(self).map_err(|err| {
            HammerError::Serde(
                ErrorInfo::new("checkpoint-serialize", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, json)
            .map_err(|err| HammerError::io("checkpoint-write", err, &staging))?;
        fs::rename(&staging, path).map_err(|err| HammerError::io("checkpoint-write", err, path))
    }
}

/// File layout of a nested-sampling run: `<dir>/<model>` plus suffixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestedLayout {
    dir: PathBuf,
    model_name: String,
}

impl NestedLayout {
    /// Layout for `model_name` inside `dir`.
    pub fn new(dir: impl Into<PathBuf>, model_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            model_name: model_name.into(),
        }
    }

    /// Directory holding every nested-sampling artefact.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Common stem of the output files.
    pub fn basename(&self) -> PathBuf {
        self.dir.join(&self.model_name)
    }

    /// Resume file `<basename>resume.json`.
    pub fn resume_path(&self) -> PathBuf {
        self.dir.join(format!("{}resume.json", self.model_name))
    }

    /// Weighted posterior samples `<basename>.txt`.
    pub fn samples_path(&self) -> PathBuf {
        self.dir.join(format!("{}.txt", self.model_name))
    }

    /// Summary statistics `<basename>stats.json`.
    pub fn stats_path(&self) -> PathBuf {
        self.dir.join(format!("{}stats.json", self.model_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_appends_suffixes_to_model_name() {
        let layout = NestedLayout::new("out/nested", "21cm");
        assert_eq!(layout.resume_path(), PathBuf::from("out/nested/21cmresume.json"));
        assert_eq!(layout.samples_path(), PathBuf::from("out/nested/21cm.txt"));
        assert_eq!(layout.stats_path(), PathBuf::from("out/nested/21cmstats.json"));
    }
}
