//! Incremental persistence of ensemble chains.
//!
//! The JSON-lines store starts with a [`StoreHeader`] followed by one
//! [`IterationRecord`] per completed iteration. Records are appended as they
//! are produced, so an interrupted run leaves a readable prefix behind.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use hammer_core::errors::{ErrorInfo, HammerError};
use hammer_core::SchemaVersion;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Schema of the JSON-lines chain store.
pub const STORE_SCHEMA: SchemaVersion = SchemaVersion::new(1, 0, 0);

/// Extension appended to the file prefix of a run.
pub const STORE_SUFFIX: &str = "chain.jsonl";

/// Identity of the ensemble a store belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreHeader {
    /// Schema the store was written with.
    pub schema_version: SchemaVersion,
    /// Number of walkers.
    pub walkers: usize,
    /// Sampled dimension.
    pub ndim: usize,
    /// Parameter names in dimension order.
    pub param_names: Vec<String>,
    /// Fingerprint of the chain descriptor that produced the samples.
    pub descriptor_fingerprint: String,
    /// Master seed of the run that created the store.
    pub seed: u64,
}

impl StoreHeader {
    /// Returns true when records under `other` can extend this store.
    pub fn is_compatible_with(&self, other: &StoreHeader) -> bool {
        self.schema_version.is_compatible_with(&other.schema_version)
            && self.walkers == other.walkers
            && self.ndim == other.ndim
            && self.param_names == other.param_names
            && self.descriptor_fingerprint == other.descriptor_fingerprint
    }
}

/// Phase an iteration belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Discarded warm-up iterations.
    Burnin,
    /// Retained posterior samples.
    Sample,
}

/// Walker state after one ensemble iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// Phase of the iteration.
    pub phase: Phase,
    /// Zero-based index within the phase.
    pub iteration: usize,
    /// Walker positions.
    pub positions: Vec<Vec<f64>>,
    /// Log-probabilities of the positions; `null` encodes negative infinity.
    #[serde(with = "log_prob_serde")]
    pub log_probs: Vec<f64>,
    /// Whether each walker accepted its proposal in this iteration.
    pub accepted: Vec<bool>,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
enum StoreLine {
    Header(StoreHeader),
    Iteration(IterationRecord),
}

/// Contents of a store read back from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChain {
    /// Header written when the store was created.
    pub header: StoreHeader,
    /// Records in write order.
    pub records: Vec<IterationRecord>,
}

impl StoredChain {
    /// Records of `phase` in write order.
    pub fn phase(&self, phase: Phase) -> impl Iterator<Item = &IterationRecord> + '_ {
        self.records.iter().filter(move |record| record.phase == phase)
    }

    /// Number of stored iterations of `phase`.
    pub fn count(&self, phase: Phase) -> usize {
        self.phase(phase).count()
    }

    /// Most recent record, if any.
    pub fn last(&self) -> Option<&IterationRecord> {
        self.records.last()
    }

    /// All sample-phase positions, iteration-major then walker.
    pub fn flat_samples(&self) -> Vec<Vec<f64>> {
        self.phase(Phase::Sample)
            .flat_map(|record| record.positions.iter().cloned())
            .collect()
    }
}

/// Persistence backend of the ensemble sampler.
pub trait ChainStorage: Send {
    /// Reads the stored chain, or `None` when nothing has been written yet.
    fn load(&self) -> Result<Option<StoredChain>, HammerError>;

    /// Discards previous contents and starts a new store with `header`.
    fn reset(&mut self, header: &StoreHeader) -> Result<(), HammerError>;

    /// Replaces the store with `header` followed by `records`.
    fn rewrite(
        &mut self,
        header: &StoreHeader,
        records: &[IterationRecord],
    ) -> Result<(), HammerError>;

    /// Appends one iteration.
    fn append(&mut self, record: &IterationRecord) -> Result<(), HammerError>;

    /// Location of the store, when it lives on disk.
    fn location(&self) -> Option<&Path> {
        None
    }
}

/// JSON-lines chain store keyed by a run's file prefix.
#[derive(Debug, Clone)]
pub struct JsonlStorage {
    path: PathBuf,
}

impl JsonlStorage {
    /// Store at `<prefix>.chain.jsonl`.
    pub fn from_prefix(prefix: &Path) -> Self {
        let mut name = OsString::from(prefix.as_os_str());
        name.push(".");
        name.push(STORE_SUFFIX);
        Self {
            path: PathBuf::from(name),
        }
    }

    /// Path of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode(&self, line: &StoreLine) -> Result<String, HammerError> {
        serde_json::to_string(line)
            .map_err(|err| HammerError::io("store-serialize", err, &self.path))
    }

    fn create(&self) -> Result<BufWriter<File>, HammerError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| HammerError::io("store-mkdir", err, parent))?;
        }
        let file = File::create(&self.path)
            .map_err(|err| HammerError::io("store-create", err, &self.path))?;
        Ok(BufWriter::new(file))
    }

    fn write_line(&self, writer: &mut impl Write, line: &StoreLine) -> Result<(), HammerError> {
        let encoded = self.encode(line)?;
        writeln!(writer, "{encoded}")
            .map_err(|err| HammerError::io("store-write", err, &self.path))
    }
}

impl ChainStorage for JsonlStorage {
    fn load(&self) -> Result<Option<StoredChain>, HammerError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let file = File::open(&self.path)
            .map_err(|err| HammerError::io("store-read", err, &self.path))?;
        let lines: Vec<String> = BufReader::new(file)
            .lines()
            .collect::<Result<_, _>>()
            .map_err(|err| HammerError::io("store-read", err, &self.path))?;
        let lines: Vec<&str> = lines
            .iter()
            .map(String::as_str)
            .filter(|line| !line.trim().is_empty())
            .collect();
        let Some((first, rest)) = lines.split_first() else {
            return Ok(None);
        };
        let header = match serde_json::from_str::<StoreLine>(first) {
            Ok(StoreLine::Header(header)) => header,
            Ok(StoreLine::Iteration(_)) => {
                return Err(HammerError::Serde(
                    ErrorInfo::new("store-header", "store does not start with a header")
                        .with_context("path", self.path.display().to_string()),
                ))
            }
            Err(err) => return Err(HammerError::io("store-parse", err, &self.path)),
        };
        let mut records = Vec::with_capacity(rest.len());
        for (index, line) in rest.iter().enumerate() {
            match serde_json::from_str::<StoreLine>(line) {
                Ok(StoreLine::Iteration(record)) => records.push(record),
                // A run killed mid-write leaves a truncated final line.
                Err(err) if index + 1 == rest.len() => {
                    warn!(
                        path = %self.path.display(),
                        error = %err,
                        "dropping truncated store record"
                    );
                }
                Ok(StoreLine::Header(_)) | Err(_) => {
                    return Err(HammerError::Serde(
                        ErrorInfo::new("store-parse", "malformed store record")
                            .with_context("path", self.path.display().to_string())
                            .with_context("line", (index + 2).to_string()),
                    ))
                }
            }
        }
        Ok(Some(StoredChain { header, records }))
    }

    fn reset(&mut self, header: &StoreHeader) -> Result<(), HammerError> {
        self.rewrite(header, &[])
    }

    fn rewrite(
        &mut self,
        header: &StoreHeader,
        records: &[IterationRecord],
    ) -> Result<(), HammerError> {
        let mut writer = self.create()?;
        self.write_line(&mut writer, &StoreLine::Header(header.clone()))?;
        for record in records {
            self.write_line(&mut writer, &StoreLine::Iteration(record.clone()))?;
        }
        writer
            .flush()
            .map_err(|err| HammerError::io("store-write", err, &self.path))
    }

    fn append(&mut self, record: &IterationRecord) -> Result<(), HammerError> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|err| HammerError::io("store-append", err, &self.path))?;
        let mut writer = BufWriter::new(file);
        self.write_line(&mut writer, &StoreLine::Iteration(record.clone()))?;
        writer
            .flush()
            .map_err(|err| HammerError::io("store-write", err, &self.path))
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

mod log_prob_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        let encoded: Vec<Option<f64>> = values
            .iter()
            .map(|value| value.is_finite().then_some(*value))
            .collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let encoded = Vec::<Option<f64>>::deserialize(deserializer)?;
        Ok(encoded
            .into_iter()
            .map(|value| value.unwrap_or(f64::NEG_INFINITY))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_keeps_model_name_dots() {
        let storage = JsonlStorage::from_prefix(Path::new("out/model.v2"));
        assert_eq!(storage.path(), Path::new("out/model.v2.chain.jsonl"));
    }
}
