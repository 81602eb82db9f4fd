use std::fs;
use std::path::{Path, PathBuf};

use hammer_core::errors::{ErrorInfo, HammerError};
use serde::{Deserialize, Serialize};

use crate::logging::LogConfig;

/// Name of the sub-directory that receives nested-sampling artefacts.
pub const NESTED_SUBDIR: &str = "nested";

/// YAML-configurable parameters governing a sampling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Directory receiving the descriptor, sample store and manifest.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Model name used as the stem of every output file.
    #[serde(default = "default_model_name")]
    pub model_name: String,
    /// Continue a previous run with a matching descriptor instead of overwriting it.
    #[serde(default = "default_true")]
    pub continue_sampling: bool,
    /// Salvage a stored burn-in when a matching run is restarted.
    #[serde(default = "default_true")]
    pub reuse_burnin: bool,
    /// Logging scope installed for the duration of the run.
    #[serde(default)]
    pub logging: LogConfig,
    /// Sampling backend and its options.
    #[serde(default)]
    pub backend: BackendConfig,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_model_name() -> String {
    "hammer".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            model_name: default_model_name(),
            continue_sampling: true,
            reuse_burnin: true,
            logging: LogConfig::default(),
            backend: BackendConfig::default(),
        }
    }
}

impl RunConfig {
    /// Creates a configuration for `model_name` writing into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>, model_name: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            model_name: model_name.into(),
            ..Self::default()
        }
    }

    /// Replaces the backend configuration.
    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    /// Parses a configuration from YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, HammerError> {
        serde_yaml::from_str(yaml)
            .map_err(|err| HammerError::Config(ErrorInfo::new("config-parse", err.to_string())))
    }

    /// Loads a configuration from a YAML file.
    pub fn from_yaml_path(path: &Path) -> Result<Self, HammerError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            HammerError::Config(
                ErrorInfo::new("config-read", err.to_string())
                    .with_context("path", path.display().to_string()),
            )
        })?;
        Self::from_yaml_str(&contents).map_err(|err| match err {
            HammerError::Config(info) => {
                HammerError::Config(info.with_context("path", path.display().to_string()))
            }
            other => other,
        })
    }

    /// Common stem of the descriptor, store and manifest files.
    pub fn file_prefix(&self) -> PathBuf {
        self.output_dir.join(&self.model_name)
    }

    /// Directory the selected backend writes its own artefacts into.
    pub fn backend_dir(&self) -> PathBuf {
        match self.backend {
            BackendConfig::Nested(_) => self.output_dir.join(NESTED_SUBDIR),
            _ => self.output_dir.clone(),
        }
    }

    /// Checks the configuration without touching the file system.
    pub fn validate(&self) -> Result<(), HammerError> {
        let name = self.model_name.trim();
        if name.is_empty() {
            return Err(HammerError::Config(
                ErrorInfo::new("config-model-name", "model name must not be empty")
                    .with_hint("set `model_name` to the stem used for output files"),
            ));
        }
        if self.model_name.contains(['/', '\\']) {
            return Err(HammerError::Config(
                ErrorInfo::new(
                    "config-model-name",
                    "model name must not contain path separators",
                )
                .with_context("model_name", self.model_name.clone())
                .with_hint("use `output_dir` to choose the directory"),
            ));
        }
        self.backend.validate()
    }
}

/// Closed set of sampling backends; exactly one is active per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BackendConfig {
    /// Affine-invariant ensemble sampler with stretch moves.
    Ensemble(EnsembleConfig),
    /// Nested sampler reporting the evidence.
    Nested(NestedConfig),
    /// Ensemble slice sampler.
    Slice(SliceConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Ensemble(EnsembleConfig::default())
    }
}

impl BackendConfig {
    /// Maps boolean selector flags onto a backend with default options.
    ///
    /// Both flags set at once is a configuration error.
    pub fn from_flags(use_nested: bool, use_slice: bool) -> Result<Self, HammerError> {
        match (use_nested, use_slice) {
            (true, true) => Err(HammerError::Config(
                ErrorInfo::new(
                    "backend-conflict",
                    "nested and slice samplers cannot be used at the same time",
                )
                .with_hint("select at most one alternative backend"),
            )),
            (true, false) => Ok(BackendConfig::Nested(NestedConfig::default())),
            (false, true) => Ok(BackendConfig::Slice(SliceConfig::default())),
            (false, false) => Ok(BackendConfig::default()),
        }
    }

    /// Stable backend name used in logs and manifests.
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::Ensemble(_) => "ensemble",
            BackendConfig::Nested(_) => "nested",
            BackendConfig::Slice(_) => "slice",
        }
    }

    /// Master seed of the selected backend.
    pub fn seed(&self) -> u64 {
        match self {
            BackendConfig::Ensemble(config) => config.seed,
            BackendConfig::Nested(config) => config.seed,
            BackendConfig::Slice(config) => config.seed,
        }
    }

    /// Validates the options of the selected backend.
    pub fn validate(&self) -> Result<(), HammerError> {
        match self {
            BackendConfig::Ensemble(config) => config.validate(),
            BackendConfig::Nested(config) => config.validate(),
            BackendConfig::Slice(config) => config.validate(),
        }
    }
}

fn default_seed() -> u64 {
    0x5EED_2100_0000_0001
}

fn invalid(backend: &str, field: &str, message: &str) -> HammerError {
    HammerError::Config(
        ErrorInfo::new("backend-option", message)
            .with_context("backend", backend)
            .with_context("field", field),
    )
}

/// Options of the default ensemble sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// Walkers per sampled dimension.
    #[serde(default = "default_walkers_ratio")]
    pub walkers_ratio: usize,
    /// Iterations discarded as burn-in.
    #[serde(default)]
    pub burnin_iterations: usize,
    /// Iterations kept as samples.
    #[serde(default = "default_sample_iterations")]
    pub sample_iterations: usize,
    /// Size of the worker pool built when the caller does not supply one.
    #[serde(default = "default_thread_count")]
    pub thread_count: usize,
    /// Scale `a` of the stretch-move proposal, strictly greater than one.
    #[serde(default = "default_stretch_scale")]
    pub stretch_scale: f64,
    /// Master seed for walker initialisation and proposals.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_walkers_ratio() -> usize {
    8
}

fn default_sample_iterations() -> usize {
    100
}

fn default_thread_count() -> usize {
    1
}

fn default_stretch_scale() -> f64 {
    2.0
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            walkers_ratio: default_walkers_ratio(),
            burnin_iterations: 0,
            sample_iterations: default_sample_iterations(),
            thread_count: default_thread_count(),
            stretch_scale: default_stretch_scale(),
            seed: default_seed(),
        }
    }
}

impl EnsembleConfig {
    /// Number of walkers for `ndim` dimensions, rounded up to an even count.
    pub fn walker_count(&self, ndim: usize) -> usize {
        let walkers = (self.walkers_ratio * ndim).max(2);
        walkers + walkers % 2
    }

    fn validate(&self) -> Result<(), HammerError> {
        if self.walkers_ratio == 0 {
            return Err(invalid("ensemble", "walkers_ratio", "walkers ratio must be positive"));
        }
        if self.thread_count == 0 {
            return Err(invalid("ensemble", "thread_count", "thread count must be positive"));
        }
        if !(self.stretch_scale > 1.0 && self.stretch_scale.is_finite()) {
            return Err(invalid(
                "ensemble",
                "stretch_scale",
                "stretch scale must be finite and greater than one",
            ));
        }
        Ok(())
    }
}

/// Options of the nested sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedConfig {
    /// Number of live points.
    #[serde(default = "default_live_points")]
    pub n_live_points: usize,
    /// Target acceptance rate of the constrained random walk.
    #[serde(default = "default_sampling_efficiency")]
    pub sampling_efficiency: f64,
    /// Stop once the remaining evidence falls below this log-tolerance.
    #[serde(default = "default_evidence_tolerance")]
    pub evidence_tolerance: f64,
    /// Maximum number of iterations; 0 is unlimited.
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    /// Scale random-walk steps locally so separated modes are explored independently.
    #[serde(default = "default_true")]
    pub multimodal: bool,
    /// Write posterior samples, statistics and resume files.
    #[serde(default = "default_true")]
    pub write_output: bool,
    /// Accepted for compatibility with existing run files. The random-walk
    /// engine has no importance weights, so evidence always comes from the
    /// plain nested estimate.
    #[serde(default = "default_true")]
    pub importance_nested_sampling: bool,
    /// Master seed for live-point draws and replacements.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_live_points() -> usize {
    100
}

fn default_sampling_efficiency() -> f64 {
    0.8
}

fn default_evidence_tolerance() -> f64 {
    0.5
}

fn default_max_iter() -> usize {
    50
}

impl Default for NestedConfig {
    fn default() -> Self {
        Self {
            n_live_points: default_live_points(),
            sampling_efficiency: default_sampling_efficiency(),
            evidence_tolerance: default_evidence_tolerance(),
            max_iter: default_max_iter(),
            multimodal: true,
            write_output: true,
            importance_nested_sampling: true,
            seed: default_seed(),
        }
    }
}

impl NestedConfig {
    fn validate(&self) -> Result<(), HammerError> {
        if self.n_live_points < 2 {
            return Err(invalid("nested", "n_live_points", "at least two live points are required"));
        }
        if !(self.sampling_efficiency > 0.0 && self.sampling_efficiency <= 1.0) {
            return Err(invalid(
                "nested",
                "sampling_efficiency",
                "sampling efficiency must lie in (0, 1]",
            ));
        }
        if !(self.evidence_tolerance > 0.0 && self.evidence_tolerance.is_finite()) {
            return Err(invalid(
                "nested",
                "evidence_tolerance",
                "evidence tolerance must be positive",
            ));
        }
        Ok(())
    }
}

/// Options of the ensemble slice sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceConfig {
    /// Number of walkers.
    #[serde(default = "default_slice_walkers")]
    pub nwalkers: usize,
    /// Number of iterations.
    #[serde(default = "default_slice_steps")]
    pub nsteps: usize,
    /// Tuning tolerance on the expansion ratio.
    #[serde(default = "default_slice_tolerance")]
    pub tolerance: f64,
    /// Consecutive tuned iterations required before tuning stops.
    #[serde(default = "default_patience")]
    pub patience: usize,
    /// Maximum stepping-out steps per walker and iteration.
    #[serde(default = "default_slice_cap")]
    pub maxsteps: usize,
    /// Initial scale factor of the slice directions.
    #[serde(default = "default_mu")]
    pub mu: f64,
    /// Maximum shrinking rounds per half-ensemble update.
    #[serde(default = "default_slice_cap")]
    pub maxiter: usize,
    /// Evaluate each lock-step round of proposals with one batched call.
    #[serde(default)]
    pub vectorize: bool,
    /// Model-data entries recorded with every sample.
    #[serde(default)]
    pub blobs: Option<Vec<String>>,
    /// Report per-iteration progress at `info` level.
    #[serde(default = "default_true")]
    pub verbose: bool,
    /// Require an even walker count of at least twice the dimension.
    #[serde(default = "default_true")]
    pub check_walkers: bool,
    /// Shuffle walkers before splitting the ensemble each iteration.
    #[serde(default = "default_true")]
    pub shuffle_ensemble: bool,
    /// Skip stepping out once tuning has finished.
    #[serde(default)]
    pub light_mode: bool,
    /// Master seed for initial positions and moves.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_slice_walkers() -> usize {
    10
}

fn default_slice_steps() -> usize {
    100
}

fn default_slice_tolerance() -> f64 {
    0.05
}

fn default_patience() -> usize {
    5
}

fn default_slice_cap() -> usize {
    10_000
}

fn default_mu() -> f64 {
    1.0
}

impl Default for SliceConfig {
    fn default() -> Self {
        Self {
            nwalkers: default_slice_walkers(),
            nsteps: default_slice_steps(),
            tolerance: default_slice_tolerance(),
            patience: default_patience(),
            maxsteps: default_slice_cap(),
            mu: default_mu(),
            maxiter: default_slice_cap(),
            vectorize: false,
            blobs: None,
            verbose: true,
            check_walkers: true,
            shuffle_ensemble: true,
            light_mode: false,
            seed: default_seed(),
        }
    }
}

impl SliceConfig {
    /// Blob names, empty when none are recorded.
    pub fn blob_names(&self) -> &[String] {
        self.blobs.as_deref().unwrap_or(&[])
    }

    fn validate(&self) -> Result<(), HammerError> {
        if self.nwalkers < 4 {
            return Err(invalid("slice", "nwalkers", "at least four walkers are required"));
        }
        if !(self.mu > 0.0 && self.mu.is_finite()) {
            return Err(invalid("slice", "mu", "scale factor must be positive"));
        }
        if !(self.tolerance > 0.0) {
            return Err(invalid("slice", "tolerance", "tuning tolerance must be positive"));
        }
        if self.patience == 0 {
            return Err(invalid("slice", "patience", "patience must be positive"));
        }
        if self.maxsteps == 0 || self.maxiter == 0 {
            return Err(invalid(
                "slice",
                "maxiter",
                "expansion and contraction caps must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walker_count_is_even() {
        let config = EnsembleConfig {
            walkers_ratio: 3,
            ..EnsembleConfig::default()
        };
        assert_eq!(config.walker_count(3), 10);
        assert_eq!(config.walker_count(2), 6);
        assert_eq!(EnsembleConfig::default().walker_count(1), 8);
    }

    #[test]
    fn nested_options_accept_importance_flag() {
        let defaults: NestedConfig = serde_yaml::from_str("n_live_points: 20").unwrap();
        assert!(defaults.importance_nested_sampling);
        assert_eq!(defaults.n_live_points, 20);
        let plain: NestedConfig =
            serde_yaml::from_str("importance_nested_sampling: false").unwrap();
        assert!(!plain.importance_nested_sampling);
        assert!(plain.validate().is_ok());
    }

    #[test]
    fn nested_backend_writes_into_subdirectory() {
        let config = RunConfig::new("out", "model")
            .with_backend(BackendConfig::Nested(NestedConfig::default()));
        assert_eq!(config.backend_dir(), PathBuf::from("out").join(NESTED_SUBDIR));
        assert_eq!(config.file_prefix(), PathBuf::from("out").join("model"));
    }
}
