#![deny(missing_docs)]

//! Core traits and data types for hammer sampling runs: the module capabilities
//! a likelihood chain is assembled from, ordered parameter sets, and the shared
//! error taxonomy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod errors;
pub mod params;
pub mod provenance;
pub mod rng;

pub use errors::{ErrorInfo, HammerError};
pub use params::{ParamPoint, Parameter, ParameterSet};
pub use provenance::{RunProvenance, SchemaVersion};
pub use rng::{derive_substream_seed, RngHandle};

/// Stable identity of a core or likelihood module.
///
/// Descriptors are compared by value when deciding whether a run may be
/// continued, so `kind` must not change between builds and `config` must
/// capture every setting that alters the simulated data or the likelihood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Type identifier of the module.
    pub kind: String,
    /// Module configuration relevant to run identity.
    #[serde(default)]
    pub config: serde_json::Value,
}

impl ModuleDescriptor {
    /// Creates a descriptor with an empty configuration.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            config: serde_json::Value::Null,
        }
    }

    /// Attaches a configuration payload.
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }
}

/// Simulated observables produced by core modules for a single point.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelData {
    entries: BTreeMap<String, Vec<f64>>,
}

impl ModelData {
    /// Creates an empty data context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an observable, replacing any previous value under the same key.
    pub fn insert(&mut self, key: impl Into<String>, values: Vec<f64>) {
        self.entries.insert(key.into(), values);
    }

    /// Returns the observable stored under `key`.
    pub fn get(&self, key: &str) -> Option<&[f64]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Returns the observable under `key` or a module error naming it.
    pub fn require(&self, key: &str) -> Result<&[f64], HammerError> {
        self.get(key).ok_or_else(|| {
            HammerError::Module(
                ErrorInfo::new("model-data-missing", "observable not produced by any core module")
                    .with_context("key", key),
            )
        })
    }

    /// Iterates over observable keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.keys().map(String::as_str)
    }
}

/// Capability contract for simulator core modules.
///
/// Core modules run in chain order for every evaluated point and may be called
/// concurrently from worker threads, hence `&self` evaluation and `Send + Sync`.
pub trait CoreModule: Send + Sync {
    /// Returns the module's identity for continuation checks.
    fn descriptor(&self) -> ModuleDescriptor;

    /// Prepares the module before sampling starts.
    fn setup(&mut self, _params: Option<&ParameterSet>) -> Result<(), HammerError> {
        Ok(())
    }

    /// Simulates observables for `point`, writing them into `data`.
    ///
    /// Points the simulator cannot handle must be reported as
    /// [`HammerError::Parameter`].
    fn build_model_data(&self, point: &ParamPoint, data: &mut ModelData)
        -> Result<(), HammerError>;
}

/// Capability contract for likelihood modules.
pub trait LikelihoodModule: Send + Sync {
    /// Returns the module's identity for continuation checks.
    fn descriptor(&self) -> ModuleDescriptor;

    /// Prepares the module (loads or simulates data) before sampling starts.
    fn setup(&mut self, _params: Option<&ParameterSet>) -> Result<(), HammerError> {
        Ok(())
    }

    /// Scores simulated observables, returning a log-likelihood.
    fn compute_likelihood(&self, data: &ModelData) -> Result<f64, HammerError>;

    /// Whether the module re-simulates its data or noise during setup.
    ///
    /// `None` means the module has no such behaviour.
    fn simulate(&self) -> Option<bool> {
        None
    }

    /// Enables or disables re-simulation; ignored by modules without the flag.
    fn set_simulate(&mut self, _simulate: bool) {}
}
