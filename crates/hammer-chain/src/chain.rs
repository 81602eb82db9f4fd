use std::fmt;

use hammer_core::errors::{ErrorInfo, HammerError};
use hammer_core::{CoreModule, LikelihoodModule, ModelData, ParamPoint, ParameterSet};
use tracing::debug;

use crate::descriptor::{ChainDescriptor, DESCRIPTOR_SCHEMA};

/// Ordered pipeline of core modules and likelihood modules over a parameter set.
///
/// After [`setup`](Self::setup) the chain is only read, so a shared reference
/// can be handed to every worker evaluating points in parallel.
pub struct LikelihoodComputationChain {
    params: Option<ParameterSet>,
    core_modules: Vec<Box<dyn CoreModule>>,
    likelihood_modules: Vec<Box<dyn LikelihoodModule>>,
    is_setup: bool,
}

impl LikelihoodComputationChain {
    /// Creates an empty chain sampling `params`.
    pub fn new(params: Option<ParameterSet>) -> Self {
        Self {
            params,
            core_modules: Vec::new(),
            likelihood_modules: Vec::new(),
            is_setup: false,
        }
    }

    /// Appends a core module; evaluation follows insertion order.
    pub fn add_core_module(&mut self, module: Box<dyn CoreModule>) {
        self.core_modules.push(module);
    }

    /// Appends a likelihood module; evaluation follows insertion order.
    pub fn add_likelihood_module(&mut self, module: Box<dyn LikelihoodModule>) {
        self.likelihood_modules.push(module);
    }

    /// Sampled parameters, if any.
    pub fn params(&self) -> Option<&ParameterSet> {
        self.params.as_ref()
    }

    /// Sampled parameters, or a configuration error when the chain has none.
    pub fn require_params(&self) -> Result<&ParameterSet, HammerError> {
        self.params.as_ref().ok_or_else(|| {
            HammerError::Config(ErrorInfo::new(
                "chain-without-params",
                "the chain does not define any sampled parameters",
            ))
        })
    }

    /// Core modules in evaluation order.
    pub fn core_modules(&self) -> &[Box<dyn CoreModule>] {
        &self.core_modules
    }

    /// Likelihood modules in evaluation order.
    pub fn likelihood_modules(&self) -> &[Box<dyn LikelihoodModule>] {
        &self.likelihood_modules
    }

    /// Mutable access to likelihood modules, used to clear re-simulation flags.
    pub fn likelihood_modules_mut(&mut self) -> &mut [Box<dyn LikelihoodModule>] {
        &mut self.likelihood_modules
    }

    /// Whether [`setup`](Self::setup) has already run.
    pub fn is_setup(&self) -> bool {
        self.is_setup
    }

    /// Runs every module's setup once, core modules first.
    ///
    /// Subsequent calls are no-ops.
    pub fn setup(&mut self) -> Result<(), HammerError> {
        if self.is_setup {
            return Ok(());
        }
        let params = self.params.as_ref();
        for module in &mut self.core_modules {
            debug!(module = %module.descriptor().kind, "setting up core module");
            module.setup(params)?;
        }
        for module in &mut self.likelihood_modules {
            debug!(module = %module.descriptor().kind, "setting up likelihood module");
            module.setup(params)?;
        }
        self.is_setup = true;
        Ok(())
    }

    /// Runs all core modules in order, producing the simulated observables for `point`.
    pub fn build_model_data(&self, point: &ParamPoint) -> Result<ModelData, HammerError> {
        let mut data = ModelData::new();
        for module in &self.core_modules {
            module.build_model_data(point, &mut data)?;
        }
        Ok(data)
    }

    /// Sums the log-likelihoods of every likelihood module.
    pub fn compute_likelihoods(&self, data: &ModelData) -> Result<f64, HammerError> {
        let mut total = 0.0;
        for module in &self.likelihood_modules {
            total += module.compute_likelihood(data)?;
        }
        Ok(total)
    }

    /// Maps a raw vector onto named parameters and evaluates the full chain.
    ///
    /// Parameter-domain errors are returned unchanged; callers decide how to
    /// absorb them.
    pub fn log_likelihood(&self, values: &[f64]) -> Result<f64, HammerError> {
        let point = self.require_params()?.point_from_vector(values)?;
        let data = self.build_model_data(&point)?;
        self.compute_likelihoods(&data)
    }

    /// Returns true when every coordinate lies within the parameter bounds.
    pub fn is_within_bounds(&self, values: &[f64]) -> bool {
        self.params
            .as_ref()
            .map(|params| params.contains(values))
            .unwrap_or(false)
    }

    /// Serializable identity of this chain.
    pub fn descriptor(&self) -> ChainDescriptor {
        ChainDescriptor {
            schema_version: DESCRIPTOR_SCHEMA,
            core_modules: self.core_modules.iter().map(|m| m.descriptor()).collect(),
            likelihood_modules: self
                .likelihood_modules
                .iter()
                .map(|m| m.descriptor())
                .collect(),
            params: self.params.clone(),
        }
    }
}

impl fmt::Debug for LikelihoodComputationChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core: Vec<_> = self.core_modules.iter().map(|m| m.descriptor().kind).collect();
        let likelihoods: Vec<_> = self
            .likelihood_modules
            .iter()
            .map(|m| m.descriptor().kind)
            .collect();
        f.debug_struct("LikelihoodComputationChain")
            .field("params", &self.params)
            .field("core_modules", &core)
            .field("likelihood_modules", &likelihoods)
            .field("is_setup", &self.is_setup)
            .finish()
    }
}
