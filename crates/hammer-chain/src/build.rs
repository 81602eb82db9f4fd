use hammer_core::errors::HammerError;
use hammer_core::{CoreModule, LikelihoodModule, ParameterSet};

use crate::chain::LikelihoodComputationChain;

/// One or many modules, normalised to an ordered list.
///
/// A single boxed module converts into a one-element list so callers can pass
/// either form to [`build_computation_chain`]. Modules that are already trait
/// objects are passed as a `Vec`.
pub struct ModuleList<M: ?Sized>(Vec<Box<M>>);

impl<M: ?Sized> ModuleList<M> {
    /// Number of modules in the list.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when the list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the list, yielding modules in order.
    pub fn into_inner(self) -> Vec<Box<M>> {
        self.0
    }
}

impl<T: CoreModule + 'static> From<Box<T>> for ModuleList<dyn CoreModule> {
    fn from(module: Box<T>) -> Self {
        Self(vec![module as Box<dyn CoreModule>])
    }
}

impl<T: LikelihoodModule + 'static> From<Box<T>> for ModuleList<dyn LikelihoodModule> {
    fn from(module: Box<T>) -> Self {
        Self(vec![module as Box<dyn LikelihoodModule>])
    }
}

impl<M: ?Sized> From<Vec<Box<M>>> for ModuleList<M> {
    fn from(modules: Vec<Box<M>>) -> Self {
        Self(modules)
    }
}

/// Builds a likelihood computation chain from core and likelihood modules.
///
/// Modules are added in the order supplied. When `setup` is true the chain's
/// setup runs once before returning; capability problems surface from the
/// modules' own setup calls.
pub fn build_computation_chain(
    core_modules: impl Into<ModuleList<dyn CoreModule>>,
    likelihood_modules: impl Into<ModuleList<dyn LikelihoodModule>>,
    params: Option<ParameterSet>,
    setup: bool,
) -> Result<LikelihoodComputationChain, HammerError> {
    let mut chain = LikelihoodComputationChain::new(params);
    for module in core_modules.into().into_inner() {
        chain.add_core_module(module);
    }
    for module in likelihood_modules.into().into_inner() {
        chain.add_likelihood_module(module);
    }
    if setup {
        chain.setup()?;
    }
    Ok(chain)
}
