//! Sampling engines and the objective they share.

use hammer_core::errors::{ErrorInfo, HammerError};

use crate::config::BackendConfig;

/// Default affine-invariant ensemble sampler.
pub mod ensemble;
/// Nested sampler with evidence estimation.
#[cfg(feature = "nested")]
pub mod nested;
/// Likelihood, prior transform and prior check over raw vectors.
pub mod posterior;
/// Ensemble slice sampler.
#[cfg(feature = "slice")]
pub mod slice;

use ensemble::EnsembleSampler;
#[cfg(feature = "nested")]
use nested::NestedSummary;
#[cfg(feature = "slice")]
use slice::SliceSampler;

/// Whatever the selected backend returned.
#[derive(Debug, Clone)]
pub enum SamplerOutcome {
    /// Ensemble sampler with its chain.
    Ensemble(EnsembleSampler),
    /// Nested-sampling summary.
    #[cfg(feature = "nested")]
    Nested(NestedSummary),
    /// Slice sampler with its chain.
    #[cfg(feature = "slice")]
    Slice(SliceSampler),
}

impl SamplerOutcome {
    /// Name of the backend that produced this outcome.
    pub fn backend(&self) -> &'static str {
        match self {
            SamplerOutcome::Ensemble(_) => "ensemble",
            #[cfg(feature = "nested")]
            SamplerOutcome::Nested(_) => "nested",
            #[cfg(feature = "slice")]
            SamplerOutcome::Slice(_) => "slice",
        }
    }

    /// Iterations completed by the backend.
    pub fn iterations(&self) -> usize {
        match self {
            SamplerOutcome::Ensemble(sampler) => sampler.iterations(),
            #[cfg(feature = "nested")]
            SamplerOutcome::Nested(summary) => summary.iterations,
            #[cfg(feature = "slice")]
            SamplerOutcome::Slice(sampler) => sampler.iterations(),
        }
    }

    /// Posterior samples. Nested samples are unequally weighted.
    pub fn samples(&self) -> Vec<Vec<f64>> {
        match self {
            SamplerOutcome::Ensemble(sampler) => sampler.samples(),
            #[cfg(feature = "nested")]
            SamplerOutcome::Nested(summary) => summary.samples().to_vec(),
            #[cfg(feature = "slice")]
            SamplerOutcome::Slice(sampler) => sampler.samples(),
        }
    }

    /// The ensemble sampler, if that backend ran.
    pub fn as_ensemble(&self) -> Option<&EnsembleSampler> {
        match self {
            SamplerOutcome::Ensemble(sampler) => Some(sampler),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    /// The nested summary, if that backend ran.
    #[cfg(feature = "nested")]
    pub fn as_nested(&self) -> Option<&NestedSummary> {
        match self {
            SamplerOutcome::Nested(summary) => Some(summary),
            _ => None,
        }
    }

    /// The slice sampler, if that backend ran.
    #[cfg(feature = "slice")]
    pub fn as_slice(&self) -> Option<&SliceSampler> {
        match self {
            SamplerOutcome::Slice(sampler) => Some(sampler),
            _ => None,
        }
    }
}

/// Fails when the selected backend was compiled out of this build.
pub fn ensure_available(backend: &BackendConfig) -> Result<(), HammerError> {
    let (feature, available) = match backend {
        BackendConfig::Ensemble(_) => return Ok(()),
        BackendConfig::Nested(_) => ("nested", cfg!(feature = "nested")),
        BackendConfig::Slice(_) => ("slice", cfg!(feature = "slice")),
    };
    if available {
        return Ok(());
    }
    Err(HammerError::Dependency(
        ErrorInfo::new(
            "backend-unavailable",
            format!("the {feature} sampler is not available in this build"),
        )
        .with_hint(format!("rebuild hammer-mcmc with the `{feature}` feature")),
    ))
}
