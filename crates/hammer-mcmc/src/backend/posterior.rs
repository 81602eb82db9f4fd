//! Objective functions handed to the sampling engines.

use hammer_chain::LikelihoodComputationChain;
use hammer_core::errors::HammerError;
use hammer_core::ParameterSet;
use tracing::trace;

/// Log-probability of a point together with the requested blob values.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Log-probability; negative infinity for rejected points.
    pub log_prob: f64,
    /// First value of each requested model-data entry, NaN when unavailable.
    pub blobs: Vec<f64>,
}

impl Evaluation {
    fn rejected(blob_count: usize) -> Self {
        Self {
            log_prob: f64::NEG_INFINITY,
            blobs: vec![f64::NAN; blob_count],
        }
    }
}

/// Read-only view of a set-up chain exposing likelihood, prior transform and
/// prior check over raw parameter vectors.
#[derive(Debug, Clone, Copy)]
pub struct Posterior<'a> {
    chain: &'a LikelihoodComputationChain,
    params: &'a ParameterSet,
}

impl<'a> Posterior<'a> {
    /// Wraps `chain`, which must define sampled parameters.
    pub fn new(chain: &'a LikelihoodComputationChain) -> Result<Self, HammerError> {
        let params = chain.require_params()?;
        Ok(Self { chain, params })
    }

    /// Sampled parameters.
    pub fn params(&self) -> &'a ParameterSet {
        self.params
    }

    /// Sampled dimension.
    pub fn ndim(&self) -> usize {
        self.params.len()
    }

    /// Aggregate log-likelihood of the point with coordinates `values`.
    ///
    /// Points the simulator rejects score negative infinity; other module
    /// failures are returned.
    pub fn log_likelihood(&self, values: &[f64]) -> Result<f64, HammerError> {
        absorb_parameter_error(self.chain.log_likelihood(values))
    }

    /// Likelihood guarded by the bounds: out-of-bounds points score negative
    /// infinity without running the simulator.
    pub fn log_probability(&self, values: &[f64]) -> Result<f64, HammerError> {
        if is_out_of_bounds(self.params, values) {
            return Ok(f64::NEG_INFINITY);
        }
        self.log_likelihood(values)
    }

    /// Bounded log-probability plus the first value of each entry in `blobs`.
    pub fn evaluate(&self, values: &[f64], blobs: &[String]) -> Result<Evaluation, HammerError> {
        if is_out_of_bounds(self.params, values) {
            return Ok(Evaluation::rejected(blobs.len()));
        }
        let point = self.params.point_from_vector(values)?;
        let outcome = self.chain.build_model_data(&point).and_then(|data| {
            let log_prob = self.chain.compute_likelihoods(&data)?;
            let blobs = blobs
                .iter()
                .map(|name| {
                    data.get(name)
                        .and_then(|values| values.first().copied())
                        .unwrap_or(f64::NAN)
                })
                .collect();
            Ok(Evaluation { log_prob, blobs })
        });
        match outcome {
            Err(err) if err.is_parameter_domain() => {
                trace!(error = %err, "simulator rejected point");
                Ok(Evaluation::rejected(blobs.len()))
            }
            other => other,
        }
    }

    /// Maps unit-cube coordinates onto the parameter bounds in place.
    pub fn prior_transform(&self, cube: &mut [f64]) {
        prior_transform(self.params, cube);
    }
}

/// Maps unit-cube coordinates onto `[lower, upper]` of each parameter in place.
pub fn prior_transform(params: &ParameterSet, cube: &mut [f64]) {
    for (value, parameter) in cube.iter_mut().zip(params.iter()) {
        *value = parameter.lower + *value * parameter.span();
    }
}

/// Returns true when any coordinate lies outside its parameter's bounds.
pub fn is_out_of_bounds(params: &ParameterSet, values: &[f64]) -> bool {
    !params.contains(values)
}

/// Turns a parameter-domain error into a log-likelihood of negative infinity.
pub fn absorb_parameter_error(result: Result<f64, HammerError>) -> Result<f64, HammerError> {
    match result {
        Err(err) if err.is_parameter_domain() => {
            trace!(error = %err, "simulator rejected point");
            Ok(f64::NEG_INFINITY)
        }
        other => other,
    }
}
