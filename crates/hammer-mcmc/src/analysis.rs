//! Helpers for inspecting run artefacts after sampling.

use std::fs;
use std::path::Path;

use hammer_core::errors::{ErrorInfo, HammerError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::storage::{ChainStorage, JsonlStorage, StoredChain};

/// Marginal summary of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterSummary {
    /// Posterior mean.
    pub mean: f64,
    /// Posterior standard deviation.
    pub std: f64,
    /// Smallest sampled value.
    pub min: f64,
    /// Largest sampled value.
    pub max: f64,
}

/// Weighted marginal summaries keyed by parameter name.
///
/// Weights need not be normalised; samples with zero weight still count
/// towards the range.
pub fn weighted_summary(
    names: &[String],
    samples: &[Vec<f64>],
    weights: &[f64],
) -> IndexMap<String, ParameterSummary> {
    let total: f64 = weights.iter().sum();
    names
        .iter()
        .enumerate()
        .map(|(dim, name)| {
            let values = samples.iter().map(|sample| sample[dim]);
            let (min, max) = values
                .clone()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
            let (mean, std) = if total > 0.0 {
                let mean = values.clone().zip(weights).map(|(v, w)| v * w).sum::<f64>() / total;
                let variance = values
                    .zip(weights)
                    .map(|(v, w)| w * (v - mean).powi(2))
                    .sum::<f64>()
                    / total;
                (mean, variance.sqrt())
            } else {
                (f64::NAN, f64::NAN)
            };
            (name.clone(), ParameterSummary { mean, std, min, max })
        })
        .collect()
}

/// Equally weighted marginal summaries.
pub fn summarize(names: &[String], samples: &[Vec<f64>]) -> IndexMap<String, ParameterSummary> {
    weighted_summary(names, samples, &vec![1.0; samples.len()])
}

/// Loads the ensemble chain stored under `prefix`.
pub fn load_chain(prefix: &Path) -> Result<StoredChain, HammerError> {
    let storage = JsonlStorage::from_prefix(prefix);
    storage.load()?.ok_or_else(|| {
        HammerError::Serde(
            ErrorInfo::new("store-missing", "no chain has been stored for this prefix")
                .with_context("path", storage.path().display().to_string()),
        )
    })
}

/// Posterior summary of the sample phase of a stored ensemble chain.
pub fn chain_summary(prefix: &Path) -> Result<IndexMap<String, ParameterSummary>, HammerError> {
    let chain = load_chain(prefix)?;
    Ok(summarize(&chain.header.param_names, &chain.flat_samples()))
}

/// Weighted samples read back from a nested-sampling `.txt` output.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedSamples {
    /// Posterior weight of each row.
    pub weights: Vec<f64>,
    /// Log-likelihood of each row.
    pub log_likelihoods: Vec<f64>,
    /// Parameter values of each row.
    pub samples: Vec<Vec<f64>>,
}

/// Parses a nested-sampling sample file (`weight  -2lnL  params...` per row).
pub fn load_weighted_samples(path: &Path) -> Result<WeightedSamples, HammerError> {
    let contents =
        fs::read_to_string(path).map_err(|err| HammerError::io("nested-samples-read", err, path))?;
    let mut parsed = WeightedSamples {
        weights: Vec::new(),
        log_likelihoods: Vec::new(),
        samples: Vec::new(),
    };
    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let values = line
            .split_whitespace()
            .map(str::parse::<f64>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| {
                HammerError::Serde(
                    ErrorInfo::new("nested-samples-parse", err.to_string())
                        .with_context("path", path.display().to_string())
                        .with_context("line", (index + 1).to_string()),
                )
            })?;
        let [weight, minus_two_log_l, params @ ..] = values.as_slice() else {
            return Err(HammerError::Serde(
                ErrorInfo::new("nested-samples-parse", "row has fewer than two columns")
                    .with_context("path", path.display().to_string())
                    .with_context("line", (index + 1).to_string()),
            ));
        };
        parsed.weights.push(*weight);
        parsed.log_likelihoods.push(-0.5 * minus_two_log_l);
        parsed.samples.push(params.to_vec());
    }
    Ok(parsed)
}
