//! Nested-sampling backend.
//!
//! Live points are drawn uniformly in the unit hypercube and mapped onto the
//! parameter bounds by the prior transform. Each iteration retires the live
//! point with the lowest likelihood, credits it with the prior-mass shell
//! `X_{i} - X_{i+1}` where `X_i = exp(-i / n_live)`, and replaces it by a
//! constrained random walk started from another live point.

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use hammer_core::errors::{ErrorInfo, HammerError};
use hammer_core::RngHandle;
use indexmap::IndexMap;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::{weighted_summary, ParameterSummary};
use crate::backend::posterior::Posterior;
use crate::checkpoint::{
    DeadPoint, LivePoint, NestedCheckpoint, NestedLayout, NESTED_CHECKPOINT_SCHEMA,
};
use crate::config::NestedConfig;
use crate::determinism;

const WALK_STEPS: usize = 20;
const MIN_STEP: f64 = 1e-3;
const MAX_STEP: f64 = 10.0;
const MIN_LENGTH: f64 = 1e-6;

/// Result of a nested-sampling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedSummary {
    /// Success sentinel; set once the run finalised its evidence.
    pub completed: bool,
    /// Whether the evidence tolerance was reached before the iteration cap.
    pub converged: bool,
    /// Natural log of the evidence.
    pub log_evidence: f64,
    /// Standard error of `log_evidence`.
    pub log_evidence_error: f64,
    /// Kullback-Leibler information of the posterior relative to the prior.
    pub information: f64,
    /// Iterations completed, including resumed ones.
    pub iterations: usize,
    /// Parameter names in dimension order.
    pub param_names: Vec<String>,
    /// Retired points followed by the final live set.
    pub samples: Vec<Vec<f64>>,
    /// Log-likelihood of each sample.
    pub log_likelihoods: Vec<f64>,
    /// Normalised posterior weight of each sample.
    pub weights: Vec<f64>,
    /// Files written by the run.
    pub outputs: Vec<PathBuf>,
}

impl NestedSummary {
    /// Weighted posterior samples.
    pub fn samples(&self) -> &[Vec<f64>] {
        &self.samples
    }

    /// Weighted mean and spread of each parameter.
    pub fn posterior_summary(&self) -> IndexMap<String, ParameterSummary> {
        weighted_summary(&self.param_names, &self.samples, &self.weights)
    }
}

#[derive(Serialize)]
struct NestedStats<'a> {
    log_evidence: f64,
    log_evidence_error: f64,
    information: f64,
    iterations: usize,
    converged: bool,
    n_live_points: usize,
    parameters: IndexMap<String, ParameterSummary>,
    basename: &'a str,
}

struct NestedState {
    live: Vec<LivePoint>,
    dead: Vec<DeadPoint>,
    iteration: usize,
    step_scale: f64,
    log_z: f64,
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

fn log_add_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let max = a.max(b);
    max + ((a - max).exp() + (b - max).exp()).ln()
}

/// Log of the prior mass retired at iteration `iteration` with `n_live` live points.
fn log_shell_width(iteration: usize, n_live: usize) -> f64 {
    let n = n_live as f64;
    -(iteration as f64) / n + (-(-1.0 / n).exp_m1()).ln()
}

impl NestedState {
    fn initial(posterior: &Posterior<'_>, config: &NestedConfig) -> Result<Self, HammerError> {
        let mut rng = RngHandle::from_seed(determinism::init_seed(config.seed));
        let mut live = Vec::with_capacity(config.n_live_points);
        for _ in 0..config.n_live_points {
            let unit: Vec<f64> = (0..posterior.ndim()).map(|_| rng.gen::<f64>()).collect();
            let mut physical = unit.clone();
            posterior.prior_transform(&mut physical);
            let log_likelihood = finite(posterior.log_likelihood(&physical)?);
            live.push(LivePoint {
                unit,
                physical,
                log_likelihood,
            });
        }
        if live.iter().all(|point| point.log_likelihood.is_none()) {
            return Err(HammerError::Sampler(
                ErrorInfo::new(
                    "nested-initial-state",
                    "every initial live point has zero likelihood",
                )
                .with_context("n_live_points", config.n_live_points.to_string()),
            ));
        }
        Ok(Self {
            live,
            dead: Vec::new(),
            iteration: 0,
            step_scale: 1.0,
            log_z: f64::NEG_INFINITY,
        })
    }

    fn from_checkpoint(checkpoint: NestedCheckpoint) -> Self {
        let log_z = checkpoint
            .dead
            .iter()
            .filter_map(|point| point.log_weight)
            .fold(f64::NEG_INFINITY, log_add_exp);
        Self {
            live: checkpoint.live,
            dead: checkpoint.dead,
            iteration: checkpoint.iteration,
            step_scale: checkpoint.step_scale,
            log_z,
        }
    }

    fn checkpoint(&self, config: &NestedConfig, ndim: usize) -> NestedCheckpoint {
        NestedCheckpoint {
            schema_version: NESTED_CHECKPOINT_SCHEMA,
            seed: config.seed,
            ndim,
            n_live_points: self.live.len(),
            iteration: self.iteration,
            step_scale: self.step_scale,
            live: self.live.clone(),
            dead: self.dead.clone(),
        }
    }

    fn max_log_l(&self) -> f64 {
        self.live
            .iter()
            .map(LivePoint::log_l)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    fn is_converged(&self, tolerance: f64) -> bool {
        let log_x = -(self.iteration as f64) / self.live.len() as f64;
        let remaining = self.max_log_l() + log_x - self.log_z;
        remaining.exp().ln_1p() < tolerance
    }

    fn step_lengths(&self, start: usize, multimodal: bool, ndim: usize) -> Vec<f64> {
        if multimodal {
            let origin = &self.live[start].unit;
            let nearest = self
                .live
                .iter()
                .enumerate()
                .filter(|(index, _)| *index != start)
                .map(|(_, point)| {
                    point
                        .unit
                        .iter()
                        .zip(origin)
                        .map(|(a, b)| (a - b).powi(2))
                        .sum::<f64>()
                        .sqrt()
                })
                .fold(f64::INFINITY, f64::min);
            return vec![nearest.clamp(MIN_LENGTH, 1.0); ndim];
        }
        let n = self.live.len() as f64;
        (0..ndim)
            .map(|dim| {
                let mean = self.live.iter().map(|point| point.unit[dim]).sum::<f64>() / n;
                let variance = self
                    .live
                    .iter()
                    .map(|point| (point.unit[dim] - mean).powi(2))
                    .sum::<f64>()
                    / n;
                variance.sqrt().max(MIN_LENGTH)
            })
            .collect()
    }

    fn step(
        &mut self,
        posterior: &Posterior<'_>,
        config: &NestedConfig,
    ) -> Result<(), HammerError> {
        let n_live = self.live.len();
        let ndim = posterior.ndim();
        let worst = self
            .live
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.log_l().total_cmp(&b.log_l()))
            .map(|(index, _)| index)
            .unwrap_or(0);
        let threshold = self.live[worst].log_l();
        let log_weight = log_shell_width(self.iteration, n_live) + threshold;
        self.log_z = log_add_exp(self.log_z, log_weight);
        self.dead.push(DeadPoint {
            physical: self.live[worst].physical.clone(),
            log_likelihood: finite(threshold),
            log_weight: finite(log_weight),
        });

        let mut rng =
            RngHandle::from_seed(determinism::replacement_seed(config.seed, self.iteration));
        let candidates: Vec<usize> = (0..n_live)
            .filter(|&index| index != worst && self.live[index].log_l() > threshold)
            .collect();
        let start = if candidates.is_empty() {
            (worst + rng.gen_range(1..n_live)) % n_live
        } else {
            candidates[rng.gen_range(0..candidates.len())]
        };
        let lengths = self.step_lengths(start, config.multimodal, ndim);

        let mut current = self.live[start].clone();
        let mut accepted = 0usize;
        for _ in 0..WALK_STEPS {
            let unit: Vec<f64> = current
                .unit
                .iter()
                .zip(&lengths)
                .map(|(value, length)| {
                    let offset: f64 = StandardNormal.sample(&mut rng);
                    value + self.step_scale * length * offset
                })
                .collect();
            if unit.iter().any(|value| !(0.0..=1.0).contains(value)) {
                continue;
            }
            let mut physical = unit.clone();
            posterior.prior_transform(&mut physical);
            let log_l = posterior.log_likelihood(&physical)?;
            if log_l > threshold {
                current = LivePoint {
                    unit,
                    physical,
                    log_likelihood: finite(log_l),
                };
                accepted += 1;
            }
        }
        let rate = accepted as f64 / WALK_STEPS as f64;
        self.step_scale =
            (self.step_scale * (rate - config.sampling_efficiency).exp()).clamp(MIN_STEP, MAX_STEP);
        self.live[worst] = current;
        self.iteration += 1;
        Ok(())
    }

    fn finish(self, posterior: &Posterior<'_>, converged: bool) -> NestedSummary {
        let n_live = self.live.len() as f64;
        let log_x = -(self.iteration as f64) / n_live;
        let mut log_z = self.log_z;
        let mut samples = Vec::with_capacity(self.dead.len() + self.live.len());
        let mut log_likelihoods = Vec::with_capacity(samples.capacity());
        let mut log_weights = Vec::with_capacity(samples.capacity());
        for point in self.dead {
            samples.push(point.physical);
            log_likelihoods.push(point.log_likelihood.unwrap_or(f64::NEG_INFINITY));
            log_weights.push(point.log_weight.unwrap_or(f64::NEG_INFINITY));
        }
        for point in self.live {
            let log_l = point.log_l();
            let log_weight = log_x - n_live.ln() + log_l;
            log_z = log_add_exp(log_z, log_weight);
            samples.push(point.physical);
            log_likelihoods.push(log_l);
            log_weights.push(log_weight);
        }
        let weights: Vec<f64> = log_weights.iter().map(|lw| (lw - log_z).exp()).collect();
        let information = weights
            .iter()
            .zip(&log_likelihoods)
            .filter(|(weight, log_l)| **weight > 0.0 && log_l.is_finite())
            .map(|(weight, log_l)| weight * log_l)
            .sum::<f64>()
            - log_z;
        NestedSummary {
            completed: true,
            converged,
            log_evidence: log_z,
            log_evidence_error: (information.max(0.0) / n_live).sqrt(),
            information,
            iterations: self.iteration,
            param_names: posterior.params().names().map(str::to_string).collect(),
            samples,
            log_likelihoods,
            weights,
            outputs: Vec::new(),
        }
    }
}

fn restore(
    layout: &NestedLayout,
    config: &NestedConfig,
    ndim: usize,
) -> Option<NestedCheckpoint> {
    let path = layout.resume_path();
    if !path.exists() {
        return None;
    }
    match NestedCheckpoint::load(&path) {
        Ok(checkpoint) if checkpoint.is_resumable(config.seed, ndim, config.n_live_points) => {
            Some(checkpoint)
        }
        Ok(_) => {
            warn!(path = %path.display(), "resume file belongs to a different run; starting over");
            None
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "unreadable resume file; starting over");
            None
        }
    }
}

fn write_samples(summary: &NestedSummary, path: &std::path::Path) -> Result<(), HammerError> {
    let mut text = String::new();
    for ((weight, log_l), sample) in summary
        .weights
        .iter()
        .zip(&summary.log_likelihoods)
        .zip(&summary.samples)
    {
        let _ = write!(text, "{weight:.15e} {:.15e}", -2.0 * log_l);
        for value in sample {
            let _ = write!(text, " {value:.15e}");
        }
        text.push('\n');
    }
    fs::write(path, text).map_err(|err| HammerError::io("nested-samples-write", err, path))
}

fn write_stats(
    summary: &NestedSummary,
    config: &NestedConfig,
    layout: &NestedLayout,
) -> Result<(), HammerError> {
    let path = layout.stats_path();
    let basename = layout.basename();
    let basename = basename.display().to_string();
    let stats = NestedStats {
        log_evidence: summary.log_evidence,
        log_evidence_error: summary.log_evidence_error,
        information: summary.information,
        iterations: summary.iterations,
        converged: summary.converged,
        n_live_points: config.n_live_points,
        parameters: summary.posterior_summary(),
        basename: &basename,
    };
    let json = serde_json::to_string_pretty(&stats)
        .map_err(|err| HammerError::io("nested-stats-serialize", err, &path))?;
    fs::write(&path, json).map_err(|err| HammerError::io("nested-stats-write", err, &path))
}

/// Runs the nested sampler over `posterior`.
///
/// With `resume` set a compatible resume file under `layout` is picked up and
/// only the remaining iterations are computed.
pub fn run_nested(
    posterior: &Posterior<'_>,
    config: &NestedConfig,
    layout: &NestedLayout,
    resume: bool,
) -> Result<NestedSummary, HammerError> {
    let ndim = posterior.ndim();
    if config.importance_nested_sampling {
        debug!("importance weighting unavailable; using plain nested weights");
    }
    let resume_path = layout.resume_path();
    let mut state = match resume.then(|| restore(layout, config, ndim)).flatten() {
        Some(checkpoint) => {
            info!(iteration = checkpoint.iteration, "resuming nested sampling");
            NestedState::from_checkpoint(checkpoint)
        }
        None => NestedState::initial(posterior, config)?,
    };

    let converged = loop {
        if state.is_converged(config.evidence_tolerance) {
            break true;
        }
        if config.max_iter > 0 && state.iteration >= config.max_iter {
            break false;
        }
        state.step(posterior, config)?;
        if config.write_output && state.iteration % config.n_live_points == 0 {
            state.checkpoint(config, ndim).store(&resume_path)?;
            debug!(iteration = state.iteration, "wrote nested resume file");
        }
    };
    if config.write_output {
        state.checkpoint(config, ndim).store(&resume_path)?;
    }

    let mut summary = state.finish(posterior, converged);
    if config.write_output {
        write_samples(&summary, &layout.samples_path())?;
        write_stats(&summary, config, layout)?;
        summary.outputs = vec![resume_path, layout.samples_path(), layout.stats_path()];
    }
    info!(
        iterations = summary.iterations,
        log_evidence = summary.log_evidence,
        log_evidence_error = summary.log_evidence_error,
        converged,
        "nested sampling finished"
    );
    Ok(summary)
}
