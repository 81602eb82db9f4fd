//! Alternative backend: ensemble slice sampling with differential directions.
//!
//! Each half of the ensemble moves along directions spanned by pairs of
//! walkers from the other half. Slices are stepped out and shrunk in
//! lock-step: every round gathers one point per unfinished walker and
//! evaluates the whole round before any walker continues.

use hammer_core::errors::{ErrorInfo, HammerError};
use hammer_core::{ParameterSet, RngHandle};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, Exp1};
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::{debug, info};

use crate::backend::posterior::{Evaluation, Posterior};
use crate::config::SliceConfig;
use crate::determinism;
use crate::pool::WorkerPool;

/// Draws `count` values from a normal distribution centred on `loc` with
/// scale `scale`, truncated to `[lower, upper]`, by inverting the CDF.
pub fn truncated_normal<R: Rng + ?Sized>(
    loc: f64,
    scale: f64,
    lower: f64,
    upper: f64,
    count: usize,
    rng: &mut R,
) -> Result<Vec<f64>, HammerError> {
    let standard = Normal::new(0.0, 1.0).map_err(|err| {
        HammerError::Sampler(ErrorInfo::new("truncated-normal", err.to_string()))
    })?;
    let cdf_low = standard.cdf((lower - loc) / scale);
    let cdf_high = standard.cdf((upper - loc) / scale);
    Ok((0..count)
        .map(|_| {
            if cdf_high - cdf_low <= f64::EPSILON {
                return loc.clamp(lower, upper);
            }
            let u = cdf_low + rng.gen::<f64>() * (cdf_high - cdf_low);
            (loc + scale * standard.inverse_cdf(u)).clamp(lower, upper)
        })
        .collect())
}

/// Initial walker positions: per dimension, truncated normal draws centred on
/// the initial value with the parameter width as scale.
pub fn initial_positions<R: Rng + ?Sized>(
    params: &ParameterSet,
    nwalkers: usize,
    rng: &mut R,
) -> Result<Vec<Vec<f64>>, HammerError> {
    let columns = params
        .iter()
        .map(|p| truncated_normal(p.initial, p.width, p.lower, p.upper, nwalkers, &mut *rng))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((0..nwalkers)
        .map(|walker| columns.iter().map(|column| column[walker]).collect())
        .collect())
}

/// Adapts the direction scale towards an expansion ratio of one half.
fn tune_mu(mu: f64, expansions: usize, contractions: usize) -> f64 {
    if expansions == 0 {
        return mu;
    }
    2.0 * mu * expansions as f64 / (expansions + contractions) as f64
}

/// Evaluates rounds of points, either as one batch call or point by point.
struct Target<'a> {
    posterior: &'a Posterior<'a>,
    blobs: &'a [String],
    vectorize: bool,
    pool: Option<&'a WorkerPool>,
    calls: usize,
}

impl Target<'_> {
    fn evaluate(&mut self, points: &[Vec<f64>]) -> Result<Vec<Evaluation>, HammerError> {
        if points.is_empty() {
            return Ok(Vec::new());
        }
        if self.vectorize {
            self.calls += 1;
            return self.evaluate_batch(points);
        }
        self.calls += points.len();
        let (posterior, blobs) = (self.posterior, self.blobs);
        match self.pool {
            Some(pool) => pool
                .map(points, |point| posterior.evaluate(point, blobs))
                .into_iter()
                .collect(),
            None => self.evaluate_batch(points),
        }
    }

    fn evaluate_batch(&self, points: &[Vec<f64>]) -> Result<Vec<Evaluation>, HammerError> {
        points
            .iter()
            .map(|point| self.posterior.evaluate(point, self.blobs))
            .collect()
    }
}

struct Slice {
    origin: Vec<f64>,
    direction: Vec<f64>,
    log_y: f64,
    left: f64,
    right: f64,
}

impl Slice {
    fn at(&self, t: f64) -> Vec<f64> {
        self.origin
            .iter()
            .zip(&self.direction)
            .map(|(x, d)| x + t * d)
            .collect()
    }
}

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
}

/// Ensemble slice sampler returned by the alternative backend.
#[derive(Debug, Clone)]
pub struct SliceSampler {
    config: SliceConfig,
    param_names: Vec<String>,
    ndim: usize,
    positions: Vec<Vec<f64>>,
    current: Vec<Evaluation>,
    chain: Vec<Vec<Vec<f64>>>,
    chain_log_probs: Vec<Vec<f64>>,
    chain_blobs: Vec<Vec<Vec<f64>>>,
    mu: f64,
    tuning: bool,
    patience_count: usize,
    tuned_at: Option<usize>,
    expansions: usize,
    contractions: usize,
    calls: usize,
}

impl SliceSampler {
    /// Parameter names in dimension order.
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Number of walkers.
    pub fn nwalkers(&self) -> usize {
        self.positions.len()
    }

    /// Sampled dimension.
    pub fn ndim(&self) -> usize {
        self.ndim
    }

    /// Completed iterations.
    pub fn iterations(&self) -> usize {
        self.chain.len()
    }

    /// Per-iteration walker positions.
    pub fn chain(&self) -> &[Vec<Vec<f64>>] {
        &self.chain
    }

    /// Positions flattened iteration-major, then walker.
    pub fn samples(&self) -> Vec<Vec<f64>> {
        self.chain.iter().flatten().cloned().collect()
    }

    /// Log-probabilities matching [`samples`](Self::samples).
    pub fn log_probs(&self) -> Vec<f64> {
        self.chain_log_probs.iter().flatten().copied().collect()
    }

    /// Recorded blob values per iteration and walker, in configured order.
    pub fn blobs(&self) -> &[Vec<Vec<f64>>] {
        &self.chain_blobs
    }

    /// Current direction scale.
    pub fn mu(&self) -> f64 {
        self.mu
    }

    /// Iteration after which tuning stopped, if it did.
    pub fn tuned_at(&self) -> Option<usize> {
        self.tuned_at
    }

    /// Total stepping-out expansions.
    pub fn expansions(&self) -> usize {
        self.expansions
    }

    /// Total shrinking contractions.
    pub fn contractions(&self) -> usize {
        self.contractions
    }

    /// Calls made into the log-probability function; a batched round counts once.
    pub fn log_prob_calls(&self) -> usize {
        self.calls
    }

    fn step_out(
        &mut self,
        target: &mut Target<'_>,
        slices: &mut [Slice],
        side: Side,
    ) -> Result<usize, HammerError> {
        let mut pending: Vec<usize> = (0..slices.len()).collect();
        let mut expansions = 0;
        for _ in 0..self.config.maxsteps {
            if pending.is_empty() {
                break;
            }
            let points: Vec<Vec<f64>> = pending
                .iter()
                .map(|&index| {
                    let slice = &slices[index];
                    match side {
                        Side::Left => slice.at(slice.left),
                        Side::Right => slice.at(slice.right),
                    }
                })
                .collect();
            let evaluations = target.evaluate(&points)?;
            let mut still_inside = Vec::with_capacity(pending.len());
            for (index, evaluation) in pending.into_iter().zip(evaluations) {
                let slice = &mut slices[index];
                if evaluation.log_prob > slice.log_y {
                    match side {
                        Side::Left => slice.left -= 1.0,
                        Side::Right => slice.right += 1.0,
                    }
                    expansions += 1;
                    still_inside.push(index);
                }
            }
            pending = still_inside;
        }
        Ok(expansions)
    }

    fn shrink(
        &mut self,
        target: &mut Target<'_>,
        slices: &mut [Slice],
        rng: &mut RngHandle,
    ) -> Result<(Vec<(Vec<f64>, Evaluation)>, usize), HammerError> {
        let mut accepted: Vec<Option<(Vec<f64>, Evaluation)>> = vec![None; slices.len()];
        let mut pending: Vec<usize> = (0..slices.len()).collect();
        let mut contractions = 0;
        let mut rounds = 0;
        while !pending.is_empty() {
            if rounds >= self.config.maxiter {
                return Err(HammerError::Sampler(
                    ErrorInfo::new("slice-maxiter", "slice shrinking did not terminate")
                        .with_context("maxiter", self.config.maxiter.to_string())
                        .with_hint("increase maxiter or check the posterior for plateaus"),
                ));
            }
            let draws: Vec<f64> = pending
                .iter()
                .map(|&index| {
                    let slice = &slices[index];
                    slice.left + rng.gen::<f64>() * (slice.right - slice.left)
                })
                .collect();
            let points: Vec<Vec<f64>> = pending
                .iter()
                .zip(&draws)
                .map(|(&index, &t)| slices[index].at(t))
                .collect();
            let evaluations = target.evaluate(&points)?;
            let mut unfinished = Vec::with_capacity(pending.len());
            for (((index, t), point), evaluation) in
                pending.into_iter().zip(draws).zip(points).zip(evaluations)
            {
                let slice = &mut slices[index];
                if evaluation.log_prob > slice.log_y {
                    accepted[index] = Some((point, evaluation));
                } else {
                    if t < 0.0 {
                        slice.left = t;
                    } else {
                        slice.right = t;
                    }
                    contractions += 1;
                    unfinished.push(index);
                }
            }
            pending = unfinished;
            rounds += 1;
        }
        Ok((accepted.into_iter().flatten().collect(), contractions))
    }

    fn update_half(
        &mut self,
        target: &mut Target<'_>,
        active: &[usize],
        complement: &[usize],
        rng: &mut RngHandle,
    ) -> Result<(usize, usize), HammerError> {
        let mut slices: Vec<Slice> = active
            .iter()
            .map(|&walker| {
                let pair: Vec<usize> = complement.choose_multiple(&mut *rng, 2).copied().collect();
                let direction = self.positions[pair[0]]
                    .iter()
                    .zip(&self.positions[pair[1]])
                    .map(|(a, b)| self.mu * (a - b))
                    .collect();
                let drop: f64 = Exp1.sample(&mut *rng);
                let left = -rng.gen::<f64>();
                Slice {
                    origin: self.positions[walker].clone(),
                    direction,
                    log_y: self.current[walker].log_prob - drop,
                    left,
                    right: left + 1.0,
                }
            })
            .collect();

        let mut expansions = 0;
        if self.tuning || !self.config.light_mode {
            expansions += self.step_out(target, &mut slices, Side::Left)?;
            expansions += self.step_out(target, &mut slices, Side::Right)?;
        }
        let (moved, contractions) = self.shrink(target, &mut slices, rng)?;
        for (&walker, (position, evaluation)) in active.iter().zip(moved) {
            self.positions[walker] = position;
            self.current[walker] = evaluation;
        }
        Ok((expansions, contractions))
    }

    fn iterate(
        &mut self,
        target: &mut Target<'_>,
        iteration: usize,
    ) -> Result<(), HammerError> {
        let seed = determinism::iteration_seed(self.config.seed, iteration);
        let mut rng = RngHandle::from_seed(seed);
        let mut order: Vec<usize> = (0..self.positions.len()).collect();
        if self.config.shuffle_ensemble {
            order.shuffle(&mut rng);
        }
        let (first, second) = order.split_at(order.len() / 2);
        let (e1, c1) = self.update_half(target, first, second, &mut rng)?;
        let (e2, c2) = self.update_half(target, second, first, &mut rng)?;
        let (expansions, contractions) = (e1 + e2, c1 + c2);
        self.expansions += expansions;
        self.contractions += contractions;

        if self.tuning {
            let total = expansions + contractions;
            let ratio = if total == 0 {
                0.5
            } else {
                expansions as f64 / total as f64
            };
            self.mu = tune_mu(self.mu, expansions, contractions);
            if (ratio - 0.5).abs() < self.config.tolerance {
                self.patience_count += 1;
            } else {
                self.patience_count = 0;
            }
            if self.patience_count >= self.config.patience {
                self.tuning = false;
                self.tuned_at = Some(iteration);
                debug!(iteration, mu = self.mu, "slice tuning finished");
            }
        }

        self.chain.push(self.positions.clone());
        self.chain_log_probs
            .push(self.current.iter().map(|e| e.log_prob).collect());
        if !target.blobs.is_empty() {
            self.chain_blobs
                .push(self.current.iter().map(|e| e.blobs.clone()).collect());
        }
        if self.config.verbose {
            info!(iteration, expansions, contractions, mu = self.mu, "slice iteration");
        } else {
            debug!(iteration, expansions, contractions, mu = self.mu, "slice iteration");
        }
        Ok(())
    }
}

/// Runs the ensemble slice sampler over `posterior` for `config.nsteps` iterations.
///
/// Without `vectorize`, points are evaluated one call at a time, spread over
/// `pool` when one is given.
pub fn run_slice(
    posterior: &Posterior<'_>,
    config: &SliceConfig,
    pool: Option<&WorkerPool>,
) -> Result<SliceSampler, HammerError> {
    let ndim = posterior.ndim();
    if config.check_walkers && (config.nwalkers % 2 != 0 || config.nwalkers < 2 * ndim) {
        return Err(HammerError::Config(
            ErrorInfo::new(
                "slice-walkers",
                "the number of walkers must be even and at least twice the dimension",
            )
            .with_context("nwalkers", config.nwalkers.to_string())
            .with_context("ndim", ndim.to_string()),
        ));
    }

    let mut rng = RngHandle::from_seed(determinism::init_seed(config.seed));
    let positions = initial_positions(posterior.params(), config.nwalkers, &mut rng)?;
    let mut target = Target {
        posterior,
        blobs: config.blob_names(),
        vectorize: config.vectorize,
        pool,
        calls: 0,
    };
    let current = target.evaluate(&positions)?;
    if current.iter().any(|evaluation| !evaluation.log_prob.is_finite()) {
        return Err(HammerError::Sampler(
            ErrorInfo::new(
                "slice-initial-state",
                "initial walker positions must have finite log-probability",
            )
            .with_hint("check the initial values and widths against the simulator's domain"),
        ));
    }

    let mut sampler = SliceSampler {
        config: config.clone(),
        param_names: posterior.params().names().map(str::to_string).collect(),
        ndim,
        positions,
        current,
        chain: Vec::with_capacity(config.nsteps),
        chain_log_probs: Vec::with_capacity(config.nsteps),
        chain_blobs: Vec::new(),
        mu: config.mu,
        tuning: true,
        patience_count: 0,
        tuned_at: None,
        expansions: 0,
        contractions: 0,
        calls: 0,
    };
    for iteration in 0..config.nsteps {
        sampler.iterate(&mut target, iteration)?;
    }
    sampler.calls = target.calls;
    info!(
        walkers = config.nwalkers,
        iterations = sampler.iterations(),
        mu = sampler.mu,
        calls = sampler.calls,
        "slice sampling finished"
    );
    Ok(sampler)
}
