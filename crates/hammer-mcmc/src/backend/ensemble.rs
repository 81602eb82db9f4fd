//! Default backend: affine-invariant ensemble sampler driven by stretch moves.
//!
//! The ensemble is split into two halves; each half proposes against the
//! other and its proposals are evaluated in parallel on the worker pool.
//! Every walker draws from its own seed stream, so the chain does not depend
//! on how the pool schedules work.

use std::path::{Path, PathBuf};

use hammer_core::errors::{ErrorInfo, HammerError};
use hammer_core::{ParameterSet, RngHandle};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::{debug, info, warn};

use crate::backend::posterior::Posterior;
use crate::config::EnsembleConfig;
use crate::determinism;
use crate::pool::WorkerPool;
use crate::storage::{
    ChainStorage, IterationRecord, Phase, StoreHeader, StoredChain, STORE_SCHEMA,
};

const MAX_BALL_DRAWS: usize = 1_000;

/// How a run treats a chain already present in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnsembleStart {
    /// Extend a compatible stored chain instead of starting over.
    pub continue_sampling: bool,
    /// When starting over, keep a complete stored burn-in.
    pub reuse_burnin: bool,
}

/// Goodman & Weare stretch move with scale `a`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StretchMove {
    a: f64,
}

impl StretchMove {
    /// Creates the move; `a` must exceed one.
    pub fn new(a: f64) -> Result<Self, HammerError> {
        if !(a > 1.0 && a.is_finite()) {
            return Err(HammerError::Config(
                ErrorInfo::new("stretch-scale", "stretch scale must be finite and greater than one")
                    .with_context("a", a.to_string()),
            ));
        }
        Ok(Self { a })
    }

    /// Draws a stretch factor from `g(z) ∝ 1/sqrt(z)` on `[1/a, a]`.
    pub fn sample_z<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let u: f64 = rng.gen();
        ((self.a - 1.0) * u + 1.0).powi(2) / self.a
    }

    /// Log of the acceptance ratio of a proposal stretched by `z`.
    pub fn log_acceptance(&self, z: f64, ndim: usize, log_prob_old: f64, log_prob_new: f64) -> f64 {
        if !log_prob_new.is_finite() {
            return f64::NEG_INFINITY;
        }
        (ndim as f64 - 1.0) * z.ln() + (log_prob_new - log_prob_old)
    }
}

/// Draws one walker position from a normal ball around the initial values,
/// redrawing each coordinate until it falls inside the bounds.
pub fn ball_position<R: Rng + ?Sized>(
    params: &ParameterSet,
    rng: &mut R,
) -> Result<Vec<f64>, HammerError> {
    params
        .iter()
        .map(|parameter| {
            let normal = Normal::new(parameter.initial, parameter.width).map_err(|err| {
                HammerError::Config(
                    ErrorInfo::new("parameter-width", err.to_string())
                        .with_context("parameter", parameter.name.clone()),
                )
            })?;
            for _ in 0..MAX_BALL_DRAWS {
                let value = normal.sample(&mut *rng);
                if parameter.contains(value) {
                    return Ok(value);
                }
            }
            // Ball almost entirely outside the bounds: fall back to the box.
            Ok(parameter.lower + rng.gen::<f64>() * parameter.span())
        })
        .collect()
}

struct Proposal {
    walker: usize,
    position: Vec<f64>,
    z: f64,
    log_u: f64,
}

/// Live ensemble sampler returned by the default backend.
#[derive(Debug, Clone)]
pub struct EnsembleSampler {
    param_names: Vec<String>,
    walkers: usize,
    ndim: usize,
    positions: Vec<Vec<f64>>,
    log_probs: Vec<f64>,
    chain: Vec<Vec<Vec<f64>>>,
    chain_log_probs: Vec<Vec<f64>>,
    accepted: Vec<usize>,
    burnin_completed: usize,
    resumed_iterations: usize,
    storage_path: Option<PathBuf>,
}

impl EnsembleSampler {
    fn empty(header: &StoreHeader, storage_path: Option<&Path>) -> Self {
        Self {
            param_names: header.param_names.clone(),
            walkers: header.walkers,
            ndim: header.ndim,
            positions: Vec::new(),
            log_probs: Vec::new(),
            chain: Vec::new(),
            chain_log_probs: Vec::new(),
            accepted: vec![0; header.walkers],
            burnin_completed: 0,
            resumed_iterations: 0,
            storage_path: storage_path.map(Path::to_path_buf),
        }
    }

    /// Parameter names in dimension order.
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Number of walkers.
    pub fn walkers(&self) -> usize {
        self.walkers
    }

    /// Sampled dimension.
    pub fn ndim(&self) -> usize {
        self.ndim
    }

    /// Sample iterations held by the sampler, including resumed ones.
    pub fn iterations(&self) -> usize {
        self.chain.len()
    }

    /// Burn-in iterations completed, including reused ones.
    pub fn burnin_iterations(&self) -> usize {
        self.burnin_completed
    }

    /// Sample iterations restored from storage rather than computed by this run.
    pub fn resumed_iterations(&self) -> usize {
        self.resumed_iterations
    }

    /// Per-iteration walker positions of the sample phase.
    pub fn chain(&self) -> &[Vec<Vec<f64>>] {
        &self.chain
    }

    /// Sample-phase positions flattened iteration-major, then walker.
    pub fn samples(&self) -> Vec<Vec<f64>> {
        self.chain.iter().flatten().cloned().collect()
    }

    /// Log-probabilities matching [`samples`](Self::samples).
    pub fn log_probs(&self) -> Vec<f64> {
        self.chain_log_probs.iter().flatten().copied().collect()
    }

    /// Fraction of sample-phase proposals each walker accepted.
    pub fn acceptance_fraction(&self) -> Vec<f64> {
        let iterations = self.chain.len();
        self.accepted
            .iter()
            .map(|&count| {
                if iterations == 0 {
                    0.0
                } else {
                    count as f64 / iterations as f64
                }
            })
            .collect()
    }

    /// Current walker positions.
    pub fn positions(&self) -> &[Vec<f64>] {
        &self.positions
    }

    /// Location of the chain store, when it lives on disk.
    pub fn storage_path(&self) -> Option<&Path> {
        self.storage_path.as_deref()
    }

    fn restore(&mut self, records: &[IterationRecord]) {
        for record in records {
            match record.phase {
                Phase::Burnin => self.burnin_completed += 1,
                Phase::Sample => {
                    for (count, &accepted) in self.accepted.iter_mut().zip(&record.accepted) {
                        *count += usize::from(accepted);
                    }
                    self.chain.push(record.positions.clone());
                    self.chain_log_probs.push(record.log_probs.clone());
                }
            }
        }
        self.resumed_iterations = self.chain.len();
        if let Some(last) = records.last() {
            self.positions = last.positions.clone();
            self.log_probs = last.log_probs.clone();
        }
    }

    fn initialise(
        &mut self,
        posterior: &Posterior<'_>,
        seed: u64,
        pool: &WorkerPool,
    ) -> Result<(), HammerError> {
        let mut rng = RngHandle::from_seed(determinism::init_seed(seed));
        self.positions = (0..self.walkers)
            .map(|_| ball_position(posterior.params(), &mut rng))
            .collect::<Result<_, _>>()?;
        self.log_probs = pool
            .map(&self.positions, |position| posterior.log_probability(position))
            .into_iter()
            .collect::<Result<_, _>>()?;
        let rejected = self.log_probs.iter().filter(|lp| !lp.is_finite()).count();
        if rejected == self.walkers {
            return Err(HammerError::Sampler(
                ErrorInfo::new(
                    "ensemble-initial-state",
                    "every initial walker position has zero posterior probability",
                )
                .with_context("walkers", self.walkers.to_string())
                .with_hint("check the initial values and widths against the simulator's domain"),
            ));
        }
        if rejected > 0 {
            warn!(rejected, walkers = self.walkers, "initial walkers with zero probability");
        }
        Ok(())
    }

    fn advance(
        &mut self,
        posterior: &Posterior<'_>,
        stretch: &StretchMove,
        pool: &WorkerPool,
        seed: u64,
        iteration: usize,
    ) -> Result<Vec<bool>, HammerError> {
        let half = self.walkers / 2;
        let mut accepted = vec![false; self.walkers];
        for (active, complement) in [(0..half, half..self.walkers), (half..self.walkers, 0..half)] {
            let proposals: Vec<Proposal> = active
                .map(|walker| {
                    let mut rng =
                        RngHandle::from_seed(determinism::step_seed(seed, iteration, walker));
                    let z = stretch.sample_z(&mut rng);
                    let partner = &self.positions[rng.gen_range(complement.clone())];
                    let position = partner
                        .iter()
                        .zip(&self.positions[walker])
                        .map(|(c, x)| c + z * (x - c))
                        .collect();
                    Proposal {
                        walker,
                        position,
                        z,
                        log_u: rng.gen::<f64>().ln(),
                    }
                })
                .collect();
            let log_probs = pool
                .map(&proposals, |proposal| posterior.log_probability(&proposal.position))
                .into_iter()
                .collect::<Result<Vec<_>, _>>()?;
            for (proposal, log_prob) in proposals.into_iter().zip(log_probs) {
                let walker = proposal.walker;
                let log_ratio =
                    stretch.log_acceptance(proposal.z, self.ndim, self.log_probs[walker], log_prob);
                if proposal.log_u < log_ratio {
                    self.positions[walker] = proposal.position;
                    self.log_probs[walker] = log_prob;
                    accepted[walker] = true;
                }
            }
        }
        Ok(accepted)
    }

    fn record(&self, phase: Phase, iteration: usize, accepted: Vec<bool>) -> IterationRecord {
        IterationRecord {
            phase,
            iteration,
            positions: self.positions.clone(),
            log_probs: self.log_probs.clone(),
            accepted,
        }
    }
}

/// Runs the ensemble sampler, persisting every iteration to `storage`.
///
/// A compatible stored chain is extended when `start.continue_sampling` is
/// set; only the remaining burn-in and sample iterations are computed.
pub fn run_ensemble(
    posterior: &Posterior<'_>,
    config: &EnsembleConfig,
    descriptor_fingerprint: &str,
    storage: &mut dyn ChainStorage,
    pool: &WorkerPool,
    start: EnsembleStart,
) -> Result<EnsembleSampler, HammerError> {
    let stretch = StretchMove::new(config.stretch_scale)?;
    let ndim = posterior.ndim();
    let header = StoreHeader {
        schema_version: STORE_SCHEMA,
        walkers: config.walker_count(ndim),
        ndim,
        param_names: posterior.params().names().map(str::to_string).collect(),
        descriptor_fingerprint: descriptor_fingerprint.to_string(),
        seed: config.seed,
    };

    let stored = storage.load()?.filter(|stored| {
        let compatible = stored.header.is_compatible_with(&header);
        if !compatible {
            warn!(
                stored_walkers = stored.header.walkers,
                walkers = header.walkers,
                "stored chain belongs to a different ensemble; starting over"
            );
        }
        compatible
    });

    let mut sampler = EnsembleSampler::empty(&header, storage.location());
    match stored {
        Some(StoredChain {
            header: stored_header,
            records,
        }) if start.continue_sampling && !records.is_empty() => {
            // Drops a truncated tail so appended records start on a fresh line.
            storage.rewrite(&stored_header, &records)?;
            sampler.restore(&records);
            info!(
                burnin = sampler.burnin_completed,
                samples = sampler.resumed_iterations,
                "resuming stored chain"
            );
        }
        Some(stored)
            if !start.continue_sampling
                && start.reuse_burnin
                && config.burnin_iterations > 0
                && stored.count(Phase::Burnin) >= config.burnin_iterations =>
        {
            let burnin: Vec<IterationRecord> = stored
                .phase(Phase::Burnin)
                .take(config.burnin_iterations)
                .cloned()
                .collect();
            storage.rewrite(&header, &burnin)?;
            sampler.restore(&burnin);
            info!(burnin = burnin.len(), "reusing stored burn-in");
        }
        _ => {
            storage.reset(&header)?;
            sampler.initialise(posterior, config.seed, pool)?;
        }
    }

    for iteration in sampler.burnin_completed..config.burnin_iterations {
        let accepted = sampler.advance(posterior, &stretch, pool, config.seed, iteration)?;
        storage.append(&sampler.record(Phase::Burnin, iteration, accepted))?;
        sampler.burnin_completed += 1;
        debug!(iteration, "burn-in iteration complete");
    }

    for iteration in sampler.chain.len()..config.sample_iterations {
        let global = config.burnin_iterations + iteration;
        let accepted = sampler.advance(posterior, &stretch, pool, config.seed, global)?;
        let record = sampler.record(Phase::Sample, iteration, accepted);
        storage.append(&record)?;
        for (count, &accepted) in sampler.accepted.iter_mut().zip(&record.accepted) {
            *count += usize::from(accepted);
        }
        sampler.chain.push(record.positions);
        sampler.chain_log_probs.push(record.log_probs);
        debug!(iteration, "sample iteration complete");
    }

    let acceptance = sampler.acceptance_fraction();
    let mean_acceptance = if acceptance.is_empty() {
        0.0
    } else {
        acceptance.iter().sum::<f64>() / acceptance.len() as f64
    };
    info!(
        walkers = sampler.walkers,
        burnin = sampler.burnin_completed,
        samples = sampler.chain.len(),
        mean_acceptance,
        "ensemble sampling finished"
    );
    Ok(sampler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn stretch_factor_stays_in_range() {
        let stretch = StretchMove::new(2.0).unwrap();
        let mut rng = rand::rngs::StdRng::seed_from_u64(9);
        for _ in 0..1_000 {
            let z = stretch.sample_z(&mut rng);
            assert!((0.5..=2.0).contains(&z));
        }
    }

    #[test]
    fn rejects_scale_at_or_below_one() {
        assert!(StretchMove::new(1.0).is_err());
        assert!(StretchMove::new(f64::NAN).is_err());
    }

    #[test]
    fn infinite_proposals_are_never_accepted() {
        let stretch = StretchMove::new(2.0).unwrap();
        assert_eq!(
            stretch.log_acceptance(1.5, 3, -1.0, f64::NEG_INFINITY),
            f64::NEG_INFINITY
        );
        assert!(stretch.log_acceptance(1.0, 3, f64::NEG_INFINITY, -5.0) > 0.0);
    }

    #[test]
    fn ball_positions_respect_bounds() {
        let params =
            ParameterSet::from_tuples([("a", (0.99, 0.0, 1.0, 5.0)), ("b", (0.0, -1.0, 1.0, 0.1))])
                .unwrap();
        let mut rng = RngHandle::from_seed(3);
        for _ in 0..200 {
            let position = ball_position(&params, &mut rng).unwrap();
            assert!(params.contains(&position));
        }
    }
}
