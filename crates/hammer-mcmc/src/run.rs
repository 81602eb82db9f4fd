//! Public entry point: assembles the chain, settles continuation and hands
//! the posterior to the selected backend.

use std::fs;
use std::path::PathBuf;

use hammer_chain::{
    build_computation_chain, descriptor_path, LikelihoodComputationChain, ModuleList,
};
use hammer_core::errors::{ErrorInfo, HammerError};
use hammer_core::{CoreModule, LikelihoodModule, ParameterSet};
use tracing::{info, info_span, warn};

use crate::backend::ensemble::{run_ensemble, EnsembleStart};
use crate::backend::posterior::Posterior;
use crate::backend::{ensure_available, SamplerOutcome};
use crate::config::{BackendConfig, RunConfig};
use crate::continuation::{persist_descriptor, resolve_continuation, ContinuationDecision};
use crate::logging::in_log_scope;
use crate::manifest::{manifest_path, RunManifest};
use crate::pool::WorkerPool;
use crate::storage::JsonlStorage;

/// Runs a sampler over the chain built from `core_modules` and
/// `likelihood_modules`, writing every artefact under `config.output_dir`.
///
/// The ensemble backend evaluates on a pool of `thread_count` workers built
/// for this run; the slice backend evaluates serially.
pub fn run_mcmc(
    core_modules: impl Into<ModuleList<dyn CoreModule>>,
    likelihood_modules: impl Into<ModuleList<dyn LikelihoodModule>>,
    params: ParameterSet,
    config: &RunConfig,
) -> Result<SamplerOutcome, HammerError> {
    run_mcmc_with_pool(core_modules, likelihood_modules, params, config, None)
}

/// Like [`run_mcmc`], evaluating on a caller-supplied worker pool.
///
/// Configuration problems and backends missing from this build are reported
/// before anything is written.
pub fn run_mcmc_with_pool(
    core_modules: impl Into<ModuleList<dyn CoreModule>>,
    likelihood_modules: impl Into<ModuleList<dyn LikelihoodModule>>,
    params: ParameterSet,
    config: &RunConfig,
    pool: Option<&WorkerPool>,
) -> Result<SamplerOutcome, HammerError> {
    config.validate()?;
    ensure_available(&config.backend)?;
    if params.is_empty() {
        return Err(HammerError::Config(
            ErrorInfo::new("params-empty", "at least one parameter must be sampled")
                .with_hint("pass the parameters to vary as a non-empty ParameterSet"),
        ));
    }
    let core_modules = core_modules.into();
    let likelihood_modules = likelihood_modules.into();
    in_log_scope(&config.logging, || {
        let span = info_span!(
            "run",
            model = %config.model_name,
            backend = config.backend.kind()
        );
        let _guard = span.enter();
        execute(core_modules, likelihood_modules, params, config, pool)
    })?
}

/// Everything one orchestration call owns while it runs.
struct RunState<'a> {
    chain: LikelihoodComputationChain,
    backend: &'a BackendConfig,
    pool: Option<&'a WorkerPool>,
    continue_sampling: bool,
    reuse_burnin: bool,
}

fn execute(
    core_modules: ModuleList<dyn CoreModule>,
    likelihood_modules: ModuleList<dyn LikelihoodModule>,
    params: ParameterSet,
    config: &RunConfig,
    pool: Option<&WorkerPool>,
) -> Result<SamplerOutcome, HammerError> {
    let backend_dir = config.backend_dir();
    fs::create_dir_all(&backend_dir)
        .map_err(|err| HammerError::io("output-mkdir", err, &backend_dir))?;

    let mut chain =
        build_computation_chain(core_modules, likelihood_modules, Some(params), false)?;
    let descriptor_file = descriptor_path(&config.output_dir, &config.model_name);
    let continuation = match config.backend {
        BackendConfig::Ensemble(_) => {
            resolve_continuation(&mut chain, &descriptor_file, config.continue_sampling)?
        }
        _ => ContinuationDecision::Fresh,
    };
    let descriptor_written = persist_descriptor(&chain, &descriptor_file);
    chain.setup()?;

    let state = RunState {
        chain,
        backend: &config.backend,
        pool,
        continue_sampling: config.continue_sampling,
        reuse_burnin: config.reuse_burnin,
    };
    let fingerprint = state.chain.descriptor().fingerprint()?;
    let (outcome, outputs) = dispatch(&state, config, &fingerprint)?;
    info!(
        backend = outcome.backend(),
        iterations = outcome.iterations(),
        "sampling finished"
    );

    let manifest = RunManifest {
        config: config.clone(),
        backend: outcome.backend().to_string(),
        continuation,
        descriptor_written,
        provenance: RunManifest::provenance(fingerprint, config.backend.seed()),
        iterations: outcome.iterations(),
        samples: outcome.samples().len(),
        outputs,
    };
    let path = manifest_path(&config.output_dir, &config.model_name);
    if let Err(err) = manifest.write(&path) {
        warn!(path = %path.display(), error = %err, "could not write run manifest");
    }
    Ok(outcome)
}

fn dispatch(
    state: &RunState<'_>,
    config: &RunConfig,
    fingerprint: &str,
) -> Result<(SamplerOutcome, Vec<PathBuf>), HammerError> {
    let posterior = Posterior::new(&state.chain)?;
    match state.backend {
        BackendConfig::Ensemble(ensemble) => {
            let mut storage = JsonlStorage::from_prefix(&config.file_prefix());
            let owned;
            let pool = match state.pool {
                Some(pool) => pool,
                None => {
                    owned = WorkerPool::new(ensemble.thread_count)?;
                    &owned
                }
            };
            let start = EnsembleStart {
                continue_sampling: state.continue_sampling,
                reuse_burnin: state.reuse_burnin,
            };
            let sampler =
                run_ensemble(&posterior, ensemble, fingerprint, &mut storage, pool, start)?;
            let outputs = vec![storage.path().to_path_buf()];
            Ok((SamplerOutcome::Ensemble(sampler), outputs))
        }
        #[cfg(feature = "nested")]
        BackendConfig::Nested(nested) => {
            let layout =
                crate::checkpoint::NestedLayout::new(config.backend_dir(), &config.model_name);
            let summary = crate::backend::nested::run_nested(
                &posterior,
                nested,
                &layout,
                state.continue_sampling,
            )?;
            let outputs = summary.outputs.clone();
            Ok((SamplerOutcome::Nested(summary), outputs))
        }
        #[cfg(feature = "slice")]
        BackendConfig::Slice(slice) => {
            let sampler = crate::backend::slice::run_slice(&posterior, slice, state.pool)?;
            Ok((SamplerOutcome::Slice(sampler), Vec::new()))
        }
        #[allow(unreachable_patterns)]
        other => {
            ensure_available(other)?;
            Err(HammerError::Dependency(ErrorInfo::new(
                "backend-unavailable",
                format!("the {} sampler is not available in this build", other.kind()),
            )))
        }
    }
}
