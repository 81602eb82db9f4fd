#![deny(missing_docs)]

//! Sampler orchestration over likelihood computation chains: continuation
//! checks against a stored chain descriptor, an affine-invariant ensemble
//! sampler, optional nested and slice samplers, and the worker pool the
//! ensemble evaluates on.

/// Helpers for inspecting run artefacts.
pub mod analysis;
/// Sampling backends and the posterior they evaluate.
pub mod backend;
/// Nested-sampling resume files and output layout.
pub mod checkpoint;
/// YAML configuration schema and defaults.
pub mod config;
/// Descriptor comparison and persistence for continued runs.
pub mod continuation;
/// Deterministic seed derivation helpers.
pub mod determinism;
/// Scoped structured logging.
pub mod logging;
/// Run manifest serialization helpers.
pub mod manifest;
/// Worker pool for parallel likelihood evaluation.
pub mod pool;
/// Public `run_mcmc` entry points.
pub mod run;
/// Persistent ensemble chain storage.
pub mod storage;

pub use backend::ensemble::{EnsembleSampler, EnsembleStart, StretchMove};
#[cfg(feature = "nested")]
pub use backend::nested::NestedSummary;
pub use backend::posterior::{Evaluation, Posterior};
#[cfg(feature = "slice")]
pub use backend::slice::SliceSampler;
pub use backend::SamplerOutcome;
pub use config::{BackendConfig, EnsembleConfig, NestedConfig, RunConfig, SliceConfig};
pub use continuation::ContinuationDecision;
pub use logging::LogConfig;
pub use pool::WorkerPool;
pub use run::{run_mcmc, run_mcmc_with_pool};
pub use storage::{ChainStorage, JsonlStorage};
