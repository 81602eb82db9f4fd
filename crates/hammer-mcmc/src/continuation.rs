//! Descriptor-based continuation protocol.
//!
//! Before the default sampler starts, the on-disk descriptor of a previous run
//! is compared with the chain about to be sampled. A matching descriptor lets
//! the sampler pick up its stored chain; a mismatch aborts the run before any
//! engine is constructed.

use std::path::Path;

use hammer_chain::{ChainDescriptor, LikelihoodComputationChain};
use hammer_core::errors::{ErrorInfo, HammerError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Outcome of comparing the current chain with a previous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContinuationDecision {
    /// No previous descriptor exists.
    Fresh,
    /// A matching previous run will be continued.
    Resume,
    /// A previous run exists but continuation was not requested.
    Restart,
}

/// Compares the descriptor at `path` with `chain`.
///
/// When `continue_sampling` is set every likelihood module that would
/// re-simulate its data is switched to reuse it, whether or not a previous run
/// exists. An unreadable descriptor is treated as a mismatch.
pub fn resolve_continuation(
    chain: &mut LikelihoodComputationChain,
    path: &Path,
    continue_sampling: bool,
) -> Result<ContinuationDecision, HammerError> {
    let exists = path.exists();
    if !continue_sampling {
        let decision = if exists {
            ContinuationDecision::Restart
        } else {
            ContinuationDecision::Fresh
        };
        debug!(path = %path.display(), ?decision, "continuation not requested");
        return Ok(decision);
    }

    let decision = if exists {
        let previous = ChainDescriptor::load(path).map_err(|err| {
            HammerError::Continuation(
                ErrorInfo::new("descriptor-unreadable", err.info().message.clone())
                    .with_context("path", path.display().to_string())
                    .with_hint("remove the file or disable continue_sampling to start over"),
            )
        })?;
        if !previous.matches(&chain.descriptor()) {
            return Err(HammerError::Continuation(
                ErrorInfo::new(
                    "descriptor-mismatch",
                    "attempting to continue a chain whose modules or parameters differ",
                )
                .with_context("path", path.display().to_string())
                .with_hint("check the chain against the stored descriptor"),
            ));
        }
        info!(path = %path.display(), "continuing previous run");
        ContinuationDecision::Resume
    } else {
        ContinuationDecision::Fresh
    };

    disable_simulation(chain);
    Ok(decision)
}

/// Turns off data re-simulation on every likelihood module that has it enabled.
///
/// Returns the number of modules changed.
pub fn disable_simulation(chain: &mut LikelihoodComputationChain) -> usize {
    let mut changed = 0;
    for module in chain.likelihood_modules_mut() {
        if module.simulate() == Some(true) {
            warn!(
                module = %module.descriptor().kind,
                "likelihood re-simulates its data, which is incompatible with continue_sampling; \
                 setting simulate = false"
            );
            module.set_simulate(false);
            changed += 1;
        }
    }
    changed
}

/// Writes the chain descriptor to `path`.
///
/// Failures are logged and otherwise ignored; the return value reports
/// whether the file was written.
pub fn persist_descriptor(chain: &LikelihoodComputationChain, path: &Path) -> bool {
    match chain.descriptor().store(path) {
        Ok(()) => {
            debug!(path = %path.display(), "wrote chain descriptor");
            true
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "could not write chain descriptor; continuing without it"
            );
            false
        }
    }
}
