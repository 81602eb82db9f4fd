mod common;

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{ensemble_config, one_param, Echo, Gaussian};
use hammer_chain::{build_computation_chain, descriptor_path, ChainDescriptor};
use hammer_core::{HammerError, ParameterSet};
use hammer_mcmc::continuation::resolve_continuation;
use hammer_mcmc::manifest::{manifest_path, RunManifest};
use hammer_mcmc::storage::STORE_SUFFIX;
use hammer_mcmc::{run_mcmc, BackendConfig, ContinuationDecision, NestedConfig};
use tempfile::tempdir;

fn store_exists(dir: &std::path::Path) -> bool {
    dir.join(format!("21CMMC.{STORE_SUFFIX}")).exists()
}

#[test]
fn matching_continuation_keeps_params_and_stops_simulation() {
    let dir = tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let simulations = Arc::new(AtomicUsize::new(0));

    let mut config = ensemble_config(dir.path(), 1);
    config.continue_sampling = false;
    run_mcmc(
        Echo::boxed(&calls),
        Gaussian::simulating(vec![0.5], 0.1, &simulations),
        one_param(),
        &config,
    )
    .unwrap();
    assert_eq!(simulations.load(Ordering::SeqCst), 1);

    config.continue_sampling = true;
    let outcome = run_mcmc(
        Echo::boxed(&calls),
        Gaussian::simulating(vec![0.5], 0.1, &simulations),
        one_param(),
        &config,
    )
    .unwrap();
    assert_eq!(simulations.load(Ordering::SeqCst), 1, "continued run re-simulated data");
    assert_eq!(outcome.as_ensemble().unwrap().param_names(), ["a".to_string()]);

    let manifest = RunManifest::load(&manifest_path(dir.path(), "21CMMC")).unwrap();
    assert_eq!(manifest.continuation, ContinuationDecision::Resume);
}

#[test]
fn resolve_switches_simulation_off_even_without_previous_run() {
    let dir = tempdir().unwrap();
    let simulations = Arc::new(AtomicUsize::new(0));
    let mut chain = build_computation_chain(
        Echo::boxed(&Arc::new(AtomicUsize::new(0))),
        Gaussian::simulating(vec![0.5], 0.1, &simulations),
        Some(one_param()),
        false,
    )
    .unwrap();
    let decision =
        resolve_continuation(&mut chain, &dir.path().join("none.LCC.yml"), true).unwrap();
    assert_eq!(decision, ContinuationDecision::Fresh);
    assert_eq!(chain.likelihood_modules()[0].simulate(), Some(false));
}

#[test]
fn mismatched_continuation_fails_before_sampling() {
    let dir = tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let previous = build_computation_chain(
        Echo::boxed(&calls),
        Gaussian::boxed(vec![0.5], 0.1),
        Some(ParameterSet::from_tuples([("a", (0.5, 0.0, 1.0, 0.2))]).unwrap()),
        false,
    )
    .unwrap();
    previous
        .descriptor()
        .store(&descriptor_path(dir.path(), "21CMMC"))
        .unwrap();

    let config = ensemble_config(dir.path(), 1);
    let err = run_mcmc(
        Echo::boxed(&calls),
        Gaussian::boxed(vec![0.5], 0.1),
        one_param(),
        &config,
    )
    .unwrap_err();
    assert!(matches!(err, HammerError::Continuation(_)));
    assert_eq!(err.info().code, "descriptor-mismatch");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!store_exists(dir.path()));
}

#[test]
fn unreadable_descriptor_blocks_continuation() {
    let dir = tempdir().unwrap();
    fs::write(descriptor_path(dir.path(), "21CMMC"), "modules: [unterminated").unwrap();
    let config = ensemble_config(dir.path(), 1);
    let err = run_mcmc(
        Echo::boxed(&Arc::new(AtomicUsize::new(0))),
        Gaussian::boxed(vec![0.5], 0.1),
        one_param(),
        &config,
    )
    .unwrap_err();
    assert_eq!(err.info().code, "descriptor-unreadable");
    assert!(!store_exists(dir.path()));
}

#[test]
fn restart_overwrites_descriptor() {
    let dir = tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut config = ensemble_config(dir.path(), 1);
    config.continue_sampling = false;
    run_mcmc(
        Echo::boxed(&calls),
        Gaussian::boxed(vec![0.5], 0.1),
        one_param(),
        &config,
    )
    .unwrap();

    let wider = ParameterSet::from_tuples([("a", (0.5, 0.0, 1.0, 0.3))]).unwrap();
    run_mcmc(
        Echo::boxed(&calls),
        Gaussian::boxed(vec![0.5], 0.1),
        wider.clone(),
        &config,
    )
    .unwrap();

    let stored = ChainDescriptor::load(&descriptor_path(dir.path(), "21CMMC")).unwrap();
    let expected = build_computation_chain(
        Echo::boxed(&calls),
        Gaussian::boxed(vec![0.5], 0.1),
        Some(wider),
        false,
    )
    .unwrap()
    .descriptor();
    assert!(stored.matches(&expected));
    let manifest = RunManifest::load(&manifest_path(dir.path(), "21CMMC")).unwrap();
    assert_eq!(manifest.continuation, ContinuationDecision::Restart);
    assert!(manifest.descriptor_written);
}

#[test]
fn failed_descriptor_write_does_not_stop_the_run() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(descriptor_path(dir.path(), "21CMMC")).unwrap();
    let mut config = ensemble_config(dir.path(), 1);
    config.continue_sampling = false;
    let outcome = run_mcmc(
        Echo::boxed(&Arc::new(AtomicUsize::new(0))),
        Gaussian::boxed(vec![0.5], 0.1),
        one_param(),
        &config,
    )
    .unwrap();
    assert_eq!(outcome.iterations(), 1);
    assert!(store_exists(dir.path()));
    let manifest = RunManifest::load(&manifest_path(dir.path(), "21CMMC")).unwrap();
    assert!(!manifest.descriptor_written);
}

#[cfg(feature = "nested")]
#[test]
fn nested_backend_ignores_stored_descriptor() {
    let dir = tempdir().unwrap();
    fs::write(descriptor_path(dir.path(), "21CMMC"), "not: [a descriptor").unwrap();
    let config = ensemble_config(dir.path(), 1).with_backend(BackendConfig::Nested(NestedConfig {
        n_live_points: 10,
        max_iter: 5,
        ..NestedConfig::default()
    }));
    let outcome = run_mcmc(
        Echo::boxed(&Arc::new(AtomicUsize::new(0))),
        Gaussian::boxed(vec![0.5], 0.1),
        one_param(),
        &config,
    )
    .unwrap();
    assert_eq!(outcome.backend(), "nested");
    assert!(ChainDescriptor::load(&descriptor_path(dir.path(), "21CMMC")).is_ok());
}
