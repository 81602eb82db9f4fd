use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hammer_chain::build_computation_chain;
use hammer_core::{
    CoreModule, HammerError, LikelihoodModule, ModelData, ModuleDescriptor, ParamPoint,
    ParameterSet,
};

struct Offset {
    key: &'static str,
    offset: f64,
    setups: Arc<AtomicUsize>,
}

impl CoreModule for Offset {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new("Offset").with_config(serde_json::json!({ "key": self.key }))
    }

    fn setup(&mut self, _params: Option<&ParameterSet>) -> Result<(), HammerError> {
        self.setups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn build_model_data(
        &self,
        point: &ParamPoint,
        data: &mut ModelData,
    ) -> Result<(), HammerError> {
        let a = point.require("a")?;
        // Each module sees what earlier modules produced.
        let previous = data.get("y").map(|y| y[0]).unwrap_or(0.0);
        data.insert("y", vec![previous + a + self.offset]);
        data.insert(self.key, vec![a]);
        Ok(())
    }
}

struct Constant(f64);

impl LikelihoodModule for Constant {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new("Constant")
    }

    fn compute_likelihood(&self, _data: &ModelData) -> Result<f64, HammerError> {
        Ok(self.0)
    }
}

fn params() -> ParameterSet {
    ParameterSet::from_tuples([("a", (0.5, 0.0, 1.0, 0.1))]).unwrap()
}

fn offset(key: &'static str, value: f64, setups: &Arc<AtomicUsize>) -> Box<Offset> {
    Box::new(Offset {
        key,
        offset: value,
        setups: Arc::clone(setups),
    })
}

#[test]
fn single_modules_are_wrapped_into_lists() {
    let setups = Arc::new(AtomicUsize::new(0));
    let chain = build_computation_chain(
        offset("first", 1.0, &setups),
        Box::new(Constant(-1.5)),
        Some(params()),
        false,
    )
    .unwrap();
    assert_eq!(chain.core_modules().len(), 1);
    assert_eq!(chain.likelihood_modules().len(), 1);
    assert!(!chain.is_setup());
    assert_eq!(setups.load(Ordering::SeqCst), 0);
}

#[test]
fn modules_run_in_supplied_order() {
    let setups = Arc::new(AtomicUsize::new(0));
    let cores: Vec<Box<dyn CoreModule>> = vec![
        offset("first", 1.0, &setups),
        offset("second", 10.0, &setups),
    ];
    let likelihoods: Vec<Box<dyn LikelihoodModule>> =
        vec![Box::new(Constant(-1.0)), Box::new(Constant(-2.0))];
    let chain = build_computation_chain(cores, likelihoods, Some(params()), true).unwrap();

    let point = params().point_from_vector(&[0.5]).unwrap();
    let data = chain.build_model_data(&point).unwrap();
    assert_eq!(data.get("y"), Some(&[12.0][..]));
    assert_eq!(chain.compute_likelihoods(&data).unwrap(), -3.0);
    assert_eq!(chain.log_likelihood(&[0.5]).unwrap(), -3.0);

    let kinds: Vec<_> = chain
        .descriptor()
        .core_modules
        .iter()
        .map(|m| m.config["key"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(kinds, vec!["first", "second"]);
}

#[test]
fn setup_runs_exactly_once() {
    let setups = Arc::new(AtomicUsize::new(0));
    let mut chain = build_computation_chain(
        offset("first", 0.0, &setups),
        Box::new(Constant(0.0)),
        Some(params()),
        true,
    )
    .unwrap();
    chain.setup().unwrap();
    assert!(chain.is_setup());
    assert_eq!(setups.load(Ordering::SeqCst), 1);
}

#[test]
fn bounds_follow_parameter_set() {
    let setups = Arc::new(AtomicUsize::new(0));
    let chain = build_computation_chain(
        offset("first", 0.0, &setups),
        Box::new(Constant(0.0)),
        Some(params()),
        false,
    )
    .unwrap();
    assert!(chain.is_within_bounds(&[0.0]));
    assert!(chain.is_within_bounds(&[1.0]));
    assert!(!chain.is_within_bounds(&[1.01]));
    assert!(!chain.is_within_bounds(&[0.5, 0.5]));
}

#[test]
fn chain_without_params_cannot_evaluate_vectors() {
    let setups = Arc::new(AtomicUsize::new(0));
    let chain =
        build_computation_chain(offset("first", 0.0, &setups), Box::new(Constant(0.0)), None, false)
            .unwrap();
    let err = chain.log_likelihood(&[0.5]).unwrap_err();
    assert!(matches!(err, HammerError::Config(_)));
}
