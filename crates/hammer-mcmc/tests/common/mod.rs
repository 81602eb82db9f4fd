#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use hammer_core::errors::ErrorInfo;
use hammer_core::{
    CoreModule, HammerError, LikelihoodModule, ModelData, ModuleDescriptor, ParamPoint,
    ParameterSet,
};
use hammer_mcmc::{BackendConfig, EnsembleConfig, RunConfig};

/// Copies the point into `theta` and counts evaluations. Points with
/// `a > reject_above` are outside the simulator's domain.
pub struct Echo {
    pub calls: Arc<AtomicUsize>,
    pub reject_above: f64,
}

impl Echo {
    pub fn boxed(calls: &Arc<AtomicUsize>) -> Box<Self> {
        Box::new(Self {
            calls: Arc::clone(calls),
            reject_above: f64::INFINITY,
        })
    }
}

impl CoreModule for Echo {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new("Echo")
    }

    fn build_model_data(
        &self,
        point: &ParamPoint,
        data: &mut ModelData,
    ) -> Result<(), HammerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let a = point.require("a")?;
        if a > self.reject_above {
            return Err(HammerError::Parameter(
                ErrorInfo::new("echo-domain", "a is outside the simulator's domain")
                    .with_context("a", a.to_string()),
            ));
        }
        data.insert("theta", point.iter().map(|(_, value)| value).collect());
        data.insert("a_squared", vec![a * a]);
        Ok(())
    }
}

/// Core module that always fails with a non-parameter error.
pub struct Broken;

impl CoreModule for Broken {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new("Broken")
    }

    fn build_model_data(
        &self,
        _point: &ParamPoint,
        _data: &mut ModelData,
    ) -> Result<(), HammerError> {
        Err(HammerError::Module(ErrorInfo::new("broken", "simulator crashed")))
    }
}

/// Independent Gaussian likelihood around `mean` with a re-simulation flag.
pub struct Gaussian {
    pub mean: Vec<f64>,
    pub sigma: f64,
    pub simulate: Option<bool>,
    pub simulations: Arc<AtomicUsize>,
}

impl Gaussian {
    pub fn boxed(mean: Vec<f64>, sigma: f64) -> Box<Self> {
        Box::new(Self {
            mean,
            sigma,
            simulate: None,
            simulations: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn simulating(mean: Vec<f64>, sigma: f64, simulations: &Arc<AtomicUsize>) -> Box<Self> {
        Box::new(Self {
            mean,
            sigma,
            simulate: Some(true),
            simulations: Arc::clone(simulations),
        })
    }
}

impl LikelihoodModule for Gaussian {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new("Gaussian").with_config(serde_json::json!({
            "mean": self.mean,
            "sigma": self.sigma,
        }))
    }

    fn setup(&mut self, _params: Option<&ParameterSet>) -> Result<(), HammerError> {
        if self.simulate == Some(true) {
            self.simulations.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn compute_likelihood(&self, data: &ModelData) -> Result<f64, HammerError> {
        let theta = data.require("theta")?;
        Ok(theta
            .iter()
            .zip(&self.mean)
            .map(|(x, m)| -0.5 * ((x - m) / self.sigma).powi(2))
            .sum())
    }

    fn simulate(&self) -> Option<bool> {
        self.simulate
    }

    fn set_simulate(&mut self, simulate: bool) {
        if self.simulate.is_some() {
            self.simulate = Some(simulate);
        }
    }
}

pub fn one_param() -> ParameterSet {
    ParameterSet::from_tuples([("a", (0.5, 0.0, 1.0, 0.1))]).unwrap()
}

pub fn two_params() -> ParameterSet {
    ParameterSet::from_tuples([("a", (0.5, 0.0, 1.0, 0.1)), ("b", (0.0, -1.0, 1.0, 0.2))])
        .unwrap()
}

pub fn ensemble_config(dir: &Path, sample_iterations: usize) -> RunConfig {
    RunConfig::new(dir, "21CMMC").with_backend(BackendConfig::Ensemble(EnsembleConfig {
        walkers_ratio: 4,
        sample_iterations,
        ..EnsembleConfig::default()
    }))
}
