use criterion::{criterion_group, criterion_main, Criterion};
use hammer_chain::build_computation_chain;
use hammer_core::{
    CoreModule, HammerError, LikelihoodModule, ModelData, ModuleDescriptor, ParamPoint,
    ParameterSet,
};
use hammer_mcmc::backend::ensemble::{run_ensemble, EnsembleStart};
use hammer_mcmc::storage::JsonlStorage;
use hammer_mcmc::{EnsembleConfig, Posterior, WorkerPool};

struct Identity;

impl CoreModule for Identity {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new("Identity")
    }

    fn build_model_data(
        &self,
        point: &ParamPoint,
        data: &mut ModelData,
    ) -> Result<(), HammerError> {
        data.insert("theta", point.iter().map(|(_, value)| value).collect());
        Ok(())
    }
}

struct Rosenbrock;

impl LikelihoodModule for Rosenbrock {
    fn descriptor(&self) -> ModuleDescriptor {
        ModuleDescriptor::new("Rosenbrock")
    }

    fn compute_likelihood(&self, data: &ModelData) -> Result<f64, HammerError> {
        let theta = data.require("theta")?;
        Ok(-theta
            .windows(2)
            .map(|pair| 100.0 * (pair[1] - pair[0] * pair[0]).powi(2) + (1.0 - pair[0]).powi(2))
            .sum::<f64>()
            / 20.0)
    }
}

fn sample_params() -> ParameterSet {
    ParameterSet::from_tuples((0..4).map(|i| (format!("x{i}"), (0.5, -5.0, 5.0, 0.1)))).unwrap()
}

fn bench_ensemble(c: &mut Criterion) {
    let chain = build_computation_chain(
        Box::new(Identity),
        Box::new(Rosenbrock),
        Some(sample_params()),
        true,
    )
    .unwrap();
    let posterior = Posterior::new(&chain).unwrap();
    let config = EnsembleConfig {
        sample_iterations: 20,
        ..EnsembleConfig::default()
    };
    let dir = tempfile::tempdir().unwrap();
    let start = EnsembleStart {
        continue_sampling: false,
        reuse_burnin: false,
    };

    for threads in [1, 4] {
        let pool = WorkerPool::new(threads).unwrap();
        c.bench_function(&format!("ensemble_20_iterations_{threads}_threads"), |b| {
            b.iter(|| {
                let mut storage = JsonlStorage::from_prefix(&dir.path().join("bench"));
                let _ = run_ensemble(&posterior, &config, "bench", &mut storage, &pool, start)
                    .unwrap();
            })
        });
    }
}

criterion_group!(benches, bench_ensemble);
criterion_main!(benches);
