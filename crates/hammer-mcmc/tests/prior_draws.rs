use hammer_core::{ParameterSet, RngHandle};
use hammer_mcmc::backend::ensemble::ball_position;
use hammer_mcmc::backend::posterior::prior_transform;
use proptest::prelude::*;

fn bounded(lower: f64, span: f64, frac: f64, width: f64) -> ParameterSet {
    let upper = lower + span;
    ParameterSet::from_tuples([
        ("x", (lower + frac * span, lower, upper, width)),
        ("y", (0.0, -1.0, 1.0, 0.5)),
    ])
    .unwrap()
}

proptest! {
    #[test]
    fn unit_cube_maps_inside_bounds(
        lower in -50.0f64..50.0,
        span in 1e-3f64..100.0,
        u in 0.0f64..1.0,
        v in 0.0f64..1.0,
    ) {
        let params = bounded(lower, span, 0.5, 1.0);
        let mut cube = [u, v];
        prior_transform(&params, &mut cube);
        prop_assert!(params.contains(&cube));
        prop_assert!((cube[0] - (lower + u * span)).abs() <= 1e-9 * (1.0 + lower.abs() + span));
    }

    #[test]
    fn ensemble_ball_stays_inside_bounds(
        seed in any::<u64>(),
        lower in -10.0f64..10.0,
        span in 1e-2f64..10.0,
        frac in 0.0f64..=1.0,
        width in 1e-3f64..50.0,
    ) {
        let params = bounded(lower, span, frac, width);
        let mut rng = RngHandle::from_seed(seed);
        let position = ball_position(&params, &mut rng).unwrap();
        prop_assert!(params.contains(&position));
    }
}

#[cfg(feature = "slice")]
proptest! {
    #[test]
    fn truncated_normal_respects_bounds(
        seed in any::<u64>(),
        lower in -10.0f64..10.0,
        span in 1e-2f64..10.0,
        frac in 0.0f64..=1.0,
        width in 1e-3f64..50.0,
    ) {
        let params = bounded(lower, span, frac, width);
        let mut rng = RngHandle::from_seed(seed);
        let positions =
            hammer_mcmc::backend::slice::initial_positions(&params, 8, &mut rng).unwrap();
        prop_assert_eq!(positions.len(), 8);
        for position in positions {
            prop_assert!(params.contains(&position));
        }
    }
}
