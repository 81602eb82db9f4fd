use hammer_core::{HammerError, ParameterSet};
use proptest::prelude::*;

#[test]
fn yaml_preserves_dimension_order() {
    let params = ParameterSet::from_tuples([
        ("zeta", (30.0, 10.0, 250.0, 3.0)),
        ("alpha", (0.5, 0.0, 1.0, 0.1)),
        ("t_vir", (4.7, 4.0, 6.0, 0.1)),
    ])
    .unwrap();

    let yaml = serde_yaml::to_string(&params).unwrap();
    let restored: ParameterSet = serde_yaml::from_str(&yaml).unwrap();

    assert_eq!(restored, params);
    let names: Vec<_> = restored.names().collect();
    assert_eq!(names, vec!["zeta", "alpha", "t_vir"]);
}

#[test]
fn yaml_with_duplicate_names_is_rejected() {
    let yaml = r#"
- { name: a, initial: 0.5, lower: 0.0, upper: 1.0, width: 0.1 }
- { name: a, initial: 0.2, lower: 0.0, upper: 1.0, width: 0.1 }
"#;
    let result: Result<ParameterSet, _> = serde_yaml::from_str(yaml);
    assert!(result.is_err());
}

#[test]
fn duplicate_names_are_a_config_error() {
    let err = ParameterSet::from_tuples([("a", (0.5, 0.0, 1.0, 0.1)), ("a", (0.5, 0.0, 1.0, 0.1))])
        .unwrap_err();
    assert!(matches!(err, HammerError::Config(_)));
}

proptest! {
    #[test]
    fn contains_matches_per_parameter_bounds(x in -1.0f64..2.0, y in 0.0f64..10.0) {
        let params = ParameterSet::from_tuples([
            ("x", (0.5, 0.0, 1.0, 0.1)),
            ("y", (5.0, 2.0, 8.0, 0.5)),
        ])
        .unwrap();
        let inside = (0.0..=1.0).contains(&x) && (2.0..=8.0).contains(&y);
        prop_assert_eq!(params.contains(&[x, y]), inside);
    }
}
