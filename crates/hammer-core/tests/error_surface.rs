use hammer_core::errors::{ErrorInfo, HammerError};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("path", "/tmp/run")
        .with_context("reason", "example")
}

#[test]
fn config_error_surface() {
    let err = HammerError::Config(sample_info("CFG001", "conflicting backends"));
    assert_eq!(err.info().code, "CFG001");
    assert!(err.info().context.contains_key("path"));
    assert!(!err.is_parameter_domain());
}

#[test]
fn continuation_error_surface() {
    let err = HammerError::Continuation(sample_info("CNT001", "descriptor mismatch"));
    assert_eq!(err.info().code, "CNT001");
    assert!(err.to_string().starts_with("continuation error"));
}

#[test]
fn parameter_error_is_domain_error() {
    let err = HammerError::Parameter(sample_info("P001", "negative mass"));
    assert!(err.is_parameter_domain());
}

#[test]
fn dependency_error_carries_hint() {
    let err = HammerError::Dependency(
        ErrorInfo::new("D001", "backend not compiled").with_hint("enable the `nested` feature"),
    );
    assert!(err.to_string().contains("hint: enable the `nested` feature"));
}

#[test]
fn io_helper_records_path() {
    let err = HammerError::io("write", "denied", std::path::Path::new("/x/y.yml"));
    assert_eq!(err.info().context.get("path").map(String::as_str), Some("/x/y.yml"));
}
