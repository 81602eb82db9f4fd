//! Structured error types shared across hammer crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`HammerError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (paths, parameter names, sizes, etc.).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for sampling runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum HammerError {
    /// Invalid run or backend configuration, raised before any side effect.
    #[error("configuration error: {0}")]
    Config(ErrorInfo),
    /// The on-disk chain descriptor does not match the chain being continued.
    #[error("continuation error: {0}")]
    Continuation(ErrorInfo),
    /// The simulator rejected a point as physically invalid.
    ///
    /// Likelihood and posterior evaluations absorb this variant as a
    /// log-probability of negative infinity.
    #[error("parameter error: {0}")]
    Parameter(ErrorInfo),
    /// A requested backend is not available in this build.
    #[error("missing dependency: {0}")]
    Dependency(ErrorInfo),
    /// A core or likelihood module failed outside the parameter domain.
    #[error("module error: {0}")]
    Module(ErrorInfo),
    /// A sampling engine could not proceed.
    #[error("sampler error: {0}")]
    Sampler(ErrorInfo),
    /// Serialization, schema and file-system errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl HammerError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            HammerError::Config(info)
            | HammerError::Continuation(info)
            | HammerError::Parameter(info)
            | HammerError::Dependency(info)
            | HammerError::Module(info)
            | HammerError::Sampler(info)
            | HammerError::Serde(info) => info,
        }
    }

    /// Returns true when the error marks a point outside the simulator's domain.
    pub fn is_parameter_domain(&self) -> bool {
        matches!(self, HammerError::Parameter(_))
    }

    /// Shorthand for a serde-family error carrying a path context entry.
    pub fn io(code: &str, err: impl ToString, path: &std::path::Path) -> Self {
        HammerError::Serde(
            ErrorInfo::new(code, err.to_string()).with_context("path", path.display().to_string()),
        )
    }
}
