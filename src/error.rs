use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Whether a failure is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Network errors, timeouts, HTTP 5xx and 429.
    Transient,
    /// Definitive rejections: other 4xx, `success: false`, malformed bodies.
    Permanent,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureClass::Transient => f.write_str("transient"),
            FailureClass::Permanent => f.write_str("permanent"),
        }
    }
}

/// Implemented by every error the retry policy may see.
pub trait Retryable {
    fn class(&self) -> FailureClass;

    fn is_transient(&self) -> bool {
        self.class() == FailureClass::Transient
    }
}

#[derive(Debug, Error)]
#[error("{class} fetch failure for {endpoint}: {reason}")]
pub struct FetchError {
    pub class: FailureClass,
    pub endpoint: String,
    pub reason: String,
}

impl FetchError {
    pub fn transient(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Transient,
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    pub fn permanent(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Permanent,
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }
}

impl Retryable for FetchError {
    fn class(&self) -> FailureClass {
        self.class
    }
}

/// Raised when a raw item lacks what a canonical record needs. Skipped, never fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("missing required attribute `{0}`")]
    MissingAttribute(&'static str),
    #[error("attribute `{field}` has unusable value `{value}`")]
    InvalidAttribute { field: &'static str, value: String },
    #[error("raw item is not a JSON object")]
    NotAnObject,
}

#[derive(Debug, Error)]
#[error("{class} reconcile failure for {code}: {reason}")]
pub struct ReconcileError {
    pub class: FailureClass,
    pub code: String,
    pub reason: String,
}

impl ReconcileError {
    pub fn transient(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Transient,
            code: code.into(),
            reason: reason.into(),
        }
    }

    pub fn permanent(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Permanent,
            code: code.into(),
            reason: reason.into(),
        }
    }
}

impl Retryable for ReconcileError {
    fn class(&self) -> FailureClass {
        self.class
    }
}

#[derive(Debug, Error)]
#[error("{class} bundle failure for {code}: {reason}")]
pub struct BundleError {
    pub class: FailureClass,
    pub code: String,
    pub reason: String,
}

impl BundleError {
    pub fn transient(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Transient,
            code: code.into(),
            reason: reason.into(),
        }
    }

    pub fn permanent(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            class: FailureClass::Permanent,
            code: code.into(),
            reason: reason.into(),
        }
    }
}

impl Retryable for BundleError {
    fn class(&self) -> FailureClass {
        self.class
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
}
