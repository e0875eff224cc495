use std::sync::Arc;

use thiserror::Error;

use crate::core::ArcStr;

pub use anyhow::Error as RuntimeError;

#[derive(Debug, Error)]
pub enum TsumikiError {
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Flatten(#[from] FlattenError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Error while loading parameter configuration:\n{0}")]
    Config(#[from] ConfigError),

    #[error("Error while encoding task:\n{0}")]
    Wire(#[from] WireError),

    #[error("Task '{0}':\n{1}")]
    Task(String, RuntimeError),
}

/// Failures raised while binding values to the parameters of a task type.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParameterError {
    #[error("{task}: requires the '{param}' parameter to be set")]
    Missing { task: ArcStr, param: ArcStr },

    #[error("{task}: received unknown parameter '{param}'")]
    Unknown { task: ArcStr, param: ArcStr },

    #[error("{task}: parameter '{param}' declared more than once")]
    Duplicate { task: ArcStr, param: ArcStr },

    #[error("Can't parse '{value}' as {kind} for parameter '{param}': {reason}")]
    Parse {
        param: ArcStr,
        kind: ArcStr,
        value: String,
        reason: String,
    },

    #[error("Parameter '{param}' expects {expected}, got {found}")]
    WrongType {
        param: ArcStr,
        expected: ArcStr,
        found: &'static str,
    },

    #[error("Default for parameter '{param}' is invalid: {reason}")]
    InvalidDefault { param: ArcStr, reason: String },
}

impl ParameterError {
    /// Returns the parameter name the failure is about.
    pub fn param(&self) -> &str {
        match self {
            Self::Missing { param, .. }
            | Self::Unknown { param, .. }
            | Self::Duplicate { param, .. }
            | Self::Parse { param, .. }
            | Self::WrongType { param, .. }
            | Self::InvalidDefault { param, .. } => param,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlattenError {
    #[error("Absent value found in dependency structure at {path}")]
    Absent { path: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Task '{0}' not found")]
    NotFound(String),

    #[error("Task '{0}' is ambiguous, it was registered by two different definitions")]
    Ambiguous(String),

    #[error("Task '{0}' is external and can't be registered")]
    External(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't read configuration file.\n{0}")]
    FileSystem(#[from] std::io::Error),

    #[error("Couldn't parse configuration.\n{0}")]
    Toml(#[from] toml::de::Error),

    #[error("Top-level key '{0}' must be a table named after a task family")]
    Section(String),

    #[error("Section '{section}' key '{key}' has unsupported value type {found}")]
    Value {
        section: String,
        key: String,
        found: &'static str,
    },
}

/// Failures raised while moving a task across a process boundary.
#[derive(Debug, Error, Clone)]
pub enum WireError {
    #[error("Task '{0}' holds live callbacks and can't be serialized outside a guarded scope")]
    Transient(String),

    #[error(transparent)]
    Json(Arc<serde_json::Error>),

    #[error("CBOR encoding failed: {0}")]
    CborEncode(String),

    #[error("CBOR decoding failed: {0}")]
    CborDecode(String),
}

impl From<serde_json::Error> for WireError {
    fn from(e: serde_json::Error) -> Self {
        WireError::Json(Arc::new(e))
    }
}
