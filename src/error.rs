// src/error.rs

use std::time::Duration;

use crate::types::{ResourceName, Step};

/// Result type used throughout the scaler
pub type ScalerResult<T> = Result<T, ScalerError>;

/// Result type returned by store implementations
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures reported by an external store
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The named object does not exist
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    /// The object changed since it was read
    #[error("{kind} '{name}' was modified concurrently: {message}")]
    Conflict {
        kind: String,
        name: String,
        message: String,
    },

    /// The store rejected the object's contents
    #[error("{kind} '{name}' is invalid: {message}")]
    Invalid {
        kind: String,
        name: String,
        message: String,
    },

    /// The store could not be reached or failed internally
    #[error("Store unavailable: {message}")]
    Unavailable { message: String },
}

impl StoreError {
    pub fn not_found<K: Into<String>, N: Into<String>>(kind: K, name: N) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn conflict<K: Into<String>, N: Into<String>, M: Into<String>>(
        kind: K,
        name: N,
        message: M,
    ) -> Self {
        Self::Conflict {
            kind: kind.into(),
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn invalid<K: Into<String>, N: Into<String>, M: Into<String>>(
        kind: K,
        name: N,
        message: M,
    ) -> Self {
        Self::Invalid {
            kind: kind.into(),
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// All possible errors surfaced by the scaler
#[derive(thiserror::Error, Debug)]
pub enum ScalerError {
    /// Reading an object from a store failed
    #[error("Failed getting {step} object for '{resource}': {source}")]
    Retrieval {
        resource: ResourceName,
        step: Step,
        #[source]
        source: StoreError,
    },

    /// Writing an object back to a store failed. Earlier steps stay applied.
    #[error("Failed updating {step} object for '{resource}': {source}")]
    Update {
        resource: ResourceName,
        step: Step,
        #[source]
        source: StoreError,
    },

    /// Pod status could not be queried while waiting for readiness
    #[error("Failed while waiting for pods of '{resource}' to run: {source}")]
    Readiness {
        resource: ResourceName,
        #[source]
        source: StoreError,
    },

    /// The caller canceled the readiness wait
    #[error("Readiness wait for '{resource}' was canceled")]
    Canceled { resource: ResourceName },

    /// The readiness wait ran past its deadline
    #[error("Pods of '{resource}' were not running within {timeout:?}")]
    DeadlineExceeded {
        resource: ResourceName,
        timeout: Duration,
    },

    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Building a store client failed
    #[error("Client error: {message}")]
    Client { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    /// IO-related errors
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// Helper methods for creating common errors
impl ScalerError {
    pub fn retrieval<S: Into<String>>(resource: S, step: Step, source: StoreError) -> Self {
        Self::Retrieval {
            resource: resource.into(),
            step,
            source,
        }
    }

    pub fn update<S: Into<String>>(resource: S, step: Step, source: StoreError) -> Self {
        Self::Update {
            resource: resource.into(),
            step,
            source,
        }
    }

    pub fn readiness<S: Into<String>>(resource: S, source: StoreError) -> Self {
        Self::Readiness {
            resource: resource.into(),
            source,
        }
    }

    pub fn canceled<S: Into<String>>(resource: S) -> Self {
        Self::Canceled {
            resource: resource.into(),
        }
    }

    pub fn deadline_exceeded<S: Into<String>>(resource: S, timeout: Duration) -> Self {
        Self::DeadlineExceeded {
            resource: resource.into(),
            timeout,
        }
    }

    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn client<S: Into<String>>(message: S) -> Self {
        Self::Client {
            message: message.into(),
        }
    }

    /// The transition step this error was raised from, if any
    pub fn step(&self) -> Option<Step> {
        match self {
            Self::Retrieval { step, .. } | Self::Update { step, .. } => Some(*step),
            Self::Readiness { .. } | Self::Canceled { .. } | Self::DeadlineExceeded { .. } => {
                Some(Step::Readiness)
            }
            _ => None,
        }
    }

    /// The resource this error concerns, if any
    pub fn resource(&self) -> Option<&str> {
        match self {
            Self::Retrieval { resource, .. }
            | Self::Update { resource, .. }
            | Self::Readiness { resource, .. }
            | Self::Canceled { resource }
            | Self::DeadlineExceeded { resource, .. } => Some(resource),
            _ => None,
        }
    }

    /// Whether calling `set_scale` again with the same target can converge.
    /// Setup failures are terminal; every transition step is idempotent.
    pub fn is_retriable(&self) -> bool {
        !matches!(
            self,
            Self::Config { .. }
                | Self::Client { .. }
                | Self::Serialization { .. }
                | Self::Io { .. }
        )
    }
}
