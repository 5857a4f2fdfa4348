//! Saga error types.

use std::time::Duration;

use thiserror::Error;

/// Errors raised when a saga is misused or its context is read incorrectly.
///
/// Business-level step failures never show up here: they are encoded in
/// [`SagaOrchestratorResult`](crate::SagaOrchestratorResult) instead.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A step name was empty or whitespace only.
    #[error("Step name must not be blank")]
    BlankStepName,

    /// A saga name was empty or whitespace only.
    #[error("Saga name must not be blank")]
    BlankSagaName,

    /// `build()` was called on a step builder that never received an action.
    #[error("Step '{0}' has no action")]
    MissingAction(String),

    /// A step timeout must be strictly positive.
    #[error("Step timeout must be positive, got {0:?}")]
    InvalidStepTimeout(Duration),

    /// A saga-wide timeout must be strictly positive.
    #[error("Saga timeout must be positive, got {0:?}")]
    InvalidSagaTimeout(Duration),

    /// `build()` was called on a definition builder without a name.
    #[error("Saga definition has no name")]
    MissingSagaName,

    /// `build()` was called on a definition builder without any steps.
    #[error("Saga definition '{0}' has no steps")]
    EmptyDefinition(String),

    /// Two steps in one definition share a name.
    #[error("Saga definition '{saga}' contains duplicate step name '{step}'")]
    DuplicateStepName { saga: String, step: String },

    /// A context value exists but could not be read as the requested type.
    #[error("Context value '{key}' has an unexpected type: {source}")]
    ContextType {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Serialization error while storing a typed context value.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
