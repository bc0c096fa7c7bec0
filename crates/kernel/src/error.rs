//! Error types for the simulation kernel.

use strato_core::{CoreError, EntityId};
use strato_network::NetworkError;
use thiserror::Error;

/// Kernel errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    /// Error bubbled up from the simulation substrate
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Error bubbled up from the topology layer
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Invalid model configuration supplied at construction time
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the offending configuration
        message: String,
    },

    /// A referenced entity is not registered
    #[error("Unknown entity {id}")]
    UnknownEntity {
        /// The unresolved id
        id: EntityId,
    },

    /// A referenced entity is of an unexpected kind
    #[error("Entity {id} is not a {expected}")]
    WrongKind {
        /// The misused id
        id: EntityId,
        /// The kind the caller expected
        expected: &'static str,
    },
}

impl KernelError {
    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// True for errors the kernel absorbs by failing the owning entity.
    pub fn is_contained(&self) -> bool {
        matches!(self, KernelError::Core(e) if e.is_contained())
    }
}

/// Result type for kernel operations
pub type KernelResult<T> = std::result::Result<T, KernelError>;
