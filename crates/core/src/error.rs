//! Error types for the strato core crate.

use thiserror::Error;

/// Core simulation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Invalid configuration supplied at construction time
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the offending configuration
        message: String,
    },

    /// A `Resource::get` could not be satisfied
    #[error("Resource exhausted: {resource} (requested {requested}, available {available})")]
    ResourceExhausted {
        /// Label of the resource that rejected the claim
        resource: String,
        /// Amount that was requested
        requested: f64,
        /// Amount that was available
        available: f64,
    },

    /// An internal invariant was violated; this indicates a bug, not a
    /// recoverable simulation condition
    #[error("State violation: {message}")]
    StateViolation {
        /// Description of the violated invariant
        message: String,
    },

    /// A referenced entity or resource does not exist
    #[error("Not found: {resource}")]
    NotFound {
        /// Name of the missing entity or resource
        resource: String,
    },

    /// Virtual time arithmetic overflowed the tick counter
    #[error("Time overflow at {ticks} ticks")]
    TimeOverflow {
        /// Tick value that could not be represented
        ticks: u64,
    },
}

impl CoreError {
    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new resource exhaustion error
    pub fn resource_exhausted<S: Into<String>>(resource: S, requested: f64, available: f64) -> Self {
        Self::ResourceExhausted {
            resource: resource.into(),
            requested,
            available,
        }
    }

    /// Create a new state violation error
    pub fn state_violation<S: Into<String>>(message: S) -> Self {
        Self::StateViolation {
            message: message.into(),
        }
    }

    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// True for errors the simulation absorbs locally (a failed claim fails
    /// the owning entity, nothing else); false for errors that must abort
    /// the run.
    pub fn is_contained(&self) -> bool {
        matches!(self, CoreError::ResourceExhausted { .. })
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            CoreError::Configuration { .. } => "configuration",
            CoreError::ResourceExhausted { .. } => "resource",
            CoreError::StateViolation { .. } => "invariant",
            CoreError::NotFound { .. } => "lookup",
            CoreError::TimeOverflow { .. } => "time",
        }
    }
}

/// Result type for core operations
pub type CoreResult<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CoreError::resource_exhausted("host-0 RAM", 2048.0, 1024.0);
        assert_eq!(
            error.to_string(),
            "Resource exhausted: host-0 RAM (requested 2048, available 1024)"
        );
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(CoreError::configuration("x").category(), "configuration");
        assert_eq!(
            CoreError::resource_exhausted("r", 1.0, 0.0).category(),
            "resource"
        );
        assert_eq!(CoreError::state_violation("x").category(), "invariant");
    }

    #[test]
    fn test_containment() {
        assert!(CoreError::resource_exhausted("r", 1.0, 0.0).is_contained());
        assert!(!CoreError::state_violation("x").is_contained());
        assert!(!CoreError::configuration("x").is_contained());
    }
}
