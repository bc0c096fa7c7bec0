//! Error types for the topology layer.

use strato_core::EntityId;
use thiserror::Error;

/// Topology and routing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Hosts may not link directly to each other
    #[error("Cannot add a link between two hosts ({a} and {b})")]
    HostToHostLink {
        /// First endpoint
        a: EntityId,
        /// Second endpoint
        b: EntityId,
    },

    /// A link endpoint is not part of the topology
    #[error("Node {node} is not part of the topology")]
    UnknownNode {
        /// The missing node
        node: EntityId,
    },

    /// No path exists between the two nodes
    #[error("No route from {src} to {dst}")]
    NoRoute {
        /// Route origin
        src: EntityId,
        /// Route destination
        dst: EntityId,
    },

    /// The link already exists
    #[error("Link between {a} and {b} already exists")]
    DuplicateLink {
        /// First endpoint
        a: EntityId,
        /// Second endpoint
        b: EntityId,
    },

    /// A subnet ran out of assignable addresses
    #[error("Subnet {subnet} has no addresses left")]
    SubnetExhausted {
        /// The exhausted subnet in CIDR notation
        subnet: String,
    },

    /// A subnet definition could not be parsed
    #[error("Invalid subnet: {value}")]
    InvalidSubnet {
        /// The rejected definition
        value: String,
    },
}

/// Result type for topology operations
pub type NetworkResult<T> = std::result::Result<T, NetworkError>;
