// Copyright (C) 2024-2025 The Strato Project.
//
// lib.rs file belongs to the strato project and is free
// software distributed under the MIT software license, see the
// accompanying file LICENSE in the main directory of the
// repository or http://www.opensource.org/licenses/mit-license.php
// for more details.
//
// Redistribution and use in source and binary forms with or without
// modifications are permitted.

//! # Strato Network
//!
//! The topology layer: a directed weighted graph over hardware node ids,
//! deterministic shortest-path routing and per-switch IPv4 subnet pools.

pub mod error;
pub mod graph;
pub mod subnet;

pub use error::{NetworkError, NetworkResult};
pub use graph::{NodeClass, NodeId, Topology};
pub use subnet::SubnetPool;
