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

//! # Strato Kernel
//!
//! The simulation kernel: the hardware model (nodes, CPUs, NICs), the
//! software model (processes, containers, packets, microservices, api
//! calls), the placement schedulers, the monitors and the [`Simulation`]
//! façade tying them to the virtual clock.

mod action;
pub mod error;
mod hardware;
mod model;
mod monitor;
mod sched;
mod sim;
mod snapshot;
mod software;
pub mod specs;

pub use error::{KernelError, KernelResult};
pub use sim::Simulation;
pub use snapshot::{
    ApiCallSnapshot, ContainerSnapshot, CoreSnapshot, HostSnapshot, MicroserviceSnapshot,
    PacketSnapshot, PortSnapshot,
};
pub use specs::{
    ApiCallSpec, Architecture, ContainerSpec, DispatchMode, Endpoint, HardwareSpec, LoadBalancer,
    MicroserviceSpec, MonitorScope, MonitorSpec, PlacementPolicy, ScalingThresholds, VolumeSpec,
};
