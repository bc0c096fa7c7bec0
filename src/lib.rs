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

//! # Strato
//!
//! A discrete-event simulator for cloud and edge infrastructure: hosts,
//! switches and gateways carrying containers, microservices, users and the
//! api calls between them, on a deterministic virtual clock.
//!
//! This crate re-exports the public surface of the workspace members; see
//! `strato-kernel` for the model and `strato-core` for the clock, the
//! lifecycle engine and the resource primitive.

pub use strato_core::{
    CoreError, CoreResult, EntityId, Resource, SimConfig, SimTime, StateSet, TimeBase,
};
pub use strato_kernel::{
    ApiCallSnapshot, ApiCallSpec, Architecture, ContainerSnapshot, ContainerSpec, CoreSnapshot,
    DispatchMode, Endpoint, HardwareSpec, HostSnapshot, KernelError, KernelResult, LoadBalancer,
    MicroserviceSnapshot, MicroserviceSpec, MonitorScope, MonitorSpec, PacketSnapshot,
    PlacementPolicy, PortSnapshot, ScalingThresholds, Simulation, VolumeSpec,
};
pub use strato_network::{NetworkError, NodeClass, SubnetPool, Topology};
pub use strato_telemetry::{
    ContainerSample, Frame, FrameRecorder, HostSample, LogRecorder, MicroserviceSample, Recorder,
};

/// Everything a driver typically needs.
pub mod prelude {
    pub use strato_core::{EntityId, SimConfig, StateSet};
    pub use strato_kernel::{
        ApiCallSpec, Architecture, ContainerSpec, DispatchMode, Endpoint, HardwareSpec,
        LoadBalancer, MicroserviceSpec, MonitorScope, MonitorSpec, PlacementPolicy,
        ScalingThresholds, Simulation, VolumeSpec,
    };
    pub use strato_network::SubnetPool;
    pub use strato_telemetry::{FrameRecorder, LogRecorder, Recorder};
}
