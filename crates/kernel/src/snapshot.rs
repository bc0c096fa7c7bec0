//! Read-only views of entity state for drivers, telemetry sinks and tests.
//!
//! Snapshots copy the observable fields out of the arena; holding one
//! never blocks the simulation from advancing.

use crate::error::KernelResult;
use crate::sim::Simulation;
use serde::Serialize;
use std::net::Ipv4Addr;
use strato_core::{EntityId, SimTime, StateSet};

/// Observable state of a container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSnapshot {
    pub label: String,
    pub states: StateSet,
    pub host: Option<EntityId>,
    pub cpu_request: u64,
    pub ram_request: u64,
    pub image_size: u64,
    pub cpu_limit: Option<f64>,
    pub ram_limit: Option<u64>,
    pub cpu_usage: f64,
    pub ram_usage: u64,
    pub num_processes: usize,
}

/// Observable state of one CPU core.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoreSnapshot {
    pub free_power: f64,
    pub capacity: f64,
    pub queue_len: usize,
}

/// Observable state of a host.
#[derive(Debug, Clone, PartialEq)]
pub struct HostSnapshot {
    pub label: String,
    pub states: StateSet,
    pub cpu_reservoir_free: f64,
    pub cpu_reservoir_capacity: f64,
    pub ram_reservoir_free: f64,
    pub ram_reservoir_capacity: f64,
    pub rom_reservoir_free: f64,
    pub rom_reservoir_capacity: f64,
    pub ram_free: f64,
    pub ram_capacity: f64,
    pub cores: Vec<CoreSnapshot>,
    pub containers: Vec<EntityId>,
}

/// Observable state of a packet.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketSnapshot {
    pub label: String,
    pub states: StateSet,
    pub size: u64,
    pub src_host: EntityId,
    pub dst_host: EntityId,
    pub path: Vec<EntityId>,
    pub visited: Vec<EntityId>,
    pub current_hop: Option<EntityId>,
}

/// Observable state of an api call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCallSnapshot {
    pub label: String,
    pub states: StateSet,
    pub packets: Vec<EntityId>,
    pub processes: Vec<EntityId>,
}

/// Observable state of a microservice.
#[derive(Debug, Clone, PartialEq)]
pub struct MicroserviceSnapshot {
    pub label: String,
    pub ready: bool,
    pub containers: Vec<EntityId>,
}

/// Observable state of a port.
#[derive(Debug, Clone, PartialEq)]
pub struct PortSnapshot {
    pub endpoint: EntityId,
    pub free_bandwidth: f64,
    pub capacity: f64,
    pub ip: Option<Ipv4Addr>,
}

impl Simulation {
    /// State tags of any entity.
    pub fn entity_states(&self, id: EntityId) -> Option<StateSet> {
        self.core(id).ok().map(|core| core.states())
    }

    /// Creation instant of an entity, when it has been created.
    pub fn entity_created_at(&self, id: EntityId) -> Option<SimTime> {
        self.core(id).ok().and_then(|core| core.created_at())
    }

    /// Termination instant of an entity, when it has terminated.
    pub fn entity_terminated_at(&self, id: EntityId) -> Option<SimTime> {
        self.core(id).ok().and_then(|core| core.terminated_at())
    }

    /// Snapshot a container.
    pub fn container_snapshot(&self, id: EntityId) -> KernelResult<ContainerSnapshot> {
        let core = self.core(id)?;
        let body = self.container(id)?;
        let num_processes = body
            .process_queue
            .iter()
            .filter(|&&p| self.core(p).map(|c| !c.terminated()).unwrap_or(false))
            .count();
        Ok(ContainerSnapshot {
            label: core.label().to_string(),
            states: core.states(),
            host: body.host,
            cpu_request: body.cpu_request,
            ram_request: body.ram_request,
            image_size: body.image_size,
            cpu_limit: body.cpu_limit,
            ram_limit: body.ram_limit,
            cpu_usage: body.cpu_usage,
            ram_usage: body.ram_usage,
            num_processes,
        })
    }

    /// Snapshot a host with its reservoirs and cores.
    pub fn host_snapshot(&self, id: EntityId) -> KernelResult<HostSnapshot> {
        let core = self.core(id)?;
        let node = self.node(id)?;
        let cpu = self.cpu(node.cpu)?;
        let mut cores = Vec::with_capacity(cpu.cores.len());
        for &core_id in &cpu.cores {
            let body = self.cpu_core(core_id)?;
            cores.push(CoreSnapshot {
                free_power: body.compute.amount(),
                capacity: body.compute.capacity(),
                queue_len: body.queue.len(),
            });
        }
        let containers = match &node.extra {
            crate::hardware::node::NodeExtra::Host {
                container_queue, ..
            } => container_queue.clone(),
            _ => Vec::new(),
        };
        let (ram_reservoir_free, ram_reservoir_capacity) = node
            .ram_reservoir()
            .map(|r| (r.amount(), r.capacity()))
            .unwrap_or((0.0, 0.0));
        let (rom_reservoir_free, rom_reservoir_capacity) = node
            .rom_reservoir()
            .map(|r| (r.amount(), r.capacity()))
            .unwrap_or((0.0, 0.0));
        Ok(HostSnapshot {
            label: core.label().to_string(),
            states: core.states(),
            cpu_reservoir_free: cpu.reservoir.amount(),
            cpu_reservoir_capacity: cpu.reservoir.capacity(),
            ram_reservoir_free,
            ram_reservoir_capacity,
            rom_reservoir_free,
            rom_reservoir_capacity,
            ram_free: node.ram.amount(),
            ram_capacity: node.ram.capacity(),
            cores,
            containers,
        })
    }

    /// Snapshot a packet.
    pub fn packet_snapshot(&self, id: EntityId) -> KernelResult<PacketSnapshot> {
        let core = self.core(id)?;
        let body = self.packet(id)?;
        Ok(PacketSnapshot {
            label: core.label().to_string(),
            states: core.states(),
            size: body.size,
            src_host: body.src_host,
            dst_host: body.dst_host,
            path: body.path.clone(),
            visited: body.visited.clone(),
            current_hop: body.current_hop,
        })
    }

    /// Snapshot an api call.
    pub fn api_call_snapshot(&self, id: EntityId) -> KernelResult<ApiCallSnapshot> {
        let core = self.core(id)?;
        let body = self.api_call(id)?;
        Ok(ApiCallSnapshot {
            label: core.label().to_string(),
            states: core.states(),
            packets: body.packets.clone(),
            processes: body.processes.clone(),
        })
    }

    /// Snapshot a microservice.
    pub fn microservice_snapshot(&self, id: EntityId) -> KernelResult<MicroserviceSnapshot> {
        let core = self.core(id)?;
        Ok(MicroserviceSnapshot {
            label: core.label().to_string(),
            ready: core.ready(),
            containers: self.microservice_containers(id)?,
        })
    }

    /// The packet queue of a node's NIC.
    pub fn node_packet_queue(&self, node: EntityId) -> KernelResult<Vec<EntityId>> {
        let nic = self.nic_of_node(node)?;
        Ok(self.nic(nic)?.packet_queue.clone())
    }

    /// The ports of a node's NIC.
    pub fn port_snapshots(&self, node: EntityId) -> KernelResult<Vec<PortSnapshot>> {
        let nic = self.nic_of_node(node)?;
        let mut out = Vec::new();
        for &port in &self.nic(nic)?.ports {
            let body = self.port(port)?;
            out.push(PortSnapshot {
                endpoint: body.endpoint,
                free_bandwidth: body.bandwidth.amount(),
                capacity: body.bandwidth.capacity(),
                ip: body.ip,
            });
        }
        Ok(out)
    }
}
