//! Hardware nodes: hosts, switches, routers and gateways.
//!
//! A node owns a CPU (which owns its cores), RAM and ROM resources and a
//! NIC with a loopback port. Hosts additionally carry the admission
//! reservoirs and the container/volume queues; switches and routers carry
//! a subnet pool; gateways carry users, an always-on NIC and infinite RAM
//! but no CPU.

use crate::error::{KernelError, KernelResult};
use crate::model::Body;
use crate::sim::Simulation;
use crate::software::process::{ProcessBody, ProcessKind};
use crate::specs::{Architecture, HardwareSpec};
use strato_core::{
    units, EntityId, Resource, ResourceRef, ResourceSlot, StateSet, Transition,
};
use strato_network::{NodeClass, SubnetPool};
use tracing::{info, warn};

/// Host-only or subnet-bearing extensions of a node.
#[derive(Debug)]
pub(crate) enum NodeExtra {
    Host {
        ram_reservoir: Resource,
        rom_reservoir: Resource,
        container_queue: Vec<EntityId>,
        volume_queue: Vec<EntityId>,
    },
    Switch {
        subnet: SubnetPool,
    },
    Router {
        subnet: SubnetPool,
    },
}

/// A host, switch or router.
#[derive(Debug)]
pub(crate) struct NodeBody {
    pub class: NodeClass,
    pub architecture: Architecture,
    pub cpu: EntityId,
    pub nic: EntityId,
    pub ram: Resource,
    pub rom: Resource,
    pub extra: NodeExtra,
}

impl NodeBody {
    pub fn ram_reservoir(&self) -> Option<&Resource> {
        match &self.extra {
            NodeExtra::Host { ram_reservoir, .. } => Some(ram_reservoir),
            _ => None,
        }
    }

    pub fn ram_reservoir_mut(&mut self) -> Option<&mut Resource> {
        match &mut self.extra {
            NodeExtra::Host { ram_reservoir, .. } => Some(ram_reservoir),
            _ => None,
        }
    }

    pub fn rom_reservoir(&self) -> Option<&Resource> {
        match &self.extra {
            NodeExtra::Host { rom_reservoir, .. } => Some(rom_reservoir),
            _ => None,
        }
    }

    pub fn rom_reservoir_mut(&mut self) -> Option<&mut Resource> {
        match &mut self.extra {
            NodeExtra::Host { rom_reservoir, .. } => Some(rom_reservoir),
            _ => None,
        }
    }

    pub fn subnet_mut(&mut self) -> Option<&mut SubnetPool> {
        match &mut self.extra {
            NodeExtra::Switch { subnet } | NodeExtra::Router { subnet } => Some(subnet),
            _ => None,
        }
    }
}

/// A gateway: the packet endpoint of every user behind it.
#[derive(Debug)]
pub(crate) struct GatewayBody {
    pub nic: EntityId,
    pub ram: Resource,
    pub users: Vec<EntityId>,
}

impl Simulation {
    /// Register a host.
    pub fn add_host(&mut self, spec: HardwareSpec) -> KernelResult<EntityId> {
        let ram_bytes = gib_bytes(spec.ram_gib)?;
        let rom_bytes = gib_bytes(spec.rom_gib)?;
        let extra = NodeExtra::Host {
            ram_reservoir: Resource::new(format!("{} RAM Reservoir", spec.label), ram_bytes),
            rom_reservoir: Resource::new(format!("{} ROM Reservoir", spec.label), rom_bytes),
            container_queue: Vec::new(),
            volume_queue: Vec::new(),
        };
        let id = self.build_node(spec, NodeClass::Host, extra)?;
        self.hosts.push(id);
        Ok(id)
    }

    /// Register a switch owning an IPv4 subnet.
    pub fn add_switch(&mut self, spec: HardwareSpec, subnet: SubnetPool) -> KernelResult<EntityId> {
        self.build_node(spec, NodeClass::Switch, NodeExtra::Switch { subnet })
    }

    /// Register a router owning an IPv4 subnet.
    pub fn add_router(&mut self, spec: HardwareSpec, subnet: SubnetPool) -> KernelResult<EntityId> {
        self.build_node(spec, NodeClass::Router, NodeExtra::Router { subnet })
    }

    fn build_node(
        &mut self,
        spec: HardwareSpec,
        class: NodeClass,
        extra: NodeExtra,
    ) -> KernelResult<EntityId> {
        if spec.ipc == 0 || spec.frequency == 0 || spec.num_cores == 0 {
            return Err(KernelError::configuration(format!(
                "node {:?} needs positive ipc, frequency and core count",
                spec.label
            )));
        }
        let ram_bytes = gib_bytes(spec.ram_gib)?;
        let rom_bytes = gib_bytes(spec.rom_gib)?;
        let node_id = self.alloc_id();
        let cpu_id = self.build_cpu(node_id, &spec);
        let nic_id = self.build_nic(node_id, &spec.label);
        let body = NodeBody {
            class,
            architecture: spec.architecture,
            cpu: cpu_id,
            nic: nic_id,
            ram: Resource::new(format!("{}-RAM", spec.label), ram_bytes),
            rom: Resource::new(format!("{}-ROM", spec.label), rom_bytes),
            extra,
        };
        self.insert_entity(node_id, spec.label.clone(), Body::Node(body), Vec::new());
        self.topology.add_node(node_id, class);
        self.add_loopback_port(node_id, nic_id);

        let create_at = self.instant(spec.create_at)?;
        self.request_transition(cpu_id, Transition::Create, create_at);
        let core_ids = self.cpu(cpu_id)?.cores.clone();
        for core_id in core_ids {
            self.request_transition(core_id, Transition::Create, create_at);
        }
        self.request_transition(nic_id, Transition::Create, create_at);
        self.request_transition(node_id, Transition::Create, create_at);
        if let Some(terminate_at) = spec.terminate_at {
            let at = self.instant(terminate_at)?;
            self.request_transition(node_id, Transition::Terminate, at);
        }
        Ok(node_id)
    }

    /// Register a gateway. Gateways are created at once and their NIC is
    /// powered on immediately; they never compute.
    pub fn add_gateway(&mut self, label: impl Into<String>) -> KernelResult<EntityId> {
        let label = label.into();
        let gateway_id = self.alloc_id();
        let nic_id = self.build_nic(gateway_id, &label);
        let body = GatewayBody {
            nic: nic_id,
            ram: Resource::new(format!("{label}-RAM"), f64::INFINITY),
            users: Vec::new(),
        };
        self.insert_entity(gateway_id, label, Body::Gateway(body), Vec::new());
        self.topology.add_node(gateway_id, NodeClass::Gateway);
        self.add_loopback_port(gateway_id, nic_id);
        let now = self.now();
        self.request_transition(nic_id, Transition::Create, now);
        self.request_transition(gateway_id, Transition::Create, now);
        Ok(gateway_id)
    }

    /// Register a user behind a gateway.
    pub fn add_user(
        &mut self,
        gateway: EntityId,
        label: impl Into<String>,
    ) -> KernelResult<EntityId> {
        self.gateway(gateway)?;
        let id = self.register(
            label,
            Body::User(crate::software::user::UserBody { gateway }),
            Vec::new(),
        );
        self.gateway_mut(gateway)?.users.push(id);
        self.users.push(id);
        let now = self.now();
        self.request_transition(id, Transition::Create, now);
        Ok(id)
    }

    pub(crate) fn node_on_create(&mut self, id: EntityId) -> KernelResult<()> {
        info!(node = self.label_of(id), t = self.now_seconds(), "node created");
        Ok(())
    }

    pub(crate) fn gateway_on_create(&mut self, id: EntityId) -> KernelResult<()> {
        let nic = self.gateway(id)?.nic;
        let now = self.now();
        self.request_transition(nic, Transition::PowerOn, now);
        info!(gateway = self.label_of(id), "gateway created");
        Ok(())
    }

    pub(crate) fn node_on_power_on(&mut self, id: EntityId) -> KernelResult<()> {
        let (cpu, nic) = {
            let node = self.node(id)?;
            (node.cpu, node.nic)
        };
        let now = self.now();
        self.request_transition(cpu, Transition::PowerOn, now);
        self.request_transition(nic, Transition::PowerOn, now);
        info!(node = self.label_of(id), t = self.now_seconds(), "node powered on");
        Ok(())
    }

    pub(crate) fn node_on_power_off(&mut self, id: EntityId) -> KernelResult<()> {
        let (cpu, nic) = {
            let node = self.node(id)?;
            (node.cpu, node.nic)
        };
        let now = self.now();
        self.request_transition(cpu, Transition::PowerOff, now);
        self.request_transition(nic, Transition::PowerOff, now);
        let residents: Vec<EntityId> = match &self.node(id)?.extra {
            NodeExtra::Host {
                container_queue, ..
            } => container_queue.clone(),
            _ => Vec::new(),
        };
        for container in residents {
            if !self.core(container)?.terminated() {
                self.request_transition(container, Transition::Terminate, now);
            }
        }
        info!(node = self.label_of(id), t = self.now_seconds(), "node powered off");
        Ok(())
    }

    pub(crate) fn node_on_fail(&mut self, id: EntityId) -> KernelResult<()> {
        let (cpu, nic) = {
            let node = self.node(id)?;
            (node.cpu, node.nic)
        };
        let now = self.now();
        self.request_transition(cpu, Transition::Fail, now);
        self.request_transition(nic, Transition::Fail, now);
        self.request_transition(id, Transition::PowerOff, now);
        Ok(())
    }

    pub(crate) fn node_on_terminate(&mut self, id: EntityId) -> KernelResult<()> {
        let (cpu, nic) = {
            let node = self.node(id)?;
            (node.cpu, node.nic)
        };
        let now = self.now();
        self.request_transition(cpu, Transition::Terminate, now);
        self.request_transition(nic, Transition::Terminate, now);
        self.topology.remove_node(id);
        Ok(())
    }

    /// Bind a container to a host: reserve against the reservoirs, record
    /// the placement and kick off initiation.
    pub(crate) fn allocate_container(
        &mut self,
        host: EntityId,
        container: EntityId,
    ) -> KernelResult<()> {
        let cpu = self.node(host)?.cpu;
        let (cpu_request, ram_request, image_size) = {
            let body = self.container(container)?;
            (body.cpu_request, body.ram_request, body.image_size)
        };
        self.claim(
            container,
            ResourceRef {
                owner: cpu,
                slot: ResourceSlot::CpuReservoir,
            },
            cpu_request as f64,
        )?;
        self.claim(
            container,
            ResourceRef {
                owner: host,
                slot: ResourceSlot::RamReservoir,
            },
            ram_request as f64,
        )?;
        self.claim(
            container,
            ResourceRef {
                owner: host,
                slot: ResourceSlot::RomReservoir,
            },
            image_size as f64,
        )?;
        if let NodeExtra::Host {
            container_queue, ..
        } = &mut self.node_mut(host)?.extra
        {
            container_queue.push(container);
        }
        self.container_mut(container)?.host = Some(host);
        self.core_mut(container)?.set_state(StateSet::SCHEDULED);
        let now = self.now();
        info!(
            container = self.label_of(container),
            host = self.label_of(host),
            t = self.now_seconds(),
            "container allocated"
        );
        self.request_transition(container, Transition::Initiate, now);
        Ok(())
    }

    /// Bind a volume to a host: reserve its size against the ROM reservoir.
    pub(crate) fn allocate_volume(&mut self, host: EntityId, volume: EntityId) -> KernelResult<()> {
        let size = self.volume(volume)?.size;
        self.claim(
            volume,
            ResourceRef {
                owner: host,
                slot: ResourceSlot::RomReservoir,
            },
            size as f64,
        )?;
        if let NodeExtra::Host { volume_queue, .. } = &mut self.node_mut(host)?.extra {
            volume_queue.push(volume);
        }
        self.volume_mut(volume)?.host = Some(host);
        self.core_mut(volume)?.set_state(StateSet::SCHEDULED);
        info!(
            volume = self.label_of(volume),
            host = self.label_of(host),
            t = self.now_seconds(),
            "volume allocated"
        );
        Ok(())
    }

    /// Hand a delivered packet to a node. Regular nodes claim RAM, queue
    /// the packet and decode it before it can travel on; a gateway
    /// succeeds a packet addressed to it and forwards anything else
    /// without a decoding delay.
    pub(crate) fn receive_packet(&mut self, node: EntityId, packet: EntityId) -> KernelResult<()> {
        let now = self.now();
        {
            let core = self.core_mut(packet)?;
            core.clear_state(StateSet::DECODED);
            core.clear_state(StateSet::IN_TRANSMISSION);
        }
        match &self.entity(node)?.body {
            Body::Gateway(_) => {
                let (size, dst_host) = {
                    let body = self.packet(packet)?;
                    (body.size, body.dst_host)
                };
                let ram_ref = ResourceRef {
                    owner: node,
                    slot: ResourceSlot::Ram,
                };
                self.claim(packet, ram_ref, size as f64)?;
                let hop_index = {
                    let body = self.packet_mut(packet)?;
                    body.current_hop = Some(node);
                    body.visited.push(node);
                    body.path.iter().position(|&hop| hop == node)
                };
                if node == dst_host {
                    info!(
                        gateway = self.label_of(node),
                        packet = self.label_of(packet),
                        t = self.now_seconds(),
                        "packet reached gateway"
                    );
                    self.request_transition(packet, Transition::Success, now);
                    return Ok(());
                }
                // Transit: gateways do not compute, so the packet needs no
                // decoder and is eligible for the next hop at once.
                let index = hop_index.ok_or_else(|| {
                    KernelError::Core(strato_core::CoreError::state_violation(format!(
                        "gateway {} is not on the path of packet {}",
                        self.label_of(node),
                        self.label_of(packet)
                    )))
                })?;
                let next = self.packet(packet)?.path.get(index + 1).copied();
                let nic = self.gateway(node)?.nic;
                self.nic_mut(nic)?.packet_queue.push(packet);
                {
                    let body = self.packet_mut(packet)?;
                    body.next_hop = next;
                    body.queued_on = Some(nic);
                }
                self.core_mut(packet)?.set_state(StateSet::DECODED);
                info!(
                    gateway = self.label_of(node),
                    packet = self.label_of(packet),
                    t = self.now_seconds(),
                    "packet forwarded"
                );
                Ok(())
            }
            Body::Node(_) => {
                let size = self.packet(packet)?.size;
                let ram_ref = ResourceRef {
                    owner: node,
                    slot: ResourceSlot::Ram,
                };
                if let Err(err) = self.claim(packet, ram_ref, size as f64) {
                    if err.is_contained() {
                        warn!(
                            node = self.label_of(node),
                            packet = self.label_of(packet),
                            "packet dropped, receiver out of memory"
                        );
                        self.request_transition(packet, Transition::Fail, now);
                        return Ok(());
                    }
                    return Err(err);
                }
                let nic = self.node(node)?.nic;
                self.nic_mut(nic)?.packet_queue.push(packet);
                let (dst_host, hop_index) = {
                    let body = self.packet_mut(packet)?;
                    body.queued_on = Some(nic);
                    body.current_hop = Some(node);
                    body.visited.push(node);
                    let index = body.path.iter().position(|&hop| hop == node);
                    (body.dst_host, index)
                };
                if node != dst_host {
                    let index = hop_index.ok_or_else(|| {
                        KernelError::Core(strato_core::CoreError::state_violation(format!(
                            "node {} is not on the path of packet {}",
                            self.label_of(node),
                            self.label_of(packet)
                        )))
                    })?;
                    let next = self.packet(packet)?.path.get(index + 1).copied();
                    self.packet_mut(packet)?.next_hop = next;
                }
                let label = format!("{} Decoder", self.label_of(packet));
                let decoder = self.register(
                    label,
                    Body::Process(ProcessBody::new(
                        ProcessKind::Decoder {
                            packet,
                            host: node,
                        },
                        size,
                        0,
                    )),
                    Vec::new(),
                );
                self.request_transition(decoder, Transition::Create, now);
                info!(
                    node = self.label_of(node),
                    packet = self.label_of(packet),
                    t = self.now_seconds(),
                    "packet received"
                );
                Ok(())
            }
            _ => Err(KernelError::WrongKind {
                id: node,
                expected: "node",
            }),
        }
    }
}

fn gib_bytes(gib: f64) -> KernelResult<f64> {
    if !gib.is_finite() || gib <= 0.0 {
        return Err(KernelError::configuration(format!(
            "capacity must be positive, got {gib} GiB"
        )));
    }
    Ok(gib * units::BYTES_PER_GIB as f64)
}
