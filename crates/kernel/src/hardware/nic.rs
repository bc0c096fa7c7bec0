//! NICs and ports: link provisioning and the bandwidth transmission state
//! machine.
//!
//! Every tick a powered NIC walks its packet queue in priority order and
//! starts a transmission for each decoded packet whose link has spare
//! bandwidth on both ends. A transmission reserves the packet size on both
//! ports and delivers after `size / link_speed`.

use crate::action::{tags, Action};
use crate::error::{KernelError, KernelResult};
use crate::model::Body;
use crate::sim::Simulation;
use std::net::Ipv4Addr;
use strato_core::{
    units, CoreError, EntityId, Resource, ResourceRef, ResourceSlot, StateSet, Transition,
};
use strato_network::NodeClass;
use tracing::{debug, info};

/// A network interface: its ports and the queue of packets awaiting
/// transmission from this node.
#[derive(Debug)]
pub(crate) struct NicBody {
    pub host: EntityId,
    pub ports: Vec<EntityId>,
    pub packet_queue: Vec<EntityId>,
}

/// One port of a NIC, facing a single link endpoint.
#[derive(Debug)]
pub(crate) struct PortBody {
    pub nic: EntityId,
    pub endpoint: EntityId,
    pub bandwidth: Resource,
    pub ip: Option<Ipv4Addr>,
}

impl Simulation {
    pub(crate) fn build_nic(&mut self, host: EntityId, host_label: &str) -> EntityId {
        self.register(
            format!("{host_label}-NIC"),
            Body::Nic(NicBody {
                host,
                ports: Vec::new(),
                packet_queue: Vec::new(),
            }),
            Vec::new(),
        )
    }

    /// Every node talks to itself over a loopback port; a route of length
    /// one transmits across it.
    pub(crate) fn add_loopback_port(&mut self, node: EntityId, nic: EntityId) {
        self.build_port(
            nic,
            node,
            units::LOOPBACK_BANDWIDTH_MIB,
            Some(Ipv4Addr::LOCALHOST),
        );
    }

    fn build_port(
        &mut self,
        nic: EntityId,
        endpoint: EntityId,
        bandwidth_mib: u64,
        ip: Option<Ipv4Addr>,
    ) -> EntityId {
        let index = self.nic(nic).map(|body| body.ports.len()).unwrap_or(0);
        let label = format!("{}-{}", self.label_of(nic), index);
        let capacity = units::mib_to_bytes(bandwidth_mib) as f64;
        let port = self.register(
            label.clone(),
            Body::Port(PortBody {
                nic,
                endpoint,
                bandwidth: Resource::new(format!("{label} Bandwidth"), capacity),
                ip,
            }),
            Vec::new(),
        );
        if let Ok(body) = self.nic_mut(nic) {
            body.ports.push(port);
        }
        let now = self.now();
        self.request_transition(port, Transition::Create, now);
        let nic_powered = self.core(nic).map(|c| c.powered_on()).unwrap_or(false);
        if nic_powered {
            self.request_transition(port, Transition::PowerOn, now);
        }
        port
    }

    /// Insert a link into the topology and provision a port on each
    /// endpoint. Non-switch endpoints draw an IPv4 address from the peer's
    /// subnet pool when it has one. A host-to-host link is rejected at
    /// call time and leaves both the graph and the NICs unchanged.
    pub fn add_link(
        &mut self,
        a: EntityId,
        b: EntityId,
        bandwidth_mib: u64,
    ) -> KernelResult<()> {
        if bandwidth_mib == 0 {
            return Err(KernelError::configuration("link bandwidth must be positive"));
        }
        let weight = units::mib_to_bytes(bandwidth_mib) as f64;
        self.topology.add_link(a, b, weight)?;
        let ip_a = self.draw_endpoint_ip(a, b)?;
        let ip_b = self.draw_endpoint_ip(b, a)?;
        let nic_a = self.nic_of_node(a)?;
        let nic_b = self.nic_of_node(b)?;
        self.build_port(nic_a, b, bandwidth_mib, ip_a);
        self.build_port(nic_b, a, bandwidth_mib, ip_b);
        debug!(
            a = self.label_of(a),
            b = self.label_of(b),
            bandwidth_mib,
            "link provisioned"
        );
        Ok(())
    }

    /// Tear a link down and terminate the ports facing it.
    pub fn remove_link(&mut self, a: EntityId, b: EntityId) -> KernelResult<()> {
        self.topology.remove_link(a, b);
        let now = self.now();
        for (node, endpoint) in [(a, b), (b, a)] {
            let nic = self.nic_of_node(node)?;
            let ports = self.nic(nic)?.ports.clone();
            let mut keep = Vec::with_capacity(ports.len());
            for port in ports {
                if self.port(port)?.endpoint == endpoint {
                    self.request_transition(port, Transition::Terminate, now);
                } else {
                    keep.push(port);
                }
            }
            self.nic_mut(nic)?.ports = keep;
        }
        Ok(())
    }

    /// The port's address assignment rule: switches never take an address
    /// on a link; everyone else asks the peer's pool, when there is one.
    fn draw_endpoint_ip(
        &mut self,
        node: EntityId,
        peer: EntityId,
    ) -> KernelResult<Option<Ipv4Addr>> {
        let class = self
            .topology
            .node_class(node)
            .ok_or(KernelError::UnknownEntity { id: node })?;
        if class == NodeClass::Switch {
            return Ok(None);
        }
        let Ok(peer_node) = self.node_mut(peer) else {
            return Ok(None);
        };
        match peer_node.subnet_mut() {
            Some(pool) => Ok(Some(pool.allocate()?)),
            None => Ok(None),
        }
    }

    pub(crate) fn nic_of_node(&self, node: EntityId) -> KernelResult<EntityId> {
        match &self.entity(node)?.body {
            Body::Node(body) => Ok(body.nic),
            Body::Gateway(body) => Ok(body.nic),
            _ => Err(KernelError::WrongKind {
                id: node,
                expected: "node",
            }),
        }
    }

    pub(crate) fn nic_on_power_on(&mut self, id: EntityId) -> KernelResult<()> {
        let ports = self.nic(id)?.ports.clone();
        let now = self.now();
        for port in ports {
            self.request_transition(port, Transition::PowerOn, now);
        }
        self.push_continuous(
            now,
            strato_core::SimTime::TICK,
            0,
            id,
            Some(tags::NIC_SCAN),
            Action::NicScan { nic: id },
        );
        Ok(())
    }

    pub(crate) fn nic_on_power_off(&mut self, id: EntityId) -> KernelResult<()> {
        self.cancel_loop(id, tags::NIC_SCAN);
        let ports = self.nic(id)?.ports.clone();
        let now = self.now();
        for port in ports {
            self.request_transition(port, Transition::PowerOff, now);
        }
        Ok(())
    }

    pub(crate) fn nic_on_terminate(&mut self, id: EntityId) -> KernelResult<()> {
        let ports = self.nic(id)?.ports.clone();
        let now = self.now();
        for port in ports {
            self.request_transition(port, Transition::Terminate, now);
        }
        Ok(())
    }

    /// The egress port of `nic` facing `endpoint`. A missing port while a
    /// packet wants to cross it is a routing table corruption, surfaced as
    /// a fatal.
    fn find_port(&self, nic: EntityId, endpoint: EntityId) -> KernelResult<EntityId> {
        for &port in &self.nic(nic)?.ports {
            if self.port(port)?.endpoint == endpoint {
                return Ok(port);
            }
        }
        Err(KernelError::Core(CoreError::state_violation(format!(
            "no port on {} facing {}",
            self.label_of(nic),
            self.label_of(endpoint)
        ))))
    }

    /// One transmission pass over the packet queue in priority order.
    pub(crate) fn nic_scan(&mut self, nic_id: EntityId) -> KernelResult<()> {
        if !self.core(nic_id)?.powered_on() {
            return Ok(());
        }
        let mut queue: Vec<(i64, EntityId)> = Vec::new();
        for packet in self.nic(nic_id)?.packet_queue.clone() {
            let Ok(core) = self.core(packet) else {
                continue;
            };
            if core.decoded() && !core.in_transmission() && !core.terminated() {
                queue.push((self.packet(packet)?.priority, packet));
            }
        }
        queue.sort_by_key(|&(priority, _)| priority);

        for (_, packet) in queue {
            let (size, current_hop, next_hop) = {
                let body = self.packet(packet)?;
                (body.size, body.current_hop, body.next_hop)
            };
            let (Some(current_hop), Some(next_hop)) = (current_hop, next_hop) else {
                return Err(KernelError::Core(CoreError::state_violation(format!(
                    "packet {} has no hops while queued",
                    self.label_of(packet)
                ))));
            };
            let egress = self.find_port(nic_id, next_hop)?;
            let peer_nic = self.nic_of_node(next_hop)?;
            let ingress = self.find_port(peer_nic, current_hop)?;
            let (egress_free, egress_capacity) = {
                let port = self.port(egress)?;
                (port.bandwidth.amount(), port.bandwidth.capacity())
            };
            let (ingress_free, ingress_capacity) = {
                let port = self.port(ingress)?;
                (port.bandwidth.amount(), port.bandwidth.capacity())
            };
            let available = egress_free.min(ingress_free);
            if available <= size as f64 {
                // Not enough headroom on the link; retry next tick.
                continue;
            }
            self.core_mut(packet)?.set_state(StateSet::IN_TRANSMISSION);
            self.claim(
                packet,
                ResourceRef {
                    owner: egress,
                    slot: ResourceSlot::Bandwidth,
                },
                size as f64,
            )?;
            self.claim(
                packet,
                ResourceRef {
                    owner: ingress,
                    slot: ResourceSlot::Bandwidth,
                },
                size as f64,
            )?;
            let link_speed = egress_capacity.min(ingress_capacity);
            let now = self.now();
            let delivery = now
                + self
                    .clock
                    .base()
                    .time_from_seconds(size as f64 / link_speed)?;
            self.push_instant(
                delivery,
                0,
                packet,
                None,
                Action::PacketDelivered {
                    packet,
                    egress,
                    ingress,
                },
            );
            info!(
                packet = self.label_of(packet),
                from = self.label_of(current_hop),
                to = self.label_of(next_hop),
                t = self.now_seconds(),
                "packet in transmission"
            );
        }
        Ok(())
    }

    /// End of a transmission: give the bandwidth back on both ports, leave
    /// the sender's queue and hand the packet to the receiving node.
    pub(crate) fn packet_delivered(
        &mut self,
        packet: EntityId,
        egress: EntityId,
        ingress: EntityId,
    ) -> KernelResult<()> {
        let size = self.packet(packet)?.size as f64;
        self.return_claimed(
            packet,
            ResourceRef {
                owner: egress,
                slot: ResourceSlot::Bandwidth,
            },
            size,
        )?;
        self.return_claimed(
            packet,
            ResourceRef {
                owner: ingress,
                slot: ResourceSlot::Bandwidth,
            },
            size,
        )?;
        let sender_nic = self.port(egress)?.nic;
        self.nic_mut(sender_nic)?.packet_queue.retain(|&p| p != packet);
        {
            let body = self.packet_mut(packet)?;
            if body.queued_on == Some(sender_nic) {
                body.queued_on = None;
            }
        }
        if self.core(packet)?.terminated() {
            return Ok(());
        }
        let receiver_nic = self.port(ingress)?.nic;
        let receiver = self.nic(receiver_nic)?.host;
        self.receive_packet(receiver, packet)
    }
}
