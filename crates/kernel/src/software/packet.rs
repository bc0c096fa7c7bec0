//! Packets: routed payloads between containers and users.
//!
//! A packet computes its route once at initiation, claims RAM at every
//! node it traverses, and must be decoded at each hop before it can travel
//! on. Failure to claim RAM anywhere drops the packet.

use crate::error::KernelResult;
use crate::sim::Simulation;
use strato_core::{EntityId, StateSet, Transition};
use tracing::{debug, info, warn};

/// A packet body. `size` is bytes; `path` is the hop list computed at
/// initiation, `visited` the hops actually reached.
#[derive(Debug)]
pub(crate) struct PacketBody {
    pub src: EntityId,
    pub dst: EntityId,
    pub src_host: EntityId,
    pub dst_host: EntityId,
    pub size: u64,
    pub priority: i64,
    pub content: Vec<u8>,
    pub path: Vec<EntityId>,
    pub current_hop: Option<EntityId>,
    pub next_hop: Option<EntityId>,
    pub queued_on: Option<EntityId>,
    pub visited: Vec<EntityId>,
    pub call: Option<EntityId>,
}

impl Simulation {
    pub(crate) fn packet_on_create(&mut self, id: EntityId) -> KernelResult<()> {
        debug!(packet = self.label_of(id), t = self.now_seconds(), "packet created");
        let now = self.now();
        self.request_transition(id, Transition::Initiate, now);
        Ok(())
    }

    /// Routing, source RAM admission and queueing at the source NIC.
    pub(crate) fn packet_on_initiate(&mut self, id: EntityId) -> KernelResult<()> {
        let (src_host, dst_host, size) = {
            let body = self.packet(id)?;
            (body.src_host, body.dst_host, body.size)
        };
        let content = self.rng.bytes(size as usize);
        self.packet_mut(id)?.content = content;
        let now = self.now();
        let mut path = match self.topology.route(src_host, dst_host) {
            Ok(path) => path,
            Err(err) => {
                warn!(
                    packet = self.label_of(id),
                    %err,
                    "no route, dropping packet"
                );
                self.request_transition(id, Transition::Fail, now);
                return Ok(());
            }
        };
        if path.len() == 1 {
            path.push(path[0]);
        }
        {
            let body = self.packet_mut(id)?;
            body.current_hop = Some(path[0]);
            body.next_hop = Some(path[1]);
            body.visited = vec![path[0]];
            body.path = path;
        }
        let ram_ref = strato_core::ResourceRef {
            owner: src_host,
            slot: strato_core::ResourceSlot::Ram,
        };
        if let Err(err) = self.claim(id, ram_ref, size as f64) {
            if err.is_contained() {
                warn!(
                    packet = self.label_of(id),
                    host = self.label_of(src_host),
                    "source out of memory, dropping packet"
                );
                self.request_transition(id, Transition::Fail, now);
                return Ok(());
            }
            return Err(err);
        }
        self.core_mut(id)?.set_state(StateSet::DECODED);
        let nic = self.nic_of_node(src_host)?;
        self.nic_mut(nic)?.packet_queue.push(id);
        self.packet_mut(id)?.queued_on = Some(nic);
        info!(packet = self.label_of(id), t = self.now_seconds(), "packet initiated");
        Ok(())
    }

    pub(crate) fn packet_on_terminate(&mut self, id: EntityId) -> KernelResult<()> {
        let queued_on = self.packet(id)?.queued_on;
        if let Some(nic) = queued_on {
            if let Ok(body) = self.nic_mut(nic) {
                body.packet_queue.retain(|&p| p != id);
            }
            self.packet_mut(id)?.queued_on = None;
        }
        debug!(packet = self.label_of(id), t = self.now_seconds(), "packet terminated");
        Ok(())
    }
}
