//! Api calls: transactions compiled into a causal DAG of processes and
//! packets.
//!
//! The expansion follows one shared pattern, `src process -> src packets
//! -> dst process -> ret packets -> ack process -> ack packets`, with the
//! steps a user endpoint cannot perform skipped. Every step lists its
//! predecessors as precursors, so creation order follows termination
//! order.

use crate::action::{tags, Action};
use crate::error::KernelResult;
use crate::model::Body;
use crate::sim::Simulation;
use crate::software::packet::PacketBody;
use crate::software::process::{ProcessBody, ProcessKind};
use crate::specs::{ApiCallSpec, Endpoint};
use strato_core::{EntityId, Transition};
use tracing::{error, info, warn};

/// An api-call body; owns the packets and processes of its expansion.
#[derive(Debug)]
pub(crate) struct ApiCallBody {
    pub src: Endpoint,
    pub dst: Endpoint,
    pub priority: i64,
    pub src_process_length: u64,
    pub dst_process_length: u64,
    pub ack_process_length: u64,
    pub num_src_packets: u32,
    pub src_packet_size: u64,
    pub num_ret_packets: u32,
    pub ret_packet_size: u64,
    pub num_ack_packets: u32,
    pub ack_packet_size: u64,
    pub packets: Vec<EntityId>,
    pub processes: Vec<EntityId>,
}

/// A resolved packet endpoint: the logical peer plus the node its packets
/// enter and leave the network at.
#[derive(Debug, Clone, Copy)]
struct ResolvedPeer {
    peer: EntityId,
    host: EntityId,
}

impl Simulation {
    /// Register an api call; the api-call initiator task initiates it once
    /// both endpoints are ready.
    pub fn add_api_call(&mut self, spec: ApiCallSpec) -> KernelResult<EntityId> {
        match spec.src {
            Endpoint::User(id) => {
                self.user(id)?;
            }
            Endpoint::Microservice(id) => {
                self.microservice(id)?;
            }
        }
        match spec.dst {
            Endpoint::User(id) => {
                self.user(id)?;
            }
            Endpoint::Microservice(id) => {
                self.microservice(id)?;
            }
        }
        let create_at = self.instant(spec.create_at)?;
        let body = ApiCallBody {
            src: spec.src,
            dst: spec.dst,
            priority: spec.priority,
            src_process_length: spec.src_process_length,
            dst_process_length: spec.dst_process_length,
            ack_process_length: spec.ack_process_length,
            num_src_packets: spec.num_src_packets,
            src_packet_size: spec.src_packet_size,
            num_ret_packets: spec.num_ret_packets,
            ret_packet_size: spec.ret_packet_size,
            num_ack_packets: spec.num_ack_packets,
            ack_packet_size: spec.ack_packet_size,
            packets: Vec::new(),
            processes: Vec::new(),
        };
        let id = self.register(spec.label, Body::ApiCall(body), spec.precursors);
        self.api_calls.push(id);
        self.request_transition(id, Transition::Create, create_at);
        if let Some(seconds) = spec.terminate_at {
            let at = self.instant(seconds)?;
            self.request_transition(id, Transition::Terminate, at);
        }
        Ok(id)
    }

    /// A user is always ready; a microservice once it holds READY.
    pub(crate) fn endpoint_ready(&self, endpoint: Endpoint) -> bool {
        match endpoint {
            Endpoint::User(_) => true,
            Endpoint::Microservice(id) => {
                self.core(id).map(|core| core.ready()).unwrap_or(false)
            }
        }
    }

    /// Resolve an endpoint to the concrete packet peer: the user at its
    /// gateway, or a load-balanced container instance at its host.
    fn resolve_endpoint(&mut self, endpoint: Endpoint) -> KernelResult<Option<ResolvedPeer>> {
        match endpoint {
            Endpoint::User(id) => {
                let gateway = self.user(id)?.gateway;
                Ok(Some(ResolvedPeer {
                    peer: id,
                    host: gateway,
                }))
            }
            Endpoint::Microservice(id) => {
                let Some(container) = self.balance_instance(id)? else {
                    return Ok(None);
                };
                let Some(host) = self.container(container)?.host else {
                    return Ok(None);
                };
                Ok(Some(ResolvedPeer {
                    peer: container,
                    host,
                }))
            }
        }
    }

    fn spawn_call_packet(
        &mut self,
        call: EntityId,
        label: String,
        from: ResolvedPeer,
        to: ResolvedPeer,
        size: u64,
        precursors: Vec<EntityId>,
    ) -> KernelResult<EntityId> {
        let priority = self.api_call(call)?.priority;
        let body = PacketBody {
            src: from.peer,
            dst: to.peer,
            src_host: from.host,
            dst_host: to.host,
            size,
            priority,
            content: Vec::new(),
            path: Vec::new(),
            current_hop: None,
            next_hop: None,
            queued_on: None,
            visited: Vec::new(),
            call: Some(call),
        };
        let id = self.register(label, Body::Packet(body), precursors);
        self.api_call_mut(call)?.packets.push(id);
        let now = self.now();
        self.request_transition(id, Transition::Create, now);
        Ok(id)
    }

    fn spawn_call_process(
        &mut self,
        call: EntityId,
        label: String,
        container: EntityId,
        length: u64,
        precursors: Vec<EntityId>,
    ) -> KernelResult<EntityId> {
        let priority = self.api_call(call)?.priority;
        let id = self.register(
            label,
            Body::Process(ProcessBody::new(
                ProcessKind::Workload { container },
                length,
                priority,
            )),
            precursors,
        );
        self.api_call_mut(call)?.processes.push(id);
        let now = self.now();
        self.request_transition(id, Transition::Create, now);
        Ok(id)
    }

    /// Expand the call into its causal DAG and start its outcome watch.
    pub(crate) fn api_call_on_initiate(&mut self, id: EntityId) -> KernelResult<()> {
        let (src, dst) = {
            let body = self.api_call(id)?;
            (body.src, body.dst)
        };
        let (src_len, dst_len, ack_len, n_src, s_src, n_ret, s_ret, n_ack, s_ack) = {
            let body = self.api_call(id)?;
            (
                body.src_process_length,
                body.dst_process_length,
                body.ack_process_length,
                body.num_src_packets,
                body.src_packet_size,
                body.num_ret_packets,
                body.ret_packet_size,
                body.num_ack_packets,
                body.ack_packet_size,
            )
        };
        let label = self.label_of(id);
        let now = self.now();

        if src.is_user() {
            if src_len > 0 {
                warn!(call = %label, "source is a user, src process length is ignored");
            }
            if ack_len > 0 {
                warn!(call = %label, "source is a user, ack process length is ignored");
            }
            if n_src == 0 {
                error!(call = %label, "a user source needs at least one packet");
                self.request_transition(id, Transition::Terminate, now);
                return Ok(());
            }
        }
        if dst.is_user() && dst_len > 0 {
            warn!(call = %label, "destination is a user, dst process length is ignored");
        }

        let Some(src_peer) = self.resolve_endpoint(src)? else {
            warn!(call = %label, "source endpoint has no usable instance");
            self.request_transition(id, Transition::Fail, now);
            return Ok(());
        };
        let Some(dst_peer) = self.resolve_endpoint(dst)? else {
            warn!(call = %label, "destination endpoint has no usable instance");
            self.request_transition(id, Transition::Fail, now);
            return Ok(());
        };

        // src process, skipped for user sources.
        let src_process = if src.is_user() {
            None
        } else {
            Some(self.spawn_call_process(
                id,
                format!("{label}-SRC"),
                src_peer.peer,
                src_len,
                Vec::new(),
            )?)
        };

        let src_packet_precursors: Vec<EntityId> = src_process.into_iter().collect();
        let mut src_packets = Vec::with_capacity(n_src as usize);
        for i in 0..n_src {
            let packet = self.spawn_call_packet(
                id,
                format!("{label}-SRC-{i}"),
                src_peer,
                dst_peer,
                s_src,
                src_packet_precursors.clone(),
            )?;
            src_packets.push(packet);
        }

        // dst process, skipped for user destinations.
        let dst_process = if dst.is_user() {
            None
        } else {
            Some(self.spawn_call_process(
                id,
                format!("{label}-DST"),
                dst_peer.peer,
                dst_len,
                src_packets.clone(),
            )?)
        };

        let ret_precursors: Vec<EntityId> = match dst_process {
            Some(process) => vec![process],
            None => src_packets.clone(),
        };
        let mut ret_packets = Vec::with_capacity(n_ret as usize);
        for i in 0..n_ret {
            let packet = self.spawn_call_packet(
                id,
                format!("{label}-RET-{i}"),
                dst_peer,
                src_peer,
                s_ret,
                ret_precursors.clone(),
            )?;
            ret_packets.push(packet);
        }

        // ack process, skipped for user sources.
        let ack_process = if src.is_user() {
            None
        } else {
            Some(self.spawn_call_process(
                id,
                format!("{label}-ACK"),
                src_peer.peer,
                ack_len,
                ret_packets.clone(),
            )?)
        };

        let ack_precursors: Vec<EntityId> = match ack_process {
            Some(process) => vec![process],
            None => ret_packets.clone(),
        };
        for i in 0..n_ack {
            self.spawn_call_packet(
                id,
                format!("{label}-ACK-{i}"),
                src_peer,
                dst_peer,
                s_ack,
                ack_precursors.clone(),
            )?;
        }

        self.start_watch(id, tags::APICALL_WATCH, Action::ApiCallWatch { call: id });
        info!(
            call = %label,
            t = self.now_seconds(),
            "api call expanded"
        );
        Ok(())
    }

    /// Per-tick outcome check: any failed part fails the call, all parts
    /// succeeding succeeds it.
    pub(crate) fn api_call_watch(&mut self, id: EntityId) -> KernelResult<()> {
        let Ok(core) = self.core(id) else {
            return Ok(());
        };
        if core.terminated() {
            return Ok(());
        }
        let (packets, processes) = {
            let body = self.api_call(id)?;
            (body.packets.clone(), body.processes.clone())
        };
        let now = self.now();
        let any_failed = packets
            .iter()
            .chain(processes.iter())
            .any(|&part| self.core(part).map(|c| c.failed()).unwrap_or(false));
        if any_failed {
            self.request_transition(id, Transition::Fail, now);
            return Ok(());
        }
        let all_succeeded = packets
            .iter()
            .chain(processes.iter())
            .all(|&part| self.core(part).map(|c| c.succeeded()).unwrap_or(false));
        if all_succeeded {
            self.request_transition(id, Transition::Success, now);
        }
        Ok(())
    }

    /// Termination fails whatever processes are still running; packets in
    /// flight complete on their own.
    pub(crate) fn api_call_on_terminate(&mut self, id: EntityId) -> KernelResult<()> {
        let processes = self.api_call(id)?.processes.clone();
        let now = self.now();
        for process in processes {
            if !self.core(process)?.terminated() {
                self.request_transition(process, Transition::Fail, now);
            }
        }
        info!(call = self.label_of(id), t = self.now_seconds(), "api call terminated");
        Ok(())
    }
}
