//! Processes and their instructions.
//!
//! A process is a bag of virtual instructions executed by a CPU. Workload
//! and daemon processes belong to a container; a decoder belongs to a
//! packet and models per-hop processing delay. A daemon re-emits a fresh
//! instruction whenever one retires, producing steady background load.

use crate::action::{tags, Action};
use crate::error::KernelResult;
use crate::model::Body;
use crate::sim::Simulation;
use crate::specs::Architecture;
use std::collections::VecDeque;
use strato_core::{units, CoreError, EntityId, StateSet, Transition};
use tracing::{debug, info};

/// The concrete process variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessKind {
    /// Container-bound workload, e.g. one leg of an api call.
    Workload { container: EntityId },
    /// Container-bound background load sized to the CPU reservation.
    Daemon { container: EntityId },
    /// Packet decoder pinned to the receiving node.
    Decoder { packet: EntityId, host: EntityId },
}

impl ProcessKind {
    pub fn container(&self) -> Option<EntityId> {
        match *self {
            ProcessKind::Workload { container } | ProcessKind::Daemon { container } => {
                Some(container)
            }
            ProcessKind::Decoder { .. } => None,
        }
    }

    pub fn is_daemon(&self) -> bool {
        matches!(self, ProcessKind::Daemon { .. })
    }
}

/// A process body.
#[derive(Debug)]
pub(crate) struct ProcessBody {
    pub kind: ProcessKind,
    pub length: u64,
    pub priority: i64,
    pub instructions: Vec<EntityId>,
    pub unscheduled: VecDeque<EntityId>,
}

impl ProcessBody {
    pub fn new(kind: ProcessKind, length: u64, priority: i64) -> Self {
        ProcessBody {
            kind,
            length,
            priority,
            instructions: Vec::new(),
            unscheduled: VecDeque::new(),
        }
    }
}

/// One virtual instruction. The payload length depends on the host
/// architecture and sets the RAM footprint.
#[derive(Debug)]
pub(crate) struct InstructionBody {
    pub process: EntityId,
    pub payload: Vec<u8>,
    /// Milli-CPU charged to the container when dispatched; `None` until
    /// then.
    pub counted: Option<f64>,
    /// Core whose queue currently caches this instruction.
    pub cached_on: Option<EntityId>,
}

impl InstructionBody {
    /// Modeled RAM footprint in bytes.
    pub fn footprint(&self) -> u64 {
        self.payload.len() as u64 * units::INSTRUCTION_BYTE_FOOTPRINT
    }
}

impl Simulation {
    /// The node a process executes on.
    pub(crate) fn process_host(&self, process: EntityId) -> KernelResult<EntityId> {
        match self.process(process)?.kind {
            ProcessKind::Workload { container } | ProcessKind::Daemon { container } => self
                .container(container)?
                .host
                .ok_or_else(|| {
                    CoreError::state_violation(format!(
                        "process {} runs in an unplaced container",
                        self.label_of(process)
                    ))
                    .into()
                }),
            ProcessKind::Decoder { host, .. } => Ok(host),
        }
    }

    pub(crate) fn process_on_create(&mut self, id: EntityId) -> KernelResult<()> {
        info!(process = self.label_of(id), t = self.now_seconds(), "process created");
        let now = self.now();
        self.request_transition(id, Transition::Initiate, now);
        Ok(())
    }

    pub(crate) fn process_on_initiate(&mut self, id: EntityId) -> KernelResult<()> {
        let host = self.process_host(id)?;
        let length = self.process(id)?.length;
        for _ in 0..length {
            self.spawn_instruction(id)?;
        }
        let cpu = match &self.entity(host)?.body {
            Body::Node(node) => node.cpu,
            _ => {
                return Err(CoreError::state_violation(format!(
                    "process {} cannot execute on {}",
                    self.label_of(id),
                    self.label_of(host)
                ))
                .into())
            }
        };
        if let Some(container) = self.process(id)?.kind.container() {
            self.container_mut(container)?.process_queue.push(id);
        }
        self.cpu_mut(cpu)?.process_queue.push(id);
        if !self.process(id)?.kind.is_daemon() {
            self.start_watch(id, tags::PROCESS_WATCH, Action::ProcessWatch { process: id });
        }
        Ok(())
    }

    /// Materialize one instruction of a process: random payload bytes by
    /// architecture, registered and appended to the unscheduled queue.
    pub(crate) fn spawn_instruction(&mut self, process: EntityId) -> KernelResult<EntityId> {
        let host = self.process_host(process)?;
        let architecture = self.node(host)?.architecture;
        let payload_len = match architecture {
            Architecture::X86 => self.rng.range_inclusive(1, 16),
            Architecture::Arm => 4,
        };
        let payload = self.rng.bytes(payload_len);
        let index = self.process(process)?.instructions.len();
        let label = format!("{}-{}", self.label_of(process), index);
        let id = self.register(
            label,
            Body::Instruction(InstructionBody {
                process,
                payload,
                counted: None,
                cached_on: None,
            }),
            Vec::new(),
        );
        let now = self.now();
        self.core_mut(id)?.apply(Transition::Create, now);
        let body = self.process_mut(process)?;
        body.instructions.push(id);
        body.unscheduled.push_back(id);
        Ok(id)
    }

    pub(crate) fn process_on_success(&mut self, id: EntityId) -> KernelResult<()> {
        info!(process = self.label_of(id), t = self.now_seconds(), "process completed");
        if let ProcessKind::Decoder { packet, .. } = self.process(id)?.kind {
            self.core_mut(packet)?.set_state(StateSet::DECODED);
            debug!(packet = self.label_of(packet), "packet decoded");
            let (current_hop, dst_host) = {
                let body = self.packet(packet)?;
                (body.current_hop, body.dst_host)
            };
            if current_hop == Some(dst_host) {
                let now = self.now();
                self.request_transition(packet, Transition::Success, now);
            }
        }
        Ok(())
    }

    pub(crate) fn process_on_fail(&mut self, id: EntityId) -> KernelResult<()> {
        info!(process = self.label_of(id), t = self.now_seconds(), "process failed");
        let now = self.now();
        match self.process(id)?.kind {
            ProcessKind::Daemon { container } => {
                self.request_transition(container, Transition::Fail, now);
            }
            ProcessKind::Decoder { packet, .. } => {
                self.request_transition(packet, Transition::Fail, now);
            }
            ProcessKind::Workload { .. } => {}
        }
        Ok(())
    }

    pub(crate) fn process_on_terminate(&mut self, id: EntityId) -> KernelResult<()> {
        let instructions = self.process(id)?.instructions.clone();
        for instruction in instructions {
            self.retire_instruction(instruction)?;
        }
        if let Some(container) = self.process(id)?.kind.container() {
            if let Ok(body) = self.container_mut(container) {
                body.process_queue.retain(|&p| p != id);
            }
        }
        if let Ok(host) = self.process_host(id) {
            if let Ok(cpu) = self.node(host).map(|n| n.cpu) {
                self.cpu_mut(cpu)?.process_queue.retain(|&p| p != id);
            }
        }
        Ok(())
    }

    /// Per-tick completion check: a non-daemon process succeeds once every
    /// instruction has retired.
    pub(crate) fn process_watch(&mut self, id: EntityId) -> KernelResult<()> {
        let Ok(core) = self.core(id) else {
            return Ok(());
        };
        if core.terminated() || !core.states().contains(StateSet::INITIATED) {
            return Ok(());
        }
        let done = self
            .process(id)?
            .instructions
            .iter()
            .all(|&i| self.core(i).map(|c| c.terminated()).unwrap_or(true));
        if done {
            let now = self.now();
            self.request_transition(id, Transition::Success, now);
        }
        Ok(())
    }
}
