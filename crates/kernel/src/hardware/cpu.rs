//! CPUs and their cores: instruction dispatch and retirement.
//!
//! A CPU runs a scheduling pass every instruction cycle, handing
//! instructions of queued processes to its cores within each container's
//! free CPU share. Each core retires the head of its instruction queue on
//! its own clock, offset one cycle from power-on.

use crate::action::{tags, Action};
use crate::error::KernelResult;
use crate::model::Body;
use crate::sim::Simulation;
use crate::specs::{DispatchMode, HardwareSpec};
use std::collections::VecDeque;
use strato_core::{
    units, EntityId, Resource, ResourceRef, ResourceSlot, Transition,
};
use tracing::{debug, warn};

/// A CPU: dispatch state and the admission reservoir for container CPU
/// shares (1000 milli-CPU per core).
#[derive(Debug)]
pub(crate) struct CpuBody {
    pub host: EntityId,
    pub ipc: u64,
    pub frequency: u64,
    pub num_cores: u32,
    pub tdp: f64,
    pub mode: DispatchMode,
    pub cores: Vec<EntityId>,
    pub process_queue: Vec<EntityId>,
    pub reservoir: Resource,
}

impl CpuBody {
    /// Instructions per second of one core.
    pub fn core_power(&self) -> f64 {
        (self.ipc * self.frequency) as f64
    }

    /// Seconds per instruction cycle.
    pub fn instruction_cycle(&self) -> f64 {
        1.0 / self.core_power()
    }
}

/// One CPU core: its computational power resource and instruction queue.
#[derive(Debug)]
pub(crate) struct CoreBody {
    pub ipc: u64,
    pub frequency: u64,
    pub compute: Resource,
    pub queue: VecDeque<EntityId>,
}

impl CoreBody {
    pub fn instruction_cycle(&self) -> f64 {
        1.0 / (self.ipc * self.frequency) as f64
    }
}

impl Simulation {
    /// Build the CPU entity tree of a node: cores first, then the CPU
    /// referencing them.
    pub(crate) fn build_cpu(&mut self, host: EntityId, spec: &HardwareSpec) -> EntityId {
        let mut cores = Vec::with_capacity(spec.num_cores as usize);
        for index in 0..spec.num_cores {
            let label = format!("{}-{}", spec.label, index);
            let compute = Resource::new(
                format!("{label} Computational Power"),
                (spec.ipc * spec.frequency) as f64,
            );
            let core_id = self.register(
                label,
                Body::CpuCore(CoreBody {
                    ipc: spec.ipc,
                    frequency: spec.frequency,
                    compute,
                    queue: VecDeque::new(),
                }),
                Vec::new(),
            );
            cores.push(core_id);
        }
        let reservoir = Resource::new(
            format!("{} CPU Reservoir", spec.label),
            (units::MILLI_CPU_PER_CORE * spec.num_cores as u64) as f64,
        );
        self.register(
            format!("{}-CPU", spec.label),
            Body::Cpu(CpuBody {
                host,
                ipc: spec.ipc,
                frequency: spec.frequency,
                num_cores: spec.num_cores,
                tdp: spec.cpu_tdp,
                mode: spec.cpu_mode,
                cores,
                process_queue: Vec::new(),
                reservoir,
            }),
            Vec::new(),
        )
    }

    pub(crate) fn cpu_on_power_on(&mut self, id: EntityId) -> KernelResult<()> {
        let (cores, cycle_seconds) = {
            let cpu = self.cpu(id)?;
            (cpu.cores.clone(), cpu.instruction_cycle())
        };
        let now = self.now();
        for core in cores {
            self.request_transition(core, Transition::PowerOn, now);
        }
        let cycle = self.span(cycle_seconds)?;
        self.push_continuous(now, cycle, 0, id, Some(tags::CPU_DISPATCH), Action::CpuDispatch {
            cpu: id,
        });
        Ok(())
    }

    pub(crate) fn cpu_on_power_off(&mut self, id: EntityId) -> KernelResult<()> {
        self.cancel_loop(id, tags::CPU_DISPATCH);
        let (cores, queue) = {
            let cpu = self.cpu(id)?;
            (cpu.cores.clone(), cpu.process_queue.clone())
        };
        let now = self.now();
        for process in queue {
            if !self.core(process)?.terminated() {
                self.request_transition(process, Transition::Fail, now);
            }
        }
        for core in cores {
            self.request_transition(core, Transition::PowerOff, now);
        }
        Ok(())
    }

    pub(crate) fn cpu_on_terminate(&mut self, id: EntityId) -> KernelResult<()> {
        let cores = self.cpu(id)?.cores.clone();
        let now = self.now();
        for core in cores {
            self.request_transition(core, Transition::Terminate, now);
        }
        Ok(())
    }

    pub(crate) fn core_on_power_on(&mut self, id: EntityId) -> KernelResult<()> {
        let cycle = self.span(self.cpu_core(id)?.instruction_cycle())?;
        let now = self.now();
        self.push_continuous(
            now + cycle,
            cycle,
            0,
            id,
            Some(tags::CORE_CYCLE),
            Action::CoreCycle { core: id },
        );
        Ok(())
    }

    pub(crate) fn core_on_power_off(&mut self, id: EntityId) -> KernelResult<()> {
        self.cancel_loop(id, tags::CORE_CYCLE);
        let queued: Vec<EntityId> = self.cpu_core(id)?.queue.iter().copied().collect();
        let mut impacted: Vec<EntityId> = Vec::new();
        for instruction in queued {
            let process = self.instruction(instruction)?.process;
            if !impacted.contains(&process) {
                impacted.push(process);
            }
        }
        let now = self.now();
        for process in impacted {
            if !self.core(process)?.terminated() {
                self.request_transition(process, Transition::Fail, now);
            }
        }
        Ok(())
    }

    /// One scheduling pass over the process queue, ordered by ascending
    /// process priority. For each process the number of dispatchable
    /// instructions is bounded by its container's free CPU share.
    pub(crate) fn cpu_dispatch(&mut self, cpu_id: EntityId) -> KernelResult<()> {
        if !self.core(cpu_id)?.powered_on() {
            return Ok(());
        }
        let (mode, host_id, cores, core_power) = {
            let cpu = self.cpu(cpu_id)?;
            (cpu.mode, cpu.host, cpu.cores.clone(), cpu.core_power())
        };
        let per_instruction_mcpu = 1000.0 / core_power;

        // Drop dead processes from the queue, then order by priority.
        let mut ordered: Vec<(i64, EntityId)> = Vec::new();
        {
            let queue = self.cpu(cpu_id)?.process_queue.clone();
            let mut live = Vec::with_capacity(queue.len());
            for pid in queue {
                let alive = self
                    .core(pid)
                    .map(|core| !core.terminated())
                    .unwrap_or(false);
                if alive {
                    live.push(pid);
                    let priority = self.process(pid)?.priority;
                    ordered.push((priority, pid));
                }
            }
            self.cpu_mut(cpu_id)?.process_queue = live;
        }
        ordered.sort_by_key(|&(priority, _)| priority);

        for (_, pid) in ordered {
            if self.core(pid).map(|c| c.terminated()).unwrap_or(true) {
                continue;
            }
            let (container, unscheduled) = {
                let process = self.process(pid)?;
                (process.kind.container(), process.unscheduled.len())
            };
            let share = match container {
                None => usize::MAX,
                Some(cid) => {
                    let body = self.container(cid)?;
                    match body.cpu_limit {
                        None => usize::MAX,
                        Some(limit) => {
                            let free =
                                ((limit - body.cpu_usage) / 1000.0 * core_power).round();
                            if free > 0.0 {
                                free as usize
                            } else {
                                0
                            }
                        }
                    }
                }
            };
            let mut schedulable = unscheduled.min(share);
            if schedulable == 0 {
                continue;
            }
            debug!(
                cpu = self.label_of(cpu_id),
                process = self.label_of(pid),
                schedulable,
                "dispatching instructions"
            );
            'process: while schedulable > 0 {
                let Some((core_id, free)) = self.most_free_core(&cores)? else {
                    break;
                };
                let burst = match mode {
                    DispatchMode::RoundRobin => 1,
                    DispatchMode::Packed => schedulable.min((free.round() as usize).max(1)),
                };
                for _ in 0..burst {
                    let Some(instruction) = self.process_mut(pid)?.unscheduled.pop_front()
                    else {
                        break 'process;
                    };
                    if self.place_instruction(
                        instruction,
                        container,
                        host_id,
                        core_id,
                        per_instruction_mcpu,
                    )? {
                        schedulable -= 1;
                    } else {
                        let now = self.now();
                        self.request_transition(pid, Transition::Fail, now);
                        if let Some(cid) = container {
                            self.request_transition(cid, Transition::Fail, now);
                        }
                        break 'process;
                    }
                }
            }
        }
        Ok(())
    }

    /// The powered core with the most free computational power; ties keep
    /// creation order.
    fn most_free_core(&self, cores: &[EntityId]) -> KernelResult<Option<(EntityId, f64)>> {
        let mut best: Option<(EntityId, f64)> = None;
        for &core_id in cores {
            let free = self.cpu_core(core_id)?.compute.amount();
            if free > 0.0 && best.map_or(true, |(_, current)| free > current) {
                best = Some((core_id, free));
            }
        }
        Ok(best)
    }

    /// Place one instruction: charge host RAM, charge the container's
    /// usage counters, check its limits, cache on the core. Returns
    /// `Ok(false)` when the owning process must fail.
    fn place_instruction(
        &mut self,
        instruction: EntityId,
        container: Option<EntityId>,
        host: EntityId,
        core_id: EntityId,
        per_instruction_mcpu: f64,
    ) -> KernelResult<bool> {
        let footprint = self.instruction(instruction)?.footprint();
        let ram_ref = ResourceRef {
            owner: host,
            slot: ResourceSlot::Ram,
        };
        if let Err(err) = self.claim(instruction, ram_ref, footprint as f64) {
            if err.is_contained() {
                warn!(
                    host = self.label_of(host),
                    instruction = self.label_of(instruction),
                    "host out of memory"
                );
                return Ok(false);
            }
            return Err(err);
        }
        if let Some(cid) = container {
            let over_limit = {
                let body = self.container_mut(cid)?;
                body.ram_usage += footprint;
                body.cpu_usage += per_instruction_mcpu;
                let ram_over = body
                    .ram_limit
                    .map_or(false, |limit| body.ram_usage > limit);
                let cpu_over = body
                    .cpu_limit
                    .map_or(false, |limit| body.cpu_usage > limit);
                ram_over || cpu_over
            };
            self.instruction_mut(instruction)?.counted = Some(per_instruction_mcpu);
            if over_limit {
                warn!(
                    container = self.label_of(cid),
                    "container exceeded its resource limit"
                );
                return Ok(false);
            }
        }
        let compute_ref = ResourceRef {
            owner: core_id,
            slot: ResourceSlot::Compute,
        };
        self.claim(instruction, compute_ref, 1.0)?;
        self.cpu_core_mut(core_id)?.queue.push_back(instruction);
        self.instruction_mut(instruction)?.cached_on = Some(core_id);
        Ok(true)
    }

    /// One execution step of a core: retire the head instruction; a
    /// daemon's instruction is replaced by a fresh one.
    pub(crate) fn core_cycle(&mut self, core_id: EntityId) -> KernelResult<()> {
        if !self.core(core_id)?.powered_on() {
            return Ok(());
        }
        let Some(instruction) = self.cpu_core_mut(core_id)?.queue.pop_front() else {
            return Ok(());
        };
        let process = self.instruction(instruction)?.process;
        self.retire_instruction(instruction)?;
        debug!(
            core = self.label_of(core_id),
            instruction = self.label_of(instruction),
            "instruction executed"
        );
        let respawn = {
            let alive = !self.core(process)?.terminated();
            alive && self.process(process)?.kind.is_daemon()
        };
        if respawn {
            self.spawn_instruction(process)?;
        }
        Ok(())
    }

    /// Terminate an instruction: restore the container usage counters it
    /// charged, release its claims and detach it from any core queue.
    pub(crate) fn retire_instruction(&mut self, instruction: EntityId) -> KernelResult<()> {
        if self.core(instruction)?.terminated() {
            return Ok(());
        }
        let (process, counted, footprint, cached_on) = {
            let body = self.instruction(instruction)?;
            (body.process, body.counted, body.footprint(), body.cached_on)
        };
        if let Some(mcpu) = counted {
            if let Some(cid) = self.process(process)?.kind.container() {
                if self.entities.contains_key(&cid) {
                    let body = self.container_mut(cid)?;
                    body.cpu_usage = (body.cpu_usage - mcpu).max(0.0);
                    body.ram_usage = body.ram_usage.saturating_sub(footprint);
                }
            }
        }
        if let Some(core_id) = cached_on {
            self.cpu_core_mut(core_id)?.queue.retain(|&i| i != instruction);
            self.instruction_mut(instruction)?.cached_on = None;
        }
        let now = self.now();
        self.core_mut(instruction)?.apply(Transition::Terminate, now);
        let claims = self.core_mut(instruction)?.take_claims();
        for claim in claims {
            if let Ok(resource) = self.resource_mut(claim.resource) {
                resource.put(now, claim.amount);
            }
        }
        Ok(())
    }
}
