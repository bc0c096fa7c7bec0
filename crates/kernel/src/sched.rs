//! Placement schedulers and the api-call initiator.
//!
//! Three periodic tasks share the clock at period `min_time_unit` and run
//! after all other same-tick work: containers onto hosts (gated on their
//! volumes), volumes onto hosts (ROM only), and created api calls into
//! initiation once both endpoints are ready. Whatever cannot be placed
//! this tick is retried on the next one, indefinitely.

use crate::error::KernelResult;
use crate::sim::Simulation;
use crate::specs::PlacementPolicy;
use strato_core::{EntityId, Transition};
use tracing::debug;

/// The built-in periodic tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ServiceTask {
    ContainerScheduler,
    VolumeScheduler,
    ApiCallInitiator,
}

impl ServiceTask {
    pub fn label(self) -> &'static str {
        match self {
            ServiceTask::ContainerScheduler => "Container Scheduler",
            ServiceTask::VolumeScheduler => "Volume Scheduler",
            ServiceTask::ApiCallInitiator => "API Call Initiator",
        }
    }
}

/// Body of a built-in task entity.
#[derive(Debug)]
pub(crate) struct ServiceBody {
    pub task: ServiceTask,
}

/// What a pending container asks of a host.
#[derive(Debug, Clone, Copy)]
struct Demand {
    cpu: f64,
    ram: f64,
    rom: f64,
}

impl Simulation {
    /// Hosts able to take `demand`, ordered by the active policy. The
    /// default policy keeps creation order; best fit sorts by ascending
    /// free cpu, then ram, then rom; worst fit descending.
    fn select_host(&self, policy: PlacementPolicy, demand: Demand) -> KernelResult<Option<EntityId>> {
        let mut candidates: Vec<(EntityId, f64, f64, f64)> = Vec::new();
        for &host in &self.hosts {
            let core = self.core(host)?;
            if !core.powered_on() || core.terminated() {
                continue;
            }
            let node = self.node(host)?;
            let cpu_free = self.cpu(node.cpu)?.reservoir.amount();
            let ram_free = node.ram_reservoir().map(|r| r.amount()).unwrap_or(0.0);
            let rom_free = node.rom_reservoir().map(|r| r.amount()).unwrap_or(0.0);
            if cpu_free >= demand.cpu && ram_free >= demand.ram && rom_free >= demand.rom {
                candidates.push((host, cpu_free, ram_free, rom_free));
            }
        }
        match policy {
            PlacementPolicy::Default => {}
            PlacementPolicy::BestFit => candidates.sort_by(|a, b| {
                (a.1, a.2, a.3)
                    .partial_cmp(&(b.1, b.2, b.3))
                    .unwrap_or(std::cmp::Ordering::Equal)
            }),
            PlacementPolicy::WorstFit => candidates.sort_by(|a, b| {
                (b.1, b.2, b.3)
                    .partial_cmp(&(a.1, a.2, a.3))
                    .unwrap_or(std::cmp::Ordering::Equal)
            }),
        }
        Ok(candidates.first().map(|&(host, ..)| host))
    }

    /// One pass over unscheduled containers in ascending priority order.
    pub(crate) fn container_scheduler_tick(&mut self) -> KernelResult<()> {
        let mut pending: Vec<(i64, EntityId)> = Vec::new();
        for &container in &self.containers {
            let Ok(core) = self.core(container) else {
                continue;
            };
            if core.created() && !core.scheduled() && !core.terminated() && !core.failed() {
                pending.push((self.container(container)?.priority, container));
            }
        }
        pending.sort_by_key(|&(priority, _)| priority);
        for (_, container) in pending {
            let (volumes, demand) = {
                let body = self.container(container)?;
                (
                    body.volumes.clone(),
                    Demand {
                        cpu: body.cpu_request as f64,
                        ram: body.ram_request as f64,
                        rom: body.image_size as f64,
                    },
                )
            };
            let volumes_placed = volumes
                .iter()
                .all(|&v| self.core(v).map(|c| c.scheduled()).unwrap_or(false));
            if !volumes_placed {
                continue;
            }
            match self.select_host(self.container_policy, demand)? {
                Some(host) => self.allocate_container(host, container)?,
                None => debug!(
                    container = self.label_of(container),
                    "no host can take the container this tick"
                ),
            }
        }
        Ok(())
    }

    /// One pass over unscheduled volumes; placement matches on ROM only.
    pub(crate) fn volume_scheduler_tick(&mut self) -> KernelResult<()> {
        let pending: Vec<EntityId> = self
            .volumes
            .iter()
            .copied()
            .filter(|&v| {
                self.core(v)
                    .map(|core| core.created() && !core.scheduled() && !core.terminated())
                    .unwrap_or(false)
            })
            .collect();
        for volume in pending {
            let demand = Demand {
                cpu: 0.0,
                ram: 0.0,
                rom: self.volume(volume)?.size as f64,
            };
            match self.select_host(self.volume_policy, demand)? {
                Some(host) => self.allocate_volume(host, volume)?,
                None => debug!(
                    volume = self.label_of(volume),
                    "no host can take the volume this tick"
                ),
            }
        }
        Ok(())
    }

    /// Initiate created api calls whose endpoints are both ready.
    pub(crate) fn api_call_init_tick(&mut self) -> KernelResult<()> {
        let pending: Vec<EntityId> = self
            .api_calls
            .iter()
            .copied()
            .filter(|&call| {
                self.core(call)
                    .map(|core| {
                        core.created()
                            && !core.states().contains(strato_core::StateSet::INITIATED)
                            && !core.terminated()
                    })
                    .unwrap_or(false)
            })
            .collect();
        let now = self.now();
        for call in pending {
            let (src, dst) = {
                let body = self.api_call(call)?;
                (body.src, body.dst)
            };
            if self.endpoint_ready(src) && self.endpoint_ready(dst) {
                self.request_transition(call, Transition::Initiate, now);
            }
        }
        Ok(())
    }
}
