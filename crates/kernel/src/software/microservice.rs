//! Microservices: auto-scaling groups of identical containers behind a
//! load balancer.
//!
//! The per-tick evaluator keeps the instance count between the configured
//! bounds: it recreates instances when the initiated count drops below the
//! minimum, marks the service READY otherwise, and applies at most one
//! scaling action at a time.

use crate::action::{tags, Action};
use crate::error::KernelResult;
use crate::model::Body;
use crate::sim::Simulation;
use crate::specs::{ContainerSpec, LoadBalancer, MicroserviceSpec, ScalingThresholds};
use strato_core::{EntityId, StateSet, Transition};
use tracing::{debug, info};

/// A microservice body.
#[derive(Debug)]
pub(crate) struct MicroserviceBody {
    pub template: ContainerSpec,
    pub min_instances: u32,
    pub max_instances: u32,
    pub load_balancer: LoadBalancer,
    pub thresholds: ScalingThresholds,
    pub evaluation_interval: f64,
    pub containers: Vec<EntityId>,
    pub scaling: bool,
    pub spawned: u32,
}

impl Simulation {
    /// Register a microservice.
    pub fn add_microservice(&mut self, spec: MicroserviceSpec) -> KernelResult<EntityId> {
        if spec.min_instances == 0 || spec.max_instances < spec.min_instances {
            return Err(crate::error::KernelError::configuration(format!(
                "microservice {:?} needs 1 <= min <= max instances",
                spec.label
            )));
        }
        let create_at = self.instant(spec.create_at)?;
        let body = MicroserviceBody {
            template: spec.container.clone(),
            min_instances: spec.min_instances,
            max_instances: spec.max_instances,
            load_balancer: spec.load_balancer,
            thresholds: spec.thresholds,
            evaluation_interval: spec.evaluation_interval,
            containers: Vec::new(),
            scaling: false,
            spawned: 0,
        };
        let id = self.register(spec.label, Body::Microservice(body), spec.precursors);
        self.microservices.push(id);
        self.request_transition(id, Transition::Create, create_at);
        if let Some(seconds) = spec.terminate_at {
            let at = self.instant(seconds)?;
            self.request_transition(id, Transition::Terminate, at);
        }
        Ok(id)
    }

    /// Live (non-terminated) instances of a microservice.
    pub fn microservice_containers(&self, microservice: EntityId) -> KernelResult<Vec<EntityId>> {
        Ok(self
            .microservice(microservice)?
            .containers
            .iter()
            .copied()
            .filter(|&c| self.core(c).map(|core| !core.terminated()).unwrap_or(false))
            .collect())
    }

    /// Explicitly add `count` instances at `at_seconds`. The maximum bound
    /// only constrains the evaluator, not explicit scaling.
    pub fn scale_out(&mut self, microservice: EntityId, count: u32, at_seconds: f64) -> KernelResult<()> {
        let at = self.instant(at_seconds)?;
        self.request_scale(microservice, count, at, true);
        Ok(())
    }

    /// Explicitly retire `count` instances at `at_seconds`, never dropping
    /// below the configured minimum.
    pub fn scale_in(&mut self, microservice: EntityId, count: u32, at_seconds: f64) -> KernelResult<()> {
        let at = self.instant(at_seconds)?;
        self.request_scale(microservice, count, at, false);
        Ok(())
    }

    pub(crate) fn microservice_on_create(&mut self, id: EntityId) -> KernelResult<()> {
        let min = self.microservice(id)?.min_instances;
        for _ in 0..min {
            self.spawn_instance(id)?;
        }
        let interval_seconds = self.microservice(id)?.evaluation_interval;
        let interval = if interval_seconds > 0.0 {
            self.span(interval_seconds)?
        } else {
            strato_core::SimTime::TICK
        };
        let now = self.now();
        self.push_continuous(
            now,
            interval,
            0,
            id,
            Some(tags::MS_EVALUATOR),
            Action::MicroserviceEvaluate { microservice: id },
        );
        info!(microservice = self.label_of(id), "microservice created");
        Ok(())
    }

    pub(crate) fn microservice_on_terminate(&mut self, id: EntityId) -> KernelResult<()> {
        let containers = self.microservice(id)?.containers.clone();
        let now = self.now();
        for container in containers {
            if !self.core(container)?.terminated() {
                self.request_transition(container, Transition::Terminate, now);
            }
        }
        Ok(())
    }

    fn spawn_instance(&mut self, id: EntityId) -> KernelResult<EntityId> {
        let (template, index) = {
            let body = self.microservice_mut(id)?;
            let index = body.spawned;
            body.spawned += 1;
            (body.template.clone(), index)
        };
        let label = format!("{}-{}", self.label_of(id), index);
        let now = self.now();
        let container = self.build_container(&template, label, Some(id), Vec::new(), now, None)?;
        self.microservice_mut(id)?.containers.push(container);
        Ok(container)
    }

    /// Mean CPU and RAM utilization across instances: initiated instances
    /// contribute their usage, the denominator counts every live instance.
    pub(crate) fn microservice_utilization(&self, id: EntityId) -> KernelResult<(f64, f64)> {
        let containers = self.microservice_containers(id)?;
        if containers.is_empty() {
            return Ok((0.0, 0.0));
        }
        let mut cpu = 0.0;
        let mut ram = 0.0;
        for &container in &containers {
            if self.core(container)?.initiated() {
                let body = self.container(container)?;
                cpu += body.cpu_utilization();
                ram += body.ram_utilization();
            }
        }
        let count = containers.len() as f64;
        Ok((cpu / count, ram / count))
    }

    /// The scaling evaluator: readiness bookkeeping, replacement of dead
    /// instances, then at most one scaling decision.
    pub(crate) fn microservice_evaluate(&mut self, id: EntityId) -> KernelResult<()> {
        let Ok(core) = self.core(id) else {
            return Ok(());
        };
        if core.terminated() {
            return Ok(());
        }
        // Drop terminated instances from the pool.
        let live: Vec<EntityId> = {
            let containers = self.microservice(id)?.containers.clone();
            containers
                .into_iter()
                .filter(|&c| self.core(c).map(|core| !core.terminated()).unwrap_or(false))
                .collect()
        };
        self.microservice_mut(id)?.containers = live.clone();
        let initiated: Vec<EntityId> = live
            .iter()
            .copied()
            .filter(|&c| self.core(c).map(|core| core.initiated()).unwrap_or(false))
            .collect();
        let (min, max) = {
            let body = self.microservice(id)?;
            (body.min_instances as usize, body.max_instances as usize)
        };
        let now = self.now();
        if initiated.len() < min {
            if self.core(id)?.ready() {
                self.core_mut(id)?.clear_state(StateSet::READY);
                let missing = min - initiated.len();
                for _ in 0..missing {
                    self.spawn_instance(id)?;
                }
                info!(
                    microservice = self.label_of(id),
                    missing,
                    t = self.now_seconds(),
                    "instances lost, recreating"
                );
            }
            return Ok(());
        }
        if !self.core(id)?.ready() {
            self.core_mut(id)?.set_state(StateSet::READY);
            info!(microservice = self.label_of(id), t = self.now_seconds(), "microservice ready");
        }
        // Pending instances park scaling decisions.
        if initiated.len() != live.len() {
            return Ok(());
        }
        let (cpu_util, ram_util) = self.microservice_utilization(id)?;
        let thresholds = self.microservice(id)?.thresholds;
        if live.len() < max
            && (cpu_util >= thresholds.cpu_upper || ram_util >= thresholds.ram_upper)
        {
            self.request_scale(id, 1, now, true);
            return Ok(());
        }
        if live.len() > min
            && cpu_util <= thresholds.cpu_lower
            && ram_util <= thresholds.ram_lower
        {
            self.request_scale(id, 1, now, false);
        }
        Ok(())
    }

    /// Schedule a scaling action; the scaling flag admits one in flight.
    fn request_scale(&mut self, id: EntityId, count: u32, at: strato_core::SimTime, out: bool) {
        let Ok(body) = self.microservice_mut(id) else {
            return;
        };
        if body.scaling {
            return;
        }
        body.scaling = true;
        let action = if out {
            Action::ScaleOut {
                microservice: id,
                count,
            }
        } else {
            Action::ScaleIn {
                microservice: id,
                count,
            }
        };
        self.push_instant(
            at,
            strato_core::TRANSITION_PRIORITY,
            id,
            Some(tags::MS_SCALE),
            action,
        );
    }

    pub(crate) fn microservice_scale_out(&mut self, id: EntityId, count: u32) -> KernelResult<()> {
        if self.core(id)?.terminated() {
            return Ok(());
        }
        for _ in 0..count {
            self.spawn_instance(id)?;
        }
        self.microservice_mut(id)?.scaling = false;
        info!(
            microservice = self.label_of(id),
            count,
            t = self.now_seconds(),
            "scaled out"
        );
        Ok(())
    }

    pub(crate) fn microservice_scale_in(&mut self, id: EntityId, count: u32) -> KernelResult<()> {
        if self.core(id)?.terminated() {
            return Ok(());
        }
        let live = self.microservice_containers(id)?;
        let min = self.microservice(id)?.min_instances as usize;
        let retire = (count as usize).min(live.len().saturating_sub(min));
        let now = self.now();
        for &container in live.iter().take(retire) {
            self.request_transition(container, Transition::Terminate, now);
        }
        self.microservice_mut(id)?.scaling = false;
        info!(
            microservice = self.label_of(id),
            retired = retire,
            t = self.now_seconds(),
            "scaled in"
        );
        Ok(())
    }

    /// Pick an initiated instance per the configured balancer. Best fit
    /// prefers the highest current usage, worst fit the lowest; random
    /// draws from the seeded stream.
    pub(crate) fn balance_instance(&mut self, id: EntityId) -> KernelResult<Option<EntityId>> {
        let candidates: Vec<EntityId> = self
            .microservice(id)?
            .containers
            .iter()
            .copied()
            .filter(|&c| self.core(c).map(|core| core.initiated()).unwrap_or(false))
            .collect();
        if candidates.is_empty() {
            return Ok(None);
        }
        let balancer = self.microservice(id)?.load_balancer;
        let choice = match balancer {
            LoadBalancer::Random => {
                let index = self.rng.pick(candidates.len()).unwrap_or(0);
                candidates[index]
            }
            LoadBalancer::BestFit => {
                let mut best = candidates[0];
                let mut best_key = self.usage_key(best)?;
                for &candidate in &candidates[1..] {
                    let key = self.usage_key(candidate)?;
                    if key >= best_key {
                        best = candidate;
                        best_key = key;
                    }
                }
                best
            }
            LoadBalancer::WorstFit => {
                let mut worst = candidates[0];
                let mut worst_key = self.usage_key(worst)?;
                for &candidate in &candidates[1..] {
                    let key = self.usage_key(candidate)?;
                    if key < worst_key {
                        worst = candidate;
                        worst_key = key;
                    }
                }
                worst
            }
        };
        debug!(
            microservice = self.label_of(id),
            container = self.label_of(choice),
            "instance selected"
        );
        Ok(Some(choice))
    }

    fn usage_key(&self, container: EntityId) -> KernelResult<(u64, u64)> {
        let body = self.container(container)?;
        // RAM usage dominates, CPU usage breaks ties.
        Ok((body.ram_usage, body.cpu_usage.round() as u64))
    }
}
