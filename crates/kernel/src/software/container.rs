//! Containers and volumes.
//!
//! A container reserves CPU/RAM/ROM against its host's admission
//! reservoirs when placed, tracks the live usage its instructions generate
//! and fails when a limit is exceeded. Volumes gate their container's
//! placement and reserve host ROM for themselves.

use crate::error::KernelResult;
use crate::model::Body;
use crate::sim::Simulation;
use crate::software::process::{ProcessBody, ProcessKind};
use crate::specs::ContainerSpec;
use strato_core::{units, CoreError, EntityId, Resource, SimTime, Transition};
use tracing::{debug, info};

/// A container body. Sizes are bytes, CPU in milli-CPU.
#[derive(Debug)]
pub(crate) struct ContainerBody {
    pub cpu_request: u64,
    pub ram_request: u64,
    pub image_size: u64,
    pub cpu_limit: Option<f64>,
    pub ram_limit: Option<u64>,
    pub priority: i64,
    pub daemon: bool,
    pub volumes: Vec<EntityId>,
    pub volume_specs: Vec<crate::specs::VolumeSpec>,
    pub host: Option<EntityId>,
    pub microservice: Option<EntityId>,
    pub process_queue: Vec<EntityId>,
    pub daemon_process: Option<EntityId>,
    pub cpu_usage: f64,
    pub ram_usage: u64,
}

impl ContainerBody {
    /// Live CPU usage as a fraction of the limit; zero when unlimited.
    pub fn cpu_utilization(&self) -> f64 {
        match self.cpu_limit {
            Some(limit) if limit > 0.0 => self.cpu_usage / limit,
            _ => 0.0,
        }
    }

    /// Live RAM usage as a fraction of the limit; zero when unlimited.
    pub fn ram_utilization(&self) -> f64 {
        match self.ram_limit {
            Some(limit) if limit > 0 => self.ram_usage as f64 / limit as f64,
            _ => 0.0,
        }
    }
}

/// A storage volume bound to a host by the volume scheduler.
#[derive(Debug)]
pub(crate) struct VolumeBody {
    pub size: u64,
    pub path: String,
    pub store: Resource,
    pub host: Option<EntityId>,
    pub container: Option<EntityId>,
}

impl Simulation {
    /// Register a standalone container.
    pub fn add_container(&mut self, spec: ContainerSpec) -> KernelResult<EntityId> {
        let create_at = self.instant(spec.create_at)?;
        let terminate_at = match spec.terminate_at {
            Some(seconds) => Some(self.instant(seconds)?),
            None => None,
        };
        let label = spec.label.clone();
        let precursors = spec.precursors.clone();
        self.build_container(&spec, label, None, precursors, create_at, terminate_at)
    }

    /// Shared constructor for standalone containers and microservice
    /// instances.
    pub(crate) fn build_container(
        &mut self,
        spec: &ContainerSpec,
        label: String,
        microservice: Option<EntityId>,
        precursors: Vec<EntityId>,
        create_at: SimTime,
        terminate_at: Option<SimTime>,
    ) -> KernelResult<EntityId> {
        if spec.cpu_milli == 0 {
            return Err(CoreError::configuration(format!(
                "container {label} needs a positive CPU request"
            ))
            .into());
        }
        let body = ContainerBody {
            cpu_request: spec.cpu_milli,
            ram_request: units::mib_to_bytes(spec.ram_mib),
            image_size: units::mib_to_bytes(spec.image_mib),
            cpu_limit: spec.cpu_limit_milli.map(|limit| limit as f64),
            ram_limit: spec.ram_limit_mib.map(units::mib_to_bytes),
            priority: spec.priority,
            daemon: spec.daemon,
            volumes: Vec::new(),
            volume_specs: spec.volumes.clone(),
            host: None,
            microservice,
            process_queue: Vec::new(),
            daemon_process: None,
            cpu_usage: 0.0,
            ram_usage: 0,
        };
        let id = self.register(label, Body::Container(body), precursors);
        self.containers.push(id);
        self.request_transition(id, Transition::Create, create_at);
        if let Some(at) = terminate_at {
            self.request_transition(id, Transition::Terminate, at);
        }
        Ok(id)
    }

    pub(crate) fn container_on_create(&mut self, id: EntityId) -> KernelResult<()> {
        let specs = self.container(id)?.volume_specs.clone();
        let now = self.now();
        for spec in specs {
            let size = units::mib_to_bytes(spec.size_mib);
            let volume = self.register(
                spec.label.clone(),
                Body::Volume(VolumeBody {
                    size,
                    path: spec.path.clone(),
                    store: Resource::new(format!("{} Store", spec.label), size as f64),
                    host: None,
                    container: Some(id),
                }),
                Vec::new(),
            );
            self.container_mut(id)?.volumes.push(volume);
            self.volumes.push(volume);
            self.request_transition(volume, Transition::Create, now);
        }
        info!(container = self.label_of(id), t = self.now_seconds(), "container created");
        Ok(())
    }

    /// Initiation requires a host assignment from the scheduler. Daemon
    /// containers spawn their background process here, sized to one second
    /// of compute at the reservation share.
    pub(crate) fn container_on_initiate(&mut self, id: EntityId) -> KernelResult<()> {
        let host = self.container(id)?.host.ok_or_else(|| {
            CoreError::state_violation(format!(
                "container {} initiated without a host",
                self.label_of(id)
            ))
        })?;
        if self.container(id)?.daemon {
            let (ipc, frequency) = {
                let cpu = self.cpu(self.node(host)?.cpu)?;
                (cpu.ipc, cpu.frequency)
            };
            let cpu_request = self.container(id)?.cpu_request;
            let length =
                ((cpu_request as f64 / 1000.0) * (ipc * frequency) as f64).round() as u64;
            let label = self.label_of(id);
            let daemon = self.register(
                label,
                Body::Process(ProcessBody::new(
                    ProcessKind::Daemon { container: id },
                    length,
                    -1,
                )),
                Vec::new(),
            );
            self.container_mut(id)?.daemon_process = Some(daemon);
            let now = self.now();
            self.request_transition(daemon, Transition::Create, now);
        }
        info!(container = self.label_of(id), t = self.now_seconds(), "container initiated");
        Ok(())
    }

    pub(crate) fn container_on_terminate(&mut self, id: EntityId) -> KernelResult<()> {
        let (processes, volumes) = {
            let body = self.container(id)?;
            (body.process_queue.clone(), body.volumes.clone())
        };
        let now = self.now();
        for process in processes {
            if !self.core(process)?.terminated() {
                self.request_transition(process, Transition::Fail, now);
            }
        }
        for volume in volumes {
            if !self.core(volume)?.terminated() {
                self.request_transition(volume, Transition::Terminate, now);
            }
        }
        info!(container = self.label_of(id), t = self.now_seconds(), "container terminated");
        Ok(())
    }

    pub(crate) fn container_on_destroy(&mut self, id: EntityId) -> KernelResult<()> {
        let volumes = self.container(id)?.volumes.clone();
        let now = self.now();
        for volume in volumes {
            if !self.core(volume)?.destroyed() {
                self.request_transition(volume, Transition::Destroy, now);
            }
        }
        debug!(container = self.label_of(id), "container destroyed");
        Ok(())
    }
}
