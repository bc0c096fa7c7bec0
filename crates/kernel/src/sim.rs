// Copyright (C) 2024-2025 The Strato Project.
//
// sim.rs file belongs to the strato project and is free
// software distributed under the MIT software license, see the
// accompanying file LICENSE in the main directory of the
// repository or http://www.opensource.org/licenses/mit-license.php
// for more details.
//
// Redistribution and use in source and binary forms with or without
// modifications are permitted.

//! The simulation façade: the arena of entities, the canonical registries,
//! the transition engine and the dispatch loop.
//!
//! There is no global singleton; every constructor and handler works
//! against an explicit [`Simulation`] context, so independent scenarios can
//! run side by side in one process.

use crate::action::Action;
use crate::error::{KernelError, KernelResult};
use crate::hardware::cpu::{CoreBody, CpuBody};
use crate::hardware::nic::{NicBody, PortBody};
use crate::hardware::node::{GatewayBody, NodeBody};
use crate::model::{Body, Entity};
use crate::monitor::MonitorBody;
use crate::sched::{ServiceBody, ServiceTask};
use crate::software::apicall::ApiCallBody;
use crate::software::container::{ContainerBody, VolumeBody};
use crate::software::microservice::MicroserviceBody;
use crate::software::packet::PacketBody;
use crate::software::process::{InstructionBody, ProcessBody};
use crate::software::user::UserBody;
use crate::specs::PlacementPolicy;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use strato_core::{
    EntityCore, EntityId, Event, EventKind, Priority, RequestCheck, ResourceRef, Resource,
    SimConfig, SimRng, SimTime, TimeBase, Transition, VirtualClock, SCHEDULER_PRIORITY,
    TRANSITION_PRIORITY,
};
use strato_network::Topology;
use strato_telemetry::Recorder;
use tracing::{debug, info, warn};

macro_rules! body_accessors {
    ($ref_fn:ident, $mut_fn:ident, $variant:ident, $ty:ty, $kind:literal) => {
        pub(crate) fn $ref_fn(&self, id: EntityId) -> KernelResult<&$ty> {
            match &self.entity(id)?.body {
                Body::$variant(body) => Ok(body),
                _ => Err(KernelError::WrongKind {
                    id,
                    expected: $kind,
                }),
            }
        }

        pub(crate) fn $mut_fn(&mut self, id: EntityId) -> KernelResult<&mut $ty> {
            match &mut self.entity_mut(id)?.body {
                Body::$variant(body) => Ok(body),
                _ => Err(KernelError::WrongKind {
                    id,
                    expected: $kind,
                }),
            }
        }
    };
}

/// An isolated simulation context.
pub struct Simulation {
    config: SimConfig,
    pub(crate) clock: VirtualClock<Action>,
    pub(crate) rng: SimRng,
    pub(crate) entities: IndexMap<EntityId, Entity>,
    pub(crate) topology: Topology,
    pub(crate) hosts: Vec<EntityId>,
    pub(crate) containers: Vec<EntityId>,
    pub(crate) volumes: Vec<EntityId>,
    pub(crate) microservices: Vec<EntityId>,
    pub(crate) api_calls: Vec<EntityId>,
    pub(crate) users: Vec<EntityId>,
    pub(crate) container_policy: PlacementPolicy,
    pub(crate) volume_policy: PlacementPolicy,
    pub(crate) recorders: Vec<Arc<dyn Recorder>>,
    waiting_on: HashMap<EntityId, Vec<EntityId>>,
    next_id: u64,
}

impl Simulation {
    /// Create a context and install the built-in periodic tasks: the
    /// container scheduler, the volume scheduler and the api-call
    /// initiator, all at period `min_time_unit` and scheduler priority.
    pub fn new(config: SimConfig) -> KernelResult<Self> {
        config.validate()?;
        let base = TimeBase::new(config.resolution)?;
        let rng = SimRng::from_seed(config.seed);
        let mut sim = Simulation {
            config,
            clock: VirtualClock::new(base),
            rng,
            entities: IndexMap::new(),
            topology: Topology::new(),
            hosts: Vec::new(),
            containers: Vec::new(),
            volumes: Vec::new(),
            microservices: Vec::new(),
            api_calls: Vec::new(),
            users: Vec::new(),
            container_policy: PlacementPolicy::Default,
            volume_policy: PlacementPolicy::Default,
            recorders: Vec::new(),
            waiting_on: HashMap::new(),
            next_id: 0,
        };
        sim.install_service(ServiceTask::ContainerScheduler);
        sim.install_service(ServiceTask::VolumeScheduler);
        sim.install_service(ServiceTask::ApiCallInitiator);
        Ok(sim)
    }

    fn install_service(&mut self, task: ServiceTask) {
        let action = match task {
            ServiceTask::ContainerScheduler => Action::ContainerSchedulerTick,
            ServiceTask::VolumeScheduler => Action::VolumeSchedulerTick,
            ServiceTask::ApiCallInitiator => Action::ApiCallInitTick,
        };
        let id = self.register(task.label(), Body::Service(ServiceBody { task }), Vec::new());
        if let Ok(core) = self.core_mut(id) {
            core.apply(Transition::Create, SimTime::ZERO);
        }
        self.push_continuous(
            SimTime::ZERO,
            SimTime::TICK,
            SCHEDULER_PRIORITY,
            id,
            None,
            action,
        );
    }

    /// The configuration the context was built with.
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Current virtual instant.
    pub fn now(&self) -> SimTime {
        self.clock.now()
    }

    /// Current virtual instant in seconds.
    pub fn now_seconds(&self) -> f64 {
        self.clock.base().seconds(self.clock.now())
    }

    /// The minimum time unit in seconds.
    pub fn min_time_unit(&self) -> f64 {
        self.clock.base().min_time_unit()
    }

    /// Tick/second conversion in force.
    pub fn time_base(&self) -> TimeBase {
        self.clock.base()
    }

    /// Select the placement policy of the container scheduler.
    pub fn set_container_policy(&mut self, policy: PlacementPolicy) {
        self.container_policy = policy;
    }

    /// Select the placement policy of the volume scheduler.
    pub fn set_volume_policy(&mut self, policy: PlacementPolicy) {
        self.volume_policy = policy;
    }

    /// Attach a telemetry recorder; monitors push every sample into every
    /// registered recorder.
    pub fn add_recorder(&mut self, recorder: Arc<dyn Recorder>) {
        self.recorders.push(recorder);
    }

    /// Registered host ids in creation order.
    pub fn hosts(&self) -> &[EntityId] {
        &self.hosts
    }

    /// Registered container ids in creation order.
    pub fn containers(&self) -> &[EntityId] {
        &self.containers
    }

    /// Registered volume ids in creation order.
    pub fn volumes(&self) -> &[EntityId] {
        &self.volumes
    }

    /// Registered microservice ids in creation order.
    pub fn microservices(&self) -> &[EntityId] {
        &self.microservices
    }

    /// Registered api-call ids in creation order.
    pub fn api_calls(&self) -> &[EntityId] {
        &self.api_calls
    }

    /// Registered user ids in creation order.
    pub fn users(&self) -> &[EntityId] {
        &self.users
    }

    /// The topology graph.
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    // ------------------------------------------------------------------
    // Arena plumbing
    // ------------------------------------------------------------------

    pub(crate) fn alloc_id(&mut self) -> EntityId {
        let id = EntityId::from_raw(self.next_id);
        self.next_id += 1;
        id
    }

    pub(crate) fn register(
        &mut self,
        label: impl Into<String>,
        body: Body,
        precursors: Vec<EntityId>,
    ) -> EntityId {
        let id = self.alloc_id();
        self.insert_entity(id, label, body, precursors);
        id
    }

    /// Insert an entity under a pre-allocated id; used where parent and
    /// child bodies reference each other.
    pub(crate) fn insert_entity(
        &mut self,
        id: EntityId,
        label: impl Into<String>,
        body: Body,
        precursors: Vec<EntityId>,
    ) {
        let core = EntityCore::new(id, label).with_precursors(precursors);
        self.entities.insert(id, Entity { core, body });
    }

    pub(crate) fn entity(&self, id: EntityId) -> KernelResult<&Entity> {
        self.entities.get(&id).ok_or(KernelError::UnknownEntity { id })
    }

    pub(crate) fn entity_mut(&mut self, id: EntityId) -> KernelResult<&mut Entity> {
        self.entities
            .get_mut(&id)
            .ok_or(KernelError::UnknownEntity { id })
    }

    pub(crate) fn core(&self, id: EntityId) -> KernelResult<&EntityCore> {
        Ok(&self.entity(id)?.core)
    }

    pub(crate) fn core_mut(&mut self, id: EntityId) -> KernelResult<&mut EntityCore> {
        Ok(&mut self.entity_mut(id)?.core)
    }

    body_accessors!(node, node_mut, Node, NodeBody, "node");
    body_accessors!(gateway, gateway_mut, Gateway, GatewayBody, "gateway");
    body_accessors!(cpu, cpu_mut, Cpu, CpuBody, "cpu");
    body_accessors!(cpu_core, cpu_core_mut, CpuCore, CoreBody, "cpu core");
    body_accessors!(nic, nic_mut, Nic, NicBody, "nic");
    body_accessors!(port, port_mut, Port, PortBody, "port");
    body_accessors!(process, process_mut, Process, ProcessBody, "process");
    body_accessors!(
        instruction,
        instruction_mut,
        Instruction,
        InstructionBody,
        "instruction"
    );
    body_accessors!(container, container_mut, Container, ContainerBody, "container");
    body_accessors!(volume, volume_mut, Volume, VolumeBody, "volume");
    body_accessors!(packet, packet_mut, Packet, PacketBody, "packet");
    body_accessors!(
        microservice,
        microservice_mut,
        Microservice,
        MicroserviceBody,
        "microservice"
    );
    body_accessors!(api_call, api_call_mut, ApiCall, ApiCallBody, "api call");
    body_accessors!(user, user_mut, User, UserBody, "user");
    body_accessors!(monitor, monitor_mut, Monitor, MonitorBody, "monitor");

    /// Label of an entity; empty when unknown.
    pub fn label_of(&self, id: EntityId) -> String {
        self.core(id)
            .map(|core| core.label().to_string())
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Time and scheduling helpers
    // ------------------------------------------------------------------

    /// Absolute instant from seconds, clamped to `now`.
    pub(crate) fn instant(&self, seconds: f64) -> KernelResult<SimTime> {
        Ok(self.clock.instant_from_seconds(seconds)?)
    }

    /// Span from seconds; positive spans never collapse below one tick.
    pub(crate) fn span(&self, seconds: f64) -> KernelResult<SimTime> {
        Ok(self.clock.base().span_from_seconds(seconds)?)
    }

    pub(crate) fn push_instant(
        &mut self,
        at: SimTime,
        priority: Priority,
        owner: EntityId,
        tag: Option<u32>,
        action: Action,
    ) {
        self.clock.schedule(Event {
            at,
            priority,
            owner,
            tag,
            kind: EventKind::Instant,
            action,
        });
    }

    pub(crate) fn push_continuous(
        &mut self,
        at: SimTime,
        interval: SimTime,
        priority: Priority,
        owner: EntityId,
        tag: Option<u32>,
        action: Action,
    ) {
        self.clock.schedule(Event {
            at,
            priority,
            owner,
            tag,
            kind: EventKind::Continuous {
                interval,
                until: None,
            },
            action,
        });
    }

    // ------------------------------------------------------------------
    // Resource plumbing
    // ------------------------------------------------------------------

    pub(crate) fn resource(&self, rref: ResourceRef) -> KernelResult<&Resource> {
        use strato_core::ResourceSlot::*;
        let entity = self.entity(rref.owner)?;
        let resource = match (&entity.body, rref.slot) {
            (Body::Node(node), Ram) => &node.ram,
            (Body::Node(node), Rom) => &node.rom,
            (Body::Node(node), RamReservoir) => node
                .ram_reservoir()
                .ok_or(KernelError::WrongKind {
                    id: rref.owner,
                    expected: "host",
                })?,
            (Body::Node(node), RomReservoir) => node
                .rom_reservoir()
                .ok_or(KernelError::WrongKind {
                    id: rref.owner,
                    expected: "host",
                })?,
            (Body::Gateway(gateway), Ram) => &gateway.ram,
            (Body::Cpu(cpu), CpuReservoir) => &cpu.reservoir,
            (Body::CpuCore(core), Compute) => &core.compute,
            (Body::Port(port), Bandwidth) => &port.bandwidth,
            (Body::Volume(volume), Store) => &volume.store,
            _ => {
                return Err(KernelError::WrongKind {
                    id: rref.owner,
                    expected: "resource owner",
                })
            }
        };
        Ok(resource)
    }

    pub(crate) fn resource_mut(&mut self, rref: ResourceRef) -> KernelResult<&mut Resource> {
        use strato_core::ResourceSlot::*;
        let entity = self.entity_mut(rref.owner)?;
        let resource = match (&mut entity.body, rref.slot) {
            (Body::Node(node), Ram) => &mut node.ram,
            (Body::Node(node), Rom) => &mut node.rom,
            (Body::Node(node), RamReservoir) => node
                .ram_reservoir_mut()
                .ok_or(KernelError::WrongKind {
                    id: rref.owner,
                    expected: "host",
                })?,
            (Body::Node(node), RomReservoir) => node
                .rom_reservoir_mut()
                .ok_or(KernelError::WrongKind {
                    id: rref.owner,
                    expected: "host",
                })?,
            (Body::Gateway(gateway), Ram) => &mut gateway.ram,
            (Body::Cpu(cpu), CpuReservoir) => &mut cpu.reservoir,
            (Body::CpuCore(core), Compute) => &mut core.compute,
            (Body::Port(port), Bandwidth) => &mut port.bandwidth,
            (Body::Volume(volume), Store) => &mut volume.store,
            _ => {
                return Err(KernelError::WrongKind {
                    id: rref.owner,
                    expected: "resource owner",
                })
            }
        };
        Ok(resource)
    }

    /// Claim `amount` from a resource on behalf of `holder`; the claim is
    /// released automatically when the holder terminates.
    pub(crate) fn claim(
        &mut self,
        holder: EntityId,
        rref: ResourceRef,
        amount: f64,
    ) -> KernelResult<()> {
        let now = self.clock.now();
        self.resource_mut(rref)?.get(now, amount)?;
        self.core_mut(holder)?.push_claim(rref, amount);
        Ok(())
    }

    /// Return an amount claimed earlier, before the holder terminates.
    pub(crate) fn return_claimed(
        &mut self,
        holder: EntityId,
        rref: ResourceRef,
        amount: f64,
    ) -> KernelResult<()> {
        let now = self.clock.now();
        self.resource_mut(rref)?.put(now, amount);
        self.core_mut(holder)?.release_claim(rref, amount);
        Ok(())
    }

    fn release_claims(&mut self, id: EntityId) {
        let now = self.clock.now();
        let claims = match self.core_mut(id) {
            Ok(core) => core.take_claims(),
            Err(_) => return,
        };
        for claim in claims {
            match self.resource_mut(claim.resource) {
                Ok(resource) => resource.put(now, claim.amount),
                Err(_) => debug!(holder = %id, "claim release on missing resource"),
            }
        }
    }

    // ------------------------------------------------------------------
    // Transition engine
    // ------------------------------------------------------------------

    /// Request a lifecycle transition at `at`. The request validates the
    /// current state, deduplicates against pending requests of the same
    /// kind and enqueues an instant event at transition priority.
    pub(crate) fn request_transition(
        &mut self,
        target: EntityId,
        transition: Transition,
        at: SimTime,
    ) {
        let core = match self.core(target) {
            Ok(core) => core,
            Err(_) => {
                warn!(%target, %transition, "transition requested on unknown entity");
                return;
            }
        };
        match core.check_request(transition) {
            RequestCheck::Proceed => {}
            RequestCheck::Redundant => return,
            RequestCheck::Reject(reason) => {
                warn!(entity = core.label(), %transition, reason, "transition ignored");
                return;
            }
        }
        if let Some(pending) = self
            .clock
            .queue()
            .pending_tagged(target, transition.tag())
        {
            if pending <= at {
                return;
            }
        }
        self.push_instant(
            at,
            TRANSITION_PRIORITY,
            target,
            Some(transition.tag()),
            Action::Transition { target, transition },
        );
    }

    /// Convenience wrappers used by drivers and tests.
    pub fn power_on(&mut self, node: EntityId, at_seconds: f64) -> KernelResult<()> {
        let at = self.instant(at_seconds)?;
        self.request_transition(node, Transition::PowerOn, at);
        Ok(())
    }

    pub fn power_off(&mut self, node: EntityId, at_seconds: f64) -> KernelResult<()> {
        let at = self.instant(at_seconds)?;
        self.request_transition(node, Transition::PowerOff, at);
        Ok(())
    }

    /// Inject a failure, e.g. to exercise recovery paths.
    pub fn fail_entity(&mut self, id: EntityId, at_seconds: f64) -> KernelResult<()> {
        let at = self.instant(at_seconds)?;
        self.request_transition(id, Transition::Fail, at);
        Ok(())
    }

    /// Request an explicit termination.
    pub fn terminate_entity(&mut self, id: EntityId, at_seconds: f64) -> KernelResult<()> {
        let at = self.instant(at_seconds)?;
        self.request_transition(id, Transition::Terminate, at);
        Ok(())
    }

    fn precursors_met(&self, id: EntityId) -> bool {
        let Ok(core) = self.core(id) else {
            return false;
        };
        core.precursors().iter().all(|&p| {
            self.core(p)
                .map(|precursor| precursor.terminated())
                .unwrap_or(true)
        })
    }

    /// Park a creation behind its unterminated precursors.
    fn park_waiting(&mut self, id: EntityId) {
        let precursors: Vec<EntityId> = match self.core(id) {
            Ok(core) => core.precursors().to_vec(),
            Err(_) => return,
        };
        for p in precursors {
            let terminated = self.core(p).map(|c| c.terminated()).unwrap_or(true);
            if !terminated {
                let waiters = self.waiting_on.entry(p).or_default();
                if !waiters.contains(&id) {
                    waiters.push(id);
                }
            }
        }
    }

    /// Re-fire parked creations whose last precursor just terminated.
    fn notify_dependents(&mut self, terminated: EntityId) {
        let Some(waiters) = self.waiting_on.remove(&terminated) else {
            return;
        };
        let now = self.clock.now();
        for dependent in waiters {
            if self.precursors_met(dependent) {
                self.request_transition(dependent, Transition::Create, now);
            }
        }
    }

    fn fire_transition(&mut self, target: EntityId, transition: Transition) -> KernelResult<()> {
        let Ok(core) = self.core(target) else {
            return Ok(());
        };
        if !core.should_fire(transition) {
            return Ok(());
        }
        let now = self.clock.now();
        match transition {
            Transition::Create => {
                if !self.precursors_met(target) {
                    self.park_waiting(target);
                    return Ok(());
                }
                self.hook_create(target)?;
                self.core_mut(target)?.apply(Transition::Create, now);
            }
            Transition::Initiate => {
                self.hook_initiate(target)?;
                self.core_mut(target)?.apply(Transition::Initiate, now);
            }
            Transition::Success => {
                self.hook_success(target)?;
                self.core_mut(target)?.apply(Transition::Success, now);
                self.request_transition(target, Transition::Terminate, now);
            }
            Transition::Fail => {
                self.hook_fail(target)?;
                self.core_mut(target)?.apply(Transition::Fail, now);
                if self.entity(target)?.body.is_software() {
                    self.request_transition(target, Transition::Destroy, now);
                }
            }
            Transition::Terminate => {
                self.perform_terminate(target)?;
            }
            Transition::Destroy => {
                if !self.core(target)?.terminated() {
                    self.perform_terminate(target)?;
                }
                self.hook_destroy(target)?;
                let now = self.clock.now();
                self.core_mut(target)?.apply(Transition::Destroy, now);
            }
            Transition::PowerOn => {
                self.hook_power_on(target)?;
                self.core_mut(target)?.apply(Transition::PowerOn, now);
            }
            Transition::PowerOff => {
                self.hook_power_off(target)?;
                self.core_mut(target)?.apply(Transition::PowerOff, now);
            }
        }
        Ok(())
    }

    fn perform_terminate(&mut self, target: EntityId) -> KernelResult<()> {
        self.hook_terminate(target)?;
        let now = self.clock.now();
        self.core_mut(target)?.apply(Transition::Terminate, now);
        self.release_claims(target);
        self.clock.queue_mut().cancel_owner(target);
        self.notify_dependents(target);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Kind-specific hooks
    // ------------------------------------------------------------------

    fn hook_create(&mut self, id: EntityId) -> KernelResult<()> {
        match &self.entity(id)?.body {
            Body::Node(_) => self.node_on_create(id),
            Body::Gateway(_) => self.gateway_on_create(id),
            Body::Container(_) => self.container_on_create(id),
            Body::Process(_) => self.process_on_create(id),
            Body::Packet(_) => self.packet_on_create(id),
            Body::Microservice(_) => self.microservice_on_create(id),
            _ => Ok(()),
        }
    }

    fn hook_initiate(&mut self, id: EntityId) -> KernelResult<()> {
        match &self.entity(id)?.body {
            Body::Container(_) => self.container_on_initiate(id),
            Body::Process(_) => self.process_on_initiate(id),
            Body::Packet(_) => self.packet_on_initiate(id),
            Body::ApiCall(_) => self.api_call_on_initiate(id),
            _ => Ok(()),
        }
    }

    fn hook_success(&mut self, id: EntityId) -> KernelResult<()> {
        match &self.entity(id)?.body {
            Body::Process(_) => self.process_on_success(id),
            Body::Packet(_) => {
                info!(packet = self.label_of(id), t = self.now_seconds(), "packet delivered");
                Ok(())
            }
            Body::ApiCall(_) => {
                info!(call = self.label_of(id), t = self.now_seconds(), "api call succeeded");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn hook_fail(&mut self, id: EntityId) -> KernelResult<()> {
        match &self.entity(id)?.body {
            Body::Node(_) => self.node_on_fail(id),
            Body::Cpu(_) | Body::CpuCore(_) | Body::Nic(_) => {
                let now = self.clock.now();
                self.request_transition(id, Transition::PowerOff, now);
                Ok(())
            }
            Body::Process(_) => self.process_on_fail(id),
            Body::Container(_) => {
                info!(container = self.label_of(id), t = self.now_seconds(), "container failed");
                Ok(())
            }
            Body::Packet(_) => {
                info!(packet = self.label_of(id), t = self.now_seconds(), "packet dropped");
                Ok(())
            }
            Body::ApiCall(_) => {
                info!(call = self.label_of(id), t = self.now_seconds(), "api call failed");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn hook_terminate(&mut self, id: EntityId) -> KernelResult<()> {
        match &self.entity(id)?.body {
            Body::Node(_) => self.node_on_terminate(id),
            Body::Cpu(_) => self.cpu_on_terminate(id),
            Body::Nic(_) => self.nic_on_terminate(id),
            Body::Container(_) => self.container_on_terminate(id),
            Body::Process(_) => self.process_on_terminate(id),
            Body::Packet(_) => self.packet_on_terminate(id),
            Body::ApiCall(_) => self.api_call_on_terminate(id),
            Body::Microservice(_) => self.microservice_on_terminate(id),
            _ => Ok(()),
        }
    }

    fn hook_destroy(&mut self, id: EntityId) -> KernelResult<()> {
        match &self.entity(id)?.body {
            Body::Container(_) => self.container_on_destroy(id),
            Body::ApiCall(_) => self.api_call_on_terminate(id),
            _ => Ok(()),
        }
    }

    fn hook_power_on(&mut self, id: EntityId) -> KernelResult<()> {
        match &self.entity(id)?.body {
            Body::Node(_) => self.node_on_power_on(id),
            Body::Cpu(_) => self.cpu_on_power_on(id),
            Body::CpuCore(_) => self.core_on_power_on(id),
            Body::Nic(_) => self.nic_on_power_on(id),
            _ => Ok(()),
        }
    }

    fn hook_power_off(&mut self, id: EntityId) -> KernelResult<()> {
        match &self.entity(id)?.body {
            Body::Node(_) => self.node_on_power_off(id),
            Body::Cpu(_) => self.cpu_on_power_off(id),
            Body::CpuCore(_) => self.core_on_power_off(id),
            Body::Nic(_) => self.nic_on_power_off(id),
            _ => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // The loop
    // ------------------------------------------------------------------

    /// Advance virtual time to `until` seconds, dispatching every due
    /// event. The queue survives the horizon, so a later call resumes the
    /// run.
    pub fn simulate(&mut self, until_seconds: f64) -> KernelResult<()> {
        let horizon = self.clock.base().time_from_seconds(until_seconds)?;
        info!(until = until_seconds, "simulation started");
        while let Some((_token, event)) = self.clock.next_within(horizon) {
            // Re-arm continuous events first so a handler cancelling a loop
            // by tag also hits the next occurrence.
            self.clock.requeue_continuous(&event);
            self.dispatch(&event)?;
        }
        info!(t = self.now_seconds(), "simulation reached horizon");
        Ok(())
    }

    fn dispatch(&mut self, event: &Event<Action>) -> KernelResult<()> {
        match event.action {
            Action::Transition { target, transition } => self.fire_transition(target, transition),
            Action::CpuDispatch { cpu } => self.cpu_dispatch(cpu),
            Action::CoreCycle { core } => self.core_cycle(core),
            Action::NicScan { nic } => self.nic_scan(nic),
            Action::PacketDelivered {
                packet,
                egress,
                ingress,
            } => self.packet_delivered(packet, egress, ingress),
            Action::ProcessWatch { process } => self.process_watch(process),
            Action::ApiCallWatch { call } => self.api_call_watch(call),
            Action::MicroserviceEvaluate { microservice } => {
                self.microservice_evaluate(microservice)
            }
            Action::ScaleOut {
                microservice,
                count,
            } => self.microservice_scale_out(microservice, count),
            Action::ScaleIn {
                microservice,
                count,
            } => self.microservice_scale_in(microservice, count),
            Action::ContainerSchedulerTick => self.container_scheduler_tick(),
            Action::VolumeSchedulerTick => self.volume_scheduler_tick(),
            Action::ApiCallInitTick => self.api_call_init_tick(),
            Action::MonitorSample { monitor } => self.monitor_sample(monitor),
        }
    }

    /// Cancel a continuous loop identified by its owner-scoped tag.
    pub(crate) fn cancel_loop(&mut self, owner: EntityId, tag: u32) {
        self.clock.queue_mut().cancel_tagged(owner, tag);
    }

    /// Start a per-entity watch loop at every tick.
    pub(crate) fn start_watch(&mut self, owner: EntityId, tag: u32, action: Action) {
        let now = self.clock.now();
        self.push_continuous(now, SimTime::TICK, 0, owner, Some(tag), action);
    }
}
