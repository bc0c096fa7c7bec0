//! The entity arena: every simulated thing is an [`Entity`] holding the
//! shared lifecycle core plus a kind-specific body. Bodies reference each
//! other by [`strato_core::EntityId`] only; the arena in the simulation
//! context is the single owner.

use crate::hardware::cpu::{CoreBody, CpuBody};
use crate::hardware::nic::{NicBody, PortBody};
use crate::hardware::node::{GatewayBody, NodeBody};
use crate::monitor::MonitorBody;
use crate::sched::ServiceBody;
use crate::software::apicall::ApiCallBody;
use crate::software::container::{ContainerBody, VolumeBody};
use crate::software::microservice::MicroserviceBody;
use crate::software::packet::PacketBody;
use crate::software::process::{InstructionBody, ProcessBody};
use crate::software::user::UserBody;
use strato_core::EntityCore;

/// One simulated entity.
#[derive(Debug)]
pub(crate) struct Entity {
    pub core: EntityCore,
    pub body: Body,
}

/// Kind-specific state of an entity.
#[derive(Debug)]
pub(crate) enum Body {
    Node(NodeBody),
    Gateway(GatewayBody),
    Cpu(CpuBody),
    CpuCore(CoreBody),
    Nic(NicBody),
    Port(PortBody),
    Process(ProcessBody),
    Instruction(InstructionBody),
    Container(ContainerBody),
    Volume(VolumeBody),
    Packet(PacketBody),
    Microservice(MicroserviceBody),
    ApiCall(ApiCallBody),
    User(UserBody),
    Service(ServiceBody),
    Monitor(MonitorBody),
}

impl Body {
    /// Kind name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Body::Node(_) => "node",
            Body::Gateway(_) => "gateway",
            Body::Cpu(_) => "cpu",
            Body::CpuCore(_) => "cpu core",
            Body::Nic(_) => "nic",
            Body::Port(_) => "port",
            Body::Process(_) => "process",
            Body::Instruction(_) => "instruction",
            Body::Container(_) => "container",
            Body::Volume(_) => "volume",
            Body::Packet(_) => "packet",
            Body::Microservice(_) => "microservice",
            Body::ApiCall(_) => "api call",
            Body::User(_) => "user",
            Body::Service(_) => "service",
            Body::Monitor(_) => "monitor",
        }
    }

    /// Software entities cascade from FAIL into DESTROY; hardware stops at
    /// powering off.
    pub fn is_software(&self) -> bool {
        matches!(
            self,
            Body::Process(_)
                | Body::Instruction(_)
                | Body::Container(_)
                | Body::Volume(_)
                | Body::Packet(_)
                | Body::Microservice(_)
                | Body::ApiCall(_)
        )
    }
}
