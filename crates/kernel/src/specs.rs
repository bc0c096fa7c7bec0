//! Constructor parameter structs and model enums.
//!
//! Sizes are given in MiB/GiB at this boundary and carried in bytes inside
//! the kernel; CPU reservations are milli-CPU (1000 = one core); times are
//! seconds at the configured resolution.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strato_core::EntityId;

/// Instruction set architecture of a hardware node. Payload sizes of
/// virtual instructions depend on it: 1 to 16 random bytes on x86, exactly
/// 4 on arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    #[default]
    X86,
    Arm,
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::X86 => write!(f, "x86"),
            Architecture::Arm => write!(f, "arm"),
        }
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "x86" | "x86_64" => Ok(Architecture::X86),
            "arm" | "aarch64" => Ok(Architecture::Arm),
            _ => Err(format!("Unknown architecture: {s}")),
        }
    }
}

/// Instruction placement strategy of a CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// One instruction to the most-free core, then move to the next core.
    #[default]
    RoundRobin,
    /// Fill the most-free core before moving on.
    Packed,
}

impl TryFrom<u8> for DispatchMode {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(DispatchMode::RoundRobin),
            2 => Ok(DispatchMode::Packed),
            _ => Err(format!("Unknown CPU mode: {value}")),
        }
    }
}

/// Instance selection strategy of a microservice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancer {
    /// Uniformly random initiated instance.
    Random,
    /// The initiated instance with the highest current usage.
    #[default]
    BestFit,
    /// The initiated instance with the lowest current usage.
    WorstFit,
}

impl fmt::Display for LoadBalancer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadBalancer::Random => write!(f, "random"),
            LoadBalancer::BestFit => write!(f, "best_fit"),
            LoadBalancer::WorstFit => write!(f, "worst_fit"),
        }
    }
}

impl FromStr for LoadBalancer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "random" => Ok(LoadBalancer::Random),
            "best_fit" | "bestfit" => Ok(LoadBalancer::BestFit),
            "worst_fit" | "worstfit" => Ok(LoadBalancer::WorstFit),
            _ => Err(format!("Unknown load balancer: {s}")),
        }
    }
}

/// Host selection strategy of the placement schedulers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlacementPolicy {
    /// First powered-on host with sufficient reservoirs.
    #[default]
    Default,
    /// Hosts ordered by ascending remaining cpu, then ram, then rom.
    BestFit,
    /// Hosts ordered by descending remaining cpu, then ram, then rom.
    WorstFit,
}

impl FromStr for PlacementPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" | "first_fit" => Ok(PlacementPolicy::Default),
            "best_fit" | "bestfit" => Ok(PlacementPolicy::BestFit),
            "worst_fit" | "worstfit" => Ok(PlacementPolicy::WorstFit),
            _ => Err(format!("Unknown placement policy: {s}")),
        }
    }
}

/// An api-call endpoint: a user behind a gateway or a load-balanced
/// microservice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    User(EntityId),
    Microservice(EntityId),
}

impl Endpoint {
    /// True for user endpoints; users do not compute.
    pub fn is_user(&self) -> bool {
        matches!(self, Endpoint::User(_))
    }

    /// The underlying entity id.
    pub fn id(&self) -> EntityId {
        match *self {
            Endpoint::User(id) | Endpoint::Microservice(id) => id,
        }
    }
}

/// Parameters of a host, switch or router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareSpec {
    pub label: String,
    /// Instructions per cycle of every core.
    pub ipc: u64,
    /// Core frequency (cycles per virtual second).
    pub frequency: u64,
    pub num_cores: u32,
    /// Thermal design power in watts; carried for telemetry, not consumed.
    pub cpu_tdp: f64,
    pub cpu_mode: DispatchMode,
    /// RAM capacity in GiB; fractional values are allowed.
    pub ram_gib: f64,
    /// ROM capacity in GiB; fractional values are allowed.
    pub rom_gib: f64,
    pub architecture: Architecture,
    /// Creation instant in seconds.
    pub create_at: f64,
    /// Optional termination instant in seconds.
    pub terminate_at: Option<f64>,
}

impl Default for HardwareSpec {
    fn default() -> Self {
        HardwareSpec {
            label: String::new(),
            ipc: 1,
            frequency: 1000,
            num_cores: 2,
            cpu_tdp: 95.0,
            cpu_mode: DispatchMode::RoundRobin,
            ram_gib: 4.0,
            rom_gib: 32.0,
            architecture: Architecture::X86,
            create_at: 0.0,
            terminate_at: None,
        }
    }
}

/// A volume declared on a container: `(size MiB, mount path, label)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub size_mib: u64,
    pub path: String,
    pub label: String,
}

/// Parameters of a container (also the instance template of a
/// microservice).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub label: String,
    /// Requested CPU share in milli-CPU.
    pub cpu_milli: u64,
    /// Requested RAM in MiB.
    pub ram_mib: u64,
    /// Image size in MiB, reserved against the host ROM.
    pub image_mib: u64,
    /// CPU usage ceiling in milli-CPU; `None` means unlimited.
    pub cpu_limit_milli: Option<u64>,
    /// RAM usage ceiling in MiB; `None` means unlimited.
    pub ram_limit_mib: Option<u64>,
    pub volumes: Vec<VolumeSpec>,
    pub priority: i64,
    /// A daemon container runs a background process sized to its CPU
    /// request for as long as it lives.
    pub daemon: bool,
    pub create_at: f64,
    pub terminate_at: Option<f64>,
    /// Entities whose termination gates this container's creation.
    pub precursors: Vec<EntityId>,
}

impl Default for ContainerSpec {
    fn default() -> Self {
        ContainerSpec {
            label: String::new(),
            cpu_milli: 100,
            ram_mib: 256,
            image_mib: 64,
            cpu_limit_milli: None,
            ram_limit_mib: None,
            volumes: Vec::new(),
            priority: 0,
            daemon: false,
            create_at: 0.0,
            terminate_at: None,
            precursors: Vec::new(),
        }
    }
}

/// Horizontal scaling thresholds of the default policy: scale up when CPU
/// or RAM utilization reaches the upper bound, scale down when both sit
/// below the lower bound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalingThresholds {
    pub cpu_upper: f64,
    pub cpu_lower: f64,
    pub ram_upper: f64,
    pub ram_lower: f64,
}

impl Default for ScalingThresholds {
    fn default() -> Self {
        ScalingThresholds {
            cpu_upper: 0.8,
            cpu_lower: 0.2,
            ram_upper: 0.8,
            ram_lower: 0.2,
        }
    }
}

/// Parameters of an auto-scaling microservice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MicroserviceSpec {
    pub label: String,
    /// Instance template; its timing fields and precursors are ignored.
    pub container: ContainerSpec,
    pub min_instances: u32,
    pub max_instances: u32,
    pub load_balancer: LoadBalancer,
    pub thresholds: ScalingThresholds,
    /// Seconds between scaling evaluations; zero means every tick.
    pub evaluation_interval: f64,
    pub create_at: f64,
    pub terminate_at: Option<f64>,
    pub precursors: Vec<EntityId>,
}

impl Default for MicroserviceSpec {
    fn default() -> Self {
        MicroserviceSpec {
            label: String::new(),
            container: ContainerSpec::default(),
            min_instances: 1,
            max_instances: 3,
            load_balancer: LoadBalancer::BestFit,
            thresholds: ScalingThresholds::default(),
            evaluation_interval: 0.0,
            create_at: 0.0,
            terminate_at: None,
            precursors: Vec::new(),
        }
    }
}

/// Parameters of an api call between two endpoints. Packet sizes are in
/// bytes, process lengths in virtual instructions.
#[derive(Debug, Clone)]
pub struct ApiCallSpec {
    pub label: String,
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
    pub create_at: f64,
    pub terminate_at: Option<f64>,
    pub precursors: Vec<EntityId>,
}

/// What a monitor samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorScope {
    Containers,
    Hosts,
    Microservices,
}

/// Parameters of a periodic read-only monitor.
#[derive(Debug, Clone)]
pub struct MonitorSpec {
    pub label: String,
    pub scope: MonitorScope,
    /// Explicit target entities; `None` samples every entity in scope.
    pub targets: Option<Vec<EntityId>>,
    /// Sample period in seconds.
    pub sample_period: f64,
}

impl MonitorSpec {
    /// Monitor over every entity of the given scope.
    pub fn all(label: impl Into<String>, scope: MonitorScope, sample_period: f64) -> Self {
        MonitorSpec {
            label: label.into(),
            scope,
            targets: None,
            sample_period,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_architecture_parse() {
        assert_eq!("x86".parse::<Architecture>().unwrap(), Architecture::X86);
        assert_eq!("ARM".parse::<Architecture>().unwrap(), Architecture::Arm);
        assert!("sparc".parse::<Architecture>().is_err());
    }

    #[test]
    fn test_dispatch_mode_from_int() {
        assert_eq!(DispatchMode::try_from(1).unwrap(), DispatchMode::RoundRobin);
        assert_eq!(DispatchMode::try_from(2).unwrap(), DispatchMode::Packed);
        assert!(DispatchMode::try_from(3).is_err());
    }

    #[test]
    fn test_load_balancer_parse() {
        assert_eq!(
            "worst_fit".parse::<LoadBalancer>().unwrap(),
            LoadBalancer::WorstFit
        );
        assert_eq!(LoadBalancer::BestFit.to_string(), "best_fit");
    }
}
