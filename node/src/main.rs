// Copyright (C) 2024-2025 The Strato Project.
//
// main.rs file belongs to the strato project and is free
// software distributed under the MIT software license, see the
// accompanying file LICENSE in the main directory of the
// repository or http://www.opensource.org/licenses/mit-license.php
// for more details.
//
// Redistribution and use in source and binary forms with or without
// modifications are permitted.

//! Reference scenario driver: a core switch with a gateway and five hosts,
//! two daemon microservices, a user-originated api call chained into a
//! service-to-service call, and a failure injection halfway through.
//!
//! Exits 0 when the horizon is reached; a configuration error (for
//! example an illegal host-to-host link) exits non-zero.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use strato_core::SimConfig;
use strato_kernel::{
    ApiCallSpec, ContainerSpec, DispatchMode, Endpoint, HardwareSpec, MicroserviceSpec,
    MonitorScope, MonitorSpec, Simulation,
};
use strato_network::SubnetPool;
use strato_telemetry::{FrameRecorder, LogRecorder};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "strato-node", about = "Discrete-event cloud simulator, reference scenario")]
struct Cli {
    /// Virtual horizon to simulate to, in seconds.
    #[arg(long, default_value_t = 1.5)]
    horizon: f64,

    /// Decimal places of the virtual clock (min time unit = 10^-resolution s).
    #[arg(long, default_value_t = 4)]
    resolution: u32,

    /// Seed of the deterministic random source.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Verbose per-event logging.
    #[arg(long)]
    debug: bool,

    /// Write the telemetry frame as JSON to this path.
    #[arg(long, value_name = "PATH")]
    telemetry: Option<PathBuf>,

    /// Sample period of the monitors, in seconds.
    #[arg(long, default_value_t = 0.01)]
    sample_period: f64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let config = SimConfig {
        resolution: cli.resolution,
        debug: cli.debug,
        seed: cli.seed,
    };
    let mut sim = Simulation::new(config).context("building the simulation context")?;

    let frames = Arc::new(FrameRecorder::new());
    sim.add_recorder(frames.clone());
    sim.add_recorder(Arc::new(LogRecorder));
    sim.add_monitor(MonitorSpec::all(
        "Container Monitor",
        MonitorScope::Containers,
        cli.sample_period,
    ))?;
    sim.add_monitor(MonitorSpec::all(
        "Host Monitor",
        MonitorScope::Hosts,
        cli.sample_period,
    ))?;
    sim.add_monitor(MonitorSpec::all(
        "Microservice Monitor",
        MonitorScope::Microservices,
        cli.sample_period,
    ))?;

    // Topology: one core switch, a gateway with one user, five hosts.
    let subnet: SubnetPool = "192.168.0.0/24".parse().context("parsing the subnet")?;
    let core_switch = sim.add_switch(
        HardwareSpec {
            label: "Core".into(),
            ipc: 1,
            frequency: 5000,
            num_cores: 4,
            cpu_tdp: 150.0,
            cpu_mode: DispatchMode::RoundRobin,
            ram_gib: 8.0,
            rom_gib: 16.0,
            ..Default::default()
        },
        subnet,
    )?;
    sim.power_on(core_switch, 0.0)?;

    let gateway = sim.add_gateway("Gateway")?;
    let user = sim.add_user(gateway, "User")?;
    sim.add_link(core_switch, gateway, 1)?;

    let mut hosts = Vec::new();
    for i in 0..5 {
        let host = sim.add_host(HardwareSpec {
            label: format!("host-{i}"),
            ipc: 1,
            frequency: 5000,
            num_cores: 4,
            cpu_tdp: 150.0,
            cpu_mode: DispatchMode::Packed,
            ram_gib: 4.0,
            rom_gib: 16.0,
            ..Default::default()
        })?;
        sim.power_on(host, 0.0)?;
        sim.add_link(host, core_switch, 1)?;
        hosts.push(host);
    }

    let template = ContainerSpec {
        cpu_milli: 100,
        cpu_limit_milli: Some(500),
        ram_mib: 500,
        ram_limit_mib: Some(1000),
        image_mib: 100,
        daemon: true,
        ..Default::default()
    };
    let ms_1 = sim.add_microservice(MicroserviceSpec {
        label: "frontend".into(),
        container: template.clone(),
        min_instances: 2,
        max_instances: 4,
        ..Default::default()
    })?;
    let ms_2 = sim.add_microservice(MicroserviceSpec {
        label: "backend".into(),
        container: template,
        min_instances: 3,
        max_instances: 4,
        ..Default::default()
    })?;

    let ingest = sim.add_api_call(ApiCallSpec {
        label: "ingest".into(),
        src: Endpoint::User(user),
        dst: Endpoint::Microservice(ms_2),
        priority: 1,
        src_process_length: 10,
        dst_process_length: 10,
        ack_process_length: 10,
        num_src_packets: 10,
        src_packet_size: 100,
        num_ret_packets: 10,
        ret_packet_size: 100,
        num_ack_packets: 10,
        ack_packet_size: 100,
        create_at: 0.11,
        terminate_at: None,
        precursors: Vec::new(),
    })?;
    sim.add_api_call(ApiCallSpec {
        label: "fanout".into(),
        src: Endpoint::Microservice(ms_2),
        dst: Endpoint::Microservice(ms_1),
        priority: 1,
        src_process_length: 10,
        dst_process_length: 10,
        ack_process_length: 10,
        num_src_packets: 10,
        src_packet_size: 100,
        num_ret_packets: 10,
        ret_packet_size: 100,
        num_ack_packets: 10,
        ack_packet_size: 100,
        create_at: 0.11,
        terminate_at: None,
        precursors: vec![ingest],
    })?;

    // Run to the injection point, kill one frontend instance, run on. The
    // evaluator recreates the lost instance.
    let injection_at = 0.12_f64.min(cli.horizon);
    sim.simulate(injection_at)?;
    if let Some(&victim) = sim.microservice_containers(ms_1)?.first() {
        info!(t = injection_at, "injecting a container failure");
        sim.fail_entity(victim, injection_at)?;
    }
    sim.simulate(cli.horizon)?;

    let frame = frames.snapshot();
    info!(
        container_rows = frame.containers.len(),
        host_rows = frame.hosts.len(),
        microservice_rows = frame.microservices.len(),
        "telemetry collected"
    );
    if let Some(path) = cli.telemetry {
        let json = frame.to_json().context("serializing telemetry")?;
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "telemetry written");
    }
    Ok(())
}
