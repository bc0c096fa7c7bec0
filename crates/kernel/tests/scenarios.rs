//! End-to-end scenarios: placement, daemon load, api calls across the
//! gateway, auto-scaling, packet drops and limit breaches.

use std::sync::Arc;
use strato_core::{EntityId, SimConfig, StateSet};
use strato_kernel::{
    ApiCallSpec, ContainerSpec, DispatchMode, Endpoint, HardwareSpec, MicroserviceSpec,
    MonitorScope, MonitorSpec, ScalingThresholds, Simulation,
};
use strato_network::SubnetPool;
use strato_telemetry::{Frame, FrameRecorder};

fn sim(seed: u64) -> Simulation {
    Simulation::new(SimConfig {
        resolution: 4,
        debug: false,
        seed,
    })
    .expect("context")
}

fn host_spec(label: &str, frequency: u64, ram_gib: f64) -> HardwareSpec {
    HardwareSpec {
        label: label.into(),
        ipc: 1,
        frequency,
        num_cores: 4,
        cpu_tdp: 150.0,
        cpu_mode: DispatchMode::RoundRobin,
        ram_gib,
        rom_gib: 16.0,
        ..Default::default()
    }
}

fn daemon_template(cpu_milli: u64, cpu_limit: u64) -> ContainerSpec {
    ContainerSpec {
        cpu_milli,
        cpu_limit_milli: Some(cpu_limit),
        ram_mib: 500,
        ram_limit_mib: Some(1000),
        image_mib: 100,
        daemon: true,
        ..Default::default()
    }
}

fn subnet() -> SubnetPool {
    "192.168.0.0/24".parse().expect("subnet")
}

/// Reservoir conservation: free reservoir plus the requests of live
/// scheduled residents equals capacity, per host and dimension.
fn assert_reservoirs_conserved(sim: &Simulation) {
    for &host in sim.hosts() {
        let snapshot = sim.host_snapshot(host).expect("host snapshot");
        let mut cpu = 0.0;
        let mut ram = 0.0;
        let mut rom = 0.0;
        for &container in &snapshot.containers {
            let states = sim.entity_states(container).expect("states");
            if !states.contains(StateSet::SCHEDULED) || states.contains(StateSet::TERMINATED) {
                continue;
            }
            let c = sim.container_snapshot(container).expect("container snapshot");
            cpu += c.cpu_request as f64;
            ram += c.ram_request as f64;
            rom += c.image_size as f64;
        }
        assert!(
            (snapshot.cpu_reservoir_free + cpu - snapshot.cpu_reservoir_capacity).abs() < 1e-6,
            "cpu reservoir out of balance on {}",
            snapshot.label
        );
        assert!(
            (snapshot.ram_reservoir_free + ram - snapshot.ram_reservoir_capacity).abs() < 1e-6,
            "ram reservoir out of balance on {}",
            snapshot.label
        );
        assert!(
            (snapshot.rom_reservoir_free + rom - snapshot.rom_reservoir_capacity).abs() < 1e-6,
            "rom reservoir out of balance on {}",
            snapshot.label
        );
    }
}

#[test]
fn single_host_daemon_settles_at_reservation_share() {
    let mut sim = sim(7);
    let frames = Arc::new(FrameRecorder::new());
    sim.add_recorder(frames.clone());
    sim.add_monitor(MonitorSpec::all(
        "containers",
        MonitorScope::Containers,
        0.01,
    ))
    .unwrap();

    let host = sim.add_host(host_spec("host-0", 5000, 8.0)).unwrap();
    sim.power_on(host, 0.0).unwrap();
    let ms = sim
        .add_microservice(MicroserviceSpec {
            label: "svc".into(),
            container: daemon_template(100, 500),
            min_instances: 1,
            max_instances: 1,
            ..Default::default()
        })
        .unwrap();

    // Placement happens within the first ticks.
    sim.simulate(0.0002).unwrap();
    let container = sim.microservice_containers(ms).unwrap()[0];
    let states = sim.entity_states(container).unwrap();
    assert!(states.contains(StateSet::SCHEDULED));
    assert!(states.contains(StateSet::INITIATED));

    sim.simulate(1.0).unwrap();

    let snapshot = sim.container_snapshot(container).unwrap();
    assert!(!snapshot.states.contains(StateSet::FAIL));
    // Steady-state usage equals the reservation: 100 milli-CPU, which is
    // 20% of the 500 milli-CPU limit.
    assert!(
        (snapshot.cpu_usage - 100.0).abs() < 1e-3,
        "usage was {}",
        snapshot.cpu_usage
    );
    let frame: Frame = frames.snapshot();
    assert!(!frame.containers.is_empty());
    for row in frame.containers.iter().filter(|row| row.t >= 0.02) {
        assert!((row.cpu_pct - 20.0).abs() < 1e-3, "pct was {}", row.cpu_pct);
    }

    // Core balance: queued unit debts plus free power equals capacity.
    let host_view = sim.host_snapshot(host).unwrap();
    for core in &host_view.cores {
        assert!(
            (core.free_power + core.queue_len as f64 - core.capacity).abs() < 1e-6,
            "core out of balance"
        );
    }
    assert_reservoirs_conserved(&sim);
}

#[test]
fn host_to_host_link_is_rejected_at_call_time() {
    let mut sim = sim(1);
    let h1 = sim.add_host(host_spec("h1", 1000, 2.0)).unwrap();
    let h2 = sim.add_host(host_spec("h2", 1000, 2.0)).unwrap();
    let err = sim.add_link(h1, h2, 1);
    assert!(err.is_err());
    assert!(!sim.topology().has_link(h1, h2));
    // Only the loopback port exists on either side.
    assert_eq!(sim.port_snapshots(h1).unwrap().len(), 1);
    assert_eq!(sim.port_snapshots(h2).unwrap().len(), 1);
}

fn gateway_scenario(seed: u64) -> (Simulation, EntityId, Arc<FrameRecorder>) {
    let mut sim = sim(seed);
    let frames = Arc::new(FrameRecorder::new());
    sim.add_recorder(frames.clone());
    sim.add_monitor(MonitorSpec::all(
        "containers",
        MonitorScope::Containers,
        0.01,
    ))
    .unwrap();
    sim.add_monitor(MonitorSpec::all(
        "microservices",
        MonitorScope::Microservices,
        0.01,
    ))
    .unwrap();

    let core = sim.add_switch(host_spec("core", 5000, 8.0), subnet()).unwrap();
    sim.power_on(core, 0.0).unwrap();
    let gateway = sim.add_gateway("gw").unwrap();
    let user = sim.add_user(gateway, "user").unwrap();
    sim.add_link(core, gateway, 1).unwrap();
    for i in 0..5 {
        let host = sim
            .add_host(host_spec(&format!("host-{i}"), 5000, 4.0))
            .unwrap();
        sim.power_on(host, 0.0).unwrap();
        sim.add_link(host, core, 1).unwrap();
    }
    let ms = sim
        .add_microservice(MicroserviceSpec {
            label: "backend".into(),
            container: daemon_template(100, 500),
            min_instances: 3,
            max_instances: 4,
            ..Default::default()
        })
        .unwrap();
    let call = sim
        .add_api_call(ApiCallSpec {
            label: "call".into(),
            src: Endpoint::User(user),
            dst: Endpoint::Microservice(ms),
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
        })
        .unwrap();
    sim.simulate(1.2).unwrap();
    (sim, call, frames)
}

#[test]
fn api_call_across_gateway_succeeds() {
    let (sim, call, _frames) = gateway_scenario(42);
    let view = sim.api_call_snapshot(call).unwrap();
    assert!(
        view.states.contains(StateSet::SUCCESS),
        "call states were {:?}",
        view.states
    );
    assert_eq!(view.packets.len(), 30, "src + ret + ack packets");
    // A user source skips the src and ack processes.
    assert_eq!(view.processes.len(), 1);

    // All packets run between the gateway and the one chosen instance
    // host; forward legs start at the gateway, the return leg ends there.
    let first = sim.packet_snapshot(view.packets[0]).unwrap();
    let gateway_host = first.src_host;
    let instance_host = first.dst_host;
    assert_ne!(gateway_host, instance_host);
    let mut ret_termination = Vec::new();
    for &packet in &view.packets {
        let snapshot = sim.packet_snapshot(packet).unwrap();
        assert!(
            snapshot.states.contains(StateSet::SUCCESS),
            "packet {} did not arrive",
            snapshot.label
        );
        if snapshot.label.contains("-RET-") {
            assert_eq!(snapshot.path.first(), Some(&instance_host));
            assert_eq!(snapshot.path.last(), Some(&gateway_host));
            ret_termination.push(sim.entity_terminated_at(packet).unwrap());
        } else {
            assert_eq!(snapshot.path.first(), Some(&gateway_host));
            assert_eq!(snapshot.path.last(), Some(&instance_host));
        }
        // Path validity: the hops actually visited are exactly the route,
        // and success only happens at the destination host.
        assert_eq!(snapshot.visited, snapshot.path, "{}", snapshot.label);
        assert_eq!(snapshot.current_hop, Some(snapshot.dst_host), "{}", snapshot.label);
    }

    // Causality: the destination process waits for every src packet, and
    // the ack packets wait for every ret packet.
    let dst_process = view.processes[0];
    let dst_created = sim.entity_created_at(dst_process).unwrap();
    for &packet in &view.packets {
        let label = sim.packet_snapshot(packet).unwrap().label;
        if label.contains("-SRC-") {
            assert!(dst_created >= sim.entity_terminated_at(packet).unwrap());
        }
        if label.contains("-ACK-") {
            let created = sim.entity_created_at(packet).unwrap();
            for &ret_done in &ret_termination {
                assert!(created >= ret_done, "{label} raced a ret packet");
            }
        }
    }
    assert_reservoirs_conserved(&sim);
}

#[test]
fn identical_seeds_reproduce_the_run() {
    let (sim_a, call_a, frames_a) = gateway_scenario(9);
    let (sim_b, call_b, frames_b) = gateway_scenario(9);
    assert_eq!(frames_a.snapshot(), frames_b.snapshot());
    assert_eq!(
        sim_a.api_call_snapshot(call_a).unwrap().states,
        sim_b.api_call_snapshot(call_b).unwrap().states
    );
    let packets_a = sim_a.api_call_snapshot(call_a).unwrap().packets;
    let packets_b = sim_b.api_call_snapshot(call_b).unwrap().packets;
    for (&a, &b) in packets_a.iter().zip(packets_b.iter()) {
        assert_eq!(
            sim_a.packet_snapshot(a).unwrap().path,
            sim_b.packet_snapshot(b).unwrap().path
        );
        assert_eq!(
            sim_a.entity_terminated_at(a),
            sim_b.entity_terminated_at(b)
        );
    }
}

#[test]
fn sustained_load_scales_to_the_maximum() {
    let mut sim = sim(3);
    let host = sim.add_host(host_spec("host-0", 5000, 8.0)).unwrap();
    sim.power_on(host, 0.0).unwrap();
    let ms = sim
        .add_microservice(MicroserviceSpec {
            label: "hot".into(),
            container: ContainerSpec {
                cpu_milli: 450,
                cpu_limit_milli: Some(500),
                ram_mib: 100,
                image_mib: 50,
                daemon: true,
                ..Default::default()
            },
            min_instances: 1,
            max_instances: 3,
            thresholds: ScalingThresholds {
                cpu_upper: 0.8,
                cpu_lower: 0.05,
                ram_upper: 0.8,
                ram_lower: 0.05,
            },
            ..Default::default()
        })
        .unwrap();
    sim.simulate(0.05).unwrap();

    let instances = sim.microservice_containers(ms).unwrap();
    assert_eq!(instances.len(), 3, "should reach the maximum");
    // The maximum was never overshot: no instance beyond the three was
    // ever registered.
    assert_eq!(sim.containers().len(), 3);
    for &container in &instances {
        let states = sim.entity_states(container).unwrap();
        assert!(states.contains(StateSet::INITIATED));
        assert!(!states.contains(StateSet::FAIL));
    }
    assert_reservoirs_conserved(&sim);
}

#[test]
fn oversized_packet_is_dropped_on_ram_exhaustion() {
    let mut sim = sim(5);
    // The switch in the middle has 1 MiB of RAM; the packet is 2 MiB.
    let mut switch_spec = host_spec("tiny-switch", 5000, 1.0 / 1024.0);
    switch_spec.rom_gib = 1.0;
    let switch = sim.add_switch(switch_spec, subnet()).unwrap();
    sim.power_on(switch, 0.0).unwrap();
    let gateway = sim.add_gateway("gw").unwrap();
    let user = sim.add_user(gateway, "user").unwrap();
    sim.add_link(switch, gateway, 100).unwrap();
    let host = sim.add_host(host_spec("host-0", 5000, 4.0)).unwrap();
    sim.power_on(host, 0.0).unwrap();
    sim.add_link(host, switch, 100).unwrap();
    let ms = sim
        .add_microservice(MicroserviceSpec {
            label: "svc".into(),
            container: ContainerSpec {
                cpu_milli: 100,
                ram_mib: 256,
                image_mib: 50,
                ..Default::default()
            },
            min_instances: 1,
            max_instances: 1,
            ..Default::default()
        })
        .unwrap();
    let call = sim
        .add_api_call(ApiCallSpec {
            label: "big".into(),
            src: Endpoint::User(user),
            dst: Endpoint::Microservice(ms),
            priority: 0,
            src_process_length: 0,
            dst_process_length: 5,
            ack_process_length: 0,
            num_src_packets: 1,
            src_packet_size: 2 * 1024 * 1024,
            num_ret_packets: 0,
            ret_packet_size: 0,
            num_ack_packets: 0,
            ack_packet_size: 0,
            create_at: 0.11,
            terminate_at: None,
            precursors: Vec::new(),
        })
        .unwrap();
    sim.simulate(0.3).unwrap();

    let view = sim.api_call_snapshot(call).unwrap();
    assert!(view.states.contains(StateSet::FAIL));
    let packet = view.packets[0];
    let snapshot = sim.packet_snapshot(packet).unwrap();
    assert!(snapshot.states.contains(StateSet::FAIL));
    // The sender's queue no longer holds the packet and the bandwidth on
    // both ends of the first hop has been returned.
    assert!(!sim.node_packet_queue(gateway).unwrap().contains(&packet));
    for port in sim.port_snapshots(gateway).unwrap() {
        assert!((port.free_bandwidth - port.capacity).abs() < 1e-6);
    }
    for port in sim.port_snapshots(switch).unwrap() {
        assert!((port.free_bandwidth - port.capacity).abs() < 1e-6);
    }
}

#[test]
fn breaching_the_cpu_limit_fails_the_container() {
    let mut sim = sim(11);
    // 4096 instructions per second per core: the 100 milli-CPU limit is
    // not a whole number of per-instruction shares, so the rounded
    // schedulable count overshoots the limit and trips the check.
    let host = sim.add_host(host_spec("host-0", 4096, 8.0)).unwrap();
    sim.power_on(host, 0.0).unwrap();
    let container = sim
        .add_container(ContainerSpec {
            label: "greedy".into(),
            cpu_milli: 200,
            cpu_limit_milli: Some(100),
            ram_mib: 500,
            image_mib: 100,
            daemon: true,
            ..Default::default()
        })
        .unwrap();
    let before = sim.host_snapshot(host).unwrap();
    assert!((before.cpu_reservoir_free - before.cpu_reservoir_capacity).abs() < 1e-6);

    sim.simulate(0.01).unwrap();

    let snapshot = sim.container_snapshot(container).unwrap();
    assert!(snapshot.states.contains(StateSet::FAIL));
    assert!(snapshot.states.contains(StateSet::TERMINATED));
    assert_eq!(snapshot.num_processes, 0, "processes went down with it");
    // Everything the container and its instructions held went back.
    let after = sim.host_snapshot(host).unwrap();
    assert!((after.cpu_reservoir_free - after.cpu_reservoir_capacity).abs() < 1e-6);
    assert!((after.ram_reservoir_free - after.ram_reservoir_capacity).abs() < 1e-6);
    assert!((after.rom_reservoir_free - after.rom_reservoir_capacity).abs() < 1e-6);
    assert!((after.ram_free - after.ram_capacity).abs() < 1e-6);
}

#[test]
fn volumes_gate_container_placement() {
    let mut sim = sim(13);
    let host = sim.add_host(host_spec("host-0", 1000, 4.0)).unwrap();
    sim.power_on(host, 0.0).unwrap();
    let container = sim
        .add_container(ContainerSpec {
            label: "stateful".into(),
            cpu_milli: 100,
            ram_mib: 128,
            image_mib: 64,
            volumes: vec![strato_kernel::VolumeSpec {
                size_mib: 256,
                path: "/data".into(),
                label: "data".into(),
            }],
            ..Default::default()
        })
        .unwrap();
    sim.simulate(0.01).unwrap();

    let states = sim.entity_states(container).unwrap();
    assert!(states.contains(StateSet::SCHEDULED));
    assert!(states.contains(StateSet::INITIATED));
    let volume = sim.volumes()[0];
    assert!(sim
        .entity_states(volume)
        .unwrap()
        .contains(StateSet::SCHEDULED));
    // The ROM reservoir carries both the image and the volume.
    let view = sim.host_snapshot(host).unwrap();
    let reserved = view.rom_reservoir_capacity - view.rom_reservoir_free;
    assert!((reserved - (64.0 + 256.0) * 1024.0 * 1024.0).abs() < 1e-6);
}

#[test]
fn container_failure_is_replaced_by_the_evaluator() {
    let mut sim = sim(17);
    let host = sim.add_host(host_spec("host-0", 5000, 8.0)).unwrap();
    sim.power_on(host, 0.0).unwrap();
    let ms = sim
        .add_microservice(MicroserviceSpec {
            label: "svc".into(),
            container: daemon_template(100, 500),
            min_instances: 2,
            max_instances: 3,
            ..Default::default()
        })
        .unwrap();
    sim.simulate(0.05).unwrap();
    let victim = sim.microservice_containers(ms).unwrap()[0];
    sim.fail_entity(victim, 0.05).unwrap();
    sim.simulate(0.1).unwrap();

    assert!(sim
        .entity_states(victim)
        .unwrap()
        .contains(StateSet::TERMINATED));
    let instances = sim.microservice_containers(ms).unwrap();
    assert_eq!(instances.len(), 2, "replacement spawned");
    assert!(instances.iter().all(|&c| {
        sim.entity_states(c)
            .map(|s| s.contains(StateSet::INITIATED))
            .unwrap_or(false)
    }));
    assert_reservoirs_conserved(&sim);
}
