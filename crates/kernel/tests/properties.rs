//! Property tests over randomized placement and routing scenarios.

use proptest::prelude::*;
use strato_core::{EntityId, SimConfig, StateSet};
use strato_kernel::{
    ApiCallSpec, ContainerSpec, DispatchMode, Endpoint, HardwareSpec, MicroserviceSpec,
    Simulation,
};
use strato_network::{NodeClass, SubnetPool};

#[derive(Debug, Clone)]
struct RandomContainer {
    cpu_milli: u64,
    ram_mib: u64,
    image_mib: u64,
    priority: i64,
}

fn random_container() -> impl Strategy<Value = RandomContainer> {
    (50u64..500, 64u64..512, 10u64..100, -2i64..3).prop_map(
        |(cpu_milli, ram_mib, image_mib, priority)| RandomContainer {
            cpu_milli,
            ram_mib,
            image_mib,
            priority,
        },
    )
}

/// Randomized shape of a service-to-service call whose route crosses a
/// gateway sitting in the middle of the topology.
#[derive(Debug, Clone)]
struct TransitCall {
    num_src: u32,
    num_ret: u32,
    num_ack: u32,
    src_size: u64,
    ret_size: u64,
    ack_size: u64,
    src_len: u64,
    dst_len: u64,
    ack_len: u64,
}

fn transit_call() -> impl Strategy<Value = TransitCall> {
    (
        1u32..3,
        1u32..3,
        1u32..3,
        50u64..200,
        50u64..200,
        50u64..200,
        1u64..8,
        1u64..8,
        1u64..8,
    )
        .prop_map(
            |(num_src, num_ret, num_ack, src_size, ret_size, ack_size, src_len, dst_len, ack_len)| {
                TransitCall {
                    num_src,
                    num_ret,
                    num_ack,
                    src_size,
                    ret_size,
                    ack_size,
                    src_len,
                    dst_len,
                    ack_len,
                }
            },
        )
}

fn transit_node(label: &str, ram_gib: f64) -> HardwareSpec {
    HardwareSpec {
        label: label.into(),
        ipc: 1,
        frequency: 5000,
        num_cores: 4,
        cpu_tdp: 150.0,
        cpu_mode: DispatchMode::RoundRobin,
        ram_gib,
        rom_gib: 16.0,
        ..Default::default()
    }
}

/// host-a -- switch-a -- gateway -- switch-b -- host-b, one instance per
/// host (each container reserves most of a host's RAM, so first fit puts
/// them on distinct sides), and one randomized call from side a to side b.
/// The only route between the instances passes through the gateway as a
/// transit node.
fn transit_run(seed: u64, call: &TransitCall) -> (Simulation, EntityId, EntityId) {
    let mut sim = Simulation::new(SimConfig {
        resolution: 4,
        debug: false,
        seed,
    })
    .expect("context");
    let subnet_a: SubnetPool = "10.0.0.0/24".parse().expect("subnet");
    let subnet_b: SubnetPool = "10.0.1.0/24".parse().expect("subnet");
    let switch_a = sim.add_switch(transit_node("switch-a", 8.0), subnet_a).expect("switch");
    let switch_b = sim.add_switch(transit_node("switch-b", 8.0), subnet_b).expect("switch");
    sim.power_on(switch_a, 0.0).expect("power on");
    sim.power_on(switch_b, 0.0).expect("power on");
    let gateway = sim.add_gateway("gw").expect("gateway");
    sim.add_link(gateway, switch_a, 10).expect("link");
    sim.add_link(gateway, switch_b, 10).expect("link");
    let host_a = sim.add_host(transit_node("host-a", 2.0)).expect("host");
    let host_b = sim.add_host(transit_node("host-b", 2.0)).expect("host");
    sim.power_on(host_a, 0.0).expect("power on");
    sim.power_on(host_b, 0.0).expect("power on");
    sim.add_link(host_a, switch_a, 10).expect("link");
    sim.add_link(host_b, switch_b, 10).expect("link");

    let instance = ContainerSpec {
        cpu_milli: 100,
        ram_mib: 1536,
        image_mib: 64,
        ..Default::default()
    };
    let ms_a = sim
        .add_microservice(MicroserviceSpec {
            label: "side-a".into(),
            container: instance.clone(),
            min_instances: 1,
            max_instances: 1,
            ..Default::default()
        })
        .expect("microservice");
    let ms_b = sim
        .add_microservice(MicroserviceSpec {
            label: "side-b".into(),
            container: instance,
            min_instances: 1,
            max_instances: 1,
            ..Default::default()
        })
        .expect("microservice");
    let call_id = sim
        .add_api_call(ApiCallSpec {
            label: "cross".into(),
            src: Endpoint::Microservice(ms_a),
            dst: Endpoint::Microservice(ms_b),
            priority: 0,
            src_process_length: call.src_len,
            dst_process_length: call.dst_len,
            ack_process_length: call.ack_len,
            num_src_packets: call.num_src,
            src_packet_size: call.src_size,
            num_ret_packets: call.num_ret,
            ret_packet_size: call.ret_size,
            num_ack_packets: call.num_ack,
            ack_packet_size: call.ack_size,
            create_at: 0.01,
            terminate_at: None,
            precursors: Vec::new(),
        })
        .expect("api call");
    sim.simulate(0.8).expect("run");
    (sim, call_id, gateway)
}

fn build(seed: u64, hosts: u32, containers: &[RandomContainer]) -> Simulation {
    let mut sim = Simulation::new(SimConfig {
        resolution: 4,
        debug: false,
        seed,
    })
    .expect("context");
    for i in 0..hosts {
        let host = sim
            .add_host(HardwareSpec {
                label: format!("host-{i}"),
                ipc: 1,
                frequency: 1000,
                num_cores: 2,
                cpu_tdp: 95.0,
                cpu_mode: DispatchMode::RoundRobin,
                ram_gib: 2.0,
                rom_gib: 8.0,
                ..Default::default()
            })
            .expect("host");
        sim.power_on(host, 0.0).expect("power on");
    }
    for (i, c) in containers.iter().enumerate() {
        sim.add_container(ContainerSpec {
            label: format!("c-{i}"),
            cpu_milli: c.cpu_milli,
            ram_mib: c.ram_mib,
            image_mib: c.image_mib,
            priority: c.priority,
            ..Default::default()
        })
        .expect("container");
    }
    sim.simulate(0.005).expect("run");
    sim
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// The reservoirs of every host always balance against the requests of
    /// its scheduled residents.
    #[test]
    fn reservoirs_conserve(
        containers in prop::collection::vec(random_container(), 1..24),
        hosts in 1u32..5,
    ) {
        let sim = build(1, hosts, &containers);
        for &host in sim.hosts() {
            let view = sim.host_snapshot(host).expect("snapshot");
            let mut cpu = 0.0;
            let mut ram = 0.0;
            let mut rom = 0.0;
            for &container in &view.containers {
                let states = sim.entity_states(container).expect("states");
                if !states.contains(StateSet::SCHEDULED) || states.contains(StateSet::TERMINATED) {
                    continue;
                }
                let c = sim.container_snapshot(container).expect("container");
                cpu += c.cpu_request as f64;
                ram += c.ram_request as f64;
                rom += c.image_size as f64;
            }
            prop_assert!((view.cpu_reservoir_free + cpu - view.cpu_reservoir_capacity).abs() < 1e-6);
            prop_assert!((view.ram_reservoir_free + ram - view.ram_reservoir_capacity).abs() < 1e-6);
            prop_assert!((view.rom_reservoir_free + rom - view.rom_reservoir_capacity).abs() < 1e-6);
        }
    }

    /// A scheduled container always sits on a powered host that had room,
    /// and every placement is reproducible from the seed.
    #[test]
    fn placement_is_sound_and_deterministic(
        containers in prop::collection::vec(random_container(), 1..16),
        hosts in 1u32..4,
    ) {
        let sim_a = build(7, hosts, &containers);
        let sim_b = build(7, hosts, &containers);
        for (&a, &b) in sim_a.containers().iter().zip(sim_b.containers().iter()) {
            let view_a = sim_a.container_snapshot(a).expect("container");
            let view_b = sim_b.container_snapshot(b).expect("container");
            prop_assert_eq!(view_a.host, view_b.host);
            prop_assert_eq!(view_a.states, view_b.states);
            if let Some(host) = view_a.host {
                let states = sim_a.entity_states(host).expect("host states");
                prop_assert!(states.contains(StateSet::POWER_ON));
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    /// Path validity with a gateway as a transit hop: every packet of a
    /// call routed host-a - switch-a - gateway - switch-b - host-b visits
    /// exactly its computed route and only succeeds at its destination
    /// host; the gateway forwards instead of terminating it. Also checks
    /// the core balance and the causal order of the expansion.
    #[test]
    fn gateway_transit_preserves_path_validity(
        call in transit_call(),
        seed in 0u64..1000,
    ) {
        let (sim, call_id, gateway) = transit_run(seed, &call);
        let view = sim.api_call_snapshot(call_id).expect("call");
        prop_assert!(
            view.states.contains(StateSet::SUCCESS),
            "call states were {:?}",
            view.states
        );

        for &packet in &view.packets {
            let snapshot = sim.packet_snapshot(packet).expect("packet");
            // The route must cross the gateway strictly in its interior.
            let position = snapshot.path.iter().position(|&hop| hop == gateway);
            prop_assert!(
                matches!(position, Some(i) if i > 0 && i + 1 < snapshot.path.len()),
                "{} does not transit the gateway: {:?}",
                snapshot.label,
                snapshot.path
            );
            prop_assert!(snapshot.states.contains(StateSet::SUCCESS), "{}", snapshot.label);
            prop_assert_eq!(&snapshot.visited, &snapshot.path, "{}", &snapshot.label);
            prop_assert_eq!(snapshot.current_hop, Some(snapshot.dst_host), "{}", &snapshot.label);
        }

        // Core balance across every computing node, queued unit debts plus
        // free power equals capacity.
        for (node, class) in sim.topology().nodes() {
            if !matches!(class, NodeClass::Host | NodeClass::Switch) {
                continue;
            }
            let host_view = sim.host_snapshot(node).expect("node snapshot");
            for core in &host_view.cores {
                prop_assert!(
                    (core.free_power + core.queue_len as f64 - core.capacity).abs() < 1e-6,
                    "core out of balance on {}",
                    host_view.label
                );
            }
        }

        // Causal order of the expansion: each step's creations wait for the
        // previous step's terminations.
        let mut src_process = None;
        let mut dst_process = None;
        let mut ack_process = None;
        for &process in &view.processes {
            let label = sim.label_of(process);
            if label.ends_with("-SRC") {
                src_process = Some(process);
            } else if label.ends_with("-DST") {
                dst_process = Some(process);
            } else if label.ends_with("-ACK") {
                ack_process = Some(process);
            }
        }
        let src_process = src_process.expect("src process");
        let dst_process = dst_process.expect("dst process");
        let ack_process = ack_process.expect("ack process");
        let done = |id: EntityId| sim.entity_terminated_at(id).expect("terminated");
        let born = |id: EntityId| sim.entity_created_at(id).expect("created");
        for &packet in &view.packets {
            let label = sim.label_of(packet);
            if label.contains("-SRC-") {
                prop_assert!(born(packet) >= done(src_process), "{label}");
                prop_assert!(born(dst_process) >= done(packet), "{label}");
            } else if label.contains("-RET-") {
                prop_assert!(born(packet) >= done(dst_process), "{label}");
                prop_assert!(born(ack_process) >= done(packet), "{label}");
            } else if label.contains("-ACK-") {
                prop_assert!(born(packet) >= done(ack_process), "{label}");
            }
        }
    }
}
