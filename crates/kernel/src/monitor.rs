//! Periodic read-only monitors feeding the telemetry recorders.
//!
//! A monitor samples entity state at its period and hands rows to every
//! recorder registered on the context; it never mutates the model.

use crate::action::Action;
use crate::error::KernelResult;
use crate::model::Body;
use crate::sim::Simulation;
use crate::specs::{MonitorScope, MonitorSpec};
use strato_core::{EntityId, SimTime, Transition};
use strato_telemetry::{ContainerSample, HostSample, MicroserviceSample};

/// Body of a monitor entity.
#[derive(Debug)]
pub(crate) struct MonitorBody {
    pub scope: MonitorScope,
    pub targets: Option<Vec<EntityId>>,
    pub period: SimTime,
}

impl Simulation {
    /// Install a monitor; sampling starts immediately.
    pub fn add_monitor(&mut self, spec: MonitorSpec) -> KernelResult<EntityId> {
        let period = self.span(spec.sample_period)?;
        let period = if period == SimTime::ZERO {
            SimTime::TICK
        } else {
            period
        };
        let id = self.register(
            spec.label,
            Body::Monitor(MonitorBody {
                scope: spec.scope,
                targets: spec.targets,
                period,
            }),
            Vec::new(),
        );
        let now = self.now();
        if let Ok(core) = self.core_mut(id) {
            core.apply(Transition::Create, now);
        }
        self.push_continuous(now, period, 0, id, None, Action::MonitorSample { monitor: id });
        Ok(id)
    }

    pub(crate) fn monitor_sample(&mut self, id: EntityId) -> KernelResult<()> {
        let (scope, targets, period) = {
            let body = self.monitor(id)?;
            (body.scope, body.targets.clone(), body.period)
        };
        match scope {
            MonitorScope::Containers => self.sample_containers(targets),
            MonitorScope::Hosts => self.sample_hosts(targets, period),
            MonitorScope::Microservices => self.sample_microservices(targets),
        }
    }

    fn sample_containers(&mut self, targets: Option<Vec<EntityId>>) -> KernelResult<()> {
        let targets = targets.unwrap_or_else(|| self.containers.clone());
        let t = self.now_seconds();
        let mut rows = Vec::new();
        for container in targets {
            let Ok(core) = self.core(container) else {
                continue;
            };
            if !core.initiated() {
                continue;
            }
            let body = self.container(container)?;
            let num_processes = body
                .process_queue
                .iter()
                .filter(|&&p| self.core(p).map(|c| !c.terminated()).unwrap_or(false))
                .count();
            rows.push(ContainerSample {
                t,
                label: core.label().to_string(),
                cpu_usage: body.cpu_usage,
                cpu_pct: body.cpu_utilization() * 100.0,
                ram_usage: body.ram_usage as f64,
                ram_pct: body.ram_utilization() * 100.0,
                num_processes,
            });
        }
        for row in &rows {
            for recorder in &self.recorders {
                recorder.record_container(row);
            }
        }
        Ok(())
    }

    fn sample_hosts(&mut self, targets: Option<Vec<EntityId>>, window: SimTime) -> KernelResult<()> {
        let targets = targets.unwrap_or_else(|| self.hosts.clone());
        let now = self.now();
        let t = self.now_seconds();
        let mut rows = Vec::new();
        for host in targets {
            let Ok(core) = self.core(host) else {
                continue;
            };
            if !core.powered_on() {
                continue;
            }
            let label = core.label().to_string();
            let node = self.node(host)?;
            let ram_usage = node.ram.mean_occupied(now, window);
            let ram_pct = node.ram.utilization(now, window) * 100.0;
            let rom_pct = node.rom.utilization(now, window) * 100.0;
            let cpu_id = node.cpu;
            let nic_id = node.nic;
            let cores = self.cpu(cpu_id)?.cores.clone();
            let mut cpu_usage = 0.0;
            let mut cpu_util_sum = 0.0;
            for &core_id in &cores {
                let compute = &self.cpu_core(core_id)?.compute;
                cpu_usage += compute.mean_occupied(now, window);
                cpu_util_sum += compute.utilization(now, window);
            }
            let cpu_pct = if cores.is_empty() {
                0.0
            } else {
                cpu_util_sum / cores.len() as f64 * 100.0
            };
            let (egress_pct, ingress_pct) = self.nic_window_utilization(host, nic_id, now, window)?;
            rows.push(HostSample {
                t,
                label,
                cpu_usage,
                cpu_pct,
                ram_usage,
                ram_pct,
                rom_pct,
                ingress_pct,
                egress_pct,
            });
        }
        for row in &rows {
            for recorder in &self.recorders {
                recorder.record_host(row);
            }
        }
        Ok(())
    }

    /// Mean egress/ingress utilization of a NIC over the window: egress
    /// over its own ports, ingress over the peers' ports facing this node.
    fn nic_window_utilization(
        &self,
        host: EntityId,
        nic: EntityId,
        now: SimTime,
        window: SimTime,
    ) -> KernelResult<(f64, f64)> {
        let ports = self.nic(nic)?.ports.clone();
        if ports.is_empty() {
            return Ok((0.0, 0.0));
        }
        let mut egress = 0.0;
        let mut ingress = 0.0;
        let mut peer_ports = 0usize;
        for &port in &ports {
            let body = self.port(port)?;
            egress += body.bandwidth.utilization(now, window);
            let peer = body.endpoint;
            if let Ok(peer_nic) = self.nic_of_node(peer) {
                for &remote in &self.nic(peer_nic)?.ports {
                    if self.port(remote)?.endpoint == host {
                        ingress += self.port(remote)?.bandwidth.utilization(now, window);
                        peer_ports += 1;
                    }
                }
            }
        }
        let egress_pct = egress / ports.len() as f64 * 100.0;
        let ingress_pct = if peer_ports == 0 {
            0.0
        } else {
            ingress / peer_ports as f64 * 100.0
        };
        Ok((egress_pct, ingress_pct))
    }

    fn sample_microservices(&mut self, targets: Option<Vec<EntityId>>) -> KernelResult<()> {
        let targets = targets.unwrap_or_else(|| self.microservices.clone());
        let t = self.now_seconds();
        let mut rows = Vec::new();
        for microservice in targets {
            let Ok(core) = self.core(microservice) else {
                continue;
            };
            if core.terminated() || !core.created() {
                continue;
            }
            let (cpu_util, ram_util) = self.microservice_utilization(microservice)?;
            let num_containers = self.microservice_containers(microservice)?.len();
            rows.push(MicroserviceSample {
                t,
                label: core.label().to_string(),
                cpu_pct: cpu_util * 100.0,
                ram_pct: ram_util * 100.0,
                num_containers,
            });
        }
        for row in &rows {
            for recorder in &self.recorders {
                recorder.record_microservice(row);
            }
        }
        Ok(())
    }
}
