// Copyright (C) 2024-2025 The Strato Project.
//
// lib.rs file belongs to the strato project and is free
// software distributed under the MIT software license, see the
// accompanying file LICENSE in the main directory of the
// repository or http://www.opensource.org/licenses/mit-license.php
// for more details.
//
// Redistribution and use in source and binary forms with or without
// modifications are permitted.

//! # Strato Telemetry
//!
//! Sample row types and the recorder sinks monitors write into. The kernel
//! only ever hands read-only snapshots across this boundary; a recorder
//! decides whether a sample becomes a log line or a tabular frame row.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// One container sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSample {
    /// Virtual time of the sample, in seconds.
    pub t: f64,
    /// Container label.
    pub label: String,
    /// Live CPU usage in milli-CPU.
    pub cpu_usage: f64,
    /// CPU usage as a percentage of the container limit.
    pub cpu_pct: f64,
    /// Live RAM usage in bytes.
    pub ram_usage: f64,
    /// RAM usage as a percentage of the container limit.
    pub ram_pct: f64,
    /// Number of processes currently attached.
    pub num_processes: usize,
}

/// One host sample, windowed over the monitor's sample period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSample {
    /// Virtual time of the sample, in seconds.
    pub t: f64,
    /// Host label.
    pub label: String,
    /// Mean executed instruction load over the window.
    pub cpu_usage: f64,
    /// CPU utilization percentage over the window.
    pub cpu_pct: f64,
    /// Mean occupied RAM over the window, in bytes.
    pub ram_usage: f64,
    /// RAM utilization percentage over the window.
    pub ram_pct: f64,
    /// ROM utilization percentage over the window.
    pub rom_pct: f64,
    /// Inbound bandwidth utilization percentage over the window.
    pub ingress_pct: f64,
    /// Outbound bandwidth utilization percentage over the window.
    pub egress_pct: f64,
}

/// One microservice sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MicroserviceSample {
    /// Virtual time of the sample, in seconds.
    pub t: f64,
    /// Microservice label.
    pub label: String,
    /// Mean CPU utilization percentage across instances.
    pub cpu_pct: f64,
    /// Mean RAM utilization percentage across instances.
    pub ram_pct: f64,
    /// Number of live container instances.
    pub num_containers: usize,
}

/// Sink for monitor samples. Recorders must tolerate being called from the
/// middle of a dispatch, so they take `&self` and manage their own interior
/// mutability.
pub trait Recorder: Send + Sync {
    fn record_container(&self, sample: &ContainerSample);
    fn record_host(&self, sample: &HostSample);
    fn record_microservice(&self, sample: &MicroserviceSample);
}

/// Recorder that turns every sample into a `tracing` info line.
#[derive(Debug, Default)]
pub struct LogRecorder;

impl Recorder for LogRecorder {
    fn record_container(&self, sample: &ContainerSample) {
        info!(
            t = sample.t,
            container = %sample.label,
            cpu_pct = format_args!("{:.2}", sample.cpu_pct),
            ram_pct = format_args!("{:.2}", sample.ram_pct),
            processes = sample.num_processes,
            "container sample"
        );
    }

    fn record_host(&self, sample: &HostSample) {
        info!(
            t = sample.t,
            host = %sample.label,
            cpu_pct = format_args!("{:.2}", sample.cpu_pct),
            ram_pct = format_args!("{:.2}", sample.ram_pct),
            ingress_pct = format_args!("{:.2}", sample.ingress_pct),
            egress_pct = format_args!("{:.2}", sample.egress_pct),
            "host sample"
        );
    }

    fn record_microservice(&self, sample: &MicroserviceSample) {
        info!(
            t = sample.t,
            microservice = %sample.label,
            cpu_pct = format_args!("{:.2}", sample.cpu_pct),
            ram_pct = format_args!("{:.2}", sample.ram_pct),
            containers = sample.num_containers,
            "microservice sample"
        );
    }
}

/// Tabular collection of samples gathered during a run.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub containers: Vec<ContainerSample>,
    pub hosts: Vec<HostSample>,
    pub microservices: Vec<MicroserviceSample>,
}

impl Frame {
    /// Total number of rows across all tables.
    pub fn len(&self) -> usize {
        self.containers.len() + self.hosts.len() + self.microservices.len()
    }

    /// True when no rows were recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize the frame as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Recorder that accumulates samples into a shared [`Frame`].
#[derive(Debug, Default)]
pub struct FrameRecorder {
    frame: Arc<RwLock<Frame>>,
}

impl FrameRecorder {
    pub fn new() -> Self {
        FrameRecorder::default()
    }

    /// A handle onto the frame; clones observe the same rows, so the driver
    /// can keep one and read it after the run.
    pub fn handle(&self) -> Arc<RwLock<Frame>> {
        Arc::clone(&self.frame)
    }

    /// Snapshot of the rows recorded so far.
    pub fn snapshot(&self) -> Frame {
        self.frame.read().clone()
    }
}

impl Recorder for FrameRecorder {
    fn record_container(&self, sample: &ContainerSample) {
        self.frame.write().containers.push(sample.clone());
    }

    fn record_host(&self, sample: &HostSample) {
        self.frame.write().hosts.push(sample.clone());
    }

    fn record_microservice(&self, sample: &MicroserviceSample) {
        self.frame.write().microservices.push(sample.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container_sample(t: f64) -> ContainerSample {
        ContainerSample {
            t,
            label: "ms-0".into(),
            cpu_usage: 100.0,
            cpu_pct: 20.0,
            ram_usage: 1024.0,
            ram_pct: 10.0,
            num_processes: 1,
        }
    }

    #[test]
    fn test_frame_recorder_accumulates() {
        let recorder = FrameRecorder::new();
        recorder.record_container(&container_sample(0.1));
        recorder.record_container(&container_sample(0.2));
        let frame = recorder.snapshot();
        assert_eq!(frame.containers.len(), 2);
        assert_eq!(frame.len(), 2);
        assert!(!frame.is_empty());
    }

    #[test]
    fn test_handle_sees_new_rows() {
        let recorder = FrameRecorder::new();
        let handle = recorder.handle();
        recorder.record_container(&container_sample(0.1));
        assert_eq!(handle.read().containers.len(), 1);
    }

    #[test]
    fn test_json_round_trip() {
        let recorder = FrameRecorder::new();
        recorder.record_container(&container_sample(0.3));
        let json = recorder.snapshot().to_json().unwrap();
        let parsed: Frame = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, recorder.snapshot());
    }
}
