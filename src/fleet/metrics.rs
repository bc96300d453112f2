//! Metric synthesis correlated with server status.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::ops::Range;

use super::models::{MetricSample, Server, ServerStatus};

/// Base utilization ranges for one server status.
#[derive(Debug, Clone)]
pub struct StatusProfile {
    pub cpu: Range<f64>,
    pub memory: Range<f64>,
    pub disk: Range<f64>,
}

static HEALTHY: StatusProfile = StatusProfile {
    cpu: 20.0..70.0,
    memory: 30.0..75.0,
    disk: 20.0..80.0,
};
static WARNING: StatusProfile = StatusProfile {
    cpu: 60.0..85.0,
    memory: 70.0..88.0,
    disk: 70.0..90.0,
};
static DANGER: StatusProfile = StatusProfile {
    cpu: 85.0..98.0,
    memory: 85.0..95.0,
    disk: 85.0..98.0,
};
static OFFLINE: StatusProfile = StatusProfile {
    cpu: 0.0..10.0,
    memory: 0.0..20.0,
    disk: 0.0..30.0,
};

// Jitter half-widths applied on top of the base draw.
const CPU_JITTER: f64 = 10.0;
const MEMORY_JITTER: f64 = 8.0;
const DISK_JITTER: f64 = 5.0;

/// Range table keyed by status.
pub fn status_profile(status: ServerStatus) -> &'static StatusProfile {
    match status {
        ServerStatus::Healthy => &HEALTHY,
        ServerStatus::Warning => &WARNING,
        ServerStatus::Danger => &DANGER,
        ServerStatus::Offline => &OFFLINE,
    }
}

/// Synthesize a metrics sample for `server` at time `at`.
///
/// Utilization fields land in `[0, 100]`; throughput and load are never
/// negative. Load averages form a damped chain from cpu utilization.
pub fn sample_metrics<R: Rng>(
    server: &Server,
    rng: &mut R,
    at: DateTime<Utc>,
) -> MetricSample {
    let profile = status_profile(server.status);

    let cpu_usage = jittered_percent(rng, &profile.cpu, CPU_JITTER);
    let memory_usage = jittered_percent(rng, &profile.memory, MEMORY_JITTER);
    let disk_usage = jittered_percent(rng, &profile.disk, DISK_JITTER);

    let network_base: f64 = rng.gen_range(5.0..50.0);
    let network_in = (network_base + rng.gen_range(-5.0..15.0)).max(0.0);
    // Outbound tracks inbound.
    let network_out = (network_in * 0.7 + rng.gen_range(-3.0..10.0)).max(0.0);

    let load_1m = (cpu_usage / 20.0 + rng.gen_range(-0.5..0.5)).max(0.0);
    let load_5m = (load_1m * 0.85 + rng.gen_range(-0.3..0.3)).max(0.0);
    let load_15m = (load_5m * 0.9 + rng.gen_range(-0.2..0.2)).max(0.0);

    MetricSample {
        server_id: server.id.clone(),
        timestamp: at,
        cpu_usage: round2(cpu_usage),
        memory_usage: round2(memory_usage),
        disk_usage: round2(disk_usage),
        network_in_mbps: round2(network_in),
        network_out_mbps: round2(network_out),
        load_1m: round2(load_1m),
        load_5m: round2(load_5m),
        load_15m: round2(load_15m),
    }
}

fn jittered_percent<R: Rng>(rng: &mut R, base: &Range<f64>, jitter: f64) -> f64 {
    let value = rng.gen_range(base.clone()) + rng.gen_range(-jitter..jitter);
    value.clamp(0.0, 100.0)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
