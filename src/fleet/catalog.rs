//! Fleet inventory generation.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::prelude::*;

use super::models::{Cluster, Server, ServerStatus, ServiceType};
use crate::config::{ConfigError, SimConfig};

const CLUSTER_NAMES: &[&str] = &[
    "Production Cluster",
    "Development Cluster",
    "Testing Cluster",
    "Staging Environment",
    "Production East",
    "Production West",
    "Database Cluster",
    "Application Cluster",
    "Cache Cluster",
];

/// Servers forced into offline or danger at startup.
const DEGRADED_INJECTIONS: usize = 3;

/// Odds of a "critical" tag on any server.
const CRITICAL_TAG_PROBABILITY: f64 = 0.3;

/// Tags implied by a service type.
pub fn service_tags(service_type: ServiceType) -> &'static [&'static str] {
    match service_type {
        ServiceType::Database | ServiceType::Cache => &["data-service", "high-availability"],
        ServiceType::Web | ServiceType::ApiGateway => &["frontend", "load-balanced"],
        ServiceType::MessageQueue | ServiceType::FileStorage => &[],
    }
}

/// Generate the server inventory and its clusters.
///
/// The first `cluster_count * cluster_size` servers are split into clusters
/// in order and inherit their cluster's service type; the rest are
/// unclustered. Output depends only on `cfg`, the RNG state and `now`.
pub fn generate_fleet<R: Rng>(
    cfg: &SimConfig,
    rng: &mut R,
    now: DateTime<Utc>,
) -> Result<(Vec<Server>, Vec<Cluster>), ConfigError> {
    cfg.validate()?;

    let mut clusters: Vec<Cluster> = (0..cfg.cluster_count)
        .map(|c| Cluster {
            id: format!("cluster-{}", c + 1),
            name: pick(rng, CLUSTER_NAMES).to_string(),
            region: pick(rng, &cfg.regions).clone(),
            service_type: *pick(rng, ServiceType::ALL),
            server_ids: Vec::with_capacity(cfg.cluster_size),
        })
        .collect();

    let clustered = cfg.cluster_count * cfg.cluster_size;

    let mut servers = Vec::with_capacity(cfg.server_count);
    for i in 0..cfg.server_count {
        let cluster = if i < clustered {
            clusters.get_mut(i / cfg.cluster_size)
        } else {
            None
        };
        let service_type = match &cluster {
            Some(c) => c.service_type,
            None => *pick(rng, ServiceType::ALL),
        };
        let region = pick(rng, &cfg.regions).clone();
        let profile = *pick(rng, &cfg.capacity_profiles);

        let mut tags = vec![region.clone(), service_type.to_string()];
        tags.extend(service_tags(service_type).iter().map(|t| t.to_string()));
        if rng.gen_bool(CRITICAL_TAG_PROBABILITY) {
            tags.push("critical".to_string());
        }

        let id = format!("server-{:03}", i + 1);
        let cluster_id = cluster.map(|c| {
            c.server_ids.push(id.clone());
            c.id.clone()
        });

        servers.push(Server {
            name: format!("{}-{}-{:03}", region, service_type, i + 1),
            id,
            region,
            service_type,
            cluster_id,
            tags,
            // Healthy twice as likely as warning.
            status: if rng.gen_ratio(2, 3) {
                ServerStatus::Healthy
            } else {
                ServerStatus::Warning
            },
            ip_address: format!("192.168.{}.{}", i / 250, i % 250 + 1),
            cpu_cores: profile.cpu_cores,
            memory_gb: profile.memory_gb,
            disk_gb: profile.disk_gb,
            last_seen: now - ChronoDuration::minutes(rng.gen_range(1..=30)),
        });
    }

    // Guarantee some degraded servers so health scenarios are non-trivial.
    let injections = DEGRADED_INJECTIONS.min(servers.len());
    for idx in rand::seq::index::sample(rng, servers.len(), injections) {
        servers[idx].status = if rng.gen_bool(0.5) {
            ServerStatus::Offline
        } else {
            ServerStatus::Danger
        };
    }

    clusters.retain(|c| !c.server_ids.is_empty());

    Ok((servers, clusters))
}

fn pick<'a, T, R: Rng>(rng: &mut R, items: &'a [T]) -> &'a T {
    // Callers only pass non-empty slices; validated lists and constant tables.
    let idx = rng.gen_range(0..items.len());
    &items[idx]
}
