//! Derived aggregates: fleet health, load balance, grouped rollups and
//! time-series summaries. Everything here is a pure fold over its inputs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use tdigests::TDigest;

use super::metrics::round2;
use super::models::*;
use super::FleetError;

/// Warning share above which the fleet is classed as danger.
pub const DANGER_WARNING_FRACTION: f64 = 0.3;
/// Healthy share below which the fleet is classed as warning.
pub const MIN_HEALTHY_FRACTION: f64 = 0.8;
/// Max/min traffic ratio at or above which load is unbalanced.
pub const BALANCE_RATIO_LIMIT: f64 = 3.0;

const DIGEST_CENTROIDS: usize = 100;

/// Count servers per status and classify the fleet.
///
/// Checks run in strict priority order: danger (any danger server, or
/// warning share strictly above 0.3), then warning (any warning server, or
/// healthy share strictly below 0.8), otherwise healthy. An empty fleet is
/// healthy.
pub fn compute_health(servers: &[Server], at: DateTime<Utc>) -> SystemHealth {
    let counts: StatusCounts = servers.iter().collect();

    let overall_status = if counts.total == 0 {
        ServerStatus::Healthy
    } else {
        let total = counts.total as f64;
        let warning_fraction = counts.warning as f64 / total;
        let healthy_fraction = counts.healthy as f64 / total;

        if counts.danger > 0 || warning_fraction > DANGER_WARNING_FRACTION {
            ServerStatus::Danger
        } else if counts.warning > 0 || healthy_fraction < MIN_HEALTHY_FRACTION {
            ServerStatus::Warning
        } else {
            ServerStatus::Healthy
        }
    };

    SystemHealth {
        overall_status,
        total_servers: counts.total,
        healthy_servers: counts.healthy,
        warning_servers: counts.warning,
        danger_servers: counts.danger,
        offline_servers: counts.offline,
        timestamp: at,
    }
}

/// Balance verdict from per-server traffic samples.
///
/// Callers pass only eligible (non-offline) servers. The ratio is max/min,
/// or 1.0 when the minimum is zero or there are no samples. The verdict is
/// taken on the exact ratio; only the reported value is rounded.
pub fn compute_load_balance<I>(traffic: I) -> LoadBalanceStatus
where
    I: IntoIterator<Item = (String, f64)>,
{
    let traffic_distribution: BTreeMap<String, f64> = traffic.into_iter().collect();

    let max = traffic_distribution.values().copied().fold(f64::MIN, f64::max);
    let min = traffic_distribution.values().copied().fold(f64::MAX, f64::min);

    let raw = if traffic_distribution.is_empty() || min <= 0.0 {
        1.0
    } else {
        max / min
    };

    LoadBalanceStatus {
        is_balanced: raw < BALANCE_RATIO_LIMIT,
        ratio: round2(raw),
        server_count: traffic_distribution.len(),
        traffic_distribution,
    }
}

/// Dimension to partition servers by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupDimension {
    Region,
    ServiceType,
    Cluster,
    Status,
}

impl FromStr for GroupDimension {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "region" => Ok(GroupDimension::Region),
            "service_type" => Ok(GroupDimension::ServiceType),
            "cluster" => Ok(GroupDimension::Cluster),
            "status" => Ok(GroupDimension::Status),
            other => Err(FleetError::InvalidFilter(format!(
                "unknown group dimension: {}",
                other
            ))),
        }
    }
}

/// One group of a partition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServerGroup {
    #[serde(flatten)]
    pub counts: StatusCounts,
    pub servers: Vec<Server>,
}

/// Partition servers by `dimension`. Only non-empty groups are returned;
/// unclustered servers are left out of the cluster partition.
pub fn group_by(servers: &[Server], dimension: GroupDimension) -> BTreeMap<String, ServerGroup> {
    let mut groups: BTreeMap<String, ServerGroup> = BTreeMap::new();

    for server in servers {
        let key = match dimension {
            GroupDimension::Region => server.region.clone(),
            GroupDimension::ServiceType => server.service_type.to_string(),
            GroupDimension::Status => server.status.to_string(),
            GroupDimension::Cluster => match &server.cluster_id {
                Some(id) => id.clone(),
                None => continue,
            },
        };

        let group = groups.entry(key).or_default();
        group.counts.record(server.status);
        group.servers.push(server.clone());
    }

    groups
}

/// All partitions at once plus fleet-wide counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupedRollup {
    pub by_region: BTreeMap<String, ServerGroup>,
    pub by_service_type: BTreeMap<String, ServerGroup>,
    pub by_cluster: BTreeMap<String, ServerGroup>,
    pub by_status: BTreeMap<String, ServerGroup>,
    pub overall: StatusCounts,
}

pub fn grouped_rollup(servers: &[Server]) -> GroupedRollup {
    GroupedRollup {
        by_region: group_by(servers, GroupDimension::Region),
        by_service_type: group_by(servers, GroupDimension::ServiceType),
        by_cluster: group_by(servers, GroupDimension::Cluster),
        by_status: group_by(servers, GroupDimension::Status),
        overall: servers.iter().collect(),
    }
}

/// Distribution of one metric type over a set of points.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub metric_type: MetricType,
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Summarize points per metric type, using a t-digest for percentiles.
/// Metric types with no points are omitted.
pub fn summarize_series(points: &[TimeSeriesPoint]) -> Vec<SeriesSummary> {
    let mut by_metric: BTreeMap<MetricType, Vec<f64>> = BTreeMap::new();
    for point in points {
        if point.value.is_finite() {
            by_metric.entry(point.metric_type).or_default().push(point.value);
        }
    }

    by_metric
        .into_iter()
        .map(|(metric_type, values)| {
            let count = values.len();
            let min = values.iter().copied().fold(f64::MAX, f64::min);
            let max = values.iter().copied().fold(f64::MIN, f64::max);
            let mean = values.iter().sum::<f64>() / count as f64;

            let mut digest = TDigest::from_values(values);
            digest.compress(DIGEST_CENTROIDS);

            SeriesSummary {
                metric_type,
                count,
                min,
                max,
                mean: round2(mean),
                p50: round2(sanitize_float(digest.estimate_quantile(0.50))),
                p95: round2(sanitize_float(digest.estimate_quantile(0.95))),
                p99: round2(sanitize_float(digest.estimate_quantile(0.99))),
            }
        })
        .collect()
}

fn sanitize_float(f: f64) -> f64 {
    if f.is_nan() || f.is_infinite() {
        0.0
    } else {
        f
    }
}

/// Headline counts for the stats view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetStats {
    pub total_servers: usize,
    pub servers_by_region: BTreeMap<String, usize>,
    pub servers_by_status: BTreeMap<String, usize>,
    pub servers_by_service_type: BTreeMap<String, usize>,
    pub active_tasks: usize,
    pub recent_alerts: usize,
    pub load_balance_ratio: f64,
}

pub fn fleet_stats(
    servers: &[Server],
    active_tasks: usize,
    recent_alerts: usize,
    load_balance_ratio: f64,
) -> FleetStats {
    let mut stats = FleetStats {
        total_servers: servers.len(),
        servers_by_region: BTreeMap::new(),
        servers_by_status: ServerStatus::ALL
            .iter()
            .map(|s| (s.to_string(), 0))
            .collect(),
        servers_by_service_type: BTreeMap::new(),
        active_tasks,
        recent_alerts,
        load_balance_ratio,
    };

    for server in servers {
        *stats.servers_by_region.entry(server.region.clone()).or_default() += 1;
        *stats.servers_by_status.entry(server.status.to_string()).or_default() += 1;
        *stats
            .servers_by_service_type
            .entry(server.service_type.to_string())
            .or_default() += 1;
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::store::tests::test_server;

    fn fleet(healthy: usize, warning: usize, danger: usize, offline: usize) -> Vec<Server> {
        let statuses = std::iter::repeat(ServerStatus::Healthy)
            .take(healthy)
            .chain(std::iter::repeat(ServerStatus::Warning).take(warning))
            .chain(std::iter::repeat(ServerStatus::Danger).take(danger))
            .chain(std::iter::repeat(ServerStatus::Offline).take(offline));
        statuses
            .enumerate()
            .map(|(i, s)| test_server(&format!("server-{:03}", i + 1), s))
            .collect()
    }

    fn overall(servers: &[Server]) -> ServerStatus {
        compute_health(servers, Utc::now()).overall_status
    }

    #[test]
    fn test_health_any_danger_is_danger() {
        assert_eq!(overall(&fleet(8, 0, 2, 0)), ServerStatus::Danger);
    }

    #[test]
    fn test_health_warning_share_above_threshold_is_danger() {
        assert_eq!(overall(&fleet(6, 4, 0, 0)), ServerStatus::Danger);
    }

    #[test]
    fn test_health_warning_share_at_threshold_is_not_escalated() {
        assert_eq!(overall(&fleet(7, 3, 0, 0)), ServerStatus::Warning);
    }

    #[test]
    fn test_health_low_healthy_share_is_warning() {
        assert_eq!(overall(&fleet(7, 2, 0, 1)), ServerStatus::Warning);
        // No warning servers at all, but only 70% healthy.
        assert_eq!(overall(&fleet(7, 0, 0, 3)), ServerStatus::Warning);
    }

    #[test]
    fn test_health_all_healthy() {
        let servers = fleet(10, 0, 0, 0);
        let health = compute_health(&servers, Utc::now());
        assert_eq!(health.overall_status, ServerStatus::Healthy);
        assert_eq!(health.total_servers, 10);
        assert_eq!(health.healthy_servers, 10);
        // Exactly 80% healthy is not below the threshold.
        assert_eq!(overall(&fleet(8, 0, 0, 2)), ServerStatus::Healthy);
    }

    #[test]
    fn test_health_empty_fleet_is_neutral() {
        let health = compute_health(&[], Utc::now());
        assert_eq!(health.overall_status, ServerStatus::Healthy);
        assert_eq!(health.total_servers, 0);
    }

    fn samples(values: &[f64]) -> Vec<(String, f64)> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (format!("server-{:03}", i + 1), *v))
            .collect()
    }

    #[test]
    fn test_load_balance_ratio_at_limit_is_unbalanced() {
        let lb = compute_load_balance(samples(&[10.0, 20.0, 30.0]));
        assert_eq!(lb.ratio, 3.0);
        assert!(!lb.is_balanced);
        assert_eq!(lb.server_count, 3);
        assert_eq!(lb.traffic_distribution["server-002"], 20.0);
    }

    #[test]
    fn test_load_balance_verdict_uses_unrounded_ratio() {
        let lb = compute_load_balance(samples(&[10.0, 29.96]));
        assert_eq!(lb.ratio, 3.0);
        assert!(lb.is_balanced);
    }

    #[test]
    fn test_load_balance_even_traffic() {
        let lb = compute_load_balance(samples(&[10.0, 10.0, 10.0]));
        assert_eq!(lb.ratio, 1.0);
        assert!(lb.is_balanced);
    }

    #[test]
    fn test_load_balance_empty_and_zero_minimum() {
        let empty = compute_load_balance(Vec::new());
        assert_eq!(empty.server_count, 0);
        assert_eq!(empty.ratio, 1.0);
        assert!(empty.is_balanced);

        let zero = compute_load_balance(samples(&[0.0, 40.0]));
        assert_eq!(zero.ratio, 1.0);
        assert!(zero.is_balanced);
    }

    #[test]
    fn test_group_by_partitions_and_counts() {
        let mut servers = fleet(2, 1, 0, 1);
        servers[0].region = "Shanghai".to_string();
        servers[1].cluster_id = Some("cluster-1".to_string());
        servers[2].cluster_id = Some("cluster-1".to_string());

        let by_region = group_by(&servers, GroupDimension::Region);
        assert_eq!(by_region.len(), 2);
        assert_eq!(by_region["Beijing"].counts.total, 3);
        assert_eq!(by_region["Beijing"].counts.offline, 1);
        assert_eq!(by_region["Shanghai"].servers[0].id, "server-001");

        let by_cluster = group_by(&servers, GroupDimension::Cluster);
        assert_eq!(by_cluster.len(), 1);
        assert_eq!(by_cluster["cluster-1"].counts.healthy, 1);
        assert_eq!(by_cluster["cluster-1"].counts.warning, 1);

        let by_status = group_by(&servers, GroupDimension::Status);
        assert_eq!(by_status["healthy"].counts.total, 2);

        let rollup = grouped_rollup(&servers);
        assert_eq!(rollup.overall.total, 4);
        assert_eq!(rollup.by_service_type["web"].counts.total, 4);
    }

    #[test]
    fn test_summarize_series_percentiles() {
        let now = Utc::now();
        let points: Vec<TimeSeriesPoint> = (1..=100)
            .map(|v| TimeSeriesPoint {
                timestamp: now,
                value: v as f64,
                metric_type: MetricType::CpuUsage,
                server_id: None,
                region: None,
                service_type: None,
            })
            .collect();

        let summary = summarize_series(&points);
        assert_eq!(summary.len(), 1);
        let cpu = &summary[0];
        assert_eq!(cpu.count, 100);
        assert_eq!(cpu.min, 1.0);
        assert_eq!(cpu.max, 100.0);
        assert!((cpu.mean - 50.5).abs() < 0.01);
        assert!((cpu.p50 - 50.5).abs() < 3.0);
        assert!(cpu.p95 > cpu.p50);
    }

    #[test]
    fn test_fleet_stats_lists_every_status() {
        let stats = fleet_stats(&fleet(3, 0, 0, 0), 2, 1, 1.5);
        assert_eq!(stats.servers_by_status.len(), 4);
        assert_eq!(stats.servers_by_status["healthy"], 3);
        assert_eq!(stats.servers_by_status["danger"], 0);
        assert_eq!(stats.servers_by_region["Beijing"], 3);
    }
}
