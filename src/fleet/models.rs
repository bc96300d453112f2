//! Fleet model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::FleetError;

/// Generates `as_str`, `Display` and `FromStr` for a fieldless enum.
macro_rules! string_enum {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = FleetError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok($ty::$variant),)+
                    other => Err(FleetError::InvalidFilter(format!(
                        "unknown {}: {}",
                        stringify!($ty),
                        other
                    ))),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Healthy,
    Warning,
    Danger,
    Offline,
}

string_enum!(ServerStatus {
    Healthy => "healthy",
    Warning => "warning",
    Danger => "danger",
    Offline => "offline",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Web,
    Database,
    Cache,
    MessageQueue,
    FileStorage,
    ApiGateway,
}

string_enum!(ServiceType {
    Web => "web",
    Database => "database",
    Cache => "cache",
    MessageQueue => "message_queue",
    FileStorage => "file_storage",
    ApiGateway => "api_gateway",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

string_enum!(TaskStatus {
    Pending => "pending",
    Running => "running",
    Completed => "completed",
    Failed => "failed",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
}

string_enum!(AlertSeverity {
    Low => "low",
    Medium => "medium",
    High => "high",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    CpuUsage,
    MemoryUsage,
    DiskUsage,
    NetworkIn,
    NetworkOut,
}

string_enum!(MetricType {
    CpuUsage => "cpu_usage",
    MemoryUsage => "memory_usage",
    DiskUsage => "disk_usage",
    NetworkIn => "network_in",
    NetworkOut => "network_out",
});

/// A simulated server. Identifier and capacity are fixed once generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub name: String,
    pub region: String,
    pub service_type: ServiceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    pub tags: Vec<String>,
    pub status: ServerStatus,
    pub ip_address: String,
    pub cpu_cores: u32,
    pub memory_gb: u32,
    pub disk_gb: u32,
    pub last_seen: DateTime<Utc>,
}

/// Optional grouping of servers sharing a service type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    pub region: String,
    pub service_type: ServiceType,
    pub server_ids: Vec<String>,
}

/// A point-in-time metrics sample for one server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub server_id: String,
    pub timestamp: DateTime<Utc>,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    pub network_in_mbps: f64,
    pub network_out_mbps: f64,
    pub load_1m: f64,
    pub load_5m: f64,
    pub load_15m: f64,
}

impl MetricSample {
    /// Reading for a time-series metric type.
    pub fn value_of(&self, metric: MetricType) -> f64 {
        match metric {
            MetricType::CpuUsage => self.cpu_usage,
            MetricType::MemoryUsage => self.memory_usage,
            MetricType::DiskUsage => self.disk_usage,
            MetricType::NetworkIn => self.network_in_mbps,
            MetricType::NetworkOut => self.network_out_mbps,
        }
    }

    pub fn total_traffic(&self) -> f64 {
        self.network_in_mbps + self.network_out_mbps
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    /// Owning cluster, or region when the fleet has no clusters.
    pub cluster: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_cluster: Option<String>,
    pub target_servers: Vec<String>,
    pub status: TaskStatus,
    /// Always within 0..=100.
    pub progress: u8,
    pub start_time: DateTime<Utc>,
    pub estimated_end_time: DateTime<Utc>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub server_id: String,
    pub severity: AlertSeverity,
    pub message: String,
    #[serde(default)]
    pub resolved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub metric_type: MetricType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_type: Option<ServiceType>,
}

/// Fleet-wide health classification. Derived on every query, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemHealth {
    pub overall_status: ServerStatus,
    pub total_servers: usize,
    pub healthy_servers: usize,
    pub warning_servers: usize,
    pub danger_servers: usize,
    pub offline_servers: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadBalanceStatus {
    pub is_balanced: bool,
    pub ratio: f64,
    pub server_count: usize,
    pub traffic_distribution: BTreeMap<String, f64>,
}

/// Per-status server counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub total: usize,
    pub healthy: usize,
    pub warning: usize,
    pub danger: usize,
    pub offline: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: ServerStatus) {
        self.total += 1;
        match status {
            ServerStatus::Healthy => self.healthy += 1,
            ServerStatus::Warning => self.warning += 1,
            ServerStatus::Danger => self.danger += 1,
            ServerStatus::Offline => self.offline += 1,
        }
    }
}

impl<'a> FromIterator<&'a Server> for StatusCounts {
    fn from_iter<I: IntoIterator<Item = &'a Server>>(iter: I) -> Self {
        let mut counts = StatusCounts::default();
        for server in iter {
            counts.record(server.status);
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_strings_round_trip_through_from_str() {
        for status in ServerStatus::ALL {
            assert_eq!(status.as_str().parse::<ServerStatus>().ok(), Some(*status));
        }
        assert_eq!("network_in".parse::<MetricType>().ok(), Some(MetricType::NetworkIn));
    }

    #[test]
    fn test_unknown_filter_value_is_rejected() {
        let err = "critical".parse::<AlertSeverity>().unwrap_err();
        assert!(matches!(err, FleetError::InvalidFilter(_)));
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&ServiceType::MessageQueue).unwrap();
        assert_eq!(json, "\"message_queue\"");
    }

    #[test]
    fn test_sample_value_lookup() {
        let sample = MetricSample {
            server_id: "server-001".to_string(),
            timestamp: Utc::now(),
            cpu_usage: 10.0,
            memory_usage: 20.0,
            disk_usage: 30.0,
            network_in_mbps: 4.0,
            network_out_mbps: 5.0,
            load_1m: 0.5,
            load_5m: 0.4,
            load_15m: 0.3,
        };
        assert_eq!(sample.value_of(MetricType::DiskUsage), 30.0);
        assert_eq!(sample.total_traffic(), 9.0);
    }
}
