//! Configuration module for fleetsim.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Everything here is fixed at process start.

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors detected at startup. These abort initialization.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("fleet must contain at least one server")]
    ZeroServers,
    #[error("{field} must be positive")]
    NonPositiveCapacity { field: &'static str },
    #[error("capacity profile {index} has a non-positive field")]
    InvalidCapacityProfile { index: usize },
    #[error("at least one capacity profile is required")]
    NoCapacityProfiles,
    #[error("{clusters} clusters of {size} servers do not fit in a fleet of {servers}")]
    ClusterOverflow {
        clusters: usize,
        size: usize,
        servers: usize,
    },
    #[error("{field} must be a positive, representable duration")]
    NonPositiveInterval { field: &'static str },
    #[error("at least one region is required")]
    EmptyRegions,
    #[error("{field} must be within [0, 1]")]
    InvalidProbability { field: &'static str },
}

/// Hardware shape a generated server can be given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapacityProfile {
    pub cpu_cores: u32,
    pub memory_gb: u32,
    pub disk_gb: u32,
}

impl CapacityProfile {
    pub const fn new(cpu_cores: u32, memory_gb: u32, disk_gb: u32) -> Self {
        Self {
            cpu_cores,
            memory_gb,
            disk_gb,
        }
    }
}

/// Simulator configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// HTTP port for the web server (default: 8000)
    pub http_port: u16,
    /// Number of servers in the fleet (default: 18)
    pub server_count: usize,
    /// Number of clusters (default: 3)
    pub cluster_count: usize,
    /// Servers per cluster (default: 6)
    pub cluster_size: usize,
    /// Maximum retained alerts (default: 20)
    pub alert_capacity: usize,
    /// Maximum retained tasks (default: 20)
    pub task_capacity: usize,
    /// Maximum retained time-series points (default: 5000)
    pub series_capacity: usize,
    /// Seconds between ticks (default: 2.0)
    pub tick_interval_secs: f64,
    /// Pause after a failed tick before the schedule resumes (default: 5.0)
    pub error_backoff_secs: f64,
    /// Random seed (default: drawn at startup)
    pub seed: Option<u64>,
    /// Region names servers and clusters are placed in (default: 8 cities)
    pub regions: Vec<String>,
    /// Hardware shapes drawn per server (default: 4 profiles, 4 to 32 cores)
    pub capacity_profiles: Vec<CapacityProfile>,
    /// Chance per tick of creating a new task (default: 0.2)
    pub task_probability: f64,
    /// Chance per tick of raising a new alert (default: 0.15)
    pub alert_probability: f64,
    /// Tasks seeded at startup (default: 8)
    pub initial_tasks: usize,
    /// Backdated alerts seeded at startup (default: 15)
    pub initial_alerts: usize,
    /// Minutes of time-series history synthesized at startup (default: 15)
    pub backfill_minutes: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            http_port: 8000,
            server_count: 18,
            cluster_count: 3,
            cluster_size: 6,
            alert_capacity: 20,
            task_capacity: 20,
            series_capacity: 5000,
            tick_interval_secs: 2.0,
            error_backoff_secs: 5.0,
            seed: None,
            regions: [
                "Beijing", "Shanghai", "Guangzhou", "Shenzhen", "Hangzhou", "Chengdu", "Wuhan",
                "Xian",
            ]
            .iter()
            .map(|r| r.to_string())
            .collect(),
            capacity_profiles: vec![
                CapacityProfile::new(4, 16, 500),
                CapacityProfile::new(8, 32, 1000),
                CapacityProfile::new(16, 64, 2000),
                CapacityProfile::new(32, 128, 4000),
            ],
            task_probability: 0.2,
            alert_probability: 0.15,
            initial_tasks: 8,
            initial_alerts: 15,
            backfill_minutes: 15,
        }
    }
}

impl SimConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `FLEETSIM_HTTP_PORT`: HTTP port (default: 8000)
    /// - `FLEETSIM_SERVER_COUNT`: fleet size (default: 18)
    /// - `FLEETSIM_CLUSTER_COUNT` / `FLEETSIM_CLUSTER_SIZE`: cluster layout (default: 3 x 6)
    /// - `FLEETSIM_ALERT_CAPACITY`, `FLEETSIM_TASK_CAPACITY`, `FLEETSIM_SERIES_CAPACITY`
    /// - `FLEETSIM_TICK_INTERVAL_SECS`: tick cadence (default: 2.0)
    /// - `FLEETSIM_SEED`: random seed (default: random)
    ///
    /// Values that fail to parse are ignored and the default is kept.
    pub fn load() -> Self {
        let mut cfg = Self::default();

        override_from_env("FLEETSIM_HTTP_PORT", &mut cfg.http_port);
        override_from_env("FLEETSIM_SERVER_COUNT", &mut cfg.server_count);
        override_from_env("FLEETSIM_CLUSTER_COUNT", &mut cfg.cluster_count);
        override_from_env("FLEETSIM_CLUSTER_SIZE", &mut cfg.cluster_size);
        override_from_env("FLEETSIM_ALERT_CAPACITY", &mut cfg.alert_capacity);
        override_from_env("FLEETSIM_TASK_CAPACITY", &mut cfg.task_capacity);
        override_from_env("FLEETSIM_SERIES_CAPACITY", &mut cfg.series_capacity);
        override_from_env("FLEETSIM_TICK_INTERVAL_SECS", &mut cfg.tick_interval_secs);

        if let Ok(seed_str) = env::var("FLEETSIM_SEED") {
            match seed_str.parse() {
                Ok(seed) => cfg.seed = Some(seed),
                Err(_) => tracing::warn!("Ignoring unparsable FLEETSIM_SEED={}", seed_str),
            }
        }

        cfg
    }

    /// Check the configuration before any state is generated.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_count == 0 {
            return Err(ConfigError::ZeroServers);
        }

        for (field, value) in [
            ("alert_capacity", self.alert_capacity),
            ("task_capacity", self.task_capacity),
            ("series_capacity", self.series_capacity),
        ] {
            if value == 0 {
                return Err(ConfigError::NonPositiveCapacity { field });
            }
        }

        if self.capacity_profiles.is_empty() {
            return Err(ConfigError::NoCapacityProfiles);
        }
        if let Some(index) = self
            .capacity_profiles
            .iter()
            .position(|p| p.cpu_cores == 0 || p.memory_gb == 0 || p.disk_gb == 0)
        {
            return Err(ConfigError::InvalidCapacityProfile { index });
        }

        if self.cluster_count.saturating_mul(self.cluster_size) > self.server_count {
            return Err(ConfigError::ClusterOverflow {
                clusters: self.cluster_count,
                size: self.cluster_size,
                servers: self.server_count,
            });
        }

        if positive_duration(self.tick_interval_secs).is_none() {
            return Err(ConfigError::NonPositiveInterval {
                field: "tick_interval_secs",
            });
        }
        if positive_duration(self.error_backoff_secs).is_none() {
            return Err(ConfigError::NonPositiveInterval {
                field: "error_backoff_secs",
            });
        }

        if self.regions.is_empty() {
            return Err(ConfigError::EmptyRegions);
        }

        for (field, p) in [
            ("task_probability", self.task_probability),
            ("alert_probability", self.alert_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::InvalidProbability { field });
            }
        }

        Ok(())
    }

    /// Tick cadence. Falls back to the default on a value `validate` rejects.
    pub fn tick_interval(&self) -> Duration {
        positive_duration(self.tick_interval_secs).unwrap_or(DEFAULT_TICK_INTERVAL)
    }

    pub fn error_backoff(&self) -> Duration {
        positive_duration(self.error_backoff_secs).unwrap_or(DEFAULT_ERROR_BACKOFF)
    }
}

const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Seconds as a non-zero `Duration`, or `None` if out of range or zero after
/// conversion.
fn positive_duration(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|d| !d.is_zero())
}

fn override_from_env<T: FromStr>(key: &str, slot: &mut T) {
    if let Ok(raw) = env::var(key) {
        match raw.parse() {
            Ok(value) => *slot = value,
            Err(_) => tracing::warn!("Ignoring unparsable {}={}", key, raw),
        }
    }
}
