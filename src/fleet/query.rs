//! Query filters and search.

use serde::Serialize;
use std::str::FromStr;

use super::models::*;
use super::FleetError;

/// Default number of alerts returned by a listing.
pub const DEFAULT_ALERT_LIMIT: usize = 20;
/// Default trailing window for time-series reads.
pub const DEFAULT_SERIES_MINUTES: u32 = 15;

#[derive(Debug, Clone, Default)]
pub struct ServerFilter {
    pub region: Option<String>,
    pub tag: Option<String>,
    pub status: Option<ServerStatus>,
}

impl ServerFilter {
    pub fn matches(&self, server: &Server) -> bool {
        self.region.as_ref().map_or(true, |r| &server.region == r)
            && self
                .tag
                .as_ref()
                .map_or(true, |t| server.tags.iter().any(|tag| tag == t))
            && self.status.map_or(true, |s| server.status == s)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub cluster: Option<String>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        self.status.map_or(true, |s| task.status == s)
            && self.cluster.as_ref().map_or(true, |c| &task.cluster == c)
    }
}

#[derive(Debug, Clone)]
pub struct AlertFilter {
    pub severity: Option<AlertSeverity>,
    pub limit: usize,
}

impl Default for AlertFilter {
    fn default() -> Self {
        Self {
            severity: None,
            limit: DEFAULT_ALERT_LIMIT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimeSeriesFilter {
    pub metric_type: Option<MetricType>,
    pub region: Option<String>,
    pub server_id: Option<String>,
    pub service_type: Option<ServiceType>,
    /// Trailing window measured back from the last tick.
    pub since_minutes: u32,
}

impl Default for TimeSeriesFilter {
    fn default() -> Self {
        Self {
            metric_type: None,
            region: None,
            server_id: None,
            service_type: None,
            since_minutes: DEFAULT_SERIES_MINUTES,
        }
    }
}

impl TimeSeriesFilter {
    /// Dimension match only; the time window is applied by the store.
    pub fn matches(&self, point: &TimeSeriesPoint) -> bool {
        self.metric_type.map_or(true, |m| point.metric_type == m)
            && dimension_matches(&self.region, &point.region)
            && dimension_matches(&self.server_id, &point.server_id)
            && self
                .service_type
                .map_or(true, |s| point.service_type == Some(s))
    }
}

fn dimension_matches(wanted: &Option<String>, actual: &Option<String>) -> bool {
    match wanted {
        Some(w) => actual.as_deref() == Some(w.as_str()),
        None => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchScope {
    #[default]
    All,
    Servers,
    Tasks,
    Alerts,
}

impl SearchScope {
    fn includes(self, other: SearchScope) -> bool {
        self == SearchScope::All || self == other
    }
}

impl FromStr for SearchScope {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(SearchScope::All),
            "servers" => Ok(SearchScope::Servers),
            "tasks" => Ok(SearchScope::Tasks),
            "alerts" => Ok(SearchScope::Alerts),
            other => Err(FleetError::InvalidFilter(format!(
                "unknown search type: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    pub servers: Vec<Server>,
    pub tasks: Vec<Task>,
    pub alerts: Vec<Alert>,
}

/// Case-insensitive substring search.
///
/// Servers match on name, region or any tag; tasks on name, cluster or
/// description; alerts on message or server id.
pub fn search(
    query: &str,
    scope: SearchScope,
    servers: &[Server],
    tasks: &[Task],
    alerts: &[Alert],
) -> SearchResults {
    let needle = query.to_lowercase();
    let hit = |field: &str| field.to_lowercase().contains(&needle);

    let mut results = SearchResults::default();

    if scope.includes(SearchScope::Servers) {
        results.servers = servers
            .iter()
            .filter(|s| hit(&s.name) || hit(&s.region) || s.tags.iter().any(|t| hit(t)))
            .cloned()
            .collect();
    }

    if scope.includes(SearchScope::Tasks) {
        results.tasks = tasks
            .iter()
            .filter(|t| hit(&t.name) || hit(&t.cluster) || hit(&t.description))
            .cloned()
            .collect();
    }

    if scope.includes(SearchScope::Alerts) {
        results.alerts = alerts
            .iter()
            .filter(|a| hit(&a.message) || hit(&a.server_id))
            .cloned()
            .collect();
    }

    results
}
