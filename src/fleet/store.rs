//! In-memory fleet store.
//!
//! All mutable simulator state lives in one `FleetState` behind a single
//! `RwLock`. `tick` is the only writer; every query takes a read guard,
//! copies what it needs and computes from that copy.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::aggregate::*;
use super::catalog::generate_fleet;
use super::history::HistoryBuffer;
use super::lifecycle::{LifecycleParams, TickReport};
use super::metrics::sample_metrics;
use super::models::*;
use super::query::*;
use super::FleetError;
use crate::config::{ConfigError, SimConfig};

/// Alerts carried by the dashboard snapshot.
const DASHBOARD_ALERTS: usize = 10;
/// Time-series points carried by the dashboard snapshot.
const DASHBOARD_POINTS: usize = 500;

/// The mutable simulator state guarded by `FleetStore`.
#[derive(Debug)]
pub struct FleetState {
    pub(super) servers: Vec<Server>,
    pub(super) clusters: Vec<Cluster>,
    pub(super) tasks: HistoryBuffer<Task>,
    pub(super) alerts: HistoryBuffer<Alert>,
    pub(super) series: HistoryBuffer<TimeSeriesPoint>,
    pub(super) rng: StdRng,
    pub(super) seed: u64,
    /// Number of completed ticks.
    pub(super) generation: u64,
    /// Time of the last tick; anchors read-side timestamps and windows.
    pub(super) clock: DateTime<Utc>,
    pub(super) next_task_id: u64,
    pub(super) next_alert_id: u64,
}

/// Buffer capacities for a new state.
#[derive(Debug, Clone, Copy)]
pub struct Capacities {
    pub tasks: usize,
    pub alerts: usize,
    pub series: usize,
}

impl From<&SimConfig> for Capacities {
    fn from(cfg: &SimConfig) -> Self {
        Self {
            tasks: cfg.task_capacity,
            alerts: cfg.alert_capacity,
            series: cfg.series_capacity,
        }
    }
}

/// Current and maximum sizes of the history buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BufferSizes {
    pub tasks: usize,
    pub alerts: usize,
    pub series: usize,
}

/// Everything the dashboard view needs, read under one guard.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub clusters: Vec<Cluster>,
    pub servers: Vec<Server>,
    pub metrics: Vec<MetricSample>,
    pub tasks: Vec<Task>,
    pub alerts: Vec<Alert>,
    pub system_health: SystemHealth,
    pub load_balance: LoadBalanceStatus,
    pub time_series: Vec<TimeSeriesPoint>,
    pub grouped_data: GroupedRollup,
}

impl FleetState {
    pub fn new(
        servers: Vec<Server>,
        clusters: Vec<Cluster>,
        capacities: Capacities,
        seed: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            servers,
            clusters,
            tasks: HistoryBuffer::new(capacities.tasks),
            alerts: HistoryBuffer::new(capacities.alerts),
            series: HistoryBuffer::new(capacities.series),
            rng: StdRng::seed_from_u64(seed),
            seed,
            generation: 0,
            clock: now,
            next_task_id: 0,
            next_alert_id: 0,
        }
    }

    /// RNG for read-side sampling. Fixed for a given tick generation and
    /// salt, so repeated reads between ticks agree.
    fn read_rng(&self, salt: u64) -> StdRng {
        let mixed = self
            .seed
            .wrapping_add(self.generation.wrapping_mul(0x9E37_79B9_7F4A_7C15))
            .wrapping_add(salt.wrapping_mul(0xBF58_476D_1CE4_E5B9));
        StdRng::seed_from_u64(mixed)
    }

    fn sample_at(&self, index: usize) -> MetricSample {
        let mut rng = self.read_rng(index as u64 + 1);
        sample_metrics(&self.servers[index], &mut rng, self.clock)
    }

    fn all_metrics(&self) -> Vec<MetricSample> {
        (0..self.servers.len()).map(|i| self.sample_at(i)).collect()
    }

    fn health(&self) -> SystemHealth {
        compute_health(&self.servers, self.clock)
    }

    fn load_balance(&self) -> LoadBalanceStatus {
        let traffic = self
            .servers
            .iter()
            .enumerate()
            .filter(|(_, s)| s.status != ServerStatus::Offline)
            .map(|(i, s)| (s.id.clone(), self.sample_at(i).total_traffic()));
        compute_load_balance(traffic)
    }

    fn alerts_newest_first(
        &self,
        severity: Option<AlertSeverity>,
        limit: Option<usize>,
    ) -> Vec<Alert> {
        let mut alerts = self
            .alerts
            .snapshot(None, |a| severity.map_or(true, |s| a.severity == s));
        // Stable sort keeps insertion order among equal timestamps.
        alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = limit {
            alerts.truncate(limit);
        }
        alerts
    }

    fn series_matching(&self, filter: &TimeSeriesFilter) -> Vec<TimeSeriesPoint> {
        let cutoff = self.clock - ChronoDuration::minutes(filter.since_minutes as i64);
        self.series
            .snapshot(None, |p| p.timestamp >= cutoff && filter.matches(p))
    }
}

/// Thread-safe owner of the simulated fleet.
#[derive(Debug)]
pub struct FleetStore {
    state: RwLock<FleetState>,
    params: LifecycleParams,
}

impl FleetStore {
    /// Generate a fleet from `cfg` and seed its history.
    pub fn new(cfg: &SimConfig) -> Result<Self, ConfigError> {
        Self::new_at(cfg, Utc::now())
    }

    pub fn new_at(cfg: &SimConfig, now: DateTime<Utc>) -> Result<Self, ConfigError> {
        let seed = cfg.seed.unwrap_or_else(rand::random);
        let mut catalog_rng = StdRng::seed_from_u64(seed);
        let (servers, clusters) = generate_fleet(cfg, &mut catalog_rng, now)?;

        let mut state = FleetState::new(servers, clusters, Capacities::from(cfg), seed, now);

        for _ in 0..cfg.initial_tasks {
            let task = state.spawn_task(now, true);
            state.tasks.push(task);
        }
        for _ in 0..cfg.initial_alerts {
            let backdate = ChronoDuration::minutes(state.rng.gen_range(5..=120));
            let alert = state.raise_alert(now - backdate);
            state.alerts.push(alert);
        }
        state.backfill_series(
            now,
            ChronoDuration::minutes(cfg.backfill_minutes as i64),
            ChronoDuration::milliseconds((cfg.tick_interval_secs * 1000.0) as i64),
        );

        tracing::info!(
            "Fleet generated: {} servers, {} clusters, seed {}",
            state.servers.len(),
            state.clusters.len(),
            seed
        );

        Ok(Self::from_state(state, cfg))
    }

    /// Wrap an existing state. No validation; an empty fleet is allowed and
    /// makes every tick fail.
    pub fn from_state(state: FleetState, cfg: &SimConfig) -> Self {
        Self {
            state: RwLock::new(state),
            params: LifecycleParams {
                task_probability: cfg.task_probability,
                alert_probability: cfg.alert_probability,
            },
        }
    }

    // A tick never leaves the state half-updated, so a poisoned lock is still usable.
    fn read(&self) -> RwLockReadGuard<'_, FleetState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, FleetState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // --- Mutation ---

    /// Advance the simulation by one tick.
    pub fn tick(&self) -> Result<TickReport, FleetError> {
        self.tick_at(Utc::now())
    }

    pub fn tick_at(&self, now: DateTime<Utc>) -> Result<TickReport, FleetError> {
        let params = self.params;
        self.write().advance(&params, now)
    }

    // --- Queries ---

    pub fn seed(&self) -> u64 {
        self.read().seed
    }

    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    pub fn buffer_sizes(&self) -> BufferSizes {
        let state = self.read();
        BufferSizes {
            tasks: state.tasks.len(),
            alerts: state.alerts.len(),
            series: state.series.len(),
        }
    }

    pub fn buffer_capacities(&self) -> BufferSizes {
        let state = self.read();
        BufferSizes {
            tasks: state.tasks.capacity(),
            alerts: state.alerts.capacity(),
            series: state.series.capacity(),
        }
    }

    pub fn list_servers(&self, filter: &ServerFilter) -> Vec<Server> {
        self.read()
            .servers
            .iter()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect()
    }

    pub fn list_clusters(&self) -> Vec<Cluster> {
        self.read().clusters.clone()
    }

    /// Sample current metrics for one server.
    pub fn get_metrics(&self, server_id: &str) -> Result<MetricSample, FleetError> {
        let state = self.read();
        let index = state
            .servers
            .iter()
            .position(|s| s.id == server_id)
            .ok_or_else(|| FleetError::server_not_found(server_id))?;
        Ok(state.sample_at(index))
    }

    pub fn list_metrics(&self) -> Vec<MetricSample> {
        self.read().all_metrics()
    }

    pub fn list_tasks(&self, filter: &TaskFilter) -> Vec<Task> {
        self.read().tasks.snapshot(None, |t| filter.matches(t))
    }

    pub fn get_task(&self, task_id: &str) -> Result<Task, FleetError> {
        self.read()
            .tasks
            .iter()
            .find(|t| t.id == task_id)
            .cloned()
            .ok_or_else(|| FleetError::task_not_found(task_id))
    }

    /// Alerts ordered newest timestamp first.
    pub fn list_alerts(&self, filter: &AlertFilter) -> Vec<Alert> {
        self.read()
            .alerts_newest_first(filter.severity, Some(filter.limit))
    }

    pub fn get_health(&self) -> SystemHealth {
        self.read().health()
    }

    pub fn get_load_balance(&self) -> LoadBalanceStatus {
        self.read().load_balance()
    }

    /// Points inside the trailing window, oldest first.
    pub fn get_time_series(&self, filter: &TimeSeriesFilter) -> Vec<TimeSeriesPoint> {
        self.read().series_matching(filter)
    }

    pub fn summarize_time_series(&self, filter: &TimeSeriesFilter) -> Vec<SeriesSummary> {
        let points = self.get_time_series(filter);
        summarize_series(&points)
    }

    pub fn group_by(&self, dimension: GroupDimension) -> BTreeMap<String, ServerGroup> {
        group_by(&self.read().servers, dimension)
    }

    pub fn get_grouped(&self) -> GroupedRollup {
        grouped_rollup(&self.read().servers)
    }

    pub fn get_stats(&self) -> FleetStats {
        let state = self.read();
        let hour_ago = state.clock - ChronoDuration::hours(1);
        let running = state
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Running)
            .count();
        let recent = state.alerts.iter().filter(|a| a.timestamp > hour_ago).count();
        fleet_stats(&state.servers, running, recent, state.load_balance().ratio)
    }

    pub fn get_dashboard(&self) -> DashboardSnapshot {
        let state = self.read();
        DashboardSnapshot {
            clusters: state.clusters.clone(),
            servers: state.servers.clone(),
            metrics: state.all_metrics(),
            tasks: state.tasks.snapshot(None, |_| true),
            alerts: state.alerts_newest_first(None, Some(DASHBOARD_ALERTS)),
            system_health: state.health(),
            load_balance: state.load_balance(),
            time_series: state.series.snapshot(Some(DASHBOARD_POINTS), |_| true),
            grouped_data: grouped_rollup(&state.servers),
        }
    }

    /// Case-insensitive substring search over servers, tasks and alerts.
    pub fn search(&self, query: &str, scope: SearchScope) -> SearchResults {
        let state = self.read();
        let tasks = state.tasks.snapshot(None, |_| true);
        let alerts = state.alerts_newest_first(None, None);
        search(query, scope, &state.servers, &tasks, &alerts)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    pub(crate) fn test_server(id: &str, status: ServerStatus) -> Server {
        Server {
            id: id.to_string(),
            name: format!("Beijing-web-{}", id),
            region: "Beijing".to_string(),
            service_type: ServiceType::Web,
            cluster_id: None,
            tags: vec!["Beijing".to_string(), "web".to_string()],
            status,
            ip_address: "192.168.0.1".to_string(),
            cpu_cores: 8,
            memory_gb: 32,
            disk_gb: 1000,
            last_seen: Utc::now(),
        }
    }

    pub(crate) fn test_state(servers: Vec<Server>) -> FleetState {
        FleetState::new(
            servers,
            vec![],
            Capacities {
                tasks: 20,
                alerts: 20,
                series: 50,
            },
            42,
            Utc::now(),
        )
    }

    fn seeded_config() -> SimConfig {
        SimConfig {
            seed: Some(7),
            series_capacity: 400,
            ..Default::default()
        }
    }

    fn seeded_store() -> FleetStore {
        assert_ok!(FleetStore::new_at(&seeded_config(), Utc::now()))
    }

    #[test]
    fn test_new_store_is_seeded_and_bounded() {
        let cfg = seeded_config();
        let store = seeded_store();
        let sizes = store.buffer_sizes();
        assert_eq!(sizes.tasks, cfg.initial_tasks);
        assert_eq!(sizes.alerts, cfg.initial_alerts);
        assert_eq!(sizes.series, cfg.series_capacity);
        assert_eq!(store.seed(), 7);
    }

    #[test]
    fn test_invalid_config_aborts() {
        let cfg = SimConfig {
            alert_capacity: 0,
            ..seeded_config()
        };
        assert_err!(FleetStore::new(&cfg));
    }

    #[test]
    fn test_buffers_bounded_after_every_tick() {
        let store = seeded_store();
        let caps = store.buffer_capacities();
        let start = Utc::now();
        for i in 0..100 {
            assert_ok!(store.tick_at(start + ChronoDuration::seconds(2 * i)));
            let sizes = store.buffer_sizes();
            assert!(sizes.tasks <= caps.tasks);
            assert!(sizes.alerts <= caps.alerts);
            assert!(sizes.series <= caps.series);
        }
        assert_eq!(store.generation(), 100);
    }

    #[test]
    fn test_reads_are_idempotent_between_ticks() {
        let store = seeded_store();
        store.tick().unwrap();

        assert_eq!(store.get_metrics("server-001"), store.get_metrics("server-001"));
        assert_eq!(store.list_metrics(), store.list_metrics());
        assert_eq!(store.get_health(), store.get_health());
        assert_eq!(store.get_load_balance(), store.get_load_balance());
        let alerts = AlertFilter::default();
        assert_eq!(store.list_alerts(&alerts), store.list_alerts(&alerts));
        let series = TimeSeriesFilter::default();
        assert_eq!(store.get_time_series(&series), store.get_time_series(&series));
        assert_eq!(
            store.search("server", SearchScope::All),
            store.search("server", SearchScope::All)
        );
    }

    #[test]
    fn test_unknown_ids_are_not_found() {
        let store = seeded_store();
        assert_eq!(
            store.get_metrics("server-999"),
            Err(FleetError::server_not_found("server-999"))
        );
        assert!(matches!(
            store.get_task("task-999"),
            Err(FleetError::NotFound { kind: "task", .. })
        ));
        let first = store.list_tasks(&TaskFilter::default())[0].clone();
        assert_eq!(store.get_task(&first.id), Ok(first));
    }

    #[test]
    fn test_alerts_newest_first_regardless_of_insertion() {
        let now = Utc::now();
        let mut state = test_state(vec![test_server("server-001", ServerStatus::Healthy)]);
        for minutes in [30, 5, 60, 1, 15] {
            let alert = state.raise_alert(now - ChronoDuration::minutes(minutes));
            state.alerts.push(alert);
        }
        let store = FleetStore::from_state(state, &SimConfig::default());

        let alerts = store.list_alerts(&AlertFilter::default());
        assert_eq!(alerts.len(), 5);
        for pair in alerts.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
        let limited = store.list_alerts(&AlertFilter {
            severity: None,
            limit: 2,
        });
        assert_eq!(limited, alerts[..2].to_vec());
    }

    #[test]
    fn test_time_series_window_and_filters() {
        let start = Utc::now();
        let mut state = test_state(vec![test_server("server-001", ServerStatus::Healthy)]);
        state.series = HistoryBuffer::new(1000);
        let store = FleetStore::from_state(state, &SimConfig::default());
        for minute in 0..10 {
            store.tick_at(start + ChronoDuration::minutes(minute)).unwrap();
        }

        let recent = store.get_time_series(&TimeSeriesFilter {
            metric_type: Some(MetricType::CpuUsage),
            since_minutes: 3,
            ..Default::default()
        });
        // Ticks at minutes 6, 7, 8 and 9 fall inside the 3 minute window ending at 9.
        assert_eq!(recent.len(), 4);
        assert!(recent.iter().all(|p| p.metric_type == MetricType::CpuUsage));

        let elsewhere = store.get_time_series(&TimeSeriesFilter {
            region: Some("Shanghai".to_string()),
            ..Default::default()
        });
        assert!(elsewhere.is_empty());

        let summary = store.summarize_time_series(&TimeSeriesFilter::default());
        assert_eq!(summary.len(), MetricType::ALL.len());
    }

    #[test]
    fn test_all_offline_fleet_has_neutral_load_balance() {
        let state = test_state(vec![
            test_server("server-001", ServerStatus::Offline),
            test_server("server-002", ServerStatus::Offline),
        ]);
        let store = FleetStore::from_state(state, &SimConfig::default());
        let lb = store.get_load_balance();
        assert_eq!(lb.server_count, 0);
        assert!(lb.is_balanced);
        assert_eq!(lb.ratio, 1.0);
    }

    #[test]
    fn test_search_by_unique_region() {
        let mut a = test_server("server-001", ServerStatus::Healthy);
        a.region = "Chengdu".to_string();
        let b = test_server("server-002", ServerStatus::Healthy);
        let store = FleetStore::from_state(test_state(vec![a, b]), &SimConfig::default());

        let results = store.search("CHENGDU", SearchScope::All);
        assert_eq!(results.servers.len(), 1);
        assert_eq!(results.servers[0].id, "server-001");
        assert!(results.tasks.is_empty());
        assert!(results.alerts.is_empty());
    }

    #[test]
    fn test_dashboard_is_consistent() {
        let store = seeded_store();
        let dash = store.get_dashboard();
        assert_eq!(dash.servers.len(), dash.metrics.len());
        assert!(dash.alerts.len() <= DASHBOARD_ALERTS);
        assert!(dash.time_series.len() <= DASHBOARD_POINTS);
        assert_eq!(dash.system_health.total_servers, dash.servers.len());
    }

    #[test]
    fn test_stats_counts_fleet() {
        let store = seeded_store();
        let stats = store.get_stats();
        assert_eq!(stats.total_servers, 18);
        assert_eq!(stats.servers_by_status.values().sum::<usize>(), 18);
        assert_eq!(stats.servers_by_region.values().sum::<usize>(), 18);
    }
}
