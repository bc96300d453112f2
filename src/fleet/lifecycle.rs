//! Tick-driven lifecycle: task progress, new tasks and alerts, time-series.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::prelude::*;

use super::metrics::sample_metrics;
use super::models::*;
use super::store::FleetState;
use super::FleetError;

/// Chance per tick that a pending task starts running.
const TASK_START_PROBABILITY: f64 = 0.1;
/// Chance per tick that a running task fails.
const TASK_FAILURE_PROBABILITY: f64 = 0.01;

const TASK_TEMPLATES: &[(&str, &str)] = &[
    ("Server performance monitoring", "Monitor server CPU, memory and disk usage"),
    ("Network traffic analysis", "Analyze network traffic patterns and anomalies"),
    ("Security scan", "Scan servers for vulnerabilities and threats"),
    ("Database backup", "Back up critical database data"),
    ("Log collection", "Collect and organize system logs"),
    ("System update rollout", "Deploy system updates and security patches"),
    ("Load balancer check", "Check load balancer status and configuration"),
    ("Cache cleanup", "Purge expired cache entries"),
];

const ALERT_MESSAGES: &[&str] = &[
    "CPU usage above 90%",
    "Memory usage above 85%",
    "Disk space low",
    "Network latency high",
    "Too many database connections",
    "Service response time too long",
    "System load too high",
    "Disk I/O anomaly",
    "Network connection lost",
    "Process not responding",
    "Memory leak detected",
    "Firewall rule anomaly",
];

/// Probabilities that drive each tick.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleParams {
    pub task_probability: f64,
    pub alert_probability: f64,
}

/// What one tick changed.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub generation: u64,
    pub tasks_started: usize,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    pub new_task: Option<String>,
    pub new_alert: Option<String>,
    pub points_appended: usize,
    pub evicted: usize,
}

impl FleetState {
    /// Advance the simulation by one tick at time `now`.
    ///
    /// Always runs the same steps in order; buffers are bounded on append so
    /// none is above capacity when this returns.
    pub fn advance(
        &mut self,
        params: &LifecycleParams,
        now: DateTime<Utc>,
    ) -> Result<TickReport, FleetError> {
        if self.servers.is_empty() {
            return Err(FleetError::TransientGeneration(
                "fleet has no servers".to_string(),
            ));
        }

        self.generation += 1;
        self.clock = now;
        let mut report = TickReport {
            generation: self.generation,
            ..Default::default()
        };

        self.advance_tasks(&mut report);

        if self.rng.gen_bool(params.task_probability) {
            let task = self.spawn_task(now, false);
            report.new_task = Some(task.id.clone());
            report.evicted += self.tasks.push(task);
        }

        if self.rng.gen_bool(params.alert_probability) {
            let alert = self.raise_alert(now);
            report.new_alert = Some(alert.id.clone());
            report.evicted += self.alerts.push(alert);
        }

        let points = self.sample_series(now);
        report.points_appended = points.len();
        report.evicted += self.series.extend(points);

        for server in &mut self.servers {
            if server.status != ServerStatus::Offline {
                server.last_seen = now;
            }
        }

        Ok(report)
    }

    fn advance_tasks(&mut self, report: &mut TickReport) {
        for task in self.tasks.iter_mut() {
            match task.status {
                TaskStatus::Running => {
                    if self.rng.gen_bool(TASK_FAILURE_PROBABILITY) {
                        task.status = TaskStatus::Failed;
                        report.tasks_failed += 1;
                        continue;
                    }
                    let step: u8 = self.rng.gen_range(1..=5);
                    task.progress = task.progress.saturating_add(step).min(100);
                    if task.progress >= 100 {
                        task.status = TaskStatus::Completed;
                        report.tasks_completed += 1;
                    }
                }
                TaskStatus::Pending => {
                    if self.rng.gen_bool(TASK_START_PROBABILITY) {
                        task.status = TaskStatus::Running;
                        report.tasks_started += 1;
                    }
                }
                TaskStatus::Completed | TaskStatus::Failed => {}
            }
        }
    }

    /// Build a new task. `seeding` tasks get a backdated start and a mix of
    /// statuses; tick-spawned tasks start now as pending or freshly running.
    pub(crate) fn spawn_task(&mut self, now: DateTime<Utc>, seeding: bool) -> Task {
        self.next_task_id += 1;
        let id = format!("task-{:03}", self.next_task_id);

        let rng = &mut self.rng;
        let &(name, description) = TASK_TEMPLATES
            .choose(rng)
            .unwrap_or(&TASK_TEMPLATES[0]);

        let cluster = match self.clusters.choose(rng) {
            Some(c) => c.id.clone(),
            None => self
                .servers
                .choose(rng)
                .map(|s| s.region.clone())
                .unwrap_or_default(),
        };
        let target_cluster = self.clusters.choose(rng).map(|c| c.id.clone());

        let wanted = rng.gen_range(3..=8usize).min(self.servers.len());
        let target_servers = self
            .servers
            .choose_multiple(rng, wanted)
            .map(|s| s.id.clone())
            .collect();

        let (status, progress, start_time) = if seeding {
            let start = now - ChronoDuration::hours(rng.gen_range(1..=12));
            match rng.gen_range(0..3) {
                0 => (TaskStatus::Running, rng.gen_range(0..100), start),
                1 => (TaskStatus::Completed, 100, start),
                _ => (TaskStatus::Pending, 0, start),
            }
        } else if rng.gen_bool(0.5) {
            (TaskStatus::Running, rng.gen_range(0..=20), now)
        } else {
            (TaskStatus::Pending, 0, now)
        };

        Task {
            id,
            name: name.to_string(),
            cluster,
            target_cluster,
            target_servers,
            status,
            progress,
            start_time,
            estimated_end_time: start_time + ChronoDuration::minutes(rng.gen_range(30..=120)),
            description: description.to_string(),
        }
    }

    /// Build a new alert against a random server, stamped `timestamp`.
    pub(crate) fn raise_alert(&mut self, timestamp: DateTime<Utc>) -> Alert {
        self.next_alert_id += 1;
        let id = format!("alert-{:03}", self.next_alert_id);

        let rng = &mut self.rng;
        let (server_id, status) = match self.servers.choose(rng) {
            Some(s) => (s.id.clone(), s.status),
            None => (String::new(), ServerStatus::Healthy),
        };

        let severity = match status {
            ServerStatus::Danger => AlertSeverity::High,
            ServerStatus::Warning if rng.gen_bool(0.5) => AlertSeverity::High,
            ServerStatus::Warning => AlertSeverity::Medium,
            _ => *AlertSeverity::ALL.choose(rng).unwrap_or(&AlertSeverity::Low),
        };

        Alert {
            id,
            timestamp,
            server_id,
            severity,
            message: ALERT_MESSAGES
                .choose(rng)
                .unwrap_or(&ALERT_MESSAGES[0])
                .to_string(),
            resolved: false,
        }
    }

    /// One point per metric type and server, all stamped `at`.
    pub(crate) fn sample_series(&mut self, at: DateTime<Utc>) -> Vec<TimeSeriesPoint> {
        let mut points = Vec::with_capacity(self.servers.len() * MetricType::ALL.len());
        for server in &self.servers {
            let sample = sample_metrics(server, &mut self.rng, at);
            for metric in MetricType::ALL {
                points.push(TimeSeriesPoint {
                    timestamp: at,
                    value: sample.value_of(*metric),
                    metric_type: *metric,
                    server_id: Some(server.id.clone()),
                    region: Some(server.region.clone()),
                    service_type: Some(server.service_type),
                });
            }
        }
        points
    }

    /// Fill the time-series buffer with history ending at `end`, one batch
    /// per `step`. Batches that would be evicted immediately are skipped.
    pub(crate) fn backfill_series(
        &mut self,
        end: DateTime<Utc>,
        span: ChronoDuration,
        step: ChronoDuration,
    ) {
        let per_batch = self.servers.len() * MetricType::ALL.len();
        if per_batch == 0 || step <= ChronoDuration::zero() {
            return;
        }

        let max_batches = (self.series.capacity() / per_batch + 1) as i32;
        let wanted = (span.num_milliseconds() / step.num_milliseconds().max(1)) as i32;
        let batches = wanted.min(max_batches);

        for i in (0..=batches).rev() {
            let at = end - step * i;
            let points = self.sample_series(at);
            self.series.extend(points);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::store::tests::{test_server, test_state};

    const PARAMS: LifecycleParams = LifecycleParams {
        task_probability: 1.0,
        alert_probability: 1.0,
    };

    fn running_task(id: &str, progress: u8) -> Task {
        let now = Utc::now();
        Task {
            id: id.to_string(),
            name: "Cache cleanup".to_string(),
            cluster: "cluster-1".to_string(),
            target_cluster: None,
            target_servers: vec![],
            status: TaskStatus::Running,
            progress,
            start_time: now,
            estimated_end_time: now,
            description: String::new(),
        }
    }

    #[test]
    fn test_tick_keeps_buffers_within_capacity() {
        let mut state = test_state(vec![
            test_server("server-001", ServerStatus::Healthy),
            test_server("server-002", ServerStatus::Danger),
        ]);
        for _ in 0..200 {
            state.advance(&PARAMS, Utc::now()).unwrap();
            assert!(state.tasks.len() <= state.tasks.capacity());
            assert!(state.alerts.len() <= state.alerts.capacity());
            assert!(state.series.len() <= state.series.capacity());
        }
        assert_eq!(state.alerts.len(), state.alerts.capacity());
    }

    #[test]
    fn test_running_progress_is_non_decreasing() {
        let mut state = test_state(vec![test_server("server-001", ServerStatus::Healthy)]);
        state.tasks.push(running_task("task-a", 0));
        let quiet = LifecycleParams {
            task_probability: 0.0,
            alert_probability: 0.0,
        };

        let mut last = 0;
        for _ in 0..150 {
            state.advance(&quiet, Utc::now()).unwrap();
            let task = state.tasks.iter().find(|t| t.id == "task-a").unwrap().clone();
            if task.status == TaskStatus::Failed {
                break;
            }
            assert!(task.progress >= last);
            assert!(task.progress <= 100);
            last = task.progress;
        }
    }

    #[test]
    fn test_reaching_100_completes_in_same_tick() {
        let mut state = test_state(vec![test_server("server-001", ServerStatus::Healthy)]);
        let quiet = LifecycleParams {
            task_probability: 0.0,
            alert_probability: 0.0,
        };
        for seed in 0..50 {
            state.tasks = crate::fleet::HistoryBuffer::new(20);
            state.rng = StdRng::seed_from_u64(seed);
            state.tasks.push(running_task("task-a", 99));
            state.advance(&quiet, Utc::now()).unwrap();
            let task = state.tasks.iter().next().unwrap();
            if task.status != TaskStatus::Failed {
                assert_eq!(task.progress, 100);
                assert_eq!(task.status, TaskStatus::Completed);
            }
        }
    }

    #[test]
    fn test_tick_on_empty_fleet_is_transient_error() {
        let mut state = test_state(vec![]);
        let err = state.advance(&PARAMS, Utc::now()).unwrap_err();
        assert!(matches!(err, FleetError::TransientGeneration(_)));
        assert_eq!(state.generation, 0);
    }

    #[test]
    fn test_series_covers_every_metric_and_server() {
        let mut state = test_state(vec![
            test_server("server-001", ServerStatus::Healthy),
            test_server("server-002", ServerStatus::Offline),
        ]);
        let report = state.advance(&PARAMS, Utc::now()).unwrap();
        assert_eq!(report.points_appended, 2 * MetricType::ALL.len());
        for metric in MetricType::ALL {
            let n = state.series.iter().filter(|p| p.metric_type == *metric).count();
            assert_eq!(n, 2);
        }
    }

    #[test]
    fn test_alert_severity_tracks_server_status() {
        let mut state = test_state(vec![test_server("server-001", ServerStatus::Danger)]);
        for _ in 0..20 {
            let alert = state.raise_alert(Utc::now());
            assert_eq!(alert.server_id, "server-001");
            assert_eq!(alert.severity, AlertSeverity::High);
            assert!(!alert.resolved);
        }
    }

    #[test]
    fn test_task_ids_are_unique() {
        let mut state = test_state(vec![test_server("server-001", ServerStatus::Healthy)]);
        let a = state.spawn_task(Utc::now(), true);
        let b = state.spawn_task(Utc::now(), false);
        assert_ne!(a.id, b.id);
        assert_eq!(a.target_servers, vec!["server-001".to_string()]);
        if a.status == TaskStatus::Completed {
            assert_eq!(a.progress, 100);
        }
    }
}
