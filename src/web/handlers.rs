//! HTTP request handlers.

use super::AppState;
use crate::fleet::{
    AlertFilter, BufferSizes, FleetError, FleetStore, GroupDimension, SearchScope, ServerFilter,
    TaskFilter, TimeSeriesFilter, DEFAULT_ALERT_LIMIT, DEFAULT_SERIES_MINUTES,
};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// Helpers
// ============================================================================

/// Parse an optional query-string value. Missing and empty values both mean
/// "no filter".
fn parse_opt<T>(raw: Option<&str>) -> Result<Option<T>, FleetError>
where
    T: FromStr<Err = FleetError>,
{
    match raw {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some),
    }
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.filter(|s| !s.is_empty())
}

fn error_response(err: FleetError) -> Response {
    let status = match err {
        FleetError::NotFound { .. } => StatusCode::NOT_FOUND,
        FleetError::InvalidFilter(_) => StatusCode::BAD_REQUEST,
        FleetError::TransientGeneration(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, err.to_string()).into_response()
}

// ============================================================================
// Index & dashboard
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub seed: u64,
    pub generation: u64,
    pub buffer_sizes: BufferSizes,
    pub buffer_capacities: BufferSizes,
}

impl ServiceInfo {
    fn from_store(store: &FleetStore) -> Self {
        Self {
            service: "fleetsim",
            version: env!("CARGO_PKG_VERSION"),
            seed: store.seed(),
            generation: store.generation(),
            buffer_sizes: store.buffer_sizes(),
            buffer_capacities: store.buffer_capacities(),
        }
    }
}

pub async fn handle_index(State(state): State<AppState>) -> impl IntoResponse {
    Json(ServiceInfo::from_store(&state.store))
}

pub async fn handle_dashboard(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.get_dashboard())
}

// ============================================================================
// API: Inventory & metrics
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ServersQuery {
    pub region: Option<String>,
    pub tag: Option<String>,
    pub status: Option<String>,
}

impl ServersQuery {
    fn into_filter(self) -> Result<ServerFilter, FleetError> {
        Ok(ServerFilter {
            status: parse_opt(self.status.as_deref())?,
            region: non_empty(self.region),
            tag: non_empty(self.tag),
        })
    }
}

pub async fn handle_get_servers(
    State(state): State<AppState>,
    Query(query): Query<ServersQuery>,
) -> Response {
    match query.into_filter() {
        Ok(filter) => Json(state.store.list_servers(&filter)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_get_server_metrics(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match state.store.get_metrics(&id) {
        Ok(sample) => Json(sample).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_get_metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.list_metrics())
}

pub async fn handle_get_clusters(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.list_clusters())
}

// ============================================================================
// API: Tasks & alerts
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct TasksQuery {
    pub status: Option<String>,
    pub cluster: Option<String>,
}

impl TasksQuery {
    fn into_filter(self) -> Result<TaskFilter, FleetError> {
        Ok(TaskFilter {
            status: parse_opt(self.status.as_deref())?,
            cluster: non_empty(self.cluster),
        })
    }
}

pub async fn handle_get_tasks(
    State(state): State<AppState>,
    Query(query): Query<TasksQuery>,
) -> Response {
    match query.into_filter() {
        Ok(filter) => Json(state.store.list_tasks(&filter)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_get_task(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.store.get_task(&id) {
        Ok(task) => Json(task).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertsQuery {
    pub severity: Option<String>,
    pub limit: Option<usize>,
}

impl AlertsQuery {
    fn into_filter(self) -> Result<AlertFilter, FleetError> {
        Ok(AlertFilter {
            severity: parse_opt(self.severity.as_deref())?,
            limit: self.limit.unwrap_or(DEFAULT_ALERT_LIMIT),
        })
    }
}

pub async fn handle_get_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> Response {
    match query.into_filter() {
        Ok(filter) => Json(state.store.list_alerts(&filter)).into_response(),
        Err(e) => error_response(e),
    }
}

// ============================================================================
// API: Aggregates
// ============================================================================

pub async fn handle_get_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.get_health())
}

pub async fn handle_get_load_balance(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.get_load_balance())
}

#[derive(Debug, Default, Deserialize)]
pub struct TimeSeriesQuery {
    pub metric_type: Option<String>,
    pub region: Option<String>,
    pub server_id: Option<String>,
    pub service_type: Option<String>,
    pub minutes: Option<u32>,
}

impl TimeSeriesQuery {
    fn into_filter(self) -> Result<TimeSeriesFilter, FleetError> {
        Ok(TimeSeriesFilter {
            metric_type: parse_opt(self.metric_type.as_deref())?,
            service_type: parse_opt(self.service_type.as_deref())?,
            region: non_empty(self.region),
            server_id: non_empty(self.server_id),
            since_minutes: self.minutes.unwrap_or(DEFAULT_SERIES_MINUTES),
        })
    }
}

pub async fn handle_get_time_series(
    State(state): State<AppState>,
    Query(query): Query<TimeSeriesQuery>,
) -> Response {
    match query.into_filter() {
        Ok(filter) => Json(state.store.get_time_series(&filter)).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_get_time_series_summary(
    State(state): State<AppState>,
    Query(query): Query<TimeSeriesQuery>,
) -> Response {
    match query.into_filter() {
        Ok(filter) => Json(state.store.summarize_time_series(&filter)).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct GroupedQuery {
    pub by: Option<String>,
}

/// Without `by`, every partition is returned at once.
pub async fn handle_get_grouped(
    State(state): State<AppState>,
    Query(query): Query<GroupedQuery>,
) -> Response {
    match parse_opt::<GroupDimension>(query.by.as_deref()) {
        Ok(Some(dimension)) => Json(state.store.group_by(dimension)).into_response(),
        Ok(None) => Json(state.store.get_grouped()).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn handle_get_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.get_stats())
}

// ============================================================================
// API: Search
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    #[serde(rename = "type")]
    pub scope: Option<String>,
}

pub async fn handle_search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Response {
    let Some(q) = non_empty(query.q) else {
        return (StatusCode::BAD_REQUEST, "Missing search query").into_response();
    };

    match parse_opt::<SearchScope>(query.scope.as_deref()) {
        Ok(scope) => Json(state.store.search(&q, scope.unwrap_or_default())).into_response(),
        Err(e) => error_response(e),
    }
}
