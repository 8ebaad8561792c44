// REST control and read surface for the scheduler.
//
// Consumed by the dashboard and the `cadence` CLI. Control actions are
// validated here: an unknown action is client error, never a server
// fault. The trigger action responds only after the attempt resolves.

pub mod error;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use cadence_common::protocol::api::{
    ConfigView, ControlRequest, ControlResponse, HistoryResponse, ScheduleSettingsUpdate,
    StatsResponse, StatusResponse, TriggerOutcome,
};
use cadence_common::types::ControlAction;

use crate::scheduler::attempt::{AttemptOutcome, SchedulerSettings};
use crate::scheduler::SchedulerControl;
use crate::store::HistoryStore;

use self::error::ApiError;

const DEFAULT_HISTORY_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 500;

/// Static facts about the managed repository and AI backend, captured
/// at startup for the status/config endpoints.
#[derive(Debug, Clone)]
pub struct RepoFacts {
    pub repository: String,
    pub branch: String,
    pub ai_enabled: bool,
    pub ai_model: Option<String>,
    pub theme: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<dyn SchedulerControl>,
    pub store: Arc<HistoryStore>,
    pub settings: Arc<RwLock<SchedulerSettings>>,
    pub facts: Arc<RepoFacts>,
}

/// Build the API router. CORS is permissive: the dashboard is a browser
/// client served from its own origin.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/history", get(get_history))
        .route("/api/stats", get(get_stats))
        .route("/api/control", post(post_control))
        .route("/api/config", get(get_config))
        .route("/api/config/schedule", put(put_schedule_settings))
        .with_state(state)
        .layer(cors)
}

async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.scheduler.status();
    Json(StatusResponse {
        running: status.running,
        paused: status.paused,
        next_run_at: status.next_run_at,
        last_run_at: status.last_run_at,
        repository: state.facts.repository.clone(),
        branch: state.facts.branch.clone(),
    })
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
    q: Option<String>,
}

async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);

    let commits = match query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        Some(term) => state.store.search(term, limit).map_err(ApiError::internal)?,
        None => state.store.recent(limit).map_err(ApiError::internal)?,
    };
    let total = state.store.total().map_err(ApiError::internal)?;

    Ok(Json(HistoryResponse { commits, total }))
}

async fn get_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let stats = state.store.stats().map_err(ApiError::internal)?;
    let commit_types = state.store.commit_type_counts().map_err(ApiError::internal)?;
    let next_run_at = state.scheduler.status().next_run_at;

    Ok(Json(StatsResponse { stats, next_run_at, commit_types }))
}

async fn post_control(
    State(state): State<AppState>,
    Json(request): Json<ControlRequest>,
) -> Result<Json<ControlResponse>, ApiError> {
    let action: ControlAction = request
        .action
        .trim()
        .parse()
        .map_err(|e: cadence_common::types::InvalidControlAction| ApiError::validation(e.to_string()))?;

    info!(action = %action, "control action received");

    let (status, attempt) = match action {
        ControlAction::Pause => {
            state.scheduler.pause();
            ("paused", None)
        }
        ControlAction::Resume => {
            state.scheduler.resume();
            ("resumed", None)
        }
        ControlAction::Start => {
            state.scheduler.start();
            ("started", None)
        }
        ControlAction::Stop => {
            state.scheduler.stop();
            ("stopped", None)
        }
        ControlAction::Trigger => {
            // Suspends until the attempt (or the one already in flight)
            // resolves.
            let outcome = state.scheduler.trigger_now().await;
            let outcome = match outcome {
                AttemptOutcome::NoChanges => TriggerOutcome::NoChanges,
                AttemptOutcome::Recorded(attempt) => TriggerOutcome::Recorded { attempt },
            };
            ("triggered", Some(outcome))
        }
    };

    Ok(Json(ControlResponse { action, status: status.to_string(), attempt }))
}

async fn get_config(State(state): State<AppState>) -> Json<ConfigView> {
    Json(config_view(&state))
}

async fn put_schedule_settings(
    State(state): State<AppState>,
    Json(update): Json<ScheduleSettingsUpdate>,
) -> Result<Json<ConfigView>, ApiError> {
    {
        let mut settings = state.settings.write().unwrap_or_else(|p| p.into_inner());
        let base = update.base_interval_secs.unwrap_or(settings.base_interval_secs);
        let jitter = update.jitter_range_secs.unwrap_or(settings.jitter_range_secs);

        if base == 0 {
            return Err(ApiError::validation("base_interval_secs must be > 0"));
        }
        if jitter >= base {
            return Err(ApiError::validation(format!(
                "jitter_range_secs ({jitter}) must be smaller than base_interval_secs ({base})"
            )));
        }

        settings.base_interval_secs = base;
        settings.jitter_range_secs = jitter;
        if let Some(push_enabled) = update.push_enabled {
            settings.push_enabled = push_enabled;
        }
        info!(
            base_interval_secs = settings.base_interval_secs,
            jitter_range_secs = settings.jitter_range_secs,
            push_enabled = settings.push_enabled,
            "schedule settings updated, applies on next re-arm"
        );
    }

    Ok(Json(config_view(&state)))
}

fn config_view(state: &AppState) -> ConfigView {
    let settings = state.settings.read().unwrap_or_else(|p| p.into_inner());
    ConfigView {
        repository: state.facts.repository.clone(),
        branch: state.facts.branch.clone(),
        base_interval_secs: settings.base_interval_secs,
        jitter_range_secs: settings.jitter_range_secs,
        push_enabled: settings.push_enabled,
        push_retry_attempts: settings.push_retry_attempts,
        push_retry_delay_secs: settings.push_retry_delay.as_secs(),
        ai_enabled: state.facts.ai_enabled,
        ai_model: state.facts.ai_model.clone(),
        theme: state.facts.theme.clone(),
    }
}

/// Build the live scheduler settings from loaded configuration.
pub fn settings_from_config(config: &crate::config::DaemonConfig) -> SchedulerSettings {
    SchedulerSettings {
        base_interval_secs: config.schedule.base_interval_secs,
        jitter_range_secs: config.schedule.jitter_range_secs,
        push_enabled: config.push.enabled,
        push_retry_attempts: config.push.retry_attempts,
        push_retry_delay: Duration::from_secs(config.push.retry_delay_secs),
    }
}
