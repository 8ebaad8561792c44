// Request/response envelopes for the daemon's REST API.
//
// Shared between the daemon handlers and the CLI client so the two
// sides cannot drift apart. Route paths are declared here for the same
// reason.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AggregateStats, CommitAttempt, ControlAction};

pub const STATUS_PATH: &str = "/api/status";
pub const HISTORY_PATH: &str = "/api/history";
pub const STATS_PATH: &str = "/api/stats";
pub const CONTROL_PATH: &str = "/api/control";
pub const CONFIG_PATH: &str = "/api/config";
pub const CONFIG_SCHEDULE_PATH: &str = "/api/config/schedule";

/// `GET /api/status`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub running: bool,
    pub paused: bool,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub repository: String,
    pub branch: String,
}

/// `GET /api/history?limit=&q=`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryResponse {
    /// Most recent first, bounded by the requested limit.
    pub commits: Vec<CommitAttempt>,
    /// Total attempts ever recorded (not the page size).
    pub total: u64,
}

/// `GET /api/stats`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: AggregateStats,
    pub next_run_at: Option<DateTime<Utc>>,
    /// Conventional-commit type histogram over successful commits.
    #[serde(default)]
    pub commit_types: BTreeMap<String, u64>,
}

/// `POST /api/control`
///
/// The action arrives as a raw string and is validated server-side so
/// unknown actions produce a descriptive 400 instead of a generic
/// deserialization rejection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControlRequest {
    pub action: String,
}

impl ControlRequest {
    pub fn new(action: ControlAction) -> Self {
        Self { action: action.as_str().to_string() }
    }
}

/// `POST /api/control` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ControlResponse {
    pub action: ControlAction,
    pub status: String,
    /// Set for `trigger`: outcome of the attempt that just completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<TriggerOutcome>,
}

/// Outcome of a triggered attempt, reported once the attempt resolves.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// The working tree was clean; nothing was recorded.
    NoChanges,
    /// An attempt was recorded (successfully or not).
    Recorded { attempt: CommitAttempt },
}

/// `GET /api/config` — sanitized view; credentials are never included.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigView {
    pub repository: String,
    pub branch: String,
    pub base_interval_secs: u64,
    pub jitter_range_secs: u64,
    pub push_enabled: bool,
    pub push_retry_attempts: u32,
    pub push_retry_delay_secs: u64,
    pub ai_enabled: bool,
    pub ai_model: Option<String>,
    pub theme: Option<String>,
}

/// `PUT /api/config/schedule` — live scheduler parameter update.
/// Omitted fields keep their current value; changes apply on the next
/// re-arm, not retroactively on an already-armed timer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleSettingsUpdate {
    pub base_interval_secs: Option<u64>,
    pub jitter_range_secs: Option<u64>,
    pub push_enabled: Option<bool>,
}

/// Error envelope produced by every non-2xx API response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
