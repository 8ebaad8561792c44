// Core domain types shared across all cadence crates.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel commit hash recorded for attempts that failed before (or at)
/// the commit step.
pub const ERROR_COMMIT_HASH: &str = "ERROR";

/// One persisted commit attempt: a full pass of the orchestration
/// algorithm that got past the has-changes check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitAttempt {
    /// Store-assigned, monotonically increasing.
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    /// Real hash on success, [`ERROR_COMMIT_HASH`] on failure.
    pub commit_hash: String,
    pub message: String,
    pub files_changed: u32,
    pub used_ai_message: bool,
    pub theme: Option<String>,
    /// None = push not attempted (disabled, or the attempt failed earlier).
    pub push_success: Option<bool>,
    pub error_message: Option<String>,
}

impl CommitAttempt {
    /// Abbreviated hash for display (the ERROR sentinel stays as-is).
    pub fn short_hash(&self) -> &str {
        if self.success && self.commit_hash.len() > 7 {
            &self.commit_hash[..7]
        } else {
            &self.commit_hash
        }
    }
}

/// A commit attempt as produced by the orchestrator, before the store
/// assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttempt {
    pub success: bool,
    pub commit_hash: String,
    pub message: String,
    pub files_changed: u32,
    pub used_ai_message: bool,
    pub theme: Option<String>,
    pub push_success: Option<bool>,
    pub error_message: Option<String>,
}

impl NewAttempt {
    /// A successful attempt; push result as observed by the caller.
    pub fn succeeded(
        commit_hash: String,
        message: String,
        files_changed: u32,
        used_ai_message: bool,
        theme: Option<String>,
        push_success: Option<bool>,
    ) -> Self {
        Self {
            success: true,
            commit_hash,
            message,
            files_changed,
            used_ai_message,
            theme,
            push_success,
            error_message: None,
        }
    }

    /// A failed attempt. Push is never attempted after a failure.
    pub fn failed(
        message: String,
        files_changed: u32,
        theme: Option<String>,
        error: String,
    ) -> Self {
        Self {
            success: false,
            commit_hash: ERROR_COMMIT_HASH.to_string(),
            message,
            files_changed,
            used_ai_message: false,
            theme,
            push_success: None,
            error_message: Some(error),
        }
    }
}

/// Aggregate counters over all commit attempts ever recorded.
///
/// Invariant: `total_commits == successful_commits + failed_commits`,
/// and each counter is the sum of the corresponding field over all
/// recorded attempts. The store updates this row in the same
/// transaction as each attempt insert.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AggregateStats {
    pub total_commits: u64,
    pub successful_commits: u64,
    pub failed_commits: u64,
    pub total_files_changed: u64,
    pub ai_usage_count: u64,
    pub last_commit_time: Option<DateTime<Utc>>,
}

/// Snapshot of the scheduler's timing state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulerStatus {
    pub running: bool,
    pub paused: bool,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
}

/// Control actions accepted by the scheduler's control surface.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    Pause,
    Resume,
    Trigger,
    Start,
    Stop,
}

impl ControlAction {
    pub const ALL: [ControlAction; 5] = [
        ControlAction::Pause,
        ControlAction::Resume,
        ControlAction::Trigger,
        ControlAction::Start,
        ControlAction::Stop,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ControlAction::Pause => "pause",
            ControlAction::Resume => "resume",
            ControlAction::Trigger => "trigger",
            ControlAction::Start => "start",
            ControlAction::Stop => "stop",
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejection for control actions outside the accepted set. Raised at the
/// API boundary; never touches scheduler state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown control action `{0}`, expected one of: pause, resume, trigger, start, stop")]
pub struct InvalidControlAction(pub String);

impl FromStr for ControlAction {
    type Err = InvalidControlAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pause" => Ok(ControlAction::Pause),
            "resume" => Ok(ControlAction::Resume),
            "trigger" => Ok(ControlAction::Trigger),
            "start" => Ok(ControlAction::Start),
            "stop" => Ok(ControlAction::Stop),
            other => Err(InvalidControlAction(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_attempt_carries_error_sentinel_and_no_push() {
        let attempt =
            NewAttempt::failed("Error during commit".into(), 0, None, "dirty index".into());
        assert!(!attempt.success);
        assert_eq!(attempt.commit_hash, ERROR_COMMIT_HASH);
        assert_eq!(attempt.push_success, None);
        assert_eq!(attempt.error_message.as_deref(), Some("dirty index"));
        assert!(!attempt.used_ai_message);
    }

    #[test]
    fn successful_attempt_keeps_push_result() {
        let attempt = NewAttempt::succeeded(
            "abc123".into(),
            "feat: add widget".into(),
            2,
            true,
            Some("kubernetes".into()),
            Some(false),
        );
        assert!(attempt.success);
        assert_eq!(attempt.push_success, Some(false));
        assert!(attempt.error_message.is_none());
    }

    #[test]
    fn short_hash_abbreviates_success_only() {
        let mut attempt = CommitAttempt {
            id: 1,
            timestamp: Utc::now(),
            success: true,
            commit_hash: "0123456789abcdef".into(),
            message: "chore: sync".into(),
            files_changed: 1,
            used_ai_message: false,
            theme: None,
            push_success: None,
            error_message: None,
        };
        assert_eq!(attempt.short_hash(), "0123456");

        attempt.success = false;
        attempt.commit_hash = ERROR_COMMIT_HASH.into();
        assert_eq!(attempt.short_hash(), "ERROR");
    }

    #[test]
    fn control_action_round_trips_through_str() {
        for action in ControlAction::ALL {
            assert_eq!(action.as_str().parse::<ControlAction>().unwrap(), action);
        }
    }

    #[test]
    fn unknown_control_action_is_rejected_with_description() {
        let error = "restart".parse::<ControlAction>().unwrap_err();
        assert_eq!(error, InvalidControlAction("restart".into()));
        assert!(error.to_string().contains("restart"));
        assert!(error.to_string().contains("pause"));
    }

    #[test]
    fn control_action_serde_uses_snake_case() {
        assert_eq!(serde_json::to_string(&ControlAction::Trigger).unwrap(), "\"trigger\"");
        let parsed: ControlAction = serde_json::from_str("\"resume\"").unwrap();
        assert_eq!(parsed, ControlAction::Resume);
    }

    #[test]
    fn aggregate_stats_default_is_zeroed() {
        let stats = AggregateStats::default();
        assert_eq!(stats.total_commits, 0);
        assert_eq!(stats.successful_commits + stats.failed_commits, stats.total_commits);
        assert!(stats.last_commit_time.is_none());
    }
}
