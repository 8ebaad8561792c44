// One commit attempt, end to end.
//
// The orchestrator guarantees that every attempt resolves normally from
// the scheduler's point of view: either the working tree was clean and
// nothing is recorded, or a CommitAttempt row is produced (successful
// or failed) no matter where the failure happened.

use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use cadence_common::types::{CommitAttempt, NewAttempt, ERROR_COMMIT_HASH};

use crate::git::worker::{CommandExecutor, GitCommandError, GitWorker};
use crate::message::MessageProvider;
use crate::store::HistoryStore;

/// Live scheduler parameters, shared between the timer loop, the
/// orchestrator, and the config API. Updates apply on the next re-arm
/// (interval/jitter) or the next attempt (push), never retroactively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub base_interval_secs: u64,
    pub jitter_range_secs: u64,
    pub push_enabled: bool,
    pub push_retry_attempts: u32,
    pub push_retry_delay: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            base_interval_secs: 600,
            jitter_range_secs: 50,
            push_enabled: false,
            push_retry_attempts: 3,
            push_retry_delay: Duration::from_secs(30),
        }
    }
}

/// What the commit orchestrator needs from the working tree. Implemented
/// by [`GitWorker`] in production and by mocks in scheduler tests.
pub trait VcsGateway: Send + Sync + 'static {
    fn has_changes(&self) -> Result<bool, GitCommandError>;
    fn stage_all(&self) -> Result<(), GitCommandError>;
    fn changed_files(&self) -> Result<Vec<String>, GitCommandError>;
    fn staged_diff(&self) -> Result<String, GitCommandError>;
    fn commit(&self, message: &str) -> Result<String, GitCommandError>;
    fn push(
        &self,
        retry_attempts: u32,
        retry_delay: Duration,
    ) -> impl Future<Output = bool> + Send;
}

impl<E: CommandExecutor + 'static> VcsGateway for GitWorker<E> {
    fn has_changes(&self) -> Result<bool, GitCommandError> {
        GitWorker::has_changes(self)
    }

    fn stage_all(&self) -> Result<(), GitCommandError> {
        GitWorker::stage_all(self)
    }

    fn changed_files(&self) -> Result<Vec<String>, GitCommandError> {
        GitWorker::changed_files(self)
    }

    fn staged_diff(&self) -> Result<String, GitCommandError> {
        GitWorker::staged_diff(self)
    }

    fn commit(&self, message: &str) -> Result<String, GitCommandError> {
        GitWorker::commit(self, message)
    }

    fn push(
        &self,
        retry_attempts: u32,
        retry_delay: Duration,
    ) -> impl Future<Output = bool> + Send {
        GitWorker::push(self, retry_attempts, retry_delay)
    }
}

/// Resolution of one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Working tree was clean; nothing was recorded.
    NoChanges,
    /// An attempt record exists (success or failure).
    Recorded(CommitAttempt),
}

/// Everything known about a failure at the point it happened.
struct AttemptFailure {
    message: String,
    files_changed: u32,
    error: String,
}

impl AttemptFailure {
    fn early(files_changed: u32, error: GitCommandError) -> Self {
        Self { message: "Error during commit".to_string(), files_changed, error: error.to_string() }
    }
}

/// Executes exactly one attempt: check → stage → diff → message →
/// commit → optional push → persist.
pub struct CommitOrchestrator<G> {
    gateway: G,
    provider: MessageProvider,
    store: Arc<HistoryStore>,
    settings: Arc<RwLock<SchedulerSettings>>,
    theme: Option<String>,
}

impl<G: VcsGateway> CommitOrchestrator<G> {
    pub fn new(
        gateway: G,
        provider: MessageProvider,
        store: Arc<HistoryStore>,
        settings: Arc<RwLock<SchedulerSettings>>,
        theme: Option<String>,
    ) -> Self {
        Self { gateway, provider, store, settings, theme }
    }

    /// Run one attempt. Never returns an error: failures are folded
    /// into a failed CommitAttempt record.
    pub async fn run_attempt(&self) -> AttemptOutcome {
        match self.try_commit().await {
            Ok(outcome) => outcome,
            Err(failure) => {
                warn!(error = %failure.error, "commit attempt failed");
                let record = NewAttempt::failed(
                    failure.message,
                    failure.files_changed,
                    self.theme.clone(),
                    failure.error,
                );
                AttemptOutcome::Recorded(self.persist(record))
            }
        }
    }

    async fn try_commit(&self) -> Result<AttemptOutcome, AttemptFailure> {
        if !self.gateway.has_changes().map_err(|e| AttemptFailure::early(0, e))? {
            info!("no changes to commit");
            return Ok(AttemptOutcome::NoChanges);
        }

        self.gateway.stage_all().map_err(|e| AttemptFailure::early(0, e))?;

        let files = self.gateway.changed_files().map_err(|e| AttemptFailure::early(0, e))?;
        let files_changed = files.len() as u32;
        let diff =
            self.gateway.staged_diff().map_err(|e| AttemptFailure::early(files_changed, e))?;

        info!(files = files_changed, "changes detected, generating commit message");
        // Total: any provider-side failure already collapsed into the
        // template fallback.
        let generated = self.provider.generate(&diff, &files, self.theme.as_deref()).await;

        let hash = self.gateway.commit(&generated.message).map_err(|e| AttemptFailure {
            message: generated.message.clone(),
            files_changed,
            error: e.to_string(),
        })?;
        info!(hash = %short(&hash), message = %generated.message, "created commit");

        let (push_enabled, retry_attempts, retry_delay) = {
            let settings = self.settings.read().unwrap_or_else(|p| p.into_inner());
            (settings.push_enabled, settings.push_retry_attempts, settings.push_retry_delay)
        };

        let push_success = if push_enabled {
            let pushed = self.gateway.push(retry_attempts, retry_delay).await;
            if !pushed {
                warn!("push failed, commit kept locally");
            }
            Some(pushed)
        } else {
            None
        };

        let record = NewAttempt::succeeded(
            hash,
            generated.message,
            files_changed,
            generated.used_ai,
            self.theme.clone(),
            push_success,
        );
        Ok(AttemptOutcome::Recorded(self.persist(record)))
    }

    /// Append to the store. A store failure cannot fail the attempt: the
    /// outcome is synthesized with id -1 so callers still observe it.
    fn persist(&self, record: NewAttempt) -> CommitAttempt {
        match self.store.append(&record) {
            Ok(attempt) => attempt,
            Err(err) => {
                error!(error = %err, "failed to persist commit attempt");
                CommitAttempt {
                    id: -1,
                    timestamp: Utc::now(),
                    success: record.success,
                    commit_hash: record.commit_hash,
                    message: record.message,
                    files_changed: record.files_changed,
                    used_ai_message: record.used_ai_message,
                    theme: record.theme,
                    push_success: record.push_success,
                    error_message: record.error_message,
                }
            }
        }
    }
}

fn short(hash: &str) -> &str {
    if hash.len() > 7 && hash != ERROR_COMMIT_HASH {
        &hash[..7]
    } else {
        hash
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::message::templates;
    use crate::message::{MessageClient, MessageClientError};

    /// Scripted gateway recording every call.
    #[derive(Clone, Default)]
    pub(crate) struct MockGateway {
        pub has_changes: Arc<std::sync::atomic::AtomicBool>,
        pub calls: Arc<Mutex<Vec<String>>>,
        pub commit_error: Arc<Mutex<Option<String>>>,
        pub files: Arc<Mutex<Vec<String>>>,
        pub push_results: Arc<Mutex<VecDeque<bool>>>,
        pub push_calls: Arc<AtomicU32>,
        pub last_push_attempts: Arc<AtomicU32>,
    }

    impl MockGateway {
        pub fn with_changes(files: &[&str]) -> Self {
            let gateway = Self::default();
            gateway.has_changes.store(true, Ordering::SeqCst);
            *gateway.files.lock().unwrap() = files.iter().map(|f| f.to_string()).collect();
            gateway
        }

        pub fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl VcsGateway for MockGateway {
        fn has_changes(&self) -> Result<bool, GitCommandError> {
            self.record("has_changes");
            Ok(self.has_changes.load(Ordering::SeqCst))
        }

        fn stage_all(&self) -> Result<(), GitCommandError> {
            self.record("stage_all");
            Ok(())
        }

        fn changed_files(&self) -> Result<Vec<String>, GitCommandError> {
            self.record("changed_files");
            Ok(self.files.lock().unwrap().clone())
        }

        fn staged_diff(&self) -> Result<String, GitCommandError> {
            self.record("staged_diff");
            Ok("+line\n".to_string())
        }

        fn commit(&self, _message: &str) -> Result<String, GitCommandError> {
            self.record("commit");
            if let Some(stderr) = self.commit_error.lock().unwrap().clone() {
                return Err(GitCommandError::CommandFailed {
                    command: "git commit".into(),
                    code: Some(1),
                    stderr,
                });
            }
            Ok("0123456789abcdef0123456789abcdef01234567".to_string())
        }

        fn push(
            &self,
            retry_attempts: u32,
            _retry_delay: Duration,
        ) -> impl Future<Output = bool> + Send {
            self.record("push");
            self.push_calls.fetch_add(1, Ordering::SeqCst);
            self.last_push_attempts.store(retry_attempts, Ordering::SeqCst);
            let result = self.push_results.lock().unwrap().pop_front().unwrap_or(true);
            async move { result }
        }
    }

    fn settings(push_enabled: bool) -> Arc<RwLock<SchedulerSettings>> {
        Arc::new(RwLock::new(SchedulerSettings {
            base_interval_secs: 600,
            jitter_range_secs: 50,
            push_enabled,
            ..Default::default()
        }))
    }

    fn orchestrator(
        gateway: MockGateway,
        push_enabled: bool,
        store: Arc<HistoryStore>,
    ) -> CommitOrchestrator<MockGateway> {
        CommitOrchestrator::new(
            gateway,
            MessageProvider::template_only(),
            store,
            settings(push_enabled),
            None,
        )
    }

    #[tokio::test]
    async fn clean_tree_writes_nothing() {
        let store = Arc::new(HistoryStore::open_in_memory().unwrap());
        let gateway = MockGateway::default();
        let orch = orchestrator(gateway.clone(), false, store.clone());

        let outcome = orch.run_attempt().await;
        assert_eq!(outcome, AttemptOutcome::NoChanges);
        assert_eq!(store.total().unwrap(), 0);
        assert_eq!(gateway.calls(), vec!["has_changes"]);
    }

    #[tokio::test]
    async fn successful_attempt_without_push_records_one_entry() {
        let store = Arc::new(HistoryStore::open_in_memory().unwrap());
        let gateway = MockGateway::with_changes(&["src/lib.rs"]);
        let orch = orchestrator(gateway.clone(), false, store.clone());

        let outcome = orch.run_attempt().await;
        let AttemptOutcome::Recorded(attempt) = outcome else {
            panic!("expected a recorded attempt");
        };

        assert!(attempt.success);
        assert_eq!(attempt.commit_hash, "0123456789abcdef0123456789abcdef01234567");
        assert_eq!(attempt.files_changed, 1);
        assert_eq!(attempt.push_success, None);
        assert_eq!(store.total().unwrap(), 1);
        assert_eq!(gateway.push_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn push_enabled_records_push_result_with_configured_attempts() {
        let store = Arc::new(HistoryStore::open_in_memory().unwrap());
        let gateway = MockGateway::with_changes(&["a.rs"]);
        gateway.push_results.lock().unwrap().push_back(true);
        let orch = orchestrator(gateway.clone(), true, store.clone());

        let AttemptOutcome::Recorded(attempt) = orch.run_attempt().await else {
            panic!("expected a recorded attempt");
        };

        assert_eq!(attempt.push_success, Some(true));
        assert_eq!(gateway.push_calls.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.last_push_attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_push_marks_attempt_successful_with_failed_push() {
        let store = Arc::new(HistoryStore::open_in_memory().unwrap());
        let gateway = MockGateway::with_changes(&["a.rs"]);
        gateway.push_results.lock().unwrap().push_back(false);
        let orch = orchestrator(gateway.clone(), true, store.clone());

        let AttemptOutcome::Recorded(attempt) = orch.run_attempt().await else {
            panic!("expected a recorded attempt");
        };

        assert!(attempt.success, "push failure must not fail the attempt");
        assert_eq!(attempt.push_success, Some(false));
        assert!(attempt.error_message.is_none());
    }

    #[tokio::test]
    async fn commit_failure_records_error_attempt() {
        let store = Arc::new(HistoryStore::open_in_memory().unwrap());
        let gateway = MockGateway::with_changes(&["a.rs"]);
        *gateway.commit_error.lock().unwrap() = Some("fatal: dirty index".into());
        let orch = orchestrator(gateway.clone(), true, store.clone());

        let AttemptOutcome::Recorded(attempt) = orch.run_attempt().await else {
            panic!("expected a recorded attempt");
        };

        assert!(!attempt.success);
        assert_eq!(attempt.commit_hash, ERROR_COMMIT_HASH);
        assert!(attempt.error_message.as_deref().unwrap_or("").contains("dirty index"));
        assert_eq!(attempt.push_success, None, "push is never attempted after a failure");
        assert_eq!(store.total().unwrap(), 1);
        // Push was not reached.
        assert_eq!(gateway.push_calls.load(Ordering::SeqCst), 0);
    }

    struct TimeoutClient;

    impl MessageClient for TimeoutClient {
        fn generate(
            &self,
            _system: &str,
            _user_prompt: &str,
        ) -> std::pin::Pin<
            Box<dyn Future<Output = Result<String, MessageClientError>> + Send>,
        > {
            Box::pin(async { Err(MessageClientError::Timeout) })
        }
    }

    #[tokio::test]
    async fn ai_timeout_uses_template_fallback_with_both_filenames() {
        let store = Arc::new(HistoryStore::open_in_memory().unwrap());
        let gateway = MockGateway::with_changes(&["src/api.rs", "src/config.rs"]);
        let orch = CommitOrchestrator::new(
            gateway,
            MessageProvider::new(Some(Box::new(TimeoutClient))),
            store.clone(),
            settings(false),
            None,
        );

        let AttemptOutcome::Recorded(attempt) = orch.run_attempt().await else {
            panic!("expected a recorded attempt");
        };

        assert!(!attempt.used_ai_message);
        let files = vec!["src/api.rs".to_string(), "src/config.rs".to_string()];
        assert!(
            templates::rendered_pool(&files, None).contains(&attempt.message),
            "message `{}` should come from the fallback pool",
            attempt.message
        );
        assert!(attempt.message.contains("src/api.rs"));
        assert!(attempt.message.contains("src/config.rs"));
    }

    #[tokio::test]
    async fn theme_is_recorded_on_the_attempt() {
        let store = Arc::new(HistoryStore::open_in_memory().unwrap());
        let gateway = MockGateway::with_changes(&["chart.yaml"]);
        let orch = CommitOrchestrator::new(
            gateway,
            MessageProvider::template_only(),
            store.clone(),
            settings(false),
            Some("kubernetes".into()),
        );

        let AttemptOutcome::Recorded(attempt) = orch.run_attempt().await else {
            panic!("expected a recorded attempt");
        };
        assert_eq!(attempt.theme.as_deref(), Some("kubernetes"));
    }
}
