// Scheduler core: owns the decision of *when* to run a commit attempt
// and the pause/resume/trigger control surface. Contains no git or
// message logic itself.
//
// Concurrency model: one pending timer, one single-flight attempt gate.
// The gate is the only synchronization the design depends on: the timer
// path and `trigger_now` both go through it, so two orchestration runs
// can never overlap. A paused scheduler keeps re-arming on schedule but
// skips the attempt when the timer fires, preserving the jittered
// rhythm.

pub mod attempt;

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use cadence_common::types::SchedulerStatus;

use self::attempt::{AttemptOutcome, CommitOrchestrator, SchedulerSettings, VcsGateway};

/// Compute one jittered interval: `base + uniform(-jitter..=jitter)`,
/// inclusive on both ends, floored at one second.
pub fn compute_interval(base_secs: u64, jitter_secs: u64) -> Duration {
    let jitter = jitter_secs as i64;
    let offset = if jitter == 0 { 0 } else { rand::thread_rng().gen_range(-jitter..=jitter) };
    let secs = (base_secs as i64 + offset).max(1) as u64;
    Duration::from_secs(secs)
}

/// Timing state owned by the scheduler. Mutated only by the timer loop
/// and the control operations; read out as [`SchedulerStatus`].
#[derive(Debug, Default)]
struct ScheduleState {
    running: bool,
    paused: bool,
    next_run_at: Option<chrono::DateTime<Utc>>,
    last_run_at: Option<chrono::DateTime<Utc>>,
}

struct TimerHandle {
    shutdown_tx: watch::Sender<bool>,
    _task: JoinHandle<()>,
}

struct SchedulerInner<G> {
    state: Mutex<ScheduleState>,
    settings: Arc<RwLock<SchedulerSettings>>,
    orchestrator: CommitOrchestrator<G>,
    /// Single-flight gate for orchestration runs.
    gate: tokio::sync::Mutex<()>,
    /// Outcome of the most recently completed attempt, written while the
    /// gate is still held so joiners read the run they waited for.
    last_outcome: Mutex<Option<AttemptOutcome>>,
    timer: Mutex<Option<TimerHandle>>,
}

/// The scheduling engine for one managed repository.
pub struct SchedulerCore<G: VcsGateway> {
    inner: Arc<SchedulerInner<G>>,
}

impl<G: VcsGateway> Clone for SchedulerCore<G> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<G: VcsGateway> SchedulerCore<G> {
    pub fn new(
        orchestrator: CommitOrchestrator<G>,
        settings: Arc<RwLock<SchedulerSettings>>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                state: Mutex::new(ScheduleState::default()),
                settings,
                orchestrator,
                gate: tokio::sync::Mutex::new(()),
                last_outcome: Mutex::new(None),
                timer: Mutex::new(None),
            }),
        }
    }

    /// Begin arming timers. Idempotent: starting a running scheduler is
    /// a no-op. Clears any pause left over from a previous run.
    pub fn start(&self) {
        {
            let mut state = lock(&self.inner.state);
            if state.running {
                return;
            }
            state.running = true;
            state.paused = false;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            timer_loop(inner, shutdown_rx).await;
        });

        *lock(&self.inner.timer) = Some(TimerHandle { shutdown_tx, _task: task });
        info!("scheduler started");
    }

    /// Cancel the pending timer. Idempotent. An attempt already in
    /// flight runs to completion; only the timer is cancelled.
    pub fn stop(&self) {
        let handle = lock(&self.inner.timer).take();
        let was_running = {
            let mut state = lock(&self.inner.state);
            let was_running = state.running;
            state.running = false;
            state.paused = false;
            state.next_run_at = None;
            was_running
        };

        if let Some(handle) = handle {
            let _ = handle.shutdown_tx.send(true);
        }
        if was_running {
            info!("scheduler stopped");
        }
    }

    /// Suppress attempts while keeping the timer ticking. Idempotent;
    /// a no-op on a stopped scheduler.
    pub fn pause(&self) {
        let mut state = lock(&self.inner.state);
        if state.running && !state.paused {
            state.paused = true;
            info!("scheduler paused");
        }
    }

    /// Resume normal triggering on the next timer fire. Idempotent.
    pub fn resume(&self) {
        let mut state = lock(&self.inner.state);
        if state.paused {
            state.paused = false;
            info!("scheduler resumed");
        }
    }

    /// Run an attempt immediately, regardless of pause state, and wait
    /// for it to resolve. If an attempt is already in flight, join it:
    /// wait for it to finish and return its outcome. The armed timer is
    /// not disturbed either way.
    pub async fn trigger_now(&self) -> AttemptOutcome {
        match self.inner.gate.try_lock() {
            Ok(_guard) => {
                debug!("manual trigger starting attempt");
                let outcome = self.inner.orchestrator.run_attempt().await;
                self.finish_attempt(outcome.clone());
                outcome
            }
            Err(_) => {
                debug!("manual trigger joining in-flight attempt");
                let _guard = self.inner.gate.lock().await;
                lock(&self.inner.last_outcome).clone().unwrap_or(AttemptOutcome::NoChanges)
            }
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = lock(&self.inner.state);
        SchedulerStatus {
            running: state.running,
            paused: state.paused,
            next_run_at: state.next_run_at,
            last_run_at: state.last_run_at,
        }
    }

    /// Record completion; called while the caller still holds the gate.
    fn finish_attempt(&self, outcome: AttemptOutcome) {
        lock(&self.inner.state).last_run_at = Some(Utc::now());
        *lock(&self.inner.last_outcome) = Some(outcome);
    }
}

async fn timer_loop<G: VcsGateway>(
    inner: Arc<SchedulerInner<G>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        // Settings are read fresh on every re-arm so live updates take
        // effect on the next interval, not retroactively.
        let (base, jitter) = {
            let settings = inner.settings.read().unwrap_or_else(|p| p.into_inner());
            (settings.base_interval_secs, settings.jitter_range_secs)
        };
        let interval = compute_interval(base, jitter);
        lock(&inner.state).next_run_at =
            Some(Utc::now() + chrono::Duration::seconds(interval.as_secs() as i64));
        debug!(secs = interval.as_secs(), "next commit attempt armed");

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown_rx.changed() => break,
        }

        if lock(&inner.state).paused {
            debug!("scheduler paused, skipping this cycle");
            continue;
        }

        match inner.gate.try_lock() {
            Ok(_guard) => {
                let outcome = inner.orchestrator.run_attempt().await;
                lock(&inner.state).last_run_at = Some(Utc::now());
                *lock(&inner.last_outcome) = Some(outcome);
            }
            Err(_) => {
                // A triggered attempt is executing; this fire is a no-op
                // re-arm rather than a queued second run.
                debug!("attempt already in flight, skipping this cycle");
            }
        }
    }

    lock(&inner.state).next_run_at = None;
    debug!("timer loop exited");
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Object-safe control surface handed to the API layer. Boxed futures
/// keep `trigger_now` dyn-compatible.
pub trait SchedulerControl: Send + Sync {
    fn start(&self);
    fn stop(&self);
    fn pause(&self);
    fn resume(&self);
    fn trigger_now(&self) -> Pin<Box<dyn Future<Output = AttemptOutcome> + Send + '_>>;
    fn status(&self) -> SchedulerStatus;
}

impl<G: VcsGateway> SchedulerControl for SchedulerCore<G> {
    fn start(&self) {
        SchedulerCore::start(self)
    }

    fn stop(&self) {
        SchedulerCore::stop(self)
    }

    fn pause(&self) {
        SchedulerCore::pause(self)
    }

    fn resume(&self) {
        SchedulerCore::resume(self)
    }

    fn trigger_now(&self) -> Pin<Box<dyn Future<Output = AttemptOutcome> + Send + '_>> {
        Box::pin(SchedulerCore::trigger_now(self))
    }

    fn status(&self) -> SchedulerStatus {
        SchedulerCore::status(self)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    use proptest::prelude::*;

    use super::attempt::tests::MockGateway;
    use super::*;
    use crate::git::worker::GitCommandError;
    use crate::message::MessageProvider;
    use crate::store::HistoryStore;

    fn test_settings(base: u64, jitter: u64) -> Arc<RwLock<SchedulerSettings>> {
        Arc::new(RwLock::new(SchedulerSettings {
            base_interval_secs: base,
            jitter_range_secs: jitter,
            push_enabled: false,
            ..Default::default()
        }))
    }

    fn scheduler_with(
        gateway: MockGateway,
        store: Arc<HistoryStore>,
        settings: Arc<RwLock<SchedulerSettings>>,
    ) -> SchedulerCore<MockGateway> {
        let orchestrator = CommitOrchestrator::new(
            gateway,
            MessageProvider::template_only(),
            store,
            settings.clone(),
            None,
        );
        SchedulerCore::new(orchestrator, settings)
    }

    proptest! {
        #[test]
        fn interval_stays_within_jitter_bounds(base in 1u64..10_000, jitter_frac in 0u64..100) {
            // Valid configs keep jitter strictly below base.
            let jitter = (base.saturating_sub(1)) * jitter_frac / 100;
            let interval = compute_interval(base, jitter).as_secs();
            prop_assert!(interval >= base - jitter);
            prop_assert!(interval <= base + jitter);
        }
    }

    #[test]
    fn zero_jitter_is_exact() {
        for _ in 0..10 {
            assert_eq!(compute_interval(600, 0), Duration::from_secs(600));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fire_runs_an_attempt() {
        let store = Arc::new(HistoryStore::open_in_memory().unwrap());
        let gateway = MockGateway::with_changes(&["a.rs"]);
        let scheduler = scheduler_with(gateway.clone(), store.clone(), test_settings(600, 50));

        scheduler.start();
        assert!(scheduler.status().running);

        // Past the maximum possible interval.
        tokio::time::sleep(Duration::from_secs(651)).await;
        tokio::task::yield_now().await;

        assert!(store.total().unwrap() >= 1);
        assert!(scheduler.status().last_run_at.is_some());
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn paused_fire_touches_neither_gateway_nor_store() {
        let store = Arc::new(HistoryStore::open_in_memory().unwrap());
        let gateway = MockGateway::with_changes(&["a.rs"]);
        let scheduler = scheduler_with(gateway.clone(), store.clone(), test_settings(600, 0));

        scheduler.start();
        scheduler.pause();
        assert!(scheduler.status().paused);

        // Several cycles elapse while paused.
        tokio::time::sleep(Duration::from_secs(1900)).await;
        tokio::task::yield_now().await;

        assert!(gateway.calls().is_empty(), "paused fires must not touch the gateway");
        assert_eq!(store.total().unwrap(), 0);
        // The clock kept ticking: a next run stayed armed throughout.
        assert!(scheduler.status().next_run_at.is_some());

        scheduler.resume();
        tokio::time::sleep(Duration::from_secs(601)).await;
        tokio::task::yield_now().await;
        assert!(store.total().unwrap() >= 1, "resume restores normal triggering");

        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_clears_next_run_and_disarms() {
        let store = Arc::new(HistoryStore::open_in_memory().unwrap());
        let gateway = MockGateway::default();
        let scheduler = scheduler_with(gateway.clone(), store.clone(), test_settings(600, 0));

        scheduler.start();
        tokio::task::yield_now().await;
        assert!(scheduler.status().next_run_at.is_some());

        scheduler.stop();
        let status = scheduler.status();
        assert!(!status.running);
        assert_eq!(status.next_run_at, None);

        // No fires after stop.
        tokio::time::sleep(Duration::from_secs(1300)).await;
        tokio::task::yield_now().await;
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn control_operations_are_idempotent() {
        let store = Arc::new(HistoryStore::open_in_memory().unwrap());
        let scheduler =
            scheduler_with(MockGateway::default(), store, test_settings(600, 0));

        // All of these are no-ops on a stopped scheduler.
        scheduler.stop();
        scheduler.pause();
        scheduler.resume();
        assert!(!scheduler.status().running);
        assert!(!scheduler.status().paused);

        scheduler.start();
        scheduler.start();
        scheduler.pause();
        scheduler.pause();
        assert!(scheduler.status().paused);
        scheduler.resume();
        scheduler.resume();
        assert!(!scheduler.status().paused);
        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.status().running);
    }

    #[tokio::test]
    async fn trigger_works_on_a_stopped_scheduler() {
        let store = Arc::new(HistoryStore::open_in_memory().unwrap());
        let gateway = MockGateway::with_changes(&["a.rs"]);
        let scheduler = scheduler_with(gateway, store.clone(), test_settings(600, 0));

        let outcome = scheduler.trigger_now().await;
        assert!(matches!(outcome, AttemptOutcome::Recorded(_)));
        assert_eq!(store.total().unwrap(), 1);
        assert!(!scheduler.status().running);
        assert!(scheduler.status().last_run_at.is_some());
    }

    /// Gateway whose attempt lingers at the push await, exposing
    /// overlap if two runs ever execute concurrently.
    #[derive(Clone)]
    struct SlowGateway {
        push_delay: Duration,
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
        attempts: Arc<AtomicU32>,
    }

    impl SlowGateway {
        fn new(push_delay: Duration) -> Self {
            Self {
                push_delay,
                active: Arc::default(),
                max_active: Arc::default(),
                attempts: Arc::default(),
            }
        }
    }

    impl VcsGateway for SlowGateway {
        fn has_changes(&self) -> Result<bool, GitCommandError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }

        fn stage_all(&self) -> Result<(), GitCommandError> {
            Ok(())
        }

        fn changed_files(&self) -> Result<Vec<String>, GitCommandError> {
            Ok(vec!["a.rs".to_string()])
        }

        fn staged_diff(&self) -> Result<String, GitCommandError> {
            Ok(String::new())
        }

        fn commit(&self, _message: &str) -> Result<String, GitCommandError> {
            Ok("feedface".to_string())
        }

        fn push(
            &self,
            _retry_attempts: u32,
            _retry_delay: Duration,
        ) -> impl Future<Output = bool> + Send {
            let active = self.active.clone();
            let delay = self.push_delay;
            async move {
                tokio::time::sleep(delay).await;
                active.fetch_sub(1, Ordering::SeqCst);
                true
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_double_trigger_never_overlaps() {
        let store = Arc::new(HistoryStore::open_in_memory().unwrap());
        let gateway = SlowGateway::new(Duration::from_millis(250));
        let settings = Arc::new(RwLock::new(SchedulerSettings {
            push_enabled: true,
            ..Default::default()
        }));
        let orchestrator = CommitOrchestrator::new(
            gateway.clone(),
            MessageProvider::template_only(),
            store.clone(),
            settings.clone(),
            None,
        );
        let scheduler = SchedulerCore::new(orchestrator, settings);

        let (first, second) = tokio::join!(scheduler.trigger_now(), scheduler.trigger_now());

        assert_eq!(gateway.max_active.load(Ordering::SeqCst), 1, "attempts must never overlap");
        assert_eq!(gateway.attempts.load(Ordering::SeqCst), 1, "second trigger joins the first");
        assert_eq!(store.total().unwrap(), 1);
        // The joiner observes the same resolved attempt.
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fire_during_triggered_attempt_is_skipped() {
        let store = Arc::new(HistoryStore::open_in_memory().unwrap());
        // Push takes 3s while the timer fires every 1s, so two timer
        // fires land while the triggered attempt holds the gate.
        let gateway = SlowGateway::new(Duration::from_secs(3));
        let settings = Arc::new(RwLock::new(SchedulerSettings {
            base_interval_secs: 1,
            jitter_range_secs: 0,
            push_enabled: true,
            ..Default::default()
        }));
        let orchestrator = CommitOrchestrator::new(
            gateway.clone(),
            MessageProvider::template_only(),
            store.clone(),
            settings.clone(),
            None,
        );
        let scheduler = SchedulerCore::new(orchestrator, settings);
        scheduler.start();

        let outcome = scheduler.trigger_now().await;
        scheduler.stop();

        assert!(matches!(outcome, AttemptOutcome::Recorded(_)));
        assert_eq!(gateway.max_active.load(Ordering::SeqCst), 1, "fires during the attempt skip");
        assert_eq!(gateway.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(store.total().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn live_interval_update_applies_on_next_re_arm() {
        let store = Arc::new(HistoryStore::open_in_memory().unwrap());
        let gateway = MockGateway::default();
        // No changes: fires are cheap no-ops we can count via the gateway.
        gateway.has_changes.store(false, Ordering::SeqCst);
        let settings = test_settings(600, 0);
        let scheduler = scheduler_with(gateway.clone(), store, settings.clone());

        scheduler.start();
        tokio::time::sleep(Duration::from_secs(601)).await;
        tokio::task::yield_now().await;
        let fires_before = gateway.calls().len();
        assert!(fires_before >= 1);

        // Shrink the interval. The already-armed 600s timer still runs
        // out first; the new interval governs every re-arm after it.
        settings.write().unwrap().base_interval_secs = 10;
        tokio::time::sleep(Duration::from_secs(1300)).await;
        tokio::task::yield_now().await;
        let fires_after = gateway.calls().len();
        assert!(
            fires_after >= fires_before + 10,
            "shrunk interval should fire far more often (before={fires_before}, after={fires_after})"
        );

        scheduler.stop();
    }
}
