//! Per-track composition scheduling
//!
//! One scheduler exists per track. It moves through
//! [`SchedulerPhase::Idle`] → [`SchedulerPhase::Debouncing`] →
//! [`SchedulerPhase::Running`] and back. Requests arriving while debouncing
//! restart the quiet period; requests arriving while running set a rerun
//! flag, so any number of them costs exactly one more pass. Passes for a
//! track never overlap and each one starts from a fresh snapshot of the
//! provider's active skins. Passes run on demand through
//! [`CompositionScheduler::run_now`] hold the same `Running` phase.

use crate::composer::CompositionReport;
use crate::compositor::CompositionRunner;
use crate::config::CompositorConfig;
use crate::error::CompositionError;
use crate::provider::SkinSetProvider;
use crate::record::SkinId;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Where a track's scheduler currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    /// No pass pending
    Idle,
    /// Waiting for the quiet period to elapse
    Debouncing,
    /// A pass is in progress
    Running,
}

/// Receives scheduler notifications
///
/// Passed to the scheduler at construction. Only `notify_error` is
/// required; composing status and reports are optional.
pub trait CompositionObserver: Send + Sync {
    /// A pass started (`true`) or finished (`false`)
    fn on_composing_changed(&self, _track_id: &str, _composing: bool) {}

    /// A pass completed successfully
    fn on_pass_completed(&self, _track_id: &str, _report: &CompositionReport) {}

    /// A pass aborted; `context` names the track for the user
    fn notify_error(&self, context: &str, error: &CompositionError);
}

/// Observer that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl CompositionObserver for TracingObserver {
    fn notify_error(&self, context: &str, error: &CompositionError) {
        error!(context, error = %error, recoverable = error.is_recoverable(), "Skin composition failed");
    }
}

#[derive(Debug)]
struct SchedulerState {
    phase: SchedulerPhase,
    rerun: bool,
    last_request: Instant,
}

struct Inner {
    track_id: String,
    provider: Arc<dyn SkinSetProvider>,
    runner: Arc<dyn CompositionRunner>,
    observer: Arc<dyn CompositionObserver>,
    debounce: Duration,
    state: Mutex<SchedulerState>,
    phase_tx: watch::Sender<SchedulerPhase>,
    runtime: Handle,
}

/// Serializes, debounces and coalesces composition passes for one track
#[derive(Clone)]
pub struct CompositionScheduler {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CompositionScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositionScheduler")
            .field("track_id", &self.inner.track_id)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl CompositionScheduler {
    /// Create a scheduler bound to the current tokio runtime
    ///
    /// # Errors
    ///
    /// Returns [`CompositionError::Config`] when called outside a tokio runtime.
    pub fn new(
        provider: Arc<dyn SkinSetProvider>,
        runner: Arc<dyn CompositionRunner>,
        observer: Arc<dyn CompositionObserver>,
        config: &CompositorConfig,
    ) -> Result<Self, CompositionError> {
        let runtime = Handle::try_current().map_err(|e| {
            CompositionError::Config(format!("scheduler requires a tokio runtime: {e}"))
        })?;
        let (phase_tx, _) = watch::channel(SchedulerPhase::Idle);
        Ok(Self {
            inner: Arc::new(Inner {
                track_id: provider.track_id().to_string(),
                provider,
                runner,
                observer,
                debounce: config.debounce(),
                state: Mutex::new(SchedulerState {
                    phase: SchedulerPhase::Idle,
                    rerun: false,
                    last_request: Instant::now(),
                }),
                phase_tx,
                runtime,
            }),
        })
    }

    /// Track this scheduler composes
    pub fn track_id(&self) -> &str {
        &self.inner.track_id
    }

    /// React to a change of `changed`'s active or enabled flag
    ///
    /// If the skin is now active, every other active skin sharing one of its
    /// categories is deactivated through the provider before a pass is
    /// requested. Returns the ids that were deactivated.
    ///
    /// # Errors
    ///
    /// Returns the provider's error if a deactivation fails; no pass is
    /// requested in that case.
    pub fn skin_state_changed(&self, changed: &SkinId) -> Result<Vec<SkinId>, CompositionError> {
        let deactivated = apply_category_exclusion(self.inner.provider.as_ref(), changed)?;
        self.request_refresh();
        Ok(deactivated)
    }

    /// Ask for a pass reflecting the provider's current state
    pub fn request_refresh(&self) {
        let spawn = {
            let mut state = self.inner.state.lock();
            state.last_request = Instant::now();
            match state.phase {
                SchedulerPhase::Idle => {
                    self.inner.set_phase(&mut state, SchedulerPhase::Debouncing);
                    true
                }
                SchedulerPhase::Debouncing => false,
                SchedulerPhase::Running => {
                    state.rerun = true;
                    false
                }
            }
        };
        if spawn {
            debug!(track_id = %self.inner.track_id, "Composition requested");
            self.inner.runtime.spawn(run_worker(Arc::clone(&self.inner)));
        }
    }

    /// Current phase
    pub fn phase(&self) -> SchedulerPhase {
        self.inner.state.lock().phase
    }

    /// Whether a pass is in progress
    pub fn is_composing(&self) -> bool {
        self.phase() == SchedulerPhase::Running
    }

    /// Run a pass right away, bypassing the debounce
    ///
    /// Waits for any pending or running pass, then holds the `Running` phase
    /// itself, so it never overlaps a scheduled pass. Requests arriving during
    /// it are served by one more pass afterwards.
    ///
    /// # Errors
    ///
    /// Returns the pass error to the caller instead of the observer.
    pub async fn run_now(&self) -> Result<CompositionReport, CompositionError> {
        let _slot = loop {
            if let Some(slot) = RunningSlot::acquire(&self.inner) {
                break slot;
            }
            self.wait_idle().await;
        };
        self.inner.run_pass().await
    }

    /// Watch phase transitions
    pub fn subscribe(&self) -> watch::Receiver<SchedulerPhase> {
        self.inner.phase_tx.subscribe()
    }

    /// Wait until no pass is running or pending
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe();
        if rx.wait_for(|phase| *phase == SchedulerPhase::Idle).await.is_err() {
            debug!(track_id = %self.inner.track_id, "Scheduler dropped while waiting");
        }
    }
}

impl Inner {
    fn set_phase(&self, state: &mut SchedulerState, phase: SchedulerPhase) {
        state.phase = phase;
        self.phase_tx.send_replace(phase);
    }

    /// Sleep until no request arrived for a full debounce period, then
    /// enter `Running`
    async fn wait_quiet_period(&self) {
        loop {
            let deadline = {
                let mut state = self.state.lock();
                let deadline = state.last_request + self.debounce;
                if Instant::now() >= deadline {
                    state.rerun = false;
                    self.set_phase(&mut state, SchedulerPhase::Running);
                    return;
                }
                deadline
            };
            tokio::time::sleep_until(deadline).await;
        }
    }

    /// One pass over a fresh snapshot; the caller holds `Running`
    async fn run_pass(&self) -> Result<CompositionReport, CompositionError> {
        let active = self.provider.active_skins();
        info!(
            track_id = %self.track_id,
            active = active.len(),
            "Starting skin composition pass"
        );
        self.observer.on_composing_changed(&self.track_id, true);
        let result = self.runner.compose(active).await;
        self.observer.on_composing_changed(&self.track_id, false);
        if let Ok(report) = &result {
            self.observer.on_pass_completed(&self.track_id, report);
        }
        result
    }

    /// Leave `Running`, or stay in it if a request arrived during the pass
    ///
    /// Returns whether another pass is due.
    fn end_pass(&self) -> bool {
        let mut state = self.state.lock();
        if state.rerun {
            state.rerun = false;
            debug!(track_id = %self.track_id, "Changes arrived during pass, composing again");
            return true;
        }
        self.set_phase(&mut state, SchedulerPhase::Idle);
        false
    }
}

/// `Running` phase held by a caller-driven pass
///
/// Dropping it ends the pass, even if the caller's future is cancelled.
struct RunningSlot {
    inner: Arc<Inner>,
}

impl RunningSlot {
    fn acquire(inner: &Arc<Inner>) -> Option<Self> {
        let mut state = inner.state.lock();
        if state.phase != SchedulerPhase::Idle {
            return None;
        }
        state.rerun = false;
        inner.set_phase(&mut state, SchedulerPhase::Running);
        Some(Self {
            inner: Arc::clone(inner),
        })
    }
}

impl Drop for RunningSlot {
    fn drop(&mut self) {
        if self.inner.end_pass() {
            self.inner
                .runtime
                .spawn(run_passes(Arc::clone(&self.inner)));
        }
    }
}

async fn run_worker(inner: Arc<Inner>) {
    inner.wait_quiet_period().await;
    run_passes(inner).await;
}

async fn run_passes(inner: Arc<Inner>) {
    loop {
        if let Err(e) = inner.run_pass().await {
            let context = format!("Cannot compose skins for track {}", inner.track_id);
            error!(track_id = %inner.track_id, error = %e, "Skin composition pass aborted");
            inner.observer.notify_error(&context, &e);
        }
        if !inner.end_pass() {
            return;
        }
    }
}

/// Deactivate active skins sharing a category with `changed`, if it is active
///
/// # Errors
///
/// Returns the provider's error from `set_active`.
pub fn apply_category_exclusion(
    provider: &dyn SkinSetProvider,
    changed: &SkinId,
) -> Result<Vec<SkinId>, CompositionError> {
    let skins = provider.enabled_skins();
    let Some(skin) = skins.iter().find(|s| s.id == *changed) else {
        return Ok(Vec::new());
    };
    if !skin.is_active || skin.categories.is_empty() {
        return Ok(Vec::new());
    }

    let mut deactivated = Vec::new();
    for other in skins
        .iter()
        .filter(|s| s.id != skin.id && s.is_active && s.shares_category_with(skin))
    {
        provider.set_active(&other.id, false)?;
        debug!(skin_id = %other.id, by = %skin.id, "Skin deactivated by category exclusion");
        deactivated.push(other.id.clone());
    }
    Ok(deactivated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SkinRecord;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    struct StaticProvider {
        skins: Mutex<Vec<SkinRecord>>,
    }

    impl StaticProvider {
        fn new(skins: Vec<SkinRecord>) -> Arc<Self> {
            Arc::new(Self {
                skins: Mutex::new(skins),
            })
        }
    }

    impl SkinSetProvider for StaticProvider {
        fn track_id(&self) -> &str {
            "spa"
        }

        fn enabled_skins(&self) -> Vec<SkinRecord> {
            self.skins.lock().iter().filter(|s| s.is_enabled).cloned().collect()
        }

        fn set_active(&self, id: &SkinId, active: bool) -> Result<(), CompositionError> {
            let mut skins = self.skins.lock();
            let skin = skins
                .iter_mut()
                .find(|s| s.id == *id)
                .ok_or_else(|| CompositionError::UnknownSkin(id.to_string()))?;
            skin.is_active = active;
            Ok(())
        }
    }

    /// Records every snapshot; each pass waits for a permit
    struct GatedRunner {
        gate: Semaphore,
        passes: Mutex<Vec<Vec<String>>>,
        running: AtomicUsize,
        overlap: AtomicUsize,
    }

    impl GatedRunner {
        fn new(permits: usize) -> Arc<Self> {
            Arc::new(Self {
                gate: Semaphore::new(permits),
                passes: Mutex::new(Vec::new()),
                running: AtomicUsize::new(0),
                overlap: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl CompositionRunner for GatedRunner {
        async fn compose(
            &self,
            active: Vec<SkinRecord>,
        ) -> Result<CompositionReport, CompositionError> {
            if self.running.fetch_add(1, Ordering::SeqCst) > 0 {
                self.overlap.fetch_add(1, Ordering::SeqCst);
            }
            self.passes
                .lock()
                .push(active.iter().map(|s| s.id.to_string()).collect());
            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| CompositionError::Task(e.to_string()))?;
            permit.forget();
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(CompositionReport::default())
        }
    }

    #[derive(Default)]
    struct CountingObserver {
        errors: Mutex<Vec<String>>,
    }

    impl CompositionObserver for CountingObserver {
        fn notify_error(&self, context: &str, _error: &CompositionError) {
            self.errors.lock().push(context.to_string());
        }
    }

    fn config() -> CompositorConfig {
        CompositorConfig::default().with_debounce(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_burst_during_debounce_runs_once() -> Result<(), CompositionError> {
        let provider = StaticProvider::new(vec![SkinRecord::new("red", "/red").with_active(true)]);
        let runner = GatedRunner::new(100);
        let scheduler = CompositionScheduler::new(
            provider,
            runner.clone(),
            Arc::new(TracingObserver),
            &config(),
        )?;

        for _ in 0..5 {
            scheduler.request_refresh();
        }
        assert_eq!(scheduler.phase(), SchedulerPhase::Debouncing);
        scheduler.wait_idle().await;

        assert_eq!(runner.passes.lock().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_requests_during_run_coalesce_into_one_rerun() -> Result<(), CompositionError> {
        let provider = StaticProvider::new(vec![
            SkinRecord::new("red", "/red").with_active(true),
            SkinRecord::new("blue", "/blue"),
        ]);
        let runner = GatedRunner::new(0);
        let scheduler = CompositionScheduler::new(
            provider.clone(),
            runner.clone(),
            Arc::new(TracingObserver),
            &config(),
        )?;

        scheduler.request_refresh();
        let mut phases = scheduler.subscribe();
        phases
            .wait_for(|p| *p == SchedulerPhase::Running)
            .await
            .map_err(|e| CompositionError::Task(e.to_string()))?;
        assert!(scheduler.is_composing());

        for i in 0..6 {
            provider.set_active(&SkinId::new("blue"), i % 2 == 0)?;
            scheduler.skin_state_changed(&SkinId::new("blue"))?;
        }
        runner.gate.add_permits(10);
        scheduler.wait_idle().await;

        let passes = runner.passes.lock().clone();
        assert_eq!(passes.len(), 2);
        assert_eq!(passes.get(1), Some(&vec!["red".to_string()]));
        assert_eq!(runner.overlap.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_run_now_holds_running_against_scheduled_passes() -> Result<(), CompositionError>
    {
        let provider = StaticProvider::new(vec![
            SkinRecord::new("red", "/red").with_active(true),
            SkinRecord::new("blue", "/blue"),
        ]);
        let runner = GatedRunner::new(0);
        let scheduler = CompositionScheduler::new(
            provider.clone(),
            runner.clone(),
            Arc::new(TracingObserver),
            &config(),
        )?;

        let manual = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.run_now().await }
        });
        scheduler
            .subscribe()
            .wait_for(|p| *p == SchedulerPhase::Running)
            .await
            .map_err(|e| CompositionError::Task(e.to_string()))?;

        provider.set_active(&SkinId::new("blue"), true)?;
        scheduler.skin_state_changed(&SkinId::new("blue"))?;
        assert_eq!(scheduler.phase(), SchedulerPhase::Running);

        runner.gate.add_permits(10);
        manual
            .await
            .map_err(|e| CompositionError::Task(e.to_string()))??;
        scheduler.wait_idle().await;

        let passes = runner.passes.lock().clone();
        assert_eq!(passes.len(), 2);
        assert_eq!(passes.get(1), Some(&vec!["red".to_string(), "blue".to_string()]));
        assert_eq!(runner.overlap.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_run_now_waits_for_pending_pass() -> Result<(), CompositionError> {
        let provider = StaticProvider::new(vec![SkinRecord::new("red", "/red").with_active(true)]);
        let runner = GatedRunner::new(100);
        let scheduler = CompositionScheduler::new(
            provider,
            runner.clone(),
            Arc::new(TracingObserver),
            &config(),
        )?;

        scheduler.request_refresh();
        scheduler.run_now().await?;

        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
        assert_eq!(runner.passes.lock().len(), 2);
        assert_eq!(runner.overlap.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_category_exclusion_deactivates_before_pass() -> Result<(), CompositionError> {
        let provider = StaticProvider::new(vec![
            SkinRecord::new("x", "/x").with_categories(["Livery"]),
            SkinRecord::new("y", "/y")
                .with_categories(["livery"])
                .with_active(true),
            SkinRecord::new("z", "/z")
                .with_categories(["crowd"])
                .with_active(true),
        ]);
        let runner = GatedRunner::new(100);
        let scheduler = CompositionScheduler::new(
            provider.clone(),
            runner.clone(),
            Arc::new(TracingObserver),
            &config(),
        )?;

        provider.set_active(&SkinId::new("x"), true)?;
        let deactivated = scheduler.skin_state_changed(&SkinId::new("x"))?;
        assert_eq!(deactivated, vec![SkinId::new("y")]);
        let active: Vec<String> = provider
            .active_skins()
            .iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(active, ["x", "z"]);

        scheduler.wait_idle().await;
        assert_eq!(
            runner.passes.lock().first(),
            Some(&vec!["x".to_string(), "z".to_string()])
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_deactivating_does_not_exclude_others() -> Result<(), CompositionError> {
        let provider = StaticProvider::new(vec![
            SkinRecord::new("x", "/x").with_categories(["livery"]),
            SkinRecord::new("y", "/y")
                .with_categories(["livery"])
                .with_active(true),
        ]);
        let deactivated = apply_category_exclusion(provider.as_ref(), &SkinId::new("x"))?;
        assert!(deactivated.is_empty());
        assert_eq!(provider.active_skins().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_pass_is_reported_and_scheduler_returns_idle() -> Result<(), CompositionError>
    {
        struct FailingRunner(AtomicUsize);

        #[async_trait]
        impl CompositionRunner for FailingRunner {
            async fn compose(
                &self,
                _active: Vec<SkinRecord>,
            ) -> Result<CompositionReport, CompositionError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Err(CompositionError::mount_unavailable("/tracks/spa/skins"))
            }
        }

        let provider = StaticProvider::new(Vec::new());
        let runner = Arc::new(FailingRunner(AtomicUsize::new(0)));
        let observer = Arc::new(CountingObserver::default());
        let scheduler =
            CompositionScheduler::new(provider, runner.clone(), observer.clone(), &config())?;

        scheduler.request_refresh();
        scheduler.wait_idle().await;

        assert_eq!(scheduler.phase(), SchedulerPhase::Idle);
        assert_eq!(runner.0.load(Ordering::SeqCst), 1);
        assert_eq!(
            observer.errors.lock().clone(),
            vec!["Cannot compose skins for track spa".to_string()]
        );
        Ok(())
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        let provider = StaticProvider::new(Vec::new());
        let result = CompositionScheduler::new(
            provider,
            GatedRunner::new(1),
            Arc::new(TracingObserver),
            &config(),
        );
        assert!(matches!(result, Err(CompositionError::Config(_))));
    }
}
