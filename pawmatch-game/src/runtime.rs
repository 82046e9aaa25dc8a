//! Wires one session to its timers, persistence, asset cache and pressure
//! sampling.
//!
//! State-machine calls (`select_image`, `use_power_up`, ...) are synchronous
//! and commit under the session lock. Periodic work runs on tokio tasks that
//! only ever observe committed snapshots.
use chrono::Utc;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::cache::{AssetLoader, PreloadPriority, ResourceCache};
use crate::challenge::{Challenge, Slot};
use crate::config::RuntimeConfig;
use crate::constants::TARGET_RUNTIME;
use crate::data::BreedCatalog;
use crate::error::GameError;
use crate::persistence::{
    LoadOutcome, Recovered, RecoveryReport, SessionPersistenceManager, SessionStore,
};
use crate::powerups::PowerUpKind;
use crate::pressure::{PressureLevel, PressureResponse, ResourcePressureCoordinator};
use crate::session::{
    AnswerOutcome, ClockTick, GameSession, SessionOutcome, SessionState, SessionStatus,
};

const UPCOMING_PREFETCH: usize = 4;

/// Host application lifecycle signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostLifecycleEvent {
    Active,
    Inactive,
    Backgrounded,
    Foregrounded,
}

impl HostLifecycleEvent {
    #[must_use]
    pub const fn is_suspend(self) -> bool {
        matches!(self, Self::Inactive | Self::Backgrounded)
    }
}

/// Notifications for the UI shell.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    Tick(ClockTick),
    Autosaved { revision: u64 },
    SaveFailed(GameError),
    Recovered(RecoveryReport),
    /// Stored state was beyond repair; a fresh session replaced it.
    Unrecoverable,
    Pressure(PressureResponse),
    SessionEnded(SessionOutcome),
}

/// How `launch` obtained the initial session.
#[derive(Debug, Clone, PartialEq)]
pub enum LaunchOutcome {
    Fresh,
    Restored,
    Recovered(RecoveryReport),
    Unrecoverable,
    StoreUnavailable(GameError),
}

struct RuntimeShared<L: AssetLoader, S: SessionStore> {
    catalog: Arc<BreedCatalog>,
    config: RuntimeConfig,
    seed: u64,
    generation: AtomicU64,
    session: Mutex<GameSession>,
    persistence: tokio::sync::Mutex<SessionPersistenceManager<S>>,
    cache: ResourceCache<L>,
    pressure: tokio::sync::Mutex<ResourcePressureCoordinator>,
    host_bytes: AtomicU64,
    events: mpsc::UnboundedSender<RuntimeEvent>,
    shutdown: CancellationToken,
    session_token: Mutex<CancellationToken>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    handle: Handle,
}

/// One running game: session, timers, persistence, cache and pressure relief.
pub struct SessionRuntime<L: AssetLoader, S: SessionStore + 'static> {
    shared: Arc<RuntimeShared<L, S>>,
    launch: LaunchOutcome,
}

fn interval(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

impl<L: AssetLoader, S: SessionStore + 'static> SessionRuntime<L, S> {
    /// Load (and if needed recover) the stored session, then start the
    /// periodic tasks. Recovery completes before this returns, so no answer
    /// can reach a session that has not been validated.
    ///
    /// A `config` that fails validation is replaced by the defaults.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn launch(
        catalog: Arc<BreedCatalog>,
        loader: L,
        store: S,
        config: RuntimeConfig,
        seed: u64,
        lifecycle: mpsc::Receiver<HostLifecycleEvent>,
    ) -> (Self, mpsc::UnboundedReceiver<RuntimeEvent>) {
        let config = match config.validate() {
            Ok(()) => config,
            Err(err) => {
                error!(target: TARGET_RUNTIME, "invalid config, using defaults: {err}");
                RuntimeConfig::default()
            }
        };
        let (events, receiver) = mpsc::unbounded_channel();
        let mut pending = Vec::new();
        let mut manager = SessionPersistenceManager::new(store, config.persistence.clone());
        let loaded = manager.load(Utc::now()).await;

        let fresh = || GameSession::new(Arc::clone(&catalog), config.session.clone(), seed);
        let restore = |state: SessionState| {
            GameSession::from_state(Arc::clone(&catalog), config.session.clone(), seed, state)
        };
        let (session, launch) = match loaded {
            Ok(LoadOutcome::Fresh) => (fresh(), LaunchOutcome::Fresh),
            Ok(LoadOutcome::Restored(state)) => (restore(state), LaunchOutcome::Restored),
            Ok(LoadOutcome::Recovered(recovered)) => {
                pending.push(RuntimeEvent::Recovered(recovered.report.clone()));
                (
                    restore(recovered.state),
                    LaunchOutcome::Recovered(recovered.report),
                )
            }
            Err(GameError::Unrecoverable) => {
                pending.push(RuntimeEvent::Unrecoverable);
                (fresh(), LaunchOutcome::Unrecoverable)
            }
            Err(err) => {
                warn!(target: TARGET_RUNTIME, "starting without stored state: {err}");
                (fresh(), LaunchOutcome::StoreUnavailable(err))
            }
        };

        let shutdown = CancellationToken::new();
        let shared = Arc::new(RuntimeShared {
            cache: ResourceCache::new(loader, config.cache.clone()),
            pressure: tokio::sync::Mutex::new(ResourcePressureCoordinator::new(
                config.pressure.clone(),
            )),
            catalog,
            seed,
            generation: AtomicU64::new(0),
            session: Mutex::new(session),
            persistence: tokio::sync::Mutex::new(manager),
            host_bytes: AtomicU64::new(0),
            events,
            session_token: Mutex::new(shutdown.child_token()),
            shutdown,
            tasks: Mutex::new(Vec::new()),
            handle: Handle::current(),
            config,
        });
        for event in pending {
            shared.emit(event);
        }
        RuntimeShared::spawn_session_tasks(&shared);
        RuntimeShared::spawn_runtime_tasks(&shared, lifecycle);
        info!(target: TARGET_RUNTIME, "runtime launched: {launch:?}");
        (Self { shared, launch }, receiver)
    }

    #[must_use]
    pub const fn launch_outcome(&self) -> &LaunchOutcome {
        &self.launch
    }

    /// Start play and fetch the first challenge's images.
    ///
    /// # Errors
    ///
    /// Returns `NoContentAvailable` when the catalog is empty.
    pub fn start(&self) -> Result<(), GameError> {
        self.shared.session.lock().start(Utc::now())?;
        self.shared.prefetch();
        Ok(())
    }

    pub fn select_image(&self, slot: Slot) -> Option<AnswerOutcome> {
        let outcome = self.shared.session.lock().select_image(slot)?;
        self.shared.after_transition(outcome.ended);
        Some(outcome)
    }

    /// Spend a power-up. A skip that exhausts the final pool ends the session.
    pub fn use_power_up(&self, kind: PowerUpKind) -> bool {
        let (used, ended) = {
            let mut session = self.shared.session.lock();
            let used = session.use_power_up(kind);
            let ended = session
                .outcome()
                .filter(|_| session.status() == SessionStatus::Ended);
            (used, ended)
        };
        if used && kind == PowerUpKind::Skip {
            self.shared.after_transition(ended);
        }
        used
    }

    pub fn pause(&self) -> bool {
        self.shared.session.lock().pause()
    }

    pub fn resume(&self) -> bool {
        let resumed = self.shared.session.lock().resume();
        if resumed {
            self.shared.prefetch();
        }
        resumed
    }

    pub fn end(&self) {
        let outcome = {
            let mut session = self.shared.session.lock();
            let was_running = matches!(
                session.status(),
                SessionStatus::Active | SessionStatus::Paused
            );
            session.end();
            session.outcome().filter(|_| was_running)
        };
        if outcome.is_some() {
            self.shared.after_transition(outcome);
        }
    }

    /// Replace an ended session with a fresh, not yet started one.
    pub fn new_session(&self) {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let session = GameSession::new(
            Arc::clone(&self.shared.catalog),
            self.shared.config.session.clone(),
            self.shared.seed.wrapping_add(generation),
        );
        *self.shared.session.lock() = session;
        RuntimeShared::spawn_session_tasks(&self.shared);
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.shared.session.lock().snapshot()
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.shared.session.lock().status()
    }

    #[must_use]
    pub fn current_challenge(&self) -> Option<Challenge> {
        self.shared.session.lock().current_challenge().cloned()
    }

    /// Read the session under its lock.
    pub fn with_session<R>(&self, read: impl FnOnce(&GameSession) -> R) -> R {
        read(&self.shared.session.lock())
    }

    #[must_use]
    pub fn cache(&self) -> &ResourceCache<L> {
        &self.shared.cache
    }

    /// Memory the host uses outside the cache and history, folded into the
    /// next pressure sample.
    pub fn report_host_memory(&self, bytes: u64) {
        self.shared.host_bytes.store(bytes, Ordering::Relaxed);
    }

    pub async fn pressure_level(&self) -> PressureLevel {
        self.shared.pressure.lock().await.level()
    }

    /// Handle a lifecycle signal directly (the listener task calls this too).
    pub async fn handle_lifecycle(&self, event: HostLifecycleEvent) {
        self.shared.handle_lifecycle(event).await;
    }

    /// Run one autosave cycle now.
    pub async fn autosave(&self) {
        self.shared.autosave().await;
    }

    /// Run one validation cycle now.
    pub async fn validate(&self) {
        self.shared.validate().await;
    }

    /// Run one pressure sample now.
    pub async fn sample_pressure(&self) -> Option<PressureResponse> {
        self.shared.sample_pressure().await
    }

    /// Stop every task and wait for them to finish.
    pub async fn shutdown(self) {
        self.shared.shutdown.cancel();
        let tasks: Vec<JoinHandle<()>> = self.shared.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(err) = task.await {
                warn!(target: TARGET_RUNTIME, "task ended abnormally: {err}");
            }
        }
        info!(target: TARGET_RUNTIME, "runtime stopped");
    }
}

impl<L: AssetLoader, S: SessionStore + 'static> RuntimeShared<L, S> {
    fn emit(&self, event: RuntimeEvent) {
        if self.events.send(event).is_err() {
            debug!(target: TARGET_RUNTIME, "event dropped; receiver closed");
        }
    }

    fn spawn(&self, task: impl std::future::Future<Output = ()> + Send + 'static) {
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(self.handle.spawn(task));
    }

    /// Clock, autosave and validation tasks; they stop when the session ends.
    fn spawn_session_tasks(shared: &Arc<Self>) {
        let token = {
            let mut slot = shared.session_token.lock();
            slot.cancel();
            *slot = shared.shutdown.child_token();
            slot.clone()
        };

        let runtime = Arc::clone(shared);
        let stop = token.clone();
        shared.spawn(async move {
            let mut ticker = interval(runtime.config.clock_tick());
            loop {
                tokio::select! {
                    () = stop.cancelled() => break,
                    _ = ticker.tick() => runtime.clock_tick(),
                }
            }
        });

        let runtime = Arc::clone(shared);
        let stop = token.clone();
        shared.spawn(async move {
            let mut ticker = interval(runtime.config.persistence.autosave_interval());
            loop {
                tokio::select! {
                    () = stop.cancelled() => break,
                    _ = ticker.tick() => runtime.autosave().await,
                }
            }
        });

        let runtime = Arc::clone(shared);
        shared.spawn(async move {
            let mut ticker = interval(runtime.config.persistence.validation_interval());
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => runtime.validate().await,
                }
            }
        });
    }

    /// Pressure sampling and the lifecycle listener; they live until shutdown.
    fn spawn_runtime_tasks(shared: &Arc<Self>, mut lifecycle: mpsc::Receiver<HostLifecycleEvent>) {
        let runtime = Arc::clone(shared);
        shared.spawn(async move {
            let mut ticker = interval(runtime.config.pressure.sample_interval());
            loop {
                tokio::select! {
                    () = runtime.shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        runtime.sample_pressure().await;
                    }
                }
            }
        });

        let runtime = Arc::clone(shared);
        shared.spawn(async move {
            loop {
                let event = tokio::select! {
                    () = runtime.shutdown.cancelled() => break,
                    event = lifecycle.recv() => event,
                };
                let Some(event) = event else {
                    break;
                };
                runtime.handle_lifecycle(event).await;
            }
        });
    }

    fn clock_tick(self: &Arc<Self>) {
        let tick = self.session.lock().tick();
        let Some(tick) = tick else {
            return;
        };
        self.emit(RuntimeEvent::Tick(tick));
        if tick.timed_out {
            self.after_transition(tick.ended);
        }
    }

    /// Prefetch for the new round, or wind down an ended session.
    fn after_transition(self: &Arc<Self>, ended: Option<SessionOutcome>) {
        let Some(outcome) = ended else {
            self.prefetch();
            return;
        };
        self.emit(RuntimeEvent::SessionEnded(outcome));
        self.session_token.lock().cancel();
        let pending = self.cache.cancel_preloads();
        debug!(target: TARGET_RUNTIME, "session ended; {pending} preloads cancelled");
        let state = self.session.lock().snapshot();
        let runtime = Arc::clone(self);
        self.spawn(async move {
            let result = runtime.persistence.lock().await.save_now(&state, Utc::now());
            if let Err(err) = result {
                runtime.emit(RuntimeEvent::SaveFailed(err));
            }
        });
    }

    /// Load the current challenge's images at once on the urgent pool and
    /// stagger the upcoming ones behind them.
    fn prefetch(&self) {
        let (current, mut upcoming) = {
            let session = self.session.lock();
            let current = session
                .current_challenge()
                .map(|challenge| challenge.asset_keys().to_vec())
                .unwrap_or_default();
            (current, session.upcoming_asset_keys(UPCOMING_PREFETCH))
        };
        upcoming.retain(|key| !current.contains(key));
        if !current.is_empty() {
            let cache = self.cache.clone();
            let token = self.session_token.lock().clone();
            self.spawn(async move {
                tokio::select! {
                    () = token.cancelled() => {}
                    results = cache.preload_critical(&current) => {
                        for (key, result) in results {
                            if let Err(err) = result {
                                debug!(
                                    target: TARGET_RUNTIME,
                                    "current image {key} not loaded: {err}"
                                );
                            }
                        }
                    }
                }
            });
        }
        let _context = self.handle.enter();
        self.cache.preload(&upcoming, PreloadPriority::Normal);
    }

    /// Snapshots only while holding the persistence lock.
    async fn autosave(self: &Arc<Self>) {
        let mut manager = self.persistence.lock().await;
        let (state, revision) = {
            let session = self.session.lock();
            if session.status() != SessionStatus::Active {
                return;
            }
            (session.snapshot(), session.revision())
        };
        let now = Utc::now();
        match manager.save(&state, now).await {
            Ok(()) => self.emit(RuntimeEvent::Autosaved { revision }),
            Err(GameError::ValidationFailure { .. }) => {
                let repaired = manager.verify(&state, now);
                drop(manager);
                self.settle_verification(repaired);
            }
            Err(err) => self.emit(RuntimeEvent::SaveFailed(err)),
        }
    }

    async fn validate(self: &Arc<Self>) {
        let repaired = self
            .persistence
            .lock()
            .await
            .verify_last_known_good(Utc::now());
        self.settle_verification(repaired);
    }

    async fn sample_pressure(&self) -> Option<PressureResponse> {
        let host_bytes = self.host_bytes.load(Ordering::Relaxed);
        let response = self
            .pressure
            .lock()
            .await
            .relieve(&self.cache, &self.persistence, &self.session, host_bytes)
            .await?;
        self.emit(RuntimeEvent::Pressure(response.clone()));
        Some(response)
    }

    async fn handle_lifecycle(self: &Arc<Self>, event: HostLifecycleEvent) {
        let now = Utc::now();
        if event.is_suspend() {
            let mut manager = self.persistence.lock().await;
            let state = {
                let mut session = self.session.lock();
                session.pause();
                session.snapshot()
            };
            match manager.save_now(&state, now) {
                Ok(()) => {}
                Err(GameError::ValidationFailure { .. }) => {
                    let repaired = manager.verify(&state, now);
                    drop(manager);
                    self.settle_verification(repaired);
                }
                Err(err) => self.emit(RuntimeEvent::SaveFailed(err)),
            }
        } else {
            let state = self.session.lock().snapshot();
            let repaired = self.persistence.lock().await.verify(&state, now);
            self.settle_verification(repaired);
        }
    }

    fn settle_verification(self: &Arc<Self>, repaired: Result<Option<Recovered>, GameError>) {
        match repaired {
            Ok(None) => {}
            Ok(Some(recovered)) => {
                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                let session = GameSession::from_state(
                    Arc::clone(&self.catalog),
                    self.config.session.clone(),
                    self.seed.wrapping_add(generation),
                    recovered.state,
                );
                *self.session.lock() = session;
                Self::spawn_session_tasks(self);
                self.emit(RuntimeEvent::Recovered(recovered.report));
            }
            Err(err) => {
                error!(target: TARGET_RUNTIME, "{err}");
                if let Ok(mut manager) = self.persistence.try_lock() {
                    manager.clear();
                }
                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                *self.session.lock() = GameSession::new(
                    Arc::clone(&self.catalog),
                    self.config.session.clone(),
                    self.seed.wrapping_add(generation),
                );
                Self::spawn_session_tasks(self);
                self.emit(RuntimeEvent::Unrecoverable);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SESSION_STATE_KEY;
    use crate::error::AssetError;
    use crate::persistence::{MemoryStore, RecoveryStep, open};
    use async_trait::async_trait;

    const MIB: u64 = 1024 * 1024;

    #[derive(Clone, Copy)]
    struct EchoLoader;

    #[async_trait]
    impl AssetLoader for EchoLoader {
        type Handle = String;

        async fn load(&self, key: &str) -> Result<String, AssetError> {
            Ok(key.to_string())
        }
    }

    struct Harness {
        runtime: SessionRuntime<EchoLoader, MemoryStore>,
        events: mpsc::UnboundedReceiver<RuntimeEvent>,
        _lifecycle: mpsc::Sender<HostLifecycleEvent>,
    }

    async fn launch(store: &MemoryStore) -> Harness {
        launch_with(store, RuntimeConfig::default()).await
    }

    async fn launch_with(store: &MemoryStore, config: RuntimeConfig) -> Harness {
        let catalog = Arc::new(BreedCatalog::bundled().unwrap());
        let (lifecycle, lifecycle_rx) = mpsc::channel(4);
        let (runtime, events) = SessionRuntime::launch(
            catalog,
            EchoLoader,
            store.clone(),
            config,
            42,
            lifecycle_rx,
        )
        .await;
        Harness {
            runtime,
            events,
            _lifecycle: lifecycle,
        }
    }

    async fn next_matching<T>(
        events: &mut mpsc::UnboundedReceiver<RuntimeEvent>,
        mut pick: impl FnMut(RuntimeEvent) -> Option<T>,
    ) -> T {
        loop {
            let event = events.recv().await.expect("event stream open");
            if let Some(found) = pick(event) {
                return found;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn autosave_runs_while_active() {
        let store = MemoryStore::new();
        let mut harness = launch(&store).await;
        assert_eq!(harness.runtime.launch_outcome(), &LaunchOutcome::Fresh);
        harness.runtime.start().unwrap();

        let revision = next_matching(&mut harness.events, |event| match event {
            RuntimeEvent::Autosaved { revision } => Some(revision),
            _ => None,
        })
        .await;
        assert!(revision > 0);
        assert!(store.contains(SESSION_STATE_KEY));
        harness.runtime.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn clock_ticks_reach_the_host() {
        let store = MemoryStore::new();
        let mut harness = launch(&store).await;
        harness.runtime.start().unwrap();
        let tick = next_matching(&mut harness.events, |event| match event {
            RuntimeEvent::Tick(tick) => Some(tick),
            _ => None,
        })
        .await;
        assert_eq!(tick.remaining, 9);
        assert!(!tick.timed_out);
        harness.runtime.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn suspend_pauses_and_saves() {
        let store = MemoryStore::new();
        let harness = launch(&store).await;
        let runtime = &harness.runtime;
        runtime.start().unwrap();

        runtime.handle_lifecycle(HostLifecycleEvent::Backgrounded).await;
        assert_eq!(runtime.status(), SessionStatus::Paused);
        assert!(store.contains(SESSION_STATE_KEY));

        runtime.handle_lifecycle(HostLifecycleEvent::Foregrounded).await;
        assert_eq!(runtime.status(), SessionStatus::Paused);
        assert!(runtime.resume());
        assert_eq!(runtime.status(), SessionStatus::Active);
        harness.runtime.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn relaunch_recovers_from_history() {
        let store = MemoryStore::new();
        let first = launch(&store).await;
        first.runtime.start().unwrap();
        let slot = first.runtime.current_challenge().unwrap().correct_slot;
        first.runtime.select_image(slot).unwrap();
        let score = first.runtime.snapshot().score;
        first
            .runtime
            .handle_lifecycle(HostLifecycleEvent::Inactive)
            .await;
        first.runtime.shutdown().await;

        store.put_raw(
            SESSION_STATE_KEY,
            b"{\"version\":1,\"checksum\":1,\"state\":{}}".to_vec(),
        );
        let mut second = launch(&store).await;
        let LaunchOutcome::Recovered(report) = second.runtime.launch_outcome().clone() else {
            panic!("expected recovery");
        };
        assert_eq!(report.step, RecoveryStep::History);
        assert_eq!(second.runtime.status(), SessionStatus::Paused);
        assert_eq!(second.runtime.snapshot().score, score);
        let event = second.events.recv().await.unwrap();
        assert_eq!(event, RuntimeEvent::Recovered(report));
        second.runtime.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unrecoverable_store_starts_fresh() {
        let store = MemoryStore::new();
        store.put_raw(SESSION_STATE_KEY, b"garbage".to_vec());
        let mut harness = launch(&store).await;
        assert_eq!(
            harness.runtime.launch_outcome(),
            &LaunchOutcome::Unrecoverable
        );
        assert_eq!(
            harness.events.recv().await,
            Some(RuntimeEvent::Unrecoverable)
        );
        assert_eq!(harness.runtime.status(), SessionStatus::NotStarted);
        assert!(!store.contains(SESSION_STATE_KEY));
        harness.runtime.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn running_out_of_time_loses_the_session() {
        let store = MemoryStore::new();
        let mut harness = launch(&store).await;
        harness.runtime.start().unwrap();
        let outcome = next_matching(&mut harness.events, |event| match event {
            RuntimeEvent::SessionEnded(outcome) => Some(outcome),
            _ => None,
        })
        .await;
        assert_eq!(outcome, SessionOutcome::Lost);
        assert_eq!(harness.runtime.status(), SessionStatus::Ended);
        assert_eq!(harness.runtime.cache().pending_preloads(), 0);

        harness.runtime.new_session();
        assert_eq!(harness.runtime.status(), SessionStatus::NotStarted);
        harness.runtime.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn current_images_are_prefetched() {
        let store = MemoryStore::new();
        let harness = launch(&store).await;
        harness.runtime.start().unwrap();
        let keys = harness.runtime.current_challenge().unwrap().asset_keys();
        tokio::time::sleep(Duration::from_millis(500)).await;
        for key in &keys {
            assert!(harness.runtime.cache().contains(key), "{key} not cached");
        }
        harness.runtime.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn current_images_load_before_upcoming() {
        let store = MemoryStore::new();
        let harness = launch(&store).await;
        harness.runtime.start().unwrap();
        let current = harness.runtime.current_challenge().unwrap().asset_keys();
        let upcoming: Vec<String> = harness
            .runtime
            .with_session(|session| session.upcoming_asset_keys(UPCOMING_PREFETCH))
            .into_iter()
            .filter(|key| !current.contains(key))
            .collect();
        assert!(!upcoming.is_empty());

        tokio::time::sleep(Duration::from_millis(1)).await;
        let cache = harness.runtime.cache();
        for key in &current {
            assert!(cache.contains(key), "{key} not cached");
        }
        for key in &upcoming {
            assert!(!cache.contains(key), "{key} loaded ahead of the current images");
        }

        tokio::time::sleep(Duration::from_secs(3)).await;
        for key in &upcoming {
            assert!(cache.contains(key), "{key} never prefetched");
        }
        harness.runtime.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn queued_autosave_stores_the_latest_answer() {
        let store = MemoryStore::new();
        let harness = launch(&store).await;
        let runtime = &harness.runtime;
        runtime.start().unwrap();

        let held = runtime.shared.persistence.lock().await;
        let shared = Arc::clone(&runtime.shared);
        let queued = tokio::spawn(async move { shared.autosave().await });
        tokio::task::yield_now().await;
        let slot = runtime.current_challenge().unwrap().correct_slot;
        runtime.select_image(slot).unwrap();
        drop(held);
        queued.await.unwrap();

        let saved: SessionState = open(&store.raw(SESSION_STATE_KEY).unwrap()).unwrap();
        assert_eq!(saved.total_questions, 1);
        assert_eq!(saved.score, runtime.snapshot().score);
        harness.runtime.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn queued_autosave_never_overwrites_the_ending() {
        let store = MemoryStore::new();
        let harness = launch(&store).await;
        harness.runtime.start().unwrap();

        let held = harness.runtime.shared.persistence.lock().await;
        let shared = Arc::clone(&harness.runtime.shared);
        let queued = tokio::spawn(async move { shared.autosave().await });
        tokio::task::yield_now().await;
        harness.runtime.end();
        drop(held);
        queued.await.unwrap();
        harness.runtime.shutdown().await;

        let saved: SessionState = open(&store.raw(SESSION_STATE_KEY).unwrap()).unwrap();
        assert!(!saved.is_active);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_config_falls_back_to_defaults() {
        let mut config = RuntimeConfig::default();
        config.session.max_lives = 9;
        config.cache.max_items = 0;
        let store = MemoryStore::new();
        let harness = launch_with(&store, config).await;
        assert_eq!(harness.runtime.shared.config, RuntimeConfig::default());
        harness.runtime.start().unwrap();
        assert_eq!(harness.runtime.snapshot().lives, 3);
        harness.runtime.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn host_memory_drives_pressure_relief() {
        let store = MemoryStore::new();
        let mut harness = launch(&store).await;
        harness.runtime.report_host_memory(200 * MIB);
        let response = harness.runtime.sample_pressure().await.unwrap();
        assert_eq!(response.transition.level, PressureLevel::Critical);
        assert_eq!(harness.runtime.pressure_level().await, PressureLevel::Critical);
        assert_eq!(
            harness.events.recv().await,
            Some(RuntimeEvent::Pressure(response))
        );
        assert_eq!(harness.runtime.sample_pressure().await, None);
        harness.runtime.shutdown().await;
    }
}
