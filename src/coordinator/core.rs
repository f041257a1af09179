//! Load coordinator implementation
//!
//! The coordinator owns an iteration counter. Every iteration gets a fresh
//! [`LoadUnit`] and [`LoadSession`]; every effect (a resolved future, an
//! error, `set_data`, a session retry) is applied only while its iteration
//! is still current. Superseded results are dropped, never queued.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::ReentrantMutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::{MountConfig, MountProps};
use crate::error::{BoxError, LoaderError, RawError};
use crate::policy::{Policies, ShouldLoad};
use crate::session::LoadSession;
use crate::sink::StateOwnership;
use crate::state::{Loadable, ResourceState, Transition};
use crate::unit::{Action, Actions, LoadUnit, Loaded, LoaderFactory};

/// Mutable bookkeeping guarded by one lock
struct Core<T, O> {
    /// Latest iteration started
    current: u64,
    /// Once set, no iteration is current again
    torn_down: bool,
    /// Latest options argument
    options: O,
    /// Unit of the current iteration
    unit: Option<LoadUnit<T>>,
    /// Spawned load and teardown tasks
    tasks: Vec<JoinHandle<()>>,
}

impl<T, O> Core<T, O> {
    fn is_current(&self, iteration: u64) -> bool {
        !self.torn_down && self.current == iteration
    }

    fn prune_finished(&mut self) {
        self.tasks.retain(|task| !task.is_finished());
    }
}

/// An iteration that has been started but has no unit yet
struct Started<T, O> {
    iteration: u64,
    options: O,
    previous: Option<LoadUnit<T>>,
}

/// State shared between the coordinator, its sessions and its tasks
pub struct Shared<T, O, E> {
    name: String,
    core: Mutex<Core<T, O>>,
    /// Serializes publishing against iteration changes. Reentrant, so
    /// callbacks may call back into the coordinator on the same thread.
    gate: ReentrantMutex<()>,
    ownership: StateOwnership<T, O, E>,
    factory: Arc<dyn LoaderFactory<T, O, E>>,
    policies: Policies<O, E>,
    should_load: Option<ShouldLoad<O>>,
    config: MountConfig,
    empty_options: Option<O>,
}

impl<T: Loadable, O: Loadable, E: Loadable> Shared<T, O, E> {
    fn lock_core(&self) -> MutexGuard<'_, Core<T, O>> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_current(&self, iteration: u64) -> bool {
        self.lock_core().is_current(iteration)
    }

    pub(crate) fn active_state(&self) -> ResourceState<T, O, E> {
        self.ownership.active()
    }

    fn current_options(&self) -> O {
        self.lock_core().options.clone()
    }

    /// Publish the transition built from the current options, only while
    /// `iteration` is current
    ///
    /// The check, the options read and the commit happen under the gate, so
    /// no iteration can start in between.
    fn publish<F>(&self, iteration: u64, build: F) -> bool
    where
        F: FnOnce(O) -> Transition<T, O, E>,
    {
        let _gate = self.gate.lock();
        let options = {
            let core = self.lock_core();
            if !core.is_current(iteration) {
                return false;
            }
            core.options.clone()
        };
        self.ownership.commit(build(options));
        true
    }

    fn track(&self, task: JoinHandle<()>) {
        let mut core = self.lock_core();
        core.prune_finished();
        core.tasks.push(task);
    }

    /// Bump the iteration; callers hold the gate
    fn advance(&self) -> Option<Started<T, O>> {
        let mut core = self.lock_core();
        if core.torn_down {
            return None;
        }
        core.current += 1;
        Some(Started {
            iteration: core.current,
            options: core.options.clone(),
            previous: core.unit.take(),
        })
    }

    /// Retire the previous unit and build the next one
    fn build_unit(self: &Arc<Self>, started: Started<T, O>) -> u64 {
        let Started {
            iteration,
            options,
            previous,
        } = started;
        debug!(loader = %self.name, iteration, "Starting iteration");

        if let Some(unit) = previous {
            unit.retire();
        }

        let session = LoadSession::new(iteration, options, Arc::downgrade(self));
        let unit = self.factory.create(session);

        let stale = {
            let mut core = self.lock_core();
            if core.is_current(iteration) {
                core.unit = Some(unit);
                None
            } else {
                Some(unit)
            }
        };
        if let Some(unit) = stale {
            debug!(loader = %self.name, iteration, "Iteration superseded while building its unit");
            unit.retire();
        }
        iteration
    }

    fn begin_iteration(self: &Arc<Self>) -> Option<u64> {
        let started = {
            let _gate = self.gate.lock();
            self.advance()
        }?;
        Some(self.build_unit(started))
    }

    fn should_load(&self, options: &O) -> bool {
        self.should_load.as_ref().is_none_or(|predicate| predicate(options))
    }

    fn load(self: &Arc<Self>, iteration: u64) {
        let options = self.current_options();
        if !self.should_load(&options) {
            debug!(loader = %self.name, iteration, "Load skipped by should_load_data");
            return;
        }

        let loader = {
            let core = self.lock_core();
            if !core.is_current(iteration) {
                return;
            }
            match core.unit.as_ref() {
                Some(unit) => unit.loader(),
                None => return,
            }
        };

        match panic::catch_unwind(AssertUnwindSafe(|| loader())) {
            Ok(Loaded::Ready(Ok(data))) => self.settle(iteration, data),
            Ok(Loaded::Ready(Err(error))) => self.fail(iteration, Arc::from(error)),
            Ok(Loaded::Pending(future)) => {
                if self.publish(iteration, |options| Transition::Loading { options }) {
                    self.await_pending(iteration, future);
                } else {
                    debug!(loader = %self.name, iteration, "Superseded before awaiting, dropping future");
                }
            }
            Err(payload) => self.fail(iteration, LoaderError::from_panic(payload).into_raw()),
        }
    }

    fn await_pending(self: &Arc<Self>, iteration: u64, future: BoxFuture<'static, Result<T, BoxError>>) {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!(loader = %self.name, iteration, "No runtime to await pending load");
                self.fail(iteration, LoaderError::NoRuntime.into_raw());
                return;
            }
        };

        let weak = Arc::downgrade(self);
        let task = runtime.spawn(async move {
            let outcome = AssertUnwindSafe(future).catch_unwind().await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            match outcome {
                Ok(Ok(data)) => shared.settle(iteration, data),
                Ok(Err(error)) => shared.fail(iteration, Arc::from(error)),
                Err(payload) => shared.fail(iteration, LoaderError::from_panic(payload).into_raw()),
            }
        });
        self.track(task);
    }

    fn settle(&self, iteration: u64, data: T) {
        if !self.publish(iteration, |options| Transition::Loaded { data, options }) {
            debug!(loader = %self.name, iteration, "Discarding stale result");
        }
    }

    fn fail(&self, iteration: u64, raw_error: RawError) {
        if !self.is_current(iteration) {
            debug!(loader = %self.name, iteration, "Discarding stale error");
            return;
        }
        let error = self.policies.normalize(&raw_error);
        let shown = raw_error.clone();
        let applied = self.publish(iteration, |options| Transition::Failed {
            error,
            raw_error,
            options,
        });
        if applied {
            warn!(loader = %self.name, iteration, error = %shown, "Load failed");
        } else {
            debug!(loader = %self.name, iteration, "Discarding stale error");
        }
    }

    pub(crate) fn set_data(&self, iteration: u64, data: T) {
        if !self.publish(iteration, |_| Transition::DataSet { data }) {
            debug!(loader = %self.name, iteration, "Ignoring set_data from superseded session");
        }
    }

    pub(crate) fn reload(self: &Arc<Self>) {
        if let Some(iteration) = self.begin_iteration() {
            self.load(iteration);
        }
    }

    /// Record the new options and, if they differ, start an iteration for
    /// them; both happen under the gate so no result is published with
    /// options its iteration was not started for
    fn options_changed(self: &Arc<Self>, options: O) {
        let started = {
            let _gate = self.gate.lock();
            let previous = {
                let mut core = self.lock_core();
                std::mem::replace(&mut core.options, options.clone())
            };
            if self.policies.options_equal(&previous, &options) {
                debug!(loader = %self.name, "Options unchanged, keeping current iteration");
                return;
            }
            self.advance()
        };
        if let Some(started) = started {
            let iteration = self.build_unit(started);
            self.load(iteration);
        }
    }

    fn actions(self: &Arc<Self>) -> Actions {
        let weak = Arc::downgrade(self);
        let retry: Action = Arc::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.reload();
            }
        });
        let core = self.lock_core();
        match core.unit.as_ref() {
            Some(unit) => Actions::new(retry, unit.actions()),
            None => Actions::new(retry, &BTreeMap::new()),
        }
    }
}

impl<T: Loadable, O: Loadable + Default, E: Loadable> Shared<T, O, E> {
    fn teardown(&self) {
        let unit = {
            let _gate = self.gate.lock();
            let mut core = self.lock_core();
            if core.torn_down {
                return;
            }
            core.torn_down = true;
            core.unit.take()
        };
        info!(loader = %self.name, "Tearing down");

        if let Some(unit) = unit {
            unit.retire();
        }

        if self.config.empty_on_unmount {
            self.schedule_empty();
        }
    }

    /// Emit the empty state after a short delay, so an immediate remount
    /// does not flash an empty view
    fn schedule_empty(&self) {
        let Some(write) = self.ownership.writer() else {
            return;
        };
        let options = self.empty_options.clone().unwrap_or_default();
        let empty = ResourceState::empty(options);
        let delay = self.config.teardown_delay();

        match Handle::try_current() {
            Ok(runtime) => {
                let task = runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    write(empty);
                });
                self.track(task);
            }
            Err(_) => {
                warn!(loader = %self.name, "No runtime to defer the empty state, emitting now");
                write(empty);
            }
        }
    }
}

/// Drives loads for one mounted resource
///
/// Dropping the coordinator tears it down.
pub struct LoadCoordinator<T: Loadable, O: Loadable + Default, E: Loadable = String> {
    shared: Arc<Shared<T, O, E>>,
}

/// State plus actions, as handed to the rendering side
#[derive(Debug, Clone)]
pub struct LoaderSnapshot<T, O, E = String> {
    pub state: ResourceState<T, O, E>,
    pub actions: Actions,
}

impl<T: Loadable, O: Loadable + Default, E: Loadable> LoadCoordinator<T, O, E> {
    /// Mount a coordinator: build iteration 1 and, unless the lazy-reload
    /// check says the active state is already current, load it
    pub(crate) fn start(
        name: String,
        factory: Arc<dyn LoaderFactory<T, O, E>>,
        policies: Policies<O, E>,
        default_should_load: Option<ShouldLoad<O>>,
        props: MountProps<T, O, E>,
    ) -> Self {
        let MountProps {
            options,
            initial_state,
            state_reader,
            on_state_update,
            should_load_data,
            config,
            empty_options,
        } = props;

        let seed = initial_state
            .or_else(|| state_reader.as_ref().and_then(|read| read()))
            .unwrap_or_else(|| ResourceState::empty(options.clone()));
        let merged = ResourceState {
            options: options.clone(),
            ..seed
        };

        let ownership = match (state_reader, on_state_update) {
            (Some(read), Some(write)) => StateOwnership::external(read, write, merged),
            (_, notify) => StateOwnership::internal(merged, notify),
        };

        let shared = Arc::new(Shared {
            name,
            core: Mutex::new(Core {
                current: 0,
                torn_down: false,
                options: options.clone(),
                unit: None,
                tasks: Vec::new(),
            }),
            gate: ReentrantMutex::new(()),
            ownership,
            factory,
            policies,
            should_load: should_load_data.or(default_should_load),
            config,
            empty_options,
        });
        info!(
            loader = %shared.name,
            controlled = shared.ownership.is_controlled(),
            "Mounting coordinator"
        );

        let coordinator = Self { shared };
        if let Some(iteration) = coordinator.shared.begin_iteration() {
            if coordinator.is_already_loaded(&options) {
                debug!(loader = %coordinator.shared.name, "Active state already loaded, skipping initial load");
            } else {
                coordinator.shared.load(iteration);
            }
        }
        coordinator
    }

    fn is_already_loaded(&self, options: &O) -> bool {
        if !self.shared.config.lazy_reload_on_mount {
            return false;
        }
        let active = self.shared.active_state();
        active.loaded_once && !active.loading && self.shared.policies.options_equal(&active.options, options)
    }

    /// Display name of the loader this coordinator was mounted from
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Reload when the options differ from the previous options argument
    pub fn on_options_changed(&self, options: O) {
        self.shared.options_changed(options);
    }

    /// Start a new iteration and load it
    pub fn retry(&self) {
        self.shared.reload();
    }

    /// Retire the active unit and stop applying effects; idempotent
    pub fn teardown(&self) {
        self.shared.teardown();
    }

    /// The snapshot currently in effect
    pub fn state(&self) -> ResourceState<T, O, E> {
        self.shared.active_state()
    }

    /// State and actions for rendering
    pub fn snapshot(&self) -> LoaderSnapshot<T, O, E> {
        LoaderSnapshot {
            state: self.shared.active_state(),
            actions: self.shared.actions(),
        }
    }

    /// Latest iteration started
    pub fn iteration(&self) -> u64 {
        self.shared.lock_core().current
    }

    pub fn is_controlled(&self) -> bool {
        self.shared.ownership.is_controlled()
    }

    pub fn is_torn_down(&self) -> bool {
        self.shared.lock_core().torn_down
    }

    /// Spawned tasks that have not finished yet
    pub fn in_flight(&self) -> usize {
        let mut core = self.shared.lock_core();
        core.prune_finished();
        core.tasks.len()
    }

    /// Wait until every spawned load and deferred emission has finished
    pub async fn settled(&self) {
        loop {
            let pending = std::mem::take(&mut self.shared.lock_core().tasks);
            if pending.is_empty() {
                break;
            }
            for task in pending {
                if let Err(e) = task.await {
                    warn!(loader = %self.shared.name, error = %e, "Load task did not complete");
                }
            }
        }
    }
}

impl<T: Loadable, O: Loadable + Default, E: Loadable> Drop for LoadCoordinator<T, O, E> {
    fn drop(&mut self) {
        self.shared.teardown();
    }
}

impl<T: Loadable, O: Loadable + Default + fmt::Debug, E: Loadable> fmt::Debug for LoadCoordinator<T, O, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.shared.lock_core();
        f.debug_struct("LoadCoordinator")
            .field("name", &self.shared.name)
            .field("iteration", &core.current)
            .field("torn_down", &core.torn_down)
            .field("options", &core.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{DataLoader, LoaderConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Recorded = Arc<Mutex<Vec<ResourceState<String, u32>>>>;

    fn recorder() -> (Recorded, impl Fn(ResourceState<String, u32>) + Send + Sync + 'static) {
        let seen: Recorded = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |state| sink.lock().unwrap().push(state))
    }

    fn counting_loader(cleanups: Arc<AtomicUsize>) -> DataLoader<String, u32> {
        DataLoader::new(
            move |session: LoadSession<String, u32>| {
                let cleanups = cleanups.clone();
                let label = format!("options {}", session.options());
                LoadUnit::new(move || Loaded::value(label.clone())).with_cleanup(move || {
                    cleanups.fetch_add(1, Ordering::SeqCst);
                })
            },
            LoaderConfig::default(),
        )
    }

    #[test]
    fn test_mount_starts_first_iteration() {
        let loader = counting_loader(Arc::new(AtomicUsize::new(0)));
        let coordinator = loader.mount(MountProps::new(7));
        assert_eq!(coordinator.iteration(), 1);
        assert_eq!(coordinator.name(), "Data.Loader");
        assert!(!coordinator.is_controlled());
        assert!(!coordinator.is_torn_down());
        assert_eq!(coordinator.state().data.as_deref(), Some("options 7"));
    }

    #[test]
    fn test_retry_during_unit_construction_supersedes_it() {
        let built = Arc::new(AtomicUsize::new(0));
        let cleanups = Arc::new(AtomicUsize::new(0));
        let (counter, retired) = (built.clone(), cleanups.clone());
        let loader = DataLoader::new(
            move |session: LoadSession<String, u32>| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    session.retry();
                }
                let retired = retired.clone();
                let iteration = session.iteration();
                LoadUnit::new(move || Loaded::value(format!("iteration {}", iteration))).with_cleanup(move || {
                    retired.fetch_add(1, Ordering::SeqCst);
                })
            },
            LoaderConfig::default(),
        );

        let coordinator = loader.mount(MountProps::new(1));

        assert_eq!(coordinator.iteration(), 2);
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.state().data.as_deref(), Some("iteration 2"));
    }

    #[test]
    fn test_options_change_tracks_latest_argument() {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let coordinator = counting_loader(cleanups.clone()).mount(MountProps::new(1));

        coordinator.on_options_changed(2);
        coordinator.on_options_changed(2);
        coordinator.on_options_changed(1);

        assert_eq!(coordinator.iteration(), 3);
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
        assert_eq!(coordinator.state().options, 1);
    }

    #[test]
    fn test_publish_after_teardown_is_dropped() {
        let (seen, record) = recorder();
        let coordinator = counting_loader(Arc::new(AtomicUsize::new(0))).mount(MountProps::new(1).on_state_update(record));
        coordinator.teardown();

        let applied = coordinator.shared.publish(1, |_| Transition::DataSet { data: "late".to_string() });

        assert!(!applied);
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(coordinator.state().data.as_deref(), Some("options 1"));
    }

    #[test]
    fn test_empty_state_without_runtime_is_immediate() {
        let (seen, record) = recorder();
        let coordinator = counting_loader(Arc::new(AtomicUsize::new(0))).mount(
            MountProps::new(4)
                .state_reader(|| None)
                .on_state_update(record)
                .empty_on_unmount(true),
        );

        coordinator.teardown();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], ResourceState::empty(0));
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[test]
    fn test_empty_state_uses_configured_options() {
        let (seen, record) = recorder();
        let coordinator = counting_loader(Arc::new(AtomicUsize::new(0))).mount(
            MountProps::new(4)
                .state_reader(|| None)
                .on_state_update(record)
                .empty_on_unmount(true)
                .empty_options(42),
        );

        coordinator.teardown();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], ResourceState::empty(42));
    }

    #[test]
    fn test_callback_may_reenter_coordinator() {
        let actions: Arc<Mutex<Option<Actions>>> = Arc::new(Mutex::new(None));
        let retried = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let (slot, once) = (actions.clone(), retried.clone());
        let coordinator = counting_loader(Arc::new(AtomicUsize::new(0))).mount(MountProps::new(1).on_state_update(
            move |_state: ResourceState<String, u32>| {
                let current = slot.lock().unwrap().clone();
                if let Some(actions) = current {
                    if !once.swap(true, Ordering::SeqCst) {
                        actions.retry();
                    }
                }
            },
        ));
        *actions.lock().unwrap() = Some(coordinator.snapshot().actions);

        coordinator.retry();

        assert!(retried.load(Ordering::SeqCst));
        assert_eq!(coordinator.iteration(), 3);
        assert_eq!(coordinator.state().data.as_deref(), Some("options 1"));
    }

    #[tokio::test]
    async fn test_settled_without_tasks_returns() {
        let coordinator = counting_loader(Arc::new(AtomicUsize::new(0))).mount(MountProps::new(1));
        coordinator.settled().await;
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_pending_load_is_tracked_until_settled() {
        let loader: DataLoader<String, u32> = DataLoader::new(
            |_session: LoadSession<String, u32>| {
                LoadUnit::new(|| {
                    Loaded::future(async {
                        tokio::task::yield_now().await;
                        Ok::<_, BoxError>("done".to_string())
                    })
                })
            },
            LoaderConfig::default(),
        );
        let coordinator = loader.mount(MountProps::new(1));
        assert_eq!(coordinator.in_flight(), 1);
        assert!(coordinator.state().loading);

        coordinator.settled().await;

        assert_eq!(coordinator.in_flight(), 0);
        assert_eq!(coordinator.state().data.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn test_panicking_future_becomes_error() {
        let loader: DataLoader<String, u32> = DataLoader::new(
            |_session: LoadSession<String, u32>| {
                LoadUnit::new(|| {
                    Loaded::future(async {
                        tokio::task::yield_now().await;
                        if true {
                            panic!("async boom");
                        }
                        Ok::<_, BoxError>(String::new())
                    })
                })
            },
            LoaderConfig::default(),
        );
        let coordinator = loader.mount(MountProps::new(1));
        coordinator.settled().await;

        let state = coordinator.state();
        assert!(!state.loading);
        assert_eq!(state.error.as_deref(), Some("Loader panicked: async boom"));
    }

    #[test]
    fn test_debug_output() {
        let coordinator = counting_loader(Arc::new(AtomicUsize::new(0))).mount(MountProps::new(9));
        let debug = format!("{:?}", coordinator);
        assert!(debug.contains("Data.Loader"));
        assert!(debug.contains("iteration: 1"));
        assert!(debug.contains("options: 9"));
    }
}
