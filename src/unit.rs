//! Load units and the factory that builds them
//!
//! A [`LoadUnit`] is produced once per iteration by a [`LoaderFactory`]. It
//! carries the loader itself, optional named actions exposed to the
//! rendering side, and an optional cleanup run exactly once when the unit is
//! retired.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::BoxError;
use crate::session::LoadSession;

/// Name of the built-in retry action
pub const RETRY_ACTION: &str = "retry";

/// A named imperative action
pub type Action = Arc<dyn Fn() + Send + Sync>;

/// The loader function of a unit
pub type LoaderFn<T> = Arc<dyn Fn() -> Loaded<T> + Send + Sync>;

/// Result of calling a loader
pub enum Loaded<T> {
    /// Value (or error) available immediately
    Ready(Result<T, BoxError>),
    /// Value (or error) produced by a future
    Pending(BoxFuture<'static, Result<T, BoxError>>),
}

impl<T> Loaded<T> {
    /// Immediate success
    pub fn value(data: T) -> Self {
        Loaded::Ready(Ok(data))
    }

    /// Immediate failure
    pub fn error(error: impl Into<BoxError>) -> Self {
        Loaded::Ready(Err(error.into()))
    }

    /// Deferred result
    pub fn future<F, Err>(future: F) -> Self
    where
        F: Future<Output = Result<T, Err>> + Send + 'static,
        T: 'static,
        Err: Into<BoxError> + 'static,
    {
        Loaded::Pending(future.map(|result| result.map_err(Into::into)).boxed())
    }

    /// True when awaiting is required
    pub fn is_pending(&self) -> bool {
        matches!(self, Loaded::Pending(_))
    }
}

impl<T> From<Result<T, BoxError>> for Loaded<T> {
    fn from(result: Result<T, BoxError>) -> Self {
        Loaded::Ready(result)
    }
}

impl<T> fmt::Debug for Loaded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Loaded::Ready(Ok(_)) => f.write_str("Loaded::Ready(Ok(..))"),
            Loaded::Ready(Err(e)) => write!(f, "Loaded::Ready(Err({e}))"),
            Loaded::Pending(_) => f.write_str("Loaded::Pending(..)"),
        }
    }
}

/// Everything one iteration needs: loader, actions, cleanup
pub struct LoadUnit<T> {
    loader: LoaderFn<T>,
    actions: BTreeMap<String, Action>,
    cleanup: Option<Box<dyn FnOnce() + Send>>,
}

impl<T> LoadUnit<T> {
    /// Create a unit around a loader
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Loaded<T> + Send + Sync + 'static,
    {
        Self {
            loader: Arc::new(loader),
            actions: BTreeMap::new(),
            cleanup: None,
        }
    }

    /// Add a named action; a `retry` entry replaces the built-in one
    pub fn with_action<F>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.actions.insert(name.into(), Arc::new(action));
        self
    }

    /// Set the cleanup run when this unit is retired
    pub fn with_cleanup<F>(mut self, cleanup: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.cleanup = Some(Box::new(cleanup));
        self
    }

    pub(crate) fn loader(&self) -> LoaderFn<T> {
        self.loader.clone()
    }

    pub(crate) fn actions(&self) -> &BTreeMap<String, Action> {
        &self.actions
    }

    /// Run cleanup; a unit can only be retired once
    pub(crate) fn retire(mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

/// Builds a fresh unit for each iteration
pub trait LoaderFactory<T, O, E>: Send + Sync {
    fn create(&self, session: LoadSession<T, O, E>) -> LoadUnit<T>;
}

impl<F, T, O, E> LoaderFactory<T, O, E> for F
where
    F: Fn(LoadSession<T, O, E>) -> LoadUnit<T> + Send + Sync,
{
    fn create(&self, session: LoadSession<T, O, E>) -> LoadUnit<T> {
        self(session)
    }
}

/// Actions handed to the rendering side: `retry` plus custom actions
#[derive(Clone, Default)]
pub struct Actions {
    entries: BTreeMap<String, Action>,
}

impl Actions {
    pub(crate) fn new(retry: Action, custom: &BTreeMap<String, Action>) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(RETRY_ACTION.to_string(), retry);
        for (name, action) in custom {
            entries.insert(name.clone(), action.clone());
        }
        Self { entries }
    }

    /// Invoke the retry action
    pub fn retry(&self) {
        self.invoke(RETRY_ACTION);
    }

    /// Invoke an action by name; false when no such action exists
    pub fn invoke(&self, name: &str) -> bool {
        match self.entries.get(name) {
            Some(action) => {
                action();
                true
            }
            None => false,
        }
    }

    /// Look up an action by name
    pub fn get(&self, name: &str) -> Option<&Action> {
        self.entries.get(name)
    }

    /// Names of all available actions
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for Actions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actions").field("names", &self.names()).finish()
    }
}
