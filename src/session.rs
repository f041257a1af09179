//! Per-iteration capability handle
//!
//! A `LoadSession` is tagged with the iteration it was created for and holds
//! only a weak reference to the coordinator. Once a newer iteration starts,
//! or the coordinator is torn down or dropped, its mutating capabilities
//! become no-ops while the read accessors keep reflecting the live state.

use std::fmt;
use std::sync::Weak;

use crate::coordinator::Shared;
use crate::error::RawError;
use crate::state::{Loadable, ResourceState};

/// Capabilities scoped to a single load iteration
pub struct LoadSession<T, O, E = String> {
    iteration: u64,
    options: O,
    shared: Weak<Shared<T, O, E>>,
}

impl<T, O: Clone, E> Clone for LoadSession<T, O, E> {
    fn clone(&self) -> Self {
        Self {
            iteration: self.iteration,
            options: self.options.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<T, O: fmt::Debug, E> fmt::Debug for LoadSession<T, O, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadSession")
            .field("iteration", &self.iteration)
            .field("options", &self.options)
            .finish()
    }
}

impl<T: Loadable, O: Loadable, E: Loadable> LoadSession<T, O, E> {
    pub(crate) fn new(iteration: u64, options: O, shared: Weak<Shared<T, O, E>>) -> Self {
        Self {
            iteration,
            options,
            shared,
        }
    }

    /// Iteration this session belongs to
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// True once this session no longer names the active iteration
    pub fn destroyed(&self) -> bool {
        match self.shared.upgrade() {
            Some(shared) => !shared.is_current(self.iteration),
            None => true,
        }
    }

    /// Options captured when the session was created
    pub fn options(&self) -> &O {
        &self.options
    }

    /// Current state of the coordinator, if it still exists
    pub fn state(&self) -> Option<ResourceState<T, O, E>> {
        self.shared.upgrade().map(|shared| shared.active_state())
    }

    /// Current data
    pub fn data(&self) -> Option<T> {
        self.state().and_then(|s| s.data)
    }

    /// Current loading flag
    pub fn loading(&self) -> bool {
        self.state().is_some_and(|s| s.loading)
    }

    /// Current normalized error
    pub fn error(&self) -> Option<E> {
        self.state().and_then(|s| s.error)
    }

    /// Current raw error
    pub fn raw_error(&self) -> Option<RawError> {
        self.state().and_then(|s| s.raw_error)
    }

    /// Current loaded-once flag
    pub fn loaded_once(&self) -> bool {
        self.state().is_some_and(|s| s.loaded_once)
    }

    /// Replace the data, if this session is still active
    pub fn set_data(&self, data: T) {
        if let Some(shared) = self.shared.upgrade() {
            shared.set_data(self.iteration, data);
        }
    }

    /// Start a new iteration, if this session is still active
    pub fn retry(&self) {
        if let Some(shared) = self.shared.upgrade() {
            if shared.is_current(self.iteration) {
                shared.reload();
            } else {
                tracing::debug!(iteration = self.iteration, "Ignoring retry from superseded session");
            }
        }
    }
}
