//! State ownership: where transitions land
//!
//! In uncontrolled mode the coordinator keeps the authoritative snapshot and
//! only notifies the caller. In controlled mode the caller owns the state:
//! the coordinator reads it through a reader and proposes every new snapshot
//! through a callback, keeping no authoritative copy of its own.

use std::sync::{Arc, Mutex, PoisonError};

use crate::state::{Loadable, ResourceState, Transition};

/// Receives every new snapshot
pub type StateCallback<T, O, E> = Arc<dyn Fn(ResourceState<T, O, E>) + Send + Sync>;

/// Reads the externally owned snapshot; `None` means "not provided yet"
pub type StateReader<T, O, E> = Arc<dyn Fn() -> Option<ResourceState<T, O, E>> + Send + Sync>;

/// Who owns the authoritative state
pub enum StateOwnership<T, O, E> {
    /// Coordinator-owned state with an optional change notification
    Internal {
        state: Mutex<ResourceState<T, O, E>>,
        notify: Option<StateCallback<T, O, E>>,
    },
    /// Caller-owned state; `fallback` is used while the reader has nothing
    External {
        read: StateReader<T, O, E>,
        write: StateCallback<T, O, E>,
        fallback: ResourceState<T, O, E>,
    },
}

impl<T: Loadable, O: Loadable, E: Loadable> StateOwnership<T, O, E> {
    /// Coordinator-owned state
    pub fn internal(initial: ResourceState<T, O, E>, notify: Option<StateCallback<T, O, E>>) -> Self {
        StateOwnership::Internal {
            state: Mutex::new(initial),
            notify,
        }
    }

    /// Caller-owned state
    pub fn external(
        read: StateReader<T, O, E>,
        write: StateCallback<T, O, E>,
        fallback: ResourceState<T, O, E>,
    ) -> Self {
        StateOwnership::External { read, write, fallback }
    }

    /// True when the caller owns the state
    pub fn is_controlled(&self) -> bool {
        matches!(self, StateOwnership::External { .. })
    }

    /// The snapshot currently in effect
    pub fn active(&self) -> ResourceState<T, O, E> {
        match self {
            StateOwnership::Internal { state, .. } => state.lock().unwrap_or_else(PoisonError::into_inner).clone(),
            StateOwnership::External { read, fallback, .. } => read().unwrap_or_else(|| fallback.clone()),
        }
    }

    /// Apply a transition to the active snapshot and publish the result
    pub fn commit(&self, transition: Transition<T, O, E>) -> ResourceState<T, O, E> {
        match self {
            StateOwnership::Internal { state, notify } => {
                let next = {
                    let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
                    let next = guard.clone().apply(transition);
                    *guard = next.clone();
                    next
                };
                if let Some(notify) = notify {
                    notify(next.clone());
                }
                next
            }
            StateOwnership::External { write, .. } => {
                let next = self.active().apply(transition);
                write(next.clone());
                next
            }
        }
    }

    /// The external owner's update callback, if the caller owns the state
    pub fn writer(&self) -> Option<StateCallback<T, O, E>> {
        match self {
            StateOwnership::Internal { .. } => None,
            StateOwnership::External { write, .. } => Some(write.clone()),
        }
    }
}
