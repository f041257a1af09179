//! Resource state and the transitions that move it forward
//!
//! A `ResourceState` is an immutable snapshot; every change the coordinator
//! makes is expressed as a [`Transition`] applied to the active snapshot.

use crate::error::RawError;

/// Bounds shared by data, options and normalized error types
pub trait Loadable: Clone + Send + Sync + 'static {}

impl<T> Loadable for T where T: Clone + Send + Sync + 'static {}

/// Snapshot of one resource load
#[derive(Debug, Clone)]
pub struct ResourceState<T, O, E = String> {
    /// Last successfully loaded (or injected) value
    pub data: Option<T>,
    /// True while a load for the current iteration is unresolved
    pub loading: bool,
    /// Normalized error from the last failed load
    pub error: Option<E>,
    /// Original error behind `error`
    pub raw_error: Option<RawError>,
    /// True once any load has completed, successfully or not
    pub loaded_once: bool,
    /// Options in effect when this snapshot was produced
    pub options: O,
}

impl<T, O, E> ResourceState<T, O, E> {
    /// The empty state: nothing loaded yet, a load is expected
    ///
    /// Callers seed a partial state with struct update syntax:
    /// `ResourceState { data: Some(x), ..ResourceState::empty(opts) }`.
    pub fn empty(options: O) -> Self {
        Self {
            data: None,
            loading: true,
            error: None,
            raw_error: None,
            loaded_once: false,
            options,
        }
    }

    /// True when the last completed load failed
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Apply a transition, producing the next snapshot
    pub fn apply(self, transition: Transition<T, O, E>) -> Self {
        match transition {
            Transition::Loading { options } => Self {
                loading: true,
                error: None,
                raw_error: None,
                options,
                ..self
            },
            Transition::Loaded { data, options } => Self {
                data: Some(data),
                loading: false,
                error: None,
                raw_error: None,
                loaded_once: true,
                options,
            },
            Transition::Failed {
                error,
                raw_error,
                options,
            } => Self {
                loading: false,
                error: Some(error),
                raw_error: Some(raw_error),
                loaded_once: true,
                options,
                ..self
            },
            Transition::DataSet { data } => Self {
                data: Some(data),
                ..self
            },
        }
    }
}

impl<T, O: Default, E> Default for ResourceState<T, O, E> {
    fn default() -> Self {
        Self::empty(O::default())
    }
}

impl<T: PartialEq, O: PartialEq, E: PartialEq> PartialEq for ResourceState<T, O, E> {
    fn eq(&self, other: &Self) -> bool {
        let raw_eq = match (&self.raw_error, &other.raw_error) {
            (None, None) => true,
            (Some(a), Some(b)) => std::sync::Arc::ptr_eq(a, b),
            _ => false,
        };
        raw_eq
            && self.data == other.data
            && self.loading == other.loading
            && self.error == other.error
            && self.loaded_once == other.loaded_once
            && self.options == other.options
    }
}

/// A single state change emitted by the coordinator
#[derive(Debug, Clone)]
pub enum Transition<T, O, E = String> {
    /// A pending load started
    Loading { options: O },
    /// A load resolved successfully
    Loaded { data: T, options: O },
    /// A load failed
    Failed {
        error: E,
        raw_error: RawError,
        options: O,
    },
    /// Data injected through a session
    DataSet { data: T },
}

impl<T, O, E> Transition<T, O, E> {
    /// Short name used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Transition::Loading { .. } => "loading",
            Transition::Loaded { .. } => "loaded",
            Transition::Failed { .. } => "failed",
            Transition::DataSet { .. } => "data_set",
        }
    }
}
