//! Comparator and normalizer policies
//!
//! Both policies are plain functions. A [`PolicyDefaults`] value is the
//! single place where process-wide defaults live; loaders copy the defaults
//! when they are constructed, so replacing a default later only affects
//! loaders built afterwards.

use std::sync::Arc;

use crate::error::RawError;

/// Message used when an error carries no text
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// Decides whether two option values are equivalent (no reload needed)
pub type OptionsComparator<O> = Arc<dyn Fn(&O, &O) -> bool + Send + Sync>;

/// Turns a raw loader error into the caller-visible error type
pub type ErrorNormalizer<E> = Arc<dyn Fn(&RawError) -> E + Send + Sync>;

/// Decides whether a load should run at all for the given options
pub type ShouldLoad<O> = Arc<dyn Fn(&O) -> bool + Send + Sync>;

/// Default normalizer: the error message, or [`UNKNOWN_ERROR`] when empty
pub fn default_error_normalizer(error: &RawError) -> String {
    let message = error.to_string();
    if message.trim().is_empty() {
        UNKNOWN_ERROR.to_string()
    } else {
        message
    }
}

/// Default comparator: structural equality
pub fn partial_eq_comparator<O: PartialEq>(a: &O, b: &O) -> bool {
    a == b
}

/// Resolved policies for one loader
pub struct Policies<O, E> {
    pub comparator: OptionsComparator<O>,
    pub normalizer: ErrorNormalizer<E>,
}

impl<O, E> Clone for Policies<O, E> {
    fn clone(&self) -> Self {
        Self {
            comparator: self.comparator.clone(),
            normalizer: self.normalizer.clone(),
        }
    }
}

impl<O, E> Policies<O, E> {
    /// Compare two option values
    pub fn options_equal(&self, a: &O, b: &O) -> bool {
        (self.comparator)(a, b)
    }

    /// Normalize a raw error
    pub fn normalize(&self, error: &RawError) -> E {
        (self.normalizer)(error)
    }
}

/// Composition root for default policies
pub struct PolicyDefaults<O, E> {
    comparator: OptionsComparator<O>,
    normalizer: ErrorNormalizer<E>,
}

impl<O, E> PolicyDefaults<O, E> {
    /// Create defaults from explicit policies
    pub fn new(comparator: OptionsComparator<O>, normalizer: ErrorNormalizer<E>) -> Self {
        Self { comparator, normalizer }
    }

    /// Replace the default error normalizer
    pub fn set_error_normalizer<F>(&mut self, normalizer: F)
    where
        F: Fn(&RawError) -> E + Send + Sync + 'static,
    {
        tracing::debug!("PolicyDefaults::set_error_normalizer: called");
        self.normalizer = Arc::new(normalizer);
    }

    /// Replace the default options comparator
    pub fn set_options_comparator<F>(&mut self, comparator: F)
    where
        F: Fn(&O, &O) -> bool + Send + Sync + 'static,
    {
        tracing::debug!("PolicyDefaults::set_options_comparator: called");
        self.comparator = Arc::new(comparator);
    }

    /// Resolve overrides against these defaults
    pub fn resolve(
        &self,
        comparator: Option<OptionsComparator<O>>,
        normalizer: Option<ErrorNormalizer<E>>,
    ) -> Policies<O, E> {
        Policies {
            comparator: comparator.unwrap_or_else(|| self.comparator.clone()),
            normalizer: normalizer.unwrap_or_else(|| self.normalizer.clone()),
        }
    }
}

impl<O: PartialEq + 'static> PolicyDefaults<O, String> {
    /// Structural equality and message-based normalization
    pub fn standard() -> Self {
        Self::new(
            Arc::new(partial_eq_comparator::<O>),
            Arc::new(default_error_normalizer),
        )
    }
}

impl<O: PartialEq + 'static> Default for PolicyDefaults<O, String> {
    fn default() -> Self {
        Self::standard()
    }
}
