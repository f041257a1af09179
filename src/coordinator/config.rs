//! Mount-time configuration for a coordinator

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LoaderError, Result};
use crate::policy::ShouldLoad;
use crate::sink::{StateCallback, StateReader};
use crate::state::ResourceState;

/// Upper bound for the deferred empty-state delay
pub const MAX_TEARDOWN_DELAY_MS: u64 = 10_000;

/// Serializable mount flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Skip the initial load when the active state already matches
    #[serde(default)]
    pub lazy_reload_on_mount: bool,

    /// Emit an empty state after teardown (controlled mode only)
    #[serde(default)]
    pub empty_on_unmount: bool,

    /// Delay before the empty state is emitted, in milliseconds
    #[serde(default = "default_teardown_delay_ms")]
    pub teardown_delay_ms: u64,
}

fn default_teardown_delay_ms() -> u64 {
    debug!("default_teardown_delay_ms: called");
    60
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            lazy_reload_on_mount: false,
            empty_on_unmount: false,
            teardown_delay_ms: default_teardown_delay_ms(),
        }
    }
}

impl MountConfig {
    /// The teardown delay as a Duration, capped at [`MAX_TEARDOWN_DELAY_MS`]
    pub fn teardown_delay(&self) -> Duration {
        Duration::from_millis(self.teardown_delay_ms.min(MAX_TEARDOWN_DELAY_MS))
    }

    /// Reject values the coordinator cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.teardown_delay_ms > MAX_TEARDOWN_DELAY_MS {
            return Err(LoaderError::InvalidConfig(format!(
                "teardown_delay_ms {} exceeds {}",
                self.teardown_delay_ms, MAX_TEARDOWN_DELAY_MS
            )));
        }
        Ok(())
    }
}

/// Everything a coordinator is mounted with
///
/// Supplying both a state reader and `on_state_update` puts the coordinator
/// in controlled mode. Otherwise `on_state_update` only observes transitions
/// and the reader, if any, seeds the initial state.
pub struct MountProps<T, O, E = String> {
    pub(crate) options: O,
    pub(crate) initial_state: Option<ResourceState<T, O, E>>,
    pub(crate) state_reader: Option<StateReader<T, O, E>>,
    pub(crate) on_state_update: Option<StateCallback<T, O, E>>,
    pub(crate) should_load_data: Option<ShouldLoad<O>>,
    pub(crate) config: MountConfig,
    pub(crate) empty_options: Option<O>,
}

impl<T, O, E> MountProps<T, O, E> {
    /// Props with the given options and default flags
    pub fn new(options: O) -> Self {
        Self {
            options,
            initial_state: None,
            state_reader: None,
            on_state_update: None,
            should_load_data: None,
            config: MountConfig::default(),
            empty_options: None,
        }
    }

    /// Replace all flags at once
    pub fn with_config(mut self, config: MountConfig) -> Self {
        self.config = config;
        self
    }

    /// Seed the state; its options are replaced by the mount options
    pub fn initial_state(mut self, state: ResourceState<T, O, E>) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Read the externally owned state
    pub fn state_reader<F>(mut self, read: F) -> Self
    where
        F: Fn() -> Option<ResourceState<T, O, E>> + Send + Sync + 'static,
    {
        self.state_reader = Some(Arc::new(read));
        self
    }

    /// Receive every transition
    pub fn on_state_update<F>(mut self, callback: F) -> Self
    where
        F: Fn(ResourceState<T, O, E>) + Send + Sync + 'static,
    {
        self.on_state_update = Some(Arc::new(callback));
        self
    }

    /// Gate loads on the current options
    pub fn should_load_data<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&O) -> bool + Send + Sync + 'static,
    {
        self.should_load_data = Some(Arc::new(predicate));
        self
    }

    pub fn lazy_reload_on_mount(mut self, enabled: bool) -> Self {
        self.config.lazy_reload_on_mount = enabled;
        self
    }

    pub fn empty_on_unmount(mut self, enabled: bool) -> Self {
        self.config.empty_on_unmount = enabled;
        self
    }

    /// Delay before the empty state; capped at [`MAX_TEARDOWN_DELAY_MS`]
    pub fn teardown_delay(mut self, delay: Duration) -> Self {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.config.teardown_delay_ms = millis.min(MAX_TEARDOWN_DELAY_MS);
        self
    }

    /// Options carried by the empty state emitted after teardown; `O::default()`
    /// when unset
    pub fn empty_options(mut self, options: O) -> Self {
        self.empty_options = Some(options);
        self
    }

    /// True when these props put the coordinator in controlled mode
    pub fn is_controlled(&self) -> bool {
        self.state_reader.is_some() && self.on_state_update.is_some()
    }
}
