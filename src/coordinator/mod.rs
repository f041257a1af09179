//! Load coordination
//!
//! The coordinator is the stateful core of reloadr:
//! - **Iterations:** every load attempt is tagged; stale effects are dropped
//! - **Options tracking:** reloads happen only when the comparator says so
//! - **Ownership:** state is kept internally or proposed to an external owner
//! - **Teardown:** units are cleaned up and an empty state may follow

mod config;
mod core;

pub use config::{MAX_TEARDOWN_DELAY_MS, MountConfig, MountProps};
pub use core::{LoadCoordinator, LoaderSnapshot};

pub(crate) use core::Shared;
