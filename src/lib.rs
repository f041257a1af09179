//! reloadr - iteration-guarded asynchronous data loading
//!
//! reloadr coordinates the loading of a single resource that depends on a
//! set of options. Each options change starts a new iteration; results from
//! superseded iterations are discarded, so only the newest load ever reaches
//! the state, no matter in which order in-flight loads settle.

pub mod coordinator;
pub mod error;
pub mod loader;
pub mod policy;
pub mod session;
pub mod sink;
pub mod state;
pub mod unit;

pub use coordinator::{LoadCoordinator, LoaderSnapshot, MountConfig, MountProps};
pub use error::{BoxError, LoaderError, RawError, Result};
pub use loader::{DataLoader, LoaderConfig};
pub use policy::PolicyDefaults;
pub use session::LoadSession;
pub use sink::StateOwnership;
pub use state::{Loadable, ResourceState, Transition};
pub use unit::{Action, Actions, LoadUnit, Loaded, LoaderFactory};
