//! Loader definitions
//!
//! A [`DataLoader`] binds a [`LoaderFactory`] to resolved policies. It is
//! created once and mounted any number of times; each mount yields an
//! independent [`LoadCoordinator`].

use std::sync::Arc;

use crate::coordinator::{LoadCoordinator, MountProps};
use crate::error::RawError;
use crate::policy::{ErrorNormalizer, OptionsComparator, Policies, PolicyDefaults, ShouldLoad};
use crate::state::Loadable;
use crate::unit::LoaderFactory;

/// Name used when no display name is configured
pub const DEFAULT_DISPLAY_NAME: &str = "Data";

/// Per-loader overrides
pub struct LoaderConfig<O, E = String> {
    pub display_name: Option<String>,
    pub options_comparator: Option<OptionsComparator<O>>,
    pub error_normalizer: Option<ErrorNormalizer<E>>,
    pub default_should_load_data: Option<ShouldLoad<O>>,
}

impl<O, E> Default for LoaderConfig<O, E> {
    fn default() -> Self {
        Self {
            display_name: None,
            options_comparator: None,
            error_normalizer: None,
            default_should_load_data: None,
        }
    }
}

impl<O, E> LoaderConfig<O, E> {
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn options_comparator<F>(mut self, comparator: F) -> Self
    where
        F: Fn(&O, &O) -> bool + Send + Sync + 'static,
    {
        self.options_comparator = Some(Arc::new(comparator));
        self
    }

    pub fn error_normalizer<F>(mut self, normalizer: F) -> Self
    where
        F: Fn(&RawError) -> E + Send + Sync + 'static,
    {
        self.error_normalizer = Some(Arc::new(normalizer));
        self
    }

    /// Predicate used when a mount does not supply its own
    pub fn default_should_load_data<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&O) -> bool + Send + Sync + 'static,
    {
        self.default_should_load_data = Some(Arc::new(predicate));
        self
    }
}

/// A factory bound to its policies, ready to be mounted
pub struct DataLoader<T, O, E = String> {
    name: String,
    factory: Arc<dyn LoaderFactory<T, O, E>>,
    policies: Policies<O, E>,
    default_should_load: Option<ShouldLoad<O>>,
}

impl<T, O, E> Clone for DataLoader<T, O, E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            factory: self.factory.clone(),
            policies: self.policies.clone(),
            default_should_load: self.default_should_load.clone(),
        }
    }
}

impl<T: Loadable, O: Loadable, E: Loadable> DataLoader<T, O, E> {
    /// Create a loader whose missing policies come from `defaults`
    ///
    /// The defaults are read once, here; replacing them afterwards does not
    /// affect this loader.
    pub fn with_defaults<F>(factory: F, config: LoaderConfig<O, E>, defaults: &PolicyDefaults<O, E>) -> Self
    where
        F: LoaderFactory<T, O, E> + 'static,
    {
        let LoaderConfig {
            display_name,
            options_comparator,
            error_normalizer,
            default_should_load_data,
        } = config;
        Self {
            name: format!("{}.Loader", display_name.as_deref().unwrap_or(DEFAULT_DISPLAY_NAME)),
            factory: Arc::new(factory),
            policies: defaults.resolve(options_comparator, error_normalizer),
            default_should_load: default_should_load_data,
        }
    }

    /// Display name, e.g. `Data.Loader`
    pub fn display_name(&self) -> &str {
        &self.name
    }

    /// The factory this loader builds units with
    pub fn factory(&self) -> Arc<dyn LoaderFactory<T, O, E>> {
        self.factory.clone()
    }
}

impl<T: Loadable, O: Loadable + Default, E: Loadable> DataLoader<T, O, E> {
    /// Mount a new coordinator
    pub fn mount(&self, props: MountProps<T, O, E>) -> LoadCoordinator<T, O, E> {
        LoadCoordinator::start(
            self.name.clone(),
            self.factory.clone(),
            self.policies.clone(),
            self.default_should_load.clone(),
            props,
        )
    }
}

impl<T: Loadable, O: Loadable + PartialEq> DataLoader<T, O, String> {
    /// Create a loader on the standard policies
    pub fn new<F>(factory: F, config: LoaderConfig<O, String>) -> Self
    where
        F: LoaderFactory<T, O, String> + 'static,
    {
        Self::with_defaults(factory, config, &PolicyDefaults::standard())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::LoadSession;
    use crate::unit::{LoadUnit, Loaded};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn constant(_session: LoadSession<String, u32>) -> LoadUnit<String> {
        LoadUnit::new(|| Loaded::value("v".to_string()))
    }

    #[test]
    fn test_default_display_name() {
        let loader = DataLoader::new(constant, LoaderConfig::default());
        assert_eq!(loader.display_name(), "Data.Loader");
    }

    #[test]
    fn test_custom_display_name() {
        let loader = DataLoader::new(constant, LoaderConfig::default().display_name("Users"));
        assert_eq!(loader.display_name(), "Users.Loader");
    }

    #[test]
    fn test_mount_loads_synchronously() {
        let loader = DataLoader::new(constant, LoaderConfig::default());
        let coordinator = loader.mount(MountProps::new(1));
        let state = coordinator.state();
        assert_eq!(state.data.as_deref(), Some("v"));
        assert!(!state.loading);
        assert!(state.loaded_once);
        assert_eq!(coordinator.iteration(), 1);
    }

    #[test]
    fn test_with_defaults_reads_defaults_once() {
        let mut defaults = PolicyDefaults::<u32, String>::standard();
        defaults.set_options_comparator(|_, _| true);
        let lenient = DataLoader::with_defaults(constant, LoaderConfig::default(), &defaults);
        defaults.set_options_comparator(|a, b| a == b);
        let strict = DataLoader::with_defaults(constant, LoaderConfig::default(), &defaults);

        let a = lenient.mount(MountProps::new(1));
        a.on_options_changed(2);
        assert_eq!(a.iteration(), 1);

        let b = strict.mount(MountProps::new(1));
        b.on_options_changed(2);
        assert_eq!(b.iteration(), 2);
    }

    #[test]
    fn test_config_overrides_defaults() {
        let loader = DataLoader::new(
            |_session: LoadSession<String, u32>| LoadUnit::new(|| Loaded::error("broken")),
            LoaderConfig::default().error_normalizer(|_| "normalized".to_string()),
        );
        let coordinator = loader.mount(MountProps::new(1));
        assert_eq!(coordinator.state().error.as_deref(), Some("normalized"));
    }

    #[test]
    fn test_default_should_load_data_applies_without_override() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let loader = DataLoader::new(
            move |_session: LoadSession<String, u32>| {
                let counter = counter.clone();
                LoadUnit::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Loaded::value("v".to_string())
                })
            },
            LoaderConfig::default().default_should_load_data(|options: &u32| *options > 0),
        );

        let skipped = loader.mount(MountProps::new(0));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!skipped.state().loaded_once);

        let overridden = loader.mount(MountProps::new(0).should_load_data(|_| true));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(overridden.state().loaded_once);
    }

    #[test]
    fn test_clone_shares_factory() {
        let loader = DataLoader::new(constant, LoaderConfig::default());
        let copy = loader.clone();
        assert!(Arc::ptr_eq(&loader.factory(), &copy.factory()));
    }
}
