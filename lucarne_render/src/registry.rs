// Copyright 2026 the Lucarne Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Named backend constructors and version-gated plugins.
//!
//! The host fills a [`BackendRegistry`] during start-up, then creates the
//! backend selected by name:
//!
//! ```
//! use lucarne_core::geom::Size;
//! use lucarne_render::backend::{BACKEND_INTERFACE_VERSION, BackendTarget};
//! use lucarne_render::dummy::DummyBackend;
//! use lucarne_render::registry::BackendRegistry;
//!
//! let mut registry = BackendRegistry::new();
//! registry
//!     .register_backend("dummy", BACKEND_INTERFACE_VERSION, DummyBackend::create)
//!     .unwrap();
//! let backend = registry
//!     .create("dummy", &BackendTarget::new(Size::new(64, 64)))
//!     .unwrap();
//! assert_eq!(backend.name(), "dummy");
//! ```

use hashbrown::HashMap;

use crate::backend::{BACKEND_INTERFACE_VERSION, Backend, BackendTarget, BackendVersion};
use crate::error::{BackendError, RegistryError};

/// Backend constructor. Closures may capture host state the backend needs,
/// such as the pool its surfaces are read from.
pub type BackendInit = Box<dyn Fn(&BackendTarget) -> Result<Box<dyn Backend>, BackendError>>;

/// Plugin entry point. Runs once on every compatible backend right after it
/// is created; whatever the closure captured is its user data.
pub type PluginEntry = Box<dyn FnMut(&mut dyn Backend)>;

/// Version of the plugin interface exposed by [`BackendRegistry::api_interfaces`].
pub const PLUGIN_API_VERSION: BackendVersion = BackendVersion::new(1, 0);

struct Registered {
    name: String,
    version: BackendVersion,
    init: BackendInit,
}

struct Plugin {
    required: BackendVersion,
    entry: PluginEntry,
}

/// Maps backend names to constructors and plugins.
pub struct BackendRegistry {
    backends: Vec<Registered>,
    plugins: HashMap<String, Vec<Plugin>>,
    required: BackendVersion,
}

impl core::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.backend_names().collect::<Vec<_>>())
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendRegistry {
    /// An empty registry requiring [`BACKEND_INTERFACE_VERSION`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_required_version(BACKEND_INTERFACE_VERSION)
    }

    /// An empty registry requiring backends to satisfy `required`.
    #[must_use]
    pub fn with_required_version(required: BackendVersion) -> Self {
        Self {
            backends: Vec::new(),
            plugins: HashMap::new(),
            required,
        }
    }

    /// Registers a backend constructor.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateBackend`] if the name is taken.
    pub fn register_backend(
        &mut self,
        name: &str,
        version: BackendVersion,
        init: impl Fn(&BackendTarget) -> Result<Box<dyn Backend>, BackendError> + 'static,
    ) -> Result<(), RegistryError> {
        if self.backends.iter().any(|b| b.name == name) {
            return Err(RegistryError::DuplicateBackend(name.into()));
        }
        log::debug!("registered backend `{name}` (interface {version})");
        self.backends.push(Registered {
            name: name.into(),
            version,
            init: Box::new(init),
        });
        Ok(())
    }

    /// Attaches a plugin to the backend called `name`, for backend versions
    /// `major.minor` and later minors.
    ///
    /// The backend does not need to be registered yet.
    pub fn add_plugin(&mut self, name: &str, major: u32, minor: u32, entry: PluginEntry) {
        self.plugins.entry(name.into()).or_default().push(Plugin {
            required: BackendVersion::new(major, minor),
            entry,
        });
    }

    /// Registered backend names, in registration order.
    pub fn backend_names(&self) -> impl Iterator<Item = &str> {
        self.backends.iter().map(|b| b.name.as_str())
    }

    /// Number of plugins attached to `name`.
    #[must_use]
    pub fn plugin_count(&self, name: &str) -> usize {
        self.plugins.get(name).map_or(0, Vec::len)
    }

    /// Creates the backend called `name` and runs its compatible plugins in
    /// registration order. Incompatible plugins are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Fails if the name is unknown, the backend's interface version does not
    /// satisfy the required one, or its constructor fails.
    pub fn create(
        &mut self,
        name: &str,
        target: &BackendTarget,
    ) -> Result<Box<dyn Backend>, RegistryError> {
        let reg = self
            .backends
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| RegistryError::UnknownBackend(name.into()))?;
        if !reg.version.satisfies(self.required) {
            return Err(RegistryError::IncompatibleBackend {
                name: name.into(),
                version: reg.version,
                required: self.required,
            });
        }
        let mut backend = (reg.init)(target).map_err(|source| RegistryError::Init {
            name: name.into(),
            source,
        })?;

        let version = backend.version();
        if let Some(plugins) = self.plugins.get_mut(name) {
            for plugin in plugins {
                if version.satisfies(plugin.required) {
                    (plugin.entry)(backend.as_mut());
                } else {
                    log::warn!(
                        "skipping plugin for `{name}`: needs interface {}, backend has {version}",
                        plugin.required
                    );
                }
            }
        }
        log::debug!("created backend `{name}` for {:?}", target.size);
        Ok(backend)
    }

    /// The plugin interface, if the caller was built against a compatible
    /// version: `major` must match [`PLUGIN_API_VERSION`] and `minor` must
    /// not be newer.
    pub fn api_interfaces(&mut self, major: u32, minor: u32) -> Option<PluginApi<'_>> {
        (major == PLUGIN_API_VERSION.major && minor <= PLUGIN_API_VERSION.minor)
            .then_some(PluginApi { registry: self })
    }
}

/// What a plugin loader may do with the registry.
#[derive(Debug)]
pub struct PluginApi<'a> {
    registry: &'a mut BackendRegistry,
}

impl PluginApi<'_> {
    /// See [`BackendRegistry::add_plugin`].
    pub fn add_plugin(&mut self, name: &str, major: u32, minor: u32, entry: PluginEntry) {
        self.registry.add_plugin(name, major, minor, entry);
    }

    /// See [`BackendRegistry::backend_names`].
    pub fn backend_names(&self) -> impl Iterator<Item = &str> {
        self.registry.backend_names()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use lucarne_core::geom::Size;

    use super::*;
    use crate::dummy::DummyBackend;

    fn target() -> BackendTarget {
        BackendTarget::new(Size::new(32, 32))
    }

    fn registry() -> BackendRegistry {
        let mut r = BackendRegistry::new();
        r.register_backend("dummy", BACKEND_INTERFACE_VERSION, DummyBackend::create)
            .unwrap();
        r
    }

    #[test]
    fn unknown_backend() {
        let mut r = registry();
        let err = r.create("gl", &target()).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownBackend(n) if n == "gl"));
    }

    #[test]
    fn duplicate_backend() {
        let mut r = registry();
        let err = r
            .register_backend("dummy", BACKEND_INTERFACE_VERSION, DummyBackend::create)
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateBackend(_)));
    }

    #[test]
    fn incompatible_backend_is_rejected() {
        let mut r = BackendRegistry::with_required_version(BackendVersion::new(1, 3));
        r.register_backend("old", BackendVersion::new(1, 2), DummyBackend::create)
            .unwrap();
        r.register_backend("next", BackendVersion::new(2, 0), DummyBackend::create)
            .unwrap();
        assert!(matches!(
            r.create("old", &target()),
            Err(RegistryError::IncompatibleBackend { .. })
        ));
        assert!(matches!(
            r.create("next", &target()),
            Err(RegistryError::IncompatibleBackend { .. })
        ));
    }

    #[test]
    fn init_failure_is_reported() {
        fn failing(_: &BackendTarget) -> Result<Box<dyn Backend>, BackendError> {
            Err(BackendError::InitFailed("no device".into()))
        }
        let mut r = BackendRegistry::new();
        r.register_backend("broken", BACKEND_INTERFACE_VERSION, failing)
            .unwrap();
        assert!(matches!(
            r.create("broken", &target()),
            Err(RegistryError::Init { .. })
        ));
    }

    #[test]
    fn plugins_run_in_order_and_incompatible_ones_are_skipped() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut r = BackendRegistry::new();
        // Added before the backend exists.
        for (tag, major, minor) in [("a", 1, 0), ("too-new", 1, 9), ("b", 1, 0), ("v2", 2, 0)] {
            let seen = Rc::clone(&seen);
            r.add_plugin(
                "dummy",
                major,
                minor,
                Box::new(move |backend: &mut dyn Backend| {
                    seen.borrow_mut().push((tag, backend.name().to_owned()));
                }),
            );
        }
        r.register_backend("dummy", BACKEND_INTERFACE_VERSION, DummyBackend::create)
            .unwrap();
        r.create("dummy", &target()).unwrap();
        assert_eq!(
            *seen.borrow(),
            [("a", "dummy".to_owned()), ("b", "dummy".to_owned())]
        );
        assert_eq!(r.plugin_count("dummy"), 4);
    }

    #[test]
    fn plugin_api_version_gate() {
        let mut r = registry();
        assert!(r.api_interfaces(1, 0).is_some());
        assert!(r.api_interfaces(1, 1).is_none(), "newer minor than provided");
        assert!(r.api_interfaces(0, 0).is_none());
        let mut api = r.api_interfaces(1, 0).unwrap();
        api.add_plugin("dummy", 1, 0, Box::new(|_| {}));
        assert_eq!(api.backend_names().collect::<Vec<_>>(), ["dummy"]);
        assert_eq!(r.plugin_count("dummy"), 1);
    }

    #[test]
    fn names_keep_registration_order() {
        let mut r = registry();
        r.register_backend("soft", BACKEND_INTERFACE_VERSION, DummyBackend::create)
            .unwrap();
        assert_eq!(r.backend_names().collect::<Vec<_>>(), ["dummy", "soft"]);
    }
}
