//! FILENAME: engine/src/registry.rs
//! PURPOSE: Process-wide table of datasource drivers.
//! CONTEXT: The only state shared between report instances. It is built
//! lazily on first use with the `array` driver, guarded by a mutex, and
//! extended by embedders that bring their own drivers.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::array_source::{ArrayDriver, ARRAY_DRIVER};
use crate::datasource::DataSourceDriver;
use crate::error::{EngineError, EngineResult};

/// Creates a fresh driver instance for one datasource.
pub type DriverFactory = Arc<dyn Fn() -> Box<dyn DataSourceDriver> + Send + Sync>;

pub struct DriverRegistry {
    factories: Mutex<FxHashMap<String, DriverFactory>>,
}

static GLOBAL: Lazy<DriverRegistry> = Lazy::new(|| {
    let registry = DriverRegistry {
        factories: Mutex::new(FxHashMap::default()),
    };
    registry.register(ARRAY_DRIVER, Arc::new(|| Box::new(ArrayDriver)));
    registry
});

impl DriverRegistry {
    pub fn global() -> &'static DriverRegistry {
        &GLOBAL
    }

    fn lock(&self) -> MutexGuard<'_, FxHashMap<String, DriverFactory>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.factories
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers or replaces a driver.
    pub fn register(&self, name: &str, factory: DriverFactory) {
        log::debug!("registering datasource driver '{}'", name);
        self.lock().insert(name.to_string(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Instantiates a driver by name.
    pub fn create(&self, name: &str) -> EngineResult<Box<dyn DataSourceDriver>> {
        let factory = self
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownDriver(name.to_string()))?;
        Ok(factory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_driver_is_builtin() {
        let registry = DriverRegistry::global();
        assert!(registry.contains("array"));
        let driver = registry.create("array").unwrap();
        assert_eq!(driver.driver_name(), "array");
    }

    #[test]
    fn test_unknown_driver() {
        let result = DriverRegistry::global().create("no-such-driver");
        assert!(matches!(result, Err(EngineError::UnknownDriver(name)) if name == "no-such-driver"));
    }

    #[test]
    fn test_register_custom_driver() {
        let registry = DriverRegistry::global();
        registry.register("array-alias", Arc::new(|| Box::new(ArrayDriver)));
        assert!(registry.names().iter().any(|n| n == "array-alias"));
        assert!(registry.create("array-alias").is_ok());
    }
}
