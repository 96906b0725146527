//! FILENAME: engine/src/environment.rs
//! PURPOSE: Answers `m.NAME` references.
//! CONTEXT: The default environment reads process environment variables.
//! Embedders that want a different source (a web request, a config file)
//! plug in their own implementation; `MapEnvironment` covers the common
//! in-memory case and keeps tests independent of the process state.

use rustc_hash::FxHashMap;

use crate::value::{ResultValue, ValueKind};

pub trait Environment {
    /// The value of `m.name`. A missing name is a null String.
    fn get(&self, name: &str) -> ResultValue;
}

/// Reads `std::env`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn get(&self, name: &str) -> ResultValue {
        match std::env::var(name) {
            Ok(value) => ResultValue::string(value),
            Err(_) => ResultValue::null(ValueKind::String),
        }
    }
}

/// A fixed set of values.
#[derive(Debug, Default, Clone)]
pub struct MapEnvironment {
    values: FxHashMap<String, ResultValue>,
}

impl MapEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &str, value: ResultValue) {
        self.values.insert(name.to_string(), value);
    }

    pub fn with(mut self, name: &str, value: ResultValue) -> Self {
        self.set(name, value);
        self
    }
}

impl Environment for MapEnvironment {
    fn get(&self, name: &str) -> ResultValue {
        self.values
            .get(name)
            .cloned()
            .unwrap_or_else(|| ResultValue::null(ValueKind::String))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_environment() {
        let env = MapEnvironment::new().with("USER", ResultValue::string("ada"));
        assert_eq!(env.get("USER"), ResultValue::string("ada"));
        assert!(env.get("HOME").is_null());
        assert_eq!(env.get("HOME").declared_kind(), ValueKind::String);
    }

    #[test]
    fn test_process_environment_missing() {
        let value = ProcessEnvironment.get("REPORT_ENGINE_SURELY_UNSET_VARIABLE");
        assert!(value.is_null());
    }
}
