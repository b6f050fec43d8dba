//! Process environment handed to external build steps
//!
//! The environment is captured once and shared read-only. Steps that need
//! extra variables derive a new value with [`BaseEnvironment::merged`].

use std::collections::BTreeMap;
use std::sync::Arc;

/// Immutable snapshot of environment variables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaseEnvironment {
    vars: Arc<BTreeMap<String, String>>,
}

impl BaseEnvironment {
    /// Capture the current process environment
    pub fn snapshot() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build an environment from explicit pairs
    pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: Arc::new(
                vars.into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// A copy of this environment with `overrides` applied on top
    pub fn merged<K, V>(&self, overrides: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut vars = (*self.vars).clone();
        for (key, value) in overrides {
            vars.insert(key.into(), value.into());
        }
        Self {
            vars: Arc::new(vars),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
