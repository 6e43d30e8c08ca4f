//! Module content provider
//!
//! `load()` statements resolve their locator through a
//! [`ModuleContentProvider`]. Fetching and caching remote modules is the
//! provider's business; the interpreter only sees bytes.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModuleProviderError {
    #[error("Module not found: {locator}")]
    NotFound { locator: String },

    #[error("Module {locator} could not be read: {reason}")]
    Unreadable { locator: String, reason: String },
}

pub trait ModuleContentProvider: Send + Sync {
    /// # Errors
    ///
    /// `NotFound` when nothing exists under `locator`.
    fn resolve(&self, locator: &str) -> Result<Vec<u8>, ModuleProviderError>;
}

/// Provider backed by a map of locator to source
#[derive(Debug, Clone, Default)]
pub struct InMemoryModuleProvider {
    modules: HashMap<String, Vec<u8>>,
}

impl InMemoryModuleProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, locator: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(locator, source);
        self
    }

    pub fn insert(&mut self, locator: impl Into<String>, source: impl Into<String>) {
        self.modules
            .insert(locator.into(), source.into().into_bytes());
    }
}

impl ModuleContentProvider for InMemoryModuleProvider {
    fn resolve(&self, locator: &str) -> Result<Vec<u8>, ModuleProviderError> {
        self.modules
            .get(locator)
            .cloned()
            .ok_or_else(|| ModuleProviderError::NotFound {
                locator: locator.to_string(),
            })
    }
}
