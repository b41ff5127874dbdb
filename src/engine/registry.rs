//! Name based module factory.
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::analyze::Analyzer;
use crate::error::Error;
use crate::module::{DynModule, Params};
use crate::output::OutputSink;
use crate::Result;

/// Builds a module instance from its instance name, init parameters and the shared sink.
pub type Constructor = Box<dyn Fn(&str, &Params, OutputSink) -> Result<Arc<dyn DynModule>> + Send + Sync>;

/// Maps module names to constructors. Instance names may carry a directory prefix (`tools/analyze`) and a `~N` suffix (`analyze~1`), both are ignored for the lookup so that every alias gets its own instance of the same module type.
pub struct Registry {
    constructors: BTreeMap<String, Constructor>,
}

impl Default for Registry {
    /// Registry with the modules shipped by this crate.
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register("analyze", |name, params, sink| {
            Ok(Arc::new(Analyzer::new(name, params, sink)?) as Arc<dyn DynModule>)
        });
        registry
    }
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    pub fn register<F>(&mut self, name: &str, constructor: F) -> &mut Self
    where
        F: Fn(&str, &Params, OutputSink) -> Result<Arc<dyn DynModule>> + Send + Sync + 'static,
    {
        self.constructors.insert(name.to_string(), Box::new(constructor));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(base_name(name))
    }

    pub fn create(&self, name: &str, params: &Params, sink: OutputSink) -> Result<Arc<dyn DynModule>> {
        let constructor = self
            .constructors
            .get(base_name(name))
            .ok_or_else(|| Error::ModuleNotFound(name.to_string()))?;
        constructor(name, params, sink)
    }
}

/// Strips the directory prefix and alias suffix of an instance name.
pub fn base_name(name: &str) -> &str {
    let name = name.rsplit('/').next().unwrap_or(name);
    name.split('~').next().unwrap_or(name)
}
