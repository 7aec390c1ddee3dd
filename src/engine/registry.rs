//! Engine registry: maps classifier names to engine factories.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::EngineOptions;
use crate::engine::spec::{self, EngineSpec};
use crate::engine::{CommandEngine, Engine, NullEngine, null};
use crate::error::RegistryError;

/// Builds an engine from the runtime options.
pub type EngineFactory = Box<dyn Fn(&EngineOptions) -> Arc<dyn Engine> + Send + Sync>;

/// Registry of available engines.
///
/// Names starting with `_` are internal: they can be registered but are
/// neither listed nor loadable.
pub struct EngineRegistry {
    options: EngineOptions,
    factories: BTreeMap<String, EngineFactory>,
}

impl EngineRegistry {
    /// Create an empty registry.
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            factories: BTreeMap::new(),
        }
    }

    /// Registry holding every engine shipped with notspam.
    pub fn builtin(options: EngineOptions) -> Self {
        let mut registry = Self::new(options);
        for &engine_spec in spec::BUILTIN {
            registry.register_spec(engine_spec);
        }
        registry.insert(null::NAME, |_| Arc::new(NullEngine));
        registry
    }

    fn register_spec(&mut self, spec: &'static EngineSpec) {
        self.insert(spec.name, move |options| {
            Arc::new(CommandEngine::new(spec, options))
        });
    }

    fn insert<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&EngineOptions) -> Arc<dyn Engine> + Send + Sync + 'static,
    {
        tracing::debug!("Registered engine: {}", name);
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Register an engine. Names are unique.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<(), RegistryError>
    where
        F: Fn(&EngineOptions) -> Arc<dyn Engine> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(RegistryError::Duplicate { name });
        }
        self.insert(&name, factory);
        Ok(())
    }

    /// Public engine names, sorted.
    pub fn list(&self) -> Vec<String> {
        self.factories
            .keys()
            .filter(|name| !name.starts_with('_'))
            .cloned()
            .collect()
    }

    /// Instantiate the engine called `name` (exact match).
    pub fn load(&self, name: &str) -> Result<Arc<dyn Engine>, RegistryError> {
        match self.factories.get(name) {
            Some(factory) if !name.starts_with('_') => Ok(factory(&self.options)),
            _ => Err(RegistryError::NotFound {
                name: name.to_string(),
                available: self.list().join(", "),
            }),
        }
    }

    /// Number of registered engines, internal ones included.
    pub fn count(&self) -> usize {
        self.factories.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_engines_are_listed_sorted() {
        let registry = EngineRegistry::builtin(EngineOptions::default());
        assert_eq!(
            registry.list(),
            vec![
                "bogofilter",
                "bsfilter",
                "crm114",
                "null",
                "qsf",
                "spamassassin",
                "sylfilter"
            ]
        );
    }

    #[test]
    fn load_is_exact() {
        let registry = EngineRegistry::builtin(EngineOptions::default());
        assert_eq!(registry.load("bogofilter").unwrap().name(), "bogofilter");

        let err = registry.load("BogoFilter").err().unwrap();
        match err {
            RegistryError::NotFound { name, available } => {
                assert_eq!(name, "BogoFilter");
                assert!(available.contains("sylfilter"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn internal_names_are_hidden() {
        let mut registry = EngineRegistry::new(EngineOptions::default());
        registry
            .register("_scratch", |_| Arc::new(NullEngine))
            .unwrap();
        registry
            .register("visible", |_| Arc::new(NullEngine))
            .unwrap();

        assert_eq!(registry.count(), 2);
        assert_eq!(registry.list(), vec!["visible"]);
        assert!(registry.load("_scratch").is_err());
        assert!(registry.load("visible").is_ok());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = EngineRegistry::builtin(EngineOptions::default());
        let err = registry
            .register("null", |_| Arc::new(NullEngine))
            .unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate { .. }));
    }

    #[test]
    fn empty_registry_lists_nothing() {
        let registry = EngineRegistry::new(EngineOptions::default());
        assert!(registry.list().is_empty());
        let err = registry.load("sylfilter").err().unwrap();
        assert!(err.to_string().contains("sylfilter"));
    }
}
