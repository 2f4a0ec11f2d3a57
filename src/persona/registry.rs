//! Persona registry: name, alias and "@mention" lookup over a catalog.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::catalog::CatalogSource;
use super::types::Persona;
use crate::error::{Error, Result};

/// Mapping from every known name, alias and "@"-form to its persona.
///
/// Lookups are exact and case-sensitive. `list()` yields each persona once,
/// in registration order.
#[derive(Debug)]
pub struct PersonaRegistry {
    entries: HashMap<String, Arc<Persona>>,
    order: Vec<Arc<Persona>>,
    source: CatalogSource,
}

impl PersonaRegistry {
    /// Registry with no personas; `reload()` fills it from `source`.
    pub fn empty(source: CatalogSource) -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            source,
        }
    }

    /// Build a registry from a catalog source.
    pub fn load(source: CatalogSource) -> Result<Self> {
        let mut registry = Self::empty(source);
        registry.reload()?;
        Ok(registry)
    }

    /// Registry over the bundled catalog.
    pub fn bundled() -> Result<Self> {
        Self::load(CatalogSource::Bundled)
    }

    /// Register a persona under its name, role and aliases, with and without "@".
    ///
    /// Fails without modifying the registry if any key is already taken.
    pub fn register(&mut self, persona: Persona) -> Result<Arc<Persona>> {
        let keys = persona.lookup_keys();

        for key in &keys {
            if let Some(existing) = self.entries.get(key) {
                return Err(Error::PersonaConflict {
                    name: key.clone(),
                    existing: existing.name.clone(),
                });
            }
        }

        let persona = Arc::new(persona);
        for key in keys {
            self.entries.insert(key, Arc::clone(&persona));
        }
        self.order.push(Arc::clone(&persona));

        debug!(persona = %persona.name, capability = %persona.capability, "Persona registered");
        Ok(persona)
    }

    /// Look up by exact key, then by "@" + key. Never fails.
    pub fn get(&self, name: &str) -> Option<Arc<Persona>> {
        self.entries
            .get(name)
            .or_else(|| self.entries.get(&format!("@{}", name)))
            .cloned()
    }

    /// Like `get`, but a missing persona is an error.
    pub fn require(&self, name: &str) -> Result<Arc<Persona>> {
        self.get(name).ok_or_else(|| Error::persona_not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Each distinct persona once, in registration order.
    pub fn list(&self) -> Vec<Arc<Persona>> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn coordinator(&self) -> Option<Arc<Persona>> {
        self.order.iter().find(|p| p.coordinator).cloned()
    }

    pub fn fallback(&self) -> Option<Arc<Persona>> {
        self.order.iter().find(|p| p.fallback).cloned()
    }

    pub fn source(&self) -> &CatalogSource {
        &self.source
    }

    /// Discard every entry and re-register the full catalog from the source.
    ///
    /// On failure the previous entries are kept.
    pub fn reload(&mut self) -> Result<()> {
        let personas = self.source.load()?;

        let mut fresh = Self::empty(self.source.clone());
        for persona in personas {
            fresh.register(persona)?;
        }

        info!(count = fresh.len(), source = ?self.source, "Persona registry loaded");
        *self = fresh;
        Ok(())
    }
}
