//! Persona catalogs: the bundled default set and user-supplied TOML files.

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use super::types::{Persona, PersonaSpec};
use crate::config::PersonaSettings;
use crate::error::{Error, Result};

/// Catalog compiled into the binary.
const BUNDLED_CATALOG: &str = include_str!("../../config/personas.toml");

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "persona")]
    personas: Vec<PersonaSpec>,
}

/// Where a registry gets its personas from. Reloading re-reads the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    Bundled,
    File(PathBuf),
}

impl CatalogSource {
    pub fn from_settings(settings: &PersonaSettings) -> Self {
        match settings.file {
            Some(ref file) => CatalogSource::File(PathBuf::from(file)),
            None => CatalogSource::Bundled,
        }
    }

    /// Read and validate the catalog, returning personas in catalog order.
    pub fn load(&self) -> Result<Vec<Persona>> {
        match self {
            CatalogSource::Bundled => parse_catalog(BUNDLED_CATALOG, "bundled catalog"),
            CatalogSource::File(path) => {
                let text = fs::read_to_string(path).map_err(|e| Error::IoRead {
                    path: path.clone(),
                    source: e,
                })?;
                parse_catalog(&text, &path.display().to_string())
            }
        }
    }
}

/// Parse catalog TOML and check the catalog-wide rules.
pub fn parse_catalog(text: &str, origin: &str) -> Result<Vec<Persona>> {
    let file: CatalogFile = toml::from_str(text)
        .map_err(|e| Error::persona_catalog(format!("{}: {}", origin, e.message())))?;

    if file.personas.is_empty() {
        return Err(Error::persona_catalog(format!("{}: no [[persona]] entries", origin)));
    }

    let personas: Vec<Persona> = file.personas.into_iter().map(Persona::from).collect();

    for persona in &personas {
        if persona.name.is_empty() {
            return Err(Error::persona_catalog(format!("{}: persona with empty name", origin)));
        }
        if persona.name.starts_with('@') {
            return Err(Error::persona_catalog(format!(
                "{}: persona name '{}' must not start with '@'",
                origin, persona.name
            )));
        }
        if !(0.0..=2.0).contains(&persona.temperature) {
            return Err(Error::persona_catalog(format!(
                "{}: temperature {} of '{}' is outside 0.0-2.0",
                origin, persona.temperature, persona.name
            )));
        }
    }

    let coordinators = personas.iter().filter(|p| p.coordinator).count();
    if coordinators != 1 {
        return Err(Error::persona_catalog(format!(
            "{}: expected exactly one coordinator persona, found {}",
            origin, coordinators
        )));
    }

    let defaults = personas.iter().filter(|p| p.fallback).count();
    if defaults != 1 {
        return Err(Error::persona_catalog(format!(
            "{}: expected exactly one default persona, found {}",
            origin, defaults
        )));
    }

    Ok(personas)
}
