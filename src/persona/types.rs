//! Core persona types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────
// Capability
// ─────────────────────────────────────────────────────────────────

/// How a persona turns a request into a reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// One model call, text in and text out.
    #[default]
    Text,
    /// Bounded tool-calling loop over the configured tool servers.
    Tools,
    /// One model call with live web search enabled; returns citations.
    Search,
}

impl Capability {
    pub fn slug(&self) -> &'static str {
        match self {
            Capability::Text => "text",
            Capability::Tools => "tools",
            Capability::Search => "search",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slug())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Capability::Text),
            "tools" | "tool-calling" => Ok(Capability::Tools),
            "search" | "search-augmented" => Ok(Capability::Search),
            _ => Err(format!(
                "Unknown capability '{}'. Valid: text, tools, search",
                s
            )),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Catalog entry
// ─────────────────────────────────────────────────────────────────

/// One `[[persona]]` entry of a catalog file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaSpec {
    pub name: String,
    pub role: String,
    pub temperature: f32,
    pub preamble: String,
    #[serde(default)]
    pub capability: Capability,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub coordinator: bool,
    #[serde(default)]
    pub default: bool,
}

// ─────────────────────────────────────────────────────────────────
// Persona
// ─────────────────────────────────────────────────────────────────

/// A named behavioral profile. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Persona {
    /// Canonical name, unique across a registry.
    pub name: String,
    /// One-line role description; also registered as an alias.
    pub role: String,
    /// Extra aliases (without the "@" prefix).
    pub aliases: Vec<String>,
    /// Instruction preamble sent as the first (system) message.
    pub preamble: String,
    pub temperature: f32,
    pub capability: Capability,
    /// May answer with an execution plan that fans work out to other personas.
    pub coordinator: bool,
    /// Fallback target when no routing rule matches.
    pub fallback: bool,
}

impl Persona {
    /// "@name" form used in mentions.
    pub fn mention(&self) -> String {
        format!("@{}", self.name)
    }

    /// Every lookup key for this persona: name, role and aliases, each with and without "@".
    pub fn lookup_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        let bases = std::iter::once(&self.name)
            .chain(std::iter::once(&self.role))
            .chain(self.aliases.iter());

        for base in bases {
            let base = base.trim();
            if base.is_empty() {
                continue;
            }
            for key in [base.to_string(), format!("@{}", base)] {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }
}

impl From<PersonaSpec> for Persona {
    fn from(spec: PersonaSpec) -> Self {
        Self {
            name: spec.name.trim().to_string(),
            role: spec.role.trim().to_string(),
            aliases: spec.aliases,
            preamble: spec.preamble.trim().to_string(),
            temperature: spec.temperature,
            capability: spec.capability,
            coordinator: spec.coordinator,
            fallback: spec.default,
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.role)
    }
}
