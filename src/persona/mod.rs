//! Persona system: statically configured behavioral profiles and their registry.
//!
//! Personas come from a TOML catalog (bundled, or a file named in the config)
//! and are immutable once registered. A reload rebuilds the whole registry.

pub mod catalog;
pub mod registry;
pub mod types;

pub use catalog::CatalogSource;
pub use registry::PersonaRegistry;
pub use types::{Capability, Persona};
