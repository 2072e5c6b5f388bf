/*
 * config.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Engine configuration.
//!
//! ```toml
//! compile = true
//! escaping = true
//! cache_directory = "var/cache/templates"
//! namespace_uri_prefix = "https://stencil.dev/ns/"
//! tolerant = false
//! ignored_namespaces = ["svg"]
//!
//! [namespaces]
//! x = "acme::helpers"
//! ```

use crate::error::ConfigError;
use crate::namespace::DEFAULT_NAMESPACE_URI_PREFIX;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Compile templates and reuse the compiled units.
    pub compile: bool,

    /// Escape expression output unless a helper disables it.
    pub escaping: bool,

    /// Directory for compiled templates. Without one, units only live in
    /// memory.
    pub cache_directory: Option<PathBuf>,

    /// `xmlns:x="<prefix>..."` attributes with this URI prefix bind `x`.
    pub namespace_uri_prefix: String,

    /// Render error placeholders instead of failing.
    pub tolerant: bool,

    /// Extra prefix bindings, prefix to namespace target.
    pub namespaces: IndexMap<String, String>,

    /// Prefixes (or `prefix*` patterns) whose tags are left as text.
    pub ignored_namespaces: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            compile: true,
            escaping: true,
            cache_directory: None,
            namespace_uri_prefix: DEFAULT_NAMESPACE_URI_PREFIX.to_string(),
            tolerant: false,
            namespaces: IndexMap::new(),
            ignored_namespaces: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
