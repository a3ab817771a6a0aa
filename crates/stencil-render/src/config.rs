/*
 * config.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Renderer configuration.
//!
//! Settings are read from a TOML file:
//!
//! ```toml
//! base_url = "https://www.example.com"
//! default_lang = "en_US"
//! default_tz = "UTC"
//! parallel_threshold = 64
//! cache_capacity = 512
//! ```
//!
//! Every key is optional.

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;
use crate::formatting::FormatDefaults;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderSettings {
    /// Base URL site-relative links are resolved against when post-processing.
    pub base_url: Option<String>,
    /// Locale used when the render context does not name one.
    pub default_lang: String,
    /// Timezone used when neither the context nor the helper call names one.
    pub default_tz: String,
    /// Batches with at least this many records are evaluated in parallel.
    pub parallel_threshold: Option<usize>,
    /// Maximum number of compiled templates kept per environment.
    pub cache_capacity: Option<usize>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        let defaults = FormatDefaults::default();
        Self {
            base_url: None,
            default_lang: defaults.lang,
            default_tz: defaults.tz,
            parallel_threshold: None,
            cache_capacity: None,
        }
    }
}

impl RenderSettings {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let settings: RenderSettings = toml::from_str(source)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Check values serde cannot check on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parsed_base_url().map(|_| ())
    }

    pub fn parsed_base_url(&self) -> Result<Option<Url>, ConfigError> {
        self.base_url
            .as_deref()
            .map(|url| {
                Url::parse(url).map_err(|source| ConfigError::InvalidBaseUrl {
                    url: url.to_string(),
                    source,
                })
            })
            .transpose()
    }

    pub fn format_defaults(&self) -> FormatDefaults {
        FormatDefaults {
            lang: self.default_lang.clone(),
            tz: self.default_tz.clone(),
        }
    }
}
