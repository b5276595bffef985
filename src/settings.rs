use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Runtime settings. Every field has a default, so an empty or partial
/// TOML file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Explicit display currency; wins over the dataset's own currency.
    pub currency: Option<String>,
    pub default_currency: String,
    /// Used only when the dataset declares no years at all.
    pub fallback_start_year: i32,
    pub fallback_end_year: i32,
    pub default_value_unit: String,
    pub default_volume_unit: String,
    /// Base URL of the dashboard packaging service.
    pub packaging_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            currency: None,
            default_currency: "USD".to_string(),
            fallback_start_year: 2024,
            fallback_end_year: 2032,
            default_value_unit: "Million".to_string(),
            default_volume_unit: "Units".to_string(),
            packaging_url: "http://localhost:3000".to_string(),
        }
    }
}

impl Settings {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("parsing settings TOML")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings file {}", path.display()))?;
        let settings = Self::from_toml_str(&text)?;
        log::debug!("Loaded settings from {}: {settings:?}", path.display());
        Ok(settings)
    }

    /// Load `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }
}
