//! Vehicle templates - named bundles of conversion setting overrides
//!
//! A template tunes the settings for a class of vehicle (minimum node mass,
//! beam stiffness, fallback weights). Built-in templates can be extended or
//! replaced by `[[template]]` entries from a TOML file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::settings::ConversionSettings;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Failed to read template index: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse template index: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize template index: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("No template named '{0}'")]
    NotFound(String),
}

/// A single template entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleTemplate {
    /// Lookup name, matched case-insensitively (e.g., "truck")
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Minimum node mass in kg
    #[serde(default)]
    pub minimum_mass: Option<f64>,
    #[serde(default)]
    pub default_beam_spring: Option<f64>,
    /// Dry weight used when a rig has no `globals`
    #[serde(default)]
    pub typical_dry_weight: Option<f64>,
    #[serde(default)]
    pub typical_load_weight: Option<f64>,
}

impl VehicleTemplate {
    fn builtin(name: &str, description: &str, minimum_mass: f64, dry: f64, load: f64) -> Self {
        Self {
            name: name.to_string(),
            description: Some(description.to_string()),
            minimum_mass: Some(minimum_mass),
            default_beam_spring: None,
            typical_dry_weight: Some(dry),
            typical_load_weight: Some(load),
        }
    }

    /// Override the matching settings fields
    pub fn apply(&self, settings: &mut ConversionSettings) {
        if let Some(mass) = self.minimum_mass {
            settings.minimum_mass = mass;
        }
        if let Some(spring) = self.default_beam_spring {
            settings.default_beam_spring = spring;
        }
        if let Some(dry) = self.typical_dry_weight {
            settings.default_dry_weight = dry;
        }
        if let Some(load) = self.typical_load_weight {
            settings.default_cargo_weight = load;
        }
        debug!(template = %self.name, "Applied vehicle template");
    }
}

/// The template index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateIndex {
    /// Version of the template index format
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub template: Vec<VehicleTemplate>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for TemplateIndex {
    fn default() -> Self {
        Self {
            version: default_version(),
            template: Vec::new(),
        }
    }
}

impl TemplateIndex {
    /// Templates shipped with the converter
    pub fn builtin() -> Self {
        let mut airplane = VehicleTemplate::builtin("airplane", "Aircraft", 10.0, 2000.0, 1000.0);
        airplane.default_beam_spring = Some(15_000_000.0);
        Self {
            version: default_version(),
            template: vec![
                VehicleTemplate::builtin("car", "Standard passenger car", 25.0, 1500.0, 500.0),
                VehicleTemplate::builtin("truck", "Heavy truck/lorry", 100.0, 8000.0, 20000.0),
                airplane,
                VehicleTemplate::builtin("trailer", "Trailer/semi-trailer", 75.0, 5000.0, 25000.0),
            ],
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, TemplateError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, TemplateError> {
        let index: TemplateIndex = toml::from_str(content)?;
        Ok(index)
    }

    pub fn to_file(&self, path: &Path) -> Result<(), TemplateError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Find a template by name (case-insensitive)
    pub fn find(&self, name: &str) -> Option<&VehicleTemplate> {
        self.template
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Add templates, replacing same-named entries
    pub fn merge(&mut self, templates: impl IntoIterator<Item = VehicleTemplate>) {
        for template in templates {
            match self
                .template
                .iter_mut()
                .find(|t| t.name.eq_ignore_ascii_case(&template.name))
            {
                Some(existing) => *existing = template,
                None => self.template.push(template),
            }
        }
    }

    /// Apply the named template to `settings`
    pub fn apply(&self, name: &str, settings: &mut ConversionSettings) -> Result<(), TemplateError> {
        let template = self
            .find(name)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))?;
        template.apply(settings);
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.template.iter().map(|t| t.name.as_str())
    }
}
