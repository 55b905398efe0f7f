//! Configuration loading

use anyhow::Result;
use rig2jbeam_core::{ConversionSettings, TemplateIndex, VehicleTemplate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub conversion: ConversionSettings,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
    /// Added to the built-in templates, replacing same-named ones
    #[serde(default, rename = "template")]
    pub templates: Vec<VehicleTemplate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving `.jbeam`, `.dae` and `manifest.json`
    #[serde(default = "default_output_dir")]
    pub dir: String,
    #[serde(default = "default_true")]
    pub write_manifest: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            write_manifest: true,
        }
    }
}

fn default_output_dir() -> String {
    ".".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetsConfig {
    /// Mesh search directory; defaults to each input's own directory
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default)]
    pub convert_meshes: bool,
}

impl Config {
    /// Built-in templates merged with the ones from this file
    pub fn template_index(&self) -> TemplateIndex {
        let mut index = TemplateIndex::builtin();
        index.merge(self.templates.iter().cloned());
        index
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), templates = config.templates.len(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let config = Config {
        templates: vec![VehicleTemplate {
            name: "bus".to_string(),
            description: Some("City bus".to_string()),
            minimum_mass: Some(80.0),
            default_beam_spring: None,
            typical_dry_weight: Some(11000.0),
            typical_load_weight: Some(6000.0),
        }],
        ..Config::default()
    };

    let content = toml::to_string_pretty(&config)?;
    std::fs::write(path, content)?;
    info!(path = %path.display(), "Wrote default configuration");
    Ok(())
}
