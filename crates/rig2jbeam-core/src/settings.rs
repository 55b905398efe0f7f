//! Conversion settings consumed by the parser defaults, validator and emitter

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::transform::CoordinateTransform;

/// Tunables for one conversion run
///
/// Every field has a serde default so a partial `[conversion]` table in a
/// config file only overrides what it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionSettings {
    /// Lower clamp applied to every computed node mass (kg)
    #[serde(default = "default_minimum_mass")]
    pub minimum_mass: f64,

    #[serde(default = "default_beam_spring")]
    pub default_beam_spring: f64,
    #[serde(default = "default_beam_damp")]
    pub default_beam_damp: f64,
    #[serde(default = "default_beam_deform")]
    pub default_beam_deform: f64,
    #[serde(default = "default_beam_strength")]
    pub default_beam_strength: f64,

    #[serde(default = "default_friction")]
    pub default_friction: f64,
    /// Load weight assigned via `set_node_defaults` before any directive
    #[serde(default)]
    pub default_load_weight: f64,

    /// Used when the rig has no `globals` section
    #[serde(default = "default_vehicle_weight")]
    pub default_dry_weight: f64,
    #[serde(default = "default_vehicle_weight")]
    pub default_cargo_weight: f64,

    #[serde(default = "default_slot_type")]
    pub slot_type: String,
    /// Author written when the rig has no `author` directive
    #[serde(default = "default_author")]
    pub default_author: String,

    #[serde(default)]
    pub strict_validation: bool,
    #[serde(default = "default_true")]
    pub warn_on_missing_nodes: bool,
    #[serde(default = "default_true")]
    pub warn_on_duplicate_positions: bool,

    #[serde(default)]
    pub transform: CoordinateTransform,
    /// Emit pos/rot/scale objects on flexbody and prop rows
    #[serde(default = "default_true")]
    pub transform_properties: bool,
    /// Pull nearby nodes into flexbody groups that have no forset
    #[serde(default)]
    pub infer_flexbody_nodes: bool,

    /// Source material name -> target node material (without the `|` prefix)
    #[serde(default = "default_material_mappings")]
    pub material_mappings: BTreeMap<String, String>,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            minimum_mass: default_minimum_mass(),
            default_beam_spring: default_beam_spring(),
            default_beam_damp: default_beam_damp(),
            default_beam_deform: default_beam_deform(),
            default_beam_strength: default_beam_strength(),
            default_friction: default_friction(),
            default_load_weight: 0.0,
            default_dry_weight: default_vehicle_weight(),
            default_cargo_weight: default_vehicle_weight(),
            slot_type: default_slot_type(),
            default_author: default_author(),
            strict_validation: false,
            warn_on_missing_nodes: true,
            warn_on_duplicate_positions: true,
            transform: CoordinateTransform::default(),
            transform_properties: true,
            infer_flexbody_nodes: false,
            material_mappings: default_material_mappings(),
        }
    }
}

impl ConversionSettings {
    /// Map a surface material through `material_mappings`, matching keys
    /// case-insensitively; unmapped names pass through unchanged
    pub fn map_material<'a>(&'a self, material: &'a str) -> &'a str {
        self.material_mappings
            .iter()
            .find(|(from, _)| from.eq_ignore_ascii_case(material))
            .map(|(_, to)| to.as_str())
            .unwrap_or(material)
    }
}

fn default_minimum_mass() -> f64 {
    50.0
}

fn default_beam_spring() -> f64 {
    9_000_000.0
}

fn default_beam_damp() -> f64 {
    12_000.0
}

fn default_beam_deform() -> f64 {
    400_000.0
}

fn default_beam_strength() -> f64 {
    1_000_000.0
}

fn default_friction() -> f64 {
    1.0
}

fn default_vehicle_weight() -> f64 {
    10_000.0
}

fn default_slot_type() -> String {
    "main".to_string()
}

fn default_author() -> String {
    "rig2jbeam".to_string()
}

fn default_true() -> bool {
    true
}

fn default_material_mappings() -> BTreeMap<String, String> {
    [
        ("default", "NM_METAL"),
        ("rubber", "NM_RUBBER"),
        ("plastic", "NM_PLASTIC"),
        ("glass", "NM_GLASS"),
    ]
    .into_iter()
    .map(|(from, to)| (from.to_string(), to.to_string()))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: ConversionSettings = toml::from_str(
            r#"
minimum_mass = 25.0
transform = "identity"
"#,
        )
        .unwrap();

        assert_eq!(settings.minimum_mass, 25.0);
        assert_eq!(settings.default_beam_spring, 9_000_000.0);
        assert_eq!(settings.transform, CoordinateTransform::Identity);
        assert!(settings.transform_properties);
        assert_eq!(settings.material_mappings.len(), 4);
    }

    #[test]
    fn test_material_mapping_is_case_insensitive() {
        let settings = ConversionSettings::default();
        assert_eq!(settings.map_material("Rubber"), "NM_RUBBER");
        assert_eq!(settings.map_material("default"), "NM_METAL");
        assert_eq!(settings.map_material("carbon"), "carbon");
    }
}
