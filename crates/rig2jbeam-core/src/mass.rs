//! Node mass distribution
//!
//! Load-bearing nodes split the load weight; the dry weight is spread over
//! beam endpoints in proportion to beam length. Every node is then raised to
//! the minimum mass.

use tracing::debug;

use crate::report::ConversionReport;
use crate::rig::{NodeFlag, Rig};
use crate::settings::ConversionSettings;

/// Relative deviation of the total from `dry + load` that triggers a warning
const MASS_TOLERANCE: f64 = 0.1;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MassSummary {
    pub total: f64,
    pub expected: f64,
    /// Nodes raised to the minimum mass
    pub clamped: usize,
}

pub fn calculate_masses(
    rig: &mut Rig,
    settings: &ConversionSettings,
    report: &mut ConversionReport,
) -> MassSummary {
    let dry_weight = rig.dry_weight.unwrap_or(settings.default_dry_weight);
    let load_weight = rig.load_weight.unwrap_or(settings.default_cargo_weight);
    let minimum_mass = rig.minimum_mass.unwrap_or(settings.minimum_mass);

    let shared_load_nodes = rig
        .nodes
        .iter()
        .filter(|n| n.has(NodeFlag::LoadBearing) && n.mass_override.is_none())
        .count();
    for node in &mut rig.nodes {
        node.mass = match (node.has(NodeFlag::LoadBearing), node.mass_override) {
            (true, Some(mass)) => mass,
            (true, None) => load_weight / shared_load_nodes as f64,
            (false, _) => 0.0,
        };
    }

    // Beams with a dangling endpoint carry no mass
    let spans: Vec<([usize; 2], f64)> = rig
        .beams
        .iter()
        .filter_map(|b| {
            let ends = [rig.index_of(&b.nodes[0])?, rig.index_of(&b.nodes[1])?];
            Some((ends, rig.node_distance(&b.nodes[0], &b.nodes[1])?))
        })
        .collect();
    let total_length: f64 = spans.iter().map(|(_, length)| length).sum();

    if total_length > 0.0 {
        for (ends, length) in &spans {
            let half = length * dry_weight / total_length / 2.0;
            for &i in ends {
                rig.nodes[i].mass += half;
            }
        }
    } else if !rig.beams.is_empty() {
        report.warn("all beams have zero length, dry weight not distributed");
    }

    let mut clamped = 0;
    for node in &mut rig.nodes {
        if node.mass < minimum_mass {
            node.mass = minimum_mass;
            clamped += 1;
        }
    }

    let total: f64 = rig.nodes.iter().map(|n| n.mass).sum();
    let expected = dry_weight + load_weight;
    if (total - expected).abs() > expected.abs() * MASS_TOLERANCE {
        report.warn(format!(
            "total node mass {:.1} differs from dry + load weight {:.1} by more than {}%",
            total,
            expected,
            MASS_TOLERANCE * 100.0
        ));
    }

    debug!(total, expected, clamped, minimum_mass, "Distributed node masses");
    MassSummary {
        total,
        expected,
        clamped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_rig;
    use crate::report::Severity;

    fn masses(src: &str, settings: &ConversionSettings) -> (Rig, MassSummary, ConversionReport) {
        let mut report = ConversionReport::default();
        let mut rig = parse_rig(src, settings, &mut report);
        let summary = calculate_masses(&mut rig, settings, &mut report);
        (rig, summary, report)
    }

    #[test]
    fn test_dry_weight_split_by_length() {
        let (rig, summary, report) = masses(
            "t\nglobals\n300, 0\nnodes\n1,0,0,0\n2,1,0,0\n3,3,0,0\nbeams\n1,2\n2,3\n",
            &ConversionSettings {
                minimum_mass: 1.0,
                ..Default::default()
            },
        );
        // beam lengths 1 and 2 carry 100 and 200
        assert!((rig.nodes[0].mass - 50.0).abs() < 1e-9);
        assert!((rig.nodes[1].mass - 150.0).abs() < 1e-9);
        assert!((rig.nodes[2].mass - 100.0).abs() < 1e-9);
        assert!((summary.total - 300.0).abs() < 1e-9);
        assert_eq!(report.count(Severity::Warning), 0);
    }

    #[test]
    fn test_load_nodes_share_load_weight() {
        let (rig, _, _) = masses(
            "t\nglobals\n0, 100\nnodes\n1,0,0,0,l\n2,1,0,0,l\n3,2,0,0,l,10\nbeams\n1,2\n",
            &ConversionSettings {
                minimum_mass: 0.0,
                ..Default::default()
            },
        );
        assert_eq!(rig.nodes[0].mass, 50.0);
        assert_eq!(rig.nodes[1].mass, 50.0);
        assert_eq!(rig.nodes[2].mass, 10.0);
    }

    #[test]
    fn test_minimum_mass_clamp_and_minimass_section() {
        let settings = ConversionSettings::default();
        let (rig, summary, report) = masses(
            "t\nglobals\n10, 0\nminimass\n80\nnodes\n1,0,0,0\n2,1,0,0\nbeams\n1,2\n",
            &settings,
        );
        assert!(rig.nodes.iter().all(|n| n.mass == 80.0));
        assert_eq!(summary.clamped, 2);
        // 160 against an expected 10
        assert_eq!(report.count(Severity::Warning), 1);
    }
}
