//! Structural checks over a fully parsed [`Rig`]
//!
//! Dangling node references and empty rigs are fatal; everything else is a
//! warning. Masses are checked separately by [`check_masses`] once the mass
//! calculator has run.

use std::collections::HashMap;
use std::path::{Component, Path};

use tracing::debug;

use crate::report::{ConversionReport, Diagnostic};
use crate::rig::{NodeId, Rig};
use crate::settings::ConversionSettings;

/// Mesh extensions the target understands
const MESH_EXTENSIONS: &[&str] = &[".mesh.xml", ".mesh", ".dae"];

/// Largest plausible per-axis attachment scale
const MAX_SCALE: f64 = 10.0;

/// Run every structural check, recording findings in `report`
pub fn validate(
    rig: &Rig,
    settings: &ConversionSettings,
    asset_dir: Option<&Path>,
    report: &mut ConversionReport,
) {
    let before = report.diagnostics.len();

    if rig.nodes.is_empty() {
        report.fatal("no nodes parsed");
    }
    if rig.beams.is_empty() {
        report.fatal("no beams parsed");
    }

    check_references(rig, report);
    if settings.warn_on_duplicate_positions {
        check_duplicate_positions(rig, report);
    }
    check_weights(rig, report);
    check_drivetrain(rig, report);
    check_attachments(rig, asset_dir, settings.warn_on_missing_nodes, report);

    debug!(
        findings = report.diagnostics.len() - before,
        "Validation finished"
    );
}

fn check_references(rig: &Rig, report: &mut ConversionReport) {
    let mut missing = |what: &str, line: usize, id: &NodeId| {
        if !rig.has_node(id) {
            report.push(
                Diagnostic::fatal(format!("{} references unknown node '{}'", what, id))
                    .with_line(line),
            );
        }
    };

    for beam in &rig.beams {
        beam.nodes.iter().for_each(|id| missing("beam", beam.line, id));
    }
    for hydro in &rig.hydros {
        hydro.nodes.iter().for_each(|id| missing("hydro", hydro.line, id));
    }
    for wheel in &rig.wheels {
        wheel.node_refs().for_each(|id| missing("wheel", wheel.line, id));
    }
    for triangle in &rig.triangles {
        triangle
            .nodes
            .iter()
            .for_each(|id| missing("triangle", triangle.line, id));
    }
    for quad in &rig.quads {
        quad.nodes.iter().for_each(|id| missing("quad", quad.line, id));
    }
    for camera in &rig.cameras {
        camera.nodes.iter().for_each(|id| missing("cinecam", camera.line, id));
    }
    if let Some(refs) = &rig.ref_nodes {
        for id in [&refs.center, &refs.back, &refs.left] {
            missing("cameras", refs.line, id);
        }
    }
    for rail in &rig.rails {
        rail.nodes.iter().for_each(|id| missing("rail", rail.line, id));
    }
    for slidenode in &rig.slidenodes {
        missing("slidenode", slidenode.line, &slidenode.node);
    }
    for attachment in &rig.attachments {
        for id in attachment.frame_nodes() {
            missing(attachment.kind.label(), attachment.line, id);
        }
    }
    for axle in &rig.axles {
        for id in axle.wheel1.iter().chain(&axle.wheel2) {
            missing("axle", axle.line, id);
        }
    }

    for slidenode in &rig.slidenodes {
        if !rig.rails.iter().any(|r| r.name == slidenode.rail) {
            report.push(
                Diagnostic::fatal(format!(
                    "slidenode references unknown rail '{}'",
                    slidenode.rail
                ))
                .with_line(slidenode.line),
            );
        }
    }
}

fn check_duplicate_positions(rig: &Rig, report: &mut ConversionReport) {
    let mut seen: HashMap<[i64; 3], &NodeId> = HashMap::new();
    for node in &rig.nodes {
        let key = node.position.map(|v| (v * 1000.0).round() as i64);
        if let Some(first) = seen.insert(key, &node.id) {
            report.warn_at(
                node.line,
                format!("node '{}' has the same position as '{}'", node.id, first),
            );
        }
    }
}

fn check_weights(rig: &Rig, report: &mut ConversionReport) {
    if rig.dry_weight.is_some_and(|w| w <= 0.0) {
        report.warn("dry weight is not positive");
    }
    if rig.load_weight.is_some_and(|w| w <= 0.0) {
        report.warn("load weight is not positive");
    }
}

fn check_drivetrain(rig: &Rig, report: &mut ConversionReport) {
    match &rig.engine {
        Some(engine) => {
            if rig.torque_curve.is_none() {
                report.warn_at(engine.line, "engine without torquecurve, using the default curve");
            }
            let propelled = rig.wheels.iter().any(|w| w.propulsion > 0);
            if !propelled && rig.axles.is_empty() {
                report.warn_at(engine.line, "engine without any propelled wheel or axle");
            }
        }
        None => {
            if let Some(engoption) = &rig.engoption {
                report.warn_at(engoption.line, "engoption without engine");
            }
            if rig.torque_curve.is_some() {
                report.warn("torquecurve without engine");
            }
        }
    }
}

fn check_attachments(
    rig: &Rig,
    asset_dir: Option<&Path>,
    warn_missing_nodes: bool,
    report: &mut ConversionReport,
) {
    for attachment in &rig.attachments {
        let label = attachment.kind.label();
        let line = attachment.line;
        let lower = attachment.mesh.to_ascii_lowercase();

        if !MESH_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
            report.warn_at(
                line,
                format!("{} mesh '{}' has an unusual extension", label, attachment.mesh),
            );
        }

        if attachment.scale.iter().any(|&s| s <= 0.0 || s > MAX_SCALE) {
            report.warn_at(
                line,
                format!("{} '{}' has an implausible scale {:?}", label, attachment.mesh, attachment.scale),
            );
        }

        // the setting only picks the severity; unresolved entries are always reported
        for entry in &attachment.forset {
            let (_, absent) = entry.resolve(rig);
            if absent > 0 {
                let message = format!(
                    "forset entry '{}' of {} '{}' names {} unknown node(s)",
                    entry, label, attachment.mesh, absent
                );
                report.push(if warn_missing_nodes {
                    Diagnostic::warning_at(line, message)
                } else {
                    Diagnostic::notice_at(line, message)
                });
            }
        }

        if let Some(dir) = asset_dir {
            if find_asset(dir, &attachment.mesh).is_none() {
                report.warn_at(
                    line,
                    format!("mesh '{}' not found in {}", attachment.mesh, dir.display()),
                );
            }
        }
    }
}

/// Locate `name` in `dir`, ignoring ASCII case
///
/// A binary `.mesh` reference also matches its `.mesh.xml` export.
pub fn find_asset(dir: &Path, name: &str) -> Option<std::path::PathBuf> {
    find_file(dir, name).or_else(|| {
        if name.to_ascii_lowercase().ends_with(".mesh") {
            find_file(dir, &format!("{}.xml", name))
        } else {
            None
        }
    })
}

/// Only plain relative names stay inside the asset directory
fn is_contained(name: &str) -> bool {
    !name.is_empty()
        && Path::new(name)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn find_file(dir: &Path, name: &str) -> Option<std::path::PathBuf> {
    if !is_contained(name) {
        debug!(name, "Asset name leaves the asset directory, ignored");
        return None;
    }
    let exact = dir.join(name);
    if exact.is_file() {
        return Some(exact);
    }
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .find(|entry| entry.file_name().to_string_lossy().eq_ignore_ascii_case(name))
        .map(|entry| entry.path())
}

/// Warn about nodes whose computed mass is not positive
pub fn check_masses(rig: &Rig, report: &mut ConversionReport) {
    for node in rig.nodes.iter().filter(|n| n.mass <= 0.0) {
        report.warn_at(
            node.line,
            format!("node '{}' has non-positive mass {}", node.id, node.mass),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_rig;
    use crate::report::Severity;

    fn check(src: &str) -> ConversionReport {
        let settings = ConversionSettings::default();
        let mut report = ConversionReport::default();
        let rig = parse_rig(src, &settings, &mut report);
        validate(&rig, &settings, None, &mut report);
        report
    }

    #[test]
    fn test_valid_rig_has_no_fatal() {
        let report = check("t\nglobals\n100, 10\nnodes\n1,0,0,0\n2,1,0,0\nbeams\n1,2\n");
        assert!(!report.has_fatal());
        assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
    }

    #[test]
    fn test_empty_rig_is_fatal() {
        let report = check("t\n");
        assert_eq!(report.count(Severity::Fatal), 2);
    }

    #[test]
    fn test_dangling_beam_is_fatal_with_line() {
        let report = check("t\nnodes\n1,0,0,0\n2,1,0,0\nbeams\n1,2\n1,7\n");
        let fatal: Vec<_> = report.of(Severity::Fatal).collect();
        assert_eq!(fatal.len(), 1);
        assert_eq!(fatal[0].line, Some(7));
        assert!(fatal[0].message.contains("node7"));
    }

    #[test]
    fn test_duplicate_positions_round_to_millimetres() {
        let report = check("t\nnodes\n1,0,0,0\n2,0.0004,0,0\n3,0.01,0,0\nbeams\n1,3\n");
        assert_eq!(report.count(Severity::Warning), 1);
    }

    const FORSET_RIG: &str =
        "t\nnodes\n1,0,0,0\n2,1,0,0\n3,0,1,0\nbeams\n1,2\nflexbodies\n1,2,3,0,0,0,0,0,0,body.mesh\nforset 1-5\n";

    #[test]
    fn test_missing_forset_nodes_are_reported() {
        let report = check(FORSET_RIG);
        let warning = report.of(Severity::Warning).next().unwrap();
        assert!(warning.message.contains("1-5"));
        // positions 1 and 2 exist, 3 to 5 do not
        assert!(warning.message.contains("3 unknown"));
    }

    #[test]
    fn test_missing_forset_nodes_reported_with_warnings_off() {
        let settings = ConversionSettings {
            warn_on_missing_nodes: false,
            ..ConversionSettings::default()
        };
        let mut report = ConversionReport::default();
        let rig = parse_rig(FORSET_RIG, &settings, &mut report);
        validate(&rig, &settings, None, &mut report);

        assert_eq!(report.count(Severity::Warning), 0);
        let notice = report.of(Severity::Notice).next().unwrap();
        assert!(notice.message.contains("3 unknown"));
    }

    #[test]
    fn test_find_asset_stays_inside_directory() {
        let root = tempfile::tempdir().unwrap();
        let assets = root.path().join("assets");
        std::fs::create_dir(&assets).unwrap();
        std::fs::write(root.path().join("secret.mesh"), b"x").unwrap();
        std::fs::write(assets.join("Wheel.mesh"), b"x").unwrap();

        assert_eq!(find_asset(&assets, "wheel.MESH"), Some(assets.join("Wheel.mesh")));
        assert!(find_asset(&assets, "../secret.mesh").is_none());
        let absolute = root.path().join("secret.mesh");
        assert!(find_asset(&assets, &absolute.to_string_lossy()).is_none());
    }

    #[test]
    fn test_attachment_checks() {
        let report = check(
            "t\nnodes\n1,0,0,0\n2,1,0,0\n3,0,1,0\nbeams\n1,2\nflexbodies\n1,2,3,0,0,0,0,0,0,body.obj,0,1,1\n",
        );
        assert_eq!(report.count(Severity::Warning), 2);
    }

    #[test]
    fn test_engine_without_curve_or_drive() {
        let report = check(
            "t\nnodes\n1,0,0,0\n2,1,0,0\nbeams\n1,2\nengine\n1000,3000,500,3,4,0,2,1,-1\n",
        );
        assert_eq!(report.count(Severity::Warning), 2);
    }

    #[test]
    fn test_missing_asset_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Present.MESH"), b"x").unwrap();
        assert!(find_asset(dir.path(), "present.mesh").is_some());
        assert!(find_asset(dir.path(), "absent.mesh").is_none());
        std::fs::write(dir.path().join("Seat.mesh.xml"), b"<mesh/>").unwrap();
        assert!(find_asset(dir.path(), "seat.mesh").is_some());

        let settings = ConversionSettings::default();
        let mut report = ConversionReport::default();
        let rig = parse_rig(
            "t\nnodes\n1,0,0,0\n2,1,0,0\n3,0,1,0\nbeams\n1,2\nprops\n1,2,3,0,0,0,0,0,0,absent.mesh\n",
            &settings,
            &mut report,
        );
        validate(&rig, &settings, Some(dir.path()), &mut report);
        assert_eq!(report.count(Severity::Warning), 1);
    }
}
