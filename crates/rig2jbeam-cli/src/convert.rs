//! Per-document orchestration: convert, export meshes, write outputs

use anyhow::{Context, Result};
use rig2jbeam_core::{convert, ConversionReport, ConvertError, ConvertOptions, Diagnostic, Severity};
use rig2jbeam_mesh::{collada_file_name, decode_assets, sync_dae_assets, ColladaWriter};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::manifest::{sha256_hex, DocumentEntry, DocumentStatus, MeshEntry, OutputFile};

/// Run-wide options shared by every document
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub output_dir: PathBuf,
    /// Mesh search directory; `None` uses the input's own directory
    pub asset_dir: Option<PathBuf>,
    pub convert_meshes: bool,
    /// Convert and report, but write nothing
    pub dry_run: bool,
    /// Contributor written into COLLADA files
    pub author: Option<String>,
}

fn input_dir(input: &Path) -> PathBuf {
    match input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn write_output(dir: &Path, name: &str, content: &[u8], dry_run: bool) -> Result<OutputFile> {
    if !dry_run {
        let path = dir.join(name);
        std::fs::write(&path, content).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(OutputFile::new(name, content))
}

/// Source assets that exports must never replace
#[derive(Debug, Default)]
struct SourceAssets(HashSet<PathBuf>);

impl SourceAssets {
    fn insert(&mut self, path: &Path) {
        if let Ok(path) = std::fs::canonicalize(path) {
            self.0.insert(path);
        }
    }

    fn contains(&self, path: &Path) -> bool {
        std::fs::canonicalize(path).is_ok_and(|p| self.0.contains(&p))
    }
}

/// Write an exported asset unless the target is one of the sources
///
/// `unchanged` marks content with the same names as its source; such an
/// export is recorded as the existing file when it would land on its source.
fn write_asset(
    name: String,
    content: &[u8],
    unchanged: bool,
    sources: &SourceAssets,
    run: &RunOptions,
    report: &mut ConversionReport,
) -> Result<Option<OutputFile>> {
    let target = run.output_dir.join(&name);
    if sources.contains(&target) {
        if unchanged {
            let existing = std::fs::read(&target).with_context(|| format!("reading {}", target.display()))?;
            return Ok(Some(OutputFile::new(name, &existing)));
        }
        warn!(path = %target.display(), "Refusing to overwrite a source asset");
        report.push(Diagnostic::warning(format!(
            "{} is a source asset and was not overwritten; choose another output directory",
            target.display()
        )));
        return Ok(None);
    }
    write_output(&run.output_dir, &name, content, run.dry_run).map(Some)
}

/// Convert one input file and write its outputs
///
/// A document with fatal diagnostics yields a failed entry, not an error;
/// errors are reserved for I/O on the input or output files.
pub fn convert_document(input: &Path, settings: &ConvertOptions, run: &RunOptions) -> Result<DocumentEntry> {
    let bytes = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let source = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string());
    let source_sha = sha256_hex(&bytes);

    let asset_dir = run
        .asset_dir
        .clone()
        .or_else(|| run.convert_meshes.then(|| input_dir(input)));
    let options = ConvertOptions {
        asset_dir: asset_dir.clone(),
        source_name: Some(source.clone()),
        ..settings.clone()
    };

    let mut conversion = match convert(&String::from_utf8_lossy(&bytes), &options) {
        Ok(conversion) => conversion,
        Err(ConvertError::Fatal { report, .. }) => {
            return Ok(DocumentEntry {
                source,
                source_sha,
                status: DocumentStatus::Failed,
                jbeam: None,
                meshes: Vec::new(),
                report: *report,
            });
        }
        Err(err) => return Err(err.into()),
    };

    let mut meshes = Vec::new();
    if let (true, Some(asset_dir)) = (run.convert_meshes, asset_dir.as_deref()) {
        let transform = options.settings.transform;
        let mut writer = ColladaWriter::new(transform);
        if let Some(author) = &run.author {
            writer = writer.with_author(author);
        }

        let decoded = decode_assets(&conversion.names, asset_dir, transform);
        let collada = sync_dae_assets(&conversion.names, asset_dir);
        let mut sources = SourceAssets::default();
        for path in decoded
            .iter()
            .filter_map(|o| o.path.as_deref())
            .chain(collada.iter().filter_map(|o| o.path.as_deref()))
        {
            sources.insert(path);
        }

        // one failure, one diagnostic, however many exports share it
        let mut reported: HashSet<String> = HashSet::new();
        let mut report_once = |original: &str, diagnostic: &Option<Diagnostic>, report: &mut ConversionReport| {
            if let Some(diagnostic) = diagnostic {
                if reported.insert(original.to_ascii_lowercase()) {
                    report.push(diagnostic.clone());
                }
            }
        };

        for outcome in decoded {
            report_once(&outcome.original, &outcome.diagnostic, &mut conversion.report);
            let output = match &outcome.geometry {
                Some(geometry) => {
                    let xml = writer.to_xml(geometry)?;
                    let name = collada_file_name(&outcome.resolved_name);
                    write_asset(name, xml.as_bytes(), false, &sources, run, &mut conversion.report)?
                }
                None => None,
            };
            meshes.push(MeshEntry {
                placeholder: outcome.is_placeholder(),
                original: outcome.original,
                resolved: outcome.resolved_name,
                output,
            });
        }

        for outcome in collada {
            report_once(&outcome.original, &outcome.diagnostic, &mut conversion.report);
            let output = match &outcome.renamed {
                Some(renamed) => {
                    let name = collada_file_name(&outcome.resolved_name);
                    let unchanged = renamed.changes == 0;
                    write_asset(name, renamed.xml.as_bytes(), unchanged, &sources, run, &mut conversion.report)?
                }
                None => None,
            };
            meshes.push(MeshEntry {
                placeholder: false,
                original: outcome.original,
                resolved: outcome.resolved_name,
                output,
            });
        }
    }

    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| conversion.part_name());
    let text = conversion.to_json_string()?;
    let jbeam = write_output(&run.output_dir, &format!("{}.jbeam", stem), text.as_bytes(), run.dry_run)?;

    info!(
        document = %source,
        jbeam = %jbeam.path,
        meshes = meshes.len(),
        dry_run = run.dry_run,
        "Wrote document outputs"
    );
    Ok(DocumentEntry {
        source,
        source_sha,
        status: DocumentStatus::Converted,
        jbeam: Some(jbeam),
        meshes,
        report: conversion.report,
    })
}

/// Print one document's summary and its non-trivial diagnostics
pub fn print_report(entry: &DocumentEntry) {
    let report: &ConversionReport = &entry.report;
    match entry.status {
        DocumentStatus::Converted => println!("{}: {}", entry.source, report.summary()),
        DocumentStatus::Failed => {
            warn!(document = %entry.source, "No output written");
            println!("{}: FAILED ({})", entry.source, report.summary());
        }
    }
    for severity in [Severity::Fatal, Severity::Parse, Severity::Warning, Severity::AssetDecode] {
        for diagnostic in report.of(severity) {
            println!("  {}", diagnostic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rig2jbeam_core::ConversionSettings;
    use rig2jbeam_mesh::PLACEHOLDER_MATERIAL;

    const CAR: &str = "\
Car
nodes
1, 0, 0, 0
2, 1, 0, 0
3, 0, 1, 0
beams
1, 2
2, 3
flexbodies
1, 2, 3, 0, 0, 0, 0, 0, 0, Wheel.mesh
1, 2, 3, 0, 0, 0, 0, 0, 0, WHEEL.mesh
end
";

    fn run(output_dir: &Path, convert_meshes: bool, dry_run: bool) -> RunOptions {
        RunOptions {
            output_dir: output_dir.to_path_buf(),
            asset_dir: None,
            convert_meshes,
            dry_run,
            author: Some("tester".to_string()),
        }
    }

    #[test]
    fn test_converts_and_exports_placeholder_meshes() {
        let input_dir = tempfile::tempdir().unwrap();
        let output_dir = tempfile::tempdir().unwrap();
        let input = input_dir.path().join("car.truck");
        std::fs::write(&input, CAR).unwrap();
        // not a mesh container at all
        std::fs::write(input_dir.path().join("wheel.mesh"), b"garbage").unwrap();

        let entry = convert_document(&input, &ConvertOptions::default(), &run(output_dir.path(), true, false)).unwrap();

        assert_eq!(entry.status, DocumentStatus::Converted);
        assert_eq!(entry.source, "car.truck");
        assert_eq!(entry.source_sha, sha256_hex(CAR.as_bytes()));
        assert_eq!(entry.report.count(Severity::AssetDecode), 1);

        let jbeam = std::fs::read_to_string(output_dir.path().join("car.jbeam")).unwrap();
        assert_eq!(entry.jbeam.as_ref().unwrap().sha, sha256_hex(jbeam.as_bytes()));
        assert!(jbeam.contains("Wheel_001"));

        let resolved: Vec<&str> = entry.meshes.iter().map(|m| m.resolved.as_str()).collect();
        assert_eq!(resolved, vec!["Wheel.mesh", "Wheel_001.mesh"]);
        assert!(entry.meshes.iter().all(|m| m.placeholder));
        let dae = std::fs::read_to_string(output_dir.path().join("Wheel_001.dae")).unwrap();
        assert!(dae.contains("<author>tester</author>"));
        assert!(output_dir.path().join("Wheel.dae").exists());
    }

    const BODY_DAE: &str = r##"<?xml version="1.0" encoding="utf-8"?>
<COLLADA xmlns="http://www.collada.org/2005/11/COLLADASchema" version="1.4.1">
  <library_geometries>
    <geometry id="body-mesh" name="body"><mesh/></geometry>
  </library_geometries>
  <library_visual_scenes>
    <visual_scene id="Scene" name="Scene">
      <node id="body" name="body" type="NODE"><instance_geometry url="#body-mesh"/></node>
    </visual_scene>
  </library_visual_scenes>
</COLLADA>
"##;

    fn collada_rig(meshes: &[&str]) -> String {
        let mut rig = String::from("Car\nnodes\n1, 0, 0, 0\n2, 1, 0, 0\n3, 0, 1, 0\nbeams\n1, 2\nflexbodies\n");
        for mesh in meshes {
            rig.push_str(&format!("1, 2, 3, 0, 0, 0, 0, 0, 0, {}\n", mesh));
        }
        rig.push_str("end\n");
        rig
    }

    #[test]
    fn test_collada_assets_are_synced_not_decoded() {
        // output lands next to the inputs
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("car.truck");
        std::fs::write(&input, collada_rig(&["body.dae", "BODY.dae"])).unwrap();
        std::fs::write(dir.path().join("body.dae"), BODY_DAE).unwrap();

        let entry = convert_document(&input, &ConvertOptions::default(), &run(dir.path(), true, false)).unwrap();

        assert_eq!(entry.status, DocumentStatus::Converted);
        assert_eq!(entry.report.count(Severity::AssetDecode), 0);
        assert!(
            entry
                .report
                .diagnostics
                .iter()
                .all(|d| !d.message.contains("COLLADA") && !d.message.contains("overwritten")),
            "{:?}",
            entry.report.diagnostics
        );
        assert!(entry.meshes.iter().all(|m| !m.placeholder));

        assert_eq!(std::fs::read_to_string(dir.path().join("body.dae")).unwrap(), BODY_DAE);
        assert_eq!(entry.meshes[0].output.as_ref().unwrap().sha, sha256_hex(BODY_DAE.as_bytes()));

        let copy = std::fs::read_to_string(dir.path().join("body_001.dae")).unwrap();
        assert!(copy.contains(r#"<node id="body_001" name="body_001" type="NODE">"#));
        assert!(!copy.contains(PLACEHOLDER_MATERIAL));
        let jbeam = std::fs::read_to_string(dir.path().join("car.jbeam")).unwrap();
        assert!(jbeam.contains("\"body_001\""));
    }

    #[test]
    fn test_source_asset_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("car.truck");
        std::fs::write(&input, collada_rig(&["body.dae"])).unwrap();
        // the node needs renaming to match the rig's spelling
        let source = BODY_DAE.replace(r#"name="body" type"#, r#"name="Body" type"#);
        std::fs::write(dir.path().join("body.dae"), &source).unwrap();

        let entry = convert_document(&input, &ConvertOptions::default(), &run(dir.path(), true, false)).unwrap();

        assert_eq!(std::fs::read_to_string(dir.path().join("body.dae")).unwrap(), source);
        assert!(entry.meshes[0].output.is_none());
        assert!(entry
            .report
            .of(Severity::Warning)
            .any(|d| d.message.contains("not overwritten")));

        // a separate output directory gets the synced copy
        let output_dir = tempfile::tempdir().unwrap();
        let entry = convert_document(&input, &ConvertOptions::default(), &run(output_dir.path(), true, false)).unwrap();
        assert!(entry.meshes[0].output.is_some());
        let copy = std::fs::read_to_string(output_dir.path().join("body.dae")).unwrap();
        assert!(copy.contains(r#"<node id="body" name="body" type="NODE">"#));
    }

    #[test]
    fn test_fatal_document_writes_nothing() {
        let input_dir = tempfile::tempdir().unwrap();
        let output_dir = tempfile::tempdir().unwrap();
        let input = input_dir.path().join("bad.truck");
        std::fs::write(&input, "Bad\nnodes\n1, 0, 0, 0\nbeams\n1, 99\nend\n").unwrap();

        let entry = convert_document(&input, &ConvertOptions::default(), &run(output_dir.path(), false, false)).unwrap();
        assert!(entry.is_failed());
        assert!(entry.jbeam.is_none());
        assert!(entry.report.has_fatal());
        assert!(!output_dir.path().join("bad.jbeam").exists());
    }

    #[test]
    fn test_dry_run_hashes_without_writing() {
        let input_dir = tempfile::tempdir().unwrap();
        let output_dir = tempfile::tempdir().unwrap();
        let input = input_dir.path().join("car.truck");
        std::fs::write(&input, CAR).unwrap();

        let options = ConvertOptions {
            settings: ConversionSettings {
                default_author: "someone".to_string(),
                ..ConversionSettings::default()
            },
            ..ConvertOptions::default()
        };
        let entry = convert_document(&input, &options, &run(output_dir.path(), false, true)).unwrap();
        assert_eq!(entry.status, DocumentStatus::Converted);
        assert_eq!(entry.jbeam.as_ref().unwrap().path, "car.jbeam");
        assert!(entry.meshes.is_empty());
        assert!(!output_dir.path().join("car.jbeam").exists());
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let output_dir = tempfile::tempdir().unwrap();
        let result = convert_document(
            &output_dir.path().join("absent.truck"),
            &ConvertOptions::default(),
            &run(output_dir.path(), false, false),
        );
        assert!(result.is_err());
    }
}
