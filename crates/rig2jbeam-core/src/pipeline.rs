//! One-document conversion: parse, validate, resolve, weigh, emit
//!
//! Diagnostics from every stage land in a single [`ConversionReport`]. A
//! document with a fatal diagnostic produces no JBeam output; the report is
//! handed back inside [`ConvertError::Fatal`] instead.

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::groups::resolve_node_groups;
use crate::jbeam::{emit_jbeam, part_name};
use crate::mass::calculate_masses;
use crate::names::{resolve_mesh_names, MeshNameMap};
use crate::parser::parse_rig;
use crate::report::{ConversionReport, Severity, Statistics};
use crate::rig::{AttachmentKind, Rig};
use crate::settings::ConversionSettings;
use crate::validate::{check_masses, validate};

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("{name}: conversion aborted with {errors} fatal error(s)")]
    Fatal {
        name: String,
        errors: usize,
        report: Box<ConversionReport>,
    },
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to serialize JBeam: {0}")]
    SerializeError(#[from] serde_json::Error),
}

impl ConvertError {
    /// The run's report, if the error came from the document itself
    pub fn report(&self) -> Option<&ConversionReport> {
        match self {
            ConvertError::Fatal { report, .. } => Some(report),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    pub settings: ConversionSettings,
    /// Directory searched for referenced meshes; enables missing-asset warnings
    pub asset_dir: Option<PathBuf>,
    /// Label stored in the report, usually the input file name
    pub source_name: Option<String>,
}

/// A successful conversion
#[derive(Debug, Clone)]
pub struct Conversion {
    pub rig: Rig,
    pub document: Value,
    pub names: MeshNameMap,
    pub report: ConversionReport,
}

impl Conversion {
    pub fn part_name(&self) -> String {
        part_name(&self.rig.name)
    }

    /// Pretty-printed JBeam text
    pub fn to_json_string(&self) -> Result<String, ConvertError> {
        Ok(serde_json::to_string_pretty(&self.document)?)
    }
}

fn abort(report: ConversionReport) -> ConvertError {
    let name = report
        .source
        .clone()
        .unwrap_or_else(|| "document".to_string());
    let errors = report.count(Severity::Fatal);
    warn!(document = %name, errors, "Conversion aborted");
    ConvertError::Fatal {
        name,
        errors,
        report: Box::new(report),
    }
}

/// Convert one rig document held in memory
pub fn convert(source: &str, options: &ConvertOptions) -> Result<Conversion, ConvertError> {
    let settings = &options.settings;
    let mut report = ConversionReport::new(options.source_name.clone());

    let mut rig = parse_rig(source, settings, &mut report);
    validate(&rig, settings, options.asset_dir.as_deref(), &mut report);
    if report.has_fatal() {
        return Err(abort(report));
    }

    let names = resolve_mesh_names(&mut rig);
    let groups = resolve_node_groups(&mut rig, settings.infer_flexbody_nodes);
    let mass = calculate_masses(&mut rig, settings, &mut report);
    check_masses(&rig, &mut report);

    let document = emit_jbeam(&rig, settings, &mut report);

    if settings.strict_validation {
        report.promote_warnings();
    }
    if report.has_fatal() {
        return Err(abort(report));
    }

    let split_quads = rig.quads.iter().flat_map(|q| q.split());
    let (collision, visual): (Vec<_>, Vec<_>) = rig
        .triangles
        .iter()
        .map(|t| t.kind)
        .chain(split_quads.map(|t| t.kind))
        .partition(|kind| kind.is_collision());

    report.statistics = Statistics {
        nodes: rig.nodes.len(),
        beams: rig.beams.len(),
        hydros: rig.hydros.len(),
        wheels: rig.wheels.len(),
        flexbodies: rig.attachments.iter().filter(|a| a.kind == AttachmentKind::Flexbody).count(),
        props: rig.attachments.iter().filter(|a| a.kind == AttachmentKind::Prop).count(),
        triangles: collision.len(),
        visual_triangles: visual.len(),
        rails: rig.rails.len(),
        slidenodes: rig.slidenodes.len(),
        groups: groups.groups,
        renamed_meshes: names.renamed().count(),
        total_mass: mass.total,
    };

    info!(
        document = report.source.as_deref().unwrap_or("document"),
        summary = %report.summary(),
        "Converted rig"
    );
    Ok(Conversion {
        rig,
        document,
        names,
        report,
    })
}

/// Read and convert a rig file; the file name labels the report
pub fn convert_file(path: &Path, options: &ConvertOptions) -> Result<Conversion, ConvertError> {
    let source = std::fs::read_to_string(path)?;
    let mut options = options.clone();
    if options.source_name.is_none() {
        options.source_name = path.file_name().map(|n| n.to_string_lossy().into_owned());
    }
    convert(&source, &options)
}
