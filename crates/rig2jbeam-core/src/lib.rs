//! Rig2jbeam Core - Rig parsing, validation and JBeam emission
//!
//! This crate turns a line-oriented soft-body rig definition into a JBeam
//! document:
//! - Tokenizing and parsing rig sections into a typed [`Rig`] model
//! - Structural validation with line-numbered diagnostics
//! - Mesh name de-duplication and node group resolution
//! - Node mass distribution and JBeam JSON emission
//! - Conversion settings and vehicle templates

pub mod defaults;
pub mod groups;
pub mod jbeam;
pub mod mass;
pub mod names;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod rig;
pub mod settings;
pub mod template;
pub mod tokenizer;
pub mod transform;
pub mod validate;

pub use jbeam::{emit_jbeam, part_name, JBeamEmitter};
pub use names::{mesh_stem, resolve_mesh_names, resolve_names, MeshNameEntry, MeshNameMap};
pub use parser::{parse_rig, LineError, RigParser};
pub use pipeline::{convert, convert_file, Conversion, ConvertError, ConvertOptions};
pub use report::{ConversionReport, Diagnostic, Severity, Statistics};
pub use rig::{AttachmentKind, NodeId, Rig, VisualAttachment};
pub use settings::ConversionSettings;
pub use template::{TemplateError, TemplateIndex, VehicleTemplate};
pub use transform::CoordinateTransform;
