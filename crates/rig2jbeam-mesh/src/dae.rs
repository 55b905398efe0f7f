//! Mesh name synchronisation for COLLADA files a rig references directly
//!
//! A `.dae` reference is never decoded. Its document is streamed through
//! quick-xml and written out again with the mesh names in `geometry@id`,
//! `geometry@name`, `node@id`, `node@name` and `instance_geometry@url`
//! rewritten to the JBeam `mesh` value. Each renamed duplicate (`Wheel_001`)
//! gets its own copy; everything else in the document is passed through
//! untouched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use rig2jbeam_core::validate::find_asset;
use rig2jbeam_core::{mesh_stem, Diagnostic, MeshNameMap};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum DaeError {
    #[error("Failed to read COLLADA: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse COLLADA: {0}")]
    XmlError(String),
}

fn xml_error(e: impl std::fmt::Display) -> DaeError {
    DaeError::XmlError(e.to_string())
}

/// Whether a rig mesh reference names a COLLADA file
pub fn is_collada(name: &str) -> bool {
    rig2jbeam_core::names::split_mesh_name(name)
        .1
        .eq_ignore_ascii_case(".dae")
}

/// Attributes of `element` that carry mesh names
fn name_attributes(element: &[u8]) -> &'static [&'static str] {
    match element {
        b"geometry" | b"node" => &["id", "name"],
        b"instance_geometry" => &["url"],
        _ => &[],
    }
}

/// Old mesh names and what they become in one exported file
///
/// Lookups ignore ASCII case, like rig mesh references do.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NameMapping {
    renames: Vec<(String, String)>,
}

impl NameMapping {
    /// Map both the written reference and its stem onto the resolved stem:
    /// `Wheel.dae` and `Wheel` become `Wheel_001`
    pub fn for_export(original: &str, resolved: &str) -> Self {
        let target = mesh_stem(resolved);
        let mut mapping = Self::default();
        mapping.insert(original, target);
        mapping.insert(mesh_stem(original), target);
        mapping
    }

    pub fn insert(&mut self, from: impl Into<String>, to: impl Into<String>) {
        let from = from.into();
        if self.get(&from).is_none() {
            self.renames.push((from, to.into()));
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.renames
            .iter()
            .find(|(from, _)| from.eq_ignore_ascii_case(name))
            .map(|(_, to)| to.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.renames.is_empty()
    }

    /// New value for a name attribute, if it changes
    fn rewrite(&self, key: &str, value: &str) -> Option<String> {
        let (prefix, name) = match key {
            "url" => ("#", value.strip_prefix('#')?),
            _ => ("", value),
        };
        let renamed = self.get(name)?;
        (renamed != name).then(|| format!("{}{}", prefix, renamed))
    }
}

/// `(attribute, value)` pairs of an element, unescaped
fn attributes(element: &BytesStart<'_>) -> Result<Vec<(String, String)>, DaeError> {
    element
        .attributes()
        .map(|attr| {
            let attr = attr.map_err(xml_error)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().map_err(xml_error)?.into_owned();
            Ok((key, value))
        })
        .collect()
}

/// Every mesh name a COLLADA document uses, in document order
///
/// Geometry and node ids and names, plus the local targets of
/// `instance_geometry` urls. Each name is listed once.
pub fn extract_mesh_names(xml: &str) -> Result<Vec<String>, DaeError> {
    let mut reader = Reader::from_str(xml);
    let mut names: Vec<String> = Vec::new();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e) => {
                let keys = name_attributes(e.local_name().as_ref());
                if keys.is_empty() {
                    continue;
                }
                for (key, value) in attributes(&e)? {
                    if !keys.contains(&key.as_str()) {
                        continue;
                    }
                    let name = match key.as_str() {
                        "url" => match value.strip_prefix('#') {
                            Some(target) => target.to_string(),
                            None => continue,
                        },
                        _ => value,
                    };
                    if !name.is_empty() && !names.contains(&name) {
                        names.push(name);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(names)
}

/// A rewritten COLLADA document
#[derive(Debug, Clone, PartialEq)]
pub struct Renamed {
    pub xml: String,
    /// Attribute values that changed
    pub changes: usize,
}

fn renamed_element(
    element: &BytesStart<'_>,
    keys: &[&str],
    mapping: &NameMapping,
    changes: &mut usize,
) -> Result<BytesStart<'static>, DaeError> {
    let name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
    let mut out = BytesStart::new(name);
    for (key, value) in attributes(element)? {
        let rewritten = keys
            .contains(&key.as_str())
            .then(|| mapping.rewrite(&key, &value))
            .flatten();
        let value = match rewritten {
            Some(renamed) => {
                debug!(attribute = %key, from = %value, to = %renamed, "Renamed COLLADA mesh reference");
                *changes += 1;
                renamed
            }
            None => value,
        };
        out.push_attribute((key.as_str(), value.as_str()));
    }
    Ok(out)
}

/// Rewrite mesh names in `xml` according to `mapping`
pub fn rename_meshes(xml: &str, mapping: &NameMapping) -> Result<Renamed, DaeError> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut changes = 0;
    loop {
        let event = match reader.read_event().map_err(xml_error)? {
            Event::Eof => break,
            Event::Start(e) => {
                let keys = name_attributes(e.local_name().as_ref());
                if keys.is_empty() {
                    Event::Start(e)
                } else {
                    Event::Start(renamed_element(&e, keys, mapping, &mut changes)?)
                }
            }
            Event::Empty(e) => {
                let keys = name_attributes(e.local_name().as_ref());
                if keys.is_empty() {
                    Event::Empty(e)
                } else {
                    Event::Empty(renamed_element(&e, keys, mapping, &mut changes)?)
                }
            }
            other => other,
        };
        writer.write_event(event).map_err(xml_error)?;
    }
    let xml = String::from_utf8(writer.into_inner()).map_err(xml_error)?;
    Ok(Renamed { xml, changes })
}

/// Result for one resolved `.dae` reference
#[derive(Debug, Clone)]
pub struct DaeOutcome {
    pub original: String,
    pub resolved_name: String,
    /// Source file; `None` when no file matched
    pub path: Option<PathBuf>,
    /// Document with synchronised names; `None` when the source is missing
    /// or unreadable
    pub renamed: Option<Renamed>,
    pub diagnostic: Option<Diagnostic>,
}

/// Read every `.dae` reference once and produce a renamed copy for each
/// resolved name that exports it
pub fn sync_dae_assets(names: &MeshNameMap, asset_dir: &Path) -> Vec<DaeOutcome> {
    let mut sources: HashMap<String, (Option<PathBuf>, Result<String, String>)> = HashMap::new();
    let mut outcomes = Vec::new();

    for entry in names.entries().iter().filter(|e| is_collada(&e.original)) {
        let (path, source) = sources
            .entry(entry.original.to_ascii_lowercase())
            .or_insert_with(|| match find_asset(asset_dir, &entry.original) {
                Some(path) => {
                    let text = std::fs::read_to_string(&path).map_err(|e| e.to_string());
                    (Some(path), text)
                }
                None => {
                    warn!(mesh = %entry.original, dir = %asset_dir.display(), "COLLADA file not found");
                    (None, Err("not found".to_string()))
                }
            });

        let mesh = mesh_stem(&entry.resolved);
        let (renamed, diagnostic) = match (path.as_ref(), source) {
            (None, _) => (None, None),
            (Some(path), Err(e)) => (
                None,
                Some(Diagnostic::warning(format!("COLLADA file {} could not be read: {}", path.display(), e))),
            ),
            (Some(path), Ok(xml)) => {
                let mapping = NameMapping::for_export(&entry.original, &entry.resolved);
                match rename_meshes(xml, &mapping).and_then(|r| Ok((extract_mesh_names(&r.xml)?, r))) {
                    Ok((found, renamed)) => {
                        let diagnostic = (!found.iter().any(|n| n == mesh)).then(|| {
                            Diagnostic::warning(format!(
                                "COLLADA file {} has no geometry or node named '{}'",
                                path.display(),
                                mesh
                            ))
                        });
                        (Some(renamed), diagnostic)
                    }
                    Err(e) => (
                        None,
                        Some(Diagnostic::warning(format!("COLLADA file {} skipped: {}", path.display(), e))),
                    ),
                }
            }
        };

        outcomes.push(DaeOutcome {
            original: entry.original.clone(),
            resolved_name: entry.resolved.clone(),
            path: path.clone(),
            renamed,
            diagnostic,
        });
    }

    if !outcomes.is_empty() {
        info!(
            files = sources.len(),
            exports = outcomes.len(),
            changes = outcomes.iter().filter_map(|o| o.renamed.as_ref()).map(|r| r.changes).sum::<usize>(),
            "Synchronised COLLADA mesh names"
        );
    }
    outcomes
}
