//! Duplicate mesh name resolution and group tag derivation

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::rig::{AttachmentKind, Rig};

/// Split a mesh file name into base and extension; `.mesh.xml` counts as one
pub fn split_mesh_name(name: &str) -> (&str, &str) {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".mesh.xml") {
        let at = name.len() - ".mesh.xml".len();
        return name.split_at(at);
    }
    match name.rfind('.') {
        Some(at) if at > 0 => name.split_at(at),
        _ => (name, ""),
    }
}

/// Mesh reference without a known mesh extension; this is the JBeam `mesh` value
pub fn mesh_stem(mesh: &str) -> &str {
    let (base, ext) = split_mesh_name(mesh);
    match ext.to_ascii_lowercase().as_str() {
        ".mesh" | ".mesh.xml" | ".dae" => base,
        _ => mesh,
    }
}

/// Rename repeated names so every entry is unique ignoring ASCII case
///
/// The first occurrence of a name keeps it. Later occurrences become
/// `<base>_<NNN><ext>` using the first occurrence's spelling, skipping any
/// candidate that is already taken.
pub fn resolve_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut taken: HashSet<String> = names
        .iter()
        .map(|n| n.as_ref().to_ascii_lowercase())
        .collect();
    let mut first: HashMap<String, (String, String, u32)> = HashMap::new();
    let mut resolved = Vec::with_capacity(names.len());

    for name in names {
        let name = name.as_ref();
        let key = name.to_ascii_lowercase();
        let Some((base, ext, counter)) = first.get_mut(&key) else {
            let (base, ext) = split_mesh_name(name);
            first.insert(key, (base.to_string(), ext.to_string(), 0));
            resolved.push(name.to_string());
            continue;
        };
        let candidate = loop {
            *counter += 1;
            let candidate = format!("{}_{:03}{}", base, counter, ext);
            if taken.insert(candidate.to_ascii_lowercase()) {
                break candidate;
            }
        };
        resolved.push(candidate);
    }
    resolved
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshNameEntry {
    pub kind: AttachmentKind,
    /// Index into `Rig::attachments`
    pub attachment: usize,
    pub original: String,
    pub resolved: String,
}

impl MeshNameEntry {
    pub fn is_renamed(&self) -> bool {
        self.original != self.resolved
    }
}

/// Per-occurrence mapping from written to resolved mesh names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshNameMap {
    entries: Vec<MeshNameEntry>,
}

impl MeshNameMap {
    pub fn entries(&self) -> &[MeshNameEntry] {
        &self.entries
    }

    pub fn resolved(&self, attachment: usize) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.attachment == attachment)
            .map(|e| e.resolved.as_str())
    }

    /// Every resolved name exported from one written name, ignoring case
    pub fn exports_for(&self, original: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.original.eq_ignore_ascii_case(original))
            .map(|e| e.resolved.as_str())
            .collect()
    }

    pub fn renamed(&self) -> impl Iterator<Item = &MeshNameEntry> {
        self.entries.iter().filter(|e| e.is_renamed())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolve names over flexbodies then props and store them on the attachments
pub fn resolve_mesh_names(rig: &mut Rig) -> MeshNameMap {
    let order: Vec<usize> = [AttachmentKind::Flexbody, AttachmentKind::Prop]
        .into_iter()
        .flat_map(|kind| {
            rig.attachments
                .iter()
                .enumerate()
                .filter(move |(_, a)| a.kind == kind)
                .map(|(i, _)| i)
        })
        .collect();

    let originals: Vec<&str> = order
        .iter()
        .map(|&i| rig.attachments[i].mesh.as_str())
        .collect();
    let resolved = resolve_names(&originals);

    let mut entries = Vec::with_capacity(order.len());
    for (&index, resolved) in order.iter().zip(resolved) {
        let attachment = &mut rig.attachments[index];
        if attachment.mesh != resolved {
            debug!(from = %attachment.mesh, to = %resolved, "Renamed duplicate mesh");
        }
        attachment.resolved_mesh = resolved.clone();
        entries.push(MeshNameEntry {
            kind: attachment.kind,
            attachment: index,
            original: attachment.mesh.clone(),
            resolved,
        });
    }
    MeshNameMap { entries }
}

/// Group tag for a resolved mesh name: `Wheel_001.mesh` -> `wheel_001_flexbody`
pub fn group_tag(resolved: &str, kind: AttachmentKind) -> String {
    let stem = mesh_stem(resolved);

    let mut tag = String::with_capacity(stem.len() + kind.group_suffix().len());
    for c in stem.to_lowercase().chars() {
        let c = if c.is_alphanumeric() || c == '_' { c } else { '_' };
        if !(c == '_' && tag.ends_with('_')) {
            tag.push(c);
        }
    }
    let tag = tag.trim_matches('_');
    let tag = if tag.is_empty() { "mesh" } else { tag };
    format!("{}{}", tag, kind.group_suffix())
}

/// [`group_tag`] that is not yet in `taken`, numbered `_NNN` like mesh names
///
/// Distinct resolved names can sanitize to the same tag (`a b` and `a-b`);
/// the later one gets a counter before the kind suffix. The result is added
/// to `taken`.
pub fn unique_group_tag(resolved: &str, kind: AttachmentKind, taken: &mut HashSet<String>) -> String {
    let tag = group_tag(resolved, kind);
    if taken.insert(tag.clone()) {
        return tag;
    }
    let stem = &tag[..tag.len() - kind.group_suffix().len()];
    let mut counter = 0u32;
    loop {
        counter += 1;
        let candidate = format!("{}_{:03}{}", stem, counter, kind.group_suffix());
        if taken.insert(candidate.clone()) {
            return candidate;
        }
    }
}
