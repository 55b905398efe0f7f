//! Parallel decoding of every mesh a rig references

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use rig2jbeam_core::names::split_mesh_name;
use rig2jbeam_core::validate::find_asset;
use rig2jbeam_core::{CoordinateTransform, Diagnostic, MeshNameMap};
use tracing::{info, warn};

use crate::dae::is_collada;
use crate::decode::decode_or_placeholder;
use crate::geometry::MeshGeometry;

/// Result for one resolved mesh name
#[derive(Debug, Clone)]
pub struct AssetOutcome {
    pub original: String,
    pub resolved_name: String,
    /// File the geometry was read from; `None` when no file matched
    pub path: Option<PathBuf>,
    /// `None` only when the file is missing
    pub geometry: Option<MeshGeometry>,
    pub diagnostic: Option<Diagnostic>,
}

impl AssetOutcome {
    pub fn is_placeholder(&self) -> bool {
        self.geometry.as_ref().is_some_and(MeshGeometry::is_placeholder)
    }
}

/// Decode each distinct written mesh name once and fan it out to every
/// resolved name that exports it
///
/// A failing asset only affects its own outcomes. COLLADA references are
/// skipped; [`sync_dae_assets`](crate::dae::sync_dae_assets) handles them.
pub fn decode_assets(
    names: &MeshNameMap,
    asset_dir: &Path,
    transform: CoordinateTransform,
) -> Vec<AssetOutcome> {
    let mut originals: Vec<&str> = Vec::new();
    for entry in names.entries().iter().filter(|e| !is_collada(&e.original)) {
        if !originals.iter().any(|o| o.eq_ignore_ascii_case(&entry.original)) {
            originals.push(&entry.original);
        }
    }

    let decoded: Vec<(&str, Option<PathBuf>, Option<(MeshGeometry, Option<Diagnostic>)>)> = originals
        .par_iter()
        .map(|&original| match find_asset(asset_dir, original) {
            Some(path) => {
                let result = decode_or_placeholder(&path, original, transform);
                (original, Some(path), Some(result))
            }
            None => {
                warn!(mesh = original, dir = %asset_dir.display(), "Mesh file not found");
                (original, None, None)
            }
        })
        .collect();

    let mut outcomes = Vec::with_capacity(names.len());
    for (original, path, result) in decoded {
        for resolved in names.exports_for(original) {
            let (stem, _) = split_mesh_name(resolved);
            let (geometry, diagnostic) = match &result {
                Some((geometry, diagnostic)) => {
                    let mut geometry = geometry.clone();
                    geometry.name = stem.to_string();
                    (Some(geometry), diagnostic.clone())
                }
                None => (None, None),
            };
            outcomes.push(AssetOutcome {
                original: original.to_string(),
                resolved_name: resolved.to_string(),
                path: path.clone(),
                geometry,
                diagnostic,
            });
        }
    }

    info!(
        meshes = originals.len(),
        exports = outcomes.len(),
        placeholders = outcomes.iter().filter(|o| o.is_placeholder()).count(),
        "Decoded referenced meshes"
    );
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::fixtures::Fixture;
    use crate::chunk::Endian;
    use rig2jbeam_core::{convert, ConvertOptions};

    const RIG: &str = "\
Car
nodes
1, 0, 0, 0
2, 1, 0, 0
3, 0, 1, 0
beams
1, 2
2, 3
flexbodies
1, 2, 3, 0, 0, 0, 0, 0, 0, wheel.mesh
1, 2, 3, 0, 0, 0, 0, 0, 0, Wheel.mesh
1, 2, 3, 0, 0, 0, 0, 0, 0, broken.mesh
1, 2, 3, 0, 0, 0, 0, 0, 0, missing.mesh
1, 2, 3, 0, 0, 0, 0, 0, 0, body.dae
end
";

    #[test]
    fn test_duplicates_share_one_decode_and_failures_stay_isolated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("wheel.mesh"),
            Fixture::triangle().encode(Endian::Little, "v1.41"),
        )
        .unwrap();
        let mut broken = Fixture::triangle();
        broken.vertex_count = Some(u32::MAX);
        std::fs::write(dir.path().join("broken.mesh"), broken.encode(Endian::Little, "v1.41")).unwrap();
        std::fs::write(dir.path().join("body.dae"), "<COLLADA/>").unwrap();

        let conversion = convert(RIG, &ConvertOptions::default()).unwrap();
        let outcomes = decode_assets(&conversion.names, dir.path(), CoordinateTransform::SourceToTarget);

        let resolved: Vec<&str> = outcomes.iter().map(|o| o.resolved_name.as_str()).collect();
        assert_eq!(resolved, vec!["wheel.mesh", "wheel_001.mesh", "broken.mesh", "missing.mesh"]);

        let first = outcomes[0].geometry.as_ref().unwrap();
        let second = outcomes[1].geometry.as_ref().unwrap();
        assert_eq!(first.name, "wheel");
        assert_eq!(second.name, "wheel_001");
        assert_eq!(first.submeshes, second.submeshes);
        assert!(outcomes[0].diagnostic.is_none());

        assert!(outcomes[2].is_placeholder());
        assert!(outcomes[2].diagnostic.is_some());

        assert!(outcomes[3].geometry.is_none());
        assert!(outcomes[3].path.is_none());
    }
}
