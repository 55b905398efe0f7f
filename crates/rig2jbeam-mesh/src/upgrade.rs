//! Format upgrade passes
//!
//! Each pass moves a [`RawMesh`] one serializer step forward:
//! - `v1.30 -> v1.40`: strip and fan index lists become triangle lists
//! - `v1.40 -> current`: vertex data without normals gets face-derived normals
//!
//! Meshes older than the current format get the pass applied twice in
//! sequence by [`upgrade`].

use tracing::debug;

use crate::geometry::{FormatVersion, OperationType, RawMesh, VertexData};

/// Apply the upgrade pass twice when `raw` predates the current format
pub fn upgrade(raw: &mut RawMesh) {
    if raw.version < FormatVersion::Current {
        upgrade_pass(raw);
        upgrade_pass(raw);
    }
}

/// Advance one format version; a no-op on current meshes
pub fn upgrade_pass(raw: &mut RawMesh) {
    match raw.version {
        FormatVersion::Legacy => {
            let mut converted = 0;
            for submesh in &mut raw.submeshes {
                if matches!(
                    submesh.operation,
                    OperationType::TriangleStrip | OperationType::TriangleFan
                ) {
                    submesh.indices = triangle_list(submesh.operation, &submesh.indices);
                    submesh.operation = OperationType::TriangleList;
                    converted += 1;
                }
            }
            debug!(converted, "Upgraded strip/fan submeshes to triangle lists");
        }
        FormatVersion::V140 => {
            let mut derived = 0;
            if raw.shared.as_ref().is_some_and(|s| s.normals.is_none()) {
                let indices: Vec<u32> = raw
                    .submeshes
                    .iter()
                    .filter(|s| s.use_shared)
                    .flat_map(|s| triangle_list(s.operation, &s.indices))
                    .collect();
                if let Some(shared) = raw.shared.as_mut() {
                    shared.normals = Some(derive_normals(shared, &indices));
                    derived += 1;
                }
            }
            for submesh in &mut raw.submeshes {
                let indices = triangle_list(submesh.operation, &submesh.indices);
                if let Some(data) = submesh.geometry.as_mut() {
                    if data.normals.is_none() {
                        data.normals = Some(derive_normals(data, &indices));
                        derived += 1;
                    }
                }
            }
            debug!(derived, "Derived missing vertex normals");
        }
        FormatVersion::Current => return,
    }
    raw.version = raw.version.next();
}

/// Flatten an index list of any primitive type into triangle triples
///
/// Point and line lists yield no triangles. Strips alternate winding so every
/// triangle keeps the orientation of the first.
pub fn triangle_list(operation: OperationType, indices: &[u32]) -> Vec<u32> {
    match operation {
        OperationType::TriangleList => {
            let whole = indices.len() - indices.len() % 3;
            indices[..whole].to_vec()
        }
        OperationType::TriangleStrip => indices
            .windows(3)
            .enumerate()
            .flat_map(|(i, w)| {
                if i % 2 == 0 {
                    [w[0], w[1], w[2]]
                } else {
                    [w[1], w[0], w[2]]
                }
            })
            .collect(),
        OperationType::TriangleFan => match indices.split_first() {
            Some((&hub, rest)) => rest
                .windows(2)
                .flat_map(|w| [hub, w[0], w[1]])
                .collect(),
            None => Vec::new(),
        },
        OperationType::PointList | OperationType::LineList | OperationType::LineStrip => Vec::new(),
    }
}

/// Area-weighted vertex normals from triangle faces
///
/// Vertices touched by no face, or only by degenerate ones, point along +Z.
pub fn derive_normals(data: &VertexData, indices: &[u32]) -> Vec<[f32; 3]> {
    let mut sums = vec![[0.0f32; 3]; data.len()];
    for tri in indices.chunks_exact(3) {
        let position = |i: u32| data.positions.get(i as usize).copied();
        let (Some(a), Some(b), Some(c)) = (position(tri[0]), position(tri[1]), position(tri[2])) else {
            continue;
        };
        let e1 = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
        let e2 = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
        let face = [
            e1[1] * e2[2] - e1[2] * e2[1],
            e1[2] * e2[0] - e1[0] * e2[2],
            e1[0] * e2[1] - e1[1] * e2[0],
        ];
        for &i in tri {
            let sum = &mut sums[i as usize];
            for axis in 0..3 {
                sum[axis] += face[axis];
            }
        }
    }

    sums.into_iter()
        .map(|n| {
            let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
            if len > f32::EPSILON {
                [n[0] / len, n[1] / len, n[2] / len]
            } else {
                [0.0, 0.0, 1.0]
            }
        })
        .collect()
}
