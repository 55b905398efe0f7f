//! Decoded mesh geometry and the raw form both decoders produce
//!
//! The binary and XML readers fill a [`RawMesh`] that mirrors the container:
//! shared or per-submesh vertex data, index lists with their primitive type,
//! and a format version. [`RawMesh::into_geometry`] flattens that into
//! per-submesh triangle lists and applies the coordinate transform.

use std::collections::BTreeMap;

use rig2jbeam_core::CoordinateTransform;
use tracing::debug;

use crate::error::{DecodeError, DecodeResult};
use crate::upgrade::triangle_list;

/// Material name given to the placeholder cube
pub const PLACEHOLDER_MATERIAL: &str = "placeholder";

/// Serializer versions, oldest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FormatVersion {
    /// `v1.30`, may carry strip and fan index lists
    Legacy,
    /// `v1.40`, may omit normals
    V140,
    Current,
}

impl FormatVersion {
    /// Parse the header string, e.g. `[MeshSerializer_v1.41]`
    pub fn from_header(header: &str) -> Option<Self> {
        let version = header
            .trim()
            .strip_prefix("[MeshSerializer_v")?
            .strip_suffix(']')?;
        match version {
            "1.30" => Some(FormatVersion::Legacy),
            "1.40" => Some(FormatVersion::V140),
            "1.41" | "1.8" | "1.100" => Some(FormatVersion::Current),
            _ => None,
        }
    }

    /// The version one upgrade step later
    pub fn next(self) -> Self {
        match self {
            FormatVersion::Legacy => FormatVersion::V140,
            FormatVersion::V140 | FormatVersion::Current => FormatVersion::Current,
        }
    }
}

/// Primitive type of a submesh index list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationType {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
    TriangleFan,
}

impl OperationType {
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            1 => OperationType::PointList,
            2 => OperationType::LineList,
            3 => OperationType::LineStrip,
            4 => OperationType::TriangleList,
            5 => OperationType::TriangleStrip,
            6 => OperationType::TriangleFan,
            _ => return None,
        })
    }

    /// XML `operationtype` attribute value
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "point_list" => OperationType::PointList,
            "line_list" => OperationType::LineList,
            "line_strip" => OperationType::LineStrip,
            "triangle_list" => OperationType::TriangleList,
            "triangle_strip" => OperationType::TriangleStrip,
            "triangle_fan" => OperationType::TriangleFan,
            _ => return None,
        })
    }

    pub fn is_triangles(self) -> bool {
        matches!(
            self,
            OperationType::TriangleList | OperationType::TriangleStrip | OperationType::TriangleFan
        )
    }
}

/// Parallel vertex attribute arrays
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    /// Texture coordinate set 0
    pub uvs: Option<Vec<[f32; 2]>>,
}

impl VertexData {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSubmesh {
    pub material: String,
    pub use_shared: bool,
    pub operation: OperationType,
    pub indices: Vec<u32>,
    pub geometry: Option<VertexData>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawMesh {
    pub version: FormatVersion,
    pub shared: Option<VertexData>,
    pub submeshes: Vec<RawSubmesh>,
    pub bounds: Option<Bounds>,
    pub skeleton: Option<String>,
    pub submesh_names: BTreeMap<u16, String>,
}

impl RawMesh {
    pub fn new(version: FormatVersion) -> Self {
        Self {
            version,
            shared: None,
            submeshes: Vec::new(),
            bounds: None,
            skeleton: None,
            submesh_names: BTreeMap::new(),
        }
    }

    /// Vertex data a submesh draws from
    pub fn vertices_of<'a>(&'a self, submesh: &'a RawSubmesh) -> Option<&'a VertexData> {
        if submesh.use_shared {
            self.shared.as_ref()
        } else {
            submesh.geometry.as_ref()
        }
    }

    /// Flatten into per-submesh triangle lists in the output convention
    pub fn into_geometry(self, name: &str, transform: CoordinateTransform) -> DecodeResult<MeshGeometry> {
        let mut submeshes = Vec::with_capacity(self.submeshes.len());
        for (index, raw) in self.submeshes.iter().enumerate() {
            let data = self.vertices_of(raw).ok_or_else(|| {
                DecodeError::Malformed(format!("submesh {} has no vertex data", index))
            })?;
            let vertices = data.len();

            let indices = triangle_list(raw.operation, &raw.indices);
            if !raw.operation.is_triangles() {
                debug!(submesh = index, operation = ?raw.operation, "Skipping non-triangle submesh");
            }
            if let Some(&bad) = indices.iter().find(|&&i| i as usize >= vertices) {
                return Err(DecodeError::IndexOutOfRange {
                    index: bad,
                    vertices,
                });
            }
            let triangles = indices
                .chunks_exact(3)
                .map(|t| {
                    if transform.flips_winding() {
                        [t[0], t[2], t[1]]
                    } else {
                        [t[0], t[1], t[2]]
                    }
                })
                .collect();

            let normals = match &data.normals {
                Some(normals) if normals.len() != vertices => {
                    return Err(DecodeError::Malformed(format!(
                        "submesh {} has {} normals for {} vertices",
                        index,
                        normals.len(),
                        vertices
                    )));
                }
                Some(normals) => normals.iter().map(|&n| transform.apply(n)).collect(),
                None => Vec::new(),
            };
            let uvs = match &data.uvs {
                Some(uvs) if uvs.len() != vertices => {
                    return Err(DecodeError::Malformed(format!(
                        "submesh {} has {} texture coordinates for {} vertices",
                        index,
                        uvs.len(),
                        vertices
                    )));
                }
                Some(uvs) => uvs.clone(),
                None => Vec::new(),
            };

            submeshes.push(Submesh {
                name: u16::try_from(index)
                    .ok()
                    .and_then(|i| self.submesh_names.get(&i).cloned()),
                material: raw.material.clone(),
                positions: data.positions.iter().map(|&p| transform.apply(p)).collect(),
                normals,
                uvs,
                triangles,
            });
        }

        let bounds = self
            .bounds
            .map(|b| b.transformed(transform))
            .or_else(|| Bounds::from_points(submeshes.iter().flat_map(|s| s.positions.iter().copied())))
            .ok_or_else(|| DecodeError::Malformed("mesh has no vertices".to_string()))?;

        Ok(MeshGeometry {
            name: name.to_string(),
            submeshes,
            bounds,
            skeleton: self.skeleton,
        })
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Bounds {
    pub fn from_points(points: impl IntoIterator<Item = [f32; 3]>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let mut bounds = Bounds {
            min: first,
            max: first,
        };
        for p in points {
            for axis in 0..3 {
                bounds.min[axis] = bounds.min[axis].min(p[axis]);
                bounds.max[axis] = bounds.max[axis].max(p[axis]);
            }
        }
        Some(bounds)
    }

    /// Axis permutations keep min and max corners intact
    pub fn transformed(self, transform: CoordinateTransform) -> Self {
        Bounds {
            min: transform.apply(self.min),
            max: transform.apply(self.max),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submesh {
    /// Entry from the submesh name table
    pub name: Option<String>,
    pub material: String,
    pub positions: Vec<[f32; 3]>,
    /// Empty when the source carries no normals
    pub normals: Vec<[f32; 3]>,
    /// Empty when the source carries no texture coordinates
    pub uvs: Vec<[f32; 2]>,
    pub triangles: Vec<[u32; 3]>,
}

/// A decoded mesh asset in the output convention
#[derive(Debug, Clone, PartialEq)]
pub struct MeshGeometry {
    pub name: String,
    pub submeshes: Vec<Submesh>,
    pub bounds: Bounds,
    pub skeleton: Option<String>,
}

impl MeshGeometry {
    /// Unit cube centred on the origin, one quad per face
    pub fn placeholder(name: &str) -> Self {
        let mut positions = Vec::with_capacity(24);
        let mut normals = Vec::with_capacity(24);
        let mut uvs = Vec::with_capacity(24);
        let mut triangles = Vec::with_capacity(12);

        for axis in 0..3 {
            let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
            for sign in [-1.0f32, 1.0] {
                let base = positions.len() as u32;
                for (su, sv) in [(-1.0f32, -1.0f32), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                    let mut p = [0.0; 3];
                    p[axis] = 0.5 * sign;
                    p[u] = 0.5 * su;
                    p[v] = 0.5 * sv;
                    positions.push(p);
                    let mut n = [0.0; 3];
                    n[axis] = sign;
                    normals.push(n);
                    uvs.push([(su + 1.0) / 2.0, (sv + 1.0) / 2.0]);
                }
                // (u, v, axis) is right-handed, so counter-clockwise faces +axis
                if sign > 0.0 {
                    triangles.push([base, base + 1, base + 2]);
                    triangles.push([base, base + 2, base + 3]);
                } else {
                    triangles.push([base, base + 2, base + 1]);
                    triangles.push([base, base + 3, base + 2]);
                }
            }
        }

        MeshGeometry {
            name: name.to_string(),
            submeshes: vec![Submesh {
                name: None,
                material: PLACEHOLDER_MATERIAL.to_string(),
                positions,
                normals,
                uvs,
                triangles,
            }],
            bounds: Bounds {
                min: [-0.5; 3],
                max: [0.5; 3],
            },
            skeleton: None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.submeshes.as_slice(), [only] if only.material == PLACEHOLDER_MATERIAL)
    }

    pub fn vertex_count(&self) -> usize {
        self.submeshes.iter().map(|s| s.positions.len()).sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.submeshes.iter().map(|s| s.triangles.len()).sum()
    }

    /// Distinct submesh materials in first-use order
    pub fn materials(&self) -> Vec<&str> {
        let mut materials: Vec<&str> = Vec::new();
        for submesh in &self.submeshes {
            if !materials.contains(&submesh.material.as_str()) {
                materials.push(&submesh.material);
            }
        }
        materials
    }
}
