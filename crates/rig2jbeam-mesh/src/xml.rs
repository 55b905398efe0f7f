//! XML mesh reader
//!
//! The XML form carries the same content as the binary container, so it is
//! deserialized with serde and mapped onto the same [`RawMesh`].

use std::collections::BTreeMap;

use quick_xml::de::from_str;
use serde::Deserialize;
use tracing::debug;

use crate::error::{DecodeError, DecodeResult};
use crate::geometry::{FormatVersion, OperationType, RawMesh, RawSubmesh, VertexData};

#[derive(Debug, Deserialize)]
#[serde(rename = "mesh")]
struct XmlMesh {
    #[serde(default)]
    sharedgeometry: Option<XmlGeometry>,
    #[serde(default)]
    submeshes: Option<XmlSubmeshes>,
    #[serde(default)]
    skeletonlink: Option<XmlSkeletonLink>,
    #[serde(default)]
    submeshnames: Option<XmlSubmeshNames>,
}

#[derive(Debug, Deserialize)]
struct XmlSubmeshes {
    #[serde(default)]
    submesh: Vec<XmlSubmesh>,
}

#[derive(Debug, Deserialize)]
struct XmlSubmesh {
    #[serde(rename = "@material", default)]
    material: String,
    #[serde(rename = "@usesharedvertices", default)]
    use_shared: bool,
    #[serde(rename = "@operationtype", default)]
    operation: Option<String>,
    #[serde(default)]
    faces: Option<XmlFaces>,
    #[serde(default)]
    geometry: Option<XmlGeometry>,
}

#[derive(Debug, Deserialize)]
struct XmlFaces {
    #[serde(default)]
    face: Vec<XmlFace>,
}

/// Strip and fan faces after the first carry only `v1`
#[derive(Debug, Deserialize)]
struct XmlFace {
    #[serde(rename = "@v1")]
    v1: u32,
    #[serde(rename = "@v2", default)]
    v2: Option<u32>,
    #[serde(rename = "@v3", default)]
    v3: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct XmlGeometry {
    #[serde(rename = "@vertexcount")]
    vertex_count: usize,
    #[serde(default)]
    vertexbuffer: Vec<XmlVertexBuffer>,
}

#[derive(Debug, Deserialize)]
struct XmlVertexBuffer {
    #[serde(default)]
    vertex: Vec<XmlVertex>,
}

#[derive(Debug, Deserialize)]
struct XmlVertex {
    #[serde(default)]
    position: Option<XmlVec3>,
    #[serde(default)]
    normal: Option<XmlVec3>,
    #[serde(default)]
    texcoord: Vec<XmlTexcoord>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct XmlVec3 {
    #[serde(rename = "@x")]
    x: f32,
    #[serde(rename = "@y")]
    y: f32,
    #[serde(rename = "@z")]
    z: f32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct XmlTexcoord {
    #[serde(rename = "@u")]
    u: f32,
    #[serde(rename = "@v")]
    v: f32,
}

#[derive(Debug, Deserialize)]
struct XmlSkeletonLink {
    #[serde(rename = "@name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct XmlSubmeshNames {
    #[serde(default)]
    submeshname: Vec<XmlSubmeshName>,
}

#[derive(Debug, Deserialize)]
struct XmlSubmeshName {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@index")]
    index: u16,
}

impl XmlGeometry {
    /// Merge attributes spread across vertex buffers
    fn into_vertex_data(self) -> DecodeResult<VertexData> {
        let count = self.vertex_count;
        let mut data = VertexData::default();
        let mut have_positions = false;

        for buffer in &self.vertexbuffer {
            let positions: Option<Vec<[f32; 3]>> = buffer
                .vertex
                .iter()
                .map(|v| v.position.map(|p| [p.x, p.y, p.z]))
                .collect();
            if let (false, Some(positions)) = (have_positions, positions) {
                if !buffer.vertex.is_empty() {
                    data.positions = positions;
                    have_positions = true;
                }
            }
            if data.normals.is_none() && !buffer.vertex.is_empty() {
                data.normals = buffer
                    .vertex
                    .iter()
                    .map(|v| v.normal.map(|n| [n.x, n.y, n.z]))
                    .collect();
            }
            if data.uvs.is_none() && !buffer.vertex.is_empty() {
                data.uvs = buffer
                    .vertex
                    .iter()
                    .map(|v| v.texcoord.first().map(|t| [t.u, t.v]))
                    .collect();
            }
        }

        if data.positions.len() != count {
            return Err(DecodeError::Malformed(format!(
                "geometry declares {} vertices but lists {} positions",
                count,
                data.positions.len()
            )));
        }
        Ok(data)
    }
}

impl XmlSubmesh {
    fn into_raw(self) -> DecodeResult<RawSubmesh> {
        let operation = match self.operation.as_deref() {
            None => OperationType::TriangleList,
            Some(name) => OperationType::from_name(name).ok_or_else(|| {
                DecodeError::Malformed(format!("unknown operation type '{}'", name))
            })?,
        };
        let indices = self
            .faces
            .map(|faces| {
                faces
                    .face
                    .iter()
                    .flat_map(|f| [Some(f.v1), f.v2, f.v3])
                    .flatten()
                    .collect()
            })
            .unwrap_or_default();
        Ok(RawSubmesh {
            material: self.material,
            use_shared: self.use_shared,
            operation,
            indices,
            geometry: self.geometry.map(XmlGeometry::into_vertex_data).transpose()?,
        })
    }
}

/// Decode an XML mesh into its raw form
///
/// The XML form has no serializer version and reads as current.
pub fn read_xml(text: &str) -> DecodeResult<RawMesh> {
    let mesh: XmlMesh = from_str(text).map_err(|e| DecodeError::XmlError(e.to_string()))?;

    let mut raw = RawMesh::new(FormatVersion::Current);
    raw.shared = mesh
        .sharedgeometry
        .map(XmlGeometry::into_vertex_data)
        .transpose()?;
    raw.submeshes = mesh
        .submeshes
        .map(|s| s.submesh)
        .unwrap_or_default()
        .into_iter()
        .map(XmlSubmesh::into_raw)
        .collect::<DecodeResult<_>>()?;
    raw.skeleton = mesh.skeletonlink.map(|s| s.name);
    raw.submesh_names = mesh
        .submeshnames
        .map(|n| n.submeshname)
        .unwrap_or_default()
        .into_iter()
        .map(|n| (n.index, n.name))
        .collect::<BTreeMap<_, _>>();

    debug!(submeshes = raw.submeshes.len(), shared = raw.shared.is_some(), "Read XML mesh");
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIANGLE: &str = r#"<mesh>
    <submeshes>
        <submesh material="Body" usesharedvertices="false" use32bitindexes="false" operationtype="triangle_list">
            <faces count="1">
                <face v1="0" v2="1" v3="2" />
            </faces>
            <geometry vertexcount="3">
                <vertexbuffer positions="true" normals="true">
                    <vertex><position x="0" y="0" z="0" /><normal x="0" y="0" z="1" /></vertex>
                    <vertex><position x="1" y="0" z="0" /><normal x="0" y="0" z="1" /></vertex>
                    <vertex><position x="0" y="1" z="2" /><normal x="0" y="0" z="1" /></vertex>
                </vertexbuffer>
                <vertexbuffer texture_coord_dimensions_0="2" texture_coords="1">
                    <vertex><texcoord u="0" v="0" /></vertex>
                    <vertex><texcoord u="1" v="0" /></vertex>
                    <vertex><texcoord u="0" v="1" /></vertex>
                </vertexbuffer>
            </geometry>
        </submesh>
    </submeshes>
    <submeshnames>
        <submeshname name="body" index="0" />
    </submeshnames>
</mesh>"#;

    #[test]
    fn test_reads_split_vertex_buffers() {
        let raw = read_xml(TRIANGLE).unwrap();
        assert_eq!(raw.version, FormatVersion::Current);
        let sub = &raw.submeshes[0];
        assert_eq!(sub.material, "Body");
        assert_eq!(sub.indices, vec![0, 1, 2]);
        let data = sub.geometry.as_ref().unwrap();
        assert_eq!(data.positions[2], [0.0, 1.0, 2.0]);
        assert_eq!(data.normals.as_ref().unwrap().len(), 3);
        assert_eq!(data.uvs.as_ref().unwrap()[1], [1.0, 0.0]);
        assert_eq!(raw.submesh_names[&0], "body");
    }

    #[test]
    fn test_shared_geometry_and_strip_faces() {
        let xml = r#"<mesh>
    <sharedgeometry vertexcount="4">
        <vertexbuffer positions="true">
            <vertex><position x="0" y="0" z="0" /></vertex>
            <vertex><position x="1" y="0" z="0" /></vertex>
            <vertex><position x="0" y="1" z="0" /></vertex>
            <vertex><position x="1" y="1" z="0" /></vertex>
        </vertexbuffer>
    </sharedgeometry>
    <submeshes>
        <submesh material="Glass" usesharedvertices="true" operationtype="triangle_strip">
            <faces count="2">
                <face v1="0" v2="1" v3="2" />
                <face v1="3" />
            </faces>
        </submesh>
    </submeshes>
    <skeletonlink name="car.skeleton" />
</mesh>"#;
        let raw = read_xml(xml).unwrap();
        let shared = raw.shared.as_ref().unwrap();
        assert_eq!(shared.len(), 4);
        assert!(shared.normals.is_none());
        assert!(shared.uvs.is_none());
        assert_eq!(raw.submeshes[0].operation, OperationType::TriangleStrip);
        assert_eq!(raw.submeshes[0].indices, vec![0, 1, 2, 3]);
        assert_eq!(raw.skeleton.as_deref(), Some("car.skeleton"));
    }

    #[test]
    fn test_vertex_count_mismatch() {
        let xml = TRIANGLE.replace("vertexcount=\"3\"", "vertexcount=\"5\"");
        assert!(matches!(read_xml(&xml), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_invalid_xml() {
        assert!(matches!(read_xml("<mesh><submeshes>"), Err(DecodeError::XmlError(_))));
    }
}
