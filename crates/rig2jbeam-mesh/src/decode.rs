//! Decoding entry points: read, upgrade, assemble
//!
//! Both container forms go through the same upgrade and assembly steps, so a
//! binary mesh and its XML export produce the same [`MeshGeometry`].

use std::path::Path;

use rig2jbeam_core::{CoordinateTransform, Diagnostic};
use tracing::{debug, warn};

use crate::binary::read_binary;
use crate::error::{DecodeError, DecodeResult};
use crate::geometry::MeshGeometry;
use crate::upgrade::upgrade;
use crate::xml::read_xml;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshFormat {
    Binary,
    Xml,
}

impl MeshFormat {
    /// Format implied by a file name; anything but `.xml` is binary
    pub fn from_path(path: &Path) -> Self {
        let is_xml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
        if is_xml {
            MeshFormat::Xml
        } else {
            MeshFormat::Binary
        }
    }

    /// Format implied by the content: XML starts with `<` after whitespace
    pub fn sniff(bytes: &[u8]) -> Self {
        let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        match body.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'<') => MeshFormat::Xml,
            _ => MeshFormat::Binary,
        }
    }
}

/// Decode an in-memory mesh
pub fn decode_bytes(
    bytes: &[u8],
    format: MeshFormat,
    name: &str,
    transform: CoordinateTransform,
) -> DecodeResult<MeshGeometry> {
    let mut raw = match format {
        MeshFormat::Binary => read_binary(bytes)?,
        MeshFormat::Xml => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| DecodeError::XmlError(e.to_string()))?;
            read_xml(text)?
        }
    };
    upgrade(&mut raw);
    let geometry = raw.into_geometry(name, transform)?;
    debug!(
        mesh = name,
        submeshes = geometry.submeshes.len(),
        vertices = geometry.vertex_count(),
        triangles = geometry.triangle_count(),
        "Decoded mesh"
    );
    Ok(geometry)
}

/// Decode a mesh file; the format comes from the extension, then the content
pub fn decode_file(path: &Path, name: &str, transform: CoordinateTransform) -> DecodeResult<MeshGeometry> {
    let bytes = std::fs::read(path)?;
    let format = match MeshFormat::from_path(path) {
        MeshFormat::Xml => MeshFormat::Xml,
        MeshFormat::Binary => MeshFormat::sniff(&bytes),
    };
    decode_bytes(&bytes, format, name, transform)
}

/// Decode a mesh file, falling back to the placeholder cube on any error
///
/// The diagnostic is `Some` exactly when the placeholder was used.
pub fn decode_or_placeholder(
    path: &Path,
    name: &str,
    transform: CoordinateTransform,
) -> (MeshGeometry, Option<Diagnostic>) {
    match decode_file(path, name, transform) {
        Ok(geometry) => (geometry, None),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Mesh decode failed, using placeholder");
            let diagnostic = Diagnostic::asset(format!(
                "{}: {}; replaced by placeholder cube",
                path.display(),
                err
            ));
            (MeshGeometry::placeholder(name), Some(diagnostic))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::fixtures::Fixture;
    use crate::chunk::Endian;
    use rig2jbeam_core::Severity;

    const TRIANGLE_XML: &str = r#"<mesh>
    <submeshes>
        <submesh material="Body" usesharedvertices="false">
            <faces count="1"><face v1="0" v2="1" v3="2" /></faces>
            <geometry vertexcount="3">
                <vertexbuffer positions="true" normals="true" texture_coords="1">
                    <vertex><position x="0" y="0" z="0" /><normal x="0" y="0" z="1" /><texcoord u="0" v="0" /></vertex>
                    <vertex><position x="1" y="0" z="0" /><normal x="0" y="0" z="1" /><texcoord u="1" v="0" /></vertex>
                    <vertex><position x="0" y="1" z="2" /><normal x="0" y="0" z="1" /><texcoord u="0" v="1" /></vertex>
                </vertexbuffer>
            </geometry>
        </submesh>
    </submeshes>
    <submeshnames><submeshname name="body" index="0" /></submeshnames>
</mesh>"#;

    #[test]
    fn test_xml_and_binary_decode_identically() {
        let binary = Fixture::triangle().encode(Endian::Little, "v1.41");
        let transform = CoordinateTransform::SourceToTarget;
        let from_binary = decode_bytes(&binary, MeshFormat::Binary, "body", transform).unwrap();
        let from_xml = decode_bytes(TRIANGLE_XML.as_bytes(), MeshFormat::Xml, "body", transform).unwrap();
        assert_eq!(from_binary, from_xml);
        assert_eq!(from_binary.submeshes[0].positions[2], [0.0, 2.0, 1.0]);
    }

    #[test]
    fn test_legacy_strip_is_upgraded() {
        let mut fixture = Fixture::triangle();
        fixture.positions.push([1.0, 1.0, 0.0]);
        fixture.normals = None;
        fixture.uvs = None;
        fixture.indices = vec![0, 1, 2, 3];
        fixture.operation = Some(5);
        let data = fixture.encode(Endian::Little, "v1.30");

        let geometry = decode_bytes(&data, MeshFormat::Binary, "strip", CoordinateTransform::Identity).unwrap();
        let sub = &geometry.submeshes[0];
        assert_eq!(sub.triangles, vec![[0, 1, 2], [2, 1, 3]]);
        assert_eq!(sub.normals.len(), 4);
    }

    #[test]
    fn test_sniff_and_extension() {
        assert_eq!(MeshFormat::sniff(b"  <mesh>"), MeshFormat::Xml);
        assert_eq!(MeshFormat::sniff(&[0x00, 0x10]), MeshFormat::Binary);
        assert_eq!(MeshFormat::from_path(Path::new("a.MESH.XML")), MeshFormat::Xml);
        assert_eq!(MeshFormat::from_path(Path::new("a.mesh")), MeshFormat::Binary);
    }

    #[test]
    fn test_overflow_falls_back_to_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mesh");
        let mut fixture = Fixture::triangle();
        fixture.vertex_count = Some(u32::MAX);
        std::fs::write(&path, fixture.encode(Endian::Little, "v1.41")).unwrap();

        let (geometry, diagnostic) = decode_or_placeholder(&path, "broken", CoordinateTransform::SourceToTarget);
        assert!(geometry.is_placeholder());
        assert_eq!(geometry.triangle_count(), 12);
        let diagnostic = diagnostic.unwrap();
        assert_eq!(diagnostic.severity, Severity::AssetDecode);
        assert!(diagnostic.message.contains("overflows"));
    }

    #[test]
    fn test_missing_file_is_placeholder() {
        let (geometry, diagnostic) =
            decode_or_placeholder(Path::new("/nonexistent/x.mesh"), "x", CoordinateTransform::Identity);
        assert!(geometry.is_placeholder());
        assert!(diagnostic.is_some());
    }
}
