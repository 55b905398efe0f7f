//! Binary mesh container reader
//!
//! Walks the chunk tree into a [`RawMesh`]. Chunk lengths bound every nested
//! walk, so a chunk that claims more bytes than its parent holds is reported
//! as truncated instead of being read past.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::chunk::{self, Chunk, Endian, Reader};
use crate::error::{DecodeError, DecodeResult};
use crate::geometry::{Bounds, FormatVersion, OperationType, RawMesh, RawSubmesh, VertexData};

const VET_FLOAT2: u16 = 1;
const VET_FLOAT3: u16 = 2;

const VES_POSITION: u16 = 1;
const VES_NORMAL: u16 = 4;
const VES_TEXTURE_COORDINATES: u16 = 7;

/// One entry of a vertex declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct VertexElement {
    source: u16,
    kind: u16,
    semantic: u16,
    offset: u16,
    index: u16,
}

struct VertexBuffer<'a> {
    vertex_size: usize,
    data: &'a [u8],
}

/// Byte order from the first two bytes of the file
pub fn detect_endian(data: &[u8]) -> DecodeResult<Endian> {
    match data {
        [0x00, 0x10, ..] => Ok(Endian::Little),
        [0x10, 0x00, ..] => Ok(Endian::Big),
        [a, b, ..] => Err(DecodeError::BadHeader(format!(
            "expected header id 0x1000, found bytes {:02X} {:02X}",
            a, b
        ))),
        _ => Err(DecodeError::Truncated {
            offset: 0,
            needed: 2 - data.len(),
        }),
    }
}

/// Decode a binary mesh container into its raw form
pub fn read_binary(data: &[u8]) -> DecodeResult<RawMesh> {
    let endian = detect_endian(data)?;
    let mut r = Reader::new(data, endian);
    r.u16()?;
    let header = r.string()?;
    let version = FormatVersion::from_header(&header)
        .ok_or_else(|| DecodeError::UnsupportedVersion(header.trim().to_string()))?;
    debug!(version = %header.trim(), ?endian, "Reading binary mesh");

    let mut raw = RawMesh::new(version);
    let mut found_mesh = false;
    while r.remaining() > 0 {
        let chunk = r.chunk(data.len())?;
        match chunk.id {
            chunk::MESH => {
                read_mesh(&mut r, &chunk, &mut raw)?;
                found_mesh = true;
            }
            id => {
                return Err(DecodeError::UnknownChunk {
                    id,
                    offset: chunk.offset,
                })
            }
        }
        finish(&mut r, &chunk)?;
    }

    if !found_mesh {
        return Err(DecodeError::Malformed("no mesh chunk".to_string()));
    }
    Ok(raw)
}

/// Move past `chunk`, failing if its reader ran over the end
fn finish(r: &mut Reader<'_>, chunk: &Chunk) -> DecodeResult<()> {
    if r.position() > chunk.end {
        return Err(DecodeError::Malformed(format!(
            "chunk 0x{:04X} at offset {} overran its length by {} byte(s)",
            chunk.id,
            chunk.offset,
            r.position() - chunk.end
        )));
    }
    r.skip_to(chunk);
    Ok(())
}

fn read_mesh(r: &mut Reader<'_>, mesh: &Chunk, raw: &mut RawMesh) -> DecodeResult<()> {
    let skeletally_animated = r.bool()?;
    trace!(skeletally_animated, "Mesh chunk");

    while r.position() < mesh.end {
        let chunk = r.chunk(mesh.end)?;
        match chunk.id {
            chunk::GEOMETRY => raw.shared = Some(read_geometry(r, &chunk)?),
            chunk::SUBMESH => {
                let submesh = read_submesh(r, &chunk)?;
                raw.submeshes.push(submesh);
            }
            chunk::MESH_SKELETON_LINK => raw.skeleton = Some(r.string()?),
            chunk::MESH_BOUNDS => {
                let min = r.vec3()?;
                let max = r.vec3()?;
                let _radius = r.f32()?;
                raw.bounds = Some(Bounds { min, max });
            }
            chunk::SUBMESH_NAME_TABLE => read_name_table(r, &chunk, &mut raw.submesh_names)?,
            chunk::MESH_BONE_ASSIGNMENT
            | chunk::MESH_LOD
            | chunk::EDGE_LISTS
            | chunk::POSES
            | chunk::ANIMATIONS
            | chunk::TABLE_EXTREMES => trace!(id = chunk.id, "Skipping optional chunk"),
            id => {
                return Err(DecodeError::UnknownChunk {
                    id,
                    offset: chunk.offset,
                })
            }
        }
        finish(r, &chunk)?;
    }
    Ok(())
}

fn read_submesh(r: &mut Reader<'_>, submesh: &Chunk) -> DecodeResult<RawSubmesh> {
    let material = r.string()?;
    let use_shared = r.bool()?;
    let index_count = r.u32()?;
    let wide = r.bool()?;

    let width: u32 = if wide { 4 } else { 2 };
    let byte_len = index_count
        .checked_mul(width)
        .ok_or(DecodeError::Overflow("index count"))?;
    let endian = r.endian();
    let bytes = r.bytes(byte_len as usize)?;
    let indices = bytes
        .chunks_exact(width as usize)
        .map(|b| match (wide, endian) {
            (true, Endian::Little) => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            (true, Endian::Big) => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
            (false, Endian::Little) => u32::from(u16::from_le_bytes([b[0], b[1]])),
            (false, Endian::Big) => u32::from(u16::from_be_bytes([b[0], b[1]])),
        })
        .collect();

    let mut out = RawSubmesh {
        material,
        use_shared,
        operation: OperationType::TriangleList,
        indices,
        geometry: None,
    };

    while r.position() < submesh.end {
        let chunk = r.chunk(submesh.end)?;
        match chunk.id {
            chunk::GEOMETRY => out.geometry = Some(read_geometry(r, &chunk)?),
            chunk::SUBMESH_OPERATION => {
                let code = r.u16()?;
                out.operation = OperationType::from_code(code).ok_or_else(|| {
                    DecodeError::Malformed(format!("unknown operation type {}", code))
                })?;
            }
            chunk::SUBMESH_BONE_ASSIGNMENT | chunk::SUBMESH_TEXTURE_ALIAS => {
                trace!(id = chunk.id, "Skipping optional submesh chunk")
            }
            id => {
                return Err(DecodeError::UnknownChunk {
                    id,
                    offset: chunk.offset,
                })
            }
        }
        finish(r, &chunk)?;
    }

    trace!(material = %out.material, indices = out.indices.len(), use_shared, "Submesh");
    Ok(out)
}

fn read_name_table(
    r: &mut Reader<'_>,
    table: &Chunk,
    names: &mut BTreeMap<u16, String>,
) -> DecodeResult<()> {
    while r.position() < table.end {
        let chunk = r.chunk(table.end)?;
        if chunk.id != chunk::SUBMESH_NAME_TABLE_ELEMENT {
            return Err(DecodeError::UnknownChunk {
                id: chunk.id,
                offset: chunk.offset,
            });
        }
        let index = r.u16()?;
        let name = r.string()?;
        names.insert(index, name);
        finish(r, &chunk)?;
    }
    Ok(())
}

fn read_geometry(r: &mut Reader<'_>, geometry: &Chunk) -> DecodeResult<VertexData> {
    let vertex_count = r.u32()?;
    let mut elements = Vec::new();
    let mut buffers: BTreeMap<u16, VertexBuffer<'_>> = BTreeMap::new();

    while r.position() < geometry.end {
        let chunk = r.chunk(geometry.end)?;
        match chunk.id {
            chunk::GEOMETRY_VERTEX_DECLARATION => {
                while r.position() < chunk.end {
                    let element = r.chunk(chunk.end)?;
                    if element.id != chunk::GEOMETRY_VERTEX_ELEMENT {
                        return Err(DecodeError::UnknownChunk {
                            id: element.id,
                            offset: element.offset,
                        });
                    }
                    elements.push(VertexElement {
                        source: r.u16()?,
                        kind: r.u16()?,
                        semantic: r.u16()?,
                        offset: r.u16()?,
                        index: r.u16()?,
                    });
                    finish(r, &element)?;
                }
            }
            chunk::GEOMETRY_VERTEX_BUFFER => {
                let bind = r.u16()?;
                let vertex_size = r.u16()?;
                let data = r.chunk(chunk.end)?;
                if data.id != chunk::GEOMETRY_VERTEX_BUFFER_DATA {
                    return Err(DecodeError::UnknownChunk {
                        id: data.id,
                        offset: data.offset,
                    });
                }
                let len = vertex_count
                    .checked_mul(u32::from(vertex_size))
                    .ok_or(DecodeError::Overflow("vertex count"))?;
                let bytes = r.bytes(len as usize)?;
                finish(r, &data)?;
                buffers.insert(
                    bind,
                    VertexBuffer {
                        vertex_size: usize::from(vertex_size),
                        data: bytes,
                    },
                );
            }
            id => {
                return Err(DecodeError::UnknownChunk {
                    id,
                    offset: chunk.offset,
                })
            }
        }
        finish(r, &chunk)?;
    }

    let count = vertex_count as usize;
    let endian = r.endian();
    let find = |semantic: u16, kind: u16| {
        elements
            .iter()
            .find(|e| e.semantic == semantic && e.index == 0 && e.kind == kind)
    };

    let position = find(VES_POSITION, VET_FLOAT3)
        .ok_or_else(|| DecodeError::Malformed("geometry without float3 positions".to_string()))?;
    let positions = read_attribute::<3>(&buffers, position, count, endian)?;
    let normals = find(VES_NORMAL, VET_FLOAT3)
        .map(|e| read_attribute::<3>(&buffers, e, count, endian))
        .transpose()?;
    let uvs = find(VES_TEXTURE_COORDINATES, VET_FLOAT2)
        .map(|e| read_attribute::<2>(&buffers, e, count, endian))
        .transpose()?;

    Ok(VertexData {
        positions,
        normals,
        uvs,
    })
}

fn read_attribute<const N: usize>(
    buffers: &BTreeMap<u16, VertexBuffer<'_>>,
    element: &VertexElement,
    count: usize,
    endian: Endian,
) -> DecodeResult<Vec<[f32; N]>> {
    let buffer = buffers.get(&element.source).ok_or_else(|| {
        DecodeError::Malformed(format!("vertex element bound to missing buffer {}", element.source))
    })?;
    if usize::from(element.offset) + N * 4 > buffer.vertex_size {
        return Err(DecodeError::Malformed(format!(
            "vertex element at offset {} does not fit a {}-byte vertex",
            element.offset, buffer.vertex_size
        )));
    }

    let mut r = Reader::new(buffer.data, endian);
    let mut out = Vec::with_capacity(count);
    for v in 0..count {
        r.seek(v * buffer.vertex_size + usize::from(element.offset));
        let mut value = [0.0f32; N];
        for component in &mut value {
            *component = r.f32()?;
        }
        out.push(value);
    }
    Ok(out)
}


#[cfg(test)]
mod tests {
    use super::fixtures::Fixture;
    use super::*;
    use crate::chunk::writer::ChunkWriter;

    #[test]
    fn test_reads_triangle_mesh() {
        let data = Fixture::triangle().encode(Endian::Little, "v1.41");
        let raw = read_binary(&data).unwrap();
        assert_eq!(raw.version, FormatVersion::Current);
        assert_eq!(raw.submeshes.len(), 1);
        let sub = &raw.submeshes[0];
        assert_eq!(sub.material, "Body");
        assert_eq!(sub.indices, vec![0, 1, 2]);
        let geometry = sub.geometry.as_ref().unwrap();
        assert_eq!(geometry.positions[2], [0.0, 1.0, 2.0]);
        assert_eq!(geometry.uvs.as_ref().unwrap()[1], [1.0, 0.0]);
        assert_eq!(raw.submesh_names.get(&0).map(String::as_str), Some("body"));
    }

    #[test]
    fn test_big_endian_header_detected() {
        let le = Fixture::triangle().encode(Endian::Little, "v1.41");
        let be = Fixture::triangle().encode(Endian::Big, "v1.41");
        assert_eq!(&be[..2], &[0x10, 0x00]);
        assert_eq!(detect_endian(&be).unwrap(), Endian::Big);
        assert_eq!(read_binary(&be).unwrap(), read_binary(&le).unwrap());
    }

    #[test]
    fn test_shared_geometry() {
        let mut fixture = Fixture::triangle();
        fixture.shared = true;
        let raw = read_binary(&fixture.encode(Endian::Little, "v1.8")).unwrap();
        assert!(raw.shared.is_some());
        assert!(raw.submeshes[0].use_shared);
        assert!(raw.submeshes[0].geometry.is_none());
    }

    #[test]
    fn test_bad_header_and_version() {
        assert!(matches!(read_binary(b"\x12\x34abc"), Err(DecodeError::BadHeader(_))));
        let data = Fixture::triangle().encode(Endian::Little, "v9.9");
        assert!(matches!(read_binary(&data), Err(DecodeError::UnsupportedVersion(v)) if v.contains("v9.9")));
    }

    #[test]
    fn test_vertex_count_overflow() {
        let mut fixture = Fixture::triangle();
        fixture.vertex_count = Some(u32::MAX);
        let data = fixture.encode(Endian::Little, "v1.41");
        assert!(matches!(read_binary(&data), Err(DecodeError::Overflow(_))));
    }

    #[test]
    fn test_unknown_chunk_in_mesh() {
        let mut w = ChunkWriter::new(Endian::Little, "[MeshSerializer_v1.41]");
        w.begin(chunk::MESH).u8(0);
        w.begin(0x1234).u32(7).end();
        w.end();
        let data = w.finish();
        assert!(matches!(
            read_binary(&data),
            Err(DecodeError::UnknownChunk { id: 0x1234, .. })
        ));
    }

    #[test]
    fn test_optional_chunks_skipped() {
        let mut w = ChunkWriter::new(Endian::Little, "[MeshSerializer_v1.41]");
        w.begin(chunk::MESH).u8(0);
        w.begin(chunk::EDGE_LISTS).u32(99).end();
        w.begin(chunk::MESH_SKELETON_LINK).string("rig.skeleton").end();
        w.end();
        let raw = read_binary(&w.finish()).unwrap();
        assert_eq!(raw.skeleton.as_deref(), Some("rig.skeleton"));
    }

    #[test]
    fn test_truncated_file() {
        let data = Fixture::triangle().encode(Endian::Little, "v1.41");
        let cut = &data[..data.len() - 10];
        assert!(matches!(read_binary(cut), Err(DecodeError::Truncated { .. })));
    }
}
