//! Chunk ids and a byte-order aware cursor over the binary mesh container
//!
//! ```text
//! u16          header id (0x1000), read in file byte order
//! string       version, newline terminated ("[MeshSerializer_v1.41]")
//! foreach chunk
//!     u16      chunk id
//!     u32      chunk length, including this 6-byte header
//!     u8[..]   payload, possibly containing nested chunks
//! end
//! ```

use crate::error::DecodeError;

pub const HEADER: u16 = 0x1000;
pub const MESH: u16 = 0x3000;
pub const SUBMESH: u16 = 0x4000;
pub const SUBMESH_OPERATION: u16 = 0x4010;
pub const SUBMESH_BONE_ASSIGNMENT: u16 = 0x4100;
pub const SUBMESH_TEXTURE_ALIAS: u16 = 0x4200;
pub const GEOMETRY: u16 = 0x5000;
pub const GEOMETRY_VERTEX_DECLARATION: u16 = 0x5100;
pub const GEOMETRY_VERTEX_ELEMENT: u16 = 0x5110;
pub const GEOMETRY_VERTEX_BUFFER: u16 = 0x5200;
pub const GEOMETRY_VERTEX_BUFFER_DATA: u16 = 0x5210;
pub const MESH_SKELETON_LINK: u16 = 0x6000;
pub const MESH_BONE_ASSIGNMENT: u16 = 0x7000;
pub const MESH_LOD: u16 = 0x8000;
pub const MESH_BOUNDS: u16 = 0x9000;
pub const SUBMESH_NAME_TABLE: u16 = 0xA000;
pub const SUBMESH_NAME_TABLE_ELEMENT: u16 = 0xA100;
pub const EDGE_LISTS: u16 = 0xB000;
pub const POSES: u16 = 0xC000;
pub const ANIMATIONS: u16 = 0xD000;
pub const TABLE_EXTREMES: u16 = 0xE000;

/// Size of `(u16 id, u32 length)`
pub const CHUNK_HEADER_SIZE: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// A chunk whose header has been read; the payload spans `start..end`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub id: u16,
    /// Offset of the chunk header
    pub offset: usize,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8], endian: Endian) -> Self {
        Self {
            data,
            pos: 0,
            endian,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or(DecodeError::Overflow("read length"))?;
        if end > self.data.len() {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: end - self.data.len(),
            });
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.array::<1>()?[0])
    }

    pub fn bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.u8()? != 0)
    }

    pub fn u16(&mut self) -> Result<u16, DecodeError> {
        let raw = self.array()?;
        Ok(match self.endian {
            Endian::Little => u16::from_le_bytes(raw),
            Endian::Big => u16::from_be_bytes(raw),
        })
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        let raw = self.array()?;
        Ok(match self.endian {
            Endian::Little => u32::from_le_bytes(raw),
            Endian::Big => u32::from_be_bytes(raw),
        })
    }

    pub fn f32(&mut self) -> Result<f32, DecodeError> {
        let raw = self.array()?;
        Ok(match self.endian {
            Endian::Little => f32::from_le_bytes(raw),
            Endian::Big => f32::from_be_bytes(raw),
        })
    }

    pub fn vec3(&mut self) -> Result<[f32; 3], DecodeError> {
        Ok([self.f32()?, self.f32()?, self.f32()?])
    }

    /// Newline-terminated string; the newline is consumed
    pub fn string(&mut self) -> Result<String, DecodeError> {
        let rest = &self.data[self.pos.min(self.data.len())..];
        let len = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(DecodeError::Truncated {
                offset: self.pos,
                needed: 1,
            })?;
        let text = String::from_utf8_lossy(&rest[..len]).into_owned();
        self.pos += len + 1;
        Ok(text)
    }

    /// Read the next chunk header, checking it fits inside `limit`
    pub fn chunk(&mut self, limit: usize) -> Result<Chunk, DecodeError> {
        let offset = self.pos;
        let id = self.u16()?;
        let length = self.u32()? as usize;
        if length < CHUNK_HEADER_SIZE {
            return Err(DecodeError::Malformed(format!(
                "chunk 0x{:04X} at offset {} declares length {}",
                id, offset, length
            )));
        }
        let end = offset
            .checked_add(length)
            .ok_or(DecodeError::Overflow("chunk length"))?;
        if end > limit {
            return Err(DecodeError::Truncated {
                offset,
                needed: end - limit,
            });
        }
        Ok(Chunk {
            id,
            offset,
            start: self.pos,
            end,
        })
    }

    pub fn skip_to(&mut self, chunk: &Chunk) {
        self.pos = chunk.end;
    }
}

/// Writes the container layout; used to build fixtures
#[cfg(test)]
pub(crate) mod writer {
    use super::Endian;

    pub struct ChunkWriter {
        pub buf: Vec<u8>,
        endian: Endian,
        open: Vec<usize>,
    }

    impl ChunkWriter {
        pub fn new(endian: Endian, version: &str) -> Self {
            let mut w = Self {
                buf: Vec::new(),
                endian,
                open: Vec::new(),
            };
            w.u16(super::HEADER);
            w.string(version);
            w
        }

        pub fn u8(&mut self, v: u8) -> &mut Self {
            self.buf.push(v);
            self
        }

        pub fn u16(&mut self, v: u16) -> &mut Self {
            match self.endian {
                Endian::Little => self.buf.extend(v.to_le_bytes()),
                Endian::Big => self.buf.extend(v.to_be_bytes()),
            }
            self
        }

        pub fn u32(&mut self, v: u32) -> &mut Self {
            match self.endian {
                Endian::Little => self.buf.extend(v.to_le_bytes()),
                Endian::Big => self.buf.extend(v.to_be_bytes()),
            }
            self
        }

        pub fn f32(&mut self, v: f32) -> &mut Self {
            match self.endian {
                Endian::Little => self.buf.extend(v.to_le_bytes()),
                Endian::Big => self.buf.extend(v.to_be_bytes()),
            }
            self
        }

        pub fn string(&mut self, s: &str) -> &mut Self {
            self.buf.extend(s.as_bytes());
            self.buf.push(b'\n');
            self
        }

        pub fn begin(&mut self, id: u16) -> &mut Self {
            self.u16(id);
            self.open.push(self.buf.len());
            self.u32(0)
        }

        /// Patch the innermost open chunk's length
        pub fn end(&mut self) -> &mut Self {
            let at = self.open.pop().expect("unbalanced chunk");
            let len = (self.buf.len() - at + 2) as u32;
            let bytes = match self.endian {
                Endian::Little => len.to_le_bytes(),
                Endian::Big => len.to_be_bytes(),
            };
            self.buf[at..at + 4].copy_from_slice(&bytes);
            self
        }

        pub fn finish(&mut self) -> Vec<u8> {
            assert!(self.open.is_empty(), "unclosed chunk");
            std::mem::take(&mut self.buf)
        }
    }
}
