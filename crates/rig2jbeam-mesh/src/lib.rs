//! Rig2jbeam Mesh - Ogre mesh decoding and COLLADA export
//!
//! This crate provides:
//! - Binary mesh container decoding (either byte order, chunk tree)
//! - XML mesh decoding onto the same raw model
//! - Format upgrade passes for older serializer versions
//! - A placeholder cube for assets that cannot be decoded
//! - COLLADA 1.4.1 export of decoded geometry
//! - Mesh name synchronisation for COLLADA files referenced directly
//! - Parallel decoding of every mesh a rig references

pub mod batch;
pub mod binary;
pub mod chunk;
pub mod collada;
pub mod dae;
pub mod decode;
pub mod error;
pub mod geometry;
pub mod upgrade;
pub mod xml;

pub use batch::{decode_assets, AssetOutcome};
pub use collada::{collada_file_name, ColladaError, ColladaWriter};
pub use dae::{
    extract_mesh_names, is_collada, rename_meshes, sync_dae_assets, DaeError, DaeOutcome, NameMapping,
    Renamed,
};
pub use decode::{decode_bytes, decode_file, decode_or_placeholder, MeshFormat};
pub use error::{DecodeError, DecodeResult};
pub use geometry::{Bounds, FormatVersion, MeshGeometry, Submesh, PLACEHOLDER_MATERIAL};
