//! COLLADA 1.4.1 export of decoded geometry
//!
//! One effect and material per distinct submesh material and a single
//! geometry `<name>-geometry` named after the mesh. Submeshes share the
//! position/normal/UV sources and keep one `<triangles>` block each. The
//! scene holds one node `<name>`, which is what a JBeam `mesh` value refers
//! to. Geometry values are written as decoded; the transform only decides
//! the declared up axis.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::se::to_string;
use rig2jbeam_core::{mesh_stem, CoordinateTransform};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::geometry::{MeshGeometry, Submesh};

const COLLADA_NAMESPACE: &str = "http://www.collada.org/2005/11/COLLADASchema";
const COLLADA_VERSION: &str = "1.4.1";
const DIFFUSE: &str = "0.8 0.8 0.8 1";

#[derive(Error, Debug)]
pub enum ColladaError {
    #[error("Failed to serialize COLLADA: {0}")]
    SerializeError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, Serialize)]
#[serde(rename = "COLLADA")]
struct Collada {
    #[serde(rename = "@xmlns")]
    xmlns: &'static str,
    #[serde(rename = "@version")]
    version: &'static str,
    asset: Asset,
    library_effects: LibraryEffects,
    library_materials: LibraryMaterials,
    library_geometries: LibraryGeometries,
    library_visual_scenes: LibraryVisualScenes,
    scene: SceneRef,
}

#[derive(Debug, Serialize)]
struct Asset {
    contributor: Contributor,
    created: String,
    modified: String,
    unit: Unit,
    up_axis: &'static str,
}

#[derive(Debug, Serialize)]
struct Contributor {
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<String>,
    authoring_tool: String,
}

#[derive(Debug, Serialize)]
struct Unit {
    #[serde(rename = "@name")]
    name: &'static str,
    #[serde(rename = "@meter")]
    meter: f32,
}

#[derive(Debug, Serialize)]
struct LibraryEffects {
    effect: Vec<Effect>,
}

#[derive(Debug, Serialize)]
struct Effect {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "profile_COMMON")]
    profile: ProfileCommon,
}

#[derive(Debug, Serialize)]
struct ProfileCommon {
    technique: ShadingTechnique,
}

#[derive(Debug, Serialize)]
struct ShadingTechnique {
    #[serde(rename = "@sid")]
    sid: &'static str,
    lambert: Lambert,
}

#[derive(Debug, Serialize)]
struct Lambert {
    diffuse: Diffuse,
}

#[derive(Debug, Serialize)]
struct Diffuse {
    color: Color,
}

#[derive(Debug, Serialize)]
struct Color {
    #[serde(rename = "@sid")]
    sid: &'static str,
    #[serde(rename = "$text")]
    value: &'static str,
}

#[derive(Debug, Serialize)]
struct LibraryMaterials {
    material: Vec<Material>,
}

#[derive(Debug, Serialize)]
struct Material {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@name")]
    name: String,
    instance_effect: UrlRef,
}

#[derive(Debug, Serialize)]
struct UrlRef {
    #[serde(rename = "@url")]
    url: String,
}

#[derive(Debug, Serialize)]
struct LibraryGeometries {
    geometry: Vec<Geometry>,
}

#[derive(Debug, Serialize)]
struct Geometry {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@name")]
    name: String,
    mesh: Mesh,
}

#[derive(Debug, Serialize)]
struct Mesh {
    source: Vec<Source>,
    vertices: Vertices,
    triangles: Vec<Triangles>,
}

#[derive(Debug, Serialize)]
struct Source {
    #[serde(rename = "@id")]
    id: String,
    float_array: FloatArray,
    technique_common: SourceTechnique,
}

#[derive(Debug, Serialize)]
struct FloatArray {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@count")]
    count: usize,
    #[serde(rename = "$text")]
    values: String,
}

#[derive(Debug, Serialize)]
struct SourceTechnique {
    accessor: Accessor,
}

#[derive(Debug, Serialize)]
struct Accessor {
    #[serde(rename = "@source")]
    source: String,
    #[serde(rename = "@count")]
    count: usize,
    #[serde(rename = "@stride")]
    stride: usize,
    param: Vec<Param>,
}

#[derive(Debug, Serialize)]
struct Param {
    #[serde(rename = "@name")]
    name: &'static str,
    #[serde(rename = "@type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct Vertices {
    #[serde(rename = "@id")]
    id: String,
    input: Vec<Input>,
}

#[derive(Debug, Serialize)]
struct Input {
    #[serde(rename = "@semantic")]
    semantic: &'static str,
    #[serde(rename = "@source")]
    source: String,
    #[serde(rename = "@offset", skip_serializing_if = "Option::is_none")]
    offset: Option<u32>,
    #[serde(rename = "@set", skip_serializing_if = "Option::is_none")]
    set: Option<u32>,
}

#[derive(Debug, Serialize)]
struct Triangles {
    #[serde(rename = "@material")]
    material: String,
    #[serde(rename = "@count")]
    count: usize,
    input: Vec<Input>,
    p: String,
}

#[derive(Debug, Serialize)]
struct LibraryVisualScenes {
    visual_scene: VisualScene,
}

#[derive(Debug, Serialize)]
struct VisualScene {
    #[serde(rename = "@id")]
    id: &'static str,
    #[serde(rename = "@name")]
    name: &'static str,
    node: Vec<SceneNode>,
}

#[derive(Debug, Serialize)]
struct SceneNode {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@type")]
    kind: &'static str,
    instance_geometry: InstanceGeometry,
}

#[derive(Debug, Serialize)]
struct InstanceGeometry {
    #[serde(rename = "@url")]
    url: String,
    bind_material: BindMaterial,
}

#[derive(Debug, Serialize)]
struct BindMaterial {
    technique_common: BindTechnique,
}

#[derive(Debug, Serialize)]
struct BindTechnique {
    instance_material: Vec<InstanceMaterial>,
}

#[derive(Debug, Serialize)]
struct InstanceMaterial {
    #[serde(rename = "@symbol")]
    symbol: String,
    #[serde(rename = "@target")]
    target: String,
}

#[derive(Debug, Serialize)]
struct SceneRef {
    instance_visual_scene: UrlRef,
}

/// XML id fragment: ASCII alphanumerics, `-` and `_`
fn sanitize_id(name: &str) -> String {
    let id: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if id.is_empty() {
        "unnamed".to_string()
    } else {
        id
    }
}

fn join<T: ToString>(values: impl IntoIterator<Item = T>) -> String {
    values
        .into_iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn float_source(id: String, values: Vec<f32>, params: &[&'static str]) -> Source {
    let stride = params.len();
    let count = values.len() / stride.max(1);
    Source {
        float_array: FloatArray {
            id: format!("{}-array", id),
            count: values.len(),
            values: join(values),
        },
        technique_common: SourceTechnique {
            accessor: Accessor {
                source: format!("#{}-array", id),
                count,
                stride,
                param: params
                    .iter()
                    .map(|&name| Param {
                        name,
                        kind: "float",
                    })
                    .collect(),
            },
        },
        id,
    }
}

fn material_id(material: &str) -> String {
    format!("{}-material", sanitize_id(material))
}

/// Merge every submesh into one geometry with a triangle block per submesh
///
/// Normals and UVs are only written when every submesh has them.
fn mesh_geometry(id: &str, name: &str, geometry: &MeshGeometry) -> Geometry {
    let submeshes = &geometry.submeshes;
    let with_normals = !submeshes.is_empty() && submeshes.iter().all(|s| !s.normals.is_empty());
    let with_uvs = !submeshes.is_empty() && submeshes.iter().all(|s| !s.uvs.is_empty());

    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut uvs = Vec::new();
    let mut triangles = Vec::with_capacity(submeshes.len());
    for submesh in submeshes {
        let base = (positions.len() / 3) as u32;
        positions.extend(submesh.positions.iter().flatten().copied());
        if with_normals {
            normals.extend(submesh.normals.iter().flatten().copied());
        }
        if with_uvs {
            uvs.extend(submesh.uvs.iter().flatten().copied());
        }
        triangles.push(submesh_triangles(id, submesh, base, with_normals, with_uvs));
    }

    let mut sources = vec![float_source(format!("{}-positions", id), positions, &["X", "Y", "Z"])];
    if with_normals {
        sources.push(float_source(format!("{}-normals", id), normals, &["X", "Y", "Z"]));
    }
    if with_uvs {
        sources.push(float_source(format!("{}-uvs", id), uvs, &["S", "T"]));
    }

    Geometry {
        id: format!("{}-geometry", id),
        name: name.to_string(),
        mesh: Mesh {
            source: sources,
            vertices: Vertices {
                id: format!("{}-vertices", id),
                input: vec![Input {
                    semantic: "POSITION",
                    source: format!("#{}-positions", id),
                    offset: None,
                    set: None,
                }],
            },
            triangles,
        },
    }
}

fn submesh_triangles(id: &str, submesh: &Submesh, base: u32, with_normals: bool, with_uvs: bool) -> Triangles {
    let mut inputs = vec![Input {
        semantic: "VERTEX",
        source: format!("#{}-vertices", id),
        offset: Some(0),
        set: None,
    }];
    if with_normals {
        inputs.push(Input {
            semantic: "NORMAL",
            source: format!("#{}-normals", id),
            offset: Some(0),
            set: None,
        });
    }
    if with_uvs {
        inputs.push(Input {
            semantic: "TEXCOORD",
            source: format!("#{}-uvs", id),
            offset: Some(0),
            set: Some(0),
        });
    }

    Triangles {
        material: material_id(&submesh.material),
        count: submesh.triangles.len(),
        input: inputs,
        p: join(submesh.triangles.iter().flatten().map(|i| i + base)),
    }
}

/// COLLADA document writer
#[derive(Debug, Clone)]
pub struct ColladaWriter {
    authoring_tool: String,
    author: Option<String>,
    up_axis: &'static str,
    created: DateTime<Utc>,
}

impl ColladaWriter {
    pub fn new(transform: CoordinateTransform) -> Self {
        Self {
            authoring_tool: format!("rig2jbeam {}", env!("CARGO_PKG_VERSION")),
            author: None,
            up_axis: transform.up_axis(),
            created: Utc::now(),
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_timestamp(mut self, created: DateTime<Utc>) -> Self {
        self.created = created;
        self
    }

    fn document(&self, geometry: &MeshGeometry) -> Collada {
        let base = sanitize_id(&geometry.name);
        let timestamp = self.created.to_rfc3339_opts(SecondsFormat::Secs, true);

        let materials = geometry.materials();
        let effect = materials
            .iter()
            .map(|m| Effect {
                id: format!("{}-effect", sanitize_id(m)),
                profile: ProfileCommon {
                    technique: ShadingTechnique {
                        sid: "common",
                        lambert: Lambert {
                            diffuse: Diffuse {
                                color: Color {
                                    sid: "diffuse",
                                    value: DIFFUSE,
                                },
                            },
                        },
                    },
                },
            })
            .collect();
        let material = materials
            .iter()
            .map(|m| Material {
                id: material_id(m),
                name: m.to_string(),
                instance_effect: UrlRef {
                    url: format!("#{}-effect", sanitize_id(m)),
                },
            })
            .collect();

        let instance_material = materials
            .iter()
            .map(|m| InstanceMaterial {
                symbol: material_id(m),
                target: format!("#{}", material_id(m)),
            })
            .collect();
        let node = SceneNode {
            id: base.clone(),
            name: geometry.name.clone(),
            kind: "NODE",
            instance_geometry: InstanceGeometry {
                url: format!("#{}-geometry", base),
                bind_material: BindMaterial {
                    technique_common: BindTechnique { instance_material },
                },
            },
        };
        let mesh = mesh_geometry(&base, &geometry.name, geometry);

        Collada {
            xmlns: COLLADA_NAMESPACE,
            version: COLLADA_VERSION,
            asset: Asset {
                contributor: Contributor {
                    author: self.author.clone(),
                    authoring_tool: self.authoring_tool.clone(),
                },
                created: timestamp.clone(),
                modified: timestamp,
                unit: Unit {
                    name: "meter",
                    meter: 1.0,
                },
                up_axis: self.up_axis,
            },
            library_effects: LibraryEffects { effect },
            library_materials: LibraryMaterials { material },
            library_geometries: LibraryGeometries {
                geometry: vec![mesh],
            },
            library_visual_scenes: LibraryVisualScenes {
                visual_scene: VisualScene {
                    id: "Scene",
                    name: "Scene",
                    node: vec![node],
                },
            },
            scene: SceneRef {
                instance_visual_scene: UrlRef {
                    url: "#Scene".to_string(),
                },
            },
        }
    }

    /// Serialize `geometry` to a COLLADA document
    pub fn to_xml(&self, geometry: &MeshGeometry) -> Result<String, ColladaError> {
        let xml = to_string(&self.document(geometry))
            .map_err(|e| ColladaError::SerializeError(e.to_string()))?;
        Ok(format!("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n{}", xml))
    }

    pub fn write(&self, geometry: &MeshGeometry, path: &Path) -> Result<(), ColladaError> {
        let xml = self.to_xml(geometry)?;
        std::fs::write(path, xml)?;
        debug!(path = %path.display(), submeshes = geometry.submeshes.len(), "Wrote COLLADA");
        Ok(())
    }
}

/// `.dae` file name for a resolved mesh name: `Wheel_001.mesh` -> `Wheel_001.dae`
pub fn collada_file_name(resolved: &str) -> String {
    format!("{}.dae", mesh_stem(resolved))
}
