//! Mesh snapshot consumed by the primitive pipeline
//!
//! A `SourceMesh` is a read-only copy of everything the exporter needs
//! from the host scene: per-vertex positions and weights, per-loop
//! (face corner) attributes, the loop-indexed triangle list, shape keys
//! and the transforms of the object and its armature. The pipeline never
//! reaches back into a live scene.

use anyhow::{Context, Result as AnyResult};
use glam::Mat4;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::error::{PrimitiveError, Result};

/// Host object type of the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObjectType {
    #[default]
    Mesh,
    Curve,
    Surface,
    Armature,
    Empty,
    Other,
}

/// Storage domain of a color attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorDomain {
    /// One color per vertex, broadcast to every incident loop
    Point,
    /// One color per loop
    Corner,
}

/// A named UV layer, one coordinate per loop
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UvLayer {
    pub name: String,
    pub uvs: Vec<[f32; 2]>,
}

/// A named RGBA color attribute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorAttribute {
    pub name: String,
    pub domain: ColorDomain,
    pub colors: Vec<[f32; 4]>,
}

/// Armature bound through an armature modifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArmatureRef {
    pub name: String,
    /// Column-major world matrix
    pub world_matrix: [[f32; 4]; 4],
    /// Bone names in skeleton order
    #[serde(default)]
    pub bones: Vec<String>,
}

impl ArmatureRef {
    pub fn world(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.world_matrix)
    }
}

/// One shape key (morph target)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapeKey {
    pub name: String,
    /// Index of the key this one is relative to (the basis points at itself)
    pub relative_key: usize,
    #[serde(default)]
    pub mute: bool,
    /// Full alternate vertex positions
    pub positions: Vec<[f32; 3]>,
    /// Corner normals evaluated with this key applied
    pub corner_normals: Vec<[f32; 3]>,
    /// Optional stored per-loop normal deltas
    #[serde(default)]
    pub normal_deltas: Option<Vec<[f32; 3]>>,
    /// Optional per-loop morph target color attribute
    #[serde(default)]
    pub target_colors: Option<Vec<[f32; 4]>>,
}

/// Read-only snapshot of a host mesh object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMesh {
    pub name: String,
    #[serde(default)]
    pub object_type: ObjectType,
    /// Column-major object world matrix
    #[serde(default = "identity_matrix")]
    pub world_matrix: [[f32; 4]; 4],

    /// Per-vertex positions (object space)
    pub positions: Vec<[f32; 3]>,

    /// Per-loop vertex index
    pub loop_vertices: Vec<u32>,
    /// Per-loop corner normals
    pub corner_normals: Vec<[f32; 3]>,
    /// Per-loop tangents, when the host computed them
    #[serde(default)]
    pub tangents: Option<Vec<[f32; 3]>>,
    /// Per-loop bitangent signs (+1 / -1)
    #[serde(default)]
    pub bitangent_signs: Option<Vec<i32>>,

    #[serde(default)]
    pub uv_layers: Vec<UvLayer>,
    #[serde(default)]
    pub active_uv_layer: Option<usize>,

    #[serde(default)]
    pub color_attributes: Vec<ColorAttribute>,
    #[serde(default)]
    pub render_color_index: Option<usize>,

    /// Triangles as loop-index triples
    pub triangles: Vec<[u32; 3]>,

    /// Vertex group names, indexed by group slot
    #[serde(default)]
    pub vertex_groups: Vec<String>,
    /// Per-vertex (group slot, weight) pairs
    #[serde(default)]
    pub vertex_weights: Vec<Vec<(u32, f32)>>,

    /// Armature modifiers with a bound armature object
    #[serde(default)]
    pub armatures: Vec<ArmatureRef>,

    #[serde(default)]
    pub shape_keys: Vec<ShapeKey>,
}

fn identity_matrix() -> [[f32; 4]; 4] {
    Mat4::IDENTITY.to_cols_array_2d()
}

impl SourceMesh {
    /// Load a snapshot from a JSON file
    pub fn load(path: &Path) -> AnyResult<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read mesh snapshot: {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse mesh snapshot: {}", path.display()))
    }

    /// Parse a snapshot from JSON text
    pub fn parse(content: &str) -> AnyResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn loop_count(&self) -> usize {
        self.loop_vertices.len()
    }

    pub fn world(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.world_matrix)
    }

    pub fn active_uv(&self) -> Option<&UvLayer> {
        self.active_uv_layer.and_then(|i| self.uv_layers.get(i))
    }

    pub fn render_color(&self) -> Option<&ColorAttribute> {
        self.render_color_index
            .and_then(|i| self.color_attributes.get(i))
    }

    /// A shape key is exportable when it is not its own reference and not muted
    pub fn is_exportable_key(&self, index: usize) -> bool {
        self.shape_keys
            .get(index)
            .is_some_and(|k| k.relative_key != index && !k.mute)
    }

    pub fn exportable_keys(&self) -> Vec<usize> {
        (0..self.shape_keys.len())
            .filter(|&i| self.is_exportable_key(i))
            .collect()
    }

    /// Slot index of a vertex group by name
    pub fn find_group(&self, name: &str) -> Option<usize> {
        self.vertex_groups.iter().position(|g| g == name)
    }

    /// Check array lengths and index ranges.
    pub fn validate(&self) -> Result<()> {
        let loops = self.loop_count();
        let verts = self.vertex_count();

        let check_len = |what: &str, len: usize, expected: usize| {
            if len != expected {
                Err(PrimitiveError::InvalidSource(format!(
                    "{} has {} entries, expected {}",
                    what, len, expected
                )))
            } else {
                Ok(())
            }
        };

        check_len("corner_normals", self.corner_normals.len(), loops)?;
        if let Some(t) = &self.tangents {
            check_len("tangents", t.len(), loops)?;
        }
        if let Some(s) = &self.bitangent_signs {
            check_len("bitangent_signs", s.len(), loops)?;
        }
        for layer in &self.uv_layers {
            check_len(&format!("uv layer '{}'", layer.name), layer.uvs.len(), loops)?;
        }
        for attr in &self.color_attributes {
            let expected = match attr.domain {
                ColorDomain::Point => verts,
                ColorDomain::Corner => loops,
            };
            check_len(&format!("color attribute '{}'", attr.name), attr.colors.len(), expected)?;
        }
        if !self.vertex_weights.is_empty() {
            check_len("vertex_weights", self.vertex_weights.len(), verts)?;
        }
        for (i, key) in self.shape_keys.iter().enumerate() {
            if key.relative_key >= self.shape_keys.len() {
                return Err(PrimitiveError::InvalidSource(format!(
                    "shape key '{}' references missing key {}",
                    key.name, key.relative_key
                )));
            }
            check_len(&format!("shape key {} positions", i), key.positions.len(), verts)?;
            check_len(&format!("shape key {} normals", i), key.corner_normals.len(), loops)?;
            if let Some(d) = &key.normal_deltas {
                check_len(&format!("shape key {} normal deltas", i), d.len(), loops)?;
            }
            if let Some(c) = &key.target_colors {
                check_len(&format!("shape key {} target colors", i), c.len(), loops)?;
            }
        }

        if let Some((l, &v)) = self
            .loop_vertices
            .iter()
            .enumerate()
            .find(|(_, &v)| v as usize >= verts)
        {
            return Err(PrimitiveError::InvalidSource(format!(
                "loop {} references vertex {} of {}",
                l, v, verts
            )));
        }
        if let Some((t, tri)) = self
            .triangles
            .iter()
            .enumerate()
            .find(|(_, tri)| tri.iter().any(|&l| l as usize >= loops))
        {
            return Err(PrimitiveError::InvalidSource(format!(
                "triangle {} references loops {:?} of {}",
                t, tri, loops
            )));
        }
        for (v, weights) in self.vertex_weights.iter().enumerate() {
            if let Some(&(g, _)) = weights
                .iter()
                .find(|(g, _)| *g as usize >= self.vertex_groups.len())
            {
                return Err(PrimitiveError::InvalidSource(format!(
                    "vertex {} references group {} of {}",
                    v,
                    g,
                    self.vertex_groups.len()
                )));
            }
        }

        Ok(())
    }
}

/// Reasons a snapshot is not ready for export
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreflightIssue {
    #[error("object is not a mesh")]
    NotAMesh,
    #[error("object is not triangulated")]
    NotTriangulated,
    #[error("object has no active UV data")]
    NoActiveUv,
    #[error("no shape keys found on mesh")]
    NoShapeKeys,
    #[error("no exportable shape keys found on mesh")]
    NoExportableShapeKeys,
}

/// Cheap readiness check run before a full gather.
pub fn check_primitive(
    mesh: &SourceMesh,
    gather_tangents: bool,
    gather_morphs: bool,
) -> std::result::Result<(), PreflightIssue> {
    if mesh.object_type != ObjectType::Mesh {
        return Err(PreflightIssue::NotAMesh);
    }

    if gather_tangents && mesh.triangles.len() != mesh.loop_count() / 3 {
        return Err(PreflightIssue::NotTriangulated);
    }

    if mesh.active_uv().is_none() {
        return Err(PreflightIssue::NoActiveUv);
    }

    if gather_morphs {
        if mesh.shape_keys.is_empty() {
            return Err(PreflightIssue::NoShapeKeys);
        }
        if mesh.exportable_keys().is_empty() {
            return Err(PreflightIssue::NoExportableShapeKeys);
        }
    }

    Ok(())
}
