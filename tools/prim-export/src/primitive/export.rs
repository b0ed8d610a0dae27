//! Mesh and morph output shapes
//!
//! Records own their data and serialize with serde. Buffers borrow the
//! primitive's arrays for zero-copy writing.

use glam::Vec3;
use serde::Serialize;

use super::types::{Gathered, WeightEntry, TANGENT_FLIPPED_TAG};
use super::weights::{quantize_weights, QuantizedWeights};
use super::Primitive;
use crate::error::{PrimitiveError, Result};

/// Weight lists as exported, float or quantized
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RecordWeights {
    Float(Vec<Vec<WeightEntry>>),
    Quantized(QuantizedWeights),
}

/// Fully materialized mesh data for text serialization
#[derive(Debug, Clone, Serialize)]
pub struct MeshRecord {
    pub max_border: f32,
    pub num_verts: usize,
    /// Flattened xyz triples
    pub positions_raw: Vec<f32>,
    pub num_indices: usize,
    pub vertex_indices_raw: Vec<u32>,
    pub normals: Vec<[f32; 3]>,
    pub uv_coords: Vec<[f32; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uv_coords_2: Option<Vec<[f32; 2]>>,
    /// Empty when the mesh has no color attribute
    pub vertex_color: Vec<[f32; 4]>,
    pub vertex_group_names: Vec<String>,
    pub vertex_weights: RecordWeights,
    pub smooth_group: Vec<u32>,
    /// Tangent xyz plus a handedness tag in `w`
    pub tangents: Vec<[f32; 4]>,
}

/// Mesh arrays borrowed for flat binary output
#[derive(Debug, Clone, Copy)]
pub struct MeshBuffers<'a> {
    pub max_border: f32,
    pub num_verts: u32,
    pub num_indices: u32,
    pub vertex_group_names: &'a [String],
    pub vertex_weights: &'a [Vec<WeightEntry>],
    pub positions: &'a [Vec3],
    pub indices: &'a [u32],
    pub normals: &'a [Vec3],
    pub uv1: &'a [[f32; 2]],
    pub uv2: Option<&'a [[f32; 2]]>,
    pub color: Option<&'a [[f32; 4]]>,
    pub tangents: &'a [Vec3],
    pub bitangent_signs: &'a [i32],
}

/// Morph target data for text serialization
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MorphRecord {
    pub num_vertices: usize,
    pub shape_keys: Vec<String>,
    pub delta_positions: Vec<Vec<[f32; 3]>>,
    pub target_colors: Vec<Vec<[f32; 3]>>,
    pub delta_normals: Vec<Vec<[f32; 3]>>,
    /// Empty when tangents were not gathered
    pub delta_tangents: Vec<Vec<[f32; 3]>>,
}

/// Morph arrays borrowed for flat binary output
#[derive(Debug, Clone, Copy)]
pub struct MorphBuffers<'a> {
    pub num_vertices: u32,
    pub shape_keys: &'a [String],
    pub delta_positions: &'a [Vec<Vec3>],
    pub target_colors: &'a [Vec<[f32; 3]>],
    pub delta_normals: &'a [Vec<Vec3>],
    pub delta_tangents: &'a [Vec<Vec3>],
}

fn to_arrays(v: &[Vec3]) -> Vec<[f32; 3]> {
    v.iter().map(|x| x.to_array()).collect()
}

impl Primitive {
    fn require_tangents(&self) -> Result<()> {
        if !self.gathered.contains(Gathered::TANGENTS) {
            return Err(PrimitiveError::Ungathered("tangents"));
        }
        if !self.gathered.contains(Gathered::BITANGENTS) {
            return Err(PrimitiveError::Ungathered("bitangent signs"));
        }
        Ok(())
    }

    fn require_morphs(&self) -> Result<()> {
        if !self.options.gather_morph_data {
            return Err(PrimitiveError::MorphUncalculated);
        }
        Ok(())
    }

    /// Build the nested mesh record. Requires tangents.
    pub fn to_mesh_record(&self) -> Result<MeshRecord> {
        self.require_tangents()?;

        let vertex_weights = match self.options.quantize_bytes {
            Some(bytes) => RecordWeights::Quantized(quantize_weights(&self.weights.weights, bytes)),
            None => RecordWeights::Float(self.weights.weights.clone()),
        };

        let tangents = self
            .tangents
            .iter()
            .zip(&self.bitangent_signs)
            .map(|(t, &sign)| {
                let tag = if sign < 0 { TANGENT_FLIPPED_TAG } else { 0.0 };
                [t.x, t.y, t.z, tag]
            })
            .collect();

        Ok(MeshRecord {
            max_border: self.options.max_border,
            num_verts: self.atomic_count(),
            positions_raw: self.positions.iter().flat_map(|p| p.to_array()).collect(),
            num_indices: self.triangles.len(),
            vertex_indices_raw: self.triangles.clone(),
            normals: to_arrays(&self.normals),
            uv_coords: self.uv.clone(),
            uv_coords_2: self
                .gathered
                .contains(Gathered::UV2)
                .then(|| self.uv2.clone()),
            vertex_color: if self.gathered.contains(Gathered::COLORS) {
                self.colors.clone()
            } else {
                Vec::new()
            },
            vertex_group_names: self.weights.group_names.clone(),
            vertex_weights,
            smooth_group: Vec::new(),
            tangents,
        })
    }

    /// Borrow the mesh arrays for flat output. Requires tangents.
    pub fn to_mesh_buffers(&self) -> Result<MeshBuffers<'_>> {
        self.require_tangents()?;

        Ok(MeshBuffers {
            max_border: self.options.max_border,
            num_verts: self.atomic_count() as u32,
            num_indices: self.triangles.len() as u32,
            vertex_group_names: &self.weights.group_names,
            vertex_weights: &self.weights.weights,
            positions: &self.positions,
            indices: &self.triangles,
            normals: &self.normals,
            uv1: &self.uv,
            uv2: self
                .gathered
                .contains(Gathered::UV2)
                .then_some(self.uv2.as_slice()),
            color: self
                .gathered
                .contains(Gathered::COLORS)
                .then_some(self.colors.as_slice()),
            tangents: &self.tangents,
            bitangent_signs: &self.bitangent_signs,
        })
    }

    /// Build the morph record. Requires morph gathering.
    pub fn to_morph_record(&self) -> Result<MorphRecord> {
        self.require_morphs()?;
        let morphs = &self.morphs;

        let delta_tangents = if self.options.gather_tangents {
            morphs.tangent_deltas.iter().map(|d| to_arrays(d)).collect()
        } else {
            Vec::new()
        };

        Ok(MorphRecord {
            num_vertices: self.atomic_count(),
            shape_keys: morphs.names.clone(),
            delta_positions: morphs.position_deltas.iter().map(|d| to_arrays(d)).collect(),
            target_colors: morphs.target_colors.clone(),
            delta_normals: morphs.normal_deltas.iter().map(|d| to_arrays(d)).collect(),
            delta_tangents,
        })
    }

    /// Borrow the morph arrays for flat output. Requires morph tangents.
    pub fn to_morph_buffers(&self) -> Result<MorphBuffers<'_>> {
        self.require_morphs()?;
        if !self.gathered.contains(Gathered::MORPH_TANGENTS) {
            return Err(PrimitiveError::Ungathered("morph tangents"));
        }
        let morphs = &self.morphs;

        Ok(MorphBuffers {
            num_vertices: self.atomic_count() as u32,
            shape_keys: &morphs.names,
            delta_positions: &morphs.position_deltas,
            target_colors: &morphs.target_colors,
            delta_normals: &morphs.normal_deltas,
            delta_tangents: &morphs.tangent_deltas,
        })
    }
}
