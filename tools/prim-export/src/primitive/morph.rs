//! Morph target deltas and normal patching
//!
//! Morph tangents are never recomputed from the shape key geometry. The
//! base tangent is carried through the shortest-arc rotation between the
//! base normal and the morph normal, which keeps it orthogonal to the
//! morph normal.

use glam::Vec3;

use super::extract::{prepare_normal, Scan};
use super::space::SpaceTransform;
use super::types::{Gathered, MorphDeltaPatch, NormalPatch, DEFAULT_MORPH_TARGET_COLOR};
use super::Primitive;
use crate::error::{PrimitiveError, Result};
use crate::math::{bounded_sub, normalize_or, transport_tangent};
use crate::options::ExportOptions;
use crate::source::SourceMesh;

/// Per-shape-key data, one entry per atomic vertex in each inner array
#[derive(Debug, Clone, Default)]
pub struct MorphTargets {
    pub names: Vec<String>,
    pub position_deltas: Vec<Vec<Vec3>>,
    pub normals: Vec<Vec<Vec3>>,
    pub normal_deltas: Vec<Vec<Vec3>>,
    pub tangents: Vec<Vec<Vec3>>,
    pub tangent_deltas: Vec<Vec<Vec3>>,
    /// RGB, already scaled for export
    pub target_colors: Vec<Vec<[f32; 3]>>,
}

impl MorphTargets {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Index of a shape key by name
    pub fn find(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// Morph normals and normal deltas of one shape key, per loop
pub(crate) struct LoopMorphNormals {
    pub normals: Vec<Vec3>,
    pub deltas: Vec<Vec3>,
}

/// Corner normals of shape key `key` in export space, plus their deltas
/// against `base_normals`.
///
/// With `use_morph_normal_attrs` and stored deltas on the key, the morph
/// normal is rebuilt as reference normal + delta and the stored delta is
/// kept as is.
pub(crate) fn morph_normals(
    mesh: &SourceMesh,
    key: usize,
    base_raw: &[[f32; 3]],
    base_normals: &[Vec3],
    options: &ExportOptions,
    transform: &SpaceTransform,
) -> LoopMorphNormals {
    let shape = &mesh.shape_keys[key];
    let precision = options.normal_tangent_round_precision;

    let stored = shape
        .normal_deltas
        .as_ref()
        .filter(|_| options.use_morph_normal_attrs);

    match stored {
        Some(deltas) => {
            tracing::debug!("Using stored normal deltas for shape key: {}", shape.name);
            let normals = base_raw
                .iter()
                .zip(deltas)
                .map(|(n, d)| {
                    prepare_normal(Vec3::from_array(*n) + Vec3::from_array(*d), precision, transform)
                })
                .collect();
            LoopMorphNormals {
                normals,
                deltas: deltas.iter().map(|d| Vec3::from_array(*d)).collect(),
            }
        }
        None => {
            let normals: Vec<Vec3> = shape
                .corner_normals
                .iter()
                .map(|n| prepare_normal(Vec3::from_array(*n), precision, transform))
                .collect();
            let deltas = base_normals
                .iter()
                .zip(&normals)
                .map(|(base, morph)| bounded_sub(*base, *morph))
                .collect();
            LoopMorphNormals { normals, deltas }
        }
    }
}

/// Tangent delta in the signed basis of the vertex
#[inline]
pub(crate) fn signed_tangent_delta(base: Vec3, morph: Vec3, sign: i32) -> Vec3 {
    bounded_sub(base, morph) * sign as f32
}

/// Transport base tangents onto morph normals.
///
/// Returns the morph tangents and their signed deltas.
pub(crate) fn morph_tangents(
    base_normals: &[Vec3],
    base_tangents: &[Vec3],
    signs: &[i32],
    morph_normals: &[Vec3],
) -> (Vec<Vec3>, Vec<Vec3>) {
    let tangents: Vec<Vec3> = base_tangents
        .iter()
        .zip(base_normals.iter().zip(morph_normals))
        .map(|(t, (n, m))| transport_tangent(*t, *n, *m))
        .collect();
    let deltas = base_tangents
        .iter()
        .zip(&tangents)
        .zip(signs)
        .map(|((base, morph), &sign)| signed_tangent_delta(*base, *morph, sign))
        .collect();
    (tangents, deltas)
}

/// Per-vertex position delta of shape key `key` in export space
pub(crate) fn position_deltas(
    mesh: &SourceMesh,
    key: usize,
    base_positions: &[Vec3],
    transform: &SpaceTransform,
) -> Vec<Vec3> {
    mesh.shape_keys[key]
        .positions
        .iter()
        .zip(base_positions)
        .map(|(p, base)| transform.position(Vec3::from_array(*p)) - *base)
        .collect()
}

/// Per-loop target color of shape key `key`, unscaled
pub(crate) fn target_colors(mesh: &SourceMesh, key: usize, use_attrs: bool) -> Vec<[f32; 3]> {
    let shape = &mesh.shape_keys[key];
    match shape.target_colors.as_ref().filter(|_| use_attrs) {
        Some(colors) => {
            tracing::debug!("Found morph target color attribute for shape key: {}", shape.name);
            colors.iter().map(|c| [c[0], c[1], c[2]]).collect()
        }
        None => vec![DEFAULT_MORPH_TARGET_COLOR; mesh.loop_count()],
    }
}

/// Shape key names in export order
pub(crate) fn shape_key_names(mesh: &SourceMesh, scan: &Scan) -> Vec<String> {
    scan.key_blocks
        .iter()
        .map(|&k| mesh.shape_keys[k].name.clone())
        .collect()
}

impl Primitive {
    fn check_patch(&self, patch: &NormalPatch) -> Result<()> {
        let atomic_count = self.atomic_count();
        if patch.indices.len() != patch.normals.len()
            || patch.indices.iter().any(|&i| i >= atomic_count)
        {
            return Err(PrimitiveError::PatchLength {
                indices: patch.indices.len(),
                values: patch.normals.len(),
                atomic_count,
            });
        }
        Ok(())
    }

    /// Replace normals of a subset of atomic vertices.
    ///
    /// Tangents of exactly those vertices are rotated by the shortest arc
    /// from the old normal to the new one.
    pub fn patch_normals(&mut self, patch: &NormalPatch) -> Result<()> {
        self.check_patch(patch)?;
        let has_tangents = self.gathered.contains(Gathered::TANGENTS);

        for (&i, new) in patch.indices.iter().zip(&patch.normals) {
            let old = self.normals[i];
            let new = normalize_or(Vec3::from_array(*new), old);
            self.normals[i] = new;
            if has_tangents {
                self.tangents[i] = transport_tangent(self.tangents[i], old, new);
            }
        }
        Ok(())
    }

    /// Replace morph normals of a subset of atomic vertices for one shape key.
    ///
    /// Normal deltas are recomputed against the base normals, morph
    /// tangents are rotated from the old morph normal to the new one and
    /// their signed deltas recomputed. Returns the new deltas of the
    /// patched vertices.
    pub fn patch_morph_normals(
        &mut self,
        morph_index: usize,
        patch: &NormalPatch,
    ) -> Result<MorphDeltaPatch> {
        if !self.gathered.contains(Gathered::MORPH_NORMALS) {
            return Err(PrimitiveError::MorphUncalculated);
        }
        if morph_index >= self.morphs.len() {
            return Err(PrimitiveError::MorphIndexOutOfRange {
                index: morph_index,
                count: self.morphs.len(),
            });
        }
        self.check_patch(patch)?;
        let has_tangents = self.gathered.contains(Gathered::MORPH_TANGENTS);

        let mut result = MorphDeltaPatch {
            morph_index,
            indices: patch.indices.clone(),
            normal_deltas: Vec::with_capacity(patch.indices.len()),
            tangent_deltas: Vec::new(),
        };

        let morphs = &mut self.morphs;
        for (&i, new) in patch.indices.iter().zip(&patch.normals) {
            let old = morphs.normals[morph_index][i];
            let new = normalize_or(Vec3::from_array(*new), old);
            morphs.normals[morph_index][i] = new;

            let normal_delta = bounded_sub(self.normals[i], new);
            morphs.normal_deltas[morph_index][i] = normal_delta;
            result.normal_deltas.push(normal_delta.to_array());

            if has_tangents {
                let tangent = transport_tangent(morphs.tangents[morph_index][i], old, new);
                morphs.tangents[morph_index][i] = tangent;
                let delta = signed_tangent_delta(self.tangents[i], tangent, self.bitangent_signs[i]);
                morphs.tangent_deltas[morph_index][i] = delta;
                result.tangent_deltas.push(delta.to_array());
            }
        }

        Ok(result)
    }
}
