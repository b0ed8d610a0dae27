//! Primitive gathering: mesh snapshot to GPU-ready atomic vertices
//!
//! A `Primitive` is built in one pass with a fixed stage order:
//! scan, per-loop attributes (normals, tangents, morph normals),
//! deduplication, positions, weights, morph colors, triangles. All
//! arrays are owned by the primitive and indexed by atomic vertex.

mod atomic;
mod export;
mod extract;
mod morph;
mod space;
mod types;
mod weights;

pub use atomic::{deduplicate, refine_normal_duplicates, AtomicSet};
pub use export::{MeshBuffers, MeshRecord, MorphBuffers, MorphRecord, RecordWeights};
pub use morph::MorphTargets;
pub use space::SpaceTransform;
pub use types::{
    AtomicVertex, Gathered, MorphDeltaPatch, NormalPatch, WeightEntry, MORPH_TARGET_COLOR_SCALE,
    TANGENT_FLIPPED_TAG,
};
pub use weights::{
    quantize_weights, remap_to_skeleton, remap_to_subset, QuantizedWeights, VertexWeights,
};

use glam::Vec3;

use crate::error::{PrimitiveError, Result};
use crate::options::ExportOptions;
use crate::source::{ObjectType, SourceMesh};
use extract::prepare_normal;

/// Deduplicated vertex, index, weight and morph data for one mesh
#[derive(Debug, Clone)]
pub struct Primitive {
    name: String,
    /// Effective options, with soft-failed features switched off
    options: ExportOptions,
    gathered: Gathered,
    atomics: AtomicSet,

    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    uv: Vec<[f32; 2]>,
    uv2: Vec<[f32; 2]>,
    colors: Vec<[f32; 4]>,
    tangents: Vec<Vec3>,
    bitangent_signs: Vec<i32>,

    weights: VertexWeights,
    morphs: MorphTargets,
    triangles: Vec<u32>,
}

impl Primitive {
    /// Gather everything the options ask for from `mesh`.
    pub fn gather(mesh: &SourceMesh, mut options: ExportOptions) -> Result<Self> {
        if mesh.object_type != ObjectType::Mesh {
            return Err(PrimitiveError::MeshType(format!("{:?}", mesh.object_type)));
        }
        mesh.validate()?;

        tracing::info!("Gathering primitive: {}", mesh.name);

        // Scan
        let scan = extract::scan(mesh, &mut options)?;
        let transform = SpaceTransform::new(
            mesh.world(),
            scan.armature.map(|a| mesh.armatures[a].world()),
            options.use_global_positions,
        );
        let precision = options.normal_tangent_round_precision;
        let mut gathered = Gathered::default();

        // Per-loop attributes
        let base_raw = extract::base_corner_normals(mesh, &scan);
        let loop_normals: Vec<Vec3> = base_raw
            .iter()
            .map(|n| prepare_normal(Vec3::from_array(*n), precision, &transform))
            .collect();
        gathered.insert(Gathered::NORMALS);

        let loop_morph_normals: Vec<morph::LoopMorphNormals> = if options.gather_morph_data {
            gathered.insert(Gathered::MORPH_NORMALS);
            scan.key_blocks
                .iter()
                .map(|&k| morph::morph_normals(mesh, k, base_raw, &loop_normals, &options, &transform))
                .collect()
        } else {
            Vec::new()
        };

        let (loop_tangents, loop_signs) = if options.gather_tangents {
            gathered.insert(Gathered::TANGENTS | Gathered::BITANGENTS);
            extract::gather_tangents(mesh, &scan, base_raw, precision, &transform)
        } else {
            (Vec::new(), Vec::new())
        };

        let loop_morph_tangents: Vec<(Vec<Vec3>, Vec<Vec3>)> =
            if options.gather_tangents && options.gather_morph_data {
                gathered.insert(Gathered::MORPH_TANGENTS);
                loop_morph_normals
                    .iter()
                    .map(|m| morph::morph_tangents(&loop_normals, &loop_tangents, &loop_signs, &m.normals))
                    .collect()
            } else {
                Vec::new()
            };

        let records = extract::gather_records(mesh, &scan, &loop_normals);
        gathered.insert(Gathered::UV);
        if scan.second_uv_layer.is_some() {
            gathered.insert(Gathered::UV2);
        }
        if scan.color.is_some() {
            gathered.insert(Gathered::COLORS);
        }

        // Deduplicate
        let atomics = atomic::deduplicate(
            &records,
            options.normal_refine_threshold,
            options.atomic_max_number,
        )?;

        let by_loop = |values: &[Vec3]| -> Vec<Vec3> {
            atomics
                .atomic_to_loop
                .iter()
                .map(|&l| values[l as usize])
                .collect()
        };
        let by_vertex = |values: &[Vec3]| -> Vec<Vec3> {
            atomics
                .vertices
                .iter()
                .map(|a| values[a.vertex_index as usize])
                .collect()
        };

        let normals = atomics
            .vertices
            .iter()
            .map(|a| Vec3::from_array(a.normal))
            .collect();
        let uv = atomics.vertices.iter().map(|a| a.uv).collect();
        let uv2 = if gathered.contains(Gathered::UV2) {
            atomics.vertices.iter().map(|a| a.uv2).collect()
        } else {
            Vec::new()
        };
        let colors = if gathered.contains(Gathered::COLORS) {
            atomics.vertices.iter().map(|a| a.color).collect()
        } else {
            Vec::new()
        };
        let (tangents, bitangent_signs) = if gathered.contains(Gathered::TANGENTS) {
            let signs = atomics
                .atomic_to_loop
                .iter()
                .map(|&l| loop_signs[l as usize])
                .collect();
            (by_loop(&loop_tangents), signs)
        } else {
            (Vec::new(), Vec::new())
        };

        // Positions
        let raw_positions: Vec<Vec3> = mesh
            .positions
            .iter()
            .map(|p| transform.position(Vec3::from_array(*p)))
            .collect();
        let positions = by_vertex(&raw_positions);
        gathered.insert(Gathered::POSITION);

        let mut morphs = MorphTargets::default();
        if options.gather_morph_data {
            morphs.names = morph::shape_key_names(mesh, &scan);
            for (i, &k) in scan.key_blocks.iter().enumerate() {
                let deltas = morph::position_deltas(mesh, k, &raw_positions, &transform);
                morphs.position_deltas.push(by_vertex(&deltas));
                morphs.normals.push(by_loop(&loop_morph_normals[i].normals));
                morphs.normal_deltas.push(by_loop(&loop_morph_normals[i].deltas));
                if let Some((t, d)) = loop_morph_tangents.get(i) {
                    morphs.tangents.push(by_loop(t));
                    morphs.tangent_deltas.push(by_loop(d));
                }
            }
        }

        // Weights
        let weights = if options.gather_weights_data {
            gathered.insert(Gathered::WEIGHTS);
            weights::gather_weights(
                mesh,
                &scan,
                &options,
                atomics.vertices.iter().map(|a| a.vertex_index),
            )
        } else {
            VertexWeights::default()
        };

        // Morph colors
        if options.gather_morph_data {
            for &k in &scan.key_blocks {
                let colors = morph::target_colors(mesh, k, options.use_morph_color_attrs);
                morphs.target_colors.push(
                    atomics
                        .atomic_to_loop
                        .iter()
                        .map(|&l| colors[l as usize].map(|c| c * MORPH_TARGET_COLOR_SCALE))
                        .collect(),
                );
            }
            gathered.insert(Gathered::MORPH_COLORS);
        }

        // Triangles
        let triangles: Vec<u32> = mesh
            .triangles
            .iter()
            .flatten()
            .map(|&l| atomics.loop_to_atomic[l as usize])
            .collect();
        gathered.insert(Gathered::TRIANGLES);
        tracing::info!("Final triangles count: {}", triangles.len());

        Ok(Self {
            name: mesh.name.clone(),
            options,
            gathered,
            atomics,
            positions,
            normals,
            uv,
            uv2,
            colors,
            tangents,
            bitangent_signs,
            weights,
            morphs,
            triangles,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Options after soft-failed features were disabled
    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    pub fn gathered(&self) -> Gathered {
        self.gathered
    }

    pub fn atomic_count(&self) -> usize {
        self.atomics.len()
    }

    pub fn atomics(&self) -> &AtomicSet {
        &self.atomics
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub(crate) fn positions_mut(&mut self) -> &mut [Vec3] {
        &mut self.positions
    }

    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    pub fn uv(&self) -> &[[f32; 2]] {
        &self.uv
    }

    pub fn uv2(&self) -> Option<&[[f32; 2]]> {
        self.gathered
            .contains(Gathered::UV2)
            .then_some(self.uv2.as_slice())
    }

    pub fn colors(&self) -> Option<&[[f32; 4]]> {
        self.gathered
            .contains(Gathered::COLORS)
            .then_some(self.colors.as_slice())
    }

    pub fn tangents(&self) -> &[Vec3] {
        &self.tangents
    }

    pub fn bitangent_signs(&self) -> &[i32] {
        &self.bitangent_signs
    }

    pub fn weights(&self) -> &VertexWeights {
        &self.weights
    }

    pub fn morphs(&self) -> &MorphTargets {
        &self.morphs
    }

    pub(crate) fn morph_position_deltas_mut(&mut self, morph_index: usize) -> Option<&mut [Vec3]> {
        self.morphs
            .position_deltas
            .get_mut(morph_index)
            .map(Vec::as_mut_slice)
    }

    /// Triangle list as flat atomic indices
    pub fn triangles(&self) -> &[u32] {
        &self.triangles
    }
}
