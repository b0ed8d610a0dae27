//! Seam stitching between separately exported primitives
//!
//! A `SeamTarget` holds a static kd-tree over a target primitive's atomic
//! positions. Source vertices within `copy_range` of their nearest target
//! vertex take (or blend towards) the target's positions, normals or
//! morph normals. The target is borrowed for the lifetime of the index,
//! so its positions cannot change underneath it.

use glam::Vec3;
use kdtree::distance::squared_euclidean;
use kdtree::KdTree;

use crate::error::{PrimitiveError, Result};
use crate::math::normalize_or;
use crate::primitive::{Gathered, NormalPatch, Primitive};

/// Default snapping distance, in export space units
pub const DEFAULT_COPY_RANGE: f32 = 0.005;

/// Nearest-neighbour index over a target primitive
pub struct SeamTarget<'a> {
    primitive: &'a Primitive,
    tree: KdTree<f32, usize, [f32; 3]>,
}

impl<'a> SeamTarget<'a> {
    /// Build the index over the target's atomic positions.
    pub fn new(primitive: &'a Primitive) -> Result<Self> {
        require(primitive, Gathered::POSITION, "positions")?;

        let positions = primitive.positions();
        let mut tree = KdTree::with_capacity(3, positions.len().max(1));
        for (i, p) in positions.iter().enumerate() {
            tree.add(p.to_array(), i)
                .map_err(|e| PrimitiveError::SpatialIndex(format!("{:?}", e)))?;
        }

        Ok(Self { primitive, tree })
    }

    pub fn primitive(&self) -> &Primitive {
        self.primitive
    }

    /// Pairs of (source index, nearest target index) closer than `copy_range`
    fn matches(&self, positions: &[Vec3], copy_range: f32) -> Result<Vec<(usize, usize)>> {
        let range_sq = copy_range * copy_range;
        let mut pairs = Vec::new();

        if self.primitive.atomic_count() == 0 {
            return Ok(pairs);
        }

        for (i, p) in positions.iter().enumerate() {
            let nearest = self
                .tree
                .nearest(&p.to_array(), 1, &squared_euclidean)
                .map_err(|e| PrimitiveError::SpatialIndex(format!("{:?}", e)))?;
            if let Some(&(dist_sq, &j)) = nearest.first() {
                if dist_sq < range_sq {
                    pairs.push((i, j));
                }
            }
        }

        tracing::info!("Snapped verts: {}", pairs.len());
        Ok(pairs)
    }
}

fn require(primitive: &Primitive, what: Gathered, name: &'static str) -> Result<()> {
    if primitive.gathered().contains(what) {
        Ok(())
    } else {
        Err(PrimitiveError::Ungathered(name))
    }
}

/// Move source positions onto nearby target positions.
///
/// `lerp = 1` snaps fully, `lerp = 0` leaves the source untouched.
/// Returns the number of snapped source vertices.
pub fn snap_positions(
    src: &mut Primitive,
    target: &SeamTarget<'_>,
    copy_range: f32,
    lerp: f32,
) -> Result<usize> {
    require(src, Gathered::POSITION, "positions")?;

    let pairs = target.matches(src.positions(), copy_range)?;
    let target_positions = target.primitive().positions();
    let positions = src.positions_mut();
    for &(i, j) in &pairs {
        positions[i] = positions[i].lerp(target_positions[j], lerp);
    }

    Ok(pairs.len())
}

/// Copy target normals onto nearby source vertices.
///
/// Tangents of the changed vertices follow their normals. Returns the
/// number of snapped source vertices.
pub fn copy_normals_at_seam(
    src: &mut Primitive,
    target: &SeamTarget<'_>,
    copy_range: f32,
    lerp: f32,
) -> Result<usize> {
    require(src, Gathered::POSITION, "positions")?;
    require(target.primitive(), Gathered::NORMALS, "normals")?;
    require(src, Gathered::NORMALS, "normals")?;

    let pairs = target.matches(src.positions(), copy_range)?;
    let target_normals = target.primitive().normals();
    let patch = blend_patch(&pairs, src.normals(), target_normals, lerp);
    src.patch_normals(&patch)?;

    Ok(pairs.len())
}

/// Copy morph normals of shape keys shared by name onto nearby source
/// vertices, optionally blending morph position deltas too.
///
/// Returns the number of snapped source vertices.
pub fn copy_morph_normals_at_seam(
    src: &mut Primitive,
    target: &SeamTarget<'_>,
    copy_range: f32,
    snap_delta_positions: bool,
    lerp: f32,
    lerp_delta_positions: f32,
) -> Result<usize> {
    require(src, Gathered::POSITION, "positions")?;
    require(src, Gathered::MORPH_NORMALS, "morph normals")?;
    require(target.primitive(), Gathered::MORPH_NORMALS, "morph normals")?;

    let pairs = target.matches(src.positions(), copy_range)?;
    let target_morphs = target.primitive().morphs();

    let common: Vec<(usize, usize)> = src
        .morphs()
        .names
        .iter()
        .enumerate()
        .filter_map(|(s, name)| target_morphs.find(name).map(|t| (s, t)))
        .collect();

    tracing::info!(
        "Common morphs: {:?}",
        common
            .iter()
            .map(|&(s, _)| src.morphs().names[s].as_str())
            .collect::<Vec<_>>()
    );

    let morph_count = src.morphs().len();
    for &(s, t) in &common {
        let patch = blend_patch(
            &pairs,
            &src.morphs().normals[s],
            &target_morphs.normals[t],
            lerp,
        );
        src.patch_morph_normals(s, &patch)?;

        if snap_delta_positions {
            let target_deltas = &target_morphs.position_deltas[t];
            let deltas = src.morph_position_deltas_mut(s).ok_or(
                PrimitiveError::MorphIndexOutOfRange {
                    index: s,
                    count: morph_count,
                },
            )?;
            for &(i, j) in &pairs {
                deltas[i] = deltas[i].lerp(target_deltas[j], lerp_delta_positions);
            }
        }
    }

    Ok(pairs.len())
}

/// Blended unit normals for every matched source vertex
fn blend_patch(pairs: &[(usize, usize)], src: &[Vec3], target: &[Vec3], lerp: f32) -> NormalPatch {
    let mut patch = NormalPatch {
        indices: Vec::with_capacity(pairs.len()),
        normals: Vec::with_capacity(pairs.len()),
    };
    for &(i, j) in pairs {
        let blended = src[i].lerp(target[j], lerp);
        patch.indices.push(i);
        patch.normals.push(normalize_or(blended, target[j]).to_array());
    }
    patch
}
