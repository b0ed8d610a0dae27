//! Atomic vertex deduplication
//!
//! Loops are collapsed in two structural passes. Between them, normals
//! that differ only by numerical noise at the same source vertex are
//! merged so they do not split the vertex.

use glam::Vec3;
use hashbrown::HashMap;

use super::types::{AtomicKey, AtomicVertex};
use crate::error::{PrimitiveError, Result};
use crate::math::{max_pairwise_distance, normalize_or};

/// Deduplicated vertices plus both loop/atomic correspondences
#[derive(Debug, Clone, Default)]
pub struct AtomicSet {
    pub vertices: Vec<AtomicVertex>,
    /// Representative (first-seen) loop of each atomic vertex
    pub atomic_to_loop: Vec<u32>,
    /// Atomic vertex of each loop
    pub loop_to_atomic: Vec<u32>,
}

impl AtomicSet {
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }
}

/// Structural unique in first-seen order.
///
/// Returns the unique records, the index of each one's first occurrence,
/// and the unique index of every input record.
fn unique(records: &[AtomicVertex]) -> (Vec<AtomicVertex>, Vec<u32>, Vec<u32>) {
    let mut seen: HashMap<AtomicKey, u32> = HashMap::with_capacity(records.len());
    let mut uniques = Vec::new();
    let mut first = Vec::new();
    let mut inverse = Vec::with_capacity(records.len());

    for (i, record) in records.iter().enumerate() {
        let next = uniques.len() as u32;
        let id = *seen.entry(record.key()).or_insert_with(|| {
            uniques.push(*record);
            first.push(i as u32);
            next
        });
        inverse.push(id);
    }

    (uniques, first, inverse)
}

/// Merge near-identical normals of atomics sharing a source vertex.
///
/// For every source vertex that owns more than one atomic, if all of its
/// normals lie within `threshold` of each other they are replaced by
/// their normalized mean. Returns the number of source vertices changed.
pub fn refine_normal_duplicates(atomics: &mut [AtomicVertex], threshold: f32) -> usize {
    let mut group_of: HashMap<u32, usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (i, a) in atomics.iter().enumerate() {
        let g = *group_of.entry(a.vertex_index).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[g].push(i);
    }

    let mut refined = 0;
    for members in groups.iter().filter(|m| m.len() > 1) {
        let normals: Vec<Vec3> = members
            .iter()
            .map(|&i| Vec3::from_array(atomics[i].normal))
            .collect();

        let spread = max_pairwise_distance(&normals);
        if spread == 0.0 || spread >= threshold {
            continue;
        }

        let mean = normals.iter().copied().sum::<Vec3>() / normals.len() as f32;
        let center = normalize_or(mean, normals[0]).to_array();
        for &i in members {
            atomics[i].normal = center;
        }
        refined += 1;
    }

    refined
}

/// Collapse per-loop records into atomic vertices.
///
/// Fails with `AtomicOverflow` when more than `max_atomics` remain.
pub fn deduplicate(
    records: &[AtomicVertex],
    refine_threshold: f32,
    max_atomics: usize,
) -> Result<AtomicSet> {
    let (mut temp, temp_to_loop, loop_to_temp) = unique(records);

    let refined = refine_normal_duplicates(&mut temp, refine_threshold);
    if refined > 0 {
        tracing::debug!("Refined near-duplicate normals on {} vertices", refined);
    }

    let (vertices, atomic_to_temp, temp_to_atomic) = unique(&temp);

    let atomic_to_loop = atomic_to_temp
        .iter()
        .map(|&t| temp_to_loop[t as usize])
        .collect();
    let loop_to_atomic = loop_to_temp
        .iter()
        .map(|&t| temp_to_atomic[t as usize])
        .collect();

    tracing::info!(
        "Final vertices count: {} (from {} loops)",
        vertices.len(),
        records.len()
    );

    if vertices.len() > max_atomics {
        return Err(PrimitiveError::AtomicOverflow {
            count: vertices.len(),
            max: max_atomics,
        });
    }

    Ok(AtomicSet {
        vertices,
        atomic_to_loop,
        loop_to_atomic,
    })
}
