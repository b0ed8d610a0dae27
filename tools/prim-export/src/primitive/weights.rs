//! Skinning weight gathering, quantization and bone id remapping

use hashbrown::HashMap;

use super::extract::Scan;
use super::types::WeightEntry;
use crate::error::{PrimitiveError, Result};
use crate::options::ExportOptions;
use crate::source::SourceMesh;

/// Bone influences per atomic vertex plus the names behind the ids
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexWeights {
    /// Influences per atomic vertex, never empty
    pub weights: Vec<Vec<WeightEntry>>,
    /// Group name of each bone id, ordered by id
    pub group_names: Vec<String>,
}

/// Quantized influences: (bone id, integer weight)
pub type QuantizedWeights = Vec<Vec<(u32, u32)>>;

/// Gather influences per source vertex, then expand them to atomics.
pub(crate) fn gather_weights(
    mesh: &SourceMesh,
    scan: &Scan,
    options: &ExportOptions,
    atomic_vertex_index: impl Iterator<Item = u32>,
) -> VertexWeights {
    let slot_count = mesh.vertex_groups.len();
    // Bone id assigned to each group slot
    let mut markers: Vec<Option<u32>> = if options.prune_empty_vertex_groups {
        vec![None; slot_count]
    } else {
        (0..slot_count as u32).map(Some).collect()
    };
    let mut next_id = 0u32;

    let per_vertex: Vec<Vec<WeightEntry>> = (0..mesh.vertex_count())
        .map(|v| {
            let influences = mesh.vertex_weights.get(v).map(Vec::as_slice).unwrap_or(&[]);
            let mut entries: Vec<WeightEntry> = Vec::new();

            for &(slot, weight) in influences {
                if scan.ignored_groups.contains(&slot) {
                    continue;
                }
                let slot = match &scan.group_mapping {
                    Some(mapping) => mapping[slot as usize],
                    None => slot,
                };
                if weight <= options.weight_cutoff_threshold {
                    continue;
                }
                let id = *markers[slot as usize].get_or_insert_with(|| {
                    next_id += 1;
                    next_id - 1
                });
                entries.push((id, weight));
            }

            if scan.group_mapping.is_some() {
                merge_duplicate_ids(&mut entries);
            }

            limit_influences(entries, options.max_weights_per_vertex)
        })
        .collect();

    let weights = atomic_vertex_index
        .map(|v| per_vertex[v as usize].clone())
        .collect::<Vec<_>>();

    let mut named: Vec<(u32, &String)> = markers
        .iter()
        .zip(&mesh.vertex_groups)
        .filter_map(|(id, name)| id.map(|id| (id, name)))
        .collect();
    named.sort_by_key(|(id, _)| *id);
    let group_names = named.into_iter().map(|(_, name)| name.clone()).collect();

    tracing::info!("Final vertex weights count: {}", weights.len());

    VertexWeights {
        weights,
        group_names,
    }
}

/// Sum influences that ended up on the same bone id, drop zeroed ones.
fn merge_duplicate_ids(entries: &mut Vec<WeightEntry>) {
    for i in 0..entries.len() {
        for j in i + 1..entries.len() {
            if entries[i].0 == entries[j].0 {
                entries[i].1 += entries[j].1;
                entries[j].1 = 0.0;
            }
        }
    }
    entries.retain(|&(_, w)| w != 0.0);
}

/// Keep the `max` heaviest influences; an empty list gets a `(0, 0)` placeholder.
fn limit_influences(mut entries: Vec<WeightEntry>, max: usize) -> Vec<WeightEntry> {
    if entries.len() > max {
        entries.sort_by(|a, b| b.1.total_cmp(&a.1));
        entries.truncate(max);
    } else if entries.is_empty() {
        entries.push((0, 0.0));
    }
    entries
}

/// Normalize each vertex's weights and quantize them to `bytes` bytes.
///
/// Entries come out sorted by weight, heaviest first, and always sum to
/// `256^bytes - 1`; truncation error is folded into the heaviest entry.
pub fn quantize_weights(weights: &[Vec<WeightEntry>], bytes: u32) -> QuantizedWeights {
    let max_value = 256u64.saturating_pow(bytes).saturating_sub(1).min(u32::MAX as u64) as u32;

    weights
        .iter()
        .map(|entries| {
            let sum: f64 = entries.iter().map(|&(_, w)| w as f64).sum();
            let mut quantized: Vec<(u32, u32)> = entries
                .iter()
                .map(|&(id, w)| {
                    let q = if sum > 0.0 {
                        (max_value as f64 * w as f64 / sum) as u32
                    } else {
                        0
                    };
                    (id, q)
                })
                .collect();
            quantized.sort_by(|a, b| b.1.cmp(&a.1));

            if let Some((first, rest)) = quantized.split_first_mut() {
                let rest_sum: u32 = rest.iter().map(|&(_, q)| q).sum();
                first.1 = max_value.saturating_sub(rest_sum);
            }
            quantized
        })
        .collect()
}

/// Rewrite group ids as indices into a skeleton's bone list.
///
/// Returns the sorted bone indices of every group name present in the
/// skeleton, whether or not a weight references it.
pub fn remap_to_skeleton(
    weights: &mut [Vec<WeightEntry>],
    group_names: &[String],
    bones: &[String],
) -> Result<Vec<u32>> {
    let bone_index: HashMap<&str, u32> = bones
        .iter()
        .enumerate()
        .map(|(i, b)| (b.as_str(), i as u32))
        .collect();

    let remap: Vec<Option<u32>> = group_names
        .iter()
        .map(|name| bone_index.get(name.as_str()).copied())
        .collect();

    let mut used: Vec<u32> = remap.iter().flatten().copied().collect();
    used.sort_unstable();
    used.dedup();

    for entries in weights.iter_mut() {
        for entry in entries.iter_mut() {
            let bone = remap.get(entry.0 as usize).copied().flatten().ok_or_else(|| {
                let name = group_names
                    .get(entry.0 as usize)
                    .cloned()
                    .unwrap_or_else(|| entry.0.to_string());
                PrimitiveError::BoneNotInSkeleton(name)
            })?;
            entry.0 = bone;
        }
    }

    Ok(used)
}

/// Rewrite bone ids as positions within `subset`, optionally sorting it first.
///
/// Returns the subset in the order used for renumbering.
pub fn remap_to_subset(
    weights: &mut [Vec<WeightEntry>],
    subset: &[u32],
    order_subset: bool,
) -> Result<Vec<u32>> {
    let mut subset = subset.to_vec();
    if order_subset {
        subset.sort_unstable();
    }
    let remap: HashMap<u32, u32> = subset
        .iter()
        .enumerate()
        .map(|(i, &id)| (id, i as u32))
        .collect();

    for entries in weights.iter_mut() {
        for entry in entries.iter_mut() {
            entry.0 = *remap
                .get(&entry.0)
                .ok_or(PrimitiveError::BoneNotInSubset(entry.0))?;
        }
    }

    Ok(subset)
}
