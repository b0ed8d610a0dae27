//! Attribute extraction from a mesh snapshot
//!
//! Produces one raw record per loop (vertex index, rounded UVs, rounded
//! and transformed normal, color) plus per-loop tangents and bitangent
//! signs. Missing optional data disables the matching feature with a
//! warning; missing UVs are a hard error.

use glam::{Vec2, Vec3};
use hashbrown::HashSet;

use super::space::SpaceTransform;
use super::types::AtomicVertex;
use crate::error::{PrimitiveError, Result};
use crate::math::{fix_degenerate_normal, prec_round, round_flip_uv};
use crate::options::ExportOptions;
use crate::source::{ColorDomain, SourceMesh};

/// What the snapshot actually offers, after soft failures were applied
#[derive(Debug, Clone, Default)]
pub(crate) struct Scan {
    pub uv_layer: usize,
    pub second_uv_layer: Option<usize>,
    pub color: Option<usize>,
    pub armature: Option<usize>,
    /// Exportable shape key indices
    pub key_blocks: Vec<usize>,
    /// Group slot remap when a merge is configured
    pub group_mapping: Option<Vec<u32>>,
    pub ignored_groups: HashSet<u32>,
}

/// Inspect the snapshot, fail on structural problems and switch off
/// optional features the snapshot cannot feed.
pub(crate) fn scan(mesh: &SourceMesh, options: &mut ExportOptions) -> Result<Scan> {
    let uv_layer = mesh
        .active_uv_layer
        .filter(|&i| i < mesh.uv_layers.len())
        .ok_or(PrimitiveError::UvNotFound)?;

    let second_uv_layer = match options.secondary_uv_layer_index {
        Some(index) if index < mesh.uv_layers.len() => {
            if index == uv_layer {
                tracing::warn!("Secondary UV layer is the same as primary UV layer");
            }
            Some(index)
        }
        Some(index) => {
            return Err(PrimitiveError::UvIndexOutOfRange {
                index,
                count: mesh.uv_layers.len(),
            })
        }
        None => None,
    };

    let color = match mesh.render_color_index {
        Some(i) if i < mesh.color_attributes.len() => Some(i),
        _ => {
            tracing::warn!("No color data found on mesh");
            None
        }
    };

    let mut armature = None;
    if options.gather_weights_data {
        if mesh.vertex_groups.is_empty() {
            tracing::warn!("No vertex groups found on object, weights disabled");
            options.gather_weights_data = false;
        }

        match mesh.armatures.len() {
            0 => {
                tracing::warn!("No armature modifier found on object, weights disabled");
                options.gather_weights_data = false;
            }
            1 => armature = Some(0),
            n => {
                tracing::warn!("{} armature modifiers found on object, weights disabled", n);
                options.gather_weights_data = false;
                armature = Some(0);
            }
        }
    }

    let mut key_blocks = Vec::new();
    if options.gather_morph_data {
        if mesh.shape_keys.is_empty() {
            tracing::warn!("No shape keys found on mesh, morphs disabled");
            options.gather_morph_data = false;
        } else {
            key_blocks = mesh.exportable_keys();
            if key_blocks.is_empty() {
                tracing::warn!("No exportable shape keys found on mesh, morphs disabled");
                options.gather_morph_data = false;
            }
        }
    }

    let group_mapping = if options.has_group_merge() {
        group_merge_mapping(mesh, options)
    } else {
        None
    };

    let mut ignored_groups = HashSet::new();
    for name in &options.vertex_group_ignore {
        match mesh.find_group(name) {
            Some(slot) => {
                ignored_groups.insert(slot as u32);
            }
            None => tracing::warn!("Ignored vertex group '{}' not found on object", name),
        }
    }

    Ok(Scan {
        uv_layer,
        second_uv_layer,
        color,
        armature,
        key_blocks,
        group_mapping,
        ignored_groups,
    })
}

/// Slot remap folding every found merge source onto the merge target.
///
/// Clears the merge configuration when nothing usable is found.
fn group_merge_mapping(mesh: &SourceMesh, options: &mut ExportOptions) -> Option<Vec<u32>> {
    let sources: Vec<usize> = options
        .vertex_group_merge_source
        .iter()
        .filter_map(|name| {
            let slot = mesh.find_group(name);
            if slot.is_none() {
                tracing::debug!("Merge source vertex group '{}' not found", name);
            }
            slot
        })
        .collect();

    let target = mesh.find_group(&options.vertex_group_merge_target);

    match (sources.is_empty(), target) {
        (true, _) => {
            tracing::warn!("All source vertex groups not found on object, merge disabled");
        }
        (false, None) => {
            tracing::warn!(
                "Target vertex group '{}' not found on object, merge disabled",
                options.vertex_group_merge_target
            );
        }
        (false, Some(target)) => {
            let mut mapping: Vec<u32> = (0..mesh.vertex_groups.len() as u32).collect();
            for s in sources {
                mapping[s] = target as u32;
            }
            return Some(mapping);
        }
    }

    options.vertex_group_merge_source.clear();
    options.vertex_group_merge_target.clear();
    None
}

/// Round, repair and transform one corner normal.
#[inline]
pub(crate) fn prepare_normal(raw: Vec3, precision: f32, transform: &SpaceTransform) -> Vec3 {
    transform.normal(fix_degenerate_normal(prec_round(raw, precision)))
}

/// Corner normals of the undeformed shape.
///
/// With shape keys being exported these come from the reference key of
/// the first exportable key.
pub(crate) fn base_corner_normals<'m>(mesh: &'m SourceMesh, scan: &Scan) -> &'m [[f32; 3]] {
    scan.key_blocks
        .first()
        .and_then(|&k| mesh.shape_keys.get(mesh.shape_keys[k].relative_key))
        .map(|basis| basis.corner_normals.as_slice())
        .unwrap_or(&mesh.corner_normals)
}

/// Per-loop structural records used for deduplication.
pub(crate) fn gather_records(mesh: &SourceMesh, scan: &Scan, normals: &[Vec3]) -> Vec<AtomicVertex> {
    let uvs = &mesh.uv_layers[scan.uv_layer].uvs;
    let uvs2 = scan.second_uv_layer.map(|i| &mesh.uv_layers[i].uvs);
    let color = scan.color.map(|i| &mesh.color_attributes[i]);

    mesh.loop_vertices
        .iter()
        .enumerate()
        .map(|(l, &vertex_index)| {
            let color = match color {
                Some(attr) => match attr.domain {
                    ColorDomain::Point => attr.colors[vertex_index as usize],
                    ColorDomain::Corner => attr.colors[l],
                },
                None => [0.0; 4],
            };
            AtomicVertex {
                vertex_index,
                uv: round_flip_uv(uvs[l]),
                uv2: uvs2.map(|u| round_flip_uv(u[l])).unwrap_or([0.0, 0.0]),
                normal: normals[l].to_array(),
                color,
            }
        })
        .collect()
}

/// Per-loop tangents and bitangent signs in export space.
///
/// Uses the snapshot's tangents when present, otherwise derives them
/// from the primary UV layout.
pub(crate) fn gather_tangents(
    mesh: &SourceMesh,
    scan: &Scan,
    raw_normals: &[[f32; 3]],
    precision: f32,
    transform: &SpaceTransform,
) -> (Vec<Vec3>, Vec<i32>) {
    let (tangents, signs) = match &mesh.tangents {
        Some(tangents) => {
            let signs = mesh
                .bitangent_signs
                .clone()
                .unwrap_or_else(|| vec![1; tangents.len()]);
            (tangents.iter().map(|t| Vec3::from_array(*t)).collect(), signs)
        }
        None => {
            tracing::debug!("No tangents in snapshot, deriving from UV layer");
            generate_tangents(mesh, &mesh.uv_layers[scan.uv_layer].uvs, raw_normals)
        }
    };

    let tangents = tangents
        .into_iter()
        .map(|t| transform.tangent(prec_round(t, precision)))
        .collect();
    let signs = signs
        .into_iter()
        .map(|s| transform.bitangent_sign(if s < 0 { -1 } else { 1 }))
        .collect();

    (tangents, signs)
}

/// UV-gradient tangents per loop, orthogonalized against the loop normal.
fn generate_tangents(
    mesh: &SourceMesh,
    uvs: &[[f32; 2]],
    raw_normals: &[[f32; 3]],
) -> (Vec<Vec3>, Vec<i32>) {
    let loops = mesh.loop_count();
    let mut tangents = vec![Vec3::ZERO; loops];
    let mut bitangents = vec![Vec3::ZERO; loops];

    for tri in &mesh.triangles {
        let [l0, l1, l2] = tri.map(|l| l as usize);
        let p = [l0, l1, l2].map(|l| Vec3::from_array(mesh.positions[mesh.loop_vertices[l] as usize]));
        let uv = [l0, l1, l2].map(|l| Vec2::from_array(uvs[l]));

        let e1 = p[1] - p[0];
        let e2 = p[2] - p[0];
        let d1 = uv[1] - uv[0];
        let d2 = uv[2] - uv[0];

        let det = d1.x * d2.y - d2.x * d1.y;
        if det.abs() < 1e-12 {
            continue;
        }
        let r = 1.0 / det;
        let t = (e1 * d2.y - e2 * d1.y) * r;
        let b = (e2 * d1.x - e1 * d2.x) * r;

        for l in [l0, l1, l2] {
            tangents[l] += t;
            bitangents[l] += b;
        }
    }

    let mut signs = Vec::with_capacity(loops);
    for l in 0..loops {
        let n = fix_degenerate_normal(Vec3::from_array(raw_normals[l])).normalize_or_zero();
        let t = tangents[l];
        let ortho = (t - n * n.dot(t)).normalize_or_zero();
        let ortho = if ortho == Vec3::ZERO {
            n.any_orthonormal_vector()
        } else {
            ortho
        };
        tangents[l] = ortho;
        signs.push(if n.cross(ortho).dot(bitangents[l]) < 0.0 { -1 } else { 1 });
    }

    (tangents, signs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ArmatureRef, ColorAttribute, ObjectType, ShapeKey, UvLayer};
    use glam::Mat4;

    fn quad() -> SourceMesh {
        // Two triangles in the XY plane sharing an edge
        SourceMesh {
            name: "quad".into(),
            object_type: ObjectType::Mesh,
            world_matrix: Mat4::IDENTITY.to_cols_array_2d(),
            positions: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            loop_vertices: vec![0, 1, 2, 0, 2, 3],
            corner_normals: vec![[0.0, 0.0, 1.0]; 6],
            tangents: None,
            bitangent_signs: None,
            uv_layers: vec![UvLayer {
                name: "UVMap".into(),
                uvs: vec![
                    [0.0, 0.0],
                    [1.0, 0.0],
                    [1.0, 1.0],
                    [0.0, 0.0],
                    [1.0, 1.0],
                    [0.0, 1.0],
                ],
            }],
            active_uv_layer: Some(0),
            color_attributes: Vec::new(),
            render_color_index: None,
            triangles: vec![[0, 1, 2], [3, 4, 5]],
            vertex_groups: Vec::new(),
            vertex_weights: Vec::new(),
            armatures: Vec::new(),
            shape_keys: Vec::new(),
        }
    }

    #[test]
    fn test_scan_requires_active_uv() {
        let mut mesh = quad();
        mesh.active_uv_layer = None;
        let mut options = ExportOptions::default();
        assert_eq!(scan(&mesh, &mut options).unwrap_err(), PrimitiveError::UvNotFound);
    }

    #[test]
    fn test_scan_secondary_uv_out_of_range() {
        let mesh = quad();
        let mut options = ExportOptions {
            secondary_uv_layer_index: Some(3),
            ..Default::default()
        };
        assert_eq!(
            scan(&mesh, &mut options).unwrap_err(),
            PrimitiveError::UvIndexOutOfRange { index: 3, count: 1 }
        );
    }

    #[test]
    fn test_scan_soft_disables_features() {
        let mesh = quad();
        let mut options = ExportOptions {
            gather_weights_data: true,
            gather_morph_data: true,
            ..Default::default()
        };
        let scan = scan(&mesh, &mut options).unwrap();
        assert!(!options.gather_weights_data);
        assert!(!options.gather_morph_data);
        assert!(scan.color.is_none());
        assert!(scan.armature.is_none());
    }

    #[test]
    fn test_scan_multiple_armatures_keeps_first_for_transform() {
        let mut mesh = quad();
        mesh.vertex_groups = vec!["Bone".into()];
        let arm = ArmatureRef {
            name: "Armature".into(),
            world_matrix: Mat4::IDENTITY.to_cols_array_2d(),
            bones: Vec::new(),
        };
        mesh.armatures = vec![arm.clone(), arm];
        let mut options = ExportOptions {
            gather_weights_data: true,
            ..Default::default()
        };
        let scan = scan(&mesh, &mut options).unwrap();
        assert!(!options.gather_weights_data);
        assert_eq!(scan.armature, Some(0));
    }

    #[test]
    fn test_scan_merge_mapping() {
        let mut mesh = quad();
        mesh.vertex_groups = vec!["Spine".into(), "Hair.001".into(), "Hair".into()];
        let mut options = ExportOptions {
            vertex_group_merge_source: vec!["Hair.001".into(), "Missing".into()],
            vertex_group_merge_target: "Hair".into(),
            vertex_group_ignore: vec!["Spine".into(), "Nope".into()],
            ..Default::default()
        };
        let scan = scan(&mesh, &mut options).unwrap();
        assert_eq!(scan.group_mapping, Some(vec![0, 2, 2]));
        assert!(scan.ignored_groups.contains(&0));
        assert_eq!(scan.ignored_groups.len(), 1);
    }

    #[test]
    fn test_scan_merge_missing_target_disables() {
        let mut mesh = quad();
        mesh.vertex_groups = vec!["Hair.001".into()];
        let mut options = ExportOptions {
            vertex_group_merge_source: vec!["Hair.001".into()],
            vertex_group_merge_target: "Hair".into(),
            ..Default::default()
        };
        let scan = scan(&mesh, &mut options).unwrap();
        assert!(scan.group_mapping.is_none());
        assert!(!options.has_group_merge());
    }

    #[test]
    fn test_records_flip_v_and_broadcast_point_colors() {
        let mut mesh = quad();
        mesh.color_attributes = vec![ColorAttribute {
            name: "Col".into(),
            domain: ColorDomain::Point,
            colors: vec![
                [1.0, 0.0, 0.0, 1.0],
                [0.0, 1.0, 0.0, 1.0],
                [0.0, 0.0, 1.0, 1.0],
                [1.0, 1.0, 1.0, 1.0],
            ],
        }];
        mesh.render_color_index = Some(0);
        let mut options = ExportOptions::default();
        let scan = scan(&mesh, &mut options).unwrap();
        let normals = vec![Vec3::Z; 6];
        let records = gather_records(&mesh, &scan, &normals);

        assert_eq!(records.len(), 6);
        assert_eq!(records[0].uv, [0.0, 1.0]);
        assert_eq!(records[5].uv, [0.0, 0.0]);
        // Loop 3 and loop 0 both sit on vertex 0
        assert_eq!(records[3].color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(records[4].color, records[2].color);
        assert_eq!(records[0].uv2, [0.0, 0.0]);
    }

    #[test]
    fn test_prepare_normal_rounds_and_repairs() {
        let t = SpaceTransform::identity();
        assert_eq!(prepare_normal(Vec3::new(0.001, 0.0, 0.002), 0.01, &t), Vec3::Z);
        let n = prepare_normal(Vec3::new(0.0, 0.996, 0.0), 0.01, &t);
        assert!((n - Vec3::Y).length() < 1e-6);
    }

    #[test]
    fn test_generated_tangents_follow_u() {
        let mesh = quad();
        let mut options = ExportOptions::default();
        let scan = scan(&mesh, &mut options).unwrap();
        let (tangents, signs) = gather_tangents(
            &mesh,
            &scan,
            &mesh.corner_normals,
            0.01,
            &SpaceTransform::identity(),
        );
        assert_eq!(tangents.len(), 6);
        for (t, s) in tangents.iter().zip(&signs) {
            assert!((*t - Vec3::X).length() < 1e-5);
            assert_eq!(*s, 1);
        }
    }

    #[test]
    fn test_base_normals_come_from_reference_key() {
        let mut mesh = quad();
        let key = |name: &str, normal: [f32; 3]| ShapeKey {
            name: name.into(),
            relative_key: 0,
            mute: false,
            positions: vec![[0.0; 3]; 4],
            corner_normals: vec![normal; 6],
            normal_deltas: None,
            target_colors: None,
        };
        mesh.shape_keys = vec![key("Basis", [0.0, 1.0, 0.0]), key("Smile", [1.0, 0.0, 0.0])];
        let mut options = ExportOptions {
            gather_morph_data: true,
            ..Default::default()
        };
        let scan = scan(&mesh, &mut options).unwrap();
        assert_eq!(scan.key_blocks, vec![1]);
        assert_eq!(base_corner_normals(&mesh, &scan)[0], [0.0, 1.0, 0.0]);
    }
}
