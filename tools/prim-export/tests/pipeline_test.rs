//! Library-level tests of the gather pipeline on generated snapshots


use glam::Vec3;
use prim_export::primitive::RecordWeights;
use prim_export::source::{ColorAttribute, ColorDomain, UvLayer};
use prim_export::{ExportOptions, Gathered, Primitive, PrimitiveError};

/// Cube face index (generator order) of an axis-aligned normal
fn face_of(normal: Vec3) -> usize {
    let faces = [Vec3::X, -Vec3::X, Vec3::Y, -Vec3::Y, Vec3::Z, -Vec3::Z];
    faces
        .iter()
        .position(|f| (*f - normal).length() < 1e-5)
        .expect("axis-aligned normal")
}

#[test]
fn test_cube_atomics_and_indices() {
    let cube = generate_test_assets::cube();
    let primitive = Primitive::gather(&cube, ExportOptions::default()).expect("gather cube");

    assert_eq!(primitive.atomic_count(), 24);
    assert_eq!(primitive.triangles().len(), 36);
    assert!(primitive
        .triangles()
        .iter()
        .all(|&i| (i as usize) < primitive.atomic_count()));

    // Every atomic is used by at least one triangle
    let mut used = vec![false; primitive.atomic_count()];
    for &i in primitive.triangles() {
        used[i as usize] = true;
    }
    assert!(used.iter().all(|&u| u));

    // Loop mappings are total and consistent
    let atomics = primitive.atomics();
    assert_eq!(atomics.loop_to_atomic.len(), cube.loop_count());
    for (a, &l) in atomics.atomic_to_loop.iter().enumerate() {
        assert_eq!(atomics.loop_to_atomic[l as usize] as usize, a);
    }
}

#[test]
fn test_cube_record_shape() {
    let cube = generate_test_assets::cube();
    let primitive = Primitive::gather(&cube, ExportOptions::default()).expect("gather cube");
    let record = primitive.to_mesh_record().expect("mesh record");

    assert_eq!(record.num_verts, 24);
    assert_eq!(record.num_indices, 36);
    assert_eq!(record.positions_raw.len(), 72);
    assert_eq!(record.normals.len(), 24);
    assert_eq!(record.uv_coords.len(), 24);
    assert_eq!(record.tangents.len(), 24);
    assert!(record.uv_coords_2.is_none());
    assert!(record.vertex_color.is_empty());

    for n in &record.normals {
        let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
        assert!((len - 1.0).abs() < 1e-4, "normal {:?} is not unit length", n);
    }
    for t in &record.tangents {
        assert!(t[3] == 0.0 || t[3] == 3.0, "unexpected handedness tag {}", t[3]);
    }
}

#[test]
fn test_atomic_ceiling() {
    let cube = generate_test_assets::cube();
    let options = ExportOptions {
        atomic_max_number: 10,
        ..ExportOptions::default()
    };
    let err = Primitive::gather(&cube, options).unwrap_err();
    assert_eq!(err, PrimitiveError::AtomicOverflow { count: 24, max: 10 });
}

#[test]
fn test_default_ceiling_rejects_dense_grid() {
    // 257 x 257 vertices, one atomic each
    let grid = generate_test_assets::plane(256);
    let err = Primitive::gather(&grid, ExportOptions::default()).unwrap_err();
    assert_eq!(
        err,
        PrimitiveError::AtomicOverflow {
            count: 257 * 257,
            max: 65535
        }
    );
}

#[test]
fn test_grid_shares_atomics() {
    let grid = generate_test_assets::plane(4);
    let primitive = Primitive::gather(&grid, ExportOptions::default()).expect("gather grid");
    assert_eq!(primitive.atomic_count(), 25);
    assert_eq!(primitive.triangles().len(), 4 * 4 * 6);
}

#[test]
fn test_skinned_cube_weights() {
    let cube = generate_test_assets::skinned_cube();
    let options = ExportOptions {
        gather_weights_data: true,
        ..ExportOptions::default()
    };
    let primitive = Primitive::gather(&cube, options).expect("gather skinned cube");
    assert!(primitive.gathered().contains(Gathered::WEIGHTS));

    let weights = primitive.weights();
    assert_eq!(weights.group_names, vec!["Root".to_string(), "Top".to_string()]);
    assert_eq!(weights.weights.len(), primitive.atomic_count());

    for (a, entries) in weights.weights.iter().enumerate() {
        let z = primitive.positions()[a].z;
        if z > 0.0 {
            assert_eq!(entries, &vec![(1, 0.75), (0, 0.25)]);
        } else {
            assert_eq!(entries, &vec![(0, 1.0)]);
        }
    }
}

#[test]
fn test_skinned_cube_quantized_record() {
    let cube = generate_test_assets::skinned_cube();
    let options = ExportOptions {
        gather_weights_data: true,
        quantize_bytes: Some(1),
        ..ExportOptions::default()
    };
    let primitive = Primitive::gather(&cube, options).expect("gather skinned cube");
    let record = primitive.to_mesh_record().expect("mesh record");

    let RecordWeights::Quantized(quantized) = record.vertex_weights else {
        panic!("expected quantized weights");
    };
    for entries in &quantized {
        let sum: u32 = entries.iter().map(|&(_, w)| w).sum();
        assert_eq!(sum, 255);
    }
}

#[test]
fn test_weights_soft_fail_without_armature() {
    let mut cube = generate_test_assets::skinned_cube();
    cube.armatures.clear();
    let options = ExportOptions {
        gather_weights_data: true,
        ..ExportOptions::default()
    };
    let primitive = Primitive::gather(&cube, options).expect("gather cube");
    assert!(!primitive.gathered().contains(Gathered::WEIGHTS));
    assert!(!primitive.options().gather_weights_data);
}

#[test]
fn test_morph_cube_deltas() {
    let cube = generate_test_assets::morph_cube();
    let options = ExportOptions {
        gather_morph_data: true,
        ..ExportOptions::default()
    };
    let primitive = Primitive::gather(&cube, options).expect("gather morph cube");

    let morphs = primitive.morphs();
    assert_eq!(morphs.names, vec!["Stretch".to_string()]);
    assert_eq!(morphs.find("Stretch"), Some(0));

    let record = primitive.to_morph_record().expect("morph record");
    assert_eq!(record.num_vertices, 24);
    assert_eq!(record.delta_positions[0].len(), 24);
    assert_eq!(record.delta_tangents[0].len(), 24);

    for (a, delta) in record.delta_positions[0].iter().enumerate() {
        let expected = if primitive.positions()[a].z > 0.0 { 0.5 } else { 0.0 };
        assert!((delta[2] - expected).abs() < 1e-6);
        assert_eq!(delta[0], 0.0);
        assert_eq!(delta[1], 0.0);
    }

    // Normals are unchanged by the key
    for delta in &record.delta_normals[0] {
        assert!(delta.iter().all(|c| c.abs() < 1e-6));
    }
    // No color attribute on the key: white scaled
    for color in &record.target_colors[0] {
        assert_eq!(color, &[192.0, 192.0, 192.0]);
    }
}

#[test]
fn test_morph_record_requires_gather() {
    let cube = generate_test_assets::morph_cube();
    let primitive = Primitive::gather(&cube, ExportOptions::default()).expect("gather cube");
    assert_eq!(
        primitive.to_morph_record().unwrap_err(),
        PrimitiveError::MorphUncalculated
    );
}

#[test]
fn test_secondary_uv_splits_atomics() {
    let mut cube = generate_test_assets::cube();
    // First triangle of every face at v = 0.25, second at v = 0.5
    let uvs = (0..cube.loop_count())
        .map(|l| if l % 6 < 3 { [0.0, 0.25] } else { [0.0, 0.5] })
        .collect();
    cube.uv_layers.push(UvLayer {
        name: "Lightmap".into(),
        uvs,
    });
    let options = ExportOptions {
        secondary_uv_layer_index: Some(1),
        ..ExportOptions::default()
    };
    let primitive = Primitive::gather(&cube, options).expect("gather cube");

    // The two shared corners of every quad split on UV2 alone
    assert!(primitive.gathered().contains(Gathered::UV2));
    assert_eq!(primitive.atomic_count(), 36);

    let record = primitive.to_mesh_record().expect("mesh record");
    let uv2 = record.uv_coords_2.expect("secondary UVs");
    assert_eq!(uv2.len(), 36);
    assert_eq!(uv2[0], [0.0, 0.75]);
    assert!(uv2.iter().all(|uv| *uv == [0.0, 0.75] || *uv == [0.0, 0.5]));
}

#[test]
fn test_secondary_uv_same_as_primary() {
    let cube = generate_test_assets::cube();
    let options = ExportOptions {
        secondary_uv_layer_index: Some(0),
        ..ExportOptions::default()
    };
    let primitive = Primitive::gather(&cube, options).expect("gather cube");

    // Only a warning: the layer is gathered twice and adds no atomics
    assert!(primitive.gathered().contains(Gathered::UV2));
    assert_eq!(primitive.atomic_count(), 24);
    assert_eq!(primitive.uv2(), Some(primitive.uv()));
}

#[test]
fn test_stored_normal_deltas() {
    let mut cube = generate_test_assets::morph_cube();
    let loops = cube.loop_count();
    cube.shape_keys[1].normal_deltas = Some(vec![[0.0, 0.5, 0.0]; loops]);
    let options = ExportOptions {
        gather_morph_data: true,
        use_morph_normal_attrs: true,
        ..ExportOptions::default()
    };
    let primitive = Primitive::gather(&cube, options).expect("gather morph cube");
    let morphs = primitive.morphs();

    for (a, base) in primitive.normals().iter().enumerate() {
        // Stored delta is exported untouched
        assert_eq!(morphs.normal_deltas[0][a], Vec3::new(0.0, 0.5, 0.0));
        // Morph normal is reference + delta, renormalized
        let expected = (*base + Vec3::new(0.0, 0.5, 0.0)).normalize();
        assert!(
            (morphs.normals[0][a] - expected).length() < 1e-4,
            "atomic {} morph normal {:?}",
            a,
            morphs.normals[0][a]
        );
    }
}

#[test]
fn test_corner_colors_follow_faces() {
    let mut cube = generate_test_assets::cube();
    let colors = (0..cube.loop_count())
        .map(|l| [(l / 6) as f32 / 5.0, 0.0, 0.0, 1.0])
        .collect();
    cube.color_attributes = vec![ColorAttribute {
        name: "Paint".into(),
        domain: ColorDomain::Corner,
        colors,
    }];
    cube.render_color_index = Some(0);
    let primitive = Primitive::gather(&cube, ExportOptions::default()).expect("gather cube");

    assert!(primitive.gathered().contains(Gathered::COLORS));
    assert_eq!(primitive.atomic_count(), 24);
    let colors = primitive.colors().expect("colors");
    for (a, normal) in primitive.normals().iter().enumerate() {
        let face = face_of(*normal);
        assert_eq!(colors[a], [face as f32 / 5.0, 0.0, 0.0, 1.0]);
    }
}

#[test]
fn test_corner_colors_split_within_a_face() {
    let mut cube = generate_test_assets::cube();
    // Every triangle gets its own color, unlike a per-vertex attribute
    let colors = (0..cube.loop_count())
        .map(|l| if l % 6 < 3 { [1.0, 0.0, 0.0, 1.0] } else { [0.0, 0.0, 1.0, 1.0] })
        .collect();
    cube.color_attributes = vec![ColorAttribute {
        name: "Paint".into(),
        domain: ColorDomain::Corner,
        colors,
    }];
    cube.render_color_index = Some(0);
    let primitive = Primitive::gather(&cube, ExportOptions::default()).expect("gather cube");

    assert_eq!(primitive.atomic_count(), 36);
    let record = primitive.to_mesh_record().expect("mesh record");
    assert_eq!(record.vertex_color[0], [1.0, 0.0, 0.0, 1.0]);
}
