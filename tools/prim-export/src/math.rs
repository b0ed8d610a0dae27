//! Numeric helpers shared by the primitive pipeline
//!
//! Rounding policy, shortest-arc rotations and the small matrix
//! decompositions needed by the space transforms.

use glam::{Mat3, Quat, Vec3};

/// Decimal places kept on UV coordinates before comparison
pub const UV_ROUND_DECIMALS: i32 = 3;

/// Round every component to the nearest multiple of `precision`.
///
/// Ties go to the even multiple.
#[inline]
pub fn prec_round(v: Vec3, precision: f32) -> Vec3 {
    if precision <= 0.0 {
        return v;
    }
    let q = v / precision;
    Vec3::new(
        q.x.round_ties_even(),
        q.y.round_ties_even(),
        q.z.round_ties_even(),
    ) * precision
}

/// Round a UV pair and flip it into top-left origin (`v' = 1 - v`).
#[inline]
pub fn round_flip_uv(uv: [f32; 2]) -> [f32; 2] {
    let scale = 10f32.powi(UV_ROUND_DECIMALS);
    let u = (uv[0] * scale).round_ties_even() / scale;
    let v = (uv[1] * scale).round_ties_even() / scale;
    [u, 1.0 - v]
}

/// All-zero normals are forced to +Z.
#[inline]
pub fn fix_degenerate_normal(n: Vec3) -> Vec3 {
    if n == Vec3::ZERO {
        Vec3::Z
    } else {
        n
    }
}

/// Normalize, falling back to `fallback` for zero-length input.
#[inline]
pub fn normalize_or(v: Vec3, fallback: Vec3) -> Vec3 {
    let n = v.normalize_or_zero();
    if n == Vec3::ZERO {
        fallback
    } else {
        n
    }
}

/// Difference `b - a` clamped component-wise to [-1, 1] so it fits a
/// signed normalized encoding.
#[inline]
pub fn bounded_sub(a: Vec3, b: Vec3) -> Vec3 {
    (b - a).clamp(Vec3::splat(-1.0), Vec3::splat(1.0))
}

/// Largest Euclidean distance between any two vectors in the set.
pub fn max_pairwise_distance(vectors: &[Vec3]) -> f32 {
    let mut max = 0.0f32;
    for (i, a) in vectors.iter().enumerate() {
        for b in &vectors[i + 1..] {
            max = max.max(a.distance(*b));
        }
    }
    max
}

/// Shortest-arc rotation taking `from` onto `to`.
///
/// Zero-length inputs yield the identity rotation.
#[inline]
pub fn rotation_arc(from: Vec3, to: Vec3) -> Quat {
    let from = from.normalize_or_zero();
    let to = to.normalize_or_zero();
    if from == Vec3::ZERO || to == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    Quat::from_rotation_arc(from, to)
}

/// Rotate `tangent` by the rotation that maps `old_normal` onto `new_normal`.
#[inline]
pub fn transport_tangent(tangent: Vec3, old_normal: Vec3, new_normal: Vec3) -> Vec3 {
    rotation_arc(old_normal, new_normal) * tangent
}

/// Inverse-transpose of a linear map, used to carry normals.
///
/// Singular matrices are returned unchanged. Tiny but non-zero scales
/// are still inverted; callers renormalize the result.
pub fn inverse_transpose(m: Mat3) -> Mat3 {
    if is_singular(m.determinant()) {
        return m;
    }
    m.inverse().transpose()
}

/// Only an exactly zero or non-finite determinant has no inverse.
#[inline]
pub fn is_singular(det: f32) -> bool {
    det == 0.0 || !det.is_finite()
}

/// Pure rotation part of a linear map (scale and shear removed).
///
/// Mirrored maps are reduced to the proper rotation obtained by
/// flipping the X axis, so the result always has determinant +1.
pub fn rotation_part(m: Mat3) -> Mat3 {
    let mut x = normalize_or(m.x_axis, Vec3::X);
    let y = normalize_or(m.y_axis, Vec3::Y);
    let z = normalize_or(m.z_axis, Vec3::Z);
    if m.determinant() < 0.0 {
        x = -x;
    }
    let q = Quat::from_mat3(&Mat3::from_cols(x, y, z)).normalize();
    Mat3::from_quat(q)
}
