//! Object/armature space transforms for gathered attributes

use glam::{Mat3, Mat4, Vec3};

use crate::math::{inverse_transpose, is_singular, normalize_or, rotation_part};

/// Transforms applied to positions, normals, tangents and bitangent signs.
///
/// With an armature, directions are expressed relative to the armature
/// (`armature⁻¹ · object`); with global positions requested, relative to
/// the world. Positions go to world space in both cases.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpaceTransform {
    position: Option<Mat4>,
    normal: Option<Mat3>,
    tangent: Option<Mat3>,
    flip_handedness: bool,
}

impl Default for SpaceTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl SpaceTransform {
    /// Local space, nothing moves
    pub fn identity() -> Self {
        Self {
            position: None,
            normal: None,
            tangent: None,
            flip_handedness: false,
        }
    }

    pub fn new(object_world: Mat4, armature_world: Option<Mat4>, use_global_positions: bool) -> Self {
        let composed = match armature_world {
            Some(armature) => {
                let inverse = if !is_singular(armature.determinant()) {
                    armature.inverse()
                } else {
                    Mat4::IDENTITY
                };
                inverse * object_world
            }
            None if use_global_positions => object_world,
            None => return Self::identity(),
        };

        let linear = Mat3::from_mat4(composed);
        Self {
            position: Some(object_world),
            normal: Some(inverse_transpose(linear)),
            tangent: Some(rotation_part(linear)),
            flip_handedness: linear.determinant() < 0.0,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.position.is_none()
    }

    #[inline]
    pub fn position(&self, p: Vec3) -> Vec3 {
        match self.position {
            Some(m) => m.transform_point3(p),
            None => p,
        }
    }

    /// Transformed and renormalized normal
    #[inline]
    pub fn normal(&self, n: Vec3) -> Vec3 {
        let n = match self.normal {
            Some(m) => m * n,
            None => n,
        };
        normalize_or(n, Vec3::Z)
    }

    /// Rotated and renormalized tangent. Zero tangents stay zero.
    #[inline]
    pub fn tangent(&self, t: Vec3) -> Vec3 {
        let t = match self.tangent {
            Some(m) => m * t,
            None => t,
        };
        t.normalize_or_zero()
    }

    /// Bitangent sign, negated under a mirroring transform
    #[inline]
    pub fn bitangent_sign(&self, sign: i32) -> i32 {
        if self.flip_handedness {
            -sign
        } else {
            sign
        }
    }
}
