//! Types and constants for primitive gathering

/// Scale applied to exported morph target colors
pub const MORPH_TARGET_COLOR_SCALE: f32 = 192.0;

/// Tangent `w` written for a negative bitangent sign in the mesh record
pub const TANGENT_FLIPPED_TAG: f32 = 3.0;

/// Fallback RGB for shape keys without a target color attribute
pub(crate) const DEFAULT_MORPH_TARGET_COLOR: [f32; 3] = [1.0, 1.0, 1.0];

bitflags::bitflags! {
    /// Set of data a gather pass actually produced, checked at export time
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct Gathered: u16 {
        const POSITION = 1 << 0;
        const UV = 1 << 1;
        const UV2 = 1 << 2;
        const NORMALS = 1 << 3;
        const COLORS = 1 << 4;
        const TANGENTS = 1 << 5;
        const BITANGENTS = 1 << 6;
        const WEIGHTS = 1 << 7;
        const MORPH_NORMALS = 1 << 8;
        const MORPH_TANGENTS = 1 << 9;
        const TRIANGLES = 1 << 10;
        const MORPH_COLORS = 1 << 11;
    }
}

/// One entry of the GPU vertex buffer before positions are attached.
///
/// Two loops share an atomic vertex exactly when every field here is
/// equal. Tangents are not part of the identity; they are looked up
/// through the representative loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtomicVertex {
    pub vertex_index: u32,
    pub uv: [f32; 2],
    pub uv2: [f32; 2],
    pub normal: [f32; 3],
    pub color: [f32; 4],
}

/// Bitwise identity of an `AtomicVertex`
pub(crate) type AtomicKey = [u32; 12];

impl AtomicVertex {
    /// Structural key. Signed zeros compare equal.
    pub(crate) fn key(&self) -> AtomicKey {
        #[inline]
        fn bits(x: f32) -> u32 {
            (x + 0.0).to_bits()
        }
        [
            self.vertex_index,
            bits(self.uv[0]),
            bits(self.uv[1]),
            bits(self.uv2[0]),
            bits(self.uv2[1]),
            bits(self.normal[0]),
            bits(self.normal[1]),
            bits(self.normal[2]),
            bits(self.color[0]),
            bits(self.color[1]),
            bits(self.color[2]),
            bits(self.color[3]),
        ]
    }
}

/// Bone-group id and weight for one influence
pub type WeightEntry = (u32, f32);

/// Replacement normals for a subset of atomic vertices
#[derive(Debug, Clone, Default)]
pub struct NormalPatch {
    /// Atomic vertex indices to change
    pub indices: Vec<usize>,
    /// New unit normals, one per index
    pub normals: Vec<[f32; 3]>,
}

/// Recomputed morph deltas for the vertices touched by a patch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MorphDeltaPatch {
    pub morph_index: usize,
    pub indices: Vec<usize>,
    pub normal_deltas: Vec<[f32; 3]>,
    pub tangent_deltas: Vec<[f32; 3]>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex() -> AtomicVertex {
        AtomicVertex {
            vertex_index: 3,
            uv: [0.5, 0.25],
            uv2: [0.0, 0.0],
            normal: [0.0, 0.0, 1.0],
            color: [0.0; 4],
        }
    }

    #[test]
    fn test_gathered_flags() {
        let mut g = Gathered::default();
        assert!(!g.contains(Gathered::TANGENTS));
        g.insert(Gathered::TANGENTS | Gathered::BITANGENTS);
        assert!(g.contains(Gathered::TANGENTS));
        assert!(g.contains(Gathered::TANGENTS | Gathered::BITANGENTS));
        assert!(!g.contains(Gathered::TANGENTS | Gathered::WEIGHTS));
        assert_eq!(g.bits(), (1 << 5) | (1 << 6));
        assert!(Gathered::default().is_empty());
    }

    #[test]
    fn test_key_signed_zero_equal() {
        let a = vertex();
        let mut b = vertex();
        b.normal[0] = -0.0;
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_key_distinguishes_vertex_index() {
        let a = vertex();
        let mut b = vertex();
        b.vertex_index = 4;
        assert_ne!(a.key(), b.key());
    }
}
