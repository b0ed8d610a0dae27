//! Error types for primitive gathering and export

use thiserror::Error;

/// Errors that fail a gather, patch, or export call.
///
/// Optional-feature absence (no colors, no vertex groups, no armature,
/// no exportable shape keys) is never an error; those features are
/// disabled with a warning instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PrimitiveError {
    /// Input object is not a polygon mesh
    #[error("expected a mesh object, got {0}")]
    MeshType(String),

    /// No active UV layer on the mesh
    #[error("no active UV data found on mesh")]
    UvNotFound,

    /// Secondary UV layer index does not exist
    #[error("secondary UV layer index {index} out of range ({count} layers)")]
    UvIndexOutOfRange { index: usize, count: usize },

    /// Deduplicated vertex count exceeds the configured ceiling
    #[error(
        "{count} atomic vertices exceed the maximum of {max}; \
         reduce attribute variety (secondary UV, vertex colors) or split the mesh"
    )]
    AtomicOverflow { count: usize, max: usize },

    /// Export requested data whose gather option was off
    #[error("{0} requested but never gathered")]
    Ungathered(&'static str),

    /// Morph export requested without morph gathering
    #[error("morph data requested but morph gathering is disabled")]
    MorphUncalculated,

    /// Snapshot arrays are inconsistent
    #[error("invalid source mesh: {0}")]
    InvalidSource(String),

    /// Shape key index past the gathered morph targets
    #[error("morph index {index} out of range ({count} shape keys)")]
    MorphIndexOutOfRange { index: usize, count: usize },

    /// Vertex group has no matching skeleton bone
    #[error("vertex group '{0}' not found in skeleton")]
    BoneNotInSkeleton(String),

    /// Bone id missing from a remap subset
    #[error("bone {0} not found in subset")]
    BoneNotInSubset(u32),

    /// Spatial index construction or query failed
    #[error("spatial index error: {0}")]
    SpatialIndex(String),

    /// Patch indices and values differ in length or leave the atomic range
    #[error("patch has {indices} indices but {values} values (atomic count {atomic_count})")]
    PatchLength {
        indices: usize,
        values: usize,
        atomic_count: usize,
    },
}

/// Result alias for primitive operations
pub type Result<T> = std::result::Result<T, PrimitiveError>;
