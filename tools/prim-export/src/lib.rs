//! prim-export library
//!
//! Turns mesh snapshots into GPU-ready atomic vertex buffers, index
//! buffers, skinning weights and morph target deltas.

pub mod convert;
pub mod error;
pub mod formats;
pub mod math;
pub mod options;
pub mod primitive;
pub mod seam;
pub mod source;

pub use error::{PrimitiveError, Result};
pub use options::ExportOptions;
pub use primitive::{
    quantize_weights, remap_to_skeleton, remap_to_subset, Gathered, MeshBuffers, MeshRecord,
    MorphBuffers, MorphDeltaPatch, MorphRecord, NormalPatch, Primitive,
};
pub use seam::{copy_morph_normals_at_seam, copy_normals_at_seam, snap_positions, SeamTarget};
pub use source::{check_primitive, PreflightIssue, SourceMesh};
