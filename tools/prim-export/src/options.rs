//! Export options and `export.toml` parsing
//!
//! Every field has a default, so an empty file (or no file at all) gives
//! the stock exporter behaviour.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Options controlling a single primitive gather
#[derive(Debug, Clone, Deserialize)]
pub struct ExportOptions {
    /// Passed through to the mesh record untouched
    #[serde(default)]
    pub max_border: f32,

    /// Secondary UV layer. May produce extra atomic vertices.
    #[serde(default)]
    pub secondary_uv_layer_index: Option<usize>,

    #[serde(default)]
    pub gather_weights_data: bool,
    #[serde(default)]
    pub gather_morph_data: bool,

    /// Transform positions into world space even without an armature
    #[serde(default)]
    pub use_global_positions: bool,

    #[serde(default = "default_true")]
    pub gather_tangents: bool,

    /// Build morph normals from stored normal deltas when a key has them
    #[serde(default)]
    pub use_morph_normal_attrs: bool,
    /// Use per-key morph target color attributes when present
    #[serde(default = "default_true")]
    pub use_morph_color_attrs: bool,

    #[serde(default = "default_round_precision")]
    pub normal_tangent_round_precision: f32,
    /// Normals sharing a vertex closer than this are merged
    #[serde(default = "default_refine_threshold")]
    pub normal_refine_threshold: f32,
    /// 16-bit index buffer ceiling by default
    #[serde(default = "default_atomic_max")]
    pub atomic_max_number: usize,

    #[serde(default = "default_weight_cutoff")]
    pub weight_cutoff_threshold: f32,
    #[serde(default = "default_max_weights")]
    pub max_weights_per_vertex: usize,
    #[serde(default = "default_true")]
    pub prune_empty_vertex_groups: bool,

    /// Groups folded into `vertex_group_merge_target`
    #[serde(default)]
    pub vertex_group_merge_source: Vec<String>,
    #[serde(default)]
    pub vertex_group_merge_target: String,

    #[serde(default)]
    pub vertex_group_ignore: Vec<String>,

    /// Quantize exported weights to this many bytes (e.g. 2 for u16)
    #[serde(default)]
    pub quantize_bytes: Option<u32>,
}

fn default_true() -> bool {
    true
}

fn default_round_precision() -> f32 {
    0.01
}

fn default_refine_threshold() -> f32 {
    0.02
}

fn default_atomic_max() -> usize {
    u16::MAX as usize
}

fn default_weight_cutoff() -> f32 {
    0.0001
}

fn default_max_weights() -> usize {
    8
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            max_border: 0.0,
            secondary_uv_layer_index: None,
            gather_weights_data: false,
            gather_morph_data: false,
            use_global_positions: false,
            gather_tangents: default_true(),
            use_morph_normal_attrs: false,
            use_morph_color_attrs: default_true(),
            normal_tangent_round_precision: default_round_precision(),
            normal_refine_threshold: default_refine_threshold(),
            atomic_max_number: default_atomic_max(),
            weight_cutoff_threshold: default_weight_cutoff(),
            max_weights_per_vertex: default_max_weights(),
            prune_empty_vertex_groups: default_true(),
            vertex_group_merge_source: Vec::new(),
            vertex_group_merge_target: String::new(),
            vertex_group_ignore: Vec::new(),
            quantize_bytes: None,
        }
    }
}

impl ExportOptions {
    /// Load options from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read export options: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse options from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse export options")
    }

    /// Whether a vertex group merge is configured at all
    pub fn has_group_merge(&self) -> bool {
        !self.vertex_group_merge_target.is_empty() && !self.vertex_group_merge_source.is_empty()
    }
}
