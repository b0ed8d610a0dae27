//! Output writers for gathered primitives
//!
//! Records are written as JSON. Buffers are written as a flat binary
//! blob: a fixed little-endian header followed by the raw arrays in
//! header order. Array payloads are copied straight out of memory with
//! `bytemuck`, so they are little-endian on every supported target.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::primitive::{MeshBuffers, MorphBuffers, WeightEntry};

/// Mesh buffer magic
pub const MESH_MAGIC: [u8; 4] = *b"PRMS";
/// Morph buffer magic
pub const MORPH_MAGIC: [u8; 4] = *b"PRMT";
pub const FORMAT_VERSION: u16 = 1;

// ============================================================================
// Mesh flags
// ============================================================================

pub const FLAG_UV2: u8 = 0x01;
pub const FLAG_COLOR: u8 = 0x02;
pub const FLAG_WEIGHTS: u8 = 0x04;

/// Header of a flat mesh file
///
/// ```text
/// 0..4   magic "PRMS"
/// 4..6   version
/// 6      flags
/// 7      padding
/// 8..12  vertex count
/// 12..16 index count
/// 16..20 max border (f32)
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshBufferHeader {
    pub version: u16,
    pub flags: u8,
    pub vertex_count: u32,
    pub index_count: u32,
    pub max_border: f32,
}

impl MeshBufferHeader {
    pub const SIZE: usize = 20;

    pub fn new(vertex_count: u32, index_count: u32, flags: u8, max_border: f32) -> Self {
        Self {
            version: FORMAT_VERSION,
            flags,
            vertex_count,
            index_count,
            max_border,
        }
    }

    /// Write header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&MESH_MAGIC);
        bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
        bytes[6] = self.flags;
        bytes[8..12].copy_from_slice(&self.vertex_count.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.index_count.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.max_border.to_le_bytes());
        bytes
    }

    /// Read header from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE || bytes[0..4] != MESH_MAGIC {
            return None;
        }
        Some(Self {
            version: u16::from_le_bytes([bytes[4], bytes[5]]),
            flags: bytes[6],
            vertex_count: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            index_count: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
            max_border: f32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]),
        })
    }
}

/// Header of a flat morph file
///
/// ```text
/// 0..4   magic "PRMT"
/// 4..6   version
/// 6..8   padding
/// 8..12  vertex count
/// 12..16 shape key count
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MorphBufferHeader {
    pub version: u16,
    pub vertex_count: u32,
    pub shape_key_count: u32,
}

impl MorphBufferHeader {
    pub const SIZE: usize = 16;

    pub fn new(vertex_count: u32, shape_key_count: u32) -> Self {
        Self {
            version: FORMAT_VERSION,
            vertex_count,
            shape_key_count,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&MORPH_MAGIC);
        bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.vertex_count.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.shape_key_count.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < Self::SIZE || bytes[0..4] != MORPH_MAGIC {
            return None;
        }
        Some(Self {
            version: u16::from_le_bytes([bytes[4], bytes[5]]),
            vertex_count: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            shape_key_count: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        })
    }
}

fn write_string<W: Write>(w: &mut W, s: &str) -> Result<()> {
    w.write_all(&(s.len() as u32).to_le_bytes())?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn write_strings<W: Write>(w: &mut W, strings: &[String]) -> Result<()> {
    w.write_all(&(strings.len() as u32).to_le_bytes())?;
    for s in strings {
        write_string(w, s)?;
    }
    Ok(())
}

fn write_weights<W: Write>(w: &mut W, weights: &[Vec<WeightEntry>]) -> Result<()> {
    for entries in weights {
        w.write_all(&(entries.len() as u32).to_le_bytes())?;
        for &(id, weight) in entries {
            w.write_all(&id.to_le_bytes())?;
            w.write_all(&weight.to_le_bytes())?;
        }
    }
    Ok(())
}

/// Write flat mesh buffers
///
/// Layout after the header: positions, indices, normals, uv1, [uv2],
/// [color], tangents, bitangent signs, group names, [per-vertex weights].
pub fn write_mesh_buffers<W: Write>(w: &mut W, buffers: &MeshBuffers<'_>) -> Result<()> {
    let mut flags = 0u8;
    if buffers.uv2.is_some() {
        flags |= FLAG_UV2;
    }
    if buffers.color.is_some() {
        flags |= FLAG_COLOR;
    }
    if !buffers.vertex_weights.is_empty() {
        flags |= FLAG_WEIGHTS;
    }

    let header = MeshBufferHeader::new(
        buffers.num_verts,
        buffers.num_indices,
        flags,
        buffers.max_border,
    );
    w.write_all(&header.to_bytes())?;

    w.write_all(bytemuck::cast_slice(buffers.positions))?;
    w.write_all(bytemuck::cast_slice(buffers.indices))?;
    w.write_all(bytemuck::cast_slice(buffers.normals))?;
    w.write_all(bytemuck::cast_slice(buffers.uv1))?;
    if let Some(uv2) = buffers.uv2 {
        w.write_all(bytemuck::cast_slice(uv2))?;
    }
    if let Some(color) = buffers.color {
        w.write_all(bytemuck::cast_slice(color))?;
    }
    w.write_all(bytemuck::cast_slice(buffers.tangents))?;
    w.write_all(bytemuck::cast_slice(buffers.bitangent_signs))?;

    write_strings(w, buffers.vertex_group_names)?;
    if flags & FLAG_WEIGHTS != 0 {
        write_weights(w, buffers.vertex_weights)?;
    }

    Ok(())
}

/// Write flat morph buffers
///
/// Layout after the header: shape key names, then for each shape key its
/// position deltas, target colors, normal deltas and tangent deltas.
pub fn write_morph_buffers<W: Write>(w: &mut W, buffers: &MorphBuffers<'_>) -> Result<()> {
    let header = MorphBufferHeader::new(buffers.num_vertices, buffers.shape_keys.len() as u32);
    w.write_all(&header.to_bytes())?;
    write_strings(w, buffers.shape_keys)?;

    for i in 0..buffers.shape_keys.len() {
        w.write_all(bytemuck::cast_slice(&buffers.delta_positions[i]))?;
        w.write_all(bytemuck::cast_slice(&buffers.target_colors[i]))?;
        w.write_all(bytemuck::cast_slice(&buffers.delta_normals[i]))?;
        w.write_all(bytemuck::cast_slice(&buffers.delta_tangents[i]))?;
    }

    Ok(())
}

/// Write any record as JSON
pub fn write_json<W: Write, T: Serialize>(w: &mut W, record: &T) -> Result<()> {
    serde_json::to_writer(&mut *w, record).context("Failed to serialize record")?;
    Ok(())
}

/// Create `path` and hand a buffered writer to `write`
pub fn write_file<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    let mut w = BufWriter::new(file);
    write(&mut w).with_context(|| format!("Failed to write: {}", path.display()))?;
    w.flush()
        .with_context(|| format!("Failed to flush: {}", path.display()))?;
    Ok(())
}
