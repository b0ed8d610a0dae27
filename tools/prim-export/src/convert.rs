//! File-level export entry points used by the CLI
//!
//! Each function loads a mesh snapshot, gathers a `Primitive` and writes
//! the requested record or flat buffers.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::formats::{write_file, write_json, write_mesh_buffers, write_morph_buffers};
use crate::options::ExportOptions;
use crate::primitive::Primitive;
use crate::seam::{copy_morph_normals_at_seam, copy_normals_at_seam, SeamTarget};
use crate::source::{check_primitive, SourceMesh};

/// Output flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputKind {
    /// Nested JSON record
    #[default]
    Json,
    /// Flat binary buffers
    Flat,
}

impl OutputKind {
    fn extension(self) -> &'static str {
        match self {
            OutputKind::Json => "json",
            OutputKind::Flat => "bin",
        }
    }
}

/// Default mesh output next to the snapshot (`name.mesh.json` / `name.mesh.bin`)
pub fn default_mesh_output(input: &Path, kind: OutputKind) -> PathBuf {
    input.with_extension(format!("mesh.{}", kind.extension()))
}

/// Default morph output next to the snapshot (`name.morph.json` / `name.morph.bin`)
pub fn default_morph_output(input: &Path, kind: OutputKind) -> PathBuf {
    input.with_extension(format!("morph.{}", kind.extension()))
}

/// Morph output written alongside a mesh output
pub fn sibling_morph_output(mesh_output: &Path, kind: OutputKind) -> PathBuf {
    let stem = mesh_output
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("primitive");
    let stem = stem.strip_suffix(".mesh").unwrap_or(stem);
    mesh_output.with_file_name(format!("{}.morph.{}", stem, kind.extension()))
}

fn gather(input: &Path, options: ExportOptions) -> Result<Primitive> {
    let mesh = SourceMesh::load(input)?;
    Primitive::gather(&mesh, options)
        .with_context(|| format!("Failed to gather primitive from {:?}", input))
}

fn write_mesh(primitive: &Primitive, output: &Path, kind: OutputKind) -> Result<()> {
    match kind {
        OutputKind::Json => {
            let record = primitive.to_mesh_record()?;
            write_file(output, |w| write_json(w, &record))?;
        }
        OutputKind::Flat => {
            let buffers = primitive.to_mesh_buffers()?;
            write_file(output, |w| write_mesh_buffers(w, &buffers))?;
        }
    }

    tracing::info!(
        "Exported mesh: {} vertices, {} indices -> {:?}",
        primitive.atomic_count(),
        primitive.triangles().len(),
        output
    );
    Ok(())
}

fn write_morph(primitive: &Primitive, output: &Path, kind: OutputKind) -> Result<()> {
    match kind {
        OutputKind::Json => {
            let record = primitive.to_morph_record()?;
            write_file(output, |w| write_json(w, &record))?;
        }
        OutputKind::Flat => {
            let buffers = primitive.to_morph_buffers()?;
            write_file(output, |w| write_morph_buffers(w, &buffers))?;
        }
    }

    tracing::info!(
        "Exported morphs: {} shape keys x {} vertices -> {:?}",
        primitive.morphs().len(),
        primitive.atomic_count(),
        output
    );
    Ok(())
}

/// Export the mesh record of one snapshot
pub fn export_mesh(input: &Path, output: &Path, options: ExportOptions, kind: OutputKind) -> Result<()> {
    let primitive = gather(input, options)?;
    write_mesh(&primitive, output, kind)
}

/// Export the morph record of one snapshot
pub fn export_morph(
    input: &Path,
    output: &Path,
    mut options: ExportOptions,
    kind: OutputKind,
) -> Result<()> {
    options.gather_morph_data = true;
    let primitive = gather(input, options)?;
    write_morph(&primitive, output, kind)
}

/// Run the preflight check on a snapshot
pub fn check(input: &Path, gather_tangents: bool, gather_morphs: bool) -> Result<()> {
    let mesh = SourceMesh::load(input)?;
    check_primitive(&mesh, gather_tangents, gather_morphs)
        .with_context(|| format!("{} is not ready for export", mesh.name))?;
    mesh.validate()
        .with_context(|| format!("{} has inconsistent data", mesh.name))?;
    Ok(())
}

/// Seam stitching parameters
#[derive(Debug, Clone, Copy)]
pub struct SeamSettings {
    pub copy_range: f32,
    pub lerp: f32,
    /// Blend factor for morph position deltas
    pub lerp_delta_positions: f32,
    pub morphs: bool,
    pub snap_delta_positions: bool,
}

/// Stitch `source` normals onto `target` along their shared seam and
/// write the source's mesh record (and morph record when requested).
pub fn stitch_seam(
    source: &Path,
    target: &Path,
    output: &Path,
    mut options: ExportOptions,
    settings: SeamSettings,
    kind: OutputKind,
) -> Result<()> {
    if settings.morphs {
        options.gather_morph_data = true;
    }

    let mut src = gather(source, options.clone())?;
    let tar = gather(target, options)?;
    let seam = SeamTarget::new(&tar)?;

    let snapped = copy_normals_at_seam(&mut src, &seam, settings.copy_range, settings.lerp)?;
    tracing::info!("Stitched {} normals from {:?}", snapped, target);

    if settings.morphs {
        copy_morph_normals_at_seam(
            &mut src,
            &seam,
            settings.copy_range,
            settings.snap_delta_positions,
            settings.lerp,
            settings.lerp_delta_positions,
        )?;
    }

    write_mesh(&src, output, kind)?;
    if settings.morphs {
        write_morph(&src, &sibling_morph_output(output, kind), kind)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_outputs() {
        let input = Path::new("assets/body.json");
        assert_eq!(
            default_mesh_output(input, OutputKind::Json),
            PathBuf::from("assets/body.mesh.json")
        );
        assert_eq!(
            default_morph_output(input, OutputKind::Flat),
            PathBuf::from("assets/body.morph.bin")
        );
    }

    #[test]
    fn test_sibling_morph_output() {
        assert_eq!(
            sibling_morph_output(Path::new("out/head.mesh.json"), OutputKind::Json),
            PathBuf::from("out/head.morph.json")
        );
        assert_eq!(
            sibling_morph_output(Path::new("out/head.bin"), OutputKind::Flat),
            PathBuf::from("out/head.morph.bin")
        );
    }
}
