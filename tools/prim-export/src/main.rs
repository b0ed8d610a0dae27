//! prim-export - mesh primitive export tool
//!
//! Converts mesh snapshots (JSON) into deduplicated mesh and morph
//! records (JSON) or flat binary buffers.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use prim_export::convert::{self, OutputKind, SeamSettings};
use prim_export::seam::DEFAULT_COPY_RANGE;
use prim_export::ExportOptions;

#[derive(Parser)]
#[command(name = "prim-export")]
#[command(about = "Mesh primitive export tool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every gathering command
#[derive(Args, Clone)]
struct GatherArgs {
    /// export.toml with gather options
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write flat binary buffers instead of JSON
    #[arg(long)]
    flat: bool,

    /// Transform positions to world space
    #[arg(long)]
    global_positions: bool,

    /// Gather skinning weights
    #[arg(long)]
    weights: bool,

    /// Skip tangents and bitangent signs
    #[arg(long)]
    no_tangents: bool,

    /// Secondary UV layer index
    #[arg(long)]
    uv2: Option<usize>,
}

impl GatherArgs {
    /// Config file values, overridden by command line flags
    fn options(&self) -> Result<ExportOptions> {
        let mut options = match &self.config {
            Some(path) => ExportOptions::load(path)?,
            None => ExportOptions::default(),
        };
        if self.global_positions {
            options.use_global_positions = true;
        }
        if self.weights {
            options.gather_weights_data = true;
        }
        if self.no_tangents {
            options.gather_tangents = false;
        }
        if self.uv2.is_some() {
            options.secondary_uv_layer_index = self.uv2;
        }
        Ok(options)
    }

    fn kind(&self) -> OutputKind {
        if self.flat {
            OutputKind::Flat
        } else {
            OutputKind::Json
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Export the mesh record of a snapshot
    Mesh {
        /// Input mesh snapshot (JSON)
        input: PathBuf,

        /// Output file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also gather shape keys
        #[arg(long)]
        morphs: bool,

        #[command(flatten)]
        gather: GatherArgs,
    },

    /// Export the morph record of a snapshot
    Morph {
        /// Input mesh snapshot (JSON)
        input: PathBuf,

        /// Output file
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        gather: GatherArgs,
    },

    /// Check that a snapshot can be exported
    Check {
        /// Input mesh snapshot (JSON)
        input: PathBuf,

        /// Require exportable shape keys
        #[arg(long)]
        morphs: bool,

        /// Do not require triangulation
        #[arg(long)]
        no_tangents: bool,
    },

    /// Copy normals from a target snapshot onto a source along their seam
    Seam {
        /// Source snapshot whose normals are changed
        source: PathBuf,

        /// Target snapshot providing the normals
        target: PathBuf,

        /// Output file for the source mesh record
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Maximum snapping distance
        #[arg(long, default_value_t = DEFAULT_COPY_RANGE)]
        range: f32,

        /// Blend factor towards the target (1 = copy)
        #[arg(long, default_value_t = 1.0)]
        lerp: f32,

        /// Blend factor for morph position deltas (defaults to --lerp)
        #[arg(long)]
        lerp_delta_positions: Option<f32>,

        /// Stitch morph normals of shared shape keys too
        #[arg(long)]
        morphs: bool,

        /// Also blend morph position deltas
        #[arg(long)]
        snap_delta_positions: bool,

        #[command(flatten)]
        gather: GatherArgs,
    },
}

fn output_or(
    output: Option<PathBuf>,
    input: &Path,
    default: fn(&Path, OutputKind) -> PathBuf,
    kind: OutputKind,
) -> PathBuf {
    output.unwrap_or_else(|| default(input, kind))
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Mesh {
            input,
            output,
            morphs,
            gather,
        } => {
            let kind = gather.kind();
            let output = output_or(output, &input, convert::default_mesh_output, kind);
            let mut options = gather.options()?;
            if morphs {
                options.gather_morph_data = true;
            }
            tracing::info!("Exporting mesh {:?} -> {:?}", input, output);
            convert::export_mesh(&input, &output, options, kind)?;
            tracing::info!("Done!");
        }

        Commands::Morph {
            input,
            output,
            gather,
        } => {
            let kind = gather.kind();
            let output = output_or(output, &input, convert::default_morph_output, kind);
            tracing::info!("Exporting morphs {:?} -> {:?}", input, output);
            convert::export_morph(&input, &output, gather.options()?, kind)?;
            tracing::info!("Done!");
        }

        Commands::Check {
            input,
            morphs,
            no_tangents,
        } => {
            tracing::info!("Checking {:?}", input);
            convert::check(&input, !no_tangents, morphs)?;
            tracing::info!("Snapshot is ready for export!");
        }

        Commands::Seam {
            source,
            target,
            output,
            range,
            lerp,
            lerp_delta_positions,
            morphs,
            snap_delta_positions,
            gather,
        } => {
            let kind = gather.kind();
            let output = output_or(output, &source, convert::default_mesh_output, kind);
            let settings = SeamSettings {
                copy_range: range,
                lerp,
                lerp_delta_positions: lerp_delta_positions.unwrap_or(lerp),
                morphs,
                snap_delta_positions,
            };
            tracing::info!("Stitching {:?} onto {:?} -> {:?}", source, target, output);
            convert::stitch_seam(&source, &target, &output, gather.options()?, settings, kind)?;
            tracing::info!("Done!");
        }
    }

    Ok(())
}
