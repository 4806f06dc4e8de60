// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polyframe Implicit CLI

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use colored::*;
use nalgebra::Point3;
use polyframe_implicit::scene::CacheStats;
use polyframe_implicit::{
    render_mesh, BoundingBox, Context, Mesh, MeshingMode, PipelineConfig, SceneDescription, Tree,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "polyframe-implicit")]
#[command(about = "Polyframe Implicit - expression-tree solids and meshing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Pipeline configuration file (defaults to ./polyframe.toml if present)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a scene description and mesh its root shapes
    Render {
        /// Scene description (.json or .toml)
        scene: PathBuf,

        /// Write meshes as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Mesh on the calling thread instead of background workers
        #[arg(long)]
        blocking: bool,
    },

    /// Mesh a single expression given as an s-expression or tree archive
    Mesh {
        /// S-expression, or a path to a saved tree
        expr: String,

        /// Side of the cubic region centred on the origin
        #[arg(long)]
        bounds: Option<f32>,

        #[arg(short, long)]
        resolution: Option<f32>,

        /// Normal splitting threshold in degrees
        #[arg(short, long)]
        angle: Option<f32>,

        /// Write the mesh as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Evaluate an expression at a point
    Sample {
        expr: String,

        /// Point as x,y,z
        #[arg(long, value_delimiter = ',', num_args = 3, default_values_t = [0.0, 0.0, 0.0])]
        at: Vec<f32>,
    },

    /// Save an s-expression as a binary tree archive
    Save {
        expr: String,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print a saved tree archive as an s-expression
    Print { archive: PathBuf },

    /// Show version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PipelineConfig::load_from(Some(path.as_path()))?,
        None => PipelineConfig::load()?,
    };

    match cli.command {
        Commands::Render {
            scene,
            output,
            blocking,
        } => render_command(&scene, output.as_deref(), blocking, config, cli.verbose),
        Commands::Mesh {
            expr,
            bounds,
            resolution,
            angle,
            output,
        } => {
            let bounds = bounds.unwrap_or(config.bounds_size);
            let resolution = resolution.unwrap_or(config.resolution);
            let angle = angle.unwrap_or(config.splitting_angle);
            mesh_command(&expr, bounds, resolution, angle, output.as_deref(), &config, cli.verbose)
        }
        Commands::Sample { expr, at } => sample_command(&expr, &at, &config),
        Commands::Save { expr, output } => save_command(&expr, &output, &config),
        Commands::Print { archive } => print_command(&archive, &config),
        Commands::Version => {
            println!("Polyframe Implicit v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Parse `expr` as a tree archive path if one exists, otherwise as an
/// s-expression
fn read_tree(expr: &str, config: &PipelineConfig) -> Result<Tree> {
    let kernel = config.kernel();
    let path = Path::new(expr);
    if path.is_file() {
        return Tree::load(&kernel, path)
            .with_context(|| format!("Failed to load tree archive: {}", expr));
    }
    Tree::from_sexpr(&kernel, expr).with_context(|| format!("Failed to parse expression: {}", expr))
}

fn render_command(
    path: &Path,
    output: Option<&Path>,
    blocking: bool,
    mut config: PipelineConfig,
    verbose: bool,
) -> Result<()> {
    if !path.exists() {
        report_error(&format!("Scene file not found: {}", path.display()));
        std::process::exit(1);
    }
    if blocking {
        config.meshing = MeshingMode::Blocking;
    }

    let description = SceneDescription::from_file(path)
        .with_context(|| format!("Failed to read scene: {}", path.display()))?;
    let kernel = config.kernel();
    let mut scene = description.build(kernel, config)?;

    let start = std::time::Instant::now();
    let report = scene.flush();
    let elapsed = start.elapsed();

    for (id, err) in &report.failed {
        let name = scene.node(*id).map(|node| node.name().to_string())?;
        report_error(&format!("{}: {}", name, err));
    }

    let mut meshes = Vec::new();
    for &root in scene.roots() {
        let node = scene.node(root)?;
        match scene.mesh(root) {
            Some(mesh) => {
                print_mesh_line(node.name(), mesh);
                meshes.push((node.name().to_string(), mesh.clone()));
            }
            None => println!("  {} {}", node.name().cyan(), "no geometry".yellow()),
        }
    }

    if verbose {
        println!("Evaluated in {:.2?}", elapsed);
        print_stats(&scene.stats());
    }

    if let Some(output) = output {
        write_json(output, &meshes)?;
        println!("{} {}", "Wrote".green(), output.display());
    }

    if !report.failed.is_empty() {
        bail!("{} shape(s) failed", report.failed.len());
    }
    Ok(())
}

fn mesh_command(
    expr: &str,
    bounds: f32,
    resolution: f32,
    angle: f32,
    output: Option<&Path>,
    config: &PipelineConfig,
    verbose: bool,
) -> Result<()> {
    let ctx = Context::enter();
    let tree = read_tree(expr, config)?;
    let region = BoundingBox::cube(Point3::origin(), bounds);

    let start = std::time::Instant::now();
    let mesh = render_mesh(&tree, &region, resolution, angle)?;
    if verbose {
        println!("Rendered in {:.2?}", start.elapsed());
    }
    print_mesh_line("mesh", &mesh);

    if let Some(output) = output {
        write_json(output, &mesh)?;
        println!("{} {}", "Wrote".green(), output.display());
    }
    ctx.exit()?;
    Ok(())
}

fn sample_command(expr: &str, at: &[f32], config: &PipelineConfig) -> Result<()> {
    let [x, y, z] = at else {
        bail!("expected a point as x,y,z");
    };
    let ctx = Context::enter();
    let tree = read_tree(expr, config)?;
    let value = tree.eval([*x, *y, *z])?;
    let label = if value < 0.0 {
        "inside".green()
    } else if value > 0.0 {
        "outside".yellow()
    } else {
        "on surface".cyan()
    };
    println!("f({}, {}, {}) = {} ({})", x, y, z, value, label);
    ctx.exit()?;
    Ok(())
}

fn save_command(expr: &str, output: &Path, config: &PipelineConfig) -> Result<()> {
    let ctx = Context::enter();
    let tree = read_tree(expr, config)?;
    tree.save(output)
        .with_context(|| format!("Failed to write tree archive: {}", output.display()))?;
    println!("{} {}", "Saved".green(), output.display());
    ctx.exit()?;
    Ok(())
}

fn print_command(archive: &Path, config: &PipelineConfig) -> Result<()> {
    let ctx = Context::enter();
    let tree = Tree::load(&config.kernel(), archive)
        .with_context(|| format!("Failed to load tree archive: {}", archive.display()))?;
    println!("{}", tree.to_sexpr()?);
    ctx.exit()?;
    Ok(())
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string(value).context("Failed to serialize mesh")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

fn print_mesh_line(name: &str, mesh: &Mesh) {
    println!(
        "  {} {} vertices, {} triangles",
        name.cyan(),
        mesh.vertex_count().to_string().bold(),
        mesh.triangle_count().to_string().bold()
    );
    if !mesh.is_empty() {
        let bounds = mesh.bounding_box();
        println!(
            "    bounds [{:.3}, {:.3}, {:.3}] .. [{:.3}, {:.3}, {:.3}]",
            bounds.min.x, bounds.min.y, bounds.min.z, bounds.max.x, bounds.max.y, bounds.max.z
        );
    }
}

fn print_stats(stats: &CacheStats) {
    println!("\n{}", "Cache:".bold());
    println!("  Shapes:      {}/{} cached", stats.cached_nodes, stats.total_nodes);
    println!("  Evaluations: {}", stats.evaluations);
    println!("  Hit rate:    {:.1}%", stats.hit_rate());
}

fn report_error(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message);
}
