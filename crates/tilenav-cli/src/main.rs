//! Command-line front end for tiled navigation mesh building

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use glam::Vec3;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tilenav::{
    export_tiled_nav_mesh, AgentParams, AreaOverlay, BuildFlags, BuildStatus, GridConfig,
    TileConfig, TiledNavMeshBuilder,
};
use tilenav_common::TriMesh;
use tilenav_detour::{import_nav_mesh, read_set_header};

/// Builds and inspects tiled navigation meshes
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// More output (-v info, -vv debug)
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only print errors
    #[clap(short, long, global = true)]
    quiet: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a tiled navigation mesh from an OBJ file
    Build(BuildArgs),

    /// Print the header and tile table of a navmesh set
    Info {
        /// Navmesh set file
        #[clap(long, value_parser)]
        input: PathBuf,
    },

    /// Write the polygons of one tile as OBJ
    Extract {
        /// Navmesh set file
        #[clap(long, value_parser)]
        input: PathBuf,

        /// Tile coordinate (x,y)
        #[clap(long, value_parser = parse_tile)]
        tile: (i32, i32),

        /// Output OBJ file
        #[clap(long, value_parser)]
        output: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Partition {
    Watershed,
    Monotone,
    Layer,
}

#[derive(clap::Args, Debug, Clone)]
struct BuildArgs {
    /// Input mesh file (OBJ format)
    #[clap(long, value_parser)]
    input: PathBuf,

    /// Output navmesh set file
    #[clap(long, value_parser)]
    output: PathBuf,

    /// JSON file with a list of area overlays
    #[clap(long, value_parser)]
    overlays: Option<PathBuf>,

    /// JSON build settings, replacing the parameters given on the command line
    #[clap(long, value_parser)]
    settings: Option<PathBuf>,

    /// Tile edge length in cells
    #[clap(long, default_value = "32")]
    tile_size: i32,

    /// Cell size (horizontal resolution)
    #[clap(long, default_value = "0.3")]
    cs: f32,

    /// Cell height (vertical resolution)
    #[clap(long, default_value = "0.2")]
    ch: f32,

    /// Maximum slope in degrees that is considered walkable
    #[clap(long, default_value = "45.0")]
    walkable_slope_angle: f32,

    /// Agent height in world units
    #[clap(long, default_value = "2.0")]
    agent_height: f32,

    /// Agent radius in world units
    #[clap(long, default_value = "0.6")]
    agent_radius: f32,

    /// Maximum step height in world units
    #[clap(long, default_value = "0.9")]
    agent_max_climb: f32,

    /// Padding around each tile, in cells
    #[clap(long, default_value = "0")]
    border_size: i32,

    /// Region partitioning policy
    #[clap(long, value_enum, default_value = "watershed")]
    partition: Partition,

    /// Skip the span filters
    #[clap(long)]
    no_filters: bool,

    /// Build tiles on all cores
    #[clap(long)]
    parallel: bool,
}

/// Settings file layout, every section optional
#[derive(serde::Deserialize, serde::Serialize, Debug, Default)]
#[serde(default)]
struct SettingsFile {
    grid: Option<GridConfig>,
    tile: Option<TileConfig>,
    agent: Option<AgentParams>,
    flags: Option<BuildFlags>,
}

struct BuildPlan {
    grid: GridConfig,
    tile: TileConfig,
    agent: AgentParams,
    flags: BuildFlags,
}

fn parse_tile(s: &str) -> Result<(i32, i32), String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 2 {
        return Err(format!("tile must be x,y, got {}", s));
    }
    let x = parts[0].trim().parse::<i32>().map_err(|e| e.to_string())?;
    let y = parts[1].trim().parse::<i32>().map_err(|e| e.to_string())?;
    Ok((x, y))
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    match args.command {
        Commands::Build(build) => build_navmesh(&build),
        Commands::Info { input } => print_info(&input),
        Commands::Extract {
            input,
            tile,
            output,
        } => extract_tile(&input, tile, &output),
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        log::LevelFilter::Error
    } else {
        match verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        }
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

/// Resolves the build parameters from the command line and settings file
fn plan_build(args: &BuildArgs, bmin: Vec3, bmax: Vec3) -> Result<BuildPlan> {
    let settings = match &args.settings {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings {}", path.display()))?;
            serde_json::from_str::<SettingsFile>(&text)
                .with_context(|| format!("Failed to parse settings {}", path.display()))?
        }
        None => SettingsFile::default(),
    };

    // Voxel thresholds follow the agent size
    let agent = settings.agent.unwrap_or(AgentParams {
        height: args.agent_height,
        radius: args.agent_radius,
        max_climb: args.agent_max_climb,
    });

    let mut grid = settings.grid.unwrap_or_else(|| {
        GridConfig::new(bmin, bmax)
            .with_cell_size(args.cs, args.ch)
            .with_walkable_slope_angle(args.walkable_slope_angle)
            .with_walkable_height((agent.height / args.ch).ceil() as i32)
            .with_walkable_climb((agent.max_climb / args.ch).floor() as i32)
            .with_walkable_radius((agent.radius / args.cs).ceil() as i32)
            .with_border_size(args.border_size)
    });
    if !(grid.bmax.cmpgt(grid.bmin).all()) {
        grid.bmin = bmin;
        grid.bmax = bmax;
    }

    let tile = settings.tile.unwrap_or(TileConfig::new(args.tile_size));

    let flags = settings.flags.unwrap_or_else(|| {
        let mut flags = match args.partition {
            Partition::Watershed => BuildFlags::PARTITION_WATERSHED,
            Partition::Monotone => BuildFlags::PARTITION_MONOTONE,
            Partition::Layer => BuildFlags::empty(),
        };
        if !args.no_filters {
            flags |= BuildFlags::FILTER_LOW_HANGING_OBSTACLES
                | BuildFlags::FILTER_LEDGE_SPANS
                | BuildFlags::FILTER_WALKABLE_LOW_HEIGHT_SPANS;
        }
        flags
    });

    grid.validate().context("Invalid grid settings")?;
    tile.validate().context("Invalid tile settings")?;

    Ok(BuildPlan {
        grid,
        tile,
        agent,
        flags,
    })
}

fn load_overlays(path: &Path) -> Result<Vec<AreaOverlay>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read overlays {}", path.display()))?;
    let overlays: Vec<AreaOverlay> = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse overlays {}", path.display()))?;
    for (i, overlay) in overlays.iter().enumerate() {
        overlay
            .validate()
            .with_context(|| format!("Overlay {} in {} is invalid", i, path.display()))?;
    }
    Ok(overlays)
}

fn build_navmesh(args: &BuildArgs) -> Result<()> {
    let mesh = TriMesh::from_obj(&args.input)
        .with_context(|| format!("Failed to load mesh {}", args.input.display()))?;
    if mesh.is_empty() {
        bail!("{} contains no triangles", args.input.display());
    }
    let (mut bmin, mut bmax) = mesh.calculate_bounds();
    // room above the highest surface for the agent, and below flat ground
    bmin.y -= args.ch;
    bmax.y += args.agent_height;
    log::info!(
        "loaded {} vertices, {} triangles, bounds {:?}..{:?}",
        mesh.vert_count,
        mesh.tri_count,
        bmin,
        bmax
    );

    let overlays = match &args.overlays {
        Some(path) => load_overlays(path)?,
        None => Vec::new(),
    };

    let plan = plan_build(args, bmin, bmax)?;
    let result = TiledNavMeshBuilder::new(plan.grid, plan.tile)
        .with_flags(plan.flags)
        .with_agent(plan.agent)
        .with_parallel(args.parallel)
        .build(&mesh, &overlays);

    println!("Built {}/{} tiles", result.tiles_built, result.total_tiles);
    for failure in &result.failures {
        log::warn!("tile {}: {}", failure.coord, failure.kind);
    }
    if result.status != BuildStatus::Ok {
        bail!("Build failed: {} (code {})", result.status, result.status.code());
    }

    let data = export_tiled_nav_mesh(result.nav_mesh.as_ref())
        .map_err(|status| anyhow::anyhow!("Export failed: {} (code {})", status, status.code()))?;
    fs::write(&args.output, &data)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    println!("Wrote {} bytes to {}", data.len(), args.output.display());
    Ok(())
}

fn print_info(input: &Path) -> Result<()> {
    let data = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let header = read_set_header(&data).context("Not a navmesh set")?;
    let mesh = import_nav_mesh(&data).context("Failed to import navmesh set")?;

    let p = &header.params;
    println!("version:     {}", header.version);
    println!("tiles:       {}", header.num_tiles);
    println!("origin:      {:?}", p.origin);
    println!("tile size:   {} x {}", p.tile_width, p.tile_height);
    println!("max tiles:   {}", p.max_tiles);
    println!("max polys:   {}", p.max_polys);
    println!();
    println!("{:>18} {:>5} {:>5} {:>6} {:>8}", "ref", "x", "y", "polys", "bytes");
    for state in mesh.tile_states() {
        println!(
            "{:>18} {:>5} {:>5} {:>6} {:>8}",
            state.tile_ref.to_string(),
            state.x,
            state.y,
            state.poly_count,
            state.data_size
        );
    }
    Ok(())
}

fn extract_tile(input: &Path, (tx, ty): (i32, i32), output: &Path) -> Result<()> {
    let data = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let mesh = import_nav_mesh(&data).context("Failed to import navmesh set")?;
    let Some(geometry) = mesh.extract_tile_geometry(tx, ty) else {
        bail!("No tile at ({}, {})", tx, ty);
    };

    let vertices: Vec<f32> = geometry
        .vertices
        .chunks_exact(4)
        .flat_map(|v| [v[0], v[1], v[2]])
        .collect();
    let indices: Vec<i32> = geometry.indices.iter().map(|&i| i as i32).collect();
    let tri_mesh = TriMesh::from_buffers(vertices, indices).context("Tile geometry is invalid")?;

    let file = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    tri_mesh.write_obj(BufWriter::new(file))?;
    println!(
        "Wrote {} vertices, {} triangles to {}",
        geometry.vertex_count(),
        geometry.triangle_count(),
        output.display()
    );
    Ok(())
}
