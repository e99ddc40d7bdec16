//! Tiled navigation mesh building
//!
//! Splits a world into a grid of tiles, builds each tile independently
//! through a [`GeometryEngine`] and assembles the payloads into one
//! [`TiledNavMesh`], which can be exported in the navmesh set format.
//!
//! ```no_run
//! use tilenav::{GridConfig, TileConfig, TiledNavMeshBuilder};
//! use tilenav_common::TriMesh;
//!
//! let mesh = TriMesh::from_obj("level.obj").unwrap();
//! let (mut bmin, mut bmax) = mesh.calculate_bounds();
//! // flat floors need some height to voxelize into
//! bmin.y -= 0.2;
//! bmax.y += 2.0;
//! let result = TiledNavMeshBuilder::new(GridConfig::new(bmin, bmax), TileConfig::new(32))
//!     .with_parallel(true)
//!     .build(&mesh, &[]);
//! println!("{}/{} tiles", result.tiles_built, result.total_tiles);
//! ```

mod area_marker;
mod builder;
mod cancel;
mod config;
mod engine;
mod error;
mod grid;
mod tile_builder;

pub use area_marker::{overlays_from_arrays, AreaMarker, AreaOverlay};
pub use builder::{
    export_tiled_nav_mesh, BuildResult, BuildStatus, ExportStatus, TileFailure, TileFailureKind,
    TiledNavMeshBuilder,
};
pub use cancel::CancellationToken;
pub use config::{AgentParams, BuildFlags, GridConfig, PartitionType, TileConfig};
pub use engine::{GeometryEngine, PackParams, RecastEngine};
pub use error::{BuildStage, TileBuildError};
pub use grid::{calc_tile_bounds, grid_size, tile_pos, TileCoordinate, TileGridPlanner};
pub use tile_builder::{
    assign_areas_and_flags, TileBuildOutput, TileMeshBuilder, GROUND_AREA, WALKABLE_FLAG,
};

pub use tilenav_detour::{IdentifierPolicy, IdentifierSpace, NavMeshParams, TiledNavMesh};

#[cfg(test)]
mod engine_tests;
