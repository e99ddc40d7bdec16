//! Whole-grid build driver
//!
//! Plans the tile grid, sizes the identifier space, initialises the
//! [`TiledNavMesh`] and feeds it every tile that builds. Tiles are built
//! independently, sequentially or on the rayon pool, and the mesh is only
//! touched behind a single mutex.

use std::fmt;

use parking_lot::Mutex;
use tilenav_common::TriMesh;
use tilenav_detour::{
    export_nav_mesh, IdentifierPolicy, IdentifierSpace, NavMeshParams, Status, TiledNavMesh,
};
use tilenav_recast::BuildContext;

use crate::engine::{GeometryEngine, RecastEngine};
use crate::error::TileBuildError;
use crate::grid::TileGridPlanner;
use crate::tile_builder::{TileBuildOutput, TileMeshBuilder};
use crate::{
    AgentParams, AreaOverlay, BuildFlags, CancellationToken, GridConfig, TileConfig,
    TileCoordinate,
};

/// Outcome code of a whole build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum BuildStatus {
    Ok = 0,
    ErrMemory = 1,
    ErrInitTileNavMesh = 2,
    ErrBuildTile = 3,
    ErrAddTile = 4,
    ErrUnknown = 5,
}

impl BuildStatus {
    pub fn is_ok(self) -> bool {
        self == BuildStatus::Ok
    }

    pub fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildStatus::Ok => "ok",
            BuildStatus::ErrMemory => "out of memory",
            BuildStatus::ErrInitTileNavMesh => "could not initialise the tiled navmesh",
            BuildStatus::ErrBuildTile => "no tile could be built",
            BuildStatus::ErrAddTile => "no built tile could be added",
            BuildStatus::ErrUnknown => "unknown error",
        };
        f.write_str(s)
    }
}

/// Outcome code of [`export_tiled_nav_mesh`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ExportStatus {
    Ok = 0,
    ErrVertices = 1,
    ErrBuildNavmesh = 2,
    ErrAllocNavmesh = 3,
    ErrInvalidParam = 4,
}

impl ExportStatus {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExportStatus::Ok => "ok",
            ExportStatus::ErrVertices => "invalid vertices",
            ExportStatus::ErrBuildNavmesh => "navmesh could not be serialized",
            ExportStatus::ErrAllocNavmesh => "export buffer allocation failed",
            ExportStatus::ErrInvalidParam => "invalid parameter",
        };
        f.write_str(s)
    }
}

impl std::error::Error for ExportStatus {}

/// Why one tile is missing from the result
#[derive(Debug)]
pub enum TileFailureKind {
    /// The pipeline failed or produced nothing
    Build(TileBuildError),
    /// The mesh rejected the payload
    Add(Status),
}

impl fmt::Display for TileFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileFailureKind::Build(e) => write!(f, "build: {}", e),
            TileFailureKind::Add(s) => write!(f, "add: {}", s),
        }
    }
}

#[derive(Debug)]
pub struct TileFailure {
    pub coord: TileCoordinate,
    pub kind: TileFailureKind,
}

/// Result of [`TiledNavMeshBuilder::build`]
#[derive(Debug)]
pub struct BuildResult {
    pub status: BuildStatus,
    /// The assembled mesh, present whenever it could be initialised
    pub nav_mesh: Option<TiledNavMesh>,
    pub tiles_built: usize,
    pub total_tiles: usize,
    /// Tiles that failed, excluding tiles without walkable polygons
    pub failures: Vec<TileFailure>,
    pub identifier_space: Option<IdentifierSpace>,
    pub cancelled: bool,
}

impl BuildResult {
    fn failed(status: BuildStatus) -> Self {
        Self {
            status,
            nav_mesh: None,
            tiles_built: 0,
            total_tiles: 0,
            failures: Vec::new(),
            identifier_space: None,
            cancelled: false,
        }
    }
}

struct Assembly {
    nav_mesh: TiledNavMesh,
    tiles_built: usize,
    tiles_rejected: usize,
    failures: Vec<TileFailure>,
    cancelled: bool,
}

impl Assembly {
    fn ingest(&mut self, result: Result<TileBuildOutput, TileBuildError>, coord: TileCoordinate) {
        match result {
            Ok(output) => match self.nav_mesh.replace_tile(output.data) {
                Ok(_) => {
                    self.tiles_built += 1;
                    log::debug!("tile {} added ({} polygons)", coord, output.poly_count);
                }
                Err(status) => {
                    log::warn!("tile {} could not be added: {}", coord, status);
                    self.tiles_rejected += 1;
                    self.failures.push(TileFailure {
                        coord,
                        kind: TileFailureKind::Add(status),
                    });
                }
            },
            Err(TileBuildError::Empty) => {}
            Err(e) => {
                if e.is_cancelled() {
                    self.cancelled = true;
                } else {
                    log::warn!("tile {} failed: {}", coord, e);
                }
                self.failures.push(TileFailure {
                    coord,
                    kind: TileFailureKind::Build(e),
                });
            }
        }
    }
}

/// Builds a tiled navigation mesh over a whole triangle mesh
pub struct TiledNavMeshBuilder<E: GeometryEngine = RecastEngine> {
    engine: E,
    grid: GridConfig,
    tile: TileConfig,
    flags: BuildFlags,
    agent: AgentParams,
    policy: IdentifierPolicy,
    parallel: bool,
    cancel: Option<CancellationToken>,
}

impl TiledNavMeshBuilder<RecastEngine> {
    pub fn new(grid: GridConfig, tile: TileConfig) -> Self {
        Self::with_engine(RecastEngine, grid, tile)
    }
}

impl<E: GeometryEngine> TiledNavMeshBuilder<E> {
    pub fn with_engine(engine: E, grid: GridConfig, tile: TileConfig) -> Self {
        Self {
            engine,
            grid,
            tile,
            flags: BuildFlags::standard(),
            agent: AgentParams::default(),
            policy: IdentifierPolicy::default(),
            parallel: false,
            cancel: None,
        }
    }

    pub fn with_flags(mut self, flags: BuildFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_agent(mut self, agent: AgentParams) -> Self {
        self.agent = agent;
        self
    }

    pub fn with_identifier_policy(mut self, policy: IdentifierPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Builds tiles on the rayon pool. Without the `parallel` feature tiles
    /// are always built in order.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn grid(&self) -> &GridConfig {
        &self.grid
    }

    pub fn planner(&self) -> TileGridPlanner {
        TileGridPlanner::new(&self.grid, &self.tile)
    }

    /// Builds every tile of the grid.
    ///
    /// Tile failures only lower `tiles_built`; the status is an error when
    /// the mesh cannot be initialised or no tile made it in.
    pub fn build(&self, geometry: &TriMesh, overlays: &[AreaOverlay]) -> BuildResult {
        if let Err(e) = self.grid.validate().and_then(|_| self.tile.validate()) {
            log::error!("invalid build configuration: {}", e);
            return BuildResult::failed(BuildStatus::ErrInitTileNavMesh);
        }

        let planner = self.planner();
        let total_tiles = planner.total_tiles();
        let space = self.policy.allocate(total_tiles);
        let (tw, th) = planner.tile_counts();
        log::info!(
            "building {}x{} tiles ({} total), {} tile bits, {} poly bits",
            tw,
            th,
            total_tiles,
            space.tile_bits,
            space.poly_bits
        );

        let params = NavMeshParams {
            origin: planner.origin().to_array(),
            tile_width: planner.tile_world_size(),
            tile_height: planner.tile_world_size(),
            max_tiles: space.max_tiles(),
            max_polys: space.max_polys_per_tile(),
        };
        let nav_mesh = match TiledNavMesh::new(params) {
            Ok(mesh) => mesh,
            Err(status) => {
                log::error!("could not initialise tiled navmesh: {}", status);
                let mut result = BuildResult::failed(BuildStatus::ErrInitTileNavMesh);
                result.total_tiles = total_tiles as usize;
                result.identifier_space = Some(space);
                return result;
            }
        };

        let assembly = Mutex::new(Assembly {
            nav_mesh,
            tiles_built: 0,
            tiles_rejected: 0,
            failures: Vec::new(),
            cancelled: false,
        });

        let mut builder = TileMeshBuilder::new(&self.engine, &self.grid, self.tile)
            .with_flags(self.flags)
            .with_agent(self.agent)
            .with_overlays(overlays);
        if let Some(token) = &self.cancel {
            builder = builder.with_cancellation(token);
        }

        let coords: Vec<TileCoordinate> = planner.coordinates().collect();
        let build_one = |coord: TileCoordinate| {
            if self.is_cancelled() {
                assembly.lock().cancelled = true;
                return;
            }
            let (bmin, bmax) = planner.bordered_tile_bounds(coord.x, coord.y);
            let mut ctx = BuildContext::with_label(format!("tile {}", coord));
            let result = builder.build_tile(&mut ctx, geometry, coord, bmin, bmax);
            assembly.lock().ingest(result, coord);
        };
        self.run(coords, build_one);

        let assembly = assembly.into_inner();
        let status = if assembly.tiles_built > 0 {
            BuildStatus::Ok
        } else if assembly.tiles_rejected > 0 {
            BuildStatus::ErrAddTile
        } else {
            BuildStatus::ErrBuildTile
        };

        if status.is_ok() {
            log::info!("built {}/{} tiles", assembly.tiles_built, total_tiles);
        } else {
            log::warn!("built 0/{} tiles: {}", total_tiles, status);
        }

        BuildResult {
            status,
            nav_mesh: Some(assembly.nav_mesh),
            tiles_built: assembly.tiles_built,
            total_tiles: total_tiles as usize,
            failures: assembly.failures,
            identifier_space: Some(space),
            cancelled: assembly.cancelled,
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    #[cfg(feature = "parallel")]
    fn run<F>(&self, coords: Vec<TileCoordinate>, build_one: F)
    where
        F: Fn(TileCoordinate) + Sync + Send,
    {
        use rayon::prelude::*;

        if self.parallel {
            coords.into_par_iter().for_each(build_one);
        } else {
            coords.into_iter().for_each(build_one);
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn run<F>(&self, coords: Vec<TileCoordinate>, build_one: F)
    where
        F: Fn(TileCoordinate),
    {
        if self.parallel {
            log::debug!("built without the parallel feature, building tiles in order");
        }
        coords.into_iter().for_each(build_one);
    }
}

/// Serializes a built mesh into the navmesh set format
pub fn export_tiled_nav_mesh(nav_mesh: Option<&TiledNavMesh>) -> Result<Vec<u8>, ExportStatus> {
    let Some(mesh) = nav_mesh else {
        return Err(ExportStatus::ErrInvalidParam);
    };
    export_nav_mesh(mesh).map_err(|status| match status {
        Status::OutOfMemory => ExportStatus::ErrAllocNavmesh,
        Status::InvalidParam => ExportStatus::ErrInvalidParam,
        _ => ExportStatus::ErrBuildNavmesh,
    })
}
