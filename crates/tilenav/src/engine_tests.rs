//! Pipeline and driver tests against an engine double that counts live
//! intermediates and fails on request

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use glam::Vec3;
use parking_lot::Mutex;
use tilenav_common::{Error, Result, TriMesh};
use tilenav_detour::{create_nav_mesh_data, NavMeshCreateParams, TileData, NAVMESHSET_MAGIC};
use tilenav_recast::{BuildContext, RecastConfig, MESH_NULL_IDX, RC_NULL_AREA, RC_WALKABLE_AREA};

use crate::*;

#[derive(Debug, Default, Clone)]
struct Counters {
    live: Arc<AtomicUsize>,
    allocated: Arc<AtomicUsize>,
}

impl Counters {
    fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }
}

/// Decrements the live count when dropped
struct Tracked {
    live: Arc<AtomicUsize>,
}

impl Tracked {
    fn new(counters: &Counters) -> Self {
        counters.live.fetch_add(1, Ordering::SeqCst);
        counters.allocated.fetch_add(1, Ordering::SeqCst);
        Self {
            live: counters.live.clone(),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

struct FakePolyMesh {
    _guard: Tracked,
    areas: Vec<u8>,
    flags: Vec<u16>,
}

struct FakeEngine {
    counters: Counters,
    fail_at: Option<BuildStage>,
    poly_areas: Vec<u8>,
    calls: Mutex<Vec<&'static str>>,
}

impl FakeEngine {
    fn new() -> Self {
        Self {
            counters: Counters::default(),
            fail_at: None,
            poly_areas: vec![RC_WALKABLE_AREA, 2],
            calls: Mutex::new(Vec::new()),
        }
    }

    fn failing_at(stage: BuildStage) -> Self {
        Self {
            fail_at: Some(stage),
            ..Self::new()
        }
    }

    fn step(&self, name: &'static str, stage: BuildStage) -> Result<()> {
        self.calls.lock().push(name);
        if self.fail_at == Some(stage) {
            return Err(Error::Recast(format!("{} failed on purpose", name)));
        }
        Ok(())
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }
}

impl GeometryEngine for FakeEngine {
    type Heightfield = Tracked;
    type CompactHeightfield = Tracked;
    type ContourSet = Tracked;
    type PolyMesh = FakePolyMesh;
    type DetailMesh = Tracked;

    fn alloc_heightfield(&self, _ctx: &mut BuildContext, _cfg: &RecastConfig) -> Result<Tracked> {
        self.step("alloc", BuildStage::Allocation)?;
        Ok(Tracked::new(&self.counters))
    }

    fn mark_walkable_triangles(
        &self,
        _ctx: &mut BuildContext,
        _slope: f32,
        _verts: &[f32],
        _tris: &[i32],
        areas: &mut [u8],
    ) -> Result<()> {
        areas.fill(RC_WALKABLE_AREA);
        self.step("mark_walkable", BuildStage::Rasterization)
    }

    fn rasterize_triangles(
        &self,
        _ctx: &mut BuildContext,
        _verts: &[f32],
        _tris: &[i32],
        _areas: &[u8],
        _hf: &mut Tracked,
        _climb: i32,
    ) -> Result<()> {
        self.step("rasterize", BuildStage::Rasterization)
    }

    fn filter_low_hanging_obstacles(
        &self,
        _ctx: &mut BuildContext,
        _climb: i32,
        _hf: &mut Tracked,
    ) -> Result<()> {
        self.step("filter_low_hanging", BuildStage::Filtering)
    }

    fn filter_ledge_spans(
        &self,
        _ctx: &mut BuildContext,
        _height: i32,
        _climb: i32,
        _hf: &mut Tracked,
    ) -> Result<()> {
        self.step("filter_ledge", BuildStage::Filtering)
    }

    fn filter_walkable_low_height_spans(
        &self,
        _ctx: &mut BuildContext,
        _height: i32,
        _hf: &mut Tracked,
    ) -> Result<()> {
        self.step("filter_low_height", BuildStage::Filtering)
    }

    fn build_compact_heightfield(
        &self,
        _ctx: &mut BuildContext,
        _height: i32,
        _climb: i32,
        _hf: &Tracked,
    ) -> Result<Tracked> {
        self.step("compact", BuildStage::Compaction)?;
        Ok(Tracked::new(&self.counters))
    }

    fn erode_walkable_area(
        &self,
        _ctx: &mut BuildContext,
        _radius: i32,
        _chf: &mut Tracked,
    ) -> Result<()> {
        self.step("erode", BuildStage::Erosion)
    }

    fn mark_areas(
        &self,
        _ctx: &mut BuildContext,
        overlays: &[AreaOverlay],
        _chf: &mut Tracked,
    ) -> usize {
        self.calls.lock().push("mark_areas");
        overlays.iter().filter(|o| !o.is_empty()).count()
    }

    fn build_distance_field(&self, _ctx: &mut BuildContext, _chf: &mut Tracked) -> Result<()> {
        self.step("distance_field", BuildStage::Partitioning)
    }

    fn build_regions_watershed(
        &self,
        _ctx: &mut BuildContext,
        _chf: &mut Tracked,
        _border: i32,
        _min: i32,
        _merge: i32,
    ) -> Result<()> {
        self.step("watershed", BuildStage::Partitioning)
    }

    fn build_regions_monotone(
        &self,
        _ctx: &mut BuildContext,
        _chf: &mut Tracked,
        _border: i32,
        _min: i32,
        _merge: i32,
    ) -> Result<()> {
        self.step("monotone", BuildStage::Partitioning)
    }

    fn build_layer_regions(
        &self,
        _ctx: &mut BuildContext,
        _chf: &mut Tracked,
        _border: i32,
        _min: i32,
    ) -> Result<()> {
        self.step("layers", BuildStage::Partitioning)
    }

    fn build_contours(
        &self,
        _ctx: &mut BuildContext,
        _chf: &Tracked,
        _max_error: f32,
        _max_edge_len: i32,
    ) -> Result<Tracked> {
        self.step("contours", BuildStage::Contours)?;
        Ok(Tracked::new(&self.counters))
    }

    fn build_poly_mesh(
        &self,
        _ctx: &mut BuildContext,
        _cset: &Tracked,
        _nvp: usize,
    ) -> Result<FakePolyMesh> {
        self.step("poly_mesh", BuildStage::PolyMesh)?;
        Ok(FakePolyMesh {
            _guard: Tracked::new(&self.counters),
            areas: self.poly_areas.clone(),
            flags: vec![0; self.poly_areas.len()],
        })
    }

    fn build_detail_mesh(
        &self,
        _ctx: &mut BuildContext,
        _pmesh: &FakePolyMesh,
        _chf: &Tracked,
        _sample_dist: f32,
        _sample_max_error: f32,
    ) -> Result<Tracked> {
        self.step("detail_mesh", BuildStage::DetailMesh)?;
        Ok(Tracked::new(&self.counters))
    }

    fn poly_areas_and_flags<'m>(
        &self,
        pmesh: &'m mut FakePolyMesh,
    ) -> (&'m mut [u8], &'m mut [u16]) {
        (&mut pmesh.areas, &mut pmesh.flags)
    }

    fn pack_tile_data(
        &self,
        pmesh: &FakePolyMesh,
        _dmesh: &Tracked,
        params: &PackParams,
    ) -> Result<Vec<u8>> {
        self.step("pack", BuildStage::Packing)?;
        const N: u16 = MESH_NULL_IDX;
        let verts: Vec<u16> = vec![0, 0, 0, 0, 0, 32, 32, 0, 32, 32, 0, 0];
        let polys: Vec<u16> = pmesh
            .areas
            .iter()
            .flat_map(|_| [0, 1, 2, 3, N, N, N, N, N, N, N, N])
            .collect();
        let bmin = [params.tile_x as f32 * 9.6, 0.0, params.tile_y as f32 * 9.6];
        let create = NavMeshCreateParams {
            verts: &verts,
            polys: &polys,
            poly_areas: &pmesh.areas,
            poly_flags: &pmesh.flags,
            nvp: 6,
            detail_meshes: &[],
            detail_verts: &[],
            detail_tris: &[],
            user_id: 0,
            tile_x: params.tile_x,
            tile_y: params.tile_y,
            tile_layer: params.tile_layer,
            bmin,
            bmax: [bmin[0] + 9.6, 1.0, bmin[2] + 9.6],
            walkable_height: params.agent.height,
            walkable_radius: params.agent.radius,
            walkable_climb: params.agent.max_climb,
            cs: 0.3,
            ch: 0.2,
            build_bv_tree: params.build_bv_tree,
        };
        Ok(create_nav_mesh_data(&create)?)
    }
}

fn grid(size: f32) -> GridConfig {
    GridConfig::new(Vec3::new(0.0, -1.0, 0.0), Vec3::new(size, 2.0, size)).with_cell_size(0.3, 0.2)
}

fn fake_driver() -> TiledNavMeshBuilder<FakeEngine> {
    TiledNavMeshBuilder::with_engine(FakeEngine::new(), grid(64.0), TileConfig::new(32))
}

fn geometry() -> TriMesh {
    TriMesh::from_buffers(
        vec![0.0, 0.0, 0.0, 0.0, 0.0, 9.0, 9.0, 0.0, 9.0, 9.0, 0.0, 0.0],
        vec![0, 2, 1, 0, 3, 2],
    )
    .unwrap()
}

fn build_one(
    engine: &FakeEngine,
    flags: BuildFlags,
    token: Option<&CancellationToken>,
) -> std::result::Result<TileBuildOutput, TileBuildError> {
    let grid = grid(9.0);
    let mut builder = TileMeshBuilder::new(engine, &grid, TileConfig::new(32)).with_flags(flags);
    if let Some(token) = token {
        builder = builder.with_cancellation(token);
    }
    let mut ctx = BuildContext::new();
    let planner = TileGridPlanner::new(&grid, &TileConfig::new(32));
    let (bmin, bmax) = planner.bordered_tile_bounds(0, 0);
    builder.build_tile(&mut ctx, &geometry(), TileCoordinate::new(0, 0), bmin, bmax)
}

#[test]
fn test_successful_tile_releases_intermediates() {
    let engine = FakeEngine::new();
    let output = build_one(&engine, BuildFlags::standard(), None).unwrap();

    assert_eq!(engine.counters.allocated(), 5);
    assert_eq!(engine.counters.live(), 0);
    assert_eq!(output.coord, TileCoordinate::new(0, 0));
    assert_eq!(output.poly_count, 2);
    assert!(!output.data.is_empty());
}

#[test]
fn test_every_stage_failure_releases_intermediates() {
    let stages = [
        BuildStage::Allocation,
        BuildStage::Rasterization,
        BuildStage::Filtering,
        BuildStage::Compaction,
        BuildStage::Erosion,
        BuildStage::Partitioning,
        BuildStage::Contours,
        BuildStage::PolyMesh,
        BuildStage::DetailMesh,
        BuildStage::Packing,
    ];

    for stage in stages {
        let engine = FakeEngine::failing_at(stage);
        let err = build_one(&engine, BuildFlags::standard(), None).unwrap_err();
        assert_eq!(err.stage(), Some(stage), "{}", err);
        assert!(matches!(err, TileBuildError::Stage { .. }));
        assert_eq!(engine.counters.live(), 0, "leak after failing {}", stage);
    }
}

#[test]
fn test_tile_without_polygons_is_empty() {
    let mut engine = FakeEngine::new();
    engine.poly_areas.clear();
    let err = build_one(&engine, BuildFlags::standard(), None).unwrap_err();
    assert!(matches!(err, TileBuildError::Empty));
    assert_eq!(engine.counters.live(), 0);
    assert!(!engine.calls().contains(&"detail_mesh"));
}

#[test]
fn test_cancelled_tile_allocates_nothing() {
    let engine = FakeEngine::new();
    let token = CancellationToken::new();
    token.cancel();
    let err = build_one(&engine, BuildFlags::standard(), Some(&token)).unwrap_err();
    assert!(matches!(err, TileBuildError::Cancelled(BuildStage::Allocation)));
    assert_eq!(engine.counters.allocated(), 0);
}

#[test]
fn test_flags_select_filters_and_partition() {
    let engine = FakeEngine::new();
    build_one(&engine, BuildFlags::standard(), None).unwrap();
    let calls = engine.calls();
    for name in [
        "filter_low_hanging",
        "filter_ledge",
        "filter_low_height",
        "distance_field",
        "watershed",
    ] {
        assert!(calls.contains(&name), "missing {}", name);
    }
    let erode = calls.iter().position(|c| *c == "erode").unwrap();
    let mark = calls.iter().position(|c| *c == "mark_areas").unwrap();
    let partition = calls.iter().position(|c| *c == "distance_field").unwrap();
    assert!(erode < mark && mark < partition);

    let engine = FakeEngine::new();
    build_one(&engine, BuildFlags::PARTITION_MONOTONE, None).unwrap();
    let calls = engine.calls();
    assert!(calls.contains(&"monotone"));
    assert!(!calls.iter().any(|c| c.starts_with("filter")));

    let engine = FakeEngine::new();
    build_one(&engine, BuildFlags::FILTER_LEDGE_SPANS, None).unwrap();
    let calls = engine.calls();
    assert!(calls.contains(&"layers"));
    assert!(calls.contains(&"filter_ledge"));
    assert!(!calls.contains(&"watershed"));
}

#[test]
fn test_packed_areas_and_flags() {
    let mut engine = FakeEngine::new();
    engine.poly_areas = vec![RC_WALKABLE_AREA, 2, RC_NULL_AREA];
    let output = build_one(&engine, BuildFlags::standard(), None).unwrap();

    assert_eq!(output.area_stats.get(&RC_WALKABLE_AREA), Some(&1));
    assert_eq!(output.area_stats.get(&2), Some(&1));
    assert_eq!(output.area_stats.get(&RC_NULL_AREA), Some(&1));

    let tile = TileData::from_bytes(&output.data).unwrap();
    let areas: Vec<u8> = tile.polys.iter().map(|p| p.area()).collect();
    let flags: Vec<u16> = tile.polys.iter().map(|p| p.flags.bits()).collect();
    assert_eq!(areas, vec![GROUND_AREA, 2, RC_NULL_AREA]);
    assert_eq!(flags, vec![WALKABLE_FLAG, WALKABLE_FLAG, 0]);
}

#[test]
fn test_driver_builds_every_tile() {
    let builder = fake_driver();
    let result = builder.build(&geometry(), &[]);

    assert_eq!(result.status, BuildStatus::Ok);
    assert_eq!(result.total_tiles, 49);
    assert_eq!(result.tiles_built, 49);
    assert!(result.failures.is_empty());

    let space = result.identifier_space.unwrap();
    assert_eq!((space.tile_bits, space.poly_bits), (6, 16));

    let mesh = result.nav_mesh.unwrap();
    assert_eq!(mesh.tile_count(), 49);
    assert_eq!(mesh.max_tiles(), 64);
    assert!(mesh.tile_at(6, 6, 0).is_some());
    assert!(mesh.tile_at(7, 0, 0).is_none());
    assert!((mesh.params().tile_width - 9.6).abs() < 1e-5);
}

#[test]
fn test_parallel_driver_matches_sequential() {
    let sequential = fake_driver().build(&geometry(), &[]);
    let parallel = fake_driver().with_parallel(true).build(&geometry(), &[]);

    assert_eq!(parallel.status, BuildStatus::Ok);
    assert_eq!(parallel.tiles_built, sequential.tiles_built);

    let locations = |r: &BuildResult| {
        let mut locs: Vec<(i32, i32, i32)> = r
            .nav_mesh
            .as_ref()
            .unwrap()
            .tile_states()
            .iter()
            .map(|s| (s.x, s.y, s.layer))
            .collect();
        locs.sort();
        locs
    };
    assert_eq!(locations(&parallel), locations(&sequential));
}

#[test]
fn test_tile_failures_do_not_abort_the_build() {
    let builder = TiledNavMeshBuilder::with_engine(
        FakeEngine::failing_at(BuildStage::Contours),
        grid(64.0),
        TileConfig::new(32),
    );
    let result = builder.build(&geometry(), &[]);

    assert_eq!(result.status, BuildStatus::ErrBuildTile);
    assert_eq!(result.tiles_built, 0);
    assert_eq!(result.failures.len(), 49);
    assert!(result.nav_mesh.is_some());
    assert!(result
        .failures
        .iter()
        .all(|f| matches!(
            f.kind,
            TileFailureKind::Build(TileBuildError::Stage {
                stage: BuildStage::Contours,
                ..
            })
        )));
}

#[test]
fn test_rejected_tiles_report_add_failure() {
    // 6 tile bits and no poly bits: one polygon per tile at most
    let builder = fake_driver().with_identifier_policy(IdentifierPolicy {
        total_bits: 6,
        max_tile_bits: 14,
    });
    let result = builder.build(&geometry(), &[]);

    assert_eq!(result.status, BuildStatus::ErrAddTile);
    assert_eq!(result.tiles_built, 0);
    assert!(result
        .failures
        .iter()
        .all(|f| matches!(f.kind, TileFailureKind::Add(_))));
}

#[test]
fn test_cancelled_build_stops() {
    let token = CancellationToken::new();
    token.cancel();
    let engine = FakeEngine::new();
    let counters = engine.counters.clone();
    let result = TiledNavMeshBuilder::with_engine(engine, grid(64.0), TileConfig::new(32))
        .with_cancellation(token)
        .build(&geometry(), &[]);

    assert!(result.cancelled);
    assert_eq!(result.tiles_built, 0);
    assert_eq!(result.status, BuildStatus::ErrBuildTile);
    assert_eq!(counters.allocated(), 0);
}

#[test]
fn test_invalid_config_fails_init() {
    let result = TiledNavMeshBuilder::with_engine(FakeEngine::new(), grid(64.0), TileConfig::new(0))
        .build(&geometry(), &[]);
    assert_eq!(result.status, BuildStatus::ErrInitTileNavMesh);
    assert!(result.nav_mesh.is_none());

    let flat = GridConfig::new(Vec3::ZERO, Vec3::new(10.0, 0.0, 10.0));
    let result = TiledNavMeshBuilder::with_engine(FakeEngine::new(), flat, TileConfig::new(32))
        .build(&geometry(), &[]);
    assert_eq!(result.status, BuildStatus::ErrInitTileNavMesh);
}

#[test]
fn test_export_status() {
    assert_eq!(export_tiled_nav_mesh(None), Err(ExportStatus::ErrInvalidParam));

    let result = TiledNavMeshBuilder::with_engine(FakeEngine::new(), grid(9.0), TileConfig::new(32))
        .build(&geometry(), &[]);
    let bytes = export_tiled_nav_mesh(result.nav_mesh.as_ref()).unwrap();
    let magic = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    assert_eq!(magic, NAVMESHSET_MAGIC);
    assert_eq!(ExportStatus::ErrAllocNavmesh.code(), 3);
    assert_eq!(BuildStatus::ErrAddTile.code(), 4);
}
