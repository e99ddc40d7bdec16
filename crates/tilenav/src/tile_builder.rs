//! Single-tile build pipeline
//!
//! Voxelizes the base geometry and the area overlays for one tile, filters
//! and compacts the spans, erodes by the agent radius, stamps the overlays,
//! partitions, traces contours, polygonizes and packs the result. A failing
//! stage aborts the tile; the intermediates built so far are dropped on the
//! way out.

use std::collections::BTreeMap;

use glam::Vec3;
use tilenav_common::TriMesh;
use tilenav_recast::{BuildContext, RC_NULL_AREA, RC_WALKABLE_AREA};

use crate::engine::{GeometryEngine, PackParams};
use crate::error::{BuildStage, TileBuildError};
use crate::{
    AgentParams, AreaOverlay, BuildFlags, CancellationToken, GridConfig, PartitionType,
    TileConfig, TileCoordinate,
};

/// Area id of polygons that kept the engine's default walkable area
pub const GROUND_AREA: u8 = 1;
/// Traversal flag of every polygon that is not excluded
pub const WALKABLE_FLAG: u16 = 1;

/// Packed payload of one successfully built tile
#[derive(Debug, Clone, PartialEq)]
pub struct TileBuildOutput {
    pub coord: TileCoordinate,
    /// Relocatable tile payload
    pub data: Vec<u8>,
    pub poly_count: usize,
    /// Polygons per area id, counted before ground promotion
    pub area_stats: BTreeMap<u8, usize>,
}

/// Builds tiles of one grid from shared, read-only inputs
pub struct TileMeshBuilder<'a, E: GeometryEngine> {
    engine: &'a E,
    grid: &'a GridConfig,
    tile: TileConfig,
    flags: BuildFlags,
    agent: AgentParams,
    overlays: &'a [AreaOverlay],
    cancel: Option<&'a CancellationToken>,
}

impl<'a, E: GeometryEngine> TileMeshBuilder<'a, E> {
    pub fn new(engine: &'a E, grid: &'a GridConfig, tile: TileConfig) -> Self {
        Self {
            engine,
            grid,
            tile,
            flags: BuildFlags::standard(),
            agent: AgentParams::default(),
            overlays: &[],
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

    pub fn with_overlays(mut self, overlays: &'a [AreaOverlay]) -> Self {
        self.overlays = overlays;
        self
    }

    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn check(&self, stage: BuildStage) -> Result<(), TileBuildError> {
        match self.cancel {
            Some(token) if token.is_cancelled() => Err(TileBuildError::Cancelled(stage)),
            _ => Ok(()),
        }
    }

    /// Builds tile `coord` from `geometry`.
    ///
    /// `bmin`/`bmax` are the tile bounds already grown by the border.
    pub fn build_tile(
        &self,
        ctx: &mut BuildContext,
        geometry: &TriMesh,
        coord: TileCoordinate,
        bmin: Vec3,
        bmax: Vec3,
    ) -> Result<TileBuildOutput, TileBuildError> {
        let engine = self.engine;
        let cfg = self.grid.recast_config(&self.tile, bmin, bmax);

        self.check(BuildStage::Allocation)?;
        let mut hf = engine
            .alloc_heightfield(ctx, &cfg)
            .map_err(TileBuildError::at(BuildStage::Allocation))?;

        self.check(BuildStage::Rasterization)?;
        {
            let verts = &geometry.vertices;
            let tris = &geometry.indices;
            let mut areas = vec![RC_NULL_AREA; tris.len() / 3];
            engine
                .mark_walkable_triangles(ctx, cfg.walkable_slope_angle, verts, tris, &mut areas)
                .map_err(TileBuildError::at(BuildStage::Rasterization))?;
            engine
                .rasterize_triangles(ctx, verts, tris, &areas, &mut hf, cfg.walkable_climb)
                .map_err(TileBuildError::at(BuildStage::Rasterization))?;
        }

        // Overlay triangles add walkable surface of their own
        for overlay in self.overlays.iter().filter(|o| !o.is_empty()) {
            let areas = vec![RC_WALKABLE_AREA; overlay.triangle_count()];
            engine
                .rasterize_triangles(
                    ctx,
                    &overlay.vertices,
                    &overlay.indices,
                    &areas,
                    &mut hf,
                    cfg.walkable_climb,
                )
                .map_err(TileBuildError::at(BuildStage::Rasterization))?;
        }

        self.check(BuildStage::Filtering)?;
        self.filter(ctx, &cfg, &mut hf)
            .map_err(TileBuildError::at(BuildStage::Filtering))?;

        self.check(BuildStage::Compaction)?;
        let mut chf = engine
            .build_compact_heightfield(ctx, cfg.walkable_height, cfg.walkable_climb, &hf)
            .map_err(TileBuildError::at(BuildStage::Compaction))?;
        drop(hf);

        self.check(BuildStage::Erosion)?;
        engine
            .erode_walkable_area(ctx, cfg.walkable_radius, &mut chf)
            .map_err(TileBuildError::at(BuildStage::Erosion))?;

        // After erosion, so overlay areas are not eroded away
        self.check(BuildStage::AreaMarking)?;
        let marked = engine.mark_areas(ctx, self.overlays, &mut chf);
        if marked > 0 {
            ctx.log_debug(format!("tile {}: {} spans reclassified by overlays", coord, marked));
        }

        self.check(BuildStage::Partitioning)?;
        self.partition(ctx, &cfg, &mut chf)
            .map_err(TileBuildError::at(BuildStage::Partitioning))?;

        self.check(BuildStage::Contours)?;
        let cset = engine
            .build_contours(ctx, &chf, cfg.max_simplification_error, cfg.max_edge_len)
            .map_err(TileBuildError::at(BuildStage::Contours))?;

        self.check(BuildStage::PolyMesh)?;
        let nvp = cfg.max_vertices_per_polygon.max(0) as usize;
        let mut pmesh = engine
            .build_poly_mesh(ctx, &cset, nvp)
            .map_err(TileBuildError::at(BuildStage::PolyMesh))?;
        drop(cset);

        if engine.poly_areas_and_flags(&mut pmesh).0.is_empty() {
            ctx.log_debug(format!("tile {}: no polygons", coord));
            return Err(TileBuildError::Empty);
        }

        self.check(BuildStage::DetailMesh)?;
        let dmesh = engine
            .build_detail_mesh(
                ctx,
                &pmesh,
                &chf,
                cfg.detail_sample_dist,
                cfg.detail_sample_max_error,
            )
            .map_err(TileBuildError::at(BuildStage::DetailMesh))?;
        drop(chf);

        self.check(BuildStage::AreaFlags)?;
        let (areas, flags) = engine.poly_areas_and_flags(&mut pmesh);
        let area_stats = assign_areas_and_flags(areas, flags);
        let poly_count = areas.len();
        ctx.log_info(format!(
            "tile {}: {} polygons, areas {}",
            coord,
            poly_count,
            format_area_stats(&area_stats)
        ));

        self.check(BuildStage::Packing)?;
        let params = PackParams {
            tile_x: coord.x,
            tile_y: coord.y,
            tile_layer: coord.layer,
            agent: self.agent,
            build_bv_tree: true,
        };
        let data = engine
            .pack_tile_data(&pmesh, &dmesh, &params)
            .map_err(TileBuildError::at(BuildStage::Packing))?;

        Ok(TileBuildOutput {
            coord,
            data,
            poly_count,
            area_stats,
        })
    }

    fn filter(
        &self,
        ctx: &mut BuildContext,
        cfg: &tilenav_recast::RecastConfig,
        hf: &mut E::Heightfield,
    ) -> tilenav_common::Result<()> {
        if self.flags.contains(BuildFlags::FILTER_LOW_HANGING_OBSTACLES) {
            self.engine
                .filter_low_hanging_obstacles(ctx, cfg.walkable_climb, hf)?;
        }
        if self.flags.contains(BuildFlags::FILTER_LEDGE_SPANS) {
            self.engine
                .filter_ledge_spans(ctx, cfg.walkable_height, cfg.walkable_climb, hf)?;
        }
        if self.flags.contains(BuildFlags::FILTER_WALKABLE_LOW_HEIGHT_SPANS) {
            self.engine
                .filter_walkable_low_height_spans(ctx, cfg.walkable_height, hf)?;
        }
        Ok(())
    }

    fn partition(
        &self,
        ctx: &mut BuildContext,
        cfg: &tilenav_recast::RecastConfig,
        chf: &mut E::CompactHeightfield,
    ) -> tilenav_common::Result<()> {
        let engine = self.engine;
        match self.flags.partition() {
            PartitionType::Watershed => {
                engine.build_distance_field(ctx, chf)?;
                engine.build_regions_watershed(
                    ctx,
                    chf,
                    cfg.border_size,
                    cfg.min_region_area,
                    cfg.merge_region_area,
                )
            }
            PartitionType::Monotone => engine.build_regions_monotone(
                ctx,
                chf,
                cfg.border_size,
                cfg.min_region_area,
                cfg.merge_region_area,
            ),
            PartitionType::Layer => {
                engine.build_layer_regions(ctx, chf, cfg.border_size, cfg.min_region_area)
            }
        }
    }
}

/// Counts polygons per area, promotes the default walkable area to
/// [`GROUND_AREA`] and gives every non-null polygon [`WALKABLE_FLAG`].
pub fn assign_areas_and_flags(areas: &mut [u8], flags: &mut [u16]) -> BTreeMap<u8, usize> {
    let mut stats = BTreeMap::new();
    for (area, flag) in areas.iter_mut().zip(flags.iter_mut()) {
        *stats.entry(*area).or_insert(0) += 1;
        if *area == RC_WALKABLE_AREA {
            *area = GROUND_AREA;
        }
        *flag = if *area == RC_NULL_AREA { 0 } else { WALKABLE_FLAG };
    }
    stats
}

fn format_area_stats(stats: &BTreeMap<u8, usize>) -> String {
    stats
        .iter()
        .map(|(area, count)| format!("{}:{}", area, count))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_areas_and_flags() {
        let mut areas = [RC_WALKABLE_AREA, 2, RC_NULL_AREA, RC_WALKABLE_AREA, 9];
        let mut flags = [7u16; 5];
        let stats = assign_areas_and_flags(&mut areas, &mut flags);

        assert_eq!(areas, [GROUND_AREA, 2, RC_NULL_AREA, GROUND_AREA, 9]);
        assert_eq!(flags, [1, 1, 0, 1, 1]);
        assert_eq!(stats.get(&RC_WALKABLE_AREA), Some(&2));
        assert_eq!(stats.get(&2), Some(&1));
        assert_eq!(stats.get(&RC_NULL_AREA), Some(&1));
        assert_eq!(stats.get(&GROUND_AREA), None);
    }

    #[test]
    fn test_format_area_stats() {
        let stats = BTreeMap::from([(1u8, 3usize), (63, 2)]);
        assert_eq!(format_area_stats(&stats), "1:3 63:2");
    }
}
