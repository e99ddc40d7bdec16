//! Seam between the tile pipeline and the geometry-processing engine
//!
//! [`TileMeshBuilder`](crate::TileMeshBuilder) drives every stage through
//! [`GeometryEngine`]. Intermediates are owned values of the associated
//! types, so whatever the engine allocates is released when the pipeline
//! drops them, on the success path and at every early return.

use tilenav_common::Result;
use tilenav_detour::{create_nav_mesh_data, NavMeshCreateParams};
use tilenav_recast::{
    build_contours, build_distance_field, build_layer_regions, build_poly_mesh,
    build_poly_mesh_detail, build_regions_monotone, build_regions_watershed, erode_walkable_area,
    filter_ledge_spans, filter_low_hanging_walkable_obstacles, filter_walkable_low_height_spans,
    mark_walkable_triangles, rasterize_triangles, BuildContext, CompactHeightfield, ContourSet,
    Heightfield, PolyMesh, PolyMeshDetail, RecastConfig,
};

use crate::{AgentParams, AreaMarker, AreaOverlay};

/// Tile placement and agent data written into a packed tile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackParams {
    pub tile_x: i32,
    pub tile_y: i32,
    pub tile_layer: i32,
    pub agent: AgentParams,
    pub build_bv_tree: bool,
}

/// Operations the tile pipeline needs from a geometry-processing engine
pub trait GeometryEngine: Sync {
    type Heightfield: Send;
    type CompactHeightfield: Send;
    type ContourSet: Send;
    type PolyMesh: Send;
    type DetailMesh: Send;

    /// Allocates an empty heightfield covering `cfg`'s bounds and grid
    fn alloc_heightfield(&self, ctx: &mut BuildContext, cfg: &RecastConfig)
        -> Result<Self::Heightfield>;

    /// Sets the walkable area on triangles flatter than the slope limit
    fn mark_walkable_triangles(
        &self,
        ctx: &mut BuildContext,
        walkable_slope_angle: f32,
        verts: &[f32],
        tris: &[i32],
        areas: &mut [u8],
    ) -> Result<()>;

    fn rasterize_triangles(
        &self,
        ctx: &mut BuildContext,
        verts: &[f32],
        tris: &[i32],
        areas: &[u8],
        hf: &mut Self::Heightfield,
        walkable_climb: i32,
    ) -> Result<()>;

    fn filter_low_hanging_obstacles(
        &self,
        ctx: &mut BuildContext,
        walkable_climb: i32,
        hf: &mut Self::Heightfield,
    ) -> Result<()>;

    fn filter_ledge_spans(
        &self,
        ctx: &mut BuildContext,
        walkable_height: i32,
        walkable_climb: i32,
        hf: &mut Self::Heightfield,
    ) -> Result<()>;

    fn filter_walkable_low_height_spans(
        &self,
        ctx: &mut BuildContext,
        walkable_height: i32,
        hf: &mut Self::Heightfield,
    ) -> Result<()>;

    fn build_compact_heightfield(
        &self,
        ctx: &mut BuildContext,
        walkable_height: i32,
        walkable_climb: i32,
        hf: &Self::Heightfield,
    ) -> Result<Self::CompactHeightfield>;

    fn erode_walkable_area(
        &self,
        ctx: &mut BuildContext,
        radius: i32,
        chf: &mut Self::CompactHeightfield,
    ) -> Result<()>;

    /// Applies area overlays, returns the number of spans tagged
    fn mark_areas(
        &self,
        ctx: &mut BuildContext,
        overlays: &[AreaOverlay],
        chf: &mut Self::CompactHeightfield,
    ) -> usize;

    fn build_distance_field(
        &self,
        ctx: &mut BuildContext,
        chf: &mut Self::CompactHeightfield,
    ) -> Result<()>;

    fn build_regions_watershed(
        &self,
        ctx: &mut BuildContext,
        chf: &mut Self::CompactHeightfield,
        border_size: i32,
        min_region_area: i32,
        merge_region_area: i32,
    ) -> Result<()>;

    fn build_regions_monotone(
        &self,
        ctx: &mut BuildContext,
        chf: &mut Self::CompactHeightfield,
        border_size: i32,
        min_region_area: i32,
        merge_region_area: i32,
    ) -> Result<()>;

    fn build_layer_regions(
        &self,
        ctx: &mut BuildContext,
        chf: &mut Self::CompactHeightfield,
        border_size: i32,
        min_region_area: i32,
    ) -> Result<()>;

    fn build_contours(
        &self,
        ctx: &mut BuildContext,
        chf: &Self::CompactHeightfield,
        max_error: f32,
        max_edge_len: i32,
    ) -> Result<Self::ContourSet>;

    fn build_poly_mesh(
        &self,
        ctx: &mut BuildContext,
        cset: &Self::ContourSet,
        nvp: usize,
    ) -> Result<Self::PolyMesh>;

    fn build_detail_mesh(
        &self,
        ctx: &mut BuildContext,
        pmesh: &Self::PolyMesh,
        chf: &Self::CompactHeightfield,
        sample_dist: f32,
        sample_max_error: f32,
    ) -> Result<Self::DetailMesh>;

    /// Per-polygon area ids and flags, for post-processing in place
    fn poly_areas_and_flags<'m>(
        &self,
        pmesh: &'m mut Self::PolyMesh,
    ) -> (&'m mut [u8], &'m mut [u16]);

    /// Packs the meshes into a relocatable tile payload
    fn pack_tile_data(
        &self,
        pmesh: &Self::PolyMesh,
        dmesh: &Self::DetailMesh,
        params: &PackParams,
    ) -> Result<Vec<u8>>;
}

/// [`GeometryEngine`] backed by `tilenav-recast` and the `tilenav-detour` packer
#[derive(Debug, Clone, Copy, Default)]
pub struct RecastEngine;

impl GeometryEngine for RecastEngine {
    type Heightfield = Heightfield;
    type CompactHeightfield = CompactHeightfield;
    type ContourSet = ContourSet;
    type PolyMesh = PolyMesh;
    type DetailMesh = PolyMeshDetail;

    fn alloc_heightfield(
        &self,
        _ctx: &mut BuildContext,
        cfg: &RecastConfig,
    ) -> Result<Heightfield> {
        cfg.validate()?;
        Heightfield::new(cfg.width, cfg.height, cfg.bmin, cfg.bmax, cfg.cs, cfg.ch)
    }

    fn mark_walkable_triangles(
        &self,
        _ctx: &mut BuildContext,
        walkable_slope_angle: f32,
        verts: &[f32],
        tris: &[i32],
        areas: &mut [u8],
    ) -> Result<()> {
        mark_walkable_triangles(walkable_slope_angle, verts, tris, areas)
    }

    fn rasterize_triangles(
        &self,
        ctx: &mut BuildContext,
        verts: &[f32],
        tris: &[i32],
        areas: &[u8],
        hf: &mut Heightfield,
        walkable_climb: i32,
    ) -> Result<()> {
        rasterize_triangles(ctx, verts, tris, areas, hf, walkable_climb)
    }

    fn filter_low_hanging_obstacles(
        &self,
        ctx: &mut BuildContext,
        walkable_climb: i32,
        hf: &mut Heightfield,
    ) -> Result<()> {
        filter_low_hanging_walkable_obstacles(ctx, walkable_climb, hf);
        Ok(())
    }

    fn filter_ledge_spans(
        &self,
        ctx: &mut BuildContext,
        walkable_height: i32,
        walkable_climb: i32,
        hf: &mut Heightfield,
    ) -> Result<()> {
        filter_ledge_spans(ctx, walkable_height, walkable_climb, hf);
        Ok(())
    }

    fn filter_walkable_low_height_spans(
        &self,
        ctx: &mut BuildContext,
        walkable_height: i32,
        hf: &mut Heightfield,
    ) -> Result<()> {
        filter_walkable_low_height_spans(ctx, walkable_height, hf);
        Ok(())
    }

    fn build_compact_heightfield(
        &self,
        ctx: &mut BuildContext,
        walkable_height: i32,
        walkable_climb: i32,
        hf: &Heightfield,
    ) -> Result<CompactHeightfield> {
        CompactHeightfield::build(ctx, walkable_height, walkable_climb, hf)
    }

    fn erode_walkable_area(
        &self,
        ctx: &mut BuildContext,
        radius: i32,
        chf: &mut CompactHeightfield,
    ) -> Result<()> {
        erode_walkable_area(ctx, radius, chf)
    }

    fn mark_areas(
        &self,
        ctx: &mut BuildContext,
        overlays: &[AreaOverlay],
        chf: &mut CompactHeightfield,
    ) -> usize {
        AreaMarker::new(overlays).mark(ctx, chf)
    }

    fn build_distance_field(
        &self,
        ctx: &mut BuildContext,
        chf: &mut CompactHeightfield,
    ) -> Result<()> {
        build_distance_field(ctx, chf)
    }

    fn build_regions_watershed(
        &self,
        ctx: &mut BuildContext,
        chf: &mut CompactHeightfield,
        border_size: i32,
        min_region_area: i32,
        merge_region_area: i32,
    ) -> Result<()> {
        build_regions_watershed(ctx, chf, border_size, min_region_area, merge_region_area)
    }

    fn build_regions_monotone(
        &self,
        ctx: &mut BuildContext,
        chf: &mut CompactHeightfield,
        border_size: i32,
        min_region_area: i32,
        merge_region_area: i32,
    ) -> Result<()> {
        build_regions_monotone(ctx, chf, border_size, min_region_area, merge_region_area)
    }

    fn build_layer_regions(
        &self,
        ctx: &mut BuildContext,
        chf: &mut CompactHeightfield,
        border_size: i32,
        min_region_area: i32,
    ) -> Result<()> {
        build_layer_regions(ctx, chf, border_size, min_region_area)
    }

    fn build_contours(
        &self,
        ctx: &mut BuildContext,
        chf: &CompactHeightfield,
        max_error: f32,
        max_edge_len: i32,
    ) -> Result<ContourSet> {
        build_contours(ctx, chf, max_error, max_edge_len)
    }

    fn build_poly_mesh(
        &self,
        ctx: &mut BuildContext,
        cset: &ContourSet,
        nvp: usize,
    ) -> Result<PolyMesh> {
        build_poly_mesh(ctx, cset, nvp)
    }

    fn build_detail_mesh(
        &self,
        ctx: &mut BuildContext,
        pmesh: &PolyMesh,
        chf: &CompactHeightfield,
        sample_dist: f32,
        sample_max_error: f32,
    ) -> Result<PolyMeshDetail> {
        build_poly_mesh_detail(ctx, pmesh, chf, sample_dist, sample_max_error)
    }

    fn poly_areas_and_flags<'m>(&self, pmesh: &'m mut PolyMesh) -> (&'m mut [u8], &'m mut [u16]) {
        pmesh.areas_and_flags_mut()
    }

    fn pack_tile_data(
        &self,
        pmesh: &PolyMesh,
        dmesh: &PolyMeshDetail,
        params: &PackParams,
    ) -> Result<Vec<u8>> {
        let mut create = NavMeshCreateParams::from_meshes(pmesh, dmesh);
        create.tile_x = params.tile_x;
        create.tile_y = params.tile_y;
        create.tile_layer = params.tile_layer;
        create.walkable_height = params.agent.height;
        create.walkable_radius = params.agent.radius;
        create.walkable_climb = params.agent.max_climb;
        create.build_bv_tree = params.build_bv_tree;
        Ok(create_nav_mesh_data(&create)?)
    }
}
