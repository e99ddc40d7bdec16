//! Recast-style geometry engine for tiled navigation mesh generation
//!
//! Takes triangle soup for one tile, voxelizes it into a heightfield, filters
//! and compacts the spans, partitions the walkable surface into regions and
//! finally traces contours and builds polygon and detail meshes from them.
//! Every stage returns an owned value, so intermediate buffers are released
//! when they go out of scope on any exit path.

mod area;
mod compact_heightfield;
mod config;
mod context;
mod contour;
mod detail_mesh;
mod geometry;
mod heightfield;
mod polymesh;
mod rasterization;
mod region;

pub use area::{erode_walkable_area, mark_convex_poly_area};
pub use compact_heightfield::{
    CompactCell, CompactHeightfield, CompactSpan, MAX_SPAN_CLEARANCE, NOT_CONNECTED,
};
pub use config::RecastConfig;
pub use context::{BuildContext, LogEntry, LogLevel, TimerCategory};
pub use contour::{build_contours, Contour, ContourSet};
pub use detail_mesh::{build_poly_mesh_detail, PolyMeshDetail};
pub use heightfield::{
    filter_ledge_spans, filter_low_hanging_walkable_obstacles, filter_walkable_low_height_spans,
    Heightfield, Span, SPAN_MAX_HEIGHT,
};
pub use polymesh::{build_poly_mesh, PolyMesh, MESH_NULL_IDX};
pub use rasterization::{mark_walkable_triangles, rasterize_triangles};
pub use region::{
    build_distance_field, build_layer_regions, build_regions_monotone, build_regions_watershed,
};

/// Area id of a span or polygon that cannot be walked on
pub const RC_NULL_AREA: u8 = 0;
/// Default area id of a walkable span before any designer classification
pub const RC_WALKABLE_AREA: u8 = 63;
/// Region id flag for spans inside the tile border
pub const RC_BORDER_REG: u16 = 0x8000;

/// Offset along x for each of the four neighbour directions
#[inline]
pub fn dir_offset_x(dir: usize) -> i32 {
    const OFFSET: [i32; 4] = [-1, 0, 1, 0];
    OFFSET[dir & 0x03]
}

/// Offset along z for each of the four neighbour directions
#[inline]
pub fn dir_offset_y(dir: usize) -> i32 {
    const OFFSET: [i32; 4] = [0, 1, 0, -1];
    OFFSET[dir & 0x03]
}

/// Calculates the grid size for the given bounds and cell size
pub fn calc_grid_size(bmin: glam::Vec3, bmax: glam::Vec3, cs: f32) -> (i32, i32) {
    (
        ((bmax.x - bmin.x) / cs + 0.5) as i32,
        ((bmax.z - bmin.z) / cs + 0.5) as i32,
    )
}
