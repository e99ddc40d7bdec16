//! Per-tile configuration for the engine stages

use glam::Vec3;
use tilenav_common::{Error, Result};

use crate::MAX_SPAN_CLEARANCE;

/// Configuration parameters for one heightfield build, in voxel units
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct RecastConfig {
    /// The width of the field along the x-axis, border included
    pub width: i32,
    /// The height of the field along the z-axis, border included
    pub height: i32,

    /// The width/depth resolution of the field (cell size)
    pub cs: f32,
    /// The height resolution of the field (cell height)
    pub ch: f32,

    /// The minimum bounds of the field's AABB
    pub bmin: Vec3,
    /// The maximum bounds of the field's AABB
    pub bmax: Vec3,

    /// The maximum slope in degrees that is considered walkable
    pub walkable_slope_angle: f32,
    /// Minimum floor to ceiling height that still allows walking, in voxels
    pub walkable_height: i32,
    /// Maximum ledge height that is still considered traversable, in voxels
    pub walkable_climb: i32,
    /// The distance to erode the walkable area from obstacles, in cells
    pub walkable_radius: i32,

    /// The maximum allowed length for contour edges along the border of the mesh
    pub max_edge_len: i32,
    /// The maximum distance a simplified contour may deviate from the raw contour
    pub max_simplification_error: f32,
    /// The minimum number of cells allowed to form isolated island areas
    pub min_region_area: i32,
    /// Regions smaller than this are merged with larger neighbours if possible
    pub merge_region_area: i32,

    /// The maximum number of vertices per polygon
    pub max_vertices_per_polygon: i32,

    /// Sampling distance used when generating the detail mesh
    pub detail_sample_dist: f32,
    /// The maximum distance the detail mesh surface may deviate from the heightfield
    pub detail_sample_max_error: f32,

    /// The size of the non-navigable border around the heightfield
    pub border_size: i32,
}

impl Default for RecastConfig {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            cs: 0.3,
            ch: 0.2,
            bmin: Vec3::ZERO,
            bmax: Vec3::ZERO,
            walkable_slope_angle: 45.0,
            walkable_height: 2,
            walkable_climb: 1,
            walkable_radius: 1,
            max_edge_len: 12,
            max_simplification_error: 1.3,
            min_region_area: 8,
            merge_region_area: 20,
            max_vertices_per_polygon: 6,
            detail_sample_dist: 6.0,
            detail_sample_max_error: 1.0,
            border_size: 0,
        }
    }
}

impl RecastConfig {
    /// Creates a new RecastConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.width <= 0 || self.height <= 0 {
            return Err(Error::InvalidMesh(format!(
                "invalid grid size {}x{}",
                self.width, self.height
            )));
        }

        if self.cs <= 0.0 || self.ch <= 0.0 {
            return Err(Error::InvalidMesh(
                "cell size and cell height must be positive".to_string(),
            ));
        }

        if !(0.0..=90.0).contains(&self.walkable_slope_angle) {
            return Err(Error::InvalidMesh(format!(
                "walkable slope angle {} is outside 0..=90",
                self.walkable_slope_angle
            )));
        }

        if self.max_vertices_per_polygon < 3 {
            return Err(Error::InvalidMesh(
                "too few vertices per polygon".to_string(),
            ));
        }

        if !(0..=MAX_SPAN_CLEARANCE).contains(&self.walkable_height)
            || !(0..=MAX_SPAN_CLEARANCE).contains(&self.walkable_climb)
        {
            return Err(Error::InvalidMesh(format!(
                "walkable height {} and climb {} must lie in 0..={} voxels",
                self.walkable_height, self.walkable_climb, MAX_SPAN_CLEARANCE
            )));
        }

        if self.border_size < 0 || self.walkable_radius < 0 {
            return Err(Error::InvalidMesh(
                "border size and walkable radius must not be negative".to_string(),
            ));
        }

        Ok(())
    }
}
