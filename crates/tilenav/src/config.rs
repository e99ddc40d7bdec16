//! Build configuration for tiled navigation meshes

use bitflags::bitflags;
use glam::Vec3;
use tilenav_common::{Error, Result};
use tilenav_detour::MAX_VERTS_PER_POLY;
use tilenav_recast::{RecastConfig, MAX_SPAN_CLEARANCE};

/// Grid and agent parameters shared by every tile of one build.
///
/// Agent thresholds are in voxels, the bounds in world units.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct GridConfig {
    /// Minimum corner of the world bounding box
    pub bmin: Vec3,
    /// Maximum corner of the world bounding box
    pub bmax: Vec3,
    /// Horizontal cell size
    pub cs: f32,
    /// Vertical cell size
    pub ch: f32,
    /// Maximum walkable slope, in degrees
    pub walkable_slope_angle: f32,
    /// Minimum clearance for an agent, in voxels
    pub walkable_height: i32,
    /// Maximum step an agent can climb, in voxels
    pub walkable_climb: i32,
    /// Agent radius, in cells
    pub walkable_radius: i32,
    /// Maximum contour edge length, in cells
    pub max_edge_len: i32,
    /// Maximum deviation of simplified contours, in cells
    pub max_simplification_error: f32,
    /// Regions smaller than this are discarded
    pub min_region_area: i32,
    /// Regions smaller than this are merged into neighbours
    pub merge_region_area: i32,
    /// Maximum vertices per polygon
    pub max_vertices_per_polygon: i32,
    /// Detail mesh sample spacing
    pub detail_sample_dist: f32,
    /// Detail mesh maximum height error
    pub detail_sample_max_error: f32,
    /// Padding around each tile, in cells
    pub border_size: i32,
}

impl Default for GridConfig {
    fn default() -> Self {
        let rc = RecastConfig::default();
        Self {
            bmin: Vec3::ZERO,
            bmax: Vec3::ZERO,
            cs: rc.cs,
            ch: rc.ch,
            walkable_slope_angle: rc.walkable_slope_angle,
            walkable_height: rc.walkable_height,
            walkable_climb: rc.walkable_climb,
            walkable_radius: rc.walkable_radius,
            max_edge_len: rc.max_edge_len,
            max_simplification_error: rc.max_simplification_error,
            min_region_area: rc.min_region_area,
            merge_region_area: rc.merge_region_area,
            max_vertices_per_polygon: rc.max_vertices_per_polygon,
            detail_sample_dist: rc.detail_sample_dist,
            detail_sample_max_error: rc.detail_sample_max_error,
            border_size: rc.border_size,
        }
    }
}

impl GridConfig {
    /// Creates a configuration for the given world bounds with default parameters
    pub fn new(bmin: Vec3, bmax: Vec3) -> Self {
        Self {
            bmin,
            bmax,
            ..Self::default()
        }
    }

    pub fn with_cell_size(mut self, cs: f32, ch: f32) -> Self {
        self.cs = cs;
        self.ch = ch;
        self
    }

    pub fn with_walkable_slope_angle(mut self, walkable_slope_angle: f32) -> Self {
        self.walkable_slope_angle = walkable_slope_angle;
        self
    }

    pub fn with_walkable_height(mut self, walkable_height: i32) -> Self {
        self.walkable_height = walkable_height;
        self
    }

    pub fn with_walkable_climb(mut self, walkable_climb: i32) -> Self {
        self.walkable_climb = walkable_climb;
        self
    }

    pub fn with_walkable_radius(mut self, walkable_radius: i32) -> Self {
        self.walkable_radius = walkable_radius;
        self
    }

    pub fn with_region_areas(mut self, min_region_area: i32, merge_region_area: i32) -> Self {
        self.min_region_area = min_region_area;
        self.merge_region_area = merge_region_area;
        self
    }

    pub fn with_max_edge_len(mut self, max_edge_len: i32) -> Self {
        self.max_edge_len = max_edge_len;
        self
    }

    pub fn with_max_simplification_error(mut self, max_simplification_error: f32) -> Self {
        self.max_simplification_error = max_simplification_error;
        self
    }

    pub fn with_max_vertices_per_polygon(mut self, nvp: i32) -> Self {
        self.max_vertices_per_polygon = nvp;
        self
    }

    pub fn with_detail_sampling(mut self, sample_dist: f32, sample_max_error: f32) -> Self {
        self.detail_sample_dist = sample_dist;
        self.detail_sample_max_error = sample_max_error;
        self
    }

    pub fn with_border_size(mut self, border_size: i32) -> Self {
        self.border_size = border_size;
        self
    }

    /// Checks the bounds, cell sizes and the limits of the packed formats
    pub fn validate(&self) -> Result<()> {
        if !(self.bmax.x > self.bmin.x && self.bmax.y > self.bmin.y && self.bmax.z > self.bmin.z) {
            return Err(Error::InvalidMesh(format!(
                "world bounds {:?}..{:?} must be strictly increasing on every axis",
                self.bmin, self.bmax
            )));
        }

        if !(self.cs > 0.0 && self.ch > 0.0) {
            return Err(Error::InvalidMesh(
                "cell size and cell height must be positive".to_string(),
            ));
        }

        if self.border_size < 0 || self.walkable_radius < 0 {
            return Err(Error::InvalidMesh(
                "border size and walkable radius must not be negative".to_string(),
            ));
        }

        if !(3..=MAX_VERTS_PER_POLY as i32).contains(&self.max_vertices_per_polygon) {
            return Err(Error::InvalidMesh(format!(
                "max vertices per polygon must lie in 3..={}, got {}",
                MAX_VERTS_PER_POLY, self.max_vertices_per_polygon
            )));
        }

        // Compact spans store clearance in one byte
        if self.walkable_height > MAX_SPAN_CLEARANCE || self.walkable_climb > MAX_SPAN_CLEARANCE {
            return Err(Error::InvalidMesh(format!(
                "walkable height {} and climb {} exceed {} voxels",
                self.walkable_height, self.walkable_climb, MAX_SPAN_CLEARANCE
            )));
        }

        Ok(())
    }

    /// Engine configuration for one tile.
    ///
    /// `tile_bmin`/`tile_bmax` are the bordered tile bounds.
    pub fn recast_config(
        &self,
        tile: &TileConfig,
        tile_bmin: Vec3,
        tile_bmax: Vec3,
    ) -> RecastConfig {
        let size = tile.tile_size + self.border_size * 2;
        RecastConfig {
            width: size,
            height: size,
            cs: self.cs,
            ch: self.ch,
            bmin: tile_bmin,
            bmax: tile_bmax,
            walkable_slope_angle: self.walkable_slope_angle,
            walkable_height: self.walkable_height,
            walkable_climb: self.walkable_climb,
            walkable_radius: self.walkable_radius,
            max_edge_len: self.max_edge_len,
            max_simplification_error: self.max_simplification_error,
            min_region_area: self.min_region_area,
            merge_region_area: self.merge_region_area,
            max_vertices_per_polygon: self.max_vertices_per_polygon,
            detail_sample_dist: self.detail_sample_dist,
            detail_sample_max_error: self.detail_sample_max_error,
            border_size: self.border_size,
        }
    }
}

/// Tile edge length in cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TileConfig {
    pub tile_size: i32,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self { tile_size: 32 }
    }
}

impl TileConfig {
    pub fn new(tile_size: i32) -> Self {
        Self { tile_size }
    }

    pub fn validate(&self) -> Result<()> {
        if self.tile_size <= 0 {
            return Err(Error::InvalidMesh(format!(
                "tile size must be positive, got {}",
                self.tile_size
            )));
        }
        Ok(())
    }
}

/// Agent dimensions written into every tile header, in world units
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct AgentParams {
    pub height: f32,
    pub radius: f32,
    pub max_climb: f32,
}

impl Default for AgentParams {
    fn default() -> Self {
        Self {
            height: 2.0,
            radius: 0.6,
            max_climb: 0.9,
        }
    }
}

bitflags! {
    /// Span filters and partition policy of a build
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(
        feature = "serialization",
        derive(serde::Serialize, serde::Deserialize)
    )]
    pub struct BuildFlags: u32 {
        const FILTER_LOW_HANGING_OBSTACLES = 1;
        const FILTER_LEDGE_SPANS = 2;
        const FILTER_WALKABLE_LOW_HEIGHT_SPANS = 4;
        const PARTITION_WATERSHED = 8;
        const PARTITION_MONOTONE = 16;
    }
}

impl BuildFlags {
    /// Bits selecting the partition policy
    pub const PARTITION_MASK: u32 = 24;
    /// Layer partitioning has no bit of its own
    pub const PARTITION_LAYER: u32 = 0;

    /// All filters with watershed partitioning
    pub fn standard() -> Self {
        Self::FILTER_LOW_HANGING_OBSTACLES
            | Self::FILTER_LEDGE_SPANS
            | Self::FILTER_WALKABLE_LOW_HEIGHT_SPANS
            | Self::PARTITION_WATERSHED
    }

    pub fn partition(&self) -> PartitionType {
        match self.bits() & Self::PARTITION_MASK {
            8 => PartitionType::Watershed,
            16 => PartitionType::Monotone,
            // both bits set falls through to layers
            _ => PartitionType::Layer,
        }
    }
}

impl Default for BuildFlags {
    fn default() -> Self {
        Self::standard()
    }
}

/// Region partitioning policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum PartitionType {
    Watershed,
    Monotone,
    Layer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_config_validation() {
        let config = GridConfig::new(Vec3::ZERO, Vec3::new(10.0, 2.0, 10.0));
        assert!(config.validate().is_ok());

        let flat = GridConfig::new(Vec3::ZERO, Vec3::new(10.0, 0.0, 10.0));
        assert!(flat.validate().is_err());

        let bad_cells = config.clone().with_cell_size(0.0, 0.2);
        assert!(bad_cells.validate().is_err());

        assert!(TileConfig::new(0).validate().is_err());
        assert!(TileConfig::new(32).validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_unpackable_limits() {
        let config = GridConfig::new(Vec3::ZERO, Vec3::new(10.0, 2.0, 10.0));
        assert!(config.clone().with_walkable_height(255).validate().is_ok());
        assert!(config.clone().with_walkable_height(2000).validate().is_err());
        assert!(config.clone().with_walkable_climb(300).validate().is_err());

        assert!(config
            .clone()
            .with_max_vertices_per_polygon(MAX_VERTS_PER_POLY as i32)
            .validate()
            .is_ok());
        assert!(config.with_max_vertices_per_polygon(12).validate().is_err());
    }

    #[test]
    fn test_partition_selection() {
        assert_eq!(BuildFlags::standard().partition(), PartitionType::Watershed);
        assert_eq!(
            BuildFlags::PARTITION_MONOTONE.partition(),
            PartitionType::Monotone
        );
        assert_eq!(
            BuildFlags::FILTER_LEDGE_SPANS.partition(),
            PartitionType::Layer
        );
        assert_eq!(
            (BuildFlags::PARTITION_MONOTONE | BuildFlags::PARTITION_WATERSHED).partition(),
            PartitionType::Layer
        );
    }

    #[test]
    fn test_recast_config_includes_border() {
        let config = GridConfig::new(Vec3::ZERO, Vec3::new(100.0, 5.0, 100.0)).with_border_size(3);
        let rc = config.recast_config(&TileConfig::new(32), Vec3::ZERO, Vec3::ONE);
        assert_eq!(rc.width, 38);
        assert_eq!(rc.height, 38);
        assert_eq!(rc.border_size, 3);
        assert!(rc.validate().is_ok());
    }
}
