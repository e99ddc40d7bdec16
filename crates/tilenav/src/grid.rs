//! Tile grid planning: grid dimensions and per-tile bounds

use glam::Vec3;

use crate::{GridConfig, TileConfig};

/// Grid position of a tile. Tiles are single-layer, so `layer` is 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TileCoordinate {
    pub x: i32,
    pub y: i32,
    pub layer: i32,
}

impl TileCoordinate {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y, layer: 0 }
    }
}

impl std::fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Integer grid size of `bmin..bmax`, rounded up to whole cells
pub fn grid_size(bmin: Vec3, bmax: Vec3, cs: f32) -> (i32, i32) {
    (
        ((bmax.x - bmin.x) / cs).ceil() as i32,
        ((bmax.z - bmin.z) / cs).ceil() as i32,
    )
}

/// World bounds of tile `(tx, ty)`. The vertical extent is the full world height.
pub fn calc_tile_bounds(
    bmin: Vec3,
    bmax: Vec3,
    tx: i32,
    ty: i32,
    tile_size: i32,
    cs: f32,
) -> (Vec3, Vec3) {
    let tcs = tile_size as f32 * cs;
    let tile_bmin = Vec3::new(bmin.x + tx as f32 * tcs, bmin.y, bmin.z + ty as f32 * tcs);
    let tile_bmax = Vec3::new(
        bmin.x + (tx + 1) as f32 * tcs,
        bmax.y,
        bmin.z + (ty + 1) as f32 * tcs,
    );
    (tile_bmin, tile_bmax)
}

/// Tile containing `pos`. Positions before the origin give negative coordinates.
pub fn tile_pos(pos: Vec3, bmin: Vec3, tile_size: i32, cs: f32) -> (i32, i32) {
    let tcs = tile_size as f32 * cs;
    (
        ((pos.x - bmin.x) / tcs).floor() as i32,
        ((pos.z - bmin.z) / tcs).floor() as i32,
    )
}

/// Tile layout derived from a [`GridConfig`] and [`TileConfig`]
#[derive(Debug, Clone, PartialEq)]
pub struct TileGridPlanner {
    bmin: Vec3,
    bmax: Vec3,
    cs: f32,
    tile_size: i32,
    border_size: i32,
    grid_width: i32,
    grid_height: i32,
    tiles_x: i32,
    tiles_y: i32,
}

impl TileGridPlanner {
    pub fn new(grid: &GridConfig, tile: &TileConfig) -> Self {
        let (grid_width, grid_height) = grid_size(grid.bmin, grid.bmax, grid.cs);
        let ts = tile.tile_size.max(1);
        Self {
            bmin: grid.bmin,
            bmax: grid.bmax,
            cs: grid.cs,
            tile_size: ts,
            border_size: grid.border_size,
            grid_width,
            grid_height,
            tiles_x: (grid_width + ts - 1) / ts,
            tiles_y: (grid_height + ts - 1) / ts,
        }
    }

    /// Grid size in cells
    pub fn grid_size(&self) -> (i32, i32) {
        (self.grid_width, self.grid_height)
    }

    /// Number of tiles along x and z
    pub fn tile_counts(&self) -> (i32, i32) {
        (self.tiles_x, self.tiles_y)
    }

    pub fn total_tiles(&self) -> u32 {
        (self.tiles_x.max(0) as u32) * (self.tiles_y.max(0) as u32)
    }

    /// World width and depth of one tile
    pub fn tile_world_size(&self) -> f32 {
        self.tile_size as f32 * self.cs
    }

    pub fn origin(&self) -> Vec3 {
        self.bmin
    }

    pub fn tile_bounds(&self, tx: i32, ty: i32) -> (Vec3, Vec3) {
        calc_tile_bounds(self.bmin, self.bmax, tx, ty, self.tile_size, self.cs)
    }

    /// Tile bounds grown by the border on x and z
    pub fn bordered_tile_bounds(&self, tx: i32, ty: i32) -> (Vec3, Vec3) {
        let (mut tile_bmin, mut tile_bmax) = self.tile_bounds(tx, ty);
        let pad = self.border_size as f32 * self.cs;
        tile_bmin.x -= pad;
        tile_bmin.z -= pad;
        tile_bmax.x += pad;
        tile_bmax.z += pad;
        (tile_bmin, tile_bmax)
    }

    pub fn tile_pos(&self, pos: Vec3) -> (i32, i32) {
        tile_pos(pos, self.bmin, self.tile_size, self.cs)
    }

    /// Every tile coordinate, rows along y outermost
    pub fn coordinates(&self) -> impl Iterator<Item = TileCoordinate> + '_ {
        (0..self.tiles_y)
            .flat_map(move |y| (0..self.tiles_x).map(move |x| TileCoordinate::new(x, y)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner(size: f32, cs: f32, tile_size: i32, border: i32) -> TileGridPlanner {
        let grid = GridConfig::new(Vec3::new(0.0, -1.0, 0.0), Vec3::new(size, 2.0, size))
            .with_cell_size(cs, 0.2)
            .with_border_size(border);
        TileGridPlanner::new(&grid, &TileConfig::new(tile_size))
    }

    #[test]
    fn test_grid_dimensions_round_up() {
        let p = planner(64.0, 0.3, 32, 0);
        assert_eq!(p.grid_size(), (214, 214));
        assert_eq!(p.tile_counts(), (7, 7));
        assert_eq!(p.total_tiles(), 49);
        assert_eq!(p.coordinates().count(), 49);

        let single = planner(9.0, 0.3, 32, 0);
        assert_eq!(single.total_tiles(), 1);
    }

    #[test]
    fn test_tiles_cover_world_without_gaps() {
        let p = planner(20.0, 0.5, 8, 0);
        let (tw, th) = p.tile_counts();
        let step = p.tile_world_size();
        for TileCoordinate { x, y, .. } in p.coordinates() {
            let (bmin, bmax) = p.tile_bounds(x, y);
            assert!((bmax.x - bmin.x - step).abs() < 1e-5);
            assert!((bmax.z - bmin.z - step).abs() < 1e-5);
            assert_eq!(bmin.y, -1.0);
            assert_eq!(bmax.y, 2.0);
            if x + 1 < tw {
                let (next_min, _) = p.tile_bounds(x + 1, y);
                assert_eq!(next_min.x, bmax.x);
            }
            if y + 1 < th {
                let (next_min, _) = p.tile_bounds(x, y + 1);
                assert_eq!(next_min.z, bmax.z);
            }
        }
        let (_, last_max) = p.tile_bounds(tw - 1, th - 1);
        assert!(last_max.x >= 20.0 && last_max.z >= 20.0);
    }

    #[test]
    fn test_bordered_bounds() {
        let p = planner(20.0, 0.5, 8, 2);
        let (bmin, bmax) = p.bordered_tile_bounds(1, 0);
        assert_eq!(bmin.x, 3.0);
        assert_eq!(bmax.x, 9.0);
        assert_eq!(bmin.z, -1.0);
        assert_eq!(bmin.y, -1.0);
    }

    #[test]
    fn test_tile_pos() {
        let p = planner(20.0, 0.5, 8, 0);
        assert_eq!(p.tile_pos(Vec3::new(0.1, 0.0, 0.1)), (0, 0));
        assert_eq!(p.tile_pos(Vec3::new(4.5, 0.0, 12.1)), (1, 3));
        assert_eq!(p.tile_pos(Vec3::new(-0.1, 0.0, 0.0)), (-1, 0));
    }
}
