//! Bit split between tile index and polygon index in a reference

use tilenav_common::{ilog2, next_pow2};

/// Width of the tile/polygon part of a reference and the cap on tile bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct IdentifierPolicy {
    /// Bits shared by the tile index and the polygon index
    pub total_bits: u32,
    /// Upper bound on the tile index bits
    pub max_tile_bits: u32,
}

impl Default for IdentifierPolicy {
    fn default() -> Self {
        Self {
            total_bits: 22,
            max_tile_bits: 14,
        }
    }
}

/// Tile and polygon bit counts derived for a tile grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierSpace {
    /// Bits used for the tile index
    pub tile_bits: u32,
    /// Bits used for the polygon index within a tile
    pub poly_bits: u32,
    /// Tile count the space was derived for (at least 1)
    pub total_tiles: u32,
}

impl IdentifierPolicy {
    /// Splits the identifier bits for a grid of `total_tiles` tiles.
    ///
    /// A count of zero is treated as one tile. When the grid has more tiles
    /// than the capped tile bits can address the returned space is aliased,
    /// see [`IdentifierSpace::is_aliased`].
    pub fn allocate(&self, total_tiles: u32) -> IdentifierSpace {
        let total_tiles = total_tiles.max(1);
        let tile_bits = ilog2(next_pow2(total_tiles)).min(self.max_tile_bits);
        let space = IdentifierSpace {
            tile_bits,
            poly_bits: self.total_bits.saturating_sub(tile_bits),
            total_tiles,
        };

        if space.is_aliased() {
            log::warn!(
                "{} tiles exceed the {} addressable with {} tile bits, tile references will alias",
                total_tiles,
                space.max_tiles(),
                tile_bits
            );
        }
        space
    }
}

impl IdentifierSpace {
    /// Derives the space with the default 22/14 policy
    pub fn for_tile_count(total_tiles: u32) -> Self {
        IdentifierPolicy::default().allocate(total_tiles)
    }

    /// Maximum number of tiles, `2^tile_bits`
    pub fn max_tiles(&self) -> i32 {
        1 << self.tile_bits
    }

    /// Maximum number of polygons per tile, `2^poly_bits`
    pub fn max_polys_per_tile(&self) -> i32 {
        1 << self.poly_bits
    }

    /// True when the grid has more tiles than the space can address
    pub fn is_aliased(&self) -> bool {
        u64::from(self.total_tiles) > 1u64 << self.tile_bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_always_sum_to_total() {
        for tiles in [0u32, 1, 2, 3, 4, 5, 49, 64, 100, 4096, 16384, 16385, 1 << 20] {
            let space = IdentifierSpace::for_tile_count(tiles);
            assert_eq!(space.tile_bits + space.poly_bits, 22, "tiles {}", tiles);
        }
    }

    #[test]
    fn test_capacity_covers_tile_count() {
        for tiles in [1u32, 2, 3, 7, 49, 1000, 16384] {
            let space = IdentifierSpace::for_tile_count(tiles);
            assert!(space.max_tiles() as u32 >= tiles);
            assert!(!space.is_aliased());
        }
    }

    #[test]
    fn test_known_splits() {
        let single = IdentifierSpace::for_tile_count(1);
        assert_eq!((single.tile_bits, single.poly_bits), (0, 22));

        let zero = IdentifierSpace::for_tile_count(0);
        assert_eq!(zero, single);

        let grid = IdentifierSpace::for_tile_count(49);
        assert_eq!((grid.tile_bits, grid.poly_bits), (6, 16));
        assert_eq!(grid.max_tiles(), 64);
        assert_eq!(grid.max_polys_per_tile(), 65536);
    }

    #[test]
    fn test_large_grid_is_capped_and_flagged() {
        let space = IdentifierSpace::for_tile_count(20_000);
        assert_eq!(space.tile_bits, 14);
        assert_eq!(space.poly_bits, 8);
        assert!(space.is_aliased());
    }

    #[test]
    fn test_custom_policy() {
        let policy = IdentifierPolicy {
            total_bits: 28,
            max_tile_bits: 18,
        };
        let space = policy.allocate(20_000);
        assert_eq!(space.tile_bits, 15);
        assert_eq!(space.poly_bits, 13);
        assert!(!space.is_aliased());
    }
}
