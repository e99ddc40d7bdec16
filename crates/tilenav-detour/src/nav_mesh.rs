//! Multi-tile navigation mesh
//!
//! A fixed number of tile slots, addressed by salted references. Tiles are
//! looked up by grid location through a hash map; a location holds at most
//! one tile per layer.

use std::collections::{BTreeSet, HashMap};

use tilenav_common::{ilog2, next_pow2};

use crate::{NavMeshParams, PolyRef, Status, TileData, TileRef};

/// A tile owned by the mesh: the raw payload and its parsed form
#[derive(Debug, Clone)]
pub struct MeshTile {
    salt: u32,
    data: Vec<u8>,
    tile: TileData,
}

impl MeshTile {
    /// Raw payload bytes, exactly as added
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Parsed payload
    pub fn tile(&self) -> &TileData {
        &self.tile
    }

    /// Tile location `(x, y, layer)`
    pub fn location(&self) -> (i32, i32, i32) {
        let h = &self.tile.header;
        (h.x, h.y, h.layer)
    }

    /// Current salt of the slot holding this tile
    pub fn salt(&self) -> u32 {
        self.salt
    }
}

/// Summary of one live tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileState {
    pub tile_ref: TileRef,
    pub x: i32,
    pub y: i32,
    pub layer: i32,
    pub poly_count: i32,
    pub data_size: usize,
}

/// Navigation mesh assembled from independently built tiles
#[derive(Debug, Clone)]
pub struct TiledNavMesh {
    params: NavMeshParams,
    tile_bits: u32,
    poly_bits: u32,
    salt_bits: u32,
    /// Slot salts, bumped whenever a slot is freed
    salts: Vec<u32>,
    tiles: Vec<Option<MeshTile>>,
    free: BTreeSet<usize>,
    pos_lookup: HashMap<(i32, i32, i32), usize>,
}

impl TiledNavMesh {
    /// Creates an empty mesh with `params.max_tiles` slots.
    ///
    /// Fails with [`Status::InvalidParam`] when the parameters leave fewer
    /// than 10 bits for the salt.
    pub fn new(params: NavMeshParams) -> Result<Self, Status> {
        if params.origin.iter().any(|v| !v.is_finite()) {
            return Err(Status::InvalidParam);
        }
        if !(params.tile_width > 0.0) || !(params.tile_height > 0.0) {
            return Err(Status::InvalidParam);
        }
        if params.max_tiles <= 0 || params.max_polys <= 0 {
            return Err(Status::InvalidParam);
        }

        let tile_bits = ilog2(next_pow2(params.max_tiles as u32));
        let poly_bits = ilog2(next_pow2(params.max_polys as u32));
        let salt_bits = 31u32.min(32u32.saturating_sub(tile_bits + poly_bits));
        if salt_bits < 10 {
            log::error!(
                "{} tile bits and {} poly bits leave only {} salt bits",
                tile_bits,
                poly_bits,
                salt_bits
            );
            return Err(Status::InvalidParam);
        }

        let max_tiles = params.max_tiles as usize;
        let mut tiles = Vec::new();
        tiles
            .try_reserve_exact(max_tiles)
            .map_err(|_| Status::OutOfMemory)?;
        tiles.resize_with(max_tiles, || None);

        Ok(Self {
            params,
            tile_bits,
            poly_bits,
            salt_bits,
            salts: vec![1; max_tiles],
            tiles,
            free: (0..max_tiles).collect(),
            pos_lookup: HashMap::new(),
        })
    }

    /// Global parameters
    pub fn params(&self) -> &NavMeshParams {
        &self.params
    }

    /// Number of tile slots
    pub fn max_tiles(&self) -> i32 {
        self.params.max_tiles
    }

    /// Number of live tiles
    pub fn tile_count(&self) -> usize {
        self.pos_lookup.len()
    }

    /// Bits of a reference used for the tile index, polygon index and salt
    pub fn ref_bits(&self) -> (u32, u32, u32) {
        (self.tile_bits, self.poly_bits, self.salt_bits)
    }

    /// Packs `salt | tile | poly` into a reference
    pub fn encode_poly_ref(&self, salt: u32, tile: u32, poly: u32) -> PolyRef {
        let salt_mask = (1u64 << self.salt_bits) - 1;
        let tile_mask = (1u64 << self.tile_bits) - 1;
        let poly_mask = (1u64 << self.poly_bits) - 1;
        PolyRef::new(
            ((salt as u64 & salt_mask) << (self.poly_bits + self.tile_bits))
                | ((tile as u64 & tile_mask) << self.poly_bits)
                | (poly as u64 & poly_mask),
        )
    }

    /// Splits a reference into `(salt, tile, poly)`
    pub fn decode_poly_ref(&self, r: PolyRef) -> (u32, u32, u32) {
        let id = r.id();
        let salt_mask = (1u64 << self.salt_bits) - 1;
        let tile_mask = (1u64 << self.tile_bits) - 1;
        let poly_mask = (1u64 << self.poly_bits) - 1;
        (
            ((id >> (self.poly_bits + self.tile_bits)) & salt_mask) as u32,
            ((id >> self.poly_bits) & tile_mask) as u32,
            (id & poly_mask) as u32,
        )
    }

    fn slot_of(&self, r: TileRef) -> Option<usize> {
        if r.is_null() {
            return None;
        }
        let (salt, index, _) = self.decode_poly_ref(r);
        let index = index as usize;
        if index >= self.tiles.len() || self.salts[index] != salt {
            return None;
        }
        self.tiles[index].as_ref().map(|_| index)
    }

    /// Adds a tile payload.
    ///
    /// With `last_ref` the tile goes back into the slot and salt encoded in
    /// the reference, which is how saved meshes are restored.
    pub fn add_tile(
        &mut self,
        data: Vec<u8>,
        last_ref: Option<TileRef>,
    ) -> Result<TileRef, Status> {
        let tile = TileData::from_bytes(&data)?;
        let header = &tile.header;
        if header.poly_count > self.params.max_polys {
            log::warn!(
                "tile ({}, {}) has {} polygons, at most {} fit a reference",
                header.x,
                header.y,
                header.poly_count,
                self.params.max_polys
            );
            return Err(Status::InvalidParam);
        }

        let key = (header.x, header.y, header.layer);
        if self.pos_lookup.contains_key(&key) {
            return Err(Status::AlreadyExists);
        }

        let index = match last_ref.filter(|r| !r.is_null()) {
            Some(r) => {
                let (salt, index, _) = self.decode_poly_ref(r);
                let index = index as usize;
                if !self.free.remove(&index) {
                    return Err(Status::OutOfMemory);
                }
                self.salts[index] = salt;
                index
            }
            None => self.free.pop_first().ok_or(Status::OutOfMemory)?,
        };

        let salt = self.salts[index];
        self.pos_lookup.insert(key, index);
        self.tiles[index] = Some(MeshTile { salt, data, tile });
        Ok(self.encode_poly_ref(salt, index as u32, 0))
    }

    /// Removes a tile and hands back its payload
    pub fn remove_tile(&mut self, r: TileRef) -> Result<Vec<u8>, Status> {
        let index = self.slot_of(r).ok_or(Status::InvalidParam)?;
        let tile = self.tiles[index].take().ok_or(Status::InvalidParam)?;
        self.pos_lookup.remove(&tile.location());

        let salt_mask = (1u32 << self.salt_bits) - 1;
        let mut salt = (self.salts[index] + 1) & salt_mask;
        if salt == 0 {
            salt = 1;
        }
        self.salts[index] = salt;
        self.free.insert(index);
        Ok(tile.data)
    }

    /// Adds a tile, first removing whatever occupies its location
    pub fn replace_tile(&mut self, data: Vec<u8>) -> Result<TileRef, Status> {
        let header = TileData::read_header(&data)?;
        if let Some(existing) = self.tile_ref_at(header.x, header.y, header.layer) {
            self.remove_tile(existing)?;
        }
        self.add_tile(data, None)
    }

    /// Reference of the tile at a location
    pub fn tile_ref_at(&self, x: i32, y: i32, layer: i32) -> Option<TileRef> {
        let index = *self.pos_lookup.get(&(x, y, layer))?;
        Some(self.encode_poly_ref(self.salts[index], index as u32, 0))
    }

    /// Tile at a location
    pub fn tile_at(&self, x: i32, y: i32, layer: i32) -> Option<&MeshTile> {
        let index = *self.pos_lookup.get(&(x, y, layer))?;
        self.tiles[index].as_ref()
    }

    /// Tile of a (still valid) reference
    pub fn tile_by_ref(&self, r: TileRef) -> Option<&MeshTile> {
        self.tiles[self.slot_of(r)?].as_ref()
    }

    /// Reference of polygon 0 of a tile
    pub fn poly_ref_base(&self, tile: &MeshTile) -> Option<PolyRef> {
        let (x, y, layer) = tile.location();
        self.tile_ref_at(x, y, layer)
    }

    /// Checks that a polygon reference points at a live tile and polygon
    pub fn is_valid_poly_ref(&self, r: PolyRef) -> bool {
        let (_, _, poly) = self.decode_poly_ref(r);
        self.tile_by_ref(r)
            .is_some_and(|t| (poly as usize) < t.tile.polys.len())
    }

    /// Live tiles in slot order
    pub fn tiles(&self) -> impl Iterator<Item = (TileRef, &MeshTile)> + '_ {
        self.tiles.iter().enumerate().filter_map(move |(i, t)| {
            t.as_ref()
                .map(|t| (self.encode_poly_ref(t.salt, i as u32, 0), t))
        })
    }

    /// Location and size of every live tile in slot order
    pub fn tile_states(&self) -> Vec<TileState> {
        self.tiles()
            .map(|(tile_ref, t)| {
                let (x, y, layer) = t.location();
                TileState {
                    tile_ref,
                    x,
                    y,
                    layer,
                    poly_count: t.tile.header.poly_count,
                    data_size: t.data.len(),
                }
            })
            .collect()
    }

    /// Tile location containing a world position
    pub fn calc_tile_loc(&self, pos: [f32; 3]) -> (i32, i32) {
        (
            ((pos[0] - self.params.origin[0]) / self.params.tile_width).floor() as i32,
            ((pos[2] - self.params.origin[2]) / self.params.tile_height).floor() as i32,
        )
    }
}
