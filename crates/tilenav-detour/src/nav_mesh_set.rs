//! `MSET` navmesh set format
//!
//! ```text
//! header:   magic i32, version i32, tile count i32,
//!           origin 3 x f32, tile width f32, tile height f32, max tiles i32, max polys i32
//! per tile: tile ref u64, data size i32, data
//! ```
//! All values little endian.

use std::io::{Cursor, Read};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::{NavMeshParams, Status, TileRef, TiledNavMesh};

/// Magic number of a navmesh set ('MSET')
pub const NAVMESHSET_MAGIC: i32 =
    (b'M' as i32) << 24 | (b'S' as i32) << 16 | (b'E' as i32) << 8 | b'T' as i32;

/// Current navmesh set version
pub const NAVMESHSET_VERSION: i32 = 1;

const SET_HEADER_SIZE: usize = 40;
const TILE_HEADER_SIZE: usize = 12;

/// Header of a navmesh set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavMeshSetHeader {
    pub magic: i32,
    pub version: i32,
    pub num_tiles: i32,
    pub params: NavMeshParams,
}

fn read_params<R: Read>(r: &mut R) -> Result<NavMeshParams, Status> {
    let mut origin = [0.0f32; 3];
    r.read_f32_into::<LittleEndian>(&mut origin)?;
    Ok(NavMeshParams {
        origin,
        tile_width: r.read_f32::<LittleEndian>()?,
        tile_height: r.read_f32::<LittleEndian>()?,
        max_tiles: r.read_i32::<LittleEndian>()?,
        max_polys: r.read_i32::<LittleEndian>()?,
    })
}

/// Reads and validates the header of a navmesh set
pub fn read_set_header(data: &[u8]) -> Result<NavMeshSetHeader, Status> {
    if data.len() < SET_HEADER_SIZE {
        return Err(Status::DataCorrupted);
    }
    let mut cur = Cursor::new(data);
    let magic = cur.read_i32::<LittleEndian>()?;
    if magic != NAVMESHSET_MAGIC {
        return Err(Status::WrongMagic);
    }
    let version = cur.read_i32::<LittleEndian>()?;
    if version != NAVMESHSET_VERSION {
        return Err(Status::WrongVersion);
    }
    Ok(NavMeshSetHeader {
        magic,
        version,
        num_tiles: cur.read_i32::<LittleEndian>()?,
        params: read_params(&mut cur)?,
    })
}

/// Flattens every live tile of `mesh` into one buffer, in slot order
pub fn export_nav_mesh(mesh: &TiledNavMesh) -> Result<Vec<u8>, Status> {
    let tiles: Vec<_> = mesh.tiles().collect();
    let size = SET_HEADER_SIZE
        + tiles
            .iter()
            .map(|(_, t)| TILE_HEADER_SIZE + t.data().len())
            .sum::<usize>();

    let mut out = Vec::new();
    out.try_reserve_exact(size).map_err(|_| Status::OutOfMemory)?;

    let params = mesh.params();
    out.write_i32::<LittleEndian>(NAVMESHSET_MAGIC)?;
    out.write_i32::<LittleEndian>(NAVMESHSET_VERSION)?;
    out.write_i32::<LittleEndian>(tiles.len() as i32)?;
    for v in &params.origin {
        out.write_f32::<LittleEndian>(*v)?;
    }
    out.write_f32::<LittleEndian>(params.tile_width)?;
    out.write_f32::<LittleEndian>(params.tile_height)?;
    out.write_i32::<LittleEndian>(params.max_tiles)?;
    out.write_i32::<LittleEndian>(params.max_polys)?;

    for (tile_ref, tile) in tiles {
        out.write_u64::<LittleEndian>(tile_ref.id())?;
        out.write_i32::<LittleEndian>(tile.data().len() as i32)?;
        out.extend_from_slice(tile.data());
    }

    debug_assert_eq!(out.len(), size);
    Ok(out)
}

/// Rebuilds a mesh from an exported set, restoring every tile into its
/// original slot
pub fn import_nav_mesh(data: &[u8]) -> Result<TiledNavMesh, Status> {
    let header = read_set_header(data)?;
    let mut mesh = TiledNavMesh::new(header.params)?;

    let mut cur = Cursor::new(&data[SET_HEADER_SIZE..]);
    for _ in 0..header.num_tiles.max(0) {
        let tile_ref = TileRef::new(cur.read_u64::<LittleEndian>()?);
        let data_size = cur.read_i32::<LittleEndian>()?;
        if tile_ref.is_null() || data_size <= 0 {
            break;
        }

        let mut blob = Vec::new();
        blob.try_reserve_exact(data_size as usize)
            .map_err(|_| Status::OutOfMemory)?;
        blob.resize(data_size as usize, 0);
        cur.read_exact(&mut blob)?;

        mesh.add_tile(blob, Some(tile_ref))?;
    }

    Ok(mesh)
}

/// Writes `mesh` to a navmesh set file
pub fn save_to_file<P: AsRef<Path>>(mesh: &TiledNavMesh, path: P) -> tilenav_common::Result<()> {
    let data = export_nav_mesh(mesh)?;
    std::fs::write(path, data)?;
    Ok(())
}

/// Reads a navmesh set file
pub fn load_from_file<P: AsRef<Path>>(path: P) -> tilenav_common::Result<TiledNavMesh> {
    let data = std::fs::read(path)?;
    Ok(import_nav_mesh(&data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_spells_mset() {
        assert_eq!(NAVMESHSET_MAGIC, 0x4D53_4554);
        assert_eq!(NAVMESHSET_MAGIC.to_be_bytes(), *b"MSET");
    }

    #[test]
    fn test_empty_mesh_export() {
        let params = NavMeshParams {
            origin: [1.0, 2.0, 3.0],
            tile_width: 9.6,
            tile_height: 9.6,
            max_tiles: 4,
            max_polys: 1 << 20,
        };
        let mesh = TiledNavMesh::new(params).unwrap();
        let data = export_nav_mesh(&mesh).unwrap();
        assert_eq!(data.len(), 40);

        let header = read_set_header(&data).unwrap();
        assert_eq!(header.num_tiles, 0);
        assert_eq!(header.params, params);

        let restored = import_nav_mesh(&data).unwrap();
        assert_eq!(restored.tile_count(), 0);
        assert_eq!(*restored.params(), params);
    }

    #[test]
    fn test_rejects_foreign_data() {
        let mut data = vec![0u8; 40];
        assert_eq!(read_set_header(&data), Err(Status::WrongMagic));

        data[..4].copy_from_slice(&NAVMESHSET_MAGIC.to_le_bytes());
        data[4..8].copy_from_slice(&2i32.to_le_bytes());
        assert_eq!(read_set_header(&data), Err(Status::WrongVersion));

        assert_eq!(read_set_header(&data[..12]), Err(Status::DataCorrupted));
    }
}
