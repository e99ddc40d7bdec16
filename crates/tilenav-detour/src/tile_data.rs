//! Packed tile payload (`DNAV` blob)
//!
//! Layout, little endian, every section 4-byte aligned:
//! header, vertices, polygons, links (reserved, zeroed), detail meshes,
//! detail vertices, detail triangles, BV nodes, off-mesh connections.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::{PolyFlags, PolyType, Status, MAX_VERTS_PER_POLY};

/// Magic number of a tile payload ('DNAV')
pub const DT_NAVMESH_MAGIC: i32 =
    (b'D' as i32) << 24 | (b'N' as i32) << 16 | (b'A' as i32) << 8 | b'V' as i32;

/// Current tile payload version
pub const DT_NAVMESH_VERSION: i32 = 7;

const HEADER_SIZE: usize = 100;
const POLY_SIZE: usize = 32;
const LINK_SIZE: usize = 12;
const DETAIL_MESH_SIZE: usize = 12;
const BV_NODE_SIZE: usize = 16;
const OFF_MESH_CON_SIZE: usize = 36;

/// Tile payload header
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct MeshHeader {
    pub magic: i32,
    pub version: i32,
    pub x: i32,
    pub y: i32,
    pub layer: i32,
    pub user_id: u32,
    pub poly_count: i32,
    pub vert_count: i32,
    pub max_link_count: i32,
    pub detail_mesh_count: i32,
    pub detail_vert_count: i32,
    pub detail_tri_count: i32,
    pub bv_node_count: i32,
    pub off_mesh_con_count: i32,
    /// Index of the first off-mesh connection polygon
    pub off_mesh_base: i32,
    pub walkable_height: f32,
    pub walkable_radius: f32,
    pub walkable_climb: f32,
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
    /// Scale from world units to BV node units
    pub bv_quant_factor: f32,
}

impl Default for MeshHeader {
    fn default() -> Self {
        Self {
            magic: DT_NAVMESH_MAGIC,
            version: DT_NAVMESH_VERSION,
            x: 0,
            y: 0,
            layer: 0,
            user_id: 0,
            poly_count: 0,
            vert_count: 0,
            max_link_count: 0,
            detail_mesh_count: 0,
            detail_vert_count: 0,
            detail_tri_count: 0,
            bv_node_count: 0,
            off_mesh_con_count: 0,
            off_mesh_base: 0,
            walkable_height: 0.0,
            walkable_radius: 0.0,
            walkable_climb: 0.0,
            bmin: [0.0; 3],
            bmax: [0.0; 3],
            bv_quant_factor: 0.0,
        }
    }
}

impl MeshHeader {
    fn read_from<R: Read>(reader: &mut R) -> Result<Self, Status> {
        let mut header = MeshHeader {
            magic: reader.read_i32::<LittleEndian>()?,
            version: reader.read_i32::<LittleEndian>()?,
            ..Default::default()
        };
        if header.magic != DT_NAVMESH_MAGIC {
            return Err(Status::WrongMagic);
        }
        if header.version != DT_NAVMESH_VERSION {
            return Err(Status::WrongVersion);
        }

        header.x = reader.read_i32::<LittleEndian>()?;
        header.y = reader.read_i32::<LittleEndian>()?;
        header.layer = reader.read_i32::<LittleEndian>()?;
        header.user_id = reader.read_u32::<LittleEndian>()?;
        header.poly_count = reader.read_i32::<LittleEndian>()?;
        header.vert_count = reader.read_i32::<LittleEndian>()?;
        header.max_link_count = reader.read_i32::<LittleEndian>()?;
        header.detail_mesh_count = reader.read_i32::<LittleEndian>()?;
        header.detail_vert_count = reader.read_i32::<LittleEndian>()?;
        header.detail_tri_count = reader.read_i32::<LittleEndian>()?;
        header.bv_node_count = reader.read_i32::<LittleEndian>()?;
        header.off_mesh_con_count = reader.read_i32::<LittleEndian>()?;
        header.off_mesh_base = reader.read_i32::<LittleEndian>()?;
        header.walkable_height = reader.read_f32::<LittleEndian>()?;
        header.walkable_radius = reader.read_f32::<LittleEndian>()?;
        header.walkable_climb = reader.read_f32::<LittleEndian>()?;
        for v in header.bmin.iter_mut() {
            *v = reader.read_f32::<LittleEndian>()?;
        }
        for v in header.bmax.iter_mut() {
            *v = reader.read_f32::<LittleEndian>()?;
        }
        header.bv_quant_factor = reader.read_f32::<LittleEndian>()?;
        Ok(header)
    }

    fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for v in [
            self.magic,
            self.version,
            self.x,
            self.y,
            self.layer,
        ] {
            writer.write_i32::<LittleEndian>(v)?;
        }
        writer.write_u32::<LittleEndian>(self.user_id)?;
        for v in [
            self.poly_count,
            self.vert_count,
            self.max_link_count,
            self.detail_mesh_count,
            self.detail_vert_count,
            self.detail_tri_count,
            self.bv_node_count,
            self.off_mesh_con_count,
            self.off_mesh_base,
        ] {
            writer.write_i32::<LittleEndian>(v)?;
        }
        for v in [self.walkable_height, self.walkable_radius, self.walkable_climb]
            .iter()
            .chain(&self.bmin)
            .chain(&self.bmax)
        {
            writer.write_f32::<LittleEndian>(*v)?;
        }
        writer.write_f32::<LittleEndian>(self.bv_quant_factor)
    }

    /// Size in bytes of a payload described by this header
    pub fn data_size(&self) -> usize {
        let count = |n: i32| n.max(0) as usize;
        HEADER_SIZE
            + count(self.vert_count) * 12
            + count(self.poly_count) * POLY_SIZE
            + count(self.max_link_count) * LINK_SIZE
            + count(self.detail_mesh_count) * DETAIL_MESH_SIZE
            + count(self.detail_vert_count) * 12
            + count(self.detail_tri_count) * 4
            + count(self.bv_node_count) * BV_NODE_SIZE
            + count(self.off_mesh_con_count) * OFF_MESH_CON_SIZE
    }
}

/// Navigation polygon as stored in a tile
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Poly {
    /// Index of the first link, filled at runtime
    pub first_link: u32,
    /// Vertex indices into the tile vertex array
    pub verts: [u16; MAX_VERTS_PER_POLY],
    /// Per edge: 0 for none, polygon index + 1 inside the tile, or a portal marker
    pub neis: [u16; MAX_VERTS_PER_POLY],
    /// Traversal flags
    pub flags: PolyFlags,
    /// Number of vertices in use
    pub vert_count: u8,
    /// Area id in the low 6 bits, [`PolyType`] in the high 2 bits
    pub area_and_type: u8,
}

impl Poly {
    /// Creates an empty polygon
    pub fn new(area: u8, poly_type: PolyType, flags: PolyFlags) -> Self {
        let mut poly = Self {
            first_link: u32::MAX,
            verts: [0; MAX_VERTS_PER_POLY],
            neis: [0; MAX_VERTS_PER_POLY],
            flags,
            vert_count: 0,
            area_and_type: 0,
        };
        poly.set_area(area);
        poly.set_type(poly_type);
        poly
    }

    /// Area id
    pub fn area(&self) -> u8 {
        self.area_and_type & 0x3f
    }

    /// Sets the area id, keeping the type bits
    pub fn set_area(&mut self, area: u8) {
        self.area_and_type = (self.area_and_type & 0xc0) | (area & 0x3f);
    }

    /// Polygon type
    pub fn poly_type(&self) -> PolyType {
        PolyType::from_bits(self.area_and_type >> 6)
    }

    /// Sets the polygon type, keeping the area bits
    pub fn set_type(&mut self, poly_type: PolyType) {
        self.area_and_type = (self.area_and_type & 0x3f) | ((poly_type as u8) << 6);
    }
}

/// Detail sub-mesh of one polygon
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PolyDetail {
    /// First extra vertex in the detail vertex array
    pub vert_base: u32,
    /// First triangle in the detail triangle array
    pub tri_base: u32,
    /// Number of extra vertices
    pub vert_count: u8,
    /// Number of triangles
    pub tri_count: u8,
}

/// Quantized bounding volume node. Leaves hold a polygon index in `i`,
/// interior nodes hold the negated escape offset.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct BVNode {
    pub bmin: [u16; 3],
    pub bmax: [u16; 3],
    pub i: i32,
}

/// Off-mesh connection between two points
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct OffMeshConnection {
    /// Start and end positions `[sx, sy, sz, ex, ey, ez]`
    pub pos: [f32; 6],
    /// Endpoint radius
    pub rad: f32,
    /// Polygon index of the connection within the tile
    pub poly: u16,
    /// Link flags
    pub flags: u8,
    /// End point side
    pub side: u8,
    /// User id
    pub user_id: u32,
}

/// Parsed tile payload
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TileData {
    pub header: MeshHeader,
    /// World-space vertices `[x, y, z]`
    pub verts: Vec<f32>,
    pub polys: Vec<Poly>,
    pub detail_meshes: Vec<PolyDetail>,
    /// Extra detail vertices `[x, y, z]`
    pub detail_verts: Vec<f32>,
    pub detail_tris: Vec<[u8; 4]>,
    pub bv_nodes: Vec<BVNode>,
    pub off_mesh_cons: Vec<OffMeshConnection>,
}

fn section_len(count: i32, what: &str) -> Result<usize, Status> {
    usize::try_from(count).map_err(|_| {
        log::warn!("negative {} count {} in tile header", what, count);
        Status::DataCorrupted
    })
}

impl TileData {
    /// Reads just the header of a payload
    pub fn read_header(data: &[u8]) -> Result<MeshHeader, Status> {
        if data.len() < HEADER_SIZE {
            return Err(Status::DataCorrupted);
        }
        MeshHeader::read_from(&mut Cursor::new(data))
    }

    /// Parses a payload, validating magic, version and section sizes
    pub fn from_bytes(data: &[u8]) -> Result<Self, Status> {
        let header = Self::read_header(data)?;
        if header.data_size() != data.len() {
            log::warn!(
                "tile ({}, {}) payload is {} bytes, header describes {}",
                header.x,
                header.y,
                data.len(),
                header.data_size()
            );
            return Err(Status::DataCorrupted);
        }

        let mut cur = Cursor::new(&data[HEADER_SIZE..]);

        let nverts = section_len(header.vert_count, "vertex")?;
        let mut verts = vec![0.0f32; nverts * 3];
        cur.read_f32_into::<LittleEndian>(&mut verts)?;

        let npolys = section_len(header.poly_count, "polygon")?;
        let mut polys = Vec::with_capacity(npolys);
        for _ in 0..npolys {
            let first_link = cur.read_u32::<LittleEndian>()?;
            let mut pverts = [0u16; MAX_VERTS_PER_POLY];
            cur.read_u16_into::<LittleEndian>(&mut pverts)?;
            let mut neis = [0u16; MAX_VERTS_PER_POLY];
            cur.read_u16_into::<LittleEndian>(&mut neis)?;
            let flags = PolyFlags::from_bits_retain(cur.read_u16::<LittleEndian>()?);
            let vert_count = cur.read_u8()?;
            let area_and_type = cur.read_u8()?;
            if vert_count as usize > MAX_VERTS_PER_POLY {
                return Err(Status::DataCorrupted);
            }
            polys.push(Poly {
                first_link,
                verts: pverts,
                neis,
                flags,
                vert_count,
                area_and_type,
            });
        }

        let link_bytes = section_len(header.max_link_count, "link")? * LINK_SIZE;
        cur.set_position(cur.position() + link_bytes as u64);

        let ndetail = section_len(header.detail_mesh_count, "detail mesh")?;
        let mut detail_meshes = Vec::with_capacity(ndetail);
        for _ in 0..ndetail {
            let vert_base = cur.read_u32::<LittleEndian>()?;
            let tri_base = cur.read_u32::<LittleEndian>()?;
            let vert_count = cur.read_u8()?;
            let tri_count = cur.read_u8()?;
            cur.read_u16::<LittleEndian>()?;
            detail_meshes.push(PolyDetail {
                vert_base,
                tri_base,
                vert_count,
                tri_count,
            });
        }

        let detail_vert_count = section_len(header.detail_vert_count, "detail vertex")?;
        let mut detail_verts = vec![0.0f32; detail_vert_count * 3];
        cur.read_f32_into::<LittleEndian>(&mut detail_verts)?;

        let ntris = section_len(header.detail_tri_count, "detail triangle")?;
        let mut detail_tris = Vec::with_capacity(ntris);
        for _ in 0..ntris {
            let mut t = [0u8; 4];
            cur.read_exact(&mut t)?;
            detail_tris.push(t);
        }

        let nnodes = section_len(header.bv_node_count, "bv node")?;
        let mut bv_nodes = Vec::with_capacity(nnodes);
        for _ in 0..nnodes {
            let mut node = BVNode::default();
            cur.read_u16_into::<LittleEndian>(&mut node.bmin)?;
            cur.read_u16_into::<LittleEndian>(&mut node.bmax)?;
            node.i = cur.read_i32::<LittleEndian>()?;
            bv_nodes.push(node);
        }

        let ncons = section_len(header.off_mesh_con_count, "off-mesh connection")?;
        let mut off_mesh_cons = Vec::with_capacity(ncons);
        for _ in 0..ncons {
            let mut con = OffMeshConnection::default();
            cur.read_f32_into::<LittleEndian>(&mut con.pos)?;
            con.rad = cur.read_f32::<LittleEndian>()?;
            con.poly = cur.read_u16::<LittleEndian>()?;
            con.flags = cur.read_u8()?;
            con.side = cur.read_u8()?;
            con.user_id = cur.read_u32::<LittleEndian>()?;
            off_mesh_cons.push(con);
        }

        let tile = Self {
            header,
            verts,
            polys,
            detail_meshes,
            detail_verts,
            detail_tris,
            bv_nodes,
            off_mesh_cons,
        };
        tile.check_indices()?;
        Ok(tile)
    }

    fn check_indices(&self) -> Result<(), Status> {
        let nverts = self.verts.len() / 3;
        for poly in &self.polys {
            if poly.verts[..poly.vert_count as usize]
                .iter()
                .any(|&v| v as usize >= nverts)
            {
                return Err(Status::DataCorrupted);
            }
        }
        Ok(())
    }

    /// Serializes the payload. Header counts are taken from the sections.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Status> {
        let mut header = self.header.clone();
        header.vert_count = (self.verts.len() / 3) as i32;
        header.poly_count = self.polys.len() as i32;
        header.detail_mesh_count = self.detail_meshes.len() as i32;
        header.detail_vert_count = (self.detail_verts.len() / 3) as i32;
        header.detail_tri_count = self.detail_tris.len() as i32;
        header.bv_node_count = self.bv_nodes.len() as i32;
        header.off_mesh_con_count = self.off_mesh_cons.len() as i32;

        let size = header.data_size();
        let mut out = Vec::new();
        out.try_reserve_exact(size).map_err(|_| Status::OutOfMemory)?;

        header.write_to(&mut out)?;
        for v in &self.verts {
            out.write_f32::<LittleEndian>(*v)?;
        }
        for poly in &self.polys {
            out.write_u32::<LittleEndian>(poly.first_link)?;
            for v in poly.verts.iter().chain(&poly.neis) {
                out.write_u16::<LittleEndian>(*v)?;
            }
            out.write_u16::<LittleEndian>(poly.flags.bits())?;
            out.write_u8(poly.vert_count)?;
            out.write_u8(poly.area_and_type)?;
        }
        out.resize(out.len() + header.max_link_count.max(0) as usize * LINK_SIZE, 0);
        for dm in &self.detail_meshes {
            out.write_u32::<LittleEndian>(dm.vert_base)?;
            out.write_u32::<LittleEndian>(dm.tri_base)?;
            out.write_u8(dm.vert_count)?;
            out.write_u8(dm.tri_count)?;
            out.write_u16::<LittleEndian>(0)?;
        }
        for v in &self.detail_verts {
            out.write_f32::<LittleEndian>(*v)?;
        }
        for t in &self.detail_tris {
            out.write_all(t)?;
        }
        for node in &self.bv_nodes {
            for v in node.bmin.iter().chain(&node.bmax) {
                out.write_u16::<LittleEndian>(*v)?;
            }
            out.write_i32::<LittleEndian>(node.i)?;
        }
        for con in &self.off_mesh_cons {
            for v in &con.pos {
                out.write_f32::<LittleEndian>(*v)?;
            }
            out.write_f32::<LittleEndian>(con.rad)?;
            out.write_u16::<LittleEndian>(con.poly)?;
            out.write_u8(con.flags)?;
            out.write_u8(con.side)?;
            out.write_u32::<LittleEndian>(con.user_id)?;
        }

        debug_assert_eq!(out.len(), size);
        Ok(out)
    }

    /// Vertex `i` of the tile
    pub fn vertex(&self, i: usize) -> [f32; 3] {
        [self.verts[i * 3], self.verts[i * 3 + 1], self.verts[i * 3 + 2]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tile() -> TileData {
        let mut poly = Poly::new(5, PolyType::Ground, PolyFlags::WALK);
        poly.vert_count = 3;
        poly.verts[..3].copy_from_slice(&[0, 1, 2]);
        TileData {
            header: MeshHeader {
                x: 3,
                y: 4,
                max_link_count: 3,
                off_mesh_base: 1,
                bv_quant_factor: 2.0,
                ..Default::default()
            },
            verts: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0],
            polys: vec![poly],
            detail_meshes: vec![PolyDetail {
                vert_base: 0,
                tri_base: 0,
                vert_count: 0,
                tri_count: 1,
            }],
            detail_verts: Vec::new(),
            detail_tris: vec![[0, 1, 2, 0x15]],
            bv_nodes: vec![BVNode {
                bmin: [0, 0, 0],
                bmax: [2, 0, 2],
                i: 0,
            }],
            off_mesh_cons: Vec::new(),
        }
    }

    #[test]
    fn test_magic_spells_dnav() {
        assert_eq!(DT_NAVMESH_MAGIC.to_be_bytes(), *b"DNAV");
    }

    #[test]
    fn test_payload_layout() {
        let tile = sample_tile();
        let bytes = tile.to_bytes().unwrap();
        assert_eq!(bytes.len(), 100 + 36 + 32 + 3 * 12 + 12 + 4 + 16);
        assert_eq!(&bytes[0..4], &DT_NAVMESH_MAGIC.to_le_bytes());
        assert_eq!(&bytes[4..8], &7i32.to_le_bytes());

        let parsed = TileData::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.header.x, 3);
        assert_eq!(parsed.header.poly_count, 1);
        assert_eq!(parsed.polys[0].area(), 5);
        assert_eq!(parsed.polys[0].poly_type(), PolyType::Ground);
        assert_eq!(parsed.detail_tris, tile.detail_tris);
        assert_eq!(parsed.bv_nodes, tile.bv_nodes);
    }

    #[test]
    fn test_rejects_bad_magic_version_and_truncation() {
        let bytes = sample_tile().to_bytes().unwrap();

        let mut bad_magic = bytes.clone();
        bad_magic[0] ^= 0xff;
        assert_eq!(TileData::from_bytes(&bad_magic), Err(Status::WrongMagic));

        let mut bad_version = bytes.clone();
        bad_version[4] = 9;
        assert_eq!(TileData::from_bytes(&bad_version), Err(Status::WrongVersion));

        assert_eq!(
            TileData::from_bytes(&bytes[..bytes.len() - 1]),
            Err(Status::DataCorrupted)
        );
        assert_eq!(TileData::from_bytes(&bytes[..10]), Err(Status::DataCorrupted));
    }

    #[test]
    fn test_area_and_type_share_a_byte() {
        let mut poly = Poly::new(63, PolyType::OffMeshConnection, PolyFlags::empty());
        assert_eq!(poly.area_and_type, 0x7f);
        poly.set_area(2);
        assert_eq!(poly.area(), 2);
        assert_eq!(poly.poly_type(), PolyType::OffMeshConnection);
    }
}
