//! Packing polygon and detail meshes into a tile payload
//!
//! Converts the cell-space polygon mesh into world-space tile data, strips
//! the polygon vertices from the detail mesh, translates border portals to
//! tile-side markers and builds the quantized BV tree.

use tilenav_recast::{PolyMesh, PolyMeshDetail, MESH_NULL_IDX};

use crate::{
    BVNode, MeshHeader, Poly, PolyDetail, PolyFlags, PolyType, Status, TileData,
    DT_DETAIL_EDGE_BOUNDARY, DT_EXT_LINK, DT_NAVMESH_MAGIC, DT_NAVMESH_VERSION,
    MAX_VERTS_PER_POLY,
};

/// Input of [`create_nav_mesh_data`]
#[derive(Debug, Clone)]
pub struct NavMeshCreateParams<'a> {
    /// Polygon mesh vertices `[x, y, z]` in cell units
    pub verts: &'a [u16],
    /// Polygon data, `nvp * 2` entries per polygon
    pub polys: &'a [u16],
    /// Area id per polygon
    pub poly_areas: &'a [u8],
    /// Flags per polygon
    pub poly_flags: &'a [u16],
    /// Maximum vertices per polygon
    pub nvp: usize,
    /// Per polygon `[vert_base, vert_count, tri_base, tri_count]`, may be empty
    pub detail_meshes: &'a [[u32; 4]],
    /// Detail vertices in world units
    pub detail_verts: &'a [f32],
    /// Detail triangles
    pub detail_tris: &'a [[u8; 4]],
    pub user_id: u32,
    pub tile_x: i32,
    pub tile_y: i32,
    pub tile_layer: i32,
    /// Tile bounds in world units
    pub bmin: [f32; 3],
    pub bmax: [f32; 3],
    /// Agent height in world units
    pub walkable_height: f32,
    /// Agent radius in world units
    pub walkable_radius: f32,
    /// Agent climb in world units
    pub walkable_climb: f32,
    /// Cell size
    pub cs: f32,
    /// Cell height
    pub ch: f32,
    /// Build the BV tree used by spatial queries
    pub build_bv_tree: bool,
}

impl<'a> NavMeshCreateParams<'a> {
    /// Takes mesh data, bounds and cell sizes from the recast meshes.
    /// Tile location and agent values start at zero.
    pub fn from_meshes(pmesh: &'a PolyMesh, dmesh: &'a PolyMeshDetail) -> Self {
        Self {
            verts: &pmesh.verts,
            polys: &pmesh.polys,
            poly_areas: &pmesh.areas,
            poly_flags: &pmesh.flags,
            nvp: pmesh.nvp,
            detail_meshes: &dmesh.meshes,
            detail_verts: &dmesh.verts,
            detail_tris: &dmesh.tris,
            user_id: 0,
            tile_x: 0,
            tile_y: 0,
            tile_layer: 0,
            bmin: pmesh.bmin.to_array(),
            bmax: pmesh.bmax.to_array(),
            walkable_height: 0.0,
            walkable_radius: 0.0,
            walkable_climb: 0.0,
            cs: pmesh.cs,
            ch: pmesh.ch,
            build_bv_tree: false,
        }
    }

    fn vert_count(&self) -> usize {
        self.verts.len() / 3
    }

    fn poly_count(&self) -> usize {
        if self.nvp == 0 {
            0
        } else {
            self.polys.len() / (self.nvp * 2)
        }
    }

    fn poly(&self, i: usize) -> &'a [u16] {
        let polys: &'a [u16] = self.polys;
        &polys[i * self.nvp * 2..(i + 1) * self.nvp * 2]
    }
}

fn portal_side(nei: u16) -> u16 {
    match nei & 0xf {
        0 => DT_EXT_LINK | 4,
        1 => DT_EXT_LINK | 2,
        2 => DT_EXT_LINK,
        3 => DT_EXT_LINK | 6,
        _ => 0,
    }
}

#[derive(Debug, Clone, Copy)]
struct BvItem {
    bmin: [u16; 3],
    bmax: [u16; 3],
    i: i32,
}

fn subdivide(items: &mut [BvItem], nodes: &mut Vec<BVNode>) {
    let icur = nodes.len();
    nodes.push(BVNode::default());

    if items.len() == 1 {
        let item = items[0];
        nodes[icur] = BVNode {
            bmin: item.bmin,
            bmax: item.bmax,
            i: item.i,
        };
        return;
    }

    let mut bmin = items[0].bmin;
    let mut bmax = items[0].bmax;
    for item in items.iter().skip(1) {
        for k in 0..3 {
            bmin[k] = bmin[k].min(item.bmin[k]);
            bmax[k] = bmax[k].max(item.bmax[k]);
        }
    }

    let extent = [bmax[0] - bmin[0], bmax[1] - bmin[1], bmax[2] - bmin[2]];
    let axis = if extent[1] > extent[0] && extent[1] > extent[2] {
        1
    } else if extent[2] > extent[0] {
        2
    } else {
        0
    };
    items.sort_by_key(|item| item.bmin[axis]);

    let split = items.len() / 2;
    let (left, right) = items.split_at_mut(split);
    subdivide(left, nodes);
    subdivide(right, nodes);

    let escape = nodes.len() - icur;
    nodes[icur] = BVNode {
        bmin,
        bmax,
        i: -(escape as i32),
    };
}

fn create_bv_tree(params: &NavMeshCreateParams<'_>, polys: &[Poly]) -> Vec<BVNode> {
    let quant = |v: f32| v.clamp(0.0, 65535.0) as u16;
    let ch_cs = params.ch / params.cs;

    let mut items: Vec<BvItem> = polys
        .iter()
        .enumerate()
        .map(|(i, poly)| {
            let mut lo = [u16::MAX; 3];
            let mut hi = [0u16; 3];
            for &v in &poly.verts[..poly.vert_count as usize] {
                let v = v as usize * 3;
                for k in 0..3 {
                    lo[k] = lo[k].min(params.verts[v + k]);
                    hi[k] = hi[k].max(params.verts[v + k]);
                }
            }
            // y is in cell-height units, BV space uses cell-size units
            lo[1] = quant((lo[1] as f32 * ch_cs).floor());
            hi[1] = quant((hi[1] as f32 * ch_cs).ceil());
            BvItem {
                bmin: lo,
                bmax: hi,
                i: i as i32,
            }
        })
        .collect();

    let mut nodes = Vec::with_capacity(items.len() * 2);
    if !items.is_empty() {
        subdivide(&mut items, &mut nodes);
    }
    nodes
}

/// Packs one tile. Fails with [`Status::InvalidParam`] on empty or
/// oversized input.
pub fn create_nav_mesh_data(params: &NavMeshCreateParams<'_>) -> Result<Vec<u8>, Status> {
    let nvp = params.nvp;
    if nvp < 3 || nvp > MAX_VERTS_PER_POLY {
        return Err(Status::InvalidParam);
    }
    let nverts = params.vert_count();
    let npolys = params.poly_count();
    if nverts == 0 || nverts >= 0xffff || npolys == 0 {
        return Err(Status::InvalidParam);
    }
    if params.poly_areas.len() < npolys || params.poly_flags.len() < npolys {
        return Err(Status::InvalidParam);
    }
    let has_detail = !params.detail_meshes.is_empty();
    if has_detail && params.detail_meshes.len() < npolys {
        return Err(Status::InvalidParam);
    }

    let mut edge_count = 0;
    let mut portal_count = 0;
    for i in 0..npolys {
        let p = params.poly(i);
        for j in 0..nvp {
            if p[j] == MESH_NULL_IDX {
                break;
            }
            edge_count += 1;
            if p[nvp + j] & 0x8000 != 0 && p[nvp + j] != MESH_NULL_IDX {
                portal_count += 1;
            }
        }
    }

    let mut verts = Vec::with_capacity(nverts * 3);
    for v in params.verts.chunks_exact(3) {
        verts.push(params.bmin[0] + v[0] as f32 * params.cs);
        verts.push(params.bmin[1] + v[1] as f32 * params.ch);
        verts.push(params.bmin[2] + v[2] as f32 * params.cs);
    }

    let mut polys = Vec::with_capacity(npolys);
    for i in 0..npolys {
        let p = params.poly(i);
        let mut poly = Poly::new(
            params.poly_areas[i],
            PolyType::Ground,
            PolyFlags::from_bits_retain(params.poly_flags[i]),
        );
        for j in 0..nvp {
            if p[j] == MESH_NULL_IDX {
                break;
            }
            if p[j] as usize >= nverts {
                return Err(Status::InvalidParam);
            }
            poly.verts[j] = p[j];
            let nei = p[nvp + j];
            poly.neis[j] = if nei == MESH_NULL_IDX {
                0
            } else if nei & 0x8000 != 0 {
                portal_side(nei)
            } else {
                nei + 1
            };
            poly.vert_count += 1;
        }
        if poly.vert_count < 3 {
            return Err(Status::InvalidParam);
        }
        polys.push(poly);
    }

    let mut detail_meshes = Vec::with_capacity(npolys);
    let mut detail_verts = Vec::new();
    let mut detail_tris = Vec::new();
    if has_detail {
        for (i, poly) in polys.iter().enumerate() {
            let [vb, ndv, tb, ntris] = params.detail_meshes[i];
            let nv = poly.vert_count as u32;
            let extra = ndv.saturating_sub(nv);
            detail_meshes.push(PolyDetail {
                vert_base: (detail_verts.len() / 3) as u32,
                tri_base: tb,
                vert_count: extra as u8,
                tri_count: ntris as u8,
            });
            let start = ((vb + nv) * 3) as usize;
            let end = ((vb + ndv) * 3) as usize;
            let src = params
                .detail_verts
                .get(start..end)
                .ok_or(Status::InvalidParam)?;
            detail_verts.extend_from_slice(src);
        }
        detail_tris.extend_from_slice(params.detail_tris);
    } else {
        // Fan triangulation straight from the polygons
        for poly in &polys {
            let nv = poly.vert_count as usize;
            detail_meshes.push(PolyDetail {
                vert_base: 0,
                tri_base: detail_tris.len() as u32,
                vert_count: 0,
                tri_count: (nv - 2) as u8,
            });
            for j in 2..nv {
                let mut flags = DT_DETAIL_EDGE_BOUNDARY << 2;
                if j == 2 {
                    flags |= DT_DETAIL_EDGE_BOUNDARY;
                }
                if j == nv - 1 {
                    flags |= DT_DETAIL_EDGE_BOUNDARY << 4;
                }
                detail_tris.push([0, (j - 1) as u8, j as u8, flags]);
            }
        }
    }

    let bv_nodes = if params.build_bv_tree {
        create_bv_tree(params, &polys)
    } else {
        Vec::new()
    };

    let header = MeshHeader {
        magic: DT_NAVMESH_MAGIC,
        version: DT_NAVMESH_VERSION,
        x: params.tile_x,
        y: params.tile_y,
        layer: params.tile_layer,
        user_id: params.user_id,
        max_link_count: (edge_count + portal_count * 2) as i32,
        off_mesh_base: npolys as i32,
        walkable_height: params.walkable_height,
        walkable_radius: params.walkable_radius,
        walkable_climb: params.walkable_climb,
        bmin: params.bmin,
        bmax: params.bmax,
        bv_quant_factor: 1.0 / params.cs,
        ..Default::default()
    };

    TileData {
        header,
        verts,
        polys,
        detail_meshes,
        detail_verts,
        detail_tris,
        bv_nodes,
        off_mesh_cons: Vec::new(),
    }
    .to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NVP: usize = 6;
    const N: u16 = MESH_NULL_IDX;

    // Two quads side by side, the right one touching the +x tile border
    fn two_quads() -> (Vec<u16>, Vec<u16>) {
        let verts = vec![
            0, 0, 0, //
            0, 0, 4, //
            4, 0, 4, //
            4, 0, 0, //
            8, 0, 4, //
            8, 0, 0,
        ];
        let polys = vec![
            0, 1, 2, 3, N, N, N, N, 1, N, N, N, //
            3, 2, 4, 5, N, N, 0, N, 0x8002, N, N, N,
        ];
        (verts, polys)
    }

    fn params<'a>(verts: &'a [u16], polys: &'a [u16]) -> NavMeshCreateParams<'a> {
        NavMeshCreateParams {
            verts,
            polys,
            poly_areas: &[1, 2],
            poly_flags: &[1, 1],
            nvp: NVP,
            detail_meshes: &[],
            detail_verts: &[],
            detail_tris: &[],
            user_id: 0,
            tile_x: 2,
            tile_y: 5,
            tile_layer: 0,
            bmin: [10.0, 0.0, 20.0],
            bmax: [12.4, 1.0, 21.2],
            walkable_height: 2.0,
            walkable_radius: 0.6,
            walkable_climb: 0.9,
            cs: 0.3,
            ch: 0.2,
            build_bv_tree: true,
        }
    }

    #[test]
    fn test_packs_polygons_in_world_space() {
        let (verts, polys) = two_quads();
        let data = create_nav_mesh_data(&params(&verts, &polys)).unwrap();
        let tile = TileData::from_bytes(&data).unwrap();

        assert_eq!((tile.header.x, tile.header.y), (2, 5));
        assert_eq!(tile.header.poly_count, 2);
        assert_eq!(tile.header.vert_count, 6);
        assert!((tile.verts[12] - 12.4).abs() < 1e-5);
        assert!((tile.verts[14] - 21.2).abs() < 1e-5);

        // Internal neighbours are index + 1, the border edge is a portal on side 0
        assert_eq!(tile.polys[0].neis[2], 2);
        assert_eq!(tile.polys[1].neis[0], 1);
        assert_eq!(tile.polys[1].neis[2], DT_EXT_LINK);
        assert_eq!(tile.polys[1].area(), 2);
        // 8 edges plus 2 links per portal
        assert_eq!(tile.header.max_link_count, 10);

        assert_eq!(tile.detail_tris.len(), 4);
        assert_eq!(tile.detail_meshes[1].tri_base, 2);
    }

    #[test]
    fn test_bv_tree_covers_all_polygons() {
        let (verts, polys) = two_quads();
        let data = create_nav_mesh_data(&params(&verts, &polys)).unwrap();
        let tile = TileData::from_bytes(&data).unwrap();

        assert_eq!(tile.bv_nodes.len(), 3);
        let root = tile.bv_nodes[0];
        assert_eq!(root.i, -3);
        assert_eq!(root.bmin, [0, 0, 0]);
        assert_eq!(root.bmax, [8, 0, 4]);
        let mut leaves: Vec<i32> = tile.bv_nodes[1..].iter().map(|n| n.i).collect();
        leaves.sort_unstable();
        assert_eq!(leaves, vec![0, 1]);
    }

    #[test]
    fn test_empty_mesh_is_rejected() {
        let (verts, _) = two_quads();
        let p = params(&verts, &[]);
        assert_eq!(create_nav_mesh_data(&p), Err(Status::InvalidParam));

        let (verts, polys) = two_quads();
        let mut p = params(&verts, &polys);
        p.nvp = 7;
        assert_eq!(create_nav_mesh_data(&p), Err(Status::InvalidParam));
    }

    #[test]
    fn test_detail_vertices_are_stripped() {
        let verts = vec![0, 0, 0, 0, 0, 4, 4, 0, 4];
        let polys = vec![0, 1, 2, N, N, N, N, N, N, N, N, N];
        let detail_meshes = [[0u32, 4, 0, 3]];
        let detail_verts = [
            0.0, 0.0, 0.0, 0.0, 0.0, 1.2, 1.2, 0.0, 1.2, // polygon vertices
            0.4, 0.1, 0.8, // interior sample
        ];
        let detail_tris = [[0u8, 1, 3, 0], [1, 2, 3, 0], [2, 0, 3, 0]];
        let mut p = params(&verts, &polys);
        p.poly_areas = &[1];
        p.poly_flags = &[1];
        p.detail_meshes = &detail_meshes;
        p.detail_verts = &detail_verts;
        p.detail_tris = &detail_tris;

        let tile = TileData::from_bytes(&create_nav_mesh_data(&p).unwrap()).unwrap();
        assert_eq!(tile.detail_verts, vec![0.4, 0.1, 0.8]);
        assert_eq!(tile.detail_meshes[0].vert_count, 1);
        assert_eq!(tile.detail_tris.len(), 3);
    }
}
