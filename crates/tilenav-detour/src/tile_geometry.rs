//! Renderable triangles of a single tile

use crate::{PolyType, TiledNavMesh};

/// Triangle soup of one tile's ground polygons
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileGeometry {
    /// Vertices as `[x, y, z, 0]`
    pub vertices: Vec<f32>,
    /// Triangle indices into `vertices`, three per triangle
    pub indices: Vec<u32>,
}

impl TileGeometry {
    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 4
    }

    /// Number of triangles
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

impl TiledNavMesh {
    /// Polygon outline triangles of the layer 0 tile at (tx, ty).
    ///
    /// Every ground polygon is fanned from its first vertex; off-mesh
    /// connections are skipped.
    pub fn extract_tile_geometry(&self, tx: i32, ty: i32) -> Option<TileGeometry> {
        let tile = self.tile_at(tx, ty, 0)?.tile();

        let mut geometry = TileGeometry {
            vertices: Vec::with_capacity(tile.verts.len() / 3 * 4),
            indices: Vec::new(),
        };
        for v in tile.verts.chunks_exact(3) {
            geometry.vertices.extend_from_slice(&[v[0], v[1], v[2], 0.0]);
        }

        for poly in &tile.polys {
            if poly.poly_type() == PolyType::OffMeshConnection {
                continue;
            }
            let verts = &poly.verts[..poly.vert_count as usize];
            for j in 2..verts.len() {
                geometry
                    .indices
                    .extend_from_slice(&[verts[0] as u32, verts[j - 1] as u32, verts[j] as u32]);
            }
        }

        Some(geometry)
    }
}
