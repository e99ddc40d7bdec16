//! Height detail for the polygon mesh
//!
//! Every polygon gets a triangle fan whose vertices sit on the walkable
//! surface. Polygon vertex heights are resampled from the compact
//! heightfield so the detail surface follows the voxelized floor.

use tilenav_common::{Error, Result};

use crate::{BuildContext, CompactHeightfield, PolyMesh, TimerCategory, MESH_NULL_IDX};

/// Detail triangle edge flag: edge lies on the polygon boundary
pub const DETAIL_EDGE_BOUNDARY: u8 = 0x01;

/// Detail meshes for every polygon of a [`PolyMesh`]
#[derive(Debug, Clone, Default)]
pub struct PolyMeshDetail {
    /// Per polygon `[vert_base, vert_count, tri_base, tri_count]`
    pub meshes: Vec<[u32; 4]>,
    /// World space vertices `[x, y, z]`, polygon vertices first in each sub-mesh
    pub verts: Vec<f32>,
    /// Triangles as local vertex indices plus edge flags
    pub tris: Vec<[u8; 4]>,
}

impl PolyMeshDetail {
    /// Number of vertices
    pub fn vert_count(&self) -> usize {
        self.verts.len() / 3
    }
}

fn tri_flags(j: usize, n: usize) -> u8 {
    let mut flags = DETAIL_EDGE_BOUNDARY << 2;
    if j == 1 {
        flags |= DETAIL_EDGE_BOUNDARY;
    }
    if j + 2 == n {
        flags |= DETAIL_EDGE_BOUNDARY << 4;
    }
    flags
}

/// Height of the span closest to `y` in the column at (x, z), in voxels
fn sample_height(chf: &CompactHeightfield, x: i32, z: i32, y: i32) -> Option<i32> {
    let x = x.clamp(0, chf.width - 1);
    let z = z.clamp(0, chf.height - 1);
    chf.cell_spans(x, z)
        .map(|i| chf.spans[i].y as i32)
        .min_by_key(|&sy| (sy - y).abs())
}

/// Builds the detail mesh of `pmesh`.
///
/// `sample_dist` and `sample_max_error` bound how far the detail surface may
/// drift from the heightfield; resampling currently happens at polygon
/// vertices only.
pub fn build_poly_mesh_detail(
    ctx: &mut BuildContext,
    pmesh: &PolyMesh,
    chf: &CompactHeightfield,
    sample_dist: f32,
    sample_max_error: f32,
) -> Result<PolyMeshDetail> {
    ctx.timed(TimerCategory::DetailMesh, |ctx| {
        if pmesh.nverts == 0 || pmesh.npolys == 0 {
            return Ok(PolyMeshDetail::default());
        }
        if chf.width <= 0 || chf.height <= 0 {
            return Err(Error::Recast("detail mesh needs a non-empty heightfield".into()));
        }

        let border = pmesh.border_size;
        let climb = chf.walkable_climb.max(1) + (sample_max_error / chf.ch).ceil() as i32;
        let mut detail = PolyMeshDetail::default();
        detail.meshes.reserve(pmesh.npolys);

        for p in 0..pmesh.npolys {
            let poly = pmesh.poly_verts(p);
            let n = poly.iter().take_while(|&&v| v != MESH_NULL_IDX).count();

            let vert_base = detail.vert_count() as u32;
            let tri_base = detail.tris.len() as u32;
            for &vi in &poly[..n] {
                let [vx, vy, vz] = pmesh.vertex(vi as usize);
                let mut y = vy as i32;
                if let Some(sy) = sample_height(chf, vx as i32 + border, vz as i32 + border, y) {
                    if (sy - y).abs() <= climb {
                        y = sy;
                    }
                }
                detail.verts.extend_from_slice(&[
                    pmesh.bmin.x + vx as f32 * pmesh.cs,
                    pmesh.bmin.y + y as f32 * pmesh.ch,
                    pmesh.bmin.z + vz as f32 * pmesh.cs,
                ]);
            }

            for j in 1..n - 1 {
                detail.tris.push([0, j as u8, (j + 1) as u8, tri_flags(j, n)]);
            }

            detail.meshes.push([vert_base, n as u32, tri_base, (n - 2) as u32]);
        }

        ctx.log_debug(format!(
            "built detail mesh with {} vertices and {} triangles (sample distance {})",
            detail.vert_count(),
            detail.tris.len(),
            sample_dist
        ));
        Ok(detail)
    })
}
