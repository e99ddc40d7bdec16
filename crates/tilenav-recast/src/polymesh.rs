//! Polygon mesh generation
//!
//! Each contour is ear-clipped into triangles, the triangles are greedily
//! merged into convex polygons of at most `nvp` vertices, and finally
//! neighbour links are computed between polygons sharing an edge.

use std::collections::HashMap;

use glam::Vec3;
use tilenav_common::{Error, Result};

use crate::geometry::{intersect, intersect_prop, left, left_on, vequal};
use crate::{BuildContext, ContourSet, TimerCategory};

/// Null index for polygon vertices and neighbours
pub const MESH_NULL_IDX: u16 = 0xffff;

/// Neighbour flag for an edge on the tile border; the low bits hold the direction
const PORTAL_FLAG: u16 = 0x8000;

/// Convex polygon mesh in cell units
#[derive(Debug, Clone)]
pub struct PolyMesh {
    /// Vertices `[x, y, z]` * nverts
    pub verts: Vec<u16>,
    /// Polygon vertex indices followed by neighbour indices, `nvp * 2` per polygon
    pub polys: Vec<u16>,
    /// Region id per polygon
    pub regs: Vec<u16>,
    /// Area id per polygon
    pub areas: Vec<u8>,
    /// User flags per polygon
    pub flags: Vec<u16>,
    /// Number of vertices
    pub nverts: usize,
    /// Number of polygons
    pub npolys: usize,
    /// Maximum vertices per polygon
    pub nvp: usize,
    /// Minimum bounds
    pub bmin: Vec3,
    /// Maximum bounds
    pub bmax: Vec3,
    /// Cell size
    pub cs: f32,
    /// Cell height
    pub ch: f32,
    /// Border size of the source heightfield
    pub border_size: i32,
    /// Simplification error of the source contours
    pub max_edge_error: f32,
}

impl PolyMesh {
    /// Vertex indices of polygon `i`, padded with [`MESH_NULL_IDX`]
    pub fn poly_verts(&self, i: usize) -> &[u16] {
        let base = i * self.nvp * 2;
        &self.polys[base..base + self.nvp]
    }

    /// Neighbour slots of polygon `i`
    pub fn poly_neighbours(&self, i: usize) -> &[u16] {
        let base = i * self.nvp * 2 + self.nvp;
        &self.polys[base..base + self.nvp]
    }

    /// Number of vertices actually used by polygon `i`
    pub fn poly_vert_count(&self, i: usize) -> usize {
        self.poly_verts(i)
            .iter()
            .take_while(|&&v| v != MESH_NULL_IDX)
            .count()
    }

    /// Vertex `i` in cell units
    pub fn vertex(&self, i: usize) -> [u16; 3] {
        [self.verts[i * 3], self.verts[i * 3 + 1], self.verts[i * 3 + 2]]
    }

    /// Mutable access to polygon areas and flags at once
    pub fn areas_and_flags_mut(&mut self) -> (&mut [u8], &mut [u16]) {
        (&mut self.areas, &mut self.flags)
    }
}

struct Triangulator<'a> {
    verts: &'a [[i32; 4]],
    indices: Vec<usize>,
}

impl Triangulator<'_> {
    fn next(&self, i: usize) -> usize {
        (i + 1) % self.indices.len()
    }

    fn prev(&self, i: usize) -> usize {
        (i + self.indices.len() - 1) % self.indices.len()
    }

    fn v(&self, i: usize) -> &[i32; 4] {
        &self.verts[self.indices[i]]
    }

    fn in_cone(&self, i: usize, j: usize, loose: bool) -> bool {
        let pi = self.v(i);
        let pj = self.v(j);
        let pi1 = self.v(self.next(i));
        let pin1 = self.v(self.prev(i));

        if left_on(pin1, pi, pi1) {
            if loose {
                return left_on(pi, pj, pin1) && left_on(pj, pi, pi1);
            }
            return left(pi, pj, pin1) && left(pj, pi, pi1);
        }
        !(left_on(pi, pj, pi1) && left_on(pj, pi, pin1))
    }

    fn diagonalie(&self, i: usize, j: usize, loose: bool) -> bool {
        let d0 = self.v(i);
        let d1 = self.v(j);
        for k in 0..self.indices.len() {
            let k1 = self.next(k);
            if k == i || k1 == i || k == j || k1 == j {
                continue;
            }
            let p0 = self.v(k);
            let p1 = self.v(k1);
            if vequal(d0, p0) || vequal(d1, p0) || vequal(d0, p1) || vequal(d1, p1) {
                continue;
            }
            let crosses = if loose {
                intersect_prop(d0, d1, p0, p1)
            } else {
                intersect(d0, d1, p0, p1)
            };
            if crosses {
                return false;
            }
        }
        true
    }

    fn diagonal(&self, i: usize, j: usize, loose: bool) -> bool {
        self.in_cone(i, j, loose) && self.diagonalie(i, j, loose)
    }

    /// Shortest clippable ear, as the index of the vertex before it
    fn shortest_ear(&self, ears: &[bool], loose: bool) -> Option<usize> {
        let mut best: Option<(usize, i32)> = None;
        for i in 0..self.indices.len() {
            let i1 = self.next(i);
            let i2 = self.next(i1);
            let is_ear = if loose { self.diagonal(i, i2, true) } else { ears[i1] };
            if !is_ear {
                continue;
            }
            let p0 = self.v(i);
            let p2 = self.v(i2);
            let dx = p2[0] - p0[0];
            let dz = p2[2] - p0[2];
            let len = dx * dx + dz * dz;
            if best.map_or(true, |(_, l)| len < l) {
                best = Some((i, len));
            }
        }
        best.map(|(i, _)| i)
    }

    /// Ear-clips the polygon. The flag is false when the outline
    /// self-intersects and only part of it could be triangulated.
    fn run(mut self) -> (Vec<[usize; 3]>, bool) {
        let mut tris = Vec::with_capacity(self.indices.len().saturating_sub(2));
        let mut ears: Vec<bool> = (0..self.indices.len())
            .map(|i1| {
                let i = self.prev(i1);
                let i2 = self.next(i1);
                self.diagonal(i, i2, false)
            })
            .collect();

        while self.indices.len() > 3 {
            let Some(mut i) = self
                .shortest_ear(&ears, false)
                .or_else(|| self.shortest_ear(&ears, true))
            else {
                return (tris, false);
            };

            let mut i1 = self.next(i);
            let i2 = self.next(i1);
            tris.push([self.indices[i], self.indices[i1], self.indices[i2]]);

            self.indices.remove(i1);
            ears.remove(i1);
            if i1 >= self.indices.len() {
                i1 = 0;
            }
            i = self.prev(i1);

            ears[i] = self.diagonal(self.prev(i), i1, false);
            ears[i1] = self.diagonal(i, self.next(i1), false);
        }

        tris.push([self.indices[0], self.indices[1], self.indices[2]]);
        (tris, true)
    }
}

fn add_vertex(
    x: u16,
    y: u16,
    z: u16,
    verts: &mut Vec<u16>,
    lookup: &mut HashMap<(u16, u16), Vec<u16>>,
) -> u16 {
    let bucket = lookup.entry((x, z)).or_default();
    if let Some(&i) = bucket
        .iter()
        .find(|&&i| (verts[i as usize * 3 + 1] as i32 - y as i32).abs() <= 2)
    {
        return i;
    }
    let i = (verts.len() / 3) as u16;
    verts.extend_from_slice(&[x, y, z]);
    bucket.push(i);
    i
}

fn uleft(a: [i32; 2], b: [i32; 2], c: [i32; 2]) -> bool {
    (b[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (b[1] - a[1]) < 0
}

/// Length of the shared edge when `pa` and `pb` can merge into a convex
/// polygon, with the shared edge index in each.
fn poly_merge_value(
    pa: &[u16],
    pb: &[u16],
    verts: &[u16],
    nvp: usize,
) -> Option<(i32, usize, usize)> {
    let na = pa.len();
    let nb = pb.len();
    if na + nb - 2 > nvp {
        return None;
    }

    let ordered = |a: u16, b: u16| if a > b { (b, a) } else { (a, b) };
    let (ea, eb) = (0..na).find_map(|i| {
        let ka = ordered(pa[i], pa[(i + 1) % na]);
        (0..nb)
            .find(|&j| ordered(pb[j], pb[(j + 1) % nb]) == ka)
            .map(|j| (i, j))
    })?;

    let xz = |v: u16| [verts[v as usize * 3] as i32, verts[v as usize * 3 + 2] as i32];

    if !uleft(xz(pa[(ea + na - 1) % na]), xz(pa[ea]), xz(pb[(eb + 2) % nb])) {
        return None;
    }
    if !uleft(xz(pb[(eb + nb - 1) % nb]), xz(pb[eb]), xz(pa[(ea + 2) % na])) {
        return None;
    }

    let a = xz(pa[ea]);
    let b = xz(pa[(ea + 1) % na]);
    let dx = a[0] - b[0];
    let dz = a[1] - b[1];
    Some((dx * dx + dz * dz, ea, eb))
}

fn merge_poly_verts(pa: &[u16], pb: &[u16], ea: usize, eb: usize) -> Vec<u16> {
    let na = pa.len();
    let nb = pb.len();
    let mut merged = Vec::with_capacity(na + nb - 2);
    merged.extend((0..na - 1).map(|i| pa[(ea + 1 + i) % na]));
    merged.extend((0..nb - 1).map(|i| pb[(eb + 1 + i) % nb]));
    merged
}

fn merge_polys(polys: &mut Vec<Vec<u16>>, verts: &[u16], nvp: usize) {
    loop {
        let mut best: Option<(i32, usize, usize, usize, usize)> = None;
        for j in 0..polys.len() {
            for k in j + 1..polys.len() {
                if let Some((value, ea, eb)) = poly_merge_value(&polys[j], &polys[k], verts, nvp) {
                    if best.map_or(true, |b| value > b.0) {
                        best = Some((value, j, k, ea, eb));
                    }
                }
            }
        }

        let Some((_, pa, pb, ea, eb)) = best else {
            break;
        };
        polys[pa] = merge_poly_verts(&polys[pa], &polys[pb], ea, eb);
        polys.swap_remove(pb);
    }
}

fn build_mesh_adjacency(mesh: &mut PolyMesh) {
    let nvp = mesh.nvp;
    let mut edges: HashMap<(u16, u16), (usize, usize)> = HashMap::new();

    for i in 0..mesh.npolys {
        let n = mesh.poly_vert_count(i);
        for j in 0..n {
            let v0 = mesh.polys[i * nvp * 2 + j];
            let v1 = mesh.polys[i * nvp * 2 + (j + 1) % n];
            if v0 < v1 {
                edges.insert((v0, v1), (i, j));
            }
        }
    }

    for i in 0..mesh.npolys {
        let n = mesh.poly_vert_count(i);
        for j in 0..n {
            let v0 = mesh.polys[i * nvp * 2 + j];
            let v1 = mesh.polys[i * nvp * 2 + (j + 1) % n];
            if v0 <= v1 {
                continue;
            }
            if let Some(&(p, e)) = edges.get(&(v1, v0)) {
                mesh.polys[i * nvp * 2 + nvp + j] = p as u16;
                mesh.polys[p * nvp * 2 + nvp + e] = i as u16;
            }
        }
    }
}

fn mark_portal_edges(mesh: &mut PolyMesh, w: u16, h: u16) {
    let nvp = mesh.nvp;
    for i in 0..mesh.npolys {
        let n = mesh.poly_vert_count(i);
        for j in 0..n {
            let slot = i * nvp * 2 + nvp + j;
            if mesh.polys[slot] != MESH_NULL_IDX {
                continue;
            }
            let va = mesh.vertex(mesh.polys[i * nvp * 2 + j] as usize);
            let vb = mesh.vertex(mesh.polys[i * nvp * 2 + (j + 1) % n] as usize);

            let dir = if va[0] == 0 && vb[0] == 0 {
                Some(0)
            } else if va[2] == h && vb[2] == h {
                Some(1)
            } else if va[0] == w && vb[0] == w {
                Some(2)
            } else if va[2] == 0 && vb[2] == 0 {
                Some(3)
            } else {
                None
            };
            if let Some(dir) = dir {
                mesh.polys[slot] = PORTAL_FLAG | dir;
            }
        }
    }
}

/// Builds a polygon mesh with at most `nvp` vertices per polygon from `cset`
pub fn build_poly_mesh(ctx: &mut BuildContext, cset: &ContourSet, nvp: usize) -> Result<PolyMesh> {
    ctx.timed(TimerCategory::PolyMesh, |ctx| {
        if nvp < 3 {
            return Err(Error::Recast(format!(
                "polygons need at least 3 vertices, got {}",
                nvp
            )));
        }

        let max_vertices: usize = cset
            .contours
            .iter()
            .filter(|c| c.verts.len() >= 3)
            .map(|c| c.verts.len())
            .sum();
        if max_vertices >= 0xfffe {
            ctx.log_error(format!("too many vertices {}", max_vertices));
            return Err(Error::Recast(format!(
                "contour set has {} vertices, at most {} supported",
                max_vertices, 0xfffd
            )));
        }

        let mut verts: Vec<u16> = Vec::with_capacity(max_vertices * 3);
        let mut lookup: HashMap<(u16, u16), Vec<u16>> = HashMap::new();
        let mut polys: Vec<u16> = Vec::new();
        let mut regs = Vec::new();
        let mut areas = Vec::new();

        for contour in &cset.contours {
            if contour.verts.len() < 3 {
                continue;
            }

            let triangulator = Triangulator {
                verts: &contour.verts,
                indices: (0..contour.verts.len()).collect(),
            };
            let (tris, complete) = triangulator.run();
            if !complete {
                ctx.log_warning(format!("bad triangulation for contour of region {}", contour.reg));
            }

            let indices: Vec<u16> = contour
                .verts
                .iter()
                .map(|v| {
                    add_vertex(
                        v[0].clamp(0, 0xffff) as u16,
                        v[1].clamp(0, 0xffff) as u16,
                        v[2].clamp(0, 0xffff) as u16,
                        &mut verts,
                        &mut lookup,
                    )
                })
                .collect();

            let mut contour_polys: Vec<Vec<u16>> = tris
                .iter()
                .map(|t| vec![indices[t[0]], indices[t[1]], indices[t[2]]])
                .filter(|p| p[0] != p[1] && p[0] != p[2] && p[1] != p[2])
                .collect();
            if contour_polys.is_empty() {
                continue;
            }

            if nvp > 3 {
                merge_polys(&mut contour_polys, &verts, nvp);
            }

            for p in contour_polys {
                polys.extend(p.iter().copied());
                polys.extend(std::iter::repeat(MESH_NULL_IDX).take(nvp * 2 - p.len()));
                regs.push(contour.reg);
                areas.push(contour.area);
            }
        }

        let npolys = regs.len();
        let mut mesh = PolyMesh {
            nverts: verts.len() / 3,
            verts,
            polys,
            regs,
            areas,
            flags: vec![0; npolys],
            npolys,
            nvp,
            bmin: cset.bmin,
            bmax: cset.bmax,
            cs: cset.cs,
            ch: cset.ch,
            border_size: cset.border_size,
            max_edge_error: cset.max_error,
        };

        build_mesh_adjacency(&mut mesh);
        if cset.border_size > 0 {
            mark_portal_edges(&mut mesh, cset.width as u16, cset.height as u16);
        }

        ctx.log_debug(format!(
            "built poly mesh with {} polygons and {} vertices",
            mesh.npolys, mesh.nverts
        ));
        Ok(mesh)
    })
}
