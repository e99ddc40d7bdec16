//! Contour tracing around regions of the compact heightfield
//!
//! Raw contours follow every cell edge of a region. They are simplified to
//! the vertices where the neighbouring region changes, refined until they
//! stay within `max_error` of the raw outline and split where wall edges are
//! longer than `max_edge_len`. Holes are stitched into their outline so every
//! region ends up with a single simple polygon.

use glam::Vec3;
use tilenav_common::Result;

use crate::geometry::{dist_pt_seg_sqr, intersect, left, left_on, vequal};
use crate::{BuildContext, CompactHeightfield, TimerCategory, RC_BORDER_REG, RC_NULL_AREA};

/// Contour vertex flag: vertex lies where the tile border meets a region
pub const RC_BORDER_VERTEX: i32 = 0x10000;
/// Contour vertex flag: edge separates two different areas
pub const RC_AREA_BORDER: i32 = 0x20000;
/// Mask of the neighbour region id stored in a contour vertex
pub const RC_CONTOUR_REG_MASK: i32 = 0xffff;

/// A simplified region outline. Vertices are `[x, y, z, flags]` in cell units.
#[derive(Debug, Clone)]
pub struct Contour {
    /// Simplified vertices
    pub verts: Vec<[i32; 4]>,
    /// Raw vertices, one per traced cell corner
    pub raw_verts: Vec<[i32; 4]>,
    /// Region id of the contour
    pub reg: u16,
    /// Area id of the contour
    pub area: u8,
}

/// All contours of one tile
#[derive(Debug, Clone)]
pub struct ContourSet {
    /// The contours
    pub contours: Vec<Contour>,
    /// Minimum bounds, border excluded
    pub bmin: Vec3,
    /// Maximum bounds, border excluded
    pub bmax: Vec3,
    /// Cell size
    pub cs: f32,
    /// Cell height
    pub ch: f32,
    /// Width in cells, border excluded
    pub width: i32,
    /// Height in cells, border excluded
    pub height: i32,
    /// Border size of the source heightfield
    pub border_size: i32,
    /// Simplification error used
    pub max_error: f32,
}

fn corner_height(chf: &CompactHeightfield, x: i32, z: i32, i: usize, dir: usize) -> (i32, bool) {
    let s = chf.spans[i];
    let mut ch = s.y as i32;
    let dirp = (dir + 1) & 0x3;

    let tag = |si: usize| chf.spans[si].reg as u32 | ((chf.areas[si] as u32) << 16);
    let mut regs = [0u32; 4];
    regs[0] = tag(i);

    if let Some((ax, az, ai)) = chf.neighbour(x, z, i, dir) {
        ch = ch.max(chf.spans[ai].y as i32);
        regs[1] = tag(ai);
        if let Some((_, _, ai2)) = chf.neighbour(ax, az, ai, dirp) {
            ch = ch.max(chf.spans[ai2].y as i32);
            regs[2] = tag(ai2);
        }
    }
    if let Some((ax, az, ai)) = chf.neighbour(x, z, i, dirp) {
        ch = ch.max(chf.spans[ai].y as i32);
        regs[3] = tag(ai);
        if let Some((_, _, ai2)) = chf.neighbour(ax, az, ai, dir) {
            ch = ch.max(chf.spans[ai2].y as i32);
            regs[2] = tag(ai2);
        }
    }

    // A vertex is a border vertex when two same border regions meet two
    // interior regions of the same area
    let border = RC_BORDER_REG as u32;
    let is_border_vertex = (0..4).any(|j| {
        let a = j;
        let b = (j + 1) & 0x3;
        let c = (j + 2) & 0x3;
        let d = (j + 3) & 0x3;
        let two_same_exts = (regs[a] & regs[b] & border) != 0 && regs[a] == regs[b];
        let two_ints = ((regs[c] | regs[d]) & border) == 0;
        let ints_same_area = (regs[c] >> 16) == (regs[d] >> 16);
        let no_zeros = regs.iter().all(|&r| r != 0);
        two_same_exts && two_ints && ints_same_area && no_zeros
    });

    (ch, is_border_vertex)
}

fn walk_contour(
    chf: &CompactHeightfield,
    mut x: i32,
    mut z: i32,
    mut i: usize,
    flags: &mut [u8],
) -> Vec<[i32; 4]> {
    let mut points = Vec::new();

    let mut dir = 0usize;
    while flags[i] & (1 << dir) == 0 {
        dir += 1;
    }
    let start_dir = dir;
    let start_i = i;
    let area = chf.areas[i];

    for _ in 0..40000 {
        if flags[i] & (1 << dir) != 0 {
            let (py, is_border_vertex) = corner_height(chf, x, z, i, dir);
            let (mut px, mut pz) = (x, z);
            match dir {
                0 => pz += 1,
                1 => {
                    px += 1;
                    pz += 1;
                }
                2 => px += 1,
                _ => {}
            }

            let mut r = 0i32;
            let mut is_area_border = false;
            if let Some((_, _, ai)) = chf.neighbour(x, z, i, dir) {
                r = chf.spans[ai].reg as i32;
                is_area_border = area != chf.areas[ai];
            }
            if is_border_vertex {
                r |= RC_BORDER_VERTEX;
            }
            if is_area_border {
                r |= RC_AREA_BORDER;
            }
            points.push([px, py, pz, r]);

            flags[i] &= !(1 << dir);
            dir = (dir + 1) & 0x3;
        } else {
            match chf.neighbour(x, z, i, dir) {
                Some((nx, nz, ni)) => {
                    x = nx;
                    z = nz;
                    i = ni;
                }
                // Only reachable with an inconsistent boundary mask
                None => return points,
            }
            dir = (dir + 3) & 0x3;
        }

        if start_i == i && start_dir == dir {
            break;
        }
    }

    points
}

fn simplify_contour(points: &[[i32; 4]], max_error: f32, max_edge_len: i32) -> Vec<[i32; 4]> {
    let pn = points.len();
    // Simplified vertices store the raw index in slot 3 until the end
    let mut simplified: Vec<[i32; 4]> = Vec::new();

    let has_connections = points
        .iter()
        .any(|p| p[3] & RC_CONTOUR_REG_MASK != 0);

    if has_connections {
        for i in 0..pn {
            let ii = (i + 1) % pn;
            let different_regs =
                (points[i][3] & RC_CONTOUR_REG_MASK) != (points[ii][3] & RC_CONTOUR_REG_MASK);
            let area_borders = (points[i][3] & RC_AREA_BORDER) != (points[ii][3] & RC_AREA_BORDER);
            if different_regs || area_borders {
                simplified.push([points[i][0], points[i][1], points[i][2], i as i32]);
            }
        }
    }

    if simplified.is_empty() {
        // Seed with the lower-left and upper-right vertices
        let mut ll = 0;
        let mut ur = 0;
        for (i, p) in points.iter().enumerate() {
            let l = points[ll];
            let u = points[ur];
            if p[0] < l[0] || (p[0] == l[0] && p[2] < l[2]) {
                ll = i;
            }
            if p[0] > u[0] || (p[0] == u[0] && p[2] > u[2]) {
                ur = i;
            }
        }
        simplified.push([points[ll][0], points[ll][1], points[ll][2], ll as i32]);
        simplified.push([points[ur][0], points[ur][1], points[ur][2], ur as i32]);
    }

    // Refine until every raw vertex is within max_error of the outline
    let max_error_sqr = max_error * max_error;
    let mut i = 0;
    while i < simplified.len() {
        let ii = (i + 1) % simplified.len();
        let [mut ax, _, mut az, ai] = simplified[i];
        let [mut bx, _, mut bz, bi] = simplified[ii];

        // Walk the raw segment in lexicographic order so both sides of a
        // shared edge simplify identically
        let (cinc, mut ci, endi) = if bx > ax || (bx == ax && bz > az) {
            (1, (ai as usize + 1) % pn, bi as usize)
        } else {
            std::mem::swap(&mut ax, &mut bx);
            std::mem::swap(&mut az, &mut bz);
            (pn - 1, (bi as usize + pn - 1) % pn, ai as usize)
        };

        let mut maxd = 0.0f32;
        let mut maxi: Option<usize> = None;
        if points[ci][3] & RC_CONTOUR_REG_MASK == 0 || points[ci][3] & RC_AREA_BORDER != 0 {
            while ci != endi {
                let d = dist_pt_seg_sqr(points[ci][0], points[ci][2], ax, az, bx, bz);
                if d > maxd {
                    maxd = d;
                    maxi = Some(ci);
                }
                ci = (ci + cinc) % pn;
            }
        }

        match maxi {
            Some(m) if maxd > max_error_sqr => {
                simplified.insert(i + 1, [points[m][0], points[m][1], points[m][2], m as i32]);
            }
            _ => i += 1,
        }
    }

    // Split wall edges that are too long
    if max_edge_len > 0 {
        let mut i = 0;
        while i < simplified.len() {
            let ii = (i + 1) % simplified.len();
            let [ax, _, az, ai] = simplified[i];
            let [bx, _, bz, bi] = simplified[ii];
            let ai = ai as usize;
            let bi = bi as usize;

            let ci = (ai + 1) % pn;
            let mut maxi: Option<usize> = None;
            if points[ci][3] & RC_CONTOUR_REG_MASK == 0 {
                let dx = bx - ax;
                let dz = bz - az;
                if dx * dx + dz * dz > max_edge_len * max_edge_len {
                    let n = if bi < ai { bi + pn - ai } else { bi - ai };
                    if n > 1 {
                        maxi = Some(if bx > ax || (bx == ax && bz > az) {
                            (ai + n / 2) % pn
                        } else {
                            (ai + (n + 1) / 2) % pn
                        });
                    }
                }
            }

            match maxi {
                Some(m) => {
                    simplified.insert(i + 1, [points[m][0], points[m][1], points[m][2], m as i32]);
                }
                None => i += 1,
            }
        }
    }

    // Replace raw indices with the neighbour info of the following edge
    for v in simplified.iter_mut() {
        let bi = v[3] as usize;
        let ai = (bi + 1) % pn;
        v[3] = (points[ai][3] & (RC_CONTOUR_REG_MASK | RC_AREA_BORDER))
            | (points[bi][3] & RC_BORDER_VERTEX);
    }

    simplified
}

fn remove_degenerate_segments(verts: &mut Vec<[i32; 4]>) {
    let mut i = 0;
    while i < verts.len() && verts.len() > 1 {
        let ni = (i + 1) % verts.len();
        if vequal(&verts[i], &verts[ni]) {
            verts.remove(ni);
        } else {
            i += 1;
        }
    }
}

fn signed_area_2d(verts: &[[i32; 4]]) -> i32 {
    let n = verts.len();
    let mut area = 0;
    let mut j = n.wrapping_sub(1);
    for (i, vi) in verts.iter().enumerate() {
        let vj = &verts[j];
        area += vi[0] * vj[2] - vj[0] * vi[2];
        j = i;
    }
    (area + 1) / 2
}

fn in_cone(i: usize, verts: &[[i32; 4]], pj: &[i32]) -> bool {
    let n = verts.len();
    let pi = &verts[i];
    let pi1 = &verts[(i + 1) % n];
    let pin1 = &verts[(i + n - 1) % n];

    if left_on(pin1, pi, pi1) {
        return left(pi, pj, pin1) && left(pj, pi, pi1);
    }
    !(left_on(pi, pj, pi1) && left_on(pj, pi, pin1))
}

fn intersect_seg_contour(d0: &[i32], d1: &[i32], skip: Option<usize>, verts: &[[i32; 4]]) -> bool {
    let n = verts.len();
    for k in 0..n {
        let k1 = (k + 1) % n;
        if skip == Some(k) || skip == Some(k1) {
            continue;
        }
        let p0 = &verts[k];
        let p1 = &verts[k1];
        if vequal(d0, p0) || vequal(d1, p0) || vequal(d0, p1) || vequal(d1, p1) {
            continue;
        }
        if intersect(d0, d1, p0, p1) {
            return true;
        }
    }
    false
}

fn leftmost_vertex(verts: &[[i32; 4]]) -> usize {
    verts
        .iter()
        .enumerate()
        .min_by_key(|(_, v)| (v[0], v[2]))
        .map_or(0, |(i, _)| i)
}

fn merge_region_holes(
    ctx: &mut BuildContext,
    outline: &mut Vec<[i32; 4]>,
    mut holes: Vec<Vec<[i32; 4]>>,
) {
    holes.sort_by_key(|h| {
        let v = h[leftmost_vertex(h)];
        (v[0], v[2])
    });

    for hi in 0..holes.len() {
        let hole = &holes[hi];
        let mut index = leftmost_vertex(hole);
        let mut best: Option<usize> = None;

        for _ in 0..hole.len() {
            let corner = hole[index];
            let mut diagonals: Vec<(usize, i32)> = (0..outline.len())
                .filter(|&j| in_cone(j, outline, &corner))
                .map(|j| {
                    let dx = outline[j][0] - corner[0];
                    let dz = outline[j][2] - corner[2];
                    (j, dx * dx + dz * dz)
                })
                .collect();
            diagonals.sort_by_key(|&(_, d)| d);

            best = diagonals.iter().map(|&(j, _)| j).find(|&j| {
                let pt = outline[j];
                !intersect_seg_contour(&pt, &corner, Some(j), outline)
                    && !holes[hi..]
                        .iter()
                        .any(|h| intersect_seg_contour(&pt, &corner, None, h))
            });
            if best.is_some() {
                break;
            }
            index = (index + 1) % hole.len();
        }

        let Some(ia) = best else {
            ctx.log_warning("failed to find a merge point for a contour hole");
            continue;
        };

        let mut merged = Vec::with_capacity(outline.len() + hole.len() + 2);
        for k in 0..=outline.len() {
            merged.push(outline[(ia + k) % outline.len()]);
        }
        for k in 0..=hole.len() {
            merged.push(hole[(index + k) % hole.len()]);
        }
        *outline = merged;
    }
}

/// Traces, simplifies and hole-merges the contours of every region
pub fn build_contours(
    ctx: &mut BuildContext,
    chf: &CompactHeightfield,
    max_error: f32,
    max_edge_len: i32,
) -> Result<ContourSet> {
    ctx.timed(TimerCategory::Contours, |ctx| {
        let w = chf.width;
        let h = chf.height;
        let border_size = chf.border_size;

        let mut cset = ContourSet {
            contours: Vec::new(),
            bmin: chf.bmin,
            bmax: chf.bmax,
            cs: chf.cs,
            ch: chf.ch,
            width: w - border_size * 2,
            height: h - border_size * 2,
            border_size,
            max_error,
        };
        if border_size > 0 {
            let pad = border_size as f32 * chf.cs;
            cset.bmin.x += pad;
            cset.bmin.z += pad;
            cset.bmax.x -= pad;
            cset.bmax.z -= pad;
        }

        // One bit per direction whose neighbour belongs to another region
        let mut flags = vec![0u8; chf.span_count()];
        for z in 0..h {
            for x in 0..w {
                for i in chf.cell_spans(x, z) {
                    let reg = chf.spans[i].reg;
                    if reg == 0 || reg & RC_BORDER_REG != 0 {
                        continue;
                    }
                    let mut same = 0u8;
                    for dir in 0..4 {
                        if let Some((_, _, ai)) = chf.neighbour(x, z, i, dir) {
                            if chf.spans[ai].reg == reg {
                                same |= 1 << dir;
                            }
                        }
                    }
                    flags[i] = same ^ 0xf;
                }
            }
        }

        for z in 0..h {
            for x in 0..w {
                for i in chf.cell_spans(x, z) {
                    if flags[i] == 0 || flags[i] == 0xf {
                        flags[i] = 0;
                        continue;
                    }
                    let reg = chf.spans[i].reg;
                    if reg == 0 || reg & RC_BORDER_REG != 0 || chf.areas[i] == RC_NULL_AREA {
                        continue;
                    }

                    let mut raw = walk_contour(chf, x, z, i, &mut flags);
                    if raw.is_empty() {
                        continue;
                    }
                    let mut verts = simplify_contour(&raw, max_error, max_edge_len);
                    remove_degenerate_segments(&mut verts);
                    if verts.len() < 3 {
                        continue;
                    }

                    if border_size > 0 {
                        for v in verts.iter_mut().chain(raw.iter_mut()) {
                            v[0] -= border_size;
                            v[2] -= border_size;
                        }
                    }

                    cset.contours.push(Contour {
                        verts,
                        raw_verts: raw,
                        reg,
                        area: chf.areas[i],
                    });
                }
            }
        }

        merge_holes(ctx, &mut cset);

        ctx.log_debug(format!("built {} contours", cset.contours.len()));
        Ok(cset)
    })
}

fn merge_holes(ctx: &mut BuildContext, cset: &mut ContourSet) {
    let holes: Vec<usize> = cset
        .contours
        .iter()
        .enumerate()
        .filter(|(_, c)| signed_area_2d(&c.verts) < 0)
        .map(|(i, _)| i)
        .collect();
    if holes.is_empty() {
        return;
    }

    let mut by_region: std::collections::BTreeMap<u16, (Option<usize>, Vec<usize>)> =
        Default::default();
    for (i, c) in cset.contours.iter().enumerate() {
        let entry = by_region.entry(c.reg).or_default();
        if holes.contains(&i) {
            entry.1.push(i);
        } else if entry.0.is_none() {
            entry.0 = Some(i);
        } else {
            ctx.log_warning(format!("region {} has multiple outlines", c.reg));
        }
    }

    for (reg, (outline, hole_ids)) in by_region {
        if hole_ids.is_empty() {
            continue;
        }
        let Some(outline) = outline else {
            ctx.log_warning(format!("region {} has holes but no outline", reg));
            continue;
        };
        let hole_verts: Vec<Vec<[i32; 4]>> = hole_ids
            .iter()
            .map(|&h| cset.contours[h].verts.clone())
            .collect();
        let mut merged = std::mem::take(&mut cset.contours[outline].verts);
        merge_region_holes(ctx, &mut merged, hole_verts);
        cset.contours[outline].verts = merged;
    }

    let mut index = 0;
    cset.contours.retain(|_| {
        let keep = !holes.contains(&index);
        index += 1;
        keep
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_regions_monotone, Heightfield, RC_WALKABLE_AREA};

    fn region_chf(w: i32, h: i32, hole: Option<(i32, i32, i32, i32)>) -> CompactHeightfield {
        let mut ctx = BuildContext::new();
        let mut hf = Heightfield::new(
            w,
            h,
            Vec3::ZERO,
            Vec3::new(w as f32, 4.0, h as f32),
            1.0,
            0.5,
        )
        .unwrap();
        for z in 0..h {
            for x in 0..w {
                let in_hole = hole.is_some_and(|(x0, z0, x1, z1)| {
                    x >= x0 && x < x1 && z >= z0 && z < z1
                });
                if !in_hole {
                    hf.add_span(x, z, 0, 2, RC_WALKABLE_AREA, 1).unwrap();
                }
            }
        }
        let mut chf = CompactHeightfield::build(&mut ctx, 2, 1, &hf).unwrap();
        build_regions_monotone(&mut ctx, &mut chf, 0, 1, 0).unwrap();
        chf
    }

    #[test]
    fn test_square_region_gives_four_corners() {
        let mut ctx = BuildContext::new();
        let chf = region_chf(6, 6, None);
        let cset = build_contours(&mut ctx, &chf, 1.3, 0).unwrap();

        assert_eq!(cset.contours.len(), 1);
        let contour = &cset.contours[0];
        assert_eq!(contour.verts.len(), 4);
        assert_eq!(contour.raw_verts.len(), 24);
        for v in &contour.verts {
            assert!(v[0] == 0 || v[0] == 6);
            assert!(v[2] == 0 || v[2] == 6);
        }
    }

    #[test]
    fn test_long_edges_are_split() {
        let mut ctx = BuildContext::new();
        let chf = region_chf(12, 4, None);
        let cset = build_contours(&mut ctx, &chf, 1.3, 4).unwrap();
        let contour = &cset.contours[0];
        assert!(contour.verts.len() > 4);
        for (i, a) in contour.verts.iter().enumerate() {
            let b = contour.verts[(i + 1) % contour.verts.len()];
            let len = (b[0] - a[0]).pow(2) + (b[2] - a[2]).pow(2);
            assert!(len <= 16, "edge {:?} -> {:?}", a, b);
        }
    }

    #[test]
    fn test_simplify_keeps_region_changes() {
        // Raw square where the second half borders region 7
        let points: Vec<[i32; 4]> = vec![
            [0, 0, 0, 0],
            [0, 0, 2, 0],
            [0, 0, 4, 7],
            [2, 0, 4, 7],
            [4, 0, 4, 0],
            [4, 0, 2, 0],
            [4, 0, 0, 0],
            [2, 0, 0, 0],
        ];
        let simplified = simplify_contour(&points, 0.5, 0);
        assert!(simplified.iter().any(|v| v[3] & RC_CONTOUR_REG_MASK == 7));
        assert!(simplified.len() >= 3);
    }

    #[test]
    fn test_hole_is_bridged_to_outline() {
        let mut ctx = BuildContext::new();
        let mut outline = vec![[0, 0, 0, 0], [0, 0, 10, 0], [10, 0, 10, 0], [10, 0, 0, 0]];
        let hole = vec![[4, 0, 4, 0], [6, 0, 4, 0], [6, 0, 6, 0], [4, 0, 6, 0]];
        assert!(signed_area_2d(&outline) > 0);
        assert!(signed_area_2d(&hole) < 0);

        merge_region_holes(&mut ctx, &mut outline, vec![hole]);

        assert_eq!(outline.len(), 10);
        assert_eq!(signed_area_2d(&outline), 96);
        assert!(ctx.logs_by_level(crate::LogLevel::Warning).is_empty());
    }

    #[test]
    fn test_contours_wind_outward() {
        let mut ctx = BuildContext::new();
        let chf = region_chf(10, 10, Some((4, 4, 6, 6)));
        let cset = build_contours(&mut ctx, &chf, 1.3, 0).unwrap();

        for contour in &cset.contours {
            assert!(signed_area_2d(&contour.verts) > 0);
        }
    }
}
