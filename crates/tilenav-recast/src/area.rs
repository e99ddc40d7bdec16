//! Area operations on the compact heightfield: erosion and convex marking

use glam::Vec3;
use tilenav_common::{point_in_poly_2d, Result};

use crate::{BuildContext, CompactHeightfield, TimerCategory, RC_NULL_AREA};

/// Shrinks the walkable area so that no walkable span is closer than
/// `radius` cells to an obstacle or to the edge of the field.
pub fn erode_walkable_area(
    ctx: &mut BuildContext,
    radius: i32,
    chf: &mut CompactHeightfield,
) -> Result<()> {
    ctx.timed(TimerCategory::Erosion, |_| {
        let w = chf.width;
        let h = chf.height;
        let mut dist = vec![0xffu8; chf.span_count()];

        // Spans without four walkable neighbours are boundaries
        for z in 0..h {
            for x in 0..w {
                for i in chf.cell_spans(x, z) {
                    if chf.areas[i] == RC_NULL_AREA {
                        dist[i] = 0;
                        continue;
                    }
                    let walkable_neighbours = (0..4)
                        .filter_map(|dir| chf.neighbour(x, z, i, dir))
                        .filter(|&(_, _, ni)| chf.areas[ni] != RC_NULL_AREA)
                        .count();
                    if walkable_neighbours != 4 {
                        dist[i] = 0;
                    }
                }
            }
        }

        let relax = |dist: &mut [u8], i: usize, ni: usize, cost: u8| {
            let nd = dist[ni].saturating_add(cost);
            if nd < dist[i] {
                dist[i] = nd;
            }
        };

        // Chamfer pass 1: (-1,0), (-1,-1), (0,-1), (1,-1)
        for z in 0..h {
            for x in 0..w {
                for i in chf.cell_spans(x, z) {
                    if let Some((ax, az, ai)) = chf.neighbour(x, z, i, 0) {
                        relax(&mut dist, i, ai, 2);
                        if let Some((_, _, aai)) = chf.neighbour(ax, az, ai, 3) {
                            relax(&mut dist, i, aai, 3);
                        }
                    }
                    if let Some((ax, az, ai)) = chf.neighbour(x, z, i, 3) {
                        relax(&mut dist, i, ai, 2);
                        if let Some((_, _, aai)) = chf.neighbour(ax, az, ai, 2) {
                            relax(&mut dist, i, aai, 3);
                        }
                    }
                }
            }
        }

        // Chamfer pass 2: (1,0), (1,1), (0,1), (-1,1)
        for z in (0..h).rev() {
            for x in (0..w).rev() {
                for i in chf.cell_spans(x, z) {
                    if let Some((ax, az, ai)) = chf.neighbour(x, z, i, 2) {
                        relax(&mut dist, i, ai, 2);
                        if let Some((_, _, aai)) = chf.neighbour(ax, az, ai, 1) {
                            relax(&mut dist, i, aai, 3);
                        }
                    }
                    if let Some((ax, az, ai)) = chf.neighbour(x, z, i, 1) {
                        relax(&mut dist, i, ai, 2);
                        if let Some((_, _, aai)) = chf.neighbour(ax, az, ai, 0) {
                            relax(&mut dist, i, aai, 3);
                        }
                    }
                }
            }
        }

        let threshold = (radius * 2).clamp(0, 0xff) as u8;
        for (area, &d) in chf.areas.iter_mut().zip(&dist) {
            if d < threshold {
                *area = RC_NULL_AREA;
            }
        }

        Ok(())
    })
}

/// Sets `area_id` on every walkable span whose cell centre lies inside the
/// convex polygon `verts` (xz projection) and whose floor lies in `[hmin, hmax]`.
pub fn mark_convex_poly_area(
    ctx: &mut BuildContext,
    verts: &[Vec3],
    hmin: f32,
    hmax: f32,
    area_id: u8,
    chf: &mut CompactHeightfield,
) -> usize {
    ctx.timed(TimerCategory::AreaMarking, |_| {
        if verts.len() < 3 {
            return 0;
        }

        let (mut bmin, mut bmax) = verts
            .iter()
            .fold((verts[0], verts[0]), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
        bmin.y = hmin;
        bmax.y = hmax;

        let minx = ((bmin.x - chf.bmin.x) / chf.cs) as i32;
        let miny = ((bmin.y - chf.bmin.y) / chf.ch) as i32;
        let minz = ((bmin.z - chf.bmin.z) / chf.cs) as i32;
        let maxx = ((bmax.x - chf.bmin.x) / chf.cs) as i32;
        let maxy = ((bmax.y - chf.bmin.y) / chf.ch) as i32;
        let maxz = ((bmax.z - chf.bmin.z) / chf.cs) as i32;

        if maxx < 0 || minx >= chf.width || maxz < 0 || minz >= chf.height {
            return 0;
        }

        let minx = minx.max(0);
        let maxx = maxx.min(chf.width - 1);
        let minz = minz.max(0);
        let maxz = maxz.min(chf.height - 1);

        let mut marked = 0;
        for z in minz..=maxz {
            for x in minx..=maxx {
                for i in chf.cell_spans(x, z) {
                    if chf.areas[i] == RC_NULL_AREA {
                        continue;
                    }
                    let y = chf.spans[i].y as i32;
                    if y < miny || y > maxy {
                        continue;
                    }
                    let centre = Vec3::new(
                        chf.bmin.x + (x as f32 + 0.5) * chf.cs,
                        0.0,
                        chf.bmin.z + (z as f32 + 0.5) * chf.cs,
                    );
                    if point_in_poly_2d(&centre, verts) {
                        chf.areas[i] = area_id;
                        marked += 1;
                    }
                }
            }
        }
        marked
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Heightfield, RC_WALKABLE_AREA};

    fn flat_chf(size: i32) -> CompactHeightfield {
        let mut ctx = BuildContext::new();
        let mut hf = Heightfield::new(
            size,
            size,
            Vec3::ZERO,
            Vec3::new(size as f32, 4.0, size as f32),
            1.0,
            0.5,
        )
        .unwrap();
        for z in 0..size {
            for x in 0..size {
                hf.add_span(x, z, 0, 2, RC_WALKABLE_AREA, 1).unwrap();
            }
        }
        CompactHeightfield::build(&mut ctx, 2, 1, &hf).unwrap()
    }

    #[test]
    fn test_erode_keeps_interior() {
        let mut ctx = BuildContext::new();
        let mut chf = flat_chf(7);
        erode_walkable_area(&mut ctx, 1, &mut chf).unwrap();

        let edge = chf.cell_spans(0, 3).start;
        let centre = chf.cell_spans(3, 3).start;
        assert_eq!(chf.areas[edge], RC_NULL_AREA);
        assert_eq!(chf.areas[centre], RC_WALKABLE_AREA);
        // Radius 1 removes exactly the outer ring
        assert_eq!(chf.walkable_span_count(), 25);
    }

    #[test]
    fn test_erode_zero_radius_is_noop() {
        let mut ctx = BuildContext::new();
        let mut chf = flat_chf(4);
        erode_walkable_area(&mut ctx, 0, &mut chf).unwrap();
        assert_eq!(chf.walkable_span_count(), 16);
    }

    #[test]
    fn test_mark_convex_poly_area_respects_height_band() {
        let mut ctx = BuildContext::new();
        let mut chf = flat_chf(4);
        let square = [
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(2.0, 1.0, 0.0),
            Vec3::new(2.0, 1.0, 2.0),
            Vec3::new(0.0, 1.0, 2.0),
        ];

        // Floors sit at y = 1.0 (2 voxels of 0.5)
        let marked = mark_convex_poly_area(&mut ctx, &square, 0.5, 1.5, 5, &mut chf);
        assert_eq!(marked, 4);
        assert_eq!(chf.areas[chf.cell_spans(1, 1).start], 5);
        assert_eq!(chf.areas[chf.cell_spans(3, 3).start], RC_WALKABLE_AREA);

        let missed = mark_convex_poly_area(&mut ctx, &square, 3.0, 4.0, 7, &mut chf);
        assert_eq!(missed, 0);
    }

    #[test]
    fn test_mark_convex_poly_area_outside_field() {
        let mut ctx = BuildContext::new();
        let mut chf = flat_chf(4);
        let far = [
            Vec3::new(10.0, 1.0, 10.0),
            Vec3::new(12.0, 1.0, 10.0),
            Vec3::new(12.0, 1.0, 12.0),
        ];
        assert_eq!(mark_convex_poly_area(&mut ctx, &far, 0.0, 2.0, 3, &mut chf), 0);
    }
}
