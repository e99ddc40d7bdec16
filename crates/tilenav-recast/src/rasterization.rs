//! Triangle classification and conservative voxelization into a heightfield

use glam::Vec3;
use tilenav_common::{overlap_bounds, triangle_normal, Error, Result};

use crate::heightfield::SPAN_MAX_HEIGHT;
use crate::{BuildContext, Heightfield, TimerCategory, RC_WALKABLE_AREA};

#[inline]
fn vertex(verts: &[f32], index: i32) -> Vec3 {
    let i = index as usize * 3;
    Vec3::new(verts[i], verts[i + 1], verts[i + 2])
}

fn check_buffers(verts: &[f32], tris: &[i32], areas_len: usize) -> Result<usize> {
    if verts.len() % 3 != 0 || tris.len() % 3 != 0 {
        return Err(Error::Recast(
            "vertex and index buffers must hold whole triples".to_string(),
        ));
    }
    let ntris = tris.len() / 3;
    if areas_len != ntris {
        return Err(Error::Recast(format!(
            "{} area ids for {} triangles",
            areas_len, ntris
        )));
    }
    let nverts = (verts.len() / 3) as i32;
    if tris.iter().any(|&i| i < 0 || i >= nverts) {
        return Err(Error::Recast("triangle index out of range".to_string()));
    }
    Ok(ntris)
}

/// Sets `areas[i]` to the walkable area for every triangle whose slope is
/// below `walkable_slope_angle` degrees. Other entries are left untouched.
pub fn mark_walkable_triangles(
    walkable_slope_angle: f32,
    verts: &[f32],
    tris: &[i32],
    areas: &mut [u8],
) -> Result<()> {
    check_buffers(verts, tris, areas.len())?;
    let walkable_thr = walkable_slope_angle.to_radians().cos();

    for (tri, area) in tris.chunks_exact(3).zip(areas.iter_mut()) {
        let normal = triangle_normal(
            &vertex(verts, tri[0]),
            &vertex(verts, tri[1]),
            &vertex(verts, tri[2]),
        );
        if normal.y > walkable_thr {
            *area = RC_WALKABLE_AREA;
        }
    }
    Ok(())
}

/// Splits a convex polygon by the plane `v[axis] == offset`.
///
/// Returns the part below the plane and the part above it.
fn divide_poly(input: &[Vec3], offset: f32, axis: usize) -> (Vec<Vec3>, Vec<Vec3>) {
    let mut below = Vec::with_capacity(input.len() + 2);
    let mut above = Vec::with_capacity(input.len() + 2);
    let d: Vec<f32> = input.iter().map(|v| offset - v[axis]).collect();

    let n = input.len();
    if n == 0 {
        return (below, above);
    }
    let mut j = n - 1;
    for i in 0..n {
        let ina = d[j] >= 0.0;
        let inb = d[i] >= 0.0;
        if ina != inb {
            let s = d[j] / (d[j] - d[i]);
            let p = input[j] + (input[i] - input[j]) * s;
            below.push(p);
            above.push(p);
            if d[i] > 0.0 {
                below.push(input[i]);
            } else if d[i] < 0.0 {
                above.push(input[i]);
            }
        } else if d[i] >= 0.0 {
            below.push(input[i]);
            if d[i] != 0.0 {
                j = i;
                continue;
            }
            above.push(input[i]);
        } else {
            above.push(input[i]);
        }
        j = i;
    }

    (below, above)
}

fn rasterize_tri(
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
    area: u8,
    hf: &mut Heightfield,
    flag_merge_threshold: i32,
) -> Result<()> {
    let tmin = v0.min(v1).min(v2);
    let tmax = v0.max(v1).max(v2);
    if !overlap_bounds(&hf.bmin, &hf.bmax, &tmin, &tmax) {
        return Ok(());
    }

    let w = hf.width;
    let h = hf.height;
    let by = hf.bmax.y - hf.bmin.y;
    let ics = 1.0 / hf.cs;
    let ich = 1.0 / hf.ch;

    let z0 = (((tmin.z - hf.bmin.z) * ics) as i32).clamp(-1, h - 1);
    let z1 = (((tmax.z - hf.bmin.z) * ics) as i32).clamp(0, h - 1);

    let mut rest = vec![v0, v1, v2];
    for z in z0..=z1 {
        if rest.len() < 3 {
            break;
        }
        let cz = hf.bmin.z + z as f32 * hf.cs;
        let (row, remaining) = divide_poly(&rest, cz + hf.cs, 2);
        rest = remaining;
        if row.len() < 3 || z < 0 {
            continue;
        }

        let (min_x, max_x) = row
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(v.x), hi.max(v.x)));
        let x0 = ((min_x - hf.bmin.x) * ics) as i32;
        let x1 = ((max_x - hf.bmin.x) * ics) as i32;
        if x1 < 0 || x0 >= w {
            continue;
        }
        let x0 = x0.clamp(-1, w - 1);
        let x1 = x1.clamp(0, w - 1);

        let mut row_rest = row;
        for x in x0..=x1 {
            if row_rest.len() < 3 {
                break;
            }
            let cx = hf.bmin.x + x as f32 * hf.cs;
            let (cell, remaining) = divide_poly(&row_rest, cx + hf.cs, 0);
            row_rest = remaining;
            if cell.len() < 3 || x < 0 {
                continue;
            }

            let (mut smin, mut smax) = cell
                .iter()
                .fold((f32::MAX, f32::MIN), |(lo, hi), v| (lo.min(v.y), hi.max(v.y)));
            smin -= hf.bmin.y;
            smax -= hf.bmin.y;
            if smax < 0.0 || smin > by {
                continue;
            }
            smin = smin.max(0.0);
            smax = smax.min(by);

            let ismin = ((smin * ich).floor() as i32).clamp(0, SPAN_MAX_HEIGHT);
            let ismax = ((smax * ich).ceil() as i32).clamp(ismin + 1, SPAN_MAX_HEIGHT);

            hf.add_span(x, z, ismin as u16, ismax as u16, area, flag_merge_threshold)?;
        }
    }

    Ok(())
}

/// Voxelizes indexed triangles into the heightfield, tagging each span with
/// the area of the triangle that produced it.
pub fn rasterize_triangles(
    ctx: &mut BuildContext,
    verts: &[f32],
    tris: &[i32],
    areas: &[u8],
    hf: &mut Heightfield,
    flag_merge_threshold: i32,
) -> Result<()> {
    check_buffers(verts, tris, areas.len())?;

    ctx.timed(TimerCategory::Rasterization, |ctx| {
        for (tri, &area) in tris.chunks_exact(3).zip(areas) {
            let result = rasterize_tri(
                vertex(verts, tri[0]),
                vertex(verts, tri[1]),
                vertex(verts, tri[2]),
                area,
                hf,
                flag_merge_threshold,
            );
            if let Err(e) = result {
                ctx.log_error(format!("rasterize_triangles: {}", e));
                return Err(e);
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RC_NULL_AREA;

    fn flat_quad(size: f32, y: f32) -> (Vec<f32>, Vec<i32>) {
        (
            vec![0.0, y, 0.0, size, y, 0.0, size, y, size, 0.0, y, size],
            vec![0, 2, 1, 0, 3, 2],
        )
    }

    #[test]
    fn test_mark_walkable_triangles_by_slope() {
        let verts = vec![
            0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, // flat
            0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, // vertical wall
        ];
        let tris = vec![0, 1, 2, 3, 4, 5];
        let mut areas = vec![RC_NULL_AREA; 2];
        mark_walkable_triangles(45.0, &verts, &tris, &mut areas).unwrap();
        assert_eq!(areas, vec![RC_WALKABLE_AREA, RC_NULL_AREA]);
    }

    #[test]
    fn test_mark_walkable_rejects_mismatched_areas() {
        let (verts, tris) = flat_quad(1.0, 0.0);
        let mut areas = vec![0u8; 1];
        assert!(mark_walkable_triangles(45.0, &verts, &tris, &mut areas).is_err());
    }

    #[test]
    fn test_divide_poly_splits_square() {
        let square = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 2.0),
            Vec3::new(0.0, 0.0, 2.0),
        ];
        let (below, above) = divide_poly(&square, 1.0, 0);
        assert_eq!(below.len(), 4);
        assert_eq!(above.len(), 4);
        assert!(below.iter().all(|v| v.x <= 1.0));
        assert!(above.iter().all(|v| v.x >= 1.0));
    }

    #[test]
    fn test_divide_poly_empty_input() {
        let (below, above) = divide_poly(&[], 1.0, 2);
        assert!(below.is_empty());
        assert!(above.is_empty());
    }

    #[test]
    fn test_rasterize_triangle_ending_inside_heightfield() {
        let mut ctx = BuildContext::new();
        let mut hf = Heightfield::new(
            20,
            20,
            Vec3::new(0.0, -1.0, 0.0),
            Vec3::new(6.0, 1.0, 6.0),
            0.3,
            0.2,
        )
        .unwrap();
        // the apex sits on a row boundary, so the last clipped row is empty
        let verts = vec![0.1, 0.0, 0.1, 0.1, 0.0, 4.5, 2.0, 0.0, 0.1];
        rasterize_triangles(&mut ctx, &verts, &[0, 1, 2], &[RC_WALKABLE_AREA], &mut hf, 1)
            .unwrap();

        assert!(!hf.spans(0, 0).is_empty());
        assert!(!hf.spans(0, 14).is_empty());
        for z in 15..20 {
            for x in 0..20 {
                assert!(hf.spans(x, z).is_empty(), "cell ({}, {})", x, z);
            }
        }
    }

    #[test]
    fn test_rasterize_flat_quad_covers_every_cell() {
        let mut ctx = BuildContext::new();
        let mut hf = Heightfield::new(
            4,
            4,
            Vec3::new(0.0, -1.0, 0.0),
            Vec3::new(4.0, 1.0, 4.0),
            1.0,
            0.5,
        )
        .unwrap();
        let (verts, tris) = flat_quad(4.0, 0.0);
        let areas = vec![RC_WALKABLE_AREA; 2];

        rasterize_triangles(&mut ctx, &verts, &tris, &areas, &mut hf, 1).unwrap();

        for z in 0..4 {
            for x in 0..4 {
                let spans = hf.spans(x, z);
                assert_eq!(spans.len(), 1, "cell ({}, {})", x, z);
                assert_eq!((spans[0].smin, spans[0].smax), (2, 3));
                assert_eq!(spans[0].area, RC_WALKABLE_AREA);
            }
        }
    }

    #[test]
    fn test_rasterize_ignores_geometry_outside_bounds() {
        let mut ctx = BuildContext::new();
        let mut hf =
            Heightfield::new(2, 2, Vec3::ZERO, Vec3::new(2.0, 2.0, 2.0), 1.0, 0.5).unwrap();
        let verts = vec![10.0, 0.5, 10.0, 12.0, 0.5, 10.0, 10.0, 0.5, 12.0];
        rasterize_triangles(&mut ctx, &verts, &[0, 2, 1], &[RC_WALKABLE_AREA], &mut hf, 1)
            .unwrap();
        assert_eq!(hf.span_count(), 0);
    }
}
