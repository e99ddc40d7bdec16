//! Designer area overlays stamped onto compact heightfields

use glam::Vec3;
use tilenav_common::{Error, Result};
use tilenav_recast::{mark_convex_poly_area, BuildContext, CompactHeightfield};

/// Triangles tagging the walkable surface under them with one area code.
///
/// Indices refer to the overlay's own vertices.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct AreaOverlay {
    /// `[x, y, z]` per vertex
    pub vertices: Vec<f32>,
    /// 3 indices per triangle
    pub indices: Vec<i32>,
    /// Area code applied to covered cells
    pub area: u8,
}

impl AreaOverlay {
    /// Creates an overlay, rejecting indices outside the vertex buffer
    pub fn new(vertices: Vec<f32>, indices: Vec<i32>, area: u8) -> Result<Self> {
        let overlay = Self {
            vertices,
            indices,
            area,
        };
        overlay.validate()?;
        Ok(overlay)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Overlays without vertices or triangles are skipped by every stage
    pub fn is_empty(&self) -> bool {
        self.vertex_count() == 0 || self.triangle_count() == 0
    }

    pub fn validate(&self) -> Result<()> {
        let nverts = self.vertex_count() as i32;
        if let Some(bad) = self.indices.iter().find(|&&i| i < 0 || i >= nverts) {
            return Err(Error::InvalidMesh(format!(
                "overlay index {} outside {} vertices",
                bad, nverts
            )));
        }
        Ok(())
    }

    fn triangle(&self, t: usize) -> Option<[Vec3; 3]> {
        let tri = self.indices.get(t * 3..t * 3 + 3)?;
        let mut out = [Vec3::ZERO; 3];
        for (dst, &i) in out.iter_mut().zip(tri) {
            let base = usize::try_from(i).ok()? * 3;
            let v = self.vertices.get(base..base + 3)?;
            *dst = Vec3::new(v[0], v[1], v[2]);
        }
        Some(out)
    }
}

/// Builds overlays from position-aligned arrays: vertex buffers with their
/// vertex counts, index buffers with their triangle counts, and area codes.
pub fn overlays_from_arrays(
    vertices: &[&[f32]],
    vert_counts: &[usize],
    indices: &[&[i32]],
    tri_counts: &[usize],
    areas: &[u8],
) -> Result<Vec<AreaOverlay>> {
    let count = areas.len();
    if vertices.len() != count
        || vert_counts.len() != count
        || indices.len() != count
        || tri_counts.len() != count
    {
        return Err(Error::InvalidMesh(
            "overlay arrays must all have one entry per overlay".to_string(),
        ));
    }

    (0..count)
        .map(|i| {
            let nv = vert_counts[i] * 3;
            let nt = tri_counts[i] * 3;
            let verts = vertices[i].get(..nv).ok_or_else(|| {
                Error::InvalidMesh(format!(
                    "overlay {} has fewer than {} vertices",
                    i, vert_counts[i]
                ))
            })?;
            let tris = indices[i].get(..nt).ok_or_else(|| {
                Error::InvalidMesh(format!(
                    "overlay {} has fewer than {} triangles",
                    i, tri_counts[i]
                ))
            })?;
            AreaOverlay::new(verts.to_vec(), tris.to_vec(), areas[i])
        })
        .collect()
}

/// Applies overlays to a compact heightfield.
///
/// Each triangle marks the spans under its footprint whose floor lies within
/// the triangle's own height range, widened by [`AreaMarker::tolerance`].
#[derive(Debug, Clone, Copy)]
pub struct AreaMarker<'a> {
    overlays: &'a [AreaOverlay],
}

impl<'a> AreaMarker<'a> {
    pub fn new(overlays: &'a [AreaOverlay]) -> Self {
        Self { overlays }
    }

    /// Vertical slack for a field spanning `min_y..max_y` with cell height `ch`
    pub fn tolerance(min_y: f32, max_y: f32, ch: f32) -> f32 {
        let tol = (ch * 10.0)
            .max((max_y - min_y) * 0.05)
            .max(min_y.abs() * 0.001);
        if min_y > 100.0 {
            tol.max(1.0)
        } else {
            tol
        }
    }

    /// Marks every overlay triangle and returns the number of spans tagged
    pub fn mark(&self, ctx: &mut BuildContext, chf: &mut CompactHeightfield) -> usize {
        let tol = Self::tolerance(chf.bmin.y, chf.bmax.y, chf.ch);
        let mut marked = 0;

        for (index, overlay) in self.overlays.iter().enumerate() {
            if overlay.is_empty() {
                continue;
            }

            let mut overlay_marked = 0;
            for t in 0..overlay.triangle_count() {
                let Some(tri) = overlay.triangle(t) else {
                    ctx.log_warning(format!("overlay {} triangle {} is out of range", index, t));
                    continue;
                };
                let hmin = tri.iter().map(|v| v.y).fold(f32::MAX, f32::min) - tol;
                let hmax = tri.iter().map(|v| v.y).fold(f32::MIN, f32::max) + tol;
                overlay_marked += mark_convex_poly_area(ctx, &tri, hmin, hmax, overlay.area, chf);
            }

            ctx.log_debug(format!(
                "overlay {} (area {}) marked {} spans",
                index, overlay.area, overlay_marked
            ));
            marked += overlay_marked;
        }

        marked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilenav_recast::{Heightfield, RC_WALKABLE_AREA};

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

    fn overlay(y: f32, area: u8) -> AreaOverlay {
        AreaOverlay::new(
            vec![0.0, y, 0.0, 4.0, y, 0.0, 4.0, y, 4.0, 0.0, y, 4.0],
            vec![0, 1, 2, 0, 2, 3],
            area,
        )
        .unwrap()
    }

    #[test]
    fn test_tolerance_scales_with_field() {
        assert!((AreaMarker::tolerance(0.0, 1.0, 0.01) - 0.1).abs() < 1e-6);
        assert!((AreaMarker::tolerance(0.0, 40.0, 0.01) - 2.0).abs() < 1e-6);
        // deep below the origin the absolute height dominates
        assert!((AreaMarker::tolerance(-5000.0, -4999.0, 0.01) - 5.0).abs() < 1e-4);
        // high fields never go below one unit
        assert_eq!(AreaMarker::tolerance(150.0, 151.0, 0.01), 1.0);
        assert!((AreaMarker::tolerance(50.0, 51.0, 0.01) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_overlay_marks_covered_cells() {
        let mut ctx = BuildContext::new();
        let mut chf = flat_chf(8);
        let overlays = [overlay(1.0, 5)];
        let marked = AreaMarker::new(&overlays).mark(&mut ctx, &mut chf);
        assert!(marked > 0);

        for (x, z) in [(2, 0), (3, 1), (0, 3), (1, 2)] {
            let i = chf.cell_spans(x, z).start;
            assert_eq!(chf.areas[i], 5, "cell ({}, {})", x, z);
        }
        for (x, z) in [(6, 6), (5, 1), (4, 0), (0, 4)] {
            let i = chf.cell_spans(x, z).start;
            assert_eq!(chf.areas[i], RC_WALKABLE_AREA, "cell ({}, {})", x, z);
        }
        let tagged = chf.areas.iter().filter(|&&a| a == 5).count();
        assert!((12..=16).contains(&tagged));
    }

    #[test]
    fn test_overlay_outside_height_band_is_ignored() {
        let mut ctx = BuildContext::new();
        let mut chf = flat_chf(8);
        let overlays = [overlay(40.0, 5)];
        assert_eq!(AreaMarker::new(&overlays).mark(&mut ctx, &mut chf), 0);
    }

    #[test]
    fn test_overlay_outside_field_is_ignored() {
        let mut ctx = BuildContext::new();
        let mut chf = flat_chf(8);
        let mut far = overlay(1.0, 5);
        for v in far.vertices.chunks_exact_mut(3) {
            v[0] += 100.0;
        }
        let overlays = [far];
        assert_eq!(AreaMarker::new(&overlays).mark(&mut ctx, &mut chf), 0);
        assert!(chf.areas.iter().all(|&a| a == RC_WALKABLE_AREA));
    }

    #[test]
    fn test_empty_overlay_is_skipped() {
        let mut ctx = BuildContext::new();
        let mut chf = flat_chf(4);
        let overlays = [AreaOverlay::default(), overlay(1.0, 3)];
        assert!(overlays[0].is_empty());
        assert!(AreaMarker::new(&overlays).mark(&mut ctx, &mut chf) > 0);
    }

    #[test]
    fn test_overlays_from_arrays() {
        let verts = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 99.0];
        let tris = [0, 1, 2];
        let overlays =
            overlays_from_arrays(&[&verts[..]], &[3], &[&tris[..]], &[1], &[7]).unwrap();
        assert_eq!(overlays.len(), 1);
        assert_eq!(overlays[0].vertex_count(), 3);
        assert_eq!(overlays[0].area, 7);

        assert!(overlays_from_arrays(&[&verts[..]], &[3], &[&tris[..]], &[2], &[7]).is_err());
        assert!(overlays_from_arrays(&[&verts[..]], &[3], &[], &[1], &[7]).is_err());
        assert!(AreaOverlay::new(verts[..9].to_vec(), vec![0, 1, 3], 1).is_err());
    }
}
