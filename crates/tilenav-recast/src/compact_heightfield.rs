//! Compact heightfield: the open space above walkable spans, with
//! neighbour links between spans that an agent can step across.

use glam::Vec3;
use tilenav_common::{Error, Result};

use crate::{dir_offset_x, dir_offset_y, BuildContext, Heightfield, TimerCategory, RC_NULL_AREA};

/// Neighbour slot value for "no connection in this direction"
pub const NOT_CONNECTED: u8 = 0x3f;

/// Largest clearance a compact span can record, in voxels
pub const MAX_SPAN_CLEARANCE: i32 = 0xff;

/// Neighbours are stored as a layer index below this value
const MAX_LAYERS: usize = NOT_CONNECTED as usize - 1;

/// A column of the compact heightfield
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactCell {
    /// Index of the first span of the column in `spans`
    pub index: u32,
    /// Number of spans in the column
    pub count: u32,
}

/// Open space above a walkable surface
#[derive(Debug, Clone, Copy)]
pub struct CompactSpan {
    /// Floor height, in voxels
    pub y: u16,
    /// Region id, 0 when unassigned
    pub reg: u16,
    /// Free height above the floor, in voxels
    pub h: u8,
    /// Per-direction index of the connected span within the neighbour column
    pub con: [u8; 4],
}

impl CompactSpan {
    /// Connected layer in `dir`, if any
    #[inline]
    pub fn con(&self, dir: usize) -> Option<usize> {
        let c = self.con[dir];
        (c != NOT_CONNECTED).then_some(c as usize)
    }
}

/// Compact heightfield built from a solid [`Heightfield`]
#[derive(Debug, Clone)]
pub struct CompactHeightfield {
    /// Width along x, in cells
    pub width: i32,
    /// Height along z, in cells
    pub height: i32,
    /// Walkable height used during the build, in voxels
    pub walkable_height: i32,
    /// Walkable climb used during the build, in voxels
    pub walkable_climb: i32,
    /// Border size used during region building
    pub border_size: i32,
    /// Largest value in `dist`
    pub max_distance: u16,
    /// Number of regions after partitioning (exclusive upper bound of region ids)
    pub max_regions: u16,
    /// Minimum bounds in world space
    pub bmin: Vec3,
    /// Maximum bounds in world space
    pub bmax: Vec3,
    /// Cell size
    pub cs: f32,
    /// Cell height
    pub ch: f32,
    /// One entry per column
    pub cells: Vec<CompactCell>,
    /// All spans, grouped by column
    pub spans: Vec<CompactSpan>,
    /// Area id per span
    pub areas: Vec<u8>,
    /// Distance to the nearest region boundary per span, filled by the distance field
    pub dist: Vec<u16>,
}

impl CompactHeightfield {
    /// Builds the compact form of every walkable span in `hf`
    pub fn build(
        ctx: &mut BuildContext,
        walkable_height: i32,
        walkable_climb: i32,
        hf: &Heightfield,
    ) -> Result<Self> {
        ctx.timed(TimerCategory::CompactHeightfield, |ctx| {
            Self::build_inner(ctx, walkable_height, walkable_climb, hf)
        })
    }

    fn build_inner(
        ctx: &mut BuildContext,
        walkable_height: i32,
        walkable_climb: i32,
        hf: &Heightfield,
    ) -> Result<Self> {
        const MAX_HEIGHT: i32 = 0xffff;

        let w = hf.width;
        let h = hf.height;
        let span_count = hf.walkable_span_count();

        let mut spans = Vec::new();
        let mut areas = Vec::new();
        spans.try_reserve_exact(span_count).map_err(|e| {
            Error::Recast(format!("out of memory allocating {} spans: {}", span_count, e))
        })?;
        areas.try_reserve_exact(span_count).map_err(|e| {
            Error::Recast(format!("out of memory allocating {} areas: {}", span_count, e))
        })?;

        let mut cells = vec![CompactCell::default(); (w * h) as usize];
        for z in 0..h {
            for x in 0..w {
                let column = hf.spans(x, z);
                let cell = &mut cells[(x + z * w) as usize];
                cell.index = spans.len() as u32;

                for (si, s) in column.iter().enumerate() {
                    if s.area == RC_NULL_AREA {
                        continue;
                    }
                    let bot = s.smax as i32;
                    let top = column.get(si + 1).map_or(MAX_HEIGHT, |n| n.smin as i32);
                    spans.push(CompactSpan {
                        y: bot.clamp(0, 0xffff) as u16,
                        reg: 0,
                        h: (top - bot).clamp(0, MAX_SPAN_CLEARANCE) as u8,
                        con: [NOT_CONNECTED; 4],
                    });
                    areas.push(s.area);
                    cell.count += 1;
                }
            }
        }

        let mut chf = Self {
            width: w,
            height: h,
            walkable_height,
            walkable_climb,
            border_size: 0,
            max_distance: 0,
            max_regions: 0,
            bmin: hf.bmin,
            bmax: Vec3::new(hf.bmax.x, hf.bmax.y + walkable_height as f32 * hf.ch, hf.bmax.z),
            cs: hf.cs,
            ch: hf.ch,
            cells,
            spans,
            areas,
            dist: Vec::new(),
        };

        let mut too_many_layers = 0;
        for z in 0..h {
            for x in 0..w {
                let cell = chf.cells[(x + z * w) as usize];
                for i in cell.index as usize..(cell.index + cell.count) as usize {
                    for dir in 0..4 {
                        let nx = x + dir_offset_x(dir);
                        let nz = z + dir_offset_y(dir);
                        if nx < 0 || nz < 0 || nx >= w || nz >= h {
                            continue;
                        }

                        let s = chf.spans[i];
                        let ncell = chf.cells[(nx + nz * w) as usize];
                        for k in ncell.index as usize..(ncell.index + ncell.count) as usize {
                            let ns = chf.spans[k];
                            let bot = s.y.max(ns.y) as i32;
                            let top = (s.y as i32 + s.h as i32).min(ns.y as i32 + ns.h as i32);

                            if top - bot >= walkable_height
                                && (ns.y as i32 - s.y as i32).abs() <= walkable_climb
                            {
                                let layer = k - ncell.index as usize;
                                if layer >= MAX_LAYERS {
                                    too_many_layers = too_many_layers.max(layer);
                                    continue;
                                }
                                chf.spans[i].con[dir] = layer as u8;
                                break;
                            }
                        }
                    }
                }
            }
        }

        if too_many_layers > 0 {
            ctx.log_warning(format!(
                "compact heightfield has {} layers, only {} are linked",
                too_many_layers, MAX_LAYERS
            ));
        }

        Ok(chf)
    }

    /// Number of spans
    pub fn span_count(&self) -> usize {
        self.spans.len()
    }

    /// Span index range of the column at (x, z)
    #[inline]
    pub fn cell_spans(&self, x: i32, z: i32) -> std::ops::Range<usize> {
        let cell = self.cells[(x + z * self.width) as usize];
        cell.index as usize..(cell.index + cell.count) as usize
    }

    /// Index of the span connected to span `i` of column (x, z) in `dir`
    #[inline]
    pub fn neighbour(&self, x: i32, z: i32, i: usize, dir: usize) -> Option<(i32, i32, usize)> {
        let layer = self.spans[i].con(dir)?;
        let nx = x + dir_offset_x(dir);
        let nz = z + dir_offset_y(dir);
        let cell = self.cells[(nx + nz * self.width) as usize];
        Some((nx, nz, cell.index as usize + layer))
    }

    /// Number of spans carrying a walkable area
    pub fn walkable_span_count(&self) -> usize {
        self.areas.iter().filter(|&&a| a != RC_NULL_AREA).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RC_WALKABLE_AREA;

    fn flat_field(w: i32, h: i32) -> Heightfield {
        let mut hf =
            Heightfield::new(w, h, Vec3::ZERO, Vec3::new(w as f32, 10.0, h as f32), 1.0, 1.0)
                .unwrap();
        for z in 0..h {
            for x in 0..w {
                hf.add_span(x, z, 0, 1, RC_WALKABLE_AREA, 1).unwrap();
            }
        }
        hf
    }

    #[test]
    fn test_build_links_flat_neighbours() {
        let mut ctx = BuildContext::new();
        let hf = flat_field(3, 3);
        let chf = CompactHeightfield::build(&mut ctx, 2, 1, &hf).unwrap();

        assert_eq!(chf.span_count(), 9);
        let centre = chf.cell_spans(1, 1).start;
        for dir in 0..4 {
            assert!(chf.neighbour(1, 1, centre, dir).is_some());
        }

        let corner = chf.cell_spans(0, 0).start;
        assert!(chf.neighbour(0, 0, corner, 0).is_none());
        assert_eq!(chf.neighbour(0, 0, corner, 2), Some((1, 0, chf.cell_spans(1, 0).start)));
    }

    #[test]
    fn test_build_skips_high_steps() {
        let mut ctx = BuildContext::new();
        let mut hf = flat_field(2, 1);
        hf.add_span(1, 0, 1, 6, RC_WALKABLE_AREA, 1).unwrap();
        let chf = CompactHeightfield::build(&mut ctx, 2, 1, &hf).unwrap();

        let left = chf.cell_spans(0, 0).start;
        assert!(chf.neighbour(0, 0, left, 2).is_none());
        assert!(chf.bmax.y > hf.bmax.y);
    }

    #[test]
    fn test_null_area_spans_are_dropped() {
        let mut ctx = BuildContext::new();
        let mut hf = flat_field(2, 2);
        hf.add_span(0, 0, 5, 6, RC_NULL_AREA, 0).unwrap();
        let chf = CompactHeightfield::build(&mut ctx, 2, 1, &hf).unwrap();
        assert_eq!(chf.span_count(), 4);
    }
}
