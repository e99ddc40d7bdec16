//! Solid heightfield: per-column sorted span lists and the span filters

use glam::Vec3;
use tilenav_common::{Error, Result};

use crate::{dir_offset_x, dir_offset_y, BuildContext, TimerCategory, RC_NULL_AREA};

/// Largest span height that can be stored (13 bits)
pub const SPAN_MAX_HEIGHT: i32 = (1 << 13) - 1;

/// Height used for "open sky" above the topmost span in filters
const MAX_HEIGHT: i32 = 0xffff;

/// A solid span of voxels in one column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Lower limit of the span, in voxels
    pub smin: u16,
    /// Upper limit of the span, in voxels
    pub smax: u16,
    /// Area id of the top surface
    pub area: u8,
}

/// A voxel heightfield covering one tile plus its border
#[derive(Debug, Clone)]
pub struct Heightfield {
    /// Width of the field along x, in cells
    pub width: i32,
    /// Height of the field along z, in cells
    pub height: i32,
    /// Minimum bounds in world space
    pub bmin: Vec3,
    /// Maximum bounds in world space
    pub bmax: Vec3,
    /// Cell size
    pub cs: f32,
    /// Cell height
    pub ch: f32,
    /// One span list per column, each sorted by `smin`
    columns: Vec<Vec<Span>>,
}

impl Heightfield {
    /// Allocates an empty heightfield
    pub fn new(width: i32, height: i32, bmin: Vec3, bmax: Vec3, cs: f32, ch: f32) -> Result<Self> {
        if width <= 0 || height <= 0 {
            return Err(Error::Recast(format!(
                "cannot allocate a {}x{} heightfield",
                width, height
            )));
        }
        if cs <= 0.0 || ch <= 0.0 {
            return Err(Error::Recast("cell sizes must be positive".to_string()));
        }

        let cells = width as usize * height as usize;
        let mut columns = Vec::new();
        columns
            .try_reserve_exact(cells)
            .map_err(|e| Error::Recast(format!("out of memory allocating heightfield: {}", e)))?;
        columns.resize_with(cells, Vec::new);

        Ok(Self {
            width,
            height,
            bmin,
            bmax,
            cs,
            ch,
            columns,
        })
    }

    #[inline]
    fn column_index(&self, x: i32, z: i32) -> usize {
        (x + z * self.width) as usize
    }

    /// Spans of the column at (x, z), bottom to top
    pub fn spans(&self, x: i32, z: i32) -> &[Span] {
        &self.columns[self.column_index(x, z)]
    }

    fn spans_mut(&mut self, x: i32, z: i32) -> &mut Vec<Span> {
        let idx = self.column_index(x, z);
        &mut self.columns[idx]
    }

    /// Total number of spans in the field
    pub fn span_count(&self) -> usize {
        self.columns.iter().map(Vec::len).sum()
    }

    /// Number of spans whose area is walkable
    pub fn walkable_span_count(&self) -> usize {
        self.columns
            .iter()
            .flatten()
            .filter(|s| s.area != RC_NULL_AREA)
            .count()
    }

    /// Inserts a span, merging it with every span it overlaps.
    ///
    /// When the merged tops are within `flag_merge_threshold` voxels the
    /// higher area id wins.
    pub fn add_span(
        &mut self,
        x: i32,
        z: i32,
        smin: u16,
        smax: u16,
        area: u8,
        flag_merge_threshold: i32,
    ) -> Result<()> {
        if x < 0 || x >= self.width || z < 0 || z >= self.height {
            return Err(Error::Recast(format!(
                "span column ({}, {}) outside {}x{} heightfield",
                x, z, self.width, self.height
            )));
        }
        if smin > smax {
            return Err(Error::Recast(format!("inverted span {}..{}", smin, smax)));
        }

        let column = self.spans_mut(x, z);
        let mut new_span = Span { smin, smax, area };

        let mut i = 0;
        while i < column.len() {
            let cur = column[i];
            if cur.smin > new_span.smax {
                break;
            }
            if cur.smax < new_span.smin {
                i += 1;
                continue;
            }

            new_span.smin = new_span.smin.min(cur.smin);
            new_span.smax = new_span.smax.max(cur.smax);
            if (new_span.smax as i32 - cur.smax as i32).abs() <= flag_merge_threshold {
                new_span.area = new_span.area.max(cur.area);
            }
            column.remove(i);
        }

        column.insert(i, new_span);
        Ok(())
    }
}

/// Lets a non-walkable span take the area of the walkable span below it
/// when the step between their tops is climbable.
pub fn filter_low_hanging_walkable_obstacles(
    ctx: &mut BuildContext,
    walkable_climb: i32,
    hf: &mut Heightfield,
) {
    ctx.timed(TimerCategory::Filtering, |_| {
        for column in hf.columns.iter_mut() {
            let mut previous: Option<(bool, u8, u16)> = None;
            for span in column.iter_mut() {
                let walkable = span.area != RC_NULL_AREA;
                if let Some((prev_walkable, prev_area, prev_smax)) = previous {
                    if !walkable
                        && prev_walkable
                        && span.smax as i32 - prev_smax as i32 <= walkable_climb
                    {
                        span.area = prev_area;
                    }
                }
                previous = Some((walkable, span.area, span.smax));
            }
        }
    });
}

/// Clears the area of spans that sit next to a drop higher than
/// `walkable_climb`, or whose reachable neighbours differ too much in height.
pub fn filter_ledge_spans(
    ctx: &mut BuildContext,
    walkable_height: i32,
    walkable_climb: i32,
    hf: &mut Heightfield,
) {
    ctx.timed(TimerCategory::Filtering, |_| {
        let mut ledges = Vec::new();

        for z in 0..hf.height {
            for x in 0..hf.width {
                let column = hf.spans(x, z);
                for (si, span) in column.iter().enumerate() {
                    if span.area == RC_NULL_AREA {
                        continue;
                    }

                    let bot = span.smax as i32;
                    let top = column.get(si + 1).map_or(MAX_HEIGHT, |n| n.smin as i32);

                    let mut min_height = MAX_HEIGHT;
                    let mut accessible_min = bot;
                    let mut accessible_max = bot;

                    for dir in 0..4 {
                        let dx = x + dir_offset_x(dir);
                        let dz = z + dir_offset_y(dir);
                        if dx < 0 || dz < 0 || dx >= hf.width || dz >= hf.height {
                            min_height = min_height.min(-walkable_climb - bot);
                            continue;
                        }

                        let neighbours = hf.spans(dx, dz);

                        // Gap from the floor below the first neighbour span
                        let nbot = -walkable_climb;
                        let ntop = neighbours.first().map_or(MAX_HEIGHT, |n| n.smin as i32);
                        if top.min(ntop) - bot.max(nbot) > walkable_height {
                            min_height = min_height.min(nbot - bot);
                        }

                        for (ni, ns) in neighbours.iter().enumerate() {
                            let nbot = ns.smax as i32;
                            let ntop = neighbours.get(ni + 1).map_or(MAX_HEIGHT, |n| n.smin as i32);
                            if top.min(ntop) - bot.max(nbot) > walkable_height {
                                min_height = min_height.min(nbot - bot);
                                if (nbot - bot).abs() <= walkable_climb {
                                    accessible_min = accessible_min.min(nbot);
                                    accessible_max = accessible_max.max(nbot);
                                }
                            }
                        }
                    }

                    if min_height < -walkable_climb
                        || accessible_max - accessible_min > walkable_climb
                    {
                        ledges.push((hf.column_index(x, z), si));
                    }
                }
            }
        }

        for (column, si) in ledges {
            hf.columns[column][si].area = RC_NULL_AREA;
        }
    });
}

/// Clears the area of spans with less than `walkable_height` of free space above
pub fn filter_walkable_low_height_spans(
    ctx: &mut BuildContext,
    walkable_height: i32,
    hf: &mut Heightfield,
) {
    ctx.timed(TimerCategory::Filtering, |_| {
        for column in hf.columns.iter_mut() {
            for si in 0..column.len() {
                let bot = column[si].smax as i32;
                let top = column.get(si + 1).map_or(MAX_HEIGHT, |n| n.smin as i32);
                if top - bot < walkable_height {
                    column[si].area = RC_NULL_AREA;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RC_WALKABLE_AREA;

    fn field(w: i32, h: i32) -> Heightfield {
        Heightfield::new(w, h, Vec3::ZERO, Vec3::new(w as f32, 10.0, h as f32), 1.0, 0.5).unwrap()
    }

    #[test]
    fn test_rejects_empty_allocation() {
        assert!(Heightfield::new(0, 4, Vec3::ZERO, Vec3::ONE, 1.0, 1.0).is_err());
    }

    #[test]
    fn test_add_span_merges_overlaps() {
        let mut hf = field(2, 2);
        hf.add_span(0, 0, 0, 2, 1, 1).unwrap();
        hf.add_span(0, 0, 5, 7, 2, 1).unwrap();
        assert_eq!(hf.spans(0, 0).len(), 2);

        // Bridges both spans; its top is within the threshold of the upper one
        hf.add_span(0, 0, 1, 6, 3, 1).unwrap();
        let spans = hf.spans(0, 0);
        assert_eq!(spans.len(), 1);
        assert_eq!((spans[0].smin, spans[0].smax), (0, 7));
        assert_eq!(spans[0].area, 3);
    }

    #[test]
    fn test_add_span_keeps_order() {
        let mut hf = field(1, 1);
        hf.add_span(0, 0, 10, 12, 1, 1).unwrap();
        hf.add_span(0, 0, 0, 2, 1, 1).unwrap();
        hf.add_span(0, 0, 5, 6, 1, 1).unwrap();
        let mins: Vec<u16> = hf.spans(0, 0).iter().map(|s| s.smin).collect();
        assert_eq!(mins, vec![0, 5, 10]);
        assert!(hf.add_span(1, 0, 0, 1, 1, 1).is_err());
    }

    #[test]
    fn test_low_height_filter() {
        let mut ctx = BuildContext::new();
        let mut hf = field(1, 1);
        hf.add_span(0, 0, 0, 2, RC_WALKABLE_AREA, 1).unwrap();
        hf.add_span(0, 0, 4, 6, RC_WALKABLE_AREA, 1).unwrap();

        filter_walkable_low_height_spans(&mut ctx, 3, &mut hf);
        let spans = hf.spans(0, 0);
        assert_eq!(spans[0].area, RC_NULL_AREA);
        assert_eq!(spans[1].area, RC_WALKABLE_AREA);
    }

    #[test]
    fn test_low_hanging_obstacle_filter() {
        let mut ctx = BuildContext::new();
        let mut hf = field(1, 1);
        hf.add_span(0, 0, 0, 2, RC_WALKABLE_AREA, 1).unwrap();
        hf.add_span(0, 0, 6, 7, RC_NULL_AREA, 1).unwrap();
        hf.add_span(0, 0, 20, 30, RC_NULL_AREA, 1).unwrap();

        filter_low_hanging_walkable_obstacles(&mut ctx, 5, &mut hf);
        let spans = hf.spans(0, 0);
        assert_eq!(spans[1].area, RC_WALKABLE_AREA);
        assert_eq!(spans[2].area, RC_NULL_AREA);
    }

    #[test]
    fn test_ledge_filter_clears_field_edges() {
        let mut ctx = BuildContext::new();
        let mut hf = field(3, 3);
        for z in 0..3 {
            for x in 0..3 {
                hf.add_span(x, z, 0, 10, RC_WALKABLE_AREA, 1).unwrap();
            }
        }

        filter_ledge_spans(&mut ctx, 4, 2, &mut hf);

        // Only the centre has floor on all four sides
        assert_eq!(hf.spans(1, 1)[0].area, RC_WALKABLE_AREA);
        assert_eq!(hf.spans(0, 1)[0].area, RC_NULL_AREA);
        assert_eq!(hf.spans(2, 2)[0].area, RC_NULL_AREA);
    }
}
