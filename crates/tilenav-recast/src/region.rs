//! Region partitioning of the compact heightfield
//!
//! Three policies are provided: watershed (distance field + flood growth),
//! monotone (row sweeps, no holes or overlaps) and layer (row sweeps merged
//! into non-overlapping layers). All of them finish by removing islands
//! smaller than `min_region_area` and compacting region ids.

use std::collections::{BTreeSet, HashMap};

use tilenav_common::{Error, Result};

use crate::{BuildContext, CompactHeightfield, TimerCategory, RC_BORDER_REG, RC_NULL_AREA};

/// Sweep neighbour marker for "rows connect to more than one region"
const NULL_NEIGHBOUR: u16 = 0xffff;

/// Cell coordinates for every span, so neighbour lookups can start from a span index
fn span_cells(chf: &CompactHeightfield) -> Vec<(i32, i32)> {
    let mut cells = vec![(0, 0); chf.span_count()];
    for z in 0..chf.height {
        for x in 0..chf.width {
            for i in chf.cell_spans(x, z) {
                cells[i] = (x, z);
            }
        }
    }
    cells
}

/// Computes `chf.dist`, the chamfer distance of each span to the nearest
/// area boundary, smoothed with a 3x3 box blur.
pub fn build_distance_field(ctx: &mut BuildContext, chf: &mut CompactHeightfield) -> Result<()> {
    ctx.timed(TimerCategory::Regions, |_| {
        let (src, max_dist) = calculate_distance_field(chf);
        chf.max_distance = max_dist;
        chf.dist = box_blur(chf, 1, &src);
        Ok(())
    })
}

fn calculate_distance_field(chf: &CompactHeightfield) -> (Vec<u16>, u16) {
    let mut dist = vec![0xffffu16; chf.span_count()];

    for z in 0..chf.height {
        for x in 0..chf.width {
            for i in chf.cell_spans(x, z) {
                let area = chf.areas[i];
                let same_area = (0..4)
                    .filter_map(|dir| chf.neighbour(x, z, i, dir))
                    .filter(|&(_, _, ni)| chf.areas[ni] == area)
                    .count();
                if same_area != 4 {
                    dist[i] = 0;
                }
            }
        }
    }

    let relax = |dist: &mut [u16], i: usize, ni: usize, cost: u16| {
        let nd = dist[ni].saturating_add(cost);
        if nd < dist[i] {
            dist[i] = nd;
        }
    };

    for z in 0..chf.height {
        for x in 0..chf.width {
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

    for z in (0..chf.height).rev() {
        for x in (0..chf.width).rev() {
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

    let max_dist = dist.iter().copied().max().unwrap_or(0);
    (dist, max_dist)
}

fn box_blur(chf: &CompactHeightfield, threshold: u16, src: &[u16]) -> Vec<u16> {
    let threshold = threshold * 2;
    let mut dst = vec![0u16; src.len()];

    for z in 0..chf.height {
        for x in 0..chf.width {
            for i in chf.cell_spans(x, z) {
                let cd = src[i];
                if cd <= threshold {
                    dst[i] = cd;
                    continue;
                }

                let mut d = cd as u32;
                for dir in 0..4 {
                    match chf.neighbour(x, z, i, dir) {
                        Some((ax, az, ai)) => {
                            d += src[ai] as u32;
                            let dir2 = (dir + 1) & 0x3;
                            d += chf
                                .neighbour(ax, az, ai, dir2)
                                .map_or(cd as u32, |(_, _, aai)| src[aai] as u32);
                        }
                        None => d += cd as u32 * 2,
                    }
                }
                dst[i] = ((d + 5) / 9) as u16;
            }
        }
    }
    dst
}

/// Tags the spans inside the border strips with one flagged id per side.
/// Returns the first free region id.
fn paint_border_regions(chf: &CompactHeightfield, border_size: i32, src_reg: &mut [u16]) -> u16 {
    if border_size <= 0 {
        return 1;
    }

    let w = chf.width;
    let h = chf.height;
    let bw = w.min(border_size);
    let bh = h.min(border_size);
    let rects = [
        (0, bw, 0, h),
        (w - bw, w, 0, h),
        (0, w, 0, bh),
        (0, w, h - bh, h),
    ];

    let mut id = 1u16;
    for (minx, maxx, minz, maxz) in rects {
        for z in minz..maxz {
            for x in minx..maxx {
                for i in chf.cell_spans(x, z) {
                    if chf.areas[i] != RC_NULL_AREA {
                        src_reg[i] = id | RC_BORDER_REG;
                    }
                }
            }
        }
        id += 1;
    }
    id
}

fn flood_region(
    chf: &CompactHeightfield,
    cells: &[(i32, i32)],
    start: usize,
    level: u16,
    region: u16,
    src_reg: &mut [u16],
    src_dist: &mut [u16],
) -> bool {
    let area = chf.areas[start];
    let lev = level.saturating_sub(2);

    let mut stack = vec![start];
    src_reg[start] = region;
    src_dist[start] = 0;
    let mut count = 0;

    while let Some(ci) = stack.pop() {
        let (cx, cz) = cells[ci];

        // Stop at spans that already touch another region, so regions never
        // share an edge at this point of the flood
        let mut adjacent = 0u16;
        'dirs: for dir in 0..4 {
            let Some((ax, az, ai)) = chf.neighbour(cx, cz, ci, dir) else {
                continue;
            };
            if chf.areas[ai] != area {
                continue;
            }
            let nr = src_reg[ai];
            if nr & RC_BORDER_REG != 0 {
                continue;
            }
            if nr != 0 && nr != region {
                adjacent = nr;
                break 'dirs;
            }

            let dir2 = (dir + 1) & 0x3;
            if let Some((_, _, ai2)) = chf.neighbour(ax, az, ai, dir2) {
                if chf.areas[ai2] != area {
                    continue;
                }
                let nr2 = src_reg[ai2];
                if nr2 != 0 && nr2 != region {
                    adjacent = nr2;
                    break 'dirs;
                }
            }
        }
        if adjacent != 0 {
            src_reg[ci] = 0;
            continue;
        }

        count += 1;

        for dir in 0..4 {
            let Some((_, _, ai)) = chf.neighbour(cx, cz, ci, dir) else {
                continue;
            };
            if chf.areas[ai] != area {
                continue;
            }
            if chf.dist[ai] >= lev && src_reg[ai] == 0 {
                src_reg[ai] = region;
                src_dist[ai] = 0;
                stack.push(ai);
            }
        }
    }

    count > 0
}

/// Grows existing regions into unassigned spans of `pending`.
/// `max_iter == None` runs until nothing changes.
fn expand_regions(
    chf: &CompactHeightfield,
    cells: &[(i32, i32)],
    pending: &mut Vec<usize>,
    max_iter: Option<usize>,
    src_reg: &mut [u16],
    src_dist: &mut [u16],
) {
    pending.retain(|&i| src_reg[i] == 0);

    let mut iter = 0;
    while !pending.is_empty() {
        let mut dirty = Vec::new();

        for &i in pending.iter() {
            let (x, z) = cells[i];
            let area = chf.areas[i];
            let mut best = 0u16;
            let mut best_dist = 0xffffu16;

            for dir in 0..4 {
                let Some((_, _, ai)) = chf.neighbour(x, z, i, dir) else {
                    continue;
                };
                if chf.areas[ai] != area {
                    continue;
                }
                let nr = src_reg[ai];
                if nr > 0 && nr & RC_BORDER_REG == 0 {
                    let d = src_dist[ai].saturating_add(2);
                    if d < best_dist {
                        best = nr;
                        best_dist = d;
                    }
                }
            }

            if best != 0 {
                dirty.push((i, best, best_dist));
            }
        }

        if dirty.is_empty() {
            break;
        }
        for (i, r, d) in dirty {
            src_reg[i] = r;
            src_dist[i] = d;
        }
        pending.retain(|&i| src_reg[i] == 0);

        iter += 1;
        if max_iter.is_some_and(|max| iter >= max) {
            break;
        }
    }
}

/// Watershed partitioning. Builds the distance field first when it is missing.
pub fn build_regions_watershed(
    ctx: &mut BuildContext,
    chf: &mut CompactHeightfield,
    border_size: i32,
    min_region_area: i32,
    merge_region_area: i32,
) -> Result<()> {
    if chf.dist.len() != chf.span_count() {
        build_distance_field(ctx, chf)?;
    }

    ctx.timed(TimerCategory::Regions, |ctx| {
        let n = chf.span_count();
        let cells = span_cells(chf);
        let mut src_reg = vec![0u16; n];
        let mut src_dist = vec![0u16; n];

        let mut region_id = paint_border_regions(chf, border_size, &mut src_reg);
        chf.border_size = border_size;

        let mut level = chf.max_distance.saturating_add(1) & !1;
        while level > 0 {
            level = level.saturating_sub(2);

            let mut pending: Vec<usize> = (0..n)
                .filter(|&i| {
                    chf.dist[i] >= level && src_reg[i] == 0 && chf.areas[i] != RC_NULL_AREA
                })
                .collect();

            expand_regions(chf, &cells, &mut pending, Some(8), &mut src_reg, &mut src_dist);

            for i in pending {
                if src_reg[i] != 0 {
                    continue;
                }
                if flood_region(chf, &cells, i, level, region_id, &mut src_reg, &mut src_dist) {
                    if region_id == RC_BORDER_REG - 1 {
                        ctx.log_error("watershed: region id overflow");
                        return Err(Error::Recast("region id overflow".to_string()));
                    }
                    region_id += 1;
                }
            }
        }

        let mut rest: Vec<usize> = (0..n)
            .filter(|&i| src_reg[i] == 0 && chf.areas[i] != RC_NULL_AREA)
            .collect();
        expand_regions(chf, &cells, &mut rest, None, &mut src_reg, &mut src_dist);

        let max_regions = merge_and_filter_regions(
            chf,
            &cells,
            &mut src_reg,
            min_region_area,
            merge_region_area,
        );
        apply_regions(chf, &src_reg, max_regions);
        Ok(())
    })
}

#[derive(Debug, Clone, Copy, Default)]
struct Sweep {
    ns: u32,
    neighbour: u16,
    id: u16,
}

/// Assigns row-sweep regions. Each sweep continues the region of the row
/// below when it touches exactly that region and is its only continuation.
fn sweep_regions(chf: &CompactHeightfield, border_size: i32, src_reg: &mut [u16]) -> Result<u16> {
    let w = chf.width;
    let h = chf.height;
    let mut id = paint_border_regions(chf, border_size, src_reg);
    let mut prev: Vec<u32> = Vec::new();
    let mut sweeps: Vec<Sweep> = Vec::new();

    for z in border_size..h - border_size {
        prev.clear();
        prev.resize(id as usize + 1, 0);
        sweeps.clear();
        sweeps.push(Sweep::default());
        let mut rid = 1u16;

        for x in border_size..w - border_size {
            for i in chf.cell_spans(x, z) {
                if chf.areas[i] == RC_NULL_AREA {
                    continue;
                }

                let mut previd = 0u16;
                if let Some((_, _, ai)) = chf.neighbour(x, z, i, 0) {
                    if src_reg[ai] & RC_BORDER_REG == 0 && chf.areas[i] == chf.areas[ai] {
                        previd = src_reg[ai];
                    }
                }
                if previd == 0 {
                    previd = rid;
                    rid += 1;
                    sweeps.push(Sweep::default());
                }

                if let Some((_, _, ai)) = chf.neighbour(x, z, i, 3) {
                    let nr = src_reg[ai];
                    if nr != 0 && nr & RC_BORDER_REG == 0 && chf.areas[i] == chf.areas[ai] {
                        let sweep = &mut sweeps[previd as usize];
                        if sweep.neighbour == 0 || sweep.neighbour == nr {
                            sweep.neighbour = nr;
                            sweep.ns += 1;
                            prev[nr as usize] += 1;
                        } else {
                            sweep.neighbour = NULL_NEIGHBOUR;
                        }
                    }
                }

                src_reg[i] = previd;
            }
        }

        for sweep in sweeps.iter_mut().skip(1) {
            let nr = sweep.neighbour;
            if nr != NULL_NEIGHBOUR && nr != 0 && prev[nr as usize] == sweep.ns {
                sweep.id = nr;
            } else {
                if id == RC_BORDER_REG - 1 {
                    return Err(Error::Recast("region id overflow".to_string()));
                }
                sweep.id = id;
                id += 1;
            }
        }

        for x in border_size..w - border_size {
            for i in chf.cell_spans(x, z) {
                let r = src_reg[i];
                if r > 0 && r < rid {
                    src_reg[i] = sweeps[r as usize].id;
                }
            }
        }
    }

    Ok(id)
}

/// Monotone partitioning: fast, no holes, may produce long thin regions.
pub fn build_regions_monotone(
    ctx: &mut BuildContext,
    chf: &mut CompactHeightfield,
    border_size: i32,
    min_region_area: i32,
    merge_region_area: i32,
) -> Result<()> {
    ctx.timed(TimerCategory::Regions, |ctx| {
        let cells = span_cells(chf);
        let mut src_reg = vec![0u16; chf.span_count()];
        chf.border_size = border_size;

        if let Err(e) = sweep_regions(chf, border_size, &mut src_reg) {
            ctx.log_error(format!("build_regions_monotone: {}", e));
            return Err(e);
        }

        let max_regions = merge_and_filter_regions(
            chf,
            &cells,
            &mut src_reg,
            min_region_area,
            merge_region_area,
        );
        apply_regions(chf, &src_reg, max_regions);
        Ok(())
    })
}

/// Layer partitioning: sweep regions grouped into layers that never
/// overlap vertically, suited to multi-floor tiles.
pub fn build_layer_regions(
    ctx: &mut BuildContext,
    chf: &mut CompactHeightfield,
    border_size: i32,
    min_region_area: i32,
) -> Result<()> {
    ctx.timed(TimerCategory::Regions, |ctx| {
        let cells = span_cells(chf);
        let mut src_reg = vec![0u16; chf.span_count()];
        chf.border_size = border_size;

        if let Err(e) = sweep_regions(chf, border_size, &mut src_reg) {
            ctx.log_error(format!("build_layer_regions: {}", e));
            return Err(e);
        }

        let mut regions = collect_regions(chf, &cells, &src_reg);
        let mut layer_of: HashMap<u16, u16> = HashMap::new();
        let mut next_layer = 1u16;
        let ids: Vec<u16> = regions.keys().copied().collect();

        for root in ids {
            if layer_of.contains_key(&root) {
                continue;
            }
            let area = regions[&root].area;
            let layer = next_layer;
            next_layer += 1;

            let mut members: BTreeSet<u16> = BTreeSet::new();
            let mut floors: BTreeSet<u16> = BTreeSet::new();
            let mut stack = vec![root];
            layer_of.insert(root, layer);

            while let Some(r) = stack.pop() {
                let info = &regions[&r];
                members.insert(r);
                floors.extend(info.floors.iter().copied());

                for &nr in &info.neighbours {
                    if layer_of.contains_key(&nr) {
                        continue;
                    }
                    let Some(ninfo) = regions.get(&nr) else {
                        continue;
                    };
                    if ninfo.area != area || floors.contains(&nr) {
                        continue;
                    }
                    if ninfo.floors.iter().any(|f| members.contains(f)) {
                        continue;
                    }
                    layer_of.insert(nr, layer);
                    stack.push(nr);
                }
            }
        }

        for reg in src_reg.iter_mut() {
            if *reg != 0 && *reg & RC_BORDER_REG == 0 {
                *reg = layer_of.get(reg).copied().unwrap_or(0);
            }
        }

        regions = collect_regions(chf, &cells, &src_reg);
        remove_small_islands(&regions, &mut src_reg, min_region_area);
        let max_regions = compact_region_ids(&mut src_reg);
        apply_regions(chf, &src_reg, max_regions);
        Ok(())
    })
}

#[derive(Debug, Default, Clone)]
struct RegionInfo {
    span_count: usize,
    area: u8,
    touches_border: bool,
    neighbours: BTreeSet<u16>,
    floors: BTreeSet<u16>,
}

fn collect_regions(
    chf: &CompactHeightfield,
    cells: &[(i32, i32)],
    src_reg: &[u16],
) -> HashMap<u16, RegionInfo> {
    let mut regions: HashMap<u16, RegionInfo> = HashMap::new();

    for (i, &r) in src_reg.iter().enumerate() {
        if r == 0 || r & RC_BORDER_REG != 0 {
            continue;
        }
        let (x, z) = cells[i];
        let info = regions.entry(r).or_default();
        info.span_count += 1;
        info.area = chf.areas[i];

        for dir in 0..4 {
            if let Some((_, _, ai)) = chf.neighbour(x, z, i, dir) {
                let nr = src_reg[ai];
                if nr & RC_BORDER_REG != 0 {
                    info.touches_border = true;
                } else if nr != 0 && nr != r {
                    info.neighbours.insert(nr);
                }
            }
        }
    }

    // Regions sharing a column can never be merged
    for z in 0..chf.height {
        for x in 0..chf.width {
            let column: Vec<u16> = chf
                .cell_spans(x, z)
                .map(|i| src_reg[i])
                .filter(|&r| r != 0 && r & RC_BORDER_REG == 0)
                .collect();
            for (a, &ra) in column.iter().enumerate() {
                for &rb in &column[a + 1..] {
                    if ra == rb {
                        continue;
                    }
                    if let Some(info) = regions.get_mut(&ra) {
                        info.floors.insert(rb);
                    }
                    if let Some(info) = regions.get_mut(&rb) {
                        info.floors.insert(ra);
                    }
                }
            }
        }
    }

    regions
}

/// Clears connected groups of regions that are smaller than `min_region_area`
/// in total and do not reach the tile border.
fn remove_small_islands(
    regions: &HashMap<u16, RegionInfo>,
    src_reg: &mut [u16],
    min_region_area: i32,
) {
    let mut visited: BTreeSet<u16> = BTreeSet::new();
    let mut removed: BTreeSet<u16> = BTreeSet::new();

    let mut ids: Vec<u16> = regions.keys().copied().collect();
    ids.sort_unstable();

    for id in ids {
        if visited.contains(&id) {
            continue;
        }
        let mut island = Vec::new();
        let mut stack = vec![id];
        visited.insert(id);
        let mut span_count = 0;
        let mut touches_border = false;

        while let Some(r) = stack.pop() {
            let info = &regions[&r];
            island.push(r);
            span_count += info.span_count;
            touches_border |= info.touches_border;
            for &nr in &info.neighbours {
                if regions.contains_key(&nr) && visited.insert(nr) {
                    stack.push(nr);
                }
            }
        }

        if (span_count as i32) < min_region_area && !touches_border {
            removed.extend(island);
        }
    }

    if removed.is_empty() {
        return;
    }
    for reg in src_reg.iter_mut() {
        if removed.contains(reg) {
            *reg = 0;
        }
    }
}

/// Renumbers surviving non-border regions to 1..n. Returns n + 1.
fn compact_region_ids(src_reg: &mut [u16]) -> u16 {
    let mut remap: HashMap<u16, u16> = HashMap::new();
    let mut next = 1u16;
    for reg in src_reg.iter_mut() {
        if *reg == 0 || *reg & RC_BORDER_REG != 0 {
            continue;
        }
        let id = *remap.entry(*reg).or_insert_with(|| {
            let id = next;
            next += 1;
            id
        });
        *reg = id;
    }
    next
}

fn merge_and_filter_regions(
    chf: &CompactHeightfield,
    cells: &[(i32, i32)],
    src_reg: &mut [u16],
    min_region_area: i32,
    merge_region_area: i32,
) -> u16 {
    let regions = collect_regions(chf, cells, src_reg);
    remove_small_islands(&regions, src_reg, min_region_area);

    let mut regions = collect_regions(chf, cells, src_reg);
    let mut remap: HashMap<u16, u16> = regions.keys().map(|&r| (r, r)).collect();

    loop {
        let mut merged = false;
        let mut ids: Vec<u16> = regions.keys().copied().collect();
        ids.sort_unstable();

        for id in ids {
            let Some(info) = regions.get(&id) else {
                continue;
            };
            if info.span_count as i32 >= merge_region_area {
                continue;
            }

            // Merge into the smallest compatible neighbour
            let target = info
                .neighbours
                .iter()
                .filter(|&&nr| nr != id && !info.floors.contains(&nr))
                .filter_map(|&nr| regions.get(&nr).map(|n| (nr, n)))
                .filter(|(_, n)| n.area == info.area && !n.floors.contains(&id))
                .min_by_key(|(nr, n)| (n.span_count, *nr))
                .map(|(nr, _)| nr);

            let Some(target) = target else {
                continue;
            };
            let Some(source) = regions.remove(&id) else {
                continue;
            };

            for info in regions.values_mut() {
                if info.neighbours.remove(&id) {
                    info.neighbours.insert(target);
                }
                if info.floors.remove(&id) {
                    info.floors.insert(target);
                }
            }
            if let Some(t) = regions.get_mut(&target) {
                t.span_count += source.span_count;
                t.touches_border |= source.touches_border;
                t.neighbours.extend(source.neighbours.iter().copied());
                t.neighbours.remove(&target);
                t.floors.extend(source.floors.iter().copied());
            }
            for mapped in remap.values_mut() {
                if *mapped == id {
                    *mapped = target;
                }
            }
            merged = true;
        }

        if !merged {
            break;
        }
    }

    for reg in src_reg.iter_mut() {
        if *reg != 0 && *reg & RC_BORDER_REG == 0 {
            *reg = remap.get(reg).copied().unwrap_or(*reg);
        }
    }

    compact_region_ids(src_reg)
}

fn apply_regions(chf: &mut CompactHeightfield, src_reg: &[u16], max_regions: u16) {
    for (span, &reg) in chf.spans.iter_mut().zip(src_reg) {
        span.reg = reg;
    }
    chf.max_regions = max_regions;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Heightfield, RC_WALKABLE_AREA};
    use glam::Vec3;

    fn flat_chf(w: i32, h: i32) -> CompactHeightfield {
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
                hf.add_span(x, z, 0, 2, RC_WALKABLE_AREA, 1).unwrap();
            }
        }
        CompactHeightfield::build(&mut ctx, 2, 1, &hf).unwrap()
    }

    fn regions_of(chf: &CompactHeightfield) -> BTreeSet<u16> {
        chf.spans
            .iter()
            .map(|s| s.reg)
            .filter(|&r| r != 0 && r & RC_BORDER_REG == 0)
            .collect()
    }

    #[test]
    fn test_distance_field_peaks_in_centre() {
        let mut ctx = BuildContext::new();
        let mut chf = flat_chf(9, 9);
        build_distance_field(&mut ctx, &mut chf).unwrap();

        let centre = chf.cell_spans(4, 4).start;
        let edge = chf.cell_spans(0, 4).start;
        assert_eq!(chf.dist[edge], 0);
        assert!(chf.dist[centre] > 4);
        assert!(chf.max_distance >= chf.dist[centre]);
    }

    #[test]
    fn test_watershed_flat_square_is_one_region() {
        let mut ctx = BuildContext::new();
        let mut chf = flat_chf(12, 12);
        build_regions_watershed(&mut ctx, &mut chf, 0, 8, 20).unwrap();

        assert_eq!(regions_of(&chf).len(), 1);
        assert_eq!(chf.max_regions, 2);
        assert!(chf.spans.iter().all(|s| s.reg == 1));
    }

    #[test]
    fn test_monotone_flat_square_is_one_region() {
        let mut ctx = BuildContext::new();
        let mut chf = flat_chf(10, 6);
        build_regions_monotone(&mut ctx, &mut chf, 0, 8, 20).unwrap();
        assert!(chf.spans.iter().all(|s| s.reg == 1));
    }

    #[test]
    fn test_layer_regions_flat_square_is_one_layer() {
        let mut ctx = BuildContext::new();
        let mut chf = flat_chf(10, 6);
        build_layer_regions(&mut ctx, &mut chf, 0, 8).unwrap();
        assert_eq!(regions_of(&chf).len(), 1);
    }

    #[test]
    fn test_border_strips_are_flagged() {
        let mut ctx = BuildContext::new();
        let mut chf = flat_chf(12, 12);
        build_regions_monotone(&mut ctx, &mut chf, 2, 4, 10).unwrap();

        let corner = chf.cell_spans(0, 0).start;
        let inner = chf.cell_spans(6, 6).start;
        assert_ne!(chf.spans[corner].reg & RC_BORDER_REG, 0);
        assert_eq!(chf.spans[inner].reg, 1);
        assert_eq!(chf.border_size, 2);
    }

    #[test]
    fn test_areas_split_regions() {
        let mut ctx = BuildContext::new();
        let mut chf = flat_chf(12, 12);
        for z in 0..12 {
            for x in 6..12 {
                let i = chf.cell_spans(x, z).start;
                chf.areas[i] = 2;
            }
        }
        build_regions_watershed(&mut ctx, &mut chf, 0, 8, 20).unwrap();

        let left = chf.spans[chf.cell_spans(1, 6).start].reg;
        let right = chf.spans[chf.cell_spans(10, 6).start].reg;
        assert_ne!(left, 0);
        assert_ne!(right, 0);
        assert_ne!(left, right);
    }

    #[test]
    fn test_small_islands_are_removed() {
        let mut ctx = BuildContext::new();
        let mut chf = flat_chf(2, 2);
        build_regions_watershed(&mut ctx, &mut chf, 0, 8, 20).unwrap();
        assert!(regions_of(&chf).is_empty());
        assert_eq!(chf.max_regions, 1);
    }
}
