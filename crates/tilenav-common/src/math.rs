//! Scalar and 2D geometry helpers shared by the engine and the pipeline

use crate::Vec3;

/// Returns the square of a value
#[inline]
pub fn sqr<T: std::ops::Mul<Output = T> + Copy>(x: T) -> T {
    x * x
}

/// Rounds up to the next power of two. Zero stays zero.
pub fn next_pow2(v: u32) -> u32 {
    if v == 0 {
        return 0;
    }
    let mut v = v - 1;
    v |= v >> 1;
    v |= v >> 2;
    v |= v >> 4;
    v |= v >> 8;
    v |= v >> 16;
    v.wrapping_add(1)
}

/// Integer base-2 logarithm (floor). `ilog2(0) == 0`.
pub fn ilog2(v: u32) -> u32 {
    if v == 0 {
        0
    } else {
        31 - v.leading_zeros()
    }
}

/// Signed doubled area of the xz-projected triangle `abc`
#[inline]
pub fn tri_area_2d(a: &Vec3, b: &Vec3, c: &Vec3) -> f32 {
    let abx = b.x - a.x;
    let abz = b.z - a.z;
    let acx = c.x - a.x;
    let acz = c.z - a.z;
    acx * abz - abx * acz
}

/// Tests whether the xz projection of `p` lies inside the polygon `verts`.
///
/// Even-odd crossing test, so the polygon may be given in either winding.
pub fn point_in_poly_2d(p: &Vec3, verts: &[Vec3]) -> bool {
    let mut inside = false;
    let n = verts.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let vi = verts[i];
        let vj = verts[j];
        if ((vi.z > p.z) != (vj.z > p.z))
            && (p.x < (vj.x - vi.x) * (p.z - vi.z) / (vj.z - vi.z) + vi.x)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Computes the unit normal of triangle `v0 v1 v2`
pub fn triangle_normal(v0: &Vec3, v1: &Vec3, v2: &Vec3) -> Vec3 {
    let e0 = *v1 - *v0;
    let e1 = *v2 - *v0;
    e0.cross(e1).normalize_or_zero()
}

/// Tests whether two axis-aligned boxes overlap (touching counts as overlap)
#[inline]
pub fn overlap_bounds(amin: &Vec3, amax: &Vec3, bmin: &Vec3, bmax: &Vec3) -> bool {
    !(amin.x > bmax.x
        || amax.x < bmin.x
        || amin.y > bmax.y
        || amax.y < bmin.y
        || amin.z > bmax.z
        || amax.z < bmin.z)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_pow2() {
        assert_eq!(next_pow2(0), 0);
        assert_eq!(next_pow2(1), 1);
        assert_eq!(next_pow2(3), 4);
        assert_eq!(next_pow2(4), 4);
        assert_eq!(next_pow2(49), 64);
        assert_eq!(next_pow2(16385), 32768);
    }

    #[test]
    fn test_ilog2() {
        assert_eq!(ilog2(1), 0);
        assert_eq!(ilog2(2), 1);
        assert_eq!(ilog2(64), 6);
        assert_eq!(ilog2(65), 6);
        assert_eq!(ilog2(1 << 20), 20);
    }

    #[test]
    fn test_point_in_poly_2d_both_windings() {
        let ccw = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(4.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 4.0),
        ];
        let cw = [ccw[0], ccw[2], ccw[1]];

        let inside = Vec3::new(1.0, 5.0, 1.0);
        let outside = Vec3::new(3.0, 0.0, 3.0);

        assert!(point_in_poly_2d(&inside, &ccw));
        assert!(point_in_poly_2d(&inside, &cw));
        assert!(!point_in_poly_2d(&outside, &ccw));
        assert!(!point_in_poly_2d(&outside, &cw));
    }

    #[test]
    fn test_triangle_normal_faces_up() {
        let n = triangle_normal(
            &Vec3::new(0.0, 0.0, 0.0),
            &Vec3::new(0.0, 0.0, 1.0),
            &Vec3::new(1.0, 0.0, 0.0),
        );
        assert!((n.y - 1.0).abs() < 1e-6);
    }
}
