use glam::{Vec3, Vec4};

const SIXTH: f32 = 1.0 / 6.0;

/// Signed volume of tetrahedron (x_i, x_j, x_k, x_l): `(1/6) (e1 x e2) . e3`.
#[inline]
pub fn signed_volume(x_i: Vec3, x_j: Vec3, x_k: Vec3, x_l: Vec3) -> f32 {
    SIXTH * (x_j - x_i).cross(x_k - x_i).dot(x_l - x_i)
}

/// Area of triangle (x_i, x_j, x_k).
#[inline]
pub fn triangle_area(x_i: Vec3, x_j: Vec3, x_k: Vec3) -> f32 {
    0.5 * (x_j - x_i).cross(x_k - x_i).length()
}

/// Barycentric coordinates of `x` with respect to a tetrahedron.
///
/// Coordinates are signed-volume ratios, so they sum to one and are all
/// non-negative exactly when the tetrahedron encloses `x`. Returns `None` for
/// a degenerate tetrahedron.
pub fn tetrahedron_barycentric(x: Vec3, x_i: Vec3, x_j: Vec3, x_k: Vec3, x_l: Vec3) -> Option<Vec4> {
    let x_ji = x_j - x_i;
    let x_ki = x_k - x_i;
    let x_li = x_l - x_i;
    let x_xi = x - x_i;
    let n = x_ji.cross(x_ki);
    let six_v = n.dot(x_li);
    if six_v.abs() < 1e-12 {
        return None;
    }
    let inv = 1.0 / six_v;
    Some(Vec4::new(
        (x_l - x_j).cross(x_k - x_j).dot(x - x_j) * inv,
        x_ki.cross(x_li).dot(x_xi) * inv,
        x_li.cross(x_ji).dot(x_xi) * inv,
        n.dot(x_xi) * inv,
    ))
}

/// Barycentric coordinates of `x` projected onto a triangle's plane.
///
/// The fourth coordinate is always 0. Returns `None` for a degenerate triangle.
pub fn triangle_barycentric(x: Vec3, x_i: Vec3, x_j: Vec3, x_k: Vec3) -> Option<Vec4> {
    let x_ji = x_j - x_i;
    let x_ki = x_k - x_i;
    let x_xi = x - x_i;
    let n = x_ji.cross(x_ki);
    let sq_2a = n.length_squared();
    if sq_2a < 1e-24 {
        return None;
    }
    let inv = 1.0 / sq_2a;
    Some(Vec4::new(
        (x_k - x_j).cross(x - x_j).dot(n) * inv,
        x_xi.cross(x_ki).dot(n) * inv,
        x_ji.cross(x_xi).dot(n) * inv,
        0.0,
    ))
}

/// Closest point to `p` on segment `ab` as the segment parameter in `[0, 1]`.
#[inline]
pub fn segment_parameter(p: Vec3, a: Vec3, b: Vec3) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq < 1e-12 {
        return 0.0;
    }
    ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0)
}
