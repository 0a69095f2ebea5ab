//! External collision primitives and attachment targets, refreshed per tick.

use glam::{Vec3, Vec4};
use tracing::warn;

use crate::math::segment_parameter;

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Box containing nothing; the identity of [`Aabb::union`].
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Grow by `margin` on every side.
    pub fn expand(&self, margin: f32) -> Aabb {
        Aabb {
            min: self.min - Vec3::splat(margin),
            max: self.max + Vec3::splat(margin),
        }
    }

    #[inline]
    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Shortest displacement moving `p` out of the box, along one axis.
    ///
    /// Zero when `p` is outside.
    pub fn push_out(&self, p: Vec3) -> Vec3 {
        if !self.contains(p) {
            return Vec3::ZERO;
        }
        let to_min = p - self.min;
        let to_max = self.max - p;
        let mut best = Vec3::ZERO;
        let mut best_depth = f32::INFINITY;
        for axis in 0..3 {
            if to_min[axis] < best_depth {
                best_depth = to_min[axis];
                best = Vec3::ZERO;
                best[axis] = -to_min[axis];
            }
            if to_max[axis] < best_depth {
                best_depth = to_max[axis];
                best = Vec3::ZERO;
                best[axis] = to_max[axis];
            }
        }
        best
    }
}

/// Capsule with independently sized end caps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Capsule {
    pub a: Vec3,
    pub b: Vec3,
    pub radius_a: f32,
    pub radius_b: f32,
    bounds: Aabb,
}

impl Capsule {
    pub fn new(a: Vec3, b: Vec3, radius: f32) -> Self {
        Self::tapered(a, b, radius, radius)
    }

    pub fn tapered(a: Vec3, b: Vec3, radius_a: f32, radius_b: f32) -> Self {
        let bounds = Aabb::new(a, a)
            .expand(radius_a)
            .union(&Aabb::new(b, b).expand(radius_b));
        Self {
            a,
            b,
            radius_a,
            radius_b,
            bounds,
        }
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    /// Displacement moving a sphere at `p` with `radius` out of the capsule.
    pub fn push_out(&self, p: Vec3, radius: f32) -> Vec3 {
        if !self.bounds.expand(radius).contains(p) {
            return Vec3::ZERO;
        }
        let t = segment_parameter(p, self.a, self.b);
        let axis_point = self.a.lerp(self.b, t);
        let capsule_radius = self.radius_a + (self.radius_b - self.radius_a) * t;

        let d = p - axis_point;
        let dist = d.length();
        let penetration = capsule_radius + radius - dist;
        if penetration <= 0.0 {
            return Vec3::ZERO;
        }
        let normal = if dist > 1e-9 { d / dist } else { Vec3::Y };
        normal * penetration
    }
}

/// Pins a particle to a world position before each step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Attachment {
    pub particle: u32,
    pub target: Vec3,
}

/// Fixed-capacity set of capsules plus solid box obstacles.
#[derive(Clone, Debug)]
pub struct CollisionProxy {
    capacity: usize,
    capsules: Vec<Capsule>,
    obstacles: Vec<Aabb>,
    bounds: Aabb,
}

impl CollisionProxy {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            capsules: Vec::with_capacity(capacity),
            obstacles: Vec::new(),
            bounds: Aabb::EMPTY,
        }
    }

    /// Empty proxy that collides with nothing.
    pub fn empty() -> Self {
        Self::with_capacity(0)
    }

    pub fn capsules(&self) -> &[Capsule] {
        &self.capsules
    }

    pub fn obstacles(&self) -> &[Aabb] {
        &self.obstacles
    }

    /// Union of all capsule and obstacle bounds.
    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    pub fn is_empty(&self) -> bool {
        self.capsules.is_empty() && self.obstacles.is_empty()
    }

    pub fn clear(&mut self) {
        self.capsules.clear();
        self.obstacles.clear();
        self.bounds = Aabb::EMPTY;
    }

    /// Add a capsule. Returns `false` when the proxy is full.
    pub fn push_capsule(&mut self, capsule: Capsule) -> bool {
        if self.capsules.len() >= self.capacity {
            warn!(capacity = self.capacity, "collision proxy full, capsule dropped");
            return false;
        }
        self.bounds = self.bounds.union(capsule.bounds());
        self.capsules.push(capsule);
        true
    }

    pub fn push_obstacle(&mut self, obstacle: Aabb) {
        self.bounds = self.bounds.union(&obstacle);
        self.obstacles.push(obstacle);
    }

    /// Replace the capsules with tapered capsules between skeleton spheres.
    ///
    /// `spheres` hold `(center, radius)`; each pair names two sphere indices.
    /// Returns the number of capsules built.
    pub fn set_skeleton(&mut self, spheres: &[Vec4], pairs: &[[u32; 2]]) -> usize {
        self.capsules.clear();
        self.bounds = self
            .obstacles
            .iter()
            .fold(Aabb::EMPTY, |acc, obstacle| acc.union(obstacle));

        let mut built = 0;
        for &[first, second] in pairs {
            let (Some(s0), Some(s1)) = (spheres.get(first as usize), spheres.get(second as usize))
            else {
                warn!(first, second, spheres = spheres.len(), "skeleton pair out of range");
                continue;
            };
            let capsule = Capsule::tapered(s0.truncate(), s1.truncate(), s0.w, s1.w);
            if !self.push_capsule(capsule) {
                break;
            }
            built += 1;
        }
        built
    }

    /// Total displacement moving a sphere at `p` out of every primitive.
    pub fn push_out(&self, p: Vec3, radius: f32) -> Vec3 {
        if self.is_empty() || !self.bounds.expand(radius).contains(p) {
            return Vec3::ZERO;
        }
        let from_capsules: Vec3 = self
            .capsules
            .iter()
            .map(|capsule| capsule.push_out(p, radius))
            .sum();
        let from_obstacles: Vec3 = self
            .obstacles
            .iter()
            .map(|obstacle| obstacle.expand(radius).push_out(p))
            .sum();
        from_capsules + from_obstacles
    }
}

impl Default for CollisionProxy {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capsule_pushes_along_normal() {
        let capsule = Capsule::new(Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), 0.5);
        let push = capsule.push_out(Vec3::new(0.2, 0.5, 0.0), 0.1);
        assert!((push - Vec3::new(0.0, 0.1, 0.0)).length() < 1e-5);
        assert_eq!(capsule.push_out(Vec3::new(0.0, 2.0, 0.0), 0.1), Vec3::ZERO);
    }

    #[test]
    fn test_tapered_capsule_radius_interpolates() {
        let capsule = Capsule::tapered(Vec3::ZERO, Vec3::new(0.0, 0.0, 2.0), 0.2, 0.6);
        // radius 0.4 at the midpoint
        let push = capsule.push_out(Vec3::new(0.3, 0.0, 1.0), 0.0);
        assert!((push.x - 0.1).abs() < 1e-5);
    }

    #[test]
    fn test_aabb_push_out_uses_shallowest_axis() {
        let obstacle = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let push = obstacle.push_out(Vec3::new(0.0, 0.9, 0.2));
        assert!((push - Vec3::new(0.0, 0.1, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_capacity_is_enforced() {
        let mut proxy = CollisionProxy::with_capacity(1);
        assert!(proxy.push_capsule(Capsule::new(Vec3::ZERO, Vec3::X, 0.1)));
        assert!(!proxy.push_capsule(Capsule::new(Vec3::ZERO, Vec3::Y, 0.1)));
        assert_eq!(proxy.capsules().len(), 1);
    }

    #[test]
    fn test_skeleton_builds_capsules_and_bounds() {
        let spheres = [
            Vec4::new(0.0, 0.0, 0.0, 0.1),
            Vec4::new(0.0, 1.0, 0.0, 0.2),
            Vec4::new(1.0, 1.0, 0.0, 0.1),
        ];
        let mut proxy = CollisionProxy::with_capacity(4);
        let built = proxy.set_skeleton(&spheres, &[[0, 1], [1, 2], [2, 7]]);
        assert_eq!(built, 2);
        assert!(proxy.bounds().contains(Vec3::new(1.05, 1.0, 0.0)));
        assert!(!proxy.bounds().contains(Vec3::new(0.0, -0.5, 0.0)));
    }
}
