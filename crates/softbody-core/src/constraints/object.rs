use glam::Vec3;

use crate::dispatch::{for_each_mut, GroupDimensions};
use crate::particle::ParticleSet;
use crate::proxy::CollisionProxy;

/// Project predicted positions out of the proxy's capsules and boxes.
///
/// Primitives are infinitely heavy, so a dynamic particle takes the whole
/// correction and an immovable one takes none. Overwrites `dx`, which makes
/// this pass the clear of the per-particle correction buffer for the substep.
pub fn solve_object_collisions(
    particles: &ParticleSet,
    proxy: &CollisionProxy,
    dx: &mut [Vec3],
    group: GroupDimensions,
) {
    if proxy.is_empty() {
        for_each_mut(dx, group, |_, slot| *slot = Vec3::ZERO);
        return;
    }
    for_each_mut(dx, group, |i, slot| {
        *slot = if particles.effective_inv_mass(i) > 0.0 {
            proxy.push_out(particles.predicted[i], particles.radius[i])
        } else {
            Vec3::ZERO
        };
    });
}
