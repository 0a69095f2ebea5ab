use glam::Vec3;

use crate::dispatch::{for_each_mut, GroupDimensions};
use crate::grid::SpatialHash;
use crate::particle::ParticleSet;

/// Particle-particle collision pass.
///
/// Each particle walks its neighbors through the spatial hash and adds its own
/// share of every overlap correction to its own `dx` slot:
/// `w_i / (w_i + w_j) * (r_i + r_j - |x_i - x_j|) * n`.
/// Writes are disjoint, so the pass needs no atomics; the pair's two halves
/// come from the two particles' own work items.
pub fn solve_particle_collisions(
    particles: &ParticleSet,
    hash: &SpatialHash,
    dx: &mut [Vec3],
    group: GroupDimensions,
) {
    for_each_mut(dx, group, |i, slot| {
        let w_i = particles.effective_inv_mass(i);
        if w_i <= 0.0 {
            return;
        }
        let x_i = particles.predicted[i];
        let r_i = particles.radius[i];

        let mut correction = Vec3::ZERO;
        hash.for_each_neighbor(i, |j| {
            let j = j as usize;
            if j == i {
                return;
            }
            let w_sum = w_i + particles.effective_inv_mass(j);
            if w_sum < 1e-9 {
                return;
            }
            let diff = x_i - particles.predicted[j];
            let dist = diff.length();
            let overlap = r_i + particles.radius[j] - dist;
            if overlap <= 0.0 || dist < 1e-9 {
                return;
            }
            correction += diff / dist * (overlap * w_i / w_sum);
        });
        *slot += correction;
    });
}
