use glam::Vec3;

use crate::constraints::accum::FixedPointAccumulator;
use crate::dispatch::{for_each_index, GroupDimensions};
use crate::math::signed_volume;
use crate::particle::ParticleSet;

const SIXTH: f32 = 1.0 / 6.0;

/// XPBD volume constraint keeping a tetrahedron at its rest signed volume.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VolumeConstraint {
    pub i: u32,
    pub j: u32,
    pub k: u32,
    pub l: u32,
    /// Rest signed volume.
    pub rest_volume: f32,
    /// Compliance (inverse stiffness).
    pub compliance: f32,
}

impl VolumeConstraint {
    pub fn new(indices: [u32; 4], rest_volume: f32, compliance: f32) -> Self {
        let [i, j, k, l] = indices;
        Self {
            i,
            j,
            k,
            l,
            rest_volume,
            compliance,
        }
    }

    #[inline]
    pub fn indices(&self) -> [usize; 4] {
        [self.i as usize, self.j as usize, self.k as usize, self.l as usize]
    }
}

/// Gradients of the signed volume with respect to the four corners.
#[inline]
pub fn volume_gradients(x_i: Vec3, x_j: Vec3, x_k: Vec3, x_l: Vec3) -> [Vec3; 4] {
    let e_j = x_j - x_i;
    let e_k = x_k - x_i;
    let e_l = x_l - x_i;
    let g_j = SIXTH * e_k.cross(e_l);
    let g_k = SIXTH * e_l.cross(e_j);
    let g_l = SIXTH * e_j.cross(e_k);
    [-(g_j + g_k + g_l), g_j, g_k, g_l]
}

/// Solve all volume constraints once using XPBD.
///
/// `delta_lambda = -(V - V_rest) / (sum_a w_a |grad_a|^2 + compliance / dt^2)`,
/// each corner moving by `w_a * delta_lambda * grad_a`. Corrections go to the
/// fixed-point accumulator.
pub fn solve_volume_constraints(
    constraints: &[VolumeConstraint],
    particles: &ParticleSet,
    corrections: &FixedPointAccumulator,
    dt: f32,
    group: GroupDimensions,
) {
    let alpha_scale = 1.0 / (dt * dt);

    for_each_index(constraints.len(), group, |index| {
        let c = &constraints[index];
        let ids = c.indices();
        let x = ids.map(|a| particles.predicted[a]);
        let w = ids.map(|a| particles.effective_inv_mass(a));

        let grads = volume_gradients(x[0], x[1], x[2], x[3]);
        let weighted: f32 = grads
            .iter()
            .zip(w)
            .map(|(g, w_a)| w_a * g.length_squared())
            .sum();
        let denominator = weighted + c.compliance * alpha_scale;
        if weighted < 1e-12 || denominator < 1e-9 {
            return;
        }

        let volume = signed_volume(x[0], x[1], x[2], x[3]);
        let delta_lambda = -(volume - c.rest_volume) / denominator;
        for ((a, g), w_a) in ids.into_iter().zip(grads).zip(w) {
            if w_a > 0.0 {
                corrections.add(a, g * (w_a * delta_lambda));
            }
        }
    });
}
