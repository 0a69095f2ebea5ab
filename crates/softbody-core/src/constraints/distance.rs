use crate::constraints::accum::FixedPointAccumulator;
use crate::dispatch::{for_each_index, GroupDimensions};
use crate::particle::ParticleSet;

/// XPBD distance constraint between two particles.
///
/// Generated for every unique mesh edge and, on triangle meshes, for every
/// pair of apices sharing an edge (bending).
///
/// Reference: "XPBD: Position-Based Simulation of Compliant Constrained Dynamics",
/// Macklin et al., 2016
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DistanceConstraint {
    /// Particle index A.
    pub i: u32,
    /// Particle index B.
    pub j: u32,
    /// Rest length.
    pub rest_length: f32,
    /// Compliance (inverse stiffness). 0 is inextensible.
    pub compliance: f32,
}

impl DistanceConstraint {
    /// Create a new distance constraint between particles `i` and `j`.
    pub fn new(i: u32, j: u32, rest_length: f32, compliance: f32) -> Self {
        Self {
            i,
            j,
            rest_length,
            compliance,
        }
    }
}

/// Solve all distance constraints once using XPBD.
///
/// For each constraint:
/// 1. `C = |p_i - p_j| - rest_length`
/// 2. `alpha_tilde = compliance / dt^2`
/// 3. `delta_lambda = -C / (w_i + w_j + alpha_tilde)`
/// 4. Corrections along the edge, weighted by inverse mass
///
/// Corrections go to the fixed-point accumulator because constraints sharing
/// a particle run concurrently.
pub fn solve_distance_constraints(
    constraints: &[DistanceConstraint],
    particles: &ParticleSet,
    corrections: &FixedPointAccumulator,
    dt: f32,
    group: GroupDimensions,
) {
    let alpha_scale = 1.0 / (dt * dt);

    for_each_index(constraints.len(), group, |index| {
        let c = &constraints[index];
        let i = c.i as usize;
        let j = c.j as usize;

        let w_i = particles.effective_inv_mass(i);
        let w_j = particles.effective_inv_mass(j);
        let alpha_tilde = c.compliance * alpha_scale;
        let denominator = w_i + w_j + alpha_tilde;
        if w_i + w_j < 1e-9 || denominator < 1e-9 {
            return;
        }

        let diff = particles.predicted[i] - particles.predicted[j];
        let dist = diff.length();
        if dist < 1e-9 {
            return;
        }

        let delta_lambda = (c.rest_length - dist) / denominator;
        let correction = diff / dist * delta_lambda;
        if w_i > 0.0 {
            corrections.add(i, correction * w_i);
        }
        if w_j > 0.0 {
            corrections.add(j, -correction * w_j);
        }
    });
}
