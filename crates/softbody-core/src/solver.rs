use std::ops::Range;

use glam::Vec3;
use tracing::{debug, trace};

use crate::config::SimConfig;
use crate::constraints::contact::solve_particle_collisions;
use crate::constraints::distance::solve_distance_constraints;
use crate::constraints::object::solve_object_collisions;
use crate::constraints::volume::solve_volume_constraints;
use crate::constraints::{DistanceConstraint, FixedPointAccumulator, VolumeConstraint};
use crate::dispatch::{for_each_mut, select_group_dimensions, GroupDimensions};
use crate::error::SimResult;
use crate::forces::star::{attract_stars, is_captured};
use crate::forces::AccelerationField;
use crate::graph::{ComputeGraph, Pass};
use crate::grid::SpatialHash;
use crate::particle::{effective_inv_mass, ParticleSet, State};
use crate::proxy::{Attachment, CollisionProxy};

/// Per-step inputs shared by every pass.
pub struct StepInputs<'a> {
    pub dt: f32,
    pub field: &'a dyn AccelerationField,
    pub proxy: &'a CollisionProxy,
    pub attachments: &'a [Attachment],
}

#[derive(Clone, Copy, Debug)]
struct PassGroups {
    particle: GroupDimensions,
    star: GroupDimensions,
    distance: GroupDimensions,
    volume: GroupDimensions,
}

/// Everything the passes read and write.
struct Buffers {
    particles: ParticleSet,
    distance_constraints: Vec<DistanceConstraint>,
    volume_constraints: Vec<VolumeConstraint>,
    hash: SpatialHash,
    /// Disjoint per-particle corrections.
    dx: Vec<Vec3>,
    /// Shared fixed-point corrections.
    dx_e7: FixedPointAccumulator,
    groups: PassGroups,
    star_range: Range<usize>,
    gravity: f32,
    star_target: Vec3,
    star_capture_radius: f32,
    star_attraction: f32,
    absorbed: u32,
}

/// Substepped XPBD solver over a fixed particle arena.
///
/// Each step runs the broad-phase graph once (star update, attachments,
/// spatial hash), then the substep graph `substeps` times: Predict,
/// ObjectCollide, ParticleCollide, Distance, Volume, Correct.
pub struct Solver {
    buffers: Buffers,
    step_graph: ComputeGraph,
    substep_graph: ComputeGraph,
    substeps: u32,
    steps: u64,
}

impl Solver {
    pub fn new(
        particles: ParticleSet,
        distance_constraints: Vec<DistanceConstraint>,
        volume_constraints: Vec<VolumeConstraint>,
        star_range: Range<usize>,
        config: &SimConfig,
    ) -> SimResult<Self> {
        config.validate()?;
        let limits = &config.device_limits;
        let desired = Some(config.desired_group_size);
        let groups = PassGroups {
            particle: select_group_dimensions(limits, particles.count as u32, desired, 0)?,
            star: select_group_dimensions(limits, star_range.len() as u32, desired, 0)?,
            distance: select_group_dimensions(
                limits,
                distance_constraints.len() as u32,
                desired,
                0,
            )?,
            volume: select_group_dimensions(limits, volume_constraints.len() as u32, desired, 0)?,
        };

        let cell_size = 2.0 * particles.max_radius();
        let hash = SpatialHash::new(
            cell_size,
            particles.count,
            limits,
            config.desired_group_size,
        )?;
        debug!(
            particles = particles.count,
            distance = distance_constraints.len(),
            volume = volume_constraints.len(),
            cell_size,
            "solver buffers allocated"
        );

        let count = particles.count;
        Ok(Self {
            buffers: Buffers {
                particles,
                distance_constraints,
                volume_constraints,
                hash,
                dx: vec![Vec3::ZERO; count],
                dx_e7: FixedPointAccumulator::new(count),
                groups,
                star_range,
                gravity: config.gravity,
                star_target: config.star_target,
                star_capture_radius: config.star_capture_radius,
                star_attraction: config.star_attraction,
                absorbed: 0,
            },
            step_graph: ComputeGraph::step(),
            substep_graph: ComputeGraph::substep(),
            substeps: config.substeps,
            steps: 0,
        })
    }

    pub fn particles(&self) -> &ParticleSet {
        &self.buffers.particles
    }

    /// Mutable particle access between steps (state changes, teleports).
    pub fn particles_mut(&mut self) -> &mut ParticleSet {
        &mut self.buffers.particles
    }

    pub fn distance_constraints(&self) -> &[DistanceConstraint] {
        &self.buffers.distance_constraints
    }

    pub fn volume_constraints(&self) -> &[VolumeConstraint] {
        &self.buffers.volume_constraints
    }

    pub fn spatial_hash(&self) -> &SpatialHash {
        &self.buffers.hash
    }

    pub fn star_range(&self) -> Range<usize> {
        self.buffers.star_range.clone()
    }

    /// Stars absorbed so far.
    pub fn absorbed(&self) -> u32 {
        self.buffers.absorbed
    }

    /// Completed steps.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn substeps(&self) -> u32 {
        self.substeps
    }

    pub fn set_star_target(&mut self, target: Vec3) {
        self.buffers.star_target = target;
    }

    /// Advance by `dt`. Returns the total absorbed star count.
    pub fn step(&mut self, inputs: &StepInputs<'_>) -> u32 {
        if !(inputs.dt > 1.0e-9) || self.buffers.particles.is_empty() {
            return self.buffers.absorbed;
        }
        let h = inputs.dt / self.substeps as f32;

        run_graph(&self.step_graph, &mut self.buffers, inputs, inputs.dt);
        for _ in 0..self.substeps {
            run_graph(&self.substep_graph, &mut self.buffers, inputs, h);
        }

        self.steps += 1;
        self.buffers.absorbed
    }
}

fn run_graph(graph: &ComputeGraph, buffers: &mut Buffers, inputs: &StepInputs<'_>, h: f32) {
    for (stage, decls) in graph.stages().enumerate() {
        for decl in decls {
            buffers.run(decl.pass, inputs, h);
        }
        trace!(stage, passes = decls.len(), "barrier");
    }
}

impl Buffers {
    fn run(&mut self, pass: Pass, inputs: &StepInputs<'_>, h: f32) {
        match pass {
            Pass::StarUpdate => self.star_update(h),
            Pass::Attach => self.attach(inputs.attachments),
            Pass::Hash => self.hash_predictions(inputs.field, h),
            Pass::Sort => self.hash.sort(),
            Pass::Collect => self.hash.collect(),
            Pass::Predict => self.predict(inputs.field, h),
            Pass::ObjectCollide => solve_object_collisions(
                &self.particles,
                inputs.proxy,
                &mut self.dx,
                self.groups.particle,
            ),
            Pass::ParticleCollide => solve_particle_collisions(
                &self.particles,
                &self.hash,
                &mut self.dx,
                self.groups.particle,
            ),
            Pass::Distance => solve_distance_constraints(
                &self.distance_constraints,
                &self.particles,
                &self.dx_e7,
                h,
                self.groups.distance,
            ),
            Pass::Volume => solve_volume_constraints(
                &self.volume_constraints,
                &self.particles,
                &self.dx_e7,
                h,
                self.groups.volume,
            ),
            Pass::Correct => self.correct(h),
        }
    }

    fn star_update(&mut self, dt: f32) {
        if self.star_range.is_empty() {
            return;
        }
        attract_stars(
            &mut self.particles,
            self.star_range.clone(),
            self.star_target,
            self.star_attraction,
            dt,
            self.groups.star,
        );
    }

    fn attach(&mut self, attachments: &[Attachment]) {
        for attachment in attachments {
            let i = attachment.particle as usize;
            if i < self.particles.count {
                self.particles.position[i] = attachment.target;
                self.particles.predicted[i] = attachment.target;
            }
        }
    }

    /// Hash the whole-step position estimate into the spatial index.
    fn hash_predictions(&mut self, field: &dyn AccelerationField, dt: f32) {
        self.predict(field, dt);
        self.hash.hash(&self.particles.predicted);
    }

    /// `x_ = x + h v + h^2 g dir(x)` for particles that can move, `x_ = x` when
    /// the effective inverse mass is zero.
    fn predict(&mut self, field: &dyn AccelerationField, h: f32) {
        let gravity = self.gravity;
        let ParticleSet {
            position,
            predicted,
            velocity,
            state,
            inv_mass,
            ..
        } = &mut self.particles;
        let (position, velocity, state, inv_mass) = (&*position, &*velocity, &*state, &*inv_mass);
        for_each_mut(predicted, self.groups.particle, |i, x_| {
            let x = position[i];
            *x_ = if effective_inv_mass(state[i], inv_mass[i]) > 0.0 {
                x + h * velocity[i] + (h * h * gravity) * field.direction(x)
            } else {
                x
            };
        });
    }

    /// Apply both correction buffers, derive velocities, absorb captured stars.
    fn correct(&mut self, h: f32) {
        let group = self.groups.particle;
        let dx = &self.dx;
        let dx_e7 = &self.dx_e7;
        for_each_mut(&mut self.particles.predicted, group, |i, x_| {
            *x_ += dx[i] + dx_e7.get(i);
        });

        let inv_h = 1.0 / h;
        let ParticleSet {
            position,
            predicted,
            velocity,
            ..
        } = &mut self.particles;
        let (position_ref, predicted_ref) = (&*position, &*predicted);
        for_each_mut(velocity, group, |i, v| {
            *v = (predicted_ref[i] - position_ref[i]) * inv_h;
        });
        position.copy_from_slice(predicted);

        for_each_mut(&mut self.dx, group, |_, slot| *slot = Vec3::ZERO);
        self.dx_e7.clear();

        for i in self.star_range.clone() {
            if self.particles.state[i] == State::Star
                && is_captured(
                    self.particles.position[i],
                    self.star_target,
                    self.star_capture_radius,
                )
            {
                self.particles.set_state(i, State::Static);
                self.particles.velocity[i] = Vec3::ZERO;
                self.absorbed += 1;
            }
        }
    }
}
