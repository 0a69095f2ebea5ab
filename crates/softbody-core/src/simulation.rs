use std::collections::HashMap;
use std::ops::Range;

use glam::{Mat4, Vec3};
use rand::Rng;
use tracing::info;

use crate::config::SimConfig;
use crate::constraints::{DistanceConstraint, VolumeConstraint};
use crate::error::{SimError, SimResult};
use crate::forces::star::{spawn_star_shell, StarShell, STAR_INV_MASS};
use crate::forces::AccelerationField;
use crate::mesh::{
    embed_vertices, load_mesh, EmbeddingRecord, MeshData, MeshKind, MeshLoadParams, MeshSpec,
};
use crate::particle::{ParticleSet, RenderParticle, State};
use crate::proxy::{Attachment, CollisionProxy};
use crate::solver::{Solver, StepInputs};

/// Outcome of one simulation step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Number of completed steps, this one included.
    pub step: u64,
    /// Stars absorbed so far.
    pub absorbed: u32,
}

fn find_mesh<'a>(meshes: &'a HashMap<String, MeshData>, name: &str) -> SimResult<&'a MeshData> {
    meshes
        .get(name)
        .ok_or_else(|| SimError::UnknownMesh(name.to_string()))
}

/// Collects particles, meshes and constraints into one arena.
///
/// Star particles, if any, must be added first so that mesh particles follow
/// them contiguously.
pub struct SimulationBuilder {
    config: SimConfig,
    particles: ParticleSet,
    distance_constraints: Vec<DistanceConstraint>,
    volume_constraints: Vec<VolumeConstraint>,
    meshes: HashMap<String, MeshData>,
    star_range: Range<usize>,
}

impl SimulationBuilder {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            particles: ParticleSet::new(),
            distance_constraints: Vec::new(),
            volume_constraints: Vec::new(),
            meshes: HashMap::new(),
            star_range: 0..0,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn particles(&self) -> &ParticleSet {
        &self.particles
    }

    /// Spawn dormant star particles on a sphere shell.
    pub fn add_star_particles<R: Rng + ?Sized>(
        &mut self,
        shell: &StarShell,
        rng: &mut R,
    ) -> SimResult<Range<u32>> {
        if !self.particles.is_empty() {
            return Err(SimError::InvalidConfig(
                "star particles must be added before any other particle".into(),
            ));
        }
        let range = spawn_star_shell(&mut self.particles, shell, rng);
        self.star_range = range.start as usize..range.end as usize;
        Ok(range)
    }

    /// Load a mesh into the arena under `name`.
    pub fn load_mesh(
        &mut self,
        name: &str,
        spec: &MeshSpec,
        params: &MeshLoadParams,
    ) -> SimResult<MeshKind> {
        if self.meshes.contains_key(name) {
            return Err(SimError::DuplicateMesh(name.to_string()));
        }
        let data = load_mesh(
            name,
            spec,
            params,
            &mut self.particles,
            &mut self.distance_constraints,
            &mut self.volume_constraints,
        )?;
        let kind = data.kind;
        self.meshes.insert(name.to_string(), data);
        Ok(kind)
    }

    /// Add a loose particle and return its index.
    pub fn add_particle(
        &mut self,
        position: Vec3,
        velocity: Vec3,
        radius: f32,
        inv_mass: f32,
        state: State,
    ) -> u32 {
        self.particles.push(position, velocity, radius, inv_mass, state)
    }

    pub fn add_distance_constraint(&mut self, constraint: DistanceConstraint) {
        self.distance_constraints.push(constraint);
    }

    pub fn add_volume_constraint(&mut self, constraint: VolumeConstraint) {
        self.volume_constraints.push(constraint);
    }

    pub fn mesh(&self, name: &str) -> SimResult<&MeshData> {
        find_mesh(&self.meshes, name)
    }

    /// Embed visual vertices into a loaded mesh; see [`embed_vertices`].
    pub fn embed(
        &self,
        name: &str,
        positions: &[Vec3],
        transform: Option<Mat4>,
    ) -> SimResult<Vec<EmbeddingRecord>> {
        embed_vertices(
            self.mesh(name)?,
            positions,
            transform,
            self.star_range.end as u32,
        )
    }

    /// Validate constraint indices and allocate the solver.
    pub fn build(self) -> SimResult<Simulation> {
        let count = self.particles.count as u32;
        let out_of_range = self
            .distance_constraints
            .iter()
            .flat_map(|c| [c.i, c.j])
            .chain(self.volume_constraints.iter().flat_map(|c| [c.i, c.j, c.k, c.l]))
            .find(|&index| index >= count);
        if let Some(index) = out_of_range {
            return Err(SimError::InvalidConfig(format!(
                "constraint references particle {index} of {count}"
            )));
        }

        info!(
            particles = count,
            stars = self.star_range.len(),
            meshes = self.meshes.len(),
            distance = self.distance_constraints.len(),
            volume = self.volume_constraints.len(),
            "building simulation"
        );
        let solver = Solver::new(
            self.particles,
            self.distance_constraints,
            self.volume_constraints,
            self.star_range,
            &self.config,
        )?;
        Ok(Simulation {
            solver,
            meshes: self.meshes,
            frame_count: self.config.frame_count,
        })
    }
}

/// A built simulation: the solver plus the mesh registry.
pub struct Simulation {
    solver: Solver,
    meshes: HashMap<String, MeshData>,
    frame_count: usize,
}

impl Simulation {
    pub fn builder(config: SimConfig) -> SimulationBuilder {
        SimulationBuilder::new(config)
    }

    /// Advance one step of `dt` seconds.
    pub fn step<F: AccelerationField>(
        &mut self,
        dt: f32,
        field: &F,
        proxy: &CollisionProxy,
        attachments: &[Attachment],
    ) -> StepReport {
        let absorbed = self.solver.step(&StepInputs {
            dt,
            field,
            proxy,
            attachments,
        });
        StepReport {
            step: self.solver.steps(),
            absorbed,
        }
    }

    pub fn particles(&self) -> &ParticleSet {
        self.solver.particles()
    }

    pub fn particles_mut(&mut self) -> &mut ParticleSet {
        self.solver.particles_mut()
    }

    pub fn solver(&self) -> &Solver {
        &self.solver
    }

    pub fn steps(&self) -> u64 {
        self.solver.steps()
    }

    pub fn absorbed(&self) -> u32 {
        self.solver.absorbed()
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn star_range(&self) -> Range<usize> {
        self.solver.star_range()
    }

    /// Release dormant (STATIC) stars as FREE particles.
    pub fn activate_stars(&mut self) {
        self.switch_stars(State::Static, State::Free);
    }

    /// Turn FREE stars into STAR particles, pulled toward the star target
    /// until absorbed.
    pub fn attract_stars(&mut self) {
        self.switch_stars(State::Free, State::Star);
    }

    pub fn set_star_target(&mut self, target: Vec3) {
        self.solver.set_star_target(target);
    }

    fn switch_stars(&mut self, from: State, to: State) {
        let range = self.star_range();
        let particles = self.solver.particles_mut();
        for i in range {
            if particles.state[i] != from {
                continue;
            }
            particles.set_state(i, to);
            if to.is_dynamic() {
                particles.inv_mass[i] = STAR_INV_MASS;
            }
        }
    }

    pub fn mesh(&self, name: &str) -> SimResult<&MeshData> {
        find_mesh(&self.meshes, name)
    }

    /// Particle index range of a loaded mesh.
    pub fn mesh_range(&self, name: &str) -> SimResult<Range<u32>> {
        Ok(self.mesh(name)?.particles.clone())
    }

    pub fn meshes(&self) -> impl Iterator<Item = &MeshData> {
        self.meshes.values()
    }

    /// Embed visual vertices into a loaded mesh's rest configuration.
    pub fn embed(
        &self,
        name: &str,
        positions: &[Vec3],
        transform: Option<Mat4>,
    ) -> SimResult<Vec<EmbeddingRecord>> {
        embed_vertices(
            self.mesh(name)?,
            positions,
            transform,
            self.star_range().end as u32,
        )
    }

    /// Attachment pinning the particle of a mesh node tag to `target`.
    pub fn attachment(&self, name: &str, tag: u64, target: Vec3) -> SimResult<Attachment> {
        let particle = self
            .mesh(name)?
            .particle_of_tag(tag)
            .ok_or_else(|| SimError::UnknownNodeTag {
                mesh: name.to_string(),
                tag,
            })?;
        Ok(Attachment { particle, target })
    }

    /// Make `particle` kinematic and return the state it had, for [`Simulation::release`].
    pub fn pin(&mut self, particle: u32) -> State {
        let particles = self.solver.particles_mut();
        let previous = particles.state[particle as usize];
        particles.set_state(particle as usize, State::Player);
        previous
    }

    /// Hand a pinned particle back in the state [`Simulation::pin`] returned.
    pub fn release(&mut self, particle: u32, previous: State) {
        self.solver
            .particles_mut()
            .set_state(particle as usize, previous);
    }

    pub fn write_render(&self, out: &mut Vec<RenderParticle>) {
        self.particles().write_render(out);
    }
}
