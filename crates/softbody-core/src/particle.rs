use glam::Vec3;

/// State decides how a particle takes part in the solver passes.
#[repr(u32)]
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum State {
    /// Integrated and constrained normally.
    #[default]
    Free = 0,
    /// Kinematic, driven by attachment targets; infinitely heavy in every pass.
    Player = 1,
    /// Attracted toward the star target until absorbed.
    Star = 2,
    /// Immovable, `w == 0`.
    Static = 3,
}

impl State {
    /// Whether the state is integrated; a zero inverse mass still pins the particle.
    #[inline]
    pub fn is_dynamic(self) -> bool {
        matches!(self, State::Free | State::Star)
    }
}

/// Render-side view of one particle: position plus radius in the pad slot.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RenderParticle {
    pub position: [f32; 3],
    pub radius: f32,
}

/// SoA particle storage. Index is the particle's permanent identity.
#[derive(Clone, Debug, Default)]
pub struct ParticleSet {
    pub count: usize,
    /// Position at the end of the last substep.
    pub position: Vec<Vec3>,
    /// Predicted position within the current substep.
    pub predicted: Vec<Vec3>,
    pub velocity: Vec<Vec3>,
    pub radius: Vec<f32>,
    /// Inverse mass; 0 for immovable particles.
    pub inv_mass: Vec<f32>,
    pub state: Vec<State>,
}

impl ParticleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve room for `additional` particles.
    pub fn reserve(&mut self, additional: usize) {
        self.position.reserve(additional);
        self.predicted.reserve(additional);
        self.velocity.reserve(additional);
        self.radius.reserve(additional);
        self.inv_mass.reserve(additional);
        self.state.reserve(additional);
    }

    /// Append a particle and return its index.
    ///
    /// STATIC particles always get `w = 0`.
    pub fn push(&mut self, position: Vec3, velocity: Vec3, radius: f32, inv_mass: f32, state: State) -> u32 {
        let index = self.count as u32;
        self.position.push(position);
        self.predicted.push(position);
        self.velocity.push(velocity);
        self.radius.push(radius);
        self.inv_mass.push(if state == State::Static { 0.0 } else { inv_mass });
        self.state.push(state);
        self.count += 1;
        index
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Inverse mass as seen by the constraint and collision passes.
    #[inline]
    pub fn effective_inv_mass(&self, i: usize) -> f32 {
        effective_inv_mass(self.state[i], self.inv_mass[i])
    }

    /// Change a particle's state, keeping `w == 0` for STATIC.
    pub fn set_state(&mut self, i: usize, state: State) {
        self.state[i] = state;
        if state == State::Static {
            self.inv_mass[i] = 0.0;
        }
    }

    /// Largest finite particle radius, 0 when there is none.
    pub fn max_radius(&self) -> f32 {
        self.radius
            .iter()
            .copied()
            .filter(|r| r.is_finite())
            .fold(0.0, f32::max)
    }

    /// Copy positions and radii into `out` for the renderer.
    pub fn write_render(&self, out: &mut Vec<RenderParticle>) {
        out.clear();
        out.extend(
            self.position
                .iter()
                .zip(&self.radius)
                .map(|(p, &r)| RenderParticle {
                    position: p.to_array(),
                    radius: r,
                }),
        );
    }
}

/// Inverse mass of a particle in `state`; kinematic and static particles are infinitely heavy.
#[inline]
pub fn effective_inv_mass(state: State, inv_mass: f32) -> f32 {
    match state {
        State::Free | State::Star => inv_mass,
        State::Player | State::Static => 0.0,
    }
}
