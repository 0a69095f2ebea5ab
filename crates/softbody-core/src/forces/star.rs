use std::ops::Range;

use glam::Vec3;
use rand::Rng;

use crate::dispatch::{for_each_mut, GroupDimensions};
use crate::particle::{ParticleSet, State};

/// Inverse mass of star particles.
pub const STAR_INV_MASS: f32 = 0.001;

/// Sphere shell the star particles are spawned on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StarShell {
    pub count: usize,
    /// Collision radius of each star particle.
    pub radius: f32,
    /// Distance of the spawn positions from `center`.
    pub shell_radius: f32,
    pub center: Vec3,
    /// Initial speed, pointing into the shell.
    pub speed: f32,
}

impl Default for StarShell {
    fn default() -> Self {
        Self {
            count: 0,
            radius: 0.05,
            shell_radius: 25.0,
            center: Vec3::ZERO,
            speed: 3.0,
        }
    }
}

/// Uniformly distributed unit vector.
pub fn random_unit<R: Rng + ?Sized>(rng: &mut R) -> Vec3 {
    loop {
        let v = Vec3::new(
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
            rng.gen_range(-1.0..=1.0),
        );
        let length_squared = v.length_squared();
        if length_squared > 1e-10 && length_squared <= 1.0 {
            return v / length_squared.sqrt();
        }
    }
}

/// Append dormant (STATIC, `w = 0`) star particles on `shell` and return their
/// index range. Activation gives them [`STAR_INV_MASS`].
///
/// Velocities are random unit directions pointing into the shell, scaled by
/// `shell.speed`; they take effect once the stars are activated.
pub fn spawn_star_shell<R: Rng + ?Sized>(
    particles: &mut ParticleSet,
    shell: &StarShell,
    rng: &mut R,
) -> Range<u32> {
    let start = particles.count as u32;
    particles.reserve(shell.count);
    for _ in 0..shell.count {
        let outward = random_unit(rng);
        let inward = loop {
            let v = random_unit(rng);
            if outward.dot(v) < 0.0 {
                break v;
            }
        };
        particles.push(
            shell.center + outward * shell.shell_radius,
            inward * shell.speed,
            shell.radius,
            0.0,
            State::Static,
        );
    }
    start..particles.count as u32
}

/// Accelerate STAR particles in `range` toward `target`.
pub fn attract_stars(
    particles: &mut ParticleSet,
    range: Range<usize>,
    target: Vec3,
    attraction: f32,
    dt: f32,
    group: GroupDimensions,
) {
    let start = range.start;
    let state = &particles.state;
    let position = &particles.position;
    for_each_mut(&mut particles.velocity[range], group, |k, v| {
        let i = start + k;
        if state[i] == State::Star {
            *v += (target - position[i]).normalize_or_zero() * (attraction * dt);
        }
    });
}

/// Whether a STAR particle at `x` is absorbed by the target.
#[inline]
pub fn is_captured(x: Vec3, target: Vec3, capture_radius: f32) -> bool {
    x.distance_squared(target) <= capture_radius * capture_radius
}
