use glam::Vec3;
use softbody_core::constraints::contact::solve_particle_collisions;
use softbody_core::constraints::distance::solve_distance_constraints;
use softbody_core::constraints::volume::solve_volume_constraints;
use softbody_core::constraints::{DistanceConstraint, FixedPointAccumulator, VolumeConstraint};
use softbody_core::dispatch::{DeviceLimits, GroupDimensions};
use softbody_core::grid::SpatialHash;
use softbody_core::math::signed_volume;
use softbody_core::particle::{ParticleSet, State};

const GROUP: GroupDimensions = GroupDimensions { size: 4, count: 1 };

fn apply(particles: &mut ParticleSet, acc: &mut FixedPointAccumulator) {
    for i in 0..particles.count {
        particles.predicted[i] += acc.get(i);
    }
    acc.clear();
}

#[test]
fn test_distance_pulls_stretched_pair_to_rest() {
    let mut particles = ParticleSet::new();
    particles.push(Vec3::ZERO, Vec3::ZERO, 0.1, 1.0, State::Free);
    particles.push(Vec3::new(1.5, 0.0, 0.0), Vec3::ZERO, 0.1, 1.0, State::Free);
    let constraints = [DistanceConstraint::new(0, 1, 1.0, 0.0)];
    let mut acc = FixedPointAccumulator::new(2);

    solve_distance_constraints(&constraints, &particles, &acc, 1.0 / 60.0, GROUP);
    apply(&mut particles, &mut acc);

    let dist = particles.predicted[0].distance(particles.predicted[1]);
    assert!((dist - 1.0).abs() < 1e-5, "dist after projection: {}", dist);
    assert!((particles.predicted[0].x - 0.25).abs() < 1e-5);
}

#[test]
fn test_distance_respects_compliance() {
    let mut particles = ParticleSet::new();
    particles.push(Vec3::ZERO, Vec3::ZERO, 0.1, 1.0, State::Free);
    particles.push(Vec3::new(2.0, 0.0, 0.0), Vec3::ZERO, 0.1, 1.0, State::Free);
    let dt = 0.1;
    // alpha / dt^2 == 2 == w_i + w_j, so half of the error is corrected
    let constraints = [DistanceConstraint::new(0, 1, 1.0, 0.02)];
    let mut acc = FixedPointAccumulator::new(2);

    solve_distance_constraints(&constraints, &particles, &acc, dt, GROUP);
    apply(&mut particles, &mut acc);

    let dist = particles.predicted[0].distance(particles.predicted[1]);
    assert!((dist - 1.5).abs() < 1e-5, "soft constraint dist: {}", dist);
}

#[test]
fn test_distance_static_endpoint_does_not_move() {
    let mut particles = ParticleSet::new();
    particles.push(Vec3::ZERO, Vec3::ZERO, 0.1, 1.0, State::Static);
    particles.push(Vec3::new(0.0, -2.0, 0.0), Vec3::ZERO, 0.1, 1.0, State::Free);
    let constraints = [DistanceConstraint::new(0, 1, 1.0, 0.0)];
    let mut acc = FixedPointAccumulator::new(2);

    solve_distance_constraints(&constraints, &particles, &acc, 1.0 / 60.0, GROUP);
    apply(&mut particles, &mut acc);

    assert_eq!(particles.predicted[0], Vec3::ZERO);
    assert!((particles.predicted[1].y + 1.0).abs() < 1e-5);
}

#[test]
fn test_distance_skips_coincident_particles() {
    let mut particles = ParticleSet::new();
    particles.push(Vec3::ONE, Vec3::ZERO, 0.1, 1.0, State::Free);
    particles.push(Vec3::ONE, Vec3::ZERO, 0.1, 1.0, State::Free);
    let constraints = [DistanceConstraint::new(0, 1, 1.0, 0.0)];
    let acc = FixedPointAccumulator::new(2);

    solve_distance_constraints(&constraints, &particles, &acc, 1.0 / 60.0, GROUP);

    assert_eq!(acc.get(0), Vec3::ZERO);
    assert_eq!(acc.get(1), Vec3::ZERO);
}

#[test]
fn test_volume_restores_squashed_tetrahedron() {
    let rest = [Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z];
    let rest_volume = signed_volume(rest[0], rest[1], rest[2], rest[3]);
    let mut particles = ParticleSet::new();
    for (n, &x) in rest.iter().enumerate() {
        let squashed = if n == 3 { x * 0.5 } else { x };
        particles.push(squashed, Vec3::ZERO, 0.1, 1.0, State::Free);
    }
    let constraints = [VolumeConstraint::new([0, 1, 2, 3], rest_volume, 0.0)];
    let mut acc = FixedPointAccumulator::new(4);

    for _ in 0..10 {
        solve_volume_constraints(&constraints, &particles, &acc, 1.0 / 60.0, GROUP);
        apply(&mut particles, &mut acc);
    }

    let x = &particles.predicted;
    let volume = signed_volume(x[0], x[1], x[2], x[3]);
    assert!(
        (volume - rest_volume).abs() < 1e-4,
        "volume {} vs rest {}",
        volume,
        rest_volume
    );
}

#[test]
fn test_collision_each_moves_half_overlap() {
    let mut particles = ParticleSet::new();
    particles.push(Vec3::ZERO, Vec3::ZERO, 0.5, 1.0, State::Free);
    particles.push(Vec3::new(0.0, 0.0, 0.8), Vec3::ZERO, 0.5, 1.0, State::Free);
    let mut hash = SpatialHash::new(1.0, 2, &DeviceLimits::default(), 64).unwrap();
    hash.build(&particles.predicted);

    let mut dx = vec![Vec3::ZERO; 2];
    solve_particle_collisions(&particles, &hash, &mut dx, GROUP);

    assert!((dx[0] - Vec3::new(0.0, 0.0, -0.1)).length() < 1e-6);
    assert!((dx[1] - Vec3::new(0.0, 0.0, 0.1)).length() < 1e-6);
}

#[test]
fn test_collision_ignores_separated_particles() {
    let mut particles = ParticleSet::new();
    particles.push(Vec3::ZERO, Vec3::ZERO, 0.1, 1.0, State::Free);
    particles.push(Vec3::new(0.5, 0.0, 0.0), Vec3::ZERO, 0.1, 1.0, State::Free);
    let mut hash = SpatialHash::new(0.2, 2, &DeviceLimits::default(), 64).unwrap();
    hash.build(&particles.predicted);

    let mut dx = vec![Vec3::ZERO; 2];
    solve_particle_collisions(&particles, &hash, &mut dx, GROUP);

    assert_eq!(dx, vec![Vec3::ZERO; 2]);
}

#[test]
fn test_fixed_point_sum_is_order_independent_under_contention() {
    let count = 64;
    let mut particles = ParticleSet::new();
    particles.push(Vec3::ZERO, Vec3::ZERO, 0.1, 1.0, State::Free);
    for n in 0..count {
        let angle = n as f32 / count as f32 * std::f32::consts::TAU;
        particles.push(
            Vec3::new(angle.cos(), angle.sin(), 0.3) * 1.7,
            Vec3::ZERO,
            0.1,
            1.0,
            State::Free,
        );
    }
    let constraints: Vec<DistanceConstraint> = (1..=count as u32)
        .map(|j| DistanceConstraint::new(0, j, 1.0, 1e-4))
        .collect();

    let reference = FixedPointAccumulator::new(count + 1);
    let wide = GroupDimensions { size: 1024, count: 1 };
    solve_distance_constraints(&constraints, &particles, &reference, 1.0 / 60.0, wide);
    let narrow = GroupDimensions { size: 1, count: 64 };
    for _ in 0..5 {
        let acc = FixedPointAccumulator::new(count + 1);
        solve_distance_constraints(&constraints, &particles, &acc, 1.0 / 60.0, narrow);
        assert_eq!(acc.get(0), reference.get(0), "hub correction must be bit-identical");
    }
}
