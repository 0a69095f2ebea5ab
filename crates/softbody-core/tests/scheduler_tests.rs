use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use glam::Vec3;
use softbody_core::forces::Uniform;
use softbody_core::particle::State;
use softbody_core::proxy::CollisionProxy;
use softbody_core::scheduler::SimulationScheduler;
use softbody_core::{SimConfig, Simulation, SimulationBuilder};

const DT: f32 = 1.0 / 60.0;

fn falling_pair(frame_count: usize) -> Simulation {
    let mut builder = SimulationBuilder::new(SimConfig {
        frame_count,
        ..SimConfig::default()
    });
    builder.add_particle(Vec3::ZERO, Vec3::ZERO, 0.1, 1.0, State::Free);
    builder.add_particle(Vec3::new(1.0, 0.0, 0.0), Vec3::ZERO, 0.1, 1.0, State::Static);
    builder.build().unwrap()
}

fn step(scheduler: &mut SimulationScheduler) -> u64 {
    scheduler
        .step(DT, &Uniform(Vec3::Y), &CollisionProxy::empty(), &[])
        .step
}

#[test]
fn test_frames_carry_step_and_particles() {
    let mut scheduler = SimulationScheduler::new(falling_pair(2));
    let reader = scheduler.reader();
    assert!(reader.latest().is_none());

    assert_eq!(step(&mut scheduler), 1);
    {
        let frame = reader.latest().expect("frame 1");
        assert_eq!(frame.step, 1);
        assert_eq!(frame.particles.len(), 2);
        assert!(frame.particles[0].position[1] < 0.0);
        assert_eq!(frame.particles[1].position, [1.0, 0.0, 0.0]);
        assert_eq!(frame.particles[1].radius, 0.1);
    }
    // dropping the guard released step 1
    assert!(reader.try_acquire(1).is_none());
    assert_eq!(reader.completed(), 1);
}

#[test]
fn test_latest_releases_everything_before_it() {
    let mut scheduler = SimulationScheduler::new(falling_pair(2));
    let reader = scheduler.reader();

    step(&mut scheduler);
    step(&mut scheduler);
    let guard = reader.latest().expect("frame 2");
    assert_eq!(guard.step, 2);
    drop(guard);

    // two more steps fit without blocking
    step(&mut scheduler);
    step(&mut scheduler);
    assert!(reader.try_acquire(2).is_none());
    assert_eq!(reader.try_acquire(4).map(|frame| frame.step), Some(4));
    assert!(reader.try_acquire(5).is_none());
}

#[test]
fn test_released_step_is_unavailable() {
    let mut scheduler = SimulationScheduler::new(falling_pair(3));
    let reader = scheduler.reader();
    step(&mut scheduler);
    step(&mut scheduler);

    reader.release(1);
    assert!(reader.acquire(1).is_none());
    assert_eq!(reader.acquire(2).map(|frame| frame.step), Some(2));
}

#[test]
fn test_simulation_stays_within_frame_count_of_consumer() {
    const FRAMES: usize = 2;
    const STEPS: u64 = 40;

    let mut scheduler = SimulationScheduler::new(falling_pair(FRAMES));
    let reader = scheduler.reader();
    let consumed = Arc::new(AtomicU64::new(0));

    let consumer = {
        let consumed = Arc::clone(&consumed);
        thread::spawn(move || {
            let mut heights = Vec::new();
            for k in 1..=STEPS {
                let frame = reader.acquire(k).expect("frame was skipped");
                assert_eq!(frame.step, k);
                heights.push(frame.particles[0].position[1]);
                consumed.store(k, Ordering::SeqCst);
            }
            heights
        })
    };

    for k in 1..=STEPS {
        assert_eq!(step(&mut scheduler), k);
        let seen = consumed.load(Ordering::SeqCst);
        assert!(
            seen + FRAMES as u64 >= k,
            "step {} ran with only {} frames consumed",
            k,
            seen
        );
    }

    let heights = consumer.join().unwrap();
    assert_eq!(heights.len(), STEPS as usize);
    assert!(heights.windows(2).all(|w| w[1] < w[0]), "frames out of order");
    assert_eq!(scheduler.simulation().steps(), STEPS);
}

#[test]
fn test_shutdown_wakes_waiting_reader() {
    let mut scheduler = SimulationScheduler::new(falling_pair(2));
    let reader = scheduler.reader();
    let waiter = thread::spawn(move || reader.acquire(3).map(|frame| frame.step));

    step(&mut scheduler);
    let simulation = scheduler.shutdown();

    assert_eq!(waiter.join().unwrap(), None);
    assert_eq!(simulation.steps(), 1);
}
