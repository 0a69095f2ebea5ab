//! Bounded pipelining between the simulation and a frame consumer.
//!
//! The scheduler keeps `N` frames. Step `k` writes frame slot `k % N` and may
//! only start once the consumer has released step `k - N`, so the simulation
//! is never more than `N` steps ahead of what has been consumed. Releasing a
//! step also releases every earlier one.

use std::ops::Deref;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::forces::AccelerationField;
use crate::particle::RenderParticle;
use crate::proxy::{Attachment, CollisionProxy};
use crate::simulation::{Simulation, StepReport};

/// Particle snapshot of one completed step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Frame {
    pub step: u64,
    pub absorbed: u32,
    pub particles: Vec<RenderParticle>,
}

struct Slots {
    frames: Vec<Arc<Frame>>,
    /// Last completed step, 0 before the first.
    completed: u64,
    /// Highest released step.
    released: u64,
    shutdown: bool,
}

struct Shared {
    slots: Mutex<Slots>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Slots>) -> MutexGuard<'a, Slots> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, step: u64) {
        let mut slots = self.lock();
        if step > slots.released {
            slots.released = step;
            trace!(step, "frame released");
            self.changed.notify_all();
        }
    }
}

/// Runs simulation steps on the caller's thread, handing frames to readers.
pub struct SimulationScheduler {
    simulation: Simulation,
    shared: Arc<Shared>,
    frame_count: u64,
}

impl SimulationScheduler {
    pub fn new(simulation: Simulation) -> Self {
        let frame_count = simulation.frame_count().max(1);
        let shared = Arc::new(Shared {
            slots: Mutex::new(Slots {
                frames: (0..frame_count).map(|_| Arc::new(Frame::default())).collect(),
                completed: simulation.steps(),
                released: simulation.steps(),
                shutdown: false,
            }),
            changed: Condvar::new(),
        });
        debug!(frame_count, "scheduler started");
        Self {
            simulation,
            shared,
            frame_count: frame_count as u64,
        }
    }

    /// Handle for consumers; cheap to clone and send to other threads.
    pub fn reader(&self) -> FrameReader {
        FrameReader {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    /// Mutable access between steps, e.g. to activate stars.
    pub fn simulation_mut(&mut self) -> &mut Simulation {
        &mut self.simulation
    }

    /// Run the next step once its frame slot is free, then publish the frame.
    ///
    /// Blocks while the consumer holds the frame `N` steps back.
    pub fn step<F: AccelerationField>(
        &mut self,
        dt: f32,
        field: &F,
        proxy: &CollisionProxy,
        attachments: &[Attachment],
    ) -> StepReport {
        let next = self.simulation.steps() + 1;
        let slot = (next % self.frame_count) as usize;

        let mut frame = {
            let mut slots = self.shared.lock();
            while slots.released + self.frame_count < next {
                slots = self.shared.wait(slots);
            }
            std::mem::take(&mut slots.frames[slot])
        };

        let report = self.simulation.step(dt, field, proxy, attachments);
        {
            let frame = Arc::make_mut(&mut frame);
            frame.step = report.step;
            frame.absorbed = report.absorbed;
            self.simulation.write_render(&mut frame.particles);
        }

        let mut slots = self.shared.lock();
        slots.frames[slot] = frame;
        slots.completed = report.step;
        self.shared.changed.notify_all();
        trace!(step = report.step, slot, "frame published");
        report
    }

    /// Stop the pipeline and hand back the simulation.
    ///
    /// Readers blocked on steps that will never complete return `None`;
    /// frames already handed out stay valid.
    pub fn shutdown(self) -> Simulation {
        {
            let mut slots = self.shared.lock();
            slots.shutdown = true;
            self.shared.changed.notify_all();
        }
        debug!(steps = self.simulation.steps(), "scheduler shut down");
        self.simulation
    }
}

/// Consumer side of the scheduler.
#[derive(Clone)]
pub struct FrameReader {
    shared: Arc<Shared>,
}

impl FrameReader {
    /// Block until step `step` has completed and return its frame.
    ///
    /// Returns `None` if the step was already released or its slot reused,
    /// or if the scheduler shut down before the step completed.
    pub fn acquire(&self, step: u64) -> Option<FrameGuard> {
        let mut slots = self.shared.lock();
        while slots.completed < step {
            if slots.shutdown {
                return None;
            }
            slots = self.shared.wait(slots);
        }
        self.guard_for(&slots, step)
    }

    /// Frame of `step` if it has completed, without blocking.
    pub fn try_acquire(&self, step: u64) -> Option<FrameGuard> {
        let slots = self.shared.lock();
        if slots.completed < step {
            return None;
        }
        self.guard_for(&slots, step)
    }

    /// Most recent completed, unreleased frame.
    pub fn latest(&self) -> Option<FrameGuard> {
        let slots = self.shared.lock();
        let step = slots.completed;
        self.guard_for(&slots, step)
    }

    /// Last completed step.
    pub fn completed(&self) -> u64 {
        self.shared.lock().completed
    }

    /// Release `step` (and everything before it) without holding a guard.
    pub fn release(&self, step: u64) {
        self.shared.release(step);
    }

    fn guard_for(&self, slots: &Slots, step: u64) -> Option<FrameGuard> {
        if step == 0 || step <= slots.released {
            return None;
        }
        let count = slots.frames.len() as u64;
        let frame = &slots.frames[(step % count) as usize];
        if frame.step != step {
            return None;
        }
        Some(FrameGuard {
            shared: Arc::clone(&self.shared),
            frame: Arc::clone(frame),
        })
    }
}

/// Read access to one frame; releases its step on drop.
pub struct FrameGuard {
    shared: Arc<Shared>,
    frame: Arc<Frame>,
}

impl Deref for FrameGuard {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        &self.frame
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        self.shared.release(self.frame.step);
    }
}
