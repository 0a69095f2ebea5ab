use std::sync::atomic::{AtomicI32, Ordering};

use glam::Vec3;
use tracing::warn;

/// Fixed-point scale of the shared correction buffer.
pub const FIXED_POINT_SCALE: f32 = 1.0e7;

/// Per-particle position corrections stored as `value * 10^7` integers.
///
/// Constraint passes touch the same particle from many work items at once.
/// Integer addition is associative, so concurrent `fetch_add`s give the same
/// sum in any order, which float addition does not.
#[derive(Debug, Default)]
pub struct FixedPointAccumulator {
    slots: Vec<[AtomicI32; 3]>,
}

impl FixedPointAccumulator {
    pub fn new(count: usize) -> Self {
        Self {
            slots: (0..count)
                .map(|_| [AtomicI32::new(0), AtomicI32::new(0), AtomicI32::new(0)])
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Atomically add `delta` to particle `i`.
    #[inline]
    pub fn add(&self, i: usize, delta: Vec3) {
        let slot = &self.slots[i];
        slot[0].fetch_add(to_fixed(delta.x), Ordering::Relaxed);
        slot[1].fetch_add(to_fixed(delta.y), Ordering::Relaxed);
        slot[2].fetch_add(to_fixed(delta.z), Ordering::Relaxed);
    }

    /// Current correction of particle `i` in world units.
    #[inline]
    pub fn get(&self, i: usize) -> Vec3 {
        let slot = &self.slots[i];
        Vec3::new(
            slot[0].load(Ordering::Relaxed) as f32,
            slot[1].load(Ordering::Relaxed) as f32,
            slot[2].load(Ordering::Relaxed) as f32,
        ) / FIXED_POINT_SCALE
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            for component in slot.iter_mut() {
                *component.get_mut() = 0;
            }
        }
    }
}

#[inline]
fn to_fixed(value: f32) -> i32 {
    let scaled = (value * FIXED_POINT_SCALE).round();
    // `as` saturates; a correction beyond ±214 units per substep is already a blow-up.
    if scaled.is_nan() || scaled.abs() > i32::MAX as f32 {
        warn!(value, "position correction exceeds the fixed-point range");
    }
    scaled as i32
}
