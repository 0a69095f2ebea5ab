//! Group-size selection and parallel-for helpers.
//!
//! Every solver pass is a map over an index range split into groups. The group
//! size is chosen once at build time against [`DeviceLimits`]; on the CPU it
//! becomes the minimum chunk length handed to rayon and, for the fused bitonic
//! pass, the size of the block sorted by one worker.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::debug;

use crate::error::{SimError, SimResult};

/// Hardware limits a group configuration must respect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Maximum invocations in one group.
    pub max_group_size: u32,
    /// Maximum number of groups in one dispatch.
    pub max_group_count: u32,
    /// Maximum shared working set of one group in bytes.
    pub max_shared_size: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_group_size: 1024,
            max_group_count: 65535,
            max_shared_size: 32768,
        }
    }
}

/// Size and count of the groups covering an index range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GroupDimensions {
    pub size: u32,
    pub count: u32,
}

impl GroupDimensions {
    /// Minimum number of items a worker processes at once.
    #[inline]
    pub fn chunk_len(&self) -> usize {
        self.size.max(1) as usize
    }
}

/// Largest power of two `<= x` (0 for 0).
#[inline]
fn bit_floor(x: u32) -> u32 {
    if x == 0 {
        0
    } else {
        1 << (31 - x.leading_zeros())
    }
}

#[inline]
fn group_count(invocations: u32, size: u32) -> u32 {
    invocations / size + u32::from(invocations % size != 0)
}

/// Select group dimensions for `invocations` work items.
///
/// Starts at `desired` (or the device maximum) rounded down to a power of two,
/// then halves the size while the shared working set or the size limit is
/// exceeded and doubles it while too many groups would be dispatched. Fails when
/// both directions are required at once or the search would oscillate.
pub fn select_group_dimensions(
    limits: &DeviceLimits,
    invocations: u32,
    desired: Option<u32>,
    shared_per_invocation: u32,
) -> SimResult<GroupDimensions> {
    let max_size = limits.max_group_size;
    let mut size = bit_floor(desired.unwrap_or(max_size));
    if size == 0 {
        return Err(SimError::Dispatch("group size is zero".into()));
    }
    let mut count = group_count(invocations, size);

    let exceeds = |size: u32| {
        u64::from(shared_per_invocation) * u64::from(size) > u64::from(limits.max_shared_size)
            || size > max_size
    };
    let mut decrease = exceeds(size);
    let mut increase = count > limits.max_group_count;
    if decrease && increase {
        return Err(SimError::Dispatch(format!(
            "{invocations} invocations need both smaller and larger groups than {size}"
        )));
    }

    while decrease || increase {
        if decrease {
            size /= 2;
        } else {
            size = size.checked_mul(2).unwrap_or(0);
        }
        if size == 0 {
            return Err(SimError::Dispatch(format!(
                "no group size fits {invocations} invocations"
            )));
        }
        count = group_count(invocations, size);

        let was_decreasing = decrease;
        let was_increasing = increase;
        decrease = exceeds(size);
        increase = count > limits.max_group_count;
        if (was_decreasing && increase) || (was_increasing && decrease) {
            return Err(SimError::Dispatch(format!(
                "group size search for {invocations} invocations does not converge"
            )));
        }
    }

    debug!(invocations, size, count, "selected group dimensions");
    Ok(GroupDimensions { size, count })
}

/// Run `f(i, &mut items[i])` for every item, in parallel when enabled.
pub fn for_each_mut<T, F>(items: &mut [T], group: GroupDimensions, f: F)
where
    T: Send,
    F: Fn(usize, &mut T) + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        items
            .par_iter_mut()
            .with_min_len(group.chunk_len())
            .enumerate()
            .for_each(|(i, item)| f(i, item));
    }

    #[cfg(not(feature = "parallel"))]
    {
        let _ = group;
        for (i, item) in items.iter_mut().enumerate() {
            f(i, item);
        }
    }
}

/// Run `f(i)` for every index in `0..count`, in parallel when enabled.
pub fn for_each_index<F>(count: usize, group: GroupDimensions, f: F)
where
    F: Fn(usize) + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        (0..count)
            .into_par_iter()
            .with_min_len(group.chunk_len())
            .for_each(f);
    }

    #[cfg(not(feature = "parallel"))]
    {
        let _ = group;
        (0..count).for_each(f);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desired_size_is_kept_when_within_limits() {
        let limits = DeviceLimits::default();
        let group = select_group_dimensions(&limits, 1000, Some(256), 0).unwrap();
        assert_eq!(group, GroupDimensions { size: 256, count: 4 });
    }

    #[test]
    fn test_desired_size_rounds_down_to_power_of_two() {
        let limits = DeviceLimits::default();
        let group = select_group_dimensions(&limits, 300, Some(300), 0).unwrap();
        assert_eq!(group.size, 256);
        assert_eq!(group.count, 2);
    }

    #[test]
    fn test_shared_memory_halves_group_size() {
        let limits = DeviceLimits {
            max_group_size: 1024,
            max_group_count: 65535,
            max_shared_size: 4096,
        };
        // 8 bytes per invocation -> at most 512 invocations per group.
        let group = select_group_dimensions(&limits, 4096, None, 8).unwrap();
        assert_eq!(group.size, 512);
        assert_eq!(group.count, 8);
    }

    #[test]
    fn test_group_count_limit_doubles_group_size() {
        let limits = DeviceLimits {
            max_group_size: 1024,
            max_group_count: 4,
            max_shared_size: 32768,
        };
        let group = select_group_dimensions(&limits, 1000, Some(64), 0).unwrap();
        assert_eq!(group.size, 256);
        assert!(group.count <= 4);
    }

    #[test]
    fn test_unsatisfiable_limits_fail() {
        let limits = DeviceLimits {
            max_group_size: 64,
            max_group_count: 2,
            max_shared_size: 32768,
        };
        let result = select_group_dimensions(&limits, 10_000, None, 0);
        assert!(matches!(result, Err(SimError::Dispatch(_))));
    }

    #[test]
    fn test_both_directions_at_start_fail() {
        let limits = DeviceLimits {
            max_group_size: 1024,
            max_group_count: 1,
            max_shared_size: 8,
        };
        let result = select_group_dimensions(&limits, 100, Some(64), 8);
        assert!(matches!(result, Err(SimError::Dispatch(_))));
    }

    #[test]
    fn test_for_each_index_visits_every_index() {
        use std::sync::atomic::{AtomicU32, Ordering};
        let visits: Vec<AtomicU32> = (0..100).map(|_| AtomicU32::new(0)).collect();
        let group = GroupDimensions { size: 16, count: 7 };
        for_each_index(100, group, |i| {
            visits[i].fetch_add(1, Ordering::Relaxed);
        });
        assert!(visits.iter().all(|v| v.load(Ordering::Relaxed) == 1));
    }
}
