use std::ops::Range;

use glam::{IVec3, Vec3};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::dispatch::{for_each_mut, select_group_dimensions, DeviceLimits, GroupDimensions};
use crate::error::SimResult;

/// Hash and index value of unused padding slots.
pub const SENTINEL: u32 = u32::MAX;

/// One slot of the sortable spatial index.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SpatialEntry {
    pub hash: u32,
    pub index: u32,
}

impl SpatialEntry {
    pub const EMPTY: Self = Self {
        hash: SENTINEL,
        index: SENTINEL,
    };

    /// Total order used by the sorting network: hash first, index second.
    #[inline]
    pub fn key(&self) -> u64 {
        (u64::from(self.hash) << 32) | u64::from(self.index)
    }
}

/// Spatial hash rebuilt every step: hash -> bitonic sort -> collect.
///
/// `entries` has a power-of-two length with sentinel padding, so the sorting
/// network needs no bounds handling. After [`SpatialHash::build`] every
/// particle knows the range of sorted entries sharing its hash.
pub struct SpatialHash {
    cell_size: f32,
    inv_cell_size: f32,
    particle_count: usize,
    entries: Vec<SpatialEntry>,
    /// Hashed cell per particle.
    cells: Vec<IVec3>,
    /// Hash per particle.
    hashes: Vec<u32>,
    /// Range of same-hash entries per particle.
    ranges: Vec<Range<u32>>,
    particle_group: GroupDimensions,
    sort_group: GroupDimensions,
    shared_group: GroupDimensions,
}

impl SpatialHash {
    /// Create a hash for `particle_count` particles.
    ///
    /// `cell_size` should be `2 * max_particle_radius`, so touching particles
    /// always sit in the same or adjacent cells.
    pub fn new(
        cell_size: f32,
        particle_count: usize,
        limits: &DeviceLimits,
        desired_group_size: u32,
    ) -> SimResult<Self> {
        let spat_count = particle_count.max(1).next_power_of_two();
        let particle_group =
            select_group_dimensions(limits, particle_count as u32, Some(desired_group_size), 0)?;
        let sort_group =
            select_group_dimensions(limits, spat_count as u32, Some(desired_group_size), 0)?;
        let shared_group = select_group_dimensions(
            limits,
            spat_count as u32,
            None,
            std::mem::size_of::<SpatialEntry>() as u32,
        )?;
        let cell_size = cell_size.max(1e-6);

        Ok(Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            particle_count,
            entries: vec![SpatialEntry::EMPTY; spat_count],
            cells: vec![IVec3::ZERO; particle_count],
            hashes: vec![SENTINEL; particle_count],
            ranges: vec![0..0; particle_count],
            particle_group,
            sort_group,
            shared_group,
        })
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn entries(&self) -> &[SpatialEntry] {
        &self.entries
    }

    /// Sorted-entry range of particles sharing particle `i`'s hash.
    pub fn cell_range(&self, i: usize) -> Range<usize> {
        let r = &self.ranges[i];
        r.start as usize..r.end as usize
    }

    /// Build the index from per-particle position estimates.
    pub fn build(&mut self, positions: &[Vec3]) {
        self.hash(positions);
        self.sort();
        self.collect();
    }

    /// Sort pass over the padded entry array.
    pub fn sort(&mut self) {
        bitonic_sort(&mut self.entries, self.sort_group, self.shared_group);
    }

    /// Hash pass: fill one entry per particle, pad the rest with sentinels.
    pub fn hash(&mut self, positions: &[Vec3]) {
        let count = self.particle_count;
        let inv_cell_size = self.inv_cell_size;
        for_each_mut(&mut self.cells, self.particle_group, |i, cell| {
            *cell = cell_coords(positions[i], inv_cell_size);
        });
        let cells = &self.cells;
        for_each_mut(&mut self.hashes, self.particle_group, |i, hash| {
            *hash = hash_cell(cells[i]);
        });
        let hashes = &self.hashes;
        for_each_mut(&mut self.entries, self.sort_group, |slot, entry| {
            *entry = if slot < count {
                SpatialEntry {
                    hash: hashes[slot],
                    index: slot as u32,
                }
            } else {
                SpatialEntry::EMPTY
            };
        });
    }

    /// Collect pass: record each particle's same-hash range in the sorted entries.
    pub fn collect(&mut self) {
        let entries = &self.entries;
        let hashes = &self.hashes;
        for_each_mut(&mut self.ranges, self.particle_group, |i, range| {
            *range = hash_range(entries, hashes[i]);
        });
    }

    /// Sorted-entry range holding `hash`, by binary search.
    pub fn range_of_hash(&self, hash: u32) -> Range<usize> {
        let r = hash_range(&self.entries, hash);
        r.start as usize..r.end as usize
    }

    /// Call `f(j)` for every particle in the 27 cells around particle `i`'s cell,
    /// including `i` itself. Hash collisions between the 27 cells are visited once.
    pub fn for_each_neighbor<F: FnMut(u32)>(&self, i: usize, mut f: F) {
        let center = self.cells[i];
        let mut seen = [SENTINEL; 27];
        let mut seen_len = 0;
        for dx in -1..=1_i32 {
            for dy in -1..=1_i32 {
                for dz in -1..=1_i32 {
                    let offset = IVec3::new(dx, dy, dz);
                    let h = hash_cell(center.wrapping_add(offset));
                    if seen[..seen_len].contains(&h) {
                        continue;
                    }
                    seen[seen_len] = h;
                    seen_len += 1;

                    let range = if offset == IVec3::ZERO {
                        self.cell_range(i)
                    } else {
                        self.range_of_hash(h)
                    };
                    for entry in &self.entries[range] {
                        if entry.index != SENTINEL {
                            f(entry.index);
                        }
                    }
                }
            }
        }
    }
}

/// Convert a world position to cell coordinates.
#[inline]
pub fn cell_coords(pos: Vec3, inv_cell_size: f32) -> IVec3 {
    (pos * inv_cell_size).floor().as_ivec3()
}

/// Fold cell coordinates into a scalar hash that never equals [`SENTINEL`].
#[inline]
pub fn hash_cell(cell: IVec3) -> u32 {
    let h = (cell.x as u32).wrapping_mul(73856093)
        ^ (cell.y as u32).wrapping_mul(19349663)
        ^ (cell.z as u32).wrapping_mul(83492791);
    if h == SENTINEL {
        SENTINEL - 1
    } else {
        h
    }
}

fn hash_range(entries: &[SpatialEntry], hash: u32) -> Range<u32> {
    let start = entries.partition_point(|e| e.hash < hash);
    let end = start + entries[start..].partition_point(|e| e.hash == hash);
    start as u32..end as u32
}

/// Sort `entries` by [`SpatialEntry::key`] with a bitonic network.
///
/// `entries.len()` must be a power of two. Passes run over (peak, distance)
/// pairs, peak doubling from 2 and distance halving from `peak / 2`. Once the
/// distance fits inside one shared block, the remaining distances of that peak
/// are fused into a single pass where each worker sorts its own block.
pub fn bitonic_sort(entries: &mut [SpatialEntry], group: GroupDimensions, shared: GroupDimensions) {
    let n = entries.len();
    if n < 2 {
        return;
    }
    debug_assert!(n.is_power_of_two(), "bitonic sort needs a power-of-two length");
    let block = shared.chunk_len().next_power_of_two().min(n);

    let mut peak = 2;
    while peak <= n {
        let mut dist = peak / 2;
        while dist > 0 {
            if dist < block {
                merge_blocks(entries, peak, dist, block);
                break;
            }
            merge_pass(entries, peak, dist, group);
            dist /= 2;
        }
        peak *= 2;
    }
}

/// One global compare-exchange pass at `dist`.
fn merge_pass(entries: &mut [SpatialEntry], peak: usize, dist: usize, group: GroupDimensions) {
    let span = 2 * dist;

    #[cfg(feature = "parallel")]
    {
        let min_chunks = (group.chunk_len() / span).max(1);
        entries
            .par_chunks_mut(span)
            .with_min_len(min_chunks)
            .enumerate()
            .for_each(|(c, chunk)| compare_halves(chunk, c * span, peak, dist));
    }

    #[cfg(not(feature = "parallel"))]
    {
        let _ = group;
        entries
            .chunks_mut(span)
            .enumerate()
            .for_each(|(c, chunk)| compare_halves(chunk, c * span, peak, dist));
    }
}

/// Fused pass: every block runs distances `dist, dist / 2, ..., 1` on its own.
fn merge_blocks(entries: &mut [SpatialEntry], peak: usize, dist: usize, block: usize) {
    let sort_block = |(b, chunk): (usize, &mut [SpatialEntry])| {
        let base = b * block;
        let mut d = dist;
        while d > 0 {
            let span = 2 * d;
            for (s, sub) in chunk.chunks_mut(span).enumerate() {
                compare_halves(sub, base + s * span, peak, d);
            }
            d /= 2;
        }
    };

    #[cfg(feature = "parallel")]
    entries.par_chunks_mut(block).enumerate().for_each(sort_block);

    #[cfg(not(feature = "parallel"))]
    entries.chunks_mut(block).enumerate().for_each(sort_block);
}

/// Compare-exchange the two halves of a `2 * dist` span starting at global index `base`.
#[inline]
fn compare_halves(chunk: &mut [SpatialEntry], base: usize, peak: usize, dist: usize) {
    let ascending = base & peak == 0;
    let (lo, hi) = chunk.split_at_mut(dist);
    for (a, b) in lo.iter_mut().zip(hi.iter_mut()) {
        let out_of_order = if ascending {
            a.key() > b.key()
        } else {
            a.key() < b.key()
        };
        if out_of_order {
            std::mem::swap(a, b);
        }
    }
}
