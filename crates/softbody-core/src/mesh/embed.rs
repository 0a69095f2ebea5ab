use std::collections::HashMap;

use glam::{IVec3, Mat4, Vec3, Vec4};
use tracing::{debug, instrument};

use super::{MeshData, MeshKind};
use crate::error::{SimError, SimResult};
use crate::math::{tetrahedron_barycentric, triangle_barycentric};

/// Cell search radius per axis, in cells.
const SEARCH_EXTENT: i32 = 5;

/// Skinning data of one visual vertex.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct EmbeddingRecord {
    /// Particle indices of the host element, relative to the first mesh particle.
    pub joints: [u32; 4],
    /// Barycentric weights; the fourth is 0 for triangles.
    pub weights: [f32; 4],
    /// Host element within its mesh.
    pub element: u32,
}

impl EmbeddingRecord {
    /// Skinned position given particle positions indexed like `joints`.
    pub fn skin(&self, positions: &[Vec3]) -> Vec3 {
        self.joints
            .iter()
            .zip(self.weights)
            .map(|(&joint, weight)| positions[joint as usize] * weight)
            .sum()
    }
}

/// Cell offsets within the search cube, by Manhattan distance and then x, y, z order.
fn search_offsets() -> Vec<(u32, IVec3)> {
    let mut offsets = Vec::with_capacity((2 * SEARCH_EXTENT as usize + 1).pow(3));
    for x in -SEARCH_EXTENT..=SEARCH_EXTENT {
        for y in -SEARCH_EXTENT..=SEARCH_EXTENT {
            for z in -SEARCH_EXTENT..=SEARCH_EXTENT {
                let offset = IVec3::new(x, y, z);
                offsets.push((offset.abs().element_sum() as u32, offset));
            }
        }
    }
    offsets.sort_by_key(|&(distance, _)| distance);
    offsets
}

/// Embed visual vertices into the rest configuration of a loaded mesh.
///
/// Elements are binned into a grid of cell length `1.5 * mean_edge_length`.
/// Each vertex searches cells by increasing Manhattan distance and keeps the
/// element with the largest minimum barycentric coordinate, stopping at the
/// first enclosing element or after finishing the first distance shell that
/// held any candidate. `joint_base` is subtracted from every joint index.
#[instrument(skip_all, fields(mesh = %mesh.name, vertices = positions.len()))]
pub fn embed_vertices(
    mesh: &MeshData,
    positions: &[Vec3],
    transform: Option<Mat4>,
    joint_base: u32,
) -> SimResult<Vec<EmbeddingRecord>> {
    let cell_length = 1.5 * mesh.mean_edge_length;
    if !(cell_length > 0.0) {
        return Err(SimError::EmbeddingFailed {
            mesh: mesh.name.clone(),
            vertex: 0,
        });
    }
    let inv_cell = 1.0 / cell_length;
    let cell_of = |x: Vec3| (x * inv_cell).floor().as_ivec3();
    let corners = mesh.corner_count();

    let mut cells: HashMap<IVec3, Vec<u32>> = HashMap::new();
    for (index, element) in mesh.elements.iter().enumerate() {
        let mut lo = Vec3::splat(f32::INFINITY);
        let mut hi = Vec3::splat(f32::NEG_INFINITY);
        for &particle in &element[..corners] {
            let x = mesh.rest_position(particle);
            lo = lo.min(x);
            hi = hi.max(x);
        }
        let (c_min, c_max) = (cell_of(lo), cell_of(hi));
        for cx in c_min.x..=c_max.x {
            for cy in c_min.y..=c_max.y {
                for cz in c_min.z..=c_max.z {
                    cells
                        .entry(IVec3::new(cx, cy, cz))
                        .or_default()
                        .push(index as u32);
                }
            }
        }
    }
    debug!(cells = cells.len(), cell_length, "binned elements");

    let offsets = search_offsets();
    let barycentric = |element: &[u32; 4], x: Vec3| -> Option<Vec4> {
        let [i, j, k, l] = element.map(|p| mesh.rest_position(p));
        match mesh.kind {
            MeshKind::Tetrahedral => tetrahedron_barycentric(x, i, j, k, l),
            MeshKind::Triangular => triangle_barycentric(x, i, j, k),
        }
    };

    let mut records = Vec::with_capacity(positions.len());
    for (vertex, &position) in positions.iter().enumerate() {
        let x = transform.map_or(position, |m| m.transform_point3(position));
        let c0 = cell_of(x);

        let mut best: Option<(f32, EmbeddingRecord)> = None;
        let mut shell = 0;
        'search: for &(distance, offset) in &offsets {
            if best.is_some() && distance != shell {
                break;
            }
            shell = distance;
            let Some(candidates) = cells.get(&(c0 + offset)) else {
                continue;
            };
            for &index in candidates {
                let element = &mesh.elements[index as usize];
                let Some(b) = barycentric(element, x) else {
                    continue;
                };
                let min_coordinate = b.to_array()[..corners]
                    .iter()
                    .copied()
                    .fold(f32::INFINITY, f32::min);
                if best.as_ref().map_or(true, |(m, _)| min_coordinate > *m) {
                    best = Some((
                        min_coordinate,
                        EmbeddingRecord {
                            joints: element.map(|p| p - joint_base),
                            weights: b.to_array(),
                            element: index,
                        },
                    ));
                }
                if min_coordinate >= 0.0 {
                    break 'search;
                }
            }
        }

        match best {
            Some((_, record)) => records.push(record),
            None => {
                return Err(SimError::EmbeddingFailed {
                    mesh: mesh.name.clone(),
                    vertex,
                })
            }
        }
    }
    debug!(records = records.len(), "embedded vertices");
    Ok(records)
}
