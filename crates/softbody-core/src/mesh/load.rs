use std::collections::{BTreeMap, BTreeSet, HashMap};

use glam::Vec3;
use tracing::{info, instrument, warn};

use super::{MeshData, MeshKind, MeshLoadParams, MeshSpec};
use crate::constraints::{DistanceConstraint, VolumeConstraint};
use crate::error::{SimError, SimResult};
use crate::math::{signed_volume, triangle_area};
use crate::particle::{ParticleSet, State};

/// Append a mesh to the particle arena and generate its constraints.
///
/// Nodes become particles with lumped inverse masses `w = n / (density * sum)`,
/// where the sum runs over the volumes (tetrahedra, `n = 4`) or areas
/// (triangles, `n = 3`) of the incident elements. Every unique edge gets a
/// distance constraint; tetrahedra get a volume constraint each, triangles get
/// bending constraints between apices across shared edges. Radii are half the
/// shortest incident edge.
///
/// On error nothing is appended.
#[instrument(skip_all, fields(mesh = name))]
pub fn load_mesh(
    name: &str,
    spec: &MeshSpec,
    params: &MeshLoadParams,
    particles: &mut ParticleSet,
    distance_constraints: &mut Vec<DistanceConstraint>,
    volume_constraints: &mut Vec<VolumeConstraint>,
) -> SimResult<MeshData> {
    let mesh = || name.to_string();

    if spec.node_blocks.len() != 1 || spec.element_blocks.len() != 1 {
        return Err(SimError::UnsupportedBlockCount {
            mesh: mesh(),
            nodes: spec.node_blocks.len(),
            elements: spec.element_blocks.len(),
        });
    }
    let nodes = &spec.node_blocks[0];
    let elements = &spec.element_blocks[0];

    let kind = elements
        .element_type
        .kind()
        .ok_or_else(|| SimError::UnsupportedElementType {
            mesh: mesh(),
            dim: elements.element_type.dimension,
            nodes: elements.element_type.node_count,
        })?;
    let arity = elements.element_type.node_count;

    if nodes.tags.len() != nodes.positions.len() {
        return Err(SimError::MissingIndices {
            mesh: mesh(),
            detail: format!(
                "{} node tags but {} positions",
                nodes.tags.len(),
                nodes.positions.len()
            ),
        });
    }
    if elements.connectivity.len() % arity != 0 {
        return Err(SimError::MissingIndices {
            mesh: mesh(),
            detail: format!(
                "connectivity length {} is not a multiple of {arity}",
                elements.connectivity.len()
            ),
        });
    }

    // Resolve all tags before touching the arena.
    let offset = particles.count as u32;
    let tag_to_particle: HashMap<u64, u32> = nodes
        .tags
        .iter()
        .enumerate()
        .map(|(i, &tag)| (tag, offset + i as u32))
        .collect();
    let resolve = |tag: u64| {
        tag_to_particle
            .get(&tag)
            .copied()
            .ok_or_else(|| SimError::UnknownNodeTag { mesh: mesh(), tag })
    };
    let element_list = elements
        .connectivity
        .chunks_exact(arity)
        .map(|corners| {
            let i = resolve(corners[0])?;
            let j = resolve(corners[1])?;
            let k = resolve(corners[2])?;
            let l = if arity == 4 { resolve(corners[3])? } else { i };
            Ok([i, j, k, l])
        })
        .collect::<SimResult<Vec<[u32; 4]>>>()?;
    let static_particles = params
        .static_tags
        .iter()
        .map(|&tag| resolve(tag))
        .collect::<SimResult<Vec<u32>>>()?;

    let rest_positions: Vec<Vec3> = nodes
        .positions
        .iter()
        .map(|&p| params.transform.transform_point3(p))
        .collect();
    let local = |particle: u32| (particle - offset) as usize;

    // Element measures and the edge sets.
    let mut measure = vec![0.0f32; rest_positions.len()];
    let mut edges = BTreeSet::new();
    let mut apices: BTreeMap<(u32, u32), Vec<u32>> = BTreeMap::new();
    let volume_start = volume_constraints.len();
    for &[i, j, k, l] in &element_list {
        let (x_i, x_j, x_k) = (
            rest_positions[local(i)],
            rest_positions[local(j)],
            rest_positions[local(k)],
        );
        match kind {
            MeshKind::Tetrahedral => {
                for (a, b) in [(i, j), (i, k), (i, l), (j, k), (j, l), (k, l)] {
                    edges.insert(edge_key(a, b));
                }
                let volume = signed_volume(x_i, x_j, x_k, rest_positions[local(l)]);
                volume_constraints.push(VolumeConstraint::new(
                    [i, j, k, l],
                    volume,
                    params.compliance,
                ));
                for node in [i, j, k, l] {
                    measure[local(node)] += volume.abs();
                }
            }
            MeshKind::Triangular => {
                for (a, b, apex) in [(i, j, k), (i, k, j), (j, k, i)] {
                    let key = edge_key(a, b);
                    edges.insert(key);
                    apices.entry(key).or_default().push(apex);
                }
                let area = triangle_area(x_i, x_j, x_k);
                for node in [i, j, k] {
                    measure[local(node)] += area;
                }
            }
        }
    }

    // Stretching constraints along unique edges, radii from the shortest edge.
    let distance_start = distance_constraints.len();
    let edge_compliance = match kind {
        MeshKind::Tetrahedral => params.compliance,
        MeshKind::Triangular => 0.0,
    };
    let mut radius = vec![f32::INFINITY; rest_positions.len()];
    let mut edge_length_sum = 0.0;
    for &(a, b) in &edges {
        let length = rest_positions[local(a)].distance(rest_positions[local(b)]);
        edge_length_sum += length;
        let r = 0.5 * length;
        radius[local(a)] = radius[local(a)].min(r);
        radius[local(b)] = radius[local(b)].min(r);
        distance_constraints.push(DistanceConstraint::new(a, b, length, edge_compliance));
    }
    let mean_edge_length = if edges.is_empty() {
        0.0
    } else {
        edge_length_sum / edges.len() as f32
    };

    // Bending: the first apex of each shared edge against every other apex.
    for edge_apices in apices.values() {
        if let Some((&first, others)) = edge_apices.split_first() {
            let x_first = rest_positions[local(first)];
            for &other in others {
                let length = x_first.distance(rest_positions[local(other)]);
                distance_constraints.push(DistanceConstraint::new(
                    first,
                    other,
                    length,
                    params.compliance,
                ));
            }
        }
    }

    // Lumped masses, then append the nodes.
    let corners = match kind {
        MeshKind::Tetrahedral => 4.0,
        MeshKind::Triangular => 3.0,
    };
    particles.reserve(rest_positions.len());
    let mut max_radius = 0.0f32;
    let mut isolated = 0usize;
    for (n, &position) in rest_positions.iter().enumerate() {
        let particle = offset + n as u32;
        let (inv_mass, r, state) = if measure[n] > 0.0 && radius[n].is_finite() {
            let state = if static_particles.contains(&particle) {
                State::Static
            } else {
                State::Free
            };
            (corners / (params.density * measure[n]), radius[n], state)
        } else {
            isolated += 1;
            (0.0, 0.0, State::Static)
        };
        max_radius = max_radius.max(r);
        particles.push(position, Vec3::ZERO, r, inv_mass, state);
    }
    if isolated > 0 {
        warn!(isolated, "nodes without a non-degenerate element were made static");
    }

    let data = MeshData {
        name: name.to_string(),
        kind,
        particles: offset..particles.count as u32,
        elements: element_list,
        rest_positions,
        mean_edge_length,
        max_radius,
        distance_constraints: distance_start..distance_constraints.len(),
        volume_constraints: volume_start..volume_constraints.len(),
        tag_to_particle,
    };
    info!(
        kind = ?data.kind,
        nodes = data.particles.len(),
        elements = data.elements.len(),
        distance = data.distance_constraints.len(),
        volume = data.volume_constraints.len(),
        "loaded mesh"
    );
    Ok(data)
}

#[inline]
fn edge_key(a: u32, b: u32) -> (u32, u32) {
    (a.min(b), a.max(b))
}
