//! Simulation meshes: specification types, loading into the particle arena
//! and barycentric embedding of visual meshes.

pub mod embed;
pub mod load;

use std::collections::HashMap;
use std::ops::Range;

use glam::{Mat4, Vec3};

use crate::materials::MaterialPreset;

pub use embed::{embed_vertices, EmbeddingRecord};
pub use load::load_mesh;

/// Element type of an element block, as a (dimension, nodes per element) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElementType {
    pub dimension: u32,
    pub node_count: usize,
}

impl ElementType {
    pub const TRIANGLE: Self = Self {
        dimension: 2,
        node_count: 3,
    };
    pub const TETRAHEDRON: Self = Self {
        dimension: 3,
        node_count: 4,
    };

    /// Mesh kind built from this element type, if supported.
    pub fn kind(&self) -> Option<MeshKind> {
        match *self {
            Self::TRIANGLE => Some(MeshKind::Triangular),
            Self::TETRAHEDRON => Some(MeshKind::Tetrahedral),
            _ => None,
        }
    }
}

/// Node tags and their positions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeBlock {
    pub tags: Vec<u64>,
    pub positions: Vec<Vec3>,
}

/// Uniformly typed elements; `connectivity` holds `node_count` node tags per element.
#[derive(Clone, Debug, PartialEq)]
pub struct ElementBlock {
    pub element_type: ElementType,
    pub connectivity: Vec<u64>,
}

/// Authored mesh as read from an asset file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshSpec {
    pub node_blocks: Vec<NodeBlock>,
    pub element_blocks: Vec<ElementBlock>,
}

impl MeshSpec {
    /// Spec with a single node block and a single element block.
    pub fn single(nodes: NodeBlock, elements: ElementBlock) -> Self {
        Self {
            node_blocks: vec![nodes],
            element_blocks: vec![elements],
        }
    }
}

/// Material and placement of a mesh being loaded.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshLoadParams {
    pub compliance: f32,
    pub density: f32,
    /// Node tags that never move.
    pub static_tags: Vec<u64>,
    /// Placement applied to every node position.
    pub transform: Mat4,
}

impl MeshLoadParams {
    pub fn new(compliance: f32, density: f32) -> Self {
        Self {
            compliance,
            density,
            static_tags: Vec::new(),
            transform: Mat4::IDENTITY,
        }
    }

    pub fn from_material(material: &MaterialPreset) -> Self {
        Self::new(material.compliance, material.density)
    }

    pub fn with_static_tags(mut self, tags: impl IntoIterator<Item = u64>) -> Self {
        self.static_tags.extend(tags);
        self
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeshKind {
    Triangular,
    Tetrahedral,
}

/// What a loaded mesh keeps for embedding and attachment lookup.
#[derive(Clone, Debug)]
pub struct MeshData {
    pub name: String,
    pub kind: MeshKind,
    /// Global particle indices of the mesh nodes.
    pub particles: Range<u32>,
    /// Global particle indices per element; triangles repeat their first node.
    pub elements: Vec<[u32; 4]>,
    /// Node positions at load time, indexed relative to `particles.start`.
    pub rest_positions: Vec<Vec3>,
    /// Mean length of the unique edges.
    pub mean_edge_length: f32,
    /// Largest node radius.
    pub max_radius: f32,
    pub distance_constraints: Range<usize>,
    pub volume_constraints: Range<usize>,
    tag_to_particle: HashMap<u64, u32>,
}

impl MeshData {
    /// Global particle index of a node tag.
    pub fn particle_of_tag(&self, tag: u64) -> Option<u32> {
        self.tag_to_particle.get(&tag).copied()
    }

    /// Rest position of a global particle index inside this mesh.
    #[inline]
    pub fn rest_position(&self, particle: u32) -> Vec3 {
        self.rest_positions[(particle - self.particles.start) as usize]
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Number of element corners that take part in barycentric coordinates.
    pub fn corner_count(&self) -> usize {
        match self.kind {
            MeshKind::Triangular => 3,
            MeshKind::Tetrahedral => 4,
        }
    }
}
