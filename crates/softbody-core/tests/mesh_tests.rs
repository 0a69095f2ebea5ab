use glam::{Mat4, Vec3};
use softbody_core::materials::MaterialPreset;
use softbody_core::mesh::{ElementBlock, ElementType, MeshKind, MeshLoadParams, MeshSpec, NodeBlock};
use softbody_core::particle::State;
use softbody_core::{SimConfig, SimError, SimulationBuilder};

fn unit_tet() -> MeshSpec {
    MeshSpec::single(
        NodeBlock {
            tags: vec![1, 2, 3, 4],
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z],
        },
        ElementBlock {
            element_type: ElementType::TETRAHEDRON,
            connectivity: vec![1, 2, 3, 4],
        },
    )
}

/// Two tetrahedra sharing the face (1, 2, 3).
fn double_tet() -> MeshSpec {
    MeshSpec::single(
        NodeBlock {
            tags: vec![1, 2, 3, 4, 5],
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z, Vec3::new(0.0, 0.0, -1.0)],
        },
        ElementBlock {
            element_type: ElementType::TETRAHEDRON,
            connectivity: vec![1, 2, 3, 4, 1, 3, 2, 5],
        },
    )
}

fn quad() -> MeshSpec {
    MeshSpec::single(
        NodeBlock {
            tags: vec![1, 2, 3, 4],
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y],
        },
        ElementBlock {
            element_type: ElementType::TRIANGLE,
            connectivity: vec![1, 2, 3, 1, 3, 4],
        },
    )
}

#[test]
fn test_tet_mass_lumping() {
    let mut builder = SimulationBuilder::new(SimConfig::default());
    // volume 1/6, density 6 => w = 4 / (6 * 1/6) = 4
    let kind = builder
        .load_mesh("tet", &unit_tet(), &MeshLoadParams::new(0.0, 6.0))
        .unwrap();
    assert_eq!(kind, MeshKind::Tetrahedral);
    for &w in &builder.particles().inv_mass {
        assert!((w - 4.0).abs() < 1e-4, "w = {}", w);
    }
}

#[test]
fn test_shared_nodes_accumulate_volume() {
    let mut builder = SimulationBuilder::new(SimConfig::default());
    builder
        .load_mesh("double", &double_tet(), &MeshLoadParams::new(0.0, 6.0))
        .unwrap();
    let w = &builder.particles().inv_mass;
    // shared face nodes touch both tets (2/6), apices one (1/6)
    for i in 0..3 {
        assert!((w[i] - 2.0).abs() < 1e-4, "shared node {} w = {}", i, w[i]);
    }
    assert!((w[3] - 4.0).abs() < 1e-4);
    assert!((w[4] - 4.0).abs() < 1e-4);
}

#[test]
fn test_triangle_mass_lumping() {
    let mut builder = SimulationBuilder::new(SimConfig::default());
    // each triangle has area 0.5; corner nodes 1 and 3 touch both
    builder
        .load_mesh("quad", &quad(), &MeshLoadParams::new(0.0, 2.0))
        .unwrap();
    let w = &builder.particles().inv_mass;
    assert!((w[0] - 1.5).abs() < 1e-5);
    assert!((w[1] - 3.0).abs() < 1e-5);
    assert!((w[2] - 1.5).abs() < 1e-5);
    assert!((w[3] - 3.0).abs() < 1e-5);
}

#[test]
fn test_tet_edge_and_volume_counts() {
    let mut builder = SimulationBuilder::new(SimConfig::default());
    builder
        .load_mesh("double", &double_tet(), &MeshLoadParams::new(1e-3, 1.0))
        .unwrap();
    let mesh = builder.mesh("double").unwrap();
    // 6 + 6 edges, 3 shared
    assert_eq!(mesh.distance_constraints.len(), 9);
    assert_eq!(mesh.volume_constraints.len(), 2);
    assert_eq!(mesh.element_count(), 2);

    let sim = builder.build().unwrap();
    let constraints = sim.solver().distance_constraints();
    assert!(constraints.iter().all(|c| c.compliance == 1e-3));
    let volumes = sim.solver().volume_constraints();
    assert!((volumes[0].rest_volume - 1.0 / 6.0).abs() < 1e-6);
    // reversed shared face, apex on the other side
    assert!((volumes[1].rest_volume - 1.0 / 6.0).abs() < 1e-6);
}

#[test]
fn test_radius_is_half_shortest_incident_edge() {
    let mut spec = unit_tet();
    spec.node_blocks[0].positions[3] = Vec3::new(0.0, 0.0, 0.4);
    let mut builder = SimulationBuilder::new(SimConfig::default());
    builder
        .load_mesh("tet", &spec, &MeshLoadParams::new(0.0, 1.0))
        .unwrap();
    let r = &builder.particles().radius;
    assert!((r[0] - 0.2).abs() < 1e-6);
    assert!((r[1] - 0.5).abs() < 1e-6);
    assert!((r[3] - 0.2).abs() < 1e-6);
    assert!((builder.mesh("tet").unwrap().max_radius - 0.5).abs() < 1e-6);
}

#[test]
fn test_static_tags_and_placement() {
    let params = MeshLoadParams::new(0.0, 1.0)
        .with_static_tags([1])
        .with_transform(Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0)));
    let mut builder = SimulationBuilder::new(SimConfig::default());
    builder.load_mesh("tet", &unit_tet(), &params).unwrap();

    let particles = builder.particles();
    assert_eq!(particles.state[0], State::Static);
    assert_eq!(particles.inv_mass[0], 0.0);
    assert_eq!(particles.state[1], State::Free);
    assert_eq!(particles.position[2], Vec3::new(0.0, 6.0, 0.0));

    let mesh = builder.mesh("tet").unwrap();
    assert_eq!(mesh.particle_of_tag(4), Some(3));
    assert_eq!(mesh.particle_of_tag(9), None);
}

#[test]
fn test_material_preset_params() {
    let params = MeshLoadParams::from_material(&MaterialPreset::CLOTH);
    let mut builder = SimulationBuilder::new(SimConfig::default());
    builder.load_mesh("cloth", &quad(), &params).unwrap();
    let sim = builder.build().unwrap();
    let constraints = sim.solver().distance_constraints();
    // stretch is inextensible, bending uses the material compliance
    assert_eq!(constraints.len(), 6);
    assert_eq!(constraints.iter().filter(|c| c.compliance == 0.0).count(), 5);
    assert_eq!(constraints[5].compliance, MaterialPreset::CLOTH.compliance);
}

#[test]
fn test_meshes_are_concatenated() {
    let mut builder = SimulationBuilder::new(SimConfig::default());
    builder.load_mesh("a", &unit_tet(), &MeshLoadParams::new(0.0, 1.0)).unwrap();
    builder.load_mesh("b", &quad(), &MeshLoadParams::new(0.0, 1.0)).unwrap();
    let sim = builder.build().unwrap();
    assert_eq!(sim.mesh_range("a").unwrap(), 0..4);
    assert_eq!(sim.mesh_range("b").unwrap(), 4..8);
    assert_eq!(sim.mesh("b").unwrap().elements[0], [4, 5, 6, 4]);
    assert!(matches!(sim.mesh_range("c"), Err(SimError::UnknownMesh(_))));
}

#[test]
fn test_rejects_multiple_blocks() {
    let mut spec = unit_tet();
    spec.node_blocks.push(NodeBlock::default());
    let mut builder = SimulationBuilder::new(SimConfig::default());
    let err = builder
        .load_mesh("tet", &spec, &MeshLoadParams::new(0.0, 1.0))
        .unwrap_err();
    assert!(matches!(err, SimError::UnsupportedBlockCount { nodes: 2, elements: 1, .. }));
}

#[test]
fn test_rejects_unsupported_element_type() {
    let mut spec = unit_tet();
    spec.element_blocks[0].element_type = ElementType {
        dimension: 1,
        node_count: 2,
    };
    spec.element_blocks[0].connectivity = vec![1, 2];
    let mut builder = SimulationBuilder::new(SimConfig::default());
    let err = builder
        .load_mesh("lines", &spec, &MeshLoadParams::new(0.0, 1.0))
        .unwrap_err();
    assert!(matches!(err, SimError::UnsupportedElementType { dim: 1, nodes: 2, .. }));
    assert!(builder.particles().is_empty());
}

#[test]
fn test_rejects_truncated_connectivity() {
    let mut spec = unit_tet();
    spec.element_blocks[0].connectivity.pop();
    let mut builder = SimulationBuilder::new(SimConfig::default());
    let err = builder
        .load_mesh("tet", &spec, &MeshLoadParams::new(0.0, 1.0))
        .unwrap_err();
    assert!(matches!(err, SimError::MissingIndices { .. }));
}

#[test]
fn test_rejects_unknown_static_tag() {
    let params = MeshLoadParams::new(0.0, 1.0).with_static_tags([42]);
    let mut builder = SimulationBuilder::new(SimConfig::default());
    let err = builder.load_mesh("tet", &unit_tet(), &params).unwrap_err();
    assert!(matches!(err, SimError::UnknownNodeTag { tag: 42, .. }));
    assert!(err.to_string().contains("[tet]"));
}

#[test]
fn test_rejects_duplicate_mesh_name() {
    let mut builder = SimulationBuilder::new(SimConfig::default());
    builder.load_mesh("tet", &unit_tet(), &MeshLoadParams::new(0.0, 1.0)).unwrap();
    let err = builder
        .load_mesh("tet", &unit_tet(), &MeshLoadParams::new(0.0, 1.0))
        .unwrap_err();
    assert!(matches!(err, SimError::DuplicateMesh(_)));
    assert_eq!(builder.particles().count, 4);
}
