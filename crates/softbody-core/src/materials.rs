/// Compliance and density of a simulated material.
///
/// Compliance is the inverse stiffness of the mesh constraints (edges and
/// volumes for tetrahedra, bending for triangles). Density is per volume for
/// tetrahedral meshes and per area for triangular ones.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MaterialPreset {
    pub compliance: f32,
    pub density: f32,
}

impl MaterialPreset {
    /// Rubber: stiff, keeps its shape under impacts.
    pub const RUBBER: Self = Self {
        compliance: 1.0e-4,
        density: 1100.0,
    };

    /// Jelly: soft and wobbly.
    pub const JELLY: Self = Self {
        compliance: 5.0e-3,
        density: 1000.0,
    };

    /// Cloth: inextensible edges, soft bending, light per unit area.
    pub const CLOTH: Self = Self {
        compliance: 1.0e-2,
        density: 0.3,
    };

    /// Look up a preset by name.
    pub fn by_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "rubber" => Some(Self::RUBBER),
            "jelly" => Some(Self::JELLY),
            "cloth" => Some(Self::CLOTH),
            _ => None,
        }
    }
}
