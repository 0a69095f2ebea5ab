use glam::Vec3;

/// Direction of the external acceleration at a point.
///
/// The solver scales the returned direction by the configured signed
/// magnitude `g`, so `x_ = x + dt*v + dt^2 * g * direction(x)`. Directions are
/// normally unit length but any vector is accepted.
pub trait AccelerationField: Sync {
    fn direction(&self, x: Vec3) -> Vec3;
}

impl<F> AccelerationField for F
where
    F: Fn(Vec3) -> Vec3 + Sync,
{
    fn direction(&self, x: Vec3) -> Vec3 {
        self(x)
    }
}

/// Constant direction, e.g. `Vec3::Y` with a negative `g` for ordinary gravity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Uniform(pub Vec3);

impl AccelerationField for Uniform {
    fn direction(&self, _x: Vec3) -> Vec3 {
        self.0
    }
}

/// Unit direction away from `center`; with negative `g` everything falls toward it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Radial {
    pub center: Vec3,
}

impl AccelerationField for Radial {
    fn direction(&self, x: Vec3) -> Vec3 {
        (x - self.center).normalize_or_zero()
    }
}

/// No external acceleration.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ZeroField;

impl AccelerationField for ZeroField {
    fn direction(&self, _x: Vec3) -> Vec3 {
        Vec3::ZERO
    }
}
