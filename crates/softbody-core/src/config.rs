use glam::Vec3;

use crate::dispatch::DeviceLimits;
use crate::error::{SimError, SimResult};

/// Solver, scheduler and star settings shared by a whole simulation.
#[derive(Clone, Debug)]
pub struct SimConfig {
    /// XPBD substeps per simulation step.
    pub substeps: u32,
    /// Signed magnitude `g` of the external acceleration field.
    pub gravity: f32,
    /// Number of frames the scheduler keeps in flight.
    pub frame_count: usize,
    /// Limits used to select pass group sizes.
    pub device_limits: DeviceLimits,
    /// Preferred group size for per-particle and per-constraint passes.
    pub desired_group_size: u32,
    /// Point STAR particles are attracted to and absorbed by.
    pub star_target: Vec3,
    /// Distance to `star_target` below which a STAR particle is absorbed.
    pub star_capture_radius: f32,
    /// Acceleration pulling STAR particles toward `star_target`.
    pub star_attraction: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            substeps: 20,
            gravity: -1.625,
            frame_count: 2,
            device_limits: DeviceLimits::default(),
            desired_group_size: 256,
            star_target: Vec3::ZERO,
            star_capture_radius: 0.5,
            star_attraction: 4.0,
        }
    }
}

impl SimConfig {
    /// Reject values the solver or the scheduler cannot work with.
    pub fn validate(&self) -> SimResult<()> {
        if self.substeps == 0 {
            return Err(SimError::InvalidConfig("substeps must be at least 1".into()));
        }
        if self.frame_count == 0 {
            return Err(SimError::InvalidConfig("frame_count must be at least 1".into()));
        }
        if self.desired_group_size == 0 {
            return Err(SimError::InvalidConfig(
                "desired_group_size must be positive".into(),
            ));
        }
        if !self.gravity.is_finite() || !self.star_attraction.is_finite() {
            return Err(SimError::InvalidConfig(
                "accelerations must be finite".into(),
            ));
        }
        if !(self.star_capture_radius >= 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "star_capture_radius must be non-negative, got {}",
                self.star_capture_radius
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_substeps_rejected() {
        let config = SimConfig {
            substeps: 0,
            ..SimConfig::default()
        };
        assert!(matches!(config.validate(), Err(SimError::InvalidConfig(_))));
    }
}
