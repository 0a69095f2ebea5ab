pub mod accum;
pub mod contact;
pub mod distance;
pub mod object;
pub mod volume;

pub use accum::FixedPointAccumulator;
pub use distance::DistanceConstraint;
pub use volume::VolumeConstraint;
