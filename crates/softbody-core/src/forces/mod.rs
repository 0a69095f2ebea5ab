pub mod gravity;
pub mod star;

pub use gravity::{AccelerationField, Radial, Uniform, ZeroField};
