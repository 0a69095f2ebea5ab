//! Deformable-body particle engine built on XPBD.
//!
//! Meshes are loaded into one particle arena ([`simulation::SimulationBuilder`]),
//! stepped by a substepped constraint solver ([`solver::Solver`]) with a
//! spatial-hash broad phase ([`grid::SpatialHash`]), and handed to a renderer
//! through bounded frame pipelining ([`scheduler::SimulationScheduler`]).

pub mod config;
pub mod constraints;
pub mod dispatch;
pub mod error;
pub mod forces;
pub mod graph;
pub mod grid;
pub mod materials;
pub mod math;
pub mod mesh;
pub mod particle;
pub mod proxy;
pub mod scheduler;
pub mod simulation;
pub mod solver;

pub use config::SimConfig;
pub use error::{SimError, SimResult};
pub use simulation::{Simulation, SimulationBuilder, StepReport};
