//! Structural analysis of a loaded model.
pub mod topology;

pub use topology::{SimulationPlan, Timeline};
