pub mod cycles;
pub mod targets;
