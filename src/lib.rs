//! Simulation of discrete-time dynamic systems described by equations over
//! time-indexed variables (`F[t] = F[t-1] + F[t-2]`).
//!
//! A [`Model`] is built once from a [`ModelSpec`]: equations are compiled into
//! sandboxed stack programs, the timeline and per-step work list are derived,
//! and each call to [`Model::process_input`] runs one simulation transaction.

pub mod analysis;
pub mod compute;
pub mod config;
pub mod display;
pub mod model;
pub mod persist;
pub mod store;
pub mod validation;

pub use analysis::{SimulationPlan, Timeline};
pub use compute::{ComputationError, Equation, Ledger, Value, DEFAULT_MAX_DEPTH};
pub use config::{ConfigError, ModelSpec};
pub use display::format_trace;
pub use model::Model;
pub use store::{ReferenceError, VarRef};
pub use validation::{ModelError, ValidationError, ValidationErrorType};
