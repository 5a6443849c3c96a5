//! Static model data: variable references and the equation registry.
pub mod registry;
pub mod types;

pub use registry::{EquationId, Registry};
pub use types::{IndexKind, ReferenceError, VarRef, TIME_SYMBOL};
