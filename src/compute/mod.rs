pub mod bytecode;
pub mod engine;
pub mod equation;
pub mod kernel;
pub mod ledger;
pub mod lexer;
pub mod parser;

pub use engine::{Engine, DEFAULT_MAX_DEPTH};
pub use equation::Equation;
pub use ledger::{ComputationError, Ledger, Value, MAX_STEPS};
pub use parser::CompileError;
