//! Static checks run while a model is loaded, and the load-time error type.
pub mod error;
pub mod rules;
pub mod validator;

pub use error::{ModelError, ValidationError, ValidationErrorType};
pub use validator::Validator;
