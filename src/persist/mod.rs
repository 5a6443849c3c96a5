//! CSV persistence of the series store: simulation logs out, external data in.
pub mod external;
pub mod recorder;

pub use external::load_external;
pub use recorder::{rotated_path, write_log, LogTable, RecordError};
