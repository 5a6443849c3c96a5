//! Simulation logs.
//!
//! A log is a CSV table with a `# t` column followed by one column per base
//! name. A run never overwrites a file left by an earlier run: its logs go to
//! the first free name among `stem_1.ext`, `stem_2.ext`, ... (see
//! [`rotated_path`]), and every later transaction of the run rewrites that
//! same file.

use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("failed to write log '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Rows of a log, one per absolute step. Unknown cells are `NaN`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogTable {
    pub names: Vec<String>,
    pub rows: Vec<(i64, Vec<f64>)>,
}

/// The first path not taken yet: `path` itself, then `stem_1.ext`, `stem_2.ext`, ...
pub fn rotated_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());

    (1u64..)
        .map(|n| {
            let name = match &extension {
                Some(ext) => format!("{}_{}.{}", stem, n, ext),
                None => format!("{}_{}", stem, n),
            };
            path.with_file_name(name)
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

fn format_cell(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        String::new()
    }
}

/// Writes `table` to `path`, replacing its contents.
pub fn write_log(path: &Path, table: &LogTable) -> Result<(), RecordError> {
    let wrap = |source: csv::Error| RecordError::Csv { path: path.to_path_buf(), source };

    let mut writer = csv::WriterBuilder::new().from_path(path).map_err(wrap)?;

    let header = std::iter::once("# t".to_string()).chain(table.names.iter().cloned());
    writer.write_record(header).map_err(wrap)?;
    for (step, values) in &table.rows {
        let record = std::iter::once(step.to_string()).chain(values.iter().map(|v| format_cell(*v)));
        writer.write_record(record).map_err(wrap)?;
    }
    writer.flush().map_err(|e| wrap(e.into()))?;

    debug!(path = %path.display(), rows = table.rows.len(), "Simulation log written");
    Ok(())
}
