//! Preloading the series store from external CSV sources.
//!
//! The header's first cell must be `# t`; the remaining cells name base
//! variables. Each row's `t` cell selects the absolute step it fills.

use crate::compute::Ledger;
use crate::validation::ModelError;
use std::path::Path;
use tracing::{debug, warn};

/// Loads `path` into `ledger` and returns the number of cells written.
///
/// Sources without a `# t` header, and every source of a static model, are
/// skipped with a warning. Rows outside the ledger span are skipped.
pub fn load_external(path: &Path, ledger: &mut Ledger) -> Result<usize, ModelError> {
    if ledger.span().is_none() {
        warn!(path = %path.display(), "External data ignored: the model is static");
        return Ok(0);
    }

    let wrap = |source: csv::Error| ModelError::External { path: path.to_path_buf(), source };
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(wrap)?;

    let header = reader.headers().map_err(wrap)?.clone();
    let has_time_column = header
        .get(0)
        .and_then(|first| first.strip_prefix('#'))
        .map_or(false, |rest| rest.trim() == "t");
    if !has_time_column {
        warn!(path = %path.display(), "External source skipped: header must start with '# t'");
        return Ok(0);
    }

    let names: Vec<&str> = header.iter().skip(1).collect();
    for name in &names {
        ledger.ensure_column(name);
    }

    let mut written = 0;
    for record in reader.records() {
        let record = record.map_err(wrap)?;
        let step = match record.get(0).and_then(|cell| cell.parse::<f64>().ok()) {
            Some(t) if t.fract() == 0.0 => t as i64,
            _ => {
                warn!(path = %path.display(), row = ?record.position().map(|p| p.line()), "Row without an integer 't' skipped");
                continue;
            }
        };
        if !ledger.contains_step(step) {
            debug!(path = %path.display(), step, "Row outside the timeline skipped");
            continue;
        }
        for (name, cell) in names.iter().zip(record.iter().skip(1)) {
            if cell.is_empty() {
                continue;
            }
            match cell.parse::<f64>() {
                Ok(value) => {
                    ledger.insert(name, step, value);
                    written += 1;
                }
                Err(_) => warn!(path = %path.display(), step, column = %name, cell, "Non-numeric cell skipped"),
            }
        }
    }

    debug!(path = %path.display(), cells = written, "External source loaded");
    Ok(written)
}
