//! Model specification loading.
//!
//! A model is described by one or more YAML sources. Each may carry:
//!
//! ```yaml
//! functions:            # alias: equations
//!   - "F[0] = 0"
//!   - "F[1] = 1"
//!   - "F[t] = F[t-1] + F[t-2]"
//! simulation:
//!   target: ["F[12]", "F[11]"]
//!   inputs: ["x", {"P": {"length": 7}}]
//! logging:              # CSV file -> references to record
//!   simulation.log: ["F"]
//! external:             # CSV files preloading the series store
//!   - data.csv
//! ```
//!
//! Sources merge in order: lists concatenate, logging maps merge.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::store::{ReferenceError, VarRef};

/// Errors that can occur when loading a model specification.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a source file from disk.
    #[error("failed to read model source: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse model YAML: {source}")]
    Yaml { source: serde_yml::Error },

    /// The YAML is well-formed but describes something unusable.
    #[error("invalid model source: {0}")]
    Invalid(String),
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Per-input options of a `{name: {...}}` declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InputOptions {
    /// Number of consecutive values the input consumes from each line.
    #[serde(default)]
    pub length: Option<usize>,
}

/// One entry of `simulation.inputs`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum InputDecl {
    Name(String),
    Detailed(BTreeMap<String, InputOptions>),
}

impl InputDecl {
    /// The declared reference, carrying its vector length if any.
    pub fn to_reference(&self) -> Result<VarRef, ConfigError> {
        let invalid = |e: ReferenceError| ConfigError::Invalid(e.to_string());
        match self {
            InputDecl::Name(text) => VarRef::parse(text.trim()).map_err(invalid),
            InputDecl::Detailed(map) => {
                let mut entries = map.iter();
                match (entries.next(), entries.next()) {
                    (Some((text, options)), None) => {
                        let reference = VarRef::parse(text.trim()).map_err(invalid)?;
                        Ok(match options.length {
                            Some(length) => reference.with_length(length),
                            None => reference,
                        })
                    }
                    _ => Err(ConfigError::Invalid(format!(
                        "an input declaration must name exactly one variable, got {}",
                        map.len()
                    ))),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SimulationSection {
    #[serde(default)]
    target: Option<Vec<String>>,
    #[serde(default)]
    inputs: Option<Vec<InputDecl>>,
}

/// The raw shape of one YAML source. Every key is optional and may be null.
#[derive(Debug, Clone, Default, Deserialize)]
struct SourceDocument {
    #[serde(default, alias = "equations")]
    functions: Option<Vec<String>>,
    #[serde(default)]
    simulation: Option<SimulationSection>,
    #[serde(default)]
    logging: Option<BTreeMap<PathBuf, Vec<String>>>,
    #[serde(default)]
    external: Option<Vec<PathBuf>>,
}

/// The merged specification of a model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelSpec {
    pub equations: Vec<String>,
    pub targets: Vec<String>,
    pub inputs: Vec<InputDecl>,
    pub logging: BTreeMap<PathBuf, Vec<String>>,
    pub external: Vec<PathBuf>,
}

impl ModelSpec {
    /// Parses a single YAML source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let doc: SourceDocument = serde_yml::from_str(yaml)?;
        let simulation = doc.simulation.unwrap_or_default();
        Ok(Self {
            equations: doc.functions.unwrap_or_default(),
            targets: simulation.target.unwrap_or_default(),
            inputs: simulation.inputs.unwrap_or_default(),
            logging: doc.logging.unwrap_or_default(),
            external: doc.external.unwrap_or_default(),
        })
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Loads and merges several sources in order.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self, ConfigError> {
        let mut spec = Self::default();
        for path in paths {
            spec.merge(Self::from_file(path.as_ref())?);
        }
        Ok(spec)
    }

    pub fn merge(&mut self, other: ModelSpec) {
        self.equations.extend(other.equations);
        self.targets.extend(other.targets);
        self.inputs.extend(other.inputs);
        for (file, refs) in other.logging {
            self.logging.entry(file).or_default().extend(refs);
        }
        self.external.extend(other.external);
    }
}
