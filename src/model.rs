//! The simulation driver: builds a model from its specification and answers
//! one line of inputs with one line of target values.

use crate::analysis::topology::SimulationPlan;
use crate::compute::{ComputationError, Engine, Equation, Ledger, Value, DEFAULT_MAX_DEPTH};
use crate::config::ModelSpec;
use crate::persist::{self, LogTable, RecordError};
use crate::store::{IndexKind, Registry, VarRef};
use crate::validation::{ModelError, Validator};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct Model {
    registry: Registry,
    targets: Vec<VarRef>,
    declared: Vec<VarRef>,
    plan: SimulationPlan,
    logging: BTreeMap<PathBuf, Vec<String>>,
    // Configured log path -> file this run writes to, fixed on first write.
    log_files: BTreeMap<PathBuf, PathBuf>,

    // Store state at the start of every transaction (external data only).
    baseline: Ledger,
    ledger: Ledger,
    cache: HashMap<VarRef, Value>,
    current_step: i64,
    max_depth: usize,
}

impl Model {
    pub fn new(spec: &ModelSpec) -> Result<Self, ModelError> {
        let mut registry = Registry::new();
        for text in spec.equations.iter().filter(|e| !e.trim().is_empty()) {
            let equation = Equation::parse(text)
                .map_err(|source| ModelError::Equation { equation: text.clone(), source })?;
            registry.add_equation(equation);
        }

        let targets = spec
            .targets
            .iter()
            .map(|t| VarRef::parse(t.trim()))
            .collect::<Result<Vec<_>, _>>()?;

        let mut declared = Vec::with_capacity(spec.inputs.len());
        for decl in &spec.inputs {
            let reference = decl.to_reference()?;
            if reference.is_relative() {
                warn!(input = %reference, "Relatively indexed input dropped");
                continue;
            }
            declared.push(reference);
        }

        Validator::new(&registry, &targets, &declared).validate().map_err(ModelError::Validation)?;
        let plan = SimulationPlan::build(&registry, &targets, &declared)?;

        let mut baseline = match plan.timeline {
            Some(timeline) => Ledger::for_span(timeline.start, timeline.end),
            None => Ledger::new(),
        };
        for name in registry.base_names() {
            baseline.ensure_column(name);
        }
        for path in &spec.external {
            persist::load_external(path, &mut baseline)?;
        }

        info!(
            equations = registry.count(),
            targets = targets.len(),
            inputs = declared.len(),
            dynamic = !plan.is_static(),
            "Model loaded"
        );

        Ok(Self {
            registry,
            targets,
            declared,
            plan,
            logging: spec.logging.clone(),
            log_files: BTreeMap::new(),
            ledger: baseline.clone(),
            baseline,
            cache: HashMap::new(),
            current_step: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        })
    }

    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self, ModelError> {
        Self::new(&ModelSpec::from_files(paths)?)
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn plan(&self) -> &SimulationPlan { &self.plan }
    pub fn registry(&self) -> &Registry { &self.registry }
    pub fn targets(&self) -> &[VarRef] { &self.targets }
    pub fn declared_inputs(&self) -> &[VarRef] { &self.declared }
    pub fn ledger(&self) -> &Ledger { &self.ledger }
    pub fn current_step(&self) -> i64 { self.current_step }
    pub fn input_value(&self, reference: &VarRef) -> Option<&Value> { self.cache.get(reference) }

    /// Resets the store to its baseline and binds one line of input values,
    /// in declaration order.
    pub fn load_inputs(&mut self, line: &str) -> Result<(), ComputationError> {
        self.ledger = self.baseline.clone();
        self.cache.clear();
        self.current_step = 0;

        let mut tokens = line.split_whitespace();
        for input in &self.declared {
            let needed = input.width();
            let mut values = Vec::with_capacity(needed);
            for token in tokens.by_ref().take(needed) {
                values.push(token.parse::<f64>().map_err(|_| ComputationError::InvalidInput(token.to_string()))?);
            }
            if values.len() < needed {
                return Err(ComputationError::InputExhausted {
                    input: input.to_string(),
                    needed,
                    available: values.len(),
                });
            }

            let first = match input.kind() {
                IndexKind::Absolute(k) => Some(k),
                IndexKind::Sliced { lower, .. } => lower.or_else(|| self.plan.timeline.map(|t| t.start)),
                IndexKind::None | IndexKind::Relative(_) => None,
            };
            if let Some(first) = first {
                for (offset, value) in values.iter().enumerate() {
                    let Some(step) = i64::try_from(offset).ok().and_then(|o| first.checked_add(o)) else { break };
                    self.ledger.insert(input.name(), step, *value);
                }
            }

            let cached = match input.kind() {
                IndexKind::Absolute(_) => Value::Scalar(values[0]),
                IndexKind::Sliced { .. } => Value::series(values),
                _ if needed == 1 => Value::Scalar(values[0]),
                _ => Value::series(values),
            };
            self.cache.insert(input.clone(), cached);
        }
        Ok(())
    }

    /// Steps through the timeline, storing every work-list reference. A no-op
    /// for static models.
    pub fn run_simulation(&mut self) -> Result<(), ComputationError> {
        let Some(timeline) = self.plan.timeline else { return Ok(()) };
        let mut engine =
            Engine::new(&self.registry, &self.declared, &self.cache, &mut self.ledger).with_max_depth(self.max_depth);

        for step in timeline.steps() {
            self.current_step = step;
            for reference in &self.plan.step_work_list {
                let Some(index) = reference.resolve(step) else { continue };
                if index > timeline.end {
                    continue;
                }
                let cell = reference.actualize(step)?;
                let value = engine.calculate(&cell, step)?.as_scalar()?;
                engine.record(&cell, index, value);
            }
        }
        debug!(steps = timeline.len(), "Simulation finished");
        Ok(())
    }

    /// Evaluates `target` at the current step.
    pub fn calculate(&mut self, target: &VarRef) -> Result<Value, ComputationError> {
        let step = self.current_step;
        Engine::new(&self.registry, &self.declared, &self.cache, &mut self.ledger)
            .with_max_depth(self.max_depth)
            .calculate(target, step)
    }

    /// Runs one full transaction: bind inputs, simulate, report every target.
    pub fn process_input(&mut self, line: &str) -> Result<String, ComputationError> {
        self.load_inputs(line)?;
        self.run_simulation()?;

        let targets = self.targets.clone();
        let mut results = Vec::with_capacity(targets.len());
        for target in &targets {
            results.push(self.calculate(target)?.as_scalar()?.to_string());
        }
        Ok(results.join(" "))
    }

    /// The line answered for an input line that failed: one `nan` per target.
    pub fn placeholder_line(&self) -> String {
        vec!["nan"; self.targets.len()].join(" ")
    }

    /// The values of `references` (by base name) for every simulated step.
    /// A static model yields a single row at step 0.
    pub fn log_table(&mut self, references: &[String]) -> LogTable {
        let mut names: Vec<String> = Vec::new();
        for text in references {
            let name = VarRef::parse(text.trim()).map(|r| r.name().to_string()).unwrap_or_else(|_| text.clone());
            if !names.contains(&name) {
                names.push(name);
            }
        }

        let rows = match self.plan.timeline {
            Some(timeline) => timeline
                .steps()
                .map(|step| {
                    let values = names.iter().map(|n| self.ledger.get(n, step).unwrap_or(f64::NAN)).collect();
                    (step, values)
                })
                .collect(),
            None => {
                let values = names
                    .iter()
                    .map(|n| {
                        VarRef::parse(n)
                            .ok()
                            .and_then(|r| self.calculate(&r).ok())
                            .and_then(|v| v.as_scalar().ok())
                            .unwrap_or(f64::NAN)
                    })
                    .collect();
                vec![(0, values)]
            }
        };

        LogTable { names, rows }
    }

    /// Writes every configured log and returns the paths written.
    ///
    /// The first call picks a file not left by an earlier run; later calls
    /// rewrite the same file with the latest transaction.
    pub fn write_logs(&mut self) -> Result<Vec<PathBuf>, RecordError> {
        let logging = self.logging.clone();
        let mut written = Vec::with_capacity(logging.len());
        for (path, references) in &logging {
            let table = self.log_table(references);
            let target = self.log_files.entry(path.clone()).or_insert_with(|| persist::rotated_path(path)).clone();
            persist::write_log(&target, &table)?;
            written.push(target);
        }
        Ok(written)
    }
}
