use dmmt_core::compute::CompileError;
use dmmt_core::{ComputationError, Model, ModelError, ModelSpec, Timeline, ValidationErrorType, VarRef};
use rstest::rstest;

fn model(yaml: &str) -> Model {
    Model::new(&ModelSpec::parse(yaml).unwrap()).unwrap()
}

fn load_error(yaml: &str) -> ModelError {
    match Model::new(&ModelSpec::parse(yaml).unwrap()) {
        Ok(_) => panic!("model should not load"),
        Err(e) => e,
    }
}

const CALC: &str = r#"
functions:
  - "y1 = x1 + x2"
simulation:
  target: [y1]
  inputs: [x1, x2]
"#;

const FIBONACCI: &str = r#"
functions:
  - "F[0] = 0"
  - "F[1] = 1"
  - "F[t] = F[t-1] + F[t-2]"
simulation:
  target: ["F[12]", "F[11]"]
"#;

#[rstest]
#[case("3 4", "7")]
#[case(".1 .1", "0.2")]
#[case("-1.5 0.5", "-1")]
fn test_static_calculator(#[case] line: &str, #[case] expected: &str) {
    let mut m = model(CALC);
    assert!(m.plan().is_static());
    assert_eq!(m.process_input(line).unwrap(), expected);
}

#[test]
fn test_static_model_answers_every_line() {
    let mut m = model(CALC);
    assert_eq!(m.process_input("1 2").unwrap(), "3");
    assert_eq!(m.process_input("10 20").unwrap(), "30");
}

#[test]
fn test_fibonacci() {
    let mut m = model(FIBONACCI);
    assert_eq!(m.plan().timeline, Some(Timeline { start: 0, end: 12 }));
    let work: Vec<&str> = m.plan().step_work_list.iter().map(VarRef::text).collect();
    assert_eq!(work, vec!["F[t]"]);

    assert_eq!(m.process_input(" ").unwrap(), "144 89");
    assert_eq!(m.calculate(&VarRef::parse("F[1]").unwrap()).unwrap().as_scalar(), Ok(1.0));
}

#[test]
fn test_forward_lag_through_lag_search() {
    let mut m = model(
        r#"
functions:
  - "X[t] = X[t-1] * 2"
  - "X[0] = 1"
simulation:
  target: ["X[2]"]
"#,
    );
    m.load_inputs("").unwrap();
    assert_eq!(m.current_step(), 0);
    assert_eq!(m.calculate(&VarRef::parse("X[t+2]").unwrap()).unwrap().as_scalar(), Ok(4.0));
    assert_eq!(m.process_input("").unwrap(), "4");
}

#[test]
fn test_inputs_drive_dynamic_model() {
    let mut m = model(
        r#"
functions:
  - "S[t] = S[t-1] * (1 + r) + deposit"
simulation:
  target: ["S[3]"]
  inputs: ["S[0]", r, deposit]
"#,
    );
    assert_eq!(m.plan().timeline, Some(Timeline { start: 0, end: 3 }));
    assert_eq!(m.process_input("100 0.5 10").unwrap(), "385");
}

#[test]
fn test_vector_input_feeds_builtins() {
    let mut m = model(
        r#"
functions:
  - "total = sum(P) + max(P) - min(P)"
  - "avg = mean(P)"
simulation:
  target: [total, avg]
  inputs: [{P: {length: 3}}]
"#,
    );
    assert_eq!(m.process_input("1 2 6").unwrap(), "14 3");
}

#[test]
fn test_rbf_with_keyword_arguments() {
    let mut m = model(
        r#"
functions:
  - "y = rbf(x, param=P, n_nodes=1)"
simulation:
  target: [y]
  inputs: [x, {P: {length: 4}}]
"#,
    );
    assert_eq!(m.process_input("1 1 2 3 0.5").unwrap(), "3.5");
}

#[test]
fn test_ternary_and_time_symbol() {
    let mut m = model(
        r#"
functions:
  - "X[0] = 0"
  - "X[t] = X[t-1] + (1 if t % 2 == 0 else 0)"
simulation:
  target: ["X[6]"]
"#,
    );
    assert_eq!(m.process_input("").unwrap(), "3");
}

#[test]
fn test_power_guard_fails_the_line_only() {
    let mut m = model(
        r#"
functions:
  - "y = x ^ 2"
simulation:
  target: [y]
  inputs: [x]
"#,
    );
    assert!(matches!(m.process_input("101"), Err(ComputationError::PowerOverflow { .. })));
    assert_eq!(m.process_input("100").unwrap(), "10000");
}

#[test]
fn test_unevaluable_variable_at_runtime() {
    let mut m = model("functions: [\"y = z + 1\"]\nsimulation:\n  target: [y]\n");
    assert!(matches!(m.process_input(""), Err(ComputationError::Unevaluable { .. })));
}

#[rstest]
#[case("y = __import__(x)")]
#[case("y = x.real")]
#[case("y = open(x)")]
#[case("y = sum")]
#[case("y = lambda: 1")]
fn test_sandbox_rejects_equations(#[case] equation: &str) {
    let yaml = format!("functions: [\"{}\"]\nsimulation:\n  target: [y]\n  inputs: [x]\n", equation);
    match load_error(&yaml) {
        ModelError::Equation { source, .. } => {
            assert!(
                matches!(source, CompileError::SandboxViolation(_) | CompileError::Lex(_) | CompileError::Syntax { .. }),
                "{:?}",
                source
            );
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_unrecognized_output_token() {
    let err = load_error("functions: [\"y + 1 = x\"]\nsimulation:\n  target: [y]\n");
    assert!(matches!(err, ModelError::Equation { source: CompileError::UnrecognizedToken(_), .. }));
}

#[test]
fn test_relative_target_is_rejected() {
    let err = load_error("functions: [\"X[t] = 1\"]\nsimulation:\n  target: [\"X[t]\"]\n");
    assert_eq!(err.validation_errors()[0].error_type, ValidationErrorType::RelativeTarget);
}

#[test]
fn test_missing_targets() {
    let err = load_error("functions: [\"y = 1\"]\n");
    assert_eq!(err.validation_errors()[0].error_type, ValidationErrorType::NoTargets);
}

#[test]
fn test_cyclic_definition_is_rejected() {
    let err = load_error("functions: [\"a = b + 1\", \"b = a\"]\nsimulation:\n  target: [a]\n");
    assert_eq!(err.validation_errors()[0].error_type, ValidationErrorType::CyclicDefinition);
}

#[test]
fn test_dynamic_model_without_initial_condition() {
    let err = load_error("functions: [\"X[t] = X[t-1] + 1\"]\nsimulation:\n  target: [\"X[3]\"]\n");
    assert!(matches!(err, ModelError::NoInitialCondition(name) if name == "X"));
}

#[test]
fn test_plan_json() {
    let m = model(FIBONACCI);
    let json = serde_json::to_value(m.plan()).unwrap();
    assert_eq!(json["timeline"]["end"], 12);
    assert_eq!(json["clock_period"], 0);
}

#[test]
fn test_input_reaching_past_the_timeline_end() {
    let mut m = model(
        r#"
functions:
  - "Y[0] = 0"
  - "Y[t] = Z[t+1]"
  - "Z[t] = t * 2"
simulation:
  target: ["Y[3]"]
"#,
    );
    assert_eq!(m.plan().timeline, Some(Timeline { start: 0, end: 3 }));
    assert_eq!(m.process_input("").unwrap(), "8");
}

#[test]
fn test_declared_input_breaks_a_definition_cycle() {
    let mut m = model(
        r#"
functions:
  - "x = y + 1"
  - "y = x * 2"
simulation:
  target: [y]
  inputs: [x]
"#,
    );
    assert_eq!(m.process_input("3").unwrap(), "6");
}

#[rstest]
#[case("F[ 12 ]")]
#[case("F[12 ]")]
fn test_whitespace_in_target_index(#[case] target: &str) {
    let yaml = FIBONACCI.replace("[\"F[12]\", \"F[11]\"]", &format!("[\"{}\"]", target));
    let mut m = model(&yaml);
    assert_eq!(m.targets()[0].text(), "F[12]");
    assert_eq!(m.process_input("").unwrap(), "144");
}

#[test]
fn test_whitespace_in_input_index() {
    let mut m = model(
        r#"
functions:
  - "S[t] = S[t-1] + 1"
simulation:
  target: ["S[2]"]
  inputs: ["S[ 0 ]"]
"#,
    );
    assert_eq!(m.process_input("5").unwrap(), "7");
}

#[test]
fn test_unaddressable_timeline_fails_the_load() {
    let err = load_error("functions: [\"X[0] = 1\", \"X[t] = X[t-1]\"]\nsimulation:\n  target: [\"X[9223372036854775807]\"]\n");
    assert!(matches!(err, ModelError::InfeasibleSimulation { .. }));
}
