use dmmt_core::{Model, ModelSpec};
use std::fs;
use std::path::Path;

fn model_with_files(dir: &Path) -> Model {
    let data = dir.join("data.csv");
    fs::write(&data, "# t,U\n1,10\n2,20\n3,30\n9,90\n").unwrap();

    let source = dir.join("model.yml");
    fs::write(
        &source,
        format!(
            r#"
functions:
  - "X[0] = 0"
  - "X[t] = X[t-1] + U[t]"
simulation:
  target: ["X[3]"]
logging:
  "{}": [X, "U[t]"]
external:
  - "{}"
"#,
            dir.join("run.log").display(),
            data.display()
        ),
    )
    .unwrap();

    Model::from_files(&[source]).unwrap()
}

#[test]
fn test_external_series_feed_the_simulation() {
    let dir = tempfile::tempdir().unwrap();
    let mut m = model_with_files(dir.path());
    assert_eq!(m.process_input("").unwrap(), "60");
    // Preloaded values survive every transaction.
    assert_eq!(m.process_input("").unwrap(), "60");
}

#[test]
fn test_one_log_file_per_run() {
    let dir = tempfile::tempdir().unwrap();
    let expected = "# t,X,U\n0,0,\n1,10,10\n2,30,20\n3,60,30\n";

    let mut first_run = model_with_files(dir.path());
    for _ in 0..3 {
        first_run.process_input("").unwrap();
        assert_eq!(first_run.write_logs().unwrap(), vec![dir.path().join("run.log")]);
    }
    assert_eq!(fs::read_to_string(dir.path().join("run.log")).unwrap(), expected);
    assert!(!dir.path().join("run_1.log").exists());

    let mut second_run = model_with_files(dir.path());
    second_run.process_input("").unwrap();
    assert_eq!(second_run.write_logs().unwrap(), vec![dir.path().join("run_1.log")]);
    second_run.process_input("").unwrap();
    assert_eq!(second_run.write_logs().unwrap(), vec![dir.path().join("run_1.log")]);
    assert_eq!(fs::read_to_string(dir.path().join("run_1.log")).unwrap(), expected);
    assert!(!dir.path().join("run_2.log").exists());
}

#[test]
fn test_missing_external_source_fails_the_load() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("model.yml");
    fs::write(
        &source,
        "functions: [\"X[0] = 1\", \"X[t] = X[t-1]\"]\nsimulation:\n  target: [\"X[2]\"]\nexternal: [/nonexistent/data.csv]\n",
    )
    .unwrap();
    assert!(Model::from_files(&[source]).is_err());
}

#[test]
fn test_merged_sources() {
    let dir = tempfile::tempdir().unwrap();
    let equations = dir.path().join("equations.yml");
    let simulation = dir.path().join("simulation.yml");
    fs::write(&equations, "functions:\n  - \"y1 = x1 + x2\"\n  - \"y2 = x1 * x2\"\n").unwrap();
    fs::write(&simulation, "simulation:\n  target: [y1, y2]\n  inputs: [x1, x2]\n").unwrap();

    let spec = ModelSpec::from_files(&[&equations, &simulation]).unwrap();
    let mut m = Model::new(&spec).unwrap();
    assert_eq!(m.process_input("3 2").unwrap(), "5 6");
}
