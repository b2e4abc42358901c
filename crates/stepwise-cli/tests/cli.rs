use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn stepwise(project: &Path) -> Command {
    let mut cmd = Command::cargo_bin("stepwise").unwrap();
    cmd.arg("-C").arg(project);
    cmd
}

fn write_project(root: &Path) {
    let data = root.join("data");
    fs::create_dir_all(data.join("scenarios/1")).unwrap();
    let years: String = (1990..2000).map(|y| format!("{y}\n")).collect();
    fs::write(data.join("YEAR.csv"), format!("VALUE\n{years}")).unwrap();
    fs::write(
        data.join("TotalAnnualMaxCapacity.csv"),
        "REGION,TECHNOLOGY,YEAR,VALUE\nUTOPIA,E01,1990,10\nUTOPIA,E01,1995,10\n",
    )
    .unwrap();
    fs::write(
        data.join("scenarios/1/A.csv"),
        "OPTION,PARAMETER,REGION,TECHNOLOGY,YEAR,VALUE\n\
         0,TotalAnnualMaxCapacity,UTOPIA,E01,1996,5\n\
         1,TotalAnnualMaxCapacity,UTOPIA,E01,1996,6\n",
    )
    .unwrap();
}

#[test]
fn setup_creates_layout_and_config() {
    let dir = tempdir().unwrap();
    stepwise(dir.path())
        .arg("setup")
        .assert()
        .success()
        .stdout(predicate::str::contains("data/scenarios/"));
    for sub in ["data/scenarios", "logs", "model", "results", "steps"] {
        assert!(dir.path().join(sub).is_dir(), "{sub} missing");
    }
    assert!(dir.path().join("stepwise.toml").is_file());

    stepwise(dir.path()).arg("setup").assert().success();
}

#[test]
fn plan_lists_steps_and_scenarios() {
    let dir = tempdir().unwrap();
    write_project(dir.path());
    stepwise(dir.path())
        .args(["plan", "--step-length", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1990-1994"))
        .stdout(predicate::str::contains("Scenarios (2)"))
        .stdout(predicate::str::contains("1A0"))
        .stdout(predicate::str::contains("1A1"));
}

#[test]
fn plan_reads_step_length_from_config() {
    let dir = tempdir().unwrap();
    write_project(dir.path());
    fs::write(dir.path().join("stepwise.toml"), "step_length = [1, 5]\n").unwrap();
    let output = stepwise(dir.path())
        .args(["plan", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let steps = plan["steps"].as_array().unwrap();
    assert_eq!(steps[0]["actual_years"], serde_json::json!([1990]));
    assert_eq!(steps.len(), 3);
}

#[test]
fn missing_step_length_exits_with_configuration_code() {
    let dir = tempdir().unwrap();
    write_project(dir.path());
    stepwise(dir.path())
        .arg("plan")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("step length"));
}

#[test]
fn run_without_model_file_is_a_configuration_error() {
    let dir = tempdir().unwrap();
    write_project(dir.path());
    stepwise(dir.path())
        .args(["run", "--step-length", "5", "--solver", "cbc"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("model file"));
}

#[test]
fn run_rejects_unknown_solver() {
    let dir = tempdir().unwrap();
    write_project(dir.path());
    stepwise(dir.path())
        .args(["run", "--step-length", "5", "--solver", "simplex9000"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("simplex9000"));
}
