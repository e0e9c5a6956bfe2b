//! CLI command integration tests.
//! Each test uses a temp directory via PHARMAKON_DATA_DIR for full isolation.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn pharmakon_cmd(data_dir: &TempDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("pharmakon").unwrap();
    cmd.env("PHARMAKON_DATA_DIR", data_dir.path());
    cmd.env_remove("RUST_LOG");
    cmd
}

fn write_acute_stress(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("acute.json");
    std::fs::write(
        &path,
        r#"{
            "version": "10.0",
            "Sympathetic_Surge": 0.9, "Cortisol": 0.6, "Heart_Rate": 0.8,
            "Fear": 0.8, "Joy": 0.1, "Anger": 0.5,
            "Recursive_Overthinking": 0.8, "Ego_Oscillation": 0.7,
            "Lucidity": 0.8, "Meta_Cognition": 0.6,
            "Confirmation": 0.7, "Dunning_Kruger": 0.6, "Overconfidence": 0.7,
            "Coherence": 0.4, "Continuity": 0.5, "Arc": 0.3,
            "Delusionality": 0.3, "Dogma_Fixation": 0.2
        }"#,
    )
    .unwrap();
    path
}

#[test]
fn classify_worked_example() {
    let dir = TempDir::new().unwrap();
    pharmakon_cmd(&dir)
        .args(["classify", "-i", "0.85", "-e", "0.75", "-b", "0.85"])
        .assert()
        .success()
        .stdout(predicate::str::contains("position: Delusional_Defense"))
        .stdout(predicate::str::contains("Stability"))
        .stdout(predicate::str::contains("0.0956"));
}

#[test]
fn classify_json() {
    let dir = TempDir::new().unwrap();
    let output = pharmakon_cmd(&dir)
        .args(["classify", "--json", "-i", "0.85", "-e", "0.75", "-b", "0.8"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        value["classification"]["position"],
        "Position_1_Epistemic_Arrogance"
    );
    assert_eq!(value["state"]["S"], 0.85);
}

#[test]
fn refined_stress_amplification() {
    let dir = TempDir::new().unwrap();
    pharmakon_cmd(&dir)
        .args([
            "refined", "-i", "0.8", "--somatic", "0.9", "--cognitive", "0.3", "-b", "0.4",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Stress_Amplification"))
        .stdout(predicate::str::contains("Energy_Mismatch"));
}

#[test]
fn assess_multi_domain_file() {
    let dir = TempDir::new().unwrap();
    let path = write_acute_stress(&dir);
    pharmakon_cmd(&dir)
        .arg("assess")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("bias_cascade"))
        .stdout(predicate::str::contains("0.6400"))
        .stdout(predicate::str::contains("Ego_Instability"))
        .stdout(predicate::str::contains("triangle: Position_2_Meta_Awareness_Trap"))
        .stdout(predicate::str::contains("Metacognitive Monitoring Practice"));
}

#[test]
fn assess_uses_config_thresholds() {
    let dir = TempDir::new().unwrap();
    let path = write_acute_stress(&dir);
    std::fs::write(dir.path().join("config.toml"), "[flags]\nego_osc = 0.9\n").unwrap();

    let output = pharmakon_cmd(&dir).arg("assess").arg(&path).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("Ego_Instability"));
    assert!(stdout.contains("Recursive_Rumination"));
}

#[test]
fn bad_config_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = write_acute_stress(&dir);
    let config = dir.path().join("weights.toml");
    std::fs::write(&config, "[weights.stress]\nFear = 0.5\n").unwrap();

    pharmakon_cmd(&dir)
        .arg("assess")
        .arg(&path)
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("weights.toml"));
}

#[test]
fn simulate_writes_table_and_final_state() {
    let dir = TempDir::new().unwrap();
    let path = write_acute_stress(&dir);
    let out = dir.path().join("final.json");

    let output = pharmakon_cmd(&dir)
        .args(["simulate", "--points", "5", "--method", "rk23", "--out"])
        .arg(&out)
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 6);
    assert!(lines[0].starts_with("t,"));
    assert!(lines[0].contains("Fear"));
    assert!(lines[5].starts_with("10.000000,"));

    let saved = std::fs::read_to_string(&out).unwrap();
    assert!(saved.contains("\"version\": \"10.0\""));
}

#[test]
fn simulate_json() {
    let dir = TempDir::new().unwrap();
    let path = write_acute_stress(&dir);
    let output = pharmakon_cmd(&dir)
        .args(["simulate", "--json", "--points", "3", "--t1", "2.0"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["method"], "RK45");
    assert_eq!(value["times"].as_array().unwrap().len(), 3);
    assert_eq!(value["times"][2], 2.0);
    assert_eq!(value["names"].as_array().unwrap().len(), 31);
}

#[test]
fn simulate_rejects_unknown_method() {
    let dir = TempDir::new().unwrap();
    let path = write_acute_stress(&dir);
    pharmakon_cmd(&dir)
        .args(["simulate", "--method", "LSODA"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("LSODA"));
}

#[test]
fn save_list_export_delete() {
    let dir = TempDir::new().unwrap();
    let path = write_acute_stress(&dir);

    let output = pharmakon_cmd(&dir)
        .args(["save", "--label", "morning"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());
    let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
    assert_eq!(id.len(), 36);

    pharmakon_cmd(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains(&id))
        .stdout(predicate::str::contains("multi_domain"))
        .stdout(predicate::str::contains("morning"));

    pharmakon_cmd(&dir)
        .args(["export", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"Fear\": 0.8"));

    pharmakon_cmd(&dir)
        .args(["delete", &id])
        .assert()
        .success();

    pharmakon_cmd(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("(no records)"));

    pharmakon_cmd(&dir)
        .args(["export", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no record"));
}
