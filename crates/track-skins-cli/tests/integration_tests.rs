//! Integration tests for skinctl

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn skinctl() -> Result<Command, Box<dyn std::error::Error>> {
    Ok(Command::cargo_bin("skinctl")?)
}

/// Track folder with a red and a blue livery sharing `body.dds`
fn create_track(dir: &TempDir) -> std::io::Result<PathBuf> {
    let track = dir.path().join("spa");
    for skin in ["red", "blue"] {
        let skin_dir = track.join("skins").join("cm_skins").join(skin);
        fs::create_dir_all(&skin_dir)?;
        fs::write(skin_dir.join("body.dds"), skin)?;
        fs::write(skin_dir.join("preview.png"), skin)?;
    }
    Ok(track)
}

fn json_output(output: &[u8]) -> Result<Value, Box<dyn std::error::Error>> {
    Ok(serde_json::from_slice(output)?)
}

fn output_file(track: &Path, name: &str) -> PathBuf {
    track.join("skins").join("default").join(name)
}

#[test]
fn test_list_json() -> TestResult {
    let dir = TempDir::new()?;
    let track = create_track(&dir)?;

    let output = skinctl()?
        .args(["--json", "list"])
        .arg(&track)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = json_output(&output)?;
    assert_eq!(value["track"], "spa");
    let ids: Vec<&str> = value["skins"]
        .as_array()
        .map(|skins| skins.iter().filter_map(|s| s["id"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(ids, ["blue", "red"]);
    Ok(())
}

#[test]
fn test_plan_does_not_touch_output() -> TestResult {
    let dir = TempDir::new()?;
    let track = create_track(&dir)?;

    skinctl()?
        .arg("plan")
        .arg(&track)
        .args(["--activate", "red"])
        .assert()
        .success()
        .stdout(predicate::str::contains("body.dds"));

    assert!(!output_file(&track, "body.dds").exists());
    Ok(())
}

#[test]
fn test_compose_then_plan_is_up_to_date() -> TestResult {
    let dir = TempDir::new()?;
    let track = create_track(&dir)?;

    let output = skinctl()?
        .args(["--json", "compose"])
        .arg(&track)
        .args(["--activate", "blue"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let value = json_output(&output)?;
    assert_eq!(value["report"]["created"], 1);
    assert_eq!(fs::read_to_string(output_file(&track, "body.dds"))?, "blue");
    assert!(!output_file(&track, "preview.png").exists());

    skinctl()?
        .arg("plan")
        .arg(&track)
        .assert()
        .success()
        .stdout(predicate::str::contains("up to date"));
    Ok(())
}

#[test]
fn test_unknown_skin_exit_code() -> TestResult {
    let dir = TempDir::new()?;
    let track = create_track(&dir)?;

    skinctl()?
        .arg("compose")
        .arg(&track)
        .args(["--activate", "green"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Skin not found: green"));
    Ok(())
}

#[test]
fn test_missing_track_exit_code() -> TestResult {
    let dir = TempDir::new()?;

    skinctl()?
        .args(["--json", "list"])
        .arg(dir.path().join("nowhere"))
        .assert()
        .code(2)
        .stdout(predicate::str::contains("\"success\": false"));
    Ok(())
}

#[test]
fn test_invalid_config_exit_code() -> TestResult {
    let dir = TempDir::new()?;
    let track = create_track(&dir)?;
    let config = dir.path().join("config.json");
    fs::write(&config, r#"{ "retry_attempts": 0 }"#)?;

    skinctl()?
        .arg("--config")
        .arg(&config)
        .arg("list")
        .arg(&track)
        .assert()
        .code(4);
    Ok(())
}
