// Integration tests for the ecsdeploy binary

use anyhow::Result;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ecsdeploy"))
        .args(args)
        .current_dir(dir)
        .env_remove("ECSDEPLOY_CONFIG")
        .env_remove("ECSDEPLOY_CONFIG_CONTENT")
        .env_remove("ECSDEPLOY_LOG_LEVEL")
        .env_remove("ECSDEPLOY_LOG_FORMAT")
        .env_remove("AWS_LAMBDA_FUNCTION_NAME")
        .env("RUST_LOG", "error")
        .output()
        .expect("Failed to run binary")
}

#[test]
fn test_cli_help() {
    let dir = TempDir::new().unwrap();
    let output = run(dir.path(), &["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("synth"));
    assert!(stdout.contains("graph"));
    assert!(stdout.contains("validate"));
    assert!(stdout.contains("--config"));
}

#[test]
fn test_synth_writes_main_tf_json() -> Result<()> {
    let dir = TempDir::new()?;
    let output = run(dir.path(), &["synth", "--out", "build"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let written = dir.path().join("build").join("main.tf.json");
    let content = std::fs::read_to_string(&written)?;
    let document: serde_json::Value = serde_json::from_str(&content)?;
    assert_eq!(document["provider"]["aws"]["region"], "ap-northeast-1");
    assert!(document["resource"]["aws_lambda_function"]["cdktf_for_slack_api"].is_object());
    assert!(!content.contains("xoxb-"));
    Ok(())
}

#[test]
fn test_synth_default_out_dir() {
    let dir = TempDir::new().unwrap();
    let output = run(dir.path(), &["synth"]);
    assert!(output.status.success());
    assert!(dir.path().join("ecsdeploy.out/main.tf.json").exists());
}

#[test]
fn test_config_file_is_applied() -> Result<()> {
    let dir = TempDir::new()?;
    std::fs::write(
        dir.path().join("stack.toml"),
        "[compute]\ndesired_count = 3\nimage_tag = \"v42\"\n",
    )?;
    let output = run(dir.path(), &["--config", "stack.toml", "synth", "--out", "out"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let document: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("out/main.tf.json"))?)?;
    let service = &document["resource"]["aws_ecs_service"]["container-for-cdktf-service"];
    assert_eq!(service["desired_count"], 3);
    Ok(())
}

#[test]
fn test_graph_prints_one_line_per_declaration() {
    let dir = TempDir::new().unwrap();
    let output = run(dir.path(), &["graph"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.lines().any(|line| line == "aws_vpc.cdktf-production"));
    assert!(stdout
        .lines()
        .any(|line| line.starts_with("aws_ecs_service.container-for-cdktf-service -> ")));
    // Nothing is written
    assert!(!dir.path().join("ecsdeploy.out").exists());
}

#[test]
fn test_validate_rejects_bad_config() -> Result<()> {
    let dir = TempDir::new()?;
    std::fs::write(dir.path().join("bad.toml"), "[compute]\nimage_tag = \"bad tag\"\n")?;
    let output = run(dir.path(), &["--config", "bad.toml", "validate"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to load config"));

    let ok = run(dir.path(), &["validate"]);
    assert!(ok.status.success());
    assert!(String::from_utf8_lossy(&ok.stdout).starts_with("ok: "));
    Ok(())
}

#[test]
fn test_load_warnings_reach_stderr() -> Result<()> {
    let dir = TempDir::new()?;
    std::fs::write(dir.path().join("idle.toml"), "[compute]\ndesired_count = 0\n")?;

    for command in ["synth", "graph"] {
        let output = run(dir.path(), &["--config", "idle.toml", command]);
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(
            stderr.contains("compute.desired_count is 0"),
            "{command}: {stderr}"
        );
    }

    let quiet = run(dir.path(), &["--log-level", "error", "--config", "idle.toml", "synth"]);
    assert!(quiet.status.success());
    assert!(!String::from_utf8_lossy(&quiet.stderr).contains("desired_count"));
    Ok(())
}
