//! CLI integration tests

use std::process::Command;
use tempfile::TempDir;

fn vmcost() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_vmcost"));
    cmd.env_remove("VMCOST_SUBSCRIPTIONS")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = vmcost()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(
        stdout.contains("Azure VM cost"),
        "Should show app description"
    );
    assert!(stdout.contains("report"), "Should show report command");
    assert!(stdout.contains("quote"), "Should show quote command");
    assert!(stdout.contains("--config"), "Should show config option");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = vmcost()
        .arg("--version")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("vmcost"), "Should show binary name");
}

/// Test report subcommand help
#[test]
fn test_report_help() {
    let output = vmcost()
        .args(["report", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Report help should succeed");
    assert!(stdout.contains("--subscriptions"), "Should show subscriptions option");
    assert!(stdout.contains("--output-dir"), "Should show output dir option");
    assert!(stdout.contains("--refresh-pricing"), "Should show refresh option");
}

/// Test quote subcommand help
#[test]
fn test_quote_help() {
    let output = vmcost()
        .args(["quote", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Quote help should succeed");
    assert!(stdout.contains("--region"), "Should show region option");
    assert!(stdout.contains("--size"), "Should show size option");
    assert!(stdout.contains("--ahb"), "Should show ahb option");
}

/// Test that quote requires a region and size
#[test]
fn test_quote_requires_region() {
    let output = vmcost()
        .args(["quote", "--size", "Standard_D2s_v3"])
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "Missing region should fail");
    assert!(stderr.contains("--region"), "Should name the missing option");
}

/// Test that an unknown OS is rejected
#[test]
fn test_quote_rejects_unknown_os() {
    let output = vmcost()
        .args(["quote", "--region", "eastus", "--size", "B2s", "--os", "macos"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Unknown OS should fail");
}

/// Test that invalid subscription IDs fail without contacting Azure
#[test]
fn test_report_with_only_invalid_subscriptions_fails() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("vmcost.toml");
    std::fs::write(&config, "").unwrap();
    let out = dir.path().join("out");

    let output = vmcost()
        .current_dir(dir.path())
        .args(["--config"])
        .arg(&config)
        .args(["report", "--subscriptions", "not-a-guid,also-bad", "--output-dir"])
        .arg(&out)
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "No successful subscription should fail the run");
    assert!(stdout.contains("0 of 2 subscriptions succeeded"));
    assert!(
        stdout.contains("[1/2] Processing subscription not-a-guid"),
        "Should report progress as each subscription starts"
    );
    assert!(stdout.contains("[2/2] Processing subscription also-bad"));
    assert!(stderr.contains("not a valid subscription ID"));
    assert!(out.join("output.json").exists(), "Rows file should still be written");
    assert!(out.join("vm_cost_report.html").exists(), "HTML report should still be written");
}
