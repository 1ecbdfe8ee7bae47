use std::path::Path;
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

fn run_dinstaller(workdir: &Path, args: &[&str]) -> (bool, String, String) {
	let output = Command::new(env!("CARGO_BIN_EXE_dinstaller"))
		.current_dir(workdir)
		.env_remove("DINSTALLER_CONFIG")
		.env_remove("DINSTALLER_GATEWAY")
		.env_remove("DINSTALLER_BUS")
		.env_remove("DINSTALLER_PASSWORD")
		.env_remove("RUST_LOG")
		.args(args)
		.output()
		.expect("failed to execute dinstaller");

	let stdout = String::from_utf8_lossy(&output.stdout).to_string();
	let stderr = String::from_utf8_lossy(&output.stderr).to_string();
	(output.status.success(), stdout, stderr)
}

#[test]
fn config_merges_file_and_flags() {
	let tmp = TempDir::new().expect("temp dir should be created");
	let file = tmp.path().join("client.json");
	let content = r#"{"gatewayUrl": "http://installer:9090", "requestTimeoutMs": 0}"#;
	std::fs::write(&file, content).expect("config should be written");
	let path = file.to_str().expect("utf-8 path");

	let (success, stdout, stderr) = run_dinstaller(
		tmp.path(),
		&["--config", path, "--bus", "ws://installer:9090/cockpit/socket", "config"],
	);
	assert!(success, "config failed: {stderr}");

	let json: Value = serde_json::from_str(&stdout).expect("stdout should be JSON");
	assert_eq!(json["gatewayUrl"], "http://installer:9090");
	assert_eq!(json["busUrl"], "ws://installer:9090/cockpit/socket");
	assert_eq!(json["loginPath"], "/cockpit/login");
	assert_eq!(json["requestTimeoutMs"], 0);
}

#[test]
fn malformed_config_exits_with_error() {
	let tmp = TempDir::new().expect("temp dir should be created");
	let file = tmp.path().join("client.json");
	std::fs::write(&file, "{ not json").expect("config should be written");

	let path = file.to_str().expect("utf-8 path");

	let (success, stdout, stderr) = run_dinstaller(tmp.path(), &["--config", path, "config"]);
	assert!(!success);
	assert!(stdout.is_empty());
	assert!(stderr.contains("Invalid configuration"), "stderr: {stderr}");
}

#[test]
fn option_set_rejects_value_of_wrong_type() {
	let tmp = TempDir::new().expect("temp dir should be created");

	let args = ["option", "set", "Timeout", "soon", "--type", "u"];
	let (success, _stdout, stderr) = run_dinstaller(tmp.path(), &args);
	assert!(!success);
	assert!(stderr.contains("Invalid value"), "stderr: {stderr}");
}

#[test]
fn login_against_unreachable_gateway_fails() {
	let tmp = TempDir::new().expect("temp dir should be created");

	let output = Command::new(env!("CARGO_BIN_EXE_dinstaller"))
		.current_dir(tmp.path())
		.env_remove("DINSTALLER_CONFIG")
		.env_remove("RUST_LOG")
		.env("DINSTALLER_PASSWORD", "linux")
		.args(["--gateway", "http://127.0.0.1:9", "login", "root"])
		.output()
		.expect("failed to execute dinstaller");

	assert!(!output.status.success());
	assert!(output.stdout.is_empty());
}
