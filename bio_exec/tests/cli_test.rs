//! CLI binary tests against fake tools on a controlled PATH.
#![cfg(unix)]

mod common;

use std::path::Path;
use std::process::{Command, Output};

use anyhow::Result;
use common::write_script;
use tempfile::TempDir;

/// The binary with a scrubbed environment: only `PATH=bin` and a throwaway home.
fn bio_exec(bin: &Path, home: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_bio_exec"));
    command
        .env_clear()
        .env("PATH", bin)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("XDG_CACHE_HOME", home.join(".cache"))
        .current_dir(home)
        .arg("--log-to-stderr");
    command
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn schema_describes_the_configuration_file() -> Result<()> {
    let bin = TempDir::new()?;
    let home = TempDir::new()?;
    let output = bio_exec(bin.path(), home.path()).arg("schema").output()?;
    assert!(output.status.success());

    let schema: serde_json::Value = serde_json::from_str(&stdout(&output))?;
    let properties = &schema["properties"];
    assert!(properties.get("preferred_modes").is_some());
    assert!(properties.get("tools").is_some());
    Ok(())
}

#[test]
fn resolve_prints_the_native_plan() -> Result<()> {
    let bin = TempDir::new()?;
    let home = TempDir::new()?;
    let blastn = write_script(bin.path(), "blastn", "exit 0");

    let output = bio_exec(bin.path(), home.path())
        .args(["--preferred-modes", "native,docker", "resolve", "blast"])
        .output()?;
    assert!(output.status.success(), "{output:?}");

    let plan: serde_json::Value = serde_json::from_str(&stdout(&output))?;
    assert_eq!(plan["mode"], "native");
    assert_eq!(plan["resource"]["kind"], "binary");
    assert_eq!(plan["resource"]["path"], blastn.to_string_lossy().as_ref());
    Ok(())
}

#[test]
fn resolve_failure_lists_attempts_and_exits_nonzero() -> Result<()> {
    let bin = TempDir::new()?;
    let home = TempDir::new()?;
    let output = bio_exec(bin.path(), home.path())
        .args(["--preferred-modes", "native,docker", "resolve", "blast"])
        .output()?;
    assert_eq!(output.status.code(), Some(1));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("native: 'blastn' not found on PATH"), "{stderr}");
    assert!(stderr.contains("docker: docker not found on PATH"), "{stderr}");
    Ok(())
}

#[test]
fn run_passes_arguments_and_exit_code_through() -> Result<()> {
    let bin = TempDir::new()?;
    let home = TempDir::new()?;
    write_script(
        bin.path(),
        "samtools",
        "for a in \"$@\"; do echo \"<$a>\"; done\nexit 3",
    );

    let output = bio_exec(bin.path(), home.path())
        .args([
            "--execution-mode",
            "native",
            "run",
            "samtools",
            "--",
            "view",
            "-H",
            "in file.bam",
        ])
        .output()?;
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(stdout(&output), "<view>\n<-H>\n<in file.bam>\n");
    Ok(())
}

#[test]
fn run_json_reports_backend_unavailable() -> Result<()> {
    let bin = TempDir::new()?;
    let home = TempDir::new()?;
    let output = bio_exec(bin.path(), home.path())
        .args(["--execution-mode", "docker", "run", "--json", "bwa"])
        .output()?;
    assert_eq!(output.status.code(), Some(1));

    let result: serde_json::Value = serde_json::from_str(&stdout(&output))?;
    assert_eq!(result["outcome"], "backend_unavailable");
    assert!(
        result["message"]
            .as_str()
            .unwrap_or("")
            .contains("docker not found on PATH")
    );
    Ok(())
}

#[test]
fn invalid_mode_in_environment_is_fatal() -> Result<()> {
    let bin = TempDir::new()?;
    let home = TempDir::new()?;
    let output = bio_exec(bin.path(), home.path())
        .env("BIO_MCP_EXECUTION_MODE", "conda")
        .args(["resolve", "blast"])
        .output()?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("conda"), "{stderr}");
    Ok(())
}
