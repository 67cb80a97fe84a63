//! A runner built from settings follows the live process `PATH`.
//!
//! Kept to a single test: it mutates the process environment, which would race any
//! other test sharing this binary.
#![cfg(unix)]

mod common;

use anyhow::Result;
use bio_exec::{BackendResource, ExecutionMode, SettingsLayer, ToolRunner};
use common::{settings_with, write_script};
use tempfile::TempDir;

#[tokio::test]
async fn reprobe_sees_path_changed_after_construction() -> Result<()> {
    let empty = TempDir::new()?;
    let bin = TempDir::new()?;
    let blastn = write_script(bin.path(), "blastn", "echo ok");

    // SAFETY: the only test in this binary; nothing else reads the environment concurrently.
    unsafe { std::env::set_var("PATH", empty.path()) };

    let runner = ToolRunner::new(settings_with(SettingsLayer {
        preferred_modes: Some(vec![ExecutionMode::Native]),
        ..SettingsLayer::default()
    }));
    assert!(runner.resolve("blast").await.is_err());

    unsafe { std::env::set_var("PATH", bin.path()) };
    runner.reprobe().await;

    let plan = runner.resolve("blast").await?;
    assert_eq!(plan.mode, ExecutionMode::Native);
    assert_eq!(plan.resource, BackendResource::Binary { path: blastn });
    Ok(())
}
