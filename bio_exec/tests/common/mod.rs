//! Shared fixtures: fake executables, settings and a scripted probe.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bio_exec::{
    BackendAvailability, BackendProbe, BackendResource, ExecutionMode, Settings, SettingsLayer,
    ToolSpec,
};

/// Write an executable `/bin/sh` script named `name` into `dir`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    let mut perms = std::fs::metadata(&path).expect("stat script").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod script");
    path
}

/// Settings from the built-in layer plus `layer`, with a short probe timeout.
pub fn settings_with(layer: SettingsLayer) -> Settings {
    let quick = SettingsLayer {
        probe_timeout_ms: Some(2_000),
        ..SettingsLayer::default()
    };
    Settings::from_layers([SettingsLayer::builtin(), quick, layer]).expect("valid settings")
}

pub fn settings() -> Settings {
    settings_with(SettingsLayer::default())
}

/// A probe answering from a fixed table and counting calls per mode.
#[derive(Default)]
pub struct ScriptedProbe {
    answers: HashMap<ExecutionMode, BackendAvailability>,
    calls: HashMap<ExecutionMode, AtomicUsize>,
}

impl ScriptedProbe {
    pub fn new() -> Self {
        let calls = ExecutionMode::ALL
            .iter()
            .map(|mode| (*mode, AtomicUsize::new(0)))
            .collect();
        Self {
            answers: HashMap::new(),
            calls,
        }
    }

    pub fn native(mut self, path: impl Into<PathBuf>) -> Self {
        self.answers.insert(
            ExecutionMode::Native,
            BackendAvailability::available(
                ExecutionMode::Native,
                BackendResource::Binary { path: path.into() },
            ),
        );
        self
    }

    pub fn module(mut self, aliases: &[&str]) -> Self {
        self.answers.insert(
            ExecutionMode::Module,
            BackendAvailability::available(
                ExecutionMode::Module,
                BackendResource::Modules {
                    shell: "bash".into(),
                    command: "module".into(),
                    aliases: aliases.iter().map(|a| a.to_string()).collect(),
                },
            ),
        );
        self
    }

    pub fn container(mut self, mode: ExecutionMode, runtime: &str, image: &str) -> Self {
        self.answers.insert(
            mode,
            BackendAvailability::available(
                mode,
                BackendResource::Container {
                    runtime: PathBuf::from(runtime),
                    image: image.into(),
                },
            ),
        );
        self
    }

    pub fn calls(&self, mode: ExecutionMode) -> usize {
        self.calls
            .get(&mode)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

#[async_trait]
impl BackendProbe for ScriptedProbe {
    async fn probe(&self, mode: ExecutionMode, spec: &ToolSpec) -> BackendAvailability {
        if let Some(counter) = self.calls.get(&mode) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        self.answers.get(&mode).cloned().unwrap_or_else(|| {
            BackendAvailability::unavailable(mode, format!("{mode} not set up for '{}'", spec.name))
        })
    }
}
