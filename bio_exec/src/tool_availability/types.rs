use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::time::timeout;
use tracing::debug;

use crate::mode::ExecutionMode;

/// What a successful probe located: enough for the invocation builder to run the tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendResource {
    /// Absolute path of a native executable.
    Binary { path: PathBuf },
    /// Module aliases to try in order, loaded through `shell` with `command load`.
    Modules {
        shell: String,
        command: String,
        aliases: Vec<String>,
    },
    /// Container runtime executable plus the image it should run.
    Container { runtime: PathBuf, image: String },
}

/// Result of probing one execution mode for one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendAvailability {
    pub mode: ExecutionMode,
    pub available: bool,
    /// Diagnostic text; always set when `available` is false.
    pub detail: Option<String>,
    pub resource: Option<BackendResource>,
    /// Tool version, filled in by detection reports only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl BackendAvailability {
    pub fn available(mode: ExecutionMode, resource: BackendResource) -> Self {
        Self {
            mode,
            available: true,
            detail: None,
            resource: Some(resource),
            version: None,
        }
    }

    pub fn unavailable(mode: ExecutionMode, detail: impl Into<String>) -> Self {
        Self {
            mode,
            available: false,
            detail: Some(detail.into()),
            resource: None,
            version: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Diagnostic text, or a generic message when none was recorded.
    pub fn diagnostic(&self) -> String {
        self.detail.clone().unwrap_or_else(|| {
            if self.available {
                "available".to_string()
            } else {
                "unavailable".to_string()
            }
        })
    }
}

/// A single bounded probe command.
#[derive(Debug, Clone)]
pub(super) struct ProbePlan {
    pub(super) label: String,
    pub(super) command: Vec<String>,
    pub(super) working_dir: PathBuf,
    pub(super) timeout: Duration,
}

#[derive(Debug)]
pub(super) struct ProbeOutcome {
    pub(super) success: bool,
    pub(super) exit_code: Option<i32>,
    pub(super) stdout: String,
    pub(super) stderr: String,
    /// Set when the probe could not be launched or timed out.
    pub(super) failure: Option<String>,
}

impl ProbeOutcome {
    /// Trimmed first non-empty line of stdout, falling back to stderr.
    pub(super) fn first_line(&self) -> Option<String> {
        [&self.stdout, &self.stderr]
            .into_iter()
            .flat_map(|text| text.lines())
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
    }

    /// Short description of why the probe failed.
    pub(super) fn describe_failure(&self) -> String {
        if let Some(failure) = &self.failure {
            return failure.clone();
        }
        let code = self
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        match self.stderr.lines().map(str::trim).find(|l| !l.is_empty()) {
            Some(line) => format!("exit {code}: {line}"),
            None => format!("exit {code}"),
        }
    }
}

impl ProbePlan {
    pub(super) async fn execute(&self) -> ProbeOutcome {
        let Some((program, args)) = self.command.split_first() else {
            return ProbeOutcome {
                success: false,
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                failure: Some("empty probe command".to_string()),
            };
        };

        let mut command = tokio::process::Command::new(program);
        command
            .args(args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Running probe {}: {:?}", self.label, self.command);
        match timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => ProbeOutcome {
                success: output.status.success(),
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                failure: None,
            },
            Ok(Err(err)) => ProbeOutcome {
                success: false,
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                failure: Some(format!("failed to launch '{program}': {err}")),
            },
            Err(_) => ProbeOutcome {
                success: false,
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                failure: Some(format!(
                    "probe timed out after {}ms",
                    self.timeout.as_millis()
                )),
            },
        }
    }
}
