//! # Tool Runner
//!
//! The facade adapters call: owns the settings, the mode registry, a backend probe and
//! its availability cache, and ties resolver, invocation builder and executor together.
//!
//! ```no_run
//! use bio_exec::{InvocationRequest, Settings, SettingsLayer, ToolRunner};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let settings = Settings::load(None, SettingsLayer::default())?;
//! let runner = ToolRunner::new(settings);
//! let request = InvocationRequest::new("blastn", "/data/run1")
//!     .args(["-query", "q.fa", "-db", "nt", "-outfmt", "6"]);
//! let result = runner.resolve_and_run("blast", request).await;
//! println!("{:?}: {}", result.outcome, result.stdout);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::{InputFileError, ResolveError};
use crate::executor::{self, InvocationOutcome, InvocationResult};
use crate::invocation::{self, InvocationRequest};
use crate::mode::ExecutionMode;
use crate::registry::ModeRegistry;
use crate::report::{self, DetectionReport};
use crate::resolver::{self, ExecutionPlan};
use crate::tool_availability::{
    AvailabilityCache, BackendAvailability, BackendProbe, SystemProbe, probe_modes,
};

pub struct ToolRunner {
    settings: Arc<Settings>,
    registry: Arc<ModeRegistry>,
    probe: Arc<dyn BackendProbe>,
    cache: AvailabilityCache,
}

impl ToolRunner {
    /// Runner probing the real host.
    pub fn new(settings: Settings) -> Self {
        let probe = Arc::new(SystemProbe::from_settings(&settings));
        let registry = ModeRegistry::from_settings(&settings);
        Self::with_probe(settings, registry, probe)
    }

    /// Runner with an explicit registry and probe.
    pub fn with_probe(
        settings: Settings,
        registry: ModeRegistry,
        probe: Arc<dyn BackendProbe>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            registry: Arc::new(registry),
            probe,
            cache: AvailabilityCache::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &ModeRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &AvailabilityCache {
        &self.cache
    }

    /// Choose the execution plan for `tool`.
    pub async fn resolve(&self, tool: &str) -> Result<ExecutionPlan, ResolveError> {
        resolver::resolve(&self.registry, self.probe.as_ref(), &self.cache, tool).await
    }

    /// Probe every mode for `tool` (cached), in default order.
    pub async fn probe_tool(&self, tool: &str) -> Vec<BackendAvailability> {
        let spec = self.registry.get(tool);
        probe_modes(self.probe.as_ref(), &self.cache, &ExecutionMode::ALL, &spec).await
    }

    /// Drop every cached probe result; the next resolution probes afresh, against the
    /// process environment as it is then.
    pub async fn reprobe(&self) {
        info!("Clearing cached backend availability");
        self.cache.clear().await;
    }

    pub async fn reprobe_tool(&self, tool: &str) {
        self.cache.clear_tool(tool).await;
    }

    /// Resolve `tool`, build the command for `request` and run it.
    ///
    /// Never fails: resolution failures come back as a `BackendUnavailable` result.
    pub async fn resolve_and_run(&self, tool: &str, request: InvocationRequest) -> InvocationResult {
        let plan = match self.resolve(tool).await {
            Ok(plan) => plan,
            Err(err) => return InvocationResult::backend_unavailable(err.to_string()),
        };
        self.run_plan(&plan, &request).await
    }

    /// Like [`Self::resolve_and_run`], but after a `LaunchFailed` outcome the tool is
    /// re-probed and the request is tried exactly once more.
    ///
    /// A forced mode is never swapped for another one; the retry only helps when the
    /// fresh probe finds a different resource (or a different preferred mode).
    pub async fn resolve_and_run_with_reprobe(
        &self,
        tool: &str,
        request: InvocationRequest,
    ) -> InvocationResult {
        let first = self.resolve_and_run(tool, request.clone()).await;
        if first.outcome != InvocationOutcome::LaunchFailed {
            return first;
        }

        warn!(
            "Launch of '{tool}' failed ({}); re-probing and retrying once",
            first.message.as_deref().unwrap_or("no detail")
        );
        self.reprobe_tool(tool).await;
        self.resolve_and_run(tool, request).await
    }

    /// Run an already resolved plan.
    pub async fn run_plan(&self, plan: &ExecutionPlan, request: &InvocationRequest) -> InvocationResult {
        let command = invocation::build(plan, request);
        let timeout = request.timeout.unwrap_or(self.settings.timeout);
        let max_output = request
            .max_output_size
            .unwrap_or(self.settings.max_output_size);
        executor::execute(&command, timeout, max_output).await
    }

    /// Invocation-scoped scratch directory under the configured temp dir.
    /// Removed when the returned guard is dropped.
    pub fn scratch_dir(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("bio_exec-");
        match &self.settings.temp_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                builder.tempdir_in(dir)
            }
            None => builder.tempdir(),
        }
    }

    /// Check that `path` exists and is within the configured maximum file size.
    pub fn check_input_file(&self, path: &Path) -> Result<u64, InputFileError> {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(InputFileError::NotFound(path.to_path_buf()));
            }
            Err(source) => {
                return Err(InputFileError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let size = metadata.len();
        if size > self.settings.max_file_size {
            return Err(InputFileError::TooLarge {
                path: path.to_path_buf(),
                size,
                limit: self.settings.max_file_size,
            });
        }
        Ok(size)
    }

    /// Effective settings plus per-tool detection for `tools` (all configured tools
    /// when empty).
    pub async fn detection_report(&self, tools: &[String]) -> DetectionReport {
        let tools = if tools.is_empty() {
            self.registry.tool_names()
        } else {
            tools.to_vec()
        };
        report::build_report(
            &self.settings,
            &self.registry,
            self.probe.as_ref(),
            &self.cache,
            &tools,
        )
        .await
    }
}
