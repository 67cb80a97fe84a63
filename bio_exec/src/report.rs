//! Detection report: effective settings and what each tool resolved to on this host.

use serde::Serialize;
use std::fmt::Write;
use std::path::PathBuf;
use std::time::Duration;

use futures::future::join_all;

use crate::config::Settings;
use crate::mode::ExecutionMode;
use crate::registry::ModeRegistry;
use crate::resolver;
use crate::tool_availability::{
    AvailabilityCache, BackendAvailability, BackendProbe, BackendResource,
};

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveSettings {
    pub execution_mode: Option<ExecutionMode>,
    pub preferred_modes: Vec<ExecutionMode>,
    pub force_container: bool,
    pub default_tool: Option<String>,
    pub temp_dir: Option<PathBuf>,
    #[serde(rename = "timeout_seconds", with = "crate::utils::time::duration_secs")]
    pub timeout: Duration,
    #[serde(rename = "probe_timeout_ms", with = "crate::utils::time::duration_millis")]
    pub probe_timeout: Duration,
    pub max_file_size: u64,
    pub max_output_size: usize,
    pub verify_module_aliases: bool,
    pub module_shell: String,
}

impl From<&Settings> for EffectiveSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            execution_mode: settings.execution_mode,
            preferred_modes: settings.preferred_modes.clone(),
            force_container: settings.force_container,
            default_tool: settings.tool.clone(),
            temp_dir: settings.temp_dir.clone(),
            timeout: settings.timeout,
            probe_timeout: settings.probe_timeout,
            max_file_size: settings.max_file_size,
            max_output_size: settings.max_output_size,
            verify_module_aliases: settings.verify_module_aliases,
            module_shell: settings.module_shell.clone(),
        }
    }
}

/// How one tool resolved.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDetection {
    pub tool: String,
    pub available: bool,
    pub mode: Option<ExecutionMode>,
    pub path: Option<PathBuf>,
    pub version: Option<String>,
    pub module: Option<String>,
    pub image: Option<String>,
    /// Failure text when unavailable.
    pub message: Option<String>,
    /// Probe results gathered while resolving, in candidate order.
    pub probes: Vec<BackendAvailability>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub settings: EffectiveSettings,
    pub tools: Vec<ToolDetection>,
}

pub(crate) async fn build_report(
    settings: &Settings,
    registry: &ModeRegistry,
    probe: &dyn BackendProbe,
    cache: &AvailabilityCache,
    tools: &[String],
) -> DetectionReport {
    let detections = join_all(
        tools
            .iter()
            .map(|tool| detect_tool(registry, probe, cache, tool)),
    )
    .await;

    DetectionReport {
        settings: EffectiveSettings::from(settings),
        tools: detections,
    }
}

async fn detect_tool(
    registry: &ModeRegistry,
    probe: &dyn BackendProbe,
    cache: &AvailabilityCache,
    tool: &str,
) -> ToolDetection {
    let resolved = resolver::resolve(registry, probe, cache, tool).await;

    let spec = registry.get(tool);
    let order = resolver::candidate_order(&spec, registry.policy());
    let mut probes = Vec::new();
    for mode in &order.modes {
        if let Some(hit) = cache.get(*mode, tool).await {
            probes.push(hit);
        }
    }

    let mut detection = ToolDetection {
        tool: tool.to_string(),
        available: false,
        mode: None,
        path: None,
        version: None,
        module: None,
        image: None,
        message: None,
        probes,
    };

    match resolved {
        Ok(plan) => {
            detection.available = true;
            detection.mode = Some(plan.mode);
            match plan.resource {
                BackendResource::Binary { path } => {
                    detection.version = probe.detect_version(&path).await;
                    detection.path = Some(path);
                }
                BackendResource::Modules { aliases, .. } => {
                    detection.module = aliases.first().cloned();
                }
                BackendResource::Container { runtime, image } => {
                    detection.path = Some(runtime);
                    detection.image = Some(image);
                }
            }
        }
        Err(err) => detection.message = Some(err.to_string()),
    }
    detection
}

/// Human-readable rendering of a report.
pub fn format_report(report: &DetectionReport) -> String {
    let mut output = String::new();
    let settings = &report.settings;
    let _ = writeln!(
        output,
        "Execution mode: {}",
        settings
            .execution_mode
            .map(|m| m.to_string())
            .unwrap_or_else(|| "auto".to_string())
    );
    let _ = writeln!(
        output,
        "Preferred modes: {}",
        settings
            .preferred_modes
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    if settings.force_container {
        let _ = writeln!(output, "Force container: yes");
    }
    let _ = writeln!(output, "Timeout: {}s", settings.timeout.as_secs());

    for tool in &report.tools {
        let _ = writeln!(output);
        match tool.mode {
            Some(mode) => {
                let _ = writeln!(output, "{}: {mode}", tool.tool);
            }
            None => {
                let _ = writeln!(output, "{}: unavailable", tool.tool);
            }
        }
        if let Some(path) = &tool.path {
            let _ = writeln!(output, "  path: {}", path.display());
        }
        if let Some(version) = &tool.version {
            let _ = writeln!(output, "  version: {version}");
        }
        if let Some(module) = &tool.module {
            let _ = writeln!(output, "  module: {module}");
        }
        if let Some(image) = &tool.image {
            let _ = writeln!(output, "  image: {image}");
        }
        if let Some(message) = &tool.message {
            let _ = writeln!(output, "  {message}");
        }
    }
    output
}
