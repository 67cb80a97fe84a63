//! # Mode Registry
//!
//! Holds, per logical tool, the [`ToolSpec`] the resolver works from, plus the global
//! mode policy (forced mode, preference order, force-container flag).
//!
//! The registry is built once from validated [`Settings`]. Overrides take `&mut self`,
//! so they must complete before the registry is wrapped in an `Arc` and shared; reads
//! need no locking.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::{BindMount, Settings, ToolSettings};
use crate::error::ConfigError;
use crate::mode::{ExecutionMode, ensure_unique};

/// Everything the probe, resolver and builder need to know about one logical tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolSpec {
    /// Canonical logical name, e.g. `blast`.
    pub name: String,
    /// Executable probed for native mode, e.g. `blastn`.
    pub binary: String,
    /// Module names tried in order.
    pub module_aliases: Vec<String>,
    /// Container image reference (registry/name:tag).
    pub container_image: Option<String>,
    /// Local Singularity image candidate; used when the file exists.
    pub singularity_image: Option<PathBuf>,
    /// Explicit native binary path.
    pub native_path: Option<PathBuf>,
    pub bind_mounts: Vec<BindMount>,
    /// Per-tool forced mode.
    pub forced_mode: Option<ExecutionMode>,
    /// Per-tool preference order.
    pub preferred_modes: Option<Vec<ExecutionMode>>,
}

/// Global mode selection policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModePolicy {
    pub forced_mode: Option<ExecutionMode>,
    pub preferred_modes: Vec<ExecutionMode>,
    pub force_container: bool,
    /// Extra `docker run` flags appended to every Docker plan.
    pub docker_extra_flags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ModeRegistry {
    policy: ModePolicy,
    tools: BTreeMap<String, ToolSettings>,
    docker_image_prefix: Option<String>,
    singularity_image_dir: Option<PathBuf>,
}

impl ModeRegistry {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            policy: ModePolicy {
                forced_mode: settings.execution_mode,
                preferred_modes: settings.preferred_modes.clone(),
                force_container: settings.force_container,
                docker_extra_flags: settings.docker_extra_flags.clone(),
            },
            tools: settings.tools.clone(),
            docker_image_prefix: settings.docker_image_prefix.clone(),
            singularity_image_dir: settings.singularity_image_dir.clone(),
        }
    }

    pub fn policy(&self) -> &ModePolicy {
        &self.policy
    }

    /// Names of every tool with explicit settings, in sorted order.
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Look up the spec for `tool_name`.
    ///
    /// Unknown tools get a synthesized spec: the binary and single module alias are the
    /// tool name and the image comes from the Docker image prefix, if any.
    pub fn get(&self, tool_name: &str) -> ToolSpec {
        let settings = self.tools.get(tool_name).cloned().unwrap_or_default();
        let name = tool_name.to_string();

        let binary = settings.binary.unwrap_or_else(|| name.clone());
        let module_aliases = settings
            .module_names
            .filter(|aliases| !aliases.is_empty())
            .unwrap_or_else(|| vec![name.clone()]);
        let container_image = settings.container_image.or_else(|| {
            self.docker_image_prefix
                .as_deref()
                .map(|prefix| format!("{}/{}", prefix.trim_end_matches('/'), name))
        });
        let singularity_image = settings.singularity_image.or_else(|| {
            self.singularity_image_dir
                .as_ref()
                .map(|dir| dir.join(format!("{name}.sif")))
        });

        ToolSpec {
            name,
            binary,
            module_aliases,
            container_image,
            singularity_image,
            native_path: settings.native_path,
            bind_mounts: settings.bind_mounts.unwrap_or_default(),
            forced_mode: settings.execution_mode,
            preferred_modes: settings.preferred_modes,
        }
    }

    /// Apply a partial override to one tool. Set fields replace existing values.
    pub fn override_tool(
        &mut self,
        tool_name: &str,
        partial: ToolSettings,
    ) -> Result<(), ConfigError> {
        if let Some(order) = &partial.preferred_modes {
            if order.is_empty() {
                return Err(ConfigError::EmptyPreference {
                    tool: Some(tool_name.to_string()),
                });
            }
            ensure_unique(order)?;
        }
        if let Some(mode) = partial.execution_mode
            && self.policy.force_container
            && !mode.is_container()
        {
            return Err(ConfigError::ForcedModeConflict { mode });
        }

        let existing = self.tools.remove(tool_name).unwrap_or_default();
        tracing::debug!("Applying override for tool '{tool_name}': {partial:?}");
        self.tools
            .insert(tool_name.to_string(), existing.merge(partial));
        Ok(())
    }
}

/// The built-in tool catalog: the lowest configuration layer.
pub fn builtin_tools() -> BTreeMap<String, ToolSettings> {
    let entries = [
        (
            "blast",
            "blastn",
            &["blast", "blast+", "ncbi-blast+"][..],
            "biocontainers/blast:2.15.0",
        ),
        (
            "samtools",
            "samtools",
            &["samtools"][..],
            "biocontainers/samtools:v1.9-4-deb_cv1",
        ),
        ("bwa", "bwa", &["bwa"][..], "biocontainers/bwa:v0.7.17_cv1"),
    ];

    entries
        .into_iter()
        .map(|(name, binary, modules, image)| {
            (
                name.to_string(),
                ToolSettings {
                    binary: Some(binary.to_string()),
                    module_names: Some(modules.iter().map(|m| m.to_string()).collect()),
                    container_image: Some(image.to_string()),
                    ..ToolSettings::default()
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_blast_probes_blastn() {
        let registry = ModeRegistry::from_settings(&Settings::default());
        let spec = registry.get("blast");
        assert_eq!(spec.binary, "blastn");
        assert_eq!(spec.module_aliases, vec!["blast", "blast+", "ncbi-blast+"]);
        assert_eq!(
            spec.container_image.as_deref(),
            Some("biocontainers/blast:2.15.0")
        );
    }

    #[test]
    fn unknown_tool_is_synthesized_from_its_name() {
        let registry = ModeRegistry::from_settings(&Settings::default());
        let spec = registry.get("minimap2");
        assert_eq!(spec.binary, "minimap2");
        assert_eq!(spec.module_aliases, vec!["minimap2"]);
        assert!(spec.container_image.is_none());
        assert!(spec.native_path.is_none());
    }

    #[test]
    fn docker_prefix_derives_missing_images() {
        let mut settings = Settings::default();
        settings.docker_image_prefix = Some("quay.io/biocontainers/".into());
        let registry = ModeRegistry::from_settings(&settings);
        assert_eq!(
            registry.get("minimap2").container_image.as_deref(),
            Some("quay.io/biocontainers/minimap2")
        );
        // Explicit images are kept.
        assert_eq!(
            registry.get("blast").container_image.as_deref(),
            Some("biocontainers/blast:2.15.0")
        );
    }

    #[test]
    fn override_replaces_only_set_fields() {
        let mut registry = ModeRegistry::from_settings(&Settings::default());
        registry
            .override_tool(
                "blast",
                ToolSettings {
                    container_image: Some("ncbi/blast:latest".into()),
                    ..ToolSettings::default()
                },
            )
            .unwrap();
        let spec = registry.get("blast");
        assert_eq!(spec.container_image.as_deref(), Some("ncbi/blast:latest"));
        assert_eq!(spec.binary, "blastn");
    }

    #[test]
    fn override_rejects_duplicate_preferences() {
        let mut registry = ModeRegistry::from_settings(&Settings::default());
        let err = registry
            .override_tool(
                "blast",
                ToolSettings {
                    preferred_modes: Some(vec![ExecutionMode::Docker, ExecutionMode::Docker]),
                    ..ToolSettings::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateMode(ExecutionMode::Docker)));
    }
}
