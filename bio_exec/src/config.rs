//! # Layered Execution Configuration
//!
//! Settings reach the resolver through four layers, each a plain record of optional
//! fields merged left-to-right:
//!
//! 1. **Built-in defaults**: global defaults plus the catalog of known tools
//!    (see [`crate::registry::builtin_tools`]).
//! 2. **Configuration file**: a TOML file (`bio_exec.toml`, `$BIO_MCP_CONFIG`, or the
//!    platform config directory).
//! 3. **Environment**: `BIO_MCP_*` variables.
//! 4. **Explicit flags**: forced mode / forced container from the command line.
//!
//! A later layer overrides an earlier one field by field; per-tool tables are merged
//! the same way. The merged layer is validated once into an immutable [`Settings`].
//! Validation failures are [`ConfigError`]s and are fatal to startup.
//!
//! ## Example file
//!
//! ```toml
//! preferred_modes = ["native", "module", "docker"]
//! timeout_seconds = 600
//!
//! [tools.blast]
//! binary = "blastn"
//! module_names = ["blast+", "ncbi-blast+"]
//! container_image = "biocontainers/blast:2.15.0"
//! bind_mounts = ["/data/blastdb:/data/blastdb:ro"]
//! ```

use directories::ProjectDirs;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::mode::{ExecutionMode, ensure_unique, parse_mode_list};
use crate::registry::builtin_tools;

/// Prefix shared by every recognized environment variable.
pub const ENV_PREFIX: &str = "BIO_MCP_";
/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "BIO_MCP_CONFIG";
/// File name searched for in the current directory.
pub const LOCAL_CONFIG_FILE: &str = "bio_exec.toml";

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100_000_000;
pub const DEFAULT_MAX_OUTPUT_SIZE: usize = 10 * 1024 * 1024;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MODULE_SHELL: &str = "bash";

/// A host path made visible inside a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BindMount {
    pub host: PathBuf,
    pub container: PathBuf,
    pub read_only: bool,
}

impl BindMount {
    /// Mount `path` at the same location inside the container.
    pub fn same_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            host: path.clone(),
            container: path,
            read_only: false,
        }
    }
}

impl JsonSchema for BindMount {
    fn schema_name() -> std::borrow::Cow<'static, str> {
        "BindMount".into()
    }

    fn json_schema(generator: &mut schemars::SchemaGenerator) -> schemars::Schema {
        String::json_schema(generator)
    }
}

impl FromStr for BindMount {
    type Err = ConfigError;

    /// Accepts `host`, `host:container` or `host:container:ro|rw`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidBindMount(raw.to_string());
        let parts: Vec<&str> = raw.trim().split(':').collect();
        let (host, container, read_only) = match parts.as_slice() {
            [host] => (*host, *host, false),
            [host, container] => (*host, *container, false),
            [host, container, "ro"] => (*host, *container, true),
            [host, container, "rw"] => (*host, *container, false),
            _ => return Err(invalid()),
        };
        if host.is_empty() || container.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            host: PathBuf::from(host),
            container: PathBuf::from(container),
            read_only,
        })
    }
}

impl TryFrom<String> for BindMount {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BindMount> for String {
    fn from(mount: BindMount) -> Self {
        mount.to_string()
    }
}

impl fmt::Display for BindMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host.display(), self.container.display())?;
        if self.read_only {
            f.write_str(":ro")?;
        }
        Ok(())
    }
}

/// Per-tool settings. Every field is optional so the same record serves as a
/// configuration layer and as a partial override for [`crate::registry::ModeRegistry`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ToolSettings {
    /// Primary executable probed for native mode (defaults to the tool name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,
    /// Explicit path to the native executable, bypassing the search path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_path: Option<PathBuf>,
    /// Module names tried in order by `module load` / `ml load`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_names: Option<Vec<String>>,
    /// Container image reference (registry/name:tag).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_image: Option<String>,
    /// Local Singularity image file, preferred over the container image reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub singularity_image: Option<PathBuf>,
    /// Force this tool to a single execution mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_mode: Option<ExecutionMode>,
    /// Preference order for this tool, replacing the global order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_modes: Option<Vec<ExecutionMode>>,
    /// Extra bind mounts for container modes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_mounts: Option<Vec<BindMount>>,
}

impl ToolSettings {
    /// Overlay `over` on top of `self`; fields set in `over` win.
    pub fn merge(self, over: ToolSettings) -> ToolSettings {
        ToolSettings {
            binary: over.binary.or(self.binary),
            native_path: over.native_path.or(self.native_path),
            module_names: over.module_names.or(self.module_names),
            container_image: over.container_image.or(self.container_image),
            singularity_image: over.singularity_image.or(self.singularity_image),
            execution_mode: over.execution_mode.or(self.execution_mode),
            preferred_modes: over.preferred_modes.or(self.preferred_modes),
            bind_mounts: over.bind_mounts.or(self.bind_mounts),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == ToolSettings::default()
    }
}

/// One configuration layer. This is also the schema of the TOML configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SettingsLayer {
    /// Force every tool to a single execution mode; disables fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_mode: Option<ExecutionMode>,
    /// Global preference order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_modes: Option<Vec<ExecutionMode>>,
    /// Restrict resolution to container modes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_container: Option<bool>,
    /// The tool this server fronts; target of the tool-less environment overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Base directory for invocation-scoped scratch space.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
    /// Invocation timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    /// Largest accepted input file, enforced by callers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_file_size: Option<u64>,
    /// Capture limit per output stream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_size: Option<usize>,
    /// Timeout for each diagnostic probe subprocess.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_timeout_ms: Option<u64>,
    /// Query `module avail` for each alias before choosing a module mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_module_aliases: Option<bool>,
    /// Shell used as a login shell for module commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_shell: Option<String>,
    /// Directory searched for `<tool>.sif` images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub singularity_image_dir: Option<PathBuf>,
    /// Registry prefix used to derive images for tools without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_image_prefix: Option<String>,
    /// Extra flags appended to `docker run`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_extra_flags: Option<Vec<String>>,
    /// Per-tool settings keyed by logical tool name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tools: BTreeMap<String, ToolSettings>,
    /// Overrides for the tool named by `tool`, set by `BIO_MCP_MODULE_NAMES` and
    /// `BIO_MCP_CONTAINER_IMAGE`.
    #[serde(skip)]
    pub default_tool_overrides: ToolSettings,
}

impl SettingsLayer {
    /// The lowest layer: global defaults and the built-in tool catalog.
    pub fn builtin() -> Self {
        Self {
            preferred_modes: Some(ExecutionMode::ALL.to_vec()),
            force_container: Some(false),
            timeout_seconds: Some(DEFAULT_TIMEOUT_SECONDS),
            max_file_size: Some(DEFAULT_MAX_FILE_SIZE),
            max_output_size: Some(DEFAULT_MAX_OUTPUT_SIZE),
            probe_timeout_ms: Some(DEFAULT_PROBE_TIMEOUT_MS),
            verify_module_aliases: Some(true),
            module_shell: Some(DEFAULT_MODULE_SHELL.to_string()),
            tools: builtin_tools(),
            ..Self::default()
        }
    }

    /// Overlay `over` on top of `self`.
    pub fn merge(self, over: SettingsLayer) -> SettingsLayer {
        let mut tools = self.tools;
        for (name, settings) in over.tools {
            let merged = match tools.remove(&name) {
                Some(existing) => existing.merge(settings),
                None => settings,
            };
            tools.insert(name, merged);
        }

        SettingsLayer {
            execution_mode: over.execution_mode.or(self.execution_mode),
            preferred_modes: over.preferred_modes.or(self.preferred_modes),
            force_container: over.force_container.or(self.force_container),
            tool: over.tool.or(self.tool),
            temp_dir: over.temp_dir.or(self.temp_dir),
            timeout_seconds: over.timeout_seconds.or(self.timeout_seconds),
            max_file_size: over.max_file_size.or(self.max_file_size),
            max_output_size: over.max_output_size.or(self.max_output_size),
            probe_timeout_ms: over.probe_timeout_ms.or(self.probe_timeout_ms),
            verify_module_aliases: over.verify_module_aliases.or(self.verify_module_aliases),
            module_shell: over.module_shell.or(self.module_shell),
            singularity_image_dir: over.singularity_image_dir.or(self.singularity_image_dir),
            docker_image_prefix: over.docker_image_prefix.or(self.docker_image_prefix),
            docker_extra_flags: over.docker_extra_flags.or(self.docker_extra_flags),
            tools,
            default_tool_overrides: self
                .default_tool_overrides
                .merge(over.default_tool_overrides),
        }
    }

    /// Parse a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Build the environment layer from `BIO_MCP_*` variables.
    ///
    /// Takes the variables explicitly so callers decide whether to read the process
    /// environment. Empty values are treated as unset.
    pub fn from_env_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: BTreeMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(k, v)| k.starts_with(ENV_PREFIX) && !v.trim().is_empty())
            .collect();

        let mut layer = SettingsLayer::default();
        for (key, value) in &vars {
            let value = value.trim();
            let name = &key[ENV_PREFIX.len()..];
            match name {
                "EXECUTION_MODE" => layer.execution_mode = Some(value.parse()?),
                "PREFERRED_MODES" => layer.preferred_modes = Some(parse_mode_list(value)?),
                "FORCE_CONTAINER" => layer.force_container = Some(parse_bool(key, value)?),
                "TOOL" => layer.tool = Some(value.to_string()),
                "MODULE_NAMES" => {
                    layer.default_tool_overrides.module_names = Some(parse_list(value))
                }
                "CONTAINER_IMAGE" => {
                    layer.default_tool_overrides.container_image = Some(value.to_string())
                }
                "SINGULARITY_PATH" => layer.singularity_image_dir = Some(PathBuf::from(value)),
                "DOCKER_PREFIX" => layer.docker_image_prefix = Some(value.to_string()),
                "TEMP_DIR" => layer.temp_dir = Some(PathBuf::from(value)),
                "TIMEOUT" => layer.timeout_seconds = Some(parse_number(key, value)?),
                "MAX_FILE_SIZE" => layer.max_file_size = Some(parse_number(key, value)?),
                "MAX_OUTPUT_SIZE" => layer.max_output_size = Some(parse_number(key, value)?),
                "PROBE_TIMEOUT_MS" => layer.probe_timeout_ms = Some(parse_number(key, value)?),
                "VERIFY_MODULES" => layer.verify_module_aliases = Some(parse_bool(key, value)?),
                "MODULE_SHELL" => layer.module_shell = Some(value.to_string()),
                _ => {
                    if let Some(rest) = name.strip_prefix("TOOL_") {
                        apply_tool_env(&mut layer, key, rest, value)?;
                    } else if name != "CONFIG" {
                        tracing::debug!("Ignoring unrecognized environment variable {key}");
                    }
                }
            }
        }
        Ok(layer)
    }
}

#[derive(Clone, Copy)]
enum ToolEnvField {
    Path,
    Modules,
    Image,
    Mode,
    Binary,
}

/// `BIO_MCP_TOOL_<NAME>_<FIELD>`; the field suffix is matched from the right so tool
/// names may contain underscores.
fn apply_tool_env(
    layer: &mut SettingsLayer,
    key: &str,
    rest: &str,
    value: &str,
) -> Result<(), ConfigError> {
    const FIELDS: [(&str, ToolEnvField); 5] = [
        ("_PATH", ToolEnvField::Path),
        ("_MODULES", ToolEnvField::Modules),
        ("_IMAGE", ToolEnvField::Image),
        ("_MODE", ToolEnvField::Mode),
        ("_BINARY", ToolEnvField::Binary),
    ];
    let Some((tool, field)) = FIELDS.iter().find_map(|(suffix, field)| {
        rest.strip_suffix(*suffix)
            .filter(|tool| !tool.is_empty())
            .map(|tool| (tool.to_ascii_lowercase(), *field))
    }) else {
        tracing::debug!("Ignoring unrecognized per-tool environment variable {key}");
        return Ok(());
    };

    let entry = layer.tools.entry(tool).or_default();
    match field {
        ToolEnvField::Path => entry.native_path = Some(PathBuf::from(value)),
        ToolEnvField::Modules => entry.module_names = Some(parse_list(value)),
        ToolEnvField::Image => entry.container_image = Some(value.to_string()),
        ToolEnvField::Mode => entry.execution_mode = Some(value.parse()?),
        ToolEnvField::Binary => entry.binary = Some(value.to_string()),
    }
    Ok(())
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "expected true/false".to_string(),
        }),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: "expected a non-negative integer".to_string(),
    })
}

/// Validated, immutable settings shared by the registry, prober and runner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub execution_mode: Option<ExecutionMode>,
    pub preferred_modes: Vec<ExecutionMode>,
    pub force_container: bool,
    pub tool: Option<String>,
    pub temp_dir: Option<PathBuf>,
    pub timeout: Duration,
    pub max_file_size: u64,
    pub max_output_size: usize,
    pub probe_timeout: Duration,
    pub verify_module_aliases: bool,
    pub module_shell: String,
    pub singularity_image_dir: Option<PathBuf>,
    pub docker_image_prefix: Option<String>,
    pub docker_extra_flags: Vec<String>,
    pub tools: BTreeMap<String, ToolSettings>,
}

impl Default for Settings {
    /// The built-in layer alone.
    fn default() -> Self {
        Settings {
            execution_mode: None,
            preferred_modes: ExecutionMode::ALL.to_vec(),
            force_container: false,
            tool: None,
            temp_dir: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_output_size: DEFAULT_MAX_OUTPUT_SIZE,
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            verify_module_aliases: true,
            module_shell: DEFAULT_MODULE_SHELL.to_string(),
            singularity_image_dir: None,
            docker_image_prefix: None,
            docker_extra_flags: Vec::new(),
            tools: builtin_tools(),
        }
    }
}

impl Settings {
    /// Merge `layers` left-to-right on top of nothing and validate the result.
    ///
    /// Callers normally pass [`SettingsLayer::builtin`] first.
    pub fn from_layers(
        layers: impl IntoIterator<Item = SettingsLayer>,
    ) -> Result<Self, ConfigError> {
        let merged = layers
            .into_iter()
            .fold(SettingsLayer::default(), SettingsLayer::merge);
        Self::finalize(merged)
    }

    fn finalize(mut merged: SettingsLayer) -> Result<Self, ConfigError> {
        let overrides = std::mem::take(&mut merged.default_tool_overrides);
        if !overrides.is_empty() {
            let Some(tool) = merged.tool.clone() else {
                return Err(ConfigError::InvalidValue {
                    key: "BIO_MCP_MODULE_NAMES/BIO_MCP_CONTAINER_IMAGE".to_string(),
                    value: format!("{overrides:?}"),
                    reason: "requires BIO_MCP_TOOL (or `tool` in the configuration file) to name the tool it applies to".to_string(),
                });
            };
            let existing = merged.tools.remove(&tool).unwrap_or_default();
            merged.tools.insert(tool, existing.merge(overrides));
        }

        let force_container = merged.force_container.unwrap_or(false);
        let preferred_modes = merged
            .preferred_modes
            .unwrap_or_else(|| ExecutionMode::ALL.to_vec());
        validate_order(&preferred_modes, None)?;
        validate_forced(merged.execution_mode, force_container)?;

        for (name, tool) in &merged.tools {
            if let Some(order) = &tool.preferred_modes {
                validate_order(order, Some(name))?;
            }
            validate_forced(tool.execution_mode, force_container)?;
            if let Some(modules) = &tool.module_names
                && modules.iter().any(|m| m.trim().is_empty())
            {
                return Err(ConfigError::InvalidValue {
                    key: format!("tools.{name}.module_names"),
                    value: format!("{modules:?}"),
                    reason: "module names must not be empty".to_string(),
                });
            }
        }

        let timeout_seconds = positive(
            "timeout_seconds",
            merged.timeout_seconds,
            DEFAULT_TIMEOUT_SECONDS,
        )?;
        let probe_timeout_ms =
            positive("probe_timeout_ms", merged.probe_timeout_ms, DEFAULT_PROBE_TIMEOUT_MS)?;
        let max_output_size = positive(
            "max_output_size",
            merged.max_output_size,
            DEFAULT_MAX_OUTPUT_SIZE,
        )?;

        let module_shell = merged
            .module_shell
            .unwrap_or_else(|| DEFAULT_MODULE_SHELL.to_string());
        if module_shell.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "module_shell".to_string(),
                value: module_shell,
                reason: "must name a shell".to_string(),
            });
        }

        Ok(Settings {
            execution_mode: merged.execution_mode,
            preferred_modes,
            force_container,
            tool: merged.tool,
            temp_dir: merged.temp_dir,
            timeout: Duration::from_secs(timeout_seconds),
            max_file_size: merged.max_file_size.unwrap_or(DEFAULT_MAX_FILE_SIZE),
            max_output_size,
            probe_timeout: Duration::from_millis(probe_timeout_ms),
            verify_module_aliases: merged.verify_module_aliases.unwrap_or(true),
            module_shell,
            singularity_image_dir: merged.singularity_image_dir,
            docker_image_prefix: merged.docker_image_prefix,
            docker_extra_flags: merged.docker_extra_flags.unwrap_or_default(),
            tools: merged.tools,
        })
    }

    /// Load settings from every layer: built-ins, the discovered configuration file,
    /// the process environment, then `flags`.
    pub fn load(config_file: Option<&Path>, flags: SettingsLayer) -> Result<Self, ConfigError> {
        let env: BTreeMap<String, String> = std::env::vars().collect();
        let file = match discover_config_file(config_file, &env) {
            Some(path) => {
                tracing::info!("Loading execution settings from {}", path.display());
                SettingsLayer::from_file(&path)?
            }
            None => SettingsLayer::default(),
        };
        let env_layer = SettingsLayer::from_env_vars(env)?;
        Settings::from_layers([SettingsLayer::builtin(), file, env_layer, flags])
    }
}

fn validate_order(order: &[ExecutionMode], tool: Option<&String>) -> Result<(), ConfigError> {
    if order.is_empty() {
        return Err(ConfigError::EmptyPreference {
            tool: tool.cloned(),
        });
    }
    ensure_unique(order)
}

fn validate_forced(forced: Option<ExecutionMode>, force_container: bool) -> Result<(), ConfigError> {
    match forced {
        Some(mode) if force_container && !mode.is_container() => {
            Err(ConfigError::ForcedModeConflict { mode })
        }
        _ => Ok(()),
    }
}

fn positive<T>(key: &str, value: Option<T>, default: T) -> Result<T, ConfigError>
where
    T: PartialEq + Default + fmt::Display,
{
    let value = value.unwrap_or(default);
    if value == T::default() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

/// Locate the configuration file.
///
/// Order: explicit path, `$BIO_MCP_CONFIG`, `./bio_exec.toml`, then
/// `<config dir>/bio_exec/config.toml`. Explicit paths are returned even when missing
/// so the read error surfaces; discovered paths must exist.
pub fn discover_config_file(
    explicit: Option<&Path>,
    env: &BTreeMap<String, String>,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = env.get(CONFIG_ENV_VAR).filter(|v| !v.trim().is_empty()) {
        return Some(PathBuf::from(path));
    }

    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }

    ProjectDirs::from("org", "BioMcp", "bio_exec")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .filter(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_mount_forms() {
        let plain: BindMount = "/data".parse().unwrap();
        assert_eq!(plain, BindMount::same_path("/data"));

        let ro: BindMount = "/data/blastdb:/db:ro".parse().unwrap();
        assert!(ro.read_only);
        assert_eq!(ro.to_string(), "/data/blastdb:/db:ro");

        assert!("/a:/b:rx".parse::<BindMount>().is_err());
        assert!(":/b".parse::<BindMount>().is_err());
    }

    #[test]
    fn per_tool_env_suffix_matches_from_the_right() {
        let layer = SettingsLayer::from_env_vars([
            ("BIO_MCP_TOOL_HMMER_SCAN_PATH", "/opt/hmmer/bin/hmmscan"),
            ("BIO_MCP_TOOL_BLAST_MODE", "Docker"),
        ])
        .unwrap();
        assert_eq!(
            layer.tools["hmmer_scan"].native_path,
            Some(PathBuf::from("/opt/hmmer/bin/hmmscan"))
        );
        assert_eq!(
            layer.tools["blast"].execution_mode,
            Some(ExecutionMode::Docker)
        );
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = Settings::from_layers([
            SettingsLayer::builtin(),
            SettingsLayer {
                timeout_seconds: Some(0),
                ..SettingsLayer::default()
            },
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "timeout_seconds"));
    }

    #[test]
    fn unparseable_bool_names_the_variable() {
        let err = SettingsLayer::from_env_vars([("BIO_MCP_FORCE_CONTAINER", "maybe")]).unwrap_err();
        assert!(err.to_string().contains("BIO_MCP_FORCE_CONTAINER"));
    }
}
