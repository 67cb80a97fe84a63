use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::builder::{
    docker_image_for, docker_info_plan, listing_mentions_alias, module_avail_plan,
    runtime_version_plan, singularity_image_for, version_plans,
};
use super::types::{BackendAvailability, BackendResource};
use super::BackendProbe;
use crate::config::Settings;
use crate::mode::ExecutionMode;
use crate::registry::ToolSpec;

/// The slice of the process environment the probe looks at.
///
/// Captured once so tests can run probes against a fake `PATH` without mutating
/// the real process environment.
#[derive(Debug, Clone)]
pub struct ProbeEnvironment {
    /// Executable search path. `None` means no search path at all.
    pub search_path: Option<OsString>,
    /// Relevant variables (`MODULESHOME`, `LMOD_CMD`).
    pub vars: BTreeMap<String, String>,
    /// Directory probes run in and relative lookups resolve against.
    pub working_dir: PathBuf,
}

const PROBE_VARS: [&str; 2] = ["MODULESHOME", "LMOD_CMD"];

impl ProbeEnvironment {
    pub fn from_process() -> Self {
        let vars = PROBE_VARS
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|v| (key.to_string(), v)))
            .collect();
        Self {
            search_path: std::env::var_os("PATH"),
            vars,
            working_dir: std::env::current_dir().unwrap_or_else(|_| std::env::temp_dir()),
        }
    }

    /// An environment that only sees `search_path`: no module variables.
    pub fn isolated(search_path: impl Into<OsString>) -> Self {
        Self {
            search_path: Some(search_path.into()),
            vars: BTreeMap::new(),
            working_dir: std::env::temp_dir(),
        }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Look `name` up on the search path.
    pub fn find_executable(&self, name: &str) -> Option<PathBuf> {
        let search_path = self.search_path.as_ref()?;
        which::which_in(name, Some(search_path), &self.working_dir).ok()
    }
}

/// Probes the real host: search path lookups, module systems and container runtimes.
#[derive(Debug, Clone)]
pub struct SystemProbe {
    /// Fixed environment; `None` reads the process environment afresh on every probe.
    env: Option<ProbeEnvironment>,
    probe_timeout: Duration,
    verify_module_aliases: bool,
    module_shell: String,
}

impl SystemProbe {
    pub fn new(settings: &Settings, env: ProbeEnvironment) -> Self {
        Self {
            env: Some(env),
            probe_timeout: settings.probe_timeout,
            verify_module_aliases: settings.verify_module_aliases,
            module_shell: settings.module_shell.clone(),
        }
    }

    /// Probe against the live process environment, so a re-probe sees `PATH`,
    /// `MODULESHOME` and `LMOD_CMD` as they are at that moment.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            env: None,
            ..Self::new(settings, ProbeEnvironment::from_process())
        }
    }

    /// The environment the next probe will run against.
    pub fn environment(&self) -> ProbeEnvironment {
        match &self.env {
            Some(env) => env.clone(),
            None => ProbeEnvironment::from_process(),
        }
    }

    fn probe_native(&self, env: &ProbeEnvironment, spec: &ToolSpec) -> BackendAvailability {
        let mode = ExecutionMode::Native;
        if let Some(path) = &spec.native_path {
            return if is_executable(path) {
                BackendAvailability::available(mode, BackendResource::Binary { path: path.clone() })
            } else {
                BackendAvailability::unavailable(
                    mode,
                    format!("configured path '{}' is not an executable file", path.display()),
                )
            };
        }

        match env.find_executable(&spec.binary) {
            Some(path) => BackendAvailability::available(mode, BackendResource::Binary { path }),
            None => BackendAvailability::unavailable(
                mode,
                format!("'{}' not found on PATH", spec.binary),
            ),
        }
    }

    /// Detect the module launcher for `mode`, returning the command word used in scripts.
    fn module_launcher(env: &ProbeEnvironment, mode: ExecutionMode) -> Result<&'static str, String> {
        match mode {
            ExecutionMode::Lmod => {
                if env.var("LMOD_CMD").is_some()
                    || env.find_executable("ml").is_some()
                    || env.find_executable("lmod").is_some()
                {
                    Ok("ml")
                } else {
                    Err("lmod not present (no LMOD_CMD, ml or lmod found)".to_string())
                }
            }
            _ => {
                if env.var("MODULESHOME").is_some()
                    || env.find_executable("modulecmd").is_some()
                    || env.find_executable("module").is_some()
                {
                    Ok("module")
                } else {
                    Err(
                        "module system not present (no MODULESHOME, modulecmd or module found)"
                            .to_string(),
                    )
                }
            }
        }
    }

    async fn probe_modules(
        &self,
        env: &ProbeEnvironment,
        mode: ExecutionMode,
        spec: &ToolSpec,
    ) -> BackendAvailability {
        let command = match Self::module_launcher(env, mode) {
            Ok(command) => command,
            Err(detail) => return BackendAvailability::unavailable(mode, detail),
        };
        if spec.module_aliases.is_empty() {
            return BackendAvailability::unavailable(
                mode,
                format!("no module aliases configured for tool '{}'", spec.name),
            );
        }

        let aliases = if self.verify_module_aliases {
            let mut listed = Vec::new();
            for alias in &spec.module_aliases {
                let plan = module_avail_plan(
                    &self.module_shell,
                    command,
                    alias,
                    &env.working_dir,
                    self.probe_timeout,
                );
                let outcome = plan.execute().await;
                if let Some(failure) = &outcome.failure {
                    warn!("Module listing for '{alias}' failed: {failure}");
                    continue;
                }
                let listing = format!("{}\n{}", outcome.stdout, outcome.stderr);
                if listing_mentions_alias(&listing, alias) {
                    listed.push(alias.clone());
                } else {
                    debug!("Module alias '{alias}' not listed by {command} avail");
                }
            }
            if listed.is_empty() {
                return BackendAvailability::unavailable(
                    mode,
                    format!(
                        "no module alias found (tried: {})",
                        spec.module_aliases.join(", ")
                    ),
                );
            }
            listed
        } else {
            spec.module_aliases.clone()
        };

        BackendAvailability::available(
            mode,
            BackendResource::Modules {
                shell: self.module_shell.clone(),
                command: command.to_string(),
                aliases,
            },
        )
    }

    async fn probe_singularity(&self, env: &ProbeEnvironment, spec: &ToolSpec) -> BackendAvailability {
        let mode = ExecutionMode::Singularity;
        let Some(runtime) = env
            .find_executable("singularity")
            .or_else(|| env.find_executable("apptainer"))
        else {
            return BackendAvailability::unavailable(
                mode,
                "singularity runtime not present (no singularity or apptainer found)",
            );
        };

        let outcome = runtime_version_plan(&runtime, &env.working_dir, self.probe_timeout)
            .execute()
            .await;
        if !outcome.success {
            return BackendAvailability::unavailable(
                mode,
                format!("singularity runtime check failed: {}", outcome.describe_failure()),
            );
        }

        match singularity_image_for(spec) {
            Some(image) => {
                let version = outcome.first_line();
                let availability =
                    BackendAvailability::available(mode, BackendResource::Container { runtime, image });
                match version {
                    Some(version) => availability.with_detail(version),
                    None => availability,
                }
            }
            None => BackendAvailability::unavailable(
                mode,
                format!("no container image configured for tool '{}'", spec.name),
            ),
        }
    }

    async fn probe_docker(&self, env: &ProbeEnvironment, spec: &ToolSpec) -> BackendAvailability {
        let mode = ExecutionMode::Docker;
        let Some(runtime) = env.find_executable("docker") else {
            return BackendAvailability::unavailable(mode, "docker not found on PATH");
        };

        let outcome = docker_info_plan(&runtime, &env.working_dir, self.probe_timeout)
            .execute()
            .await;
        if !outcome.success {
            return BackendAvailability::unavailable(
                mode,
                format!("docker daemon unreachable: {}", outcome.describe_failure()),
            );
        }

        match docker_image_for(spec) {
            Some(image) => {
                BackendAvailability::available(mode, BackendResource::Container { runtime, image })
            }
            None => BackendAvailability::unavailable(
                mode,
                format!("no container image configured for tool '{}'", spec.name),
            ),
        }
    }
}

#[async_trait]
impl BackendProbe for SystemProbe {
    async fn probe(&self, mode: ExecutionMode, spec: &ToolSpec) -> BackendAvailability {
        let env = self.environment();
        let availability = match mode {
            ExecutionMode::Native => self.probe_native(&env, spec),
            ExecutionMode::Module | ExecutionMode::Lmod => {
                self.probe_modules(&env, mode, spec).await
            }
            ExecutionMode::Singularity => self.probe_singularity(&env, spec).await,
            ExecutionMode::Docker => self.probe_docker(&env, spec).await,
        };

        if availability.available {
            info!("Tool '{}' is available via {mode}", spec.name);
        } else {
            debug!(
                "Tool '{}' is not available via {mode}: {}",
                spec.name,
                availability.diagnostic()
            );
        }
        availability
    }

    async fn detect_version(&self, binary: &Path) -> Option<String> {
        let env = self.environment();
        for plan in version_plans(binary, &env.working_dir) {
            let outcome = plan.execute().await;
            if outcome.success
                && let Some(line) = outcome.first_line()
            {
                return Some(line);
            }
        }
        None
    }
}

/// Regular file with at least one execute bit set.
pub(crate) fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}
