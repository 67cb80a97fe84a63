//! # Invocation Builder
//!
//! Turns an [`ExecutionPlan`] plus an [`InvocationRequest`] into a [`ConcreteCommand`]:
//! the exact argv, environment overlay and working directory the executor runs.
//!
//! Tool arguments are always appended as separate argv entries and never pass through
//! a shell parser. The module wrapper script only ever sees them as `"$@"`.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::BindMount;
use crate::mode::ExecutionMode;
use crate::resolver::ExecutionPlan;
use crate::tool_availability::{BackendResource, is_executable};

/// Exit status used by `docker run` and by the module wrapper when the backend itself
/// failed before the tool started.
pub const BACKEND_LAUNCH_FAILURE_CODE: i32 = 125;

/// One request to run a tool binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationRequest {
    /// Executable to run, e.g. `blastn` or `makeblastdb`.
    pub binary: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Environment overlay applied on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Falls back to the configured timeout when unset.
    pub timeout: Option<Duration>,
    /// Falls back to the configured maximum output size when unset.
    pub max_output_size: Option<usize>,
}

impl InvocationRequest {
    pub fn new(binary: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            env: BTreeMap::new(),
            timeout: None,
            max_output_size: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_output_size(mut self, bytes: usize) -> Self {
        self.max_output_size = Some(bytes);
        self
    }
}

/// A fully specified process invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConcreteCommand {
    pub mode: ExecutionMode,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_dir: PathBuf,
    /// Run after a timeout kill to stop backend-side state (e.g. a detached container).
    pub cleanup: Option<Vec<String>>,
    /// Exit codes meaning the backend failed to launch the tool.
    pub launch_failure_codes: Vec<i32>,
}

impl ConcreteCommand {
    /// Render the argv as one line for logs.
    pub fn display_line(&self) -> String {
        std::iter::once(self.program.to_string_lossy().to_string())
            .chain(self.args.iter().cloned())
            .map(|part| {
                if part.is_empty() || part.contains(char::is_whitespace) {
                    shell_quote(&part)
                } else {
                    part
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

static CONTAINER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Name for a Docker container that is unique within this host for this process.
fn unique_container_name() -> String {
    format!(
        "bio-exec-{}-{}",
        std::process::id(),
        CONTAINER_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// Build the concrete command for `request` under `plan`.
pub fn build(plan: &ExecutionPlan, request: &InvocationRequest) -> ConcreteCommand {
    match &plan.resource {
        BackendResource::Binary { path } => build_native(plan, path, request),
        BackendResource::Modules {
            shell,
            command,
            aliases,
        } => build_module(plan, shell, command, aliases, request),
        BackendResource::Container { runtime, image } => match plan.mode {
            ExecutionMode::Docker => build_docker(plan, runtime, image, request),
            _ => build_singularity(plan, runtime, image, request),
        },
    }
}

fn build_native(plan: &ExecutionPlan, resolved: &Path, request: &InvocationRequest) -> ConcreteCommand {
    ConcreteCommand {
        mode: plan.mode,
        program: native_program(resolved, &request.binary),
        args: request.args.clone(),
        env: request.env.clone(),
        working_dir: request.working_dir.clone(),
        cleanup: None,
        launch_failure_codes: Vec::new(),
    }
}

/// The probed binary when the request names it, else an executable sibling of it
/// (`blastp` next to `blastn`), else the requested name as given.
fn native_program(resolved: &Path, requested: &str) -> PathBuf {
    if requested.is_empty() || resolved.file_name().is_some_and(|name| name == requested) {
        return resolved.to_path_buf();
    }
    if requested.contains(std::path::MAIN_SEPARATOR) {
        return PathBuf::from(requested);
    }
    if let Some(sibling) = resolved.parent().map(|dir| dir.join(requested))
        && is_executable(&sibling)
    {
        return sibling;
    }
    PathBuf::from(requested)
}

fn build_module(
    plan: &ExecutionPlan,
    shell: &str,
    module_command: &str,
    aliases: &[String],
    request: &InvocationRequest,
) -> ConcreteCommand {
    let mut args = vec![
        "-l".to_string(),
        "-c".to_string(),
        module_script(module_command, aliases),
        request.binary.clone(),
    ];
    args.extend(request.args.iter().cloned());

    ConcreteCommand {
        mode: plan.mode,
        program: PathBuf::from(shell),
        args,
        env: request.env.clone(),
        working_dir: request.working_dir.clone(),
        cleanup: None,
        launch_failure_codes: vec![BACKEND_LAUNCH_FAILURE_CODE],
    }
}

/// Script that loads the first loadable alias, then replaces itself with `"$0" "$@"`.
pub(crate) fn module_script(module_command: &str, aliases: &[String]) -> String {
    let quoted: Vec<String> = aliases.iter().map(|a| shell_quote(a)).collect();
    let tried = aliases.join(", ");
    format!(
        "bio_exec_loaded=''\n\
         for bio_exec_module in {list}; do\n\
         \x20 if {cmd} load \"$bio_exec_module\" >/dev/null 2>&1; then bio_exec_loaded=\"$bio_exec_module\"; break; fi\n\
         done\n\
         if [ -z \"$bio_exec_loaded\" ]; then echo {msg} >&2; exit {code}; fi\n\
         exec \"$0\" \"$@\"",
        list = quoted.join(" "),
        cmd = module_command,
        msg = shell_quote(&format!("bio_exec: no module could be loaded (tried: {tried})")),
        code = BACKEND_LAUNCH_FAILURE_CODE,
    )
}

fn build_singularity(
    plan: &ExecutionPlan,
    runtime: &Path,
    image: &str,
    request: &InvocationRequest,
) -> ConcreteCommand {
    let cwd = request.working_dir.display().to_string();
    let binds = std::iter::once(format!("{cwd}:{cwd}"))
        .chain(extra_binds(&plan.bind_mounts, &request.working_dir))
        .collect::<Vec<_>>()
        .join(",");

    let mut args = vec![
        "exec".to_string(),
        "--pwd".to_string(),
        cwd,
        "--bind".to_string(),
        binds,
    ];
    args.extend(plan.extra_flags.iter().cloned());
    args.push(image.to_string());
    args.push(request.binary.clone());
    args.extend(request.args.iter().cloned());

    ConcreteCommand {
        mode: plan.mode,
        program: runtime.to_path_buf(),
        args,
        env: request.env.clone(),
        working_dir: request.working_dir.clone(),
        cleanup: None,
        launch_failure_codes: Vec::new(),
    }
}

fn build_docker(
    plan: &ExecutionPlan,
    runtime: &Path,
    image: &str,
    request: &InvocationRequest,
) -> ConcreteCommand {
    let name = unique_container_name();
    let cwd = request.working_dir.display().to_string();

    let mut args = vec![
        "run".to_string(),
        "--rm".to_string(),
        "--init".to_string(),
        "--name".to_string(),
        name.clone(),
        "-v".to_string(),
        format!("{cwd}:{cwd}"),
    ];
    for bind in extra_binds(&plan.bind_mounts, &request.working_dir) {
        args.push("-v".to_string());
        args.push(bind);
    }
    args.push("-w".to_string());
    args.push(cwd);
    for (key, value) in &request.env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }
    args.extend(plan.extra_flags.iter().cloned());
    args.push(image.to_string());
    args.push(request.binary.clone());
    args.extend(request.args.iter().cloned());

    ConcreteCommand {
        mode: plan.mode,
        program: runtime.to_path_buf(),
        args,
        // Overlay is passed with `-e`.
        env: BTreeMap::new(),
        working_dir: request.working_dir.clone(),
        cleanup: Some(vec![
            runtime.to_string_lossy().to_string(),
            "kill".to_string(),
            name,
        ]),
        launch_failure_codes: vec![BACKEND_LAUNCH_FAILURE_CODE],
    }
}

/// Configured bind mounts, minus a plain remount of the working directory.
fn extra_binds<'a>(
    mounts: &'a [BindMount],
    working_dir: &'a Path,
) -> impl Iterator<Item = String> + 'a {
    mounts
        .iter()
        .filter(move |m| !(m.host == working_dir && m.container == working_dir && !m.read_only))
        .map(ToString::to_string)
}

/// POSIX single-quote `value`.
pub(crate) fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_survives_embedded_quotes() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn module_script_lists_aliases_in_order() {
        let script = module_script("ml", &["blast+".to_string(), "ncbi blast".to_string()]);
        assert!(script.contains("for bio_exec_module in 'blast+' 'ncbi blast'; do"));
        assert!(script.contains("ml load \"$bio_exec_module\""));
        assert!(script.contains("exit 125"));
        assert!(script.ends_with("exec \"$0\" \"$@\""));
    }

    #[test]
    fn native_program_prefers_probed_binary() {
        let resolved = Path::new("/opt/blast/bin/blastn");
        assert_eq!(native_program(resolved, "blastn"), resolved);
        assert_eq!(native_program(resolved, ""), resolved);
        // No such sibling on this host: fall back to the bare name.
        assert_eq!(
            native_program(resolved, "blastp"),
            PathBuf::from("blastp")
        );
    }

    #[test]
    fn container_names_are_unique() {
        assert_ne!(unique_container_name(), unique_container_name());
    }
}
