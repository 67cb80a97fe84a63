use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;

use super::types::ProbePlan;
use crate::registry::ToolSpec;

/// Flags tried, in order, when asking a native binary for its version.
pub(super) const VERSION_FLAGS: [&str; 4] = ["--version", "-v", "-V", "version"];

pub(super) const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub(super) fn docker_info_plan(runtime: &Path, working_dir: &Path, timeout: Duration) -> ProbePlan {
    ProbePlan {
        label: "docker info".to_string(),
        command: vec![runtime.to_string_lossy().to_string(), "info".to_string()],
        working_dir: working_dir.to_path_buf(),
        timeout,
    }
}

pub(super) fn runtime_version_plan(
    runtime: &Path,
    working_dir: &Path,
    timeout: Duration,
) -> ProbePlan {
    ProbePlan {
        label: format!("{} --version", runtime.display()),
        command: vec![
            runtime.to_string_lossy().to_string(),
            "--version".to_string(),
        ],
        working_dir: working_dir.to_path_buf(),
        timeout,
    }
}

/// `<shell> -l -c '<command> avail "$1"' bio_exec <alias>`.
///
/// A login shell is needed because `module` and `ml` are usually shell functions
/// defined by profile scripts. The alias travels as a positional argument.
pub(super) fn module_avail_plan(
    shell: &str,
    module_command: &str,
    alias: &str,
    working_dir: &Path,
    timeout: Duration,
) -> ProbePlan {
    ProbePlan {
        label: format!("{module_command} avail {alias}"),
        command: vec![
            shell.to_string(),
            "-l".to_string(),
            "-c".to_string(),
            format!("{module_command} avail \"$1\" 2>&1"),
            "bio_exec".to_string(),
            alias.to_string(),
        ],
        working_dir: working_dir.to_path_buf(),
        timeout,
    }
}

pub(super) fn version_plans(binary: &Path, working_dir: &Path) -> Vec<ProbePlan> {
    VERSION_FLAGS
        .iter()
        .map(|flag| ProbePlan {
            label: format!("{} {flag}", binary.display()),
            command: vec![binary.to_string_lossy().to_string(), flag.to_string()],
            working_dir: working_dir.to_path_buf(),
            timeout: VERSION_PROBE_TIMEOUT,
        })
        .collect()
}

/// Whether `listing` (output of `module avail`) names `alias` as a whole token.
///
/// `blast` matches `blast/2.15.0` and `blast` but not `blast+` or `ncbi-blast`.
/// Matching is case-insensitive.
pub(crate) fn listing_mentions_alias(listing: &str, alias: &str) -> bool {
    let pattern = format!(
        r"(?i)(?:^|[^A-Za-z0-9_.+-]){}(?:$|[^A-Za-z0-9_.+-])",
        regex::escape(alias)
    );
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(listing),
        Err(_) => listing.to_lowercase().contains(&alias.to_lowercase()),
    }
}

/// Pick the image a Singularity run should use.
///
/// An existing local `.sif` wins. Otherwise the container image reference is used:
/// as-is when it carries a scheme (`docker://`, `library://`, ...) and prefixed with
/// `docker://` when it is a plain registry reference.
pub(crate) fn singularity_image_for(spec: &ToolSpec) -> Option<String> {
    if let Some(local) = spec.singularity_image.as_ref().filter(|p| p.is_file()) {
        return Some(local.to_string_lossy().to_string());
    }
    let image = spec.container_image.as_deref()?.trim();
    if image.is_empty() {
        return None;
    }
    if image.contains("://") || PathBuf::from(image).is_file() {
        Some(image.to_string())
    } else {
        Some(format!("docker://{image}"))
    }
}

/// Configured Docker image for `spec`, if any.
pub(crate) fn docker_image_for(spec: &ToolSpec) -> Option<String> {
    spec.container_image
        .as_deref()
        .map(str::trim)
        .filter(|image| !image.is_empty())
        .map(|image| image.strip_prefix("docker://").unwrap_or(image).to_string())
}
