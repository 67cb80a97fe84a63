use serde::Serialize;
use std::path::PathBuf;

use crate::mode::ExecutionMode;

/// Malformed or contradictory configuration, detected while loading settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "Unknown execution mode '{0}' (expected one of: native, module, lmod, singularity, docker)"
    )]
    UnknownMode(String),

    #[error("Execution mode '{0}' appears more than once in the preferred modes")]
    DuplicateMode(ExecutionMode),

    #[error("Preferred modes list is empty{}", format_scope(.tool))]
    EmptyPreference { tool: Option<String> },

    #[error(
        "Forced execution mode '{mode}' contradicts force_container (only singularity or docker may be forced together with it)"
    )]
    ForcedModeConflict { mode: ExecutionMode },

    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Invalid bind mount '{0}' (expected host:container[:ro|rw])")]
    InvalidBindMount(String),

    #[error("Failed to read configuration file '{path:?}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file '{path:?}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

fn format_scope(tool: &Option<String>) -> String {
    match tool {
        Some(name) => format!(" for tool '{name}'"),
        None => String::new(),
    }
}

/// One execution mode that was considered during resolution and why it was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeAttempt {
    pub mode: ExecutionMode,
    pub detail: String,
}

/// Resolution failures. Always carries every attempted mode with its diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error(
        "Tool '{tool}' is not available in this environment{}: {}",
        format_forced(.forced),
        format_attempts(.attempts)
    )]
    BackendUnavailable {
        tool: String,
        forced: Option<ExecutionMode>,
        attempts: Vec<ModeAttempt>,
    },
}

impl ResolveError {
    pub fn attempts(&self) -> &[ModeAttempt] {
        match self {
            ResolveError::BackendUnavailable { attempts, .. } => attempts,
        }
    }
}

/// Input file rejected before a tool is run.
#[derive(Debug, thiserror::Error)]
pub enum InputFileError {
    #[error("Input file not found: {0:?}")]
    NotFound(PathBuf),

    #[error("Input file {path:?} is too large ({size} bytes; maximum is {limit} bytes)")]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    #[error("Failed to inspect input file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn format_forced(forced: &Option<ExecutionMode>) -> String {
    match forced {
        Some(mode) => format!(" (execution mode forced to '{mode}')"),
        None => String::new(),
    }
}

pub(crate) fn format_attempts(attempts: &[ModeAttempt]) -> String {
    if attempts.is_empty() {
        return "no execution modes were attempted".to_string();
    }
    attempts
        .iter()
        .map(|attempt| format!("{}: {}", attempt.mode, attempt.detail))
        .collect::<Vec<_>>()
        .join("; ")
}
