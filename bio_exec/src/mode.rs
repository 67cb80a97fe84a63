//! Execution modes and preference-list parsing.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// One of the supported ways of locating and running a tool binary.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Binary found on the executable search path.
    Native,
    /// Binary provided by an Environment Modules `module load`.
    Module,
    /// Binary provided by an Lmod `ml load`.
    Lmod,
    /// Binary run inside a Singularity/Apptainer image.
    Singularity,
    /// Binary run inside an ephemeral Docker container.
    Docker,
}

impl ExecutionMode {
    /// Every mode, in the default preference order.
    pub const ALL: [ExecutionMode; 5] = [
        ExecutionMode::Native,
        ExecutionMode::Module,
        ExecutionMode::Lmod,
        ExecutionMode::Singularity,
        ExecutionMode::Docker,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionMode::Native => "native",
            ExecutionMode::Module => "module",
            ExecutionMode::Lmod => "lmod",
            ExecutionMode::Singularity => "singularity",
            ExecutionMode::Docker => "docker",
        }
    }

    pub fn is_container(self) -> bool {
        matches!(self, ExecutionMode::Singularity | ExecutionMode::Docker)
    }

    pub fn is_module_system(self) -> bool {
        matches!(self, ExecutionMode::Module | ExecutionMode::Lmod)
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(ExecutionMode::Native),
            "module" => Ok(ExecutionMode::Module),
            "lmod" => Ok(ExecutionMode::Lmod),
            "singularity" => Ok(ExecutionMode::Singularity),
            "docker" => Ok(ExecutionMode::Docker),
            _ => Err(ConfigError::UnknownMode(s.trim().to_string())),
        }
    }
}

/// Parse a comma-separated preference list such as `"native, docker"`.
///
/// Empty segments are ignored. Unknown names and repeated modes are rejected so the
/// resulting order is total with no duplicates.
pub fn parse_mode_list(raw: &str) -> Result<Vec<ExecutionMode>, ConfigError> {
    let modes = raw
        .split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(ExecutionMode::from_str)
        .collect::<Result<Vec<_>, _>>()?;
    ensure_unique(&modes)?;
    Ok(modes)
}

/// Reject preference lists that name the same mode twice.
pub fn ensure_unique(modes: &[ExecutionMode]) -> Result<(), ConfigError> {
    for (index, mode) in modes.iter().enumerate() {
        if modes[..index].contains(mode) {
            return Err(ConfigError::DuplicateMode(*mode));
        }
    }
    Ok(())
}
