//! # bio_exec
//!
//! Execution-mode resolution for bioinformatics tool adapters.
//!
//! Given a logical tool name (`blast`, `samtools`, `bwa`, ...) this crate decides *how*
//! the tool can run on the current host and runs it:
//!
//! *   **Native**: a binary on the executable search path (or an explicit path).
//! *   **Module / Lmod**: a binary made available by `module load` / `ml load` on HPC systems.
//! *   **Singularity**: a binary inside a Singularity/Apptainer image.
//! *   **Docker**: a binary inside an ephemeral Docker container.
//!
//! ## Architecture
//!
//! *   [`tool_availability`]: the Backend Probe. Checks one mode for one tool, bounded by
//!     a probe timeout, with results cached per (mode, tool).
//! *   [`registry`]: the Mode Registry. Per-tool specs and the global mode policy, built
//!     from layered [`config`].
//! *   [`resolver`]: picks exactly one [`ExecutionPlan`] by walking the preference order.
//! *   [`invocation`]: turns a plan plus a request into a [`ConcreteCommand`].
//! *   [`executor`]: runs a command with a timeout, bounded output capture and
//!     process-group kill.
//! *   [`runner`]: the [`ToolRunner`] facade (`resolve_and_run`).
//!
//! ## Example
//!
//! ```rust,no_run
//! use bio_exec::{InvocationRequest, Settings, SettingsLayer, ToolRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runner = ToolRunner::new(Settings::load(None, SettingsLayer::default())?);
//!     let request = InvocationRequest::new("samtools", std::env::current_dir()?)
//!         .args(["--version"]);
//!     let result = runner.resolve_and_run("samtools", request).await;
//!     println!("{:?} via {:?}", result.outcome, result.mode);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod invocation;
pub mod mode;
pub mod registry;
pub mod report;
pub mod resolver;
pub mod runner;
pub mod shell;
pub mod tool_availability;
pub mod utils;

pub use config::{BindMount, Settings, SettingsLayer, ToolSettings};
pub use error::{ConfigError, InputFileError, ModeAttempt, ResolveError};
pub use executor::{InvocationOutcome, InvocationResult};
pub use invocation::{ConcreteCommand, InvocationRequest};
pub use mode::{ExecutionMode, parse_mode_list};
pub use registry::{ModePolicy, ModeRegistry, ToolSpec};
pub use report::{DetectionReport, ToolDetection};
pub use resolver::{CandidateOrder, ExecutionPlan, candidate_order, resolve_plan};
pub use runner::ToolRunner;
pub use tool_availability::{
    AvailabilityCache, BackendAvailability, BackendProbe, BackendResource, ProbeEnvironment,
    SystemProbe,
};
