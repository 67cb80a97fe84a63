//! # bio_exec CLI
//!
//! Command-line interface definition and main entry point. Every subcommand loads the
//! layered settings; global flags form the top layer.

use crate::{
    ExecutionMode, InvocationRequest, InvocationResult, Settings, SettingsLayer, ToolRunner,
    parse_mode_list,
    report::format_report,
    utils::logging::init_logging,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

/// Resolve and run bioinformatics tools through native, module, Lmod, Singularity or
/// Docker backends.
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about,
    long_about = "bio_exec decides how a bioinformatics tool can run on this host and runs it.

Examples:
  bio_exec resolve blast
  bio_exec run blast --binary blastn -- -query q.fa -db nt -outfmt 6
  bio_exec --execution-mode docker run samtools -- view -H in.bam
  bio_exec info blast samtools"
)]
pub struct Cli {
    /// Configuration file (default: $BIO_MCP_CONFIG, ./bio_exec.toml, then the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Force one execution mode for every tool
    #[arg(long, global = true)]
    pub execution_mode: Option<ExecutionMode>,

    /// Comma-separated preference order, e.g. "native,docker"
    #[arg(long, global = true)]
    pub preferred_modes: Option<String>,

    /// Only consider container modes
    #[arg(long, global = true)]
    pub force_container: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log to stderr instead of file
    #[arg(long, global = true)]
    pub log_to_stderr: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the execution plan chosen for a tool
    Resolve {
        tool: String,
    },
    /// Resolve a tool and run it
    Run {
        tool: String,

        /// Executable to run (defaults to the tool's primary binary)
        #[arg(long)]
        binary: Option<String>,

        /// Working directory for the tool (defaults to the current directory)
        #[arg(long)]
        working_directory: Option<PathBuf>,

        /// Timeout in seconds (overrides configuration)
        #[arg(long)]
        timeout: Option<u64>,

        /// Environment overlay entries, KEY=VALUE
        #[arg(long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,

        /// Re-probe and retry once when the backend fails to launch
        #[arg(long)]
        retry: bool,

        /// Print the full result as JSON instead of passing output through
        #[arg(long)]
        json: bool,

        /// Tool arguments (after --)
        #[arg(allow_hyphen_values = true, trailing_var_arg = true)]
        args: Vec<String>,
    },
    /// Probe every execution mode for a tool
    Probe {
        tool: String,
    },
    /// Report effective settings and tool detection
    Info {
        /// Tools to report on (default: every configured tool)
        tools: Vec<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Print the JSON schema of the configuration file
    Schema,
}

impl Cli {
    /// The explicit-flags configuration layer.
    pub fn flags_layer(&self) -> Result<SettingsLayer> {
        let preferred_modes = self
            .preferred_modes
            .as_deref()
            .map(parse_mode_list)
            .transpose()
            .context("Invalid --preferred-modes")?;
        Ok(SettingsLayer {
            execution_mode: self.execution_mode,
            preferred_modes,
            force_container: self.force_container.then_some(true),
            ..SettingsLayer::default()
        })
    }
}

pub async fn run() -> Result<i32> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    init_logging(log_level, !cli.log_to_stderr)?;

    if let Command::Schema = cli.command {
        let schema = schemars::schema_for!(SettingsLayer);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(0);
    }

    let settings = Settings::load(cli.config.as_deref(), cli.flags_layer()?)
        .context("Failed to load execution settings")?;
    let runner = ToolRunner::new(settings);

    match cli.command {
        Command::Resolve { tool } => match runner.resolve(&tool).await {
            Ok(plan) => {
                println!("{}", serde_json::to_string_pretty(&plan)?);
                Ok(0)
            }
            Err(err) => {
                eprintln!("{err}");
                Ok(1)
            }
        },
        Command::Run {
            tool,
            binary,
            working_directory,
            timeout,
            env,
            retry,
            json,
            args,
        } => {
            let working_dir = match working_directory {
                Some(dir) => dir,
                None => std::env::current_dir().context("Failed to get current directory")?,
            };
            let working_dir = std::fs::canonicalize(&working_dir).with_context(|| {
                format!("Failed to resolve working directory {working_dir:?}")
            })?;
            let binary = binary.unwrap_or_else(|| runner.registry().get(&tool).binary);

            let mut request = InvocationRequest::new(binary, working_dir).args(args);
            for entry in env {
                let (key, value) = entry
                    .split_once('=')
                    .with_context(|| format!("Invalid --env entry '{entry}' (expected KEY=VALUE)"))?;
                request = request.env(key, value);
            }
            if let Some(seconds) = timeout {
                request = request.timeout(std::time::Duration::from_secs(seconds));
            }

            let result = if retry {
                runner.resolve_and_run_with_reprobe(&tool, request).await
            } else {
                runner.resolve_and_run(&tool, request).await
            };
            report_result(&result, json)
        }
        Command::Probe { tool } => {
            let probes = runner.probe_tool(&tool).await;
            println!("{}", serde_json::to_string_pretty(&probes)?);
            Ok(0)
        }
        Command::Info { tools, json } => {
            let report = runner.detection_report(&tools).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", format_report(&report));
            }
            Ok(0)
        }
        Command::Schema => Ok(0),
    }
}

/// Print a run result and map it to a process exit code.
fn report_result(result: &InvocationResult, json: bool) -> Result<i32> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        print!("{}", result.stdout);
        eprint!("{}", result.stderr);
        if !result.is_success()
            && let Some(message) = &result.message
        {
            eprintln!("bio_exec: {message}");
        }
    }
    // The caller may `process::exit`, which skips buffered writers.
    std::io::stdout().flush()?;
    Ok(match result.exit_code {
        Some(code) if !result.is_success() && code != 0 => code,
        _ if result.is_success() => 0,
        _ => 1,
    })
}
