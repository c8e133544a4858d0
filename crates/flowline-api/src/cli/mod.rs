//! CLI command definitions for the `flowline` binary.
//!
//! Uses clap derive macros for argument parsing. Every command runs against
//! the in-memory stack built by [`AppState`](crate::state::AppState).

pub mod actions;
pub mod catalog;
pub mod run;
pub mod validate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use comfy_table::{Cell, Color};
use flowline_types::execution::{ExecutionStatus, LogStatus};

/// Run declarative workflows from the command line.
#[derive(Parser)]
#[command(name = "flowline", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Engine configuration file.
    #[arg(long, global = true, env = "FLOWLINE_CONFIG", default_value = "flowline.toml")]
    pub config: PathBuf,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a workflow definition file.
    Run {
        /// Path to a YAML or JSON definition.
        file: PathBuf,

        /// Initial context data as a JSON object.
        #[arg(long)]
        data: Option<String>,

        /// Run as if the named event fired.
        #[arg(long)]
        event: Option<String>,

        /// Event payload (JSON) used to resume the run if it suspends.
        #[arg(long)]
        resume_with: Option<String>,
    },

    /// Parse and validate a workflow definition file.
    Validate {
        /// Path to a YAML or JSON definition.
        file: PathBuf,
    },

    /// Fire a trigger against every definition in a directory.
    Trigger {
        /// Directory holding workflow definitions.
        dir: PathBuf,

        /// Trigger type to fire.
        #[arg(long = "type", default_value = "manual")]
        trigger_type: String,

        /// Event name, for `event` triggers.
        #[arg(long)]
        event: Option<String>,

        /// Context data as a JSON object.
        #[arg(long)]
        data: Option<String>,
    },

    /// List registered actions, conditions and triggers.
    Catalog,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

pub(crate) fn format_status(status: ExecutionStatus) -> Cell {
    match status {
        ExecutionStatus::Pending => Cell::new("pending").fg(Color::Yellow),
        ExecutionStatus::Running => Cell::new("running").fg(Color::Blue),
        ExecutionStatus::Waiting => Cell::new("waiting").fg(Color::Magenta),
        ExecutionStatus::Completed => Cell::new("completed").fg(Color::Green),
        ExecutionStatus::Failed => Cell::new("failed").fg(Color::Red),
        ExecutionStatus::Skipped => Cell::new("skipped").fg(Color::DarkYellow),
    }
}

pub(crate) fn format_log_status(status: LogStatus) -> Cell {
    let color = match status {
        LogStatus::Success => Color::Green,
        LogStatus::Failed => Color::Red,
        LogStatus::Skipped => Color::DarkYellow,
        LogStatus::Delayed => Color::Magenta,
    };
    Cell::new(status.to_string()).fg(color)
}

/// Parse a `--data` argument into a JSON object.
pub(crate) fn parse_data(raw: Option<&str>) -> anyhow::Result<serde_json::Value> {
    let Some(raw) = raw else {
        return Ok(serde_json::Value::Object(Default::default()));
    };
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("--data is not valid JSON: {e}"))?;
    if !value.is_object() {
        anyhow::bail!("--data must be a JSON object");
    }
    Ok(value)
}
