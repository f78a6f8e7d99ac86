//! Clap derive structures for the `ihcbridge` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// ihcbridge -- IHC controller to MQTT gateway
#[derive(Debug, Parser)]
#[command(
    name = "ihcbridge",
    version,
    about = "Bridge an IHC home-automation controller to an MQTT broker",
    long_about = "Publishes the state of every IHC dataline input and output to MQTT\n\
        and applies ON/OFF commands from MQTT to the controller's outputs.\n\n\
        Topics: <prefix>/<group>/<product>-<position>/<point>/state|command",
    propagate_version = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    /// Defaults to `run`
    #[command(subcommand)]
    pub command: Option<Command>,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (TOML for *.toml, key=value properties otherwise)
    #[arg(long, short = 'c', env = "IHCBRIDGE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Topic prefix (overrides topic_prefix)
    #[arg(long, global = true)]
    pub topic_prefix: Option<String>,

    /// Write the resource/topic mapping to this file (overrides mapfile)
    #[arg(long, global = true)]
    pub mapfile: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table
    Table,
    /// Pretty-printed JSON
    Json,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Bridge controller and broker until SIGINT or SIGTERM
    Run,

    /// Print the topic mapping of the controller's project, without MQTT
    Topics(TopicsArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct TopicsArgs {
    /// Output format
    #[arg(long, short = 'o', value_enum, default_value = "table")]
    pub output: OutputFormat,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}
