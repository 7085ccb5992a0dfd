use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "twk",
    about = "twk: apply and revert system tweaks with a durable undo ledger",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (default: <data-dir>/twk.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the ledger and drift snapshot
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Tweak catalog file (default: built-in catalog)
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    /// Treat the process as elevated
    #[arg(long, global = true)]
    pub elevated: bool,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the status of every tweak
    Status(StatusArgs),
    /// Apply tweaks by id
    Apply(TweakIds),
    /// Revert tweaks by id
    Revert(TweakIds),
    /// Apply every tweak in a module
    ApplyModule(ModuleArg),
    /// Revert every tweak in a module
    RevertModule(ModuleArg),
    /// Restore every captured value, newest first
    RestoreAll,
    /// Report tweaks reverted since the last snapshot
    Drift,
    /// Record the currently applied tweaks for drift detection
    Snapshot,
    /// Show captured pre-images
    Ledger(LedgerArgs),
    /// Interactive session
    Shell,
}

#[derive(Args)]
pub struct StatusArgs {
    #[arg(short, long)]
    pub module: Option<String>,
}

#[derive(Args)]
pub struct TweakIds {
    #[arg(required = true)]
    pub ids: Vec<String>,
}

#[derive(Args)]
pub struct ModuleArg {
    pub module: String,
}

#[derive(Args)]
pub struct LedgerArgs {
    /// Only check the ledger file's integrity
    #[arg(long)]
    pub verify: bool,
}
