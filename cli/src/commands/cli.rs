use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "collector", version, about = "Inspect and synchronize collector runs")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to load instead of ~/.collector/config.toml or ./config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Run directory; overrides `storage.directory`
    #[arg(long, global = true)]
    pub storage_dir: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
#[command(group(clap::ArgGroup::new("source").required(true).args(["instance_id", "scope"])))]
pub struct SyncArgs {
    /// Synchronize on behalf of this integration instance
    #[arg(long)]
    pub instance_id: Option<String>,

    /// Synchronize through the API under this scope
    #[arg(long)]
    pub scope: Option<String>,

    /// Poll the job until the server finishes processing it
    #[arg(long, default_value_t = false)]
    pub wait: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct SummaryArgs {
    /// Print summary.json as-is instead of a table
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload a finished run and finalize the synchronization job
    Sync(SyncArgs),
    /// Show the per-step results of a finished run
    Summary(SummaryArgs),
}
