use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "provisio")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Compile declarative resource plans into step-wise provisioning programs", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compile a plan into a program artifact (JSON)
    Compile(CompileArgs),

    /// Show the dependency levels of a plan
    Levels(PlanArgs),

    /// Show what a run would do to each resource
    Plan(PlanArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Plan file (TOML)
    pub plan: PathBuf,

    /// Prior-state snapshot (JSON) from the last run
    #[arg(short, long)]
    pub state: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct CompileArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Write the artifact here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Emit subroutines that recreate tracked resources which vanished
    #[arg(long)]
    pub create_missing: bool,
}
