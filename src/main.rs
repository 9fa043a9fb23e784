use clap::{Parser, Subcommand};
use relnotes::commands::draft::draft_command;
use relnotes::commands::publish::publish_command;
use relnotes::commands::status::status_command;
use relnotes::commands::walk::walk_command;
use relnotes::commands::{print_error, Outcome};
use relnotes::config::{Config, Settings};
use relnotes::logging::init_logging;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "relnotes")]
#[command(about = "Human-reviewed, multi-language release notes from git history", long_about = None)]
struct Cli {
    /// Config file (defaults to ./relnotes.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also append log events to this file (overrides `[log] file`)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest and classify a range, then write the review manifest
    Draft {
        /// Exclusive lower bound (tag, branch, or hash)
        #[arg(long)]
        from: String,

        /// Inclusive upper bound
        #[arg(long, default_value = "HEAD")]
        to: String,

        /// Repository path
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Replace a manifest that is still under review
        #[arg(long)]
        force: bool,
    },

    /// Show the manifest lifecycle state and review progress
    Status,

    /// Render, translate and publish the reviewed manifest
    Publish,

    /// List the changes in a range (debug)
    Walk {
        #[arg(long)]
        from: String,

        #[arg(long, default_value = "HEAD")]
        to: String,

        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Limit number of changes to show
        #[arg(long)]
        limit: Option<usize>,

        /// Skip touched file lists
        #[arg(long)]
        no_files: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(e) => {
            print_error(&e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<Outcome> {
    let config = Config::load(cli.config.as_deref())?;
    init_logging(cli.log_file.as_deref().or(config.log.file.as_deref()))?;
    let settings = || Settings::from_env(config.clone());

    match &cli.command {
        Commands::Draft {
            from,
            to,
            repo,
            force,
        } => draft_command(&settings()?, repo, from, to, *force).await,
        Commands::Status => status_command(&settings()?),
        Commands::Publish => publish_command(&settings()?).await,
        Commands::Walk {
            from,
            to,
            repo,
            limit,
            no_files,
            json,
        } => walk_command(repo, from, to, *limit, !*no_files, *json),
    }
}
