use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "excise")]
#[command(about = "Remove specific commits from a git repository's history")]
struct Cli {
    /// Path to the git repository
    repo_path: PathBuf,

    /// Comma-separated commit hashes to remove, or a file with one hash per line
    #[arg(short, long)]
    commits: String,

    /// Create a backup branch at the current tip before removing commits
    #[arg(short, long, value_name = "NAME")]
    backup: Option<String>,

    /// Proceed even with uncommitted changes (they may be lost)
    #[arg(short, long)]
    force: bool,

    /// Show what would be removed without changing anything
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Path to a TOML config file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log more detail to stderr (repeat for debug output)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = excise::Config::load(cli.config.as_deref())?;
    let options = excise::Options {
        repo_path: cli.repo_path,
        commits: excise::CommitList::from_arg(&cli.commits)?,
        backup: cli.backup,
        force: cli.force,
        dry_run: cli.dry_run,
    };

    let outcome = excise::excise(&options, &config)?;
    print!("{}", excise::render(&outcome));

    Ok(())
}
