use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod ui;

use commands::detect::DetectCommand;
use commands::extract::ExtractPreviewCommand;
use commands::list::ListCommand;
use commands::update::UpdateCommand;

/// seerkit - Unity UI asset toolkit for the Seer asset CDN
#[derive(Parser)]
#[command(
    name = "seerkit",
    version = env!("CARGO_PKG_VERSION"),
    about = "Download and mine Unity UI assets from the Seer asset CDN",
    long_about = None,
    arg_required_else_help = true
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export the activity-list preview sprite from the local bundle
    ExtractPreview(ExtractPreviewCommand),

    /// Check the CDN for a newer package version and download changed bundles
    Update(UpdateCommand),

    /// List the objects inside a bundle
    List(ListCommand),

    /// Identify a file's container format
    Detect(DetectCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    colored::control::set_override(!cli.no_color);
    init_logging(cli.verbose);

    match &cli.command {
        Commands::ExtractPreview(cmd) => cmd.execute(),
        Commands::Update(cmd) => cmd.execute(),
        Commands::List(cmd) => cmd.execute(),
        Commands::Detect(cmd) => cmd.execute(),
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "seerkit_unity={},seerkit_updater={},seerkit={}",
            level, level, level
        ))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }
}
