mod cli;
mod cmd;
mod format;
mod progress;
mod signal;

use clap::Parser;

use vger_reindex::commands::rebuild_index::RebuildError;

use cli::{Cli, Commands};
use cmd::rebuild_index::{run_rebuild_index, RebuildArgs};
use progress::ProgressAwareStderr;

/// Exit status after a shutdown request, as for a SIGINT-terminated process.
const EXIT_INTERRUPTED: i32 = 130;

fn main() {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(ProgressAwareStderr)
        .init();

    signal::install_signal_handlers();

    let result = match cli.command {
        Commands::RebuildIndex {
            repo,
            workers,
            ignore_pack,
            key_file,
            dry_run,
        } => run_rebuild_index(
            cli.config.as_deref(),
            RebuildArgs {
                repo,
                workers,
                ignore_pack,
                key_file,
                dry_run,
            },
            !cli.quiet,
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        let orphans = e.orphaned_indexes();
        if !orphans.is_empty() {
            eprintln!(
                "{} new index files were saved before the failure; the old index is intact:",
                orphans.len()
            );
            for id in orphans {
                eprintln!("  {}", id.to_hex());
            }
        }
        let interrupted =
            matches!(e, RebuildError::Interrupted { .. }) || signal::shutdown_requested();
        std::process::exit(if interrupted { EXIT_INTERRUPTED } else { 1 });
    }
}
