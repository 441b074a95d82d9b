use clap::{Parser, Subcommand};

use vger_types::pack_id::PackId;

#[derive(Parser)]
#[command(
    name = "vger-reindex",
    version,
    about = "Rebuild the index of a vger backup repository from its pack files",
    after_help = "\
Repository selection:
  1. --repo <url>                 (on the subcommand; overrides the config file URL)
  2. repository.url from --config or $VGER_REINDEX_CONFIG

Environment variables:
  VGER_REINDEX_CONFIG   Path to configuration file"
)]
pub(crate) struct Cli {
    /// Path to configuration file (overrides VGER_REINDEX_CONFIG)
    #[arg(short, long, env = "VGER_REINDEX_CONFIG")]
    pub config: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only print errors; no progress line
    #[arg(short, long)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Scan every pack and replace the repository index
    RebuildIndex {
        /// Repository path or file:// URL
        #[arg(short = 'R', long = "repo")]
        repo: Option<String>,

        /// Concurrent pack scans (1-256, overrides config)
        #[arg(long, value_parser = clap::value_parser!(u16).range(1..=256))]
        workers: Option<u16>,

        /// Leave this pack (hex id) out of the new index; repeatable
        #[arg(long = "ignore-pack", value_parser = parse_pack_id)]
        ignore_pack: Vec<PackId>,

        /// File holding the hex-encoded repository key (overrides config)
        #[arg(long)]
        key_file: Option<String>,

        /// Scan and plan the new index without writing or deleting anything
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
}

fn parse_pack_id(s: &str) -> Result<PackId, String> {
    PackId::from_hex(s.trim())
}
