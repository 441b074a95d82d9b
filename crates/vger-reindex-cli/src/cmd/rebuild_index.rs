use std::collections::HashSet;
use std::path::Path;

use vger_reindex::commands::rebuild_index::{
    self, RebuildError, RebuildOptions, RebuildProgressEvent, RebuildResult,
};
use vger_reindex::config::{load_config, ReindexConfig};
use vger_types::error::VgerError;
use vger_types::pack_id::PackId;

use crate::format::format_bytes;
use crate::progress::RebuildProgressRenderer;
use crate::signal::SHUTDOWN;

/// Flags of the `rebuild-index` subcommand.
pub(crate) struct RebuildArgs {
    pub repo: Option<String>,
    pub workers: Option<u16>,
    pub ignore_pack: Vec<PackId>,
    pub key_file: Option<String>,
    pub dry_run: bool,
}

/// Merge the config file (if any) with command-line overrides.
pub(crate) fn resolve_config(
    config_path: Option<&str>,
    args: &RebuildArgs,
) -> Result<ReindexConfig, VgerError> {
    let mut config = match (config_path, args.repo.as_deref()) {
        (Some(path), _) => load_config(Path::new(path))?,
        (None, Some(url)) => ReindexConfig::for_url(url),
        (None, None) => {
            return Err(VgerError::Config(
                "no repository given; pass --repo or --config (or set VGER_REINDEX_CONFIG)"
                    .into(),
            ))
        }
    };

    if let Some(url) = &args.repo {
        config.repository.url = url.clone();
    }
    if let Some(workers) = args.workers {
        config.rebuild.workers = workers as usize;
    }
    if let Some(key_file) = &args.key_file {
        config.encryption.key_file = Some(key_file.clone());
    }
    config.validate()?;
    Ok(config)
}

pub(crate) fn run_rebuild_index(
    config_path: Option<&str>,
    args: RebuildArgs,
    show_progress: bool,
) -> Result<(), RebuildError> {
    let config = resolve_config(config_path, &args)?;
    tracing::info!("Using repository: {}", config.repository.url);

    let options = RebuildOptions {
        ignore_packs: args.ignore_pack.into_iter().collect::<HashSet<_>>(),
        dry_run: args.dry_run,
    };

    let mut renderer = RebuildProgressRenderer::new(show_progress);
    let mut on_progress = |event: RebuildProgressEvent| renderer.on_event(event);
    let result = rebuild_index::run(&config, &options, Some(&SHUTDOWN), Some(&mut on_progress));
    renderer.finish();

    let result = result?;
    print_summary(&result);
    Ok(())
}

fn print_summary(result: &RebuildResult) {
    let stats = &result.stats;
    let blobs: usize = result.shards.iter().map(|s| s.blobs).sum();

    if result.dry_run {
        let bytes: usize = result.shards.iter().map(|s| s.encoded_bytes).sum();
        println!(
            "Dry run: {} packs scanned, {} blobs would be indexed in {} index files ({})",
            stats.packs_scanned,
            blobs,
            result.shards.len(),
            format_bytes(bytes as u64),
        );
        println!(
            "  {} old index files would be removed",
            result.superseded.len()
        );
    } else {
        println!(
            "Index rebuilt: {} packs scanned, {} blobs indexed in {} new index files",
            stats.packs_scanned,
            blobs,
            result.new_indexes.len(),
        );
        println!(
            "  {} old index files removed",
            result.retirement.removed.len()
        );
    }

    if stats.packs_ignored > 0 {
        println!("  {} packs ignored", stats.packs_ignored);
    }
    if stats.duplicate_blobs > 0 {
        println!(
            "  {} blobs are stored in more than one pack",
            stats.duplicate_blobs
        );
    }

    if !result.invalid_packs.is_empty() {
        println!(
            "  Warning: {} pack(s) are incomplete or damaged and were left out of the index:",
            result.invalid_packs.len()
        );
        for pack in &result.invalid_packs {
            println!(
                "    {} ({}): {}",
                pack.pack_id.to_hex(),
                format_bytes(pack.size),
                pack.defect
            );
        }
    }

    for failure in &result.retirement.failures {
        println!(
            "  Warning: old index {} was not removed: {}",
            failure.index_id.to_hex(),
            failure.reason
        );
    }
    if !result.retirement.failures.is_empty() {
        println!("  The new index supersedes them; run rebuild-index again to clean up.");
    }
}
