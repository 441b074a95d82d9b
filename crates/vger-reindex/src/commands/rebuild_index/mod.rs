//! Rebuild the repository index from pack trailers.
//!
//! Stages run strictly in order:
//! `Enumerating → Scanning → CollectingStale → Building → Persisting →
//! Retiring → Done`. Any failure up to and including `Persisting` aborts the
//! run before anything is deleted; once every new shard is stored the run
//! succeeds and cleanup problems are only reported.

pub mod builder;
pub mod coordinator;
pub mod enumerate;
mod error;
pub mod persist;
pub mod retire;
pub mod scan;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::AtomicBool;

use tracing::{info, warn};

use vger_types::index_id::IndexId;
use vger_types::pack_id::PackId;

use crate::commands::util::{check_interrupted, open_repo, with_repo_lock};
use crate::config::{RebuildConfig, ReindexConfig};
use crate::index::IndexShard;
use crate::repo::Repository;

pub use self::builder::{build_shards, ShardLimits};
pub use self::error::RebuildError;
pub use self::retire::{RetirementFailure, RetirementReport};
pub use self::scan::{InvalidPack, PackDefect, PackScan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RebuildStage {
    Enumerating,
    Scanning,
    CollectingStale,
    Building,
    Persisting,
    Retiring,
    Done,
}

impl fmt::Display for RebuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RebuildStage::Enumerating => "enumerating packs",
            RebuildStage::Scanning => "scanning packs",
            RebuildStage::CollectingStale => "collecting old index files",
            RebuildStage::Building => "building index shards",
            RebuildStage::Persisting => "saving index shards",
            RebuildStage::Retiring => "removing old index files",
            RebuildStage::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RebuildOptions {
    /// Packs left out of the new index entirely; they are neither scanned
    /// nor reported.
    pub ignore_packs: HashSet<PackId>,
    /// Stop after planning the shards; nothing is written or deleted.
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub enum RebuildProgressEvent {
    StageStarted {
        stage: RebuildStage,
    },
    PacksListed {
        total: usize,
        ignored: usize,
    },
    PackScanned {
        completed: usize,
        total: usize,
    },
    StaleIndexesListed {
        count: usize,
    },
    ShardsPlanned {
        shards: usize,
        blobs: usize,
    },
    ShardSaved {
        shard: usize,
        total: usize,
        index_id: IndexId,
    },
    IndexRemoved {
        index_id: IndexId,
    },
    IndexRemovalFailed {
        index_id: IndexId,
        reason: String,
    },
}

pub(crate) fn emit_progress(
    progress: &mut Option<&mut dyn FnMut(RebuildProgressEvent)>,
    event: RebuildProgressEvent,
) {
    if let Some(callback) = progress.as_deref_mut() {
        callback(event);
    }
}

/// Size of one planned shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardSummary {
    pub packs: usize,
    pub blobs: usize,
    pub encoded_bytes: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildStats {
    /// Packs found in the repository, including ignored ones.
    pub packs_listed: usize,
    pub packs_ignored: usize,
    pub packs_scanned: usize,
    pub packs_valid: usize,
    pub packs_invalid: usize,
    pub blobs_indexed: usize,
    /// Records whose blob id was already seen in another record.
    pub duplicate_blobs: usize,
}

/// Outcome of a successful (or dry) rebuild.
#[derive(Debug, Clone, Default)]
pub struct RebuildResult {
    /// Ids of the stored shards, in write order. Empty for a dry run.
    pub new_indexes: Vec<IndexId>,
    /// Packs left out of the index, sorted by pack id.
    pub invalid_packs: Vec<InvalidPack>,
    /// Index objects that existed before the run, sorted.
    pub superseded: Vec<IndexId>,
    pub shards: Vec<ShardSummary>,
    pub retirement: RetirementReport,
    pub stats: RebuildStats,
    pub dry_run: bool,
}

/// Open the configured repository and rebuild its index under the
/// repository lock.
pub fn run(
    config: &ReindexConfig,
    options: &RebuildOptions,
    shutdown: Option<&AtomicBool>,
    progress: Option<&mut dyn FnMut(RebuildProgressEvent)>,
) -> std::result::Result<RebuildResult, RebuildError> {
    config.validate()?;
    let repo = open_repo(config)?;
    with_repo_lock(&repo, |repo| {
        rebuild_index(repo, &config.rebuild, options, shutdown, progress)
    })
}

/// Rebuild the index of an opened repository. The caller holds the lock.
pub fn rebuild_index(
    repo: &Repository,
    config: &RebuildConfig,
    options: &RebuildOptions,
    shutdown: Option<&AtomicBool>,
    mut progress: Option<&mut dyn FnMut(RebuildProgressEvent)>,
) -> std::result::Result<RebuildResult, RebuildError> {
    config.validate()?;
    let mut result = RebuildResult {
        dry_run: options.dry_run,
        ..RebuildResult::default()
    };

    // Enumerating
    start_stage(&mut progress, RebuildStage::Enumerating);
    info!("counting files in repo");
    let inventory = enumerate::enumerate_packs(repo, &options.ignore_packs)?;
    result.stats.packs_listed = inventory.packs.len() + inventory.ignored;
    result.stats.packs_ignored = inventory.ignored;
    emit_progress(
        &mut progress,
        RebuildProgressEvent::PacksListed {
            total: inventory.packs.len(),
            ignored: inventory.ignored,
        },
    );

    // Scanning
    enter_stage(&mut progress, shutdown, RebuildStage::Scanning)?;
    info!("scanning {} pack files", inventory.packs.len());
    let scanned = coordinator::scan_all(
        repo,
        &inventory.packs,
        config.workers,
        shutdown,
        &mut progress,
    )?;
    result.stats.packs_scanned = inventory.packs.len();
    result.stats.packs_valid = scanned.valid_packs;
    result.stats.packs_invalid = scanned.invalid.len();
    result.stats.blobs_indexed = scanned.records.len();
    result.stats.duplicate_blobs = count_duplicates(&scanned);
    if !scanned.invalid.is_empty() {
        warn!(
            "{} pack files are incomplete or damaged and were left out of the index",
            scanned.invalid.len()
        );
    }
    result.invalid_packs = scanned.invalid;

    // CollectingStale
    enter_stage(&mut progress, shutdown, RebuildStage::CollectingStale)?;
    let stale = enumerate::collect_stale_indexes(repo)?;
    emit_progress(
        &mut progress,
        RebuildProgressEvent::StaleIndexesListed { count: stale.len() },
    );

    // Building
    enter_stage(&mut progress, shutdown, RebuildStage::Building)?;
    let shards = build_shards(scanned.records, &stale, ShardLimits::from(config));
    let encoded = encode_shards(&shards)?;
    result.shards = shards
        .iter()
        .zip(&encoded)
        .map(|(shard, bytes)| ShardSummary {
            packs: shard.packs.len(),
            blobs: shard.blob_count(),
            encoded_bytes: bytes.len(),
        })
        .collect();
    result.superseded = shards
        .first()
        .map(|s| s.supersedes.clone())
        .unwrap_or_default();
    emit_progress(
        &mut progress,
        RebuildProgressEvent::ShardsPlanned {
            shards: shards.len(),
            blobs: result.stats.blobs_indexed,
        },
    );

    if options.dry_run {
        info!(
            "dry run: would save {} index files and remove {} old ones",
            shards.len(),
            result.superseded.len()
        );
        start_stage(&mut progress, RebuildStage::Done);
        return Ok(result);
    }

    // Persisting
    enter_stage(&mut progress, shutdown, RebuildStage::Persisting)?;
    let new_indexes = persist::persist_shards(repo, &encoded, shutdown, &mut progress)?;
    info!(
        "saved new indexes as [{}]",
        new_indexes
            .iter()
            .map(IndexId::to_hex)
            .collect::<Vec<_>>()
            .join(" ")
    );
    result.new_indexes = new_indexes;

    // Retiring: the run can no longer fail.
    start_stage(&mut progress, RebuildStage::Retiring);
    result.retirement = retire::retire_indexes(
        repo,
        &result.superseded,
        &result.new_indexes,
        shutdown,
        &mut progress,
    );
    info!("removed {} old index files", result.retirement.removed.len());
    if !result.retirement.failures.is_empty() {
        warn!(
            "{} old index files could not be removed",
            result.retirement.failures.len()
        );
    }

    start_stage(&mut progress, RebuildStage::Done);
    Ok(result)
}

fn start_stage(progress: &mut Option<&mut dyn FnMut(RebuildProgressEvent)>, stage: RebuildStage) {
    emit_progress(progress, RebuildProgressEvent::StageStarted { stage });
}

/// Honor a pending shutdown request, then announce `stage`.
fn enter_stage(
    progress: &mut Option<&mut dyn FnMut(RebuildProgressEvent)>,
    shutdown: Option<&AtomicBool>,
    stage: RebuildStage,
) -> std::result::Result<(), RebuildError> {
    check_interrupted(shutdown).map_err(|_| RebuildError::Interrupted {
        stage,
        written: Vec::new(),
    })?;
    start_stage(progress, stage);
    Ok(())
}

fn encode_shards(shards: &[IndexShard]) -> std::result::Result<Vec<Vec<u8>>, RebuildError> {
    shards
        .iter()
        .map(|shard| shard.encode().map_err(RebuildError::Build))
        .collect()
}

fn count_duplicates(scanned: &coordinator::ScanOutcome) -> usize {
    let mut seen: HashMap<_, usize> = HashMap::with_capacity(scanned.records.len());
    for record in &scanned.records {
        *seen.entry(record.blob_id).or_default() += 1;
    }
    seen.values().map(|n| n - 1).sum()
}
