use std::sync::atomic::AtomicBool;

use tracing::debug;

use vger_types::pack_id::PackId;

use crate::commands::util::is_interrupted;
use crate::index::BlobRecord;
use crate::repo::Repository;

use super::scan::{scan_pack, InvalidPack, PackScan};
use super::{emit_progress, RebuildError, RebuildProgressEvent, RebuildStage};

/// Aggregated results of scanning every pack.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub records: Vec<BlobRecord>,
    /// Sorted by pack id.
    pub invalid: Vec<InvalidPack>,
    pub valid_packs: usize,
}

/// Scan all `packs` on a bounded pool of worker threads.
///
/// feeder → bounded work channel → N workers → bounded result channel →
/// this thread, which alone touches the aggregated state and the progress
/// callback. After the shutdown flag is raised no new scan starts; scans in
/// flight finish and the partial results are discarded. A flag raised after
/// the last result arrived still reports the scan as interrupted.
pub fn scan_all(
    repo: &Repository,
    packs: &[(PackId, u64)],
    workers: usize,
    shutdown: Option<&AtomicBool>,
    progress: &mut Option<&mut dyn FnMut(RebuildProgressEvent)>,
) -> std::result::Result<ScanOutcome, RebuildError> {
    let total = packs.len();
    let mut outcome = ScanOutcome::default();
    if total == 0 {
        return Ok(outcome);
    }

    let num_workers = workers.clamp(1, total);
    let work_cap = num_workers * 2;
    let result_cap = num_workers * 2;
    debug!(packs = total, workers = num_workers, "scanning packs");

    let mut completed = 0usize;
    std::thread::scope(|s| {
        let (work_tx, work_rx) = crossbeam_channel::bounded::<(PackId, u64)>(work_cap);
        let (result_tx, result_rx) =
            crossbeam_channel::bounded::<(PackId, u64, PackScan)>(result_cap);

        s.spawn(move || {
            for &(pack_id, size) in packs {
                if is_interrupted(shutdown) {
                    break;
                }
                if work_tx.send((pack_id, size)).is_err() {
                    return; // Workers gone.
                }
            }
            // work_tx drops here; workers drain the channel and exit.
        });

        for _ in 0..num_workers {
            let rx = work_rx.clone();
            let tx = result_tx.clone();
            s.spawn(move || {
                for (pack_id, size) in rx {
                    if is_interrupted(shutdown) {
                        return;
                    }
                    let scan = scan_pack(repo, &pack_id, size);
                    if tx.send((pack_id, size, scan)).is_err() {
                        return; // Collector gone.
                    }
                }
            });
        }
        // Channels now close only when every clone is dropped.
        drop(work_rx);
        drop(result_tx);

        for (pack_id, size, scan) in &result_rx {
            completed += 1;
            match scan {
                PackScan::Valid(records) => {
                    outcome.valid_packs += 1;
                    outcome.records.extend(records);
                }
                PackScan::Invalid(defect) => {
                    debug!("skipped incomplete pack file: {pack_id}: {defect}");
                    outcome.invalid.push(InvalidPack {
                        pack_id,
                        size,
                        defect,
                    });
                }
            }
            emit_progress(
                progress,
                RebuildProgressEvent::PackScanned { completed, total },
            );
        }
    });

    if is_interrupted(shutdown) {
        debug!(completed, total, "pack scan interrupted");
        return Err(RebuildError::Interrupted {
            stage: RebuildStage::Scanning,
            written: Vec::new(),
        });
    }

    outcome.invalid.sort_by_key(|p| p.pack_id);
    Ok(outcome)
}
