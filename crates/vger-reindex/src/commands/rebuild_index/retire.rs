use std::collections::HashSet;
use std::sync::atomic::AtomicBool;

use tracing::{debug, warn};

use vger_types::index_id::IndexId;

use crate::commands::util::is_interrupted;
use crate::repo::Repository;

use super::{emit_progress, RebuildProgressEvent};

/// Reason recorded for deletions skipped after a shutdown request.
pub const INTERRUPTED_REASON: &str = "interrupted";

/// An old index object that could not be removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetirementFailure {
    pub index_id: IndexId,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetirementReport {
    pub removed: Vec<IndexId>,
    pub failures: Vec<RetirementFailure>,
}

/// Delete superseded index objects one by one.
///
/// Only called after every new shard is stored. Failures are collected and
/// never abort the loop; ids present in `keep` are never deleted.
pub fn retire_indexes(
    repo: &Repository,
    stale: &[IndexId],
    keep: &[IndexId],
    shutdown: Option<&AtomicBool>,
    progress: &mut Option<&mut dyn FnMut(RebuildProgressEvent)>,
) -> RetirementReport {
    let keep: HashSet<&IndexId> = keep.iter().collect();
    let mut report = RetirementReport::default();

    for index_id in stale {
        if keep.contains(index_id) {
            continue;
        }
        if is_interrupted(shutdown) {
            report.failures.push(RetirementFailure {
                index_id: *index_id,
                reason: INTERRUPTED_REASON.to_string(),
            });
            continue;
        }
        match repo.remove_index(index_id) {
            Ok(()) => {
                debug!(index = %index_id, "old index removed");
                report.removed.push(*index_id);
                emit_progress(
                    progress,
                    RebuildProgressEvent::IndexRemoved {
                        index_id: *index_id,
                    },
                );
            }
            Err(e) => {
                warn!("unable to remove old index {index_id}: {e}");
                let reason = e.to_string();
                emit_progress(
                    progress,
                    RebuildProgressEvent::IndexRemovalFailed {
                        index_id: *index_id,
                        reason: reason.clone(),
                    },
                );
                report.failures.push(RetirementFailure {
                    index_id: *index_id,
                    reason,
                });
            }
        }
    }
    report
}
