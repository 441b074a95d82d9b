use std::sync::atomic::AtomicBool;

use tracing::{debug, warn};

use vger_types::index_id::IndexId;

use crate::commands::util::is_interrupted;
use crate::repo::Repository;

use super::{emit_progress, RebuildError, RebuildProgressEvent, RebuildStage};

/// Store encoded shards in order and return their ids.
///
/// Stops at the first failed write; shards already stored stay where they
/// are and are reported in the error. The shutdown flag is honored only
/// between shards, and an interrupt reports the stored shards the same way.
pub fn persist_shards(
    repo: &Repository,
    encoded: &[Vec<u8>],
    shutdown: Option<&AtomicBool>,
    progress: &mut Option<&mut dyn FnMut(RebuildProgressEvent)>,
) -> std::result::Result<Vec<IndexId>, RebuildError> {
    let total = encoded.len();
    let mut written = Vec::with_capacity(total);

    for (i, plaintext) in encoded.iter().enumerate() {
        let shard = i + 1;
        if is_interrupted(shutdown) {
            if !written.is_empty() {
                warn!(
                    "rebuild interrupted after saving {} of {total} index files; they are left in place",
                    written.len()
                );
            }
            return Err(RebuildError::Interrupted {
                stage: RebuildStage::Persisting,
                written,
            });
        }

        let index_id = match repo.save_index(plaintext) {
            Ok(id) => id,
            Err(source) => {
                return Err(RebuildError::Persist {
                    shard,
                    total,
                    written,
                    source,
                });
            }
        };
        debug!(shard, total, index = %index_id, "index shard saved");
        written.push(index_id);
        emit_progress(
            progress,
            RebuildProgressEvent::ShardSaved {
                shard,
                total,
                index_id,
            },
        );
    }
    Ok(written)
}
