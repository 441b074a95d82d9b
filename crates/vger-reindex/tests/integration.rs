use std::sync::atomic::AtomicBool;

use vger_crypto::key::MasterKey;
use vger_crypto::CryptoEngine;
use vger_reindex::commands::rebuild_index::{run, PackDefect, RebuildOptions, RebuildProgressEvent};
use vger_reindex::config::ReindexConfig;
use vger_reindex::index::IndexShard;
use vger_reindex::repo::format::{pack_object, ObjectType};
use vger_reindex::repo::pack::{PackHeaderEntry, PACK_MAGIC, PACK_VERSION};
use vger_reindex::repo::{EncryptionMode, Repository};
use vger_storage::{LocalBackend, StorageBackend};
use vger_types::blob_id::BlobId;
use vger_types::pack_id::PackId;

/// Write a pack holding `blobs` (kind tag, bytes) and return its id and size.
fn write_pack(repo: &Repository, blobs: &[(u8, &[u8])]) -> (PackId, Vec<u8>) {
    let mut bytes = PACK_MAGIC.to_vec();
    bytes.push(PACK_VERSION);
    let mut entries = Vec::new();
    for &(obj_type, data) in blobs {
        bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
        entries.push(PackHeaderEntry {
            obj_type,
            blob_id: BlobId::compute(&[7u8; 32], data),
            offset: bytes.len() as u64,
            length: data.len() as u32,
            uncompressed_size: data.len() as u32,
        });
        bytes.extend_from_slice(data);
    }
    let header = rmp_serde::to_vec(&entries).unwrap();
    let trailer = pack_object(ObjectType::PackHeader, &header, repo.crypto.as_ref()).unwrap();
    bytes.extend_from_slice(&trailer);
    bytes.extend_from_slice(&(trailer.len() as u32).to_le_bytes());

    let pack_id = PackId::compute(&bytes);
    repo.storage.put(&pack_id.storage_key(), &bytes).unwrap();
    (pack_id, bytes)
}

fn init_local(dir: &std::path::Path, key: Option<&MasterKey>) -> Repository {
    let backend = LocalBackend::new(dir.to_str().unwrap()).unwrap();
    let mode = if key.is_some() {
        EncryptionMode::Aes256Gcm
    } else {
        EncryptionMode::None
    };
    Repository::init(Box::new(backend), mode, key).unwrap()
}

fn reopen(dir: &std::path::Path, key: Option<&MasterKey>) -> Repository {
    let backend = LocalBackend::new(dir.to_str().unwrap()).unwrap();
    Repository::open(Box::new(backend), key).unwrap()
}

fn indexed_blob_count(repo: &Repository) -> usize {
    repo.list_index_ids()
        .unwrap()
        .iter()
        .map(|id| {
            IndexShard::decode(&repo.load_index(id).unwrap())
                .unwrap()
                .blob_count()
        })
        .sum()
}

#[test]
fn rebuild_local_repository_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let repo = init_local(dir.path(), None);
    write_pack(&repo, &[(0, b"file chunk one"), (1, b"tree")]);
    write_pack(&repo, &[(0, b"file chunk two")]);
    let (partial_id, partial) = write_pack(&repo, &[(0, b"interrupted upload")]);
    // Simulate an upload that stopped half way.
    let partial_path = dir.path().join(partial_id.storage_key());
    std::fs::write(&partial_path, &partial[..partial.len() / 2]).unwrap();
    // Leftover temp files from atomic writes are not packs.
    std::fs::write(
        partial_path.with_file_name(".tmp-upload"),
        b"garbage",
    )
    .unwrap();

    let config = ReindexConfig::for_url(dir.path().to_str().unwrap());
    let result = run(&config, &RebuildOptions::default(), None, None).unwrap();

    assert_eq!(result.stats.packs_listed, 3);
    assert_eq!(result.invalid_packs.len(), 1);
    assert_eq!(result.invalid_packs[0].pack_id, partial_id);
    assert_eq!(result.new_indexes.len(), 1);

    let repo = reopen(dir.path(), None);
    assert_eq!(repo.list_index_ids().unwrap(), result.new_indexes);
    assert_eq!(indexed_blob_count(&repo), 3);
    assert!(repo.storage.list("locks/").unwrap().is_empty());
}

#[test]
fn rebuild_encrypted_repository_with_key_file() {
    let dir = tempfile::tempdir().unwrap();
    let repo_dir = dir.path().join("repo");
    std::fs::create_dir(&repo_dir).unwrap();
    let key = MasterKey::generate();
    let key_path = dir.path().join("repo.key");
    std::fs::write(&key_path, key.to_hex().as_bytes()).unwrap();

    let repo = init_local(&repo_dir, Some(&key));
    assert!(repo.crypto.is_encrypting());
    write_pack(&repo, &[(0, b"private"), (0, b"data"), (1, b"listing")]);
    let (tampered_id, mut tampered) = write_pack(&repo, &[(0, b"forged")]);
    let at = tampered.len() - 8;
    tampered[at] ^= 0xFF;
    repo.storage
        .put(&tampered_id.storage_key(), &tampered)
        .unwrap();

    let mut config = ReindexConfig::for_url(format!("file://{}", repo_dir.display()));
    config.encryption.key_file = Some(key_path.to_string_lossy().into_owned());
    let mut scanned = 0;
    let mut on_event = |e: RebuildProgressEvent| {
        if let RebuildProgressEvent::PackScanned { .. } = e {
            scanned += 1;
        }
    };
    let shutdown = AtomicBool::new(false);
    let result = run(
        &config,
        &RebuildOptions::default(),
        Some(&shutdown),
        Some(&mut on_event),
    )
    .unwrap();

    assert_eq!(scanned, 2);
    assert_eq!(result.invalid_packs.len(), 1);
    assert_eq!(result.invalid_packs[0].defect, PackDefect::Unauthenticated);

    let repo = reopen(&repo_dir, Some(&key));
    assert_eq!(indexed_blob_count(&repo), 3);
}

#[test]
fn encrypted_repository_without_key_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let key = MasterKey::generate();
    init_local(dir.path(), Some(&key));

    let config = ReindexConfig::for_url(dir.path().to_str().unwrap());
    let err = run(&config, &RebuildOptions::default(), None, None).unwrap_err();
    assert_eq!(err.stage(), None);
    assert!(err.to_string().contains("key"), "{err}");
}

#[test]
fn missing_repository_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = ReindexConfig::for_url(dir.path().to_str().unwrap());
    let err = run(&config, &RebuildOptions::default(), None, None).unwrap_err();
    assert!(err.to_string().contains("not found"), "{err}");
}

#[test]
fn dry_run_leaves_local_repository_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let repo = init_local(dir.path(), None);
    write_pack(&repo, &[(0, b"a"), (0, b"b")]);

    let config = ReindexConfig::for_url(dir.path().to_str().unwrap());
    let options = RebuildOptions {
        dry_run: true,
        ..RebuildOptions::default()
    };
    let result = run(&config, &options, None, None).unwrap();

    assert!(result.dry_run);
    assert_eq!(result.shards.len(), 1);
    assert_eq!(result.shards[0].blobs, 2);
    assert!(reopen(dir.path(), None).list_index_ids().unwrap().is_empty());
}
