use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use rand::{thread_rng, Rng};

use sector_engine::{LocalEngine, SectorStoreType, SNARK_PROOF_BYTES};
use sector_lifecycle::{
    MemoryContentStore, PieceInfo, SealResult, SealStatus, SectorBuilder, SectorBuilderConfig,
};

const RESULT_TIMEOUT: Duration = Duration::from_secs(30);

fn config(dir: &tempfile::TempDir) -> SectorBuilderConfig {
    let mut config = SectorBuilderConfig::with_root_dir(SectorStoreType::Test, "t0101", dir.path());
    config.seal_status_poll_interval_ms = 10;
    config
}

fn random_piece(store: &MemoryContentStore, num_bytes: usize) -> (PieceInfo, Vec<u8>) {
    let bytes: Vec<u8> = (0..num_bytes).map(|_| thread_rng().gen()).collect();
    let piece_ref = store.put(bytes.clone());

    (PieceInfo::new(piece_ref, num_bytes as u64), bytes)
}

fn expect_sealed(result: SealResult) -> sector_lifecycle::SealedSectorMetadata {
    match result {
        SealResult::Sealed(meta) => meta,
        SealResult::Failed { sector_id, message } => {
            panic!("sector {} failed to seal: {}", sector_id, message)
        }
    }
}

#[test]
fn test_piece_is_sealed_and_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(&dir);
    config.last_used_sector_id = 6;

    let store = Arc::new(MemoryContentStore::new());
    let (p1, p1_bytes) = random_piece(&store, 32);

    let builder = SectorBuilder::<LocalEngine>::init(&config, store.clone()).unwrap();
    let results = builder.seal_results();

    assert_eq!(7, builder.add_piece(&p1).unwrap());
    builder.seal_all_staged_sectors().unwrap();

    let meta = expect_sealed(results.recv_timeout(RESULT_TIMEOUT).unwrap());
    assert_eq!(7, meta.sector_id);
    assert_eq!(vec![p1], meta.pieces);
    assert_eq!(SNARK_PROOF_BYTES, meta.proof.len());
    assert_ne!(meta.comm_d, meta.comm_r);

    let sealed = builder.sealed_sectors().unwrap();
    assert_eq!(vec![meta], sealed);

    let mut read_back = Vec::new();
    builder
        .read_piece_from_sealed_sector(&p1.piece_ref)
        .unwrap()
        .read_to_end(&mut read_back)
        .unwrap();
    assert_eq!(p1_bytes, read_back);

    // delivered once; nothing else is tracked
    assert!(results.recv_timeout(Duration::from_millis(100)).is_err());
    assert!(builder.tracked_sector_ids().is_empty());

    builder.shutdown();
}

#[test]
fn test_full_sector_is_sealed_when_another_is_needed() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);
    assert_eq!(1, config.max_num_staged_sectors);

    let store = Arc::new(MemoryContentStore::new());
    let (a, _) = random_piece(&store, 600);
    let (b, _) = random_piece(&store, 600);

    let builder = SectorBuilder::<LocalEngine>::init(&config, store.clone()).unwrap();
    let results = builder.seal_results();

    assert_eq!(1016, builder.max_piece_bytes().unwrap());

    let first = builder.add_piece(&a).unwrap();
    let second = builder.add_piece(&b).unwrap();
    assert_ne!(first, second);

    // the first sector was closed to stay within the staged sector limit
    let meta = expect_sealed(results.recv_timeout(RESULT_TIMEOUT).unwrap());
    assert_eq!(first, meta.sector_id);
    assert_eq!(vec![a], meta.pieces);

    let staged = builder.staged_sectors().unwrap();
    assert_eq!(vec![second], staged.iter().map(|s| s.sector_id).collect::<Vec<_>>());
    assert_eq!(SealStatus::Pending, staged[0].seal_status);

    builder.seal_all_staged_sectors().unwrap();

    let meta = expect_sealed(results.recv_timeout(RESULT_TIMEOUT).unwrap());
    assert_eq!(second, meta.sector_id);
    assert_eq!(vec![b], meta.pieces);

    builder.shutdown();
}

#[test]
fn test_oversized_piece_is_rejected() {
    let dir = tempfile::tempdir().unwrap();

    let store = Arc::new(MemoryContentStore::new());
    let (too_big, _) = random_piece(&store, 1017);

    let builder = SectorBuilder::<LocalEngine>::init(&config(&dir), store.clone()).unwrap();

    match builder.add_piece(&too_big) {
        Err(sector_lifecycle::Error::PieceWrite(_)) => (),
        other => panic!("expected write error, got {:?}", other),
    }

    assert!(builder.staged_sectors().unwrap().is_empty());

    builder.shutdown();
}

#[test]
fn test_staged_sectors_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);

    let store = Arc::new(MemoryContentStore::new());
    let (p1, _) = random_piece(&store, 100);

    let sector_id = {
        let builder = SectorBuilder::<LocalEngine>::init(&config, store.clone()).unwrap();
        let sector_id = builder.add_piece(&p1).unwrap();
        builder.shutdown();
        sector_id
    };

    let builder = SectorBuilder::<LocalEngine>::init(&config, store.clone()).unwrap();
    let results = builder.seal_results();

    assert_eq!(vec![sector_id], builder.tracked_sector_ids());

    let staged = builder.staged_sectors().unwrap();
    assert_eq!(1, staged.len());
    assert_eq!(vec![p1], staged[0].pieces);

    builder.seal_all_staged_sectors().unwrap();

    let meta = expect_sealed(results.recv_timeout(RESULT_TIMEOUT).unwrap());
    assert_eq!(sector_id, meta.sector_id);

    builder.shutdown();
}

#[test]
fn test_invalid_config_is_rejected_before_engine_starts() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(&dir);
    config.operator_address = String::new();

    let store = Arc::new(MemoryContentStore::new());

    match SectorBuilder::<LocalEngine>::init(&config, store) {
        Err(sector_lifecycle::Error::InvalidConfig(_)) => (),
        Err(other) => panic!("expected invalid config, got {:?}", other),
        Ok(_) => panic!("expected invalid config"),
    }

    assert!(!config.metadata_dir.exists());
}
