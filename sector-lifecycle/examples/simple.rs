use std::collections::BTreeSet;
use std::env;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use rand::{thread_rng, Rng};

use sector_engine::{LocalEngine, SectorStoreType};
use sector_lifecycle::{DirContentStore, PieceInfo, SealResult, SectorBuilder, SectorBuilderConfig};

const NUM_PIECES: usize = 3;

fn main() -> Result<(), Box<dyn Error>> {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    let _ = pretty_env_logger::try_init_timed();

    let dir = tempfile::tempdir()?;

    // pass a JSON config path to run against real directories
    let config = match env::args().nth(1) {
        Some(path) => SectorBuilderConfig::from_json_file(path)?,
        None => {
            let mut config =
                SectorBuilderConfig::with_root_dir(SectorStoreType::Test, "t0101", dir.path());
            config.seal_status_poll_interval_ms = 100;
            config
        }
    };

    let store = Arc::new(DirContentStore::new(dir.path().join("pieces"))?);
    let builder = SectorBuilder::<LocalEngine>::init(&config, store.clone())?;
    let results = builder.seal_results();

    let max = builder.max_piece_bytes()?;
    println!("each staged sector holds {} user bytes", max);

    let mut sector_ids = BTreeSet::new();
    for _ in 0..NUM_PIECES {
        let num_bytes = thread_rng().gen_range(1, max as usize / 2);
        let bytes: Vec<u8> = (0..num_bytes).map(|_| thread_rng().gen()).collect();
        let piece = PieceInfo::new(store.put(&bytes)?, num_bytes as u64);

        let sector_id = builder.add_piece(&piece)?;
        println!("added {} byte piece {} to sector {}", num_bytes, piece.piece_ref, sector_id);

        sector_ids.insert(sector_id);
    }

    builder.seal_all_staged_sectors()?;

    for _ in 0..sector_ids.len() {
        match results.recv_timeout(Duration::from_secs(60))? {
            SealResult::Sealed(meta) => println!(
                "sealed sector {} holding {} piece(s)",
                meta.sector_id,
                meta.pieces.len()
            ),
            SealResult::Failed { sector_id, message } => {
                println!("sector {} failed to seal: {}", sector_id, message)
            }
        }
    }

    for sector in builder.sealed_sectors()? {
        println!("sector {} comm_r: {:02x?}", sector.sector_id, &sector.comm_r[..4]);
    }

    builder.shutdown();

    Ok(())
}
