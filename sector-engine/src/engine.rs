use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use crate::api::*;
use crate::error::{err_code_and_msg, err_unrecov, Result};
use crate::metadata::{SectorStatus, StagedSectorMetadata};
use crate::metadata_manager::SectorMetadataManager;
use crate::scheduler::{Request, Scheduler};
use crate::sealer::{SealerInput, SealerWorker};
use crate::store::SectorStore;
use crate::NUM_SEAL_WORKERS;

const FATAL_NOLOCK: &str = "error acquiring engine lock";
const SCHEDULER_QUEUE_DEPTH: usize = 100;

/// An in-process sealing engine. A scheduler thread owns all sector metadata
/// and a pool of sealer threads performs the sealing.
pub struct LocalEngine {
    destroyed: AtomicBool,
    store_type: SectorStoreType,
    scheduler_tx: mpsc::SyncSender<Request>,
    scheduler: Mutex<Scheduler>,
    sealers: Mutex<Vec<SealerWorker>>,
}

impl LocalEngine {
    pub fn init_from_metadata(request: InitRequest, num_seal_workers: usize) -> Result<LocalEngine> {
        let InitRequest {
            store_type,
            last_used_sector_id,
            metadata_dir,
            prover_id,
            sealed_sector_dir,
            staged_sector_dir,
            max_num_staged_sectors,
        } = request;

        if max_num_staged_sectors == 0 {
            return Err(err_unrecov("max_num_staged_sectors must be at least 1"));
        }

        fs::create_dir_all(&metadata_dir)?;

        let store = SectorStore::new(store_type, staged_sector_dir, sealed_sector_dir)?;

        let m = SectorMetadataManager::initialize(
            store,
            metadata_dir,
            prover_id,
            last_used_sector_id,
            max_num_staged_sectors,
        )?;

        let (scheduler_tx, scheduler_rx) = mpsc::sync_channel(SCHEDULER_QUEUE_DEPTH);
        let (worker_tx, worker_rx) = mpsc::channel();
        let worker_rx = Arc::new(Mutex::new(worker_rx));

        let num_seal_workers = num_seal_workers.max(1);

        let sealers: Vec<SealerWorker> = (0..num_seal_workers)
            .map(|n| SealerWorker::start(n, worker_rx.clone(), prover_id))
            .collect();

        let scheduler = Scheduler::start(
            scheduler_tx.clone(),
            scheduler_rx,
            worker_tx,
            num_seal_workers,
            m,
        );

        Ok(LocalEngine {
            destroyed: AtomicBool::new(false),
            store_type,
            scheduler_tx,
            scheduler: Mutex::new(scheduler),
            sealers: Mutex::new(sealers),
        })
    }

    // Run a task, blocking on the return channel.
    fn run_blocking<T, F: FnOnce(mpsc::SyncSender<Result<T>>) -> Request>(
        &self,
        with_sender: F,
    ) -> Result<T> {
        let (tx, rx) = mpsc::sync_channel(1);

        self.scheduler_tx
            .send(with_sender(tx))
            .map_err(|_| err_unrecov("engine has been destroyed"))?;

        rx.recv()
            .map_err(|_| err_unrecov("engine dropped the request"))?
    }

    fn shutdown(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        // Shut down main worker and sealers, too.
        if self.scheduler_tx.send(Request::Shutdown).is_err() {
            warn!("err sending Shutdown to scheduler");
        }

        // Wait for worker threads to return.
        let scheduler_thread = self.scheduler.lock().expect(FATAL_NOLOCK).thread.take();
        if let Some(thread) = scheduler_thread {
            if thread.join().is_err() {
                error!("scheduler thread panicked");
            }
        }

        for worker in self.sealers.lock().expect(FATAL_NOLOCK).iter_mut() {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    error!("sealer {} panicked", worker.id);
                }
            }
        }
    }
}

impl Drop for LocalEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn staged_into_response(meta: StagedSectorMetadata) -> EngineStagedSector {
    let status_code = SealStatusCode::from(&meta.seal_status);

    let seal_error_msg = match meta.seal_status {
        crate::metadata::SealStatus::Failed(ref err) => err.clone(),
        _ => String::new(),
    };

    EngineStagedSector {
        sector_access: meta.sector_access,
        sector_id: meta.sector_id,
        pieces: meta.pieces.into_iter().map(Into::into).collect(),
        seal_status_code: status_code.into(),
        seal_error_msg,
    }
}

impl SealingEngine for LocalEngine {
    fn init(request: InitRequest) -> InitResponse<Self> {
        let mut response = InitResponse::default();

        match LocalEngine::init_from_metadata(request, NUM_SEAL_WORKERS) {
            Ok(engine) => {
                response.status_code = ResponseStatus::NoError;
                response.engine = Some(engine);
            }
            Err(err) => {
                let (code, msg) = err_code_and_msg(&err);
                response.status_code = code;
                response.error_msg = msg;
            }
        }

        response
    }

    fn max_user_bytes_per_staged_sector(&self) -> MaxUserBytesResponse {
        let mut response = MaxUserBytesResponse::default();
        response.max_staged_bytes_per_sector = self.store_type.max_user_bytes_per_sector();
        response
    }

    fn add_piece(&self, piece_key: &str, piece_bytes: &[u8]) -> AddPieceResponse {
        info!("add_piece: {}", "start");

        let mut response = AddPieceResponse::default();

        let key = piece_key.to_string();
        let bytes = piece_bytes.to_vec();

        match self.run_blocking(|tx| Request::AddPiece(key, bytes, tx)) {
            Ok(sector_id) => {
                response.status_code = ResponseStatus::NoError;
                response.sector_id = sector_id;
            }
            Err(err) => {
                let (code, msg) = err_code_and_msg(&err);
                response.status_code = code;
                response.error_msg = msg;
            }
        }

        info!("add_piece: {}", "finish");

        response
    }

    fn get_seal_status(&self, sector_id: SectorId) -> GetSealStatusResponse {
        let mut response = GetSealStatusResponse::default();

        match self.run_blocking(|tx| Request::GetSealStatus(sector_id, tx)) {
            Ok(status) => {
                response.status_code = ResponseStatus::NoError;

                match status {
                    SectorStatus::Pending => {
                        response.seal_status_code = SealStatusCode::Pending.into();
                    }
                    SectorStatus::Sealing => {
                        response.seal_status_code = SealStatusCode::Sealing.into();
                    }
                    SectorStatus::Failed(err) => {
                        response.seal_status_code = SealStatusCode::Failed.into();
                        response.seal_error_msg = err;
                    }
                    SectorStatus::Sealed(meta) => {
                        let meta = *meta;

                        response.seal_status_code = SealStatusCode::Sealed.into();
                        response.comm_d = meta.comm_d;
                        response.comm_r = meta.comm_r;
                        response.comm_r_star = meta.comm_r_star;
                        response.proof = meta.proof;
                        response.pieces = meta.pieces.into_iter().map(Into::into).collect();
                    }
                }
            }
            Err(err) => {
                let (code, msg) = err_code_and_msg(&err);
                response.status_code = code;
                response.error_msg = msg;
            }
        }

        response
    }

    fn seal_all_staged_sectors(&self) -> SealAllStagedSectorsResponse {
        info!("seal_all_staged_sectors: {}", "start");

        let mut response = SealAllStagedSectorsResponse::default();

        if let Err(err) = self.run_blocking(Request::SealAllStagedSectors) {
            let (code, msg) = err_code_and_msg(&err);
            response.status_code = code;
            response.error_msg = msg;
        }

        info!("seal_all_staged_sectors: {}", "finish");

        response
    }

    fn get_sealed_sectors(&self) -> GetSealedSectorsResponse {
        let mut response = GetSealedSectorsResponse::default();

        match self.run_blocking(Request::GetSealedSectors) {
            Ok(sectors) => {
                response.status_code = ResponseStatus::NoError;
                response.sectors = sectors.into_iter().map(Into::into).collect();
            }
            Err(err) => {
                let (code, msg) = err_code_and_msg(&err);
                response.status_code = code;
                response.error_msg = msg;
            }
        }

        response
    }

    fn get_staged_sectors(&self) -> GetStagedSectorsResponse {
        let mut response = GetStagedSectorsResponse::default();

        match self.run_blocking(Request::GetStagedSectors) {
            Ok(sectors) => {
                response.status_code = ResponseStatus::NoError;
                response.sectors = sectors.into_iter().map(staged_into_response).collect();
            }
            Err(err) => {
                let (code, msg) = err_code_and_msg(&err);
                response.status_code = code;
                response.error_msg = msg;
            }
        }

        response
    }

    fn read_piece_from_sealed_sector(&self, piece_key: &str) -> ReadPieceFromSealedSectorResponse {
        info!("read_piece_from_sealed_sector: {}", "start");

        let mut response = ReadPieceFromSealedSectorResponse::default();

        let key = piece_key.to_string();

        match self.run_blocking(|tx| Request::RetrievePiece(key, tx)) {
            Ok(piece_bytes) => {
                response.status_code = ResponseStatus::NoError;
                response.data = piece_bytes;
            }
            Err(err) => {
                let (code, msg) = err_code_and_msg(&err);
                response.status_code = code;
                response.error_msg = msg;
            }
        }

        info!("read_piece_from_sealed_sector: {}", "finish");

        response
    }

    fn destroy(&self) {
        self.shutdown();
    }
}
