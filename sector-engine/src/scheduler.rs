use std::sync::mpsc;
use std::thread;

use crate::api::SectorId;
use crate::error::Result;
use crate::metadata::{SealedSectorMetadata, SectorStatus, StagedSectorMetadata};
use crate::metadata_manager::SectorMetadataManager;
use crate::sealer::{SealResult, SealTaskPrototype, SealerInput};

pub struct Scheduler {
    pub thread: Option<thread::JoinHandle<()>>,
}

#[derive(Debug)]
pub enum Request {
    AddPiece(String, Vec<u8>, mpsc::SyncSender<Result<SectorId>>),
    GetSealStatus(SectorId, mpsc::SyncSender<Result<SectorStatus>>),
    GetSealedSectors(mpsc::SyncSender<Result<Vec<SealedSectorMetadata>>>),
    GetStagedSectors(mpsc::SyncSender<Result<Vec<StagedSectorMetadata>>>),
    RetrievePiece(String, mpsc::SyncSender<Result<Vec<u8>>>),
    SealAllStagedSectors(mpsc::SyncSender<Result<()>>),
    HandleSealResult(SealResult),
    Shutdown,
}

impl Scheduler {
    pub fn start(
        scheduler_tx: mpsc::SyncSender<Request>,
        scheduler_rx: mpsc::Receiver<Request>,
        worker_tx: mpsc::Sender<SealerInput>,
        num_workers: usize,
        mut m: SectorMetadataManager,
    ) -> Scheduler {
        let thread = thread::spawn(move || {
            let dispatch = |protos: Vec<SealTaskPrototype>| {
                for proto in protos {
                    let sector_id = proto.sector_id;

                    if worker_tx
                        .send(SealerInput::from_seal_proto(proto, scheduler_tx.clone()))
                        .is_err()
                    {
                        error!("could not dispatch sector {} to a sealer", sector_id);
                    }
                }
            };

            // Sectors which were sealing when we last shut down start over.
            dispatch(m.create_resume_seal_task_protos());

            loop {
                let task = match scheduler_rx.recv() {
                    Ok(task) => task,
                    Err(_) => break,
                };

                // Dispatch to the appropriate task-handler. A caller which
                // has gone away before reading its reply is not our concern,
                // so failed replies are ignored.
                match task {
                    Request::AddPiece(key, bytes, tx) => {
                        let result = m.add_piece(key, &bytes).map(|(sector_id, protos)| {
                            dispatch(protos);
                            sector_id
                        });

                        let _ = tx.send(result);
                    }
                    Request::GetSealStatus(sector_id, tx) => {
                        let _ = tx.send(m.get_seal_status(sector_id));
                    }
                    Request::GetSealedSectors(tx) => {
                        let _ = tx.send(Ok(m.get_sealed_sectors()));
                    }
                    Request::GetStagedSectors(tx) => {
                        let _ = tx.send(Ok(m.get_staged_sectors()));
                    }
                    Request::RetrievePiece(piece_key, tx) => {
                        let _ = tx.send(m.read_piece_from_sealed_sector(&piece_key));
                    }
                    Request::SealAllStagedSectors(tx) => {
                        let result = m.seal_all_staged_sectors().map(|protos| {
                            info!("scheduling {} staged sector(s) for sealing", protos.len());
                            dispatch(protos);
                        });

                        let _ = tx.send(result);
                    }
                    Request::HandleSealResult(result) => {
                        if let Err(err) = m.handle_seal_result(result) {
                            error!("could not record seal result: {}", err);
                        }
                    }
                    Request::Shutdown => {
                        for _ in 0..num_workers {
                            let _ = worker_tx.send(SealerInput::Shutdown);
                        }
                        break;
                    }
                }
            }
        });

        Scheduler {
            thread: Some(thread),
        }
    }
}
