use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use sector_engine::*;

/// Canned engine responses, shared between a test and its engine.
#[derive(Default)]
pub struct Script {
    pub statuses: HashMap<SectorId, VecDeque<GetSealStatusResponse>>,
    pub status_queries: HashMap<SectorId, usize>,
    pub staged: Vec<EngineStagedSector>,
    pub next_sector_id: SectorId,
    pub added: Vec<(String, Vec<u8>)>,
    pub sealed_data: HashMap<String, Vec<u8>>,
    pub fail_add_piece: Option<String>,
    pub fail_seal_all: Option<String>,
    pub fail_staged_listing: Option<String>,
    pub seal_all_calls: usize,
    pub destroy_calls: usize,
}

impl Script {
    /// Queues a status response. The last queued response repeats forever.
    pub fn respond(&mut self, sector_id: SectorId, response: GetSealStatusResponse) {
        self.statuses
            .entry(sector_id)
            .or_insert_with(VecDeque::new)
            .push_back(response);
    }

    pub fn stage(&mut self, sector_id: SectorId) {
        self.staged.push(EngineStagedSector {
            sector_access: format!("staged-{}", sector_id),
            sector_id,
            pieces: vec![],
            seal_status_code: SealStatusCode::Pending.into(),
            seal_error_msg: String::new(),
        });
    }

    pub fn queries(&self, sector_id: SectorId) -> usize {
        self.status_queries.get(&sector_id).cloned().unwrap_or(0)
    }
}

#[derive(Default)]
pub struct ScriptedEngine {
    script: Arc<Mutex<Script>>,
}

impl ScriptedEngine {
    pub fn script(&self) -> Arc<Mutex<Script>> {
        Arc::clone(&self.script)
    }
}

fn caller_error(msg: Option<String>) -> (ResponseStatus, String) {
    match msg {
        Some(msg) => (ResponseStatus::CallerError, msg),
        None => (ResponseStatus::NoError, String::new()),
    }
}

impl SealingEngine for ScriptedEngine {
    fn init(_request: InitRequest) -> InitResponse<Self> {
        InitResponse {
            engine: Some(ScriptedEngine::default()),
            ..Default::default()
        }
    }

    fn max_user_bytes_per_staged_sector(&self) -> MaxUserBytesResponse {
        MaxUserBytesResponse {
            max_staged_bytes_per_sector: SectorStoreType::Test.max_user_bytes_per_sector(),
            ..Default::default()
        }
    }

    fn add_piece(&self, piece_key: &str, piece_bytes: &[u8]) -> AddPieceResponse {
        let mut script = self.script.lock().unwrap();

        let (status_code, error_msg) = caller_error(script.fail_add_piece.clone());
        if status_code == ResponseStatus::NoError {
            script
                .added
                .push((piece_key.to_string(), piece_bytes.to_vec()));
        }

        AddPieceResponse {
            status_code,
            error_msg,
            sector_id: script.next_sector_id,
        }
    }

    fn get_seal_status(&self, sector_id: SectorId) -> GetSealStatusResponse {
        let mut script = self.script.lock().unwrap();
        *script.status_queries.entry(sector_id).or_insert(0) += 1;

        match script.statuses.get_mut(&sector_id) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => GetSealStatusResponse {
                status_code: ResponseStatus::CallerError,
                error_msg: format!("no staged or sealed sector with id {} found", sector_id),
                ..Default::default()
            },
        }
    }

    fn seal_all_staged_sectors(&self) -> SealAllStagedSectorsResponse {
        let mut script = self.script.lock().unwrap();
        script.seal_all_calls += 1;

        let (status_code, error_msg) = caller_error(script.fail_seal_all.clone());
        SealAllStagedSectorsResponse {
            status_code,
            error_msg,
        }
    }

    fn get_sealed_sectors(&self) -> GetSealedSectorsResponse {
        Default::default()
    }

    fn get_staged_sectors(&self) -> GetStagedSectorsResponse {
        let script = self.script.lock().unwrap();

        match script.fail_staged_listing.clone() {
            Some(error_msg) => GetStagedSectorsResponse {
                status_code: ResponseStatus::ReceiverError,
                error_msg,
                ..Default::default()
            },
            None => GetStagedSectorsResponse {
                sectors: script.staged.clone(),
                ..Default::default()
            },
        }
    }

    fn read_piece_from_sealed_sector(&self, piece_key: &str) -> ReadPieceFromSealedSectorResponse {
        let script = self.script.lock().unwrap();

        match script.sealed_data.get(piece_key) {
            Some(data) => ReadPieceFromSealedSectorResponse {
                data: data.clone(),
                ..Default::default()
            },
            None => ReadPieceFromSealedSectorResponse {
                status_code: ResponseStatus::CallerError,
                error_msg: format!("piece with key {} not found", piece_key),
                ..Default::default()
            },
        }
    }

    fn destroy(&self) {
        self.script.lock().unwrap().destroy_calls += 1;
    }
}

pub fn pending() -> GetSealStatusResponse {
    GetSealStatusResponse {
        seal_status_code: SealStatusCode::Pending.into(),
        ..Default::default()
    }
}

pub fn sealing() -> GetSealStatusResponse {
    GetSealStatusResponse {
        seal_status_code: SealStatusCode::Sealing.into(),
        ..Default::default()
    }
}

pub fn failed(msg: &str) -> GetSealStatusResponse {
    GetSealStatusResponse {
        seal_status_code: SealStatusCode::Failed.into(),
        seal_error_msg: msg.to_string(),
        ..Default::default()
    }
}

pub fn sealed(pieces: Vec<(String, u64)>) -> GetSealStatusResponse {
    GetSealStatusResponse {
        seal_status_code: SealStatusCode::Sealed.into(),
        comm_d: [1; 32],
        comm_r: [2; 32],
        comm_r_star: [3; 32],
        proof: vec![0xab; SNARK_PROOF_BYTES],
        pieces: pieces
            .into_iter()
            .map(|(piece_key, num_bytes)| EnginePieceMetadata {
                piece_key,
                num_bytes,
            })
            .collect(),
        ..Default::default()
    }
}

pub fn unknown(code: u32) -> GetSealStatusResponse {
    GetSealStatusResponse {
        seal_status_code: code,
        ..Default::default()
    }
}
