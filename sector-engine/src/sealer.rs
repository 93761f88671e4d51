use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::api::SectorId;
use crate::constants::{COMMITMENT_BYTES, SNARK_PROOF_BYTES};
use crate::error::{err_unrecov, Result};
use crate::scheduler::Request;

const FATAL_NOLOCK: &str = "error acquiring task lock";

pub struct SealerWorker {
    pub id: usize,
    pub thread: Option<thread::JoinHandle<()>>,
}

pub struct SealTaskPrototype {
    pub(crate) sealed_sector_access: String,
    pub(crate) sealed_sector_path: PathBuf,
    pub(crate) sector_id: SectorId,
    pub(crate) staged_sector_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SealOutput {
    pub comm_d: [u8; 32],
    pub comm_r: [u8; 32],
    pub comm_r_star: [u8; 32],
    pub proof: Vec<u8>,
}

#[derive(Debug)]
pub struct SealResult {
    pub sector_id: SectorId,
    pub sealed_sector_access: String,
    pub result: Result<SealOutput>,
}

pub enum SealerInput {
    Seal {
        sealed_sector_access: String,
        sealed_sector_path: PathBuf,
        sector_id: SectorId,
        staged_sector_path: PathBuf,
        done_tx: mpsc::SyncSender<Request>,
    },
    Shutdown,
}

impl SealerInput {
    pub fn from_seal_proto(
        proto: SealTaskPrototype,
        done_tx: mpsc::SyncSender<Request>,
    ) -> SealerInput {
        let SealTaskPrototype {
            sealed_sector_access,
            sealed_sector_path,
            sector_id,
            staged_sector_path,
        } = proto;

        SealerInput::Seal {
            sealed_sector_access,
            sealed_sector_path,
            sector_id,
            staged_sector_path,
            done_tx,
        }
    }
}

impl SealerWorker {
    pub fn start(
        id: usize,
        seal_task_rx: Arc<Mutex<mpsc::Receiver<SealerInput>>>,
        prover_id: [u8; 31],
    ) -> SealerWorker {
        let thread = thread::spawn(move || loop {
            // the lock is held only while waiting for the next task
            let task = {
                let rx = seal_task_rx.lock().expect(FATAL_NOLOCK);
                match rx.recv() {
                    Ok(task) => task,
                    // every sender is gone; nobody can hand us work anymore
                    Err(_) => break,
                }
            };

            match task {
                SealerInput::Seal {
                    sealed_sector_access,
                    sealed_sector_path,
                    sector_id,
                    staged_sector_path,
                    done_tx,
                } => {
                    debug!("sealer {}: sealing sector {}", id, sector_id);

                    let result = seal(
                        &prover_id,
                        sector_id,
                        &staged_sector_path,
                        &sealed_sector_path,
                    );

                    let sent = done_tx.send(Request::HandleSealResult(SealResult {
                        sector_id,
                        sealed_sector_access,
                        result,
                    }));

                    if sent.is_err() {
                        warn!(
                            "sealer {}: discarding seal result for sector {}; scheduler has shut down",
                            id, sector_id
                        );
                    }
                }
                SealerInput::Shutdown => break,
            }
        });

        SealerWorker {
            id,
            thread: Some(thread),
        }
    }
}

/// Replicates the staged sector into `sealed_sector_path` and derives its
/// commitments and proof.
///
/// The commitments are BLAKE2b-256 digests over domain-tagged inputs. They bind
/// the replica to the prover and sector, but are not a proof-of-replication.
pub fn seal(
    prover_id: &[u8; 31],
    sector_id: SectorId,
    staged_sector_path: &Path,
    sealed_sector_path: &Path,
) -> Result<SealOutput> {
    let data = fs::read(staged_sector_path)?;

    if data.is_empty() {
        return Err(err_unrecov(format!(
            "staged sector {} contains no pieces",
            sector_id
        )));
    }

    let mut sector_id_bytes = Vec::with_capacity(8);
    sector_id_bytes.write_u64::<LittleEndian>(sector_id)?;

    let comm_d = digest(b"comm_d", &[&data[..]]);
    let comm_r = digest(b"comm_r", &[&prover_id[..], &sector_id_bytes[..], &comm_d[..]]);
    let comm_r_star = digest(b"comm_r_star", &[&comm_r[..], &comm_d[..]]);

    let mut proof = Vec::with_capacity(SNARK_PROOF_BYTES);
    for partition in 0..(SNARK_PROOF_BYTES / COMMITMENT_BYTES) as u8 {
        proof.extend_from_slice(&digest(b"proof", &[&comm_r_star[..], &[partition][..]]));
    }

    fs::write(sealed_sector_path, &data)?;

    Ok(SealOutput {
        comm_d,
        comm_r,
        comm_r_star,
        proof,
    })
}

fn digest(tag: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut state = blake2b_simd::Params::new()
        .hash_length(COMMITMENT_BYTES)
        .to_state();

    state.update(tag);
    for part in parts {
        state.update(part);
    }

    let mut out = [0u8; 32];
    out.copy_from_slice(state.finalize().as_bytes());
    out
}
