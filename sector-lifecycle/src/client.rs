use std::convert::TryFrom;
use std::sync::Arc;

use cid::Cid;

use sector_engine::{
    CodeAndMessage, EnginePieceMetadata, EngineSealedSector, GetSealStatusResponse, InitRequest,
    ResponseStatus, SealStatusCode, SealingEngine, SectorId, SNARK_PROOF_BYTES,
};

use crate::error::{Error, Result};
use crate::metadata::{SealStatus, SealedSectorMetadata, StagedSectorMetadata};
use crate::piece::PieceInfo;

/// Typed access to a sealing engine. Cloning shares the underlying engine.
pub struct EngineClient<E: SealingEngine> {
    engine: Arc<E>,
}

impl<E: SealingEngine> Clone for EngineClient<E> {
    fn clone(&self) -> Self {
        EngineClient {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<E: SealingEngine> EngineClient<E> {
    pub fn init(request: InitRequest) -> Result<EngineClient<E>> {
        let mut response = E::init(request);

        if response.status_code() != ResponseStatus::NoError {
            return Err(Error::EngineInit(response.error_msg().to_string()));
        }

        match response.engine.take() {
            Some(engine) => Ok(EngineClient::from_engine(engine)),
            None => Err(Error::EngineInit(
                "engine reported success but returned no engine".to_string(),
            )),
        }
    }

    pub fn from_engine(engine: E) -> EngineClient<E> {
        EngineClient {
            engine: Arc::new(engine),
        }
    }

    pub fn max_user_bytes_per_staged_sector(&self) -> Result<u64> {
        let response = self.engine.max_user_bytes_per_staged_sector();
        check(&response).map_err(Error::EngineQuery)?;

        Ok(response.max_staged_bytes_per_sector)
    }

    pub fn add_piece(&self, piece_key: &str, piece_bytes: &[u8]) -> Result<SectorId> {
        let response = self.engine.add_piece(piece_key, piece_bytes);
        check(&response).map_err(Error::PieceWrite)?;

        Ok(response.sector_id)
    }

    pub fn get_seal_status(&self, sector_id: SectorId) -> Result<SealStatus> {
        let response = self.engine.get_seal_status(sector_id);
        check(&response).map_err(Error::EngineQuery)?;

        decode_seal_status(sector_id, response)
    }

    pub fn seal_all_staged_sectors(&self) -> Result<()> {
        let response = self.engine.seal_all_staged_sectors();
        check(&response).map_err(Error::SealTrigger)
    }

    pub fn get_sealed_sectors(&self) -> Result<Vec<SealedSectorMetadata>> {
        let response = self.engine.get_sealed_sectors();
        check(&response).map_err(Error::EngineQuery)?;

        response.sectors.into_iter().map(decode_sealed).collect()
    }

    pub fn get_staged_sectors(&self) -> Result<Vec<StagedSectorMetadata>> {
        let response = self.engine.get_staged_sectors();
        check(&response).map_err(Error::EngineQuery)?;

        response
            .sectors
            .into_iter()
            .map(|sector| {
                let seal_status = match SealStatusCode::try_from(sector.seal_status_code) {
                    Ok(SealStatusCode::Pending) => SealStatus::Pending,
                    Ok(SealStatusCode::Sealing) => SealStatus::Sealing,
                    Ok(SealStatusCode::Failed) => SealStatus::Failed(sector.seal_error_msg),
                    Ok(SealStatusCode::Sealed) => {
                        return Err(Error::UnexpectedSealStatus(sector.seal_status_code))
                    }
                    Err(code) => return Err(Error::UnexpectedSealStatus(code)),
                };

                Ok(StagedSectorMetadata {
                    sector_id: sector.sector_id,
                    pieces: decode_pieces(&sector.pieces)?,
                    seal_status,
                })
            })
            .collect()
    }

    pub fn read_piece_from_sealed_sector(&self, piece_key: &str) -> Result<Vec<u8>> {
        let response = self.engine.read_piece_from_sealed_sector(piece_key);
        check(&response).map_err(Error::PieceNotFound)?;

        Ok(response.data)
    }

    pub fn destroy(&self) {
        self.engine.destroy()
    }
}

fn check<R: CodeAndMessage>(response: &R) -> std::result::Result<(), String> {
    if response.status_code() == ResponseStatus::NoError {
        Ok(())
    } else {
        Err(response.error_msg().to_string())
    }
}

fn decode_seal_status(sector_id: SectorId, response: GetSealStatusResponse) -> Result<SealStatus> {
    match SealStatusCode::try_from(response.seal_status_code) {
        Ok(SealStatusCode::Pending) => Ok(SealStatus::Pending),
        Ok(SealStatusCode::Sealing) => Ok(SealStatus::Sealing),
        Ok(SealStatusCode::Failed) => Ok(SealStatus::Failed(response.seal_error_msg)),
        Ok(SealStatusCode::Sealed) => Ok(SealStatus::Sealed(Box::new(SealedSectorMetadata {
            sector_id,
            comm_d: response.comm_d,
            comm_r: response.comm_r,
            comm_r_star: response.comm_r_star,
            proof: decode_proof(&response.proof)?,
            pieces: decode_pieces(&response.pieces)?,
        }))),
        Err(code) => Err(Error::UnexpectedSealStatus(code)),
    }
}

fn decode_sealed(sector: EngineSealedSector) -> Result<SealedSectorMetadata> {
    Ok(SealedSectorMetadata {
        sector_id: sector.sector_id,
        comm_d: sector.comm_d,
        comm_r: sector.comm_r,
        comm_r_star: sector.comm_r_star,
        proof: decode_proof(&sector.proof)?,
        pieces: decode_pieces(&sector.pieces)?,
    })
}

fn decode_proof(proof: &[u8]) -> Result<[u8; SNARK_PROOF_BYTES]> {
    if proof.len() != SNARK_PROOF_BYTES {
        return Err(Error::MalformedProof {
            expected: SNARK_PROOF_BYTES,
            actual: proof.len(),
        });
    }

    let mut out = [0u8; SNARK_PROOF_BYTES];
    out.copy_from_slice(proof);
    Ok(out)
}

fn decode_pieces(pieces: &[EnginePieceMetadata]) -> Result<Vec<PieceInfo>> {
    pieces
        .iter()
        .map(|piece| {
            let piece_ref = piece
                .piece_key
                .parse::<Cid>()
                .map_err(|source| Error::Decode {
                    piece_key: piece.piece_key.clone(),
                    source,
                })?;

            Ok(PieceInfo::new(piece_ref, piece.num_bytes))
        })
        .collect()
}
