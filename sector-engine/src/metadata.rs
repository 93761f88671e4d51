use serde::{Deserialize, Serialize};

use crate::api::{EnginePieceMetadata, EngineSealedSector, SealStatusCode, SectorId};

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct PieceMetadata {
    pub piece_key: String,
    pub num_bytes: u64,
}

impl From<PieceMetadata> for EnginePieceMetadata {
    fn from(meta: PieceMetadata) -> Self {
        EnginePieceMetadata {
            piece_key: meta.piece_key,
            num_bytes: meta.num_bytes,
        }
    }
}

/// Lifecycle of a sector while it lives in the staging area.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub enum SealStatus {
    AcceptingPieces,
    FullyPacked,
    Sealing,
    Failed(String),
}

impl Default for SealStatus {
    fn default() -> SealStatus {
        SealStatus::AcceptingPieces
    }
}

impl SealStatus {
    pub fn is_accepting_pieces(&self) -> bool {
        *self == SealStatus::AcceptingPieces
    }

    pub fn is_ready_for_sealing(&self) -> bool {
        matches!(self, SealStatus::AcceptingPieces | SealStatus::FullyPacked)
    }
}

impl From<&SealStatus> for SealStatusCode {
    fn from(status: &SealStatus) -> Self {
        match status {
            SealStatus::AcceptingPieces | SealStatus::FullyPacked => SealStatusCode::Pending,
            SealStatus::Sealing => SealStatusCode::Sealing,
            SealStatus::Failed(_) => SealStatusCode::Failed,
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize, Debug, PartialEq)]
pub struct StagedSectorMetadata {
    pub sector_id: SectorId,
    pub sector_access: String,
    pub pieces: Vec<PieceMetadata>,
    pub seal_status: SealStatus,
}

impl StagedSectorMetadata {
    pub fn num_bytes_used(&self) -> u64 {
        self.pieces.iter().map(|p| p.num_bytes).sum()
    }
}

#[derive(Clone, Default, Serialize, Deserialize, Debug, PartialEq)]
pub struct SealedSectorMetadata {
    pub sector_id: SectorId,
    pub sector_access: String,
    pub pieces: Vec<PieceMetadata>,
    pub comm_d: [u8; 32],
    pub comm_r: [u8; 32],
    pub comm_r_star: [u8; 32],
    pub proof: Vec<u8>,
}

impl SealedSectorMetadata {
    /// Returns the byte offset of the piece within the sector, if present.
    pub fn piece_offset(&self, piece_key: &str) -> Option<(u64, &PieceMetadata)> {
        let mut offset = 0;

        for piece in &self.pieces {
            if piece.piece_key == piece_key {
                return Some((offset, piece));
            }
            offset += piece.num_bytes;
        }

        None
    }
}

impl From<SealedSectorMetadata> for EngineSealedSector {
    fn from(meta: SealedSectorMetadata) -> Self {
        EngineSealedSector {
            sector_id: meta.sector_id,
            comm_d: meta.comm_d,
            comm_r: meta.comm_r,
            comm_r_star: meta.comm_r_star,
            proof: meta.proof,
            pieces: meta.pieces.into_iter().map(Into::into).collect(),
        }
    }
}

/// Status of a sector as reported across the engine boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum SectorStatus {
    Pending,
    Sealing,
    Failed(String),
    Sealed(Box<SealedSectorMetadata>),
}
