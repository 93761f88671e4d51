use sector_engine::{SectorId, COMMITMENT_BYTES, SNARK_PROOF_BYTES};

use crate::piece::PieceInfo;

pub type Commitment = [u8; COMMITMENT_BYTES];

/// Everything needed to prove storage of a sealed sector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedSectorMetadata {
    pub sector_id: SectorId,
    pub comm_d: Commitment,
    pub comm_r: Commitment,
    pub comm_r_star: Commitment,
    pub proof: [u8; SNARK_PROOF_BYTES],
    pub pieces: Vec<PieceInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedSectorMetadata {
    pub sector_id: SectorId,
    pub pieces: Vec<PieceInfo>,
    pub seal_status: SealStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SealStatus {
    Pending,
    Sealing,
    Sealed(Box<SealedSectorMetadata>),
    Failed(String),
}

/// The outcome of sealing a sector, delivered once per sector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SealResult {
    Sealed(SealedSectorMetadata),
    Failed { sector_id: SectorId, message: String },
}

impl SealResult {
    pub fn sector_id(&self) -> SectorId {
        match self {
            SealResult::Sealed(meta) => meta.sector_id,
            SealResult::Failed { sector_id, .. } => *sector_id,
        }
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self, SealResult::Sealed(_))
    }
}
