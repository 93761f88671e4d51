use std::convert::TryFrom;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::{LIVE_SECTOR_SIZE, TEST_SECTOR_SIZE};

pub type SectorId = u64;

/// The request/response boundary across which sealing is invoked. Every call
/// reports a status code and, on failure, a message; none of them retry.
pub trait SealingEngine: Send + Sync + 'static {
    /// Opens (or recovers) an engine against the provided directories.
    fn init(request: InitRequest) -> InitResponse<Self>
    where
        Self: Sized;

    /// Returns the number of user piece-bytes which will fit into a
    /// newly-provisioned staged sector.
    fn max_user_bytes_per_staged_sector(&self) -> MaxUserBytesResponse;

    /// Writes user piece-bytes to a staged sector and returns the id of the
    /// sector to which the bytes were written.
    fn add_piece(&self, piece_key: &str, piece_bytes: &[u8]) -> AddPieceResponse;

    /// Returns sealing status for the sector with the provided id. Produces an
    /// error if no staged or sealed sector exists with that id.
    fn get_seal_status(&self, sector_id: SectorId) -> GetSealStatusResponse;

    /// Schedules sealing of all staged sectors.
    fn seal_all_staged_sectors(&self) -> SealAllStagedSectorsResponse;

    fn get_sealed_sectors(&self) -> GetSealedSectorsResponse;

    fn get_staged_sectors(&self) -> GetStagedSectorsResponse;

    /// Unseals and returns the bytes associated with the provided piece key.
    fn read_piece_from_sealed_sector(&self, piece_key: &str) -> ReadPieceFromSealedSectorResponse;

    /// Releases every resource held by the engine. Calls made afterwards fail
    /// with a receiver error.
    fn destroy(&self);
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ResponseStatus {
    NoError = 0,
    UnclassifiedError = 1,
    CallerError = 2,
    ReceiverError = 3,
}

/// Implemented by every response so that callers can check status generically.
pub trait CodeAndMessage {
    fn status_code(&self) -> ResponseStatus;
    fn error_msg(&self) -> &str;
}

macro_rules! code_and_message_impl {
    ($response:ident) => {
        impl CodeAndMessage for $response {
            fn status_code(&self) -> ResponseStatus {
                self.status_code
            }

            fn error_msg(&self) -> &str {
                &self.error_msg
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectorStoreType {
    Live,
    Test,
    ProofTest,
}

impl SectorStoreType {
    /// Number of bytes in a sealed sector managed by a store of this type.
    pub fn sector_bytes(self) -> u64 {
        match self {
            SectorStoreType::Live => LIVE_SECTOR_SIZE,
            SectorStoreType::Test | SectorStoreType::ProofTest => TEST_SECTOR_SIZE,
        }
    }

    /// Number of user bytes (before bit-padding) which fit into a sector.
    pub fn max_user_bytes_per_sector(self) -> u64 {
        self.sector_bytes() / 128 * 127
    }
}

#[repr(u32)]
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum SealStatusCode {
    Sealed = 0,
    Pending = 1,
    Failed = 2,
    Sealing = 3,
}

impl From<SealStatusCode> for u32 {
    fn from(code: SealStatusCode) -> Self {
        code as u32
    }
}

impl TryFrom<u32> for SealStatusCode {
    type Error = u32;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(SealStatusCode::Sealed),
            1 => Ok(SealStatusCode::Pending),
            2 => Ok(SealStatusCode::Failed),
            3 => Ok(SealStatusCode::Sealing),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InitRequest {
    pub store_type: SectorStoreType,
    pub last_used_sector_id: SectorId,
    pub metadata_dir: PathBuf,
    pub prover_id: [u8; 31],
    pub sealed_sector_dir: PathBuf,
    pub staged_sector_dir: PathBuf,
    pub max_num_staged_sectors: u8,
}

///////////////////////////////////////////////////////////////////////////////
/// InitResponse
////////////////

pub struct InitResponse<E> {
    pub status_code: ResponseStatus,
    pub error_msg: String,
    pub engine: Option<E>,
}

impl<E> Default for InitResponse<E> {
    fn default() -> InitResponse<E> {
        InitResponse {
            status_code: ResponseStatus::NoError,
            error_msg: String::new(),
            engine: None,
        }
    }
}

impl<E> CodeAndMessage for InitResponse<E> {
    fn status_code(&self) -> ResponseStatus {
        self.status_code
    }

    fn error_msg(&self) -> &str {
        &self.error_msg
    }
}

///////////////////////////////////////////////////////////////////////////////
/// MaxUserBytesResponse
////////////////////////

#[derive(Debug, Clone)]
pub struct MaxUserBytesResponse {
    pub status_code: ResponseStatus,
    pub error_msg: String,
    pub max_staged_bytes_per_sector: u64,
}

impl Default for MaxUserBytesResponse {
    fn default() -> MaxUserBytesResponse {
        MaxUserBytesResponse {
            status_code: ResponseStatus::NoError,
            error_msg: String::new(),
            max_staged_bytes_per_sector: 0,
        }
    }
}

code_and_message_impl!(MaxUserBytesResponse);

///////////////////////////////////////////////////////////////////////////////
/// AddPieceResponse
////////////////////

#[derive(Debug, Clone)]
pub struct AddPieceResponse {
    pub status_code: ResponseStatus,
    pub error_msg: String,
    pub sector_id: SectorId,
}

impl Default for AddPieceResponse {
    fn default() -> AddPieceResponse {
        AddPieceResponse {
            status_code: ResponseStatus::NoError,
            error_msg: String::new(),
            sector_id: 0,
        }
    }
}

code_and_message_impl!(AddPieceResponse);

///////////////////////////////////////////////////////////////////////////////
/// EnginePieceMetadata, EngineSealedSector, EngineStagedSector
///////////////////////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnginePieceMetadata {
    pub piece_key: String,
    pub num_bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSealedSector {
    pub sector_id: SectorId,
    pub comm_d: [u8; 32],
    pub comm_r: [u8; 32],
    pub comm_r_star: [u8; 32],
    pub proof: Vec<u8>,
    pub pieces: Vec<EnginePieceMetadata>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineStagedSector {
    pub sector_access: String,
    pub sector_id: SectorId,
    pub pieces: Vec<EnginePieceMetadata>,

    // must be one of: Pending, Failed, Sealing
    pub seal_status_code: u32,

    // if sealing failed - here's the error
    pub seal_error_msg: String,
}

///////////////////////////////////////////////////////////////////////////////
/// GetSealStatusResponse
/////////////////////////

#[derive(Debug, Clone)]
pub struct GetSealStatusResponse {
    pub status_code: ResponseStatus,
    pub error_msg: String,

    pub seal_status_code: u32,

    // sealing failed - here's the error
    pub seal_error_msg: String,

    // sealed sector metadata
    pub comm_d: [u8; 32],
    pub comm_r: [u8; 32],
    pub comm_r_star: [u8; 32],
    pub proof: Vec<u8>,
    pub pieces: Vec<EnginePieceMetadata>,
}

impl Default for GetSealStatusResponse {
    fn default() -> GetSealStatusResponse {
        GetSealStatusResponse {
            status_code: ResponseStatus::NoError,
            error_msg: String::new(),
            seal_status_code: SealStatusCode::Failed.into(),
            seal_error_msg: String::new(),
            comm_d: Default::default(),
            comm_r: Default::default(),
            comm_r_star: Default::default(),
            proof: Vec::new(),
            pieces: Vec::new(),
        }
    }
}

code_and_message_impl!(GetSealStatusResponse);

///////////////////////////////////////////////////////////////////////////////
/// SealAllStagedSectorsResponse
////////////////////////////////

#[derive(Debug, Clone)]
pub struct SealAllStagedSectorsResponse {
    pub status_code: ResponseStatus,
    pub error_msg: String,
}

impl Default for SealAllStagedSectorsResponse {
    fn default() -> SealAllStagedSectorsResponse {
        SealAllStagedSectorsResponse {
            status_code: ResponseStatus::NoError,
            error_msg: String::new(),
        }
    }
}

code_and_message_impl!(SealAllStagedSectorsResponse);

///////////////////////////////////////////////////////////////////////////////
/// GetSealedSectorsResponse
////////////////////////////

#[derive(Debug, Clone)]
pub struct GetSealedSectorsResponse {
    pub status_code: ResponseStatus,
    pub error_msg: String,
    pub sectors: Vec<EngineSealedSector>,
}

impl Default for GetSealedSectorsResponse {
    fn default() -> GetSealedSectorsResponse {
        GetSealedSectorsResponse {
            status_code: ResponseStatus::NoError,
            error_msg: String::new(),
            sectors: Vec::new(),
        }
    }
}

code_and_message_impl!(GetSealedSectorsResponse);

///////////////////////////////////////////////////////////////////////////////
/// GetStagedSectorsResponse
////////////////////////////

#[derive(Debug, Clone)]
pub struct GetStagedSectorsResponse {
    pub status_code: ResponseStatus,
    pub error_msg: String,
    pub sectors: Vec<EngineStagedSector>,
}

impl Default for GetStagedSectorsResponse {
    fn default() -> GetStagedSectorsResponse {
        GetStagedSectorsResponse {
            status_code: ResponseStatus::NoError,
            error_msg: String::new(),
            sectors: Vec::new(),
        }
    }
}

code_and_message_impl!(GetStagedSectorsResponse);

////////////////////////////////////////////////////////////////////////////////
/// ReadPieceFromSealedSectorResponse
/////////////////////////////////////

#[derive(Debug, Clone)]
pub struct ReadPieceFromSealedSectorResponse {
    pub status_code: ResponseStatus,
    pub error_msg: String,
    pub data: Vec<u8>,
}

impl Default for ReadPieceFromSealedSectorResponse {
    fn default() -> ReadPieceFromSealedSectorResponse {
        ReadPieceFromSealedSectorResponse {
            status_code: ResponseStatus::NoError,
            error_msg: String::new(),
            data: Vec::new(),
        }
    }
}

code_and_message_impl!(ReadPieceFromSealedSectorResponse);
