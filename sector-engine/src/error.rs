use crate::api::{ResponseStatus, SectorId};

pub type Result<T> = std::result::Result<T, SectorBuilderErr>;

#[derive(Debug, thiserror::Error)]
pub enum SectorBuilderErr {
    #[error("number of bytes in piece ({num_bytes_in_piece}) exceeds maximum ({max_bytes_per_sector})")]
    OverflowError {
        num_bytes_in_piece: u64,
        max_bytes_per_sector: u64,
    },

    #[error("number of bytes written ({num_bytes_written}) does not match bytes in piece ({num_bytes_in_piece})")]
    IncompleteWriteError {
        num_bytes_written: u64,
        num_bytes_in_piece: u64,
    },

    #[error("no piece with key {0} found")]
    PieceNotFound(String),

    #[error("no staged or sealed sector with id {0} found")]
    SectorNotFound(SectorId),

    #[error("unrecoverable error: {0}")]
    Unrecoverable(String),

    #[error(transparent)]
    SectorManager(#[from] SectorManagerErr),

    #[error("could not (de)serialize snapshot: {0}")]
    Snapshot(#[from] serde_cbor::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub fn err_piecenotfound(piece_key: String) -> SectorBuilderErr {
    SectorBuilderErr::PieceNotFound(piece_key)
}

pub fn err_sectornotfound(sector_id: SectorId) -> SectorBuilderErr {
    SectorBuilderErr::SectorNotFound(sector_id)
}

pub fn err_unrecov<S: Into<String>>(msg: S) -> SectorBuilderErr {
    SectorBuilderErr::Unrecoverable(msg.into())
}

pub fn err_overflow(num_bytes_in_piece: u64, max_bytes_per_sector: u64) -> SectorBuilderErr {
    SectorBuilderErr::OverflowError {
        num_bytes_in_piece,
        max_bytes_per_sector,
    }
}

pub fn err_inc_write(num_bytes_written: u64, num_bytes_in_piece: u64) -> SectorBuilderErr {
    SectorBuilderErr::IncompleteWriteError {
        num_bytes_written,
        num_bytes_in_piece,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SectorManagerErr {
    #[error("unclassified error: {0}")]
    UnclassifiedError(String),

    #[error("caller error: {0}")]
    CallerError(String),

    #[error("receiver error: {0}")]
    ReceiverError(String),
}

// err_code_and_msg accepts an error and produces a tuple of response status
// code and message, both of which can be used to set fields in a response
// struct returned from an engine call.
pub fn err_code_and_msg(err: &SectorBuilderErr) -> (ResponseStatus, String) {
    use crate::api::ResponseStatus::*;

    let msg = format!("{}", err);

    let code = match err {
        SectorBuilderErr::OverflowError { .. } => CallerError,
        SectorBuilderErr::IncompleteWriteError { .. } => ReceiverError,
        SectorBuilderErr::PieceNotFound(_) => CallerError,
        SectorBuilderErr::SectorNotFound(_) => CallerError,
        SectorBuilderErr::Unrecoverable(_) => ReceiverError,
        SectorBuilderErr::SectorManager(SectorManagerErr::UnclassifiedError(_)) => {
            UnclassifiedError
        }
        SectorBuilderErr::SectorManager(SectorManagerErr::CallerError(_)) => CallerError,
        SectorBuilderErr::SectorManager(SectorManagerErr::ReceiverError(_)) => ReceiverError,
        SectorBuilderErr::Snapshot(_) => ReceiverError,
        SectorBuilderErr::Io(_) => ReceiverError,
    };

    (code, msg)
}
