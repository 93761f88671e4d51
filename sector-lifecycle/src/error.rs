use std::path::PathBuf;

use cid::Cid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to initialize sealing engine: {0}")]
    EngineInit(String),

    #[error("sealing engine query failed: {0}")]
    EngineQuery(String),

    #[error("failed to fetch piece: {0}")]
    PieceFetch(#[from] PieceFetchError),

    #[error("failed to write piece to staged sector: {0}")]
    PieceWrite(String),

    #[error("failed to seal staged sectors: {0}")]
    SealTrigger(String),

    #[error("failed to read piece from sealed sector: {0}")]
    PieceNotFound(String),

    #[error("failed to decode piece key {piece_key:?}: {source}")]
    Decode {
        piece_key: String,
        #[source]
        source: cid::Error,
    },

    #[error("malformed proof from engine: expected {expected} bytes, got {actual}")]
    MalformedProof { expected: usize, actual: usize },

    #[error("failed to load staged sectors: {0}")]
    MetadataLoad(#[source] Box<Error>),

    #[error("unexpected seal status code {0}")]
    UnexpectedSealStatus(u32),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("could not read config {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

/// Reasons the piece assembler could not produce a piece's bytes.
#[derive(Debug, thiserror::Error)]
pub enum PieceFetchError {
    #[error("short read of piece {piece_ref}: expected {expected} bytes, got {actual}")]
    ShortRead {
        piece_ref: Cid,
        expected: u64,
        actual: u64,
    },

    #[error("could not resolve piece {piece_ref}: {reason}")]
    Resolution { piece_ref: Cid, reason: String },

    #[error("error reading piece {piece_ref}: {source}")]
    Io {
        piece_ref: Cid,
        #[source]
        source: std::io::Error,
    },
}
