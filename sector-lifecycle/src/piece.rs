use std::collections::HashMap;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use cid::multihash::Multihash;
use cid::Cid;

use crate::error::PieceFetchError;

/// Multicodec for raw binary content.
pub const RAW_CODEC: u64 = 0x55;

/// Multihash code for BLAKE2b with a 256-bit digest.
pub const BLAKE2B_256: u64 = 0xb220;

const INITIAL_READ_CAPACITY: u64 = 64 * 1024;

/// A piece of client data, identified by its content address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PieceInfo {
    pub piece_ref: Cid,
    pub size: u64,
}

impl PieceInfo {
    pub fn new(piece_ref: Cid, size: u64) -> PieceInfo {
        PieceInfo { piece_ref, size }
    }
}

/// Computes the content address under which `bytes` are stored.
pub fn piece_ref_for_bytes(bytes: &[u8]) -> Cid {
    let digest = blake2b_simd::Params::new().hash_length(32).hash(bytes);
    let hash = Multihash::<64>::wrap(BLAKE2B_256, digest.as_bytes())
        .expect("a 32-byte digest always fits a 64-byte multihash");

    Cid::new_v1(RAW_CODEC, hash)
}

/// Resolves content addresses to readable byte streams.
pub trait ContentStore: Send + Sync {
    fn open(&self, piece_ref: &Cid) -> Result<Box<dyn Read + Send>, PieceFetchError>;
}

#[derive(Debug, Default)]
pub struct MemoryContentStore {
    pieces: RwLock<HashMap<Cid, Arc<Vec<u8>>>>,
}

impl MemoryContentStore {
    pub fn new() -> MemoryContentStore {
        Default::default()
    }

    /// Stores `bytes` under their content address and returns it.
    pub fn put(&self, bytes: Vec<u8>) -> Cid {
        let piece_ref = piece_ref_for_bytes(&bytes);
        self.insert(piece_ref, bytes);
        piece_ref
    }

    /// Stores `bytes` under an arbitrary reference.
    pub fn insert(&self, piece_ref: Cid, bytes: Vec<u8>) {
        let mut pieces = self.pieces.write().unwrap_or_else(|e| e.into_inner());
        pieces.insert(piece_ref, Arc::new(bytes));
    }
}

impl ContentStore for MemoryContentStore {
    fn open(&self, piece_ref: &Cid) -> Result<Box<dyn Read + Send>, PieceFetchError> {
        let pieces = self.pieces.read().unwrap_or_else(|e| e.into_inner());

        match pieces.get(piece_ref) {
            Some(bytes) => Ok(Box::new(Cursor::new(bytes.as_ref().clone()))),
            None => Err(PieceFetchError::Resolution {
                piece_ref: *piece_ref,
                reason: "not in memory store".to_string(),
            }),
        }
    }
}

/// Keeps one file per piece, named by the piece's content address.
#[derive(Debug, Clone)]
pub struct DirContentStore {
    root: PathBuf,
}

impl DirContentStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> io::Result<DirContentStore> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        Ok(DirContentStore { root })
    }

    pub fn put(&self, bytes: &[u8]) -> io::Result<Cid> {
        let piece_ref = piece_ref_for_bytes(bytes);
        fs::write(self.path_of(&piece_ref), bytes)?;

        Ok(piece_ref)
    }

    fn path_of(&self, piece_ref: &Cid) -> PathBuf {
        self.root.join(piece_ref.to_string())
    }
}

impl ContentStore for DirContentStore {
    fn open(&self, piece_ref: &Cid) -> Result<Box<dyn Read + Send>, PieceFetchError> {
        match fs::File::open(self.path_of(piece_ref)) {
            Ok(file) => Ok(Box::new(file)),
            Err(ref err) if err.kind() == io::ErrorKind::NotFound => {
                Err(PieceFetchError::Resolution {
                    piece_ref: *piece_ref,
                    reason: format!("no file in {}", self.root.display()),
                })
            }
            Err(source) => Err(PieceFetchError::Io {
                piece_ref: *piece_ref,
                source,
            }),
        }
    }
}

/// Turns a piece reference and its declared size into exactly that many bytes.
#[derive(Clone)]
pub struct PieceAssembler {
    store: Arc<dyn ContentStore>,
}

impl PieceAssembler {
    pub fn new(store: Arc<dyn ContentStore>) -> PieceAssembler {
        PieceAssembler { store }
    }

    /// Reads the first `size` bytes of the referenced content. Content longer
    /// than `size` is truncated; shorter content is an error.
    pub fn assemble(&self, piece_ref: &Cid, size: u64) -> Result<Vec<u8>, PieceFetchError> {
        let reader = self.store.open(piece_ref)?;

        // the declared size is untrusted; the buffer grows with what arrives
        let mut buf = Vec::with_capacity(size.min(INITIAL_READ_CAPACITY) as usize);

        reader
            .take(size)
            .read_to_end(&mut buf)
            .map_err(|source| PieceFetchError::Io {
                piece_ref: *piece_ref,
                source,
            })?;

        if (buf.len() as u64) < size {
            return Err(PieceFetchError::ShortRead {
                piece_ref: *piece_ref,
                expected: size,
                actual: buf.len() as u64,
            });
        }

        Ok(buf)
    }
}
