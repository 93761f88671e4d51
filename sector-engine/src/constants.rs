pub const LIVE_SECTOR_SIZE: u64 = 1 << 28;
pub const TEST_SECTOR_SIZE: u64 = 1024;

pub const COMMITMENT_BYTES: usize = 32;
pub const SNARK_PROOF_BYTES: usize = 384;

pub const NUM_SEAL_WORKERS: usize = 2;

pub const SNAPSHOT_FILE_EXTENSION: &str = "cbor";
