use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use sector_engine::{InitRequest, SectorId, SectorStoreType};

use crate::error::{Error, Result};

pub const DEFAULT_MAX_NUM_STAGED_SECTORS: u8 = 1;
pub const DEFAULT_SEAL_STATUS_POLL_INTERVAL_MS: u64 = 1000;

/// Width of the prover id handed to the sealing engine.
pub const PROVER_ID_BYTES: usize = 31;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorBuilderConfig {
    pub sector_store_type: SectorStoreType,
    #[serde(default)]
    pub last_used_sector_id: SectorId,
    pub metadata_dir: PathBuf,
    pub operator_address: String,
    pub sealed_sector_dir: PathBuf,
    pub staged_sector_dir: PathBuf,
    #[serde(default = "default_max_num_staged_sectors")]
    pub max_num_staged_sectors: u8,
    #[serde(default = "default_seal_status_poll_interval_ms")]
    pub seal_status_poll_interval_ms: u64,
}

fn default_max_num_staged_sectors() -> u8 {
    DEFAULT_MAX_NUM_STAGED_SECTORS
}

fn default_seal_status_poll_interval_ms() -> u64 {
    DEFAULT_SEAL_STATUS_POLL_INTERVAL_MS
}

impl SectorBuilderConfig {
    /// Lays the metadata, sealed and staged directories out under `root`.
    pub fn with_root_dir<P: AsRef<Path>, S: Into<String>>(
        sector_store_type: SectorStoreType,
        operator_address: S,
        root: P,
    ) -> SectorBuilderConfig {
        let root = root.as_ref();

        SectorBuilderConfig {
            sector_store_type,
            last_used_sector_id: 0,
            metadata_dir: root.join("metadata"),
            operator_address: operator_address.into(),
            sealed_sector_dir: root.join("sealed"),
            staged_sector_dir: root.join("staged"),
            max_num_staged_sectors: DEFAULT_MAX_NUM_STAGED_SECTORS,
            seal_status_poll_interval_ms: DEFAULT_SEAL_STATUS_POLL_INTERVAL_MS,
        }
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<SectorBuilderConfig> {
        let path = path.as_ref();

        let contents = fs::read(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;

        let config: SectorBuilderConfig = serde_json::from_slice(&contents)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_num_staged_sectors == 0 {
            return Err(Error::InvalidConfig(
                "max_num_staged_sectors must be at least 1".to_string(),
            ));
        }

        if self.seal_status_poll_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "seal_status_poll_interval_ms must be at least 1".to_string(),
            ));
        }

        if self.operator_address.is_empty() {
            return Err(Error::InvalidConfig(
                "operator_address must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn seal_status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.seal_status_poll_interval_ms)
    }

    pub fn prover_id(&self) -> [u8; PROVER_ID_BYTES] {
        prover_id_from_address(&self.operator_address)
    }

    pub fn init_request(&self) -> InitRequest {
        InitRequest {
            store_type: self.sector_store_type,
            last_used_sector_id: self.last_used_sector_id,
            metadata_dir: self.metadata_dir.clone(),
            prover_id: self.prover_id(),
            sealed_sector_dir: self.sealed_sector_dir.clone(),
            staged_sector_dir: self.staged_sector_dir.clone(),
            max_num_staged_sectors: self.max_num_staged_sectors,
        }
    }
}

/// Copies the address bytes into a fixed-width prover id, truncating long
/// addresses and zero-filling short ones.
pub fn prover_id_from_address(address: &str) -> [u8; PROVER_ID_BYTES] {
    let mut prover_id = [0u8; PROVER_ID_BYTES];
    let bytes = address.as_bytes();
    let n = bytes.len().min(PROVER_ID_BYTES);

    prover_id[..n].copy_from_slice(&bytes[..n]);
    prover_id
}
