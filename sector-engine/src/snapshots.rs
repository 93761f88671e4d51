use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::constants::SNAPSHOT_FILE_EXTENSION;
use crate::error::Result;
use crate::state::*;

#[derive(Clone, Debug)]
pub struct SnapshotKey {
    prover_id: [u8; 31],
    sector_size: u64,
}

impl SnapshotKey {
    pub fn new(prover_id: [u8; 31], sector_size: u64) -> SnapshotKey {
        SnapshotKey {
            prover_id,
            sector_size,
        }
    }

    fn path_in(&self, metadata_dir: &Path) -> PathBuf {
        let name: String = Vec::from(self.clone())
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();

        metadata_dir.join(format!("{}.{}", name, SNAPSHOT_FILE_EXTENSION))
    }
}

impl From<SnapshotKey> for Vec<u8> {
    fn from(key: SnapshotKey) -> Self {
        let mut bytes = Vec::with_capacity(8 + key.prover_id.len());
        bytes
            .write_u64::<LittleEndian>(key.sector_size)
            .expect("writing to a Vec cannot fail");
        bytes.extend_from_slice(&key.prover_id[..]);
        bytes
    }
}

pub fn load_snapshot(metadata_dir: &Path, key: &SnapshotKey) -> Result<Option<StateSnapshot>> {
    let path = key.path_in(metadata_dir);

    if !path.exists() {
        return Ok(None);
    }

    let val = fs::read(&path)?;
    let snapshot = serde_cbor::from_slice(&val[..])?;

    Ok(Some(snapshot))
}

/// Writes the snapshot to a temporary file and renames it over the previous
/// snapshot.
pub fn persist_snapshot(metadata_dir: &Path, key: &SnapshotKey, snapshot: &StateSnapshot) -> Result<()> {
    let serialized = serde_cbor::to_vec(snapshot)?;

    let path = key.path_in(metadata_dir);
    let tmp_path = path.with_extension("tmp");

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(&serialized)?;
    file.sync_all()?;

    fs::rename(&tmp_path, &path)?;

    Ok(())
}

pub fn make_snapshot(staged: &StagedState, sealed: &SealedState) -> StateSnapshot {
    StateSnapshot {
        staged: staged.clone(),
        sealed: sealed.clone(),
    }
}
