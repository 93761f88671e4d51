use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::api::{SectorId, SectorStoreType};
use crate::error::SectorManagerErr;

/// Provisions and reads the files backing staged and sealed sectors.
#[derive(Debug, Clone)]
pub struct SectorStore {
    store_type: SectorStoreType,
    staged_sector_dir: PathBuf,
    sealed_sector_dir: PathBuf,
}

impl SectorStore {
    pub fn new<P: Into<PathBuf>>(
        store_type: SectorStoreType,
        staged_sector_dir: P,
        sealed_sector_dir: P,
    ) -> Result<SectorStore, SectorManagerErr> {
        let store = SectorStore {
            store_type,
            staged_sector_dir: staged_sector_dir.into(),
            sealed_sector_dir: sealed_sector_dir.into(),
        };

        fs::create_dir_all(&store.staged_sector_dir).map_err(receiver_err)?;
        fs::create_dir_all(&store.sealed_sector_dir).map_err(receiver_err)?;

        Ok(store)
    }

    /// returns the number of bytes in a sealed sector managed by this store
    pub fn sector_bytes(&self) -> u64 {
        self.store_type.sector_bytes()
    }

    /// returns the number of bytes that will fit into a sector managed by this store
    pub fn max_unsealed_bytes_per_sector(&self) -> u64 {
        self.store_type.max_user_bytes_per_sector()
    }

    /// provisions a new staging sector and reports the corresponding access
    pub fn new_staging_sector_access(&self, sector_id: SectorId) -> Result<String, SectorManagerErr> {
        let access = format!("staged-{}", sector_id);

        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.staged_sector_path(&access))
            .map_err(receiver_err)?;

        Ok(access)
    }

    /// reports the access under which the sealed replica of a sector lives
    pub fn new_sealed_sector_access(&self, sector_id: SectorId) -> String {
        format!("sealed-{}", sector_id)
    }

    pub fn staged_sector_path(&self, access: &str) -> PathBuf {
        self.staged_sector_dir.join(access)
    }

    pub fn sealed_sector_path(&self, access: &str) -> PathBuf {
        self.sealed_sector_dir.join(access)
    }

    /// reports the number of bytes written to an unsealed sector
    pub fn num_unsealed_bytes(&self, access: &str) -> Result<u64, SectorManagerErr> {
        let path = self.staged_sector_path(access);
        require_file(&path)?;

        fs::metadata(&path).map(|m| m.len()).map_err(receiver_err)
    }

    /// appends `data` to the staging sector identified by `access`
    pub fn write_and_preprocess(&self, access: &str, data: &[u8]) -> Result<u64, SectorManagerErr> {
        let path = self.staged_sector_path(access);
        require_file(&path)?;

        let mut file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(receiver_err)?;

        file.write_all(data).map_err(receiver_err)?;
        file.sync_all().map_err(receiver_err)?;

        Ok(data.len() as u64)
    }

    /// cuts a staged sector back to its first `num_bytes` bytes
    pub fn truncate_staged(&self, access: &str, num_bytes: u64) -> Result<(), SectorManagerErr> {
        let path = self.staged_sector_path(access);
        require_file(&path)?;

        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(receiver_err)?;

        file.set_len(num_bytes).map_err(receiver_err)?;
        file.sync_all().map_err(receiver_err)
    }

    pub fn remove_staged(&self, access: &str) -> Result<(), SectorManagerErr> {
        fs::remove_file(self.staged_sector_path(access)).map_err(receiver_err)
    }

    /// reads `num_bytes` starting at `start_offset` from a sealed replica
    pub fn read_raw(
        &self,
        access: &str,
        start_offset: u64,
        num_bytes: u64,
    ) -> Result<Vec<u8>, SectorManagerErr> {
        let path = self.sealed_sector_path(access);
        require_file(&path)?;

        let mut file = fs::File::open(&path).map_err(receiver_err)?;
        file.seek(SeekFrom::Start(start_offset))
            .map_err(receiver_err)?;

        let mut buf = Vec::with_capacity(num_bytes as usize);
        file.take(num_bytes)
            .read_to_end(&mut buf)
            .map_err(receiver_err)?;

        if buf.len() as u64 != num_bytes {
            return Err(SectorManagerErr::ReceiverError(format!(
                "read {} bytes from {} but expected {}",
                buf.len(),
                access,
                num_bytes
            )));
        }

        Ok(buf)
    }
}

fn require_file(path: &Path) -> Result<(), SectorManagerErr> {
    if path.is_file() {
        Ok(())
    } else {
        Err(SectorManagerErr::CallerError(format!(
            "no sector file at {}",
            path.display()
        )))
    }
}

fn receiver_err(err: std::io::Error) -> SectorManagerErr {
    SectorManagerErr::ReceiverError(format!("{}", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_store() -> (tempfile::TempDir, SectorStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SectorStore::new(
            SectorStoreType::Test,
            dir.path().join("staged"),
            dir.path().join("sealed"),
        )
        .unwrap();

        (dir, store)
    }

    #[test]
    fn test_write_appends_to_staged_sector() {
        let (_dir, store) = create_store();

        let access = store.new_staging_sector_access(1).unwrap();
        assert_eq!(0, store.num_unsealed_bytes(&access).unwrap());

        assert_eq!(3, store.write_and_preprocess(&access, &[1, 2, 3]).unwrap());
        assert_eq!(2, store.write_and_preprocess(&access, &[4, 5]).unwrap());
        assert_eq!(5, store.num_unsealed_bytes(&access).unwrap());
    }

    #[test]
    fn test_read_raw_returns_requested_range() {
        let (_dir, store) = create_store();

        let access = store.new_sealed_sector_access(9);
        fs::write(store.sealed_sector_path(&access), &[0, 1, 2, 3, 4, 5]).unwrap();

        assert_eq!(vec![2, 3, 4], store.read_raw(&access, 2, 3).unwrap());
        assert!(store.read_raw(&access, 4, 10).is_err());
    }

    #[test]
    fn test_truncate_discards_trailing_bytes() {
        let (_dir, store) = create_store();

        let access = store.new_staging_sector_access(3).unwrap();
        store.write_and_preprocess(&access, &[1, 2, 3, 4, 5]).unwrap();

        store.truncate_staged(&access, 2).unwrap();
        assert_eq!(2, store.num_unsealed_bytes(&access).unwrap());

        store.write_and_preprocess(&access, &[9]).unwrap();
        assert_eq!(
            vec![1, 2, 9],
            fs::read(store.staged_sector_path(&access)).unwrap()
        );

        store.remove_staged(&access).unwrap();
        assert!(store.truncate_staged(&access, 0).is_err());
    }

    #[test]
    fn test_unknown_access_is_a_caller_error() {
        let (_dir, store) = create_store();

        match store.write_and_preprocess("staged-404", &[1]) {
            Err(SectorManagerErr::CallerError(_)) => (),
            other => panic!("expected caller error, got {:?}", other),
        }
    }
}
