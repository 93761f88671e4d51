use std::path::PathBuf;

use crate::api::SectorId;
use crate::error::{err_inc_write, err_overflow, err_piecenotfound, err_sectornotfound, Result};
use crate::metadata::{
    PieceMetadata, SealStatus, SealedSectorMetadata, SectorStatus, StagedSectorMetadata,
};
use crate::sealer::{SealResult, SealTaskPrototype};
use crate::snapshots::{load_snapshot, make_snapshot, persist_snapshot, SnapshotKey};
use crate::state::EngineState;
use crate::store::SectorStore;

/// Owns the staged and sealed sector state. Only the scheduler thread touches
/// it; every mutation is checkpointed to the metadata directory.
pub struct SectorMetadataManager {
    metadata_dir: PathBuf,
    max_num_staged_sectors: u8,
    snapshot_key: SnapshotKey,
    state: EngineState,
    store: SectorStore,
}

impl SectorMetadataManager {
    pub fn initialize(
        store: SectorStore,
        metadata_dir: PathBuf,
        prover_id: [u8; 31],
        last_used_sector_id: SectorId,
        max_num_staged_sectors: u8,
    ) -> Result<SectorMetadataManager> {
        let snapshot_key = SnapshotKey::new(prover_id, store.sector_bytes());

        let mut state: EngineState = load_snapshot(&metadata_dir, &snapshot_key)?
            .map(Into::into)
            .unwrap_or_default();

        if state.staged.sector_id_nonce < last_used_sector_id {
            state.staged.sector_id_nonce = last_used_sector_id;
        }

        info!(
            "loaded sector metadata: {} staged, {} sealed, last used sector id {}",
            state.staged.sectors.len(),
            state.sealed.sectors.len(),
            state.staged.sector_id_nonce
        );

        Ok(SectorMetadataManager {
            metadata_dir,
            max_num_staged_sectors,
            snapshot_key,
            state,
            store,
        })
    }

    pub fn max_user_bytes_per_staged_sector(&self) -> u64 {
        self.store.max_unsealed_bytes_per_sector()
    }

    /// Writes the piece into the first open staged sector with room for it,
    /// provisioning a new sector if none has room. Returns the destination
    /// sector id and the seal tasks for any sectors closed to stay within the
    /// staged sector limit.
    ///
    /// Sectors are only closed once the piece has been written, so a failed
    /// write never leaves a sector marked for sealing without a seal task.
    pub fn add_piece(
        &mut self,
        piece_key: String,
        piece_bytes: &[u8],
    ) -> Result<(SectorId, Vec<SealTaskPrototype>)> {
        let num_bytes_in_piece = piece_bytes.len() as u64;
        let max_bytes_per_sector = self.store.max_unsealed_bytes_per_sector();

        if num_bytes_in_piece > max_bytes_per_sector {
            return Err(err_overflow(num_bytes_in_piece, max_bytes_per_sector));
        }

        let existing = self
            .state
            .staged
            .sectors
            .values()
            .find(|s| {
                s.seal_status.is_accepting_pieces()
                    && s.num_bytes_used() + num_bytes_in_piece <= max_bytes_per_sector
            })
            .map(|s| s.sector_id);

        let (sector_id, provisioned) = match existing {
            Some(sector_id) => (sector_id, false),
            None => (self.provision_staged_sector()?, true),
        };

        let sector_access = self
            .state
            .staged
            .sectors
            .get(&sector_id)
            .map(|s| s.sector_access.clone())
            .ok_or_else(|| err_sectornotfound(sector_id))?;

        if let Err(err) = self.write_piece(&sector_access, piece_bytes) {
            self.discard_write(sector_id, &sector_access, provisioned);
            return Err(err);
        }

        if let Some(sector) = self.state.staged.sectors.get_mut(&sector_id) {
            sector.pieces.push(PieceMetadata {
                piece_key,
                num_bytes: num_bytes_in_piece,
            });
        }

        let protos = if provisioned {
            self.close_oldest_open_sectors(sector_id)
        } else {
            Vec::new()
        };

        // The piece is on disk and in memory; the next checkpoint records it.
        if let Err(err) = self.checkpoint() {
            error!("could not checkpoint after adding piece to sector {}: {}", sector_id, err);
        }

        Ok((sector_id, protos))
    }

    pub fn get_seal_status(&self, sector_id: SectorId) -> Result<SectorStatus> {
        if let Some(meta) = self.state.sealed.sectors.get(&sector_id) {
            return Ok(SectorStatus::Sealed(Box::new(meta.clone())));
        }

        self.state
            .staged
            .sectors
            .get(&sector_id)
            .map(|meta| match &meta.seal_status {
                SealStatus::AcceptingPieces | SealStatus::FullyPacked => SectorStatus::Pending,
                SealStatus::Sealing => SectorStatus::Sealing,
                SealStatus::Failed(err) => SectorStatus::Failed(err.clone()),
            })
            .ok_or_else(|| err_sectornotfound(sector_id))
    }

    pub fn get_sealed_sectors(&self) -> Vec<SealedSectorMetadata> {
        self.state.sealed.sectors.values().cloned().collect()
    }

    pub fn get_staged_sectors(&self) -> Vec<StagedSectorMetadata> {
        self.state.staged.sectors.values().cloned().collect()
    }

    pub fn read_piece_from_sealed_sector(&self, piece_key: &str) -> Result<Vec<u8>> {
        for sector in self.state.sealed.sectors.values() {
            if let Some((offset, piece)) = sector.piece_offset(piece_key) {
                let bytes = self
                    .store
                    .read_raw(&sector.sector_access, offset, piece.num_bytes)?;

                return Ok(bytes);
            }
        }

        Err(err_piecenotfound(piece_key.to_string()))
    }

    /// Marks every open staged sector as fully packed and produces seal tasks
    /// for all sectors which are ready for sealing.
    pub fn seal_all_staged_sectors(&mut self) -> Result<Vec<SealTaskPrototype>> {
        for sector in self.state.staged.sectors.values_mut() {
            if sector.seal_status.is_accepting_pieces() {
                sector.seal_status = SealStatus::FullyPacked;
            }
        }

        let ready: Vec<SectorId> = self
            .state
            .staged
            .sectors
            .values()
            .filter(|s| s.seal_status.is_ready_for_sealing() && !s.pieces.is_empty())
            .map(|s| s.sector_id)
            .collect();

        let protos = ready
            .into_iter()
            .filter_map(|sector_id| self.create_seal_task_proto(sector_id))
            .collect();

        self.checkpoint()?;

        Ok(protos)
    }

    /// Produces seal tasks for sectors which were mid-seal when the engine last
    /// shut down.
    pub fn create_resume_seal_task_protos(&mut self) -> Vec<SealTaskPrototype> {
        let sealing: Vec<SectorId> = self
            .state
            .staged
            .sectors
            .values()
            .filter(|s| s.seal_status == SealStatus::Sealing)
            .map(|s| s.sector_id)
            .collect();

        sealing
            .into_iter()
            .filter_map(|sector_id| self.create_seal_task_proto(sector_id))
            .collect()
    }

    pub fn handle_seal_result(&mut self, result: SealResult) -> Result<()> {
        let SealResult {
            sector_id,
            sealed_sector_access,
            result,
        } = result;

        match result {
            Ok(output) => {
                let staged = match self.state.staged.sectors.remove(&sector_id) {
                    Some(staged) => staged,
                    None => return Err(err_sectornotfound(sector_id)),
                };

                info!("sealed sector {}", sector_id);

                self.state.sealed.sectors.insert(
                    sector_id,
                    SealedSectorMetadata {
                        sector_id,
                        sector_access: sealed_sector_access,
                        pieces: staged.pieces,
                        comm_d: output.comm_d,
                        comm_r: output.comm_r,
                        comm_r_star: output.comm_r_star,
                        proof: output.proof,
                    },
                );
            }
            Err(err) => {
                error!("failed to seal sector {}: {}", sector_id, err);

                let staged = self
                    .state
                    .staged
                    .sectors
                    .get_mut(&sector_id)
                    .ok_or_else(|| err_sectornotfound(sector_id))?;

                staged.seal_status = SealStatus::Failed(format!("{}", err));
            }
        }

        self.checkpoint()
    }

    // Closes the oldest open sectors, other than `keep`, until no more than the
    // maximum number of sectors accept pieces.
    fn close_oldest_open_sectors(&mut self, keep: SectorId) -> Vec<SealTaskPrototype> {
        let max = usize::from(self.max_num_staged_sectors).max(1);
        let num_open = self.state.staged.num_accepting_pieces();

        if num_open <= max {
            return Vec::new();
        }

        let to_close: Vec<SectorId> = self
            .state
            .staged
            .sectors
            .values()
            .filter(|s| s.sector_id != keep && s.seal_status.is_accepting_pieces())
            .take(num_open - max)
            .map(|s| s.sector_id)
            .collect();

        to_close
            .into_iter()
            .filter_map(|sector_id| {
                if let Some(sector) = self.state.staged.sectors.get_mut(&sector_id) {
                    sector.seal_status = SealStatus::FullyPacked;
                }

                debug!("sector {} is fully packed; scheduling it for sealing", sector_id);

                self.create_seal_task_proto(sector_id)
            })
            .collect()
    }

    // Appends the piece, checking that every byte made it to the staged file.
    fn write_piece(&self, sector_access: &str, piece_bytes: &[u8]) -> Result<()> {
        let num_bytes_in_piece = piece_bytes.len() as u64;
        let num_bytes_written = self.store.write_and_preprocess(sector_access, piece_bytes)?;

        if num_bytes_written != num_bytes_in_piece {
            return Err(err_inc_write(num_bytes_written, num_bytes_in_piece));
        }

        Ok(())
    }

    // Undoes a failed write. Piece offsets are derived from recorded piece
    // sizes, so the staged file must end where the last recorded piece ends.
    fn discard_write(&mut self, sector_id: SectorId, sector_access: &str, provisioned: bool) {
        if provisioned {
            self.state.staged.sectors.remove(&sector_id);

            if let Err(err) = self.store.remove_staged(sector_access) {
                warn!("could not remove staged sector {}: {}", sector_id, err);
            }

            return;
        }

        let num_bytes_used = match self.state.staged.sectors.get(&sector_id) {
            Some(sector) => sector.num_bytes_used(),
            None => return,
        };

        if let Err(err) = self.store.truncate_staged(sector_access, num_bytes_used) {
            error!(
                "could not discard partial write to sector {}: {}; closing it to new pieces",
                sector_id, err
            );

            if let Some(sector) = self.state.staged.sectors.get_mut(&sector_id) {
                sector.seal_status = SealStatus::FullyPacked;
            }
        }
    }

    fn provision_staged_sector(&mut self) -> Result<SectorId> {
        let sector_id = self.state.staged.sector_id_nonce + 1;
        let sector_access = self.store.new_staging_sector_access(sector_id)?;

        self.state.staged.sector_id_nonce = sector_id;
        self.state.staged.sectors.insert(
            sector_id,
            StagedSectorMetadata {
                sector_id,
                sector_access,
                pieces: Vec::new(),
                seal_status: SealStatus::AcceptingPieces,
            },
        );

        debug!("provisioned staged sector {}", sector_id);

        Ok(sector_id)
    }

    fn create_seal_task_proto(&mut self, sector_id: SectorId) -> Option<SealTaskPrototype> {
        let sealed_sector_access = self.store.new_sealed_sector_access(sector_id);
        let sealed_sector_path = self.store.sealed_sector_path(&sealed_sector_access);

        let sector = self.state.staged.sectors.get_mut(&sector_id)?;
        sector.seal_status = SealStatus::Sealing;

        Some(SealTaskPrototype {
            sealed_sector_access,
            sealed_sector_path,
            sector_id,
            staged_sector_path: self.store.staged_sector_path(&sector.sector_access),
        })
    }

    fn checkpoint(&self) -> Result<()> {
        let snapshot = make_snapshot(&self.state.staged, &self.state.sealed);
        persist_snapshot(&self.metadata_dir, &self.snapshot_key, &snapshot)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::api::SectorStoreType;
    use crate::sealer::seal;

    use super::*;

    struct Harness {
        _dir: tempfile::TempDir,
        metadata_dir: PathBuf,
        store: SectorStore,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = SectorStore::new(
            SectorStoreType::Test,
            dir.path().join("staged"),
            dir.path().join("sealed"),
        )
        .unwrap();
        let metadata_dir = dir.path().join("metadata");
        fs::create_dir_all(&metadata_dir).unwrap();

        Harness {
            _dir: dir,
            metadata_dir,
            store,
        }
    }

    fn manager(h: &Harness, last_used_sector_id: SectorId, max: u8) -> SectorMetadataManager {
        SectorMetadataManager::initialize(
            h.store.clone(),
            h.metadata_dir.clone(),
            [0; 31],
            last_used_sector_id,
            max,
        )
        .unwrap()
    }

    fn run_seal(proto: SealTaskPrototype) -> SealResult {
        SealResult {
            sector_id: proto.sector_id,
            result: seal(
                &[0; 31],
                proto.sector_id,
                &proto.staged_sector_path,
                &proto.sealed_sector_path,
            ),
            sealed_sector_access: proto.sealed_sector_access,
        }
    }

    #[test]
    fn test_pieces_share_an_open_sector_until_full() {
        let h = harness();
        let mut m = manager(&h, 6, 1);

        let (a, protos_a) = m.add_piece("a".to_string(), &[1; 500]).unwrap();
        let (b, protos_b) = m.add_piece("b".to_string(), &[2; 500]).unwrap();

        assert_eq!(7, a);
        assert_eq!(7, b);
        assert!(protos_a.is_empty());
        assert!(protos_b.is_empty());

        // doesn't fit: sector 7 is closed and scheduled, sector 8 opened
        let (c, protos_c) = m.add_piece("c".to_string(), &[3; 500]).unwrap();

        assert_eq!(8, c);
        assert_eq!(vec![7], protos_c.iter().map(|p| p.sector_id).collect::<Vec<_>>());
        assert_eq!(SectorStatus::Sealing, m.get_seal_status(7).unwrap());
        assert_eq!(SectorStatus::Pending, m.get_seal_status(8).unwrap());
        assert_eq!(1, m.state.staged.num_accepting_pieces());
    }

    #[test]
    fn test_open_sector_limit_is_respected() {
        let h = harness();
        let mut m = manager(&h, 0, 2);

        m.add_piece("a".to_string(), &[0; 1000]).unwrap();
        m.add_piece("b".to_string(), &[0; 1000]).unwrap();
        assert_eq!(2, m.state.staged.num_accepting_pieces());

        let (_, protos) = m.add_piece("c".to_string(), &[0; 1000]).unwrap();
        assert_eq!(1, protos.len());
        assert_eq!(1, protos[0].sector_id);
        assert_eq!(2, m.state.staged.num_accepting_pieces());
    }

    #[test]
    fn test_oversized_piece_is_rejected() {
        let h = harness();
        let mut m = manager(&h, 0, 1);

        match m.add_piece("big".to_string(), &[0; 1017]) {
            Err(crate::error::SectorBuilderErr::OverflowError { .. }) => (),
            other => panic!("expected overflow, got {:?}", other.map(|(id, _)| id)),
        }
    }

    #[test]
    fn test_seal_then_read_piece_back() {
        let h = harness();
        let mut m = manager(&h, 0, 1);

        m.add_piece("a".to_string(), &[1; 10]).unwrap();
        m.add_piece("b".to_string(), &[2; 20]).unwrap();

        let protos = m.seal_all_staged_sectors().unwrap();
        assert_eq!(1, protos.len());

        for proto in protos {
            m.handle_seal_result(run_seal(proto)).unwrap();
        }

        match m.get_seal_status(1).unwrap() {
            SectorStatus::Sealed(meta) => assert_eq!(2, meta.pieces.len()),
            other => panic!("expected sealed, got {:?}", other),
        }

        assert_eq!(vec![2; 20], m.read_piece_from_sealed_sector("b").unwrap());
        assert!(m.read_piece_from_sealed_sector("zzz").is_err());
        assert!(m.get_staged_sectors().is_empty());
    }

    #[test]
    fn test_failed_seal_is_recorded_on_the_staged_sector() {
        let h = harness();
        let mut m = manager(&h, 0, 1);

        m.add_piece("a".to_string(), &[1; 10]).unwrap();
        let proto = m.seal_all_staged_sectors().unwrap().pop().unwrap();

        m.handle_seal_result(SealResult {
            sector_id: proto.sector_id,
            sealed_sector_access: proto.sealed_sector_access,
            result: Err(crate::error::err_unrecov("disk full")),
        })
        .unwrap();

        assert_eq!(
            SectorStatus::Failed("unrecoverable error: disk full".to_string()),
            m.get_seal_status(1).unwrap()
        );
    }

    #[test]
    fn test_state_survives_reinitialization() {
        let h = harness();

        {
            let mut m = manager(&h, 0, 1);
            m.add_piece("a".to_string(), &[1; 10]).unwrap();
            m.seal_all_staged_sectors().unwrap();
        }

        let mut m = manager(&h, 0, 1);

        assert_eq!(SectorStatus::Sealing, m.get_seal_status(1).unwrap());
        assert_eq!(1, m.create_resume_seal_task_protos().len());

        // the snapshot nonce wins over a smaller last-used id
        let (sector_id, _) = m.add_piece("b".to_string(), &[1; 10]).unwrap();
        assert_eq!(2, sector_id);
    }

    #[test]
    fn test_failed_provisioning_leaves_open_sector_untouched() {
        let h = harness();
        let mut m = manager(&h, 0, 1);

        let (first, _) = m.add_piece("a".to_string(), &[1; 600]).unwrap();
        assert_eq!(1, first);

        let staged_dir = h._dir.path().join("staged");
        fs::remove_dir_all(&staged_dir).unwrap();

        assert!(m.add_piece("b".to_string(), &[2; 600]).is_err());

        // sector 1 was not closed, so nothing is left waiting on a seal task
        assert_eq!(SectorStatus::Pending, m.get_seal_status(1).unwrap());
        assert_eq!(1, m.state.staged.num_accepting_pieces());
        assert_eq!(vec![1], m.state.staged.sectors.keys().cloned().collect::<Vec<_>>());

        fs::create_dir_all(&staged_dir).unwrap();

        let (second, protos) = m.add_piece("b".to_string(), &[2; 600]).unwrap();
        assert_eq!(2, second);
        assert_eq!(vec![1], protos.iter().map(|p| p.sector_id).collect::<Vec<_>>());
        assert_eq!(SectorStatus::Sealing, m.get_seal_status(1).unwrap());
    }

    #[test]
    fn test_discarded_write_keeps_piece_offsets_intact() {
        let h = harness();
        let mut m = manager(&h, 0, 1);

        m.add_piece("a".to_string(), &[1; 10]).unwrap();

        // half a piece made it to disk before the write failed
        let access = m.state.staged.sectors[&1].sector_access.clone();
        h.store.write_and_preprocess(&access, &[7; 5]).unwrap();
        m.discard_write(1, &access, false);

        assert_eq!(10, h.store.num_unsealed_bytes(&access).unwrap());
        assert!(m.state.staged.sectors[&1].seal_status.is_accepting_pieces());

        m.add_piece("b".to_string(), &[2; 20]).unwrap();

        for proto in m.seal_all_staged_sectors().unwrap() {
            m.handle_seal_result(run_seal(proto)).unwrap();
        }

        assert_eq!(vec![2; 20], m.read_piece_from_sealed_sector("b").unwrap());
    }

    #[test]
    fn test_failed_write_to_missing_file_closes_the_sector() {
        let h = harness();
        let mut m = manager(&h, 0, 1);

        m.add_piece("a".to_string(), &[1; 10]).unwrap();

        let access = m.state.staged.sectors[&1].sector_access.clone();
        fs::remove_file(h.store.staged_sector_path(&access)).unwrap();

        assert!(m.add_piece("b".to_string(), &[2; 10]).is_err());

        let sector = &m.state.staged.sectors[&1];
        assert_eq!(1, sector.pieces.len());
        assert_eq!(SealStatus::FullyPacked, sector.seal_status);

        // later pieces go to a fresh sector
        let (sector_id, protos) = m.add_piece("b".to_string(), &[2; 10]).unwrap();
        assert_eq!(2, sector_id);
        assert!(protos.is_empty());
    }

    #[test]
    fn test_failed_checkpoint_does_not_fail_the_write() {
        let h = harness();

        {
            let mut m = manager(&h, 0, 1);
            fs::remove_dir_all(&h.metadata_dir).unwrap();

            let (sector_id, _) = m.add_piece("a".to_string(), &[1; 10]).unwrap();
            assert_eq!(1, sector_id);
            assert_eq!(1, m.state.staged.sectors[&1].pieces.len());

            fs::create_dir_all(&h.metadata_dir).unwrap();
            m.add_piece("b".to_string(), &[2; 10]).unwrap();
        }

        let m = manager(&h, 0, 1);
        let keys: Vec<String> = m.state.staged.sectors[&1]
            .pieces
            .iter()
            .map(|p| p.piece_key.clone())
            .collect();

        assert_eq!(vec!["a".to_string(), "b".to_string()], keys);
    }

    #[test]
    fn test_unknown_sector_is_an_error() {
        let h = harness();
        let m = manager(&h, 0, 1);

        assert!(m.get_seal_status(42).is_err());
    }
}
