use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Duration;

use cid::Cid;
use crossbeam_channel::{bounded, Receiver};

use sector_engine::{SealingEngine, SectorId};

use crate::client::EngineClient;
use crate::config::SectorBuilderConfig;
use crate::error::{Error, Result};
use crate::helpers::elapsed;
use crate::metadata::{SealResult, SealedSectorMetadata, StagedSectorMetadata};
use crate::piece::{ContentStore, PieceAssembler, PieceInfo};
use crate::poller::{SealStatusPoller, SectorIdRegistrar};

/// Packs pieces into staged sectors, asks the engine to seal them, and
/// reports each sector's outcome on `seal_results`.
pub struct SectorBuilder<E: SealingEngine> {
    client: EngineClient<E>,
    assembler: PieceAssembler,
    poller: SealStatusPoller,
    registrar: SectorIdRegistrar,
    seal_results_rx: Receiver<SealResult>,
    closed: bool,
}

impl<E: SealingEngine> SectorBuilder<E> {
    pub fn init(
        config: &SectorBuilderConfig,
        content_store: Arc<dyn ContentStore>,
    ) -> Result<SectorBuilder<E>> {
        let _t = elapsed("init");

        config.validate()?;

        let client = EngineClient::init(config.init_request())?;

        SectorBuilder::with_client(client, content_store, config.seal_status_poll_interval())
    }

    /// Builds an orchestrator around an engine which has already been
    /// initialized. The engine is destroyed if this fails.
    pub fn with_client(
        client: EngineClient<E>,
        content_store: Arc<dyn ContentStore>,
        poll_interval: Duration,
    ) -> Result<SectorBuilder<E>> {
        let staged = match client.get_staged_sectors() {
            Ok(staged) => staged,
            Err(err) => {
                client.destroy();
                return Err(Error::MetadataLoad(Box::new(err)));
            }
        };

        let sector_ids: Vec<SectorId> = staged.iter().map(|s| s.sector_id).collect();
        info!("resuming seal status polling for {} staged sector(s)", sector_ids.len());

        let (seal_results_tx, seal_results_rx) = bounded(0);

        let poller_client = client.clone();
        let poller = SealStatusPoller::start(
            sector_ids,
            seal_results_tx,
            poll_interval,
            move |sector_id| poller_client.get_seal_status(sector_id),
        );

        Ok(SectorBuilder {
            client,
            assembler: PieceAssembler::new(content_store),
            registrar: poller.registrar(),
            poller,
            seal_results_rx,
            closed: false,
        })
    }

    pub fn max_piece_bytes(&self) -> Result<u64> {
        self.client.max_user_bytes_per_staged_sector()
    }

    /// Writes the piece to a staged sector and starts tracking that sector's
    /// seal status. Returns the id of the sector which received the piece.
    pub fn add_piece(&self, piece: &PieceInfo) -> Result<SectorId> {
        let _t = elapsed("add_piece");

        let bytes = self.assembler.assemble(&piece.piece_ref, piece.size)?;
        let sector_id = self
            .client
            .add_piece(&piece.piece_ref.to_string(), &bytes)?;

        self.registrar.register(sector_id);

        Ok(sector_id)
    }

    pub fn seal_all_staged_sectors(&self) -> Result<()> {
        let _t = elapsed("seal_all_staged_sectors");

        self.client.seal_all_staged_sectors()
    }

    pub fn sealed_sectors(&self) -> Result<Vec<SealedSectorMetadata>> {
        self.client.get_sealed_sectors()
    }

    pub fn staged_sectors(&self) -> Result<Vec<StagedSectorMetadata>> {
        self.client.get_staged_sectors()
    }

    pub fn read_piece_from_sealed_sector(&self, piece_ref: &Cid) -> Result<impl Read + Send> {
        let _t = elapsed("read_piece_from_sealed_sector");

        let data = self
            .client
            .read_piece_from_sealed_sector(&piece_ref.to_string())?;

        Ok(Cursor::new(data))
    }

    /// One `SealResult` per sector that reaches a terminal status. Each result
    /// is handed to exactly one receiver; the poller waits until one takes it.
    pub fn seal_results(&self) -> Receiver<SealResult> {
        self.seal_results_rx.clone()
    }

    pub fn tracked_sector_ids(&self) -> Vec<SectorId> {
        self.poller.tracked_sector_ids()
    }

    pub fn unexpected_status_count(&self) -> u64 {
        self.poller.unexpected_status_count()
    }

    /// Stops polling and destroys the engine.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        info!("sector builder shutdown: {}", "start");

        self.poller.stop();
        self.client.destroy();

        info!("sector builder shutdown: {}", "finish");
    }
}

impl<E: SealingEngine> Drop for SectorBuilder<E> {
    fn drop(&mut self) {
        if !self.closed {
            warn!("sector builder dropped without shutdown; releasing engine");
            self.close();
        }
    }
}
