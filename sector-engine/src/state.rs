use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::api::SectorId;
use crate::metadata::{SealedSectorMetadata, StagedSectorMetadata};

#[derive(Clone, Default, Serialize, Deserialize, Debug, PartialEq)]
pub struct StagedState {
    pub sector_id_nonce: SectorId,
    pub sectors: BTreeMap<SectorId, StagedSectorMetadata>,
}

impl StagedState {
    pub fn num_accepting_pieces(&self) -> usize {
        self.sectors
            .values()
            .filter(|s| s.seal_status.is_accepting_pieces())
            .count()
    }
}

#[derive(Clone, Default, Serialize, Deserialize, Debug, PartialEq)]
pub struct SealedState {
    pub sectors: BTreeMap<SectorId, SealedSectorMetadata>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct EngineState {
    pub staged: StagedState,
    pub sealed: SealedState,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct StateSnapshot {
    pub staged: StagedState,
    pub sealed: SealedState,
}

impl From<StateSnapshot> for EngineState {
    fn from(snapshot: StateSnapshot) -> Self {
        EngineState {
            staged: snapshot.staged,
            sealed: snapshot.sealed,
        }
    }
}
