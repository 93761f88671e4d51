#![deny(clippy::all, clippy::perf, clippy::correctness)]

#[macro_use]
extern crate log;

pub use crate::api::*;
pub use crate::constants::*;
pub use crate::engine::*;
pub use crate::error::*;

pub(crate) mod api;
pub(crate) mod constants;
pub(crate) mod engine;
pub(crate) mod error;
pub(crate) mod metadata;
pub(crate) mod metadata_manager;
pub(crate) mod scheduler;
pub(crate) mod sealer;
pub(crate) mod snapshots;
pub(crate) mod state;
pub(crate) mod store;
